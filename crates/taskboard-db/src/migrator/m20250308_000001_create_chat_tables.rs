//! Chatrooms, chatroom memberships and chat messages

use sea_orm_migration::{prelude::*, schema::*};

use super::m20250301_000001_init_schema::{Project, User};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Chatroom::Table)
                    .if_not_exists()
                    .col(uuid(Chatroom::Id).primary_key())
                    .col(uuid(Chatroom::ProjectId).not_null())
                    .col(string_len(Chatroom::Name, 255).not_null())
                    .col(
                        string_len(Chatroom::RoomType, 16)
                            .not_null()
                            .default("group"),
                    )
                    .col(uuid(Chatroom::CreatedBy).not_null())
                    .col(
                        timestamp_with_time_zone(Chatroom::CreatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_chatrooms_project_id")
                            .from(Chatroom::Table, Chatroom::ProjectId)
                            .to(Project::Table, Project::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_chatrooms_project_id")
                    .table(Chatroom::Table)
                    .col(Chatroom::ProjectId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ChatroomMember::Table)
                    .if_not_exists()
                    .col(uuid(ChatroomMember::ChatroomId).not_null())
                    .col(uuid(ChatroomMember::UserId).not_null())
                    .col(
                        timestamp_with_time_zone(ChatroomMember::JoinedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .primary_key(
                        Index::create()
                            .col(ChatroomMember::ChatroomId)
                            .col(ChatroomMember::UserId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_chatroom_members_chatroom_id")
                            .from(ChatroomMember::Table, ChatroomMember::ChatroomId)
                            .to(Chatroom::Table, Chatroom::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_chatroom_members_user_id")
                            .from(ChatroomMember::Table, ChatroomMember::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ChatMessage::Table)
                    .if_not_exists()
                    .col(uuid(ChatMessage::Id).primary_key())
                    .col(uuid(ChatMessage::ChatroomId).not_null())
                    .col(uuid(ChatMessage::SenderId).not_null())
                    .col(text(ChatMessage::Text).not_null())
                    .col(
                        timestamp_with_time_zone(ChatMessage::CreatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_chat_messages_chatroom_id")
                            .from(ChatMessage::Table, ChatMessage::ChatroomId)
                            .to(Chatroom::Table, Chatroom::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_chat_messages_sender_id")
                            .from(ChatMessage::Table, ChatMessage::SenderId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // History is always read newest-first per room
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_chat_messages_chatroom_id_created_at")
                    .table(ChatMessage::Table)
                    .col(ChatMessage::ChatroomId)
                    .col(ChatMessage::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ChatMessage::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ChatroomMember::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Chatroom::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Chatroom {
    #[sea_orm(iden = "chatrooms")]
    Table,
    Id,
    ProjectId,
    Name,
    RoomType,
    CreatedBy,
    CreatedAt,
}

#[derive(DeriveIden)]
enum ChatroomMember {
    #[sea_orm(iden = "chatroom_members")]
    Table,
    ChatroomId,
    UserId,
    JoinedAt,
}

#[derive(DeriveIden)]
enum ChatMessage {
    #[sea_orm(iden = "chat_messages")]
    Table,
    Id,
    ChatroomId,
    SenderId,
    Text,
    CreatedAt,
}
