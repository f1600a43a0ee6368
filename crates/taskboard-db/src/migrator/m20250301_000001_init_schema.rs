//! Initial schema: users, projects, memberships, lists, tasks, notifications

use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // ============================================================
        // 1. users
        // ============================================================
        manager
            .create_table(
                Table::create()
                    .table(User::Table)
                    .if_not_exists()
                    .col(uuid(User::Id).primary_key())
                    .col(string_len(User::Name, 255).not_null())
                    .col(string_len(User::Email, 255).not_null().unique_key())
                    .col(string_len(User::PasswordHash, 255).not_null())
                    .col(string_len_null(User::Avatar, 1024))
                    .col(
                        timestamp_with_time_zone(User::CreatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(User::UpdatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_users_email")
                    .table(User::Table)
                    .col(User::Email)
                    .to_owned(),
            )
            .await?;

        // ============================================================
        // 2. projects
        // ============================================================
        manager
            .create_table(
                Table::create()
                    .table(Project::Table)
                    .if_not_exists()
                    .col(uuid(Project::Id).primary_key())
                    .col(string_len(Project::Name, 255).not_null())
                    .col(text_null(Project::Description))
                    .col(uuid(Project::CreatedBy).not_null())
                    .col(integer(Project::LastListPosition).not_null().default(0))
                    .col(
                        timestamp_with_time_zone(Project::CreatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(Project::UpdatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_projects_created_by")
                            .from(Project::Table, Project::CreatedBy)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // ============================================================
        // 3. project_members junction table
        // ============================================================
        manager
            .create_table(
                Table::create()
                    .table(ProjectMember::Table)
                    .if_not_exists()
                    .col(uuid(ProjectMember::ProjectId).not_null())
                    .col(uuid(ProjectMember::UserId).not_null())
                    .col(
                        string_len(ProjectMember::Role, 32)
                            .not_null()
                            .default("member"),
                    )
                    .col(
                        timestamp_with_time_zone(ProjectMember::JoinedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .primary_key(
                        Index::create()
                            .col(ProjectMember::ProjectId)
                            .col(ProjectMember::UserId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_project_members_project_id")
                            .from(ProjectMember::Table, ProjectMember::ProjectId)
                            .to(Project::Table, Project::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_project_members_user_id")
                            .from(ProjectMember::Table, ProjectMember::UserId)
                            .to(User::Table, User::Id)
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
                    .name("idx_project_members_user_id")
                    .table(ProjectMember::Table)
                    .col(ProjectMember::UserId)
                    .to_owned(),
            )
            .await?;

        // ============================================================
        // 4. lists
        // ============================================================
        manager
            .create_table(
                Table::create()
                    .table(List::Table)
                    .if_not_exists()
                    .col(uuid(List::Id).primary_key())
                    .col(uuid(List::ProjectId).not_null())
                    .col(string_len(List::Title, 255).not_null())
                    .col(integer(List::Position).not_null())
                    .col(
                        timestamp_with_time_zone(List::CreatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(List::UpdatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_lists_project_id")
                            .from(List::Table, List::ProjectId)
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
                    .name("idx_lists_project_id_position")
                    .table(List::Table)
                    .col(List::ProjectId)
                    .col(List::Position)
                    .to_owned(),
            )
            .await?;

        // ============================================================
        // 5. tasks (steps/labels/comments/files embedded as JSON)
        // ============================================================
        manager
            .create_table(
                Table::create()
                    .table(Task::Table)
                    .if_not_exists()
                    .col(uuid(Task::Id).primary_key())
                    .col(uuid(Task::ListId).not_null())
                    .col(string_len(Task::Title, 255).not_null())
                    .col(text_null(Task::Description))
                    .col(string_len(Task::Status, 32).not_null().default("todo"))
                    .col(string_len(Task::Priority, 32).not_null().default("medium"))
                    .col(uuid_null(Task::AssignedTo))
                    .col(uuid(Task::CreatedBy).not_null())
                    .col(timestamp_with_time_zone_null(Task::StartDate))
                    .col(timestamp_with_time_zone_null(Task::DueDate))
                    .col(json(Task::Steps).not_null())
                    .col(json(Task::Labels).not_null())
                    .col(json(Task::Comments).not_null())
                    .col(json(Task::Files).not_null())
                    .col(
                        timestamp_with_time_zone(Task::CreatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(Task::UpdatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_tasks_list_id")
                            .from(Task::Table, Task::ListId)
                            .to(List::Table, List::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_tasks_assigned_to")
                            .from(Task::Table, Task::AssignedTo)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::SetNull)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_tasks_created_by")
                            .from(Task::Table, Task::CreatedBy)
                            .to(User::Table, User::Id)
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
                    .name("idx_tasks_list_id")
                    .table(Task::Table)
                    .col(Task::ListId)
                    .to_owned(),
            )
            .await?;

        // ============================================================
        // 6. notifications
        // ============================================================
        manager
            .create_table(
                Table::create()
                    .table(Notification::Table)
                    .if_not_exists()
                    .col(uuid(Notification::Id).primary_key())
                    .col(uuid(Notification::UserId).not_null())
                    .col(uuid_null(Notification::ProjectId))
                    .col(
                        string_len(Notification::Kind, 32)
                            .not_null()
                            .default("general"),
                    )
                    .col(text(Notification::Message).not_null())
                    .col(boolean(Notification::IsRead).not_null().default(false))
                    .col(
                        timestamp_with_time_zone(Notification::CreatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_notifications_user_id")
                            .from(Notification::Table, Notification::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_notifications_project_id")
                            .from(Notification::Table, Notification::ProjectId)
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
                    .name("idx_notifications_user_id_is_read")
                    .table(Notification::Table)
                    .col(Notification::UserId)
                    .col(Notification::IsRead)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Notification::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Task::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(List::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ProjectMember::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Project::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(User::Table).to_owned())
            .await?;

        Ok(())
    }
}

// ============================================================
// Table identifiers
// ============================================================

#[derive(DeriveIden)]
pub(super) enum User {
    #[sea_orm(iden = "users")]
    Table,
    Id,
    Name,
    Email,
    PasswordHash,
    Avatar,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
pub(super) enum Project {
    #[sea_orm(iden = "projects")]
    Table,
    Id,
    Name,
    Description,
    CreatedBy,
    LastListPosition,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum ProjectMember {
    #[sea_orm(iden = "project_members")]
    Table,
    ProjectId,
    UserId,
    Role,
    JoinedAt,
}

#[derive(DeriveIden)]
enum List {
    #[sea_orm(iden = "lists")]
    Table,
    Id,
    ProjectId,
    Title,
    Position,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Task {
    #[sea_orm(iden = "tasks")]
    Table,
    Id,
    ListId,
    Title,
    Description,
    Status,
    Priority,
    AssignedTo,
    CreatedBy,
    StartDate,
    DueDate,
    Steps,
    Labels,
    Comments,
    Files,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Notification {
    #[sea_orm(iden = "notifications")]
    Table,
    Id,
    UserId,
    ProjectId,
    Kind,
    Message,
    IsRead,
    CreatedAt,
}
