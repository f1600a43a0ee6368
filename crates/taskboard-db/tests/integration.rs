//! Integration tests for taskboard-db
//!
//! Runs against a real SQLite in-memory database

use chrono::{Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use taskboard_db::entities::{
    chat_message, chatroom, chatroom_member, list, notification, project, project_member, task,
    user,
};
use taskboard_db::{connect, create_list, delete_list, delete_project, migrate};
use uuid::Uuid;

async fn setup_test_db() -> DatabaseConnection {
    let db = connect("sqlite::memory:")
        .await
        .expect("Failed to connect to in-memory database");

    migrate(&db).await.expect("Failed to run migrations");

    db
}

async fn insert_user(db: &DatabaseConnection, email: &str) -> user::Model {
    let now = Utc::now();
    user::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(email.split('@').next().unwrap_or(email).to_string()),
        email: Set(email.to_string()),
        password_hash: Set("$argon2id$placeholder".to_string()),
        avatar: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .expect("Failed to insert user")
}

async fn insert_project(db: &DatabaseConnection, owner: &user::Model) -> project::Model {
    let now = Utc::now();
    let project = project::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set("Launch".to_string()),
        description: Set(None),
        created_by: Set(owner.id),
        last_list_position: Set(0),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .expect("Failed to insert project");

    project_member::ActiveModel {
        project_id: Set(project.id),
        user_id: Set(owner.id),
        role: Set(project_member::ProjectRole::Admin),
        joined_at: Set(now),
    }
    .insert(db)
    .await
    .expect("Failed to insert member");

    project
}

async fn insert_task(db: &DatabaseConnection, list_id: Uuid, creator: Uuid) -> task::Model {
    let now = Utc::now();
    task::ActiveModel {
        id: Set(Uuid::new_v4()),
        list_id: Set(list_id),
        title: Set("Write release notes".to_string()),
        description: Set(None),
        status: Set(task::TaskStatus::Todo),
        priority: Set(task::TaskPriority::Medium),
        assigned_to: Set(None),
        created_by: Set(creator),
        start_date: Set(None),
        due_date: Set(None),
        steps: Set(task::Steps::default()),
        labels: Set(task::Labels::default()),
        comments: Set(task::Comments::default()),
        files: Set(task::Attachments::default()),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .expect("Failed to insert task")
}

#[tokio::test]
async fn test_migrations_run_successfully() {
    let db = connect("sqlite::memory:").await.expect("Failed to connect");
    assert!(matches!(
        db.get_database_backend(),
        sea_orm::DatabaseBackend::Sqlite
    ));

    assert!(migrate(&db).await.is_ok());
}

#[tokio::test]
async fn test_user_email_is_unique() {
    let db = setup_test_db().await;
    insert_user(&db, "same@example.com").await;

    let now = Utc::now();
    let duplicate = user::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set("Other".to_string()),
        email: Set("same@example.com".to_string()),
        password_hash: Set("x".to_string()),
        avatar: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(&db)
    .await;

    assert!(duplicate.is_err());
}

#[tokio::test]
async fn test_task_embedded_collections_persist() {
    let db = setup_test_db().await;
    let owner = insert_user(&db, "owner@example.com").await;
    let project = insert_project(&db, &owner).await;
    let column = create_list(&db, project.id, "Todo".to_string())
        .await
        .unwrap();
    let created = insert_task(&db, column.id, owner.id).await;

    let mut active: task::ActiveModel = created.into();
    active.steps = Set(task::Steps(vec![task::Step {
        id: "1".to_string(),
        title: "Draft".to_string(),
        completed: true,
    }]));
    active.labels = Set(task::Labels(vec![task::Label {
        id: "l1".to_string(),
        name: "docs".to_string(),
        color: Some("#00aa00".to_string()),
    }]));
    active.comments = Set(task::Comments(vec![task::Comment {
        id: "c1".to_string(),
        user_id: owner.id,
        text: "Looks good".to_string(),
        created_at: Utc::now(),
    }]));
    let updated = active.update(&db).await.unwrap();

    let found = task::Entity::find_by_id(updated.id)
        .one(&db)
        .await
        .unwrap()
        .expect("task exists");

    assert_eq!(found.steps.0.len(), 1);
    assert!(found.steps.0[0].completed);
    assert_eq!(found.labels.0[0].color.as_deref(), Some("#00aa00"));
    assert_eq!(found.comments.0[0].user_id, owner.id);
    assert!(found.files.0.is_empty());
}

#[tokio::test]
async fn test_list_positions_increase_and_are_not_reused() {
    let db = setup_test_db().await;
    let owner = insert_user(&db, "lists@example.com").await;
    let project = insert_project(&db, &owner).await;

    let first = create_list(&db, project.id, "Backlog".to_string())
        .await
        .unwrap();
    let second = create_list(&db, project.id, "Doing".to_string())
        .await
        .unwrap();
    assert_eq!(first.position, 1);
    assert_eq!(second.position, 2);

    delete_list(&db, second.id).await.unwrap();

    let third = create_list(&db, project.id, "Done".to_string())
        .await
        .unwrap();
    assert_eq!(third.position, 3, "deleted position 2 must not be reused");

    // Positions are per project
    let other = insert_project(&db, &owner).await;
    let elsewhere = create_list(&db, other.id, "Backlog".to_string())
        .await
        .unwrap();
    assert_eq!(elsewhere.position, 1);
}

#[tokio::test]
async fn test_list_position_skips_past_manually_raised_positions() {
    let db = setup_test_db().await;
    let owner = insert_user(&db, "manual@example.com").await;
    let project = insert_project(&db, &owner).await;

    let first = create_list(&db, project.id, "A".to_string()).await.unwrap();
    let mut active: list::ActiveModel = first.into();
    active.position = Set(10);
    active.update(&db).await.unwrap();

    let next = create_list(&db, project.id, "B".to_string()).await.unwrap();
    assert_eq!(next.position, 11);
}

#[tokio::test]
async fn test_create_list_for_missing_project() {
    let db = setup_test_db().await;

    let result = create_list(&db, Uuid::new_v4(), "Orphan".to_string()).await;
    assert!(matches!(result, Err(sea_orm::DbErr::RecordNotFound(_))));
}

#[tokio::test]
async fn test_delete_list_removes_its_tasks() {
    let db = setup_test_db().await;
    let owner = insert_user(&db, "tasks@example.com").await;
    let project = insert_project(&db, &owner).await;
    let doomed = create_list(&db, project.id, "Doomed".to_string())
        .await
        .unwrap();
    let kept = create_list(&db, project.id, "Kept".to_string())
        .await
        .unwrap();

    insert_task(&db, doomed.id, owner.id).await;
    insert_task(&db, doomed.id, owner.id).await;
    insert_task(&db, kept.id, owner.id).await;

    let report = delete_list(&db, doomed.id).await.unwrap();
    assert_eq!(report.tasks, 2);

    let remaining = task::Entity::find().count(&db).await.unwrap();
    assert_eq!(remaining, 1);
    assert!(list::Entity::find_by_id(doomed.id)
        .one(&db)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_delete_project_cascades() {
    let db = setup_test_db().await;
    let owner = insert_user(&db, "cascade@example.com").await;
    let project = insert_project(&db, &owner).await;
    let survivor = insert_project(&db, &owner).await;

    let backlog = create_list(&db, project.id, "Backlog".to_string())
        .await
        .unwrap();
    create_list(&db, project.id, "Done".to_string())
        .await
        .unwrap();
    let other_list = create_list(&db, survivor.id, "Backlog".to_string())
        .await
        .unwrap();
    insert_task(&db, backlog.id, owner.id).await;
    insert_task(&db, other_list.id, owner.id).await;

    let now = Utc::now();
    let room = chatroom::ActiveModel {
        id: Set(Uuid::new_v4()),
        project_id: Set(project.id),
        name: Set("general".to_string()),
        room_type: Set(chatroom::RoomType::Group),
        created_by: Set(owner.id),
        created_at: Set(now),
    }
    .insert(&db)
    .await
    .unwrap();
    chatroom_member::ActiveModel {
        chatroom_id: Set(room.id),
        user_id: Set(owner.id),
        joined_at: Set(now),
    }
    .insert(&db)
    .await
    .unwrap();
    chat_message::ActiveModel {
        id: Set(Uuid::new_v4()),
        chatroom_id: Set(room.id),
        sender_id: Set(owner.id),
        text: Set("hello".to_string()),
        created_at: Set(now),
    }
    .insert(&db)
    .await
    .unwrap();
    notification::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(owner.id),
        project_id: Set(Some(project.id)),
        kind: Set(notification::NotificationKind::General),
        message: Set("about the doomed project".to_string()),
        is_read: Set(false),
        created_at: Set(now),
    }
    .insert(&db)
    .await
    .unwrap();

    let report = delete_project(&db, project.id).await.unwrap();
    assert_eq!(report.lists, 2);
    assert_eq!(report.tasks, 1);
    assert_eq!(report.chatrooms, 1);
    assert_eq!(report.messages, 1);
    assert_eq!(report.notifications, 1);
    assert_eq!(report.members, 1);

    let lists_left = list::Entity::find()
        .filter(list::Column::ProjectId.eq(project.id))
        .count(&db)
        .await
        .unwrap();
    assert_eq!(lists_left, 0);
    assert!(project::Entity::find_by_id(project.id)
        .one(&db)
        .await
        .unwrap()
        .is_none());

    // The other project is untouched
    assert_eq!(
        list::Entity::find()
            .filter(list::Column::ProjectId.eq(survivor.id))
            .count(&db)
            .await
            .unwrap(),
        1
    );
    assert_eq!(task::Entity::find().count(&db).await.unwrap(), 1);
}

#[tokio::test]
async fn test_delete_missing_project_is_not_found() {
    let db = setup_test_db().await;

    let result = delete_project(&db, Uuid::new_v4()).await;
    assert!(matches!(result, Err(sea_orm::DbErr::RecordNotFound(_))));
}

#[tokio::test]
async fn test_messages_order_by_creation_time() {
    let db = setup_test_db().await;
    let owner = insert_user(&db, "chat@example.com").await;
    let project = insert_project(&db, &owner).await;
    let base = Utc::now();

    let room = chatroom::ActiveModel {
        id: Set(Uuid::new_v4()),
        project_id: Set(project.id),
        name: Set("general".to_string()),
        room_type: Set(chatroom::RoomType::Group),
        created_by: Set(owner.id),
        created_at: Set(base),
    }
    .insert(&db)
    .await
    .unwrap();

    for offset in [3, 1, 2] {
        chat_message::ActiveModel {
            id: Set(Uuid::new_v4()),
            chatroom_id: Set(room.id),
            sender_id: Set(owner.id),
            text: Set(format!("m{offset}")),
            created_at: Set(base + Duration::seconds(offset)),
        }
        .insert(&db)
        .await
        .unwrap();
    }

    let texts: Vec<String> = chat_message::Entity::find()
        .filter(chat_message::Column::ChatroomId.eq(room.id))
        .order_by_asc(chat_message::Column::CreatedAt)
        .all(&db)
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.text)
        .collect();

    assert_eq!(texts, vec!["m1", "m2", "m3"]);
}
