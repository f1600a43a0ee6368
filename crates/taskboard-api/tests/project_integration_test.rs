//! Integration tests for projects, membership and task lists

mod common;

use axum::http::StatusCode;
use common::{error_code, id_of, TestApp};
use sea_orm::{EntityTrait, PaginatorTrait};
use serde_json::json;
use taskboard_api::models::{Project, ProjectList, ProjectRole, TaskListCollection};
use taskboard_db::entities::{chat_message, chatroom, list, task};

#[tokio::test]
async fn test_creator_becomes_sole_admin() {
    let app = TestApp::new().await;
    let alice = app.register("Alice", "alice@example.com").await;

    let (status, body) = app
        .call(
            "POST",
            "/api/projects",
            Some(&alice.token),
            Some(json!({ "name": "  Website  ", "description": "Relaunch" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let project: Project = serde_json::from_value(body).unwrap();
    assert_eq!(project.name, "Website");
    assert_eq!(project.created_by, alice.id);
    assert_eq!(project.members.len(), 1);
    assert_eq!(project.members[0].user.id, alice.id);
    assert_eq!(project.members[0].role, ProjectRole::Admin);
}

#[tokio::test]
async fn test_project_requires_name() {
    let app = TestApp::new().await;
    let alice = app.register("Alice", "alice@example.com").await;

    let (status, body) = app
        .call(
            "POST",
            "/api/projects",
            Some(&alice.token),
            Some(json!({ "name": "   " })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), Some("INVALID_INPUT"));
}

#[tokio::test]
async fn test_projects_are_visible_to_members_only() {
    let app = TestApp::new().await;
    let alice = app.register("Alice", "alice@example.com").await;
    let bob = app.register("Bob", "bob@example.com").await;

    let project_id = app.create_project(&alice, "Secret Plans").await;
    app.create_project(&alice, "Groceries").await;

    let (_, body) = app.call("GET", "/api/projects", Some(&bob.token), None).await;
    let list: ProjectList = serde_json::from_value(body).unwrap();
    assert_eq!(list.total, 0);

    let (status, body) = app
        .call("GET", &format!("/api/projects/{}", project_id), Some(&bob.token), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(error_code(&body), Some("NOT_A_MEMBER"));

    let (status, body) = app
        .call(
            "GET",
            &format!("/api/projects/{}", uuid::Uuid::new_v4()),
            Some(&bob.token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error_code(&body), Some("PROJECT_NOT_FOUND"));

    // Filtering by name
    let (_, body) = app
        .call("GET", "/api/projects?q=secret", Some(&alice.token), None)
        .await;
    let list: ProjectList = serde_json::from_value(body).unwrap();
    assert_eq!(list.total, 1);
    assert_eq!(list.projects[0].id, project_id);
}

#[tokio::test]
async fn test_only_admins_manage_project() {
    let app = TestApp::new().await;
    let alice = app.register("Alice", "alice@example.com").await;
    let bob = app.register("Bob", "bob@example.com").await;
    let carol = app.register("Carol", "carol@example.com").await;

    let project_id = app.create_project(&alice, "Roadmap").await;
    app.add_member(&alice, project_id, &bob).await;

    let (status, body) = app
        .call(
            "PATCH",
            &format!("/api/projects/{}", project_id),
            Some(&bob.token),
            Some(json!({ "name": "Bob's roadmap" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(error_code(&body), Some("ADMIN_REQUIRED"));

    let (status, _) = app
        .call(
            "POST",
            &format!("/api/projects/{}/members", project_id),
            Some(&bob.token),
            Some(json!({ "user_id": carol.id })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .call(
            "DELETE",
            &format!("/api/projects/{}", project_id),
            Some(&bob.token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Admin can clear the description with null
    let (status, body) = app
        .call(
            "PATCH",
            &format!("/api/projects/{}", project_id),
            Some(&alice.token),
            Some(json!({ "description": null })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let project: Project = serde_json::from_value(body).unwrap();
    assert_eq!(project.name, "Roadmap");
    assert!(project.description.is_none());
}

#[tokio::test]
async fn test_add_member_sends_invite_notification() {
    let app = TestApp::new().await;
    let alice = app.register("Alice", "alice@example.com").await;
    let bob = app.register("Bob", "bob@example.com").await;

    let project_id = app.create_project(&alice, "Garden").await;

    let (status, body) = app
        .call(
            "POST",
            &format!("/api/projects/{}/members", project_id),
            Some(&alice.token),
            Some(json!({ "user_id": bob.id })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let project: Project = serde_json::from_value(body).unwrap();
    assert_eq!(project.members.len(), 2);
    let bob_member = project.members.iter().find(|m| m.user.id == bob.id).unwrap();
    assert_eq!(bob_member.role, ProjectRole::Member);

    let (_, body) = app
        .call("GET", "/api/notifications", Some(&bob.token), None)
        .await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["unread"], 1);
    assert_eq!(body["notifications"][0]["kind"], "project_invite");
    assert_eq!(body["notifications"][0]["project_id"], json!(project_id));
    assert!(body["notifications"][0]["message"]
        .as_str()
        .unwrap()
        .contains("Garden"));

    // Adding twice is rejected
    let (status, body) = app
        .call(
            "POST",
            &format!("/api/projects/{}/members", project_id),
            Some(&alice.token),
            Some(json!({ "user_id": bob.id })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), Some("ALREADY_MEMBER"));

    let (status, body) = app
        .call(
            "POST",
            &format!("/api/projects/{}/members", project_id),
            Some(&alice.token),
            Some(json!({ "user_id": uuid::Uuid::new_v4() })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error_code(&body), Some("USER_NOT_FOUND"));
}

#[tokio::test]
async fn test_last_admin_cannot_be_removed() {
    let app = TestApp::new().await;
    let alice = app.register("Alice", "alice@example.com").await;
    let bob = app.register("Bob", "bob@example.com").await;

    let project_id = app.create_project(&alice, "Budget").await;
    app.add_member(&alice, project_id, &bob).await;

    let (status, body) = app
        .call(
            "DELETE",
            &format!("/api/projects/{}/members/{}", project_id, alice.id),
            Some(&alice.token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), Some("LAST_ADMIN"));

    let (status, body) = app
        .call(
            "DELETE",
            &format!("/api/projects/{}/members/{}", project_id, bob.id),
            Some(&alice.token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let project: Project = serde_json::from_value(body).unwrap();
    assert_eq!(project.members.len(), 1);

    // Bob lost access
    let (status, _) = app
        .call("GET", &format!("/api/projects/{}", project_id), Some(&bob.token), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .call(
            "DELETE",
            &format!("/api/projects/{}/members/{}", project_id, bob.id),
            Some(&alice.token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error_code(&body), Some("MEMBER_NOT_FOUND"));
}

#[tokio::test]
async fn test_second_admin_can_remove_first() {
    let app = TestApp::new().await;
    let alice = app.register("Alice", "alice@example.com").await;
    let bob = app.register("Bob", "bob@example.com").await;

    let project_id = app.create_project(&alice, "Handover").await;
    let (status, _) = app
        .call(
            "POST",
            &format!("/api/projects/{}/members", project_id),
            Some(&alice.token),
            Some(json!({ "user_id": bob.id, "role": "admin" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app
        .call(
            "DELETE",
            &format!("/api/projects/{}/members/{}", project_id, alice.id),
            Some(&bob.token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let project: Project = serde_json::from_value(body).unwrap();
    assert_eq!(project.members.len(), 1);
    assert_eq!(project.members[0].user.id, bob.id);
}

#[tokio::test]
async fn test_list_positions_only_grow() {
    let app = TestApp::new().await;
    let alice = app.register("Alice", "alice@example.com").await;
    let project_id = app.create_project(&alice, "Kanban").await;

    let todo = app.create_list(&alice, project_id, "To do").await;
    let doing = app.create_list(&alice, project_id, "Doing").await;
    app.create_list(&alice, project_id, "Done").await;

    let (status, _) = app
        .call("DELETE", &format!("/api/lists/{}", doing), Some(&alice.token), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    app.create_list(&alice, project_id, "Archive").await;

    let (status, body) = app
        .call(
            "GET",
            &format!("/api/lists/project/{}", project_id),
            Some(&alice.token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let lists: TaskListCollection = serde_json::from_value(body).unwrap();
    let positions: Vec<(String, i32)> = lists
        .lists
        .iter()
        .map(|l| (l.title.clone(), l.position))
        .collect();
    assert_eq!(
        positions,
        vec![
            ("To do".to_string(), 1),
            ("Done".to_string(), 3),
            ("Archive".to_string(), 4)
        ]
    );

    // Renaming keeps the position
    let (status, body) = app
        .call(
            "PATCH",
            &format!("/api/lists/{}", todo),
            Some(&alice.token),
            Some(json!({ "title": "Backlog" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "Backlog");
    assert_eq!(body["position"], 1);

    let (status, body) = app
        .call(
            "PATCH",
            &format!("/api/lists/{}", todo),
            Some(&alice.token),
            Some(json!({ "position": 0 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), Some("INVALID_INPUT"));
}

#[tokio::test]
async fn test_lists_require_membership() {
    let app = TestApp::new().await;
    let alice = app.register("Alice", "alice@example.com").await;
    let mallory = app.register("Mallory", "mallory@example.com").await;
    let project_id = app.create_project(&alice, "Private").await;
    let list_id = app.create_list(&alice, project_id, "Ideas").await;

    let (status, _) = app
        .call(
            "POST",
            "/api/lists",
            Some(&mallory.token),
            Some(json!({ "project_id": project_id, "title": "Spam" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .call("GET", &format!("/api/lists/{}", list_id), Some(&mallory.token), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .call(
            "GET",
            &format!("/api/lists/{}", uuid::Uuid::new_v4()),
            Some(&alice.token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error_code(&body), Some("LIST_NOT_FOUND"));
}

#[tokio::test]
async fn test_delete_project_cascades() {
    let app = TestApp::new().await;
    let alice = app.register("Alice", "alice@example.com").await;
    let project_id = app.create_project(&alice, "Doomed").await;
    let keep_id = app.create_project(&alice, "Survivor").await;

    let list_id = app.create_list(&alice, project_id, "Tasks").await;
    app.create_task(&alice, list_id, json!({ "title": "Pack boxes" }))
        .await;
    let keep_list = app.create_list(&alice, keep_id, "Tasks").await;
    app.create_task(&alice, keep_list, json!({ "title": "Stay" }))
        .await;

    let (status, body) = app
        .call(
            "POST",
            "/api/chat/rooms",
            Some(&alice.token),
            Some(json!({ "project_id": project_id, "name": "general" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let room_id = id_of(&body);
    let (status, _) = app
        .call(
            "POST",
            &format!("/api/chat/rooms/{}/messages", room_id),
            Some(&alice.token),
            Some(json!({ "text": "bye" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = app
        .call(
            "DELETE",
            &format!("/api/projects/{}", project_id),
            Some(&alice.token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let db = &app.state.db;
    assert_eq!(list::Entity::find().count(db).await.unwrap(), 1);
    assert_eq!(task::Entity::find().count(db).await.unwrap(), 1);
    assert_eq!(chatroom::Entity::find().count(db).await.unwrap(), 0);
    assert_eq!(chat_message::Entity::find().count(db).await.unwrap(), 0);

    let (status, _) = app
        .call("GET", &format!("/api/projects/{}", project_id), Some(&alice.token), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
