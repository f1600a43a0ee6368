//! Integration tests for tasks and their embedded items

mod common;

use axum::http::StatusCode;
use common::{error_code, id_of, TestApp, TestUser};
use serde_json::json;
use taskboard_api::models::{Task, TaskCollection, TaskPriority, TaskStatus};
use uuid::Uuid;

/// Project owned by alice with bob as member, plus one list
async fn setup(app: &TestApp) -> (TestUser, TestUser, Uuid, Uuid) {
    let alice = app.register("Alice", "alice@example.com").await;
    let bob = app.register("Bob", "bob@example.com").await;
    let project_id = app.create_project(&alice, "Release").await;
    app.add_member(&alice, project_id, &bob).await;
    let list_id = app.create_list(&alice, project_id, "To do").await;
    (alice, bob, project_id, list_id)
}

async fn notifications_of(app: &TestApp, user: &TestUser) -> serde_json::Value {
    let (status, body) = app
        .call("GET", "/api/notifications", Some(&user.token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    body
}

#[tokio::test]
async fn test_create_task_defaults() {
    let app = TestApp::new().await;
    let (alice, _, _, list_id) = setup(&app).await;

    let body = app
        .create_task(&alice, list_id, json!({ "title": "  Write changelog " }))
        .await;
    let task: Task = serde_json::from_value(body).unwrap();

    assert_eq!(task.title, "Write changelog");
    assert_eq!(task.status, TaskStatus::Todo);
    assert_eq!(task.priority, TaskPriority::Medium);
    assert_eq!(task.created_by, alice.id);
    assert!(task.assigned_to.is_none());
    assert!(task.steps.is_empty());
    assert!(task.comments.is_empty());
}

#[tokio::test]
async fn test_assignment_notifies_assignee() {
    let app = TestApp::new().await;
    let (alice, bob, project_id, list_id) = setup(&app).await;

    let body = app
        .create_task(
            &alice,
            list_id,
            json!({ "title": "Cut release", "assigned_to": bob.id, "priority": "high" }),
        )
        .await;
    let task: Task = serde_json::from_value(body).unwrap();
    assert_eq!(task.assignee.as_ref().map(|u| u.id), Some(bob.id));

    let notifications = notifications_of(&app, &bob).await;
    // project_invite + task_assigned
    assert_eq!(notifications["total"], 2);
    let assigned = &notifications["notifications"][0];
    assert_eq!(assigned["kind"], "task_assigned");
    assert_eq!(assigned["project_id"], json!(project_id));
    assert!(assigned["message"].as_str().unwrap().contains("Cut release"));

    // Self-assignment does not notify
    app.create_task(&alice, list_id, json!({ "title": "Mine", "assigned_to": alice.id }))
        .await;
    assert_eq!(notifications_of(&app, &alice).await["total"], 0);
}

#[tokio::test]
async fn test_reassignment_notifies_only_on_change() {
    let app = TestApp::new().await;
    let (alice, bob, _, list_id) = setup(&app).await;

    let task_id = id_of(&app.create_task(&alice, list_id, json!({ "title": "Review" })).await);

    let (status, body) = app
        .call(
            "PATCH",
            &format!("/api/tasks/{}", task_id),
            Some(&alice.token),
            Some(json!({ "assigned_to": bob.id, "status": "in_progress" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "in_progress");
    assert_eq!(notifications_of(&app, &bob).await["total"], 2);

    // Same assignee again: no new notification
    let (status, _) = app
        .call(
            "PATCH",
            &format!("/api/tasks/{}", task_id),
            Some(&alice.token),
            Some(json!({ "assigned_to": bob.id, "title": "Review PR" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(notifications_of(&app, &bob).await["total"], 2);

    // null clears the assignee
    let (status, body) = app
        .call(
            "PATCH",
            &format!("/api/tasks/{}", task_id),
            Some(&alice.token),
            Some(json!({ "assigned_to": null })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let task: Task = serde_json::from_value(body).unwrap();
    assert!(task.assigned_to.is_none());
    assert_eq!(task.title, "Review PR");
}

#[tokio::test]
async fn test_assignee_must_be_member() {
    let app = TestApp::new().await;
    let (alice, _, _, list_id) = setup(&app).await;
    let outsider = app.register("Olivia", "olivia@example.com").await;

    let (status, body) = app
        .call(
            "POST",
            "/api/tasks",
            Some(&alice.token),
            Some(json!({ "list_id": list_id, "title": "Nope", "assigned_to": outsider.id })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), Some("ASSIGNEE_NOT_MEMBER"));

    let (status, _) = app
        .call(
            "POST",
            "/api/tasks",
            Some(&outsider.token),
            Some(json!({ "list_id": list_id, "title": "Sneaky" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_move_task_between_lists() {
    let app = TestApp::new().await;
    let (alice, _, project_id, list_id) = setup(&app).await;
    let done_id = app.create_list(&alice, project_id, "Done").await;
    let other_project = app.create_project(&alice, "Other").await;
    let foreign_list = app.create_list(&alice, other_project, "Elsewhere").await;

    let task_id = id_of(&app.create_task(&alice, list_id, json!({ "title": "Ship" })).await);

    let (status, body) = app
        .call(
            "PATCH",
            &format!("/api/tasks/{}", task_id),
            Some(&alice.token),
            Some(json!({ "list_id": done_id, "status": "done" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["list_id"], json!(done_id));

    let (status, body) = app
        .call(
            "PATCH",
            &format!("/api/tasks/{}", task_id),
            Some(&alice.token),
            Some(json!({ "list_id": foreign_list })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), Some("INVALID_LIST"));

    let (_, body) = app
        .call(
            "GET",
            &format!("/api/tasks/list/{}", list_id),
            Some(&alice.token),
            None,
        )
        .await;
    let tasks: TaskCollection = serde_json::from_value(body).unwrap();
    assert_eq!(tasks.total, 0);
}

#[tokio::test]
async fn test_steps() {
    let app = TestApp::new().await;
    let (alice, bob, _, list_id) = setup(&app).await;
    let task_id = id_of(&app.create_task(&alice, list_id, json!({ "title": "Deploy" })).await);

    let (status, body) = app
        .call(
            "POST",
            &format!("/api/tasks/{}/steps", task_id),
            Some(&alice.token),
            Some(json!({ "id": "build", "title": "Build image" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["steps"][0]["id"], "build");
    assert_eq!(body["steps"][0]["completed"], false);

    let (status, body) = app
        .call(
            "POST",
            &format!("/api/tasks/{}/steps", task_id),
            Some(&bob.token),
            Some(json!({ "title": "Roll out" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let task: Task = serde_json::from_value(body).unwrap();
    assert_eq!(task.steps.len(), 2);
    assert!(!task.steps[1].id.is_empty());

    let (status, body) = app
        .call(
            "POST",
            &format!("/api/tasks/{}/steps", task_id),
            Some(&alice.token),
            Some(json!({ "id": "build", "title": "Duplicate" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), Some("DUPLICATE_ID"));

    let (status, body) = app
        .call(
            "PATCH",
            &format!("/api/tasks/{}/steps/build", task_id),
            Some(&bob.token),
            Some(json!({ "completed": true })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["steps"][0]["completed"], true);
    assert_eq!(body["steps"][0]["title"], "Build image");

    let (status, body) = app
        .call(
            "DELETE",
            &format!("/api/tasks/{}/steps/build", task_id),
            Some(&alice.token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["steps"].as_array().unwrap().len(), 1);

    let (status, body) = app
        .call(
            "DELETE",
            &format!("/api/tasks/{}/steps/build", task_id),
            Some(&alice.token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error_code(&body), Some("STEP_NOT_FOUND"));
}

#[tokio::test]
async fn test_labels_files_and_filter() {
    let app = TestApp::new().await;
    let (alice, _, _, list_id) = setup(&app).await;
    let bug_id = id_of(&app.create_task(&alice, list_id, json!({ "title": "Crash on start" })).await);
    app.create_task(
        &alice,
        list_id,
        json!({ "title": "Polish", "description": "Tweak the login screen" }),
    )
    .await;

    let (status, body) = app
        .call(
            "POST",
            &format!("/api/tasks/{}/labels", bug_id),
            Some(&alice.token),
            Some(json!({ "id": "bug", "name": "Bug", "color": "#ff0000" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["labels"][0]["color"], "#ff0000");

    let (status, body) = app
        .call(
            "POST",
            &format!("/api/tasks/{}/files", bug_id),
            Some(&alice.token),
            Some(json!({ "name": "trace.log", "url": "https://files.example.com/trace.log" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["files"][0]["name"], "trace.log");

    for (query, expected) in [("bug", 1), ("LOGIN", 1), ("polish", 1), ("zzz", 0), ("", 2)] {
        let (status, body) = app
            .call(
                "GET",
                &format!("/api/tasks/list/{}?q={}", list_id, query),
                Some(&alice.token),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], expected, "query '{query}'");
    }

    let (status, body) = app
        .call(
            "DELETE",
            &format!("/api/tasks/{}/labels/bug", bug_id),
            Some(&alice.token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["labels"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_comments_belong_to_their_author() {
    let app = TestApp::new().await;
    let (alice, bob, _, list_id) = setup(&app).await;
    let task_id = id_of(&app.create_task(&alice, list_id, json!({ "title": "Discuss" })).await);

    let (status, body) = app
        .call(
            "POST",
            &format!("/api/tasks/{}/comments", task_id),
            Some(&bob.token),
            Some(json!({ "text": "Looks good to me" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let task: Task = serde_json::from_value(body).unwrap();
    let comment = &task.comments[0];
    assert_eq!(comment.user_id, bob.id);
    assert_eq!(comment.author.as_ref().map(|a| a.name.as_str()), Some("Bob"));

    let (status, body) = app
        .call(
            "DELETE",
            &format!("/api/tasks/{}/comments/{}", task_id, comment.id),
            Some(&alice.token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(error_code(&body), Some("NOT_COMMENT_AUTHOR"));

    let (status, body) = app
        .call(
            "DELETE",
            &format!("/api/tasks/{}/comments/{}", task_id, comment.id),
            Some(&bob.token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["comments"].as_array().unwrap().is_empty());

    let (status, body) = app
        .call(
            "POST",
            &format!("/api/tasks/{}/comments", task_id),
            Some(&bob.token),
            Some(json!({ "text": "   " })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), Some("INVALID_INPUT"));
}

#[tokio::test]
async fn test_delete_task() {
    let app = TestApp::new().await;
    let (alice, bob, _, list_id) = setup(&app).await;
    let task_id = id_of(&app.create_task(&alice, list_id, json!({ "title": "Temporary" })).await);

    let (status, _) = app
        .call("DELETE", &format!("/api/tasks/{}", task_id), Some(&bob.token), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = app
        .call("GET", &format!("/api/tasks/{}", task_id), Some(&alice.token), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error_code(&body), Some("TASK_NOT_FOUND"));
}
