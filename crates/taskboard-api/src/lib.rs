pub mod handlers;
pub mod middleware;
pub mod models;

use axum::{
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    routing::{delete, get, patch, post},
    Router,
};
use std::{future::Future, net::SocketAddr, path::PathBuf, sync::Arc};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};
use tracing::{info, warn};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use uuid::Uuid;

use anyhow::Context;
use sea_orm::DatabaseConnection;
use taskboard_auth::session_validity;
use taskboard_realtime::RealtimeHub;

/// Application state shared across handlers
pub struct AppState {
    pub db: DatabaseConnection,
    pub hub: Arc<RealtimeHub>,
    /// HS256 secret for session tokens
    pub jwt_secret: String,
    /// Lifetime of issued session tokens
    pub token_validity: chrono::Duration,
    pub allow_signup: bool,
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Taskboard API",
        version = "0.1.0",
        description = "REST API for projects, task lists, tasks, team chat and notifications",
        contact(
            name = "Taskboard Team",
            email = "team@taskboard.dev"
        )
    ),
    paths(
        handlers::health_check,
        handlers::auth::register,
        handlers::auth::login,
        handlers::auth::logout,
        handlers::auth::get_current_user,
        handlers::auth::update_current_user,
        handlers::auth::search_users,
        handlers::projects::list_projects,
        handlers::projects::create_project,
        handlers::projects::get_project,
        handlers::projects::update_project,
        handlers::projects::delete_project,
        handlers::projects::add_member,
        handlers::projects::remove_member,
        handlers::lists::list_lists,
        handlers::lists::create_list,
        handlers::lists::get_list,
        handlers::lists::update_list,
        handlers::lists::delete_list,
        handlers::tasks::list_tasks,
        handlers::tasks::create_task,
        handlers::tasks::get_task,
        handlers::tasks::update_task,
        handlers::tasks::delete_task,
        handlers::tasks::add_step,
        handlers::tasks::update_step,
        handlers::tasks::delete_step,
        handlers::tasks::add_label,
        handlers::tasks::delete_label,
        handlers::tasks::add_comment,
        handlers::tasks::delete_comment,
        handlers::tasks::add_file,
        handlers::chat::list_rooms,
        handlers::chat::create_room,
        handlers::chat::get_room,
        handlers::chat::join_room,
        handlers::chat::list_messages,
        handlers::chat::send_message,
        handlers::notifications::list_notifications,
        handlers::notifications::create_notification,
        handlers::notifications::mark_all_read,
        handlers::notifications::mark_read,
        handlers::notifications::delete_notification,
        handlers::realtime::websocket,
    ),
    components(
        schemas(
            models::HealthResponse,
            models::ErrorResponse,
            models::UserProfile,
            models::RegisterRequest,
            models::LoginRequest,
            models::AuthResponse,
            models::UpdateProfileRequest,
            models::UserSearchQuery,
            models::UserList,
            models::FilterQuery,
            models::ProjectRole,
            models::ProjectMember,
            models::Project,
            models::ProjectList,
            models::CreateProjectRequest,
            models::UpdateProjectRequest,
            models::AddMemberRequest,
            models::TaskList,
            models::TaskListCollection,
            models::CreateListRequest,
            models::UpdateListRequest,
            models::TaskStatus,
            models::TaskPriority,
            models::Step,
            models::Label,
            models::Comment,
            models::Attachment,
            models::Task,
            models::TaskCollection,
            models::CreateTaskRequest,
            models::UpdateTaskRequest,
            models::AddStepRequest,
            models::UpdateStepRequest,
            models::AddLabelRequest,
            models::AddCommentRequest,
            models::AddFileRequest,
            models::RoomType,
            models::ChatRoomMember,
            models::ChatRoom,
            models::ChatRoomList,
            models::CreateRoomRequest,
            models::ChatMessage,
            models::ChatMessageList,
            models::SendMessageRequest,
            models::NotificationKind,
            models::Notification,
            models::NotificationList,
            models::NotificationQuery,
            models::CreateNotificationRequest,
            models::MarkAllReadResponse,
        )
    ),
    tags(
        (name = "auth", description = "Registration, login and user profile endpoints"),
        (name = "projects", description = "Project and membership management endpoints"),
        (name = "lists", description = "Task list endpoints"),
        (name = "tasks", description = "Task endpoints, including steps, labels, comments and files"),
        (name = "chat", description = "Chatroom and message endpoints"),
        (name = "notifications", description = "Notification endpoints"),
        (name = "realtime", description = "Websocket presence and chat relay"),
        (name = "system", description = "System health and info endpoints")
    )
)]
struct ApiDoc;

/// Fresh random secret for deployments that did not configure one.
/// Tokens signed with it stop validating after a restart.
pub fn random_secret() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

/// API server configuration
pub struct ApiServerConfig {
    /// Address to bind the API server
    pub bind_addr: SocketAddr,
    /// Enable CORS (for development)
    pub enable_cors: bool,
    /// Allowed CORS origins (if None, any localhost origin is allowed)
    pub cors_origins: Option<Vec<String>>,
    /// JWT secret for signing session tokens
    pub jwt_secret: String,
    /// Session token lifetime in hours
    pub token_hours: i64,
    /// Whether public registration is open
    pub allow_signup: bool,
    /// Directory with a pre-built web frontend to serve at `/`
    pub static_dir: Option<PathBuf>,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3080)),
            enable_cors: true,
            cors_origins: None,
            jwt_secret: random_secret(),
            token_hours: 24,
            allow_signup: true,
            static_dir: None,
        }
    }
}

/// API Server
pub struct ApiServer {
    config: ApiServerConfig,
    state: Arc<AppState>,
}

impl ApiServer {
    /// Create a new API server with its own realtime hub.
    ///
    /// Fails when `token_hours` is not a usable token lifetime.
    pub fn new(config: ApiServerConfig, db: DatabaseConnection) -> anyhow::Result<Self> {
        let token_validity = session_validity(config.token_hours)
            .with_context(|| format!("Invalid token lifetime: {} hours", config.token_hours))?;

        let state = Arc::new(AppState {
            db,
            hub: Arc::new(RealtimeHub::new()),
            jwt_secret: config.jwt_secret.clone(),
            token_validity,
            allow_signup: config.allow_signup,
        });

        Ok(Self { config, state })
    }

    /// Shared state (database handle, realtime hub)
    pub fn state(&self) -> Arc<AppState> {
        self.state.clone()
    }

    /// Build the router with all routes
    pub fn build_router(&self) -> Router {
        use handlers::{auth, chat, lists, notifications, projects, realtime, tasks};

        let api_doc = ApiDoc::openapi();

        let jwt_state = Arc::new(middleware::JwtState::new(
            self.config.jwt_secret.as_bytes(),
        ));

        // Build PUBLIC routes (no authentication required)
        let public_router = Router::new()
            .route("/api/health", get(handlers::health_check))
            .route("/api/auth/register", post(auth::register))
            .route("/api/auth/login", post(auth::login))
            .route("/api/auth/logout", post(auth::logout))
            .with_state(self.state.clone());

        // Build PROTECTED routes (require session token authentication)
        let protected_router = Router::new()
            .route(
                "/api/auth/me",
                get(auth::get_current_user).patch(auth::update_current_user),
            )
            .route("/api/auth/users/search", get(auth::search_users))
            .route(
                "/api/projects",
                get(projects::list_projects).post(projects::create_project),
            )
            .route(
                "/api/projects/{id}",
                get(projects::get_project)
                    .patch(projects::update_project)
                    .delete(projects::delete_project),
            )
            .route("/api/projects/{id}/members", post(projects::add_member))
            .route(
                "/api/projects/{id}/members/{user_id}",
                delete(projects::remove_member),
            )
            .route("/api/lists/project/{project_id}", get(lists::list_lists))
            .route("/api/lists", post(lists::create_list))
            .route(
                "/api/lists/{id}",
                get(lists::get_list)
                    .patch(lists::update_list)
                    .delete(lists::delete_list),
            )
            .route("/api/tasks/list/{list_id}", get(tasks::list_tasks))
            .route("/api/tasks", post(tasks::create_task))
            .route(
                "/api/tasks/{id}",
                get(tasks::get_task)
                    .patch(tasks::update_task)
                    .delete(tasks::delete_task),
            )
            .route("/api/tasks/{id}/steps", post(tasks::add_step))
            .route(
                "/api/tasks/{id}/steps/{step_id}",
                patch(tasks::update_step).delete(tasks::delete_step),
            )
            .route("/api/tasks/{id}/labels", post(tasks::add_label))
            .route(
                "/api/tasks/{id}/labels/{label_id}",
                delete(tasks::delete_label),
            )
            .route("/api/tasks/{id}/comments", post(tasks::add_comment))
            .route(
                "/api/tasks/{id}/comments/{comment_id}",
                delete(tasks::delete_comment),
            )
            .route("/api/tasks/{id}/files", post(tasks::add_file))
            .route(
                "/api/chat/project/{project_id}/rooms",
                get(chat::list_rooms),
            )
            .route("/api/chat/rooms", post(chat::create_room))
            .route("/api/chat/rooms/{id}", get(chat::get_room))
            .route("/api/chat/rooms/{id}/join", post(chat::join_room))
            .route(
                "/api/chat/rooms/{id}/messages",
                get(chat::list_messages).post(chat::send_message),
            )
            .route(
                "/api/notifications",
                get(notifications::list_notifications).post(notifications::create_notification),
            )
            .route(
                "/api/notifications/read-all",
                patch(notifications::mark_all_read),
            )
            .route(
                "/api/notifications/{id}/read",
                patch(notifications::mark_read),
            )
            .route(
                "/api/notifications/{id}",
                delete(notifications::delete_notification),
            )
            .route("/api/ws", get(realtime::websocket))
            .with_state(self.state.clone())
            .layer(axum_middleware::from_fn_with_state(
                jwt_state,
                middleware::require_auth,
            ));

        let api_router = public_router.merge(protected_router);

        // SwaggerUi automatically creates a route for /api/openapi.json
        let mut router = Router::new()
            .merge(SwaggerUi::new("/swagger-ui").url("/api/openapi.json", api_doc))
            .merge(api_router);

        // Serve the web frontend, falling back to index.html for client-side routes
        if let Some(dir) = &self.config.static_dir {
            let index = dir.join("index.html");
            router = router.fallback_service(ServeDir::new(dir).fallback(ServeFile::new(index)));
        }

        let mut router = router.layer(TraceLayer::new_for_http());

        if self.config.enable_cors {
            router = router.layer(self.cors_layer());
        }

        router
    }

    fn cors_layer(&self) -> CorsLayer {
        // Cookie auth needs credentials, which rules out a wildcard origin
        let allow_origin = match &self.config.cors_origins {
            Some(origins) => AllowOrigin::list(origins.iter().filter_map(|o| {
                HeaderValue::from_str(o)
                    .map_err(|_| warn!("Ignoring invalid CORS origin '{}'", o))
                    .ok()
            })),
            None => AllowOrigin::predicate(|origin: &HeaderValue, _| {
                let origin_str = origin.to_str().unwrap_or("");
                origin_str.starts_with("http://localhost:")
                    || origin_str.starts_with("http://127.0.0.1:")
                    || origin_str.starts_with("https://localhost:")
                    || origin_str.starts_with("https://127.0.0.1:")
            }),
        };

        CorsLayer::new()
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::PATCH,
            ])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::COOKIE])
            .allow_credentials(true)
            .allow_origin(allow_origin)
    }

    /// Start the API server and run until Ctrl-C
    pub async fn start(self) -> Result<(), anyhow::Error> {
        self.start_with_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Start the API server and run until `shutdown` resolves
    pub async fn start_with_shutdown<F>(self, shutdown: F) -> Result<(), anyhow::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let router = self.build_router();

        info!("Starting API server on {}", self.config.bind_addr);
        info!(
            "OpenAPI spec: http://{}/api/openapi.json",
            self.config.bind_addr
        );
        info!("Swagger UI: http://{}/swagger-ui", self.config.bind_addr);
        if let Some(dir) = &self.config.static_dir {
            info!("Serving web frontend from {}", dir.display());
        }

        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

        info!("API server stopped");
        Ok(())
    }
}
