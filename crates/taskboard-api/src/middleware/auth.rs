//! JWT Authentication Middleware
//!
//! Extracts the session token from the `session_token` cookie, the
//! `Authorization: Bearer` header or (for websocket upgrades, where browsers
//! cannot set headers) the `token` query parameter, validates it and makes
//! the user context available to handlers via Axum's Extension.

use axum::{
    extract::Request,
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use taskboard_auth::{JwtValidator, SESSION_TOKEN_TYPE, TOKEN_ISSUER};
use uuid::Uuid;

use crate::models::ErrorResponse;

/// Name of the cookie carrying the session token
pub const SESSION_COOKIE: &str = "session_token";

/// Authenticated user context extracted from JWT
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    /// User ID
    pub user_id: Uuid,
    /// Email at the time the token was issued
    pub email: Option<String>,
    /// Token type (always "session")
    pub token_type: String,
}

/// JWT validation state shared across middleware instances
#[derive(Clone)]
pub struct JwtState {
    pub validator: Arc<JwtValidator>,
}

impl JwtState {
    /// Create new JWT state with the given secret
    pub fn new(secret: &[u8]) -> Self {
        Self {
            validator: Arc::new(JwtValidator::new(secret).with_issuer(TOKEN_ISSUER)),
        }
    }
}

fn unauthorized(error: impl Into<String>, code: &str) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse {
            error: error.into(),
            code: Some(code.to_string()),
        }),
    )
}

fn cookie_token(request: &Request) -> Option<String> {
    let cookies = request.headers().get(header::COOKIE)?.to_str().ok()?;
    let prefix = format!("{}=", SESSION_COOKIE);

    cookies
        .split(';')
        .map(|c| c.trim())
        .find_map(|c| c.strip_prefix(prefix.as_str()))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

fn query_token(request: &Request) -> Option<String> {
    request
        .uri()
        .query()?
        .split('&')
        .find_map(|pair| pair.strip_prefix("token="))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Authentication middleware that validates JWT session tokens
///
/// # Errors
/// Returns 401 Unauthorized if:
/// - No token is present in cookie, Authorization header or query string
/// - Token is malformed, has a bad signature or is expired
/// - Token type is not "session"
/// - Token carries no valid `user_id`
pub async fn require_auth(
    state: axum::extract::State<Arc<JwtState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, (StatusCode, Json<ErrorResponse>)> {
    // Cookie first (web app), then Authorization header (API clients),
    // then ?token= (websocket handshake)
    let token = match cookie_token(&request) {
        Some(t) => t,
        None => match request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
        {
            Some(auth_header) => auth_header
                .strip_prefix("Bearer ")
                .ok_or_else(|| {
                    unauthorized(
                        "Invalid Authorization header format. Expected 'Bearer <token>'",
                        "INVALID_AUTH_FORMAT",
                    )
                })?
                .to_string(),
            None => query_token(&request).ok_or_else(|| {
                unauthorized(
                    "Missing authentication token (cookie or Authorization header)",
                    "MISSING_AUTH",
                )
            })?,
        },
    };

    let claims = state
        .validator
        .validate(&token)
        .map_err(|e| unauthorized(format!("Invalid or expired token: {}", e), "INVALID_TOKEN"))?;

    let token_type = match claims.token_type {
        Some(token_type) if token_type == SESSION_TOKEN_TYPE => token_type,
        Some(token_type) => {
            return Err(unauthorized(
                format!(
                    "Invalid token type '{}'. Expected 'session' token for API access",
                    token_type
                ),
                "INVALID_TOKEN_TYPE",
            ));
        }
        None => {
            return Err(unauthorized(
                "Token missing 'token_type' claim",
                "MISSING_TOKEN_TYPE",
            ));
        }
    };

    let user_id = claims
        .user_id
        .ok_or_else(|| unauthorized("Token missing 'user_id' claim", "MISSING_USER_ID"))?;
    let user_id = Uuid::parse_str(&user_id)
        .map_err(|_| unauthorized("Token 'user_id' claim is not a UUID", "INVALID_USER_ID"))?;

    request.extensions_mut().insert(AuthUser {
        user_id,
        email: claims.email,
        token_type,
    });

    Ok(next.run(request).await)
}
