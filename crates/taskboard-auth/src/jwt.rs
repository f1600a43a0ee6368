//! Session tokens (HS256 JWT)

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Issuer stamped on every token this service signs
pub const TOKEN_ISSUER: &str = "taskboard-api";

/// `token_type` value of browser/API session tokens
pub const SESSION_TOKEN_TYPE: &str = "session";

/// Claims carried by a session token
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JwtClaims {
    /// Subject (user ID)
    pub sub: String,
    /// Issued at (timestamp)
    pub iat: i64,
    /// Expiration time (timestamp)
    pub exp: i64,
    /// Issuer
    pub iss: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// "session" for login tokens
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

impl JwtClaims {
    pub fn new(subject: String, issuer: String, validity: Duration) -> Self {
        let now = Utc::now();
        let exp = now.checked_add_signed(validity).unwrap_or(DateTime::<Utc>::MAX_UTC);

        Self {
            sub: subject,
            iat: now.timestamp(),
            exp: exp.timestamp(),
            iss: issuer,
            user_id: None,
            email: None,
            name: None,
            token_type: None,
        }
    }

    /// Session token for a logged-in user
    pub fn session(user_id: String, email: String, name: String, validity: Duration) -> Self {
        Self::new(user_id.clone(), TOKEN_ISSUER.to_string(), validity)
            .with_user_id(user_id)
            .with_email(email)
            .with_name(name)
            .with_token_type(SESSION_TOKEN_TYPE.to_string())
    }

    pub fn with_user_id(mut self, user_id: String) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_email(mut self, email: String) -> Self {
        self.email = Some(email);
        self
    }

    pub fn with_name(mut self, name: String) -> Self {
        self.name = Some(name);
        self
    }

    pub fn with_token_type(mut self, token_type: String) -> Self {
        self.token_type = Some(token_type);
        self
    }

    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() > self.exp
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(self.exp, 0).unwrap_or_else(Utc::now)
    }
}

/// JWT errors
#[derive(Debug, Error)]
pub enum JwtError {
    #[error("JWT encoding error: {0}")]
    EncodingError(#[from] jsonwebtoken::errors::Error),

    #[error("Token expired")]
    TokenExpired,

    #[error("Token validity of {0} hours is out of range")]
    ValidityOutOfRange(i64),
}

/// Convert a configured lifetime in hours into a token validity window.
///
/// The lifetime must be positive and the resulting expiry must be a
/// representable timestamp.
pub fn session_validity(hours: i64) -> Result<Duration, JwtError> {
    Duration::try_hours(hours)
        .filter(|validity| hours > 0 && Utc::now().checked_add_signed(*validity).is_some())
        .ok_or(JwtError::ValidityOutOfRange(hours))
}

/// Validates HS256 session tokens signed with the server secret.
///
/// Checks the signature and expiration only; audience and not-before are
/// not used by this service.
pub struct JwtValidator {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtValidator {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.validate_aud = false;
        validation.validate_nbf = false;
        // zero leeway so that tokens with an exp in the past are rejected immediately
        validation.leeway = 0;

        Self {
            decoding_key: DecodingKey::from_secret(secret),
            validation,
        }
    }

    pub fn with_issuer(mut self, issuer: &str) -> Self {
        self.validation.set_issuer(&[issuer]);
        self
    }

    pub fn validate(&self, token: &str) -> Result<JwtClaims, JwtError> {
        let token_data = decode::<JwtClaims>(token, &self.decoding_key, &self.validation)?;

        if token_data.claims.is_expired() {
            return Err(JwtError::TokenExpired);
        }

        Ok(token_data.claims)
    }

    pub fn encode(secret: &[u8], claims: &JwtClaims) -> Result<String, JwtError> {
        let header = Header::new(Algorithm::HS256);
        let encoding_key = EncodingKey::from_secret(secret);

        Ok(encode(&header, claims, &encoding_key)?)
    }
}
