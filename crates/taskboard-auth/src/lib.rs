//! Authentication primitives for the taskboard API
//!
//! - [`password`]: Argon2id hashing and the minimum password policy
//! - [`jwt`]: session tokens issued at login and checked by the API gate

pub mod jwt;
pub mod password;

pub use jwt::{
    session_validity, JwtClaims, JwtError, JwtValidator, SESSION_TOKEN_TYPE, TOKEN_ISSUER,
};
pub use password::{
    hash_password, validate_password_strength, verify_password, PasswordError,
    MIN_PASSWORD_LENGTH,
};
