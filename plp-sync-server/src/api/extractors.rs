//! Custom Axum extractors for request authentication.

use argon2::{Argon2, PasswordHash, PasswordVerifier};
use axum::{
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use plp_sync_sdk::objects::ADMIN_AUTH_HEADER;

use crate::state::AppState;

/// Proof that the request carried the admin secret.
///
/// # Header format
///
/// ```text
/// Plp-Admin-Authorization: {plaintext_admin_secret}
/// ```
///
/// The value is verified against the argon2 hash from the config file.
pub struct AdminAuth;

#[derive(Debug)]
pub enum AdminAuthError {
    MissingHeader,
    InvalidHeader,
    Rejected,
    /// The stored hash could not be parsed.
    Misconfigured,
}

impl IntoResponse for AdminAuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AdminAuthError::MissingHeader => (
                StatusCode::UNAUTHORIZED,
                "missing Plp-Admin-Authorization header",
            ),
            AdminAuthError::InvalidHeader => (
                StatusCode::BAD_REQUEST,
                "invalid Plp-Admin-Authorization header",
            ),
            AdminAuthError::Rejected => (StatusCode::UNAUTHORIZED, "invalid admin secret"),
            AdminAuthError::Misconfigured => {
                tracing::error!("Admin secret hash in config is not a valid argon2 hash");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
            }
        };
        (status, message).into_response()
    }
}

impl FromRequestParts<AppState> for AdminAuth {
    type Rejection = AdminAuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let secret = parts
            .headers
            .get(ADMIN_AUTH_HEADER)
            .ok_or(AdminAuthError::MissingHeader)?
            .to_str()
            .map_err(|_| AdminAuthError::InvalidHeader)?;

        let admin = state.admin.read().await;
        let hash =
            PasswordHash::new(&admin.secret_hash).map_err(|_| AdminAuthError::Misconfigured)?;
        Argon2::default()
            .verify_password(secret.as_bytes(), &hash)
            .map_err(|_| {
                tracing::warn!("Admin request with a wrong secret");
                AdminAuthError::Rejected
            })?;
        Ok(AdminAuth)
    }
}
