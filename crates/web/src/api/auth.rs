//! Login endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::warn;

use dirauth_core::errors::AuthError;
use dirauth_core::models::ResolvedIdentity;

use crate::api::status::AppError;
use crate::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
struct LoginResponse {
    identity: ResolvedIdentity,
}

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/auth/login", post(login))
}

/// Map a resolver failure to a response. Unknown users and bad passwords
/// share one message so the endpoint does not reveal which accounts exist.
impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials | AuthError::UserNotFound(_) => {
                AppError::Unauthorized("invalid username or password".into())
            }
            AuthError::AccessDenied(_) => AppError::Forbidden("access denied".into()),
            AuthError::ConnectionError(_)
            | AuthError::DirectoryDisabled
            | AuthError::LocalAuthUnavailable(_) => {
                AppError::Unavailable("authentication service unavailable".into())
            }
            AuthError::ServiceBindError { .. } | AuthError::AmbiguousUser { .. } => {
                AppError::Internal("authentication service misconfigured".into())
            }
        }
    }
}

async fn login(
    State(state): State<Arc<AppState>>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let username = body.username.trim();
    if username.is_empty() {
        return Err(AppError::BadRequest("username is required".into()));
    }

    let result = state.resolver.authenticate(username, &body.password).await;

    let audit = match &result {
        Ok(identity) => state.db.insert_auth_event(
            "login",
            username,
            Some(identity.source),
            true,
            None,
            Some(&format!("role={}", identity.role)),
        ),
        Err(e) => state
            .db
            .insert_auth_event("login", username, None, false, Some(e.kind()), None),
    };
    if let Err(e) = audit {
        warn!(username, error = %e, "failed to write auth audit entry");
    }

    let identity = result?;
    Ok(Json(LoginResponse { identity }))
}
