//! HTTP surface: router, per-request middleware and page handlers.

mod auth;
mod csrf;
mod middleware;
mod posts;
mod public;

pub use middleware::{CurrentUser, SESSION_COOKIE, Visitor};
pub use csrf::CSRF_COOKIE;
pub use public::{HttpOptions, HttpState, build_router};

use async_trait::async_trait;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use sqlx::Error as SqlxError;

use crate::application::error::ErrorReport;
use crate::infra::db::PostgresRepositories;

/// Liveness probe for the backing database.
#[async_trait]
pub trait DatabaseHealth: Send + Sync {
    async fn health_check(&self) -> Result<(), SqlxError>;
}

#[async_trait]
impl DatabaseHealth for PostgresRepositories {
    async fn health_check(&self) -> Result<(), SqlxError> {
        PostgresRepositories::health_check(self).await
    }
}

fn db_health_response(result: Result<(), SqlxError>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_error(
                "infra::http::db_health",
                StatusCode::SERVICE_UNAVAILABLE,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}

/// `/auth/login/?next=<target>` with the target percent-encoded except for
/// path separators.
pub fn login_redirect_url(target: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(target.as_bytes()).collect();
    format!("/auth/login/?next={}", encoded.replace("%2F", "/"))
}

fn redirect_to_login(target: &str) -> Response {
    Redirect::to(&login_redirect_url(target)).into_response()
}

/// Accept `next` only when it points back into this site.
fn safe_next(next: Option<&str>) -> Option<&str> {
    next.map(str::trim).filter(|next| {
        next.starts_with('/')
            && !next.starts_with("//")
            && !next.contains('\\')
            && !next.chars().any(char::is_control)
    })
}
