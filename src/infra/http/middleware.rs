use std::time::Instant;

use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{HeaderValue, Request, header::SET_COOKIE, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use tracing::{error, warn};
use uuid::Uuid;

use crate::application::error::{ErrorReport, HttpError};
use crate::domain::entities::UserRecord;
use crate::presentation::views::{LayoutChrome, ViewerView};

use super::csrf::{self, CSRF_COOKIE};
use super::public::HttpState;
use super::redirect_to_login;

pub const SESSION_COOKIE: &str = "sessionid";

const CSRF_COOKIE_MAX_AGE_DAYS: i64 = 365;

#[derive(Clone)]
pub struct RequestContext {
    pub request_id: String,
}

pub async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let ctx = RequestContext {
        request_id: request_id.clone(),
    };
    request.extensions_mut().insert(ctx.clone());

    let mut response = next.run(request).await;
    response.extensions_mut().insert(ctx);
    response
}

pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let request_id = request
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| ctx.request_id.clone())
        .unwrap_or_default();

    let mut response = next.run(request).await;
    let status = response.status();

    if status.is_client_error() || status.is_server_error() {
        let elapsed_ms = start.elapsed().as_millis();
        let report = response.extensions_mut().remove::<ErrorReport>();
        let (source, messages) = match report {
            Some(report) => (report.source, report.messages),
            None => ("unknown", Vec::new()),
        };
        let detail = messages
            .first()
            .cloned()
            .unwrap_or_else(|| "no diagnostic available".to_string());
        let user = response
            .extensions()
            .get::<VisitorName>()
            .map(|name| name.0.clone())
            .unwrap_or_default();

        if status.is_server_error() {
            error!(
                target = "yatube::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                query = uri.query().unwrap_or(""),
                elapsed_ms = elapsed_ms,
                source = source,
                detail = %detail,
                chain = ?messages,
                request_id = request_id,
                user = user,
                "request failed",
            );
        } else {
            warn!(
                target = "yatube::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                query = uri.query().unwrap_or(""),
                elapsed_ms = elapsed_ms,
                source = source,
                detail = %detail,
                chain = ?messages,
                request_id = request_id,
                user = user,
                "client request error",
            );
        }
    }

    response
}

/// Who is making the request, resolved once per request from cookies.
#[derive(Clone)]
pub struct Visitor {
    pub user: Option<UserRecord>,
    pub csrf_token: String,
    pub path: String,
}

impl Visitor {
    pub fn chrome(&self) -> LayoutChrome {
        LayoutChrome {
            viewer: self.user.as_ref().map(ViewerView::from_user),
            csrf_token: self.csrf_token.clone(),
            current_path: self.path.clone(),
        }
    }
}

/// Username echoed into response extensions for the response log.
#[derive(Clone)]
struct VisitorName(String);

impl<S: Send + Sync> FromRequestParts<S> for Visitor {
    type Rejection = HttpError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<Visitor>().cloned().ok_or_else(|| {
            HttpError::new(
                "infra::http::middleware::visitor",
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error",
                "visitor middleware is not installed",
            )
        })
    }
}

/// The signed-in user; anonymous requests are sent to the login page.
pub struct CurrentUser(pub UserRecord);

impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let visitor = Visitor::from_request_parts(parts, state)
            .await
            .map_err(IntoResponse::into_response)?;
        match visitor.user {
            Some(user) => Ok(CurrentUser(user)),
            None => Err(redirect_to_login(&request_target(parts.uri.path_and_query()))),
        }
    }
}

fn request_target(path_and_query: Option<&axum::http::uri::PathAndQuery>) -> String {
    path_and_query
        .map(|value| value.as_str().to_string())
        .unwrap_or_else(|| "/".to_string())
}

/// Resolve the session cookie and make sure every visitor holds a CSRF token.
pub async fn resolve_visitor(
    State(state): State<HttpState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let jar = CookieJar::from_headers(request.headers());

    let user = match jar.get(SESSION_COOKIE) {
        Some(cookie) => match state.accounts.authenticate(cookie.value()).await {
            Ok(user) => user,
            Err(err) => return HttpError::from(err).into_response(),
        },
        None => None,
    };

    let existing = jar
        .get(CSRF_COOKIE)
        .map(|cookie| cookie.value())
        .filter(|value| csrf::is_well_formed(value));
    let (csrf_token, issued) = match existing {
        Some(token) => (token.to_string(), false),
        None => (csrf::generate_token(), true),
    };

    let username = user.as_ref().map(|user| user.username.clone());
    let path = request.uri().path().to_string();
    request.extensions_mut().insert(Visitor {
        user,
        csrf_token: csrf_token.clone(),
        path,
    });

    let mut response = next.run(request).await;

    if issued {
        let cookie = Cookie::build((CSRF_COOKIE, csrf_token))
            .path("/")
            .same_site(SameSite::Lax)
            .secure(state.options.secure_cookies)
            .max_age(time::Duration::days(CSRF_COOKIE_MAX_AGE_DAYS))
            .build();
        match HeaderValue::from_str(&cookie.to_string()) {
            Ok(value) => {
                response.headers_mut().append(SET_COOKIE, value);
            }
            Err(err) => {
                error!(target = "yatube::http::csrf", error = %err, "invalid csrf cookie header");
            }
        }
    }
    if let Some(username) = username {
        response.extensions_mut().insert(VisitorName(username));
    }

    response
}

/// Gate for routes that need a signed-in user.
pub async fn require_login(request: Request<Body>, next: Next) -> Response {
    let signed_in = request
        .extensions()
        .get::<Visitor>()
        .is_some_and(|visitor| visitor.user.is_some());
    if signed_in {
        return next.run(request).await;
    }

    redirect_to_login(&request_target(request.uri().path_and_query()))
}
