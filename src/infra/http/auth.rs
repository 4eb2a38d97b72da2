//! Signup, login and logout pages.

use axum::{
    Form,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use tracing::info;

use crate::application::{
    accounts::{IssuedSession, LoginOutcome, SignupOutcome},
    error::HttpError,
    forms::{LoginSubmission, SignupSubmission},
};
use crate::presentation::views::{
    LayoutContext, LoggedOutTemplate, LoginContent, LoginTemplate, SignupContent, SignupTemplate,
    render_csrf_failure_response, render_template_response, signup_errors,
};

use super::csrf;
use super::middleware::{SESSION_COOKIE, Visitor};
use super::public::HttpState;
use super::safe_next;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct SignupForm {
    first_name: String,
    last_name: String,
    username: String,
    email: String,
    password1: String,
    password2: String,
    csrfmiddlewaretoken: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct LoginForm {
    username: String,
    password: String,
    next: Option<String>,
    csrfmiddlewaretoken: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct NextQuery {
    next: Option<String>,
}

pub(super) async fn signup_form(visitor: Visitor) -> Response {
    let view = LayoutContext::new(visitor.chrome(), SignupContent::default());
    render_template_response(SignupTemplate { view }, StatusCode::OK)
}

pub(super) async fn signup_submit(
    State(state): State<HttpState>,
    visitor: Visitor,
    jar: CookieJar,
    Form(form): Form<SignupForm>,
) -> Result<Response, HttpError> {
    if let Err(reason) = csrf::verify(&visitor.csrf_token, form.csrfmiddlewaretoken.as_deref()) {
        return Ok(render_csrf_failure_response(visitor.chrome(), reason));
    }

    let submission = SignupSubmission {
        first_name: form.first_name.clone(),
        last_name: form.last_name.clone(),
        username: form.username.clone(),
        email: form.email.clone(),
        password1: form.password1,
        password2: form.password2,
    };
    match state.accounts.signup(submission).await? {
        SignupOutcome::SignedUp { user, session } => {
            info!(target = "yatube::http::auth", user = %user.username, "user signed up");
            let jar = jar.add(session_cookie(&session, state.options.secure_cookies));
            Ok((jar, Redirect::to("/")).into_response())
        }
        SignupOutcome::Rejected(errors) => {
            let content = SignupContent {
                first_name: form.first_name,
                last_name: form.last_name,
                username: form.username,
                email: form.email,
                errors: signup_errors(&errors),
            };
            let view = LayoutContext::new(visitor.chrome(), content);
            Ok(render_template_response(SignupTemplate { view }, StatusCode::OK))
        }
    }
}

pub(super) async fn login_form(visitor: Visitor, Query(query): Query<NextQuery>) -> Response {
    let content = LoginContent {
        next: safe_next(query.next.as_deref()).unwrap_or_default().to_string(),
        ..LoginContent::default()
    };
    let view = LayoutContext::new(visitor.chrome(), content);
    render_template_response(LoginTemplate { view }, StatusCode::OK)
}

pub(super) async fn login_submit(
    State(state): State<HttpState>,
    visitor: Visitor,
    jar: CookieJar,
    Query(query): Query<NextQuery>,
    Form(form): Form<LoginForm>,
) -> Result<Response, HttpError> {
    if let Err(reason) = csrf::verify(&visitor.csrf_token, form.csrfmiddlewaretoken.as_deref()) {
        return Ok(render_csrf_failure_response(visitor.chrome(), reason));
    }

    let next = safe_next(form.next.as_deref().or(query.next.as_deref()))
        .unwrap_or_default()
        .to_string();
    let submission = LoginSubmission {
        username: form.username.clone(),
        password: form.password,
    };
    match state.accounts.login(submission).await? {
        LoginOutcome::LoggedIn { user, session } => {
            info!(target = "yatube::http::auth", user = %user.username, "user logged in");
            let jar = jar.add(session_cookie(&session, state.options.secure_cookies));
            let target = if next.is_empty() { "/" } else { next.as_str() };
            Ok((jar, Redirect::to(target)).into_response())
        }
        LoginOutcome::Rejected(errors) => {
            let mut messages = errors.non_field();
            messages.extend(errors.field("username"));
            messages.extend(errors.field("password"));
            let content = LoginContent {
                username: form.username,
                next,
                errors: messages,
            };
            let view = LayoutContext::new(visitor.chrome(), content);
            Ok(render_template_response(LoginTemplate { view }, StatusCode::OK))
        }
    }
}

pub(super) async fn logout(
    State(state): State<HttpState>,
    visitor: Visitor,
    jar: CookieJar,
) -> Result<Response, HttpError> {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        state.accounts.logout(cookie.value()).await?;
    }
    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));

    let mut chrome = visitor.chrome();
    chrome.viewer = None;
    let view = LayoutContext::new(chrome, ());
    Ok((jar, render_template_response(LoggedOutTemplate { view }, StatusCode::OK)).into_response())
}

fn session_cookie(session: &IssuedSession, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, session.token.clone()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .expires(session.expires_at)
        .build()
}
