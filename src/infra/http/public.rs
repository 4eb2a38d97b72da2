use std::{io::ErrorKind, sync::Arc};

use axum::{
    Router,
    body::Body,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{
        HeaderValue, Request, StatusCode,
        header::{CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE},
    },
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use bytes::Bytes;
use tracing::error;

use crate::{
    application::{
        accounts::AccountService,
        comments::CommentService,
        error::HttpError,
        feed::FeedService,
        follows::FollowService,
        pagination::PageQuery,
        posts::PostService,
    },
    infra::{
        cache::{PageCache, index_page_key},
        uploads::{MediaStorage, MediaStorageError},
    },
    presentation::views::{
        AboutAuthorTemplate, AboutTechTemplate, GroupContent, GroupTemplate, GroupView,
        IndexContent, IndexTemplate, LayoutContext, PostDetailTemplate, ProfileContent,
        ProfileTemplate, render_listing, render_not_found_response, render_template_response,
    },
};

use super::{
    DatabaseHealth, auth, db_health_response,
    middleware::{Visitor, log_responses, require_login, resolve_visitor, set_request_context},
    posts,
};

#[derive(Clone)]
pub struct HttpState {
    pub feed: Arc<FeedService>,
    pub posts: Arc<PostService>,
    pub comments: Arc<CommentService>,
    pub follows: Arc<FollowService>,
    pub accounts: Arc<AccountService>,
    pub page_cache: Arc<PageCache>,
    pub media: Arc<MediaStorage>,
    pub db: Arc<dyn DatabaseHealth>,
    pub options: HttpOptions,
}

/// Request-handling switches taken from settings.
#[derive(Debug, Clone)]
pub struct HttpOptions {
    pub invalidate_cache_on_write: bool,
    pub secure_cookies: bool,
    pub max_request_bytes: usize,
}

impl HttpState {
    /// Drop cached index pages after a write, when configured to.
    pub(super) async fn invalidate_after_write(&self) {
        if self.options.invalidate_cache_on_write {
            self.page_cache.clear().await;
        }
    }
}

pub fn build_router(state: HttpState) -> Router {
    let protected = Router::new()
        .route("/create/", get(posts::create_form).post(posts::create_submit))
        .route(
            "/posts/{id}/edit/",
            get(posts::edit_form).post(posts::edit_submit),
        )
        .route("/posts/{id}/comment/", post(posts::add_comment))
        .route("/follow/", get(posts::follow_index))
        .route("/profile/{username}/follow/", get(posts::profile_follow))
        .route("/profile/{username}/unfollow/", get(posts::profile_unfollow))
        .route_layer(middleware::from_fn(require_login));

    let public = Router::new()
        .route("/", get(index))
        .route("/group/{slug}/", get(group_posts))
        .route("/profile/{username}/", get(profile))
        .route("/posts/{id}/", get(post_detail))
        .route("/about/author/", get(about_author))
        .route("/about/tech/", get(about_tech))
        .route(
            "/auth/signup/",
            get(auth::signup_form).post(auth::signup_submit),
        )
        .route(
            "/auth/login/",
            get(auth::login_form).post(auth::login_submit),
        )
        .route("/auth/logout/", get(auth::logout))
        .route("/media/{*path}", get(serve_media))
        .route("/_health/db", get(public_health))
        .fallback(fallback);

    let body_limit = state.options.max_request_bytes;
    public
        .merge(protected)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn_with_state(state.clone(), resolve_visitor))
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
        .with_state(state)
}

/// Post ids in paths are numeric; anything else names no post.
pub(super) fn parse_post_id(raw: &str) -> Option<i64> {
    raw.parse::<i64>().ok().filter(|id| *id > 0)
}

async fn index(
    State(state): State<HttpState>,
    visitor: Visitor,
    Query(query): Query<PageQuery>,
) -> Result<Response, HttpError> {
    let window = state.feed.index_window(query.page.as_deref()).await?;
    let key = index_page_key(window.number);
    let listing_html = match state.page_cache.get(&key).await {
        Some(html) => html.to_string(),
        None => {
            let listing = state.feed.index(window).await?;
            let html = render_listing(listing)?;
            state.page_cache.put(key, html.as_str()).await;
            html
        }
    };

    let view = LayoutContext::new(visitor.chrome(), IndexContent { listing_html });
    Ok(render_template_response(IndexTemplate { view }, StatusCode::OK))
}

async fn group_posts(
    State(state): State<HttpState>,
    visitor: Visitor,
    Path(slug): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Response, HttpError> {
    let Some(feed) = state.feed.group(&slug, query.page.as_deref()).await? else {
        return Ok(render_not_found_response(visitor.chrome(), &visitor.path));
    };

    let content = GroupContent {
        group: GroupView::from(&feed.group),
        listing_html: render_listing(feed.listing)?,
    };
    let view = LayoutContext::new(visitor.chrome(), content);
    Ok(render_template_response(GroupTemplate { view }, StatusCode::OK))
}

async fn profile(
    State(state): State<HttpState>,
    visitor: Visitor,
    Path(username): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Response, HttpError> {
    render_profile(&state, &visitor, &username, query.page.as_deref()).await
}

pub(super) async fn render_profile(
    state: &HttpState,
    visitor: &Visitor,
    username: &str,
    page: Option<&str>,
) -> Result<Response, HttpError> {
    let Some(feed) = state
        .feed
        .profile(username, visitor.user.as_ref(), page)
        .await?
    else {
        return Ok(render_not_found_response(visitor.chrome(), &visitor.path));
    };

    let content = ProfileContent {
        author: feed.author,
        post_count: feed.post_count,
        following: feed.following,
        can_follow: feed.can_follow,
        listing_html: render_listing(feed.listing)?,
    };
    let view = LayoutContext::new(visitor.chrome(), content);
    Ok(render_template_response(ProfileTemplate { view }, StatusCode::OK))
}

async fn post_detail(
    State(state): State<HttpState>,
    visitor: Visitor,
    Path(raw_id): Path<String>,
) -> Result<Response, HttpError> {
    let content = match parse_post_id(&raw_id) {
        Some(id) => state.posts.detail(id, visitor.user.as_ref()).await?,
        None => None,
    };
    let Some(content) = content else {
        return Ok(render_not_found_response(visitor.chrome(), &visitor.path));
    };

    let view = LayoutContext::new(visitor.chrome(), content);
    Ok(render_template_response(PostDetailTemplate { view }, StatusCode::OK))
}

async fn about_author(visitor: Visitor) -> Response {
    let view = LayoutContext::new(visitor.chrome(), ());
    render_template_response(AboutAuthorTemplate { view }, StatusCode::OK)
}

async fn about_tech(visitor: Visitor) -> Response {
    let view = LayoutContext::new(visitor.chrome(), ());
    render_template_response(AboutTechTemplate { view }, StatusCode::OK)
}

async fn serve_media(State(state): State<HttpState>, Path(path): Path<String>) -> Response {
    const SOURCE: &str = "infra::http::public::serve_media";

    match state.media.read(&path).await {
        Ok(bytes) => build_media_response(&path, bytes),
        Err(MediaStorageError::InvalidPath) => HttpError::new(
            SOURCE,
            StatusCode::NOT_FOUND,
            "File not found",
            "The requested file is not available",
        )
        .into_response(),
        Err(MediaStorageError::Io(err)) if err.kind() == ErrorKind::NotFound => HttpError::new(
            SOURCE,
            StatusCode::NOT_FOUND,
            "File not found",
            "The requested file is not available",
        )
        .into_response(),
        Err(err) => {
            error!(
                target = SOURCE,
                path = %path,
                error = %err,
                "failed to read stored media"
            );
            HttpError::internal(SOURCE, &err).into_response()
        }
    }
}

fn build_media_response(path: &str, bytes: Bytes) -> Response {
    let length = bytes.len();
    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = StatusCode::OK;

    let headers = response.headers_mut();
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    if let Ok(value) = HeaderValue::from_str(mime.as_ref()) {
        headers.insert(CONTENT_TYPE, value);
    }
    headers.insert(CONTENT_LENGTH, HeaderValue::from(length));
    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=31536000, immutable"),
    );

    response
}

async fn public_health(State(state): State<HttpState>) -> Response {
    db_health_response(state.db.health_check().await)
}

async fn fallback(visitor: Visitor, request: Request<Body>) -> Response {
    render_not_found_response(visitor.chrome(), request.uri().path())
}
