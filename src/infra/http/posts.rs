//! Handlers behind the login gate: writing posts, comments and follows.

use axum::{
    Form,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::Multipart;
use axum_extra::extract::multipart::MultipartError;
use serde::Deserialize;

use crate::application::{
    comments::CommentOutcome,
    error::HttpError,
    follows::{FollowOutcome, UnfollowOutcome},
    forms::{CommentSubmission, ImageUpload, PostSubmission},
    pagination::PageQuery,
    posts::{EditAccess, PostWriteOutcome},
};
use crate::presentation::views::{
    FollowContent, FollowTemplate, LayoutContext, PostFormContent, PostFormTemplate,
    render_csrf_failure_response, render_listing, render_not_found_response,
    render_template_response,
};

use super::csrf::{self, CSRF_FIELD};
use super::middleware::{CurrentUser, Visitor};
use super::public::{HttpState, parse_post_id, render_profile};

const SOURCE: &str = "infra::http::posts";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct CommentForm {
    text: String,
    csrfmiddlewaretoken: Option<String>,
}

struct PostFormPayload {
    submission: PostSubmission,
    csrf_token: Option<String>,
}

pub(super) async fn create_form(
    State(state): State<HttpState>,
    visitor: Visitor,
) -> Result<Response, HttpError> {
    let form = state.posts.new_form().await?;
    Ok(render_form(&visitor, form))
}

pub(super) async fn create_submit(
    State(state): State<HttpState>,
    visitor: Visitor,
    CurrentUser(user): CurrentUser,
    multipart: Multipart,
) -> Result<Response, HttpError> {
    let payload = read_post_form(multipart).await?;
    if let Err(reason) = csrf::verify(&visitor.csrf_token, payload.csrf_token.as_deref()) {
        return Ok(render_csrf_failure_response(visitor.chrome(), reason));
    }

    match state.posts.create(&user, payload.submission).await? {
        PostWriteOutcome::Saved(_) => {
            state.invalidate_after_write().await;
            Ok(Redirect::to(&format!("/profile/{}/", user.username)).into_response())
        }
        PostWriteOutcome::Invalid(form) => Ok(render_form(&visitor, form)),
    }
}

pub(super) async fn edit_form(
    State(state): State<HttpState>,
    visitor: Visitor,
    CurrentUser(user): CurrentUser,
    Path(raw_id): Path<String>,
) -> Result<Response, HttpError> {
    let Some(id) = parse_post_id(&raw_id) else {
        return Ok(render_not_found_response(visitor.chrome(), &visitor.path));
    };

    match state.posts.edit_access(id, &user).await? {
        EditAccess::Missing => Ok(render_not_found_response(visitor.chrome(), &visitor.path)),
        EditAccess::Denied { post_id } => Ok(redirect_to_post(post_id)),
        EditAccess::Allowed(entry) => {
            let form = state.posts.edit_form(&entry).await?;
            Ok(render_form(&visitor, form))
        }
    }
}

pub(super) async fn edit_submit(
    State(state): State<HttpState>,
    visitor: Visitor,
    CurrentUser(user): CurrentUser,
    Path(raw_id): Path<String>,
    multipart: Multipart,
) -> Result<Response, HttpError> {
    let payload = read_post_form(multipart).await?;
    if let Err(reason) = csrf::verify(&visitor.csrf_token, payload.csrf_token.as_deref()) {
        return Ok(render_csrf_failure_response(visitor.chrome(), reason));
    }
    let Some(id) = parse_post_id(&raw_id) else {
        return Ok(render_not_found_response(visitor.chrome(), &visitor.path));
    };

    let entry = match state.posts.edit_access(id, &user).await? {
        EditAccess::Missing => {
            return Ok(render_not_found_response(visitor.chrome(), &visitor.path));
        }
        EditAccess::Denied { post_id } => return Ok(redirect_to_post(post_id)),
        EditAccess::Allowed(entry) => entry,
    };

    match state.posts.update(&entry, &user, payload.submission).await? {
        PostWriteOutcome::Saved(post) => {
            state.invalidate_after_write().await;
            Ok(redirect_to_post(post.id))
        }
        PostWriteOutcome::Invalid(form) => Ok(render_form(&visitor, form)),
    }
}

pub(super) async fn add_comment(
    State(state): State<HttpState>,
    visitor: Visitor,
    CurrentUser(user): CurrentUser,
    Path(raw_id): Path<String>,
    Form(form): Form<CommentForm>,
) -> Result<Response, HttpError> {
    if let Err(reason) = csrf::verify(&visitor.csrf_token, form.csrfmiddlewaretoken.as_deref()) {
        return Ok(render_csrf_failure_response(visitor.chrome(), reason));
    }
    let Some(id) = parse_post_id(&raw_id) else {
        return Ok(render_not_found_response(visitor.chrome(), &visitor.path));
    };

    let submission = CommentSubmission { text: form.text };
    match state.comments.add(&user, id, submission).await? {
        CommentOutcome::PostMissing => {
            Ok(render_not_found_response(visitor.chrome(), &visitor.path))
        }
        CommentOutcome::Added(_) | CommentOutcome::Rejected(_) => Ok(redirect_to_post(id)),
    }
}

pub(super) async fn follow_index(
    State(state): State<HttpState>,
    visitor: Visitor,
    CurrentUser(user): CurrentUser,
    Query(query): Query<PageQuery>,
) -> Result<Response, HttpError> {
    let listing = state.feed.following(&user, query.page.as_deref()).await?;
    let content = FollowContent {
        listing_html: render_listing(listing)?,
    };
    let view = LayoutContext::new(visitor.chrome(), content);
    Ok(render_template_response(FollowTemplate { view }, StatusCode::OK))
}

pub(super) async fn profile_follow(
    State(state): State<HttpState>,
    visitor: Visitor,
    CurrentUser(user): CurrentUser,
    Path(username): Path<String>,
) -> Result<Response, HttpError> {
    match state.follows.follow(&user, &username).await? {
        FollowOutcome::AuthorMissing => {
            Ok(render_not_found_response(visitor.chrome(), &visitor.path))
        }
        FollowOutcome::Followed { .. } => Ok(Redirect::to("/follow/").into_response()),
        FollowOutcome::Unchanged { author } => {
            render_profile(&state, &visitor, &author.username, None).await
        }
    }
}

pub(super) async fn profile_unfollow(
    State(state): State<HttpState>,
    visitor: Visitor,
    CurrentUser(user): CurrentUser,
    Path(username): Path<String>,
) -> Result<Response, HttpError> {
    match state.follows.unfollow(&user, &username).await? {
        UnfollowOutcome::AuthorMissing => {
            Ok(render_not_found_response(visitor.chrome(), &visitor.path))
        }
        UnfollowOutcome::SelfTarget { author } => {
            Ok(Redirect::to(&format!("/profile/{}/", author.username)).into_response())
        }
        UnfollowOutcome::Unfollowed { .. } => Ok(Redirect::to("/").into_response()),
    }
}

fn render_form(visitor: &Visitor, form: PostFormContent) -> Response {
    let view = LayoutContext::new(visitor.chrome(), form);
    render_template_response(PostFormTemplate { view }, StatusCode::OK)
}

fn redirect_to_post(id: i64) -> Response {
    Redirect::to(&format!("/posts/{id}/")).into_response()
}

async fn read_post_form(mut multipart: Multipart) -> Result<PostFormPayload, HttpError> {
    let mut submission = PostSubmission::default();
    let mut csrf_token = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("text") => submission.text = field.text().await.map_err(multipart_error)?,
            Some("group") => submission.group = field.text().await.map_err(multipart_error)?,
            Some("image-clear") => {
                let value = field.text().await.map_err(multipart_error)?;
                submission.clear_image =
                    matches!(value.trim().to_ascii_lowercase().as_str(), "on" | "true" | "1");
            }
            Some("image") => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(multipart_error)?;
                if !filename.trim().is_empty() || !bytes.is_empty() {
                    submission.image = Some(ImageUpload { filename, bytes });
                }
            }
            Some(CSRF_FIELD) => csrf_token = Some(field.text().await.map_err(multipart_error)?),
            _ => {}
        }
    }

    Ok(PostFormPayload {
        submission,
        csrf_token,
    })
}

fn multipart_error(err: MultipartError) -> HttpError {
    let status = err.status();
    HttpError::from_error(SOURCE, status, "Invalid form submission", &err)
}
