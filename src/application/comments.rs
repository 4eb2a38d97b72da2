use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::application::error::HttpError;
use crate::application::forms::{CommentSubmission, FormErrors};
use crate::application::repos::{CommentsRepo, CreateCommentParams, PostsRepo, RepoError};
use crate::domain::entities::{CommentRecord, UserRecord};
use crate::domain::posts::validate_body;

#[derive(Debug, Error)]
pub enum CommentError {
    #[error(transparent)]
    Repo(#[from] RepoError),
}

impl From<CommentError> for HttpError {
    fn from(error: CommentError) -> Self {
        match error {
            CommentError::Repo(err) => HttpError::from(err),
        }
    }
}

#[derive(Debug)]
pub enum CommentOutcome {
    PostMissing,
    Added(CommentRecord),
    /// Invalid text; nothing was stored.
    Rejected(FormErrors),
}

#[derive(Clone)]
pub struct CommentService {
    posts: Arc<dyn PostsRepo>,
    comments: Arc<dyn CommentsRepo>,
}

impl CommentService {
    pub fn new(posts: Arc<dyn PostsRepo>, comments: Arc<dyn CommentsRepo>) -> Self {
        Self { posts, comments }
    }

    pub async fn add(
        &self,
        author: &UserRecord,
        post_id: i64,
        submission: CommentSubmission,
    ) -> Result<CommentOutcome, CommentError> {
        if self.posts.find_post(post_id).await?.is_none() {
            return Ok(CommentOutcome::PostMissing);
        }

        let text = match validate_body("text", &submission.text) {
            Ok(text) => text,
            Err(err) => {
                let mut errors = FormErrors::default();
                errors.add_domain(&err);
                return Ok(CommentOutcome::Rejected(errors));
            }
        };

        let comment = self
            .comments
            .create_comment(CreateCommentParams {
                post_id,
                author_id: author.id,
                text,
            })
            .await?;
        info!(
            target = "yatube::comments",
            post_id,
            comment_id = comment.id,
            author = %author.username,
            "comment added"
        );
        Ok(CommentOutcome::Added(comment))
    }
}
