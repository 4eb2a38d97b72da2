//! Follow edges between readers and authors.
//!
//! Following yourself is refused here; duplicate edges are refused both here
//! and by the storage's unique `(user_id, author_id)` constraint.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::application::error::HttpError;
use crate::application::repos::{FollowsRepo, RepoError, UsersRepo};
use crate::domain::entities::UserRecord;

#[derive(Debug, Error)]
pub enum FollowError {
    #[error(transparent)]
    Repo(#[from] RepoError),
}

impl From<FollowError> for HttpError {
    fn from(error: FollowError) -> Self {
        match error {
            FollowError::Repo(err) => HttpError::from(err),
        }
    }
}

#[derive(Debug)]
pub enum FollowOutcome {
    AuthorMissing,
    Followed { author: UserRecord },
    /// The author is the viewer or already followed; nothing changed.
    Unchanged { author: UserRecord },
}

#[derive(Debug)]
pub enum UnfollowOutcome {
    AuthorMissing,
    SelfTarget { author: UserRecord },
    Unfollowed { author: UserRecord, removed: u64 },
}

#[derive(Clone)]
pub struct FollowService {
    users: Arc<dyn UsersRepo>,
    follows: Arc<dyn FollowsRepo>,
}

impl FollowService {
    pub fn new(users: Arc<dyn UsersRepo>, follows: Arc<dyn FollowsRepo>) -> Self {
        Self { users, follows }
    }

    pub async fn follow(
        &self,
        viewer: &UserRecord,
        username: &str,
    ) -> Result<FollowOutcome, FollowError> {
        let Some(author) = self.users.find_by_username(username).await? else {
            return Ok(FollowOutcome::AuthorMissing);
        };
        if author.id == viewer.id || self.follows.is_following(viewer.id, author.id).await? {
            return Ok(FollowOutcome::Unchanged { author });
        }

        // A concurrent request may have inserted the edge since the check.
        if !self.follows.create_follow(viewer.id, author.id).await? {
            return Ok(FollowOutcome::Unchanged { author });
        }
        info!(
            target = "yatube::follows",
            user = %viewer.username,
            author = %author.username,
            "follow created"
        );
        Ok(FollowOutcome::Followed { author })
    }

    pub async fn unfollow(
        &self,
        viewer: &UserRecord,
        username: &str,
    ) -> Result<UnfollowOutcome, FollowError> {
        let Some(author) = self.users.find_by_username(username).await? else {
            return Ok(UnfollowOutcome::AuthorMissing);
        };
        if author.id == viewer.id {
            return Ok(UnfollowOutcome::SelfTarget { author });
        }

        let removed = self.follows.delete_follows(viewer.id, author.id).await?;
        info!(
            target = "yatube::follows",
            user = %viewer.username,
            author = %author.username,
            removed,
            "follow removed"
        );
        Ok(UnfollowOutcome::Unfollowed { author, removed })
    }
}
