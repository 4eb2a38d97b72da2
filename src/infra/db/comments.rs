use async_trait::async_trait;
use time::OffsetDateTime;

use crate::application::repos::{CommentsRepo, CreateCommentParams, RepoError};
use crate::domain::entities::{CommentEntry, CommentRecord, UserRef, full_name};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct CommentRow {
    id: i64,
    post_id: Option<i64>,
    author_id: Option<i64>,
    text: String,
    created: OffsetDateTime,
}

impl From<CommentRow> for CommentRecord {
    fn from(row: CommentRow) -> Self {
        Self {
            id: row.id,
            post_id: row.post_id,
            author_id: row.author_id,
            text: row.text,
            created: row.created,
        }
    }
}

#[derive(sqlx::FromRow)]
struct CommentEntryRow {
    #[sqlx(flatten)]
    comment: CommentRow,
    author_username: Option<String>,
    author_first_name: Option<String>,
    author_last_name: Option<String>,
}

impl From<CommentEntryRow> for CommentEntry {
    fn from(row: CommentEntryRow) -> Self {
        let author = match (row.comment.author_id, row.author_username) {
            (Some(id), Some(username)) => Some(UserRef {
                id,
                username,
                full_name: full_name(
                    row.author_first_name.as_deref().unwrap_or_default(),
                    row.author_last_name.as_deref().unwrap_or_default(),
                ),
            }),
            _ => None,
        };

        CommentEntry {
            comment: row.comment.into(),
            author,
        }
    }
}

#[async_trait]
impl CommentsRepo for PostgresRepositories {
    async fn list_for_post(&self, post_id: i64) -> Result<Vec<CommentEntry>, RepoError> {
        let rows = sqlx::query_as::<_, CommentEntryRow>(
            "SELECT c.id, c.post_id, c.author_id, c.text, c.created, \
             u.username AS author_username, u.first_name AS author_first_name, \
             u.last_name AS author_last_name \
             FROM comments c \
             LEFT JOIN users u ON u.id = c.author_id \
             WHERE c.post_id = $1 \
             ORDER BY c.created DESC, c.id DESC",
        )
        .bind(post_id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(CommentEntry::from).collect())
    }

    async fn create_comment(
        &self,
        params: CreateCommentParams,
    ) -> Result<CommentRecord, RepoError> {
        let row = sqlx::query_as::<_, CommentRow>(
            "INSERT INTO comments (post_id, author_id, text, created) VALUES ($1, $2, $3, $4) \
             RETURNING id, post_id, author_id, text, created",
        )
        .bind(params.post_id)
        .bind(params.author_id)
        .bind(params.text)
        .bind(OffsetDateTime::now_utc())
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.into())
    }
}
