//! Operator-side group management, driven from the command line.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::application::repos::{CreateGroupParams, GroupsRepo, RepoError};
use crate::domain::entities::GroupRecord;
use crate::domain::error::DomainError;
use crate::domain::posts::validate_group_title;
use crate::domain::slug::{derive_slug, validate_slug};

#[derive(Debug, Error)]
pub enum GroupError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("a group with this {field} already exists")]
    Duplicate { field: &'static str },
    #[error(transparent)]
    Repo(RepoError),
}

impl From<RepoError> for GroupError {
    fn from(error: RepoError) -> Self {
        match error {
            RepoError::Duplicate { constraint } if constraint.contains("slug") => {
                GroupError::Duplicate { field: "slug" }
            }
            RepoError::Duplicate { constraint } if constraint.contains("title") => {
                GroupError::Duplicate { field: "title" }
            }
            other => GroupError::Repo(other),
        }
    }
}

#[derive(Clone)]
pub struct GroupService {
    groups: Arc<dyn GroupsRepo>,
}

impl GroupService {
    pub fn new(groups: Arc<dyn GroupsRepo>) -> Self {
        Self { groups }
    }

    pub async fn create(
        &self,
        title: &str,
        slug: Option<&str>,
        description: &str,
    ) -> Result<GroupRecord, GroupError> {
        let title = validate_group_title(title)?;
        let slug = match slug {
            Some(slug) => validate_slug(slug)?,
            None => derive_slug(&title)?,
        };

        let group = self
            .groups
            .create_group(CreateGroupParams {
                title,
                slug,
                description: description.trim().to_string(),
            })
            .await?;
        info!(
            target = "yatube::groups",
            group_id = group.id,
            slug = %group.slug,
            "group created"
        );
        Ok(group)
    }

    /// Delete the group with `slug`; its posts stay without a group.
    pub async fn delete(&self, slug: &str) -> Result<bool, GroupError> {
        let Some(group) = self.groups.find_by_slug(slug).await? else {
            return Ok(false);
        };
        let deleted = self.groups.delete_group(group.id).await?;
        info!(target = "yatube::groups", slug, deleted, "group deleted");
        Ok(deleted)
    }
}
