//! Post detail, creation and author-only editing.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::application::error::HttpError;
use crate::application::forms::{
    FormErrors, INVALID_IMAGE_MESSAGE, PostSubmission, UNKNOWN_GROUP_MESSAGE,
};
use crate::application::repos::{
    CommentsRepo, CreatePostParams, GroupsRepo, PostFilter, PostsRepo, RepoError,
    UpdatePostParams,
};
use crate::domain::entities::{GroupRecord, PostEntry, PostRecord, UserRecord};
use crate::domain::posts::validate_body;
use crate::infra::uploads::{MediaStorage, MediaStorageError};
use crate::presentation::views::{
    CommentView, GroupOption, PostCard, PostDetailContent, PostFormContent, media_url,
};

pub const FILE_AND_CLEAR_MESSAGE: &str =
    "Пожалуйста, загрузите файл или поставьте флажок «Очистить», но не оба.";

#[derive(Debug, Error)]
pub enum PostError {
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error("failed to store image: {0}")]
    Media(#[source] MediaStorageError),
}

impl From<PostError> for HttpError {
    fn from(error: PostError) -> Self {
        match error {
            PostError::Repo(err) => HttpError::from(err),
            err @ PostError::Media(_) => HttpError::internal("application::posts", &err),
        }
    }
}

/// Outcome of a create or edit submission.
pub enum PostWriteOutcome {
    Saved(PostRecord),
    /// Nothing was persisted; the form must be shown again.
    Invalid(PostFormContent),
}

/// Whether `viewer` may edit the post.
#[derive(Debug)]
pub enum EditAccess {
    Missing,
    Denied { post_id: i64 },
    Allowed(PostEntry),
}

struct ValidPost {
    text: String,
    group_id: Option<i64>,
    image: ImageChange,
}

enum ImageChange {
    Keep,
    Clear,
    Replace { name: String, data: bytes::Bytes },
}

#[derive(Clone)]
pub struct PostService {
    posts: Arc<dyn PostsRepo>,
    groups: Arc<dyn GroupsRepo>,
    comments: Arc<dyn CommentsRepo>,
    media: Arc<MediaStorage>,
}

impl PostService {
    pub fn new(
        posts: Arc<dyn PostsRepo>,
        groups: Arc<dyn GroupsRepo>,
        comments: Arc<dyn CommentsRepo>,
        media: Arc<MediaStorage>,
    ) -> Self {
        Self {
            posts,
            groups,
            comments,
            media,
        }
    }

    pub async fn detail(
        &self,
        id: i64,
        viewer: Option<&UserRecord>,
    ) -> Result<Option<PostDetailContent>, PostError> {
        let Some(entry) = self.posts.find_post(id).await? else {
            return Ok(None);
        };

        let author_post_count = match entry.post.author_id {
            Some(author_id) => self.posts.count_posts(PostFilter::Author(author_id)).await?,
            None => 0,
        };
        let comments = self
            .comments
            .list_for_post(id)
            .await?
            .iter()
            .map(CommentView::from_entry)
            .collect();
        let can_edit = viewer.is_some_and(|viewer| entry.post.author_id == Some(viewer.id));

        Ok(Some(PostDetailContent {
            post: PostCard::from_entry(&entry),
            author_post_count,
            comments,
            can_edit,
        }))
    }

    /// Empty creation form.
    pub async fn new_form(&self) -> Result<PostFormContent, PostError> {
        let groups = self.groups.list_groups().await?;
        Ok(form_content(false, "/create/".to_string(), String::new(), &groups, None, None))
    }

    pub async fn edit_access(
        &self,
        id: i64,
        viewer: &UserRecord,
    ) -> Result<EditAccess, PostError> {
        match self.posts.find_post(id).await? {
            None => Ok(EditAccess::Missing),
            Some(entry) if entry.post.author_id != Some(viewer.id) => {
                Ok(EditAccess::Denied { post_id: id })
            }
            Some(entry) => Ok(EditAccess::Allowed(entry)),
        }
    }

    /// Edit form prefilled from the stored post.
    pub async fn edit_form(&self, entry: &PostEntry) -> Result<PostFormContent, PostError> {
        let groups = self.groups.list_groups().await?;
        Ok(form_content(
            true,
            format!("/posts/{}/edit/", entry.post.id),
            entry.post.text.clone(),
            &groups,
            entry.post.group_id,
            entry.post.image.as_deref(),
        ))
    }

    pub async fn create(
        &self,
        author: &UserRecord,
        submission: PostSubmission,
    ) -> Result<PostWriteOutcome, PostError> {
        let groups = self.groups.list_groups().await?;
        let valid = match validate_submission(&submission, &groups) {
            Ok(valid) => valid,
            Err(errors) => {
                let form = form_content(
                    false,
                    "/create/".to_string(),
                    submission.text,
                    &groups,
                    parse_group(&submission.group),
                    None,
                )
                .with_errors(&errors);
                return Ok(PostWriteOutcome::Invalid(form));
            }
        };

        let image = match valid.image {
            ImageChange::Replace { name, data } => Some(self.store_image(&name, data).await?),
            ImageChange::Keep | ImageChange::Clear => None,
        };

        let post = self
            .posts
            .create_post(CreatePostParams {
                author_id: author.id,
                text: valid.text,
                group_id: valid.group_id,
                image,
            })
            .await?;
        info!(
            target = "yatube::posts",
            post_id = post.id,
            author = %author.username,
            "post created"
        );
        Ok(PostWriteOutcome::Saved(post))
    }

    /// Apply an edit to a post obtained from [`EditAccess::Allowed`].
    pub async fn update(
        &self,
        entry: &PostEntry,
        editor: &UserRecord,
        submission: PostSubmission,
    ) -> Result<PostWriteOutcome, PostError> {
        if entry.post.author_id != Some(editor.id) {
            return Err(PostError::Repo(RepoError::Integrity {
                message: format!("user {} is not the author of post {}", editor.id, entry.post.id),
            }));
        }

        let groups = self.groups.list_groups().await?;
        let valid = match validate_submission(&submission, &groups) {
            Ok(valid) => valid,
            Err(errors) => {
                let form = form_content(
                    true,
                    format!("/posts/{}/edit/", entry.post.id),
                    submission.text,
                    &groups,
                    parse_group(&submission.group),
                    entry.post.image.as_deref(),
                )
                .with_errors(&errors);
                return Ok(PostWriteOutcome::Invalid(form));
            }
        };

        let image = match valid.image {
            ImageChange::Keep => entry.post.image.clone(),
            ImageChange::Clear => None,
            ImageChange::Replace { name, data } => Some(self.store_image(&name, data).await?),
        };

        let post = self
            .posts
            .update_post(UpdatePostParams {
                id: entry.post.id,
                text: valid.text,
                group_id: valid.group_id,
                image,
            })
            .await?;
        info!(target = "yatube::posts", post_id = post.id, "post updated");
        Ok(PostWriteOutcome::Saved(post))
    }

    async fn store_image(&self, name: &str, data: bytes::Bytes) -> Result<String, PostError> {
        self.media
            .store_post_image(name, data)
            .await
            .map(|stored| stored.stored_path)
            .map_err(PostError::Media)
    }
}

fn validate_submission(
    submission: &PostSubmission,
    groups: &[GroupRecord],
) -> Result<ValidPost, FormErrors> {
    let mut errors = FormErrors::default();

    let text = match validate_body("text", &submission.text) {
        Ok(text) => Some(text),
        Err(err) => {
            errors.add_domain(&err);
            None
        }
    };

    let raw_group = submission.group.trim();
    let group_id = if raw_group.is_empty() {
        None
    } else {
        match parse_group(raw_group) {
            Some(id) if groups.iter().any(|group| group.id == id) => Some(id),
            _ => {
                errors.add("group", UNKNOWN_GROUP_MESSAGE);
                None
            }
        }
    };

    let upload = submission
        .image
        .as_ref()
        .filter(|upload| !(upload.filename.is_empty() && upload.bytes.is_empty()));
    let image = match (upload, submission.clear_image) {
        (Some(_), true) => {
            errors.add("image", FILE_AND_CLEAR_MESSAGE);
            ImageChange::Keep
        }
        (Some(upload), false) => match MediaStorage::probe_image(&upload.bytes) {
            Ok(_) => ImageChange::Replace {
                name: upload.filename.clone(),
                data: upload.bytes.clone(),
            },
            Err(_) => {
                errors.add("image", INVALID_IMAGE_MESSAGE);
                ImageChange::Keep
            }
        },
        (None, true) => ImageChange::Clear,
        (None, false) => ImageChange::Keep,
    };

    let (Some(text), true) = (text, errors.is_empty()) else {
        return Err(errors);
    };
    Ok(ValidPost {
        text,
        group_id,
        image,
    })
}

fn parse_group(raw: &str) -> Option<i64> {
    raw.trim().parse().ok()
}

fn form_content(
    is_edit: bool,
    action: String,
    text: String,
    groups: &[GroupRecord],
    selected: Option<i64>,
    current_image: Option<&str>,
) -> PostFormContent {
    let options: Vec<GroupOption> = groups
        .iter()
        .map(|group| GroupOption {
            id: group.id,
            title: group.title.clone(),
            selected: Some(group.id) == selected,
        })
        .collect();
    let no_group_selected = !options.iter().any(|option| option.selected);

    PostFormContent {
        is_edit,
        action,
        text,
        groups: options,
        no_group_selected,
        current_image: current_image.map(media_url),
        text_errors: Vec::new(),
        group_errors: Vec::new(),
        image_errors: Vec::new(),
    }
}
