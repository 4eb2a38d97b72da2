use std::sync::Arc;

use thiserror::Error;

use crate::application::error::HttpError;
use crate::application::pagination::{Page, PageWindow, Paginator};
use crate::application::repos::{FollowsRepo, GroupsRepo, PostFilter, PostsRepo, RepoError, UsersRepo};
use crate::domain::entities::{GroupRecord, PostEntry, UserRecord};
use crate::presentation::views::{AuthorLink, ListingView};

#[derive(Debug, Error)]
pub enum FeedError {
    #[error(transparent)]
    Repo(#[from] RepoError),
}

impl From<FeedError> for HttpError {
    fn from(error: FeedError) -> Self {
        match error {
            FeedError::Repo(err) => HttpError::from(err),
        }
    }
}

pub struct GroupFeed {
    pub group: GroupRecord,
    pub listing: ListingView,
}

pub struct ProfileFeed {
    pub author: AuthorLink,
    pub post_count: u64,
    /// Whether the viewer currently follows this author.
    pub following: bool,
    /// The viewer is signed in and is not the author.
    pub can_follow: bool,
    pub listing: ListingView,
}

/// Read side of the site: every paginated post listing.
#[derive(Clone)]
pub struct FeedService {
    posts: Arc<dyn PostsRepo>,
    groups: Arc<dyn GroupsRepo>,
    users: Arc<dyn UsersRepo>,
    follows: Arc<dyn FollowsRepo>,
    paginator: Paginator,
}

impl FeedService {
    pub fn new(
        posts: Arc<dyn PostsRepo>,
        groups: Arc<dyn GroupsRepo>,
        users: Arc<dyn UsersRepo>,
        follows: Arc<dyn FollowsRepo>,
        page_size: u64,
    ) -> Self {
        Self {
            posts,
            groups,
            users,
            follows,
            paginator: Paginator::new(page_size),
        }
    }

    /// Resolve an untrusted `?page=` value against the whole collection.
    pub async fn index_window(&self, page: Option<&str>) -> Result<PageWindow, FeedError> {
        let total = self.posts.count_posts(PostFilter::All).await?;
        Ok(self.paginator.window(page, total))
    }

    pub async fn index(&self, window: PageWindow) -> Result<ListingView, FeedError> {
        let page = self.fetch_page(PostFilter::All, window).await?;
        Ok(ListingView::from_page(page, true))
    }

    pub async fn group(
        &self,
        slug: &str,
        page: Option<&str>,
    ) -> Result<Option<GroupFeed>, FeedError> {
        let Some(group) = self.groups.find_by_slug(slug).await? else {
            return Ok(None);
        };
        let page = self.load_page(PostFilter::Group(group.id), page).await?;
        Ok(Some(GroupFeed {
            group,
            listing: ListingView::from_page(page, false),
        }))
    }

    pub async fn profile(
        &self,
        username: &str,
        viewer: Option<&UserRecord>,
        page: Option<&str>,
    ) -> Result<Option<ProfileFeed>, FeedError> {
        let Some(author) = self.users.find_by_username(username).await? else {
            return Ok(None);
        };

        let page = self.load_page(PostFilter::Author(author.id), page).await?;
        let (following, can_follow) = match viewer {
            Some(viewer) if viewer.id != author.id => {
                (self.follows.is_following(viewer.id, author.id).await?, true)
            }
            _ => (false, false),
        };

        Ok(Some(ProfileFeed {
            author: AuthorLink::from(&author.to_ref()),
            post_count: page.total_count,
            following,
            can_follow,
            listing: ListingView::from_page(page, true),
        }))
    }

    /// Posts by authors `viewer` follows. Each post appears once no matter
    /// how many edges point at its author.
    pub async fn following(
        &self,
        viewer: &UserRecord,
        page: Option<&str>,
    ) -> Result<ListingView, FeedError> {
        let page = self
            .load_page(PostFilter::FollowedBy(viewer.id), page)
            .await?;
        Ok(ListingView::from_page(page, true))
    }

    async fn load_page(
        &self,
        filter: PostFilter,
        requested: Option<&str>,
    ) -> Result<Page<PostEntry>, FeedError> {
        let total = self.posts.count_posts(filter).await?;
        self.fetch_page(filter, self.paginator.window(requested, total))
            .await
    }

    async fn fetch_page(
        &self,
        filter: PostFilter,
        window: PageWindow,
    ) -> Result<Page<PostEntry>, FeedError> {
        let items = if window.total_count == 0 {
            Vec::new()
        } else {
            self.posts
                .list_posts(filter, window.offset, window.limit)
                .await?
        };
        Ok(window.into_page(items))
    }
}
