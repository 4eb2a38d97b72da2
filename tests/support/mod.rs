#![allow(dead_code)]

use std::num::NonZeroUsize;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, Response, header},
};
use sqlx::Error as SqlxError;
use tempfile::TempDir;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tower::ServiceExt;

use yatube::application::accounts::{AccountService, LoginOutcome, hash_password};
use yatube::application::comments::CommentService;
use yatube::application::feed::FeedService;
use yatube::application::follows::FollowService;
use yatube::application::forms::LoginSubmission;
use yatube::application::posts::PostService;
use yatube::application::repos::{
    CommentsRepo, CreateCommentParams, CreateGroupParams, CreatePostParams, CreateSessionParams,
    CreateUserParams, FollowsRepo, GroupsRepo, PostFilter, PostsRepo, RepoError, SessionsRepo,
    UpdatePostParams, UsersRepo,
};
use yatube::domain::entities::{
    CommentEntry, CommentRecord, FollowRecord, GroupRecord, PostEntry, PostRecord, SessionRecord,
    UserRecord,
};
use yatube::infra::cache::PageCache;
use yatube::infra::http::{DatabaseHealth, HttpOptions, HttpState, build_router};
use yatube::infra::uploads::MediaStorage;

pub const PASSWORD: &str = "correct-horse-42";
pub const CSRF_TOKEN: &str = "0123456789abcdef0123456789abcdef";

/// 1x1 GIF.
pub const SMALL_GIF: &[u8] = &[
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x21, 0xf9,
    0x04, 0x01, 0x0a, 0x00, 0x01, 0x00, 0x2c, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x01, 0x00,
    0x00, 0x02, 0x02, 0x4c, 0x01, 0x00, 0x3b,
];

#[derive(Default)]
struct Tables {
    next_id: i64,
    users: Vec<UserRecord>,
    groups: Vec<GroupRecord>,
    posts: Vec<PostRecord>,
    comments: Vec<CommentRecord>,
    follows: Vec<FollowRecord>,
    sessions: Vec<SessionRecord>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn entry(&self, post: &PostRecord) -> PostEntry {
        PostEntry {
            post: post.clone(),
            author: post
                .author_id
                .and_then(|id| self.users.iter().find(|user| user.id == id))
                .map(UserRecord::to_ref),
            group: post
                .group_id
                .and_then(|id| self.groups.iter().find(|group| group.id == id))
                .map(GroupRecord::to_ref),
        }
    }

    fn matches(&self, post: &PostRecord, filter: PostFilter) -> bool {
        match filter {
            PostFilter::All => true,
            PostFilter::Group(group_id) => post.group_id == Some(group_id),
            PostFilter::Author(author_id) => post.author_id == Some(author_id),
            PostFilter::FollowedBy(user_id) => self.follows.iter().any(|follow| {
                follow.user_id == user_id && Some(follow.author_id) == post.author_id
            }),
        }
    }
}

/// Repository double that keeps every table in memory and mirrors the
/// cascade rules of the Postgres schema.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub async fn add_user(&self, username: &str) -> UserRecord {
        self.create_user(CreateUserParams {
            username: username.to_string(),
            email: format!("{username}@example.com"),
            first_name: String::new(),
            last_name: String::new(),
            password_hash: password_hash().to_string(),
        })
        .await
        .expect("user created")
    }

    pub async fn add_group(&self, title: &str, slug: &str) -> GroupRecord {
        self.create_group(CreateGroupParams {
            title: title.to_string(),
            slug: slug.to_string(),
            description: "Тестовое описание".to_string(),
        })
        .await
        .expect("group created")
    }

    pub async fn add_post(&self, author: &UserRecord, text: &str, group: Option<&GroupRecord>) -> PostRecord {
        self.create_post(CreatePostParams {
            author_id: author.id,
            text: text.to_string(),
            group_id: group.map(|group| group.id),
            image: None,
        })
        .await
        .expect("post created")
    }

    pub async fn posts(&self) -> Vec<PostRecord> {
        self.tables.lock().await.posts.clone()
    }

    pub async fn post(&self, id: i64) -> Option<PostRecord> {
        self.tables
            .lock()
            .await
            .posts
            .iter()
            .find(|post| post.id == id)
            .cloned()
    }

    pub async fn remove_post(&self, id: i64) {
        assert!(self.delete_post(id).await.expect("delete"), "post {id} existed");
    }

    pub async fn comments(&self) -> Vec<CommentRecord> {
        self.tables.lock().await.comments.clone()
    }

    pub async fn follows(&self) -> Vec<FollowRecord> {
        self.tables.lock().await.follows.clone()
    }

    pub async fn find_user(&self, username: &str) -> Option<UserRecord> {
        self.find_by_username(username).await.expect("lookup")
    }
}

fn password_hash() -> &'static str {
    static HASH: OnceLock<String> = OnceLock::new();
    HASH.get_or_init(|| hash_password(PASSWORD).expect("password hashed"))
}

fn duplicate(constraint: &str) -> RepoError {
    RepoError::Duplicate {
        constraint: constraint.to_string(),
    }
}

#[async_trait]
impl UsersRepo for MemoryStore {
    async fn create_user(&self, params: CreateUserParams) -> Result<UserRecord, RepoError> {
        let mut tables = self.tables.lock().await;
        if tables.users.iter().any(|user| user.username == params.username) {
            return Err(duplicate("users_username_key"));
        }
        let user = UserRecord {
            id: tables.next_id(),
            username: params.username,
            email: params.email,
            first_name: params.first_name,
            last_name: params.last_name,
            password_hash: params.password_hash,
            joined_at: OffsetDateTime::now_utc(),
        };
        tables.users.push(user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<UserRecord>, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables.users.iter().find(|user| user.id == id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .users
            .iter()
            .find(|user| user.username == username)
            .cloned())
    }

    async fn delete_user(&self, id: i64) -> Result<bool, RepoError> {
        let mut tables = self.tables.lock().await;
        let before = tables.users.len();
        tables.users.retain(|user| user.id != id);
        if tables.users.len() == before {
            return Ok(false);
        }

        let authored: Vec<i64> = tables
            .posts
            .iter()
            .filter(|post| post.author_id == Some(id))
            .map(|post| post.id)
            .collect();
        tables.sessions.retain(|session| session.user_id != id);
        tables
            .follows
            .retain(|follow| follow.user_id != id && follow.author_id != id);
        tables.comments.retain(|comment| {
            comment.author_id != Some(id)
                && !comment.post_id.is_some_and(|post_id| authored.contains(&post_id))
        });
        tables.posts.retain(|post| post.author_id != Some(id));
        Ok(true)
    }
}

#[async_trait]
impl GroupsRepo for MemoryStore {
    async fn list_groups(&self) -> Result<Vec<GroupRecord>, RepoError> {
        let mut groups = self.tables.lock().await.groups.clone();
        groups.sort_by(|a, b| a.title.cmp(&b.title).then(a.id.cmp(&b.id)));
        Ok(groups)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<GroupRecord>, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables.groups.iter().find(|group| group.id == id).cloned())
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<GroupRecord>, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables.groups.iter().find(|group| group.slug == slug).cloned())
    }

    async fn create_group(&self, params: CreateGroupParams) -> Result<GroupRecord, RepoError> {
        let mut tables = self.tables.lock().await;
        if tables.groups.iter().any(|group| group.title == params.title) {
            return Err(duplicate("groups_title_key"));
        }
        if tables.groups.iter().any(|group| group.slug == params.slug) {
            return Err(duplicate("groups_slug_key"));
        }
        let group = GroupRecord {
            id: tables.next_id(),
            title: params.title,
            slug: params.slug,
            description: params.description,
        };
        tables.groups.push(group.clone());
        Ok(group)
    }

    async fn delete_group(&self, id: i64) -> Result<bool, RepoError> {
        let mut tables = self.tables.lock().await;
        for post in tables.posts.iter_mut().filter(|post| post.group_id == Some(id)) {
            post.group_id = None;
        }
        let before = tables.groups.len();
        tables.groups.retain(|group| group.id != id);
        Ok(tables.groups.len() != before)
    }
}

#[async_trait]
impl PostsRepo for MemoryStore {
    async fn count_posts(&self, filter: PostFilter) -> Result<u64, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .posts
            .iter()
            .filter(|post| tables.matches(post, filter))
            .count() as u64)
    }

    async fn list_posts(
        &self,
        filter: PostFilter,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<PostEntry>, RepoError> {
        let tables = self.tables.lock().await;
        let mut posts: Vec<&PostRecord> = tables
            .posts
            .iter()
            .filter(|post| tables.matches(post, filter))
            .collect();
        posts.sort_by(|a, b| b.pub_date.cmp(&a.pub_date).then(b.id.cmp(&a.id)));
        Ok(posts
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .map(|post| tables.entry(post))
            .collect())
    }

    async fn find_post(&self, id: i64) -> Result<Option<PostEntry>, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .posts
            .iter()
            .find(|post| post.id == id)
            .map(|post| tables.entry(post)))
    }

    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError> {
        let mut tables = self.tables.lock().await;
        let post = PostRecord {
            id: tables.next_id(),
            text: params.text,
            pub_date: OffsetDateTime::now_utc(),
            author_id: Some(params.author_id),
            group_id: params.group_id,
            image: params.image,
        };
        tables.posts.push(post.clone());
        Ok(post)
    }

    async fn update_post(&self, params: UpdatePostParams) -> Result<PostRecord, RepoError> {
        let mut tables = self.tables.lock().await;
        let post = tables
            .posts
            .iter_mut()
            .find(|post| post.id == params.id)
            .ok_or(RepoError::NotFound)?;
        post.text = params.text;
        post.group_id = params.group_id;
        post.image = params.image;
        Ok(post.clone())
    }

    async fn delete_post(&self, id: i64) -> Result<bool, RepoError> {
        let mut tables = self.tables.lock().await;
        tables.comments.retain(|comment| comment.post_id != Some(id));
        let before = tables.posts.len();
        tables.posts.retain(|post| post.id != id);
        Ok(tables.posts.len() != before)
    }
}

#[async_trait]
impl CommentsRepo for MemoryStore {
    async fn list_for_post(&self, post_id: i64) -> Result<Vec<CommentEntry>, RepoError> {
        let tables = self.tables.lock().await;
        let mut comments: Vec<CommentEntry> = tables
            .comments
            .iter()
            .filter(|comment| comment.post_id == Some(post_id))
            .map(|comment| CommentEntry {
                comment: comment.clone(),
                author: comment
                    .author_id
                    .and_then(|id| tables.users.iter().find(|user| user.id == id))
                    .map(UserRecord::to_ref),
            })
            .collect();
        comments.sort_by(|a, b| {
            b.comment
                .created
                .cmp(&a.comment.created)
                .then(b.comment.id.cmp(&a.comment.id))
        });
        Ok(comments)
    }

    async fn create_comment(
        &self,
        params: CreateCommentParams,
    ) -> Result<CommentRecord, RepoError> {
        let mut tables = self.tables.lock().await;
        let comment = CommentRecord {
            id: tables.next_id(),
            post_id: Some(params.post_id),
            author_id: Some(params.author_id),
            text: params.text,
            created: OffsetDateTime::now_utc(),
        };
        tables.comments.push(comment.clone());
        Ok(comment)
    }
}

#[async_trait]
impl FollowsRepo for MemoryStore {
    async fn is_following(&self, user_id: i64, author_id: i64) -> Result<bool, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .follows
            .iter()
            .any(|follow| follow.user_id == user_id && follow.author_id == author_id))
    }

    async fn create_follow(&self, user_id: i64, author_id: i64) -> Result<bool, RepoError> {
        let mut tables = self.tables.lock().await;
        if tables
            .follows
            .iter()
            .any(|follow| follow.user_id == user_id && follow.author_id == author_id)
        {
            return Ok(false);
        }
        let id = tables.next_id();
        tables.follows.push(FollowRecord {
            id,
            user_id,
            author_id,
        });
        Ok(true)
    }

    async fn delete_follows(&self, user_id: i64, author_id: i64) -> Result<u64, RepoError> {
        let mut tables = self.tables.lock().await;
        let before = tables.follows.len();
        tables
            .follows
            .retain(|follow| !(follow.user_id == user_id && follow.author_id == author_id));
        Ok((before - tables.follows.len()) as u64)
    }
}

#[async_trait]
impl SessionsRepo for MemoryStore {
    async fn create_session(
        &self,
        params: CreateSessionParams,
    ) -> Result<SessionRecord, RepoError> {
        let mut tables = self.tables.lock().await;
        let session = SessionRecord {
            id: tables.next_id(),
            user_id: params.user_id,
            prefix: params.prefix,
            hashed_secret: params.hashed_secret,
            created_at: OffsetDateTime::now_utc(),
            expires_at: params.expires_at,
        };
        tables.sessions.push(session.clone());
        Ok(session)
    }

    async fn find_by_prefix(&self, prefix: &str) -> Result<Option<SessionRecord>, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .sessions
            .iter()
            .find(|session| session.prefix == prefix)
            .cloned())
    }

    async fn delete_session(&self, id: i64) -> Result<(), RepoError> {
        self.tables
            .lock()
            .await
            .sessions
            .retain(|session| session.id != id);
        Ok(())
    }

    async fn delete_expired(&self, now: OffsetDateTime) -> Result<u64, RepoError> {
        let mut tables = self.tables.lock().await;
        let before = tables.sessions.len();
        tables.sessions.retain(|session| session.expires_at > now);
        Ok((before - tables.sessions.len()) as u64)
    }
}

#[async_trait]
impl DatabaseHealth for MemoryStore {
    async fn health_check(&self) -> Result<(), SqlxError> {
        Ok(())
    }
}

/// A router wired to an in-memory store, plus handles to inspect it.
pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub cache: Arc<PageCache>,
    pub accounts: Arc<AccountService>,
    pub media: Arc<MediaStorage>,
    _media_dir: TempDir,
}

/// Index cache sized like the default configuration.
pub fn index_cache(ttl: Duration) -> PageCache {
    PageCache::new(ttl, NonZeroUsize::new(64).expect("non-zero capacity"))
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_options(index_cache(Duration::from_secs(20)), false)
    }

    pub fn with_options(cache: PageCache, invalidate_cache_on_write: bool) -> Self {
        let store = Arc::new(MemoryStore::default());
        let media_dir = tempfile::tempdir().expect("temp media dir");
        let media = Arc::new(MediaStorage::new(media_dir.path().to_path_buf()).expect("media"));
        let cache = Arc::new(cache);
        let accounts = Arc::new(AccountService::new(
            store.clone(),
            store.clone(),
            Duration::from_secs(3600),
        ));

        let state = HttpState {
            feed: Arc::new(FeedService::new(
                store.clone(),
                store.clone(),
                store.clone(),
                store.clone(),
                10,
            )),
            posts: Arc::new(PostService::new(
                store.clone(),
                store.clone(),
                store.clone(),
                media.clone(),
            )),
            comments: Arc::new(CommentService::new(store.clone(), store.clone())),
            follows: Arc::new(FollowService::new(store.clone(), store.clone())),
            accounts: accounts.clone(),
            page_cache: cache.clone(),
            media: media.clone(),
            db: store.clone(),
            options: HttpOptions {
                invalidate_cache_on_write,
                secure_cookies: false,
                max_request_bytes: 10 * 1024 * 1024,
            },
        };

        Self {
            router: build_router(state),
            store,
            cache,
            accounts,
            media,
            _media_dir: media_dir,
        }
    }

    /// Cookie header of a signed-in session for `username`.
    pub async fn session_cookie(&self, username: &str) -> String {
        let outcome = self
            .accounts
            .login(LoginSubmission {
                username: username.to_string(),
                password: PASSWORD.to_string(),
            })
            .await
            .expect("login");
        match outcome {
            LoginOutcome::LoggedIn { session, .. } => {
                format!("sessionid={}; csrftoken={CSRF_TOKEN}", session.token)
            }
            LoginOutcome::Rejected(errors) => panic!("login rejected: {errors:?}"),
        }
    }

    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> Response<Body> {
        let mut builder = Request::get(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::empty()).expect("request")).await
    }

    pub async fn post_form(
        &self,
        uri: &str,
        cookie: Option<&str>,
        fields: &[(&str, &str)],
    ) -> Response<Body> {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(fields)
            .finish();
        let mut builder = Request::post(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::from(body)).expect("request"))
            .await
    }

    pub async fn post_multipart(
        &self,
        uri: &str,
        cookie: Option<&str>,
        fields: &[(&str, &str)],
        file: Option<(&str, &[u8])>,
    ) -> Response<Body> {
        const BOUNDARY: &str = "yatube-test-boundary";
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        if let Some((filename, data)) = file {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        let mut builder = Request::post(uri).header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        );
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::from(body)).expect("request"))
            .await
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible")
    }
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body collected");
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}

pub fn location(response: &Response<Body>) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
}
