use crate::application::error::{ErrorReport, HttpError};
use crate::application::forms::FormErrors;
use crate::application::pagination::Page;
use crate::domain::entities::{CommentEntry, GroupRecord, PostEntry, UserRecord, UserRef};
use askama::{Error as AskamaError, Template};
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

const MONTHS_GENITIVE: [&str; 12] = [
    "января",
    "февраля",
    "марта",
    "апреля",
    "мая",
    "июня",
    "июля",
    "августа",
    "сентября",
    "октября",
    "ноября",
    "декабря",
];

#[derive(Debug, Error)]
#[error("{public_message}")]
pub struct TemplateRenderError {
    pub(crate) source: &'static str,
    pub(crate) public_message: &'static str,
    #[source]
    pub(crate) error: AskamaError,
}

impl TemplateRenderError {
    pub fn new(source: &'static str, public_message: &'static str, error: AskamaError) -> Self {
        Self {
            source,
            public_message,
            error,
        }
    }
}

impl From<TemplateRenderError> for HttpError {
    fn from(err: TemplateRenderError) -> Self {
        let TemplateRenderError {
            source,
            public_message,
            error,
        } = err;

        HttpError::from_error(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            public_message,
            &error,
        )
    }
}

pub fn render_template<T: Template>(template: T) -> Result<Html<String>, HttpError> {
    template.render().map(Html).map_err(|err| {
        TemplateRenderError::new(
            "presentation::views::render_template",
            "Template rendering failed",
            err,
        )
        .into()
    })
}

pub fn render_template_response<T: Template>(template: T, status: StatusCode) -> Response {
    match render_template(template) {
        Ok(html) => (status, html).into_response(),
        Err(err) => err.into_response(),
    }
}

/// Render the visitor-independent listing fragment shared by every feed page.
pub fn render_listing(listing: ListingView) -> Result<String, HttpError> {
    render_template(ListingTemplate { listing }).map(|Html(html)| html)
}

pub fn render_not_found_response(chrome: LayoutChrome, path: &str) -> Response {
    let view = LayoutContext::new(chrome, ErrorPageView::not_found(path));
    let mut response = render_template_response(NotFoundTemplate { view }, StatusCode::NOT_FOUND);
    ErrorReport::from_message(
        "presentation::views::render_not_found_response",
        StatusCode::NOT_FOUND,
        format!("no resource at `{path}`"),
    )
    .attach(&mut response);
    response
}

pub fn render_csrf_failure_response(chrome: LayoutChrome, reason: &'static str) -> Response {
    let view = LayoutContext::new(chrome, ErrorPageView::csrf_failure());
    let mut response = render_template_response(CsrfFailureTemplate { view }, StatusCode::FORBIDDEN);
    ErrorReport::from_message(
        "presentation::views::render_csrf_failure_response",
        StatusCode::FORBIDDEN,
        reason,
    )
    .attach(&mut response);
    response
}

/// Per-visitor page furniture rendered around every content block.
#[derive(Clone)]
pub struct LayoutChrome {
    pub viewer: Option<ViewerView>,
    pub csrf_token: String,
    pub current_path: String,
}

#[derive(Clone)]
pub struct ViewerView {
    pub username: String,
    pub display_name: String,
}

impl ViewerView {
    pub fn from_user(user: &UserRecord) -> Self {
        let reference = user.to_ref();
        Self {
            display_name: reference.display_name().to_string(),
            username: reference.username,
        }
    }
}

impl LayoutChrome {
    pub fn is_authenticated(&self) -> bool {
        self.viewer.is_some()
    }

    pub fn nav_class(&self, href: &str) -> &'static str {
        if self.current_path == href {
            "nav-link active"
        } else {
            "nav-link"
        }
    }
}

pub struct LayoutContext<T> {
    pub chrome: LayoutChrome,
    pub content: T,
}

impl<T> LayoutContext<T> {
    pub fn new(chrome: LayoutChrome, content: T) -> Self {
        Self { chrome, content }
    }
}

#[derive(Clone)]
pub struct AuthorLink {
    pub username: String,
    pub display_name: String,
}

impl From<&UserRef> for AuthorLink {
    fn from(user: &UserRef) -> Self {
        Self {
            username: user.username.clone(),
            display_name: user.display_name().to_string(),
        }
    }
}

#[derive(Clone)]
pub struct GroupLink {
    pub slug: String,
    pub title: String,
}

#[derive(Clone)]
pub struct PostCard {
    pub id: i64,
    pub text: String,
    pub published: String,
    pub iso_date: String,
    pub author: Option<AuthorLink>,
    pub group: Option<GroupLink>,
    pub image_url: Option<String>,
}

impl PostCard {
    pub fn from_entry(entry: &PostEntry) -> Self {
        Self {
            id: entry.post.id,
            text: entry.post.text.clone(),
            published: format_human_date(entry.post.pub_date),
            iso_date: format_iso(entry.post.pub_date),
            author: entry.author.as_ref().map(AuthorLink::from),
            group: entry.group.as_ref().map(|group| GroupLink {
                slug: group.slug.clone(),
                title: group.title.clone(),
            }),
            image_url: entry.post.image.as_deref().map(media_url),
        }
    }
}

#[derive(Clone)]
pub struct PageLink {
    pub number: u64,
    pub current: bool,
}

#[derive(Clone)]
pub struct PaginationView {
    pub number: u64,
    pub num_pages: u64,
    pub total_count: u64,
    pub previous: Option<u64>,
    pub next: Option<u64>,
    pub links: Vec<PageLink>,
}

impl PaginationView {
    pub fn is_paginated(&self) -> bool {
        self.num_pages > 1
    }
}

/// One page of post cards; the shared, cacheable part of every feed.
#[derive(Clone)]
pub struct ListingView {
    pub posts: Vec<PostCard>,
    pub pagination: PaginationView,
    pub show_group_links: bool,
}

impl ListingView {
    pub fn from_page(page: Page<PostEntry>, show_group_links: bool) -> Self {
        let pagination = PaginationView {
            number: page.number,
            num_pages: page.num_pages,
            total_count: page.total_count,
            previous: page.previous_page_number(),
            next: page.next_page_number(),
            links: (1..=page.num_pages)
                .map(|number| PageLink {
                    number,
                    current: number == page.number,
                })
                .collect(),
        };
        Self {
            posts: page.items.iter().map(PostCard::from_entry).collect(),
            pagination,
            show_group_links,
        }
    }

    pub fn has_posts(&self) -> bool {
        !self.posts.is_empty()
    }
}

#[derive(Template)]
#[template(path = "posts/includes/listing.html")]
pub struct ListingTemplate {
    pub listing: ListingView,
}

pub struct IndexContent {
    pub listing_html: String,
}

#[derive(Template)]
#[template(path = "posts/index.html")]
pub struct IndexTemplate {
    pub view: LayoutContext<IndexContent>,
}

#[derive(Clone)]
pub struct GroupView {
    pub title: String,
    pub slug: String,
    pub description: String,
}

impl From<&GroupRecord> for GroupView {
    fn from(group: &GroupRecord) -> Self {
        Self {
            title: group.title.clone(),
            slug: group.slug.clone(),
            description: group.description.clone(),
        }
    }
}

pub struct GroupContent {
    pub group: GroupView,
    pub listing_html: String,
}

#[derive(Template)]
#[template(path = "posts/group_list.html")]
pub struct GroupTemplate {
    pub view: LayoutContext<GroupContent>,
}

pub struct ProfileContent {
    pub author: AuthorLink,
    pub post_count: u64,
    pub following: bool,
    pub can_follow: bool,
    pub listing_html: String,
}

#[derive(Template)]
#[template(path = "posts/profile.html")]
pub struct ProfileTemplate {
    pub view: LayoutContext<ProfileContent>,
}

pub struct FollowContent {
    pub listing_html: String,
}

#[derive(Template)]
#[template(path = "posts/follow.html")]
pub struct FollowTemplate {
    pub view: LayoutContext<FollowContent>,
}

#[derive(Clone)]
pub struct CommentView {
    pub author: Option<AuthorLink>,
    pub text: String,
    pub created: String,
}

impl CommentView {
    pub fn from_entry(entry: &CommentEntry) -> Self {
        Self {
            author: entry.author.as_ref().map(AuthorLink::from),
            text: entry.comment.text.clone(),
            created: format_human_date(entry.comment.created),
        }
    }
}

pub struct PostDetailContent {
    pub post: PostCard,
    pub author_post_count: u64,
    pub comments: Vec<CommentView>,
    pub can_edit: bool,
}

#[derive(Template)]
#[template(path = "posts/post_detail.html")]
pub struct PostDetailTemplate {
    pub view: LayoutContext<PostDetailContent>,
}

#[derive(Clone)]
pub struct GroupOption {
    pub id: i64,
    pub title: String,
    pub selected: bool,
}

pub struct PostFormContent {
    pub is_edit: bool,
    pub action: String,
    pub text: String,
    pub groups: Vec<GroupOption>,
    pub no_group_selected: bool,
    pub current_image: Option<String>,
    pub text_errors: Vec<String>,
    pub group_errors: Vec<String>,
    pub image_errors: Vec<String>,
}

impl PostFormContent {
    pub fn with_errors(mut self, errors: &FormErrors) -> Self {
        self.text_errors = errors.field("text");
        self.group_errors = errors.field("group");
        self.image_errors = errors.field("image");
        self
    }
}

#[derive(Template)]
#[template(path = "posts/create_post.html")]
pub struct PostFormTemplate {
    pub view: LayoutContext<PostFormContent>,
}

#[derive(Default)]
pub struct SignupContent {
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub email: String,
    pub errors: Vec<(String, Vec<String>)>,
}

#[derive(Template)]
#[template(path = "users/signup.html")]
pub struct SignupTemplate {
    pub view: LayoutContext<SignupContent>,
}

#[derive(Default)]
pub struct LoginContent {
    pub username: String,
    pub next: String,
    pub errors: Vec<String>,
}

#[derive(Template)]
#[template(path = "users/login.html")]
pub struct LoginTemplate {
    pub view: LayoutContext<LoginContent>,
}

#[derive(Template)]
#[template(path = "users/logged_out.html")]
pub struct LoggedOutTemplate {
    pub view: LayoutContext<()>,
}

#[derive(Template)]
#[template(path = "about/author.html")]
pub struct AboutAuthorTemplate {
    pub view: LayoutContext<()>,
}

#[derive(Template)]
#[template(path = "about/tech.html")]
pub struct AboutTechTemplate {
    pub view: LayoutContext<()>,
}

pub struct ErrorPageView {
    pub title: String,
    pub message: String,
    pub path: Option<String>,
}

impl ErrorPageView {
    pub fn not_found(path: &str) -> Self {
        Self {
            title: "Страница не найдена".to_string(),
            message: "Запрошенная страница не существует.".to_string(),
            path: Some(path.to_string()),
        }
    }

    pub fn csrf_failure() -> Self {
        Self {
            title: "Ошибка проверки CSRF".to_string(),
            message: "Запрос отклонён: отсутствует или не совпадает CSRF-токен.".to_string(),
            path: None,
        }
    }
}

#[derive(Template)]
#[template(path = "core/404.html")]
pub struct NotFoundTemplate {
    pub view: LayoutContext<ErrorPageView>,
}

#[derive(Template)]
#[template(path = "core/403csrf.html")]
pub struct CsrfFailureTemplate {
    pub view: LayoutContext<ErrorPageView>,
}

/// Signup form field labels in display order.
pub const SIGNUP_FIELDS: [(&str, &str); 6] = [
    ("first_name", "Имя"),
    ("last_name", "Фамилия"),
    ("username", "Имя пользователя"),
    ("email", "Адрес электронной почты"),
    ("password1", "Пароль"),
    ("password2", "Подтверждение пароля"),
];

pub fn signup_errors(errors: &FormErrors) -> Vec<(String, Vec<String>)> {
    let mut grouped = Vec::new();
    for (field, label) in SIGNUP_FIELDS {
        let messages = errors.field(field);
        if !messages.is_empty() {
            grouped.push((label.to_string(), messages));
        }
    }
    let non_field = errors.non_field();
    if !non_field.is_empty() {
        grouped.push((String::new(), non_field));
    }
    grouped
}

pub fn media_url(stored_path: &str) -> String {
    format!("/media/{}", stored_path.trim_start_matches('/'))
}

/// `16 октября 2026`
pub fn format_human_date(value: OffsetDateTime) -> String {
    let month = MONTHS_GENITIVE[usize::from(u8::from(value.month())) - 1];
    format!("{} {} {}", value.day(), month, value.year())
}

pub fn format_iso(value: OffsetDateTime) -> String {
    value.format(&Rfc3339).unwrap_or_default()
}
