use std::{process, sync::Arc};

use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;
use yatube::{
    application::{
        accounts::{AccountError, AccountService},
        comments::CommentService,
        error::AppError,
        feed::FeedService,
        follows::FollowService,
        groups::{GroupError, GroupService},
        posts::PostService,
    },
    config,
    infra::{
        cache::PageCache,
        db::PostgresRepositories,
        error::InfraError,
        http::{self, HttpOptions, HttpState},
        telemetry,
        uploads::MediaStorage,
    },
};

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Groups(args) => run_groups(settings, args).await,
        config::Command::Users(args) => run_users(settings, args).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let state = build_http_state(repositories, &settings)?;
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(
        target = "yatube::serve",
        addr = %settings.server.addr,
        cache_enabled = settings.cache.enabled,
        "listening"
    );

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    info!(target = "yatube::serve", "server stopped");
    Ok(())
}

async fn run_groups(settings: config::Settings, args: config::GroupsArgs) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let groups = GroupService::new(repositories);

    match args.command {
        config::GroupsCommand::Create(create) => {
            let group = groups
                .create(&create.title, create.slug.as_deref(), &create.description)
                .await
                .map_err(group_error)?;
            info!(
                target = "yatube::cli::groups",
                id = group.id,
                slug = %group.slug,
                title = %group.title,
                "group created"
            );
        }
        config::GroupsCommand::Delete(delete) => {
            if !groups.delete(&delete.slug).await.map_err(group_error)? {
                return Err(AppError::NotFound);
            }
            info!(target = "yatube::cli::groups", slug = %delete.slug, "group deleted");
        }
    }

    Ok(())
}

async fn run_users(settings: config::Settings, args: config::UsersArgs) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let accounts = AccountService::new(
        repositories.clone(),
        repositories,
        settings.sessions.ttl,
    );

    match args.command {
        config::UsersCommand::Delete(delete) => {
            if !accounts
                .delete_user(&delete.username)
                .await
                .map_err(account_error)?
            {
                return Err(AppError::NotFound);
            }
            info!(
                target = "yatube::cli::users",
                username = %delete.username,
                "user deleted with their posts, comments and follows"
            );
        }
    }

    Ok(())
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

fn build_http_state(
    repositories: Arc<PostgresRepositories>,
    settings: &config::Settings,
) -> Result<HttpState, AppError> {
    let media = MediaStorage::new(settings.media.directory.clone())
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    let media = Arc::new(media);

    let feed = FeedService::new(
        repositories.clone(),
        repositories.clone(),
        repositories.clone(),
        repositories.clone(),
        settings.posts.page_size,
    );
    let posts = PostService::new(
        repositories.clone(),
        repositories.clone(),
        repositories.clone(),
        media.clone(),
    );
    let comments = CommentService::new(repositories.clone(), repositories.clone());
    let follows = FollowService::new(repositories.clone(), repositories.clone());
    let accounts = AccountService::new(
        repositories.clone(),
        repositories.clone(),
        settings.sessions.ttl,
    );

    Ok(HttpState {
        feed: Arc::new(feed),
        posts: Arc::new(posts),
        comments: Arc::new(comments),
        follows: Arc::new(follows),
        accounts: Arc::new(accounts),
        page_cache: Arc::new(PageCache::from_settings(&settings.cache)),
        media,
        db: repositories,
        options: HttpOptions {
            invalidate_cache_on_write: settings.cache.invalidate_on_write,
            secure_cookies: settings.sessions.secure_cookie,
            max_request_bytes: usize::try_from(settings.media.max_request_bytes.get())
                .unwrap_or(usize::MAX),
        },
    })
}

fn group_error(err: GroupError) -> AppError {
    match err {
        GroupError::Domain(err) => AppError::Domain(err),
        GroupError::Repo(err) => AppError::Repo(err),
        err @ GroupError::Duplicate { .. } => AppError::validation(err.to_string()),
    }
}

fn account_error(err: AccountError) -> AppError {
    match err {
        AccountError::Repo(err) => AppError::Repo(err),
        err @ AccountError::Hash(_) => AppError::unexpected(err.to_string()),
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(target = "yatube::serve", error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!(target = "yatube::serve", "shutdown requested");
}
