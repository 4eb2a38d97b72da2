//! Accounts: signup, password login and cookie sessions.
//!
//! A session token has the shape `ys_<prefix>_<secret>`. The prefix locates
//! the row; only the SHA-256 digest of the secret is stored and it is compared
//! in constant time.

use std::{sync::Arc, time::Duration};

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use metrics::counter;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, error};
use uuid::Uuid;

use crate::application::error::HttpError;
use crate::application::forms::{FormErrors, LoginSubmission, REQUIRED_MESSAGE, SignupSubmission};
use crate::application::repos::{
    CreateSessionParams, CreateUserParams, RepoError, SessionsRepo, UsersRepo,
};
use crate::domain::entities::UserRecord;
use crate::domain::error::DomainError;
use crate::domain::users;

const TOKEN_TAG: &str = "ys";
const MIN_SECRET_LEN: usize = 32;

pub const PASSWORD_MISMATCH_MESSAGE: &str = "Введенные пароли не совпадают.";
pub const DUPLICATE_USERNAME_MESSAGE: &str = "Пользователь с таким именем уже существует.";
pub const INVALID_LOGIN_MESSAGE: &str = "Пожалуйста, введите правильные имя пользователя и пароль. Оба поля могут быть чувствительны к регистру.";

#[derive(Debug, Error)]
pub enum AccountError {
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error("password hashing failed: {0}")]
    Hash(String),
}

impl From<AccountError> for HttpError {
    fn from(error: AccountError) -> Self {
        match error {
            AccountError::Repo(err) => HttpError::from(err),
            AccountError::Hash(_) => HttpError::internal("application::accounts", &error),
        }
    }
}

/// Freshly minted session; `token` is only ever shown once, in the cookie.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub expires_at: OffsetDateTime,
}

#[derive(Debug)]
pub enum SignupOutcome {
    SignedUp {
        user: UserRecord,
        session: IssuedSession,
    },
    Rejected(FormErrors),
}

#[derive(Debug)]
pub enum LoginOutcome {
    LoggedIn {
        user: UserRecord,
        session: IssuedSession,
    },
    Rejected(FormErrors),
}

#[derive(Clone)]
pub struct AccountService {
    users: Arc<dyn UsersRepo>,
    sessions: Arc<dyn SessionsRepo>,
    session_ttl: Duration,
}

impl AccountService {
    pub fn new(
        users: Arc<dyn UsersRepo>,
        sessions: Arc<dyn SessionsRepo>,
        session_ttl: Duration,
    ) -> Self {
        Self {
            users,
            sessions,
            session_ttl,
        }
    }

    pub async fn signup(&self, form: SignupSubmission) -> Result<SignupOutcome, AccountError> {
        let mut errors = FormErrors::default();

        let first_name = collect(
            &mut errors,
            users::validate_name("first_name", &form.first_name),
        );
        let last_name = collect(
            &mut errors,
            users::validate_name("last_name", &form.last_name),
        );
        let username = collect(&mut errors, users::validate_username(&form.username));
        let email = collect(&mut errors, users::validate_email(&form.email));

        if form.password1.is_empty() {
            errors.add("password1", REQUIRED_MESSAGE);
        }
        if form.password2.is_empty() {
            errors.add("password2", REQUIRED_MESSAGE);
        } else if form.password1 != form.password2 {
            errors.add("password2", PASSWORD_MISMATCH_MESSAGE);
        } else if let Err(err) = users::validate_password(&form.password2) {
            let mut password_errors = FormErrors::default();
            password_errors.add_domain(&err);
            for message in password_errors.field("password") {
                errors.add("password2", message);
            }
        }

        if let Some(name) = username.as_deref()
            && self.users.find_by_username(name).await?.is_some()
        {
            errors.add("username", DUPLICATE_USERNAME_MESSAGE);
        }

        let (Some(first_name), Some(last_name), Some(username), Some(email)) =
            (first_name, last_name, username, email)
        else {
            return Ok(SignupOutcome::Rejected(errors));
        };
        if !errors.is_empty() {
            return Ok(SignupOutcome::Rejected(errors));
        }

        let password_hash = hash_password(&form.password1)?;
        let user = match self
            .users
            .create_user(CreateUserParams {
                username,
                email,
                first_name,
                last_name,
                password_hash,
            })
            .await
        {
            Ok(user) => user,
            Err(RepoError::Duplicate { .. }) => {
                errors.add("username", DUPLICATE_USERNAME_MESSAGE);
                return Ok(SignupOutcome::Rejected(errors));
            }
            Err(err) => return Err(err.into()),
        };

        let session = self.issue_session(user.id).await?;
        Ok(SignupOutcome::SignedUp { user, session })
    }

    pub async fn login(&self, form: LoginSubmission) -> Result<LoginOutcome, AccountError> {
        let mut errors = FormErrors::default();
        if form.username.trim().is_empty() {
            errors.add("username", REQUIRED_MESSAGE);
        }
        if form.password.is_empty() {
            errors.add("password", REQUIRED_MESSAGE);
        }
        if !errors.is_empty() {
            return Ok(LoginOutcome::Rejected(errors));
        }

        let user = self.users.find_by_username(form.username.trim()).await?;
        match user {
            Some(user) if verify_password(&user.password_hash, &form.password) => {
                let session = self.issue_session(user.id).await?;
                Ok(LoginOutcome::LoggedIn { user, session })
            }
            _ => {
                errors.add(FormErrors::NON_FIELD, INVALID_LOGIN_MESSAGE);
                Ok(LoginOutcome::Rejected(errors))
            }
        }
    }

    /// Resolve a session token to its user. Unknown, malformed and expired
    /// tokens all resolve to `None`.
    pub async fn authenticate(&self, token: &str) -> Result<Option<UserRecord>, AccountError> {
        let Some(parsed) = parse_token(token) else {
            return Ok(None);
        };
        let Some(session) = self.sessions.find_by_prefix(&parsed.prefix).await? else {
            return Ok(None);
        };

        let hashed_input = hash_secret(&parsed.secret);
        if session.hashed_secret.ct_eq(&hashed_input).unwrap_u8() == 0 {
            return Ok(None);
        }
        if session.expires_at <= OffsetDateTime::now_utc() {
            debug!(target = "yatube::accounts", session_id = session.id, "session expired");
            self.sessions.delete_session(session.id).await?;
            return Ok(None);
        }

        Ok(self.users.find_by_id(session.user_id).await?)
    }

    /// Forget the session behind `token`, if any.
    pub async fn logout(&self, token: &str) -> Result<(), AccountError> {
        let Some(parsed) = parse_token(token) else {
            return Ok(());
        };
        if let Some(session) = self.sessions.find_by_prefix(&parsed.prefix).await? {
            let hashed_input = hash_secret(&parsed.secret);
            if session.hashed_secret.ct_eq(&hashed_input).unwrap_u8() == 1 {
                self.sessions.delete_session(session.id).await?;
            }
        }
        Ok(())
    }

    pub async fn find_user(&self, username: &str) -> Result<Option<UserRecord>, AccountError> {
        Ok(self.users.find_by_username(username).await?)
    }

    /// Delete an account and everything it authored. Returns `false` when the
    /// username is unknown.
    pub async fn delete_user(&self, username: &str) -> Result<bool, AccountError> {
        match self.users.find_by_username(username).await? {
            Some(user) => Ok(self.users.delete_user(user.id).await?),
            None => Ok(false),
        }
    }

    async fn issue_session(&self, user_id: i64) -> Result<IssuedSession, AccountError> {
        let now = OffsetDateTime::now_utc();
        // Opportunistic cleanup; a failure here must not block the login.
        if let Err(err) = self.sessions.delete_expired(now).await {
            error!(target = "yatube::accounts", error = %err, "failed to purge expired sessions");
        }

        let prefix = generate_prefix();
        let secret = generate_secret();
        let token = format!("{TOKEN_TAG}_{prefix}_{secret}");
        let expires_at = now + self.session_ttl;

        self.sessions
            .create_session(CreateSessionParams {
                user_id,
                prefix,
                hashed_secret: hash_secret(&secret),
                expires_at,
            })
            .await?;
        counter!("yatube_sessions_issued_total").increment(1);

        Ok(IssuedSession { token, expires_at })
    }
}

fn collect<T>(errors: &mut FormErrors, result: Result<T, DomainError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            errors.add_domain(&err);
            None
        }
    }
}

pub fn hash_password(password: &str) -> Result<String, AccountError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| AccountError::Hash(err.to_string()))
}

pub fn verify_password(stored_hash: &str, password: &str) -> bool {
    let hash = match PasswordHash::new(stored_hash) {
        Ok(hash) => hash,
        Err(err) => {
            error!(target = "yatube::accounts", error = %err, "failed to parse password hash");
            return false;
        }
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &hash)
        .is_ok()
}

fn hash_secret(secret: &str) -> Vec<u8> {
    Sha256::digest(secret.as_bytes()).to_vec()
}

fn generate_prefix() -> String {
    Uuid::new_v4().simple().to_string()[..12].to_string()
}

fn generate_secret() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

struct ParsedToken {
    prefix: String,
    secret: String,
}

fn parse_token(token: &str) -> Option<ParsedToken> {
    let mut parts = token.splitn(3, '_');
    if parts.next()? != TOKEN_TAG {
        return None;
    }
    let prefix = parts.next()?;
    let secret = parts.next()?;
    if prefix.is_empty() || secret.len() < MIN_SECRET_LEN {
        return None;
    }
    Some(ParsedToken {
        prefix: prefix.to_string(),
        secret: secret.to_string(),
    })
}
