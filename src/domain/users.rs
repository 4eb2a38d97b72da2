//! Account field rules.

use super::error::DomainError;

pub const MAX_USERNAME_LEN: usize = 150;
pub const MAX_NAME_LEN: usize = 150;
pub const MIN_PASSWORD_LEN: usize = 8;

/// Usernames allow letters, digits and `@ . + - _`.
pub fn validate_username(input: &str) -> Result<String, DomainError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(DomainError::blank("username"));
    }
    if trimmed.chars().count() > MAX_USERNAME_LEN {
        return Err(DomainError::too_long("username", MAX_USERNAME_LEN));
    }
    if !trimmed
        .chars()
        .all(|ch| ch.is_alphanumeric() || matches!(ch, '@' | '.' | '+' | '-' | '_'))
    {
        return Err(DomainError::malformed("username", trimmed));
    }
    Ok(trimmed.to_string())
}

/// Minimal shape check: one `@`, non-empty local part, dotted domain.
pub fn validate_email(input: &str) -> Result<String, DomainError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(DomainError::blank("email"));
    }

    let valid = match trimmed.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !trimmed.chars().any(char::is_whitespace)
        }
        None => false,
    };

    if valid {
        Ok(trimmed.to_string())
    } else {
        Err(DomainError::malformed("email", trimmed))
    }
}

pub fn validate_name(field: &'static str, input: &str) -> Result<String, DomainError> {
    let trimmed = input.trim();
    if trimmed.chars().count() > MAX_NAME_LEN {
        return Err(DomainError::too_long(field, MAX_NAME_LEN));
    }
    Ok(trimmed.to_string())
}

pub fn validate_password(input: &str) -> Result<(), DomainError> {
    if input.is_empty() {
        return Err(DomainError::blank("password"));
    }
    if input.chars().count() < MIN_PASSWORD_LEN {
        return Err(DomainError::malformed("password", "too short"));
    }
    if input.chars().all(|ch| ch.is_ascii_digit()) {
        return Err(DomainError::malformed("password", "entirely numeric"));
    }
    Ok(())
}
