//! Post, comment and group text rules.

use super::error::DomainError;

pub const MAX_GROUP_TITLE_LEN: usize = 200;

/// Post and comment bodies are required; surrounding whitespace is kept out.
pub fn validate_body(field: &'static str, input: &str) -> Result<String, DomainError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(DomainError::blank(field));
    }
    Ok(trimmed.to_string())
}

pub fn validate_group_title(input: &str) -> Result<String, DomainError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(DomainError::blank("title"));
    }
    if trimmed.chars().count() > MAX_GROUP_TITLE_LEN {
        return Err(DomainError::too_long("title", MAX_GROUP_TITLE_LEN));
    }
    Ok(trimmed.to_string())
}
