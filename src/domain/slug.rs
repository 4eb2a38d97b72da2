//! Group slug rules.
//!
//! Slugs are URL path segments (`/group/<slug>/`), so they are restricted to
//! ASCII letters, digits, hyphens and underscores. When an operator does not
//! supply one, it is derived from the group title with the `slug` crate,
//! which transliterates non-Latin scripts to ASCII first.

use slug::slugify;

use super::error::DomainError;

pub const MAX_SLUG_LEN: usize = 50;

/// Accept `input` as a slug if it satisfies the URL-safety rules.
pub fn validate_slug(input: &str) -> Result<String, DomainError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(DomainError::blank("slug"));
    }
    if trimmed.chars().count() > MAX_SLUG_LEN {
        return Err(DomainError::too_long("slug", MAX_SLUG_LEN));
    }
    if !trimmed
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
    {
        return Err(DomainError::malformed("slug", trimmed));
    }
    Ok(trimmed.to_string())
}

/// Derive a slug from a human-readable title.
pub fn derive_slug(title: &str) -> Result<String, DomainError> {
    if title.trim().is_empty() {
        return Err(DomainError::blank("title"));
    }

    let mut candidate = slugify(title);
    if candidate.is_empty() {
        return Err(DomainError::malformed("slug", title));
    }
    if candidate.len() > MAX_SLUG_LEN {
        candidate.truncate(MAX_SLUG_LEN);
        while candidate.ends_with('-') {
            candidate.pop();
        }
    }

    validate_slug(&candidate)
}
