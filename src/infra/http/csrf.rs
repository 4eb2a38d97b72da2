//! Double-submit CSRF protection.
//!
//! Every visitor carries a random `csrftoken` cookie; state-changing forms
//! echo it back in the hidden `csrfmiddlewaretoken` field and the two must
//! match.

use subtle::ConstantTimeEq;
use uuid::Uuid;

pub const CSRF_COOKIE: &str = "csrftoken";
pub const CSRF_FIELD: &str = "csrfmiddlewaretoken";

const TOKEN_LEN: usize = 32;

pub fn generate_token() -> String {
    Uuid::new_v4().simple().to_string()
}

pub fn is_well_formed(token: &str) -> bool {
    token.len() == TOKEN_LEN && token.bytes().all(|byte| byte.is_ascii_hexdigit())
}

/// Compare the cookie token against the submitted one. The error is the
/// reason logged with the 403 response.
pub fn verify(cookie_token: &str, submitted: Option<&str>) -> Result<(), &'static str> {
    let Some(submitted) = submitted.map(str::trim).filter(|value| !value.is_empty()) else {
        return Err("CSRF token missing");
    };
    if submitted.len() != cookie_token.len()
        || submitted.as_bytes().ct_eq(cookie_token.as_bytes()).unwrap_u8() == 0
    {
        return Err("CSRF token incorrect");
    }
    Ok(())
}
