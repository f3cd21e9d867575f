//! Input validation at the system boundary.

use crate::{ConsiliumError, Result};

/// Longest accepted tenant id, in bytes.
pub const MAX_TENANT_ID_LENGTH: usize = 128;

/// Default cap on request text length, in characters.
pub const DEFAULT_MAX_REQUEST_CHARS: usize = 10_000;

/// Validate a tenant id.
///
/// - Must not be empty or whitespace
/// - At most [`MAX_TENANT_ID_LENGTH`] bytes
///
/// Any other string is a valid tenant; backends carry it as an opaque value.
pub fn validate_tenant_id(tenant_id: &str) -> Result<()> {
    if tenant_id.trim().is_empty() {
        return Err(ConsiliumError::InvalidRequest(
            "tenantId must not be empty".into(),
        ));
    }

    if tenant_id.len() > MAX_TENANT_ID_LENGTH {
        return Err(ConsiliumError::InvalidRequest(format!(
            "tenantId exceeds {MAX_TENANT_ID_LENGTH} bytes"
        )));
    }

    Ok(())
}

/// Validate request text: non-blank and within `max_chars`.
pub fn validate_request_text(text: &str, max_chars: usize) -> Result<()> {
    if text.trim().is_empty() {
        return Err(ConsiliumError::InvalidRequest(
            "request text must not be empty".into(),
        ));
    }

    let len = text.chars().count();
    if len > max_chars {
        return Err(ConsiliumError::InvalidRequest(format!(
            "request text is {len} characters, limit is {max_chars}"
        )));
    }

    Ok(())
}

/// Truncate to at most `max_chars` characters on a char boundary,
/// appending "..." when anything was cut.
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenant_id_accepts_common_forms() {
        assert!(validate_tenant_id("t1").is_ok());
        assert!(validate_tenant_id("acme-corp").is_ok());
        assert!(validate_tenant_id("org:team_42.prod").is_ok());
        assert!(validate_tenant_id("user@example.com").is_ok());
        assert!(validate_tenant_id("acme corp").is_ok());
        assert!(validate_tenant_id("société-générale").is_ok());
    }

    #[test]
    fn tenant_id_rejects_empty_and_whitespace() {
        assert!(validate_tenant_id("").is_err());
        assert!(validate_tenant_id("   ").is_err());
    }

    #[test]
    fn tenant_id_rejects_overlong() {
        let long = "a".repeat(MAX_TENANT_ID_LENGTH + 1);
        assert!(validate_tenant_id(&long).is_err());
        let ok = "a".repeat(MAX_TENANT_ID_LENGTH);
        assert!(validate_tenant_id(&ok).is_ok());
        // Length is measured in bytes
        assert!(validate_tenant_id(&"é".repeat(MAX_TENANT_ID_LENGTH / 2 + 1)).is_err());
    }

    #[test]
    fn request_text_limits() {
        assert!(validate_request_text("How do I size a pool?", 100).is_ok());
        assert!(validate_request_text("  \n", 100).is_err());
        assert!(validate_request_text(&"x".repeat(101), 100).is_err());
        // Limit counts characters, not bytes
        assert!(validate_request_text(&"é".repeat(100), 100).is_ok());
    }

    #[test]
    fn truncate_on_char_boundary() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello world", 5), "hello...");
        assert_eq!(truncate_chars("ééé", 2), "éé...");
    }
}
