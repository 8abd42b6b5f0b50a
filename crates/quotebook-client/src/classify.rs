//! Response classification for failed API calls
//!
//! Reduces a non-success response to the stable status/message error shape.
//! JSON bodies are re-serialized compact and truncated so oversized error
//! payloads never reach a render surface whole; plain-text bodies pass
//! through verbatim.

use crate::error::ApiError;

/// Longest error message kept from a JSON body, in characters.
pub const MAX_ERROR_BODY_CHARS: usize = 500;

/// Build the typed error for a non-success response.
///
/// 204 never reaches this function; the client settles it as a successful
/// empty result first.
pub fn error_from_response(status: u16, content_type: Option<&str>, body: &str) -> ApiError {
    ApiError::Status {
        status,
        message: error_message(content_type, body),
    }
}

/// JSON bodies are parsed and re-serialized compact, truncated to
/// `MAX_ERROR_BODY_CHARS`. Anything else, including a body that fails to
/// parse despite a JSON content type, passes through verbatim.
fn error_message(content_type: Option<&str>, body: &str) -> String {
    if content_type.is_some_and(|ct| ct.contains("json"))
        && let Ok(value) = serde_json::from_str::<serde_json::Value>(body)
    {
        return truncate_chars(&value.to_string());
    }
    body.to_string()
}

fn truncate_chars(text: &str) -> String {
    text.chars().take(MAX_ERROR_BODY_CHARS).collect()
}
