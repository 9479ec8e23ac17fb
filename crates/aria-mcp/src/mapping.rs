//! Tool response normalization.
//!
//! Workers report "nothing found" in several ways: no content at all, a
//! non-text first part, empty text, or a text part carrying the handler
//! error sentinel. All of them collapse into one [`NotFound`] outcome; the
//! specific cause is logged and then dropped.

use std::fmt;

use tracing::debug;

use crate::types::ToolResponse;

/// Prefix the worker's tool framework puts on handler failures.
pub const HANDLER_ERROR_PREFIX: &str = "handler returned an error:";

/// The normalized "no result" outcome of a tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotFound;

impl fmt::Display for NotFound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("data not found")
    }
}

impl std::error::Error for NotFound {}

/// Why a response was treated as not-found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotFoundCause {
    /// The response had no content parts.
    NoContent,
    /// The first part was not text.
    NoText,
    /// The text was empty.
    EmptyText,
    /// The text carried the handler error sentinel.
    HandlerError(String),
    /// The worker flagged the call as a tool error.
    ToolError(String),
}

impl fmt::Display for NotFoundCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoContent => f.write_str("empty content"),
            Self::NoText => f.write_str("first content part is not text"),
            Self::EmptyText => f.write_str("empty text"),
            Self::HandlerError(msg) => write!(f, "worker handler error: {msg}"),
            Self::ToolError(msg) => write!(f, "worker tool error: {msg}"),
        }
    }
}

/// Classify a response without logging.
///
/// # Errors
///
/// Returns the [`NotFoundCause`] when the response carries no usable text.
pub fn classify_response(response: &ToolResponse) -> Result<&str, NotFoundCause> {
    if response.content.is_empty() {
        return Err(NotFoundCause::NoContent);
    }
    let text = response.first_text().ok_or(NotFoundCause::NoText)?;
    if text.is_empty() {
        return Err(NotFoundCause::EmptyText);
    }
    if let Some(rest) = text.strip_prefix(HANDLER_ERROR_PREFIX) {
        return Err(NotFoundCause::HandlerError(rest.trim().to_owned()));
    }
    if response.is_error {
        return Err(NotFoundCause::ToolError(text.to_owned()));
    }
    Ok(text)
}

/// Map a tool response to its text, or [`NotFound`].
///
/// # Errors
///
/// Returns [`NotFound`] for every not-found cause; the cause is logged.
pub fn map_response(tool: &str, response: &ToolResponse) -> Result<String, NotFound> {
    match classify_response(response) {
        Ok(text) => Ok(text.to_owned()),
        Err(cause) => {
            debug!(tool, cause = %cause, "tool returned no data");
            Err(NotFound)
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ToolContent;

    #[test]
    fn text_passes_through() {
        assert_eq!(
            map_response("get_artist_biography", &ToolResponse::text("A bio.")),
            Ok("A bio.".to_string())
        );
    }

    #[test]
    fn every_not_found_shape_maps_to_the_same_error() {
        let shapes = [
            ToolResponse::empty(),
            ToolResponse::text(""),
            ToolResponse::text("handler returned an error: no artist"),
            ToolResponse {
                content: vec![ToolContent::Audio],
                is_error: false,
            },
            ToolResponse::tool_error("lookup failed"),
        ];
        for response in &shapes {
            assert_eq!(map_response("get_artist_url", response), Err(NotFound));
        }
    }

    #[test]
    fn causes_are_distinguishable_before_normalization() {
        assert_eq!(
            classify_response(&ToolResponse::empty()),
            Err(NotFoundCause::NoContent)
        );
        assert_eq!(
            classify_response(&ToolResponse::text("")),
            Err(NotFoundCause::EmptyText)
        );
        assert_eq!(
            classify_response(&ToolResponse::text("handler returned an error: boom")),
            Err(NotFoundCause::HandlerError("boom".into()))
        );
    }

    #[test]
    fn sentinel_must_be_a_prefix() {
        let text = "Biography mentions: handler returned an error: nothing";
        assert_eq!(
            map_response("get_artist_biography", &ToolResponse::text(text)),
            Ok(text.to_string())
        );
    }
}
