//! Tool response types.

use rmcp::model::{self as rmcp_model, RawContent};
use serde::{Deserialize, Serialize};

/// Response to a tool call: an ordered list of typed content parts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResponse {
    /// Content parts in the order the worker produced them.
    pub content: Vec<ToolContent>,
    /// Whether the worker flagged the call as failed.
    #[serde(default)]
    pub is_error: bool,
}

impl ToolResponse {
    /// A response with a single text part.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            is_error: false,
        }
    }

    /// A response with no content parts.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// A response flagged as a tool error.
    #[must_use]
    pub fn tool_error(message: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text {
                text: message.into(),
            }],
            is_error: true,
        }
    }

    /// Text of the first content part, if that part is text.
    #[must_use]
    pub fn first_text(&self) -> Option<&str> {
        match self.content.first()? {
            ToolContent::Text { text } => Some(text.as_str()),
            _ => None,
        }
    }
}

impl From<rmcp_model::CallToolResult> for ToolResponse {
    fn from(result: rmcp_model::CallToolResult) -> Self {
        Self {
            content: result.content.iter().map(ToolContent::from_rmcp).collect(),
            is_error: result.is_error.unwrap_or(false),
        }
    }
}

/// One content part of a tool response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolContent {
    /// Text content.
    Text {
        /// The text.
        text: String,
    },
    /// Image content.
    Image {
        /// MIME type.
        mime_type: String,
    },
    /// Embedded or linked resource.
    Resource {
        /// Resource URI.
        uri: String,
    },
    /// Audio content.
    Audio,
}

impl ToolContent {
    fn from_rmcp(content: &rmcp_model::Content) -> Self {
        match &**content {
            RawContent::Text(text) => Self::Text {
                text: text.text.clone(),
            },
            RawContent::Image(image) => Self::Image {
                mime_type: image.mime_type.clone(),
            },
            RawContent::Resource(embedded) => Self::Resource {
                uri: match &embedded.resource {
                    rmcp_model::ResourceContents::TextResourceContents { uri, .. }
                    | rmcp_model::ResourceContents::BlobResourceContents { uri, .. } => {
                        uri.clone()
                    },
                },
            },
            RawContent::ResourceLink(resource) => Self::Resource {
                uri: resource.uri.clone(),
            },
            RawContent::Audio(_) => Self::Audio,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_text_only_looks_at_first_part() {
        assert_eq!(ToolResponse::text("A bio.").first_text(), Some("A bio."));
        assert_eq!(ToolResponse::empty().first_text(), None);

        let image_first = ToolResponse {
            content: vec![
                ToolContent::Image {
                    mime_type: "image/png".into(),
                },
                ToolContent::Text {
                    text: "later".into(),
                },
            ],
            is_error: false,
        };
        assert_eq!(image_first.first_text(), None);
    }

    #[test]
    fn converts_rmcp_result() {
        let result = rmcp_model::CallToolResult::success(vec![rmcp_model::Content::text(
            "https://example.com/artist",
        )]);
        let response = ToolResponse::from(result);
        assert_eq!(response.first_text(), Some("https://example.com/artist"));
        assert!(!response.is_error);

        let failed =
            ToolResponse::from(rmcp_model::CallToolResult::error(vec![rmcp_model::Content::text(
                "boom",
            )]));
        assert!(failed.is_error);
    }
}
