//! The worker's tool surface.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Tools exposed by the metadata worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolName {
    /// `get_artist_biography`
    ArtistBiography,
    /// `get_artist_url`
    ArtistUrl,
}

impl ToolName {
    /// Wire name of the tool.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ArtistBiography => "get_artist_biography",
            Self::ArtistUrl => "get_artist_url",
        }
    }

    /// Look a tool up by wire name.
    #[must_use]
    pub fn from_wire(name: &str) -> Option<Self> {
        match name {
            "get_artist_biography" => Some(Self::ArtistBiography),
            "get_artist_url" => Some(Self::ArtistUrl),
            _ => None,
        }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Arguments accepted by both artist tools.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtistArgs {
    /// Host-side artist identifier.
    pub id: String,
    /// Artist name.
    pub name: String,
    /// External (`MusicBrainz`) identifier; omitted from the wire when empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mbid: String,
}

impl ArtistArgs {
    /// Arguments without an external identifier.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            mbid: String::new(),
        }
    }

    /// Set the external identifier.
    #[must_use]
    pub fn with_mbid(mut self, mbid: impl Into<String>) -> Self {
        self.mbid = mbid.into();
        self
    }

    /// Structured arguments for a `tools/call` request.
    #[must_use]
    pub fn to_arguments(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut map = serde_json::Map::new();
        map.insert("id".into(), self.id.clone().into());
        map.insert("name".into(), self.name.clone().into());
        if !self.mbid.is_empty() {
            map.insert("mbid".into(), self.mbid.clone().into());
        }
        map
    }
}
