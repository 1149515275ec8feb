//! Core data types shared by the extractor and the watcher.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Field key holding a record's human-readable title.
pub const TITLE_KEY: &str = "title";

/// Field key holding a record's link.
pub const URL_KEY: &str = "url";

/// Extracted field values keyed by the configured field name.
pub type Fields = BTreeMap<String, String>;

/// One entry of a listing page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub fields: Fields,
}

impl Post {
    pub fn new(fields: Fields) -> Self {
        Self { fields }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn title(&self) -> &str {
        self.get(TITLE_KEY).unwrap_or_default()
    }

    /// Detail page address. Records without one are dropped at extraction time.
    pub fn url(&self) -> &str {
        self.get(URL_KEY).unwrap_or_default()
    }
}

/// A link found on a detail/download page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateLink {
    pub fields: Fields,
}

impl CandidateLink {
    pub fn new(fields: Fields) -> Self {
        Self { fields }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn title(&self) -> &str {
        self.get(TITLE_KEY).unwrap_or_default()
    }

    pub fn url(&self) -> &str {
        self.get(URL_KEY).unwrap_or_default()
    }

    /// Every field value joined together, used for host allow-listing.
    pub fn combined_text(&self) -> String {
        self.fields
            .values()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// The link chosen for one relevance keyword.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelevantLink {
    pub keyword: String,
    pub title: String,
    pub url: String,
}

impl RelevantLink {
    pub fn from_candidate(keyword: &str, link: &CandidateLink) -> Self {
        Self {
            keyword: keyword.to_string(),
            title: link.title().to_string(),
            url: link.url().to_string(),
        }
    }
}

/// Errors that can occur in the Giornalettiere library.
#[derive(thiserror::Error, Debug)]
pub enum GiornalettiereError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("No events to monitor")]
    NoWatchedEvents,

    #[error("File missing: {}", .0.display())]
    Missing(PathBuf),
}

impl GiornalettiereError {
    /// True when a path vanished while it was being inspected.
    pub fn is_missing(&self) -> bool {
        matches!(self, GiornalettiereError::Missing(_))
    }
}

/// Convenience result type.
pub type GiornalettiereResult<T> = Result<T, GiornalettiereError>;
