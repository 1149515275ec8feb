//! Declarative site-extraction configuration.
//!
//! A site is described by a listing descriptor (how to find today's posts)
//! and a download descriptor (how to find the links on a post's page). Both
//! are small ASTs of [`SelectStep`] nodes and [`ExtractField`] leaves that a
//! single DOM walker interprets. The legacy key names (`List`, `Download`,
//! `relevantContent`, `type`, `name`, `value`, `steps`) are accepted as-is.

use crate::types::{GiornalettiereError, GiornalettiereResult, TITLE_KEY, URL_KEY};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Which attribute a [`SelectStep`] constrains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeKind {
    Class,
    Id,
}

/// Narrow to the first descendant with a tag name and optional class/id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectStep {
    /// Tag name; any element when absent.
    #[serde(rename = "type", default)]
    pub tag: Option<String>,
    #[serde(rename = "attribute", default)]
    pub attribute_kind: Option<AttributeKind>,
    #[serde(rename = "name", default)]
    pub attribute_value: Option<String>,
}

impl SelectStep {
    pub fn tag(tag: &str) -> Self {
        Self {
            tag: Some(tag.to_string()),
            ..Self::default()
        }
    }

    pub fn with_class(mut self, class: &str) -> Self {
        self.attribute_kind = Some(AttributeKind::Class);
        self.attribute_value = Some(class.to_string());
        self
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.attribute_kind = Some(AttributeKind::Id);
        self.attribute_value = Some(id.to_string());
        self
    }
}

/// What to read from the element reached by an [`ExtractField`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractMode {
    Href,
    Text,
}

/// One output field of an extracted record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractField {
    pub key: String,
    #[serde(rename = "value")]
    pub mode: ExtractMode,
    #[serde(rename = "steps", default)]
    pub further_steps: Vec<SelectStep>,
}

/// The repeating element and the fields extracted from each match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchElement {
    pub element: SelectStep,
    #[serde(default)]
    pub extract: Vec<ExtractField>,
}

impl SearchElement {
    fn extracts(&self, key: &str) -> bool {
        self.extract.iter().any(|f| f.key == key)
    }
}

/// Date relevance policy for listing posts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelevantDate {
    Today,
    Unsupported(Option<String>),
}

/// How to reach the posts on the listing page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingDescriptor {
    #[serde(default)]
    pub search_steps: Vec<SelectStep>,
    pub search_element: SearchElement,
    #[serde(default = "default_date_key")]
    pub key_containing_date: String,
    #[serde(default)]
    pub relevant_date: Option<String>,
}

impl ListingDescriptor {
    pub fn date_policy(&self) -> RelevantDate {
        match self.relevant_date.as_deref() {
            Some("today") => RelevantDate::Today,
            other => RelevantDate::Unsupported(other.map(str::to_string)),
        }
    }
}

/// How to reach the download links on a post's page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadDescriptor {
    #[serde(default = "default_encoding")]
    pub page_encoding: String,
    #[serde(default)]
    pub search_steps: Vec<SelectStep>,
    pub search_element: SearchElement,
    /// Allow-listed link hosts.
    #[serde(alias = "host")]
    pub hosts: Vec<String>,
}

/// Everything needed to scrape one site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionConfig {
    pub name: String,
    /// Candidate base URLs, tried in order.
    pub domains: Vec<String>,
    #[serde(default)]
    pub query: String,
    #[serde(rename = "list", alias = "List")]
    pub listing: ListingDescriptor,
    #[serde(alias = "Download")]
    pub download: DownloadDescriptor,
    /// Relevance keywords, one per wanted link category.
    #[serde(alias = "relevantContent")]
    pub relevant_content: Vec<String>,
}

fn default_date_key() -> String {
    TITLE_KEY.to_string()
}

fn default_encoding() -> String {
    "utf-8".to_string()
}

impl ExtractionConfig {
    /// Load and validate a site config, choosing the format by extension.
    pub fn load(path: &Path) -> GiornalettiereResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str(&contents)?,
            Some("toml") => toml::from_str(&contents)?,
            _ => Self::parse_any(&contents, &path.display().to_string())?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse TOML first, then JSON.
    pub fn parse_any(contents: &str, origin: &str) -> GiornalettiereResult<Self> {
        toml::from_str(contents).or_else(|toml_err| {
            serde_json::from_str(contents).map_err(|json_err| {
                GiornalettiereError::Config(format!(
                    "failed to parse site config {origin}: toml error: {toml_err}; json error: {json_err}"
                ))
            })
        })
    }

    /// Reject configs the extractor cannot run.
    pub fn validate(&self) -> GiornalettiereResult<()> {
        let invalid = |msg: String| Err(GiornalettiereError::Config(format!("{}: {msg}", self.name)));

        if self.domains.is_empty() {
            return invalid("no domains configured".into());
        }
        if self.relevant_content.is_empty() {
            return invalid("no relevance keywords configured".into());
        }
        if !self.listing.search_element.extracts(URL_KEY) {
            return invalid(format!("listing must extract a `{URL_KEY}` field"));
        }
        if !self
            .listing
            .search_element
            .extracts(&self.listing.key_containing_date)
        {
            return invalid(format!(
                "date field `{}` is not extracted by the listing",
                self.listing.key_containing_date
            ));
        }
        for key in [TITLE_KEY, URL_KEY] {
            if !self.download.search_element.extracts(key) {
                return invalid(format!("download page must extract a `{key}` field"));
            }
        }
        if self.download.hosts.is_empty() {
            return invalid("no allowed hosts configured".into());
        }
        Ok(())
    }

    /// Listing URLs in probing order.
    pub fn listing_urls(&self) -> Vec<String> {
        self.domains
            .iter()
            .map(|domain| format!("{domain}{}", self.query))
            .collect()
    }
}
