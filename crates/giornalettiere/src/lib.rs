//! Giornalettiere: config-driven link extraction and settle-aware directory watching.

pub mod config;
pub mod extractor;
pub mod http_client;
pub mod probe;
pub mod types;
pub mod watcher;

pub use config::{
    AttributeKind, DownloadDescriptor, ExtractField, ExtractMode, ExtractionConfig,
    ListingDescriptor, RelevantDate, SearchElement, SelectStep,
};
pub use extractor::relevance::{matches, normalize, select_relevant};
pub use extractor::LinkExtractor;
pub use http_client::{HttpClient, HttpResponse};
pub use probe::StabilityProbe;
pub use types::*;
pub use watcher::{DirectoryWatcher, WatchEventKind, WatcherConfig, WatcherHandle};
