//! Config-driven link extractor.
//!
//! One scrape pass:
//! 1. probe the listing URLs in order and keep the first one that yields
//!    posts dated today,
//! 2. follow each post to its download page and collect the links whose
//!    fields mention an allow-listed host,
//! 3. bucket the links by relevance keyword and keep one per keyword.
//!
//! Failures below the pass level (a dead mirror, a broken post page, a
//! missing element) are logged and skipped.

pub mod dom;
pub mod relevance;

use crate::config::{ExtractionConfig, RelevantDate};
use crate::http_client::HttpClient;
use crate::types::{CandidateLink, GiornalettiereResult, Post, RelevantLink};
use chrono::NaiveDate;
use scraper::Html;
use tracing::{error, info, warn};

/// Encoding assumed for listing pages that do not declare one.
const LISTING_ENCODING: &str = "utf-8";

/// Date format searched for in the listing's date field.
pub const DATE_FORMAT: &str = "%d.%m.%Y";

/// Extracts relevant download links for one configured site.
pub struct LinkExtractor {
    config: ExtractionConfig,
    http: HttpClient,
    reference_date: Option<NaiveDate>,
}

impl LinkExtractor {
    pub fn new(config: ExtractionConfig, http: HttpClient) -> Self {
        Self {
            config,
            http,
            reference_date: None,
        }
    }

    /// Pin "today" to a fixed date instead of the local calendar.
    pub fn with_reference_date(mut self, date: NaiveDate) -> Self {
        self.reference_date = Some(date);
        self
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Run a full scrape pass and return one link per matched keyword.
    pub async fn fetch(&self) -> Vec<RelevantLink> {
        let name = &self.config.name;
        let Some((url, posts)) = self.find_listing().await else {
            error!("{name} - no url found");
            return Vec::new();
        };
        info!("{name} - using listing {url} ({} post(s))", posts.len());

        let mut links = Vec::new();
        for post in &posts {
            info!(
                "{name} - extracting download links from: {} [{}]",
                post.title(),
                post.url()
            );
            match self.extract_download_links(post.url()).await {
                Ok(found) => links.extend(found),
                Err(e) => warn!("{name} - cannot read post page {}: {e}", post.url()),
            }
        }

        relevance::select_relevant(name, &self.config.relevant_content, &links)
    }

    /// First listing URL whose page yields at least one post for today.
    pub async fn find_listing(&self) -> Option<(String, Vec<Post>)> {
        for url in self.config.listing_urls() {
            match self.extract_post_list(&url).await {
                Ok(posts) if !posts.is_empty() => return Some((url, posts)),
                Ok(_) => info!("{} - nothing useful at {url}", self.config.name),
                Err(e) => info!("{} - {url} unavailable: {e}", self.config.name),
            }
        }
        None
    }

    /// Fetch a listing page and return the posts dated today.
    pub async fn extract_post_list(&self, url: &str) -> GiornalettiereResult<Vec<Post>> {
        let reference = self.reference_date_string();
        let listing = &self.config.listing;

        let page = self.http.get_text(url, LISTING_ENCODING).await?;
        let records = {
            let document = Html::parse_document(&page.body);
            dom::extract_records(
                &document,
                &listing.search_steps,
                &listing.search_element,
                &page.final_url,
            )
        };

        Ok(filter_by_date(
            records.into_iter().map(Post::new),
            &listing.key_containing_date,
            &reference,
        ))
    }

    /// Fetch a post's page and return the links hosted on allow-listed hosts.
    pub async fn extract_download_links(&self, url: &str) -> GiornalettiereResult<Vec<CandidateLink>> {
        let download = &self.config.download;

        let page = self.http.get_text(url, &download.page_encoding).await?;
        let records = {
            let document = Html::parse_document(&page.body);
            dom::extract_records(
                &document,
                &download.search_steps,
                &download.search_element,
                &page.final_url,
            )
        };

        Ok(filter_by_host(
            records.into_iter().map(CandidateLink::new),
            &download.hosts,
        ))
    }

    fn reference_date_string(&self) -> String {
        if let RelevantDate::Unsupported(policy) = self.config.listing.date_policy() {
            warn!(
                "{} - relevant date {:?} not yet supported, using today",
                self.config.name, policy
            );
        }
        self.reference_date
            .unwrap_or_else(|| chrono::Local::now().date_naive())
            .format(DATE_FORMAT)
            .to_string()
    }
}

/// Keep posts whose date field contains `reference`.
pub fn filter_by_date(
    posts: impl IntoIterator<Item = Post>,
    date_key: &str,
    reference: &str,
) -> Vec<Post> {
    posts
        .into_iter()
        .filter(|post| post.get(date_key).is_some_and(|d| d.contains(reference)))
        .collect()
}

/// Keep links whose combined field text mentions one of `hosts`, ignoring case.
pub fn filter_by_host(
    links: impl IntoIterator<Item = CandidateLink>,
    hosts: &[String],
) -> Vec<CandidateLink> {
    let hosts: Vec<String> = hosts.iter().map(|h| h.to_lowercase()).collect();
    links
        .into_iter()
        .filter(|link| {
            let text = link.combined_text().to_lowercase();
            hosts.iter().any(|h| text.contains(h.as_str()))
        })
        .collect()
}
