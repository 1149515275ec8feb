//! The daily scrape cycle: every site config through the link extractor, then
//! one download request for everything found.

use anyhow::Result;
use giornalettiere::{ExtractionConfig, HttpClient, LinkExtractor};
use std::path::PathBuf;
use tracing::{error, info, warn};

use crate::download::DownloadRequester;

pub struct FetchCycle {
    sites: Vec<PathBuf>,
    http: HttpClient,
    requester: Option<DownloadRequester>,
}

impl FetchCycle {
    pub fn new(sites: Vec<PathBuf>, http: HttpClient, requester: Option<DownloadRequester>) -> Self {
        Self {
            sites,
            http,
            requester,
        }
    }

    /// Scrape every site and request the links found.
    ///
    /// Site configs are re-read on each run. A site whose config cannot be
    /// loaded is skipped. Returns the requested URLs.
    pub async fn run(&self) -> Result<Vec<String>> {
        info!("fetching new documents from {} site(s)", self.sites.len());
        let mut urls = Vec::new();

        for site in &self.sites {
            let config = match ExtractionConfig::load(site) {
                Ok(config) => config,
                Err(e) => {
                    error!("cannot load site config {}: {e}", site.display());
                    continue;
                }
            };
            let links = LinkExtractor::new(config, self.http.clone()).fetch().await;
            urls.extend(links.into_iter().map(|link| link.url));
        }
        info!("fetched {} url(s)", urls.len());

        if urls.is_empty() {
            return Ok(urls);
        }
        match &self.requester {
            Some(requester) => requester.submit(&urls).await?,
            None => warn!("download_site is not configured, {} link(s) not requested", urls.len()),
        }
        Ok(urls)
    }
}
