//! Submits download requests to the external download service.

use anyhow::{Context, Result};
use giornalettiere::HttpClient;
use tracing::info;

/// Posts `{titolo, link}` forms to the download service.
#[derive(Clone)]
pub struct DownloadRequester {
    http: HttpClient,
    site: String,
    title: String,
}

impl DownloadRequester {
    /// `title` names the download package, and so the folder it lands in.
    pub fn new(http: HttpClient, site: &str, title: &str) -> Self {
        Self {
            http,
            site: site.to_string(),
            title: title.to_string(),
        }
    }

    /// Request every link in one submission. An empty list sends nothing.
    pub async fn submit(&self, links: &[String]) -> Result<()> {
        if links.is_empty() {
            info!("no link to request");
            return Ok(());
        }
        let joined = links.join("\n");
        self.http
            .post_form(&self.site, &[("titolo", self.title.as_str()), ("link", joined.as_str())])
            .await
            .with_context(|| format!("download request to {} failed", self.site))?;
        info!("requested {} link(s) to {}", links.len(), self.site);
        Ok(())
    }
}
