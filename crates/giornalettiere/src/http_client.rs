//! Async HTTP client wrapping reqwest.
//!
//! Plain GET/POST with browser-like headers. No retries: a failed request is
//! reported to the caller, which skips the item and moves on.

use crate::types::{GiornalettiereError, GiornalettiereResult};
use std::time::Duration;
use tracing::{debug, warn};

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) \
                          AppleWebKit/537.36 (KHTML, like Gecko) \
                          Chrome/131.0.0.0 Safari/537.36";

/// Response from an HTTP request.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Requested URL.
    pub url: String,
    /// Final URL after redirects.
    pub final_url: String,
    /// HTTP status code.
    pub status: u16,
    /// Response body as decoded text.
    pub body: String,
}

/// HTTP client shared by the extractor and the download submitter.
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    /// Create a client without a request timeout.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Create a client that gives up on requests after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::build(Some(timeout))
    }

    fn build(timeout: Option<Duration>) -> Self {
        let mut builder = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(USER_AGENT);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().unwrap_or_default();
        Self { client }
    }

    /// GET a page and decode it with `encoding`.
    ///
    /// The configured encoding wins over any charset the server declares.
    /// An unknown label decodes as UTF-8.
    pub async fn get_text(&self, url: &str, encoding: &str) -> GiornalettiereResult<HttpResponse> {
        let r = self.client.get(url).send().await?;
        let status = r.status().as_u16();
        let final_url = r.url().to_string();

        if !r.status().is_success() {
            return Err(GiornalettiereError::HttpStatus {
                url: url.to_string(),
                status,
            });
        }

        let bytes = r.bytes().await?;
        let body = decode(&bytes, encoding);
        Ok(HttpResponse {
            url: url.to_string(),
            final_url,
            status,
            body,
        })
    }

    /// POST form data (url-encoded).
    pub async fn post_form(
        &self,
        url: &str,
        form_fields: &[(&str, &str)],
    ) -> GiornalettiereResult<HttpResponse> {
        let r = self.client.post(url).form(form_fields).send().await?;
        let status = r.status().as_u16();
        let final_url = r.url().to_string();

        if !r.status().is_success() {
            return Err(GiornalettiereError::HttpStatus {
                url: url.to_string(),
                status,
            });
        }

        let body = r.text().await.unwrap_or_default();
        Ok(HttpResponse {
            url: url.to_string(),
            final_url,
            status,
            body,
        })
    }
}

fn decode(bytes: &[u8], label: &str) -> String {
    let encoding = encoding_rs::Encoding::for_label(label.trim().as_bytes()).unwrap_or_else(|| {
        warn!("unknown page encoding [{label}], decoding as utf-8");
        encoding_rs::UTF_8
    });
    let (text, _, malformed) = encoding.decode(bytes);
    if malformed {
        debug!("page is not valid {}", encoding.name());
    }
    text.into_owned()
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}
