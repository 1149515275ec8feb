//! Keyword classification and per-keyword link selection.

use crate::types::{CandidateLink, RelevantLink};
use tracing::{error, info};

/// Strip everything but ASCII letters and digits, then lowercase.
pub fn normalize(text: &str) -> String {
    text.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Whether `title` belongs to the category named by `keyword`.
pub fn matches(keyword: &str, title: &str) -> bool {
    normalize(title).contains(&normalize(keyword))
}

/// Pick one link per keyword.
///
/// Among several matches the shortest title wins; on equal length the first
/// encountered wins. Keywords with no match are logged and left out.
pub fn select_relevant(site: &str, keywords: &[String], links: &[CandidateLink]) -> Vec<RelevantLink> {
    let mut results = Vec::new();
    for keyword in keywords {
        let chosen = links
            .iter()
            .filter(|link| matches(keyword, link.title()))
            .inspect(|link| info!("{site} - found {} [{}] for {keyword}", link.title(), link.url()))
            .min_by_key(|link| link.title().chars().count());

        match chosen {
            Some(link) => results.push(RelevantLink::from_candidate(keyword, link)),
            None => error!("{site} - no result found for key {keyword}"),
        }
    }
    results
}
