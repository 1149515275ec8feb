//! Generic DOM walker interpreting [`SelectStep`] / [`ExtractField`] trees.
//!
//! A step that matches nothing yields `None`; the record it belonged to is
//! dropped rather than failing the whole page.

use crate::config::{AttributeKind, ExtractField, ExtractMode, SearchElement, SelectStep};
use crate::types::Fields;
use scraper::{ElementRef, Html};
use tracing::{debug, warn};

/// Whether `el` satisfies a single step.
pub fn step_matches(el: &ElementRef<'_>, step: &SelectStep) -> bool {
    let value = el.value();
    if let Some(tag) = &step.tag {
        if !value.name().eq_ignore_ascii_case(tag) {
            return false;
        }
    }
    match (step.attribute_kind, step.attribute_value.as_deref()) {
        (Some(AttributeKind::Class), Some(class)) => {
            value.classes().any(|c| c == class) || value.attr("class") == Some(class)
        }
        (Some(AttributeKind::Id), Some(id)) => value.attr("id") == Some(id),
        _ => true,
    }
}

/// Descendants of `scope` matching `step`, in document order.
pub fn find_all<'a>(
    scope: ElementRef<'a>,
    step: &'a SelectStep,
) -> impl Iterator<Item = ElementRef<'a>> + 'a {
    scope
        .descendants()
        .skip(1)
        .filter_map(ElementRef::wrap)
        .filter(move |el| step_matches(el, step))
}

/// First descendant of `scope` matching `step`.
pub fn find_first<'a>(scope: ElementRef<'a>, step: &'a SelectStep) -> Option<ElementRef<'a>> {
    find_all(scope, step).next()
}

/// Apply `steps` in order, each narrowing to one element.
pub fn execute_steps<'a>(
    scope: ElementRef<'a>,
    steps: &'a [SelectStep],
) -> Option<ElementRef<'a>> {
    let mut current = scope;
    for step in steps {
        current = find_first(current, step)?;
    }
    Some(current)
}

/// Navigate to the container and extract one record per repeating element.
///
/// `base_url` resolves relative `href` values.
pub fn extract_records(
    document: &Html,
    search_steps: &[SelectStep],
    search_element: &SearchElement,
    base_url: &str,
) -> Vec<Fields> {
    let Some(container) = execute_steps(document.root_element(), search_steps) else {
        warn!("cannot execute search steps {search_steps:?} on {base_url}");
        return Vec::new();
    };

    let mut records = Vec::new();
    for element in find_all(container, &search_element.element) {
        let mut fields = Fields::new();
        let mut complete = true;
        for field in &search_element.extract {
            match extract_field(element, field, base_url) {
                Some(value) => {
                    fields.insert(field.key.clone(), value);
                }
                None => {
                    debug!(
                        "field `{}` not found with steps {:?}",
                        field.key, field.further_steps
                    );
                    complete = false;
                    break;
                }
            }
        }
        if !complete {
            warn!("skipping incomplete record on {base_url}");
            continue;
        }
        if !fields.is_empty() {
            records.push(fields);
        }
    }
    records
}

fn extract_field(element: ElementRef<'_>, field: &ExtractField, base_url: &str) -> Option<String> {
    let target = execute_steps(element, &field.further_steps)?;
    match field.mode {
        ExtractMode::Href => target
            .value()
            .attr("href")
            .map(|href| resolve_href(base_url, href)),
        ExtractMode::Text => Some(target.text().collect::<String>().trim().to_string()),
    }
}

fn resolve_href(base_url: &str, href: &str) -> String {
    url::Url::parse(base_url)
        .and_then(|base| base.join(href))
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
          <div id="sidebar"><article class="post"><h2>Ignore me</h2></article></div>
          <div id="posts">
            <article class="post featured">
              <h2>  Quotidiani 26.03.2024 </h2>
              <a href="/2024/03/26/quotidiani">read</a>
            </article>
            <article class="post">
              <h2>Quotidiani 25.03.2024</h2>
              <a href="https://a.example/2024/03/25/quotidiani">read</a>
            </article>
            <article class="post"><h2>No link here</h2></article>
          </div>
        </body></html>
    "#;

    fn listing_element() -> SearchElement {
        SearchElement {
            element: SelectStep::tag("article").with_class("post"),
            extract: vec![
                ExtractField {
                    key: "title".into(),
                    mode: ExtractMode::Text,
                    further_steps: vec![SelectStep::tag("h2")],
                },
                ExtractField {
                    key: "url".into(),
                    mode: ExtractMode::Href,
                    further_steps: vec![SelectStep::tag("a")],
                },
            ],
        }
    }

    #[test]
    fn test_execute_steps_narrows_by_id() {
        let doc = Html::parse_document(PAGE);
        let steps = vec![SelectStep::tag("div").with_id("posts")];
        let container = execute_steps(doc.root_element(), &steps).unwrap();
        assert_eq!(container.value().attr("id"), Some("posts"));
    }

    #[test]
    fn test_missing_step_yields_none() {
        let doc = Html::parse_document(PAGE);
        let steps = vec![
            SelectStep::tag("div").with_id("posts"),
            SelectStep::tag("table"),
        ];
        assert!(execute_steps(doc.root_element(), &steps).is_none());
    }

    #[test]
    fn test_class_matches_single_class_or_full_attribute() {
        let doc = Html::parse_document(PAGE);
        let scope = doc.root_element();
        let single = SelectStep::tag("article").with_class("featured");
        let full = SelectStep::tag("article").with_class("post featured");
        assert_eq!(find_all(scope, &single).count(), 1);
        assert_eq!(find_all(scope, &full).count(), 1);
    }

    #[test]
    fn test_extract_records_skips_incomplete_and_resolves_links() {
        let doc = Html::parse_document(PAGE);
        let steps = vec![SelectStep::tag("div").with_id("posts")];
        let records = extract_records(&doc, &steps, &listing_element(), "https://a.example/news");

        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["title"], "Quotidiani 26.03.2024");
        assert_eq!(records[0]["url"], "https://a.example/2024/03/26/quotidiani");
        assert_eq!(records[1]["url"], "https://a.example/2024/03/25/quotidiani");
    }

    #[test]
    fn test_missing_container_yields_no_records() {
        let doc = Html::parse_document(PAGE);
        let steps = vec![SelectStep::tag("section")];
        let records = extract_records(&doc, &steps, &listing_element(), "https://a.example/");
        assert!(records.is_empty());
    }

    #[test]
    fn test_step_without_tag_matches_any_element() {
        let doc = Html::parse_document(PAGE);
        let step = SelectStep::default().with_id("sidebar");
        let found = find_first(doc.root_element(), &step).unwrap();
        assert_eq!(found.value().name(), "div");
    }
}
