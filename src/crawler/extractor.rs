//! Field and content extraction from rendered pages
//!
//! This module turns rendered HTML into announcement fields:
//! - List items and their title, date, source and detail link
//! - Detail body text through an ordered selector fallback chain
//! - The state of the next-page control
//!
//! Extraction never fails a page. Missing pieces degrade to empty strings and
//! come back as warnings next to the extracted value.

use crate::batch::PartialRecord;
use crate::browser::Document;
use crate::config::FieldSelectors;
use crate::url::resolve_link;
use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;
use url::Url;

/// A degraded field or record; recorded as a warning, never retried
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    #[error("item {index}: no {field} found")]
    MissingField { index: usize, field: &'static str },

    #[error("no content found at {url}")]
    EmptyContent { url: String },

    #[error("invalid selector '{selector}'")]
    InvalidSelector { selector: String },
}

/// An extracted value with the warnings raised while producing it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction<T> {
    pub value: T,
    pub warnings: Vec<ExtractionError>,
}

/// State of the next-page control on a list page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextControl {
    Absent,
    Disabled,
    Enabled,
}

impl NextControl {
    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled)
    }
}

/// Elements whose text is never visible
const HIDDEN_ELEMENTS: &[&str] = &["script", "style", "noscript", "template", "head"];

/// Elements that separate words when rendered
const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "dd", "div", "dl", "dt", "fieldset",
    "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header",
    "hr", "li", "main", "nav", "ol", "p", "pre", "section", "table", "td", "th", "tr", "ul",
];

/// Extracts one `PartialRecord` per list item
///
/// # Arguments
///
/// * `doc` - The rendered list page
/// * `item_selector` - Selector matching each announcement item
/// * `fields` - Selectors evaluated relative to each item
/// * `site_label` - Source used when an item carries none
/// * `base` - Base URL for relative detail links
///
/// # Returns
///
/// Items in document order. A configured field that matches nothing yields
/// an empty string (the site label for `source`) and one
/// `MissingField` warning; the item itself is always kept.
pub fn extract_list_items(
    doc: &Document,
    item_selector: &str,
    fields: &FieldSelectors,
    site_label: &str,
    base: &Url,
) -> Extraction<Vec<PartialRecord>> {
    let mut warnings = Vec::new();

    let Some(items) = parse_selector(item_selector, &mut warnings) else {
        return Extraction {
            value: Vec::new(),
            warnings,
        };
    };
    let title = compile_field(fields.title.as_deref(), &mut warnings);
    let date = compile_field(fields.date.as_deref(), &mut warnings);
    let source = compile_field(fields.source.as_deref(), &mut warnings);
    let link = compile_field(fields.link.as_deref(), &mut warnings);
    let any_link = Selector::parse("a[href]").ok();

    let html = Html::parse_document(&doc.html);
    let mut records = Vec::new();

    for (index, item) in html.select(&items).enumerate() {
        let mut field_text = |selector: &Option<Selector>, name: &'static str| -> String {
            let Some(selector) = selector else {
                return String::new();
            };
            let text = item
                .select(selector)
                .map(|el| collapse_whitespace(&el.text().collect::<String>()))
                .find(|text| !text.is_empty())
                .unwrap_or_default();
            if text.is_empty() {
                warnings.push(ExtractionError::MissingField { index, field: name });
            }
            text
        };

        let title_text = field_text(&title, "title");
        let date_text = field_text(&date, "date");
        let source_text = field_text(&source, "source");

        let href = match &link {
            Some(selector) => item
                .select(selector)
                .find_map(|el| el.value().attr("href")),
            None => item.value().attr("href").or_else(|| {
                any_link
                    .as_ref()
                    .and_then(|any| item.select(any).find_map(|el| el.value().attr("href")))
            }),
        };
        let url = href.and_then(|href| resolve_link(base, href));
        if url.is_none() {
            warnings.push(ExtractionError::MissingField {
                index,
                field: "link",
            });
        }

        records.push(PartialRecord {
            title: title_text,
            date: date_text,
            source: if source_text.is_empty() {
                site_label.to_string()
            } else {
                source_text
            },
            url: url.unwrap_or_default(),
        });
    }

    Extraction {
        value: records,
        warnings,
    }
}

/// Extracts detail body text through an ordered selector chain
///
/// Each selector is tried in turn; the first element with non-empty visible
/// text wins. When nothing matches the result is `""` with exactly one
/// `EmptyContent` warning.
pub fn extract_detail_content(doc: &Document, selector_chain: &[String]) -> Extraction<String> {
    let mut warnings = Vec::new();
    let html = Html::parse_document(&doc.html);

    for selector in selector_chain {
        let Some(parsed) = parse_selector(selector, &mut warnings) else {
            continue;
        };

        let text = html
            .select(&parsed)
            .map(visible_text)
            .find(|text| !text.is_empty());

        if let Some(text) = text {
            return Extraction {
                value: text,
                warnings,
            };
        }
    }

    warnings.push(ExtractionError::EmptyContent {
        url: doc.url.clone(),
    });
    Extraction {
        value: String::new(),
        warnings,
    }
}

/// Inspects the next-page control
///
/// A control is disabled when it carries a `disabled` attribute,
/// `aria-disabled="true"`, or a `disabled` class.
pub fn next_control(doc: &Document, selector: &str) -> NextControl {
    let Ok(parsed) = Selector::parse(selector) else {
        return NextControl::Absent;
    };
    let html = Html::parse_document(&doc.html);

    let Some(control) = html.select(&parsed).next() else {
        return NextControl::Absent;
    };

    let element = control.value();
    let disabled = element.attr("disabled").is_some()
        || element
            .attr("aria-disabled")
            .map_or(false, |v| v.eq_ignore_ascii_case("true"))
        || element.classes().any(|class| class == "disabled");

    if disabled {
        NextControl::Disabled
    } else {
        NextControl::Enabled
    }
}

/// Returns the rendered text of an element with whitespace collapsed
pub fn visible_text(element: ElementRef<'_>) -> String {
    let mut raw = String::new();
    collect_text(element, &mut raw);
    collapse_whitespace(&raw)
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) => {
                let name = el.name();
                if HIDDEN_ELEMENTS.contains(&name) {
                    continue;
                }
                let block = BLOCK_ELEMENTS.contains(&name);
                if block {
                    out.push(' ');
                }
                if let Some(child_element) = ElementRef::wrap(child) {
                    collect_text(child_element, out);
                }
                if block {
                    out.push(' ');
                }
            }
            _ => {}
        }
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn parse_selector(selector: &str, warnings: &mut Vec<ExtractionError>) -> Option<Selector> {
    match Selector::parse(selector) {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            warnings.push(ExtractionError::InvalidSelector {
                selector: selector.to_string(),
            });
            None
        }
    }
}

fn compile_field(selector: Option<&str>, warnings: &mut Vec<ExtractionError>) -> Option<Selector> {
    selector.and_then(|s| parse_selector(s, warnings))
}
