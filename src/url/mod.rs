//! URL handling module for Gleaner
//!
//! This module resolves detail links found on list pages and computes the
//! normalized keys used to deduplicate records within a batch.

mod normalize;

// Re-export main functions
pub use normalize::{dedup_key, resolve_link};

/// Expands a `{page}` pagination template for the given page number
///
/// # Examples
///
/// ```
/// use gleaner::url::expand_template;
///
/// assert_eq!(
///     expand_template("https://example.com/news?page={page}", 3),
///     "https://example.com/news?page=3"
/// );
/// ```
pub fn expand_template(template: &str, page_number: u32) -> String {
    template.replace("{page}", &page_number.to_string())
}
