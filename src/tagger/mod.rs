//! Salient tag derivation
//!
//! `Tagger` ranks entity-like and phrase-like spans by frequency. The spans
//! themselves come from an injected `LinguisticBackend`, so a statistical
//! model can replace the built-in `HeuristicBackend` without touching the
//! crawl loop.

mod heuristic;

pub use heuristic::HeuristicBackend;

use std::collections::HashMap;
use std::sync::Arc;

/// Span extraction over free text
///
/// Implementations must be pure: the same text always yields the same spans
/// in the same order.
pub trait LinguisticBackend: Send + Sync {
    /// Named-entity-like spans, in order of appearance
    fn entity_spans(&self, text: &str) -> Vec<String>;

    /// Multi-word noun-phrase-like spans, in order of appearance
    fn noun_phrase_spans(&self, text: &str) -> Vec<String>;
}

/// Frequency-ranked tagging over a linguistic backend
#[derive(Clone)]
pub struct Tagger {
    backend: Arc<dyn LinguisticBackend>,
}

impl Tagger {
    pub fn new(backend: Arc<dyn LinguisticBackend>) -> Self {
        Self { backend }
    }

    /// A tagger over the built-in rule-based backend
    pub fn heuristic() -> Self {
        Self::new(Arc::new(HeuristicBackend::new()))
    }

    /// Returns the `max_tags` most frequent spans of `text`
    ///
    /// Spans are lowercased; entities are considered before phrases, and
    /// ties keep the order in which a span was first seen.
    ///
    /// # Example
    ///
    /// ```
    /// use gleaner::Tagger;
    ///
    /// let tagger = Tagger::heuristic();
    /// let tags = tagger.tag("Circular 5 New framework for digital assets.", 5);
    /// assert!(tags.contains(&"digital assets".to_string()));
    /// ```
    pub fn tag(&self, text: &str, max_tags: usize) -> Vec<String> {
        let candidates = self
            .backend
            .entity_spans(text)
            .into_iter()
            .chain(self.backend.noun_phrase_spans(text))
            .map(|span| span.to_lowercase())
            .filter(|span| !span.trim().is_empty());

        let mut order: Vec<String> = Vec::new();
        let mut counts: HashMap<String, usize> = HashMap::new();
        for span in candidates {
            let count = counts.entry(span.clone()).or_insert(0);
            if *count == 0 {
                order.push(span);
            }
            *count += 1;
        }

        // Stable sort keeps first-seen order among equal counts
        order.sort_by(|a, b| counts[b].cmp(&counts[a]));
        order.truncate(max_tags);
        order
    }
}

impl std::fmt::Debug for Tagger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tagger").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Backend returning fixed spans regardless of input
    struct FixedBackend {
        entities: Vec<&'static str>,
        phrases: Vec<&'static str>,
    }

    impl LinguisticBackend for FixedBackend {
        fn entity_spans(&self, _text: &str) -> Vec<String> {
            self.entities.iter().map(|s| s.to_string()).collect()
        }

        fn noun_phrase_spans(&self, _text: &str) -> Vec<String> {
            self.phrases.iter().map(|s| s.to_string()).collect()
        }
    }

    fn tagger(entities: Vec<&'static str>, phrases: Vec<&'static str>) -> Tagger {
        Tagger::new(Arc::new(FixedBackend { entities, phrases }))
    }

    #[test]
    fn test_frequency_rank() {
        let tagger = tagger(
            vec!["ADGM"],
            vec!["digital assets", "new rules", "Digital Assets", "new rules", "digital assets"],
        );

        assert_eq!(
            tagger.tag("ignored", 5),
            vec!["digital assets", "new rules", "adgm"]
        );
    }

    #[test]
    fn test_ties_keep_first_seen_order() {
        let tagger = tagger(vec!["FSRA", "VARA"], vec!["capital markets", "market abuse"]);

        assert_eq!(
            tagger.tag("ignored", 10),
            vec!["fsra", "vara", "capital markets", "market abuse"]
        );
    }

    #[test]
    fn test_max_tags_truncates() {
        let tagger = tagger(vec!["A B", "C D", "E F"], vec![]);
        assert_eq!(tagger.tag("ignored", 2), vec!["a b", "c d"]);
        assert!(tagger.tag("ignored", 0).is_empty());
    }

    #[test]
    fn test_deterministic() {
        let tagger = Tagger::heuristic();
        let text = "The Financial Services Regulatory Authority issues guidance on virtual asset \
                    custody. Virtual asset custody providers must register with the FSRA.";

        let first = tagger.tag(text, 5);
        let second = tagger.tag(text, 5);

        assert_eq!(first, second);
        assert!(!first.is_empty());
    }

    #[test]
    fn test_concurrent_use() {
        let tagger = Tagger::heuristic();
        let expected = tagger.tag("Abu Dhabi Global Market publishes new AML guidance.", 5);

        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    assert_eq!(
                        tagger.tag("Abu Dhabi Global Market publishes new AML guidance.", 5),
                        expected
                    );
                });
            }
        });
    }
}
