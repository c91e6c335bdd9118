//! Rule-based span extraction
//!
//! - Entities: runs of two or more capitalized words, which may be joined by
//!   `of`, `and`, `for`, `the` or `&`, and acronyms on their own
//! - Noun phrases: runs of two or more content words, split at stopwords,
//!   numbers and punctuation

use super::LinguisticBackend;
use std::collections::HashSet;

const STOPWORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "also", "am", "an", "and", "any",
    "are", "as", "at", "be", "because", "been", "before", "being", "below", "between", "both",
    "but", "by", "can", "could", "did", "do", "does", "doing", "down", "during", "each", "few",
    "for", "from", "further", "had", "has", "have", "having", "he", "her", "here", "hers",
    "him", "his", "how", "i", "if", "in", "into", "is", "it", "its", "itself", "just", "may",
    "me", "might", "more", "most", "must", "my", "no", "nor", "not", "now", "of", "off", "on",
    "once", "only", "or", "other", "our", "ours", "out", "over", "own", "same", "shall", "she",
    "should", "so", "some", "such", "than", "that", "the", "their", "them", "then", "there",
    "these", "they", "this", "those", "through", "to", "too", "under", "until", "up", "upon",
    "very", "via", "was", "we", "were", "what", "when", "where", "which", "while", "who",
    "whom", "whose", "why", "will", "with", "within", "without", "would", "you", "your",
];

/// Words allowed inside an entity run
const CONNECTORS: &[&str] = &["of", "and", "for", "the", "&"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token<'a> {
    Word(&'a str),
    Break,
}

/// Rule-based `LinguisticBackend`
#[derive(Debug, Clone)]
pub struct HeuristicBackend {
    stopwords: HashSet<&'static str>,
}

impl Default for HeuristicBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl HeuristicBackend {
    pub fn new() -> Self {
        Self {
            stopwords: STOPWORDS.iter().copied().collect(),
        }
    }

    fn is_stopword(&self, word: &str) -> bool {
        self.stopwords.contains(word.to_lowercase().as_str())
    }
}

impl LinguisticBackend for HeuristicBackend {
    fn entity_spans(&self, text: &str) -> Vec<String> {
        let mut spans = Vec::new();
        let mut run: Vec<&str> = Vec::new();

        for token in tokenize(text) {
            match token {
                Token::Word(word) if is_acronym(word) => {
                    self.flush_entity(&mut run, &mut spans);
                    spans.push(word.to_string());
                }
                Token::Word(word) if is_capitalized(word) => run.push(word),
                Token::Word(word)
                    if !run.is_empty() && CONNECTORS.contains(&word.to_lowercase().as_str()) =>
                {
                    run.push(word)
                }
                _ => self.flush_entity(&mut run, &mut spans),
            }
        }
        self.flush_entity(&mut run, &mut spans);

        spans
    }

    fn noun_phrase_spans(&self, text: &str) -> Vec<String> {
        let mut spans = Vec::new();
        let mut run: Vec<&str> = Vec::new();

        for token in tokenize(text) {
            match token {
                Token::Word(word) if !self.is_stopword(word) && is_content_word(word) => {
                    run.push(word)
                }
                _ => flush_phrase(&mut run, &mut spans),
            }
        }
        flush_phrase(&mut run, &mut spans);

        spans
    }
}

impl HeuristicBackend {
    fn flush_entity(&self, run: &mut Vec<&str>, spans: &mut Vec<String>) {
        let mut words: &[&str] = run;

        // Sentence-initial capitals such as "The" carry no name
        while let Some((first, rest)) = words.split_first() {
            if self.is_stopword(first) || CONNECTORS.contains(&first.to_lowercase().as_str()) {
                words = rest;
            } else {
                break;
            }
        }
        while let Some((last, rest)) = words.split_last() {
            if CONNECTORS.contains(&last.to_lowercase().as_str()) {
                words = rest;
            } else {
                break;
            }
        }

        if words.len() >= 2 {
            spans.push(words.join(" "));
        }

        run.clear();
    }
}

fn flush_phrase(run: &mut Vec<&str>, spans: &mut Vec<String>) {
    if run.len() >= 2 {
        spans.push(run.join(" "));
    }
    run.clear();
}

/// Splits text into words and punctuation breaks
///
/// Hyphens and apostrophes between letters stay inside a word; `&` is a
/// word of its own.
fn tokenize(text: &str) -> Vec<Token<'_>> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut tokens = Vec::new();
    let mut start: Option<usize> = None;

    for (i, &(offset, c)) in chars.iter().enumerate() {
        let joins_word = matches!(c, '-' | '\'' | '\u{2019}')
            && start.is_some()
            && chars
                .get(i + 1)
                .map_or(false, |&(_, next)| next.is_alphanumeric());

        if c.is_alphanumeric() || joins_word {
            if start.is_none() {
                start = Some(offset);
            }
            continue;
        }

        if let Some(begin) = start.take() {
            tokens.push(Token::Word(&text[begin..offset]));
        }

        if c == '&' {
            tokens.push(Token::Word("&"));
        } else if !c.is_whitespace() {
            tokens.push(Token::Break);
        }
    }

    if let Some(begin) = start {
        tokens.push(Token::Word(&text[begin..]));
    }

    tokens
}

fn is_capitalized(word: &str) -> bool {
    let mut chars = word.chars();
    matches!(chars.next(), Some(first) if first.is_uppercase())
        && chars.any(|c| c.is_lowercase())
}

fn is_acronym(word: &str) -> bool {
    word.chars().filter(|c| c.is_alphabetic()).count() >= 2
        && word.chars().all(|c| c.is_uppercase() || c.is_ascii_digit())
}

fn is_content_word(word: &str) -> bool {
    word != "&" && !word.chars().any(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize() {
        let tokens = tokenize("AML/CFT rules, anti-money laundering & FSRA's update.");
        assert_eq!(
            tokens,
            vec![
                Token::Word("AML"),
                Token::Break,
                Token::Word("CFT"),
                Token::Word("rules"),
                Token::Break,
                Token::Word("anti-money"),
                Token::Word("laundering"),
                Token::Word("&"),
                Token::Word("FSRA's"),
                Token::Word("update"),
                Token::Break,
            ]
        );
    }

    #[test]
    fn test_noun_phrases() {
        let backend = HeuristicBackend::new();
        let spans = backend.noun_phrase_spans("Circular 5 New framework for digital assets.");
        assert_eq!(spans, vec!["New framework", "digital assets"]);
    }

    #[test]
    fn test_noun_phrases_split_at_numbers_and_punctuation() {
        let backend = HeuristicBackend::new();
        let spans = backend
            .noun_phrase_spans("Consultation paper 3 of 2024: proposed capital rules; market abuse");
        assert_eq!(
            spans,
            vec!["Consultation paper", "proposed capital rules", "market abuse"]
        );
    }

    #[test]
    fn test_entities() {
        let backend = HeuristicBackend::new();
        let spans = backend.entity_spans(
            "The Financial Services Regulatory Authority of Abu Dhabi Global Market fined a firm. \
             VARA and the SCA agreed.",
        );
        assert_eq!(
            spans,
            vec![
                "Financial Services Regulatory Authority of Abu Dhabi Global Market",
                "VARA",
                "SCA",
            ]
        );
    }

    #[test]
    fn test_single_capitalized_word_is_not_entity() {
        let backend = HeuristicBackend::new();
        assert!(backend.entity_spans("Circular 5 New framework").is_empty());
    }

    #[test]
    fn test_empty_text() {
        let backend = HeuristicBackend::new();
        assert!(backend.entity_spans("").is_empty());
        assert!(backend.noun_phrase_spans("   ").is_empty());
    }
}
