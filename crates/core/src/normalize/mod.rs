//! Text normalization ahead of embedding and hashing.
//!
//! The pipeline, in order: HTML strip (elements discarded, entities decoded),
//! Unicode NFKC, lowercase, non-alphanumeric runs folded to a single space,
//! trim, then stopword removal for languages with a compiled set. The output
//! is deterministic: identical input bytes produce identical output bytes in
//! every process.

mod stopwords;

pub use stopwords::stopwords_for;

use std::collections::HashSet;

use html_escape::decode_html_entities;
use scraper::Html;
use unicode_normalization::UnicodeNormalization;

/// Full normalization for a given language. Stopword removal is skipped when
/// the language has no compiled set; it never fails.
pub fn normalize(text: &str, lang: &str) -> String {
    let folded = fold(text);
    match stopwords_for(lang) {
        Some(set) => remove_stopwords(&folded, set),
        None => folded,
    }
}

/// Language-independent normalization used for content hashing: the same
/// pipeline minus stopword removal, so a paper hashes identically no matter
/// which request's language discovered it.
pub fn normalize_for_hash(text: &str) -> String {
    fold(text)
}

/// HTML strip + NFKC + lowercase + punctuation fold + trim.
fn fold(text: &str) -> String {
    let stripped = strip_html(text);
    let mut out = String::with_capacity(stripped.len());
    let mut pending_space = false;
    for ch in stripped.nfkc() {
        if ch.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            for lower in ch.to_lowercase() {
                out.push(lower);
            }
        } else {
            pending_space = true;
        }
    }
    out
}

/// Discard markup elements and decode entities. Plain text without markup
/// passes through untouched.
fn strip_html(text: &str) -> String {
    if text.contains('<') {
        let fragment = Html::parse_fragment(text);
        let mut out = String::with_capacity(text.len());
        for piece in fragment.root_element().text() {
            out.push_str(piece);
        }
        out
    } else if text.contains('&') {
        decode_html_entities(text).into_owned()
    } else {
        text.to_string()
    }
}

fn remove_stopwords(text: &str, set: &[&str]) -> String {
    let lookup: HashSet<&str> = set.iter().copied().collect();
    let kept: Vec<&str> = text
        .split_whitespace()
        .filter(|word| !lookup.contains(word))
        .collect();
    kept.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowercase_and_punctuation_fold() {
        assert_eq!(normalize_for_hash("Hello, World!"), "hello world");
        assert_eq!(normalize_for_hash("  spaced   out  "), "spaced out");
    }

    #[test]
    fn test_html_elements_discarded() {
        assert_eq!(
            normalize_for_hash("<p>Deep <b>learning</b> models</p>"),
            "deep learning models"
        );
    }

    #[test]
    fn test_entities_decoded() {
        assert_eq!(normalize_for_hash("salt &amp; pepper"), "salt pepper");
        assert_eq!(normalize_for_hash("<p>a &lt; b</p>"), "a b");
    }

    #[test]
    fn test_nfkc_applied() {
        // Fullwidth forms compose to ASCII under NFKC.
        assert_eq!(normalize_for_hash("ＡＢＣ１２３"), "abc123");
        // Ligature fi decomposes.
        assert_eq!(normalize_for_hash("ﬁnding"), "finding");
    }

    #[test]
    fn test_digits_kept() {
        assert_eq!(normalize_for_hash("covid-19 in 2020"), "covid 19 in 2020");
    }

    #[test]
    fn test_english_stopwords_removed() {
        assert_eq!(
            normalize("The models of the network", "en"),
            "models network"
        );
    }

    #[test]
    fn test_spanish_stopwords_removed() {
        assert_eq!(normalize("el modelo de la red", "es"), "modelo red");
    }

    #[test]
    fn test_unknown_language_skips_removal() {
        assert_eq!(
            normalize("the model of the network", "xx"),
            "the model of the network"
        );
    }

    #[test]
    fn test_hash_variant_keeps_stopwords() {
        assert_eq!(
            normalize_for_hash("The models of the network"),
            "the models of the network"
        );
    }

    #[test]
    fn test_deterministic() {
        let input = "<div>Neural &amp; Symbolic — systems, 2024!</div>";
        assert_eq!(normalize(input, "en"), normalize(input, "en"));
    }

    #[test]
    fn test_empty_and_whitespace() {
        assert_eq!(normalize("", "en"), "");
        assert_eq!(normalize("   \t\n ", "en"), "");
        assert_eq!(normalize("...!!!", "en"), "");
    }

    #[test]
    fn test_cyrillic_preserved() {
        assert_eq!(normalize_for_hash("Нейронные Сети"), "нейронные сети");
    }
}
