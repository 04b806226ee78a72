//! OpenAlex works API.
//!
//! OpenAlex returns abstracts as an inverted index (`word -> positions`);
//! the parser reconstructs the running text from it.

use serde_json::Value;

use super::{SourceAdapter, SourceRequest};
use crate::config;
use crate::paper::PaperDraft;

/// Cap on reconstructed abstract length, in words.
const MAX_ABSTRACT_WORDS: usize = 100;

pub struct OpenAlex {
    mailto: Option<String>,
}

impl OpenAlex {
    pub fn new(mailto: Option<String>) -> Self {
        Self { mailto }
    }
}

/// Rebuild an abstract from OpenAlex's inverted index: order words by their
/// first occurrence position.
fn rebuild_abstract(inverted: &Value) -> Option<String> {
    let map = inverted.as_object()?;
    let mut positioned: Vec<(u64, &str)> = map
        .iter()
        .filter_map(|(word, positions)| {
            let first = positions
                .as_array()?
                .iter()
                .filter_map(|p| p.as_u64())
                .min()?;
            Some((first, word.as_str()))
        })
        .collect();
    if positioned.is_empty() {
        return None;
    }
    positioned.sort_unstable();
    let words: Vec<&str> = positioned
        .into_iter()
        .take(MAX_ABSTRACT_WORDS)
        .map(|(_, word)| word)
        .collect();
    Some(words.join(" "))
}

impl SourceAdapter for OpenAlex {
    fn tag(&self) -> &'static str {
        "openalex"
    }

    fn build_request(&self, query: &str, theme: &str, _language: &str) -> Option<SourceRequest> {
        let mut request = SourceRequest::new("https://api.openalex.org/works")
            .param("search", format!("{theme} {query}"))
            .param("per-page", config::MAX_RESULTS_PER_SOURCE.to_string());
        if let Some(mailto) = &self.mailto {
            request = request.param("mailto", mailto.clone());
        }
        Some(request)
    }

    fn parse_response(&self, bytes: &[u8], _content_type: &str) -> Vec<PaperDraft> {
        let Ok(data) = serde_json::from_slice::<Value>(bytes) else {
            return Vec::new();
        };
        let Some(works) = data["results"].as_array() else {
            return Vec::new();
        };

        works
            .iter()
            .filter_map(|work| {
                let abstract_text = rebuild_abstract(&work["abstract_inverted_index"])?;
                let title = work["title"].as_str()?.to_string();
                let authors = work["authorships"]
                    .as_array()
                    .map(|list| {
                        list.iter()
                            .filter_map(|a| {
                                a["author"]["display_name"].as_str().map(str::to_string)
                            })
                            .collect()
                    })
                    .unwrap_or_default();

                Some(PaperDraft {
                    title,
                    abstract_text,
                    authors,
                    source: self.tag().to_string(),
                    document_type: work["type"].as_str().unwrap_or("article").to_string(),
                    publication_date: work["publication_year"].as_i64().map(|y| y.to_string()),
                    doi: work["doi"].as_str().map(str::to_string),
                    // The OpenAlex id doubles as a resolvable URL.
                    url: work["id"].as_str().map(str::to_string),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abstract_reconstruction() {
        let inverted: Value = serde_json::from_str(
            r#"{"deep": [0], "learning": [1], "models": [2, 5], "for": [3], "images": [4]}"#,
        )
        .unwrap();
        assert_eq!(
            rebuild_abstract(&inverted).unwrap(),
            "deep learning models for images"
        );
    }

    #[test]
    fn test_parse_works_payload() {
        let body = r#"{
            "results": [
                {
                    "title": "Vision Models",
                    "abstract_inverted_index": {"a": [0], "survey": [1]},
                    "authorships": [{"author": {"display_name": "Kaiming He"}}],
                    "type": "article",
                    "publication_year": 2020,
                    "doi": "https://doi.org/10.2/def",
                    "id": "https://openalex.org/W123"
                },
                {"title": "No Index", "abstract_inverted_index": null}
            ]
        }"#;
        let papers = OpenAlex::new(None).parse_response(body.as_bytes(), "application/json");
        assert_eq!(papers.len(), 1);
        assert_eq!(papers[0].abstract_text, "a survey");
        assert_eq!(papers[0].url.as_deref(), Some("https://openalex.org/W123"));
    }
}
