//! Zenodo records API.

use serde_json::Value;

use super::{SourceAdapter, SourceRequest};
use crate::config;
use crate::paper::PaperDraft;

/// Zenodo descriptions can run to full papers; keep the leading slice.
const MAX_DESCRIPTION_CHARS: usize = 500;

pub struct Zenodo;

impl Zenodo {
    pub fn new() -> Self {
        Self
    }
}

impl Default for Zenodo {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceAdapter for Zenodo {
    fn tag(&self) -> &'static str {
        "zenodo"
    }

    fn build_request(&self, query: &str, theme: &str, _language: &str) -> Option<SourceRequest> {
        Some(
            SourceRequest::new("https://zenodo.org/api/records")
                .param("q", format!("{theme} {query}"))
                .param("size", config::MAX_RESULTS_PER_SOURCE.to_string()),
        )
    }

    fn parse_response(&self, bytes: &[u8], _content_type: &str) -> Vec<PaperDraft> {
        let Ok(data) = serde_json::from_slice::<Value>(bytes) else {
            return Vec::new();
        };
        let Some(hits) = data["hits"]["hits"].as_array() else {
            return Vec::new();
        };

        hits.iter()
            .filter_map(|hit| {
                let metadata = &hit["metadata"];
                let description = metadata["description"].as_str()?;
                if description.is_empty() {
                    return None;
                }
                let abstract_text: String = description
                    .chars()
                    .take(MAX_DESCRIPTION_CHARS)
                    .collect();
                let title = metadata["title"].as_str()?.to_string();
                let authors = metadata["creators"]
                    .as_array()
                    .map(|list| {
                        list.iter()
                            .filter_map(|c| c["name"].as_str().map(str::to_string))
                            .collect()
                    })
                    .unwrap_or_default();

                Some(PaperDraft {
                    title,
                    abstract_text,
                    authors,
                    source: self.tag().to_string(),
                    document_type: metadata["resource_type"]["type"]
                        .as_str()
                        .unwrap_or("publication")
                        .to_string(),
                    publication_date: metadata["publication_date"].as_str().map(str::to_string),
                    doi: hit["doi"].as_str().map(str::to_string),
                    url: hit["links"]["self_html"].as_str().map(str::to_string),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_records_payload() {
        let body = r#"{
            "hits": {
                "hits": [
                    {
                        "metadata": {
                            "title": "Dataset Methods",
                            "description": "A description of methods.",
                            "creators": [{"name": "Sam Hill"}],
                            "resource_type": {"type": "dataset"},
                            "publication_date": "2022-03-01"
                        },
                        "doi": "10.5281/zen.1",
                        "links": {"self_html": "https://zenodo.org/records/1"}
                    }
                ]
            }
        }"#;
        let papers = Zenodo::new().parse_response(body.as_bytes(), "application/json");
        assert_eq!(papers.len(), 1);
        assert_eq!(papers[0].document_type, "dataset");
        assert_eq!(papers[0].doi.as_deref(), Some("10.5281/zen.1"));
    }

    #[test]
    fn test_long_description_truncated() {
        let long = "x".repeat(2000);
        let body = format!(
            r#"{{"hits": {{"hits": [{{"metadata": {{"title": "T", "description": "{long}"}}}}]}}}}"#
        );
        let papers = Zenodo::new().parse_response(body.as_bytes(), "application/json");
        assert_eq!(papers[0].abstract_text.len(), 500);
    }
}
