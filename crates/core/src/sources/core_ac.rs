//! CORE aggregator API (api.core.ac.uk).
//!
//! Requires a registered API key; without one the source is skipped.

use serde_json::Value;

use super::{SourceAdapter, SourceRequest};
use crate::config;
use crate::paper::PaperDraft;

pub struct CoreAc {
    api_key: Option<String>,
}

impl CoreAc {
    pub fn new(api_key: Option<String>) -> Self {
        Self { api_key }
    }
}

impl SourceAdapter for CoreAc {
    fn tag(&self) -> &'static str {
        "core"
    }

    fn build_request(&self, query: &str, theme: &str, _language: &str) -> Option<SourceRequest> {
        let key = self.api_key.as_ref()?;
        Some(
            SourceRequest::new("https://api.core.ac.uk/v3/search/works")
                .param("q", format!("{theme} {query}"))
                .param("limit", config::MAX_RESULTS_PER_SOURCE.to_string())
                .header("Authorization", format!("Bearer {key}")),
        )
    }

    fn parse_response(&self, bytes: &[u8], _content_type: &str) -> Vec<PaperDraft> {
        let Ok(data) = serde_json::from_slice::<Value>(bytes) else {
            return Vec::new();
        };
        let Some(results) = data["results"].as_array() else {
            return Vec::new();
        };

        results
            .iter()
            .filter_map(|item| {
                let abstract_text = item["abstract"].as_str()?.to_string();
                let title = item["title"].as_str()?.to_string();
                // Authors arrive as objects or bare strings depending on the record.
                let authors = item["authors"]
                    .as_array()
                    .map(|list| {
                        list.iter()
                            .filter_map(|a| {
                                a.as_str()
                                    .map(str::to_string)
                                    .or_else(|| a["name"].as_str().map(str::to_string))
                            })
                            .collect()
                    })
                    .unwrap_or_default();

                Some(PaperDraft {
                    title,
                    abstract_text,
                    authors,
                    source: self.tag().to_string(),
                    document_type: item["documentType"]
                        .as_str()
                        .unwrap_or("article")
                        .to_string(),
                    publication_date: item["publishedDate"].as_str().map(str::to_string),
                    doi: item["doi"].as_str().map(str::to_string),
                    url: item["downloadUrl"].as_str().map(str::to_string),
                })
            })
            .collect()
    }
}
