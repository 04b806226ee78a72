//! HAL (Hyper Articles en Ligne), the French open archive.
//!
//! HAL is Solr-backed: most fields arrive as singleton arrays.

use serde_json::Value;

use super::{string_or_first, SourceAdapter, SourceRequest};
use crate::config;
use crate::paper::PaperDraft;

pub struct Hal;

impl Hal {
    pub fn new() -> Self {
        Self
    }
}

impl Default for Hal {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceAdapter for Hal {
    fn tag(&self) -> &'static str {
        "hal"
    }

    fn build_request(&self, query: &str, theme: &str, _language: &str) -> Option<SourceRequest> {
        Some(
            SourceRequest::new("https://api.archives-ouvertes.fr/search/")
                .param("q", format!("{theme} {query}"))
                .param("rows", config::MAX_RESULTS_PER_SOURCE.to_string())
                .param("wt", "json")
                .param(
                    "fl",
                    "title_s,authFullName_s,abstract_s,doiId_s,uri_s,producedDateY_i,docType_s",
                ),
        )
    }

    fn parse_response(&self, bytes: &[u8], _content_type: &str) -> Vec<PaperDraft> {
        let Ok(data) = serde_json::from_slice::<Value>(bytes) else {
            return Vec::new();
        };
        let Some(docs) = data["response"]["docs"].as_array() else {
            return Vec::new();
        };

        docs.iter()
            .filter_map(|doc| {
                let abstract_text = string_or_first(&doc["abstract_s"])?;
                let title = string_or_first(&doc["title_s"])?;
                let authors = doc["authFullName_s"]
                    .as_array()
                    .map(|list| {
                        list.iter()
                            .filter_map(|a| a.as_str().map(str::to_string))
                            .collect()
                    })
                    .unwrap_or_default();

                Some(PaperDraft {
                    title,
                    abstract_text,
                    authors,
                    source: self.tag().to_string(),
                    document_type: doc["docType_s"].as_str().unwrap_or("article").to_string(),
                    publication_date: doc["producedDateY_i"].as_i64().map(|y| y.to_string()),
                    doi: doc["doiId_s"].as_str().map(str::to_string),
                    url: doc["uri_s"].as_str().map(str::to_string),
                })
            })
            .collect()
    }
}
