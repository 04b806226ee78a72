//! Semantic Scholar graph API.

use serde_json::Value;

use super::{SourceAdapter, SourceRequest};
use crate::config;
use crate::paper::PaperDraft;

pub struct SemanticScholar {
    api_key: Option<String>,
}

impl SemanticScholar {
    pub fn new(api_key: Option<String>) -> Self {
        Self { api_key }
    }
}

impl SourceAdapter for SemanticScholar {
    fn tag(&self) -> &'static str {
        "semantic_scholar"
    }

    fn build_request(&self, query: &str, theme: &str, _language: &str) -> Option<SourceRequest> {
        // Works without a key at a lower rate; the key only raises the quota.
        let mut request =
            SourceRequest::new("https://api.semanticscholar.org/graph/v1/paper/search")
                .param("query", format!("{theme} {query}"))
                .param("limit", config::MAX_RESULTS_PER_SOURCE.to_string())
                .param(
                    "fields",
                    "title,abstract,authors,publicationTypes,year,externalIds,url",
                );
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key.clone());
        }
        Some(request)
    }

    fn parse_response(&self, bytes: &[u8], _content_type: &str) -> Vec<PaperDraft> {
        let Ok(data) = serde_json::from_slice::<Value>(bytes) else {
            return Vec::new();
        };
        let Some(items) = data["data"].as_array() else {
            return Vec::new();
        };

        items
            .iter()
            .filter_map(|paper| {
                let abstract_text = paper["abstract"].as_str()?.to_string();
                let title = paper["title"].as_str()?.to_string();
                let authors = paper["authors"]
                    .as_array()
                    .map(|list| {
                        list.iter()
                            .filter_map(|a| a["name"].as_str().map(str::to_string))
                            .collect()
                    })
                    .unwrap_or_default();
                let document_type = paper["publicationTypes"]
                    .as_array()
                    .and_then(|types| types.first())
                    .and_then(|t| t.as_str())
                    .unwrap_or("article")
                    .to_string();

                Some(PaperDraft {
                    title,
                    abstract_text,
                    authors,
                    source: self.tag().to_string(),
                    document_type,
                    publication_date: paper["year"].as_i64().map(|y| y.to_string()),
                    doi: paper["externalIds"]["DOI"].as_str().map(str::to_string),
                    url: paper["url"].as_str().map(str::to_string),
                })
            })
            .collect()
    }
}
