//! Directory of Open Access Journals API.

use serde_json::Value;

use super::{SourceAdapter, SourceRequest};
use crate::config;
use crate::paper::PaperDraft;

pub struct Doaj;

impl Doaj {
    pub fn new() -> Self {
        Self
    }
}

impl Default for Doaj {
    fn default() -> Self {
        Self::new()
    }
}

/// Minimal percent-encoding for a path segment.
fn encode_segment(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            b' ' => out.push_str("%20"),
            other => out.push_str(&format!("%{other:02X}")),
        }
    }
    out
}

impl SourceAdapter for Doaj {
    fn tag(&self) -> &'static str {
        "doaj"
    }

    fn build_request(&self, query: &str, theme: &str, _language: &str) -> Option<SourceRequest> {
        // DOAJ takes the query in the path, not as a parameter.
        let segment = encode_segment(&format!("{theme} {query}"));
        Some(
            SourceRequest::new(format!(
                "https://doaj.org/api/v2/search/articles/{segment}"
            ))
            .param("pageSize", config::MAX_RESULTS_PER_SOURCE.to_string()),
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
            .filter_map(|result| {
                let bibjson = &result["bibjson"];
                let abstract_text = bibjson["abstract"].as_str()?.to_string();
                let title = bibjson["title"].as_str()?.to_string();
                let authors = bibjson["author"]
                    .as_array()
                    .map(|list| {
                        list.iter()
                            .filter_map(|a| a["name"].as_str().map(str::to_string))
                            .collect()
                    })
                    .unwrap_or_default();
                let doi = bibjson["identifier"].as_array().and_then(|ids| {
                    ids.iter()
                        .find(|id| id["type"].as_str() == Some("doi"))
                        .and_then(|id| id["id"].as_str())
                        .map(str::to_string)
                });
                let url = bibjson["link"].as_array().and_then(|links| {
                    links
                        .first()
                        .and_then(|link| link["url"].as_str())
                        .map(str::to_string)
                });

                Some(PaperDraft {
                    title,
                    abstract_text,
                    authors,
                    source: self.tag().to_string(),
                    document_type: "article".to_string(),
                    publication_date: bibjson["year"].as_str().map(str::to_string),
                    doi,
                    url,
                })
            })
            .collect()
    }
}
