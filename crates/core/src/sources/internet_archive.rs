//! Internet Archive Scholar full-text search.

use serde_json::Value;

use super::{SourceAdapter, SourceRequest};
use crate::config;
use crate::paper::PaperDraft;

pub struct InternetArchive;

impl InternetArchive {
    pub fn new() -> Self {
        Self
    }
}

impl Default for InternetArchive {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceAdapter for InternetArchive {
    fn tag(&self) -> &'static str {
        "internet_archive"
    }

    fn build_request(&self, query: &str, theme: &str, _language: &str) -> Option<SourceRequest> {
        Some(
            SourceRequest::new("https://scholar.archive.org/search")
                .param("q", format!("{theme} {query}"))
                .param("limit", config::MAX_RESULTS_PER_SOURCE.to_string())
                .header("Accept", "application/json"),
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
                let biblio = &item["biblio"];
                let abstract_text = item["fulltext"]["abstract"].as_str()?.to_string();
                let title = biblio["title"].as_str()?.to_string();
                let authors = biblio["contrib_names"]
                    .as_array()
                    .map(|list| {
                        list.iter()
                            .filter_map(|n| n.as_str().map(str::to_string))
                            .collect()
                    })
                    .unwrap_or_default();
                let doi = biblio["doi"].as_str().map(str::to_string);
                let url = item["access"][0]["access_url"]
                    .as_str()
                    .map(str::to_string)
                    .or_else(|| doi.as_ref().map(|d| format!("https://doi.org/{d}")));

                Some(PaperDraft {
                    title,
                    abstract_text,
                    authors,
                    source: self.tag().to_string(),
                    document_type: biblio["type"].as_str().unwrap_or("article").to_string(),
                    publication_date: biblio["year"].as_i64().map(|y| y.to_string()),
                    doi,
                    url,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scholar_payload() {
        let body = r#"{
            "results": [
                {
                    "biblio": {
                        "title": "Archived Study",
                        "contrib_names": ["Ivan Petrov"],
                        "doi": "10.7/pqr",
                        "year": 2016,
                        "type": "article"
                    },
                    "fulltext": {"abstract": "A recovered abstract."},
                    "access": [{"access_url": "https://archive.org/item/1"}]
                },
                {"biblio": {"title": "No Fulltext"}, "fulltext": {}}
            ]
        }"#;
        let papers = InternetArchive::new().parse_response(body.as_bytes(), "application/json");
        assert_eq!(papers.len(), 1);
        assert_eq!(papers[0].url.as_deref(), Some("https://archive.org/item/1"));
    }

    #[test]
    fn test_doi_url_fallback() {
        let body = r#"{
            "results": [
                {
                    "biblio": {"title": "T", "doi": "10.7/xyz"},
                    "fulltext": {"abstract": "A."},
                    "access": []
                }
            ]
        }"#;
        let papers = InternetArchive::new().parse_response(body.as_bytes(), "application/json");
        assert_eq!(papers[0].url.as_deref(), Some("https://doi.org/10.7/xyz"));
    }
}
