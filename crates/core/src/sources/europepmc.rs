//! Europe PMC REST API.

use serde_json::Value;

use super::{SourceAdapter, SourceRequest};
use crate::config;
use crate::paper::PaperDraft;

pub struct EuropePmc;

impl EuropePmc {
    pub fn new() -> Self {
        Self
    }
}

impl Default for EuropePmc {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceAdapter for EuropePmc {
    fn tag(&self) -> &'static str {
        "europepmc"
    }

    fn build_request(&self, query: &str, theme: &str, _language: &str) -> Option<SourceRequest> {
        Some(
            SourceRequest::new("https://www.ebi.ac.uk/europepmc/webservices/rest/search")
                .param("query", format!("{theme} {query}"))
                .param("format", "json")
                .param("resultType", "core")
                .param("pageSize", config::MAX_RESULTS_PER_SOURCE.to_string()),
        )
    }

    fn parse_response(&self, bytes: &[u8], _content_type: &str) -> Vec<PaperDraft> {
        let Ok(data) = serde_json::from_slice::<Value>(bytes) else {
            return Vec::new();
        };
        let Some(results) = data["resultList"]["result"].as_array() else {
            return Vec::new();
        };

        results
            .iter()
            .filter_map(|result| {
                let abstract_text = result["abstractText"].as_str()?.to_string();
                let title = result["title"].as_str()?.to_string();
                let authors = result["authorString"]
                    .as_str()
                    .map(|joined| {
                        joined
                            .split(',')
                            .map(|a| a.trim().trim_end_matches('.').to_string())
                            .filter(|a| !a.is_empty())
                            .collect()
                    })
                    .unwrap_or_default();

                Some(PaperDraft {
                    title,
                    abstract_text,
                    authors,
                    source: self.tag().to_string(),
                    document_type: result["pubType"].as_str().unwrap_or("article").to_string(),
                    publication_date: result["pubYear"].as_str().map(str::to_string),
                    doi: result["doi"].as_str().map(str::to_string),
                    url: result["fullTextUrlList"]["fullTextUrl"][0]["url"]
                        .as_str()
                        .map(str::to_string),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_search_payload() {
        let body = r#"{
            "resultList": {
                "result": [
                    {
                        "title": "CRISPR Advances",
                        "abstractText": "Gene editing progress.",
                        "authorString": "Doudna J, Charpentier E.",
                        "pubType": "review",
                        "pubYear": "2021",
                        "doi": "10.3/ghi"
                    },
                    {"title": "No Abstract"}
                ]
            }
        }"#;
        let papers = EuropePmc::new().parse_response(body.as_bytes(), "application/json");
        assert_eq!(papers.len(), 1);
        assert_eq!(papers[0].authors, vec!["Doudna J", "Charpentier E"]);
        assert_eq!(papers[0].document_type, "review");
    }
}
