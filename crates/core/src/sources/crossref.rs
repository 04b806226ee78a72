//! Crossref works API.

use serde_json::Value;

use super::{SourceAdapter, SourceRequest};
use crate::config;
use crate::paper::PaperDraft;

pub struct Crossref {
    mailto: Option<String>,
}

impl Crossref {
    pub fn new(mailto: Option<String>) -> Self {
        Self { mailto }
    }
}

impl SourceAdapter for Crossref {
    fn tag(&self) -> &'static str {
        "crossref"
    }

    fn build_request(&self, query: &str, theme: &str, _language: &str) -> Option<SourceRequest> {
        let mut request = SourceRequest::new("https://api.crossref.org/works")
            .param("query", format!("{theme} {query}"))
            .param("rows", config::MAX_RESULTS_PER_SOURCE.to_string())
            .param("select", "title,author,abstract,type,DOI,URL,issued");
        if let Some(mailto) = &self.mailto {
            request = request.param("mailto", mailto.clone());
        }
        Some(request)
    }

    fn parse_response(&self, bytes: &[u8], _content_type: &str) -> Vec<PaperDraft> {
        let Ok(data) = serde_json::from_slice::<Value>(bytes) else {
            tracing::debug!("crossref payload is not JSON");
            return Vec::new();
        };
        let Some(items) = data["message"]["items"].as_array() else {
            return Vec::new();
        };

        items
            .iter()
            .filter_map(|item| {
                // Abstracts come as JATS markup; the normalizer strips it later.
                let abstract_text = item["abstract"].as_str()?.to_string();
                let title = super::string_or_first(&item["title"])?;
                let authors = item["author"]
                    .as_array()
                    .map(|list| {
                        list.iter()
                            .filter_map(|author| {
                                let family = author["family"].as_str()?;
                                Some(match author["given"].as_str() {
                                    Some(given) => format!("{given} {family}"),
                                    None => family.to_string(),
                                })
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                let publication_date = item["issued"]["date-parts"][0][0]
                    .as_i64()
                    .map(|year| year.to_string());

                Some(PaperDraft {
                    title,
                    abstract_text,
                    authors,
                    source: self.tag().to_string(),
                    document_type: item["type"].as_str().unwrap_or("article").to_string(),
                    publication_date,
                    doi: item["DOI"].as_str().map(str::to_string),
                    url: item["URL"].as_str().map(str::to_string),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_works_payload() {
        let body = r#"{
            "message": {
                "items": [
                    {
                        "title": ["Deep Learning Survey"],
                        "abstract": "<jats:p>A survey of deep models.</jats:p>",
                        "author": [{"given": "Yann", "family": "LeCun"}],
                        "type": "journal-article",
                        "DOI": "10.1/abc",
                        "URL": "https://doi.org/10.1/abc",
                        "issued": {"date-parts": [[2015, 5]]}
                    },
                    {
                        "title": ["No Abstract Here"],
                        "author": [],
                        "type": "journal-article"
                    }
                ]
            }
        }"#;
        let papers = Crossref::new(None).parse_response(body.as_bytes(), "application/json");
        assert_eq!(papers.len(), 1, "items without an abstract are dropped");
        assert_eq!(papers[0].title, "Deep Learning Survey");
        assert_eq!(papers[0].authors, vec!["Yann LeCun"]);
        assert_eq!(papers[0].publication_date.as_deref(), Some("2015"));
        assert_eq!(papers[0].doi.as_deref(), Some("10.1/abc"));
    }

    #[test]
    fn test_mailto_param_attached_when_configured() {
        let with = Crossref::new(Some("ops@example.org".to_string()))
            .build_request("q", "t", "en")
            .unwrap();
        assert!(with.params.iter().any(|(k, _)| k == "mailto"));

        let without = Crossref::new(None).build_request("q", "t", "en").unwrap();
        assert!(!without.params.iter().any(|(k, _)| k == "mailto"));
    }

    #[test]
    fn test_garbage_payload_yields_empty() {
        assert!(Crossref::new(None)
            .parse_response(b"not json", "application/json")
            .is_empty());
    }
}
