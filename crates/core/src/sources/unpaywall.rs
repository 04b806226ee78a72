//! Unpaywall search API.
//!
//! Unpaywall requires a contact email on every call; without one the source
//! is skipped. Search results carry no abstracts, so papers from here only
//! survive downstream when another source supplies the same work with one.

use serde_json::Value;

use super::{SourceAdapter, SourceRequest};
use crate::paper::PaperDraft;

pub struct Unpaywall {
    email: Option<String>,
}

impl Unpaywall {
    pub fn new(email: Option<String>) -> Self {
        Self { email }
    }
}

impl SourceAdapter for Unpaywall {
    fn tag(&self) -> &'static str {
        "unpaywall"
    }

    fn build_request(&self, query: &str, theme: &str, _language: &str) -> Option<SourceRequest> {
        let email = self.email.as_ref()?;
        Some(
            SourceRequest::new("https://api.unpaywall.org/v2/search")
                .param("query", format!("{theme} {query}"))
                .param("email", email.clone()),
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
            .filter_map(|entry| {
                let response = &entry["response"];
                let title = response["title"].as_str()?.to_string();
                let authors = response["z_authors"]
                    .as_array()
                    .map(|list| {
                        list.iter()
                            .filter_map(|a| {
                                let family = a["family"].as_str()?;
                                Some(match a["given"].as_str() {
                                    Some(given) => format!("{given} {family}"),
                                    None => family.to_string(),
                                })
                            })
                            .collect()
                    })
                    .unwrap_or_default();

                Some(PaperDraft {
                    title,
                    abstract_text: String::new(),
                    authors,
                    source: self.tag().to_string(),
                    document_type: response["genre"].as_str().unwrap_or("article").to_string(),
                    publication_date: response["year"].as_i64().map(|y| y.to_string()),
                    doi: response["doi"].as_str().map(str::to_string),
                    url: response["best_oa_location"]["url"].as_str().map(str::to_string),
                })
            })
            .collect()
    }
}
