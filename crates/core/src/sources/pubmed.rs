//! PubMed E-utilities.
//!
//! Two-phase flow through the driver's follow-up hook: `esearch` resolves
//! matching PMIDs as JSON, then `efetch` retrieves the records as XML.

use quick_xml::events::Event;
use quick_xml::Reader;
use serde_json::Value;

use super::{SourceAdapter, SourceRequest};
use crate::config;
use crate::paper::PaperDraft;

/// How many resolved ids to fetch records for.
const FETCH_IDS: usize = 3;

pub struct PubMed;

impl PubMed {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PubMed {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
struct ArticleAccumulator {
    title: String,
    abstract_text: String,
    last_name: String,
    fore_name: String,
    authors: Vec<String>,
    year: String,
    doi: String,
}

impl SourceAdapter for PubMed {
    fn tag(&self) -> &'static str {
        "pubmed"
    }

    fn build_request(&self, query: &str, theme: &str, _language: &str) -> Option<SourceRequest> {
        Some(
            SourceRequest::new("https://eutils.ncbi.nlm.nih.gov/entrez/eutils/esearch.fcgi")
                .param("db", "pubmed")
                .param("term", format!("{theme} {query}"))
                .param("retmax", config::MAX_RESULTS_PER_SOURCE.to_string())
                .param("retmode", "json"),
        )
    }

    fn follow_up(&self, bytes: &[u8]) -> Option<SourceRequest> {
        let data: Value = serde_json::from_slice(bytes).ok()?;
        let ids: Vec<&str> = data["esearchresult"]["idlist"]
            .as_array()?
            .iter()
            .filter_map(|id| id.as_str())
            .take(FETCH_IDS)
            .collect();
        if ids.is_empty() {
            return None;
        }
        Some(
            SourceRequest::new("https://eutils.ncbi.nlm.nih.gov/entrez/eutils/efetch.fcgi")
                .param("db", "pubmed")
                .param("id", ids.join(","))
                .param("retmode", "xml"),
        )
    }

    fn parse_response(&self, bytes: &[u8], _content_type: &str) -> Vec<PaperDraft> {
        // With no follow-up issued (no ids), the driver hands back the
        // esearch JSON; it contains no records.
        if bytes.first() == Some(&b'{') {
            return Vec::new();
        }

        let mut reader = Reader::from_reader(bytes);
        reader.config_mut().trim_text(true);

        let mut papers = Vec::new();
        let mut article: Option<ArticleAccumulator> = None;
        let mut field: Option<&'static str> = None;
        let mut in_doi = false;
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(start)) => match start.local_name().as_ref() {
                    b"PubmedArticle" => article = Some(ArticleAccumulator::default()),
                    b"ArticleTitle" => field = Some("title"),
                    b"AbstractText" => field = Some("abstract"),
                    b"LastName" => field = Some("last"),
                    b"ForeName" => field = Some("fore"),
                    b"Year" => field = Some("year"),
                    b"ArticleId" => {
                        in_doi = start
                            .try_get_attribute("IdType")
                            .ok()
                            .flatten()
                            .map(|attr| attr.value.as_ref() == b"doi")
                            .unwrap_or(false);
                        field = in_doi.then_some("doi");
                    }
                    _ => field = None,
                },
                Ok(Event::Text(text)) => {
                    if let (Some(accumulator), Some(field)) = (article.as_mut(), field) {
                        let value = text.unescape().unwrap_or_default();
                        let value = value.trim();
                        match field {
                            "title" => accumulator.title.push_str(value),
                            "abstract" => {
                                if !accumulator.abstract_text.is_empty() {
                                    accumulator.abstract_text.push(' ');
                                }
                                accumulator.abstract_text.push_str(value);
                            }
                            "last" => accumulator.last_name = value.to_string(),
                            "fore" => accumulator.fore_name = value.to_string(),
                            "year" => {
                                if accumulator.year.is_empty() {
                                    accumulator.year = value.to_string();
                                }
                            }
                            "doi" => accumulator.doi.push_str(value),
                            _ => {}
                        }
                    }
                }
                Ok(Event::End(end)) => {
                    match end.local_name().as_ref() {
                        b"Author" => {
                            if let Some(accumulator) = article.as_mut() {
                                if !accumulator.last_name.is_empty() {
                                    let name = if accumulator.fore_name.is_empty() {
                                        accumulator.last_name.clone()
                                    } else {
                                        format!(
                                            "{} {}",
                                            accumulator.fore_name, accumulator.last_name
                                        )
                                    };
                                    accumulator.authors.push(name);
                                }
                                accumulator.last_name.clear();
                                accumulator.fore_name.clear();
                            }
                        }
                        b"PubmedArticle" => {
                            if let Some(accumulator) = article.take() {
                                if !accumulator.abstract_text.is_empty() {
                                    papers.push(PaperDraft {
                                        title: accumulator.title,
                                        abstract_text: accumulator.abstract_text,
                                        authors: accumulator.authors,
                                        source: self.tag().to_string(),
                                        document_type: "article".to_string(),
                                        publication_date: (!accumulator.year.is_empty())
                                            .then_some(accumulator.year),
                                        doi: (!accumulator.doi.is_empty())
                                            .then_some(accumulator.doi),
                                        url: None,
                                    });
                                }
                            }
                        }
                        b"ArticleId" => {
                            in_doi = false;
                            field = None;
                        }
                        _ => field = None,
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    tracing::debug!(error = %e, "pubmed record parse aborted");
                    break;
                }
                _ => {}
            }
            buf.clear();
        }

        papers
    }
}
