//! arXiv Atom API.

use quick_xml::events::Event;
use quick_xml::Reader;

use super::{SourceAdapter, SourceRequest};
use crate::config;
use crate::paper::PaperDraft;

pub struct Arxiv;

impl Arxiv {
    pub fn new() -> Self {
        Self
    }
}

impl Default for Arxiv {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
struct EntryAccumulator {
    title: String,
    summary: String,
    authors: Vec<String>,
    published: String,
    id: String,
}

impl SourceAdapter for Arxiv {
    fn tag(&self) -> &'static str {
        "arxiv"
    }

    fn build_request(&self, query: &str, theme: &str, _language: &str) -> Option<SourceRequest> {
        Some(
            SourceRequest::new("http://export.arxiv.org/api/query")
                .param("search_query", format!("all:{theme} {query}"))
                .param("start", "0")
                .param("max_results", config::MAX_RESULTS_PER_SOURCE.to_string()),
        )
    }

    fn parse_response(&self, bytes: &[u8], _content_type: &str) -> Vec<PaperDraft> {
        let mut reader = Reader::from_reader(bytes);
        reader.config_mut().trim_text(true);

        let mut papers = Vec::new();
        let mut entry: Option<EntryAccumulator> = None;
        let mut in_author = false;
        let mut field: Option<&'static str> = None;
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(start)) => match start.local_name().as_ref() {
                    b"entry" => entry = Some(EntryAccumulator::default()),
                    b"author" => in_author = true,
                    b"title" if entry.is_some() => field = Some("title"),
                    b"summary" => field = Some("summary"),
                    b"published" => field = Some("published"),
                    b"id" if entry.is_some() => field = Some("id"),
                    b"name" if in_author => field = Some("name"),
                    _ => field = None,
                },
                Ok(Event::Text(text)) => {
                    if let (Some(accumulator), Some(field)) = (entry.as_mut(), field) {
                        let value = text.unescape().unwrap_or_default();
                        let value = value.trim();
                        match field {
                            "title" => accumulator.title.push_str(value),
                            "summary" => {
                                if !accumulator.summary.is_empty() {
                                    accumulator.summary.push(' ');
                                }
                                accumulator.summary.push_str(value);
                            }
                            "published" => accumulator.published.push_str(value),
                            "id" => accumulator.id.push_str(value),
                            "name" => accumulator.authors.push(value.to_string()),
                            _ => {}
                        }
                    }
                }
                Ok(Event::End(end)) => match end.local_name().as_ref() {
                    b"entry" => {
                        if let Some(accumulator) = entry.take() {
                            if !accumulator.summary.is_empty() {
                                papers.push(PaperDraft {
                                    title: accumulator.title,
                                    abstract_text: accumulator.summary,
                                    authors: accumulator.authors,
                                    source: self.tag().to_string(),
                                    document_type: "preprint".to_string(),
                                    publication_date: accumulator
                                        .published
                                        .get(..4)
                                        .map(str::to_string),
                                    doi: None,
                                    url: (!accumulator.id.is_empty())
                                        .then_some(accumulator.id),
                                });
                            }
                        }
                    }
                    b"author" => in_author = false,
                    _ => field = None,
                },
                Ok(Event::Eof) => break,
                Err(e) => {
                    tracing::debug!(error = %e, "arxiv feed parse aborted");
                    break;
                }
                _ => {}
            }
            buf.clear();
        }

        papers
    }
}
