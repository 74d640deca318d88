//! Keyword feed search over a configurable HTTP directory service.
//!
//! The service is addressed through a URL template containing `{query}`,
//! e.g. `https://directory.example.com/search?q={query}`. Its response is
//! either a JSON array of `{url, title}` entries or an object wrapping that
//! array under `entries`.

use async_trait::async_trait;
use serde::Deserialize;

use crate::resolver::{Candidate, KeywordFeedSearch, ProbeError};
use crate::util::strip_control_chars;

const QUERY_PLACEHOLDER: &str = "{query}";

#[derive(Deserialize)]
struct SearchEntry {
    #[serde(default)]
    url: String,
    #[serde(default)]
    title: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SearchResponse {
    Bare(Vec<SearchEntry>),
    Wrapped {
        #[serde(default)]
        entries: Vec<SearchEntry>,
    },
}

impl SearchResponse {
    fn into_entries(self) -> Vec<SearchEntry> {
        match self {
            SearchResponse::Bare(entries) | SearchResponse::Wrapped { entries } => entries,
        }
    }
}

/// [`KeywordFeedSearch`] backed by an HTTP directory.
///
/// Without a template every search returns no results, which the resolver
/// turns into a single error candidate.
#[derive(Debug, Clone)]
pub struct HttpKeywordSearch {
    client: reqwest::Client,
    template: Option<String>,
}

impl HttpKeywordSearch {
    pub fn new(client: reqwest::Client, template: Option<String>) -> Self {
        let template = template.filter(|t| !t.trim().is_empty());
        if let Some(t) = &template {
            if !t.contains(QUERY_PLACEHOLDER) {
                tracing::warn!(template = %t, "Keyword search URL has no {{query}} placeholder");
            }
        }
        Self { client, template }
    }

    pub fn is_configured(&self) -> bool {
        self.template.is_some()
    }

    fn search_url(template: &str, text: &str) -> String {
        let encoded: String = url::form_urlencoded::byte_serialize(text.as_bytes()).collect();
        template.replace(QUERY_PLACEHOLDER, &encoded)
    }
}

#[async_trait]
impl KeywordFeedSearch for HttpKeywordSearch {
    async fn search(&self, text: &str) -> Result<Vec<Candidate>, ProbeError> {
        let Some(template) = &self.template else {
            tracing::debug!("No keyword search service configured");
            return Ok(Vec::new());
        };

        let response = self
            .client
            .get(Self::search_url(template, text))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::Service(format!("HTTP {}", status.as_u16())));
        }

        let body: SearchResponse = response.json().await?;
        Ok(body
            .into_entries()
            .into_iter()
            .filter(|e| !e.url.trim().is_empty())
            .map(|e| {
                let title = e
                    .title
                    .map(|t| strip_control_chars(&t).into_owned())
                    .filter(|t| !t.is_empty());
                Candidate::found(e.url.trim(), title)
            })
            .collect())
    }
}
