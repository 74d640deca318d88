use serde::{Deserialize, Deserializer, Serialize};

/// One possible feed produced by a resolution, or a failed probe.
///
/// The wire shape matches the mailbox server's `/feedsearch/feed` response:
/// `{"url": "...", "title": "...", "error": false}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub error: bool,
}

impl Candidate {
    /// A feed that was found at `url`.
    pub fn found(url: impl Into<String>, title: Option<String>) -> Self {
        Self {
            url: url.into(),
            title,
            error: false,
        }
    }

    /// A probe that found nothing at `url`.
    pub fn failed(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: None,
            error: true,
        }
    }

    pub fn is_feed(&self) -> bool {
        !self.error
    }
}

/// Result of scanning an HTML page for feed `<link>` tags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkScan {
    #[serde(default, deserialize_with = "deserialize_links")]
    pub links: Vec<String>,
    #[serde(default)]
    pub error: bool,
}

impl LinkScan {
    pub fn new(links: Vec<String>) -> Self {
        Self {
            links,
            error: false,
        }
    }

    pub fn failed() -> Self {
        Self {
            links: Vec::new(),
            error: true,
        }
    }
}

/// Older servers send each link as `{"url": ..., "title": ...}` instead of a
/// bare string.
#[derive(Deserialize)]
#[serde(untagged)]
enum LinkEntry {
    Url(String),
    Described { url: String },
}

fn deserialize_links<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let entries = Option::<Vec<LinkEntry>>::deserialize(deserializer)?;
    Ok(entries
        .unwrap_or_default()
        .into_iter()
        .map(|entry| match entry {
            LinkEntry::Url(url) | LinkEntry::Described { url } => url,
        })
        .collect())
}

/// A user-supplied search string after classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    /// An `http://` or `https://` URL (`feed://` already rewritten).
    Url(String),
    /// Free-text search terms.
    Text(String),
}

impl Query {
    /// Classifies a raw query.
    ///
    /// Surrounding whitespace is ignored. The `feed://` pseudo-scheme is
    /// rewritten to `http://` so both spellings resolve identically.
    ///
    /// ```
    /// use feedscout::resolver::Query;
    ///
    /// assert_eq!(
    ///     Query::parse("feed://example.com/rss"),
    ///     Query::Url("http://example.com/rss".to_owned())
    /// );
    /// assert_eq!(Query::parse("rust news"), Query::Text("rust news".to_owned()));
    /// ```
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();

        if let Some(rest) = strip_prefix_ignore_case(trimmed, "feed://") {
            return Query::Url(format!("http://{rest}"));
        }

        if strip_prefix_ignore_case(trimmed, "http://").is_some()
            || strip_prefix_ignore_case(trimmed, "https://").is_some()
        {
            return Query::Url(trimmed.to_owned());
        }

        Query::Text(trimmed.to_owned())
    }

    pub fn as_str(&self) -> &str {
        match self {
            Query::Url(s) | Query::Text(s) => s,
        }
    }

    pub fn is_url(&self) -> bool {
        matches!(self, Query::Url(_))
    }
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &s[prefix.len()..])
}
