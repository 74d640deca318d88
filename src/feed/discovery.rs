use async_trait::async_trait;
use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;

use crate::resolver::{
    Candidate, DirectFeedProbe, LinkScan, ProbeError, ProxyFeedProbe, ProxyHtmlLinkScan,
};
use crate::util::{strip_control_chars, validate_url};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_DISCOVERY_SIZE: usize = 5 * 1024 * 1024; // 5MB

/// Metadata read from a feed document.
#[derive(Debug, Clone)]
pub struct DiscoveredFeed {
    /// Feed title, "Untitled Feed" when the document has none
    pub title: String,
    /// URL the feed was fetched from
    pub feed_url: String,
}

impl From<DiscoveredFeed> for Candidate {
    fn from(feed: DiscoveredFeed) -> Self {
        Candidate::found(feed.feed_url, Some(feed.title))
    }
}

/// Errors from fetching and inspecting a URL locally.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The URL failed validation (SSRF, bad scheme, etc.)
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    /// The document is not RSS/Atom
    #[error("not a feed: no RSS/Atom content found")]
    NotAFeed,
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("request timed out")]
    Timeout,
    /// Response body exceeded the 5MB size limit
    #[error("response too large")]
    TooLarge,
}

/// In-process feed discovery: fetch a URL and look at it ourselves.
///
/// Stands in for both the third-party feed service (as the direct probe) and
/// the mailbox server's `/feedsearch` endpoints (as proxy probe and link
/// scanner) when running without a server.
#[derive(Debug, Clone)]
pub struct LocalDiscovery {
    client: reqwest::Client,
    timeout: Duration,
    allow_private_hosts: bool,
}

impl LocalDiscovery {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            timeout: DEFAULT_TIMEOUT,
            allow_private_hosts: false,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Skips the localhost/private-range checks, for feeds served on a LAN.
    pub fn allow_private_hosts(mut self, allow: bool) -> Self {
        self.allow_private_hosts = allow;
        self
    }

    /// Fetches `url` and parses it as an RSS/Atom document.
    ///
    /// # Errors
    ///
    /// [`DiscoveryError::NotAFeed`] when the body does not parse as a feed;
    /// otherwise validation, network, timeout or size errors.
    pub async fn probe_feed(&self, url: &str) -> Result<DiscoveredFeed, DiscoveryError> {
        let target = self.check(url)?;
        let bytes = self.fetch(&target).await?;
        parse_feed_bytes(&bytes, url)
    }

    /// Fetches the HTML page at `url` and returns every feed it advertises
    /// with `<link rel="alternate">`, resolved to absolute URLs in document
    /// order.
    pub async fn scan_feed_links(&self, url: &str) -> Result<Vec<String>, DiscoveryError> {
        let url = self.check(url)?;
        let bytes = self.fetch(&url).await?;
        let html = String::from_utf8_lossy(&bytes);
        Ok(find_feed_links_in_html(&html, &url))
    }

    fn check(&self, url: &str) -> Result<String, DiscoveryError> {
        if self.allow_private_hosts {
            return url::Url::parse(url)
                .map(|u| u.to_string())
                .map_err(|e| DiscoveryError::InvalidUrl(e.to_string()));
        }
        validate_url(url)
            .map(|u| u.to_string())
            .map_err(|e| DiscoveryError::InvalidUrl(e.to_string()))
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, DiscoveryError> {
        let response = tokio::time::timeout(self.timeout, self.client.get(url).send())
            .await
            .map_err(|_| DiscoveryError::Timeout)??;

        let status = response.status();
        if !status.is_success() {
            return Err(DiscoveryError::HttpStatus(status.as_u16()));
        }

        tokio::time::timeout(self.timeout, read_limited(response))
            .await
            .map_err(|_| DiscoveryError::Timeout)?
    }
}

#[async_trait]
impl DirectFeedProbe for LocalDiscovery {
    async fn probe_direct(&self, url: &str) -> Result<Candidate, ProbeError> {
        Ok(self.probe_feed(url).await?.into())
    }
}

#[async_trait]
impl ProxyFeedProbe for LocalDiscovery {
    async fn probe_proxy(&self, url: &str) -> Result<Candidate, ProbeError> {
        match self.probe_feed(url).await {
            Ok(feed) => Ok(feed.into()),
            Err(DiscoveryError::NotAFeed) => Ok(Candidate::failed(url)),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl ProxyHtmlLinkScan for LocalDiscovery {
    async fn scan_links(&self, url: &str) -> Result<LinkScan, ProbeError> {
        Ok(LinkScan::new(self.scan_feed_links(url).await?))
    }
}

/// Reads a response body, giving up past the 5MB limit.
async fn read_limited(response: reqwest::Response) -> Result<Vec<u8>, DiscoveryError> {
    if let Some(len) = response.content_length() {
        if len > MAX_DISCOVERY_SIZE as u64 {
            return Err(DiscoveryError::TooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > MAX_DISCOVERY_SIZE {
            return Err(DiscoveryError::TooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}

fn parse_feed_bytes(bytes: &[u8], feed_url: &str) -> Result<DiscoveredFeed, DiscoveryError> {
    let feed = feed_rs::parser::parse(bytes).map_err(|_| DiscoveryError::NotAFeed)?;

    // SEC-016: feed metadata is attacker-controlled and printed to the terminal
    let title = feed
        .title
        .map(|t| strip_control_chars(t.content.trim()).into_owned())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "Untitled Feed".to_owned());

    Ok(DiscoveredFeed {
        title,
        feed_url: feed_url.to_owned(),
    })
}

/// Collects the targets of `<link rel="alternate">` tags with an RSS or Atom
/// type. Plain string scanning; attribute order and quote style may vary.
fn find_feed_links_in_html(html: &str, base_url: &str) -> Vec<String> {
    // ASCII-only lowering keeps every byte offset valid in `html`.
    let lower = html.to_ascii_lowercase();
    let mut links = Vec::new();
    let mut from = 0;

    while let Some(pos) = lower[from..].find("<link") {
        let start = from + pos;
        let Some(len) = lower[start..].find('>') else {
            break;
        };
        let end = start + len + 1;
        let tag = &lower[start..end];

        if has_attr_value(tag, "rel", "alternate") && is_feed_type(tag) {
            if let Some(href) = attr_value(&html[start..end], "href") {
                links.push(resolve_url(href.trim(), base_url));
            }
        }

        from = end;
    }

    links
}

/// Matches `name="value"` or a space-separated list starting with `value`.
fn has_attr_value(tag: &str, name: &str, value: &str) -> bool {
    ['"', '\''].iter().any(|q| {
        tag.contains(&format!("{name}={q}{value}{q}"))
            || tag.contains(&format!("{name}={q}{value} "))
    })
}

fn is_feed_type(tag: &str) -> bool {
    tag.contains("application/rss+xml") || tag.contains("application/atom+xml")
}

/// Case-preserving attribute lookup on a single tag.
fn attr_value<'a>(tag: &'a str, name: &str) -> Option<&'a str> {
    let lower = tag.to_ascii_lowercase();
    let prefix = format!("{name}=");

    // Require whitespace before the name so `data-href=` does not match.
    let mut search = 0;
    let value_start = loop {
        let found = search + lower[search..].find(&prefix)?;
        let preceded_by_space = lower[..found]
            .chars()
            .next_back()
            .is_some_and(char::is_whitespace);
        if preceded_by_space {
            break found + prefix.len();
        }
        search = found + prefix.len();
    };

    let rest = &tag[value_start..];
    let quote = rest.chars().next()?;
    if quote != '"' && quote != '\'' {
        return None;
    }
    let inner = &rest[1..];
    let end = inner.find(quote)?;
    Some(&inner[..end])
}

/// Resolves a possibly relative href against the page it came from.
fn resolve_url(href: &str, base_url: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_owned();
    }

    // protocol-relative: assume https
    if href.starts_with("//") {
        if let Ok(parsed) = url::Url::parse(&format!("https:{href}")) {
            return parsed.to_string();
        }
    }

    url::Url::parse(base_url)
        .and_then(|base| base.join(href))
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_owned())
}
