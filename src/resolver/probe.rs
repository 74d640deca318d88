//! Collaborators consulted by the resolver.
//!
//! Each trait is one external capability. Implementations report failures as
//! [`ProbeError`]; the resolver never propagates them and folds each one into
//! its next fallback step.

use async_trait::async_trait;
use thiserror::Error;

use super::{Candidate, LinkScan};
use crate::api::ApiError;
use crate::feed::DiscoveryError;

/// Why a single probe or search produced nothing usable.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// Local fetch/parse failed
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
    /// The mailbox server's feed-search endpoints failed
    #[error(transparent)]
    Api(#[from] ApiError),
    /// Transport failure talking to a third-party service
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    /// A third-party service answered with something unusable
    #[error("search service error: {0}")]
    Service(String),
}

/// Asks a feed service whether `url` is itself a feed.
#[async_trait]
pub trait DirectFeedProbe: Send + Sync {
    async fn probe_direct(&self, url: &str) -> Result<Candidate, ProbeError>;
}

/// Server-side check of `url` as a feed document.
#[async_trait]
pub trait ProxyFeedProbe: Send + Sync {
    async fn probe_proxy(&self, url: &str) -> Result<Candidate, ProbeError>;
}

/// Server-side scrape of the HTML at `url` for feed `<link>` tags.
#[async_trait]
pub trait ProxyHtmlLinkScan: Send + Sync {
    async fn scan_links(&self, url: &str) -> Result<LinkScan, ProbeError>;
}

/// Keyword search over a feed directory.
#[async_trait]
pub trait KeywordFeedSearch: Send + Sync {
    async fn search(&self, text: &str) -> Result<Vec<Candidate>, ProbeError>;
}
