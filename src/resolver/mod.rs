//! Feed resolution: turning a URL or search terms into candidate feeds.
//!
//! - [`Query`] classifies input and rewrites the `feed://` pseudo-scheme
//! - [`FeedResolver`] walks the fallback chain over four collaborators
//!   ([`DirectFeedProbe`], [`ProxyFeedProbe`], [`ProxyHtmlLinkScan`],
//!   [`KeywordFeedSearch`])
//! - [`SearchSession`] hands out [`ResolutionToken`]s so only the latest
//!   query's results are delivered
//!
//! # Example
//!
//! ```ignore
//! let session = SearchSession::new();
//! let tagged = resolver.resolve_tagged(&session, "feed://example.com/rss").await;
//! if let Some(candidates) = session.deliver(tagged) {
//!     let table = ImportList::from_candidates(&candidates);
//! }
//! ```

mod candidate;
mod chain;
mod probe;
mod session;

pub use candidate::{Candidate, LinkScan, Query};
pub use chain::FeedResolver;
pub use probe::{DirectFeedProbe, KeywordFeedSearch, ProbeError, ProxyFeedProbe, ProxyHtmlLinkScan};
pub use session::{Outcome, ResolutionState, ResolutionToken, SearchSession, Stage, Tagged};
