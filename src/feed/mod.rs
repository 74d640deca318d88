//! Local feed handling: discovery over HTTP and OPML subscription lists.
//!
//! - `discovery` fetches URLs in-process, parses RSS/Atom with `feed-rs` and
//!   scans HTML pages for advertised feeds; [`LocalDiscovery`] plugs into the
//!   resolver as direct probe, proxy probe and link scanner
//! - `opml` reads OPML files into import-table candidates

mod discovery;
mod opml;

pub use discovery::{DiscoveredFeed, DiscoveryError, LocalDiscovery};
pub use opml::{parse, parse_opml_content, OpmlError, OpmlFeed};
