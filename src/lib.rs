//! feedscout: find feeds behind URLs and search terms, and manage the
//! subscriptions of radar mailboxes.
//!
//! The resolver in [`resolver`] is independent of any transport; [`api`],
//! [`feed`] and [`search`] supply the HTTP-backed collaborators it consults.

pub mod api;
pub mod config;
pub mod feed;
pub mod import;
pub mod resolver;
pub mod search;
pub mod slug;
pub mod util;
