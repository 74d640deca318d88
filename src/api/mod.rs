//! Typed client for the radar mailbox server.
//!
//! The server is REST-like: mailboxes live at `/<slug>`, their subscriptions
//! at `/<slug>/subscriptions[/<sub>]`, and `/feedsearch/*` proxies feed
//! discovery. Every non-success status is mapped onto [`ApiError`] so callers
//! can branch on conflict / invalid input / not found the way a form would.

mod feedsearch;
mod mailbox;
mod subscriptions;

pub use subscriptions::{NewSubscription, OpmlImportReport, Subscription};

use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::slug::SlugError;

/// Failures talking to the mailbox server.
#[derive(Debug, Error)]
pub enum ApiError {
    /// 404, or the probe found nothing
    #[error("not found: {0}")]
    NotFound(String),
    /// 409, typically a slug already in use
    #[error("{0}")]
    Conflict(String),
    /// 400, or input rejected before sending
    #[error("{0}")]
    InvalidInput(String),
    /// 401/403
    #[error("not authorized (check username and password)")]
    Unauthorized,
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("unexpected response status {0}")]
    UnexpectedStatus(u16),
    #[error("invalid server URL: {0}")]
    InvalidUrl(String),
}

impl From<SlugError> for ApiError {
    fn from(e: SlugError) -> Self {
        ApiError::InvalidInput(e.to_string())
    }
}

impl ApiError {
    /// Maps a non-success status to an error, using `what` as the message for
    /// the statuses that carry one.
    pub(crate) fn from_status(status: StatusCode, what: impl Into<String>) -> Self {
        match status {
            StatusCode::NOT_FOUND => ApiError::NotFound(what.into()),
            StatusCode::CONFLICT => ApiError::Conflict(what.into()),
            StatusCode::BAD_REQUEST => ApiError::InvalidInput(what.into()),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApiError::Unauthorized,
            other => ApiError::UnexpectedStatus(other.as_u16()),
        }
    }
}

#[derive(Serialize)]
struct Credentials<'a> {
    username: &'a str,
    password: &'a str,
}

/// Handle on one mailbox server.
///
/// Cheap to clone; clones share the underlying connection pool and cookie
/// jar, so a login on one clone authenticates them all.
#[derive(Debug, Clone)]
pub struct RadarClient {
    http: reqwest::Client,
    base: Url,
}

impl RadarClient {
    /// Builds a client with its own cookie-keeping HTTP client.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(timeout)
            .user_agent(concat!("feedscout/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Self::with_client(http, base_url)
    }

    pub fn with_client(http: reqwest::Client, base_url: &str) -> Result<Self, ApiError> {
        let base = Url::parse(base_url).map_err(|e| ApiError::InvalidUrl(e.to_string()))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(ApiError::InvalidUrl(format!(
                "unsupported scheme: {}",
                base.scheme()
            )));
        }
        Ok(Self { http, base })
    }

    /// The underlying HTTP client, for sharing with local discovery.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Starts a session; the session cookie is kept for later requests.
    pub async fn login(&self, username: &str, password: &SecretString) -> Result<(), ApiError> {
        let url = self.endpoint(&["login"])?;
        let response = self
            .http
            .post(url)
            .json(&Credentials {
                username,
                password: password.expose_secret(),
            })
            .send()
            .await?;

        match response.status() {
            s if s.is_success() || s == StatusCode::NOT_MODIFIED => {
                tracing::info!(username = %username, "Logged in");
                Ok(())
            }
            StatusCode::UNAUTHORIZED => Err(ApiError::Unauthorized),
            s => Err(ApiError::from_status(s, "login rejected")),
        }
    }

    /// Joins path segments onto the base URL, percent-encoding each one.
    pub(crate) fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base.clone();
        url.set_query(None);
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}
