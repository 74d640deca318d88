use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

use super::Candidate;

/// Identifies one resolution started through a [`SearchSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResolutionToken(u64);

impl ResolutionToken {
    /// Token used by resolutions that are not attached to any session.
    pub(crate) const DETACHED: ResolutionToken = ResolutionToken(0);

    pub fn sequence(self) -> u64 {
        self.0
    }
}

/// The collaborator a resolution is currently waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Direct,
    Proxy,
    Scan,
    /// Verifying discovered links one at a time
    Verify { done: usize, total: usize },
    Search,
}

/// Progress of the session's current resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionState {
    Idle,
    Probing(Stage),
    Done { found: usize },
    Cancelled,
}

impl std::fmt::Display for ResolutionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolutionState::Idle => f.write_str("idle"),
            ResolutionState::Probing(Stage::Direct) => f.write_str("checking feed URL"),
            ResolutionState::Probing(Stage::Proxy) => f.write_str("checking feed URL via server"),
            ResolutionState::Probing(Stage::Scan) => f.write_str("looking for feeds on page"),
            ResolutionState::Probing(Stage::Verify { done, total }) => {
                write!(f, "verifying discovered feeds ({done}/{total})")
            }
            ResolutionState::Probing(Stage::Search) => f.write_str("searching"),
            ResolutionState::Done { found } => write!(f, "done, {found} result(s)"),
            ResolutionState::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// What a resolution produced, before the call site checks its token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Complete(Vec<Candidate>),
    /// A newer resolution started (or the session was cancelled) while this
    /// one was in flight; it stopped at the next collaborator boundary.
    Superseded,
}

/// A resolution outcome together with the token it was started under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tagged {
    pub token: ResolutionToken,
    pub outcome: Outcome,
}

struct Inner {
    sequence: AtomicU64,
    state: watch::Sender<ResolutionState>,
}

/// Last-query-wins bookkeeping for a search box.
///
/// Every [`begin`](Self::begin) hands out a fresh token and makes all earlier
/// tokens stale; [`cancel`](Self::cancel) makes every token stale. Results
/// are only handed over by [`deliver`](Self::deliver) when their token is
/// still current, so at most one resolution's results ever reach the caller.
/// In-flight network calls are not aborted; their results are dropped.
#[derive(Clone)]
pub struct SearchSession {
    inner: Arc<Inner>,
}

impl SearchSession {
    pub fn new() -> Self {
        let (state, _) = watch::channel(ResolutionState::Idle);
        Self {
            inner: Arc::new(Inner {
                sequence: AtomicU64::new(0),
                state,
            }),
        }
    }

    /// Starts a new resolution, superseding any in flight.
    pub fn begin(&self) -> ResolutionToken {
        let seq = self.inner.sequence.fetch_add(1, Ordering::AcqRel) + 1;
        self.inner.state.send_replace(ResolutionState::Idle);
        tracing::debug!(sequence = seq, "Resolution started");
        ResolutionToken(seq)
    }

    /// Discards whatever resolution is in flight.
    pub fn cancel(&self) {
        let seq = self.inner.sequence.fetch_add(1, Ordering::AcqRel) + 1;
        self.inner.state.send_replace(ResolutionState::Cancelled);
        tracing::debug!(sequence = seq, "Resolution cancelled");
    }

    pub fn is_current(&self, token: ResolutionToken) -> bool {
        self.inner.sequence.load(Ordering::Acquire) == token.0
    }

    /// Hands over `tagged`'s candidates if its token is still current.
    pub fn deliver(&self, tagged: Tagged) -> Option<Vec<Candidate>> {
        match tagged.outcome {
            Outcome::Complete(candidates) if self.is_current(tagged.token) => Some(candidates),
            _ => {
                tracing::debug!(
                    sequence = tagged.token.0,
                    "Dropping results from superseded resolution"
                );
                None
            }
        }
    }

    /// Watches the progress of whichever resolution is current.
    pub fn subscribe(&self) -> watch::Receiver<ResolutionState> {
        self.inner.state.subscribe()
    }

    pub fn state(&self) -> ResolutionState {
        self.inner.state.borrow().clone()
    }

    /// Publishes `state` on behalf of `token`; stale tokens are ignored.
    pub(crate) fn publish(&self, token: ResolutionToken, state: ResolutionState) {
        self.inner.state.send_if_modified(|current| {
            if self.is_current(token) && *current != state {
                *current = state;
                true
            } else {
                false
            }
        });
    }
}

impl Default for SearchSession {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SearchSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchSession")
            .field("sequence", &self.inner.sequence.load(Ordering::Relaxed))
            .field("state", &*self.inner.state.borrow())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete(token: ResolutionToken, url: &str) -> Tagged {
        Tagged {
            token,
            outcome: Outcome::Complete(vec![Candidate::found(url, None)]),
        }
    }

    #[test]
    fn test_tokens_increase() {
        let session = SearchSession::new();
        let a = session.begin();
        let b = session.begin();
        assert!(b > a);
        assert!(!session.is_current(a));
        assert!(session.is_current(b));
    }

    #[test]
    fn test_only_latest_is_delivered() {
        let session = SearchSession::new();
        let a = session.begin();
        let b = session.begin();

        assert_eq!(session.deliver(complete(a, "http://a")), None);
        assert_eq!(
            session.deliver(complete(b, "http://b")),
            Some(vec![Candidate::found("http://b", None)])
        );
    }

    #[test]
    fn test_cancel_drops_in_flight_results() {
        let session = SearchSession::new();
        let a = session.begin();
        session.cancel();

        assert_eq!(session.deliver(complete(a, "http://a")), None);
        assert_eq!(session.state(), ResolutionState::Cancelled);
    }

    #[test]
    fn test_superseded_outcome_never_delivered() {
        let session = SearchSession::new();
        let a = session.begin();
        let tagged = Tagged {
            token: a,
            outcome: Outcome::Superseded,
        };
        assert_eq!(session.deliver(tagged), None);
    }

    #[test]
    fn test_stale_token_cannot_publish() {
        let session = SearchSession::new();
        let a = session.begin();
        let b = session.begin();

        session.publish(a, ResolutionState::Probing(Stage::Scan));
        assert_eq!(session.state(), ResolutionState::Idle);

        session.publish(b, ResolutionState::Probing(Stage::Direct));
        assert_eq!(session.state(), ResolutionState::Probing(Stage::Direct));
    }

    #[tokio::test]
    async fn test_subscribers_see_progress() {
        let session = SearchSession::new();
        let mut rx = session.subscribe();
        let token = session.begin();
        session.publish(token, ResolutionState::Done { found: 2 });

        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), ResolutionState::Done { found: 2 });
    }

    #[test]
    fn test_clones_share_sequence() {
        let session = SearchSession::new();
        let other = session.clone();
        let a = session.begin();
        other.begin();
        assert!(!session.is_current(a));
    }
}
