use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use super::probe::{DirectFeedProbe, KeywordFeedSearch, ProbeError, ProxyFeedProbe, ProxyHtmlLinkScan};
use super::session::{Outcome, ResolutionState, ResolutionToken, SearchSession, Stage, Tagged};
use super::{Candidate, Query};

/// Raised at a collaborator boundary once the run's token went stale.
struct Superseded;

/// Per-resolution context: the session (if any) and the token it runs under.
struct Run<'a> {
    session: Option<&'a SearchSession>,
    token: ResolutionToken,
}

impl Run<'_> {
    fn checkpoint(&self) -> Result<(), Superseded> {
        match self.session {
            Some(session) if !session.is_current(self.token) => Err(Superseded),
            _ => Ok(()),
        }
    }

    fn enter(&self, stage: Stage) {
        tracing::debug!(sequence = self.token.sequence(), ?stage, "Probing");
        if let Some(session) = self.session {
            session.publish(self.token, ResolutionState::Probing(stage));
        }
    }

    fn finish(&self, found: usize) {
        if let Some(session) = self.session {
            session.publish(self.token, ResolutionState::Done { found });
        }
    }
}

/// Turns a query into candidate feeds by walking a fixed fallback chain.
///
/// For URL queries: direct probe, then proxy probe, then an HTML link scan
/// whose links are each verified with the proxy probe, one after another.
/// For free text: keyword search. The first step that finds a feed wins;
/// every failure is folded into the next step and, at the end of the chain,
/// into a single error candidate.
#[derive(Clone)]
pub struct FeedResolver {
    direct: Arc<dyn DirectFeedProbe>,
    proxy: Arc<dyn ProxyFeedProbe>,
    scanner: Arc<dyn ProxyHtmlLinkScan>,
    search: Arc<dyn KeywordFeedSearch>,
}

impl FeedResolver {
    pub fn new(
        direct: Arc<dyn DirectFeedProbe>,
        proxy: Arc<dyn ProxyFeedProbe>,
        scanner: Arc<dyn ProxyHtmlLinkScan>,
        search: Arc<dyn KeywordFeedSearch>,
    ) -> Self {
        Self {
            direct,
            proxy,
            scanner,
            search,
        }
    }

    /// Resolves `query` to completion, outside any session.
    pub async fn resolve(&self, query: &str) -> Vec<Candidate> {
        let run = Run {
            session: None,
            token: ResolutionToken::DETACHED,
        };
        self.run(&run, query).await.unwrap_or_default()
    }

    /// Starts a new resolution in `session`, superseding any in flight.
    pub async fn resolve_tagged(&self, session: &SearchSession, query: &str) -> Tagged {
        let token = session.begin();
        self.resolve_with(session, token, query).await
    }

    /// Runs a resolution under a token the caller already obtained from
    /// [`SearchSession::begin`].
    ///
    /// The token is checked after every collaborator call; once it is stale
    /// the chain stops and the outcome is [`Outcome::Superseded`]. Callers
    /// hand the returned [`Tagged`] to [`SearchSession::deliver`].
    pub async fn resolve_with(
        &self,
        session: &SearchSession,
        token: ResolutionToken,
        query: &str,
    ) -> Tagged {
        let run = Run {
            session: Some(session),
            token,
        };
        let outcome = match self.run(&run, query).await {
            Ok(candidates) => {
                run.finish(candidates.len());
                Outcome::Complete(candidates)
            }
            Err(Superseded) => {
                tracing::debug!(sequence = token.sequence(), "Resolution superseded");
                Outcome::Superseded
            }
        };
        Tagged { token, outcome }
    }

    /// Runs a resolution in `session` until it completes or `cancel` fires,
    /// passing each progress update to `on_progress`.
    ///
    /// `cancel` is awaited once across the whole resolution. Returns `None`
    /// when cancelled or superseded.
    pub async fn resolve_until<C>(
        &self,
        session: &SearchSession,
        query: &str,
        cancel: C,
        mut on_progress: impl FnMut(&ResolutionState),
    ) -> Option<Vec<Candidate>>
    where
        C: Future,
    {
        let token = session.begin();
        let mut progress = session.subscribe();
        let work = self.resolve_with(session, token, query);
        tokio::pin!(work, cancel);

        let tagged = loop {
            tokio::select! {
                // Pending progress is reported before cancel or completion.
                biased;
                Ok(()) = progress.changed() => on_progress(&progress.borrow_and_update()),
                _ = &mut cancel => {
                    session.cancel();
                    return None;
                }
                tagged = &mut work => break tagged,
            }
        };
        session.deliver(tagged)
    }

    async fn run(&self, run: &Run<'_>, raw: &str) -> Result<Vec<Candidate>, Superseded> {
        run.checkpoint()?;
        let candidates = match Query::parse(raw) {
            Query::Url(url) => self.resolve_url(run, &url).await?,
            Query::Text(text) => self.resolve_text(run, &text).await?,
        };
        tracing::info!(
            query = %raw,
            candidates = candidates.len(),
            found = candidates.iter().filter(|c| c.is_feed()).count(),
            "Resolution complete"
        );
        Ok(candidates)
    }

    async fn resolve_url(&self, run: &Run<'_>, url: &str) -> Result<Vec<Candidate>, Superseded> {
        run.enter(Stage::Direct);
        let direct = self.direct.probe_direct(url).await;
        run.checkpoint()?;
        if let Some(feed) = accept("direct", url, direct) {
            return Ok(vec![feed]);
        }

        run.enter(Stage::Proxy);
        let proxied = self.proxy.probe_proxy(url).await;
        run.checkpoint()?;
        if let Some(feed) = accept("proxy", url, proxied) {
            return Ok(vec![feed]);
        }

        run.enter(Stage::Scan);
        let scan = self.scanner.scan_links(url).await;
        run.checkpoint()?;
        let links = match scan {
            Ok(scan) if !scan.error => distinct_links(scan.links),
            Ok(_) => Vec::new(),
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "HTML link scan failed");
                Vec::new()
            }
        };

        if links.is_empty() {
            return Ok(vec![Candidate::failed(url)]);
        }

        // Verified serially, in discovery order.
        let total = links.len();
        let mut verified = Vec::with_capacity(total);
        for (done, link) in links.into_iter().enumerate() {
            run.enter(Stage::Verify { done, total });
            let probe = self.proxy.probe_proxy(&link).await;
            run.checkpoint()?;
            verified.push(match probe {
                Ok(candidate) => candidate,
                Err(e) => {
                    tracing::debug!(url = %link, error = %e, "Discovered link failed verification");
                    Candidate::failed(link)
                }
            });
        }

        Ok(verified)
    }

    async fn resolve_text(&self, run: &Run<'_>, text: &str) -> Result<Vec<Candidate>, Superseded> {
        run.enter(Stage::Search);
        let results = self.search.search(text).await;
        run.checkpoint()?;
        match results {
            Ok(candidates) if !candidates.is_empty() => Ok(candidates),
            Ok(_) => Ok(vec![Candidate::failed(text)]),
            Err(e) => {
                tracing::debug!(query = %text, error = %e, "Keyword search failed");
                Ok(vec![Candidate::failed(text)])
            }
        }
    }
}

/// Keeps a probe result only if it is a feed.
fn accept(step: &str, url: &str, result: Result<Candidate, ProbeError>) -> Option<Candidate> {
    match result {
        Ok(candidate) if candidate.is_feed() => Some(candidate),
        Ok(_) => {
            tracing::debug!(step, url = %url, "Probe found no feed");
            None
        }
        Err(e) => {
            tracing::debug!(step, url = %url, error = %e, "Probe failed");
            None
        }
    }
}

/// Drops blank and repeated links, keeping first-seen order.
fn distinct_links(links: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    links
        .into_iter()
        .map(|l| l.trim().to_owned())
        .filter(|l| !l.is_empty() && seen.insert(l.clone()))
        .collect()
}
