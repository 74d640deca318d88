//! The import table: resolved candidates the user can subscribe a mailbox to.

use std::collections::HashSet;
use std::fmt::Write as _;

use crate::api::{NewSubscription, RadarClient};
use crate::feed::OpmlFeed;
use crate::resolver::Candidate;
use crate::util::{display_width, strip_tags, truncate_to_width};

/// Two spaces plus the longest status label
const STATUS_WIDTH: usize = 10;
const TITLE_WIDTH: usize = 40;
/// Marker, its separator and the gap between title and URL
const GUTTER_WIDTH: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowStatus {
    Pending,
    Imported,
    Failed(String),
}

impl RowStatus {
    fn label(&self) -> &str {
        match self {
            RowStatus::Pending => "",
            RowStatus::Imported => "imported",
            RowStatus::Failed(_) => "failed",
        }
    }
}

/// One line of the import table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRow {
    pub title: String,
    pub url: String,
    /// The resolver could not find a feed here
    pub error: bool,
    pub status: RowStatus,
}

impl ImportRow {
    fn from_candidate(candidate: &Candidate) -> Self {
        Self {
            title: candidate
                .title
                .as_deref()
                .map(strip_tags)
                .unwrap_or_default(),
            url: candidate.url.clone(),
            error: candidate.error,
            status: RowStatus::Pending,
        }
    }

    /// The subscribe request for this row; an untitled row is named after
    /// its URL.
    pub fn to_subscription(&self) -> NewSubscription {
        let title = if self.title.is_empty() {
            self.url.clone()
        } else {
            self.title.clone()
        };
        NewSubscription::feed(title, self.url.clone())
    }
}

/// Which rows [`ImportList::import_into`] submits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImportFilter {
    All,
    #[default]
    FoundOnly,
}

impl ImportFilter {
    fn accepts(self, row: &ImportRow) -> bool {
        match self {
            ImportFilter::All => true,
            ImportFilter::FoundOnly => !row.error,
        }
    }
}

/// Totals from one [`ImportList::import_into`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub imported: usize,
    pub failed: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportList {
    rows: Vec<ImportRow>,
}

impl ImportList {
    /// Builds the table from one resolution's candidates.
    ///
    /// Rows are unique by URL (first occurrence wins, order kept); candidates
    /// with an empty URL are dropped.
    pub fn from_candidates(candidates: &[Candidate]) -> Self {
        let mut seen = HashSet::new();
        let rows = candidates
            .iter()
            .filter(|c| !c.url.is_empty() && seen.insert(c.url.as_str()))
            .map(ImportRow::from_candidate)
            .collect();
        Self { rows }
    }

    pub fn from_opml(feeds: Vec<OpmlFeed>) -> Self {
        let candidates: Vec<Candidate> = feeds.into_iter().map(Candidate::from).collect();
        Self::from_candidates(&candidates)
    }

    pub fn rows(&self) -> &[ImportRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Subscribes `mailbox` to every row the filter accepts, one request at a
    /// time, recording each outcome on its row. Rows already imported are
    /// not sent again.
    pub async fn import_into(
        &mut self,
        client: &RadarClient,
        mailbox: &str,
        filter: ImportFilter,
    ) -> ImportSummary {
        let mut summary = ImportSummary::default();

        for row in &mut self.rows {
            if row.status == RowStatus::Imported || !filter.accepts(row) {
                summary.skipped += 1;
                continue;
            }

            match client.add_subscription(mailbox, &row.to_subscription()).await {
                Ok(_) => {
                    row.status = RowStatus::Imported;
                    summary.imported += 1;
                }
                Err(e) => {
                    tracing::warn!(url = %row.url, error = %e, "Import failed");
                    row.status = RowStatus::Failed(e.to_string());
                    summary.failed += 1;
                }
            }
        }

        tracing::info!(
            mailbox = %mailbox,
            imported = summary.imported,
            failed = summary.failed,
            skipped = summary.skipped,
            "Import finished"
        );
        summary
    }

    /// Renders the table for a terminal `width` columns wide.
    ///
    /// Every line fits in `width` as long as it is at least 16 columns; the
    /// title column gives way to the URL column on narrow terminals.
    pub fn render(&self, width: usize) -> String {
        let available = width.saturating_sub(GUTTER_WIDTH + STATUS_WIDTH);
        let title_width = TITLE_WIDTH.min(available / 2);
        let columns = Columns {
            title: title_width,
            url: available - title_width,
        };

        let mut out = String::new();
        push_line(&mut out, "", "TITLE", "URL", columns);
        for row in &self.rows {
            let marker = if row.error { "!" } else { " " };
            let title = if row.error && row.title.is_empty() {
                "(no feed found)"
            } else {
                row.title.as_str()
            };
            push_line(&mut out, marker, title, &row.url, columns);
            let status = row.status.label();
            if !status.is_empty() {
                out.truncate(out.len() - 1);
                let _ = writeln!(out, "  {status}");
            }
            if let RowStatus::Failed(reason) = &row.status {
                let _ = writeln!(
                    out,
                    "    {}",
                    truncate_to_width(reason, width.saturating_sub(4))
                );
            }
        }
        out
    }
}

#[derive(Clone, Copy)]
struct Columns {
    title: usize,
    url: usize,
}

fn push_line(out: &mut String, marker: &str, title: &str, url: &str, columns: Columns) {
    let title = truncate_to_width(title, columns.title);
    let pad = columns.title - display_width(&title).min(columns.title);
    let _ = writeln!(
        out,
        "{marker:1} {title}{:pad$}  {}",
        "",
        truncate_to_width(url, columns.url)
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn found(url: &str, title: &str) -> Candidate {
        Candidate::found(url, Some(title.to_owned()))
    }

    #[test]
    fn test_dedup_first_wins() {
        let list = ImportList::from_candidates(&[
            found("http://a/rss", "First"),
            found("http://b/rss", "B"),
            found("http://a/rss", "Second"),
            Candidate::found("", Some("no url".to_owned())),
        ]);
        let urls: Vec<_> = list.rows().iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, vec!["http://a/rss", "http://b/rss"]);
        assert_eq!(list.rows()[0].title, "First");
    }

    #[test]
    fn test_titles_are_stripped() {
        let list = ImportList::from_candidates(&[
            found("http://a/rss", "<b>Rust</b> &amp; Co"),
            Candidate::failed("http://b"),
        ]);
        assert_eq!(list.rows()[0].title, "Rust & Co");
        assert_eq!(list.rows()[1].title, "");
        assert!(list.rows()[1].error);
    }

    #[test]
    fn test_to_subscription_falls_back_to_url() {
        let list = ImportList::from_candidates(&[Candidate::found("http://a/rss", None)]);
        assert_eq!(
            list.rows()[0].to_subscription(),
            NewSubscription::feed("http://a/rss", "http://a/rss")
        );
    }

    #[test]
    fn test_from_opml() {
        let list = ImportList::from_opml(vec![OpmlFeed {
            title: "Blog".to_owned(),
            xml_url: "http://blog/rss".to_owned(),
        }]);
        assert_eq!(list.len(), 1);
        assert_eq!(list.rows()[0].title, "Blog");
    }

    #[test]
    fn test_render_truncates_and_marks_errors() {
        let list = ImportList::from_candidates(&[
            found("http://a/rss", &"Long title ".repeat(10)),
            Candidate::failed("http://nothing.example.com"),
        ]);
        let rendered = list.render(80);
        let lines: Vec<_> = rendered.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].contains("..."));
        assert!(lines[2].starts_with('!'));
        assert!(lines[2].contains("(no feed found)"));
        for line in &lines {
            assert!(display_width(line) <= 80, "too wide: {line:?}");
        }
    }

    #[test]
    fn test_render_with_statuses_fits_width() {
        let mut list = ImportList::from_candidates(&[
            found(&format!("http://{}/rss", "a".repeat(120)), &"Title ".repeat(20)),
            found("http://b/rss", "日本語のフィード".repeat(6).as_str()),
            found("http://c/rss", "C"),
        ]);
        list.rows[0].status = RowStatus::Imported;
        list.rows[1].status = RowStatus::Failed("x".repeat(200));

        for width in [16, 40, 60, 73, 80, 120] {
            let rendered = list.render(width);
            assert!(rendered.contains("imported"));
            assert!(rendered.contains("failed"));
            for line in rendered.lines() {
                assert!(
                    display_width(line) <= width,
                    "width {width}, line too wide: {line:?}"
                );
            }
        }
    }

    #[tokio::test]
    async fn test_import_into_marks_rows() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/news/subscriptions"))
            .and(body_partial_json(serde_json::json!({"url": "http://good/rss"})))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/news/subscriptions"))
            .and(body_partial_json(serde_json::json!({"url": "http://bad/rss"})))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;

        let client = RadarClient::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let mut list = ImportList::from_candidates(&[
            found("http://good/rss", "Good"),
            found("http://bad/rss", "Bad"),
            Candidate::failed("http://missing"),
        ]);

        let summary = list
            .import_into(&client, "news", ImportFilter::FoundOnly)
            .await;
        assert_eq!(
            summary,
            ImportSummary {
                imported: 1,
                failed: 1,
                skipped: 1
            }
        );
        assert_eq!(list.rows()[0].status, RowStatus::Imported);
        assert!(matches!(list.rows()[1].status, RowStatus::Failed(_)));
        assert_eq!(list.rows()[2].status, RowStatus::Pending);

        // already imported rows are not sent again
        let again = list
            .import_into(&client, "news", ImportFilter::FoundOnly)
            .await;
        assert_eq!(again.skipped, 2);
    }
}
