use async_trait::async_trait;

use super::{ApiError, RadarClient};
use crate::resolver::{Candidate, LinkScan, ProbeError, ProxyFeedProbe, ProxyHtmlLinkScan};

impl RadarClient {
    /// `GET /feedsearch/feed?url=...`: has the server fetch `url` and report
    /// whether it parses as a feed.
    pub async fn check_feed(&self, url: &str) -> Result<Candidate, ApiError> {
        let endpoint = self.feedsearch("feed", url)?;
        let response = self.http.get(endpoint).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::from_status(status, url));
        }
        let mut candidate: Candidate = response.json().await?;
        if candidate.url.is_empty() {
            candidate.url = url.to_owned();
        }
        Ok(candidate)
    }

    /// `GET /feedsearch/html?url=...`: has the server scrape `url` for feed
    /// `<link>` tags.
    pub async fn html_feed_links(&self, url: &str) -> Result<LinkScan, ApiError> {
        let endpoint = self.feedsearch("html", url)?;
        let response = self.http.get(endpoint).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::from_status(status, url));
        }
        Ok(response.json().await?)
    }

    fn feedsearch(&self, kind: &str, target: &str) -> Result<url::Url, ApiError> {
        let mut endpoint = self.endpoint(&["feedsearch", kind])?;
        endpoint.query_pairs_mut().append_pair("url", target);
        Ok(endpoint)
    }
}

#[async_trait]
impl ProxyFeedProbe for RadarClient {
    async fn probe_proxy(&self, url: &str) -> Result<Candidate, ProbeError> {
        Ok(self.check_feed(url).await?)
    }
}

#[async_trait]
impl ProxyHtmlLinkScan for RadarClient {
    async fn scan_links(&self, url: &str) -> Result<LinkScan, ProbeError> {
        Ok(self.html_feed_links(url).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> RadarClient {
        RadarClient::new(&server.uri(), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_check_feed_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feedsearch/feed"))
            .and(query_param("url", "http://example.com/rss?x=1&y=2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "url": "http://example.com/rss?x=1&y=2",
                "title": "Example",
                "error": false
            })))
            .expect(1)
            .mount(&server)
            .await;

        let candidate = client(&server)
            .check_feed("http://example.com/rss?x=1&y=2")
            .await
            .unwrap();
        assert_eq!(
            candidate,
            Candidate::found("http://example.com/rss?x=1&y=2", Some("Example".to_owned()))
        );
    }

    #[tokio::test]
    async fn test_check_feed_reports_error_flag() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feedsearch/feed"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"error": true})),
            )
            .mount(&server)
            .await;

        let candidate = client(&server)
            .check_feed("http://example.com/page")
            .await
            .unwrap();
        assert_eq!(candidate, Candidate::failed("http://example.com/page"));
    }

    #[tokio::test]
    async fn test_html_links_as_strings_and_objects() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feedsearch/html"))
            .and(query_param("url", "http://example.com"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "links": [
                    "http://example.com/rss",
                    {"url": "http://example.com/atom", "title": "Atom"}
                ]
            })))
            .mount(&server)
            .await;

        let scan = client(&server)
            .html_feed_links("http://example.com")
            .await
            .unwrap();
        assert_eq!(
            scan,
            LinkScan::new(vec![
                "http://example.com/rss".to_owned(),
                "http://example.com/atom".to_owned(),
            ])
        );
    }

    #[tokio::test]
    async fn test_html_links_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feedsearch/html"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let result = client(&server).scan_links("http://example.com").await;
        assert!(matches!(
            result,
            Err(ProbeError::Api(ApiError::UnexpectedStatus(502)))
        ));
    }
}
