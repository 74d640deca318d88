use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use super::{ApiError, RadarClient};

/// A feed a mailbox is subscribed to, as listed by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    #[serde(default)]
    pub slug: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub title: String,
    pub url: String,
}

/// Body of a subscribe request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewSubscription {
    pub title: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
}

impl NewSubscription {
    /// A plain feed subscription (`"type": "feed"`).
    pub fn feed(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            kind: "feed".to_owned(),
            url: url.into(),
        }
    }
}

/// What the server did with an uploaded OPML document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct OpmlImportReport {
    #[serde(default)]
    pub imported: usize,
    #[serde(default)]
    pub deleted: usize,
    #[serde(default)]
    pub errors: usize,
}

#[derive(Deserialize)]
struct Created {
    slug: Option<String>,
}

#[derive(Serialize)]
struct Rename<'a> {
    title: &'a str,
}

#[derive(Deserialize)]
struct Renamed {
    title: Option<String>,
}

impl RadarClient {
    /// All subscriptions of `mailbox`, ordered by title.
    pub async fn list_subscriptions(&self, mailbox: &str) -> Result<Vec<Subscription>, ApiError> {
        let url = self.endpoint(&[mailbox, "subscriptions"])?;
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::from_status(status, format!("no mailbox at /{mailbox}")));
        }

        let mut subs: Vec<Subscription> = response.json().await?;
        subs.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(subs)
    }

    /// Subscribes `mailbox` to a feed. Returns the new subscription's slug
    /// when the server reports one.
    pub async fn add_subscription(
        &self,
        mailbox: &str,
        sub: &NewSubscription,
    ) -> Result<Option<String>, ApiError> {
        let url = self.endpoint(&[mailbox, "subscriptions"])?;
        let response = self.http.post(url).json(sub).send().await?;
        let status = response.status();
        if status != StatusCode::CREATED {
            tracing::warn!(
                mailbox = %mailbox,
                url = %sub.url,
                status = status.as_u16(),
                "Subscription rejected"
            );
            return Err(ApiError::from_status(
                status,
                format!("could not subscribe to {}", sub.url),
            ));
        }

        // The body is informational; an empty or odd one still means success.
        let body = response.text().await?;
        let slug = serde_json::from_str::<Created>(&body)
            .ok()
            .and_then(|c| c.slug);
        tracing::info!(mailbox = %mailbox, url = %sub.url, "Subscribed");
        Ok(slug)
    }

    pub async fn get_subscription(&self, mailbox: &str, sub: &str) -> Result<Subscription, ApiError> {
        let url = self.endpoint(&[mailbox, "subscriptions", sub])?;
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::from_status(
                status,
                format!("no subscription {sub} in /{mailbox}"),
            ));
        }
        let mut subscription: Subscription = response.json().await?;
        if subscription.slug.is_empty() {
            subscription.slug = sub.to_owned();
        }
        Ok(subscription)
    }

    /// Renames a subscription and returns the title the server stored.
    pub async fn update_subscription(
        &self,
        mailbox: &str,
        sub: &str,
        title: &str,
    ) -> Result<String, ApiError> {
        let url = self.endpoint(&[mailbox, "subscriptions", sub])?;
        let response = self.http.post(url).json(&Rename { title }).send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(ApiError::from_status(status, "Invalid subscription update."));
        }

        let body = response.text().await?;
        let stored = serde_json::from_str::<Renamed>(&body)
            .ok()
            .and_then(|r| r.title)
            .unwrap_or_else(|| title.to_owned());
        Ok(stored)
    }

    pub async fn delete_subscription(&self, mailbox: &str, sub: &str) -> Result<(), ApiError> {
        let url = self.endpoint(&[mailbox, "subscriptions", sub])?;
        let status = self.http.delete(url).send().await?.status();
        if status.is_success() {
            tracing::info!(mailbox = %mailbox, sub = %sub, "Unsubscribed");
            Ok(())
        } else {
            Err(ApiError::from_status(
                status,
                format!("no subscription {sub} in /{mailbox}"),
            ))
        }
    }

    /// The mailbox's subscriptions as an OPML document.
    pub async fn export_opml(&self, mailbox: &str) -> Result<String, ApiError> {
        let url = self.endpoint(&[mailbox, "feeds.opml"])?;
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::from_status(status, format!("no mailbox at /{mailbox}")));
        }
        Ok(response.text().await?)
    }

    /// Adds every feed in `opml` to the mailbox.
    pub async fn import_opml(&self, mailbox: &str, opml: String) -> Result<OpmlImportReport, ApiError> {
        let url = self.endpoint(&[mailbox, "feeds.opml"])?;
        self.send_opml(self.http.post(url), mailbox, opml).await
    }

    /// Makes the mailbox's subscriptions exactly the feeds in `opml`,
    /// deleting the rest.
    pub async fn replace_opml(&self, mailbox: &str, opml: String) -> Result<OpmlImportReport, ApiError> {
        let url = self.endpoint(&[mailbox, "feeds.opml"])?;
        self.send_opml(self.http.put(url), mailbox, opml).await
    }

    async fn send_opml(
        &self,
        request: reqwest::RequestBuilder,
        mailbox: &str,
        opml: String,
    ) -> Result<OpmlImportReport, ApiError> {
        let response = request
            .header(reqwest::header::CONTENT_TYPE, "text/x-opml")
            .body(opml)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::from_status(status, "The OPML document was rejected."));
        }

        let report: OpmlImportReport = response.json().await?;
        tracing::info!(
            mailbox = %mailbox,
            imported = report.imported,
            deleted = report.deleted,
            errors = report.errors,
            "OPML upload processed"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use wiremock::matchers::{body_json, body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> RadarClient {
        RadarClient::new(&server.uri(), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_list_sorted_by_title() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/news/subscriptions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"slug": "b", "type": "feed", "title": "Zeta", "url": "http://z.example.com/rss"},
                {"slug": "a", "type": "feed", "title": "Alpha", "url": "http://a.example.com/rss"}
            ])))
            .mount(&server)
            .await;

        let subs = client(&server).list_subscriptions("news").await.unwrap();
        let titles: Vec<_> = subs.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["Alpha", "Zeta"]);
        assert_eq!(subs[0].kind, "feed");
    }

    #[tokio::test]
    async fn test_list_unknown_mailbox() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/nope/subscriptions"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let result = client(&server).list_subscriptions("nope").await;
        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_add_subscription_posts_feed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/news/subscriptions"))
            .and(body_json(serde_json::json!({
                "title": "Example",
                "type": "feed",
                "url": "http://example.com/rss"
            })))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(serde_json::json!({"slug": "abc123"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let slug = client(&server)
            .add_subscription("news", &NewSubscription::feed("Example", "http://example.com/rss"))
            .await
            .unwrap();
        assert_eq!(slug.as_deref(), Some("abc123"));
    }

    #[tokio::test]
    async fn test_add_subscription_empty_body_still_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/news/subscriptions"))
            .respond_with(ResponseTemplate::new(201))
            .mount(&server)
            .await;

        let slug = client(&server)
            .add_subscription("news", &NewSubscription::feed("x", "http://x.example.com"))
            .await
            .unwrap();
        assert_eq!(slug, None);
    }

    #[tokio::test]
    async fn test_add_subscription_non_created_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/news/subscriptions"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let result = client(&server)
            .add_subscription("news", &NewSubscription::feed("x", "http://x.example.com"))
            .await;
        assert!(matches!(result, Err(ApiError::UnexpectedStatus(200))));
    }

    #[tokio::test]
    async fn test_get_subscription_fills_slug() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/news/subscriptions/abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "type": "feed", "title": "Example", "url": "http://example.com/rss"
            })))
            .mount(&server)
            .await;

        let sub = client(&server).get_subscription("news", "abc").await.unwrap();
        assert_eq!(
            sub,
            Subscription {
                slug: "abc".to_owned(),
                kind: "feed".to_owned(),
                title: "Example".to_owned(),
                url: "http://example.com/rss".to_owned(),
            }
        );
    }

    #[tokio::test]
    async fn test_update_subscription() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/news/subscriptions/abc"))
            .and(body_json(serde_json::json!({"title": "Renamed"})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"title": "Renamed"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/news/subscriptions/bad"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;

        let c = client(&server);
        assert_eq!(
            c.update_subscription("news", "abc", "Renamed").await.unwrap(),
            "Renamed"
        );
        assert!(matches!(
            c.update_subscription("news", "bad", "x").await,
            Err(ApiError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_subscription() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/news/subscriptions/abc"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .delete_subscription("news", "abc")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_export_opml() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/news/feeds.opml"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<opml/>"))
            .mount(&server)
            .await;

        assert_eq!(client(&server).export_opml("news").await.unwrap(), "<opml/>");
    }

    #[tokio::test]
    async fn test_import_and_replace_opml() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/news/feeds.opml"))
            .and(header("content-type", "text/x-opml"))
            .and(body_string("<opml/>"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"imported": 3, "deleted": 0, "errors": 1}),
            ))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/news/feeds.opml"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"imported": 2, "deleted": 5, "errors": 0}),
            ))
            .mount(&server)
            .await;

        let c = client(&server);
        assert_eq!(
            c.import_opml("news", "<opml/>".to_owned()).await.unwrap(),
            OpmlImportReport {
                imported: 3,
                deleted: 0,
                errors: 1
            }
        );
        assert_eq!(
            c.replace_opml("news", "<opml/>".to_owned()).await.unwrap(),
            OpmlImportReport {
                imported: 2,
                deleted: 5,
                errors: 0
            }
        );
    }

    #[tokio::test]
    async fn test_rejected_opml() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/news/feeds.opml"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;

        let result = client(&server).import_opml("news", "junk".to_owned()).await;
        assert!(matches!(result, Err(ApiError::InvalidInput(_))));
    }
}
