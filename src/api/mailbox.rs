use reqwest::StatusCode;
use serde::Serialize;

use super::{ApiError, RadarClient};
use crate::slug::validate_slug;

#[derive(Serialize)]
struct MailboxInfo<'a> {
    title: &'a str,
}

impl RadarClient {
    /// True when nothing is served at `/<slug>` yet (the server answers 404).
    pub async fn slug_available(&self, slug: &str) -> Result<bool, ApiError> {
        let url = self.endpoint(&[slug])?;
        let status = self.http.head(url).send().await?.status();
        tracing::debug!(slug = %slug, status = status.as_u16(), "Checked slug");
        Ok(status == StatusCode::NOT_FOUND)
    }

    /// `PUT /<slug>` with the mailbox title.
    pub async fn create_mailbox(&self, slug: &str, title: &str) -> Result<(), ApiError> {
        let url = self.endpoint(&[slug])?;
        let response = self
            .http
            .put(url)
            .json(&MailboxInfo { title })
            .send()
            .await?;

        match response.status() {
            StatusCode::CREATED => {
                tracing::info!(slug = %slug, title = %title, "Created mailbox");
                Ok(())
            }
            StatusCode::CONFLICT => Err(ApiError::Conflict("This url is already in use.".into())),
            StatusCode::BAD_REQUEST => Err(ApiError::InvalidInput("Invalid name.".into())),
            other => {
                tracing::warn!(slug = %slug, status = other.as_u16(), "Mailbox creation failed");
                Err(ApiError::from_status(
                    other,
                    "Could not create a mailbox at the specified location.",
                ))
            }
        }
    }

    /// The whole create-mailbox form flow: validate the slug locally, make
    /// sure nothing lives there yet, then create it.
    pub async fn create_mailbox_checked(&self, slug: &str, title: &str) -> Result<(), ApiError> {
        validate_slug(slug)?;
        if !self.slug_available(slug).await? {
            return Err(ApiError::Conflict(
                "This url is reserved or already in use.".into(),
            ));
        }
        self.create_mailbox(slug, title).await
    }

    pub async fn delete_mailbox(&self, slug: &str) -> Result<(), ApiError> {
        let url = self.endpoint(&[slug])?;
        let status = self.http.delete(url).send().await?.status();
        if status.is_success() {
            tracing::info!(slug = %slug, "Deleted mailbox");
            Ok(())
        } else {
            Err(ApiError::from_status(status, format!("no mailbox at /{slug}")))
        }
    }
}
