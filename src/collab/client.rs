//! HTTP client for the collaborating web service

use std::future::Future;

use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Serialize;

use super::config::CollaboratorConfig;
use super::error::CollaboratorError;

/// Endpoint for image uploads
pub const UPLOAD_IMAGE_PATH: &str = "upload-image";

/// Endpoint for person-detected notifications
pub const PERSON_DETECTED_PATH: &str = "person-detected";

#[derive(Serialize)]
struct PersonDetected<'a> {
    timestamp: &'a str,
    confidence: f64,
}

/// Client for `POST {api}/upload-image/` and `POST {api}/person-detected/`
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct CollaboratorClient {
    http: Client,
    config: CollaboratorConfig,
}

impl CollaboratorClient {
    pub fn new(config: CollaboratorConfig) -> Result<Self, CollaboratorError> {
        let http = Client::builder().build()?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &CollaboratorConfig {
        &self.config
    }

    /// Upload an encoded image as multipart `image` plus a `timestamp` field
    pub async fn upload_image(
        &self,
        image: Bytes,
        filename: &str,
        timestamp: &str,
    ) -> Result<(), CollaboratorError> {
        let url = self.config.endpoint(UPLOAD_IMAGE_PATH);

        self.with_retries("upload_image", || {
            let url = url.clone();
            let image = image.clone();
            async move {
                let part = Part::bytes(image.to_vec())
                    .file_name(filename.to_string())
                    .mime_str("image/jpeg")?;
                let form = Form::new()
                    .part("image", part)
                    .text("timestamp", timestamp.to_string());

                let response = self
                    .http
                    .post(&url)
                    .timeout(self.config.upload_timeout)
                    .multipart(form)
                    .send()
                    .await?;
                check_status(&url, response.status())
            }
        })
        .await
    }

    /// Tell the service a person was detected
    pub async fn notify_person_detected(
        &self,
        timestamp: &str,
        confidence: f64,
    ) -> Result<(), CollaboratorError> {
        let url = &self.config.endpoint(PERSON_DETECTED_PATH);
        let body = &PersonDetected {
            timestamp,
            confidence,
        };

        self.with_retries("notify_person_detected", move || async move {
            let response = self
                .http
                .post(url)
                .timeout(self.config.notify_timeout)
                .json(body)
                .send()
                .await?;
            check_status(url, response.status())
        })
        .await
    }

    async fn with_retries<F, Fut>(
        &self,
        call: &'static str,
        mut attempt: F,
    ) -> Result<(), CollaboratorError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), CollaboratorError>>,
    {
        let attempts = self.config.attempts.max(1);
        let mut n = 1;
        loop {
            match attempt().await {
                Ok(()) => return Ok(()),
                Err(e) if n < attempts => {
                    tracing::debug!(
                        call = call,
                        attempt = n,
                        error = %e,
                        "Collaborator call failed, retrying"
                    );
                    tokio::time::sleep(self.config.retry_delay).await;
                    n += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn check_status(url: &str, status: reqwest::StatusCode) -> Result<(), CollaboratorError> {
    if status.is_success() {
        Ok(())
    } else {
        Err(CollaboratorError::Status {
            endpoint: url.to_string(),
            status: status.as_u16(),
        })
    }
}
