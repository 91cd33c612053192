use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{Client, Response, StatusCode, Url};

use crate::models::cloud::{CloudDocument, CloudMeta, UploadReceipt};
use crate::models::document::Document;
use crate::services::cloud_store::{CloudError, CloudStore};
use crate::services::session::AuthSession;

/// Client for the classbook sync API.
#[derive(Clone)]
pub struct HttpCloudStore {
    client: Client,
    base_url: Url,
    session: AuthSession,
}

impl HttpCloudStore {
    pub fn new(base_url: &str, session: AuthSession, timeout: Duration) -> anyhow::Result<Self> {
        let base_url = Url::parse(base_url)?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("cloud URL cannot be a base: {}", base_url);
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url,
            session,
        })
    }

    fn document_url(&self, user_id: &str, meta: bool) -> Result<Url, CloudError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| CloudError::Backend("invalid cloud URL".into()))?;
            segments.pop_if_empty().extend(["users", user_id, "document"]);
            if meta {
                segments.push("meta");
            }
        }
        Ok(url)
    }

    fn bearer(&self) -> Result<String, CloudError> {
        self.session
            .current()
            .map(|identity| identity.token)
            .ok_or(CloudError::Unauthenticated)
    }
}

fn send_error(e: reqwest::Error) -> CloudError {
    if e.is_decode() {
        CloudError::Backend(format!("unexpected response body: {e}"))
    } else {
        CloudError::Network(e.to_string())
    }
}

async fn check_status(response: Response) -> Result<Response, CloudError> {
    match response.status() {
        s if s.is_success() => Ok(response),
        StatusCode::UNAUTHORIZED => Err(CloudError::Unauthenticated),
        StatusCode::FORBIDDEN => Err(CloudError::Forbidden),
        StatusCode::NOT_FOUND => Err(CloudError::NotFound),
        status => {
            let text = response.text().await.unwrap_or_default();
            tracing::warn!("Sync API error {}: {}", status, text);
            Err(CloudError::Backend(format!("{status}: {text}")))
        }
    }
}

impl CloudStore for HttpCloudStore {
    async fn upload(&self, user_id: &str, doc: &Document) -> Result<UploadReceipt, CloudError> {
        let token = self.bearer()?;
        let url = self.document_url(user_id, false)?;
        let response = self
            .client
            .put(url)
            .bearer_auth(token)
            .json(doc)
            .send()
            .await
            .map_err(send_error)?;
        check_status(response)
            .await?
            .json::<UploadReceipt>()
            .await
            .map_err(send_error)
    }

    async fn download(&self, user_id: &str) -> Result<CloudDocument, CloudError> {
        let token = self.bearer()?;
        let url = self.document_url(user_id, false)?;
        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(send_error)?;
        check_status(response)
            .await?
            .json::<CloudDocument>()
            .await
            .map_err(send_error)
    }

    async fn last_updated(&self, user_id: &str) -> Result<Option<DateTime<Utc>>, CloudError> {
        let token = self.bearer()?;
        let url = self.document_url(user_id, true)?;
        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(send_error)?;
        let meta = check_status(response)
            .await?
            .json::<CloudMeta>()
            .await
            .map_err(send_error)?;
        Ok(meta.last_updated)
    }
}
