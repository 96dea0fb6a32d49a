//! Remote store: the persistence contracts over HTTP, behind a bearer token.
//!
//! Endpoints, relative to the base URL:
//! - `GET|PUT|DELETE /assessment`: the current-layout record
//! - `GET|PUT|DELETE /legacy/{key}`: raw flat keys from older clients

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use secrecy::ExposeSecret;
use tracing::{debug, warn};

use crate::auth::AuthTokenProvider;
use crate::error::StoreError;
use crate::store::traits::{LegacyStore, PersistenceAdapter, StoreKind, StoredState};

/// HTTP-backed store for signed-in users.
pub struct RemoteStore {
    client: reqwest::Client,
    base_url: String,
    auth: Arc<dyn AuthTokenProvider>,
}

impl RemoteStore {
    pub fn new(base_url: &str, auth: Arc<dyn AuthTokenProvider>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, auth)
    }

    pub fn with_client(
        client: reqwest::Client,
        base_url: &str,
        auth: Arc<dyn AuthTokenProvider>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.auth.is_authenticated()
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, StoreError> {
        let token = self.auth.auth_token().ok_or(StoreError::Unauthenticated)?;
        let url = format!("{}{}", self.base_url, path);
        Ok(self
            .client
            .request(method, url)
            .bearer_auth(token.expose_secret()))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, StoreError> {
        request
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))
    }

    /// Turn a non-2xx response into `StoreError::Http`.
    async fn check(response: Response) -> Result<Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        warn!(status = status.as_u16(), "Remote store request rejected");
        Err(StoreError::Http {
            status: status.as_u16(),
            body,
        })
    }

    fn legacy_path(key: &str) -> String {
        format!("/legacy/{key}")
    }
}

#[async_trait]
impl PersistenceAdapter for RemoteStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Remote
    }

    async fn load_all(&self) -> Result<Option<StoredState>, StoreError> {
        let response = self.send(self.request(Method::GET, "/assessment")?).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::check(response).await?;
        let state = response
            .json::<StoredState>()
            .await
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(Some(state))
    }

    async fn save_all(&self, state: &StoredState) -> Result<(), StoreError> {
        let request = self.request(Method::PUT, "/assessment")?.json(state);
        Self::check(self.send(request).await?).await?;
        debug!(step = %state.assessment.current_step, "Assessment saved to remote store");
        Ok(())
    }

    async fn remove_all(&self) -> Result<(), StoreError> {
        let response = self.send(self.request(Method::DELETE, "/assessment")?).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Self::check(response).await?;
        Ok(())
    }
}

#[async_trait]
impl LegacyStore for RemoteStore {
    async fn read_raw(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        let response = self
            .send(self.request(Method::GET, &Self::legacy_path(key))?)
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let text = Self::check(response)
            .await?
            .text()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        // Old clients wrote some keys as bare strings rather than JSON.
        Ok(Some(
            serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text)),
        ))
    }

    async fn write_raw(&self, key: &str, value: &serde_json::Value) -> Result<(), StoreError> {
        let request = self
            .request(Method::PUT, &Self::legacy_path(key))?
            .json(value);
        Self::check(self.send(request).await?).await?;
        Ok(())
    }

    async fn delete_raw(&self, key: &str) -> Result<bool, StoreError> {
        let response = self
            .send(self.request(Method::DELETE, &Self::legacy_path(key))?)
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        Self::check(response).await?;
        Ok(true)
    }
}
