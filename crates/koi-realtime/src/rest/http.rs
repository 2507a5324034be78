//! reqwest-backed REST API implementation.

use async_trait::async_trait;
use tracing::debug;

use koi_core::config::rest::RestConfig;
use koi_core::error::{ClientError, ErrorKind};
use koi_core::result::ClientResult;
use koi_core::types::UserId;

use crate::message::types::ChatMessage;

use super::api::RestApi;

/// REST client for the Koi backend.
#[derive(Debug, Clone)]
pub struct HttpRestApi {
    http: reqwest::Client,
    base_url: String,
    bearer_token: String,
}

impl HttpRestApi {
    /// Builds a client from configuration and a bearer credential.
    pub fn new(config: &RestConfig, bearer_token: impl Into<String>) -> ClientResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| {
                ClientError::with_source(ErrorKind::Rest, format!("HTTP client build failed: {e}"), e)
            })?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            bearer_token: bearer_token.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

#[async_trait]
impl RestApi for HttpRestApi {
    async fn create_message(&self, message: &ChatMessage) -> ClientResult<ChatMessage> {
        debug!(message_id = %message.id, "Persisting message over REST");

        let response = self
            .http
            .post(self.url("/api/messages"))
            .bearer_auth(&self.bearer_token)
            .json(message)
            .send()
            .await
            .map_err(|e| {
                ClientError::with_source(ErrorKind::Rest, format!("message POST failed: {e}"), e)
            })?
            .error_for_status()
            .map_err(|e| {
                ClientError::with_source(ErrorKind::Rest, format!("message POST rejected: {e}"), e)
            })?;

        response.json::<ChatMessage>().await.map_err(|e| {
            ClientError::with_source(ErrorKind::Rest, format!("message response invalid: {e}"), e)
        })
    }

    async fn presence_snapshot(&self) -> ClientResult<Vec<UserId>> {
        let response = self
            .http
            .get(self.url("/api/presence"))
            .bearer_auth(&self.bearer_token)
            .send()
            .await
            .map_err(|e| {
                ClientError::with_source(ErrorKind::Rest, format!("presence GET failed: {e}"), e)
            })?
            .error_for_status()
            .map_err(|e| {
                ClientError::with_source(ErrorKind::Rest, format!("presence GET rejected: {e}"), e)
            })?;

        response.json::<Vec<UserId>>().await.map_err(|e| {
            ClientError::with_source(ErrorKind::Rest, format!("presence response invalid: {e}"), e)
        })
    }
}
