use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Url;

use crate::error::SyncError;
use crate::settings::ApiSettings;

use super::payload::PunchPayload;

const USER_AGENT: &str = concat!("timeclock/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// One outbound submission, with no retry or breaker logic of its own.
/// Connection-level failures come back as `SyncError::Transient`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn submit(&self, payload: &PunchPayload) -> Result<TransportResponse, SyncError>;
}

pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: Url,
    auth_token: Option<String>,
}

#[async_trait]
impl Transport for HttpTransport {
    async fn submit(&self, payload: &PunchPayload) -> Result<TransportResponse, SyncError> {
        let mut request = self.client.post(self.endpoint.clone()).json(payload);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SyncError::Transient(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| SyncError::Transient(e.to_string()))?;

        Ok(TransportResponse { status, body })
    }
}

/// Builds one HTTP client per remote dependency from immutable API settings.
#[derive(Debug, Clone)]
pub struct TransportFactory {
    api: ApiSettings,
}

impl TransportFactory {
    pub fn new(api: ApiSettings) -> Self {
        Self { api }
    }

    pub fn timesheet(&self) -> Result<HttpTransport> {
        let base = Url::parse(&self.api.base_url)
            .with_context(|| format!("invalid API base URL {}", self.api.base_url))?;
        let endpoint = base
            .join(&self.api.register_path)
            .with_context(|| format!("invalid register path {}", self.api.register_path))?;

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(self.api.request_timeout_secs))
            .build()
            .context("failed to build timesheet HTTP client")?;

        let auth_token = Some(self.api.auth_token.trim())
            .filter(|token| !token.is_empty())
            .map(str::to_string);

        Ok(HttpTransport {
            client,
            endpoint,
            auth_token,
        })
    }
}
