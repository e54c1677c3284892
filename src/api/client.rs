use std::time::Duration;

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::config::Config;
use crate::error::ApiError;

/// Standard response envelope returned by every endpoint.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub code: String,
    #[serde(default)]
    pub message: Option<String>,
    pub data: Option<T>,
    #[serde(default)]
    pub meta: Option<PageMeta>,
}

impl<T> Envelope<T> {
    /// Reason string for a non-OKAY envelope.
    pub fn reason(&self) -> String {
        self.message.clone().unwrap_or_else(|| self.code.clone())
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageMeta {
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub total_pages: u32,
}

/// Core HTTP client for the compute-management API.
/// Handles authentication, request building, and error classification.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    timeout: Duration,
}

impl ApiClient {
    pub fn new(cfg: &Config) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .user_agent(format!("fleetwatch/{}", env!("CARGO_PKG_VERSION")))
            .timeout(cfg.fetch_timeout)
            .build()
            .map_err(|e| ApiError::Network(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            base_url: crate::config::sanitize_base_url(&cfg.api_base_url),
            token: cfg.api_token.clone(),
            timeout: cfg.fetch_timeout,
        })
    }

    /// Perform one API call and decode the envelope. Auth failures map to
    /// `ApiError::Auth`; everything transport-level maps to
    /// `Network`/`Timeout`; a body we cannot decode maps to `Protocol`.
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        params: &[(&str, String)],
        body: Option<Value>,
    ) -> Result<Envelope<T>, ApiError> {
        let url = format!("{}{}", self.base_url, endpoint);
        debug!(%method, %url, "api request");

        let mut req = self.http.request(method, &url);
        if !self.token.is_empty() {
            req = req.header("API-Token", &self.token);
        }
        if !params.is_empty() {
            req = req.query(params);
        }
        if let Some(ref b) = body {
            req = req.json(b);
        }

        let resp = req.send().await.map_err(|e| self.classify(e))?;
        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ApiError::Auth(format!("{} from {}", status, endpoint)));
        }
        if status.is_server_error() {
            return Err(ApiError::Network(format!("{} from {}", status, endpoint)));
        }

        resp.json::<Envelope<T>>()
            .await
            .map_err(|e| ApiError::Protocol(format!("undecodable response from {}: {}", endpoint, e)))
    }

    fn classify(&self, err: reqwest::Error) -> ApiError {
        if err.is_timeout() {
            ApiError::Timeout(self.timeout)
        } else {
            ApiError::Network(err.to_string())
        }
    }
}
