//! PL-012: Platform API endpoints and request construction.

use super::error::LoadError;
use super::types::RunSettings;
use crate::transport::http::HttpTransport;
use crate::transport::retry::{RetryPolicy, RetryingClient};
use crate::transport::{HttpRequest, HttpResponse, Method, Transport, TransportError};
use reqwest::Url;
use std::time::Duration;

/// Header carrying the API key.
pub const API_KEY_HEADER: &str = "X-APTRINSIC-API-KEY";

/// Binds a transport to a base URL and credentials.
pub struct PlatformApi<T> {
    base_url: String,
    api_key: String,
    transport: T,
}

impl<T: Transport> PlatformApi<T> {
    pub fn new(base_url: &str, api_key: &str, transport: T) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            transport,
        }
    }

    /// Absolute URL for a path relative to the base URL.
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Absolute URL of one record within a collection endpoint. The key
    /// is percent-encoded as a single path segment.
    pub fn record_url(&self, endpoint: &str, key: &str) -> Result<String, LoadError> {
        let base = self.url(endpoint);
        let mut url = Url::parse(&base)
            .map_err(|e| LoadError::Config(format!("invalid base URL '{}': {}", base, e)))?;
        url.path_segments_mut()
            .map_err(|_| LoadError::Config(format!("base URL '{}' cannot take a path", base)))?
            .pop_if_empty()
            .push(key);
        Ok(url.into())
    }

    pub fn request(
        &self,
        method: Method,
        url: String,
        body: Option<serde_json::Value>,
    ) -> HttpRequest {
        let mut headers = vec![
            (API_KEY_HEADER.to_string(), self.api_key.clone()),
            ("Accept".to_string(), "application/json".to_string()),
        ];
        if body.is_some() {
            headers.push(("Content-Type".to_string(), "application/json".to_string()));
        }
        HttpRequest {
            method,
            url,
            headers,
            body,
        }
    }

    pub fn get(&self, path: &str) -> Result<HttpResponse, TransportError> {
        let req = self.request(Method::Get, self.url(path), None);
        self.transport.send(&req)
    }

    pub fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self.transport.send(request)
    }
}

/// The production stack: pooled HTTP client behind the retry policy.
pub type LiveApi = PlatformApi<RetryingClient<HttpTransport>>;

impl LiveApi {
    /// Build the run's single client from validated settings.
    pub fn connect(settings: &RunSettings) -> Result<Self, LoadError> {
        let timeout = Duration::try_from_secs_f64(settings.http.timeout_seconds).map_err(|e| {
            LoadError::Config(format!(
                "http.timeoutSeconds {}: {}",
                settings.http.timeout_seconds, e
            ))
        })?;
        let http = HttpTransport::new(timeout)?;
        let client = RetryingClient::new(http, RetryPolicy::from(&settings.http));
        Ok(Self::new(&settings.base_url, &settings.api_key, client))
    }
}
