//! PL-010: HTTP transport over a pooled blocking reqwest client.
//!
//! One client per run so connections are reused across rows. The request
//! timeout is fixed at construction.

use super::{HttpRequest, HttpResponse, Method, Transport, TransportError};
use std::time::Duration;

pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("pxload/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::Request(format!("cannot build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Put => self.client.put(&request.url),
            Method::Post => self.client.post(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        let response = builder.send().map_err(classify)?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(|e| TransportError::Read(e.to_string()))?;
        Ok(HttpResponse { status, body })
    }
}

/// Sort a reqwest failure into the retryable/non-retryable buckets.
fn classify(e: reqwest::Error) -> TransportError {
    if e.is_connect() {
        TransportError::Connect(e.to_string())
    } else if e.is_timeout() || e.is_body() || e.is_decode() {
        TransportError::Read(e.to_string())
    } else if e.is_builder() {
        TransportError::Request(e.to_string())
    } else {
        TransportError::Connect(e.to_string())
    }
}
