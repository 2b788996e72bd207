//! PL-010/011: Transport abstraction for HTTP requests with retry.
//!
//! `Transport` is the seam between the load engine and the network:
//! `http::HttpTransport` talks to the platform, `retry::RetryingClient`
//! wraps any transport with bounded retry, and tests script responses.

pub mod http;
pub mod retry;

use std::fmt;
use thiserror::Error;

/// HTTP verb used by the loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Put,
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => write!(f, "GET"),
            Self::Put => write!(f, "PUT"),
            Self::Post => write!(f, "POST"),
        }
    }
}

/// A fully-built request.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

/// Status and body of a completed exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Failure to complete an exchange at all (no status received).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("read failed: {0}")]
    Read(String),
    #[error("request failed: {0}")]
    Request(String),
}

impl TransportError {
    /// Connection and read failures are transient; malformed requests are not.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connect(_) | Self::Read(_))
    }
}

/// Anything that can execute an `HttpRequest`.
pub trait Transport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        (**self).send(request)
    }
}
