//! Plain-data HTTP types that flow through the pipeline.
//!
//! # Design
//! `WireRequest` is what a `Requestable` produces and what a `Transport`
//! consumes. It is moved into the transport once built, so nothing can
//! change it after submission. `ResponseEnvelope` is the transport's single
//! report for an operation; its body type is `Vec<u8>` for data requests and
//! a temporary file for downloads.

use std::collections::HashMap;
use std::fmt;

use crate::error::TransportError;

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Options,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Head => "HEAD",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A transport-ready HTTP request.
///
/// Built with the consuming `with_*` methods; once handed to a transport it is
/// owned there and never observed again by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireRequest {
    method: HttpMethod,
    url: String,
    headers: HashMap<String, String>,
    body: Option<Vec<u8>>,
}

impl WireRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HashMap::new(),
            body: None,
        }
    }

    /// Set a header. Names are stored lowercase, so a later value for the
    /// same name replaces an earlier one regardless of case.
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    /// Split into method, url, headers and body for a transport to consume.
    pub fn into_parts(self) -> (HttpMethod, String, HashMap<String, String>, Option<Vec<u8>>) {
        (self.method, self.url, self.headers, self.body)
    }
}

/// Per-request behaviour switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestOptions {
    /// When `false` the transport returns 3xx responses as-is and the status
    /// policy accepts them.
    pub follow_redirects: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            follow_redirects: true,
        }
    }
}

impl RequestOptions {
    pub fn no_redirects() -> Self {
        Self {
            follow_redirects: false,
        }
    }
}

/// The transport's one-time report for a submitted operation.
#[derive(Debug)]
pub struct ResponseEnvelope<B> {
    pub status: u16,
    pub body: Option<B>,
    pub error: Option<TransportError>,
}

impl<B> ResponseEnvelope<B> {
    pub fn success(status: u16, body: B) -> Self {
        Self {
            status,
            body: Some(body),
            error: None,
        }
    }

    /// A transport failure. `status` is 0 because no response was received.
    pub fn failure(error: TransportError) -> Self {
        Self {
            status: 0,
            body: None,
            error: Some(error),
        }
    }
}
