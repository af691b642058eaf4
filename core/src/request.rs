//! Domain requests and the builders that turn them into `WireRequest`s.
//!
//! # Design
//! `Requestable` is the only thing the dispatcher needs from a request. It is
//! called on a worker thread, so building may serialize freely. A body that
//! fails to encode fails the request with a `ConversionError` instead of
//! sending something malformed.
//!
//! `Endpoint` plays the role of an API client: it holds only a base URL and a
//! codec and hands out `Request`/`PostRequest` builders for paths under it.

use serde::Serialize;

use crate::codec::JsonCodec;
use crate::error::ConversionError;
use crate::http::{HttpMethod, RequestOptions, WireRequest};

pub trait Requestable: Send + 'static {
    fn build(&self) -> Result<WireRequest, ConversionError>;

    /// Per-request options; `None` means `RequestOptions::default()`.
    fn options(&self) -> Option<RequestOptions> {
        None
    }
}

impl Requestable for WireRequest {
    fn build(&self) -> Result<WireRequest, ConversionError> {
        Ok(self.clone())
    }
}

/// Base URL plus the codec used for request bodies.
#[derive(Debug, Clone)]
pub struct Endpoint {
    base_url: String,
    codec: JsonCodec,
}

impl Endpoint {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            codec: JsonCodec::default(),
        }
    }

    pub fn with_codec(mut self, codec: JsonCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub fn get(&self, path: &str) -> Request {
        Request::new(HttpMethod::Get, self.url(path))
    }

    pub fn delete(&self, path: &str) -> Request {
        Request::new(HttpMethod::Delete, self.url(path))
    }

    pub fn post<B: Serialize + Send + 'static>(&self, path: &str, body: B) -> PostRequest<B> {
        PostRequest::new(self.url(path), body).codec(self.codec)
    }

    pub fn put<B: Serialize + Send + 'static>(&self, path: &str, body: B) -> PostRequest<B> {
        self.post(path, body).method(HttpMethod::Put)
    }
}

/// A request with an optional raw body.
#[derive(Debug, Clone)]
pub struct Request {
    method: HttpMethod,
    url: String,
    headers: Vec<(String, String)>,
    body: Option<Vec<u8>>,
    options: Option<RequestOptions>,
}

impl Request {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
            options: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn follow_redirects(mut self, follow: bool) -> Self {
        self.options = Some(RequestOptions {
            follow_redirects: follow,
        });
        self
    }
}

impl Requestable for Request {
    fn build(&self) -> Result<WireRequest, ConversionError> {
        let mut wire = WireRequest::new(self.method, self.url.clone());
        for (name, value) in &self.headers {
            wire = wire.with_header(name, value.clone());
        }
        if let Some(body) = &self.body {
            wire = wire.with_body(body.clone());
        }
        Ok(wire)
    }

    fn options(&self) -> Option<RequestOptions> {
        self.options
    }
}

/// A request whose body is a value encoded as JSON at build time.
#[derive(Debug, Clone)]
pub struct PostRequest<B> {
    method: HttpMethod,
    url: String,
    body: B,
    codec: JsonCodec,
    headers: Vec<(String, String)>,
    options: Option<RequestOptions>,
}

impl<B: Serialize + Send + 'static> PostRequest<B> {
    pub fn new(url: impl Into<String>, body: B) -> Self {
        Self {
            method: HttpMethod::Post,
            url: url.into(),
            body,
            codec: JsonCodec::default(),
            headers: Vec::new(),
            options: None,
        }
    }

    /// Use PUT or PATCH instead of POST.
    pub fn method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    pub fn codec(mut self, codec: JsonCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn follow_redirects(mut self, follow: bool) -> Self {
        self.options = Some(RequestOptions {
            follow_redirects: follow,
        });
        self
    }
}

impl<B: Serialize + Send + 'static> Requestable for PostRequest<B> {
    fn build(&self) -> Result<WireRequest, ConversionError> {
        let body = self.codec.encode(&self.body)?;
        let mut wire = WireRequest::new(self.method, self.url.clone())
            .with_header("content-type", "application/json");
        for (name, value) in &self.headers {
            wire = wire.with_header(name, value.clone());
        }
        Ok(wire.with_body(body))
    }

    fn options(&self) -> Option<RequestOptions> {
        self.options
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::KeyCasing;
    use serde::ser::Error as _;
    use serde::Serializer;
    use std::collections::HashMap;

    fn endpoint() -> Endpoint {
        Endpoint::new("http://localhost:3000")
    }

    #[derive(Serialize)]
    struct NewUser {
        display_name: String,
    }

    struct Unencodable;

    impl Serialize for Unencodable {
        fn serialize<S: Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
            Err(S::Error::custom("cannot encode"))
        }
    }

    #[test]
    fn trailing_slash_is_stripped() {
        let endpoint = Endpoint::new("http://localhost:3000/");
        assert_eq!(endpoint.url("/users"), "http://localhost:3000/users");
        assert_eq!(endpoint.url("users"), "http://localhost:3000/users");
    }

    #[test]
    fn get_builds_bodiless_request_with_default_options() {
        let req = endpoint().get("/users/1");
        let wire = req.build().unwrap();
        assert_eq!(wire.method(), HttpMethod::Get);
        assert_eq!(wire.url(), "http://localhost:3000/users/1");
        assert!(wire.body().is_none());
        assert!(wire.headers().is_empty());
        assert_eq!(req.options(), None);
    }

    #[test]
    fn delete_builds_bodiless_request() {
        let wire = endpoint().delete("/users/1").build().unwrap();
        assert_eq!(wire.method(), HttpMethod::Delete);
        assert_eq!(wire.url(), "http://localhost:3000/users/1");
        assert!(wire.body().is_none());
    }

    #[test]
    fn request_carries_headers_body_and_options() {
        let req = Request::new(HttpMethod::Put, "http://localhost/blob")
            .header("X-Trace", "abc")
            .body(b"payload".to_vec())
            .follow_redirects(false);
        let wire = req.build().unwrap();
        assert_eq!(wire.header("x-trace"), Some("abc"));
        assert_eq!(wire.body(), Some(&b"payload"[..]));
        assert_eq!(req.options(), Some(RequestOptions::no_redirects()));
    }

    #[test]
    fn post_encodes_body_with_codec() {
        let endpoint = endpoint().with_codec(JsonCodec::new(KeyCasing::CamelCase));
        let req = endpoint.post(
            "/users",
            NewUser {
                display_name: "Ana".to_string(),
            },
        );
        let wire = req.build().unwrap();
        assert_eq!(wire.method(), HttpMethod::Post);
        assert_eq!(wire.header("Content-Type"), Some("application/json"));
        let body: HashMap<String, String> = serde_json::from_slice(wire.body().unwrap()).unwrap();
        assert_eq!(body.get("displayName").map(String::as_str), Some("Ana"));
    }

    #[test]
    fn put_switches_method() {
        let wire = endpoint()
            .put("/users/1", NewUser { display_name: "Bo".to_string() })
            .build()
            .unwrap();
        assert_eq!(wire.method(), HttpMethod::Put);
    }

    #[test]
    fn unencodable_body_fails_build() {
        let err = PostRequest::new("http://localhost/users", Unencodable)
            .build()
            .unwrap_err();
        assert!(err.message().contains("cannot encode"));
    }

    #[test]
    fn wire_request_is_its_own_requestable() {
        let wire = WireRequest::new(HttpMethod::Head, "http://localhost/");
        assert_eq!(wire.build().unwrap(), wire);
        assert_eq!(Requestable::options(&wire), None);
    }
}
