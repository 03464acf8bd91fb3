//! HTTP request and response types exchanged with the transport.
//!
//! # Design
//! Callers describe a call as a `RequestSpec` (method, url, parameters,
//! headers). Before the transport sees it, the spec is lowered into an
//! `HttpRequest` with the parameters already encoded: into the query string
//! for `GET`, into a form body for every other method. Both destinations use
//! the same encoding (`key=value` pairs, UTF-8, percent-encoded, keys sorted)
//! so the server sees identical formatting either way.
//!
//! All fields use owned types (`String`, `Vec`) so values can cross thread
//! and FFI boundaries without lifetime concerns.

use std::fmt;

use url::Url;

use crate::error::TransportError;

/// Content type attached to every request that carries a form body.
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=utf-8";

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    /// Only `GET` is treated as read-only; everything else gets CSRF fields.
    pub fn is_safe(self) -> bool {
        matches!(self, HttpMethod::Get)
    }

    /// Whether parameters travel in the query string rather than the body.
    pub fn encodes_in_query(self) -> bool {
        matches!(self, HttpMethod::Get)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered string map of request parameters.
///
/// Inserting an existing key replaces its value in place, so the map never
/// holds duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    entries: Vec<(String, String)>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl ToString) {
        let key = key.into();
        let value = value.to_string();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Encode as `application/x-www-form-urlencoded`, keys sorted ascending.
    pub fn encode(&self) -> String {
        let mut pairs: Vec<&(String, String)> = self.entries.iter().collect();
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (key, value) in pairs {
            serializer.append_pair(key, value);
        }
        serializer.finish()
    }
}

impl<K: Into<String>, V: ToString> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Params::new();
        for (key, value) in iter {
            params.insert(key, value);
        }
        params
    }
}

/// A single API call as described by the caller.
///
/// Immutable once handed to `WebClient`; the pipeline works on its own copy
/// of `params` when it injects credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSpec {
    pub method: HttpMethod,
    pub url: String,
    pub params: Params,
    pub headers: Vec<(String, String)>,
}

impl RequestSpec {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            params: Params::new(),
            headers: Vec::new(),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, url)
    }

    pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.insert(key, value);
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    /// Lower the spec into a wire request, encoding `params` into the query
    /// string or the body depending on the method.
    pub fn into_http_request(self) -> Result<HttpRequest, TransportError> {
        let mut url = Url::parse(&self.url)
            .map_err(|e| TransportError::InvalidUrl(format!("{}: {e}", self.url)))?;
        let encoded = self.params.encode();
        let mut headers = self.headers;

        let body = if self.method.encodes_in_query() {
            if !self.params.is_empty() {
                let query = match url.query() {
                    Some(existing) if !existing.is_empty() => format!("{existing}&{encoded}"),
                    _ => encoded,
                };
                url.set_query(Some(&query));
            }
            None
        } else {
            if !headers
                .iter()
                .any(|(k, _)| k.eq_ignore_ascii_case("content-type"))
            {
                headers.push(("content-type".to_string(), FORM_CONTENT_TYPE.to_string()));
            }
            Some(encoded)
        };

        Ok(HttpRequest {
            method: self.method,
            url: url.to_string(),
            headers,
            body,
        })
    }
}

/// An HTTP request described as plain data, parameters already encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl HttpRequest {
    /// Decode the form body back into pairs. Empty for query-style requests.
    pub fn form_pairs(&self) -> Vec<(String, String)> {
        self.body
            .as_deref()
            .map(|body| {
                url::form_urlencoded::parse(body.as_bytes())
                    .into_owned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// An HTTP response described as plain data.
///
/// `status` is carried for diagnostics only; the envelope `code` decides
/// success or failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }
}
