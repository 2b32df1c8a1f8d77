//! Caller-provided HTTP layer.
//!
//! cxn-rpc never opens sockets. Clients hand a fully built request to an
//! [`HttpTransport`] and decode whatever body comes back; servers return a
//! [`HttpResponse`] for the caller's HTTP stack to write out.

use crate::{CONTENT_TYPE_HEADER, MIME_TYPE};

/// One outbound HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// `POST` carrying an envelope, with the cxn content type set.
    pub fn post_envelope(url: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            method: "POST".to_string(),
            url: url.into(),
            headers: vec![(CONTENT_TYPE_HEADER.to_string(), MIME_TYPE.to_string())],
            body,
        }
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

/// Response to an [`HttpRequest`], or the output of a server handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: Vec<u8>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body,
        }
    }

    pub(crate) fn envelope(status: u16, body: Vec<u8>) -> Self {
        Self {
            status,
            headers: vec![(CONTENT_TYPE_HEADER.to_string(), MIME_TYPE.to_string())],
            body,
        }
    }

    pub(crate) fn plain(status: u16, message: &str) -> Self {
        Self {
            status,
            headers: vec![(CONTENT_TYPE_HEADER.to_string(), "text/plain".to_string())],
            body: message.as_bytes().to_vec(),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// User-implemented HTTP client.
///
/// One attempt per call. Timeouts, TLS, proxies and retries belong to the
/// implementation; a request that produced no HTTP response is an `Err`.
pub trait HttpTransport: Send + Sync {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

impl<F> HttpTransport for F
where
    F: Fn(&HttpRequest) -> Result<HttpResponse, TransportError> + Send + Sync,
{
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self(request)
    }
}

/// Classification of transport failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Could not reach the peer (DNS, refused, TLS handshake).
    Connect,
    Timeout,
    Other,
}

/// Transport-level error (wraps arbitrary error strings from the HTTP layer).
#[derive(Debug, Clone)]
pub struct TransportError {
    pub message: String,
    pub kind: TransportErrorKind,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: TransportErrorKind::Other,
        }
    }

    pub fn with_kind(message: impl Into<String>, kind: TransportErrorKind) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for TransportError {}
