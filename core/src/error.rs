//! Error taxonomy for the request pipeline.
//!
//! # Design
//! Every call ends in exactly one of three outcomes besides success:
//! the transport failed (`Network`), the server answered with a non-zero
//! envelope `code` (`Status`), or the payload did not match the caller's
//! declared shape (`Decode`). The set is closed; callers that want a
//! coarser view collapse it themselves.
//!
//! `classify` is the single place that turns a raw transport outcome into
//! this taxonomy. Transport failure short-circuits before the body is
//! inspected, and a non-zero `code` wins over anything the typed layer could
//! report later.

use serde_json::Value;
use thiserror::Error;

use crate::envelope::Envelope;
use crate::http::HttpResponse;

/// Why the transport could not produce a response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request timed out")]
    Timeout,

    #[error("i/o error: {0}")]
    Io(String),

    /// The server sent something that is not valid HTTP.
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("response body exceeds {0} bytes")]
    ResponseTooLarge(u64),

    /// No transport worker is left to run the request.
    #[error("no transport worker available")]
    Unavailable,

    /// The server closed the exchange without sending any body bytes.
    #[error("response contained no data")]
    EmptyBody,

    /// The transport dropped its completion without ever invoking it.
    #[error("transport abandoned the request")]
    Abandoned,
}

/// Terminal failure of a pipeline call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("network failure: {0}")]
    Network(#[from] TransportError),

    /// Non-zero envelope `code`; `message` is the server's literal text.
    #[error("status failure {code}: {message}")]
    Status { code: i64, message: String },

    /// The payload could not be decoded. The serde error is only logged.
    #[error("decode failure")]
    Decode,
}

/// Coarse category of a `RequestError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Transport,
    Status,
    Decode,
}

impl RequestError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RequestError::Network(_) => ErrorKind::Transport,
            RequestError::Status { .. } => ErrorKind::Status,
            RequestError::Decode => ErrorKind::Decode,
        }
    }

    /// The envelope code for `Status` failures.
    pub fn status_code(&self) -> Option<i64> {
        match self {
            RequestError::Status { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Map a transport outcome to the envelope's `data`, or to exactly one error.
///
/// The HTTP status line is never consulted: a 500 carrying `code: 0` is a
/// success and a 200 carrying `code: -101` is a failure.
pub fn classify(outcome: Result<HttpResponse, TransportError>) -> Result<Value, RequestError> {
    let response = match outcome {
        Ok(response) => response,
        Err(err) => {
            tracing::warn!(error = %err, "transport failure");
            return Err(RequestError::Network(err));
        }
    };

    if response.body.is_empty() {
        tracing::warn!(status = response.status, "transport failure: empty response body");
        return Err(RequestError::Network(TransportError::EmptyBody));
    }

    let envelope = Envelope::parse(&response.body)?;
    if !envelope.is_success() {
        tracing::warn!(
            code = envelope.code,
            message = %envelope.message,
            http_status = response.status,
            "status failure"
        );
        return Err(RequestError::Status {
            code: envelope.code,
            message: envelope.message,
        });
    }
    Ok(envelope.data)
}
