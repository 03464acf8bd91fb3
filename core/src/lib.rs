//! Request pipeline for the bilibili web API.
//!
//! # Overview
//! Every call goes through `WebClient`: CSRF injection for state-changing
//! methods, parameter encoding, an injected `Transport`, envelope unwrapping,
//! classification into a closed `RequestError`, and an optional typed decode
//! of the envelope's `data`.
//!
//! # Design
//! - `WebClient` holds only shared handles; each call is independent.
//! - The callback form is the one implementation. The async and blocking
//!   forms wait on a oneshot channel fed by it, so all three classify
//!   identically.
//! - I/O lives behind `Transport`. `UreqTransport` is the stock one; tests
//!   substitute in-memory transports.
//! - `api` holds the endpoint catalog and thin per-feature calls; they add
//!   no behaviour beyond picking URLs, parameters and result shapes.

pub mod api;
pub mod client;
pub mod credentials;
pub mod decode;
pub mod envelope;
pub mod error;
pub mod http;
pub mod transport;
pub mod types;

pub use api::{ApiClient, Hosts};
pub use client::{WebClient, CSRF_PARAM, LEGACY_CSRF_PARAM};
pub use credentials::{CredentialProvider, CredentialStore};
pub use decode::{decode, DecodeOptions, KeyStrategy};
pub use envelope::Envelope;
pub use error::{classify, ErrorKind, RequestError, TransportError};
pub use http::{HttpMethod, HttpRequest, HttpResponse, Params, RequestSpec};
pub use transport::{Completion, Transport, TransportConfig, UreqTransport};
pub use types::{FavFolder, FavUpper, FavVideo, NavInfo, UpSpaceVideo, VideoDetail, VideoOwner, VideoPage};
