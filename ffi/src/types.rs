//! `#[repr(C)]` types for the FFI boundary.
//!
//! # Design
//! Each type mirrors a core type but uses C-compatible representations:
//! `*mut c_char` instead of `String`, pointer + length instead of `Vec`, and
//! enums with explicit discriminants. Conversion functions live here to keep
//! `lib.rs` focused on the `extern "C"` surface.

use std::ffi::{c_void, CString};
use std::os::raw::c_char;
use std::sync::Arc;

use bili_core::{CredentialStore, HttpMethod, RequestError, WebClient};
use serde_json::Value;

/// Opaque handle to a pipeline client and the token store it reads from.
/// C callers receive a pointer to this and pass it back into every function.
pub struct FfiClient {
    pub(crate) web: WebClient,
    pub(crate) store: Arc<CredentialStore>,
}

/// HTTP method as a C enum.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiHttpMethod {
    Get = 0,
    Post = 1,
    Put = 2,
    Delete = 3,
}

impl From<FfiHttpMethod> for HttpMethod {
    fn from(m: FfiHttpMethod) -> Self {
        match m {
            FfiHttpMethod::Get => HttpMethod::Get,
            FfiHttpMethod::Post => HttpMethod::Post,
            FfiHttpMethod::Put => HttpMethod::Put,
            FfiHttpMethod::Delete => HttpMethod::Delete,
        }
    }
}

/// One request parameter. Both strings are borrowed for the duration of the
/// call that receives them.
#[repr(C)]
pub struct FfiParam {
    pub key: *const c_char,
    pub value: *const c_char,
}

/// Outcome category carried by `FfiResult`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiOutcome {
    Ok = 0,
    NetworkFail = 1,
    StatusFail = 2,
    DecodeFail = 3,
    NullArg = 4,
    Panic = 5,
}

/// Result of one pipeline call.
///
/// On success `outcome` is `Ok`, `message` is null and `data` is the
/// envelope's `data` as JSON text. On `StatusFail`, `code` and `message` are
/// the server's literal envelope fields. Other failures carry a
/// human-readable `message` and a zero `code`; `data` is always null on
/// failure.
#[repr(C)]
pub struct FfiResult {
    pub outcome: FfiOutcome,
    pub code: i64,
    pub message: *mut c_char,
    pub data: *mut c_char,
}

/// Signature of the completion a C caller passes to `bili_request_json`.
///
/// `result` is owned by the library and valid only until the callback
/// returns.
pub type BiliCallback = extern "C" fn(result: *const FfiResult, user_data: *mut c_void);

/// Callback plus the caller's opaque pointer, moved onto the transport thread.
pub(crate) struct CallbackTarget {
    callback: BiliCallback,
    user_data: *mut c_void,
}

// The C caller promises `user_data` may be used from any thread.
unsafe impl Send for CallbackTarget {}

impl CallbackTarget {
    pub(crate) fn new(callback: BiliCallback, user_data: *mut c_void) -> Self {
        Self {
            callback,
            user_data,
        }
    }

    pub(crate) fn deliver(self, result: Box<FfiResult>) {
        (self.callback)(&*result, self.user_data);
    }
}

/// Allocate a C string, dropping any interior NUL bytes.
pub(crate) fn c_string(s: String) -> *mut c_char {
    CString::new(s.replace('\0', ""))
        .unwrap_or_default()
        .into_raw()
}

impl FfiResult {
    fn new(outcome: FfiOutcome, code: i64, message: Option<String>, data: Option<String>) -> Box<Self> {
        Box::new(FfiResult {
            outcome,
            code,
            message: message.map(c_string).unwrap_or(std::ptr::null_mut()),
            data: data.map(c_string).unwrap_or(std::ptr::null_mut()),
        })
    }

    /// Build a result from a pipeline outcome.
    pub(crate) fn from_core(result: Result<Value, RequestError>) -> Box<Self> {
        match result {
            Ok(data) => FfiResult::new(FfiOutcome::Ok, 0, None, Some(data.to_string())),
            Err(RequestError::Status { code, message }) => {
                FfiResult::new(FfiOutcome::StatusFail, code, Some(message), None)
            }
            Err(err @ RequestError::Network(_)) => {
                FfiResult::new(FfiOutcome::NetworkFail, 0, Some(err.to_string()), None)
            }
            Err(err @ RequestError::Decode) => {
                FfiResult::new(FfiOutcome::DecodeFail, 0, Some(err.to_string()), None)
            }
        }
    }

    /// Build an error result for a null argument.
    pub(crate) fn null_arg(name: &str) -> Box<Self> {
        tracing::warn!(argument = name, "null argument at FFI boundary");
        FfiResult::new(FfiOutcome::NullArg, 0, Some(format!("null argument: {name}")), None)
    }

    /// Build an error result for a caught panic.
    pub(crate) fn panic(msg: &str) -> Box<Self> {
        tracing::error!("{msg}");
        FfiResult::new(FfiOutcome::Panic, 0, Some(msg.to_string()), None)
    }
}

impl Drop for FfiResult {
    fn drop(&mut self) {
        if !self.message.is_null() {
            drop(unsafe { CString::from_raw(self.message) });
        }
        if !self.data.is_null() {
            drop(unsafe { CString::from_raw(self.data) });
        }
    }
}
