//! C-ABI wrapper around `bili-core`.
//!
//! # Overview
//! Exposes the request pipeline through `extern "C"` functions so a host
//! application can issue bilibili web API calls, with CSRF injection and
//! envelope classification, without linking to Rust's async runtime.
//!
//! # Design
//! - Every `extern "C"` function wraps its body in `catch_unwind` so panics
//!   never cross the FFI boundary.
//! - Two calling conventions mirror the core client: `bili_request_json`
//!   delivers to a C callback on the transport thread, and
//!   `bili_request_json_blocking` returns an owned result.
//! - A single `FfiResult` carries success data as JSON text and failures as
//!   an outcome tag plus code and message.
//! - The C caller owns returned pointers and must call the matching
//!   `bili_*_free` function to release them. Results handed to a callback
//!   are borrowed and freed by the library once the callback returns.

pub mod types;

use std::ffi::{c_void, CStr};
use std::os::raw::c_char;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use bili_core::{CredentialStore, RequestSpec, TransportConfig, WebClient};

use types::*;

// ---------------------------------------------------------------------------
// Client lifecycle
// ---------------------------------------------------------------------------

/// Create a client backed by the default HTTP transport and an empty
/// credential store.
///
/// Returns null if an internal panic occurs.
/// The caller must free the returned pointer with `bili_client_free`.
#[unsafe(no_mangle)]
pub extern "C" fn bili_client_new() -> *mut FfiClient {
    catch_unwind(|| {
        let store = Arc::new(CredentialStore::new());
        let web = WebClient::with_ureq(TransportConfig::default(), store.clone());
        Box::into_raw(Box::new(FfiClient { web, store }))
    })
    .unwrap_or(std::ptr::null_mut())
}

/// Free a client created by `bili_client_new`. Safe to call with null.
///
/// Requests already in flight keep their own handle on the transport and
/// still complete.
#[unsafe(no_mangle)]
pub extern "C" fn bili_client_free(client: *mut FfiClient) {
    if !client.is_null() {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            drop(unsafe { Box::from_raw(client) });
        }));
    }
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Store the CSRF token. A null or empty `token` clears it.
///
/// Returns false if `client` is null.
#[unsafe(no_mangle)]
pub extern "C" fn bili_client_set_csrf(client: *const FfiClient, token: *const c_char) -> bool {
    catch_unwind(AssertUnwindSafe(|| {
        if client.is_null() {
            return false;
        }
        let client = unsafe { &*client };
        if token.is_null() {
            client.store.clear();
        } else {
            client.store.set_csrf_token(lossy(token));
        }
        true
    }))
    .unwrap_or(false)
}

/// Forget the stored CSRF token. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn bili_client_clear_csrf(client: *const FfiClient) {
    if !client.is_null() {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            unsafe { &*client }.store.clear();
        }));
    }
}

/// Take the CSRF token from a `Cookie`/`Set-Cookie` style header.
///
/// Returns true if the header carried a `bili_jct` value.
#[unsafe(no_mangle)]
pub extern "C" fn bili_client_set_cookie(client: *const FfiClient, cookie: *const c_char) -> bool {
    catch_unwind(AssertUnwindSafe(|| {
        if client.is_null() || cookie.is_null() {
            return false;
        }
        let client = unsafe { &*client };
        client.store.update_from_cookie_header(&lossy(cookie))
    }))
    .unwrap_or(false)
}

/// Whether a CSRF token is currently stored.
#[unsafe(no_mangle)]
pub extern "C" fn bili_client_is_logged_in(client: *const FfiClient) -> bool {
    catch_unwind(AssertUnwindSafe(|| {
        !client.is_null() && unsafe { &*client }.store.is_logged_in()
    }))
    .unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

fn lossy(s: *const c_char) -> String {
    unsafe { CStr::from_ptr(s) }.to_string_lossy().into_owned()
}

/// Build a `RequestSpec` from C arguments, or the `NullArg` result to report.
///
/// # Safety
/// `url` must be null or NUL-terminated. `params` must be null or point to
/// `params_len` valid entries.
unsafe fn build_spec(
    method: FfiHttpMethod,
    url: *const c_char,
    params: *const FfiParam,
    params_len: usize,
) -> Result<RequestSpec, Box<FfiResult>> {
    if url.is_null() {
        return Err(FfiResult::null_arg("url"));
    }
    if params.is_null() && params_len > 0 {
        return Err(FfiResult::null_arg("params"));
    }
    let mut spec = RequestSpec::new(method.into(), lossy(url));
    if params_len > 0 {
        let params = unsafe { std::slice::from_raw_parts(params, params_len) };
        for p in params {
            if p.key.is_null() || p.value.is_null() {
                return Err(FfiResult::null_arg("params"));
            }
            spec = spec.param(lossy(p.key), lossy(p.value));
        }
    }
    Ok(spec)
}

/// Issue a request and deliver its outcome to `callback`.
///
/// `callback` runs exactly once, on a library thread for dispatched requests
/// or synchronously when an argument is null. The `FfiResult` it receives is
/// valid only until it returns. `user_data` is passed through untouched and
/// must be safe to use from another thread. A null `callback` sends the
/// request and discards the outcome.
#[unsafe(no_mangle)]
pub extern "C" fn bili_request_json(
    client: *const FfiClient,
    method: FfiHttpMethod,
    url: *const c_char,
    params: *const FfiParam,
    params_len: usize,
    callback: Option<BiliCallback>,
    user_data: *mut c_void,
) {
    let target = callback.map(|cb| CallbackTarget::new(cb, user_data));

    let prepared = catch_unwind(AssertUnwindSafe(|| {
        if client.is_null() {
            return Err(FfiResult::null_arg("client"));
        }
        let client = unsafe { &*client };
        let spec = unsafe { build_spec(method, url, params, params_len) }?;
        Ok((client.web.clone(), spec))
    }));

    let (web, spec) = match prepared {
        Ok(Ok(parts)) => parts,
        Ok(Err(result)) => {
            if let Some(target) = target {
                target.deliver(result);
            }
            return;
        }
        Err(_) => {
            if let Some(target) = target {
                target.deliver(FfiResult::panic("panic in bili_request_json"));
            }
            return;
        }
    };

    let _ = catch_unwind(AssertUnwindSafe(move || {
        web.request_json(spec, move |result| {
            if let Some(target) = target {
                target.deliver(FfiResult::from_core(result));
            }
        });
    }));
}

/// Issue a request and wait for its outcome.
///
/// Never returns null. The caller must free the result with
/// `bili_free_result`.
///
/// Do not call from a thread that is driving a tokio runtime. The wait cannot
/// block there: the request is still sent, but its outcome is lost and the
/// call returns a `Panic` result. Use `bili_request_json` from such threads.
#[unsafe(no_mangle)]
pub extern "C" fn bili_request_json_blocking(
    client: *const FfiClient,
    method: FfiHttpMethod,
    url: *const c_char,
    params: *const FfiParam,
    params_len: usize,
) -> *mut FfiResult {
    let result = catch_unwind(AssertUnwindSafe(|| {
        if client.is_null() {
            return FfiResult::null_arg("client");
        }
        let client = unsafe { &*client };
        let spec = match unsafe { build_spec(method, url, params, params_len) } {
            Ok(spec) => spec,
            Err(result) => return result,
        };
        FfiResult::from_core(client.web.request_json_blocking(spec))
    }))
    .unwrap_or_else(|_| FfiResult::panic("panic in bili_request_json_blocking"));
    Box::into_raw(result)
}

/// Free a result returned by `bili_request_json_blocking`. Safe to call with
/// null. Never pass a result received by a callback.
#[unsafe(no_mangle)]
pub extern "C" fn bili_free_result(result: *mut FfiResult) {
    if !result.is_null() {
        let _ = catch_unwind(|| {
            drop(unsafe { Box::from_raw(result) });
        });
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
