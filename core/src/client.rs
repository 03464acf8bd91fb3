//! The request pipeline every API call goes through.
//!
//! # Design
//! `WebClient` holds only shared handles (transport, credential provider)
//! and keeps no per-request state, so concurrent calls need no locking.
//! One call runs: credential injection, encoding, transport, `classify`,
//! then the optional typed decode.
//!
//! The callback form is the only real implementation. The suspending
//! (`*_async`) and blocking (`*_blocking`) forms create a oneshot channel,
//! call the callback form with the sender moved into the callback, and wait
//! on the receiver. The sender can be used once, and `CompletionGuard`
//! resolves the call with `TransportError::Abandoned` if a transport drops
//! the completion, so every path resolves exactly once.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::credentials::CredentialProvider;
use crate::decode::{decode, DecodeOptions};
use crate::error::{classify, RequestError, TransportError};
use crate::http::{HttpRequest, RequestSpec};
use crate::transport::{Transport, TransportConfig, UreqTransport};

/// Current CSRF parameter name.
pub const CSRF_PARAM: &str = "csrf";
/// Older name for the same value; some endpoints still read only this one.
pub const LEGACY_CSRF_PARAM: &str = "biliCSRF";

#[derive(Clone)]
pub struct WebClient {
    transport: Arc<dyn Transport>,
    credentials: Arc<dyn CredentialProvider>,
}

impl std::fmt::Debug for WebClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebClient").finish_non_exhaustive()
    }
}

impl WebClient {
    pub fn new(transport: Arc<dyn Transport>, credentials: Arc<dyn CredentialProvider>) -> Self {
        Self {
            transport,
            credentials,
        }
    }

    /// Client backed by `UreqTransport`.
    pub fn with_ureq(config: TransportConfig, credentials: Arc<dyn CredentialProvider>) -> Self {
        Self::new(Arc::new(UreqTransport::new(config)), credentials)
    }

    /// Inject credentials into a state-changing call and encode it.
    ///
    /// The token is read once here and never again for this call.
    pub fn prepare(&self, mut spec: RequestSpec) -> Result<HttpRequest, TransportError> {
        if !spec.method.is_safe() {
            if let Some(token) = self.credentials.csrf_token() {
                spec.params.insert(LEGACY_CSRF_PARAM, &token);
                spec.params.insert(CSRF_PARAM, token);
            }
        }
        spec.into_http_request()
    }

    /// Run `spec` and deliver the envelope's `data` to `complete`.
    pub fn request_json<F>(&self, spec: RequestSpec, complete: F)
    where
        F: FnOnce(Result<Value, RequestError>) + Send + 'static,
    {
        let span = tracing::debug_span!(
            "bili_request",
            request_id = %Uuid::new_v4(),
            method = %spec.method,
            url = %spec.url,
        );
        let _entered = span.enter();
        let guard = CompletionGuard::new(complete);

        let request = match self.prepare(spec) {
            Ok(request) => request,
            Err(err) => {
                tracing::warn!(error = %err, "transport failure: request could not be built");
                guard.resolve(Err(RequestError::Network(err)));
                return;
            }
        };

        tracing::debug!("dispatching request");
        let completion_span = span.clone();
        self.transport.send(
            request,
            Box::new(move |outcome| {
                let _entered = completion_span.enter();
                let result = classify(outcome);
                if result.is_ok() {
                    tracing::debug!("request succeeded");
                }
                guard.resolve(result);
            }),
        );
    }

    /// Run `spec` and decode `data` into `T`. `options` defaults to
    /// `DecodeOptions::default()`.
    pub fn request<T, F>(&self, spec: RequestSpec, options: Option<DecodeOptions>, complete: F)
    where
        T: DeserializeOwned + 'static,
        F: FnOnce(Result<T, RequestError>) + Send + 'static,
    {
        let options = options.unwrap_or_default();
        self.request_json(spec, move |result| {
            complete(result.and_then(|data| decode(data, &options)));
        });
    }

    pub async fn request_json_async(&self, spec: RequestSpec) -> Result<Value, RequestError> {
        let (tx, rx) = oneshot::channel();
        self.request_json(spec, move |result| {
            let _ = tx.send(result);
        });
        rx.await.unwrap_or(Err(RequestError::Network(TransportError::Abandoned)))
    }

    pub async fn request_async<T>(
        &self,
        spec: RequestSpec,
        options: Option<DecodeOptions>,
    ) -> Result<T, RequestError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.request(spec, options, move |result: Result<T, RequestError>| {
            let _ = tx.send(result);
        });
        rx.await.unwrap_or(Err(RequestError::Network(TransportError::Abandoned)))
    }

    /// Blocking form of `request_json`.
    ///
    /// # Panics
    /// Panics when called from inside an async runtime; use
    /// `request_json_async` there.
    pub fn request_json_blocking(&self, spec: RequestSpec) -> Result<Value, RequestError> {
        let (tx, rx) = oneshot::channel();
        self.request_json(spec, move |result| {
            let _ = tx.send(result);
        });
        rx.blocking_recv()
            .unwrap_or(Err(RequestError::Network(TransportError::Abandoned)))
    }

    /// Blocking form of `request`.
    ///
    /// # Panics
    /// Panics when called from inside an async runtime.
    pub fn request_blocking<T>(
        &self,
        spec: RequestSpec,
        options: Option<DecodeOptions>,
    ) -> Result<T, RequestError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.request(spec, options, move |result: Result<T, RequestError>| {
            let _ = tx.send(result);
        });
        rx.blocking_recv()
            .unwrap_or(Err(RequestError::Network(TransportError::Abandoned)))
    }
}

/// Owns the caller's callback until it has run. Dropping an unresolved guard
/// runs the callback with `Abandoned`.
struct CompletionGuard<F>
where
    F: FnOnce(Result<Value, RequestError>),
{
    complete: Option<F>,
}

impl<F> CompletionGuard<F>
where
    F: FnOnce(Result<Value, RequestError>),
{
    fn new(complete: F) -> Self {
        Self {
            complete: Some(complete),
        }
    }

    fn resolve(mut self, result: Result<Value, RequestError>) {
        if let Some(complete) = self.complete.take() {
            complete(result);
        }
    }
}

impl<F> Drop for CompletionGuard<F>
where
    F: FnOnce(Result<Value, RequestError>),
{
    fn drop(&mut self) {
        if let Some(complete) = self.complete.take() {
            tracing::warn!("transport failure: completion dropped without a response");
            complete(Err(RequestError::Network(TransportError::Abandoned)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::CredentialStore;
    use crate::http::{HttpMethod, HttpResponse};
    use crate::transport::Completion;
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::mpsc;
    use std::sync::Mutex;

    /// Records every request and answers with a canned outcome.
    struct StubTransport {
        outcome: Result<HttpResponse, TransportError>,
        seen: Mutex<Vec<HttpRequest>>,
    }

    impl StubTransport {
        fn responding(body: &str) -> Arc<Self> {
            Arc::new(Self {
                outcome: Ok(HttpResponse::new(200, body)),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn failing(err: TransportError) -> Arc<Self> {
            Arc::new(Self {
                outcome: Err(err),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn last_request(&self) -> HttpRequest {
            self.seen.lock().unwrap().last().cloned().unwrap()
        }
    }

    impl Transport for StubTransport {
        fn send(&self, request: HttpRequest, complete: Completion) {
            self.seen.lock().unwrap().push(request);
            complete(self.outcome.clone());
        }
    }

    /// Holds completions until the test releases them.
    #[derive(Default)]
    struct DeferredTransport {
        pending: Mutex<Vec<(HttpRequest, Completion)>>,
    }

    impl Transport for DeferredTransport {
        fn send(&self, request: HttpRequest, complete: Completion) {
            self.pending.lock().unwrap().push((request, complete));
        }
    }

    /// Loses every completion.
    struct DroppingTransport;

    impl Transport for DroppingTransport {
        fn send(&self, _request: HttpRequest, _complete: Completion) {}
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Owner {
        mid: i64,
        name: String,
    }

    fn client(transport: Arc<dyn Transport>, token: Option<&str>) -> WebClient {
        let store = match token {
            Some(t) => CredentialStore::with_token(t),
            None => CredentialStore::new(),
        };
        WebClient::new(transport, Arc::new(store))
    }

    fn run_json(client: &WebClient, spec: RequestSpec) -> Result<Value, RequestError> {
        let (tx, rx) = mpsc::channel();
        client.request_json(spec, move |result| tx.send(result).unwrap());
        rx.recv().unwrap()
    }

    #[test]
    fn post_injects_both_csrf_fields() {
        let transport = StubTransport::responding(r#"{"code":0,"message":"","data":{}}"#);
        let c = client(transport.clone(), Some("tok123"));
        let spec = RequestSpec::post("http://api.example.com/x/web-interface/archive/like")
            .param("aid", 42)
            .param("like", "1");

        let data = run_json(&c, spec).unwrap();
        assert_eq!(data, json!({}));

        let sent = transport.last_request();
        assert_eq!(sent.method, HttpMethod::Post);
        let mut pairs = sent.form_pairs();
        pairs.sort();
        assert_eq!(
            pairs,
            vec![
                ("aid".to_string(), "42".to_string()),
                ("biliCSRF".to_string(), "tok123".to_string()),
                ("csrf".to_string(), "tok123".to_string()),
                ("like".to_string(), "1".to_string()),
            ]
        );
        assert_eq!(
            sent.body.as_deref(),
            Some("aid=42&biliCSRF=tok123&csrf=tok123&like=1")
        );
    }

    #[test]
    fn get_never_carries_csrf() {
        let transport = StubTransport::responding(r#"{"code":0,"data":{}}"#);
        let c = client(transport.clone(), Some("tok123"));
        run_json(&c, RequestSpec::get("http://api.example.com/x/view").param("aid", 1)).unwrap();

        let sent = transport.last_request();
        assert_eq!(sent.url, "http://api.example.com/x/view?aid=1");
        assert!(!sent.url.contains("csrf"));
        assert!(sent.body.is_none());
    }

    #[test]
    fn missing_token_leaves_fields_absent() {
        let transport = StubTransport::responding(r#"{"code":0,"data":{}}"#);
        let c = client(transport.clone(), None);
        run_json(&c, RequestSpec::post("http://api.example.com/x").param("aid", 1)).unwrap();
        assert_eq!(transport.last_request().body.as_deref(), Some("aid=1"));
    }

    #[test]
    fn caller_supplied_csrf_is_overwritten_by_store() {
        let transport = StubTransport::responding(r#"{"code":0,"data":{}}"#);
        let c = client(transport.clone(), Some("fresh"));
        run_json(&c, RequestSpec::post("http://api.example.com/x").param("csrf", "stale")).unwrap();
        assert_eq!(
            transport.last_request().body.as_deref(),
            Some("biliCSRF=fresh&csrf=fresh")
        );
    }

    #[test]
    fn status_failure_for_any_method() {
        for method in [HttpMethod::Get, HttpMethod::Post, HttpMethod::Put, HttpMethod::Delete] {
            let transport = StubTransport::responding(r#"{"code":-403,"message":"no login"}"#);
            let c = client(transport, Some("t"));
            let err = run_json(&c, RequestSpec::new(method, "http://api.example.com/x")).unwrap_err();
            assert_eq!(
                err,
                RequestError::Status {
                    code: -403,
                    message: "no login".to_string()
                },
                "{method}"
            );
        }
    }

    #[test]
    fn transport_failure_is_network_error() {
        let c = client(StubTransport::failing(TransportError::Timeout), None);
        let err = run_json(&c, RequestSpec::get("http://api.example.com/x")).unwrap_err();
        assert_eq!(err, RequestError::Network(TransportError::Timeout));
    }

    #[test]
    fn invalid_url_never_reaches_transport() {
        let transport = StubTransport::responding(r#"{"code":0}"#);
        let c = client(transport.clone(), None);
        let err = run_json(&c, RequestSpec::get("::nope::")).unwrap_err();
        assert!(matches!(err, RequestError::Network(TransportError::InvalidUrl(_))));
        assert!(transport.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn typed_decode_matches_direct_decode() {
        let body = r#"{"code":0,"data":{"mid":7,"name":"up","face":"f.jpg"}}"#;
        let c = client(StubTransport::responding(body), None);
        let (tx, rx) = mpsc::channel();
        c.request(RequestSpec::get("http://api.example.com/x"), None, move |r: Result<Owner, _>| {
            tx.send(r).unwrap()
        });
        let owner = rx.recv().unwrap().unwrap();
        let direct: Owner = serde_json::from_value(json!({"mid":7,"name":"up","face":"f.jpg"})).unwrap();
        assert_eq!(owner, direct);
    }

    #[test]
    fn decode_failure_is_isolated_to_typed_layer() {
        let body = r#"{"code":0,"data":{"mid":7}}"#;
        let c = client(StubTransport::responding(body), None);
        let spec = RequestSpec::get("http://api.example.com/x");

        assert_eq!(run_json(&c, spec.clone()).unwrap(), json!({"mid": 7}));

        let (tx, rx) = mpsc::channel();
        c.request(spec, None, move |r: Result<Owner, _>| tx.send(r).unwrap());
        assert_eq!(rx.recv().unwrap().unwrap_err(), RequestError::Decode);
    }

    #[test]
    fn status_failure_outranks_decode() {
        let c = client(StubTransport::responding(r#"{"code":-404,"message":"啥都木有"}"#), None);
        let result: Result<Owner, _> =
            c.request_blocking(RequestSpec::get("http://api.example.com/x"), None);
        assert_eq!(
            result.unwrap_err(),
            RequestError::Status {
                code: -404,
                message: "啥都木有".to_string()
            }
        );
    }

    #[test]
    fn snake_case_option_is_applied() {
        #[derive(Debug, Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Page {
            page_size: u32,
        }
        let c = client(StubTransport::responding(r#"{"code":0,"data":{"page_size":20}}"#), None);
        let page: Page = c
            .request_blocking(
                RequestSpec::get("http://api.example.com/x"),
                Some(DecodeOptions::snake_case()),
            )
            .unwrap();
        assert_eq!(page.page_size, 20);
    }

    #[test]
    fn callback_and_blocking_forms_agree() {
        let bodies = [
            r#"{"code":0,"data":{"mid":1,"name":"a"}}"#,
            r#"{"code":0,"data":{"mid":"x"}}"#,
            r#"{"code":-101,"message":"账号未登录"}"#,
            "not json",
            "",
        ];
        for body in bodies {
            let c = client(StubTransport::responding(body), Some("t"));
            let spec = RequestSpec::post("http://api.example.com/x");

            let (tx, rx) = mpsc::channel();
            c.request(spec.clone(), None, move |r: Result<Owner, _>| tx.send(r).unwrap());
            let callback = rx.recv().unwrap();
            let blocking: Result<Owner, _> = c.request_blocking(spec.clone(), None);
            assert_eq!(callback, blocking, "{body}");

            assert_eq!(run_json(&c, spec.clone()), c.request_json_blocking(spec), "{body}");
        }
    }

    #[tokio::test]
    async fn suspending_form_agrees_with_callback_form() {
        let c = client(
            StubTransport::responding(r#"{"code":0,"data":{"mid":3,"name":"c"}}"#),
            None,
        );
        let spec = RequestSpec::get("http://api.example.com/x");
        let owner: Owner = c.request_async(spec.clone(), None).await.unwrap();
        assert_eq!(owner, Owner { mid: 3, name: "c".to_string() });
        assert_eq!(
            c.request_json_async(spec).await.unwrap(),
            json!({"mid": 3, "name": "c"})
        );
    }

    #[test]
    fn dropped_completion_resolves_once_with_abandoned() {
        let c = client(Arc::new(DroppingTransport), None);
        let (tx, rx) = mpsc::channel();
        c.request_json(RequestSpec::get("http://api.example.com/x"), move |r| {
            tx.send(r).unwrap()
        });
        assert_eq!(
            rx.recv().unwrap(),
            Err(RequestError::Network(TransportError::Abandoned))
        );
        assert!(rx.recv().is_err(), "callback ran more than once");

        assert_eq!(
            c.request_json_blocking(RequestSpec::get("http://api.example.com/x")),
            Err(RequestError::Network(TransportError::Abandoned))
        );
    }

    #[test]
    fn token_is_read_once_at_dispatch() {
        let transport = Arc::new(DeferredTransport::default());
        let store = Arc::new(CredentialStore::with_token("before"));
        let c = WebClient::new(transport.clone(), store.clone());

        let (tx, rx) = mpsc::channel();
        c.request_json(RequestSpec::post("http://api.example.com/x"), move |r| {
            tx.send(r).unwrap()
        });
        store.set_csrf_token("after");

        let (request, complete) = transport.pending.lock().unwrap().pop().unwrap();
        assert_eq!(request.body.as_deref(), Some("biliCSRF=before&csrf=before"));
        complete(Ok(HttpResponse::new(200, r#"{"code":0,"data":{}}"#)));
        assert_eq!(rx.recv().unwrap(), Ok(json!({})));
    }

    #[test]
    fn concurrent_calls_are_independent() {
        let transport = StubTransport::responding(r#"{"code":0,"data":{"mid":1,"name":"n"}}"#);
        let c = client(transport.clone(), Some("t"));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let c = c.clone();
                std::thread::spawn(move || {
                    let spec = RequestSpec::post("http://api.example.com/x").param("i", i);
                    c.request_blocking::<Owner>(spec, None).unwrap()
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap().mid, 1);
        }
        assert_eq!(transport.seen.lock().unwrap().len(), 8);
    }
}
