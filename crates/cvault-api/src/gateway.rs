//! The request gateway: one choke point for every server round-trip.
//!
//! Responsibilities, in order of application:
//!   1. offline short-circuit (cache hit or [`ApiError::Offline`])
//!   2. auth + integrity headers (`Authorization: Bearer`, `Checksum`)
//!   3. retry loop with a fixed inter-attempt delay
//!   4. envelope decoding into typed success/failure
//!   5. cache write-through on success, cache fallback on exhaustion
//!   6. session teardown on a dead API key

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::de::DeserializeOwned;
use sha2::{Digest, Sha512};
use tracing::{debug, warn};

use cvault_core::cache::KeyValueCache;
use cvault_core::config::ApiConfig;

use crate::envelope::{ApiEnvelope, RETRYABLE_CODES, SESSION_INVALID_CODES};
use crate::error::{ApiError, ApiResult};
use crate::transport::{HttpMethod, HttpRequest, NetworkStatus, Transport};

/// Endpoints whose successful responses are cached and may be served
/// from cache while offline or after retry exhaustion. Everything else
/// mutates server state and must never be answered from cache.
const CACHEABLE_ENDPOINTS: &[&str] = &[
    "/v3/dir/content",
    "/v3/dir/download",
    "/v3/dir/size",
    "/v3/dir/size/link",
    "/v3/dir/exists",
    "/v3/file/exists",
    "/v3/item/shared",
    "/v3/item/linked",
    "/v3/shared/in",
    "/v3/shared/out",
    "/v3/user/info",
    "/v3/user/account",
    "/v3/user/baseFolder",
    "/v3/user/keyPair/info",
];

/// Invoked (once) when the server reports the API key dead. Wired to
/// session teardown by the embedding application.
pub type SessionInvalidHook = Arc<dyn Fn() + Send + Sync>;

pub struct RequestGateway {
    transport: Arc<dyn Transport>,
    network: Arc<dyn NetworkStatus>,
    cache: Arc<dyn KeyValueCache>,
    config: ApiConfig,
    api_key: RwLock<String>,
    session_hook: Option<SessionInvalidHook>,
    session_invalidated: AtomicBool,
}

impl RequestGateway {
    pub fn new(
        transport: Arc<dyn Transport>,
        network: Arc<dyn NetworkStatus>,
        cache: Arc<dyn KeyValueCache>,
        config: ApiConfig,
    ) -> Self {
        RequestGateway {
            transport,
            network,
            cache,
            config,
            api_key: RwLock::new(String::new()),
            session_hook: None,
            session_invalidated: AtomicBool::new(false),
        }
    }

    /// Register the teardown callback fired when the server declares
    /// the API key invalid.
    pub fn with_session_hook(mut self, hook: SessionInvalidHook) -> Self {
        self.session_hook = Some(hook);
        self
    }

    /// Set (or replace, after re-login) the bearer token.
    pub fn set_api_key(&self, key: impl Into<String>) {
        if let Ok(mut guard) = self.api_key.write() {
            *guard = key.into();
        }
        self.session_invalidated.store(false, Ordering::SeqCst);
    }

    /// POST a JSON body to an endpoint and return the envelope's `data`.
    pub async fn request(
        &self,
        endpoint: &str,
        body: serde_json::Value,
    ) -> ApiResult<serde_json::Value> {
        self.request_full(HttpMethod::Post, endpoint, body, None).await
    }

    /// Full-form request: explicit method, plus an optional credential
    /// that overrides the stored API key for this call only (link
    /// password checks and pre-login flows authenticate with a key
    /// that is not the session's).
    pub async fn request_full(
        &self,
        method: HttpMethod,
        endpoint: &str,
        body: serde_json::Value,
        credential: Option<&str>,
    ) -> ApiResult<serde_json::Value> {
        let body_json = body.to_string();
        let cacheable = CACHEABLE_ENDPOINTS.contains(&endpoint);
        let cache_key = cache_key(method, endpoint, &body_json);

        if !self.network.is_online() {
            if cacheable {
                if let Some(cached) = self.cached_data(&cache_key) {
                    debug!(endpoint, "offline, serving cached response");
                    return Ok(cached);
                }
            }
            return Err(ApiError::Offline);
        }

        let max_attempts = if cacheable {
            self.config.max_retries_cacheable
        } else {
            self.config.max_retries
        };
        let delay = Duration::from_millis(self.config.retry_delay_ms);

        let mut last_error = ApiError::Transport("no attempt made".into());
        for attempt in 1..=max_attempts {
            if attempt > 1 {
                tokio::time::sleep(delay).await;
            }

            match self.attempt(method, endpoint, &body_json, credential).await {
                Ok(data) => {
                    if cacheable {
                        self.cache.set(&cache_key, &data.to_string());
                    }
                    return Ok(data);
                }
                Err(error) => match error {
                    ApiError::Transport(_) | ApiError::Decode(_) => {
                        debug!(endpoint, attempt, error = %error, "request attempt failed");
                        last_error = error;
                    }
                    ApiError::Server { ref code, .. } if RETRYABLE_CODES.contains(&code.as_str()) => {
                        debug!(endpoint, attempt, code, "server-side transient failure");
                        last_error = error;
                    }
                    ApiError::SessionInvalid(_) => {
                        self.fire_session_hook();
                        return Err(error);
                    }
                    other => return Err(other),
                },
            }
        }

        if cacheable {
            if let Some(cached) = self.cached_data(&cache_key) {
                warn!(endpoint, "retries exhausted, serving cached response");
                return Ok(cached);
            }
        }

        Err(ApiError::RetriesExhausted {
            attempts: max_attempts,
            last: last_error.to_string(),
        })
    }

    /// POST and decode the `data` payload into a concrete type.
    pub async fn request_typed<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: serde_json::Value,
    ) -> ApiResult<T> {
        let data = self.request(endpoint, body).await?;
        serde_json::from_value(data).map_err(|e| ApiError::Decode(e.to_string()))
    }

    /// POST where only success/failure matters.
    pub async fn request_unit(&self, endpoint: &str, body: serde_json::Value) -> ApiResult<()> {
        self.request(endpoint, body).await.map(|_| ())
    }

    async fn attempt(
        &self,
        method: HttpMethod,
        endpoint: &str,
        body_json: &str,
        credential: Option<&str>,
    ) -> ApiResult<serde_json::Value> {
        let api_key = match credential {
            Some(key) => key.to_string(),
            None => self.api_key.read().map(|k| k.clone()).unwrap_or_default(),
        };

        let url = self
            .config
            .base_url
            .parse::<url::Url>()
            .and_then(|base| base.join(endpoint))
            .map_err(|e| ApiError::Transport(format!("invalid endpoint url: {e}")))?;

        let mut headers = vec![("Authorization".into(), format!("Bearer {api_key}"))];
        let body = match method {
            HttpMethod::Post => {
                headers.push(("Checksum".into(), checksum(body_json)));
                Some(body_json.to_string())
            }
            HttpMethod::Get => None,
        };

        let request = HttpRequest {
            method,
            url: url.into(),
            headers,
            body,
        };

        let response = self.transport.send(request).await?;
        let envelope: ApiEnvelope = serde_json::from_str(&response.body)
            .map_err(|e| ApiError::Decode(format!("status {}: {e}", response.status)))?;

        if envelope.status {
            return Ok(envelope.data);
        }
        if SESSION_INVALID_CODES.contains(&envelope.code.as_str()) {
            return Err(ApiError::SessionInvalid(envelope.message));
        }
        Err(ApiError::Server {
            code: envelope.code,
            message: envelope.message,
        })
    }

    fn cached_data(&self, cache_key: &str) -> Option<serde_json::Value> {
        let raw = self.cache.get(cache_key)?;
        serde_json::from_str(&raw).ok()
    }

    fn fire_session_hook(&self) {
        // Bulk operations can hit a dead key dozens of times in
        // parallel; tear down once.
        if self.session_invalidated.swap(true, Ordering::SeqCst) {
            return;
        }
        warn!("api key rejected by server, invalidating session");
        if let Some(hook) = &self.session_hook {
            hook();
        }
    }
}

fn cache_key(method: HttpMethod, endpoint: &str, body_json: &str) -> String {
    format!("apiCache:{method}:{endpoint}:{body_json}")
}

/// SHA-512 hex digest of the request body, sent as the `Checksum`
/// header for end-to-end integrity.
fn checksum(body_json: &str) -> String {
    let mut hasher = Sha512::new();
    hasher.update(body_json.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use cvault_core::cache::MemoryCache;
    use serde_json::json;

    use crate::transport::{AlwaysOnline, HttpResponse};

    /// Scripted transport: pops responses front-to-back, then keeps
    /// returning a connection failure. Records every request it sees.
    struct MockTransport {
        script: Mutex<VecDeque<Result<HttpResponse, ApiError>>>,
        requests: Mutex<Vec<HttpRequest>>,
        calls: AtomicUsize,
    }

    impl MockTransport {
        fn new(script: Vec<Result<HttpResponse, ApiError>>) -> Arc<Self> {
            Arc::new(MockTransport {
                script: Mutex::new(script.into()),
                requests: Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn last_request(&self) -> HttpRequest {
            self.requests.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ApiError::Transport("connection refused".into())))
        }
    }

    struct Offline;
    impl NetworkStatus for Offline {
        fn is_online(&self) -> bool {
            false
        }
    }

    fn ok_envelope(data: serde_json::Value) -> Result<HttpResponse, ApiError> {
        Ok(HttpResponse {
            status: 200,
            body: json!({"status": true, "message": "OK", "code": "success", "data": data})
                .to_string(),
        })
    }

    fn err_envelope(code: &str, message: &str) -> Result<HttpResponse, ApiError> {
        Ok(HttpResponse {
            status: 200,
            body: json!({"status": false, "message": message, "code": code}).to_string(),
        })
    }

    fn fast_config() -> ApiConfig {
        ApiConfig {
            base_url: "https://api.test".into(),
            retry_delay_ms: 0,
            ..ApiConfig::default()
        }
    }

    fn gateway(
        transport: Arc<MockTransport>,
        network: Arc<dyn NetworkStatus>,
        cache: Arc<MemoryCache>,
    ) -> RequestGateway {
        let gw = RequestGateway::new(transport, network, cache, fast_config());
        gw.set_api_key("test-api-key");
        gw
    }

    #[tokio::test]
    async fn success_returns_data_with_auth_and_checksum_headers() {
        let transport = MockTransport::new(vec![ok_envelope(json!({"uuid": "d1"}))]);
        let cache = Arc::new(MemoryCache::new());
        let gw = gateway(transport.clone(), Arc::new(AlwaysOnline), cache);

        let body = json!({"uuid": "d1", "name": "x"});
        let data = gw.request("/v3/dir/create", body.clone()).await.unwrap();
        assert_eq!(data["uuid"], "d1");

        let sent = transport.last_request();
        assert_eq!(sent.url, "https://api.test/v3/dir/create");
        assert_eq!(sent.method, HttpMethod::Post);
        let auth = sent
            .headers
            .iter()
            .find(|(n, _)| n == "Authorization")
            .unwrap();
        assert_eq!(auth.1, "Bearer test-api-key");
        let cs = sent.headers.iter().find(|(n, _)| n == "Checksum").unwrap();
        assert_eq!(cs.1, checksum(&body.to_string()));
    }

    #[tokio::test]
    async fn offline_serves_cacheable_endpoint_from_cache() {
        let transport = MockTransport::new(vec![]);
        let cache = Arc::new(MemoryCache::new());
        let body = json!({"uuid": "d1"});
        cache.set(
            &cache_key(HttpMethod::Post, "/v3/dir/content", &body.to_string()),
            r#"{"uploads":[],"folders":[]}"#,
        );
        let gw = gateway(transport.clone(), Arc::new(Offline), cache);

        let data = gw.request("/v3/dir/content", body).await.unwrap();
        assert_eq!(data["uploads"], json!([]));
        assert_eq!(transport.calls(), 0, "offline path must not touch the network");
    }

    #[tokio::test]
    async fn offline_without_cache_is_an_error() {
        let transport = MockTransport::new(vec![]);
        let gw = gateway(transport.clone(), Arc::new(Offline), Arc::new(MemoryCache::new()));

        let err = gw.request("/v3/dir/content", json!({"uuid": "d1"})).await.unwrap_err();
        assert!(matches!(err, ApiError::Offline));
        assert_eq!(transport.calls(), 0);

        // Mutating endpoints never consult the cache.
        let err = gw.request("/v3/dir/create", json!({})).await.unwrap_err();
        assert!(matches!(err, ApiError::Offline));
    }

    #[tokio::test]
    async fn mutating_endpoint_retries_full_budget_then_reports_last_error() {
        let transport = MockTransport::new(vec![]);
        let gw = gateway(transport.clone(), Arc::new(AlwaysOnline), Arc::new(MemoryCache::new()));

        let err = gw.request("/v3/dir/create", json!({"uuid": "d1"})).await.unwrap_err();
        match err {
            ApiError::RetriesExhausted { attempts, last } => {
                assert_eq!(attempts, 32);
                assert!(last.contains("connection refused"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(transport.calls(), 32);
    }

    #[tokio::test]
    async fn cacheable_endpoint_falls_back_to_cache_after_exhaustion() {
        let transport = MockTransport::new(vec![]);
        let cache = Arc::new(MemoryCache::new());
        let body = json!({"uuid": "d1"});
        cache.set(
            &cache_key(HttpMethod::Post, "/v3/dir/content", &body.to_string()),
            r#"{"uploads":[],"folders":[{"uuid":"f1"}]}"#,
        );
        let gw = gateway(transport.clone(), Arc::new(AlwaysOnline), cache);

        let data = gw.request("/v3/dir/content", body).await.unwrap();
        assert_eq!(data["folders"][0]["uuid"], "f1");
        assert_eq!(transport.calls(), 3, "cacheable endpoints get the short budget");
    }

    #[tokio::test]
    async fn success_on_cacheable_endpoint_writes_through() {
        let transport = MockTransport::new(vec![ok_envelope(json!({"size": 42}))]);
        let cache = Arc::new(MemoryCache::new());
        let gw = gateway(transport, Arc::new(AlwaysOnline), cache.clone());

        let body = json!({"uuid": "d1"});
        gw.request("/v3/dir/size", body.clone()).await.unwrap();

        let key = cache_key(HttpMethod::Post, "/v3/dir/size", &body.to_string());
        assert_eq!(cache.get(&key).as_deref(), Some(r#"{"size":42}"#));
    }

    #[tokio::test]
    async fn dead_api_key_fires_teardown_once_and_never_retries() {
        let transport = MockTransport::new(vec![
            err_envelope("api_key_not_found", "Invalid API key."),
            err_envelope("api_key_not_found", "Invalid API key."),
        ]);
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_hook = fired.clone();

        let gw = RequestGateway::new(
            transport.clone(),
            Arc::new(AlwaysOnline),
            Arc::new(MemoryCache::new()),
            fast_config(),
        )
        .with_session_hook(Arc::new(move || {
            fired_hook.fetch_add(1, Ordering::SeqCst);
        }));
        gw.set_api_key("stale-key");

        let err = gw.request("/v3/dir/create", json!({})).await.unwrap_err();
        assert!(matches!(err, ApiError::SessionInvalid(_)));
        assert_eq!(transport.calls(), 1, "a dead key is not retryable");

        let err = gw.request("/v3/dir/trash", json!({})).await.unwrap_err();
        assert!(matches!(err, ApiError::SessionInvalid(_)));
        assert_eq!(fired.load(Ordering::SeqCst), 1, "teardown fires once");
    }

    #[tokio::test]
    async fn internal_error_is_retried_until_success() {
        let transport = MockTransport::new(vec![
            err_envelope("internal_error", "Internal server error."),
            err_envelope("internal_error", "Internal server error."),
            ok_envelope(json!({"ok": true})),
        ]);
        let gw = gateway(transport.clone(), Arc::new(AlwaysOnline), Arc::new(MemoryCache::new()));

        let data = gw.request("/v3/dir/create", json!({})).await.unwrap();
        assert_eq!(data["ok"], true);
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test]
    async fn definitive_rejection_is_not_retried() {
        let transport = MockTransport::new(vec![err_envelope(
            "folder_not_found",
            "Folder not found.",
        )]);
        let gw = gateway(transport.clone(), Arc::new(AlwaysOnline), Arc::new(MemoryCache::new()));

        let err = gw.request("/v3/dir/trash", json!({"uuid": "gone"})).await.unwrap_err();
        match err {
            ApiError::Server { code, .. } => assert_eq!(code, "folder_not_found"),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn malformed_body_is_retried() {
        let transport = MockTransport::new(vec![
            Ok(HttpResponse { status: 502, body: "<html>bad gateway</html>".into() }),
            ok_envelope(json!({"ok": true})),
        ]);
        let gw = gateway(transport.clone(), Arc::new(AlwaysOnline), Arc::new(MemoryCache::new()));

        let data = gw.request("/v3/dir/create", json!({})).await.unwrap();
        assert_eq!(data["ok"], true);
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn typed_request_decodes_payload() {
        #[derive(serde::Deserialize)]
        struct SizeResponse {
            size: u64,
        }

        let transport = MockTransport::new(vec![ok_envelope(json!({"size": 1337}))]);
        let gw = gateway(transport, Arc::new(AlwaysOnline), Arc::new(MemoryCache::new()));

        let resp: SizeResponse = gw.request_typed("/v3/dir/size", json!({"uuid": "d1"})).await.unwrap();
        assert_eq!(resp.size, 1337);
    }

    #[tokio::test]
    async fn credential_override_replaces_stored_bearer_for_one_call() {
        let transport = MockTransport::new(vec![
            ok_envelope(json!({})),
            ok_envelope(json!({})),
        ]);
        let gw = gateway(transport.clone(), Arc::new(AlwaysOnline), Arc::new(MemoryCache::new()));

        gw.request_full(HttpMethod::Post, "/v3/dir/create", json!({}), Some("link-password-key"))
            .await
            .unwrap();
        let auth = |req: &HttpRequest| {
            req.headers
                .iter()
                .find(|(n, _)| n == "Authorization")
                .map(|(_, v)| v.clone())
                .unwrap()
        };
        assert_eq!(auth(&transport.last_request()), "Bearer link-password-key");

        // The stored key is untouched.
        gw.request("/v3/dir/create", json!({})).await.unwrap();
        assert_eq!(auth(&transport.last_request()), "Bearer test-api-key");
    }

    #[tokio::test]
    async fn get_requests_carry_no_body_or_checksum() {
        let transport = MockTransport::new(vec![ok_envelope(json!({"alive": true}))]);
        let gw = gateway(transport.clone(), Arc::new(AlwaysOnline), Arc::new(MemoryCache::new()));

        gw.request_full(HttpMethod::Get, "/v3/health", json!({}), None).await.unwrap();

        let sent = transport.last_request();
        assert_eq!(sent.method, HttpMethod::Get);
        assert!(sent.body.is_none());
        assert!(!sent.headers.iter().any(|(n, _)| n == "Checksum"));
    }

    #[test]
    fn cache_key_includes_method_endpoint_and_body() {
        let key = cache_key(HttpMethod::Post, "/v3/dir/content", r#"{"uuid":"d1"}"#);
        assert_eq!(key, r#"apiCache:POST:/v3/dir/content:{"uuid":"d1"}"#);
    }
}
