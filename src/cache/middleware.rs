use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, error, warn};

use super::entry::expiry_after;
use super::{CacheEntry, CacheError, Capture, KeyExtractor, Store};
use crate::context::Context;
use crate::http::date::fmt_http_date;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::{Method, Response, StatusCode};

/// What to do when the extractor or the store fails for a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Answer `500 Internal Server Error` instead of the handler's response.
    #[default]
    Fail,
    /// Log the failure and carry on as if the cache were not there.
    Bypass,
}

/// Cache-aside middleware.
///
/// `GET` requests are looked up under the key the extractor derives. A fresh
/// entry is replayed without running the handler; otherwise the handler runs,
/// its response is tee'd through a [`Capture`] and the captured body, status
/// and content type are saved for `ttl`. Both paths set `Last-Modified` and
/// `Expires`. Every other method passes through untouched.
///
/// # Examples
///
/// ```rust,no_run
/// use std::time::Duration;
/// use rttp_cache::cache::{CacheMiddleware, MemoryStore, by_path};
/// use rttp_cache::middleware::Pipeline;
/// use rttp_cache::{Response, Router, StatusCode};
///
/// # #[tokio::main] async fn main() {
/// let mut router = Router::new();
/// router.get("/time", |_ctx| async { Response::new(StatusCode::Ok).body("now") });
///
/// let cache = CacheMiddleware::new(
///     MemoryStore::new(Duration::from_secs(5)),
///     by_path(Duration::from_secs(1)),
/// );
/// let pipeline = Pipeline::new(router).layer(cache);
/// # }
/// ```
pub struct CacheMiddleware {
    store: Arc<dyn Store>,
    extractor: Arc<dyn KeyExtractor>,
    policy: FailurePolicy,
}

impl CacheMiddleware {
    pub fn new<S, E>(store: S, extractor: E) -> Self
    where
        S: Store + 'static,
        E: KeyExtractor + 'static,
    {
        Self::from_shared(Arc::new(store), Arc::new(extractor))
    }

    /// Builds the middleware around a store that is also used elsewhere,
    /// e.g. for explicit invalidation.
    pub fn from_shared(store: Arc<dyn Store>, extractor: Arc<dyn KeyExtractor>) -> Self {
        Self {
            store,
            extractor,
            policy: FailurePolicy::default(),
        }
    }

    #[must_use]
    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }
}

impl Middleware for CacheMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> BoxFuture {
        let store = Arc::clone(&self.store);
        let extractor = Arc::clone(&self.extractor);
        let policy = self.policy;

        Box::pin(async move {
            if ctx.request().method() != &Method::Get {
                debug!(method = %ctx.request().method(), "not cacheable, passing through");
                return next.run(ctx).await;
            }

            let (key, ttl) = match extractor.extract(&ctx) {
                Ok(extracted) => extracted,
                Err(e) => return fail_or_pass(policy, e.into(), ctx, next).await,
            };

            match store.get(&key).await {
                Ok(Some(entry)) => {
                    debug!(key = %key, "cache hit");
                    return replay(entry);
                }
                Ok(None) => debug!(key = %key, "cache miss"),
                Err(e) => return fail_or_pass(policy, e.into(), ctx, next).await,
            }

            let now = Utc::now();
            let expires_at = expiry_after(now, ttl);
            let downstream = next.run(ctx).await;

            let (response, captured) = capture(downstream, now, expires_at);
            let saved = match captured {
                Ok(entry) => store.save(&key, entry).await.map_err(CacheError::from),
                Err(e) => Err(e),
            };
            match saved {
                Ok(()) => {
                    debug!(key = %key, expires_at = %expires_at, "response cached");
                    response
                }
                Err(e) => on_failure(policy, &e, response),
            }
        })
    }
}

// Overrides whatever the handler set, so a miss and the hits after it agree.
fn freshness_headers(
    response: &mut Response,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
) {
    response.set_header("Last-Modified", fmt_http_date(created_at));
    response.set_header("Expires", fmt_http_date(expires_at));
}

fn replay(entry: CacheEntry) -> Response {
    let mut response = Response::new(entry.status);
    freshness_headers(
        &mut response,
        entry.created_at.unwrap_or(entry.expires_at),
        entry.expires_at,
    );
    if !entry.content_type.is_empty() {
        response.add_header("Content-Type", entry.content_type);
    }
    response.body_bytes(entry.body.to_vec())
}

// Runs the downstream response through a capture into the response the client
// receives, and builds the entry from what the client-facing writer ended up with.
// The client-facing response is returned even when the capture fails.
fn capture(
    downstream: Response,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
) -> (Response, Result<CacheEntry, CacheError>) {
    let mut response = Response::new(downstream.status()).keep_alive(downstream.is_keep_alive());

    let mut tee = Capture::new(&mut response);
    let replayed = downstream.write_into(&mut tee);
    let (_, body) = tee.into_parts();
    freshness_headers(&mut response, created_at, expires_at);

    let entry = replayed.map_err(CacheError::Capture).map(|()| CacheEntry {
        key: String::new(),
        body,
        status: response.status(),
        content_type: response
            .headers()
            .get("content-type")
            .unwrap_or_default()
            .to_owned(),
        created_at: Some(created_at),
        expires_at,
    });
    (response, entry)
}

async fn fail_or_pass(policy: FailurePolicy, e: CacheError, ctx: Context, next: Next) -> Response {
    match policy {
        FailurePolicy::Fail => failure_response(&e),
        FailurePolicy::Bypass => {
            warn!(error = %e, "cache unavailable, passing request through");
            next.run(ctx).await
        }
    }
}

// For failures after the handler already ran: `fallback` is its response.
fn on_failure(policy: FailurePolicy, e: &CacheError, fallback: Response) -> Response {
    match policy {
        FailurePolicy::Fail => failure_response(e),
        FailurePolicy::Bypass => {
            warn!(error = %e, "failed to cache response");
            fallback
        }
    }
}

fn failure_response(e: &CacheError) -> Response {
    error!(error = %e, "cache failure");
    Response::new(StatusCode::InternalServerError)
        .body("Internal Server Error")
        .keep_alive(false)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use bytes::Bytes;

    use super::*;
    use crate::cache::{ExtractError, MemoryStore, StoreError, by_path};
    use crate::middleware::Pipeline;
    use crate::{Request, Router};

    fn request(method: &str, path: &str) -> Request {
        let raw = format!("{method} {path} HTTP/1.1\r\nHost: localhost\r\n\r\n");
        Request::parse(raw.as_bytes()).unwrap().0
    }

    // Router whose `/count` handler answers with how many times it has run.
    fn counting_router(calls: &Arc<AtomicUsize>) -> Router {
        let mut router = Router::new();
        for method in [Method::Get, Method::Post] {
            let calls = Arc::clone(calls);
            router.on(method, "/count", move |_ctx| {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    Response::new(StatusCode::ImATeapot)
                        .header("Content-Type", "text/plain")
                        .body(format!("call {n}"))
                }
            });
        }
        router
    }

    // Records every call; optionally fails them.
    #[derive(Default)]
    struct Spy {
        calls: Mutex<Vec<&'static str>>,
        saved: Mutex<Option<CacheEntry>>,
        failing: bool,
    }

    impl Spy {
        fn failing() -> Self {
            Self {
                failing: true,
                ..Self::default()
            }
        }

        fn record(&self, op: &'static str) -> Result<(), StoreError> {
            self.calls.lock().unwrap().push(op);
            if self.failing {
                return Err(StoreError::Malformed {
                    key: "spy".into(),
                    reason: "injected".into(),
                });
            }
            Ok(())
        }
    }

    #[async_trait]
    impl Store for Spy {
        async fn save(&self, _key: &str, entry: CacheEntry) -> Result<(), StoreError> {
            self.record("save")?;
            *self.saved.lock().unwrap() = Some(entry);
            Ok(())
        }

        async fn get(&self, _key: &str) -> Result<Option<CacheEntry>, StoreError> {
            self.record("get")?;
            Ok(None)
        }

        async fn delete(&self, _key: &str) -> Result<(), StoreError> {
            self.record("delete")
        }
    }

    struct FailingSave(Arc<Spy>);

    #[async_trait]
    impl Store for FailingSave {
        async fn save(&self, key: &str, _entry: CacheEntry) -> Result<(), StoreError> {
            Err(StoreError::Malformed {
                key: key.into(),
                reason: "read-only".into(),
            })
        }

        async fn get(&self, key: &str) -> Result<Option<CacheEntry>, StoreError> {
            self.0.get(key).await
        }

        async fn delete(&self, key: &str) -> Result<(), StoreError> {
            self.0.delete(key).await
        }
    }

    #[tokio::test]
    async fn miss_then_hit_replays_without_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = CacheMiddleware::new(MemoryStore::default(), by_path(Duration::from_secs(60)));
        let pipeline = Pipeline::new(counting_router(&calls)).layer(cache);

        let first = pipeline.handle(request("GET", "/count")).await;
        let second = pipeline.handle(request("GET", "/count")).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.content(), b"call 1");
        assert_eq!(second.content(), b"call 1");
        assert_eq!(second.status(), StatusCode::ImATeapot);
        assert_eq!(second.headers().get("content-type"), Some("text/plain"));
        for header in ["last-modified", "expires"] {
            assert!(first.headers().get(header).is_some());
            assert_eq!(first.headers().get(header), second.headers().get(header));
        }
    }

    #[tokio::test]
    async fn non_get_never_touches_the_store() {
        let calls = Arc::new(AtomicUsize::new(0));
        let spy = Arc::new(Spy::default());
        let cache = CacheMiddleware::from_shared(spy.clone(), Arc::new(by_path(Duration::from_secs(1))));
        let pipeline = Pipeline::new(counting_router(&calls)).layer(cache);

        let response = pipeline.handle(request("POST", "/count")).await;
        assert_eq!(response.content(), b"call 1");
        assert!(response.headers().get("expires").is_none());
        assert!(spy.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn miss_persists_exactly_what_the_client_got() {
        let calls = Arc::new(AtomicUsize::new(0));
        let spy = Arc::new(Spy::default());
        let cache = CacheMiddleware::from_shared(spy.clone(), Arc::new(by_path(Duration::from_secs(1))));
        let pipeline = Pipeline::new(counting_router(&calls)).layer(cache);

        let response = pipeline.handle(request("GET", "/count")).await;
        let saved = spy.saved.lock().unwrap().clone().unwrap();

        assert_eq!(*spy.calls.lock().unwrap(), vec!["get", "save"]);
        assert_eq!(saved.body, Bytes::copy_from_slice(response.content()));
        assert_eq!(saved.status, response.status());
        assert_eq!(saved.content_type, "text/plain");
        let created_at = saved.created_at.unwrap();
        assert_eq!(saved.expires_at - created_at, chrono::TimeDelta::seconds(1));
        assert_eq!(
            response.headers().get("last-modified"),
            Some(fmt_http_date(created_at).as_str())
        );
    }

    #[tokio::test]
    async fn extractor_failure_is_a_500_by_default() {
        let calls = Arc::new(AtomicUsize::new(0));
        let refuse = |_: &Context| -> Result<(String, Duration), ExtractError> {
            Err(ExtractError::new("no key"))
        };
        let pipeline = Pipeline::new(counting_router(&calls))
            .layer(CacheMiddleware::new(MemoryStore::default(), refuse));

        let response = pipeline.handle(request("GET", "/count")).await;
        assert_eq!(response.status(), StatusCode::InternalServerError);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn store_failure_is_a_500_by_default() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = CacheMiddleware::new(Spy::failing(), by_path(Duration::from_secs(1)));
        let pipeline = Pipeline::new(counting_router(&calls)).layer(cache);

        let response = pipeline.handle(request("GET", "/count")).await;
        assert_eq!(response.status(), StatusCode::InternalServerError);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn bypass_policy_serves_the_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = CacheMiddleware::new(Spy::failing(), by_path(Duration::from_secs(1)))
            .failure_policy(FailurePolicy::Bypass);
        let pipeline = Pipeline::new(counting_router(&calls)).layer(cache);

        let response = pipeline.handle(request("GET", "/count")).await;
        assert_eq!(response.status(), StatusCode::ImATeapot);
        assert_eq!(response.content(), b"call 1");
    }

    #[tokio::test]
    async fn miss_keeps_the_handlers_response_apart_from_freshness() {
        fn handler_response() -> Response {
            Response::new(StatusCode::Ok)
                .header("Content-Type", "application/json")
                .header("X-Trace", "abc")
                .body("{}")
                .keep_alive(false)
        }
        fn wire_lines(response: Response) -> Vec<String> {
            String::from_utf8(response.into_bytes().to_vec())
                .unwrap()
                .split("\r\n")
                .filter(|line| !line.starts_with("Last-Modified") && !line.starts_with("Expires"))
                .map(str::to_owned)
                .collect()
        }

        let mut router = Router::new();
        router.get("/doc", |_ctx| async { handler_response() });
        let cache = CacheMiddleware::new(MemoryStore::default(), by_path(Duration::from_secs(60)));
        let pipeline = Pipeline::new(router).layer(cache);

        let miss = pipeline.handle(request("GET", "/doc")).await;
        assert!(!miss.is_keep_alive());
        let lines = wire_lines(miss);
        assert!(lines.iter().any(|line| line == "Connection: close"));
        assert_eq!(lines, wire_lines(handler_response()));
    }

    #[tokio::test]
    async fn freshness_headers_replace_the_handlers_own() {
        let mut router = Router::new();
        router.get("/stale", |_ctx| async {
            Response::new(StatusCode::Ok)
                .header("Expires", "0")
                .header("Last-Modified", "yesterday")
                .body("x")
        });
        let spy = Arc::new(Spy::default());
        let cache = CacheMiddleware::from_shared(spy.clone(), Arc::new(by_path(Duration::from_secs(5))));
        let pipeline = Pipeline::new(router).layer(cache);

        let miss = pipeline.handle(request("GET", "/stale")).await;
        let saved = spy.saved.lock().unwrap().clone().unwrap();

        let expires: Vec<_> = miss.headers().get_all("expires").collect();
        assert_eq!(expires, [fmt_http_date(saved.expires_at).as_str()]);
        let modified: Vec<_> = miss.headers().get_all("last-modified").collect();
        assert_eq!(modified, [fmt_http_date(saved.created_at.unwrap()).as_str()]);

        let hit = replay(saved);
        assert_eq!(hit.headers().get("expires"), miss.headers().get("expires"));
        assert_eq!(hit.headers().get("last-modified"), miss.headers().get("last-modified"));
    }

    #[test]
    fn capture_failure_follows_the_policy() {
        let failure = || CacheError::Capture(std::io::Error::other("writer gone"));
        let fallback = || Response::new(StatusCode::Ok).body("handler");

        let failed = on_failure(FailurePolicy::Fail, &failure(), fallback());
        assert_eq!(failed.status(), StatusCode::InternalServerError);
        assert!(!failed.is_keep_alive());

        let bypassed = on_failure(FailurePolicy::Bypass, &failure(), fallback());
        assert_eq!(bypassed.status(), StatusCode::Ok);
        assert_eq!(bypassed.content(), b"handler");
    }

    #[tokio::test]
    async fn save_failure_under_bypass_keeps_the_handlers_response() {
        let calls = Arc::new(AtomicUsize::new(0));
        let spy = Arc::new(Spy::default());
        // Reads succeed, only the write fails.
        let cache = CacheMiddleware::from_shared(
            Arc::new(FailingSave(spy.clone())),
            Arc::new(by_path(Duration::from_secs(1))),
        )
        .failure_policy(FailurePolicy::Bypass);
        let pipeline = Pipeline::new(counting_router(&calls)).layer(cache);

        let response = pipeline.handle(request("GET", "/count")).await;
        assert_eq!(response.status(), StatusCode::ImATeapot);
        assert_eq!(response.content(), b"call 1");
        assert_eq!(*spy.calls.lock().unwrap(), vec!["get"]);
    }

    #[test]
    fn replay_omits_empty_content_type() {
        let now = Utc::now();
        let response = replay(CacheEntry {
            key: "/empty".into(),
            body: Bytes::new(),
            status: StatusCode::NoContent,
            content_type: String::new(),
            created_at: Some(now),
            expires_at: now,
        });
        assert!(response.headers().get("content-type").is_none());
        assert_eq!(response.status(), StatusCode::NoContent);
    }
}
