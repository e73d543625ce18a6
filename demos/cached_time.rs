//! Serves the current time on `/time`, cached for one second.
//!
//! ```text
//! cargo run --example cached_time
//! CACHE_CONFIG='{"store":{"backend":"redis","url":"redis://127.0.0.1:6379/0"}}' \
//!     cargo run --example cached_time
//! curl -i http://127.0.0.1:3000/time
//! ```

use std::time::Duration;

use chrono::Utc;
use rttp_cache::cache::{Backend, CacheConfig, CacheMiddleware, by_path};
use rttp_cache::middleware::{LoggerMiddleware, Pipeline};
use rttp_cache::{Method, Response, Router, Server, StatusCode};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,rttp_cache=debug")),
        )
        .init();

    let config = match std::env::var("CACHE_CONFIG") {
        Ok(json) => CacheConfig::from_json(&json)?,
        Err(_) => CacheConfig::default(),
    };
    let store = Backend::from_config(&config.store).await?;

    let mut router = Router::new();
    for method in [Method::Get, Method::Post] {
        router.on(method, "/time", |_ctx| async {
            Response::new(StatusCode::Ok)
                .header("Content-Type", "text/plain; charset=utf-8")
                .body(Utc::now().to_rfc3339())
        });
    }

    let pipeline = Pipeline::new(router).layer(LoggerMiddleware).layer(
        CacheMiddleware::new(store, by_path(Duration::from_secs(1)))
            .failure_policy(config.failure_policy),
    );

    let server = Server::bind("127.0.0.1:3000").await?;
    tracing::info!("listening on http://{}", server.local_addr());
    server.serve(pipeline).await?;
    Ok(())
}
