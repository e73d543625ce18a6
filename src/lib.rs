//! # rttp-cache
//!
//! A small async HTTP/1.1 server with a cache-aside response cache.
//!
//! Handlers are registered on a [`Router`], wrapped in a
//! [`Pipeline`](middleware::Pipeline) of middleware and served by a [`Server`].
//! [`cache::CacheMiddleware`] stores `GET` responses in memory or in Redis
//! and replays them until they expire.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use rttp_cache::cache::{CacheMiddleware, MemoryStore, by_path};
//! use rttp_cache::middleware::Pipeline;
//! use rttp_cache::{Response, Router, Server, StatusCode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut router = Router::new();
//!     router.get("/hello", |_ctx| async {
//!         Response::new(StatusCode::Ok).body("Hello, World!")
//!     });
//!
//!     let pipeline = Pipeline::new(router).layer(CacheMiddleware::new(
//!         MemoryStore::new(Duration::from_secs(5)),
//!         by_path(Duration::from_secs(10)),
//!     ));
//!
//!     Server::bind("127.0.0.1:8080").await?.serve(pipeline).await?;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod context;
pub mod http;
pub mod middleware;
pub mod router;
pub mod server;

pub use http::{Headers, Method, Request, Response, ResponseWriter, StatusCode};
pub use router::Router;
pub use server::{Server, ServerError};
