//! Tokio TCP server.
//!
//! One task per connection; HTTP/1.1 keep-alive is honoured until the peer
//! closes or either side asks for `Connection: close`. Each dispatched
//! [`Request`] carries the peer address it arrived from.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::http::StatusCode;
use crate::http::request::{Request, RequestError};
use crate::http::response::Response;
use crate::middleware::Pipeline;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
}

/// Largest request (head plus body) buffered before answering 413.
const MAX_REQUEST_SIZE: usize = 8 * 1024 * 1024;

const INITIAL_BUF_SIZE: usize = 4096;

/// A bound listener waiting to be started with [`serve`](Self::serve) or
/// [`run`](Self::run).
///
/// # Examples
///
/// ```rust,no_run
/// use rttp_cache::server::Server;
/// use rttp_cache::http::{Response, StatusCode};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let server = Server::bind("127.0.0.1:8080").await?;
///     server.run(|_req| async {
///         Response::new(StatusCode::Ok).body("Hello!")
///     }).await?;
///     Ok(())
/// }
/// ```
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Server {
    /// # Errors
    ///
    /// [`ServerError::Bind`] when the address is unusable or already taken.
    pub async fn bind(addr: impl AsRef<str>) -> Result<Self, ServerError> {
        let addr = addr.as_ref();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.to_owned(),
                source,
            })?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serves every request through `pipeline`. Runs until the process exits.
    pub async fn serve(self, pipeline: Pipeline) -> Result<(), ServerError> {
        let pipeline = Arc::new(pipeline);
        self.run(move |request| {
            let pipeline = Arc::clone(&pipeline);
            async move { pipeline.handle(request).await }
        })
        .await
    }

    /// Serves every request with a plain handler function shared across
    /// connection tasks. Accept failures are logged and skipped.
    pub async fn run<H, F>(self, handler: H) -> Result<(), ServerError>
    where
        H: Fn(Request) -> F + Send + Sync + 'static,
        F: Future<Output = Response> + Send + 'static,
    {
        let handler = Arc::new(handler);
        info!(address = %self.local_addr, "listening");

        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!(error = %e, "failed to accept connection");
                    continue;
                }
            };
            debug!(peer = %peer, "connection accepted");

            let handler = Arc::clone(&handler);
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, peer, handler).await {
                    warn!(peer = %peer, error = %e, "connection closed with error");
                }
            });
        }
    }
}

// What the buffered bytes amount to so far.
enum Framed {
    NeedMore,
    Ready { request: Request, len: usize },
    Reject(Response),
}

fn frame(buf: &[u8]) -> Framed {
    if buf.len() > MAX_REQUEST_SIZE {
        return Framed::Reject(
            Response::new(StatusCode::PayloadTooLarge).body("Request entity too large"),
        );
    }
    match Request::parse(buf) {
        Ok((request, body_offset)) => {
            let len = body_offset + request.content_length().unwrap_or(0);
            if buf.len() < len {
                Framed::NeedMore
            } else {
                Framed::Ready { request, len }
            }
        }
        Err(RequestError::Incomplete) => Framed::NeedMore,
        Err(e) => Framed::Reject(
            Response::new(StatusCode::BadRequest).body(format!("Bad Request: {e}")),
        ),
    }
}

async fn handle_connection<H, F>(
    mut stream: TcpStream,
    peer: SocketAddr,
    handler: Arc<H>,
) -> io::Result<()>
where
    H: Fn(Request) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    let mut buf = BytesMut::with_capacity(INITIAL_BUF_SIZE);

    loop {
        if stream.read_buf(&mut buf).await? == 0 {
            debug!(peer = %peer, "connection closed by peer");
            return Ok(());
        }

        let (request, len) = match frame(&buf) {
            Framed::NeedMore => continue,
            Framed::Ready { request, len } => (request, len),
            Framed::Reject(response) => {
                warn!(peer = %peer, status = response.status().as_u16(), "rejecting request");
                stream.write_all(&response.keep_alive(false).into_bytes()).await?;
                return Ok(());
            }
        };

        let keep_alive = request.is_keep_alive();
        debug!(peer = %peer, method = %request.method(), path = %request.path(), "dispatching request");

        let response = handler(request.with_peer_addr(peer)).await;
        let close = !keep_alive || !response.is_keep_alive();
        stream.write_all(&response.into_bytes()).await?;
        stream.flush().await?;
        let _ = buf.split_to(len);

        if close {
            debug!(peer = %peer, "closing non-persistent connection");
            return Ok(());
        }
    }
}
