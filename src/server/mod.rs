//! Async TCP server using Tokio.
//!
//! Accepts TCP connections and dispatches HTTP/1.1 requests to a handler
//! function. Connections are persistent (keep-alive) by default. Streamed
//! response bodies are written with chunked transfer encoding, one chunk per
//! item received from the body channel.
//!
//! While a streamed body is in flight the connection keeps reading from the
//! socket. If the peer goes away, the body receiver is dropped, which is how
//! the producer behind it learns the client disconnected.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::http::{
    StatusCode,
    request::{Request, RequestError},
    response::{LAST_CHUNK, Response, encode_chunk},
};

/// Errors produced by the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Maximum size of a complete HTTP request we will buffer before rejecting it (8 MiB).
pub const MAX_REQUEST_SIZE: usize = 8 * 1024 * 1024;

/// Initial read buffer capacity per connection.
const INITIAL_BUF_SIZE: usize = 4096;

const TOO_LARGE: &str = "request entity too large";

/// The HTTP server.
///
/// # Examples
///
/// ```rust,no_run
/// use ai_relay::server::Server;
/// use ai_relay::http::{Request, Response, StatusCode};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let server = Server::bind("127.0.0.1:1337").await?;
///     server.run(|_req: Request| async {
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
    /// Binds the server to the given TCP address.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be bound
    /// (e.g. port already in use, insufficient permissions).
    pub async fn bind(addr: impl AsRef<str>) -> Result<Self, ServerError> {
        let addr = addr.as_ref();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.to_owned(),
                source: e,
            })?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts connections forever, dispatching requests to `handler`.
    pub async fn run<H, F>(self, handler: H) -> Result<(), ServerError>
    where
        H: Fn(Request) -> F + Send + Sync + 'static,
        F: Future<Output = Response> + Send + 'static,
    {
        self.run_until(handler, std::future::pending()).await
    }

    /// Accepts connections until `shutdown` resolves.
    ///
    /// The handler is wrapped in an [`Arc`] and shared across all spawned
    /// connection tasks. Connections already accepted are left to finish on
    /// their own; only the listener stops.
    pub async fn run_until<H, F, S>(self, handler: H, shutdown: S) -> Result<(), ServerError>
    where
        H: Fn(Request) -> F + Send + Sync + 'static,
        F: Future<Output = Response> + Send + 'static,
        S: Future<Output = ()>,
    {
        let handler = Arc::new(handler);
        info!(address = %self.local_addr, "ai-relay listening");

        tokio::pin!(shutdown);
        loop {
            let accepted = tokio::select! {
                () = &mut shutdown => {
                    info!("shutdown requested, no longer accepting connections");
                    break;
                }
                accepted = self.listener.accept() => accepted,
            };

            let (stream, peer_addr) = match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    error!(error = %e, "failed to accept connection");
                    continue;
                }
            };

            debug!(peer = %peer_addr, "connection accepted");
            let handler = Arc::clone(&handler);

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, peer_addr, handler).await {
                    warn!(peer = %peer_addr, error = %e, "connection closed with error");
                }
            });
        }

        Ok(())
    }
}

// Outcome of writing one response.
enum Written {
    Complete,
    PeerGone,
}

/// Handles a single TCP connection over its lifetime.
///
/// Loops one request per iteration until the peer closes the connection or
/// either side signals `Connection: close`.
async fn handle_connection<H, F>(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    handler: Arc<H>,
) -> Result<(), std::io::Error>
where
    H: Fn(Request) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    let mut buf = BytesMut::with_capacity(INITIAL_BUF_SIZE);

    loop {
        // Pipelined bytes may already hold the next request; only read when
        // they don't.
        let parsed = if buf.is_empty() {
            Err(RequestError::Incomplete)
        } else {
            Request::parse(&buf)
        };

        let (request, body_offset) = match parsed {
            Ok(pair) => pair,
            Err(RequestError::Incomplete) => {
                if buf.len() > MAX_REQUEST_SIZE {
                    return reject(&mut stream, peer_addr, StatusCode::PayloadTooLarge, TOO_LARGE)
                        .await;
                }
                if stream.read_buf(&mut buf).await? == 0 {
                    debug!(peer = %peer_addr, "connection closed by peer");
                    return Ok(());
                }
                continue;
            }
            Err(e) => {
                let message = format!("bad request: {e}");
                return reject(&mut stream, peer_addr, StatusCode::BadRequest, &message).await;
            }
        };

        let content_length = match request.content_length() {
            Ok(n) => n,
            Err(e) => {
                let message = format!("bad request: {e}");
                return reject(&mut stream, peer_addr, StatusCode::BadRequest, &message).await;
            }
        };
        let Some(total_needed) = body_offset
            .checked_add(content_length)
            .filter(|&n| n <= MAX_REQUEST_SIZE)
        else {
            return reject(&mut stream, peer_addr, StatusCode::PayloadTooLarge, TOO_LARGE).await;
        };
        if buf.len() < total_needed {
            if stream.read_buf(&mut buf).await? == 0 {
                debug!(peer = %peer_addr, "connection closed mid-body");
                return Ok(());
            }
            continue;
        }

        // Drop the consumed request bytes; anything left is pipelined input.
        let consumed = buf.split_to(total_needed);
        let request = request.with_body(&consumed[body_offset..]);
        let keep_alive = request.is_keep_alive();

        debug!(
            peer = %peer_addr,
            method = %request.method(),
            path = %request.path(),
            "dispatching request"
        );

        let response = handler(request).await;
        let keep_alive = keep_alive && response.is_keep_alive();
        let response = response.keep_alive(keep_alive);

        match write_response(&mut stream, &mut buf, response).await? {
            Written::Complete => {}
            Written::PeerGone => {
                debug!(peer = %peer_addr, "peer went away during streamed response");
                return Ok(());
            }
        }

        if !keep_alive {
            debug!(peer = %peer_addr, "Connection: close, shutting down");
            return Ok(());
        }
    }
}

async fn write_response(
    stream: &mut TcpStream,
    buf: &mut BytesMut,
    response: Response,
) -> Result<Written, std::io::Error> {
    let (head, body) = response.into_wire();
    stream.write_all(&head).await?;
    stream.flush().await?;

    match body {
        None => Ok(Written::Complete),
        Some(rx) => write_chunked(stream, buf, rx).await,
    }
}

/// Forwards every item from `rx` as a chunk, then the terminating chunk.
///
/// Returning early drops `rx`, which closes the channel for the producer.
async fn write_chunked(
    stream: &mut TcpStream,
    buf: &mut BytesMut,
    mut rx: mpsc::Receiver<Bytes>,
) -> Result<Written, std::io::Error> {
    loop {
        tokio::select! {
            item = rx.recv() => match item {
                Some(data) if data.is_empty() => {}
                Some(data) => {
                    if stream.write_all(&encode_chunk(&data)).await.is_err()
                        || stream.flush().await.is_err()
                    {
                        return Ok(Written::PeerGone);
                    }
                }
                None => break,
            },
            read = stream.read_buf(buf) => match read {
                Ok(0) | Err(_) => return Ok(Written::PeerGone),
                // Pipelined input is parsed once this response is done, but
                // only up to the request size limit.
                Ok(_) if buf.len() > MAX_REQUEST_SIZE => {
                    warn!(buffered = buf.len(), "client input exceeded limit during stream");
                    return Ok(Written::PeerGone);
                }
                Ok(_) => {}
            },
        }
    }

    stream.write_all(LAST_CHUNK).await?;
    stream.flush().await?;
    Ok(Written::Complete)
}

async fn reject(
    stream: &mut TcpStream,
    peer_addr: SocketAddr,
    status: StatusCode,
    message: &str,
) -> Result<(), std::io::Error> {
    warn!(peer = %peer_addr, status = status.as_u16(), reason = message, "rejecting request");
    let (head, _) = Response::error(status, message).keep_alive(false).into_wire();
    stream.write_all(&head).await?;
    stream.flush().await
}
