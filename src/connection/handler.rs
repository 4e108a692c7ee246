//! Connection Pipeline
//!
//! This module services one client connection from accept to close. Each
//! connection gets its own task running a read / decode / respond loop.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. Client connects (TCP handshake, optional TLS handshake)
//!        │
//!        ▼
//! 2. ConnectionHandler spawned
//!        │
//!        ▼
//! 3. ┌──────────────────────────────────┐
//!    │      Main Loop                   │
//!    │                                  │
//!    │  ┌─────────────────────────────┐ │
//!    │  │ Read bytes from socket      │ │
//!    │  └──────────────┬──────────────┘ │
//!    │                 ▼                │
//!    │  ┌─────────────────────────────┐ │
//!    │  │ Decode parts, aggregate     │ │
//!    │  └──────────────┬──────────────┘ │
//!    │                 ▼                │
//!    │  ┌─────────────────────────────┐ │
//!    │  │ Dispatch, execute handler   │ │
//!    │  └──────────────┬──────────────┘ │
//!    │                 ▼                │
//!    │  ┌─────────────────────────────┐ │
//!    │  │ Write JSON response         │ │
//!    │  └──────────────┬──────────────┘ │
//!    │                 ▼                │
//!    │    [Loop back if keep-alive]     │
//!    └──────────────────────────────────┘
//!        │
//!        ▼
//! 4. Close: no keep-alive, decode failure, client gone
//! ```
//!
//! ## Buffer Management
//!
//! Incoming bytes accumulate in a `BytesMut`. TCP is a stream protocol, so
//! one read may hold half a request head or several pipelined requests.
//! Parts are decoded until the buffer runs dry, and only then is the socket
//! read again. Requests are therefore answered strictly in arrival order.

use crate::handlers::execute;
use crate::protocol::{
    continue_response, BodyFraming, HttpPart, HttpResponse, ParseError, RequestDecoder,
    ResponseError, StatusCode,
};
use crate::request::{AggregateError, AggregatorConfig, CompleteRequest, RequestAggregator};
use crate::routing::Dispatcher;
use bytes::BytesMut;
use std::any::Any;
use std::net::SocketAddr;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, trace, warn};

/// Maximum size for the read buffer (64 KB)
const MAX_BUFFER_SIZE: usize = 64 * 1024;

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total requests answered by a handler
    pub requests_processed: AtomicU64,
    /// Requests rejected because they could not be decoded
    pub decode_failures: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn request_processed(&self) {
        self.requests_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decode_failed(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written.fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Everything a connection needs from the server, cloned into each task.
///
/// Holds only shared, read-only state: the dispatcher (and through it the
/// handler registry), aggregation limits and the statistics counters.
#[derive(Debug, Clone)]
pub struct Pipeline {
    dispatcher: Dispatcher,
    aggregator: AggregatorConfig,
    compression: bool,
    stats: Arc<ConnectionStats>,
}

impl Pipeline {
    pub fn new(dispatcher: Dispatcher, aggregator: AggregatorConfig) -> Self {
        Self {
            dispatcher,
            aggregator,
            compression: true,
            stats: Arc::new(ConnectionStats::new()),
        }
    }

    /// Enables or disables gzip responses for clients that accept them.
    pub fn with_compression(mut self, enabled: bool) -> Self {
        self.compression = enabled;
        self
    }

    pub fn with_stats(mut self, stats: Arc<ConnectionStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn stats(&self) -> &Arc<ConnectionStats> {
        &self.stats
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(Dispatcher::default(), AggregatorConfig::default())
    }
}

/// Handles a single client connection.
///
/// Generic over the byte stream so the same loop serves plain TCP and TLS.
pub struct ConnectionHandler<S> {
    /// The stream for this connection
    stream: BufWriter<S>,

    /// Client's address (for logging)
    addr: SocketAddr,

    /// Buffer for incoming data
    buffer: BytesMut,

    decoder: RequestDecoder,

    aggregator: RequestAggregator,

    pipeline: Pipeline,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new connection handler.
    ///
    /// # Arguments
    ///
    /// * `stream` - The (possibly TLS-wrapped) stream for this connection
    /// * `addr` - The client's socket address
    /// * `pipeline` - Shared dispatch state and statistics
    pub fn new(stream: S, addr: SocketAddr, pipeline: Pipeline) -> Self {
        pipeline.stats.connection_opened();

        Self {
            stream: BufWriter::new(stream),
            addr,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            decoder: RequestDecoder::new(),
            aggregator: RequestAggregator::new(pipeline.aggregator.clone()),
            pipeline,
        }
    }

    /// Runs the connection until it closes.
    ///
    /// Returns `Ok(())` when the server closed the connection after a
    /// non-keep-alive response.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        debug!(client = %self.addr, "Client connected");

        let result = self.main_loop().await;

        match &result {
            Ok(()) => debug!(client = %self.addr, "Connection closed"),
            Err(e) => match e {
                ConnectionError::ClientDisconnected => {
                    debug!(client = %self.addr, "Client disconnected")
                }
                ConnectionError::IoError(io_err)
                    if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
                {
                    debug!(client = %self.addr, "Connection reset by client")
                }
                _ => warn!(client = %self.addr, error = %e, "Connection error"),
            },
        }

        // Anything still aggregating is dropped with the connection.
        self.aggregator.reset();
        self.pipeline.stats.connection_closed();
        result
    }

    /// The read / decode / respond loop.
    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            while let Some(part) = self.next_part().await? {
                if let Some(request) = self.aggregate(part).await? {
                    if !self.respond(request).await? {
                        return Ok(());
                    }
                }
            }

            self.read_more_data().await?;
        }
    }

    /// Decodes the next part from the buffer, rejecting malformed input.
    async fn next_part(&mut self) -> Result<Option<HttpPart>, ConnectionError> {
        match self.decoder.decode(&mut self.buffer) {
            Ok(part) => {
                trace!(
                    client = %self.addr,
                    decoded = part.is_some(),
                    remaining = self.buffer.len(),
                    "Decode step"
                );
                Ok(part)
            }
            Err(e) => {
                warn!(client = %self.addr, error = %e, "Malformed request");
                self.reject(StatusCode::BadRequest, &e.to_string()).await?;
                Err(ConnectionError::Parse(e))
            }
        }
    }

    /// Feeds one part to the aggregator.
    async fn aggregate(
        &mut self,
        part: HttpPart,
    ) -> Result<Option<CompleteRequest>, ConnectionError> {
        // Only answer 100-continue if the client is actually holding its body back.
        let wants_continue = matches!(
            &part,
            HttpPart::Head(head) if head.expects_continue() && declares_body(head.framing)
        ) && self.buffer.is_empty();

        match self.aggregator.push(part) {
            Ok(complete) => {
                if wants_continue {
                    let interim = continue_response();
                    self.stream.write_all(&interim).await?;
                    self.stream.flush().await?;
                    self.pipeline.stats.bytes_written(interim.len());
                    trace!(client = %self.addr, "Sent 100 Continue");
                }
                Ok(complete)
            }
            Err(e) => {
                let status = match e {
                    AggregateError::TooLarge { .. } => StatusCode::PayloadTooLarge,
                    _ => StatusCode::BadRequest,
                };
                warn!(client = %self.addr, error = %e, status = %status, "Request rejected");
                self.reject(status, &e.to_string()).await?;
                Err(ConnectionError::Aggregate(e))
            }
        }
    }

    /// Dispatches a complete request, writes its response, and reports
    /// whether the connection stays open.
    async fn respond(&mut self, request: CompleteRequest) -> Result<bool, ConnectionError> {
        let started = Instant::now();
        let CompleteRequest {
            context,
            keep_alive,
            accepts_gzip,
        } = request;

        let dispatcher = &self.pipeline.dispatcher;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let instance = dispatcher.dispatch(context);
            let handler = instance.id();
            (handler, execute(instance))
        }));
        let (handler, result) = match outcome {
            Ok(outcome) => outcome,
            Err(payload) => {
                error!(
                    client = %self.addr,
                    panic = %panic_message(payload.as_ref()),
                    "Handler panicked, closing connection"
                );
                return Err(ConnectionError::HandlerPanicked);
            }
        };
        self.pipeline.stats.request_processed();

        let mut response = HttpResponse::json(StatusCode::Ok, &result, keep_alive)?;
        if accepts_gzip && self.pipeline.compression {
            response = response.compressed()?;
        }
        self.send_response(&response).await?;

        info!(
            client = %self.addr,
            handler = %handler,
            result_code = result.result_code().unwrap_or("-"),
            keep_alive,
            elapsed_us = started.elapsed().as_micros() as u64,
            "Request completed"
        );

        if !keep_alive {
            self.stream.shutdown().await?;
        }
        Ok(keep_alive)
    }

    /// Answers an undecodable request with a client error and closes.
    async fn reject(&mut self, status: StatusCode, reason: &str) -> Result<(), ConnectionError> {
        self.pipeline.stats.decode_failed();
        self.aggregator.reset();
        self.decoder.reset();
        self.buffer.clear();

        let response = HttpResponse::decode_failure(status, reason)?;
        self.send_response(&response).await?;
        self.stream.shutdown().await?;
        Ok(())
    }

    /// Reads more data from the socket into the buffer.
    async fn read_more_data(&mut self) -> Result<(), ConnectionError> {
        // Check buffer size limit
        if self.buffer.len() >= MAX_BUFFER_SIZE {
            error!(
                client = %self.addr,
                size = self.buffer.len(),
                "Buffer size limit exceeded"
            );
            return Err(ConnectionError::BufferFull);
        }

        // Ensure we have some capacity
        if self.buffer.capacity() - self.buffer.len() < 1024 {
            self.buffer.reserve(INITIAL_BUFFER_SIZE);
        }

        let n = self.stream.get_mut().read_buf(&mut self.buffer).await?;

        if n == 0 {
            if self.buffer.is_empty() && self.decoder.is_idle() && !self.aggregator.in_progress()
            {
                return Err(ConnectionError::ClientDisconnected);
            }
            // Partial request in flight
            return Err(ConnectionError::UnexpectedEof);
        }

        self.pipeline.stats.bytes_read(n);
        trace!(client = %self.addr, bytes = n, "Read data");

        Ok(())
    }

    /// Sends a response to the client.
    async fn send_response(&mut self, response: &HttpResponse) -> Result<(), ConnectionError> {
        let bytes = response.serialize();
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        self.pipeline.stats.bytes_written(bytes.len());
        trace!(
            client = %self.addr,
            status = %response.status(),
            bytes = bytes.len(),
            "Sent response"
        );
        Ok(())
    }
}

/// Errors that can occur while handling a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// TLS handshake failed
    #[error("TLS handshake failed: {0}")]
    Tls(#[source] std::io::Error),

    /// Malformed request framing
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Request could not be aggregated (too large, bad form body)
    #[error("Aggregation error: {0}")]
    Aggregate(#[from] AggregateError),

    /// Response could not be built
    #[error("Response error: {0}")]
    Response(#[from] ResponseError),

    /// A handler panicked; no response was written
    #[error("Handler panicked")]
    HandlerPanicked,

    /// Client disconnected normally
    #[error("Client disconnected")]
    ClientDisconnected,

    /// Unexpected end of stream (partial request)
    #[error("Unexpected end of stream")]
    UnexpectedEof,

    /// Buffer size limit exceeded
    #[error("Buffer size limit exceeded")]
    BufferFull,
}

/// Handles a client connection.
///
/// Performs the TLS handshake first when an acceptor is given, then runs a
/// [`ConnectionHandler`] to completion.
///
/// # Arguments
///
/// * `stream` - The accepted TCP stream
/// * `addr` - The client's socket address
/// * `tls` - TLS acceptor for this listener, `None` for plaintext
/// * `pipeline` - Shared dispatch state and statistics
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    tls: Option<TlsAcceptor>,
    pipeline: Pipeline,
) {
    let result = match tls {
        Some(acceptor) => match acceptor.accept(stream).await {
            Ok(stream) => ConnectionHandler::new(stream, addr, pipeline).run().await,
            Err(e) => Err(ConnectionError::Tls(e)),
        },
        None => ConnectionHandler::new(stream, addr, pipeline).run().await,
    };

    if let Err(e) = result {
        match e {
            ConnectionError::ClientDisconnected => {}
            ConnectionError::IoError(ref io_err)
                if io_err.kind() == std::io::ErrorKind::ConnectionReset => {}
            ConnectionError::Tls(_) => {
                warn!(client = %addr, error = %e, "Dropping connection");
            }
            _ => {
                debug!(client = %addr, error = %e, "Connection ended with error");
            }
        }
    }
}

/// Text of a `panic!` payload, when it carries one.
fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

/// Whether a head announces body bytes still to come.
fn declares_body(framing: BodyFraming) -> bool {
    match framing {
        BodyFraming::Empty | BodyFraming::Length(0) => false,
        BodyFraming::Length(_) | BodyFraming::Chunked => true,
    }
}
