//! Connection Handler Module
//!
//! This module manages individual client connections. Each connection is
//! serviced by its own async task, so one slow client never holds up another.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │              TCP Listener(s) (server::listener)             │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │
//!                        │ accept()
//!                        ▼
//!           ┌────────────────────────┐
//!           │   For each client...   │
//!           └────────────┬───────────┘
//!                        │
//!                        │ spawn task (+ TLS handshake)
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 ConnectionHandler                           │
//! │                                                             │
//! │  ┌────────────┐   ┌────────────┐   ┌────────────────────┐   │
//! │  │ Read bytes │──>│ Decode +   │──>│ Dispatch + execute │   │
//! │  └────────────┘   │ aggregate  │   └─────────┬──────────┘   │
//! │                   └────────────┘             ▼              │
//! │                                    ┌────────────────────┐   │
//! │                                    │ Write JSON response│   │
//! │                                    └────────────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Async I/O**: Tokio, one task per connection
//! - **Keep-alive and pipelining**: requests answered strictly in order
//! - **TLS**: optional, via an injected `tokio_rustls::TlsAcceptor`
//! - **Statistics**: connection, request and byte counters
//!
//! ## Example
//!
//! ```ignore
//! use apiserver::connection::{handle_connection, Pipeline};
//!
//! let pipeline = Pipeline::default();
//!
//! // For each accepted connection...
//! let (stream, addr) = listener.accept().await?;
//! tokio::spawn(handle_connection(stream, addr, None, pipeline.clone()));
//! ```

pub mod handler;

// Re-export commonly used types
pub use handler::{
    handle_connection, ConnectionError, ConnectionHandler, ConnectionStats, Pipeline,
};
