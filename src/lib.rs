//! # apiserver - A Minimal HTTP/1.1 JSON API Server
//!
//! apiserver accepts HTTP/1.1 connections (plaintext and optionally TLS),
//! reassembles each request into a flat field map, routes it by method and
//! path to a small pluggable handler, and answers with a JSON body.
//!
//! ## Features
//!
//! - **Keep-alive and pipelining**: requests on one connection are answered
//!   strictly in order
//! - **Pluggable handlers**: validate + execute lifecycle with in-band result codes
//! - **Form bodies**: urlencoded and multipart attributes land in the context
//! - **TLS**: second listener via rustls, PEM files or a self-signed certificate
//! - **Async I/O**: one Tokio task per connection
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              apiserver                                  │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │  Listeners  │───>│ Connection  │───>│ Aggregator  │                  │
//! │  │ (TCP / TLS) │    │  Pipeline   │    │ + Extractor │                  │
//! │  └─────────────┘    └──────┬──────┘    └──────┬──────┘                  │
//! │                            │                  │ RequestContext          │
//! │                            │                  ▼                         │
//! │  ┌─────────────┐    ┌──────┴──────┐    ┌─────────────┐   ┌──────────┐   │
//! │  │  Response   │<───│  Executor   │<───│ Dispatcher  │──>│ Handler  │   │
//! │  │  Writer     │    │ (validate,  │    │ (route →    │   │ Registry │   │
//! │  │  (JSON)     │    │  execute)   │    │  handler)   │   │ (Arc)    │   │
//! │  └─────────────┘    └─────────────┘    └─────────────┘   └──────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use apiserver::connection::Pipeline;
//! use apiserver::server::{bind, spawn_listener};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let listener = bind("127.0.0.1:8080").await?;
//!     let handles = spawn_listener(listener, None, Pipeline::default(), 1);
//!     for handle in handles {
//!         handle.await?;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Routes
//!
//! | Method | Path prefix | Handler | Needs |
//! |---|---|---|---|
//! | `POST` | `/tokens` | `tokenIssue` | `userNo`, `password` |
//! | `DELETE` | `/tokens` | `tokenExpire` | `token` |
//! | `GET` | `/tokens` | `tokenVerify` | `token` |
//! | any | `/users` | `users` | `email` |
//! | anything else | | `notFound` | |
//!
//! ## Result Codes
//!
//! The HTTP status only says whether the request could be decoded (200, or
//! 400/413 followed by a close). The business outcome travels in the body:
//!
//! - `200`: success
//! - `404`: no route matched
//! - `405`: a required parameter is missing or malformed
//! - `501`: the handler failed
//!
//! ## Module Overview
//!
//! - [`protocol`]: incremental HTTP/1.x decoder and JSON response writer
//! - [`request`]: request aggregation and field extraction
//! - [`routing`]: route resolution and handler construction
//! - [`handlers`]: handler traits, registry, lifecycle executor, built-in APIs
//! - [`connection`]: per-connection pipeline
//! - [`server`]: listeners, accept tasks and TLS
//! - [`config`]: CLI / environment configuration

pub mod config;
pub mod connection;
pub mod handlers;
pub mod protocol;
pub mod request;
pub mod routing;
pub mod server;

// Re-export commonly used types for convenience
pub use config::{Config, ConfigError};
pub use connection::{handle_connection, ConnectionStats, Pipeline};
pub use handlers::{execute, ApiResult, HandlerId, HandlerRegistry};
pub use protocol::{HttpResponse, ParseError, RequestDecoder};
pub use request::{RequestAggregator, RequestContext};
pub use routing::Dispatcher;

/// The default plaintext port
pub const DEFAULT_PORT: u16 = 8080;

/// The default host to bind to
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Version of apiserver
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
