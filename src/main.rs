//! apiserver - A Minimal HTTP/1.1 JSON API Server
//!
//! This is the main entry point for the server.
//! It builds the runtime, binds the listeners and waits for Ctrl+C.

use anyhow::Context;
use apiserver::config::Config;
use apiserver::connection::Pipeline;
use apiserver::handlers::HandlerRegistry;
use apiserver::routing::Dispatcher;
use apiserver::server::{bind, load_tls_acceptor, self_signed_acceptor, spawn_listener};
use clap::Parser;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::signal;
use tokio_rustls::TlsAcceptor;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn print_banner(config: &Config) {
    println!(
        r#"
apiserver v{} - Minimal HTTP/1.1 JSON API Server
──────────────────────────────────────────────────────────────
HTTP  on {}
HTTPS on {}
Acceptors per listener: {}

Use Ctrl+C to shutdown gracefully.
"#,
        apiserver::VERSION,
        config.address(),
        config.tls_address().as_deref().unwrap_or("(disabled)"),
        config.acceptors,
    );
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    config.validate()?;

    init_tracing(&config.log_level);

    let mut runtime = tokio::runtime::Builder::new_multi_thread();
    runtime.enable_all();
    if let Some(workers) = config.workers {
        runtime.worker_threads(workers);
    }
    let runtime = runtime.build().context("building Tokio runtime")?;

    runtime.block_on(serve(config))
}

/// Builds the acceptor for the TLS listener.
fn tls_acceptor(config: &Config) -> anyhow::Result<TlsAcceptor> {
    match (&config.tls_cert, &config.tls_key) {
        (Some(cert), Some(key)) => load_tls_acceptor(cert, key),
        _ => {
            let mut names = vec!["localhost".to_string()];
            if config.host != "localhost" {
                names.push(config.host.clone());
            }
            self_signed_acceptor(&names)
        }
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    print_banner(&config);

    // Read-only after this point; every connection shares it
    let registry = Arc::new(HandlerRegistry::with_defaults());
    info!(handlers = registry.len(), "Handler registry initialized");

    let pipeline = Pipeline::new(Dispatcher::new(registry), config.aggregator_config())
        .with_compression(!config.disable_compression);

    let address = config.address();
    let listener = bind(&address)
        .await
        .with_context(|| format!("binding {}", address))?;
    let mut handles = spawn_listener(listener, None, pipeline.clone(), config.acceptors);

    if let Some(tls_address) = config.tls_address() {
        let acceptor = tls_acceptor(&config)?;
        let listener = bind(&tls_address)
            .await
            .with_context(|| format!("binding {}", tls_address))?;
        handles.extend(spawn_listener(
            listener,
            Some(acceptor),
            pipeline.clone(),
            config.acceptors,
        ));
    }
    info!(accept_tasks = handles.len(), "Ready to accept connections");

    signal::ctrl_c()
        .await
        .context("installing Ctrl+C handler")?;
    info!("Shutdown signal received, stopping server...");

    for handle in &handles {
        handle.abort();
    }

    let stats = pipeline.stats();
    info!(
        connections = stats.connections_accepted.load(Ordering::Relaxed),
        requests = stats.requests_processed.load(Ordering::Relaxed),
        decode_failures = stats.decode_failures.load(Ordering::Relaxed),
        "Server shutdown complete"
    );
    Ok(())
}
