//! Listener binding and accept loops.

use crate::connection::{handle_connection, Pipeline};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;
use tracing::{error, info, trace};

/// Pause after a failed accept, so descriptor exhaustion does not spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Binds a TCP listener on `addr`.
pub async fn bind(addr: &str) -> std::io::Result<TcpListener> {
    let listener = TcpListener::bind(addr).await?;
    info!(address = %listener.local_addr()?, "Listener bound");
    Ok(listener)
}

/// Starts `acceptors` accept tasks sharing one listener.
///
/// Every accepted connection is spawned as its own task on the current
/// runtime; with `tls` set the handshake runs inside that task, never on the
/// accept path.
pub fn spawn_listener(
    listener: TcpListener,
    tls: Option<TlsAcceptor>,
    pipeline: Pipeline,
    acceptors: usize,
) -> Vec<JoinHandle<()>> {
    let listener = Arc::new(listener);
    (0..acceptors.max(1))
        .map(|acceptor| {
            tokio::spawn(accept_loop(
                Arc::clone(&listener),
                tls.clone(),
                pipeline.clone(),
                acceptor,
            ))
        })
        .collect()
}

/// Accepts connections until the task is dropped.
async fn accept_loop(
    listener: Arc<TcpListener>,
    tls: Option<TlsAcceptor>,
    pipeline: Pipeline,
    acceptor: usize,
) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                trace!(client = %addr, acceptor, "Accepted connection");
                if let Err(e) = stream.set_nodelay(true) {
                    trace!(client = %addr, error = %e, "Failed to set TCP_NODELAY");
                }
                tokio::spawn(handle_connection(
                    stream,
                    addr,
                    tls.clone(),
                    pipeline.clone(),
                ));
            }
            Err(e) => {
                error!(acceptor, error = %e, "Failed to accept connection");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }
}
