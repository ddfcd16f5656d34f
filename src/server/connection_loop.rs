// src/server/connection_loop.rs

//! Contains the main server loop for accepting connections and handling
//! graceful shutdown.

use super::Server;
use super::dispatch::ConnectionHandler;
use crate::core::JasperError;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Completes once the process is asked to stop: SIGINT or SIGTERM on Unix,
/// Ctrl+C elsewhere.
async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm =
            signal(SignalKind::terminate()).expect("cannot install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("SIGINT received, shutting down."),
            _ = sigterm.recv() => info!("SIGTERM received, shutting down."),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .expect("cannot install Ctrl+C handler");
        info!("Ctrl+C received, shutting down.");
    }
}

/// The accept loop: one handler task per connection, reaped as they finish.
pub(crate) async fn run(server: Server) -> Result<(), JasperError> {
    let Server {
        listener,
        object_backend,
        kv_backend,
    } = server;

    let mut client_tasks = JoinSet::new();

    loop {
        tokio::select! {
            biased; // Prioritize shutdown signals over new connections.

            _ = await_shutdown_signal() => {
                break;
            },

            res = listener.accept() => {
                match res {
                    Ok((stream, addr)) => {
                        debug!("Accepted connection from {addr}");
                        let handler = ConnectionHandler::new(
                            stream,
                            addr,
                            object_backend.clone(),
                            kv_backend.clone(),
                        );
                        client_tasks.spawn(async move {
                            if let Err(e) = handler.run().await {
                                warn!("Connection from {addr} terminated unexpectedly: {e}");
                            }
                        });
                    }
                    Err(e) => error!("Failed to accept connection: {e}"),
                }
            },

            // Reap completed connection handlers.
            Some(res) = client_tasks.join_next() => {
                if let Err(e) = res {
                    if e.is_panic() {
                        error!("A connection handler panicked: {e:?}");
                    }
                }
            },
        }
    }

    // --- Graceful Shutdown Sequence ---
    info!("Shutting down, draining connection handlers.");
    if tokio::time::timeout(Duration::from_secs(10), async {
        while client_tasks.join_next().await.is_some() {}
    })
    .await
    .is_err()
    {
        warn!("Timed out waiting for connection handlers, aborting the rest.");
        client_tasks.shutdown().await;
    }

    if let Some(backend) = &kv_backend {
        if let Err(e) = backend.fini().await {
            error!("Finalizing kv backend failed: {e}");
        }
    }
    if let Some(backend) = &object_backend {
        if let Err(e) = backend.fini().await {
            error!("Finalizing object backend failed: {e}");
        }
    }

    info!("Server shutdown complete.");
    Ok(())
}
