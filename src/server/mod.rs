// src/server/mod.rs

//! The server daemon: a TCP listener hosting the configured object and KV
//! backends and serving the wire protocol.

mod connection_loop;
mod dispatch;

use crate::backend::{self, BackendType, KvBackend, ObjectBackend};
use crate::config::Config;
use crate::core::JasperError;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// A bound server, ready to accept connections.
pub struct Server {
    listener: TcpListener,
    object_backend: Option<Arc<dyn ObjectBackend>>,
    kv_backend: Option<Arc<dyn KvBackend>>,
}

impl Server {
    /// Loads the server-side backends named in `configuration` and binds the
    /// listener to `address`. A service whose component is not `server` is
    /// not hosted here; its operations fail with empty results.
    pub async fn bind(configuration: &Config, address: &str) -> Result<Self, JasperError> {
        let object_backend = if configuration.object.component == "server" {
            Some(
                backend::load(
                    &configuration.object.backend,
                    BackendType::Object,
                    &configuration.object.path,
                )?
                .into_object()?,
            )
        } else {
            None
        };

        let kv_backend = if configuration.kv.component == "server" {
            Some(
                backend::load(
                    &configuration.kv.backend,
                    BackendType::Kv,
                    &configuration.kv.path,
                )?
                .into_kv()?,
            )
        } else {
            None
        };

        let listener = TcpListener::bind(address).await?;
        info!("Listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            object_backend,
            kv_backend,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, JasperError> {
        Ok(self.listener.local_addr()?)
    }

    /// Runs the accept loop until a shutdown signal arrives, then drains the
    /// connection handlers and finalizes the backends.
    pub async fn run(self) -> Result<(), JasperError> {
        connection_loop::run(self).await
    }
}
