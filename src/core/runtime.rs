// src/core/runtime.rs

//! The runtime: the single initialization point bundling configuration,
//! client-side backends, connection pools and the background worker pool.
//! One `Arc<Runtime>` is threaded into every handle and batch.

use crate::backend::{self, BackendType, KvBackend, ObjectBackend};
use crate::config::Config;
use crate::connection::ConnectionPool;
use crate::core::JasperError;
use crate::core::background::{BackgroundPool, Job};
use crc::{CRC_32_ISCSI, Crc};
use std::sync::Arc;
use tracing::{error, info};

const HASH_ALGO: Crc<u32> = Crc::<u32>::new(&CRC_32_ISCSI);

/// Hashes a name or key for server placement. Stable across runs and
/// processes; handle index derivation is `hash_key(name) % server_count`.
pub fn hash_key(key: &str) -> u32 {
    HASH_ALGO.checksum(key.as_bytes())
}

pub struct Runtime {
    configuration: Arc<Config>,
    object_backend: Option<Arc<dyn ObjectBackend>>,
    kv_backend: Option<Arc<dyn KvBackend>>,
    object_pool: ConnectionPool,
    kv_pool: ConnectionPool,
    background: BackgroundPool,
}

impl Runtime {
    /// Initializes the client stack for `configuration`. Backends whose
    /// component is `client` are loaded in-process; all other operations go
    /// over the wire through the connection pools.
    pub async fn new(configuration: Config) -> Result<Arc<Self>, JasperError> {
        let configuration = Arc::new(configuration);

        let object_backend = if configuration.object.component == "client" {
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

        let kv_backend = if configuration.kv.component == "client" {
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

        let max_connections = configuration.clients.max_connections;
        let object_pool = ConnectionPool::new(configuration.servers.object.clone(), max_connections);
        let kv_pool = ConnectionPool::new(configuration.servers.kv.clone(), max_connections);
        let background = BackgroundPool::new(configuration.clients.background_workers);

        info!(
            "Runtime initialized: {} object server(s), {} kv server(s), {} background worker(s)",
            object_pool.server_count(),
            kv_pool.server_count(),
            background.worker_count()
        );

        Ok(Arc::new(Self {
            configuration,
            object_backend,
            kv_backend,
            object_pool,
            kv_pool,
            background,
        }))
    }

    pub fn configuration(&self) -> &Config {
        &self.configuration
    }

    pub fn object_server_count(&self) -> u32 {
        self.object_pool.server_count()
    }

    pub fn kv_server_count(&self) -> u32 {
        self.kv_pool.server_count()
    }

    pub(crate) fn object_backend(&self) -> Option<&Arc<dyn ObjectBackend>> {
        self.object_backend.as_ref()
    }

    pub(crate) fn kv_backend(&self) -> Option<&Arc<dyn KvBackend>> {
        self.kv_backend.as_ref()
    }

    pub(crate) fn object_pool(&self) -> &ConnectionPool {
        &self.object_pool
    }

    pub(crate) fn kv_pool(&self) -> &ConnectionPool {
        &self.kv_pool
    }

    pub(crate) fn spawn_background(&self, job: Job) {
        self.background.spawn(job);
    }

    /// Tears the runtime down: drains background workers and finalizes the
    /// local backends. The matching call to [`Runtime::new`].
    pub async fn shutdown(&self) {
        self.background.shutdown().await;

        if let Some(backend) = &self.kv_backend {
            if let Err(e) = backend.fini().await {
                error!("Finalizing kv backend failed: {e}");
            }
        }
        if let Some(backend) = &self.object_backend {
            if let Err(e) = backend.fini().await {
                error!("Finalizing object backend failed: {e}");
            }
        }
    }
}
