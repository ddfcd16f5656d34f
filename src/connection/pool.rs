// src/connection/pool.rs

//! A bounded LIFO cache of live server connections, one stack per server
//! index. Leasing never hands the same connection to two operation runs: a
//! popped connection is owned by the caller until pushed back or discarded.

use crate::core::JasperError;
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

struct PoolSlot {
    /// Idle, live connections. The last pushed is the first popped.
    idle: Mutex<Vec<TcpStream>>,
    /// Counts the connections this slot may still create or hand out;
    /// exhausting it blocks `pop` until a lease is returned.
    permits: Semaphore,
}

/// A thread-safe pool of connections to one fleet of servers (object or KV),
/// indexed by server position in the configuration.
pub struct ConnectionPool {
    servers: Vec<String>,
    slots: Vec<PoolSlot>,
}

impl ConnectionPool {
    /// Creates a pool over `servers` with at most `max_connections` live
    /// connections per server.
    pub fn new(servers: Vec<String>, max_connections: usize) -> Self {
        assert!(!servers.is_empty());
        assert!(max_connections > 0);

        let slots = servers
            .iter()
            .map(|_| PoolSlot {
                idle: Mutex::new(Vec::new()),
                permits: Semaphore::new(max_connections),
            })
            .collect();

        Self { servers, slots }
    }

    pub fn server_count(&self) -> u32 {
        self.servers.len() as u32
    }

    /// Leases a connection to server `index`, opening a new one if no idle
    /// connection is available. Blocks once `max_connections` leases are out
    /// until one is returned.
    pub async fn pop(&self, index: u32) -> Result<TcpStream, JasperError> {
        let slot = &self.slots[index as usize];

        // The semaphore is never closed, so acquire can only succeed.
        let permit = slot
            .permits
            .acquire()
            .await
            .expect("connection pool semaphore closed");
        permit.forget();

        if let Some(connection) = slot.idle.lock().pop() {
            return Ok(connection);
        }

        let address = &self.servers[index as usize];
        debug!("Opening new connection to {address}");
        match TcpStream::connect(address.as_str()).await {
            Ok(connection) => {
                connection.set_nodelay(true)?;
                Ok(connection)
            }
            Err(e) => {
                slot.permits.add_permits(1);
                warn!("Failed to connect to {address}: {e}");
                Err(e.into())
            }
        }
    }

    /// Returns a leased connection. A connection that is no longer live is
    /// dropped instead of being cached.
    pub fn push(&self, index: u32, connection: TcpStream) {
        let slot = &self.slots[index as usize];
        if connection.peer_addr().is_ok() {
            slot.idle.lock().push(connection);
        }
        slot.permits.add_permits(1);
    }

    /// Releases the lease for a connection that was dropped after an I/O or
    /// protocol error.
    pub fn discard(&self, index: u32) {
        self.slots[index as usize].permits.add_permits(1);
    }
}
