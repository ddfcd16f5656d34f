// src/connection/mod.rs

//! Client-side transport: the per-server pools of multiplexed connections
//! leased to operation runs.

mod pool;

pub use pool::ConnectionPool;
