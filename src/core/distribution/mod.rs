// src/core/distribution/mod.rs

//! The distribution layer: splits a logical `(length, offset)` byte range
//! into per-server chunks according to a striping strategy.
//!
//! A distribution is configured, then driven through `reset` / `distribute`
//! cycles: each `distribute` call emits one chunk until the window is
//! exhausted. The configuration (never the cursor state) serializes into a
//! self-describing document so an object's layout can be persisted.

mod round_robin;
mod single_server;
mod weighted;

pub use round_robin::RoundRobin;
pub use single_server::SingleServer;
pub use weighted::Weighted;

use crate::core::JasperError;
use serde_json::Value;

/// The stripe size cap: no block exceeds 4 MiB.
pub const STRIPE_SIZE: u64 = 4 * 1024 * 1024;

/// Integer type tags used in serialized documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistributionType {
    RoundRobin = 0,
    SingleServer = 1,
    Weighted = 2,
}

/// One server-local byte range emitted by a distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    /// The server responsible for this range.
    pub index: u32,
    /// Bytes in this range.
    pub length: u64,
    /// The offset within the server-local object.
    pub offset: u64,
    /// The global block number, usable as a lock tag.
    pub block_id: u64,
}

/// A striping strategy over a fixed server count.
#[derive(Debug, Clone)]
pub enum Distribution {
    RoundRobin(RoundRobin),
    SingleServer(SingleServer),
    Weighted(Weighted),
}

impl Distribution {
    /// Creates a distribution of the given type for `server_count` servers.
    pub fn new(distribution_type: DistributionType, server_count: u32) -> Self {
        assert!(server_count > 0);
        match distribution_type {
            DistributionType::RoundRobin => Self::RoundRobin(RoundRobin::new(server_count)),
            DistributionType::SingleServer => Self::SingleServer(SingleServer::new(server_count)),
            DistributionType::Weighted => Self::Weighted(Weighted::new(server_count)),
        }
    }

    /// Sets a configuration value. Recognized keys: `block-size` (capped at
    /// [`STRIPE_SIZE`]), `start-index` (round-robin), `index`
    /// (single-server). Unknown keys are ignored.
    pub fn set(&mut self, key: &str, value: u64) {
        match self {
            Self::RoundRobin(d) => d.set(key, value),
            Self::SingleServer(d) => d.set(key, value),
            Self::Weighted(d) => d.set(key, value),
        }
    }

    /// Assigns a striping weight to one server (weighted distribution only).
    pub fn set_weight(&mut self, index: u32, weight: u64) {
        if let Self::Weighted(d) = self {
            d.set_weight(index, weight);
        }
    }

    /// Begins a new distribution cycle over `length` bytes at `offset`.
    pub fn reset(&mut self, length: u64, offset: u64) {
        match self {
            Self::RoundRobin(d) => d.reset(length, offset),
            Self::SingleServer(d) => d.reset(length, offset),
            Self::Weighted(d) => d.reset(length, offset),
        }
    }

    /// Emits the next chunk, or `None` once the window is exhausted.
    pub fn distribute(&mut self) -> Option<Chunk> {
        match self {
            Self::RoundRobin(d) => d.distribute(),
            Self::SingleServer(d) => d.distribute(),
            Self::Weighted(d) => d.distribute(),
        }
    }

    /// Serializes the configuration into a self-describing document with an
    /// integer `type` tag.
    pub fn serialize(&self) -> Value {
        match self {
            Self::RoundRobin(d) => d.serialize(),
            Self::SingleServer(d) => d.serialize(),
            Self::Weighted(d) => d.serialize(),
        }
    }

    /// Reconstructs a distribution from a serialized document.
    pub fn deserialize(server_count: u32, document: &Value) -> Result<Self, JasperError> {
        assert!(server_count > 0);
        let type_tag = document
            .get("type")
            .and_then(Value::as_i64)
            .ok_or_else(|| JasperError::Protocol("distribution document lacks a type".into()))?;

        match type_tag {
            0 => Ok(Self::RoundRobin(RoundRobin::deserialize(
                server_count,
                document,
            )?)),
            1 => Ok(Self::SingleServer(SingleServer::deserialize(
                server_count,
                document,
            )?)),
            2 => Ok(Self::Weighted(Weighted::deserialize(
                server_count,
                document,
            )?)),
            other => Err(JasperError::Protocol(format!(
                "unknown distribution type {other}"
            ))),
        }
    }
}

pub(crate) fn document_u64(document: &Value, key: &str) -> Result<u64, JasperError> {
    document
        .get(key)
        .and_then(Value::as_u64)
        .ok_or_else(|| JasperError::Protocol(format!("distribution document lacks '{key}'")))
}
