// src/core/distribution/single_server.rs

//! Single-server placement: the whole range lands on one configured server.

use super::{Chunk, STRIPE_SIZE, document_u64};
use crate::core::JasperError;
use serde_json::{Value, json};

#[derive(Debug, Clone)]
pub struct SingleServer {
    server_count: u32,
    block_size: u64,
    index: u32,
    length: u64,
    offset: u64,
}

impl SingleServer {
    pub fn new(server_count: u32) -> Self {
        Self {
            server_count,
            block_size: STRIPE_SIZE,
            index: 0,
            length: 0,
            offset: 0,
        }
    }

    pub fn set(&mut self, key: &str, value: u64) {
        match key {
            "block-size" => {
                assert!(value > 0);
                self.block_size = value.min(STRIPE_SIZE);
            }
            "index" => {
                assert!(value < u64::from(self.server_count));
                self.index = value as u32;
            }
            _ => {}
        }
    }

    pub fn reset(&mut self, length: u64, offset: u64) {
        self.length = length;
        self.offset = offset;
    }

    pub fn distribute(&mut self) -> Option<Chunk> {
        if self.length == 0 {
            return None;
        }

        let chunk = Chunk {
            index: self.index,
            length: self.length,
            offset: self.offset,
            block_id: self.offset / self.block_size,
        };

        self.offset += self.length;
        self.length = 0;

        Some(chunk)
    }

    pub fn serialize(&self) -> Value {
        json!({
            "type": 1,
            "block-size": self.block_size,
            "index": u64::from(self.index),
        })
    }

    pub fn deserialize(server_count: u32, document: &Value) -> Result<Self, JasperError> {
        let mut distribution = Self::new(server_count);
        distribution.set("block-size", document_u64(document, "block-size")?);
        distribution.set("index", document_u64(document, "index")?);
        Ok(distribution)
    }
}
