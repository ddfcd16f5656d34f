// src/core/distribution/round_robin.rs

//! Round-robin striping: fixed-size blocks assigned to servers in cyclic
//! order starting at a configurable index.

use super::{Chunk, STRIPE_SIZE, document_u64};
use crate::core::JasperError;
use serde_json::{Value, json};

#[derive(Debug, Clone)]
pub struct RoundRobin {
    server_count: u32,
    block_size: u64,
    start_index: u64,
    length: u64,
    offset: u64,
}

impl RoundRobin {
    pub fn new(server_count: u32) -> Self {
        Self {
            server_count,
            block_size: STRIPE_SIZE,
            start_index: 0,
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
            "start-index" => {
                assert!(value < u64::from(self.server_count));
                self.start_index = value;
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

        let block = self.offset / self.block_size;
        let displacement = self.offset % self.block_size;
        let round = block / u64::from(self.server_count);

        let index = ((self.start_index + block) % u64::from(self.server_count)) as u32;
        let length = self.length.min(self.block_size - displacement);
        let offset = round * self.block_size + displacement;

        self.length -= length;
        self.offset += length;

        Some(Chunk {
            index,
            length,
            offset,
            block_id: block,
        })
    }

    pub fn serialize(&self) -> Value {
        json!({
            "type": 0,
            "block-size": self.block_size,
            "start-index": self.start_index,
        })
    }

    pub fn deserialize(server_count: u32, document: &Value) -> Result<Self, JasperError> {
        let mut distribution = Self::new(server_count);
        distribution.set("block-size", document_u64(document, "block-size")?);
        distribution.set("start-index", document_u64(document, "start-index")?);
        Ok(distribution)
    }
}
