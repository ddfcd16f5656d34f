// src/core/distribution/weighted.rs

//! Weighted striping: the round-robin cycle visits each server `weight`
//! blocks in a row; servers with weight zero are skipped entirely.

use super::{Chunk, STRIPE_SIZE, document_u64};
use crate::core::JasperError;
use serde_json::{Value, json};

#[derive(Debug, Clone)]
pub struct Weighted {
    server_count: u32,
    block_size: u64,
    weights: Vec<u64>,
    length: u64,
    offset: u64,
}

impl Weighted {
    pub fn new(server_count: u32) -> Self {
        Self {
            server_count,
            block_size: STRIPE_SIZE,
            weights: vec![0; server_count as usize],
            length: 0,
            offset: 0,
        }
    }

    pub fn set(&mut self, key: &str, value: u64) {
        if key == "block-size" {
            assert!(value > 0);
            self.block_size = value.min(STRIPE_SIZE);
        }
    }

    pub fn set_weight(&mut self, index: u32, weight: u64) {
        assert!(index < self.server_count);
        self.weights[index as usize] = weight;
    }

    pub fn reset(&mut self, length: u64, offset: u64) {
        self.length = length;
        self.offset = offset;
    }

    pub fn distribute(&mut self) -> Option<Chunk> {
        if self.length == 0 {
            return None;
        }

        let total_weight: u64 = self.weights.iter().sum();
        assert!(total_weight > 0, "weighted distribution without weights");

        let block = self.offset / self.block_size;
        let displacement = self.offset % self.block_size;
        let round = block / total_weight;
        let position = block % total_weight;

        // Walk the cycle to the server owning this position.
        let mut cumulative = 0u64;
        let mut index = 0u32;
        let mut weight = 0u64;
        for (i, &w) in self.weights.iter().enumerate() {
            if position < cumulative + w {
                index = i as u32;
                weight = w;
                break;
            }
            cumulative += w;
        }

        let blocks_on_server = round * weight + (position - cumulative);
        let length = self.length.min(self.block_size - displacement);
        let offset = blocks_on_server * self.block_size + displacement;

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
            "type": 2,
            "block-size": self.block_size,
            "weights": self.weights,
        })
    }

    pub fn deserialize(server_count: u32, document: &Value) -> Result<Self, JasperError> {
        let mut distribution = Self::new(server_count);
        distribution.set("block-size", document_u64(document, "block-size")?);

        let weights = document
            .get("weights")
            .and_then(Value::as_array)
            .ok_or_else(|| JasperError::Protocol("distribution document lacks 'weights'".into()))?;
        for (index, weight) in weights.iter().enumerate() {
            let weight = weight.as_u64().ok_or_else(|| {
                JasperError::Protocol("distribution weight is not an integer".into())
            })?;
            if index < server_count as usize {
                distribution.set_weight(index as u32, weight);
            }
        }
        Ok(distribution)
    }
}
