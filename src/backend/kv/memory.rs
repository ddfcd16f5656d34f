// src/backend/kv/memory.rs

//! An in-process KV backend over an ordered map. The ordering makes prefix
//! scans a range walk, mirroring what the on-disk backends do.

use super::{KvBackend, KvBatchOp, KvIterator, KvWriteBatch, encode_key, encode_prefix};
use crate::core::JasperError;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::BTreeMap;

#[derive(Default)]
pub struct MemoryKvBackend {
    entries: RwLock<BTreeMap<Vec<u8>, Bytes>>,
}

impl MemoryKvBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn scan(&self, encoded_prefix: Vec<u8>) -> KvIterator {
        let entries = self.entries.read();
        // Snapshot the matching values; the map lock cannot be held across
        // the iterator's lifetime.
        let values: Vec<Bytes> = entries
            .range(encoded_prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&encoded_prefix))
            .map(|(_, value)| value.clone())
            .collect();
        Box::new(values.into_iter())
    }
}

#[async_trait]
impl KvBackend for MemoryKvBackend {
    async fn batch_execute(&self, batch: KvWriteBatch) -> Result<(), JasperError> {
        let mut entries = self.entries.write();
        for operation in batch.operations() {
            match operation {
                KvBatchOp::Put { key, value } => {
                    entries.insert(encode_key(batch.namespace(), key), value.clone());
                }
                KvBatchOp::Delete { key } => {
                    entries.remove(&encode_key(batch.namespace(), key));
                }
            }
        }
        Ok(())
    }

    async fn get(&self, namespace: &str, key: &str) -> Result<Option<Bytes>, JasperError> {
        let entries = self.entries.read();
        Ok(entries.get(&encode_key(namespace, key)).cloned())
    }

    async fn get_all(&self, namespace: &str) -> Result<KvIterator, JasperError> {
        Ok(self.scan(encode_prefix(namespace, "")))
    }

    async fn get_by_prefix(
        &self,
        namespace: &str,
        prefix: &str,
    ) -> Result<KvIterator, JasperError> {
        Ok(self.scan(encode_prefix(namespace, prefix)))
    }

    async fn fini(&self) -> Result<(), JasperError> {
        Ok(())
    }
}
