// src/backend/kv/sled.rs

//! The sled KV backend: an embedded log-structured store. Write-batches map
//! onto sled's atomic batches; storage safety forces a flush to disk before
//! the commit is acknowledged.

use super::{KvBackend, KvBatchOp, KvIterator, KvWriteBatch, encode_key, encode_prefix};
use crate::core::JasperError;
use crate::core::semantics::Safety;
use async_trait::async_trait;
use bytes::Bytes;

pub struct SledKvBackend {
    db: ::sled::Db,
}

impl SledKvBackend {
    /// Opens (creating if missing) the store at `path`.
    pub fn new(path: &str) -> Result<Self, JasperError> {
        let db = ::sled::open(path)
            .map_err(|e| JasperError::BackendInit(format!("cannot open sled at '{path}': {e}")))?;
        Ok(Self { db })
    }
}

#[async_trait]
impl KvBackend for SledKvBackend {
    async fn batch_execute(&self, batch: KvWriteBatch) -> Result<(), JasperError> {
        let mut sled_batch = ::sled::Batch::default();
        for operation in batch.operations() {
            match operation {
                KvBatchOp::Put { key, value } => {
                    sled_batch.insert(encode_key(batch.namespace(), key), value.as_ref());
                }
                KvBatchOp::Delete { key } => {
                    sled_batch.remove(encode_key(batch.namespace(), key));
                }
            }
        }
        self.db.apply_batch(sled_batch)?;

        if batch.safety() == Safety::Storage {
            self.db.flush_async().await?;
        }
        Ok(())
    }

    async fn get(&self, namespace: &str, key: &str) -> Result<Option<Bytes>, JasperError> {
        let value = self.db.get(encode_key(namespace, key))?;
        Ok(value.map(|ivec| Bytes::copy_from_slice(&ivec)))
    }

    async fn get_all(&self, namespace: &str) -> Result<KvIterator, JasperError> {
        let iter = self.db.scan_prefix(encode_prefix(namespace, ""));
        Ok(Box::new(iter.filter_map(|entry| {
            entry.ok().map(|(_, value)| Bytes::copy_from_slice(&value))
        })))
    }

    async fn get_by_prefix(
        &self,
        namespace: &str,
        prefix: &str,
    ) -> Result<KvIterator, JasperError> {
        let iter = self.db.scan_prefix(encode_prefix(namespace, prefix));
        Ok(Box::new(iter.filter_map(|entry| {
            entry.ok().map(|(_, value)| Bytes::copy_from_slice(&value))
        })))
    }

    async fn fini(&self) -> Result<(), JasperError> {
        self.db.flush_async().await?;
        Ok(())
    }
}
