// src/backend/kv/mod.rs

//! The KV backend trait: namespaced values behind string keys, written
//! through atomic write-batches and scanned through lazy iterators.
//!
//! Keys are namespaced in storage as `"<ns>:<key>\0"`; prefix scans operate
//! on the encoded form and stop at the first key outside the prefix.

pub mod memory;
pub mod sled;

use crate::core::JasperError;
use crate::core::semantics::Safety;
use async_trait::async_trait;
use bytes::Bytes;

/// A lazy stream of values. Dropping it mid-stream releases the underlying
/// backend cursor.
pub type KvIterator = Box<dyn Iterator<Item = Bytes> + Send>;

/// One mutation queued in a write-batch.
#[derive(Debug, Clone)]
pub enum KvBatchOp {
    Put { key: String, value: Bytes },
    Delete { key: String },
}

/// A write-batch scoped to one namespace and safety class. Mutations
/// accumulate here and are committed atomically by
/// [`KvBackend::batch_execute`].
#[derive(Debug)]
pub struct KvWriteBatch {
    namespace: String,
    safety: Safety,
    operations: Vec<KvBatchOp>,
}

impl KvWriteBatch {
    pub fn new(namespace: &str, safety: Safety) -> Self {
        Self {
            namespace: namespace.to_string(),
            safety,
            operations: Vec::new(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn safety(&self) -> Safety {
        self.safety
    }

    pub fn put(&mut self, key: &str, value: Bytes) {
        self.operations.push(KvBatchOp::Put {
            key: key.to_string(),
            value,
        });
    }

    pub fn delete(&mut self, key: &str) {
        self.operations.push(KvBatchOp::Delete {
            key: key.to_string(),
        });
    }

    pub fn operations(&self) -> &[KvBatchOp] {
        &self.operations
    }
}

/// Encodes a key for storage: `"<ns>:<key>\0"`.
pub fn encode_key(namespace: &str, key: &str) -> Vec<u8> {
    let mut encoded = Vec::with_capacity(namespace.len() + key.len() + 2);
    encoded.extend_from_slice(namespace.as_bytes());
    encoded.push(b':');
    encoded.extend_from_slice(key.as_bytes());
    encoded.push(0);
    encoded
}

/// Encodes a scan prefix: `"<ns>:<prefix>"`, without the terminator so that
/// all keys continuing the prefix match.
pub fn encode_prefix(namespace: &str, prefix: &str) -> Vec<u8> {
    let mut encoded = Vec::with_capacity(namespace.len() + prefix.len() + 1);
    encoded.extend_from_slice(namespace.as_bytes());
    encoded.push(b':');
    encoded.extend_from_slice(prefix.as_bytes());
    encoded
}

/// The abstract contract every KV storage backend implements.
#[async_trait]
pub trait KvBackend: Send + Sync {
    /// Opens a write-batch scoped to a namespace and safety class.
    fn batch_start(&self, namespace: &str, safety: Safety) -> KvWriteBatch {
        KvWriteBatch::new(namespace, safety)
    }

    /// Commits a write-batch atomically. With storage safety the commit is
    /// durable before this returns.
    async fn batch_execute(&self, batch: KvWriteBatch) -> Result<(), JasperError>;

    async fn get(&self, namespace: &str, key: &str) -> Result<Option<Bytes>, JasperError>;

    /// Iterates over every value in a namespace.
    async fn get_all(&self, namespace: &str) -> Result<KvIterator, JasperError>;

    /// Iterates over the values of all keys starting with `prefix`.
    async fn get_by_prefix(&self, namespace: &str, prefix: &str)
    -> Result<KvIterator, JasperError>;

    /// Finalizes the backend. Called once at teardown.
    async fn fini(&self) -> Result<(), JasperError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_encoding_is_namespaced_and_terminated() {
        assert_eq!(encode_key("ns", "a"), b"ns:a\0");
        assert_eq!(encode_prefix("ns", "a"), b"ns:a");
        assert_eq!(encode_prefix("ns", ""), b"ns:");
    }

    #[test]
    fn write_batch_accumulates_in_order() {
        let mut batch = KvWriteBatch::new("ns", Safety::Network);
        batch.put("a", Bytes::from_static(b"1"));
        batch.delete("b");
        assert_eq!(batch.namespace(), "ns");
        assert_eq!(batch.operations().len(), 2);
        assert!(matches!(&batch.operations()[1], KvBatchOp::Delete { key } if key == "b"));
    }
}
