// src/client/kv.rs

//! The KV client: namespaced values behind string keys. Put/get/delete are
//! batched like every other operation; iteration bypasses the batch
//! machinery and drives the local backend directly.

use crate::client::send_run;
use crate::core::JasperError;
use crate::core::batch::Batch;
use crate::core::operation::{
    GetTarget, Operation, OperationData, OperationKey, Service, ValueSlot,
};
use crate::core::protocol::{Message, MessageOp};
use crate::core::runtime::{Runtime, hash_key};
use crate::core::semantics::{Safety, Semantics};
use bytes::Bytes;
use std::sync::Arc;
use tracing::warn;

/// A reference-counted descriptor for one KV entry, identified by
/// `(server index, namespace, key)`.
pub struct KvHandle {
    index: u32,
    namespace: String,
    key: String,
}

impl KvHandle {
    /// Creates a handle with the server index derived from the key.
    pub fn new(runtime: &Arc<Runtime>, namespace: &str, key: &str) -> Arc<Self> {
        let index = hash_key(key) % runtime.kv_server_count();
        Self::build(index, namespace, key)
    }

    /// Creates a handle pinned to an explicit server index.
    pub fn new_for_index(
        runtime: &Arc<Runtime>,
        index: u32,
        namespace: &str,
        key: &str,
    ) -> Arc<Self> {
        assert!(
            index < runtime.kv_server_count(),
            "kv server index {index} out of range"
        );
        Self::build(index, namespace, key)
    }

    fn build(index: u32, namespace: &str, key: &str) -> Arc<Self> {
        assert!(!namespace.is_empty() && !namespace.contains('\0'));
        assert!(!key.is_empty() && !key.contains('\0'));
        Arc::new(Self {
            index,
            namespace: namespace.to_string(),
            key: key.to_string(),
        })
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    fn operation_key(&self) -> OperationKey {
        OperationKey {
            service: Service::Kv,
            index: self.index,
            namespace: self.namespace.clone(),
            name: None,
        }
    }

    /// Enqueues a put. Ownership of `value` moves into the operation.
    pub fn put(self: &Arc<Self>, value: Bytes, batch: &mut Batch) {
        batch.add(Operation {
            key: self.operation_key(),
            data: OperationData::KvPut {
                kv: self.clone(),
                value,
            },
        });
    }

    /// Enqueues a delete.
    pub fn delete(self: &Arc<Self>, batch: &mut Batch) {
        batch.add(Operation {
            key: self.operation_key(),
            data: OperationData::KvDelete { kv: self.clone() },
        });
    }

    /// Enqueues a get delivering into `slot`. The slot is cleared now and
    /// holds the value after the batch executes; it stays empty on a miss.
    pub fn get(self: &Arc<Self>, slot: &ValueSlot, batch: &mut Batch) {
        slot.take();
        batch.add(Operation {
            key: self.operation_key(),
            data: OperationData::KvGet {
                kv: self.clone(),
                target: GetTarget::Slot(slot.clone()),
            },
        });
    }

    /// Enqueues a get delivering through `callback`, which observes a
    /// transient view of the value during execution. The callback is not
    /// invoked on a miss.
    pub fn get_with<F>(self: &Arc<Self>, callback: F, batch: &mut Batch)
    where
        F: FnOnce(&[u8]) + Send + Sync + 'static,
    {
        batch.add(Operation {
            key: self.operation_key(),
            data: OperationData::KvGet {
                kv: self.clone(),
                target: GetTarget::Callback(Box::new(callback)),
            },
        });
    }
}

/// Iterates over every value in a namespace. Requires a client-side KV
/// backend; iteration has no wire representation.
pub async fn get_all(
    runtime: &Arc<Runtime>,
    namespace: &str,
) -> Result<crate::backend::KvIterator, JasperError> {
    match runtime.kv_backend() {
        Some(backend) => backend.get_all(namespace).await,
        None => Err(JasperError::InvalidState(
            "kv iteration requires a client-side kv backend".to_string(),
        )),
    }
}

/// Iterates over the values of all keys starting with `prefix`.
pub async fn get_by_prefix(
    runtime: &Arc<Runtime>,
    namespace: &str,
    prefix: &str,
) -> Result<crate::backend::KvIterator, JasperError> {
    match runtime.kv_backend() {
        Some(backend) => backend.get_by_prefix(namespace, prefix).await,
        None => Err(JasperError::InvalidState(
            "kv iteration requires a client-side kv backend".to_string(),
        )),
    }
}

fn deliver(target: GetTarget, value: Bytes) {
    match target {
        GetTarget::Slot(slot) => slot.set(value),
        GetTarget::Callback(callback) => callback(&value),
    }
}

// --- Run execution ---

pub(crate) async fn execute_put(
    runtime: &Arc<Runtime>,
    semantics: &Semantics,
    run: Vec<Operation>,
) -> bool {
    let OperationData::KvPut { kv: first, .. } = &run[0].data else {
        unreachable!()
    };
    let namespace = first.namespace.clone();
    let index = first.index;

    if let Some(backend) = runtime.kv_backend() {
        let mut write_batch = backend.batch_start(&namespace, semantics.effective_safety());
        for operation in &run {
            let OperationData::KvPut { kv, value } = &operation.data else {
                unreachable!()
            };
            write_batch.put(&kv.key, value.clone());
        }
        match backend.batch_execute(write_batch).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Committing put batch in '{namespace}' failed: {e}");
                false
            }
        }
    } else {
        let mut message = Message::new(MessageOp::KvPut);
        message.set_safety(semantics);
        // Force a reply even under unsafe semantics. With fire-and-forget
        // puts, a later operation on another pooled connection can overtake
        // this one and miss the key; the ack closes that window for the
        // common put-then-get sequence.
        message.force_safety(Safety::Network);
        message.append_str(&namespace);
        for operation in &run {
            let OperationData::KvPut { kv, value } = &operation.data else {
                unreachable!()
            };
            message.add_operation();
            message.append_str(&kv.key);
            message.append_u32(value.len() as u32);
            message.append_bytes(value);
        }
        send_run(runtime.kv_pool(), index, &message).await
    }
}

pub(crate) async fn execute_delete(
    runtime: &Arc<Runtime>,
    semantics: &Semantics,
    run: Vec<Operation>,
) -> bool {
    let OperationData::KvDelete { kv: first } = &run[0].data else {
        unreachable!()
    };
    let namespace = first.namespace.clone();
    let index = first.index;

    if let Some(backend) = runtime.kv_backend() {
        let mut write_batch = backend.batch_start(&namespace, semantics.effective_safety());
        for operation in &run {
            let OperationData::KvDelete { kv } = &operation.data else {
                unreachable!()
            };
            write_batch.delete(&kv.key);
        }
        match backend.batch_execute(write_batch).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Committing delete batch in '{namespace}' failed: {e}");
                false
            }
        }
    } else {
        let mut message = Message::new(MessageOp::KvDelete);
        message.set_safety(semantics);
        message.append_str(&namespace);
        for operation in &run {
            let OperationData::KvDelete { kv } = &operation.data else {
                unreachable!()
            };
            message.add_operation();
            message.append_str(&kv.key);
        }
        send_run(runtime.kv_pool(), index, &message).await
    }
}

pub(crate) async fn execute_get(
    runtime: &Arc<Runtime>,
    semantics: &Semantics,
    run: Vec<Operation>,
) -> bool {
    let OperationData::KvGet { kv: first, .. } = &run[0].data else {
        unreachable!()
    };
    let namespace = first.namespace.clone();
    let index = first.index;

    if let Some(backend) = runtime.kv_backend() {
        let mut success = true;
        for operation in run {
            let OperationData::KvGet { kv, target } = operation.data else {
                unreachable!()
            };
            match backend.get(&kv.namespace, &kv.key).await {
                Ok(Some(value)) => deliver(target, value),
                Ok(None) => success = false,
                Err(e) => {
                    warn!("Get of {}/{} failed: {e}", kv.namespace, kv.key);
                    success = false;
                }
            }
        }
        success
    } else {
        let mut message = Message::new(MessageOp::KvGet);
        message.set_safety(semantics);
        // A get needs its reply regardless of the batch safety; see the
        // matching note in `execute_put`.
        message.force_safety(Safety::Network);
        message.append_str(&namespace);
        for operation in &run {
            let OperationData::KvGet { kv, .. } = &operation.data else {
                unreachable!()
            };
            message.add_operation();
            message.append_str(&kv.key);
        }

        let mut connection = match runtime.kv_pool().pop(index).await {
            Ok(connection) => connection,
            Err(e) => {
                warn!("Leasing a connection to kv server {index} failed: {e}");
                return false;
            }
        };

        let mut success = true;
        let result: Result<(), JasperError> = async {
            message.send(&mut connection).await?;

            let mut reply = Message::new_reply(&message);
            let mut operations = run.into_iter();
            let mut operations_done = 0;
            while operations_done < message.count() {
                reply.receive(&mut connection).await?;
                if reply.count() == 0 {
                    return Err(JasperError::Protocol("empty reply frame".to_string()));
                }
                for _ in 0..reply.count() {
                    let operation = operations.next().ok_or_else(|| {
                        JasperError::Protocol("more reply results than operations".to_string())
                    })?;
                    let OperationData::KvGet { target, .. } = operation.data else {
                        unreachable!()
                    };
                    let length = reply.get_u32()?;
                    if length > 0 {
                        let value = reply.get_bytes(length as usize)?;
                        deliver(target, value);
                    } else {
                        // A zero length marks a miss.
                        success = false;
                    }
                }
                operations_done += reply.count();
            }
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                runtime.kv_pool().push(index, connection);
                success
            }
            Err(e) => {
                warn!("Get run against server {index} failed: {e}");
                runtime.kv_pool().discard(index);
                false
            }
        }
    }
}
