// src/client/object.rs

//! The object client: byte-addressable named blobs. Every call enqueues an
//! operation onto the caller's batch; results land in the shared
//! out-parameters once the batch executes.

use crate::client::send_run;
use crate::core::JasperError;
use crate::core::batch::Batch;
use crate::core::operation::{
    ByteCounter, ObjectStatusSlot, Operation, OperationData, OperationKey, Service, SharedBuffer,
};
use crate::core::protocol::{Message, MessageOp};
use crate::core::runtime::{Runtime, hash_key};
use crate::core::semantics::{Safety, Semantics};
use bytes::Bytes;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::warn;

/// A reference-counted descriptor for one named object, identified by
/// `(server index, namespace, name)`. The index is derived once at creation
/// from a stable hash of the name.
pub struct ObjectHandle {
    index: u32,
    namespace: String,
    name: String,
}

impl ObjectHandle {
    /// Creates a handle with the server index derived from the name.
    pub fn new(runtime: &Arc<Runtime>, namespace: &str, name: &str) -> Arc<Self> {
        let index = hash_key(name) % runtime.object_server_count();
        Self::build(index, namespace, name)
    }

    /// Creates a handle pinned to an explicit server index.
    pub fn new_for_index(
        runtime: &Arc<Runtime>,
        index: u32,
        namespace: &str,
        name: &str,
    ) -> Arc<Self> {
        assert!(
            index < runtime.object_server_count(),
            "object server index {index} out of range"
        );
        Self::build(index, namespace, name)
    }

    fn build(index: u32, namespace: &str, name: &str) -> Arc<Self> {
        assert!(!namespace.is_empty() && !namespace.contains('\0'));
        assert!(!name.is_empty() && !name.contains('\0'));
        Arc::new(Self {
            index,
            namespace: namespace.to_string(),
            name: name.to_string(),
        })
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The locality key for metadata operations: runs group per
    /// `(server, namespace)`.
    fn namespace_key(&self) -> OperationKey {
        OperationKey {
            service: Service::Object,
            index: self.index,
            namespace: self.namespace.clone(),
            name: None,
        }
    }

    /// The locality key for data operations: reads and writes share one
    /// opened object per run, so the name participates.
    fn io_key(&self) -> OperationKey {
        OperationKey {
            service: Service::Object,
            index: self.index,
            namespace: self.namespace.clone(),
            name: Some(self.name.clone()),
        }
    }

    /// Enqueues creation of this object.
    pub fn create(self: &Arc<Self>, batch: &mut Batch) {
        batch.add(Operation {
            key: self.namespace_key(),
            data: OperationData::ObjectCreate {
                object: self.clone(),
            },
        });
    }

    /// Enqueues deletion of this object.
    pub fn delete(self: &Arc<Self>, batch: &mut Batch) {
        batch.add(Operation {
            key: self.namespace_key(),
            data: OperationData::ObjectDelete {
                object: self.clone(),
            },
        });
    }

    /// Enqueues a status query; `status` is filled once the batch executes.
    pub fn status(self: &Arc<Self>, status: &ObjectStatusSlot, batch: &mut Batch) {
        batch.add(Operation {
            key: self.namespace_key(),
            data: OperationData::ObjectStatus {
                object: self.clone(),
                status: status.clone(),
            },
        });
    }

    /// Enqueues a read of `length` bytes at `offset` into `buffer`.
    ///
    /// `bytes_read` is reset now and updated (possibly partially) when the
    /// batch executes, via atomic add so aggregation across split replies
    /// sums correctly.
    pub fn read(
        self: &Arc<Self>,
        buffer: &SharedBuffer,
        length: u64,
        offset: u64,
        bytes_read: &ByteCounter,
        batch: &mut Batch,
    ) {
        assert!(length > 0, "zero-length read");
        assert!(buffer.len() as u64 >= length, "read buffer too small");
        bytes_read.reset();

        batch.add(Operation {
            key: self.io_key(),
            data: OperationData::ObjectRead {
                object: self.clone(),
                buffer: buffer.clone(),
                length,
                offset,
                bytes_read: bytes_read.clone(),
            },
        });
    }

    /// Enqueues a write of `data` at `offset`.
    ///
    /// Under fire-and-forget safety the full length is credited to
    /// `bytes_written` during packing, since no reply will carry the real
    /// count.
    pub fn write(
        self: &Arc<Self>,
        data: Bytes,
        offset: u64,
        bytes_written: &ByteCounter,
        batch: &mut Batch,
    ) {
        assert!(!data.is_empty(), "zero-length write");
        bytes_written.reset();

        batch.add(Operation {
            key: self.io_key(),
            data: OperationData::ObjectWrite {
                object: self.clone(),
                data,
                offset,
                bytes_written: bytes_written.clone(),
            },
        });
    }
}

// --- Run execution ---

pub(crate) async fn execute_create(
    runtime: &Arc<Runtime>,
    semantics: &Semantics,
    run: Vec<Operation>,
) -> bool {
    let OperationData::ObjectCreate { object: first } = &run[0].data else {
        unreachable!()
    };
    let namespace = first.namespace.clone();
    let index = first.index;

    if let Some(backend) = runtime.object_backend() {
        let mut success = true;
        for operation in &run {
            let OperationData::ObjectCreate { object } = &operation.data else {
                unreachable!()
            };
            let result: Result<(), JasperError> = async {
                let handle = backend.create(&object.namespace, &object.name).await?;
                backend.close(handle).await
            }
            .await;
            if let Err(e) = result {
                warn!("Creating {}/{} failed: {e}", object.namespace, object.name);
                success = false;
            }
        }
        success
    } else {
        let mut message = Message::new(MessageOp::ObjectCreate);
        message.set_safety(semantics);
        message.append_str(&namespace);
        for operation in &run {
            let OperationData::ObjectCreate { object } = &operation.data else {
                unreachable!()
            };
            message.add_operation();
            message.append_str(&object.name);
        }
        send_run(runtime.object_pool(), index, &message).await
    }
}

pub(crate) async fn execute_delete(
    runtime: &Arc<Runtime>,
    semantics: &Semantics,
    run: Vec<Operation>,
) -> bool {
    let OperationData::ObjectDelete { object: first } = &run[0].data else {
        unreachable!()
    };
    let namespace = first.namespace.clone();
    let index = first.index;

    if let Some(backend) = runtime.object_backend() {
        let mut success = true;
        for operation in &run {
            let OperationData::ObjectDelete { object } = &operation.data else {
                unreachable!()
            };
            let result: Result<(), JasperError> = async {
                let handle = backend.open(&object.namespace, &object.name).await?;
                backend.delete(handle).await
            }
            .await;
            if let Err(e) = result {
                warn!("Deleting {}/{} failed: {e}", object.namespace, object.name);
                success = false;
            }
        }
        success
    } else {
        let mut message = Message::new(MessageOp::ObjectDelete);
        message.set_safety(semantics);
        message.append_str(&namespace);
        for operation in &run {
            let OperationData::ObjectDelete { object } = &operation.data else {
                unreachable!()
            };
            message.add_operation();
            message.append_str(&object.name);
        }
        send_run(runtime.object_pool(), index, &message).await
    }
}

pub(crate) async fn execute_status(
    runtime: &Arc<Runtime>,
    semantics: &Semantics,
    run: Vec<Operation>,
) -> bool {
    let OperationData::ObjectStatus { object: first, .. } = &run[0].data else {
        unreachable!()
    };
    let namespace = first.namespace.clone();
    let index = first.index;

    if let Some(backend) = runtime.object_backend() {
        let mut success = true;
        for operation in &run {
            let OperationData::ObjectStatus { object, status } = &operation.data else {
                unreachable!()
            };
            let result: Result<(), JasperError> = async {
                let handle = backend.open(&object.namespace, &object.name).await?;
                let stat = backend.status(&handle).await?;
                backend.close(handle).await?;
                status.set(stat.modification_time, stat.size);
                Ok(())
            }
            .await;
            if let Err(e) = result {
                warn!("Status of {}/{} failed: {e}", object.namespace, object.name);
                success = false;
            }
        }
        success
    } else {
        let mut message = Message::new(MessageOp::ObjectStatus);
        message.set_safety(semantics);
        message.append_str(&namespace);
        for operation in &run {
            let OperationData::ObjectStatus { object, .. } = &operation.data else {
                unreachable!()
            };
            message.add_operation();
            message.append_str(&object.name);
        }

        let mut connection = match runtime.object_pool().pop(index).await {
            Ok(connection) => connection,
            Err(e) => {
                warn!("Leasing a connection to object server {index} failed: {e}");
                return false;
            }
        };

        let result: Result<(), JasperError> = async {
            message.send(&mut connection).await?;

            let mut reply = Message::new_reply(&message);
            let mut operations = run.iter();
            let mut operations_done = 0;
            // The server may split its results over several reply frames.
            while operations_done < message.count() {
                reply.receive(&mut connection).await?;
                if reply.count() == 0 {
                    return Err(JasperError::Protocol("empty reply frame".to_string()));
                }
                for _ in 0..reply.count() {
                    let operation = operations.next().ok_or_else(|| {
                        JasperError::Protocol("more reply results than operations".to_string())
                    })?;
                    let OperationData::ObjectStatus { status, .. } = &operation.data else {
                        unreachable!()
                    };
                    let modification_time = reply.get_i64()?;
                    let size = reply.get_u64()?;
                    status.set(modification_time, size);
                }
                operations_done += reply.count();
            }
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                runtime.object_pool().push(index, connection);
                true
            }
            Err(e) => {
                warn!("Status run against server {index} failed: {e}");
                runtime.object_pool().discard(index);
                false
            }
        }
    }
}

pub(crate) async fn execute_read(
    runtime: &Arc<Runtime>,
    semantics: &Semantics,
    run: Vec<Operation>,
) -> bool {
    let OperationData::ObjectRead { object: first, .. } = &run[0].data else {
        unreachable!()
    };
    let object = first.clone();

    if let Some(backend) = runtime.object_backend() {
        // One open per run; every read in the run shares the handle.
        let handle = match backend.open(&object.namespace, &object.name).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!("Opening {}/{} failed: {e}", object.namespace, object.name);
                return false;
            }
        };

        let mut success = true;
        for operation in &run {
            let OperationData::ObjectRead {
                buffer,
                length,
                offset,
                bytes_read,
                ..
            } = &operation.data
            else {
                unreachable!()
            };
            let mut data = vec![0u8; *length as usize];
            match backend.read(&handle, &mut data, *offset).await {
                Ok(n) => {
                    bytes_read.add(n);
                    buffer.write_at(0, &data[..n as usize]);
                }
                Err(e) => {
                    warn!("Reading {}/{} failed: {e}", object.namespace, object.name);
                    success = false;
                }
            }
        }

        if let Err(e) = backend.close(handle).await {
            warn!("Closing {}/{} failed: {e}", object.namespace, object.name);
            success = false;
        }
        success
    } else {
        let mut message = Message::new(MessageOp::ObjectRead);
        message.set_safety(semantics);
        message.append_str(&object.namespace);
        message.append_str(&object.name);
        for operation in &run {
            let OperationData::ObjectRead { length, offset, .. } = &operation.data else {
                unreachable!()
            };
            message.add_operation();
            message.append_u64(*length);
            message.append_u64(*offset);
        }

        let mut connection = match runtime.object_pool().pop(object.index).await {
            Ok(connection) => connection,
            Err(e) => {
                warn!("Leasing a connection to object server {} failed: {e}", object.index);
                return false;
            }
        };

        let result: Result<(), JasperError> = async {
            message.send(&mut connection).await?;

            let mut reply = Message::new_reply(&message);
            let mut operations = run.iter();
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
                    let OperationData::ObjectRead {
                        buffer, bytes_read, ..
                    } = &operation.data
                    else {
                        unreachable!()
                    };
                    let nbytes = reply.get_u64()?;
                    bytes_read.add(nbytes);
                    if nbytes > 0 {
                        // The data follows the reply payload as bulk.
                        let mut data = vec![0u8; nbytes as usize];
                        connection.read_exact(&mut data).await?;
                        buffer.write_at(0, &data);
                    }
                }
                operations_done += reply.count();
            }
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                runtime.object_pool().push(object.index, connection);
                true
            }
            Err(e) => {
                warn!("Read run against server {} failed: {e}", object.index);
                runtime.object_pool().discard(object.index);
                false
            }
        }
    }
}

pub(crate) async fn execute_write(
    runtime: &Arc<Runtime>,
    semantics: &Semantics,
    run: Vec<Operation>,
) -> bool {
    let OperationData::ObjectWrite { object: first, .. } = &run[0].data else {
        unreachable!()
    };
    let object = first.clone();
    let safety = semantics.effective_safety();

    if let Some(backend) = runtime.object_backend() {
        let handle = match backend.open(&object.namespace, &object.name).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!("Opening {}/{} failed: {e}", object.namespace, object.name);
                return false;
            }
        };

        let mut success = true;
        for operation in &run {
            let OperationData::ObjectWrite {
                data,
                offset,
                bytes_written,
                ..
            } = &operation.data
            else {
                unreachable!()
            };
            match backend.write(&handle, data, *offset).await {
                Ok(n) => bytes_written.add(n),
                Err(e) => {
                    warn!("Writing {}/{} failed: {e}", object.namespace, object.name);
                    success = false;
                }
            }
        }

        if safety == Safety::Storage {
            if let Err(e) = backend.sync(&handle).await {
                warn!("Syncing {}/{} failed: {e}", object.namespace, object.name);
                success = false;
            }
        }
        if let Err(e) = backend.close(handle).await {
            warn!("Closing {}/{} failed: {e}", object.namespace, object.name);
            success = false;
        }
        success
    } else {
        let mut message = Message::new(MessageOp::ObjectWrite);
        message.set_safety(semantics);
        message.append_str(&object.namespace);
        message.append_str(&object.name);
        for operation in &run {
            let OperationData::ObjectWrite {
                data,
                offset,
                bytes_written,
                ..
            } = &operation.data
            else {
                unreachable!()
            };
            message.add_operation();
            message.append_u64(data.len() as u64);
            message.append_u64(*offset);
            message.append_bulk(data.clone());

            // Fire-and-forget: no reply will carry the real count, so the
            // requested length is credited immediately.
            if safety == Safety::None {
                bytes_written.add(data.len() as u64);
            }
        }

        let mut connection = match runtime.object_pool().pop(object.index).await {
            Ok(connection) => connection,
            Err(e) => {
                warn!("Leasing a connection to object server {} failed: {e}", object.index);
                return false;
            }
        };

        let result: Result<(), JasperError> = async {
            message.send(&mut connection).await?;

            if message.wants_reply() {
                let mut reply = Message::new_reply(&message);
                let mut operations = run.iter();
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
                        let OperationData::ObjectWrite { bytes_written, .. } = &operation.data
                        else {
                            unreachable!()
                        };
                        bytes_written.add(reply.get_u64()?);
                    }
                    operations_done += reply.count();
                }
            }
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                runtime.object_pool().push(object.index, connection);
                true
            }
            Err(e) => {
                warn!("Write run against server {} failed: {e}", object.index);
                runtime.object_pool().discard(object.index);
                false
            }
        }
    }
}
