// src/core/operation.rs

//! Operation records queued into batches, plus the shared out-parameter
//! types through which results reach the caller after execution.

use crate::client::{KvHandle, ObjectHandle};
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// A shared byte counter written by the engine via atomic add, so results
/// aggregated across partial replies (or concurrent runs) sum correctly.
#[derive(Debug, Clone, Default)]
pub struct ByteCounter {
    count: Arc<AtomicU64>,
}

impl ByteCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, bytes: u64) {
        self.count.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.count.store(0, Ordering::Relaxed);
    }
}

/// A caller-provided buffer an object read fills in during execution.
#[derive(Debug, Clone)]
pub struct SharedBuffer {
    data: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    /// Allocates a zeroed buffer of `length` bytes.
    pub fn new(length: usize) -> Self {
        Self::from_vec(vec![0; length])
    }

    pub fn from_vec(data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(Mutex::new(data)),
        }
    }

    pub fn len(&self) -> usize {
        self.data.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies the buffer contents out.
    pub fn to_vec(&self) -> Vec<u8> {
        self.data.lock().clone()
    }

    pub(crate) fn write_at(&self, offset: usize, data: &[u8]) {
        self.data.lock()[offset..offset + data.len()].copy_from_slice(data);
    }
}

/// A shared slot receiving the value of a KV get; `None` after execution
/// means the key was missing.
#[derive(Debug, Clone, Default)]
pub struct ValueSlot {
    value: Arc<Mutex<Option<Bytes>>>,
}

impl ValueSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<Bytes> {
        self.value.lock().clone()
    }

    pub fn take(&self) -> Option<Bytes> {
        self.value.lock().take()
    }

    pub(crate) fn set(&self, value: Bytes) {
        *self.value.lock() = Some(value);
    }
}

/// Receives an object status after execution.
#[derive(Debug, Clone, Default)]
pub struct ObjectStatusSlot {
    inner: Arc<StatusInner>,
}

#[derive(Debug, Default)]
struct StatusInner {
    modification_time: AtomicI64,
    size: AtomicU64,
}

impl ObjectStatusSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn modification_time(&self) -> i64 {
        self.inner.modification_time.load(Ordering::Relaxed)
    }

    pub fn size(&self) -> u64 {
        self.inner.size.load(Ordering::Relaxed)
    }

    pub(crate) fn set(&self, modification_time: i64, size: u64) {
        self.inner
            .modification_time
            .store(modification_time, Ordering::Relaxed);
        self.inner.size.store(size, Ordering::Relaxed);
    }
}

/// A user callback receiving a transient view of a fetched KV value.
pub type KvGetFn = Box<dyn FnOnce(&[u8]) + Send + Sync>;

/// Where a KV get delivers its value.
pub(crate) enum GetTarget {
    Slot(ValueSlot),
    Callback(KvGetFn),
}

/// The service family an operation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum Service {
    Object,
    Kv,
}

/// The locality tag used for run grouping. Object reads and writes carry the
/// object name as well, since a run shares one opened object.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct OperationKey {
    pub service: Service,
    pub index: u32,
    pub namespace: String,
    pub name: Option<String>,
}

/// Discriminates operations for merging: two operations may share a run only
/// if their kinds (and keys) match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum OperationKind {
    ObjectCreate,
    ObjectDelete,
    ObjectRead,
    ObjectWrite,
    ObjectStatus,
    KvPut,
    KvDelete,
    KvGet,
}

/// Parameters of one queued operation. The variants own everything they
/// need; handles are kept alive by reference counting until execution.
pub(crate) enum OperationData {
    ObjectCreate {
        object: Arc<ObjectHandle>,
    },
    ObjectDelete {
        object: Arc<ObjectHandle>,
    },
    ObjectRead {
        object: Arc<ObjectHandle>,
        buffer: SharedBuffer,
        length: u64,
        offset: u64,
        bytes_read: ByteCounter,
    },
    ObjectWrite {
        object: Arc<ObjectHandle>,
        data: Bytes,
        offset: u64,
        bytes_written: ByteCounter,
    },
    ObjectStatus {
        object: Arc<ObjectHandle>,
        status: ObjectStatusSlot,
    },
    KvPut {
        kv: Arc<KvHandle>,
        value: Bytes,
    },
    KvDelete {
        kv: Arc<KvHandle>,
    },
    KvGet {
        kv: Arc<KvHandle>,
        target: GetTarget,
    },
}

impl OperationData {
    pub(crate) fn kind(&self) -> OperationKind {
        match self {
            Self::ObjectCreate { .. } => OperationKind::ObjectCreate,
            Self::ObjectDelete { .. } => OperationKind::ObjectDelete,
            Self::ObjectRead { .. } => OperationKind::ObjectRead,
            Self::ObjectWrite { .. } => OperationKind::ObjectWrite,
            Self::ObjectStatus { .. } => OperationKind::ObjectStatus,
            Self::KvPut { .. } => OperationKind::KvPut,
            Self::KvDelete { .. } => OperationKind::KvDelete,
            Self::KvGet { .. } => OperationKind::KvGet,
        }
    }
}

/// One queued operation: a locality key plus its parameters. Owned
/// exclusively by the batch holding it until execution.
pub(crate) struct Operation {
    pub key: OperationKey,
    pub data: OperationData,
}
