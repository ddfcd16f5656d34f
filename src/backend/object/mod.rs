// src/backend/object/mod.rs

//! The object backend trait: byte-addressable named blobs grouped by
//! namespace, opened into per-object handles for the duration of a run.

pub mod memory;
pub mod posix;

use crate::core::JasperError;
use async_trait::async_trait;
use std::any::Any;

/// Modification time and size of one stored object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ObjectStatus {
    /// Seconds since the Unix epoch.
    pub modification_time: i64,
    pub size: u64,
}

/// An opaque per-object handle produced by `create`/`open` and consumed by
/// `delete`/`close`. Each backend stores its own state inside.
pub struct ObjectRef {
    inner: Box<dyn Any + Send + Sync>,
}

impl ObjectRef {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            inner: Box::new(value),
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref()
    }

    pub fn into_inner<T: Any>(self) -> Option<T> {
        self.inner.downcast().ok().map(|boxed| *boxed)
    }
}

/// The abstract contract every object storage backend implements.
///
/// `read` and `write` may transfer fewer bytes than requested; the returned
/// count is authoritative. `sync` flushes one object to stable storage and
/// backs the storage safety class.
#[async_trait]
pub trait ObjectBackend: Send + Sync {
    async fn create(&self, namespace: &str, name: &str) -> Result<ObjectRef, JasperError>;

    async fn open(&self, namespace: &str, name: &str) -> Result<ObjectRef, JasperError>;

    async fn delete(&self, object: ObjectRef) -> Result<(), JasperError>;

    async fn close(&self, object: ObjectRef) -> Result<(), JasperError>;

    async fn status(&self, object: &ObjectRef) -> Result<ObjectStatus, JasperError>;

    async fn sync(&self, object: &ObjectRef) -> Result<(), JasperError>;

    async fn read(
        &self,
        object: &ObjectRef,
        buffer: &mut [u8],
        offset: u64,
    ) -> Result<u64, JasperError>;

    async fn write(
        &self,
        object: &ObjectRef,
        buffer: &[u8],
        offset: u64,
    ) -> Result<u64, JasperError>;

    /// Finalizes the backend. Called once at teardown.
    async fn fini(&self) -> Result<(), JasperError>;
}
