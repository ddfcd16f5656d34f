// src/backend/object/memory.rs

//! An in-process object backend keeping every object in a map. Used as the
//! client-side local backend and as the test workhorse.

use super::{ObjectBackend, ObjectRef, ObjectStatus};
use crate::core::JasperError;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

struct StoredObject {
    data: Vec<u8>,
    modification_time: i64,
}

/// The handle variant this backend hands out: the map key.
struct MemoryObjectRef {
    namespace: String,
    name: String,
}

#[derive(Default)]
pub struct MemoryObjectBackend {
    objects: RwLock<HashMap<(String, String), StoredObject>>,
}

impl MemoryObjectBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn make_ref(namespace: &str, name: &str) -> ObjectRef {
        ObjectRef::new(MemoryObjectRef {
            namespace: namespace.to_string(),
            name: name.to_string(),
        })
    }

    fn key_of(object: &ObjectRef) -> Result<(String, String), JasperError> {
        let handle = object
            .downcast_ref::<MemoryObjectRef>()
            .ok_or_else(|| JasperError::Internal("foreign object handle".to_string()))?;
        Ok((handle.namespace.clone(), handle.name.clone()))
    }
}

#[async_trait]
impl ObjectBackend for MemoryObjectBackend {
    async fn create(&self, namespace: &str, name: &str) -> Result<ObjectRef, JasperError> {
        let mut objects = self.objects.write();
        objects
            .entry((namespace.to_string(), name.to_string()))
            .or_insert_with(|| StoredObject {
                data: Vec::new(),
                modification_time: now_secs(),
            });
        Ok(Self::make_ref(namespace, name))
    }

    async fn open(&self, namespace: &str, name: &str) -> Result<ObjectRef, JasperError> {
        let objects = self.objects.read();
        if !objects.contains_key(&(namespace.to_string(), name.to_string())) {
            return Err(JasperError::NotFound(format!("{namespace}/{name}")));
        }
        Ok(Self::make_ref(namespace, name))
    }

    async fn delete(&self, object: ObjectRef) -> Result<(), JasperError> {
        let key = Self::key_of(&object)?;
        let mut objects = self.objects.write();
        objects
            .remove(&key)
            .map(|_| ())
            .ok_or_else(|| JasperError::NotFound(format!("{}/{}", key.0, key.1)))
    }

    async fn close(&self, _object: ObjectRef) -> Result<(), JasperError> {
        Ok(())
    }

    async fn status(&self, object: &ObjectRef) -> Result<ObjectStatus, JasperError> {
        let key = Self::key_of(object)?;
        let objects = self.objects.read();
        let stored = objects
            .get(&key)
            .ok_or_else(|| JasperError::NotFound(format!("{}/{}", key.0, key.1)))?;
        Ok(ObjectStatus {
            modification_time: stored.modification_time,
            size: stored.data.len() as u64,
        })
    }

    async fn sync(&self, _object: &ObjectRef) -> Result<(), JasperError> {
        Ok(())
    }

    async fn read(
        &self,
        object: &ObjectRef,
        buffer: &mut [u8],
        offset: u64,
    ) -> Result<u64, JasperError> {
        let key = Self::key_of(object)?;
        let objects = self.objects.read();
        let stored = objects
            .get(&key)
            .ok_or_else(|| JasperError::NotFound(format!("{}/{}", key.0, key.1)))?;

        let offset = offset as usize;
        if offset >= stored.data.len() {
            return Ok(0);
        }
        let n = buffer.len().min(stored.data.len() - offset);
        buffer[..n].copy_from_slice(&stored.data[offset..offset + n]);
        Ok(n as u64)
    }

    async fn write(
        &self,
        object: &ObjectRef,
        buffer: &[u8],
        offset: u64,
    ) -> Result<u64, JasperError> {
        let key = Self::key_of(object)?;
        let mut objects = self.objects.write();
        let stored = objects
            .get_mut(&key)
            .ok_or_else(|| JasperError::NotFound(format!("{}/{}", key.0, key.1)))?;

        let offset = offset as usize;
        let end = offset + buffer.len();
        if stored.data.len() < end {
            stored.data.resize(end, 0);
        }
        stored.data[offset..end].copy_from_slice(buffer);
        stored.modification_time = now_secs();
        Ok(buffer.len() as u64)
    }

    async fn fini(&self) -> Result<(), JasperError> {
        Ok(())
    }
}
