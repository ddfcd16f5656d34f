// src/backend/mod.rs

//! The backend plug-in contract shared by client and server: abstract object
//! and KV storage traits, and the registry that resolves a configured
//! backend name to an implementation.

pub mod kv;
pub mod object;

pub use kv::{KvBackend, KvBatchOp, KvIterator, KvWriteBatch};
pub use object::{ObjectBackend, ObjectRef, ObjectStatus};

use crate::core::JasperError;
use std::sync::Arc;
use tracing::info;

/// The service family a backend implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    Object,
    Kv,
}

/// A loaded backend: either family, behind its trait object.
pub enum Backend {
    Object(Arc<dyn ObjectBackend>),
    Kv(Arc<dyn KvBackend>),
}

impl Backend {
    pub fn into_object(self) -> Result<Arc<dyn ObjectBackend>, JasperError> {
        match self {
            Backend::Object(backend) => Ok(backend),
            Backend::Kv(_) => Err(JasperError::BackendInit(
                "expected an object backend, got a kv backend".to_string(),
            )),
        }
    }

    pub fn into_kv(self) -> Result<Arc<dyn KvBackend>, JasperError> {
        match self {
            Backend::Kv(backend) => Ok(backend),
            Backend::Object(_) => Err(JasperError::BackendInit(
                "expected a kv backend, got an object backend".to_string(),
            )),
        }
    }
}

/// Resolves a backend by name and initializes it with its configured path.
///
/// Object backends: `memory`, `posix`. KV backends: `memory`, `sled`.
/// An unknown name is a configuration error and fatal at init.
pub fn load(name: &str, backend_type: BackendType, path: &str) -> Result<Backend, JasperError> {
    let backend = match (backend_type, name) {
        (BackendType::Object, "memory") => {
            Backend::Object(Arc::new(object::memory::MemoryObjectBackend::new()))
        }
        (BackendType::Object, "posix") => {
            Backend::Object(Arc::new(object::posix::PosixObjectBackend::new(path)?))
        }
        (BackendType::Kv, "memory") => Backend::Kv(Arc::new(kv::memory::MemoryKvBackend::new())),
        (BackendType::Kv, "sled") => Backend::Kv(Arc::new(kv::sled::SledKvBackend::new(path)?)),
        _ => return Err(JasperError::UnknownBackend(name.to_string())),
    };

    info!("Loaded {backend_type:?} backend '{name}' (path '{path}')");
    Ok(backend)
}
