// src/backend/object/posix.rs

//! The POSIX object backend: one file per `(namespace, name)` below the
//! configured root directory, positioned I/O via `pread`/`pwrite`.

use super::{ObjectBackend, ObjectRef, ObjectStatus};
use crate::core::JasperError;
use async_trait::async_trait;
use std::fs::{self, File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

struct PosixObjectRef {
    file: File,
    path: PathBuf,
}

pub struct PosixObjectBackend {
    root: PathBuf,
}

impl PosixObjectBackend {
    /// Initializes the backend below `path`, creating the directory if
    /// necessary.
    pub fn new(path: &str) -> Result<Self, JasperError> {
        let root = PathBuf::from(path);
        fs::create_dir_all(&root)
            .map_err(|e| JasperError::BackendInit(format!("cannot create '{path}': {e}")))?;
        Ok(Self { root })
    }

    fn object_path(&self, namespace: &str, name: &str) -> PathBuf {
        self.root.join(namespace).join(name)
    }

    fn file_of(object: &ObjectRef) -> Result<&PosixObjectRef, JasperError> {
        object
            .downcast_ref::<PosixObjectRef>()
            .ok_or_else(|| JasperError::Internal("foreign object handle".to_string()))
    }

    fn open_at(path: &Path, create: bool) -> Result<ObjectRef, JasperError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(create)
            .open(path)?;
        Ok(ObjectRef::new(PosixObjectRef {
            file,
            path: path.to_path_buf(),
        }))
    }
}

#[async_trait]
impl ObjectBackend for PosixObjectBackend {
    async fn create(&self, namespace: &str, name: &str) -> Result<ObjectRef, JasperError> {
        let path = self.object_path(namespace, name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Self::open_at(&path, true)
    }

    async fn open(&self, namespace: &str, name: &str) -> Result<ObjectRef, JasperError> {
        let path = self.object_path(namespace, name);
        Self::open_at(&path, false)
    }

    async fn delete(&self, object: ObjectRef) -> Result<(), JasperError> {
        let handle = Self::file_of(&object)?;
        fs::remove_file(&handle.path)?;
        Ok(())
    }

    async fn close(&self, _object: ObjectRef) -> Result<(), JasperError> {
        // Dropping the handle closes the file descriptor.
        Ok(())
    }

    async fn status(&self, object: &ObjectRef) -> Result<ObjectStatus, JasperError> {
        let handle = Self::file_of(object)?;
        let metadata = handle.file.metadata()?;
        let modification_time = metadata
            .modified()?
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        Ok(ObjectStatus {
            modification_time,
            size: metadata.len(),
        })
    }

    async fn sync(&self, object: &ObjectRef) -> Result<(), JasperError> {
        Self::file_of(object)?.file.sync_all()?;
        Ok(())
    }

    async fn read(
        &self,
        object: &ObjectRef,
        buffer: &mut [u8],
        offset: u64,
    ) -> Result<u64, JasperError> {
        let handle = Self::file_of(object)?;
        let mut total = 0usize;
        // pread may return short; a zero read marks end of file.
        while total < buffer.len() {
            let n = handle
                .file
                .read_at(&mut buffer[total..], offset + total as u64)?;
            if n == 0 {
                break;
            }
            total += n;
        }
        Ok(total as u64)
    }

    async fn write(
        &self,
        object: &ObjectRef,
        buffer: &[u8],
        offset: u64,
    ) -> Result<u64, JasperError> {
        let handle = Self::file_of(object)?;
        handle.file.write_all_at(buffer, offset)?;
        Ok(buffer.len() as u64)
    }

    async fn fini(&self) -> Result<(), JasperError> {
        Ok(())
    }
}
