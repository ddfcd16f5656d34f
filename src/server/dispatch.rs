// src/server/dispatch.rs

//! Per-connection request handling: decode one frame, drive the backend,
//! encode replies when the request's safety demands them.
//!
//! Each request is treated as an implicit `batch_start … batch_execute`
//! cycle for KV and as an `open … close` cycle for object data operations.

use crate::backend::{KvBackend, ObjectBackend};
use crate::core::JasperError;
use crate::core::protocol::{Message, MessageOp};
use crate::core::semantics::Safety;
use bytes::Bytes;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tracing::{debug, warn};

/// Read-type replies are flushed every this many operations, so backend I/O
/// pipelines with the network instead of buffering a whole request's worth.
const REPLY_CHUNK: u32 = 16;

/// Upper bound on a single operation's data.
const MAX_OPERATION_SIZE: u64 = 512 * 1024 * 1024;

pub(crate) struct ConnectionHandler {
    stream: TcpStream,
    peer: SocketAddr,
    object_backend: Option<Arc<dyn ObjectBackend>>,
    kv_backend: Option<Arc<dyn KvBackend>>,
}

impl ConnectionHandler {
    pub(crate) fn new(
        stream: TcpStream,
        peer: SocketAddr,
        object_backend: Option<Arc<dyn ObjectBackend>>,
        kv_backend: Option<Arc<dyn KvBackend>>,
    ) -> Self {
        Self {
            stream,
            peer,
            object_backend,
            kv_backend,
        }
    }

    /// Serves frames until the peer disconnects or a protocol error makes
    /// the stream unusable.
    pub(crate) async fn run(mut self) -> Result<(), JasperError> {
        let mut request = Message::new(MessageOp::None);
        loop {
            match request.receive(&mut self.stream).await {
                Ok(()) => {}
                Err(JasperError::Io(e)) if e.kind() == ErrorKind::UnexpectedEof => {
                    debug!("Connection from {} closed", self.peer);
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
            self.dispatch(&mut request).await?;
        }
    }

    async fn dispatch(&mut self, request: &mut Message) -> Result<(), JasperError> {
        match request.op() {
            MessageOp::None => Err(JasperError::Protocol(
                "request with none opcode".to_string(),
            )),
            MessageOp::ObjectCreate => self.object_create(request).await,
            MessageOp::ObjectDelete => self.object_delete(request).await,
            MessageOp::ObjectRead => self.object_read(request).await,
            MessageOp::ObjectWrite => self.object_write(request).await,
            MessageOp::ObjectStatus => self.object_status(request).await,
            MessageOp::KvPut => self.kv_put(request).await,
            MessageOp::KvDelete => self.kv_delete(request).await,
            MessageOp::KvGet => self.kv_get(request).await,
        }
    }

    async fn object_create(&mut self, request: &mut Message) -> Result<(), JasperError> {
        let namespace = request.get_str()?;
        let mut reply = Message::new_reply(request);

        for _ in 0..request.count() {
            let name = request.get_str()?;
            reply.add_operation();
            if let Some(backend) = &self.object_backend {
                match backend.create(&namespace, &name).await {
                    Ok(handle) => {
                        let _ = backend.close(handle).await;
                    }
                    Err(e) => warn!("Creating {namespace}/{name} failed: {e}"),
                }
            }
        }

        if request.wants_reply() {
            reply.send(&mut self.stream).await?;
        }
        Ok(())
    }

    async fn object_delete(&mut self, request: &mut Message) -> Result<(), JasperError> {
        let namespace = request.get_str()?;
        let mut reply = Message::new_reply(request);

        for _ in 0..request.count() {
            let name = request.get_str()?;
            reply.add_operation();
            if let Some(backend) = &self.object_backend {
                let result: Result<(), JasperError> = async {
                    let handle = backend.open(&namespace, &name).await?;
                    backend.delete(handle).await
                }
                .await;
                if let Err(e) = result {
                    warn!("Deleting {namespace}/{name} failed: {e}");
                }
            }
        }

        if request.wants_reply() {
            reply.send(&mut self.stream).await?;
        }
        Ok(())
    }

    async fn object_status(&mut self, request: &mut Message) -> Result<(), JasperError> {
        let namespace = request.get_str()?;
        let mut reply = Message::new_reply(request);

        for _ in 0..request.count() {
            let name = request.get_str()?;
            let mut status = None;
            if let Some(backend) = &self.object_backend {
                let result: Result<_, JasperError> = async {
                    let handle = backend.open(&namespace, &name).await?;
                    let status = backend.status(&handle).await?;
                    backend.close(handle).await?;
                    Ok(status)
                }
                .await;
                match result {
                    Ok(s) => status = Some(s),
                    Err(e) => debug!("Status of {namespace}/{name} failed: {e}"),
                }
            }

            let status = status.unwrap_or_default();
            reply.add_operation();
            reply.append_i64(status.modification_time);
            reply.append_u64(status.size);
        }

        // Status results are always produced, independent of the flags.
        if reply.count() > 0 {
            reply.send(&mut self.stream).await?;
        }
        Ok(())
    }

    async fn object_read(&mut self, request: &mut Message) -> Result<(), JasperError> {
        let namespace = request.get_str()?;
        let name = request.get_str()?;

        // One open per request; all packed reads share the handle.
        let handle = match &self.object_backend {
            Some(backend) => match backend.open(&namespace, &name).await {
                Ok(handle) => Some(handle),
                Err(e) => {
                    debug!("Opening {namespace}/{name} failed: {e}");
                    None
                }
            },
            None => None,
        };

        let mut reply = Message::new_reply(request);
        for _ in 0..request.count() {
            let length = request.get_u64()?;
            let offset = request.get_u64()?;
            if length > MAX_OPERATION_SIZE {
                return Err(JasperError::Protocol(format!(
                    "oversized read ({length} bytes)"
                )));
            }

            let mut bytes_read = 0u64;
            let mut data = Vec::new();
            if let (Some(backend), Some(handle)) = (&self.object_backend, &handle) {
                data = vec![0u8; length as usize];
                match backend.read(handle, &mut data, offset).await {
                    Ok(n) => {
                        bytes_read = n;
                        data.truncate(n as usize);
                    }
                    Err(e) => {
                        warn!("Reading {namespace}/{name} failed: {e}");
                        data.clear();
                    }
                }
            }

            reply.add_operation();
            reply.append_u64(bytes_read);
            if bytes_read > 0 {
                reply.append_bulk(Bytes::from(data));
            }

            if reply.count() == REPLY_CHUNK {
                reply.send(&mut self.stream).await?;
                reply = Message::new_reply(request);
            }
        }
        if reply.count() > 0 {
            reply.send(&mut self.stream).await?;
        }

        if let (Some(backend), Some(handle)) = (&self.object_backend, handle) {
            if let Err(e) = backend.close(handle).await {
                warn!("Closing {namespace}/{name} failed: {e}");
            }
        }
        Ok(())
    }

    async fn object_write(&mut self, request: &mut Message) -> Result<(), JasperError> {
        let namespace = request.get_str()?;
        let name = request.get_str()?;
        let safety = request.safety();

        let handle = match &self.object_backend {
            Some(backend) => match backend.open(&namespace, &name).await {
                Ok(handle) => Some(handle),
                Err(e) => {
                    debug!("Opening {namespace}/{name} failed: {e}");
                    None
                }
            },
            None => None,
        };

        let mut reply = Message::new_reply(request);
        for _ in 0..request.count() {
            let length = request.get_u64()?;
            let offset = request.get_u64()?;
            if length > MAX_OPERATION_SIZE {
                return Err(JasperError::Protocol(format!(
                    "oversized write ({length} bytes)"
                )));
            }

            // The data follows the payload as bulk; it must be drained to
            // keep the stream framed even when the open failed.
            let mut data = vec![0u8; length as usize];
            self.stream.read_exact(&mut data).await?;

            let mut bytes_written = 0u64;
            if let (Some(backend), Some(handle)) = (&self.object_backend, &handle) {
                match backend.write(handle, &data, offset).await {
                    Ok(n) => bytes_written = n,
                    Err(e) => warn!("Writing {namespace}/{name} failed: {e}"),
                }
            }

            reply.add_operation();
            reply.append_u64(bytes_written);
        }

        if safety == Safety::Storage {
            if let (Some(backend), Some(handle)) = (&self.object_backend, &handle) {
                if let Err(e) = backend.sync(handle).await {
                    warn!("Syncing {namespace}/{name} failed: {e}");
                }
            }
        }
        if let (Some(backend), Some(handle)) = (&self.object_backend, handle) {
            if let Err(e) = backend.close(handle).await {
                warn!("Closing {namespace}/{name} failed: {e}");
            }
        }

        if request.wants_reply() {
            reply.send(&mut self.stream).await?;
        }
        Ok(())
    }

    async fn kv_put(&mut self, request: &mut Message) -> Result<(), JasperError> {
        let namespace = request.get_str()?;
        let safety = request.safety();

        let mut write_batch = self
            .kv_backend
            .as_ref()
            .map(|backend| backend.batch_start(&namespace, safety));

        let mut reply = Message::new_reply(request);
        for _ in 0..request.count() {
            let key = request.get_str()?;
            let length = request.get_u32()?;
            let value = request.get_bytes(length as usize)?;
            if let Some(write_batch) = write_batch.as_mut() {
                write_batch.put(&key, value);
            }
            reply.add_operation();
        }

        if let (Some(backend), Some(write_batch)) = (&self.kv_backend, write_batch) {
            if let Err(e) = backend.batch_execute(write_batch).await {
                warn!("Committing put batch in '{namespace}' failed: {e}");
            }
        }

        if request.wants_reply() {
            reply.send(&mut self.stream).await?;
        }
        Ok(())
    }

    async fn kv_delete(&mut self, request: &mut Message) -> Result<(), JasperError> {
        let namespace = request.get_str()?;
        let safety = request.safety();

        let mut write_batch = self
            .kv_backend
            .as_ref()
            .map(|backend| backend.batch_start(&namespace, safety));

        let mut reply = Message::new_reply(request);
        for _ in 0..request.count() {
            let key = request.get_str()?;
            if let Some(write_batch) = write_batch.as_mut() {
                write_batch.delete(&key);
            }
            reply.add_operation();
        }

        if let (Some(backend), Some(write_batch)) = (&self.kv_backend, write_batch) {
            if let Err(e) = backend.batch_execute(write_batch).await {
                warn!("Committing delete batch in '{namespace}' failed: {e}");
            }
        }

        if request.wants_reply() {
            reply.send(&mut self.stream).await?;
        }
        Ok(())
    }

    async fn kv_get(&mut self, request: &mut Message) -> Result<(), JasperError> {
        let namespace = request.get_str()?;

        let mut reply = Message::new_reply(request);
        for _ in 0..request.count() {
            let key = request.get_str()?;

            let value = match &self.kv_backend {
                Some(backend) => backend.get(&namespace, &key).await.unwrap_or_else(|e| {
                    warn!("Get of {namespace}/{key} failed: {e}");
                    None
                }),
                None => None,
            };

            reply.add_operation();
            match value {
                Some(value) => {
                    reply.append_u32(value.len() as u32);
                    reply.append_bytes(&value);
                }
                // A zero length marks a miss.
                None => reply.append_u32(0),
            }

            if reply.count() == REPLY_CHUNK {
                reply.send(&mut self.stream).await?;
                reply = Message::new_reply(request);
            }
        }
        if reply.count() > 0 {
            reply.send(&mut self.stream).await?;
        }
        Ok(())
    }
}
