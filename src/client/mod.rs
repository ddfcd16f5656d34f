// src/client/mod.rs

//! The client-facing services: reference-counted object and KV handles that
//! translate application calls into batch operations.

pub mod kv;
pub mod object;

pub use kv::KvHandle;
pub use object::ObjectHandle;

use crate::connection::ConnectionPool;
use crate::core::JasperError;
use crate::core::protocol::Message;
use tracing::warn;

/// Ships one packed run message: lease a connection, send, await the single
/// acknowledgement when the flags demand one, and return the connection.
/// Wire errors drop the connection instead of pooling it.
pub(crate) async fn send_run(pool: &ConnectionPool, index: u32, message: &Message) -> bool {
    let mut connection = match pool.pop(index).await {
        Ok(connection) => connection,
        Err(e) => {
            warn!("Leasing a connection to server {index} failed: {e}");
            return false;
        }
    };

    let result: Result<(), JasperError> = async {
        message.send(&mut connection).await?;
        if message.wants_reply() {
            let mut reply = Message::new_reply(message);
            reply.receive(&mut connection).await?;
        }
        Ok(())
    }
    .await;

    match result {
        Ok(()) => {
            pool.push(index, connection);
            true
        }
        Err(e) => {
            warn!("Run against server {index} failed: {e}");
            pool.discard(index);
            false
        }
    }
}
