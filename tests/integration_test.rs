//! End-to-end tests driving a real server over a loopback socket through
//! the client stack: batching, the wire protocol, the connection pools and
//! reply aggregation.

use bytes::Bytes;
use jasper::client::{KvHandle, ObjectHandle};
use jasper::config::{ClientsConfig, Config, ServersConfig, ServiceConfig};
use jasper::core::operation::{ByteCounter, ObjectStatusSlot, SharedBuffer, ValueSlot};
use jasper::core::semantics::Template;
use jasper::core::{Batch, Runtime};
use jasper::server::Server;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;

fn server_config() -> Config {
    Config {
        servers: ServersConfig {
            object: vec!["127.0.0.1:4711".to_string()],
            kv: vec!["127.0.0.1:4711".to_string()],
        },
        object: ServiceConfig {
            backend: "memory".to_string(),
            component: "server".to_string(),
            path: String::new(),
        },
        kv: ServiceConfig {
            backend: "memory".to_string(),
            component: "server".to_string(),
            path: String::new(),
        },
        clients: ClientsConfig::default(),
        log_level: "info".to_string(),
    }
}

async fn start_server() -> (SocketAddr, JoinHandle<()>) {
    let server = Server::bind(&server_config(), "127.0.0.1:0")
        .await
        .unwrap();
    let address = server.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let _ = server.run().await;
    });
    (address, handle)
}

async fn client_runtime(address: SocketAddr, max_connections: usize) -> Arc<Runtime> {
    let mut config = server_config();
    config.servers.object = vec![address.to_string()];
    config.servers.kv = vec![address.to_string()];
    config.clients = ClientsConfig {
        max_connections,
        background_workers: 2,
    };
    // Both components stay on the server side, so every operation goes over
    // the wire.
    Runtime::new(config).await.unwrap()
}

#[tokio::test]
async fn object_write_status_read_over_the_wire() {
    let (address, server) = start_server().await;
    let runtime = client_runtime(address, 4).await;
    let object = ObjectHandle::new(&runtime, "ns", "obj");

    let mut batch = Batch::with_template(runtime.clone(), Template::Default);
    object.create(&mut batch);
    assert!(batch.execute().await);

    let bytes_written = ByteCounter::new();
    object.write(Bytes::from_static(b"ABCDEF"), 10, &bytes_written, &mut batch);
    assert!(batch.execute().await);
    assert_eq!(bytes_written.get(), 6);

    let status = ObjectStatusSlot::new();
    object.status(&status, &mut batch);
    assert!(batch.execute().await);
    assert!(status.size() >= 16);

    let buffer = SharedBuffer::new(6);
    let bytes_read = ByteCounter::new();
    object.read(&buffer, 6, 10, &bytes_read, &mut batch);
    assert!(batch.execute().await);
    assert_eq!(bytes_read.get(), 6);
    assert_eq!(buffer.to_vec(), b"ABCDEF");

    object.delete(&mut batch);
    assert!(batch.execute().await);

    runtime.shutdown().await;
    server.abort();
}

#[tokio::test]
async fn kv_round_trip_over_the_wire() {
    let (address, server) = start_server().await;
    let runtime = client_runtime(address, 4).await;
    let kv = KvHandle::new(&runtime, "ns", "a");

    let mut batch = Batch::with_template(runtime.clone(), Template::Default);
    kv.put(Bytes::from_static(b"{\"x\":1}"), &mut batch);
    assert!(batch.execute().await);

    let slot = ValueSlot::new();
    kv.get(&slot, &mut batch);
    assert!(batch.execute().await);
    assert_eq!(slot.get(), Some(Bytes::from_static(b"{\"x\":1}")));

    kv.delete(&mut batch);
    assert!(batch.execute().await);

    let slot = ValueSlot::new();
    kv.get(&slot, &mut batch);
    assert!(!batch.execute().await);
    assert_eq!(slot.get(), None);

    runtime.shutdown().await;
    server.abort();
}

#[tokio::test]
async fn unsafe_put_is_never_overtaken_by_the_following_get() {
    let (address, server) = start_server().await;
    let runtime = client_runtime(address, 4).await;
    let kv = KvHandle::new(&runtime, "ns", "raced");

    // Fire-and-forget semantics: the engine still upgrades puts and gets to
    // network safety internally, so the get below cannot observe a missing
    // key even though it may use a different pooled connection.
    for round in 0..32u32 {
        let mut batch = Batch::with_template(runtime.clone(), Template::Temporary);
        kv.put(Bytes::copy_from_slice(&round.to_le_bytes()), &mut batch);
        assert!(batch.execute().await);

        let slot = ValueSlot::new();
        kv.get(&slot, &mut batch);
        assert!(batch.execute().await, "get after put observed a missing key");
        assert_eq!(
            slot.get(),
            Some(Bytes::copy_from_slice(&round.to_le_bytes()))
        );
    }

    runtime.shutdown().await;
    server.abort();
}

#[tokio::test]
async fn large_read_runs_aggregate_chunked_replies() {
    let (address, server) = start_server().await;
    let runtime = client_runtime(address, 4).await;
    let object = ObjectHandle::new(&runtime, "ns", "chunky");

    let mut batch = Batch::with_template(runtime.clone(), Template::Default);
    object.create(&mut batch);

    let content: Vec<u8> = (0..64u8).collect();
    let bytes_written = ByteCounter::new();
    object.write(
        Bytes::copy_from_slice(&content),
        0,
        &bytes_written,
        &mut batch,
    );
    assert!(batch.execute().await);

    // 40 single-byte reads merge into one run; the server splits its
    // results over several reply frames, which the client aggregates.
    let buffers: Vec<SharedBuffer> = (0..40).map(|_| SharedBuffer::new(1)).collect();
    let bytes_read = ByteCounter::new();
    for (i, buffer) in buffers.iter().enumerate() {
        object.read(buffer, 1, i as u64, &bytes_read, &mut batch);
    }
    assert!(batch.execute().await);
    assert_eq!(bytes_read.get(), 40);
    for (i, buffer) in buffers.iter().enumerate() {
        assert_eq!(buffer.to_vec(), vec![i as u8]);
    }

    runtime.shutdown().await;
    server.abort();
}

#[tokio::test]
async fn large_get_runs_aggregate_chunked_replies() {
    let (address, server) = start_server().await;
    let runtime = client_runtime(address, 4).await;

    let handles: Vec<_> = (0..40u8)
        .map(|i| KvHandle::new(&runtime, "ns", &format!("key{i:02}")))
        .collect();

    let mut batch = Batch::with_template(runtime.clone(), Template::Default);
    for (i, kv) in handles.iter().enumerate() {
        kv.put(Bytes::copy_from_slice(&[i as u8]), &mut batch);
    }
    assert!(batch.execute().await);

    let slots: Vec<ValueSlot> = (0..40).map(|_| ValueSlot::new()).collect();
    for (kv, slot) in handles.iter().zip(&slots) {
        kv.get(slot, &mut batch);
    }
    assert!(batch.execute().await);
    for (i, slot) in slots.iter().enumerate() {
        assert_eq!(slot.get(), Some(Bytes::copy_from_slice(&[i as u8])));
    }

    runtime.shutdown().await;
    server.abort();
}

#[tokio::test]
async fn concurrent_batches_share_a_bounded_pool() {
    let (address, server) = start_server().await;
    // Two live connections for eight concurrent batches: leases must queue.
    let runtime = client_runtime(address, 2).await;

    let mut pending = Vec::new();
    for task in 0..8u8 {
        let kv = KvHandle::new(&runtime, "ns", &format!("task{task}"));
        let mut batch = Batch::with_template(runtime.clone(), Template::Default);
        kv.put(Bytes::copy_from_slice(&[task]), &mut batch);
        pending.push(batch.execute_async(None));
    }
    for handle in pending {
        let (_, success) = handle.wait().await;
        assert!(success);
    }

    let mut batch = Batch::with_template(runtime.clone(), Template::Default);
    let slots: Vec<ValueSlot> = (0..8).map(|_| ValueSlot::new()).collect();
    for (task, slot) in slots.iter().enumerate() {
        KvHandle::new(&runtime, "ns", &format!("task{task}")).get(slot, &mut batch);
    }
    assert!(batch.execute().await);
    for (task, slot) in slots.iter().enumerate() {
        assert_eq!(slot.get(), Some(Bytes::copy_from_slice(&[task as u8])));
    }

    runtime.shutdown().await;
    server.abort();
}

#[tokio::test]
async fn fire_and_forget_write_credits_the_full_length() {
    let (address, server) = start_server().await;
    // One connection serializes the write and the read on the same stream,
    // so the unacknowledged write is applied before the read arrives.
    let runtime = client_runtime(address, 1).await;
    let object = ObjectHandle::new(&runtime, "ns", "forget");

    let mut batch = Batch::with_template(runtime.clone(), Template::Default);
    object.create(&mut batch);
    assert!(batch.execute().await);

    let mut batch = Batch::with_template(runtime.clone(), Template::Temporary);
    let bytes_written = ByteCounter::new();
    object.write(Bytes::from_static(b"later"), 0, &bytes_written, &mut batch);
    assert!(batch.execute().await);
    // No reply carries the real count; the requested length is credited.
    assert_eq!(bytes_written.get(), 5);

    let mut batch = Batch::with_template(runtime.clone(), Template::Default);
    let buffer = SharedBuffer::new(5);
    let bytes_read = ByteCounter::new();
    object.read(&buffer, 5, 0, &bytes_read, &mut batch);
    assert!(batch.execute().await);
    assert_eq!(buffer.to_vec(), b"later");

    runtime.shutdown().await;
    server.abort();
}

#[tokio::test]
async fn mixed_services_in_one_batch_dispatch_to_both_pools() {
    let (address, server) = start_server().await;
    let runtime = client_runtime(address, 4).await;

    let object = ObjectHandle::new(&runtime, "ns", "both");
    let kv = KvHandle::new(&runtime, "ns", "both");

    let mut batch = Batch::with_template(runtime.clone(), Template::Default);
    object.create(&mut batch);
    kv.put(Bytes::from_static(b"v"), &mut batch);
    assert!(batch.execute().await);

    let slot = ValueSlot::new();
    kv.get(&slot, &mut batch);
    let status = ObjectStatusSlot::new();
    object.status(&status, &mut batch);
    assert!(batch.execute().await);
    assert_eq!(slot.get(), Some(Bytes::from_static(b"v")));

    runtime.shutdown().await;
    server.abort();
}
