use bytes::Bytes;
use jasper::client::{KvHandle, kv};
use jasper::config::{ClientsConfig, Config, ServersConfig, ServiceConfig};
use jasper::core::operation::ValueSlot;
use jasper::core::semantics::{Safety, Semantics, Template};
use jasper::core::{Batch, Runtime};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

fn local_config(kv_backend: &str, kv_path: &str) -> Config {
    Config {
        servers: ServersConfig {
            object: vec!["127.0.0.1:4711".to_string()],
            kv: vec!["127.0.0.1:4712".to_string()],
        },
        object: ServiceConfig {
            backend: "memory".to_string(),
            component: "client".to_string(),
            path: String::new(),
        },
        kv: ServiceConfig {
            backend: kv_backend.to_string(),
            component: "client".to_string(),
            path: kv_path.to_string(),
        },
        clients: ClientsConfig {
            max_connections: 4,
            background_workers: 2,
        },
        log_level: "info".to_string(),
    }
}

async fn memory_runtime() -> Arc<Runtime> {
    Runtime::new(local_config("memory", "")).await.unwrap()
}

#[tokio::test]
async fn put_then_get_round_trip() {
    let runtime = memory_runtime().await;
    let kv = KvHandle::new(&runtime, "ns", "a");

    let mut batch = Batch::with_template(runtime.clone(), Template::Default);
    kv.put(Bytes::from_static(b"{\"x\":1}"), &mut batch);
    assert!(batch.execute().await);

    let slot = ValueSlot::new();
    kv.get(&slot, &mut batch);
    assert!(batch.execute().await);
    assert_eq!(slot.get(), Some(Bytes::from_static(b"{\"x\":1}")));
}

#[tokio::test]
async fn last_put_in_a_batch_wins() {
    let runtime = memory_runtime().await;
    let kv = KvHandle::new(&runtime, "ns", "k");

    let mut batch = Batch::with_template(runtime.clone(), Template::Default);
    for version in 1..=5u8 {
        kv.put(Bytes::copy_from_slice(&[version]), &mut batch);
    }
    assert!(batch.execute().await);

    let slot = ValueSlot::new();
    kv.get(&slot, &mut batch);
    assert!(batch.execute().await);
    assert_eq!(slot.get(), Some(Bytes::copy_from_slice(&[5u8])));
}

#[tokio::test]
async fn get_of_a_missing_key_fails_but_the_batch_continues() {
    let runtime = memory_runtime().await;
    let present = KvHandle::new(&runtime, "ns", "present");
    let missing = KvHandle::new(&runtime, "ns", "missing");

    let mut batch = Batch::with_template(runtime.clone(), Template::Default);
    present.put(Bytes::from_static(b"v"), &mut batch);
    assert!(batch.execute().await);

    let hit = ValueSlot::new();
    let miss = ValueSlot::new();
    missing.get(&miss, &mut batch);
    present.get(&hit, &mut batch);

    // The miss makes the batch fail, but the hit is still delivered.
    assert!(!batch.execute().await);
    assert_eq!(hit.get(), Some(Bytes::from_static(b"v")));
    assert_eq!(miss.get(), None);
}

#[tokio::test]
async fn delete_removes_the_key() {
    let runtime = memory_runtime().await;
    let kv = KvHandle::new(&runtime, "ns", "doomed");

    let mut batch = Batch::with_template(runtime.clone(), Template::Default);
    kv.put(Bytes::from_static(b"v"), &mut batch);
    assert!(batch.execute().await);

    kv.delete(&mut batch);
    assert!(batch.execute().await);

    let slot = ValueSlot::new();
    kv.get(&slot, &mut batch);
    assert!(!batch.execute().await);
    assert_eq!(slot.get(), None);
}

#[tokio::test]
async fn get_with_callback_observes_the_value() {
    let runtime = memory_runtime().await;
    let kv = KvHandle::new(&runtime, "ns", "cb");

    let mut batch = Batch::with_template(runtime.clone(), Template::Default);
    kv.put(Bytes::from_static(b"payload"), &mut batch);
    assert!(batch.execute().await);

    let seen = Arc::new(AtomicBool::new(false));
    let seen_in_callback = seen.clone();
    kv.get_with(
        move |value| {
            assert_eq!(value, b"payload");
            seen_in_callback.store(true, Ordering::SeqCst);
        },
        &mut batch,
    );
    assert!(batch.execute().await);
    assert!(seen.load(Ordering::SeqCst));
}

#[tokio::test]
async fn prefix_iteration_covers_exactly_the_prefix() {
    let runtime = memory_runtime().await;

    let mut batch = Batch::with_template(runtime.clone(), Template::Default);
    KvHandle::new(&runtime, "ns", "alpha").put(Bytes::from_static(&[1]), &mut batch);
    KvHandle::new(&runtime, "ns", "ant").put(Bytes::from_static(&[2]), &mut batch);
    KvHandle::new(&runtime, "ns", "beta").put(Bytes::from_static(&[3]), &mut batch);
    assert!(batch.execute().await);

    let mut values: Vec<u8> = kv::get_by_prefix(&runtime, "ns", "a")
        .await
        .unwrap()
        .map(|value| value[0])
        .collect();
    values.sort_unstable();
    assert_eq!(values, vec![1, 2]);
}

#[tokio::test]
async fn iteration_is_namespaced() {
    let runtime = memory_runtime().await;

    let mut batch = Batch::with_template(runtime.clone(), Template::Default);
    KvHandle::new(&runtime, "one", "k").put(Bytes::from_static(&[1]), &mut batch);
    KvHandle::new(&runtime, "two", "k").put(Bytes::from_static(&[2]), &mut batch);
    assert!(batch.execute().await);

    let values: Vec<Bytes> = kv::get_all(&runtime, "one").await.unwrap().collect();
    assert_eq!(values, vec![Bytes::from_static(&[1])]);
}

#[tokio::test]
async fn iterators_may_be_abandoned_mid_stream() {
    let runtime = memory_runtime().await;

    let mut batch = Batch::with_template(runtime.clone(), Template::Default);
    for i in 0..10u8 {
        KvHandle::new(&runtime, "ns", &format!("key{i}")).put(
            Bytes::copy_from_slice(&[i]),
            &mut batch,
        );
    }
    assert!(batch.execute().await);

    let mut iterator = kv::get_all(&runtime, "ns").await.unwrap();
    assert!(iterator.next().is_some());
    drop(iterator);

    // The backend stays usable after the abandoned cursor is dropped.
    let count = kv::get_all(&runtime, "ns").await.unwrap().count();
    assert_eq!(count, 10);
}

#[tokio::test]
async fn relaxed_ordering_still_converges_to_the_same_state() {
    let runtime = memory_runtime().await;

    let mut semantics = Semantics::new(Template::Default);
    semantics.set_ordering(jasper::core::semantics::Ordering::Relaxed);
    let mut batch = Batch::new(runtime.clone(), semantics);

    // Interleave two namespaces; relaxed ordering may regroup them.
    for i in 0..4u8 {
        KvHandle::new(&runtime, "left", &format!("k{i}"))
            .put(Bytes::copy_from_slice(&[i]), &mut batch);
        KvHandle::new(&runtime, "right", &format!("k{i}"))
            .put(Bytes::copy_from_slice(&[i + 10]), &mut batch);
    }
    assert!(batch.execute().await);

    assert_eq!(kv::get_all(&runtime, "left").await.unwrap().count(), 4);
    assert_eq!(kv::get_all(&runtime, "right").await.unwrap().count(), 4);
}

#[tokio::test]
async fn sled_backend_round_trips_durably() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = Runtime::new(local_config("sled", dir.path().to_str().unwrap()))
        .await
        .unwrap();

    let kv = KvHandle::new(&runtime, "ns", "durable");

    let mut semantics = Semantics::new(Template::Default);
    semantics.set_safety(Safety::Storage);
    let mut batch = Batch::new(runtime.clone(), semantics);
    kv.put(Bytes::from_static(b"on-disk"), &mut batch);
    assert!(batch.execute().await);

    let slot = ValueSlot::new();
    kv.get(&slot, &mut batch);
    assert!(batch.execute().await);
    assert_eq!(slot.get(), Some(Bytes::from_static(b"on-disk")));

    runtime.shutdown().await;
}

#[tokio::test]
async fn sled_backend_scans_by_prefix() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = Runtime::new(local_config("sled", dir.path().to_str().unwrap()))
        .await
        .unwrap();

    let mut batch = Batch::with_template(runtime.clone(), Template::Default);
    KvHandle::new(&runtime, "ns", "alpha").put(Bytes::from_static(&[1]), &mut batch);
    KvHandle::new(&runtime, "ns", "ant").put(Bytes::from_static(&[2]), &mut batch);
    KvHandle::new(&runtime, "ns", "beta").put(Bytes::from_static(&[3]), &mut batch);
    assert!(batch.execute().await);

    let mut values: Vec<u8> = kv::get_by_prefix(&runtime, "ns", "a")
        .await
        .unwrap()
        .map(|value| value[0])
        .collect();
    values.sort_unstable();
    assert_eq!(values, vec![1, 2]);

    runtime.shutdown().await;
}
