use bytes::Bytes;
use jasper::client::ObjectHandle;
use jasper::config::{ClientsConfig, Config, ServersConfig, ServiceConfig};
use jasper::core::operation::{ByteCounter, ObjectStatusSlot, SharedBuffer};
use jasper::core::semantics::{Safety, Semantics, Template};
use jasper::core::{Batch, Runtime};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

fn local_config(object_backend: &str, object_path: &str) -> Config {
    Config {
        servers: ServersConfig {
            object: vec!["127.0.0.1:4711".to_string()],
            kv: vec!["127.0.0.1:4712".to_string()],
        },
        object: ServiceConfig {
            backend: object_backend.to_string(),
            component: "client".to_string(),
            path: object_path.to_string(),
        },
        kv: ServiceConfig {
            backend: "memory".to_string(),
            component: "client".to_string(),
            path: String::new(),
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
async fn write_status_read_round_trip() {
    let runtime = memory_runtime().await;
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
    assert!(status.modification_time() > 0);

    let buffer = SharedBuffer::new(6);
    let bytes_read = ByteCounter::new();
    object.read(&buffer, 6, 10, &bytes_read, &mut batch);
    assert!(batch.execute().await);
    assert_eq!(bytes_read.get(), 6);
    assert_eq!(buffer.to_vec(), b"ABCDEF");
}

#[tokio::test]
async fn writes_before_the_offset_read_back_zeroes() {
    let runtime = memory_runtime().await;
    let object = ObjectHandle::new(&runtime, "ns", "sparse");

    let mut batch = Batch::with_template(runtime.clone(), Template::Default);
    object.create(&mut batch);

    let bytes_written = ByteCounter::new();
    object.write(Bytes::from_static(b"X"), 4, &bytes_written, &mut batch);
    assert!(batch.execute().await);

    let buffer = SharedBuffer::new(5);
    let bytes_read = ByteCounter::new();
    object.read(&buffer, 5, 0, &bytes_read, &mut batch);
    assert!(batch.execute().await);
    assert_eq!(bytes_read.get(), 5);
    assert_eq!(buffer.to_vec(), b"\0\0\0\0X");
}

#[tokio::test]
async fn reading_past_the_end_is_partial() {
    let runtime = memory_runtime().await;
    let object = ObjectHandle::new(&runtime, "ns", "short");

    let mut batch = Batch::with_template(runtime.clone(), Template::Default);
    object.create(&mut batch);

    let bytes_written = ByteCounter::new();
    object.write(Bytes::from_static(b"abc"), 0, &bytes_written, &mut batch);
    assert!(batch.execute().await);

    let buffer = SharedBuffer::new(10);
    let bytes_read = ByteCounter::new();
    object.read(&buffer, 10, 0, &bytes_read, &mut batch);
    assert!(batch.execute().await);
    assert_eq!(bytes_read.get(), 3);
}

#[tokio::test]
async fn delete_makes_reads_fail() {
    let runtime = memory_runtime().await;
    let object = ObjectHandle::new(&runtime, "ns", "gone");

    let mut batch = Batch::with_template(runtime.clone(), Template::Default);
    object.create(&mut batch);
    assert!(batch.execute().await);

    object.delete(&mut batch);
    assert!(batch.execute().await);

    let buffer = SharedBuffer::new(1);
    let bytes_read = ByteCounter::new();
    object.read(&buffer, 1, 0, &bytes_read, &mut batch);
    assert!(!batch.execute().await);
    assert_eq!(bytes_read.get(), 0);
}

#[tokio::test]
async fn merged_writes_share_one_counter() {
    let runtime = memory_runtime().await;
    let object = ObjectHandle::new(&runtime, "ns", "merged");

    let mut batch = Batch::with_template(runtime.clone(), Template::Default);
    object.create(&mut batch);
    assert!(batch.execute().await);

    // Two writes to the same object form one run; both results are
    // aggregated into the shared counter by atomic add.
    let bytes_written = ByteCounter::new();
    object.write(Bytes::from_static(b"aaaa"), 0, &bytes_written, &mut batch);
    object.write(Bytes::from_static(b"bb"), 4, &bytes_written, &mut batch);
    assert!(batch.execute().await);
    assert_eq!(bytes_written.get(), 6);
}

#[test]
fn byte_counters_sum_without_tearing() {
    let counter = ByteCounter::new();
    let mut threads = Vec::new();
    for _ in 0..8 {
        let counter = counter.clone();
        threads.push(std::thread::spawn(move || {
            for _ in 0..10_000 {
                counter.add(3);
            }
        }));
    }
    for thread in threads {
        thread.join().unwrap();
    }
    assert_eq!(counter.get(), 8 * 10_000 * 3);
}

#[tokio::test]
async fn async_execution_reports_through_callback_and_wait() {
    let runtime = memory_runtime().await;
    let object = ObjectHandle::new(&runtime, "ns", "async");

    let mut batch = Batch::with_template(runtime.clone(), Template::Default);
    object.create(&mut batch);

    let called = Arc::new(AtomicBool::new(false));
    let called_in_callback = called.clone();
    let pending = batch.execute_async(Some(Box::new(move |batch, success| {
        assert!(success);
        assert!(batch.is_empty());
        called_in_callback.store(true, Ordering::SeqCst);
    })));

    let (batch, success) = pending.wait().await;
    assert!(success);
    assert!(called.load(Ordering::SeqCst));
    assert!(batch.is_empty());

    runtime.shutdown().await;
}

#[tokio::test]
async fn storage_safety_syncs_through_the_posix_backend() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = Runtime::new(local_config("posix", dir.path().to_str().unwrap()))
        .await
        .unwrap();
    let object = ObjectHandle::new(&runtime, "ns", "file");

    let mut semantics = Semantics::new(Template::Default);
    semantics.set_safety(Safety::Storage);
    let mut batch = Batch::new(runtime.clone(), semantics);

    object.create(&mut batch);
    let bytes_written = ByteCounter::new();
    object.write(Bytes::from_static(b"persisted"), 0, &bytes_written, &mut batch);
    assert!(batch.execute().await);
    assert_eq!(bytes_written.get(), 9);

    // The object is a plain file below the backend path.
    let on_disk = std::fs::read(dir.path().join("ns").join("file")).unwrap();
    assert_eq!(on_disk, b"persisted");

    let status = ObjectStatusSlot::new();
    object.status(&status, &mut batch);
    assert!(batch.execute().await);
    assert_eq!(status.size(), 9);
}

#[tokio::test]
#[should_panic(expected = "zero-length")]
async fn zero_length_reads_are_a_precondition_violation() {
    let runtime = memory_runtime().await;
    let object = ObjectHandle::new(&runtime, "ns", "zero");
    let mut batch = Batch::with_template(runtime.clone(), Template::Default);
    let buffer = SharedBuffer::new(1);
    object.read(&buffer, 0, 0, &ByteCounter::new(), &mut batch);
}
