// src/core/background.rs

//! A fixed-size pool of background workers fed from a shared job queue,
//! used for asynchronous batch execution.

use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// A queued unit of background work.
pub type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// The worker pool. Jobs are executed in queue order as workers free up;
/// completion signaling is the job's own business (batches use a oneshot).
pub struct BackgroundPool {
    sender: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    workers: tokio::sync::Mutex<JoinSet<()>>,
    worker_count: usize,
}

impl BackgroundPool {
    /// Spawns `count` workers; zero means one per CPU.
    pub fn new(count: usize) -> Self {
        let worker_count = if count == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            count
        };

        let (sender, receiver) = mpsc::unbounded_channel::<Job>();
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));

        let mut workers = JoinSet::new();
        for worker_id in 0..worker_count {
            let receiver = receiver.clone();
            workers.spawn(async move {
                loop {
                    // The queue lock is released before the job runs, so the
                    // other workers keep draining while this one is busy.
                    let job = { receiver.lock().await.recv().await };
                    match job {
                        Some(job) => job.await,
                        None => break,
                    }
                }
                debug!("Background worker {worker_id} exited");
            });
        }

        Self {
            sender: Mutex::new(Some(sender)),
            workers: tokio::sync::Mutex::new(workers),
            worker_count,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Enqueues a job. Jobs submitted after shutdown are dropped.
    pub fn spawn(&self, job: Job) {
        match self.sender.lock().as_ref() {
            Some(sender) => {
                let _ = sender.send(job);
            }
            None => warn!("Background job submitted after shutdown, dropping it"),
        }
    }

    /// Closes the queue and waits for the workers to drain it.
    pub async fn shutdown(&self) {
        self.sender.lock().take();
        let mut workers = self.workers.lock().await;
        while workers.join_next().await.is_some() {}
    }
}
