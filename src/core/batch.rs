// src/core/batch.rs

//! The batch engine: accumulates operations, groups them into runs by
//! execute kind and locality, and dispatches each run against the local
//! backend or over the wire.

use crate::client;
use crate::core::operation::{Operation, OperationKind};
use crate::core::runtime::Runtime;
use crate::core::semantics::{Ordering as BatchOrdering, Semantics, Template};
use std::mem;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Invoked when an asynchronously executed batch completes.
pub type BatchCompletedFn = Box<dyn FnOnce(&Batch, bool) + Send>;

/// An ordered buffer of operations committed together under one semantics.
///
/// A batch is single-owner and not shared across threads while operations
/// are being added. Executing drains the operation list; the batch is then
/// reusable for a new cycle.
pub struct Batch {
    runtime: Arc<Runtime>,
    semantics: Arc<Semantics>,
    operations: Vec<Operation>,
}

impl Batch {
    pub fn new(runtime: Arc<Runtime>, semantics: Semantics) -> Self {
        Self {
            runtime,
            semantics: Arc::new(semantics),
            operations: Vec::new(),
        }
    }

    pub fn with_template(runtime: Arc<Runtime>, template: Template) -> Self {
        Self::new(runtime, Semantics::new(template))
    }

    pub fn semantics(&self) -> &Semantics {
        &self.semantics
    }

    pub fn operation_count(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub(crate) fn add(&mut self, operation: Operation) {
        self.operations.push(operation);
    }

    /// Executes all queued operations. Returns the conjunction of the run
    /// results; partial failure leaves already-applied operations in place.
    pub async fn execute(&mut self) -> bool {
        let operations = mem::take(&mut self.operations);
        execute_operations(self.runtime.clone(), self.semantics.clone(), operations).await
    }

    /// Hands the batch to the background pool. The worker runs the
    /// synchronous path, invokes `callback`, and releases the batch to
    /// [`PendingBatch::wait`].
    pub fn execute_async(mut self, callback: Option<BatchCompletedFn>) -> PendingBatch {
        let (sender, receiver) = oneshot::channel();
        let runtime = self.runtime.clone();
        let spawner = self.runtime.clone();
        let semantics = self.semantics.clone();
        let operations = mem::take(&mut self.operations);

        spawner.spawn_background(Box::pin(async move {
            let success = execute_operations(runtime, semantics, operations).await;
            if let Some(callback) = callback {
                callback(&self, success);
            }
            let _ = sender.send((self, success));
        }));

        PendingBatch { receiver }
    }
}

/// A batch owned by a background worker until completion.
pub struct PendingBatch {
    receiver: oneshot::Receiver<(Batch, bool)>,
}

impl PendingBatch {
    /// Blocks until the batch completes, returning it together with its
    /// result.
    pub async fn wait(self) -> (Batch, bool) {
        self.receiver
            .await
            .expect("background pool dropped a pending batch")
    }
}

/// Scans the operation list, groups adjacent compatible operations into
/// runs, and dispatches each run. Merging requires matching execute kind and
/// locality key, and an ordering axis that permits it at all; relaxed
/// ordering additionally sorts by locality first to maximize run length.
pub(crate) async fn execute_operations(
    runtime: Arc<Runtime>,
    semantics: Arc<Semantics>,
    mut operations: Vec<Operation>,
) -> bool {
    if operations.is_empty() {
        return true;
    }

    if semantics.ordering() == BatchOrdering::Relaxed {
        operations.sort_by(|a, b| a.key.cmp(&b.key).then(a.data.kind().cmp(&b.data.kind())));
    }
    let merging = semantics.ordering() != BatchOrdering::Strict;

    let mut success = true;
    let mut run: Vec<Operation> = Vec::new();
    for operation in operations {
        let starts_new_run = match run.last() {
            None => false,
            Some(previous) => {
                !merging
                    || previous.data.kind() != operation.data.kind()
                    || previous.key != operation.key
            }
        };
        if starts_new_run {
            let current = mem::take(&mut run);
            success = dispatch_run(&runtime, &semantics, current).await && success;
        }
        run.push(operation);
    }
    if !run.is_empty() {
        success = dispatch_run(&runtime, &semantics, run).await && success;
    }
    success
}

async fn dispatch_run(runtime: &Arc<Runtime>, semantics: &Semantics, run: Vec<Operation>) -> bool {
    match run[0].data.kind() {
        OperationKind::ObjectCreate => client::object::execute_create(runtime, semantics, run).await,
        OperationKind::ObjectDelete => client::object::execute_delete(runtime, semantics, run).await,
        OperationKind::ObjectRead => client::object::execute_read(runtime, semantics, run).await,
        OperationKind::ObjectWrite => client::object::execute_write(runtime, semantics, run).await,
        OperationKind::ObjectStatus => client::object::execute_status(runtime, semantics, run).await,
        OperationKind::KvPut => client::kv::execute_put(runtime, semantics, run).await,
        OperationKind::KvDelete => client::kv::execute_delete(runtime, semantics, run).await,
        OperationKind::KvGet => client::kv::execute_get(runtime, semantics, run).await,
    }
}
