//! Bounded-concurrency fan-out over a batch of work items.
//!
//! One task is spawned per item. A semaphore sized to the concurrency bound
//! gates entry into the worker, so at most `concurrency` workers run at once.
//! There is no fail-fast: every item ends up either in the success map or the
//! failure map of the returned [`BatchOutcome`].
//!
//! Cancellation is cooperative. Items still waiting for a permit, or holding
//! one when the context has already fired, are recorded as
//! [`ItemFailure::Cancelled`] and their worker is never called. Workers that
//! are already running receive the context and decide for themselves.

use ballast_core::{CancelReason, Context, ExecutorError};
use futures_util::FutureExt;
use std::any::Any;
use std::collections::HashSet;
use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::{effective_concurrency, ExecutorConfig};
use crate::item::WorkItem;
use crate::outcome::{BatchOutcome, ItemFailure};

/// Runs a worker over every item of a batch with bounded concurrency.
#[derive(Debug, Clone)]
pub struct FanOutExecutor {
    concurrency: usize,
}

impl Default for FanOutExecutor {
    fn default() -> Self {
        Self::new(0)
    }
}

impl FanOutExecutor {
    /// Create an executor; `0` means [`DEFAULT_CONCURRENCY`](crate::DEFAULT_CONCURRENCY).
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: effective_concurrency(concurrency),
        }
    }

    pub fn from_config(config: &ExecutorConfig) -> Self {
        Self::new(config.concurrency)
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Run `worker` over `items` using the executor's concurrency bound.
    ///
    /// Fails only when the batch contains duplicate ids, in which case no
    /// worker is invoked. Per-item errors land in the outcome instead.
    pub async fn run<I, V, E, W, Fut>(
        &self,
        ctx: &Context,
        items: Vec<I>,
        worker: W,
    ) -> Result<BatchOutcome<V>, ExecutorError>
    where
        I: WorkItem,
        V: Send + 'static,
        E: Display + 'static,
        W: Fn(Context, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        run_batch(ctx, self.concurrency, items, worker).await
    }

    /// Like [`run`](Self::run) with a per-call bound; `0` means the default.
    pub async fn run_with_concurrency<I, V, E, W, Fut>(
        &self,
        ctx: &Context,
        concurrency: usize,
        items: Vec<I>,
        worker: W,
    ) -> Result<BatchOutcome<V>, ExecutorError>
    where
        I: WorkItem,
        V: Send + 'static,
        E: Display + 'static,
        W: Fn(Context, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        run_batch(ctx, effective_concurrency(concurrency), items, worker).await
    }
}

fn duplicate_ids<I: WorkItem>(items: &[I]) -> Vec<String> {
    let mut seen = HashSet::with_capacity(items.len());
    let mut duplicates: Vec<String> = items
        .iter()
        .map(WorkItem::id)
        .filter(|id| !seen.insert(*id))
        .map(str::to_string)
        .collect();
    duplicates.sort();
    duplicates.dedup();
    duplicates
}

async fn run_batch<I, V, E, W, Fut>(
    ctx: &Context,
    concurrency: usize,
    items: Vec<I>,
    worker: W,
) -> Result<BatchOutcome<V>, ExecutorError>
where
    I: WorkItem,
    V: Send + 'static,
    E: Display + 'static,
    W: Fn(Context, I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<V, E>> + Send + 'static,
{
    let duplicates = duplicate_ids(&items);
    if !duplicates.is_empty() {
        tracing::warn!(duplicates = ?duplicates, "Rejecting batch with duplicate item ids");
        return Err(ExecutorError::DuplicateItemIds { ids: duplicates });
    }

    let total = items.len();
    if total == 0 {
        return Ok(BatchOutcome::default());
    }

    tracing::debug!(items = total, concurrency, "Fan-out batch started");

    let ids: Vec<String> = items.iter().map(|item| item.id().to_string()).collect();
    let worker = Arc::new(worker);
    let semaphore = Arc::new(Semaphore::new(concurrency));
    let mut join_set: JoinSet<(usize, Result<V, ItemFailure>)> = JoinSet::new();

    for (index, item) in items.into_iter().enumerate() {
        let ctx = ctx.clone();
        let worker = Arc::clone(&worker);
        let semaphore = Arc::clone(&semaphore);
        join_set.spawn(async move {
            let result = run_item(ctx, semaphore, worker, item).await;
            (index, result)
        });
    }

    let mut slots: Vec<Option<Result<V, ItemFailure>>> =
        std::iter::repeat_with(|| None).take(total).collect();
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((index, result)) => slots[index] = Some(result),
            Err(e) => tracing::error!(error = %e, "Fan-out task join failed"),
        }
    }

    let mut outcome = BatchOutcome::with_capacity(total);
    for (id, slot) in ids.into_iter().zip(slots) {
        let result =
            slot.unwrap_or_else(|| Err(ItemFailure::failed("worker task did not complete")));
        if let Err(failure) = &result {
            tracing::warn!(item_id = %id, failure = %failure, "Batch item failed");
        }
        outcome.record(id, result);
    }

    tracing::info!(
        items = total,
        succeeded = outcome.success_count(),
        failed = outcome.failure_count(),
        cancelled = outcome.cancelled_count(),
        "Fan-out batch completed"
    );

    Ok(outcome)
}

async fn run_item<I, V, E, W, Fut>(
    ctx: Context,
    semaphore: Arc<Semaphore>,
    worker: Arc<W>,
    item: I,
) -> Result<V, ItemFailure>
where
    I: WorkItem,
    E: Display + 'static,
    W: Fn(Context, I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<V, E>> + Send + 'static,
{
    let _permit = tokio::select! {
        biased;
        reason = ctx.cancelled() => return Err(ItemFailure::Cancelled { reason }),
        permit = semaphore.acquire_owned() => permit.map_err(|_| ItemFailure::Cancelled {
            reason: CancelReason::Cancelled,
        })?,
    };

    if let Some(reason) = ctx.reason() {
        return Err(ItemFailure::Cancelled { reason });
    }

    let call = AssertUnwindSafe(async move { worker(ctx, item).await }).catch_unwind();
    match call.await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(ItemFailure::failed(e.to_string())),
        Err(panic) => Err(ItemFailure::failed(format!(
            "worker panicked: {}",
            panic_message(panic.as_ref())
        ))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}
