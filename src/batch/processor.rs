//! Prioritized, retrying batch execution.
//!
//! [`BatchProcessor`] decouples submission of analysis work from execution:
//! callers enqueue items and get a receiver for the eventual
//! [`BatchResult`]; a single worker task drains the queue in priority order.
//! One slow or failing item never aborts its siblings — after its retries
//! are exhausted it becomes a failed entry in the batch result.
//!
//! ```text
//! add(item, prio) ─▶ queue (priority desc, FIFO among equals)
//!                       │ worker picks highest
//!                       ▼
//!                 process(items) — per item: attempt → linear backoff → retry
//!                       │
//!                       ▼
//!          BatchResult (atomic: every item settled) ─▶ oneshot + broadcast
//! ```
//!
//! Retries use [`LinearBackoff`] (`retry_delay × attempt`) — this
//! subsystem's documented contract; cleanup elsewhere uses the exponential
//! policy.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime};

use tokio::sync::{broadcast, oneshot, Notify};
use tokio::task::JoinHandle;

use super::backoff::{LinearBackoff, RetryPolicy};
use super::types::{AnalysisExecutor, AnalysisItem, BatchResult, ItemResult};

/// Buffered batch results per broadcast subscriber.
const RESULT_CHANNEL_CAPACITY: usize = 32;

// ---------------------------------------------------------------------------
// BatchConfig
// ---------------------------------------------------------------------------

/// Tuning knobs for the processor.  Each affects only this subsystem.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Total attempts allowed per item, including the first (default 3).
    pub max_retries: u32,
    /// Base retry delay; attempt `n` waits `retry_delay × n` (default 500 ms).
    pub retry_delay: Duration,
    /// Maximum items grouped into one batch by `add_batch` (default 5).
    pub batch_size: usize,
    /// Latency above which the companion tuner shrinks batches (default 3 s).
    pub slow_threshold: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_millis(500),
            batch_size: 5,
            slow_threshold: Duration::from_secs(3),
        }
    }
}

// ---------------------------------------------------------------------------
// ProcessorState
// ---------------------------------------------------------------------------

/// Lifecycle of the processor, independent of (but symmetric to) the audio
/// state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorState {
    Uninitialized,
    Initializing,
    Ready,
    /// The worker task died while the processor believed itself ready.
    Error,
}

// ---------------------------------------------------------------------------
// Internal queue types
// ---------------------------------------------------------------------------

struct QueuedBatch {
    id: u64,
    /// Max priority of the batch's items.
    priority: i32,
    /// Monotonic insertion order; the FIFO tie-breaker among equal
    /// priorities.
    seq: u64,
    items: Vec<AnalysisItem>,
    done: oneshot::Sender<BatchResult>,
}

struct Shared {
    executor: Arc<dyn AnalysisExecutor>,
    policy: LinearBackoff,
    /// Kept sorted: priority descending, `seq` ascending.
    queue: Mutex<Vec<QueuedBatch>>,
    wake: Notify,
    results_tx: broadcast::Sender<BatchResult>,
    next_id: AtomicU64,
    next_seq: AtomicU64,
}

// ---------------------------------------------------------------------------
// BatchProcessor
// ---------------------------------------------------------------------------

/// Fire-and-forget batch execution with bounded retries.
///
/// Construct one per application context (no globals); call
/// [`init`](Self::init) inside a tokio runtime to start the worker, then
/// [`add`](Self::add) items at will — `add` never blocks on execution.
pub struct BatchProcessor {
    config: BatchConfig,
    shared: Arc<Shared>,
    state: Mutex<ProcessorState>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl BatchProcessor {
    pub fn new(executor: Arc<dyn AnalysisExecutor>, config: BatchConfig) -> Self {
        let (results_tx, _) = broadcast::channel(RESULT_CHANNEL_CAPACITY);
        let policy = LinearBackoff {
            base: config.retry_delay,
            max_attempts: config.max_retries,
        };
        Self {
            config,
            shared: Arc::new(Shared {
                executor,
                policy,
                queue: Mutex::new(Vec::new()),
                wake: Notify::new(),
                results_tx,
                next_id: AtomicU64::new(1),
                next_seq: AtomicU64::new(1),
            }),
            state: Mutex::new(ProcessorState::Uninitialized),
            worker: Mutex::new(None),
        }
    }

    /// Start the worker task.  No-op (with a warning) when already running.
    /// Must be called from within a tokio runtime.
    pub fn init(&self) {
        let mut state = self.state.lock().unwrap();
        if *state != ProcessorState::Uninitialized {
            log::warn!("batch: init() while {:?} — ignored", *state);
            return;
        }
        *state = ProcessorState::Initializing;

        let shared = Arc::clone(&self.shared);
        let handle = tokio::spawn(async move {
            loop {
                let next = {
                    let mut queue = shared.queue.lock().unwrap();
                    if queue.is_empty() {
                        None
                    } else {
                        Some(queue.remove(0))
                    }
                };

                match next {
                    Some(batch) => {
                        let result =
                            run_batch(&*shared.executor, &shared.policy, batch.id, batch.items)
                                .await;
                        // Receiver may have been dropped; both sends are
                        // best-effort.
                        let _ = shared.results_tx.send(result.clone());
                        let _ = batch.done.send(result);
                    }
                    None => shared.wake.notified().await,
                }
            }
        });

        *self.worker.lock().unwrap() = Some(handle);
        *state = ProcessorState::Ready;
        log::debug!("batch: worker started");
    }

    /// Current lifecycle state.  Reports [`ProcessorState::Error`] when the
    /// worker died unexpectedly.
    pub fn state(&self) -> ProcessorState {
        let state = *self.state.lock().unwrap();
        if state == ProcessorState::Ready {
            if let Some(handle) = self.worker.lock().unwrap().as_ref() {
                if handle.is_finished() {
                    return ProcessorState::Error;
                }
            }
        }
        state
    }

    /// Enqueue a single item as its own batch at `priority` and return a
    /// receiver for the batch's result.  Never blocks on execution; if the
    /// processor is not yet initialized the batch waits in the queue.
    pub fn add(&self, mut item: AnalysisItem, priority: i32) -> oneshot::Receiver<BatchResult> {
        item.priority = priority;
        self.enqueue(vec![item], priority)
    }

    /// Group `items` into batches of at most `batch_size` and enqueue them.
    /// Each batch's priority is the max priority of its items; one receiver
    /// is returned per batch.
    pub fn add_batch(&self, items: Vec<AnalysisItem>) -> Vec<oneshot::Receiver<BatchResult>> {
        let chunk = self.config.batch_size.max(1);
        let mut receivers = Vec::new();
        let mut items = items;
        while !items.is_empty() {
            let rest = items.split_off(items.len().min(chunk));
            let group = std::mem::replace(&mut items, rest);
            let priority = group.iter().map(|i| i.priority).max().unwrap_or(0);
            receivers.push(self.enqueue(group, priority));
        }
        receivers
    }

    fn enqueue(&self, items: Vec<AnalysisItem>, priority: i32) -> oneshot::Receiver<BatchResult> {
        let (done, rx) = oneshot::channel();
        let batch = QueuedBatch {
            id: self.shared.next_id.fetch_add(1, Ordering::Relaxed),
            priority,
            seq: self.shared.next_seq.fetch_add(1, Ordering::Relaxed),
            items,
            done,
        };

        {
            let mut queue = self.shared.queue.lock().unwrap();
            queue.push(batch);
            queue.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.seq.cmp(&b.seq)));
        }
        self.shared.wake.notify_one();
        rx
    }

    /// Broadcast receiver observing every emitted [`BatchResult`].
    pub fn subscribe(&self) -> broadcast::Receiver<BatchResult> {
        self.shared.results_tx.subscribe()
    }

    /// Execute `items` as one ad-hoc batch, bypassing the queue.  This is
    /// the same loop the worker runs; public so callers can process a batch
    /// inline and await it.
    pub async fn process(&self, items: Vec<AnalysisItem>) -> BatchResult {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        run_batch(&*self.shared.executor, &self.shared.policy, id, items).await
    }

    /// Drop every batch still waiting in the queue.  Their receivers observe
    /// channel closure.  The batch currently executing (if any) completes
    /// normally.
    pub fn clear(&self) {
        let drained = {
            let mut queue = self.shared.queue.lock().unwrap();
            std::mem::take(&mut *queue)
        };
        if !drained.is_empty() {
            log::debug!("batch: cleared {} queued batch(es)", drained.len());
        }
    }

    /// Abort the worker (cancelling any in-flight retry delay), drain the
    /// queue, and reset to `Uninitialized`.  Safe to call repeatedly.
    pub fn shutdown(&self) {
        if let Some(handle) = self.worker.lock().unwrap().take() {
            handle.abort();
        }
        self.clear();
        *self.state.lock().unwrap() = ProcessorState::Uninitialized;
        log::debug!("batch: shut down");
    }
}

impl Drop for BatchProcessor {
    fn drop(&mut self) {
        if let Some(handle) = self.worker.lock().unwrap().take() {
            handle.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// Batch execution loop
// ---------------------------------------------------------------------------

/// Run every item to a settled outcome.  Items are processed in priority
/// order (stable for ties — `sort_by` preserves insertion order); each item
/// gets up to `policy.max_attempts()` attempts with `policy.delay(n)`
/// between them.  The result covers all items — nothing is dropped.
async fn run_batch(
    executor: &dyn AnalysisExecutor,
    policy: &dyn RetryPolicy,
    batch_id: u64,
    mut items: Vec<AnalysisItem>,
) -> BatchResult {
    let started = Instant::now();
    items.sort_by(|a, b| b.priority.cmp(&a.priority));

    let max_attempts = policy.max_attempts();
    let mut results = Vec::with_capacity(items.len());

    for item in &items {
        let mut attempt = 0;
        let settled = loop {
            attempt += 1;
            match executor.execute(item).await {
                Ok(analysis) => {
                    break ItemResult {
                        item_id: item.id.clone(),
                        attempts: attempt,
                        outcome: Ok(analysis),
                    };
                }
                Err(err) if attempt < max_attempts => {
                    let delay = policy.delay(attempt);
                    log::warn!(
                        "batch {batch_id}: item {} attempt {attempt}/{max_attempts} failed \
                         ({err}); retrying in {} ms",
                        item.id,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    log::error!(
                        "batch {batch_id}: item {} failed after {attempt} attempt(s): {err}",
                        item.id
                    );
                    break ItemResult {
                        item_id: item.id.clone(),
                        attempts: attempt,
                        outcome: Err(err),
                    };
                }
            }
        };
        results.push(settled);
    }

    BatchResult {
        batch_id,
        results,
        completed_at: SystemTime::now(),
        duration: started.elapsed(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
