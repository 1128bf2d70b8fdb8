//! Bounded concurrent executor of queued jobs.
//!
//! Jobs are admitted FIFO. A single dispatcher task hands job ids to the
//! executor whenever `active < concurrency`; concurrency is adjustable at
//! runtime between 1 and the configured maximum. Shrinking never cancels
//! in-flight work, the pool just stops dispatching until enough jobs drain.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use gifpress_events::{EventBus, QueueStatusPayload};

/// Executes one job end to end. The production implementation is
/// [`JobRunner`](crate::engine::JobRunner); tests substitute stubs.
#[async_trait::async_trait]
pub trait JobExecutor: Send + Sync + 'static {
    async fn execute(&self, job_id: String);
}

struct PoolState {
    concurrency: usize,
    active: usize,
    queue: VecDeque<String>,
}

/// The bounded worker pool. Shared via `Arc` between the HTTP layer
/// (submit, reconfigure, status) and its own dispatcher task.
pub struct WorkerPool {
    state: Mutex<PoolState>,
    notify: Notify,
    max_concurrency: usize,
    executor: Arc<dyn JobExecutor>,
    bus: Arc<EventBus>,
}

impl WorkerPool {
    pub fn new(
        executor: Arc<dyn JobExecutor>,
        bus: Arc<EventBus>,
        default_concurrency: usize,
        max_concurrency: usize,
    ) -> Arc<Self> {
        let max_concurrency = max_concurrency.max(1);
        Arc::new(Self {
            state: Mutex::new(PoolState {
                concurrency: default_concurrency.clamp(1, max_concurrency),
                active: 0,
                queue: VecDeque::new(),
            }),
            notify: Notify::new(),
            max_concurrency,
            executor,
            bus,
        })
    }

    /// Enqueue a job. Returns as soon as the job is admitted, not when it
    /// starts.
    pub fn submit(&self, job_id: String) {
        {
            let mut state = self.state.lock().unwrap();
            state.queue.push_back(job_id);
        }
        self.notify.notify_one();
        self.bus.publish_queue(self.status());
    }

    /// Adjust the worker count, clamped to `1..=max`. In-flight jobs are
    /// never cancelled.
    pub fn set_concurrency(&self, concurrency: usize) -> QueueStatusPayload {
        {
            let mut state = self.state.lock().unwrap();
            state.concurrency = concurrency.clamp(1, self.max_concurrency);
        }
        self.notify.notify_one();
        let status = self.status();
        self.bus.publish_queue(status);
        status
    }

    /// Current gauges: `active` = executing now, `pending` = admitted but
    /// not yet started.
    pub fn status(&self) -> QueueStatusPayload {
        let state = self.state.lock().unwrap();
        QueueStatusPayload {
            concurrency: state.concurrency,
            active: state.active,
            pending: state.queue.len(),
        }
    }

    /// The configured upper bound for [`set_concurrency`](Self::set_concurrency).
    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Spawn the dispatcher task. It runs until the token is cancelled;
    /// jobs already handed to the executor finish on their own tasks.
    pub fn start(self: &Arc<Self>, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        let pool = Arc::clone(self);
        tokio::spawn(async move {
            tracing::info!(
                concurrency = pool.status().concurrency,
                max = pool.max_concurrency,
                "Worker pool started",
            );
            loop {
                let next = {
                    let mut state = pool.state.lock().unwrap();
                    if state.active < state.concurrency {
                        state.queue.pop_front().map(|id| {
                            state.active += 1;
                            id
                        })
                    } else {
                        None
                    }
                };

                match next {
                    Some(job_id) => {
                        pool.bus.publish_queue(pool.status());
                        let worker = Arc::clone(&pool);
                        tokio::spawn(async move {
                            worker.executor.execute(job_id).await;
                            {
                                let mut state = worker.state.lock().unwrap();
                                state.active -= 1;
                            }
                            worker.notify.notify_one();
                            worker.bus.publish_queue(worker.status());
                        });
                    }
                    None => {
                        tokio::select! {
                            _ = cancel.cancelled() => {
                                tracing::info!("Worker pool dispatcher shutting down");
                                break;
                            }
                            _ = pool.notify.notified() => {}
                        }
                    }
                }
            }
        })
    }
}
