//! Bounded task admission.
//!
//! At most `max_pending` tasks run at once; overflow waits in a FIFO queue
//! of at most `max_queue_size` entries and anything beyond that is dropped
//! without being polled. Each running task races a timer: when the timer
//! wins the slot is released and the task keeps running detached, its
//! result discarded.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{oneshot, Notify};

use crate::error::{Error, Result};

pub const DEFAULT_MAX_PENDING: usize = 30;
pub const DEFAULT_TASK_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 100;

pub type TaskFuture = Pin<Box<dyn Future<Output = Result<()>> + Send + 'static>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimiterConfig {
    pub max_pending: usize,
    pub task_timeout: Duration,
    pub max_queue_size: usize,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            max_pending: DEFAULT_MAX_PENDING,
            task_timeout: Duration::from_millis(DEFAULT_TASK_TIMEOUT_MS),
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
        }
    }
}

/// How a task ended.
#[derive(Debug)]
pub enum TaskStatus {
    Completed,
    Failed(Error),
    /// The timer fired first. The task may still be running.
    TimedOut,
}

/// Resolves once the scheduled task settles.
#[derive(Debug)]
pub struct TaskHandle {
    rx: oneshot::Receiver<TaskStatus>,
}

impl TaskHandle {
    pub async fn settled(self) -> TaskStatus {
        self.rx
            .await
            .unwrap_or_else(|_| TaskStatus::Failed(Error::TaskAborted("limiter went away".to_string())))
    }
}

#[derive(Debug)]
pub enum ScheduleOutcome {
    Started(TaskHandle),
    Queued(TaskHandle),
    Dropped,
}

impl ScheduleOutcome {
    pub fn is_dropped(&self) -> bool {
        matches!(self, ScheduleOutcome::Dropped)
    }

    pub fn into_handle(self) -> Option<TaskHandle> {
        match self {
            ScheduleOutcome::Started(handle) | ScheduleOutcome::Queued(handle) => Some(handle),
            ScheduleOutcome::Dropped => None,
        }
    }
}

/// Running totals since construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LimiterStats {
    pub scheduled: u64,
    pub completed: u64,
    pub failed: u64,
    pub timed_out: u64,
    pub dropped: u64,
}

struct Job {
    work: TaskFuture,
    done: oneshot::Sender<TaskStatus>,
    enqueued_at: Instant,
}

struct LimiterState {
    pending: usize,
    queue: VecDeque<Job>,
    stats: LimiterStats,
}

struct Inner {
    config: LimiterConfig,
    state: Mutex<LimiterState>,
    idle: Notify,
}

/// Cheap to clone; clones share one admission state.
#[derive(Clone)]
pub struct TaskLimiter {
    inner: Arc<Inner>,
}

impl TaskLimiter {
    pub fn new(config: LimiterConfig) -> Self {
        log::info!(
            "TASK_LIMITER_INIT max_pending={} task_timeout_ms={} max_queue_size={}",
            config.max_pending,
            config.task_timeout.as_millis(),
            config.max_queue_size
        );
        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(LimiterState {
                    pending: 0,
                    queue: VecDeque::new(),
                    stats: LimiterStats::default(),
                }),
                idle: Notify::new(),
            }),
        }
    }

    pub fn config(&self) -> &LimiterConfig {
        &self.inner.config
    }

    /// Admit `task`. Must be called from within a tokio runtime.
    pub fn schedule<F>(&self, task: F) -> ScheduleOutcome
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let (done, rx) = oneshot::channel();
        let job = Job {
            work: Box::pin(task),
            done,
            enqueued_at: Instant::now(),
        };

        let mut state = self.inner.state.lock();
        state.stats.scheduled += 1;

        if state.pending < self.inner.config.max_pending {
            state.pending += 1;
            drop(state);
            self.inner.start(job);
            ScheduleOutcome::Started(TaskHandle { rx })
        } else if state.queue.len() < self.inner.config.max_queue_size {
            state.queue.push_back(job);
            log::debug!(
                "TASK_QUEUED pending={} queued={}",
                state.pending,
                state.queue.len()
            );
            ScheduleOutcome::Queued(TaskHandle { rx })
        } else {
            state.stats.dropped += 1;
            log::warn!(
                "TASK_DROPPED pending={} queued={} dropped_total={}",
                state.pending,
                state.queue.len(),
                state.stats.dropped
            );
            ScheduleOutcome::Dropped
        }
    }

    pub fn pending_count(&self) -> usize {
        self.inner.state.lock().pending
    }

    pub fn queue_length(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    pub fn stats(&self) -> LimiterStats {
        self.inner.state.lock().stats
    }

    pub fn is_idle(&self) -> bool {
        let state = self.inner.state.lock();
        state.pending == 0 && state.queue.is_empty()
    }

    /// Resolve once nothing is running or queued. With `max_pending == 0`
    /// and a non-empty queue this never resolves.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_idle() {
                return;
            }
            notified.await;
        }
    }
}

impl Inner {
    fn start(self: &Arc<Self>, job: Job) {
        let inner = Arc::clone(self);
        let Job {
            work,
            done,
            enqueued_at,
        } = job;
        let waited = enqueued_at.elapsed();

        tokio::spawn(async move {
            // Dropping the JoinHandle on timeout detaches the task.
            let running = tokio::spawn(work);
            let status = match tokio::time::timeout(inner.config.task_timeout, running).await {
                Ok(Ok(Ok(()))) => TaskStatus::Completed,
                Ok(Ok(Err(err))) => TaskStatus::Failed(err),
                Ok(Err(join_err)) => TaskStatus::Failed(Error::TaskAborted(join_err.to_string())),
                Err(_) => {
                    log::warn!(
                        "TASK_TIMED_OUT timeout_ms={} waited_ms={}",
                        inner.config.task_timeout.as_millis(),
                        waited.as_millis()
                    );
                    TaskStatus::TimedOut
                }
            };
            inner.settle(&status);
            // The caller may have discarded its handle.
            let _ = done.send(status);
        });
    }

    fn settle(self: &Arc<Self>, status: &TaskStatus) {
        let (next, idle) = {
            let mut state = self.state.lock();
            state.pending = state.pending.saturating_sub(1);
            match status {
                TaskStatus::Completed => state.stats.completed += 1,
                TaskStatus::Failed(_) => state.stats.failed += 1,
                TaskStatus::TimedOut => state.stats.timed_out += 1,
            }
            let next = state.queue.pop_front();
            if next.is_some() {
                state.pending += 1;
            }
            (next, state.pending == 0 && state.queue.is_empty())
        };

        if let Some(job) = next {
            self.start(job);
        }
        if idle {
            self.idle.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn limiter(max_pending: usize, max_queue_size: usize) -> TaskLimiter {
        TaskLimiter::new(LimiterConfig {
            max_pending,
            task_timeout: Duration::from_millis(DEFAULT_TASK_TIMEOUT_MS),
            max_queue_size,
        })
    }

    #[tokio::test]
    async fn test_pending_then_queue_then_drop() {
        let limiter = limiter(2, 3);
        let (release, gate) = tokio::sync::watch::channel(false);
        let ran = Arc::new(AtomicUsize::new(0));

        let mut outcomes = Vec::new();
        for _ in 0..7 {
            let mut gate = gate.clone();
            let ran = Arc::clone(&ran);
            outcomes.push(limiter.schedule(async move {
                ran.fetch_add(1, Ordering::SeqCst);
                let _ = gate.wait_for(|open| *open).await;
                Ok(())
            }));
        }

        assert!(matches!(outcomes[0], ScheduleOutcome::Started(_)));
        assert!(matches!(outcomes[1], ScheduleOutcome::Started(_)));
        assert!(matches!(outcomes[2], ScheduleOutcome::Queued(_)));
        assert!(matches!(outcomes[4], ScheduleOutcome::Queued(_)));
        assert!(outcomes[5].is_dropped());
        assert!(outcomes[6].is_dropped());
        assert_eq!(limiter.pending_count(), 2);
        assert_eq!(limiter.queue_length(), 3);

        release.send(true).unwrap();
        limiter.wait_idle().await;

        assert_eq!(ran.load(Ordering::SeqCst), 5);
        let stats = limiter.stats();
        assert_eq!(stats.scheduled, 7);
        assert_eq!(stats.completed, 5);
        assert_eq!(stats.dropped, 2);
    }

    #[tokio::test]
    async fn test_dropped_task_never_runs() {
        let limiter = limiter(1, 0);
        let (release, gate) = oneshot::channel::<()>();
        let second_ran = Arc::new(AtomicBool::new(false));

        let first = limiter.schedule(async move {
            let _ = gate.await;
            Ok(())
        });
        let flag = Arc::clone(&second_ran);
        let second = limiter.schedule(async move {
            flag.store(true, Ordering::SeqCst);
            Ok(())
        });

        assert!(matches!(first, ScheduleOutcome::Started(_)));
        assert!(second.is_dropped());

        release.send(()).unwrap();
        limiter.wait_idle().await;
        assert!(!second_ran.load(Ordering::SeqCst));
        assert_eq!(limiter.stats().dropped, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_releases_slot_and_detaches() {
        let limiter = TaskLimiter::new(LimiterConfig {
            max_pending: 1,
            task_timeout: Duration::from_millis(100),
            max_queue_size: 1,
        });
        let finished = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&finished);
        let slow = limiter
            .schedule(async move {
                tokio::time::sleep(Duration::from_secs(10)).await;
                flag.store(true, Ordering::SeqCst);
                Ok(())
            })
            .into_handle()
            .unwrap();
        let next = limiter.schedule(async { Ok(()) }).into_handle().unwrap();

        assert!(matches!(slow.settled().await, TaskStatus::TimedOut));
        assert!(matches!(next.settled().await, TaskStatus::Completed));
        assert!(!finished.load(Ordering::SeqCst));

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert!(finished.load(Ordering::SeqCst));

        let stats = limiter.stats();
        assert_eq!(stats.timed_out, 1);
        assert_eq!(stats.completed, 1);
        assert_eq!(limiter.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_queue_is_fifo() {
        let limiter = limiter(1, 10);
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..5 {
            let order = Arc::clone(&order);
            limiter.schedule(async move {
                order.lock().push(i);
                Ok(())
            });
        }
        limiter.wait_idle().await;
        assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_failures_are_counted() {
        let limiter = limiter(4, 4);
        let handle = limiter
            .schedule(async { Err(Error::Persistence("down".to_string())) })
            .into_handle()
            .unwrap();

        assert!(matches!(
            handle.settled().await,
            TaskStatus::Failed(Error::Persistence(_))
        ));
        limiter.wait_idle().await;
        assert_eq!(limiter.stats().failed, 1);
        assert_eq!(limiter.stats().completed, 0);
    }

    #[tokio::test]
    async fn test_zero_pending_queues_everything() {
        let limiter = limiter(0, 2);
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);

        let outcome = limiter.schedule(async move {
            flag.store(true, Ordering::SeqCst);
            Ok(())
        });
        assert!(matches!(outcome, ScheduleOutcome::Queued(_)));
        assert_eq!(limiter.pending_count(), 0);
        assert_eq!(limiter.queue_length(), 1);

        tokio::task::yield_now().await;
        assert!(!ran.load(Ordering::SeqCst));
        assert!(!limiter.is_idle());
    }

    #[tokio::test]
    async fn test_wait_idle_on_fresh_limiter() {
        limiter(1, 1).wait_idle().await;
    }
}
