//! Bounded execution pool.
//!
//! Admits asynchronous work up to a fixed concurrency ceiling and queues the
//! overflow in submission order. The pool is generic: it knows nothing about
//! what its tasks do.
//!
//! # Admission
//!
//! [`BoundedPool::execute`] decides synchronously, at submission time,
//! whether a task starts now or waits. Waiting tasks hold a one-shot
//! admission ticket in a FIFO queue. When a running task settles (success,
//! failure, or panic) its slot is handed directly to the oldest ticket, so
//! the running count never exceeds capacity and queued tasks start in the
//! exact order they were submitted.
//!
//! # Quiescence
//!
//! Every transition to idle (no running and no queued tasks) bumps a
//! counter published on a [`watch`] channel. A [`BoundedPool::drain`]
//! caller waits for the counter to move past the value it saw on entry, so
//! it settles even if new work is admitted before it is next polled.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use serde::Serialize;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::PoolConfig;
use crate::{AppError, Result};

/// Point-in-time pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    /// Tasks currently running.
    pub active: usize,
    /// Tasks waiting for a slot.
    pub queued: usize,
    /// Maximum concurrently running tasks.
    pub capacity: usize,
}

struct PoolState {
    active: usize,
    queue: VecDeque<oneshot::Sender<()>>,
}

impl PoolState {
    fn is_idle(&self) -> bool {
        self.active == 0 && self.queue.is_empty()
    }
}

struct PoolInner {
    capacity: usize,
    state: Mutex<PoolState>,
    idle_epoch: watch::Sender<u64>,
}

impl PoolInner {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        // Critical sections never panic, so a poisoned lock still holds
        // consistent counters.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hand the finished task's slot to the next queued task, or free it.
    fn release(&self) {
        let mut state = self.lock();

        while let Some(ticket) = state.queue.pop_front() {
            if ticket.send(()).is_ok() {
                debug!(
                    active = state.active,
                    queued = state.queue.len(),
                    "pool: slot handed to queued task"
                );
                return;
            }
            // The waiting task was dropped by a runtime shutdown.
        }

        state.active = state.active.saturating_sub(1);
        if state.is_idle() {
            self.idle_epoch
                .send_modify(|epoch| *epoch = epoch.wrapping_add(1));
            debug!("pool: idle");
        }
    }
}

/// Releases a running slot when dropped, including on panic.
struct SlotGuard {
    inner: Arc<PoolInner>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.inner.release();
    }
}

enum Admission {
    Immediate,
    Queued(oneshot::Receiver<()>),
}

/// Concurrency-limiting admission controller for asynchronous work.
///
/// Cloning yields another handle to the same pool.
#[derive(Clone)]
pub struct BoundedPool {
    inner: Arc<PoolInner>,
}

impl BoundedPool {
    /// Create a pool running at most `capacity` tasks at once.
    ///
    /// A capacity of zero is clamped to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        if capacity == 0 {
            warn!("pool capacity 0 requested, using 1");
        }
        let (idle_epoch, _) = watch::channel(0);
        Self {
            inner: Arc::new(PoolInner {
                capacity: capacity.max(1),
                state: Mutex::new(PoolState {
                    active: 0,
                    queue: VecDeque::new(),
                }),
                idle_epoch,
            }),
        }
    }

    /// Create a pool sized from configuration.
    #[must_use]
    pub fn from_config(config: &PoolConfig) -> Self {
        Self::new(config.max_concurrent_actions)
    }

    /// Submit a task.
    ///
    /// The task starts immediately when a slot is free, otherwise after every
    /// earlier-queued task has started. Work proceeds whether or not the
    /// returned handle is polled; dropping the handle detaches the task.
    ///
    /// Must be called within a Tokio runtime.
    pub fn execute<F, Fut, T>(&self, task: F) -> PoolHandle<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let admission = self.admit();
        let inner = Arc::clone(&self.inner);

        let join = tokio::spawn(async move {
            if let Admission::Queued(ticket) = admission {
                // A ticket is only dropped unsent when the pool's queue is
                // torn down, which cannot happen while `inner` is held here.
                let _ = ticket.await;
            }
            let _slot = SlotGuard { inner };
            task().await
        });

        PoolHandle { join }
    }

    /// Snapshot of running and queued counts.
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        let state = self.inner.lock();
        PoolStatus {
            active: state.active,
            queued: state.queue.len(),
            capacity: self.inner.capacity,
        }
    }

    /// Maximum concurrently running tasks.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Wait until no task is running or queued.
    ///
    /// Resolves immediately on an idle pool. Any number of callers may wait
    /// concurrently; all are released by the same transition to idle.
    pub async fn drain(&self) {
        // Subscribe before checking, so an idle transition in between still
        // marks the receiver as changed.
        let mut idle_rx = self.inner.idle_epoch.subscribe();
        let idle = self.inner.lock().is_idle();
        if idle {
            return;
        }
        // The sender lives in `inner`, which `self` keeps alive.
        let _ = idle_rx.changed().await;
    }

    fn admit(&self) -> Admission {
        let mut state = self.inner.lock();

        if state.active < self.inner.capacity {
            state.active += 1;
            debug!(active = state.active, "pool: task admitted");
            Admission::Immediate
        } else {
            let (tx, rx) = oneshot::channel();
            state.queue.push_back(tx);
            debug!(
                active = state.active,
                queued = state.queue.len(),
                "pool: task queued"
            );
            Admission::Queued(rx)
        }
    }
}

impl std::fmt::Debug for BoundedPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedPool")
            .field("status", &self.status())
            .finish()
    }
}

/// Completion handle for a pooled task.
///
/// Resolves to the task's own output. A failing task's error is part of
/// that output and is delivered unchanged; the outer error is
/// [`AppError::Pool`] only when the task panicked or the runtime shut down
/// before it settled.
#[derive(Debug)]
pub struct PoolHandle<T> {
    join: JoinHandle<T>,
}

impl<T> Future for PoolHandle<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.join).poll(cx).map(|joined| {
            joined.map_err(|err| AppError::Pool(format!("pooled task failed: {err}")))
        })
    }
}
