//! Unit tests for the bounded execution pool.
//!
//! Covers the concurrency ceiling, FIFO start order, occupancy snapshots,
//! failure and panic isolation, and drain semantics.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::FutureExt;
use tokio::sync::oneshot;

use hook_runner::config::PoolConfig;
use hook_runner::pool::{BoundedPool, PoolStatus};
use hook_runner::AppError;

const SETTLE: Duration = Duration::from_secs(5);

/// Running count never exceeds capacity, even with a burst of submissions.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn running_count_never_exceeds_capacity() {
    let pool = BoundedPool::new(2);
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            pool.execute(move || async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            })
        })
        .collect();

    assert!(pool.status().active <= 2);
    for handle in handles {
        handle.await.expect("task must complete");
    }

    let peak = peak.load(Ordering::SeqCst);
    assert!(peak <= 2, "peak concurrency {peak} exceeded capacity");
    assert!(peak >= 1);
}

/// With capacity one, queued tasks start in submission order.
#[tokio::test]
async fn queued_tasks_start_in_submission_order() {
    let pool = BoundedPool::new(1);
    let order = Arc::new(Mutex::new(Vec::new()));
    let (gate_tx, gate_rx) = oneshot::channel::<()>();

    let blocker = {
        let order = Arc::clone(&order);
        pool.execute(move || async move {
            order.lock().unwrap().push(0);
            let _ = gate_rx.await;
        })
    };

    let handles: Vec<_> = (1..=4)
        .map(|i| {
            let order = Arc::clone(&order);
            pool.execute(move || async move {
                order.lock().unwrap().push(i);
            })
        })
        .collect();

    assert_eq!(
        pool.status(),
        PoolStatus {
            active: 1,
            queued: 4,
            capacity: 1
        }
    );

    gate_tx.send(()).unwrap();
    blocker.await.unwrap();
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
}

/// A mid-run snapshot shows one running and one queued task.
#[tokio::test]
async fn status_reports_active_queued_and_capacity() {
    let pool = BoundedPool::new(1);
    assert_eq!(
        pool.status(),
        PoolStatus {
            active: 0,
            queued: 0,
            capacity: 1
        }
    );

    let (gate_tx, gate_rx) = oneshot::channel::<()>();
    let first = pool.execute(move || async move {
        let _ = gate_rx.await;
    });
    let second = pool.execute(|| async {});

    assert_eq!(
        pool.status(),
        PoolStatus {
            active: 1,
            queued: 1,
            capacity: 1
        }
    );

    gate_tx.send(()).unwrap();
    first.await.unwrap();
    second.await.unwrap();
    pool.drain().await;

    assert_eq!(pool.status().active, 0);
    assert_eq!(pool.status().queued, 0);
}

/// A task's own error is delivered unchanged and frees its slot.
#[tokio::test]
async fn failing_task_does_not_block_the_next() {
    let pool = BoundedPool::new(1);

    let failing = pool.execute(|| async { Err::<u32, _>(AppError::Acp("agent exploded".into())) });
    let next = pool.execute(|| async { Ok::<u32, AppError>(7) });

    let failed = failing.await.expect("no panic");
    assert!(matches!(failed, Err(AppError::Acp(ref msg)) if msg == "agent exploded"));
    assert_eq!(next.await.expect("no panic").expect("task ok"), 7);
}

/// A panicking task surfaces as `AppError::Pool` and still frees its slot.
#[tokio::test]
async fn panicking_task_is_isolated() {
    let pool = BoundedPool::new(1);

    let panicking = pool.execute(|| async {
        panic!("task blew up");
    });
    let next = pool.execute(|| async { "still running" });

    let err = panicking.await.unwrap_err();
    assert!(matches!(err, AppError::Pool(_)), "{err}");
    assert_eq!(next.await.unwrap(), "still running");

    tokio::time::timeout(SETTLE, pool.drain())
        .await
        .expect("pool must become idle after a panic");
    assert_eq!(pool.status().active, 0);
}

/// Draining an idle pool returns immediately, and drain is idempotent.
#[tokio::test]
async fn drain_on_idle_pool_returns_immediately() {
    let pool = BoundedPool::new(3);

    tokio::time::timeout(Duration::from_millis(100), pool.drain())
        .await
        .expect("idle drain must not wait");
    tokio::time::timeout(Duration::from_millis(100), pool.drain())
        .await
        .expect("second drain must not wait");
}

/// Concurrent drain callers are all released when the last task settles.
#[tokio::test]
async fn concurrent_drains_resolve_together() {
    let pool = BoundedPool::new(1);
    let (gate_tx, gate_rx) = oneshot::channel::<()>();

    let _running = pool.execute(move || async move {
        let _ = gate_rx.await;
    });
    let _queued = pool.execute(|| async {});

    let first = tokio::spawn({
        let pool = pool.clone();
        async move { pool.drain().await }
    });
    let second = tokio::spawn({
        let pool = pool.clone();
        async move { pool.drain().await }
    });

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!first.is_finished(), "drain must wait for running work");

    gate_tx.send(()).unwrap();
    tokio::time::timeout(SETTLE, first).await.unwrap().unwrap();
    tokio::time::timeout(SETTLE, second).await.unwrap().unwrap();
    assert_eq!(pool.status().queued, 0);
}

/// A drain pending across an idle moment settles even when new work is
/// admitted before the drainer runs again.
#[tokio::test]
async fn drain_settles_on_an_idle_moment_that_was_immediately_refilled() {
    let pool = BoundedPool::new(1);
    let (first_tx, first_rx) = oneshot::channel::<()>();
    let first = pool.execute(move || async move {
        let _ = first_rx.await;
    });

    let mut drain = Box::pin(pool.drain());
    assert!(
        (&mut drain).now_or_never().is_none(),
        "drain must wait while work is running"
    );

    first_tx.send(()).unwrap();
    first.await.unwrap();

    let (second_tx, second_rx) = oneshot::channel::<()>();
    let second = pool.execute(move || async move {
        let _ = second_rx.await;
    });
    assert_eq!(pool.status().active, 1);

    tokio::time::timeout(SETTLE, drain)
        .await
        .expect("drainer present at the idle moment must settle");

    second_tx.send(()).unwrap();
    second.await.unwrap();
}

/// Work submitted after a drain completed is accepted normally.
#[tokio::test]
async fn pool_accepts_work_after_drain() {
    let pool = BoundedPool::new(2);

    pool.execute(|| async { 1 }).await.unwrap();
    pool.drain().await;

    assert_eq!(pool.execute(|| async { 2 }).await.unwrap(), 2);
}

/// Dropping a handle detaches the task; it still runs to completion.
#[tokio::test]
async fn dropped_handle_does_not_cancel_work() {
    let pool = BoundedPool::new(1);
    let done = Arc::new(AtomicUsize::new(0));

    {
        let done = Arc::clone(&done);
        drop(pool.execute(move || async move {
            done.fetch_add(1, Ordering::SeqCst);
        }));
    }

    tokio::time::timeout(SETTLE, pool.drain()).await.unwrap();
    assert_eq!(done.load(Ordering::SeqCst), 1);
}

#[test]
fn zero_capacity_is_clamped_to_one() {
    assert_eq!(BoundedPool::new(0).capacity(), 1);
}

#[test]
fn capacity_comes_from_config() {
    let pool = BoundedPool::from_config(&PoolConfig {
        max_concurrent_actions: 5,
    });
    assert_eq!(pool.capacity(), 5);
}
