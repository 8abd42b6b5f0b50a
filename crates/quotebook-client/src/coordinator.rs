//! Single-flight coordination for token refresh
//!
//! Any number of requests can observe an expired access token at the same
//! time; only the first may trigger the refresh exchange. Later observers
//! join the same cycle and wait. One mutex guards the in-progress flag and
//! the waiter queue, so observing idle and starting the cycle is a single
//! atomic step on a multi-threaded runtime.
//!
//! The exchange itself is an opaque future supplied by the caller and runs
//! on a spawned single-owner task: it settles the cycle even if every
//! waiting caller has been dropped, and the coordinator never holds its
//! lock across the exchange.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{Mutex, oneshot};
use tracing::{debug, warn};

/// How a refresh cycle ended, fanned out to every waiter of that cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The exchange produced a new pair; replays use this access token.
    Refreshed { access: String },
    /// The exchange failed; the stored session is gone.
    SessionLost,
}

#[derive(Default)]
struct CycleState {
    in_progress: bool,
    waiters: Vec<oneshot::Sender<RefreshOutcome>>,
}

/// Shared single-flight refresh state. Cheap to clone; clones coordinate
/// with each other.
#[derive(Clone, Default)]
pub struct RefreshCoordinator {
    state: Arc<Mutex<CycleState>>,
}

impl RefreshCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the current refresh cycle, starting one if none is underway.
    ///
    /// The caller suspends until the cycle settles. `exchange` only runs
    /// when this call is the one that starts the cycle; for every other
    /// caller it is dropped unpolled.
    pub async fn await_refresh<F>(&self, exchange: F) -> RefreshOutcome
    where
        F: Future<Output = RefreshOutcome> + Send + 'static,
    {
        let rx = {
            let mut state = self.state.lock().await;
            let (tx, rx) = oneshot::channel();
            state.waiters.push(tx);

            if state.in_progress {
                debug!(waiters = state.waiters.len(), "refresh already in flight, waiting");
            } else {
                state.in_progress = true;
                debug!("starting refresh cycle");
                let shared = Arc::clone(&self.state);
                tokio::spawn(async move {
                    let outcome = exchange.await;
                    settle(&shared, outcome).await;
                });
            }
            rx
        };

        match rx.await {
            Ok(outcome) => outcome,
            // The cycle task never drops a queued sender before settling;
            // a closed channel is reported as a lost session rather than
            // left to panic a caller.
            Err(_) => {
                warn!("refresh cycle ended without settling");
                RefreshOutcome::SessionLost
            }
        }
    }

    /// Whether a refresh exchange is currently in flight.
    pub async fn is_refreshing(&self) -> bool {
        self.state.lock().await.in_progress
    }

    /// Number of callers waiting on the in-flight cycle.
    pub async fn waiting(&self) -> usize {
        self.state.lock().await.waiters.len()
    }
}

/// Resolve every waiter of the finished cycle in enqueue order and return
/// the coordinator to idle. The flag reset and queue drain happen under
/// one lock acquisition, so no caller can observe an idle coordinator with
/// a non-empty queue.
async fn settle(state: &Mutex<CycleState>, outcome: RefreshOutcome) {
    let waiters = {
        let mut state = state.lock().await;
        state.in_progress = false;
        std::mem::take(&mut state.waiters)
    };

    debug!(
        waiters = waiters.len(),
        refreshed = matches!(outcome, RefreshOutcome::Refreshed { .. }),
        "refresh cycle settled"
    );
    for tx in waiters {
        // A dropped caller just discards its slot
        let _ = tx.send(outcome.clone());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use tokio::sync::Notify;

    use super::*;

    fn refreshed(access: &str) -> RefreshOutcome {
        RefreshOutcome::Refreshed {
            access: access.into(),
        }
    }

    /// Exchange future that counts executions and waits for the release
    /// signal before settling.
    fn held_exchange(
        runs: Arc<AtomicUsize>,
        release: Arc<Notify>,
        outcome: RefreshOutcome,
    ) -> impl Future<Output = RefreshOutcome> + Send + 'static {
        async move {
            runs.fetch_add(1, Ordering::SeqCst);
            release.notified().await;
            outcome
        }
    }

    #[tokio::test]
    async fn one_exchange_for_many_waiters() {
        let coordinator = RefreshCoordinator::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let release = Arc::new(Notify::new());

        let mut handles = vec![];
        for _ in 0..5 {
            let coordinator = coordinator.clone();
            let exchange = held_exchange(runs.clone(), release.clone(), refreshed("at_2"));
            handles.push(tokio::spawn(
                async move { coordinator.await_refresh(exchange).await },
            ));
        }

        // Every caller must be queued on the one cycle before it settles
        while coordinator.waiting().await < 5 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(coordinator.is_refreshing().await);
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        release.notify_one();
        for handle in handles {
            assert_eq!(handle.await.unwrap(), refreshed("at_2"));
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn waiters_resolve_in_enqueue_order() {
        let coordinator = RefreshCoordinator::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let release = Arc::new(Notify::new());
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        let mut handles = vec![];
        for i in 0..10usize {
            let exchange = held_exchange(runs.clone(), release.clone(), refreshed("at_2"));
            handles.push({
                let coordinator = coordinator.clone();
                let order = order.clone();
                tokio::spawn(async move {
                    let outcome = coordinator.await_refresh(exchange).await;
                    order.lock().unwrap().push(i);
                    outcome
                })
            });
            // Queue one waiter at a time so the enqueue order is known
            while coordinator.waiting().await < i + 1 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        }

        release.notify_one();
        for handle in handles {
            assert_eq!(handle.await.unwrap(), refreshed("at_2"));
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
    }

    #[tokio::test]
    async fn mid_cycle_joiner_does_not_start_a_second_exchange() {
        let coordinator = RefreshCoordinator::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let release = Arc::new(Notify::new());

        let first = {
            let coordinator = coordinator.clone();
            let exchange = held_exchange(runs.clone(), release.clone(), refreshed("at_2"));
            tokio::spawn(async move { coordinator.await_refresh(exchange).await })
        };

        while !coordinator.is_refreshing().await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        // The joiner's exchange would bump the counter if it ever ran
        let late = {
            let coordinator = coordinator.clone();
            let exchange = held_exchange(runs.clone(), release.clone(), refreshed("at_9"));
            tokio::spawn(async move { coordinator.await_refresh(exchange).await })
        };

        while coordinator.waiting().await < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        release.notify_one();
        assert_eq!(first.await.unwrap(), refreshed("at_2"));
        assert_eq!(late.await.unwrap(), refreshed("at_2"));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_cycle_resolves_every_waiter() {
        let coordinator = RefreshCoordinator::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let release = Arc::new(Notify::new());

        let mut handles = vec![];
        for _ in 0..3 {
            let coordinator = coordinator.clone();
            let exchange = held_exchange(runs.clone(), release.clone(), RefreshOutcome::SessionLost);
            handles.push(tokio::spawn(
                async move { coordinator.await_refresh(exchange).await },
            ));
        }

        while coordinator.waiting().await < 3 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        release.notify_one();
        for handle in handles {
            assert_eq!(handle.await.unwrap(), RefreshOutcome::SessionLost);
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn coordinator_returns_to_idle_after_each_cycle() {
        let coordinator = RefreshCoordinator::new();
        let runs = Arc::new(AtomicUsize::new(0));

        let outcome = {
            let runs = runs.clone();
            coordinator
                .await_refresh(async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                    refreshed("at_2")
                })
                .await
        };
        assert_eq!(outcome, refreshed("at_2"));
        assert!(!coordinator.is_refreshing().await);
        assert_eq!(coordinator.waiting().await, 0);

        // A fresh cycle runs a fresh exchange
        let outcome = {
            let runs = runs.clone();
            coordinator
                .await_refresh(async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                    refreshed("at_3")
                })
                .await
        };
        assert_eq!(outcome, refreshed("at_3"));
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn dropped_waiter_does_not_stall_the_cycle() {
        let coordinator = RefreshCoordinator::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let release = Arc::new(Notify::new());

        let first = {
            let coordinator = coordinator.clone();
            let exchange = held_exchange(runs.clone(), release.clone(), refreshed("at_2"));
            tokio::spawn(async move { coordinator.await_refresh(exchange).await })
        };

        while !coordinator.is_refreshing().await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let doomed = {
            let coordinator = coordinator.clone();
            let exchange = held_exchange(runs.clone(), release.clone(), refreshed("at_9"));
            tokio::spawn(async move { coordinator.await_refresh(exchange).await })
        };
        while coordinator.waiting().await < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        doomed.abort();

        release.notify_one();
        assert_eq!(first.await.unwrap(), refreshed("at_2"));
        assert!(!coordinator.is_refreshing().await);
        assert_eq!(coordinator.waiting().await, 0);
    }
}
