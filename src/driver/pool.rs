use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::worker::{run_worker, WorkerContext};

struct ActiveWorker {
    id: u64,
    retire: CancellationToken,
    handle: JoinHandle<u64>,
}

/// Result of waiting for retired workers at the end of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    pub drained: usize,
    pub aborted: usize,
}

/// Live worker set. Workers are spawned with a child token of the run token,
/// so cancelling the run retires every worker at once.
pub struct WorkerPool {
    ctx: WorkerContext,
    seed: u64,
    run_token: CancellationToken,
    active: Vec<ActiveWorker>,
    retiring: Vec<JoinHandle<u64>>,
    next_id: u64,
}

impl WorkerPool {
    pub fn new(ctx: WorkerContext, seed: u64, run_token: CancellationToken) -> Self {
        Self {
            ctx,
            seed,
            run_token,
            active: Vec::new(),
            retiring: Vec::new(),
            next_id: 0,
        }
    }

    /// Workers that have not been signaled to retire.
    pub fn active(&self) -> usize {
        self.active.len()
    }

    /// Spawn or retire workers until exactly `desired` are active. The most
    /// recently spawned workers retire first. Returns `(spawned, retired)`.
    pub fn scale_to(&mut self, desired: u32) -> (usize, usize) {
        self.reap();
        let desired = desired as usize;
        let mut spawned = 0;
        let mut retired = 0;

        while self.active.len() < desired {
            let id = self.next_id;
            self.next_id += 1;
            let retire = self.run_token.child_token();
            let handle = tokio::spawn(run_worker(id, self.seed, self.ctx.clone(), retire.clone()));
            self.active.push(ActiveWorker { id, retire, handle });
            spawned += 1;
        }

        while self.active.len() > desired {
            if let Some(worker) = self.active.pop() {
                worker.retire.cancel();
                self.retiring.push(worker.handle);
                retired += 1;
            }
        }

        (spawned, retired)
    }

    /// Drop finished handles. An active worker that finished on its own has
    /// panicked; it is removed so the next `scale_to` replaces it.
    fn reap(&mut self) {
        self.retiring.retain(|h| !h.is_finished());
        self.active.retain(|w| {
            if w.handle.is_finished() {
                warn!(worker = w.id, "worker exited unexpectedly, replacing it");
                false
            } else {
                true
            }
        });
    }

    /// Retire everyone and wait up to `timeout` for in-flight requests to
    /// finish. Workers still running after that are aborted.
    pub async fn shutdown(mut self, timeout: Duration) -> DrainReport {
        self.run_token.cancel();
        let mut handles: Vec<JoinHandle<u64>> = self.retiring;
        handles.extend(self.active.drain(..).map(|w| w.handle));

        let mut drained = 0;
        let deadline = tokio::time::Instant::now() + timeout;
        for handle in handles.iter_mut() {
            match tokio::time::timeout_at(deadline, &mut *handle).await {
                Ok(Ok(iterations)) => {
                    debug!(iterations, "worker drained");
                    drained += 1;
                }
                Ok(Err(e)) => {
                    if e.is_panic() {
                        warn!(error = %e, "worker panicked");
                    }
                    drained += 1;
                }
                Err(_) => break,
            }
        }

        let mut aborted = 0;
        for handle in handles.iter().filter(|h| !h.is_finished()) {
            handle.abort();
            aborted += 1;
        }
        if aborted > 0 {
            warn!(aborted, ?timeout, "workers did not drain in time and were aborted");
        }
        DrainReport { drained, aborted }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::CheckSet;
    use crate::domain::{Payload, RequestOutcome};
    use crate::driver::sender::RequestSender;
    use crate::metrics::MetricsCollector;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct FixedDelay(Duration);

    #[async_trait]
    impl RequestSender for FixedDelay {
        async fn send(&self, _payload: &Payload) -> RequestOutcome {
            tokio::time::sleep(self.0).await;
            RequestOutcome::response(200, self.0, None)
        }
    }

    struct Panicking;

    #[async_trait]
    impl RequestSender for Panicking {
        async fn send(&self, _payload: &Payload) -> RequestOutcome {
            panic!("sender blew up");
        }
    }

    fn pool(delay: Duration) -> (WorkerPool, Arc<MetricsCollector>) {
        pool_with(Arc::new(FixedDelay(delay)))
    }

    fn pool_with(sender: Arc<dyn RequestSender>) -> (WorkerPool, Arc<MetricsCollector>) {
        let checks = CheckSet::standard(Duration::from_millis(500));
        let metrics = Arc::new(MetricsCollector::new(checks.names()));
        let ctx = WorkerContext {
            sender,
            checks: Arc::new(checks),
            metrics: metrics.clone(),
            sleep: Duration::ZERO,
            include_timestamp: false,
        };
        (WorkerPool::new(ctx, 9, CancellationToken::new()), metrics)
    }

    async fn wait_for_live(metrics: &MetricsCollector, expected: usize) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while metrics.live_workers() != expected {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("live worker count should settle");
    }

    #[tokio::test]
    async fn test_scale_up_and_down() {
        let (mut pool, metrics) = pool(Duration::from_millis(5));

        assert_eq!(pool.scale_to(5), (5, 0));
        assert_eq!(pool.active(), 5);
        wait_for_live(&metrics, 5).await;

        assert_eq!(pool.scale_to(2), (0, 3));
        assert_eq!(pool.active(), 2);
        wait_for_live(&metrics, 2).await;

        assert_eq!(pool.scale_to(2), (0, 0));

        let report = pool.shutdown(Duration::from_secs(1)).await;
        assert_eq!(report.aborted, 0);
        assert_eq!(metrics.live_workers(), 0);
        assert_eq!(metrics.peak_workers(), 5);
    }

    #[tokio::test]
    async fn test_shutdown_aborts_stuck_workers() {
        let (mut pool, metrics) = pool(Duration::from_secs(30));
        pool.scale_to(3);
        wait_for_live(&metrics, 3).await;

        let report = pool.shutdown(Duration::from_millis(50)).await;
        assert_eq!(report, DrainReport { drained: 0, aborted: 3 });
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_panicked_workers_are_replaced() {
        let (mut pool, metrics) = pool_with(Arc::new(Panicking));
        assert_eq!(pool.scale_to(2), (2, 0));

        // Both workers die on their first request; the next scale respawns them.
        let replaced = tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                tokio::time::sleep(Duration::from_millis(10)).await;
                if pool.scale_to(2).0 == 2 {
                    break;
                }
            }
        })
        .await;
        assert!(replaced.is_ok(), "dead workers were never replaced");
        assert_eq!(pool.active(), 2);
        tokio::time::timeout(Duration::from_secs(5), async {
            while metrics.spawned_workers() < 4 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("replacement workers should start");

        pool.shutdown(Duration::from_millis(100)).await;
    }
}
