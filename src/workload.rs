use std::sync::Arc;
use std::time::Duration;

use rand::distributions::Alphanumeric;
use rand::{Rng, thread_rng};
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::barrier::Barrier;
use crate::config::WorkloadConfig;
use crate::store::{StoreClient, StoreError};
use crate::types::{LocalMeasurement, now_millis};

#[derive(Debug, Error)]
pub enum WorkloadError {
    #[error("worker {worker} failed writing {key}: {source}")]
    Write {
        worker: usize,
        key: String,
        #[source]
        source: StoreError,
    },
    #[error("load worker panicked: {0}")]
    WorkerPanicked(String),
}

/// Key written by `worker` for its `op`-th write. Unique per (worker, op).
pub fn bench_key(worker: usize, op: usize) -> String {
    format!("benchmark.set.{worker}.{op}")
}

/// Random alphanumeric payload of `size` bytes.
pub fn random_payload(size: usize) -> Vec<u8> {
    thread_rng().sample_iter(&Alphanumeric).take(size).collect()
}

/// Run `plan.workers` concurrent workers against `store` and measure the span.
///
/// The barrier is raised once per worker and each worker signals it after its
/// last write; the end timestamp is taken as soon as the barrier clears. The
/// first failing write aborts the remaining workers and leaves the barrier
/// phase unbalanced, so a failed run must not reuse the barrier.
pub async fn run_workers(
    barrier: &Arc<Barrier>,
    plan: &WorkloadConfig,
    store: Arc<dyn StoreClient>,
) -> Result<LocalMeasurement, WorkloadError> {
    barrier.add(plan.workers as u64);

    let ts_begin = now_millis();
    let mut tasks = JoinSet::new();
    for worker in 0..plan.workers {
        let barrier = barrier.clone();
        let store = store.clone();
        let ops = plan.ops_per_worker;
        let size = plan.payload_size;
        let ttl = plan.ttl;
        tasks.spawn(async move {
            client_run(worker, ops, size, ttl, store.as_ref()).await?;
            barrier.done();
            Ok::<(), WorkloadError>(())
        });
    }

    if let Err(err) = wait_for_workers(barrier, &mut tasks).await {
        tasks.shutdown().await;
        return Err(err);
    }
    let ts_end = now_millis();

    let measurement = LocalMeasurement {
        total_ops: plan.total_ops(),
        ts_begin,
        ts_end,
    };
    info!(
        workers = plan.workers,
        total_ops = measurement.total_ops,
        elapsed_ms = ts_end.saturating_sub(ts_begin),
        "load workers finished"
    );
    Ok(measurement)
}

async fn wait_for_workers(
    barrier: &Barrier,
    tasks: &mut JoinSet<Result<(), WorkloadError>>,
) -> Result<(), WorkloadError> {
    loop {
        tokio::select! {
            _ = barrier.wait() => return Ok(()),
            joined = tasks.join_next() => match joined {
                Some(Ok(Ok(()))) => {}
                Some(Ok(Err(err))) => return Err(err),
                Some(Err(join_err)) => {
                    return Err(WorkloadError::WorkerPanicked(join_err.to_string()));
                }
                None => {
                    barrier.wait().await;
                    return Ok(());
                }
            },
        }
    }
}

async fn client_run(
    worker: usize,
    ops: usize,
    size: usize,
    ttl: Option<Duration>,
    store: &dyn StoreClient,
) -> Result<(), WorkloadError> {
    // One payload per worker, reused for every write.
    let value = random_payload(size);
    for op in 0..ops {
        let key = bench_key(worker, op);
        store
            .write(&key, &value, ttl)
            .await
            .map_err(|source| WorkloadError::Write {
                worker,
                key,
                source,
            })?;
    }
    debug!(worker, ops, "worker done");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    use super::*;
    use crate::store::InMemoryStore;

    /// Records every key and payload it receives.
    #[derive(Default)]
    struct RecordingStore {
        writes: Mutex<Vec<(String, Vec<u8>)>>,
    }

    #[async_trait::async_trait]
    impl StoreClient for RecordingStore {
        async fn write(
            &self,
            key: &str,
            value: &[u8],
            _ttl: Option<Duration>,
        ) -> Result<(), StoreError> {
            self.writes
                .lock()
                .unwrap()
                .push((key.to_string(), value.to_vec()));
            Ok(())
        }
    }

    /// Fails the n-th write it sees.
    struct FailingStore {
        fail_at: usize,
        seen: std::sync::atomic::AtomicUsize,
    }

    #[async_trait::async_trait]
    impl StoreClient for FailingStore {
        async fn write(
            &self,
            _key: &str,
            _value: &[u8],
            _ttl: Option<Duration>,
        ) -> Result<(), StoreError> {
            let seen = self.seen.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if seen == self.fail_at {
                return Err(StoreError::Rejected("injected".into()));
            }
            Ok(())
        }
    }

    fn plan(workers: usize, ops_per_worker: usize, payload_size: usize) -> WorkloadConfig {
        WorkloadConfig {
            workers,
            ops_per_worker,
            payload_size,
            ttl: None,
        }
    }

    #[test]
    fn payload_has_requested_size() {
        let payload = random_payload(64);
        assert_eq!(payload.len(), 64);
        assert!(payload.iter().all(|b| b.is_ascii_alphanumeric()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn issues_workers_times_ops_writes_with_distinct_keys() {
        for (workers, ops) in [(1, 1), (3, 7), (8, 25)] {
            let store = Arc::new(RecordingStore::default());
            let barrier = Arc::new(Barrier::new());

            let measurement = run_workers(&barrier, &plan(workers, ops, 16), store.clone())
                .await
                .unwrap();

            let writes = store.writes.lock().unwrap();
            assert_eq!(writes.len(), workers * ops);
            assert_eq!(measurement.total_ops, (workers * ops) as u64);

            let keys = writes.iter().map(|(k, _)| k.clone()).collect::<HashSet<_>>();
            assert_eq!(keys.len(), workers * ops, "keys must never collide");
            assert_eq!(barrier.pending(), 0);
        }
    }

    #[tokio::test]
    async fn each_worker_reuses_one_payload() {
        let store = Arc::new(RecordingStore::default());
        let barrier = Arc::new(Barrier::new());
        run_workers(&barrier, &plan(4, 10, 12), store.clone())
            .await
            .unwrap();

        let mut per_worker: HashMap<String, HashSet<Vec<u8>>> = HashMap::new();
        for (key, value) in store.writes.lock().unwrap().iter() {
            let worker = key.split('.').nth(2).unwrap().to_string();
            per_worker.entry(worker).or_default().insert(value.clone());
        }
        assert_eq!(per_worker.len(), 4);
        assert!(per_worker.values().all(|payloads| payloads.len() == 1));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn single_node_scenario_counts_four_thousand_writes() {
        let store = Arc::new(InMemoryStore::new());
        let barrier = Arc::new(Barrier::new());

        let measurement = run_workers(&barrier, &plan(4, 1000, 8), store.clone())
            .await
            .unwrap();

        assert_eq!(measurement.total_ops, 4000);
        assert_eq!(store.len().await, 4000);
        assert_eq!(store.get(&bench_key(3, 999)).await.unwrap().len(), 8);
        assert!(measurement.ts_end >= measurement.ts_begin);
    }

    #[tokio::test]
    async fn write_failure_is_fatal() {
        let store = Arc::new(FailingStore {
            fail_at: 5,
            seen: Default::default(),
        });
        let barrier = Arc::new(Barrier::new());

        let err = run_workers(&barrier, &plan(2, 10, 4), store)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkloadError::Write { .. }));
    }
}
