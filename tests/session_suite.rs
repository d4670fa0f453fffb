use std::sync::Arc;
use std::time::Duration;

use kvbench::config::{ClusterConfig, StoreConfig, Topology, WorkloadConfig};
use kvbench::coordinator::{self, CoordinatorError};
use kvbench::{BenchConfig, BenchSession, InMemoryStore, SessionError};
use tokio::time::timeout;

#[path = "common.rs"]
mod common;

fn workload(workers: usize, ops: usize) -> WorkloadConfig {
    WorkloadConfig {
        workers,
        ops_per_worker: ops,
        payload_size: 8,
        ttl: None,
    }
}

fn topology_for(nodes: &[String], local: &str) -> Topology {
    BenchConfig::new(workload(1, 1), StoreConfig::memory())
        .with_cluster(ClusterConfig {
            nodes: nodes.to_vec(),
            node_addr: Some(local.to_string()),
            ..ClusterConfig::default()
        })
        .topology()
        .expect("valid topology")
        .expect("multi-node mode")
}

#[tokio::test(flavor = "multi_thread")]
async fn three_sessions_settle_into_one_summary() {
    // Reserve three ports, then release them so each coordinator can bind its own.
    let mut nodes = Vec::new();
    for _ in 0..3 {
        let Some(addr) = common::dead_address().await else {
            return;
        };
        nodes.push(addr.to_string());
    }

    let mut sessions = Vec::new();
    for local in &nodes {
        let topology = topology_for(&nodes, local);
        let session = BenchSession::new(workload(2, 50));
        let coordinator = coordinator::connect(
            &topology,
            session.barrier(),
            None,
            Some(Duration::from_secs(10)),
            Some(Duration::from_secs(2)),
        )
        .await
        .expect("coordinator");
        sessions.push(session.with_coordinator(coordinator));
    }

    let mut iter = sessions.into_iter();
    let master = iter.next().unwrap();
    let master_store = Arc::new(InMemoryStore::new());
    let master_run = tokio::spawn({
        let store = master_store.clone();
        async move { master.run(store).await }
    });

    let mut workers = Vec::new();
    for session in iter {
        workers.push(tokio::spawn(async move {
            session.run(Arc::new(InMemoryStore::new())).await
        }));
    }
    for worker in workers {
        let report = worker.await.unwrap().expect("worker run");
        assert!(report.summary.is_none());
        assert_eq!(report.local.total_ops, 100);
    }

    let report = timeout(Duration::from_secs(10), master_run)
        .await
        .expect("master finishes")
        .unwrap()
        .expect("master run");
    let summary = report.summary.expect("master summary");
    assert_eq!(summary.nodes, 3);
    assert_eq!(summary.total_ops, 300);
    assert!(summary.total_dur >= report.local.total_dur);
    assert_eq!(master_store.len().await, 100);
}

#[tokio::test(flavor = "multi_thread")]
async fn worker_session_without_master_fails_and_reports_nothing() {
    let Some(master_addr) = common::dead_address().await else {
        return;
    };
    let nodes = vec![master_addr.to_string(), "127.0.0.1:1".to_string()];
    let topology = topology_for(&nodes, "127.0.0.1:1");

    let session = BenchSession::new(workload(1, 10));
    let coordinator = coordinator::connect(
        &topology,
        session.barrier(),
        None,
        None,
        Some(Duration::from_secs(1)),
    )
    .await
    .unwrap();
    let session = session.with_coordinator(coordinator);

    let err = session
        .run(Arc::new(InMemoryStore::new()))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SessionError::Coordinator(CoordinatorError::Transport(_))
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn master_listener_bind_failure_is_fatal() {
    let Some(listener) = common::ephemeral_listener().await else {
        return;
    };
    let taken = listener.local_addr().unwrap().to_string();
    let nodes = vec![taken.clone(), "127.0.0.1:2".to_string()];
    let topology = topology_for(&nodes, &taken);

    let session = BenchSession::new(workload(1, 1));
    let err = coordinator::connect(&topology, session.barrier(), None, None, None)
        .await
        .err()
        .expect("port already in use");
    assert!(matches!(err, CoordinatorError::Bind { .. }));
    drop(listener);
}
