// ring-harness/tests/scenario_burst_faults.rs

// Burst crash/recover runs over fake HTTP nodes.

mod common;

use common::{fast_config, init_logging, spawn_cluster};
use ring_harness::experiment::{BurstFailure, BurstOutcome, ExperimentRunner, ResultSink};
use ring_harness::network::HttpController;
use ring_harness::{Cluster, HarnessConfig};
use std::sync::Arc;

async fn formed_runner(n: usize, config: &HarnessConfig) -> (common::FakeCluster, ExperimentRunner) {
    init_logging();
    let fake = spawn_cluster(n).await;
    let ctrl = Arc::new(HttpController::new(config.request_timeout).unwrap());
    let mut runner = ExperimentRunner::new(Cluster::new(fake.addrs.clone()).unwrap(), ctrl, config);
    assert!(runner.form_ring().await.is_stable());
    (fake, runner)
}

#[tokio::test]
async fn five_node_ring_survives_until_one_node_is_left() {
    let config = fast_config();
    let (fake, mut runner) = formed_runner(5, &config).await;

    let report = runner.run_burst_faults(4).await;
    // With a single survivor the peer list is empty, so burst 4 is the first "no".
    assert_eq!(
        report.outcomes(),
        vec![(1, BurstOutcome::Ok), (2, BurstOutcome::Ok), (3, BurstOutcome::Ok), (4, BurstOutcome::No)]
    );
    assert_eq!(report.results[3].failure, Some(BurstFailure::SurvivorsInconsistent));
    assert_eq!(report.tolerated(), Some(3));
    assert_eq!(report.summary_lines()[0], "burst of node(s) 1: ok");

    // Nodes crashed by the failed burst were recovered afterwards.
    assert!(fake.with_model(|m| fake.addrs.iter().all(|a| !m.is_crashed(a))));

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bursts.json");
    ResultSink::persist_bursts(&path, &[report]).unwrap();
    assert!(std::fs::read_to_string(&path).unwrap().contains("\"survivors_inconsistent\""));
}

#[tokio::test]
async fn crash_that_does_not_take_stops_the_run() {
    let config = fast_config();
    let (fake, mut runner) = formed_runner(4, &config).await;
    fake.with_model(|m| m.ignore_crash.extend(fake.addrs.iter().cloned()));

    let report = runner.run_burst_faults(3).await;
    assert_eq!(report.outcomes(), vec![(1, BurstOutcome::No)]);
    assert_eq!(report.results[0].failure, Some(BurstFailure::StillOperational));
}

#[tokio::test]
async fn unconfirmed_faults_are_judged_by_validation_only() {
    let config = HarnessConfig { confirm_faults: false, ..fast_config() };
    let (fake, mut runner) = formed_runner(4, &config).await;
    fake.with_model(|m| m.ignore_recover.insert(fake.addrs[0].clone()));

    let report = runner.run_burst_faults(4).await;
    let last = report.results.last().unwrap();
    assert_eq!(last.outcome, BurstOutcome::No);
    // Without confirmation a missed recovery only shows up in the final check,
    // unless the survivors already failed.
    assert!(matches!(
        last.failure,
        Some(BurstFailure::ClusterInconsistent) | Some(BurstFailure::SurvivorsInconsistent)
    ));
}
