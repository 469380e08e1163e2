use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

use crate::config::HarnessConfig;
use crate::data_structures::{Cluster, NodeAddr, NodeHandle};
use crate::error::HarnessError;
use crate::experiment::types::{
    BurstFailure, BurstReport, BurstResult, Experiment, ExperimentKind, ExperimentOutcome, OperationKind,
    PendingMeasurement, Trial,
};
use crate::liveness::{ConsistencyCheck, RingValidator, StabilityOutcome, StabilizationWaiter};
use crate::network::{InfoOutcome, NodeControl};

/// Timing knobs of the burst-fault scenario.
#[derive(Clone, Debug)]
pub struct BurstSettings {
    pub settle_duration: Duration,
    pub fault_confirm_delay: Duration,
    pub confirm_faults: bool,
}

impl From<&HarnessConfig> for BurstSettings {
    fn from(config: &HarnessConfig) -> Self {
        BurstSettings {
            settle_duration: config.settle_duration,
            fault_confirm_delay: config.fault_confirm_delay,
            confirm_faults: config.confirm_faults,
        }
    }
}

/// Result of `ExperimentRunner::probe_storage`.
#[derive(Clone, Debug)]
pub struct StorageProbe {
    pub trial: Trial,
    pub stored: bool,
    pub mismatches: Vec<NodeAddr>, // Members that did not return the stored value
}

/// Drives scenarios over one cluster. Owns the membership list exclusively; every
/// step is awaited before the next one starts.
pub struct ExperimentRunner {
    cluster: Cluster,
    control: Arc<dyn NodeControl>,
    waiter: StabilizationWaiter,
    validator: Arc<dyn ConsistencyCheck>,
    burst: BurstSettings,
    storage_checkpoints: bool,
    rng: StdRng,
}

impl ExperimentRunner {
    pub fn new(cluster: Cluster, control: Arc<dyn NodeControl>, config: &HarnessConfig) -> Self {
        let waiter = StabilizationWaiter::new(control.clone(), config.poll_interval, config.stabilize_deadline);
        let validator: Arc<dyn ConsistencyCheck> = Arc::new(RingValidator::new(control.clone()));
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        ExperimentRunner {
            cluster,
            control,
            waiter,
            validator,
            burst: BurstSettings::from(config),
            storage_checkpoints: config.storage_checkpoints,
            rng,
        }
    }

    /// Swaps the consistency check, e.g. for a scripted one in tests.
    pub fn with_validator(mut self, validator: Arc<dyn ConsistencyCheck>) -> Self {
        self.validator = validator;
        self
    }

    pub fn cluster(&self) -> &Cluster {
        &self.cluster
    }

    pub async fn run(&mut self, experiment: &Experiment, repeat: usize) -> Result<ExperimentOutcome, HarnessError> {
        match experiment {
            Experiment::Growth { targets } => Ok(ExperimentOutcome::Trial(self.run_growth(targets, repeat).await?)),
            Experiment::Shrink { targets } => Ok(ExperimentOutcome::Trial(self.run_shrink(targets, repeat).await?)),
            Experiment::BurstFault { max_burst } => Ok(ExperimentOutcome::Burst(self.run_burst_faults(*max_burst).await)),
        }
    }

    /// Joins the next unjoined node through the introducer until each target size is
    /// reached. Each join is timed through the stability barrier on the new membership.
    /// A failed join or barrier timeout ends the trial early. With storage checkpoints
    /// on, every reached target also gets a timed put and read-back.
    pub async fn run_growth(&mut self, targets: &[usize], repeat: usize) -> Result<Trial, HarnessError> {
        let mut targets = targets.to_vec();
        targets.sort_unstable();
        targets.dedup();
        if let Some(&largest) = targets.last() {
            if largest > self.cluster.len() {
                return Err(HarnessError::Config(format!(
                    "growth target {} exceeds the {} discovered node(s)",
                    largest,
                    self.cluster.len()
                )));
            }
        }

        let introducer = self.cluster.introducer().addr().clone();
        let mut trial = Trial::new(ExperimentKind::Growth, repeat);
        info!("[Runner] Growth from {} member(s) through targets {:?}", self.cluster.member_count(), targets);

        for target in targets {
            while self.cluster.member_count() < target {
                let node = match self.cluster.next_unjoined() {
                    Some(node) => node.clone(),
                    None => break,
                };
                let pending =
                    PendingMeasurement::start(OperationKind::Join, node.addr().clone(), self.cluster.member_count() + 1);

                if let Err(e) = self.control.join(&node, &introducer).await {
                    warn!("[Runner] Join of {} via {} failed: {}", node.addr(), introducer, e);
                    trial.measurements.push(pending.fail(e));
                    return Ok(trial);
                }
                self.cluster.mark_joined();

                match self.waiter.await_stable(self.cluster.members()).await {
                    StabilityOutcome::Stable { .. } => {
                        let m = pending.succeed();
                        debug!("[Runner] {} joined in {:?}", node.addr(), m.duration);
                        trial.measurements.push(m);
                    }
                    StabilityOutcome::TimedOut { unsettled, .. } => {
                        warn!("[Runner] Ring did not stabilize after {} joined: {:?}", node.addr(), unsettled);
                        trial.measurements.push(pending.fail(format!("not stable, unsettled: {:?}", unsettled)));
                        return Ok(trial);
                    }
                }
            }
            info!("[Runner] Growth reached {} node(s)", self.cluster.member_count());
            if self.storage_checkpoints {
                let key = format!("checkpoint-{}-{}", repeat, target);
                self.storage_round(&key, &format!("value-{}", target), &mut trial).await;
            }
        }
        trial.completed = true;
        Ok(trial)
    }

    /// Mirror of growth: the tail member leaves, timed through the stability barrier on
    /// the remaining membership, down to each target. Never removes the introducer.
    pub async fn run_shrink(&mut self, targets: &[usize], repeat: usize) -> Result<Trial, HarnessError> {
        let mut targets: Vec<usize> = targets.iter().map(|&t| t.max(1)).collect();
        targets.sort_unstable_by(|a, b| b.cmp(a));
        targets.dedup();

        let mut trial = Trial::new(ExperimentKind::Shrink, repeat);
        info!("[Runner] Shrink from {} member(s) through targets {:?}", self.cluster.member_count(), targets);

        for target in targets {
            while self.cluster.member_count() > target {
                let node = match self.cluster.last_member() {
                    Some(node) => node.clone(),
                    None => break,
                };
                let pending =
                    PendingMeasurement::start(OperationKind::Leave, node.addr().clone(), self.cluster.member_count() - 1);

                if let Err(e) = self.control.leave(&node).await {
                    warn!("[Runner] Leave of {} failed: {}", node.addr(), e);
                    trial.measurements.push(pending.fail(e));
                    return Ok(trial);
                }
                self.cluster.mark_left();

                match self.waiter.await_stable(self.cluster.members()).await {
                    StabilityOutcome::Stable { .. } => trial.measurements.push(pending.succeed()),
                    StabilityOutcome::TimedOut { unsettled, .. } => {
                        warn!("[Runner] Ring did not stabilize after {} left: {:?}", node.addr(), unsettled);
                        trial.measurements.push(pending.fail(format!("not stable, unsettled: {:?}", unsettled)));
                        return Ok(trial);
                    }
                }
            }
            info!("[Runner] Shrink reached {} node(s)", self.cluster.member_count());
        }
        trial.completed = true;
        Ok(trial)
    }

    /// Crashes bursts of 1, 2, ... `max_burst` random members, validating survivors and
    /// then the recovered ring. Stops at the first "no".
    pub async fn run_burst_faults(&mut self, max_burst: usize) -> BurstReport {
        let members: Vec<NodeHandle> = self.cluster.members().to_vec();
        let max_burst = if max_burst > members.len() {
            warn!("[Runner] max_burst {} exceeds membership {}; clamping", max_burst, members.len());
            members.len()
        } else {
            max_burst
        };

        let mut report = BurstReport::default();
        for burst_size in 1..=max_burst {
            info!("[Runner] Testing burst of {} node(s) crash...", burst_size);
            let crashed: Vec<NodeHandle> = members.choose_multiple(&mut self.rng, burst_size).cloned().collect();
            let result = self.burst(burst_size, &members, &crashed).await;
            info!("[Runner] burst of node(s) {}: {}", burst_size, result.outcome);

            let failed = result.failure.is_some();
            report.results.push(result);
            if failed {
                self.restore(&crashed).await;
                break;
            }
        }
        report
    }

    async fn burst(&self, burst_size: usize, members: &[NodeHandle], crashed: &[NodeHandle]) -> BurstResult {
        let crashed_addrs: Vec<NodeAddr> = crashed.iter().map(|n| n.addr().clone()).collect();
        let no = |failure| BurstResult::no(burst_size, crashed_addrs.clone(), failure);

        // All crash requests go out back to back; confirmation follows once per burst.
        for node in crashed {
            if let Err(e) = self.control.crash(node).await {
                warn!("[Runner] Crash of {} rejected: {}", node.addr(), e);
                return no(BurstFailure::CrashRejected);
            }
        }
        if self.burst.confirm_faults {
            sleep(self.burst.fault_confirm_delay).await;
            for node in crashed {
                match self.control.query_info(node).await {
                    InfoOutcome::Crashed => {}
                    InfoOutcome::Unreachable => {
                        warn!("[Runner] {} is unreachable rather than crashed; counting it as down", node.addr());
                    }
                    InfoOutcome::Healthy(_) => {
                        warn!("[Runner] Node {} is still operational after crash attempt", node.addr());
                        return no(BurstFailure::StillOperational);
                    }
                }
            }
        }

        sleep(self.burst.settle_duration).await;
        let survivors: Vec<NodeHandle> = members.iter().filter(|n| !crashed.contains(n)).cloned().collect();
        self.barrier(&survivors).await;
        if !self.validator.validate(&survivors).await.is_consistent() {
            return no(BurstFailure::SurvivorsInconsistent);
        }

        for node in crashed {
            if let Err(e) = self.control.recover(node).await {
                warn!("[Runner] Recover of {} rejected: {}", node.addr(), e);
                return no(BurstFailure::RecoverRejected);
            }
        }
        if self.burst.confirm_faults {
            sleep(self.burst.fault_confirm_delay).await;
            for node in crashed {
                if !self.control.query_info(node).await.is_healthy() {
                    warn!("[Runner] Node {} did not recover correctly", node.addr());
                    return no(BurstFailure::NotRecovered);
                }
            }
        }

        sleep(self.burst.settle_duration).await;
        self.barrier(members).await;
        if !self.validator.validate(members).await.is_consistent() {
            return no(BurstFailure::ClusterInconsistent);
        }
        BurstResult::ok(burst_size, crashed_addrs.clone())
    }

    // Convergence barrier ahead of a validation. A timeout is only logged: the
    // validation that follows decides the outcome.
    async fn barrier(&self, nodes: &[NodeHandle]) {
        if let StabilityOutcome::TimedOut { unsettled, .. } = self.waiter.await_stable(nodes).await {
            debug!("[Runner] Barrier timed out before validation; unsettled: {:?}", unsettled);
        }
    }

    // Unmeasured best-effort recovery after a failed burst so later scenarios start
    // from a live ring.
    async fn restore(&self, crashed: &[NodeHandle]) {
        for node in crashed {
            if let Err(e) = self.control.recover(node).await {
                warn!("[Runner] Could not restore {} after failed burst: {}", node.addr(), e);
            }
        }
    }

    /// Joins every unjoined node through the introducer (unmeasured), then waits for
    /// the ring to converge.
    pub async fn form_ring(&mut self) -> StabilityOutcome {
        let introducer = self.cluster.introducer().addr().clone();
        info!("[Runner] Initializing the network ({} node(s))...", self.cluster.len());
        while let Some(node) = self.cluster.next_unjoined().cloned() {
            match self.control.join(&node, &introducer).await {
                Ok(()) => {
                    debug!("[Runner] Node {} joined network.", node.addr());
                    self.cluster.mark_joined();
                }
                Err(e) => {
                    warn!("[Runner] Error initializing node {}: {}", node.addr(), e);
                    break;
                }
            }
        }
        let outcome = self.waiter.await_stable(self.cluster.members()).await;
        info!("[Runner] Network initialized with {} member(s)", self.cluster.member_count());
        outcome
    }

    /// Makes every non-introducer member leave (unmeasured), so the next growth trial
    /// starts from a one-member ring. Stops at the first leave the node refuses; the
    /// membership then still lists that node.
    pub async fn reset_membership(&mut self) -> Result<(), HarnessError> {
        while let Some(node) = self.cluster.last_member().cloned() {
            if let Err(e) = self.control.leave(&node).await {
                warn!("[Runner] Reset: leave of {} failed: {}", node.addr(), e);
                return Err(HarnessError::Membership(format!(
                    "leave of {} failed with {} member(s) left: {}",
                    node.addr(),
                    self.cluster.member_count(),
                    e
                )));
            }
            self.cluster.mark_left();
        }
        Ok(())
    }

    /// Stores `key` through the introducer, waits for stability, then reads it back
    /// from every member.
    pub async fn probe_storage(&mut self, key: &str, value: &str, repeat: usize) -> StorageProbe {
        let mut trial = Trial::new(ExperimentKind::Growth, repeat);
        let (stored, mismatches) = self.storage_round(key, value, &mut trial).await;
        trial.completed = stored;
        StorageProbe { trial, stored, mismatches }
    }

    // Timed put through the introducer, barrier, then a timed get on every member.
    // Returns whether the put was accepted and the members that did not hand back `value`.
    async fn storage_round(&self, key: &str, value: &str, trial: &mut Trial) -> (bool, Vec<NodeAddr>) {
        let members: Vec<NodeHandle> = self.cluster.members().to_vec();
        let size = members.len();
        let writer = self.cluster.introducer();

        let pending = PendingMeasurement::start(OperationKind::Put, writer.addr().clone(), size);
        if let Err(e) = self.control.put(writer, key, value).await {
            warn!("[Runner] Put of `{}` on {} failed: {}", key, writer.addr(), e);
            trial.measurements.push(pending.fail(e));
            return (false, members.iter().map(|n| n.addr().clone()).collect());
        }
        trial.measurements.push(pending.succeed());

        self.barrier(&members).await;

        let mut mismatches = Vec::new();
        for node in &members {
            let pending = PendingMeasurement::start(OperationKind::Get, node.addr().clone(), size);
            match self.control.get(node, key).await {
                Ok(found) if found == value => trial.measurements.push(pending.succeed()),
                Ok(found) => {
                    warn!("[Runner] {} returned `{}` for `{}`, expected `{}`", node.addr(), found, key, value);
                    trial.measurements.push(pending.fail(format!("content mismatch: {}", found)));
                    mismatches.push(node.addr().clone());
                }
                Err(e) => {
                    warn!("[Runner] Get of `{}` on {} failed: {}", key, node.addr(), e);
                    trial.measurements.push(pending.fail(e));
                    mismatches.push(node.addr().clone());
                }
            }
        }
        (true, mismatches)
    }

    /// Terminal: asks every discovered node to shut down.
    pub async fn shutdown_all(&self) {
        for node in self.cluster.nodes() {
            self.control.shutdown(node).await;
            debug!("[Runner] Node {} shut down.", node.addr());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_structures::NodeState;
    use crate::experiment::types::BurstOutcome;
    use crate::liveness::ValidationReport;
    use crate::test_utils::{test_addrs, MockController};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast_config() -> HarnessConfig {
        HarnessConfig {
            poll_interval: Duration::from_millis(100),
            stabilize_deadline: Duration::from_secs(2),
            settle_duration: Duration::from_millis(500),
            fault_confirm_delay: Duration::from_millis(100),
            seed: Some(42),
            ..Default::default()
        }
    }

    fn runner(n: usize) -> (ExperimentRunner, MockController) {
        runner_with(n, &fast_config())
    }

    fn runner_with(n: usize, config: &HarnessConfig) -> (ExperimentRunner, MockController) {
        let addrs = test_addrs(n);
        let ctrl = MockController::for_addrs(&addrs);
        let cluster = Cluster::new(addrs).unwrap();
        (ExperimentRunner::new(cluster, Arc::new(ctrl.clone()), config), ctrl)
    }

    // Fails on the n-th validation call, passes otherwise.
    struct FailOnCall {
        fail_at: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ConsistencyCheck for FailOnCall {
        async fn validate(&self, nodes: &[NodeHandle]) -> ValidationReport {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            let mut report = ValidationReport { checked: nodes.len(), violations: vec![] };
            if call == self.fail_at {
                report.violations.push(crate::liveness::Violation {
                    addr: nodes[0].addr().clone(),
                    reason: crate::liveness::ViolationReason::NoPeers,
                });
            }
            report
        }
    }

    #[tokio::test(start_paused = true)]
    async fn growth_records_one_join_per_added_node() {
        let (mut runner, ctrl) = runner(8);
        let trial = runner.run_growth(&[2, 4, 8], 0).await.unwrap();

        assert!(trial.completed);
        assert_eq!(trial.durations(OperationKind::Join).len(), 8 - 1);
        let sizes: Vec<usize> = trial.measurements.iter().map(|m| m.cluster_size).collect();
        assert_eq!(sizes, (2..=8).collect::<Vec<_>>());
        assert_eq!(runner.cluster().member_count(), 8);
        assert_eq!(ctrl.with_model(|m| m.member_count()), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn storage_checkpoints_time_put_and_reads_at_each_target() {
        let config = HarnessConfig { storage_checkpoints: true, ..fast_config() };
        let (mut runner, ctrl) = runner_with(4, &config);
        let trial = runner.run_growth(&[2, 4], 1).await.unwrap();

        assert!(trial.completed);
        assert_eq!(trial.durations(OperationKind::Join).len(), 3);
        let sizes = |kind| trial.durations(kind).iter().map(|(n, _)| *n).collect::<Vec<_>>();
        assert_eq!(sizes(OperationKind::Put), vec![2, 4]);
        assert_eq!(sizes(OperationKind::Get), vec![2, 2, 4, 4, 4, 4]);
        let introducer = test_addrs(4)[0].clone();
        assert_eq!(ctrl.with_model(|m| m.get(&introducer, "checkpoint-1-4")), Ok("value-4".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn growth_beyond_cluster_is_a_config_error() {
        let (mut runner, _) = runner(3);
        let err = runner.run_growth(&[2, 4], 0).await.unwrap_err();
        assert!(matches!(err, HarnessError::Config(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_join_ends_the_trial() {
        let (mut runner, ctrl) = runner(5);
        ctrl.with_model(|m| m.failing_joins.insert(test_addrs(5)[3].clone()));

        let trial = runner.run_growth(&[5], 0).await.unwrap();
        assert!(!trial.completed);
        assert_eq!(trial.durations(OperationKind::Join).len(), 2);
        assert_eq!(trial.measurements.len(), 3);
        assert!(!trial.measurements[2].is_success());
        assert_eq!(runner.cluster().member_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn stabilization_timeout_fails_the_step() {
        let (mut runner, ctrl) = runner(3);
        ctrl.with_model(|m| m.null_successor.insert(test_addrs(3)[0].clone()));

        let trial = runner.run_growth(&[3], 0).await.unwrap();
        assert!(!trial.completed);
        assert_eq!(trial.measurements.len(), 1);
        let m = &trial.measurements[0];
        assert!(!m.is_success());
        // Sealed at the barrier deadline, not before.
        assert!(m.duration >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn shrink_leaves_from_tail_and_keeps_introducer() {
        let (mut runner, ctrl) = runner(6);
        runner.form_ring().await;

        let trial = runner.run_shrink(&[2, 4], 0).await.unwrap();
        assert!(trial.completed);
        assert_eq!(trial.measurements.len(), 4);
        let sizes: Vec<usize> = trial.measurements.iter().map(|m| m.cluster_size).collect();
        assert_eq!(sizes, vec![5, 4, 3, 2]);
        assert_eq!(runner.cluster().member_count(), 2);
        let left = ctrl.calls_for("leave");
        assert_eq!(left, test_addrs(6)[2..].iter().rev().cloned().collect::<Vec<_>>());
        assert!(ctrl.with_model(|m| m.is_joined(&test_addrs(6)[0])));
    }

    #[tokio::test(start_paused = true)]
    async fn shrink_to_lone_member_cannot_stabilize() {
        let (mut runner, _) = runner(3);
        runner.form_ring().await;

        let trial = runner.run_shrink(&[0], 0).await.unwrap();
        // 3 -> 2 stabilizes; 2 -> 1 leaves a member with no peers.
        assert!(!trial.completed);
        assert_eq!(trial.durations(OperationKind::Leave).len(), 1);
        assert_eq!(trial.measurements.len(), 2);
        assert_eq!(runner.cluster().member_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn burst_stops_at_first_failure() {
        let (runner, ctrl) = runner(5);
        // Each ok burst validates twice; the 5th call is burst 3's survivor check.
        let mut runner = runner.with_validator(Arc::new(FailOnCall { fail_at: 5, calls: AtomicUsize::new(0) }));
        runner.form_ring().await;

        let report = runner.run_burst_faults(4).await;
        assert_eq!(
            report.outcomes(),
            vec![(1, BurstOutcome::Ok), (2, BurstOutcome::Ok), (3, BurstOutcome::No)]
        );
        assert_eq!(report.results[2].failure, Some(BurstFailure::SurvivorsInconsistent));
        // 1 + 2 + 3 crashes; size 4 never attempted.
        assert_eq!(ctrl.call_count("crash"), 6);
        // Nodes crashed by the failed burst were put back.
        assert!(runner.cluster().members().iter().all(|n| !ctrl.with_model(|m| m.is_crashed(n.addr()))));
    }

    #[tokio::test(start_paused = true)]
    async fn burst_on_mock_ring_fails_when_one_survivor_remains() {
        let (mut runner, _) = runner(4);
        runner.form_ring().await;

        let report = runner.run_burst_faults(10).await; // Clamped to 4
        assert_eq!(
            report.outcomes(),
            vec![(1, BurstOutcome::Ok), (2, BurstOutcome::Ok), (3, BurstOutcome::No)]
        );
        let distinct: std::collections::HashSet<_> = report.results[2].crashed.iter().collect();
        assert_eq!(distinct.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn burst_may_take_down_the_whole_membership() {
        let (runner, ctrl) = runner(3);
        let mut runner = runner.with_validator(Arc::new(FailOnCall { fail_at: usize::MAX, calls: AtomicUsize::new(0) }));
        runner.form_ring().await;

        let report = runner.run_burst_faults(10).await; // Clamped to 3
        assert_eq!(
            report.outcomes(),
            vec![(1, BurstOutcome::Ok), (2, BurstOutcome::Ok), (3, BurstOutcome::Ok)]
        );
        assert_eq!(report.results[2].crashed.len(), 3);
        assert_eq!(ctrl.call_count("crash"), 1 + 2 + 3);
        assert_eq!(ctrl.call_count("recover"), 1 + 2 + 3);
    }

    #[tokio::test(start_paused = true)]
    async fn crashed_node_that_goes_silent_counts_as_down() {
        let (mut runner, ctrl) = runner(4);
        runner.form_ring().await;
        ctrl.with_model(|m| m.silent_when_crashed.extend(test_addrs(4)));

        let report = runner.run_burst_faults(1).await;
        assert_eq!(report.outcomes(), vec![(1, BurstOutcome::Ok)]);
        let crashed = &report.results[0].crashed[0];
        assert!(!ctrl.with_model(|m| m.is_crashed(crashed)));
    }

    #[tokio::test(start_paused = true)]
    async fn burst_sends_every_crash_before_confirming() {
        let (mut runner, ctrl) = runner(5);
        runner.form_ring().await;

        let report = runner.run_burst_faults(3).await;
        assert_eq!(report.tolerated(), Some(3));
        // Bursts of 1, 2 and 3: requests within one burst are issued at the same instant.
        for op in ["crash", "recover"] {
            let t = ctrl.call_times(op);
            assert_eq!(t.len(), 6);
            assert_eq!(t[1], t[2], "{} burst 2", op);
            assert_eq!(t[3], t[4], "{} burst 3", op);
            assert_eq!(t[4], t[5], "{} burst 3", op);
            assert!(t[2] < t[3]);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn crash_that_does_not_take_is_a_no() {
        let (mut runner, ctrl) = runner(3);
        runner.form_ring().await;
        ctrl.with_model(|m| m.ignore_crash.extend(test_addrs(3)));

        let report = runner.run_burst_faults(3).await;
        assert_eq!(report.results.len(), 1);
        assert_eq!(report.results[0].failure, Some(BurstFailure::StillOperational));
    }

    #[tokio::test(start_paused = true)]
    async fn unrecovered_node_is_a_no() {
        let (mut runner, ctrl) = runner(4);
        runner.form_ring().await;
        ctrl.with_model(|m| m.ignore_recover.extend(test_addrs(4)));

        let report = runner.run_burst_faults(2).await;
        assert_eq!(report.outcomes(), vec![(1, BurstOutcome::No)]);
        assert_eq!(report.results[0].failure, Some(BurstFailure::NotRecovered));
    }

    #[tokio::test(start_paused = true)]
    async fn seeded_selection_is_reproducible() {
        let (mut a, _) = runner(6);
        let (mut b, _) = runner(6);
        a.form_ring().await;
        b.form_ring().await;
        let ra = a.run_burst_faults(3).await;
        let rb = b.run_burst_faults(3).await;
        let crashed_a: Vec<_> = ra.results.iter().map(|r| r.crashed.clone()).collect();
        let crashed_b: Vec<_> = rb.results.iter().map(|r| r.crashed.clone()).collect();
        assert_eq!(crashed_a, crashed_b);
    }

    #[tokio::test(start_paused = true)]
    async fn stored_key_reads_back_from_every_member() {
        let (mut runner, _) = runner(4);
        runner.form_ring().await;

        let round = runner.probe_storage("k", "v", 0).await;
        assert!(round.stored);
        assert!(round.mismatches.is_empty());
        assert!(round.trial.completed);
        assert_eq!(round.trial.durations(OperationKind::Get).len(), 4);
        assert_eq!(round.trial.durations(OperationKind::Put).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_and_shutdown() {
        let (mut runner, ctrl) = runner(3);
        runner.form_ring().await;
        runner.reset_membership().await.unwrap();
        assert_eq!(runner.cluster().member_count(), 1);
        assert_eq!(ctrl.with_model(|m| m.member_count()), 1);

        runner.shutdown_all().await;
        assert_eq!(ctrl.call_count("shutdown"), 3);
        assert!(runner.cluster().nodes().iter().all(|n| n.state() == NodeState::Unreachable));
    }

    #[tokio::test(start_paused = true)]
    async fn reset_stops_at_a_refused_leave() {
        let (mut runner, ctrl) = runner(4);
        runner.form_ring().await;
        ctrl.with_model(|m| m.unreachable.insert(test_addrs(4)[2].clone()));

        let err = runner.reset_membership().await.unwrap_err();
        assert!(matches!(err, HarnessError::Membership(_)));
        // The tail node left; the refusing one is still counted as a member.
        assert_eq!(runner.cluster().member_count(), 3);
        assert_eq!(ctrl.with_model(|m| m.member_count()), 3);
    }
}
