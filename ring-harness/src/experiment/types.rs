use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

use crate::data_structures::NodeAddr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Join,
    Leave,
    Crash,
    Recover,
    Put,
    Get,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MeasurementOutcome {
    Success,
    Failure { reason: String },
}

/// One timed administrative operation, sealed once the response (or the
/// stabilization barrier that follows it) completes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub kind: OperationKind,
    pub node: NodeAddr,
    // Membership size the operation produced: the configuration point it counts toward.
    pub cluster_size: usize,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    pub outcome: MeasurementOutcome,
}

impl Measurement {
    pub fn is_success(&self) -> bool {
        self.outcome == MeasurementOutcome::Success
    }
}

/// An operation that has been dispatched but not yet sealed.
#[derive(Debug)]
pub struct PendingMeasurement {
    kind: OperationKind,
    node: NodeAddr,
    cluster_size: usize,
    started_at: DateTime<Utc>,
    started: Instant,
}

impl PendingMeasurement {
    pub fn start(kind: OperationKind, node: NodeAddr, cluster_size: usize) -> Self {
        PendingMeasurement { kind, node, cluster_size, started_at: Utc::now(), started: Instant::now() }
    }

    pub fn seal(self, outcome: MeasurementOutcome) -> Measurement {
        Measurement {
            kind: self.kind,
            node: self.node,
            cluster_size: self.cluster_size,
            started_at: self.started_at,
            ended_at: Utc::now(),
            duration: self.started.elapsed(),
            outcome,
        }
    }

    pub fn succeed(self) -> Measurement {
        self.seal(MeasurementOutcome::Success)
    }

    pub fn fail(self, reason: impl fmt::Display) -> Measurement {
        self.seal(MeasurementOutcome::Failure { reason: reason.to_string() })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentKind {
    Growth,
    Shrink,
    BurstFault,
}

/// One scenario definition. Immutable once started.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Experiment {
    /// Join nodes one at a time until each target membership size is reached.
    Growth { targets: Vec<usize> },
    /// Remove tail members down to each target size.
    Shrink { targets: Vec<usize> },
    /// Crash/recover bursts of 1..=max_burst nodes, stopping at the first failure.
    BurstFault { max_burst: usize },
}

/// One execution of an experiment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    pub experiment: ExperimentKind,
    pub repeat: usize,
    pub measurements: Vec<Measurement>,
    pub completed: bool, // false when a failed step ended the scenario early
}

impl Trial {
    pub fn new(experiment: ExperimentKind, repeat: usize) -> Self {
        Trial { experiment, repeat, measurements: Vec::new(), completed: false }
    }

    /// `(cluster_size, seconds)` for each successful measurement of `kind`, in order.
    pub fn durations(&self, kind: OperationKind) -> Vec<(usize, f64)> {
        self.measurements
            .iter()
            .filter(|m| m.kind == kind && m.is_success())
            .map(|m| (m.cluster_size, m.duration.as_secs_f64()))
            .collect()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BurstOutcome {
    Ok,
    No,
}

impl fmt::Display for BurstOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BurstOutcome::Ok => f.write_str("ok"),
            BurstOutcome::No => f.write_str("no"),
        }
    }
}

/// Where in the crash/validate/recover/validate sequence a burst failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BurstFailure {
    CrashRejected,
    StillOperational,
    SurvivorsInconsistent,
    RecoverRejected,
    NotRecovered,
    ClusterInconsistent,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BurstResult {
    pub burst_size: usize,
    pub outcome: BurstOutcome,
    pub crashed: Vec<NodeAddr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<BurstFailure>,
}

impl BurstResult {
    pub fn ok(burst_size: usize, crashed: Vec<NodeAddr>) -> Self {
        BurstResult { burst_size, outcome: BurstOutcome::Ok, crashed, failure: None }
    }

    pub fn no(burst_size: usize, crashed: Vec<NodeAddr>, failure: BurstFailure) -> Self {
        BurstResult { burst_size, outcome: BurstOutcome::No, crashed, failure: Some(failure) }
    }
}

/// All bursts of one burst-fault run, in increasing size. At most the last one is `No`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BurstReport {
    pub results: Vec<BurstResult>,
}

impl BurstReport {
    pub fn outcomes(&self) -> Vec<(usize, BurstOutcome)> {
        self.results.iter().map(|r| (r.burst_size, r.outcome)).collect()
    }

    /// Largest burst size the cluster survived, if any.
    pub fn tolerated(&self) -> Option<usize> {
        self.results.iter().filter(|r| r.outcome == BurstOutcome::Ok).map(|r| r.burst_size).max()
    }

    pub fn summary_lines(&self) -> Vec<String> {
        self.results.iter().map(|r| format!("burst of node(s) {}: {}", r.burst_size, r.outcome)).collect()
    }
}

/// What one `ExperimentRunner::run` produced.
#[derive(Clone, Debug, PartialEq)]
pub enum ExperimentOutcome {
    Trial(Trial),
    Burst(BurstReport),
}

/// One aggregated configuration point, as read by the plotting scripts.
/// Field names are part of the artifact format and must not change.
/// Storage timings stay 0.0 unless growth runs stored and read back a key at each size.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub nodes: usize,
    pub join_avg: f64,
    pub join_std: f64,
    pub leave_avg: f64,
    pub leave_std: f64,
    #[serde(default)]
    pub put_avg: f64,
    #[serde(default)]
    pub put_std: f64,
    #[serde(default)]
    pub get_avg: f64,
    #[serde(default)]
    pub get_std: f64,
    #[serde(default)]
    pub samples: usize,
}
