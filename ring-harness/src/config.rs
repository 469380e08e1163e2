use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::HarnessError;

/// How the spread across repeated trials is computed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StdDevKind {
    /// n-1 denominator; 0 when there is a single sample.
    Sample,
    /// n denominator.
    Population,
}

/// What to do when repeated trials produced measurement sequences of different lengths
/// (e.g. one repeat aborted on a failed join).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnevenTrialPolicy {
    /// Cut every sequence to the shortest one. Lossy: later points of longer trials are dropped.
    Truncate,
    /// Refuse to aggregate.
    Reject,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    // Network Controller
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration, // Per-request bound; exceeding it reads as Unreachable

    // Stabilization barrier
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub stabilize_deadline: Duration,

    // Burst-fault scenario
    #[serde(with = "humantime_serde")]
    pub settle_duration: Duration, // Fixed wait after a crash/recover burst, before validation
    #[serde(with = "humantime_serde")]
    pub fault_confirm_delay: Duration, // Wait before checking a single crash/recover took effect
    pub confirm_faults: bool,
    pub max_burst: usize,
    pub seed: Option<u64>, // None = entropy-seeded selection

    // Scaling experiments
    pub node_counts: Vec<usize>, // Growth checkpoints, strictly increasing
    pub repeats: usize,
    pub storage_checkpoints: bool, // Time a put and a read-back from every member at each growth checkpoint

    // Aggregation
    pub std_dev: StdDevKind,
    pub uneven_trials: UnevenTrialPolicy,

    // Output
    pub results_path: PathBuf,
    pub burst_results_path: Option<PathBuf>,
    pub log_level: String,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        HarnessConfig {
            request_timeout: Duration::from_secs(5),

            poll_interval: Duration::from_secs(1),
            stabilize_deadline: Duration::from_secs(60),

            settle_duration: Duration::from_secs(5),
            fault_confirm_delay: Duration::from_secs(1),
            confirm_faults: true,
            max_burst: 4,
            seed: None,

            node_counts: vec![2, 4, 8, 16, 32],
            repeats: 3,
            storage_checkpoints: false,

            std_dev: StdDevKind::Sample,
            uneven_trials: UnevenTrialPolicy::Truncate,

            results_path: PathBuf::from("res.txt"),
            burst_results_path: None,
            log_level: "info".to_string(),
        }
    }
}

impl HarnessConfig {
    /// Loads a JSON config file. Missing fields fall back to the defaults above.
    pub fn from_file(path: &Path) -> Result<Self, HarnessError> {
        let raw = std::fs::read_to_string(path).map_err(|source| HarnessError::Persist {
            path: path.display().to_string(),
            source,
        })?;
        let config: HarnessConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), HarnessError> {
        if self.node_counts.is_empty() {
            return Err(HarnessError::Config("node_counts must not be empty".into()));
        }
        // A lone node has no peers and can never pass the stability check.
        if self.node_counts[0] < 2 {
            return Err(HarnessError::Config(format!(
                "node_counts must start at 2 or more, got {}",
                self.node_counts[0]
            )));
        }
        if self.node_counts.windows(2).any(|w| w[0] >= w[1]) {
            return Err(HarnessError::Config(format!(
                "node_counts must be strictly increasing: {:?}",
                self.node_counts
            )));
        }
        if self.repeats == 0 {
            return Err(HarnessError::Config("repeats must be at least 1".into()));
        }
        if self.poll_interval.is_zero() {
            return Err(HarnessError::Config("poll_interval must be non-zero".into()));
        }
        Ok(())
    }

    /// Largest node count any scaling experiment needs.
    pub fn max_nodes(&self) -> usize {
        self.node_counts.iter().copied().max().unwrap_or(0)
    }
}
