use log::{info, warn};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::config::{HarnessConfig, StdDevKind, UnevenTrialPolicy};
use crate::error::HarnessError;
use crate::experiment::runner::ExperimentRunner;
use crate::experiment::types::{BurstReport, Experiment, ExperimentOutcome, OperationKind, ResultRecord, Trial};

/// Mean and spread of one operation kind at one membership size.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PointStats {
    pub nodes: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub samples: usize,
}

pub fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}

pub fn std_dev(xs: &[f64], kind: StdDevKind) -> f64 {
    let n = xs.len();
    let denom = match kind {
        StdDevKind::Sample if n <= 1 => return 0.0,
        StdDevKind::Sample => (n - 1) as f64,
        StdDevKind::Population if n == 0 => return 0.0,
        StdDevKind::Population => n as f64,
    };
    let m = mean(xs);
    (xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / denom).sqrt()
}

/// Every trial of each experiment, indexed like the experiment list, plus the
/// burst reports in run order.
#[derive(Clone, Debug, Default)]
pub struct RepeatedRuns {
    pub trials: Vec<Vec<Trial>>,
    pub bursts: Vec<BurstReport>,
}

impl RepeatedRuns {
    pub fn trials_for(&self, index: usize) -> &[Trial] {
        self.trials.get(index).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[derive(Clone, Copy, Debug)]
pub struct StatsAggregator {
    pub std_dev: StdDevKind,
    pub uneven: UnevenTrialPolicy,
}

impl StatsAggregator {
    pub fn new(std_dev: StdDevKind, uneven: UnevenTrialPolicy) -> Self {
        StatsAggregator { std_dev, uneven }
    }

    pub fn from_config(config: &HarnessConfig) -> Self {
        Self::new(config.std_dev, config.uneven_trials)
    }

    /// Runs `experiments` in order, `repeats` times over. Membership is reset before
    /// every growth so each one starts from a lone introducer.
    pub async fn run_repeated(
        &self,
        runner: &mut ExperimentRunner,
        experiments: &[Experiment],
        repeats: usize,
    ) -> Result<RepeatedRuns, HarnessError> {
        let mut runs = RepeatedRuns { trials: vec![Vec::new(); experiments.len()], bursts: Vec::new() };

        for repeat in 0..repeats {
            info!("[Aggregator] Repeat {}/{}", repeat + 1, repeats);
            for (index, experiment) in experiments.iter().enumerate() {
                if matches!(experiment, Experiment::Growth { .. }) {
                    runner.reset_membership().await?;
                }
                match runner.run(experiment, repeat).await? {
                    ExperimentOutcome::Trial(trial) => {
                        if !trial.completed {
                            warn!(
                                "[Aggregator] {:?} repeat {} ended early after {} measurement(s)",
                                trial.experiment,
                                repeat,
                                trial.measurements.len()
                            );
                        }
                        runs.trials[index].push(trial);
                    }
                    ExperimentOutcome::Burst(report) => runs.bursts.push(report),
                }
            }
        }
        Ok(runs)
    }

    /// Per-size mean/std of the successful `kind` measurements across `trials`.
    ///
    /// Measurements are keyed by the membership size they produced, and every value a
    /// trial recorded at one size is pooled. Only sizes reached by every trial become
    /// points, in the order the first trial reached them.
    pub fn aggregate(&self, trials: &[Trial], kind: OperationKind) -> Result<Vec<PointStats>, HarnessError> {
        let series: Vec<Vec<(usize, Vec<f64>)>> = trials.iter().map(|t| by_size(&t.durations(kind))).collect();
        let Some(first) = series.first() else {
            return Ok(Vec::new());
        };

        let shared: Vec<usize> = first
            .iter()
            .map(|(size, _)| *size)
            .filter(|size| series.iter().all(|s| s.iter().any(|(n, _)| n == size)))
            .collect();
        let lengths: Vec<usize> = series.iter().map(Vec::len).collect();
        if lengths.iter().any(|&l| l != shared.len()) {
            match self.uneven {
                UnevenTrialPolicy::Reject => return Err(HarnessError::UnevenTrials { lengths }),
                UnevenTrialPolicy::Truncate => {
                    warn!(
                        "[Aggregator] Uneven {:?} trials cover {:?} size(s); keeping the {} reached by all",
                        kind,
                        lengths,
                        shared.len()
                    );
                }
            }
        }

        Ok(shared
            .into_iter()
            .map(|size| {
                let xs: Vec<f64> = series
                    .iter()
                    .flat_map(|s| s.iter().filter(|(n, _)| *n == size).flat_map(|(_, v)| v.iter().copied()))
                    .collect();
                PointStats { nodes: size, mean: mean(&xs), std_dev: std_dev(&xs, self.std_dev), samples: xs.len() }
            })
            .collect())
    }
}

// Groups `(size, seconds)` pairs by size, keeping the order sizes first appear in.
fn by_size(durations: &[(usize, f64)]) -> Vec<(usize, Vec<f64>)> {
    let mut groups: Vec<(usize, Vec<f64>)> = Vec::new();
    for &(size, secs) in durations {
        match groups.iter_mut().find(|(n, _)| *n == size) {
            Some((_, xs)) => xs.push(secs),
            None => groups.push((size, vec![secs])),
        }
    }
    groups
}

fn fold_into(records: &mut BTreeMap<usize, ResultRecord>, points: &[PointStats], set: impl Fn(&mut ResultRecord, &PointStats)) {
    for p in points {
        let r = records.entry(p.nodes).or_insert_with(|| ResultRecord { nodes: p.nodes, ..Default::default() });
        set(r, p);
    }
}

/// Joins the two series into records keyed by node count, ascending. A count
/// missing from one series gets 0.0 for that side.
pub fn merge_records(join: &[PointStats], leave: &[PointStats]) -> Vec<ResultRecord> {
    let mut records: BTreeMap<usize, ResultRecord> = BTreeMap::new();
    fold_into(&mut records, join, |r, p| {
        r.join_avg = p.mean;
        r.join_std = p.std_dev;
        r.samples = r.samples.max(p.samples);
    });
    fold_into(&mut records, leave, |r, p| {
        r.leave_avg = p.mean;
        r.leave_std = p.std_dev;
        r.samples = r.samples.max(p.samples);
    });
    records.into_values().collect()
}

/// Adds put/get timings to `records`. `samples` keeps counting trials, not reads.
pub fn merge_storage(records: Vec<ResultRecord>, put: &[PointStats], get: &[PointStats]) -> Vec<ResultRecord> {
    let mut records: BTreeMap<usize, ResultRecord> = records.into_iter().map(|r| (r.nodes, r)).collect();
    fold_into(&mut records, put, |r, p| {
        r.put_avg = p.mean;
        r.put_std = p.std_dev;
    });
    fold_into(&mut records, get, |r, p| {
        r.get_avg = p.mean;
        r.get_std = p.std_dev;
    });
    records.into_values().collect()
}

/// Keeps only the records whose node count is one of `counts`. A scaling run also
/// measures the sizes it passes through on the way to each count.
pub fn select_counts(records: Vec<ResultRecord>, counts: &[usize]) -> Vec<ResultRecord> {
    records.into_iter().filter(|r| counts.contains(&r.nodes)).collect()
}
