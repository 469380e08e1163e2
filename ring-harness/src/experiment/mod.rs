// Scenario orchestration, aggregation and result output.

pub mod metrics;
pub mod runner;
pub mod sink;
pub mod types;

pub use metrics::{merge_records, merge_storage, select_counts, PointStats, RepeatedRuns, StatsAggregator};
pub use runner::{BurstSettings, ExperimentRunner, StorageProbe};
pub use sink::{ResultSink, RESULTS_VARIABLE};
pub use types::{
    BurstFailure, BurstOutcome, BurstReport, BurstResult, Experiment, ExperimentKind, ExperimentOutcome, Measurement,
    MeasurementOutcome, OperationKind, PendingMeasurement, ResultRecord, Trial,
};
