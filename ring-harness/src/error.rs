use thiserror::Error;

/// Run-level failures. Per-operation problems never surface here; they are
/// turned into `ControlError`s at the controller boundary and recorded on
/// measurements or burst results instead.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// The launcher did not yield a usable endpoint list. Fatal: there is no cluster.
    #[error("cluster discovery failed: {0}")]
    Discovery(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    /// The harness could not bring the ring to the membership a scenario starts from.
    #[error("membership reset failed: {0}")]
    Membership(String),

    /// Raised only under `UnevenTrialPolicy::Reject`.
    #[error("trial lengths differ across repeats: {lengths:?}")]
    UnevenTrials { lengths: Vec<usize> },

    #[error("failed to spawn launcher `{program}`: {source}")]
    Launcher {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("result artifact I/O failed for {path}: {source}")]
    Persist {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed result artifact: {0}")]
    Artifact(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
