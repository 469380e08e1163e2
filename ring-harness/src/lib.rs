// Experiment orchestration and fault injection for ring DHT clusters.

pub mod config;
pub mod data_structures;
pub mod discovery;
pub mod error;
pub mod experiment;
pub mod liveness;
pub mod network;

pub mod test_utils; // Shared by unit tests and the integration tests under tests/

pub use config::HarnessConfig;
pub use data_structures::{Cluster, NodeAddr, NodeHandle, NodeState};
pub use error::HarnessError;
