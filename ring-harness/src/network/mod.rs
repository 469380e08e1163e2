// Administrative control plane of a ring DHT node.

pub mod http;

pub use http::HttpController;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data_structures::{NodeAddr, NodeHandle};

/// Body of `GET /node-info`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub successor: Option<String>,
    #[serde(default)]
    pub predecessor: Option<String>,
    #[serde(default)]
    pub others: Vec<String>, // Peers the node currently knows about
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_hash: Option<serde_json::Value>, // Opaque; format is up to the node implementation
}

/// The only way the rest of the harness observes node health.
///
/// `Crashed` (the node answered 503 because it was told to crash) and `Unreachable`
/// (no usable answer) are kept apart: burst-fault runs expect the former and treat
/// the latter as an anomaly.
#[derive(Clone, Debug, PartialEq)]
pub enum InfoOutcome {
    Healthy(NodeInfo),
    Crashed,
    Unreachable,
}

impl InfoOutcome {
    pub fn is_healthy(&self) -> bool {
        matches!(self, InfoOutcome::Healthy(_))
    }
}

/// Why a single administrative call failed. Never fatal to a run.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ControlError {
    #[error("request timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("unexpected HTTP status {0}")]
    UnexpectedStatus(u16),
    #[error("key not found")]
    NotFound,
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Administrative calls against one node. Every call updates the handle's
/// last observed state.
#[async_trait]
pub trait NodeControl: Send + Sync {
    async fn join(&self, node: &NodeHandle, introducer: &NodeAddr) -> Result<(), ControlError>;

    async fn leave(&self, node: &NodeHandle) -> Result<(), ControlError>;

    async fn crash(&self, node: &NodeHandle) -> Result<(), ControlError>;

    async fn recover(&self, node: &NodeHandle) -> Result<(), ControlError>;

    async fn query_info(&self, node: &NodeHandle) -> InfoOutcome;

    async fn put(&self, node: &NodeHandle, key: &str, value: &str) -> Result<(), ControlError>;

    async fn get(&self, node: &NodeHandle, key: &str) -> Result<String, ControlError>;

    /// Terminal call. The node may die before answering, so no response is required.
    async fn shutdown(&self, node: &NodeHandle);
}
