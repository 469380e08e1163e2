use async_trait::async_trait;
use log::{debug, warn};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

use crate::data_structures::{NodeAddr, NodeHandle};
use crate::liveness::assess;
use crate::network::NodeControl;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationReason {
    Crashed,
    Unreachable,
    NullSuccessor,
    NoPeers,
}

impl fmt::Display for ViolationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ViolationReason::Crashed => "crashed",
            ViolationReason::Unreachable => "unreachable",
            ViolationReason::NullSuccessor => "null successor",
            ViolationReason::NoPeers => "empty peer list",
        };
        f.write_str(text)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub addr: NodeAddr,
    pub reason: ViolationReason,
}

/// Result of one validation pass. Conjunctive: a single violation fails the whole set.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub checked: usize,
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    pub fn is_consistent(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Ring-invariant check over a node set. A trait so scenarios can run against a
/// scripted validator.
#[async_trait]
pub trait ConsistencyCheck: Send + Sync {
    async fn validate(&self, nodes: &[NodeHandle]) -> ValidationReport;
}

/// Validates by querying every node's info through the controller.
#[derive(Clone)]
pub struct RingValidator {
    control: Arc<dyn NodeControl>,
}

impl RingValidator {
    pub fn new(control: Arc<dyn NodeControl>) -> Self {
        RingValidator { control }
    }
}

#[async_trait]
impl ConsistencyCheck for RingValidator {
    async fn validate(&self, nodes: &[NodeHandle]) -> ValidationReport {
        let mut report = ValidationReport { checked: nodes.len(), violations: Vec::new() };
        // Every node is queried, even after the first violation, so the report is complete.
        for node in nodes {
            let outcome = self.control.query_info(node).await;
            if let Some(reason) = assess(&outcome) {
                warn!("[Validator] Node {} is inconsistent: {}", node.addr(), reason);
                report.violations.push(Violation { addr: node.addr().clone(), reason });
            }
        }
        debug!(
            "[Validator] Checked {} node(s), {} violation(s)",
            report.checked,
            report.violations.len()
        );
        report
    }
}
