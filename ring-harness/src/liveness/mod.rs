// Convergence barrier and ring-invariant checks

pub mod validator;
pub mod waiter;

pub use validator::{ConsistencyCheck, RingValidator, ValidationReport, Violation, ViolationReason};
pub use waiter::{await_stable, StabilityOutcome, StabilizationWaiter};

use crate::network::InfoOutcome;

/// Per-node verdict shared by the waiter and the validator: `None` when the node is
/// healthy with a successor and at least one peer.
pub fn assess(outcome: &InfoOutcome) -> Option<ViolationReason> {
    match outcome {
        InfoOutcome::Healthy(info) => {
            if info.successor.as_deref().map_or(true, str::is_empty) {
                Some(ViolationReason::NullSuccessor)
            } else if info.others.is_empty() {
                Some(ViolationReason::NoPeers)
            } else {
                None
            }
        }
        InfoOutcome::Crashed => Some(ViolationReason::Crashed),
        InfoOutcome::Unreachable => Some(ViolationReason::Unreachable),
    }
}
