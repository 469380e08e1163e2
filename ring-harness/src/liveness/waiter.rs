use log::{debug, warn};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout_at, Instant};

use crate::data_structures::{NodeAddr, NodeHandle};
use crate::liveness::assess;
use crate::network::NodeControl;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum StabilityOutcome {
    Stable {
        polls: u32,
        #[serde(with = "humantime_serde")]
        elapsed: Duration,
    },
    /// Deadline passed with at least one node still unsettled on the last poll.
    TimedOut {
        polls: u32,
        #[serde(with = "humantime_serde")]
        elapsed: Duration,
        unsettled: Vec<NodeAddr>,
    },
}

impl StabilityOutcome {
    pub fn is_stable(&self) -> bool {
        matches!(self, StabilityOutcome::Stable { .. })
    }
}

/// Polls every node in `nodes` until all report a successor and a non-empty peer list,
/// or `deadline` elapses. Each poll is itself cut off at the deadline, so slow answers
/// cannot stretch the barrier past it; after that the outcome is `TimedOut`, never a
/// silent pass.
pub async fn await_stable(
    control: &dyn NodeControl,
    nodes: &[NodeHandle],
    poll_interval: Duration,
    deadline: Duration,
) -> StabilityOutcome {
    let start = Instant::now();
    let deadline_at = start + deadline;
    let mut polls = 0u32;

    loop {
        polls += 1;
        let mut settled: Vec<&NodeAddr> = Vec::with_capacity(nodes.len());
        let poll = async {
            for node in nodes {
                if assess(&control.query_info(node).await).is_none() {
                    settled.push(node.addr());
                }
            }
        };
        let finished = timeout_at(deadline_at, poll).await.is_ok();
        let unsettled: Vec<NodeAddr> = nodes
            .iter()
            .map(NodeHandle::addr)
            .filter(|addr| !settled.contains(addr))
            .cloned()
            .collect();

        if finished && unsettled.is_empty() {
            debug!("[Waiter] {} node(s) stable after {} poll(s)", nodes.len(), polls);
            return StabilityOutcome::Stable { polls, elapsed: start.elapsed() };
        }

        let now = Instant::now();
        if now >= deadline_at {
            warn!(
                "[Waiter] Gave up after {} poll(s) ({:?}); unsettled: {:?}",
                polls,
                start.elapsed(),
                unsettled
            );
            return StabilityOutcome::TimedOut { polls, elapsed: start.elapsed(), unsettled };
        }
        sleep(poll_interval.min(deadline_at - now)).await;
    }
}

/// `await_stable` bound to a controller and the configured poll settings.
#[derive(Clone)]
pub struct StabilizationWaiter {
    control: Arc<dyn NodeControl>,
    pub poll_interval: Duration,
    pub deadline: Duration,
}

impl StabilizationWaiter {
    pub fn new(control: Arc<dyn NodeControl>, poll_interval: Duration, deadline: Duration) -> Self {
        StabilizationWaiter { control, poll_interval, deadline }
    }

    pub async fn await_stable(&self, nodes: &[NodeHandle]) -> StabilityOutcome {
        await_stable(self.control.as_ref(), nodes, self.poll_interval, self.deadline).await
    }
}
