use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use crate::error::HarnessError;

// A cluster member endpoint in `host:port` form, exactly as the launcher reports it
// and as the join call expects it in `nprime=`.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeAddr(String);

impl NodeAddr {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn port(&self) -> u16 {
        // Validated on construction.
        self.0
            .rsplit_once(':')
            .and_then(|(_, port)| port.parse().ok())
            .unwrap_or_default()
    }
}

impl FromStr for NodeAddr {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (host, port) = trimmed
            .rsplit_once(':')
            .ok_or_else(|| HarnessError::Discovery(format!("endpoint `{}` is not host:port", s)))?;
        if host.is_empty() || host.contains('/') {
            return Err(HarnessError::Discovery(format!("endpoint `{}` has an invalid host", s)));
        }
        port.parse::<u16>()
            .map_err(|_| HarnessError::Discovery(format!("endpoint `{}` has an invalid port", s)))?;
        Ok(NodeAddr(trimmed.to_string()))
    }
}

impl TryFrom<String> for NodeAddr {
    type Error = HarnessError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<NodeAddr> for String {
    fn from(addr: NodeAddr) -> Self {
        addr.0
    }
}

impl fmt::Display for NodeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Last observed health of a node, as seen from the controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum NodeState {
    Unknown = 0,
    Operational = 1,
    Crashed = 2,     // Answered 503: in simulated-crash state
    Unreachable = 3, // Connection failure or timeout
}

impl NodeState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => NodeState::Operational,
            2 => NodeState::Crashed,
            3 => NodeState::Unreachable,
            _ => NodeState::Unknown,
        }
    }
}

/// Address plus last observed state for one cluster member.
///
/// Clones share the state cell, so a subset of the cluster handed to the validator
/// (e.g. burst survivors) updates the same handles the cluster holds.
#[derive(Clone, Debug)]
pub struct NodeHandle {
    addr: NodeAddr,
    state: Arc<AtomicU8>,
}

impl NodeHandle {
    pub fn new(addr: NodeAddr) -> Self {
        NodeHandle { addr, state: Arc::new(AtomicU8::new(NodeState::Unknown as u8)) }
    }

    pub fn addr(&self) -> &NodeAddr {
        &self.addr
    }

    pub fn state(&self) -> NodeState {
        NodeState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn set_state(&self, state: NodeState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

impl PartialEq for NodeHandle {
    fn eq(&self, other: &Self) -> bool {
        self.addr == other.addr
    }
}

impl Eq for NodeHandle {}

// The full node set under test.
// `nodes` holds every discovered endpoint; the ring membership is always the prefix
// `nodes[..joined]`, since growth joins in order and shrink leaves from the tail.
#[derive(Debug)]
pub struct Cluster {
    nodes: Vec<NodeHandle>,
    joined: usize,
}

impl Cluster {
    /// Builds a cluster whose ring initially holds only the introducer (element 0).
    pub fn new(addrs: Vec<NodeAddr>) -> Result<Self, HarnessError> {
        if addrs.is_empty() {
            return Err(HarnessError::Discovery("no endpoints discovered".into()));
        }
        let mut seen = HashSet::new();
        for addr in &addrs {
            if !seen.insert(addr) {
                return Err(HarnessError::Discovery(format!("duplicate endpoint {}", addr)));
            }
        }
        Ok(Cluster { nodes: addrs.into_iter().map(NodeHandle::new).collect(), joined: 1 })
    }

    pub fn introducer(&self) -> &NodeHandle {
        &self.nodes[0]
    }

    pub fn nodes(&self) -> &[NodeHandle] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Current ring members, introducer first.
    pub fn members(&self) -> &[NodeHandle] {
        &self.nodes[..self.joined]
    }

    pub fn member_count(&self) -> usize {
        self.joined
    }

    pub fn next_unjoined(&self) -> Option<&NodeHandle> {
        self.nodes.get(self.joined)
    }

    /// Tail member, i.e. the next one a shrink step removes. Never the introducer.
    pub fn last_member(&self) -> Option<&NodeHandle> {
        if self.joined > 1 {
            self.nodes.get(self.joined - 1)
        } else {
            None
        }
    }

    pub(crate) fn mark_joined(&mut self) {
        if self.joined < self.nodes.len() {
            self.joined += 1;
        }
    }

    pub(crate) fn mark_left(&mut self) {
        if self.joined > 1 {
            self.joined -= 1;
        }
    }
}
