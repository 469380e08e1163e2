// ring-harness/src/test_utils.rs
// In-memory stand-in for a ring DHT cluster. `MockController` drives it directly;
// the integration tests put it behind fake HTTP nodes.

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::time::Instant;

use crate::data_structures::{NodeAddr, NodeHandle, NodeState};
use crate::network::{ControlError, InfoOutcome, NodeControl, NodeInfo};

/// Deterministic localhost endpoints, `127.0.0.1:9000` upwards.
pub fn test_addrs(n: usize) -> Vec<NodeAddr> {
    (0..n)
        .map(|i| format!("127.0.0.1:{}", 9000 + i).parse().expect("valid test address"))
        .collect()
}

// How the model refuses an operation. The fake HTTP node maps these onto statuses.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModelError {
    Unreachable,
    Crashed,       // 503
    Rejected(u16), // Any other non-success status
    NotFound,      // 404
}

impl From<ModelError> for ControlError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::Unreachable => ControlError::Transport("connection refused".into()),
            ModelError::Crashed => ControlError::UnexpectedStatus(503),
            ModelError::Rejected(status) => ControlError::UnexpectedStatus(status),
            ModelError::NotFound => ControlError::NotFound,
        }
    }
}

/// A ring that converges instantly: successors and peer lists are derived from the
/// live membership on every query. Storage is shared, as if fully replicated.
#[derive(Debug, Default)]
pub struct RingModel {
    joined: BTreeSet<NodeAddr>,
    crashed: HashSet<NodeAddr>,
    shut_down: HashSet<NodeAddr>,
    storage: HashMap<String, String>,

    // Fault knobs
    pub null_successor: HashSet<NodeAddr>,
    pub unreachable: HashSet<NodeAddr>,
    pub ignore_crash: HashSet<NodeAddr>, // Accepts sim-crash but keeps serving
    pub ignore_recover: HashSet<NodeAddr>,
    pub failing_joins: HashSet<NodeAddr>,
    pub silent_when_crashed: HashSet<NodeAddr>, // Node-info times out instead of answering 503
}

impl RingModel {
    /// A ring holding only `introducer`.
    pub fn new(introducer: &NodeAddr) -> Self {
        let mut model = RingModel::default();
        model.joined.insert(introducer.clone());
        model
    }

    pub fn is_joined(&self, addr: &NodeAddr) -> bool {
        self.joined.contains(addr)
    }

    pub fn is_crashed(&self, addr: &NodeAddr) -> bool {
        self.crashed.contains(addr)
    }

    pub fn is_shut_down(&self, addr: &NodeAddr) -> bool {
        self.shut_down.contains(addr)
    }

    pub fn member_count(&self) -> usize {
        self.joined.len()
    }

    fn reachable(&self, addr: &NodeAddr) -> Result<(), ModelError> {
        if self.unreachable.contains(addr) || self.shut_down.contains(addr) {
            return Err(ModelError::Unreachable);
        }
        Ok(())
    }

    fn serving(&self, addr: &NodeAddr) -> Result<(), ModelError> {
        self.reachable(addr)?;
        if self.crashed.contains(addr) {
            return Err(ModelError::Crashed);
        }
        Ok(())
    }

    fn live_members(&self) -> Vec<&NodeAddr> {
        self.joined.iter().filter(|a| !self.crashed.contains(*a)).collect()
    }

    pub fn join(&mut self, addr: &NodeAddr, nprime: &NodeAddr) -> Result<(), ModelError> {
        self.serving(addr)?;
        if self.failing_joins.contains(addr) {
            return Err(ModelError::Rejected(500));
        }
        if !self.joined.contains(nprime) || self.crashed.contains(nprime) {
            return Err(ModelError::Rejected(400));
        }
        self.joined.insert(addr.clone());
        Ok(())
    }

    pub fn leave(&mut self, addr: &NodeAddr) -> Result<(), ModelError> {
        self.serving(addr)?;
        if !self.joined.remove(addr) {
            return Err(ModelError::Rejected(400));
        }
        Ok(())
    }

    pub fn crash(&mut self, addr: &NodeAddr) -> Result<(), ModelError> {
        self.reachable(addr)?;
        if !self.ignore_crash.contains(addr) {
            self.crashed.insert(addr.clone());
        }
        Ok(())
    }

    pub fn recover(&mut self, addr: &NodeAddr) -> Result<(), ModelError> {
        self.reachable(addr)?;
        if !self.ignore_recover.contains(addr) {
            self.crashed.remove(addr);
        }
        Ok(())
    }

    pub fn info(&self, addr: &NodeAddr) -> Result<NodeInfo, ModelError> {
        if self.crashed.contains(addr) && self.silent_when_crashed.contains(addr) {
            return Err(ModelError::Unreachable);
        }
        self.serving(addr)?;
        if !self.joined.contains(addr) {
            // Unjoined node: alone, knows nobody.
            return Ok(NodeInfo { successor: None, predecessor: None, others: vec![], node_hash: None });
        }
        let live = self.live_members();
        let pos = live.iter().position(|a| *a == addr).unwrap_or(0);
        let successor = live[(pos + 1) % live.len()].to_string();
        let predecessor = live[(pos + live.len() - 1) % live.len()].to_string();
        let others = live.iter().filter(|a| **a != addr).map(|a| a.to_string()).collect();
        Ok(NodeInfo {
            successor: if self.null_successor.contains(addr) { None } else { Some(successor) },
            predecessor: Some(predecessor),
            others,
            node_hash: Some(serde_json::json!(addr.port())),
        })
    }

    pub fn put(&mut self, addr: &NodeAddr, key: &str, value: &str) -> Result<(), ModelError> {
        self.serving(addr)?;
        if !self.joined.contains(addr) {
            return Err(ModelError::Rejected(500));
        }
        self.storage.insert(key.to_string(), value.to_string());
        Ok(())
    }

    pub fn get(&self, addr: &NodeAddr, key: &str) -> Result<String, ModelError> {
        self.serving(addr)?;
        if !self.joined.contains(addr) {
            return Err(ModelError::Rejected(500));
        }
        self.storage.get(key).cloned().ok_or(ModelError::NotFound)
    }

    pub fn shutdown(&mut self, addr: &NodeAddr) {
        self.shut_down.insert(addr.clone());
    }
}

/// `NodeControl` straight onto a shared `RingModel`, recording every call.
#[derive(Clone, Debug)]
pub struct MockController {
    pub model: Arc<Mutex<RingModel>>,
    calls: Arc<Mutex<Vec<(&'static str, NodeAddr, Instant)>>>,
}

impl MockController {
    pub fn new(model: RingModel) -> Self {
        MockController { model: Arc::new(Mutex::new(model)), calls: Arc::new(Mutex::new(Vec::new())) }
    }

    /// Convenience: model with `addrs[0]` as the only ring member.
    pub fn for_addrs(addrs: &[NodeAddr]) -> Self {
        Self::new(RingModel::new(&addrs[0]))
    }

    pub fn with_model<R>(&self, f: impl FnOnce(&mut RingModel) -> R) -> R {
        f(&mut self.model.lock().unwrap())
    }

    pub fn call_count(&self, op: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|(o, _, _)| *o == op).count()
    }

    pub fn calls_for(&self, op: &str) -> Vec<NodeAddr> {
        self.calls.lock().unwrap().iter().filter(|(o, _, _)| *o == op).map(|(_, a, _)| a.clone()).collect()
    }

    /// When each `op` call was issued, in call order.
    pub fn call_times(&self, op: &str) -> Vec<Instant> {
        self.calls.lock().unwrap().iter().filter(|(o, _, _)| *o == op).map(|(_, _, t)| *t).collect()
    }

    fn record(&self, op: &'static str, node: &NodeHandle) {
        self.calls.lock().unwrap().push((op, node.addr().clone(), Instant::now()));
    }

    fn observe(node: &NodeHandle, result: &Result<(), ModelError>, on_success: NodeState) {
        let state = match result {
            Ok(()) => on_success,
            Err(ModelError::Unreachable) => NodeState::Unreachable,
            Err(ModelError::Crashed) => NodeState::Crashed,
            Err(_) => NodeState::Unknown,
        };
        node.set_state(state);
    }

    fn admin(
        &self,
        op: &'static str,
        node: &NodeHandle,
        on_success: NodeState,
        f: impl FnOnce(&mut RingModel, &NodeAddr) -> Result<(), ModelError>,
    ) -> Result<(), ControlError> {
        self.record(op, node);
        let result = f(&mut self.model.lock().unwrap(), node.addr());
        Self::observe(node, &result, on_success);
        result.map_err(ControlError::from)
    }
}

#[async_trait]
impl NodeControl for MockController {
    async fn join(&self, node: &NodeHandle, introducer: &NodeAddr) -> Result<(), ControlError> {
        self.admin("join", node, NodeState::Operational, |m, a| m.join(a, introducer))
    }

    async fn leave(&self, node: &NodeHandle) -> Result<(), ControlError> {
        self.admin("leave", node, NodeState::Operational, |m, a| m.leave(a))
    }

    async fn crash(&self, node: &NodeHandle) -> Result<(), ControlError> {
        self.admin("crash", node, NodeState::Crashed, |m, a| m.crash(a))
    }

    async fn recover(&self, node: &NodeHandle) -> Result<(), ControlError> {
        self.admin("recover", node, NodeState::Operational, |m, a| m.recover(a))
    }

    async fn query_info(&self, node: &NodeHandle) -> InfoOutcome {
        self.record("info", node);
        let result = self.model.lock().unwrap().info(node.addr());
        match result {
            Ok(info) => {
                node.set_state(NodeState::Operational);
                InfoOutcome::Healthy(info)
            }
            Err(ModelError::Crashed) => {
                node.set_state(NodeState::Crashed);
                InfoOutcome::Crashed
            }
            Err(_) => {
                node.set_state(NodeState::Unreachable);
                InfoOutcome::Unreachable
            }
        }
    }

    async fn put(&self, node: &NodeHandle, key: &str, value: &str) -> Result<(), ControlError> {
        self.admin("put", node, NodeState::Operational, |m, a| m.put(a, key, value))
    }

    async fn get(&self, node: &NodeHandle, key: &str) -> Result<String, ControlError> {
        self.record("get", node);
        let result = self.model.lock().unwrap().get(node.addr(), key);
        let observed = result.as_ref().map(|_| ()).map_err(Clone::clone);
        Self::observe(node, &observed, NodeState::Operational);
        result.map_err(ControlError::from)
    }

    async fn shutdown(&self, node: &NodeHandle) {
        self.record("shutdown", node);
        self.model.lock().unwrap().shutdown(node.addr());
        node.set_state(NodeState::Unreachable);
    }
}
