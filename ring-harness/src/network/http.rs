use async_trait::async_trait;
use log::{debug, warn};
use reqwest::{Client, Response, StatusCode, Url};
use std::time::Duration;

use crate::data_structures::{NodeAddr, NodeHandle, NodeState};
use crate::error::HarnessError;
use crate::network::{ControlError, InfoOutcome, NodeControl, NodeInfo};

/// `NodeControl` over the nodes' HTTP control surface.
#[derive(Clone, Debug)]
pub struct HttpController {
    client: Client,
}

impl HttpController {
    pub fn new(request_timeout: Duration) -> Result<Self, HarnessError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| HarnessError::Config(format!("cannot build HTTP client: {}", e)))?;
        Ok(HttpController { client })
    }

    fn url(addr: &NodeAddr, path: &str) -> String {
        format!("http://{}/{}", addr, path)
    }

    // `/storage/{key}` with the key percent-encoded as a single path segment.
    fn storage_url(addr: &NodeAddr, key: &str) -> Result<Url, ControlError> {
        let mut url = Url::parse(&format!("http://{}/", addr))
            .map_err(|e| ControlError::Malformed(format!("bad node url: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| ControlError::Malformed("node url cannot carry a path".into()))?
            .pop_if_empty()
            .push("storage")
            .push(key);
        Ok(url)
    }

    fn storage_request_url(node: &NodeHandle, key: &str) -> Result<Url, ControlError> {
        Self::storage_url(node.addr(), key).map_err(|e| {
            warn!("[Controller] Cannot address storage on {}: {}", node.addr(), e);
            node.set_state(NodeState::Unknown);
            e
        })
    }

    fn transport_error(node: &NodeHandle, err: reqwest::Error) -> ControlError {
        node.set_state(NodeState::Unreachable);
        if err.is_timeout() {
            debug!("[Controller] {} timed out", node.addr());
            ControlError::Timeout
        } else {
            debug!("[Controller] {} transport error: {}", node.addr(), err);
            ControlError::Transport(err.to_string())
        }
    }

    // Maps a raw response onto the success/failure contract and records the
    // observed state. `on_success` is the state a successful call implies.
    fn check_status(
        node: &NodeHandle,
        resp: Response,
        accepted: &[StatusCode],
        on_success: NodeState,
    ) -> Result<Response, ControlError> {
        let status = resp.status();
        if accepted.contains(&status) {
            node.set_state(on_success);
            return Ok(resp);
        }
        match status {
            StatusCode::SERVICE_UNAVAILABLE => node.set_state(NodeState::Crashed),
            _ => node.set_state(NodeState::Unknown),
        }
        if status == StatusCode::NOT_FOUND {
            Err(ControlError::NotFound)
        } else {
            Err(ControlError::UnexpectedStatus(status.as_u16()))
        }
    }

    async fn post_admin(&self, node: &NodeHandle, path: &str, on_success: NodeState) -> Result<(), ControlError> {
        let resp = self
            .client
            .post(Self::url(node.addr(), path))
            .send()
            .await
            .map_err(|e| Self::transport_error(node, e))?;
        Self::check_status(node, resp, &[StatusCode::OK], on_success).map(|_| ())
    }
}

#[async_trait]
impl NodeControl for HttpController {
    async fn join(&self, node: &NodeHandle, introducer: &NodeAddr) -> Result<(), ControlError> {
        debug!("[Controller] join {} via {}", node.addr(), introducer);
        let resp = self
            .client
            .post(Self::url(node.addr(), "join"))
            .query(&[("nprime", introducer.as_str())])
            .send()
            .await
            .map_err(|e| Self::transport_error(node, e))?;
        Self::check_status(node, resp, &[StatusCode::OK], NodeState::Operational).map(|_| ())
    }

    async fn leave(&self, node: &NodeHandle) -> Result<(), ControlError> {
        debug!("[Controller] leave {}", node.addr());
        self.post_admin(node, "leave", NodeState::Operational).await
    }

    async fn crash(&self, node: &NodeHandle) -> Result<(), ControlError> {
        debug!("[Controller] sim-crash {}", node.addr());
        self.post_admin(node, "sim-crash", NodeState::Crashed).await
    }

    async fn recover(&self, node: &NodeHandle) -> Result<(), ControlError> {
        debug!("[Controller] sim-recover {}", node.addr());
        self.post_admin(node, "sim-recover", NodeState::Operational).await
    }

    async fn query_info(&self, node: &NodeHandle) -> InfoOutcome {
        let resp = match self.client.get(Self::url(node.addr(), "node-info")).send().await {
            Ok(resp) => resp,
            Err(e) => {
                Self::transport_error(node, e);
                return InfoOutcome::Unreachable;
            }
        };
        match resp.status() {
            StatusCode::OK => match resp.json::<NodeInfo>().await {
                Ok(info) => {
                    node.set_state(NodeState::Operational);
                    InfoOutcome::Healthy(info)
                }
                Err(e) => {
                    // Protocol error: no usable answer.
                    warn!("[Controller] {} returned an unparseable node-info body: {}", node.addr(), e);
                    node.set_state(NodeState::Unreachable);
                    InfoOutcome::Unreachable
                }
            },
            StatusCode::SERVICE_UNAVAILABLE => {
                node.set_state(NodeState::Crashed);
                InfoOutcome::Crashed
            }
            other => {
                warn!("[Controller] {} answered node-info with unexpected status {}", node.addr(), other);
                node.set_state(NodeState::Unreachable);
                InfoOutcome::Unreachable
            }
        }
    }

    async fn put(&self, node: &NodeHandle, key: &str, value: &str) -> Result<(), ControlError> {
        let url = Self::storage_request_url(node, key)?;
        let resp = self
            .client
            .put(url)
            .body(value.to_string())
            .send()
            .await
            .map_err(|e| Self::transport_error(node, e))?;
        Self::check_status(node, resp, &[StatusCode::OK, StatusCode::CREATED], NodeState::Operational).map(|_| ())
    }

    async fn get(&self, node: &NodeHandle, key: &str) -> Result<String, ControlError> {
        let url = Self::storage_request_url(node, key)?;
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Self::transport_error(node, e))?;
        let resp = Self::check_status(node, resp, &[StatusCode::OK], NodeState::Operational)?;
        // The status was fine but the body never arrived in full.
        resp.text().await.map_err(|e| Self::transport_error(node, e))
    }

    async fn shutdown(&self, node: &NodeHandle) {
        match self.client.post(Self::url(node.addr(), "shutdown")).send().await {
            Ok(resp) => debug!("[Controller] shutdown {} answered {}", node.addr(), resp.status()),
            // Expected when the process exits before replying.
            Err(e) => debug!("[Controller] shutdown {} got no answer: {}", node.addr(), e),
        }
        node.set_state(NodeState::Unreachable);
    }
}
