// ring-harness/src/discovery.rs
// Turning "I need N nodes" into N checked endpoints.

use async_trait::async_trait;
use log::{debug, info};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;

use crate::data_structures::NodeAddr;
use crate::error::HarnessError;

/// Source of node endpoints for a run.
#[async_trait]
pub trait ClusterLauncher: Send + Sync {
    /// Exactly `count` distinct endpoints, or a `Discovery` error.
    async fn launch(&self, count: usize) -> Result<Vec<NodeAddr>, HarnessError>;
}

// Accepted manifest shapes: a bare array or an object with a `nodes` array.
#[derive(Deserialize)]
#[serde(untagged)]
enum Manifest {
    List(Vec<String>),
    Object { nodes: Vec<String> },
}

/// Parses a JSON manifest into unique, well-formed addresses.
pub fn parse_manifest(text: &str) -> Result<Vec<NodeAddr>, HarnessError> {
    let manifest: Manifest = serde_json::from_str(text.trim())
        .map_err(|e| HarnessError::Discovery(format!("manifest is not a JSON endpoint list: {}", e)))?;
    let raw = match manifest {
        Manifest::List(nodes) | Manifest::Object { nodes } => nodes,
    };
    let addrs = raw.iter().map(|s| s.parse()).collect::<Result<Vec<NodeAddr>, _>>()?;
    ensure_unique(&addrs)?;
    Ok(addrs)
}

fn ensure_unique(addrs: &[NodeAddr]) -> Result<(), HarnessError> {
    let mut seen = HashSet::new();
    for addr in addrs {
        if !seen.insert(addr) {
            return Err(HarnessError::Discovery(format!("duplicate endpoint {}", addr)));
        }
    }
    Ok(())
}

fn ensure_count(addrs: &[NodeAddr], count: usize) -> Result<(), HarnessError> {
    if addrs.len() != count {
        return Err(HarnessError::Discovery(format!(
            "expected {} endpoint(s), got {}",
            count,
            addrs.len()
        )));
    }
    Ok(())
}

/// Endpoints known up front (config or `--nodes`). Hands out the first `count`.
#[derive(Clone, Debug)]
pub struct StaticLauncher {
    addrs: Vec<NodeAddr>,
}

impl StaticLauncher {
    pub fn new(addrs: Vec<NodeAddr>) -> Self {
        StaticLauncher { addrs }
    }

    /// Comma-separated `host:port` list.
    pub fn from_list(list: &str) -> Result<Self, HarnessError> {
        let addrs = list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::parse)
            .collect::<Result<Vec<NodeAddr>, _>>()?;
        Ok(Self::new(addrs))
    }
}

#[async_trait]
impl ClusterLauncher for StaticLauncher {
    async fn launch(&self, count: usize) -> Result<Vec<NodeAddr>, HarnessError> {
        ensure_unique(&self.addrs)?;
        if self.addrs.len() < count {
            return Err(HarnessError::Discovery(format!(
                "need {} endpoint(s), only {} configured",
                count,
                self.addrs.len()
            )));
        }
        Ok(self.addrs[..count].to_vec())
    }
}

/// Reads a manifest file written by whatever started the nodes.
#[derive(Clone, Debug)]
pub struct ManifestLauncher {
    path: PathBuf,
}

impl ManifestLauncher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        ManifestLauncher { path: path.into() }
    }
}

#[async_trait]
impl ClusterLauncher for ManifestLauncher {
    async fn launch(&self, count: usize) -> Result<Vec<NodeAddr>, HarnessError> {
        let text = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            HarnessError::Discovery(format!("cannot read manifest {}: {}", self.path.display(), e))
        })?;
        let addrs = parse_manifest(&text)?;
        ensure_count(&addrs, count)?;
        info!("[Discovery] {} endpoint(s) from {}", addrs.len(), self.path.display());
        Ok(addrs)
    }
}

/// Runs an external launcher as `<program> <args..> <count>` and reads the
/// manifest from its whole stdout.
#[derive(Clone, Debug)]
pub struct CommandLauncher {
    program: String,
    args: Vec<String>,
}

impl CommandLauncher {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        CommandLauncher { program: program.into(), args }
    }
}

#[async_trait]
impl ClusterLauncher for CommandLauncher {
    async fn launch(&self, count: usize) -> Result<Vec<NodeAddr>, HarnessError> {
        info!("[Discovery] Starting {} node(s) via `{}`", count, self.program);
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg(count.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let output = cmd
            .output()
            .await
            .map_err(|source| HarnessError::Launcher { program: self.program.clone(), source })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(HarnessError::Discovery(format!(
                "launcher exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        debug!("[Discovery] Launcher output: {}", stdout.trim());

        let addrs = parse_manifest(&stdout)?;
        ensure_count(&addrs, count)?;
        Ok(addrs)
    }
}
