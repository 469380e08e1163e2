use log::info;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::HarnessError;
use crate::experiment::types::{BurstReport, ResultRecord};

/// Variable name the plotting scripts read the records from.
pub const RESULTS_VARIABLE: &str = "no_finger_results";

/// `no_finger_results = [...]`, newline-terminated.
pub fn render(records: &[ResultRecord]) -> Result<String, HarnessError> {
    Ok(format!("{} = {}\n", RESULTS_VARIABLE, serde_json::to_string(records)?))
}

pub fn parse(text: &str) -> Result<Vec<ResultRecord>, HarnessError> {
    let (name, body) = text
        .split_once('=')
        .ok_or_else(|| HarnessError::Artifact("missing `=` assignment".into()))?;
    if name.trim() != RESULTS_VARIABLE {
        return Err(HarnessError::Artifact(format!(
            "expected `{}`, found `{}`",
            RESULTS_VARIABLE,
            name.trim()
        )));
    }
    Ok(serde_json::from_str(body.trim())?)
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> HarnessError + '_ {
    move |source| HarnessError::Persist { path: path.display().to_string(), source }
}

/// Writes result artifacts to a fixed location.
#[derive(Clone, Debug)]
pub struct ResultSink {
    path: PathBuf,
}

impl ResultSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        ResultSink { path: path.into() }
    }

    pub fn persist(&self, records: &[ResultRecord]) -> Result<(), HarnessError> {
        fs::write(&self.path, render(records)?).map_err(io_error(&self.path))?;
        info!("[Sink] Wrote {} record(s) to {}", records.len(), self.path.display());
        Ok(())
    }

    pub fn load(&self) -> Result<Vec<ResultRecord>, HarnessError> {
        parse(&fs::read_to_string(&self.path).map_err(io_error(&self.path))?)
    }

    /// Burst reports as pretty JSON at `path`.
    pub fn persist_bursts(path: &Path, reports: &[BurstReport]) -> Result<(), HarnessError> {
        fs::write(path, serde_json::to_string_pretty(reports)?).map_err(io_error(path))?;
        info!("[Sink] Wrote {} burst report(s) to {}", reports.len(), path.display());
        Ok(())
    }
}
