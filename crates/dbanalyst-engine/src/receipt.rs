//! Session receipts
//!
//! A receipt is the audit record of a finished session, written as canonical
//! JSON (RFC 8785) to `<receipts dir>/<session id>.json`.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use dbanalyst_utils::error::AnalystError;

use crate::state::{RunState, SessionFailure, StepStatus};

pub const RECEIPT_SCHEMA_VERSION: &str = "1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    Answered,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptStep {
    pub step: usize,
    pub description: String,
    pub status: StepStatus,
    pub attempts: u32,
    pub sql: Option<String>,
    pub row_count: Option<usize>,
    /// `row_count` stopped at the backend row limit
    #[serde(default)]
    pub truncated: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionReceipt {
    pub schema_version: String,
    pub session_id: String,
    pub question: String,
    pub question_blake3: String,
    pub plan: Vec<String>,
    pub steps: Vec<ReceiptStep>,
    pub outcome: SessionOutcome,
    pub answer: Option<String>,
    pub failure: Option<SessionFailure>,
    pub event_count: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SessionReceipt {
    #[must_use]
    pub fn from_state(
        state: &RunState,
        event_count: u64,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> Self {
        let steps = state
            .completed
            .iter()
            .map(|s| ReceiptStep {
                step: s.step,
                description: s.description.clone(),
                status: s.status,
                attempts: s.attempts,
                sql: s.sql.clone(),
                row_count: s.rows.as_ref().map(|r| r.row_count()),
                truncated: s.rows.as_ref().is_some_and(|r| r.truncated),
                error: s.error.clone(),
            })
            .collect();

        Self {
            schema_version: RECEIPT_SCHEMA_VERSION.to_string(),
            session_id: state.session_id.clone(),
            question: state.question.clone(),
            question_blake3: blake3::hash(state.question.as_bytes()).to_hex().to_string(),
            plan: state.plan.clone(),
            steps,
            outcome: if state.answer.is_some() {
                SessionOutcome::Answered
            } else {
                SessionOutcome::Failed
            },
            answer: state.answer.clone(),
            failure: state.failure.clone(),
            event_count,
            started_at,
            finished_at,
        }
    }

    /// JCS canonical JSON
    ///
    /// # Errors
    ///
    /// Returns an error if the receipt cannot be serialized.
    pub fn to_canonical_json(&self) -> Result<String, serde_json::Error> {
        let value = serde_json::to_value(self)?;
        let bytes = serde_json_canonicalizer::to_vec(&value)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Write `receipt` atomically (tempfile, fsync, rename) into `dir`.
///
/// # Errors
///
/// Returns `AnalystError::Io` if the directory cannot be created or the file
/// cannot be written.
pub fn write_receipt(dir: &Path, receipt: &SessionReceipt) -> Result<PathBuf, AnalystError> {
    std::fs::create_dir_all(dir)?;
    let json = receipt
        .to_canonical_json()
        .map_err(|e| AnalystError::Io(std::io::Error::other(e)))?;

    let path = dir.join(format!("{}.json", receipt.session_id));
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(json.as_bytes())?;
    temp.as_file().sync_all()?;
    temp.persist(&path).map_err(|e| AnalystError::Io(e.error))?;
    Ok(path)
}
