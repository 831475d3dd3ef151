//! JSON result object printed as the last line of a run

use serde::Serialize;

use super::error::Result;
use super::stems::OutputManifest;

/// Outcome of a separation run
///
/// Serializes as `{"status":"success","output_files":{...}}` or
/// `{"status":"error","error":"..."}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SeparationReport {
    Success { output_files: OutputManifest },
    Error { error: String },
}

impl SeparationReport {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Single-line JSON encoding
    pub fn to_json_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            serde_json::json!({ "status": "error", "error": e.to_string() }).to_string()
        })
    }
}

impl From<Result<OutputManifest>> for SeparationReport {
    fn from(outcome: Result<OutputManifest>) -> Self {
        match outcome {
            Ok(output_files) => Self::Success { output_files },
            Err(e) => Self::Error {
                error: e.to_string(),
            },
        }
    }
}
