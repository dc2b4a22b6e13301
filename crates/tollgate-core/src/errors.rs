/// The incoming event could not be decoded.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("malformed event: {0}")]
    Malformed(String),
}

/// An external measurement tool could not produce a measurement.
///
/// None of these variants is evidence of a policy violation.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("{tool} is not available: {reason}")]
    Unavailable { tool: String, reason: String },
    #[error("{tool} failed: {reason}")]
    Failed { tool: String, reason: String },
    #[error("cannot parse {tool} output: {reason}")]
    Parse { tool: String, reason: String },
}

impl ToolError {
    pub fn unavailable(tool: &str, reason: impl Into<String>) -> Self {
        ToolError::Unavailable {
            tool: tool.to_string(),
            reason: reason.into(),
        }
    }

    pub fn failed(tool: &str, reason: impl Into<String>) -> Self {
        ToolError::Failed {
            tool: tool.to_string(),
            reason: reason.into(),
        }
    }

    pub fn parse(tool: &str, reason: impl Into<String>) -> Self {
        ToolError::Parse {
            tool: tool.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("baseline i/o failure: {0}")]
    Io(String),
    #[error("baseline {name} is corrupt: {reason}")]
    Corrupt { name: String, reason: String },
    #[error("cannot serialize baseline: {0}")]
    Serialize(String),
}

/// Internal gate faults. Every variant resolves to an allow decision.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("no reachable endpoint: {0}")]
    NoEndpoint(String),
    #[error("internal error: {0}")]
    Internal(String),
}

/// Structured check result for `tollgate check --json`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CheckReport {
    pub file: String,
    pub pass: bool,
    pub errors: Vec<CheckIssue>,
    pub warnings: Vec<CheckIssue>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct CheckIssue {
    pub code: String,
    pub check: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}
