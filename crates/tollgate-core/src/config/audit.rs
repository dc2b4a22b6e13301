use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditConfig {
    #[serde(default = "default_true")]
    pub log_decisions: bool,

    /// Also record allow decisions. Off by default: most events are allowed.
    #[serde(default)]
    pub log_allows: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            log_decisions: true,
            log_allows: false,
        }
    }
}

fn default_true() -> bool {
    true
}
