use serde::{Deserialize, Serialize};

use crate::types::{Domain, Platform};

/// Which event payload a configured rule inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleTarget {
    /// Shell command text.
    #[default]
    Command,
    /// Path of a written or edited file.
    Path,
}

/// A user-defined classification rule, evaluated before the built-ins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSpec {
    pub id: String,
    #[serde(default)]
    pub target: RuleTarget,
    /// Regular expression matched against the target text.
    pub pattern: String,
    pub domain: Domain,
    #[serde(default)]
    pub platform: Platform,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<RuleSpec>,
}
