pub mod audit;
pub mod classifier;
pub mod gates;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use self::audit::AuditConfig;
use self::classifier::ClassifierConfig;
use self::gates::{GateSettings, GatesConfig};
use crate::types::GateKind;

/// Directory holding config, baselines, history, and the decision log.
pub const STATE_DIR: &str = ".tollgate";
pub const CONFIG_FILE: &str = "config.json";
pub const CONFIG_ENV: &str = "TOLLGATE_CONFIG";

/// Top-level tollgate configuration document.
///
/// Every field defaults, so an absent file or a partial document yields a
/// working configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TollgateConfig {
    #[serde(rename = "$schema", default, skip_serializing_if = "Option::is_none")]
    pub schema_uri: Option<String>,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub gates: GatesConfig,

    #[serde(default)]
    pub classifier: ClassifierConfig,

    #[serde(default)]
    pub audit: AuditConfig,
}

impl Default for TollgateConfig {
    fn default() -> Self {
        Self {
            schema_uri: None,
            enabled: true,
            gates: GatesConfig::default(),
            classifier: ClassifierConfig::default(),
            audit: AuditConfig::default(),
        }
    }
}

fn default_true() -> bool {
    true
}

impl TollgateConfig {
    /// Load a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("{}: invalid config JSON", path.display()))
    }

    pub fn gate(&self, kind: GateKind) -> &GateSettings {
        self.gates.get(kind)
    }

    /// True if the gate should run at all.
    pub fn gate_enabled(&self, kind: GateKind) -> bool {
        self.enabled && self.gate(kind).enabled
    }

    /// Document written by `tollgate init`.
    pub fn starter() -> Self {
        Self {
            gates: GatesConfig::with_default_limits(),
            ..Self::default()
        }
    }
}

pub fn state_dir(root: &Path) -> PathBuf {
    root.join(STATE_DIR)
}

/// Config path for a project root: `TOLLGATE_CONFIG` wins over `<root>/.tollgate/config.json`.
pub fn config_path(root: &Path) -> PathBuf {
    match std::env::var_os(CONFIG_ENV) {
        Some(p) if !p.is_empty() => PathBuf::from(p),
        _ => state_dir(root).join(CONFIG_FILE),
    }
}
