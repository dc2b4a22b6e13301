use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::GateKind;

pub const LIMIT_MIN_PCT: &str = "min_pct";
pub const LIMIT_WEB_BYTES: &str = "web_bytes";
pub const LIMIT_MOBILE_BYTES: &str = "mobile_bytes";
pub const LIMIT_GAME_BYTES: &str = "game_bytes";
pub const LIMIT_SCORE_DROP: &str = "score_drop_points";
pub const LIMIT_TIMING_PCT: &str = "timing_increase_pct";
pub const LIMIT_LAYOUT_SHIFT_PCT: &str = "layout_shift_increase_pct";

/// Settings for one gate family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Strict (deny) vs advisory (warn) handling of violations.
    /// Absent means the gate's own default, see [`default_enforce`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enforce: Option<bool>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub limits: BTreeMap<String, f64>,

    /// Replacement command line for the gate's measurement tool.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// Fixed endpoint for the performance gate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Artifact directories for the bundle gate, relative to the working directory.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dirs: Vec<String>,
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            enforce: None,
            limits: BTreeMap::new(),
            command: None,
            url: None,
            dirs: Vec::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

impl GateSettings {
    /// Configured limit, or `fallback` when absent or not a finite number.
    pub fn limit(&self, name: &str, fallback: f64) -> f64 {
        self.limits
            .get(name)
            .copied()
            .filter(|v| v.is_finite())
            .unwrap_or(fallback)
    }

    pub fn enforces(&self, kind: GateKind) -> bool {
        self.enforce.unwrap_or_else(|| default_enforce(kind))
    }
}

/// Whether a gate denies on violations when `enforce` is not configured.
pub fn default_enforce(kind: GateKind) -> bool {
    match kind {
        GateKind::Dependency | GateKind::Coverage => true,
        GateKind::Bundle | GateKind::Performance => false,
    }
}

/// Built-in limits per gate.
pub fn default_limits(kind: GateKind) -> BTreeMap<String, f64> {
    let pairs: &[(&str, f64)] = match kind {
        GateKind::Dependency => &[],
        GateKind::Coverage => &[(LIMIT_MIN_PCT, 80.0)],
        GateKind::Bundle => &[
            (LIMIT_WEB_BYTES, 500.0 * 1024.0),
            (LIMIT_MOBILE_BYTES, 100.0 * 1024.0 * 1024.0),
            (LIMIT_GAME_BYTES, 1024.0 * 1024.0 * 1024.0),
        ],
        GateKind::Performance => &[
            (LIMIT_SCORE_DROP, 5.0),
            (LIMIT_TIMING_PCT, 10.0),
            (LIMIT_LAYOUT_SHIFT_PCT, 10.0),
        ],
    };
    pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

/// Names of the limits a gate understands.
pub fn known_limits(kind: GateKind) -> Vec<String> {
    default_limits(kind).into_keys().collect()
}

/// Gate settings keyed by gate family.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GatesConfig {
    #[serde(default)]
    pub dependency: GateSettings,
    #[serde(default)]
    pub coverage: GateSettings,
    #[serde(default)]
    pub bundle: GateSettings,
    #[serde(default)]
    pub performance: GateSettings,
}

impl GatesConfig {
    pub fn get(&self, kind: GateKind) -> &GateSettings {
        match kind {
            GateKind::Dependency => &self.dependency,
            GateKind::Coverage => &self.coverage,
            GateKind::Bundle => &self.bundle,
            GateKind::Performance => &self.performance,
        }
    }

    /// Gates with their built-in limits spelled out, as written by `tollgate init`.
    pub fn with_default_limits() -> Self {
        let settings = |kind| GateSettings {
            enforce: Some(default_enforce(kind)),
            limits: default_limits(kind),
            ..GateSettings::default()
        };
        Self {
            dependency: settings(GateKind::Dependency),
            coverage: settings(GateKind::Coverage),
            bundle: settings(GateKind::Bundle),
            performance: settings(GateKind::Performance),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_falls_back_when_missing() {
        let s = GateSettings::default();
        assert_eq!(s.limit(LIMIT_MIN_PCT, 80.0), 80.0);

        let mut s = GateSettings::default();
        s.limits.insert(LIMIT_MIN_PCT.into(), 90.0);
        assert_eq!(s.limit(LIMIT_MIN_PCT, 80.0), 90.0);
    }

    #[test]
    fn enforce_defaults_per_gate() {
        let s = GateSettings::default();
        assert!(s.enforces(GateKind::Coverage));
        assert!(s.enforces(GateKind::Dependency));
        assert!(!s.enforces(GateKind::Bundle));

        let strict = GateSettings {
            enforce: Some(true),
            ..GateSettings::default()
        };
        assert!(strict.enforces(GateKind::Bundle));
    }

    #[test]
    fn default_limits_cover_documented_names() {
        assert_eq!(default_limits(GateKind::Coverage)[LIMIT_MIN_PCT], 80.0);
        assert_eq!(
            default_limits(GateKind::Bundle)[LIMIT_WEB_BYTES],
            512_000.0
        );
        assert!(known_limits(GateKind::Dependency).is_empty());
        assert_eq!(known_limits(GateKind::Performance).len(), 3);
    }
}
