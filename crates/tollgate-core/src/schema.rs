use anyhow::{Context, Result};
use jsonschema::Validator;
use serde_json::Value;

use crate::config::gates::known_limits;
use crate::errors::{CheckIssue, CheckReport};
use crate::types::GateKind;

const SCHEMA: &str = include_str!("../schema/tollgate-config.schema.json");

/// Create a validator for the configuration document.
pub fn validator() -> Result<Validator> {
    let schema: Value = serde_json::from_str(SCHEMA).context("embedded schema is invalid JSON")?;
    Validator::new(&schema).map_err(|e| anyhow::anyhow!("schema compilation failed: {e}"))
}

/// Full check producing a structured report (for `tollgate check --json`).
pub fn check(data: &Value, file: &str, strict: bool) -> CheckReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    match validator() {
        Ok(v) => {
            for error in v.iter_errors(data) {
                let path = error.instance_path.to_string();
                errors.push(CheckIssue {
                    code: "E001".to_string(),
                    check: "schema".to_string(),
                    message: error.to_string(),
                    path: Some(if path.is_empty() {
                        "$(root)".to_string()
                    } else {
                        format!("${path}")
                    }),
                });
            }
        }
        Err(e) => errors.push(CheckIssue {
            code: "E000".to_string(),
            check: "schema".to_string(),
            message: e.to_string(),
            path: None,
        }),
    }

    check_limits(data, &mut errors, &mut warnings);
    check_classifier_rules(data, &mut errors);
    lint_checks(data, &mut warnings);

    let pass = errors.is_empty() && (!strict || warnings.is_empty());
    CheckReport {
        file: file.to_string(),
        pass,
        errors,
        warnings,
    }
}

fn check_limits(data: &Value, errors: &mut Vec<CheckIssue>, warnings: &mut Vec<CheckIssue>) {
    for kind in GateKind::ALL {
        let pointer = format!("/gates/{kind}/limits");
        let Some(limits) = data.pointer(&pointer).and_then(Value::as_object) else {
            continue;
        };
        let known = known_limits(kind);
        for (name, value) in limits {
            let path = Some(format!("$.gates.{kind}.limits.{name}"));
            if !known.contains(name) {
                let message = if known.is_empty() {
                    format!("gate '{kind}' takes no limits; '{name}' is ignored")
                } else {
                    format!(
                        "unknown limit '{name}' for gate '{kind}' (known: {})",
                        known.join(", ")
                    )
                };
                warnings.push(CheckIssue {
                    code: "W001".to_string(),
                    check: "limits".to_string(),
                    message,
                    path,
                });
            } else if value.as_f64().is_some_and(|v| v <= 0.0) {
                errors.push(CheckIssue {
                    code: "E002".to_string(),
                    check: "limits".to_string(),
                    message: format!("limit '{name}' must be positive"),
                    path,
                });
            }
        }
    }
}

fn check_classifier_rules(data: &Value, errors: &mut Vec<CheckIssue>) {
    let Some(rules) = data
        .pointer("/classifier/rules")
        .and_then(Value::as_array)
    else {
        return;
    };
    for (i, rule) in rules.iter().enumerate() {
        if let Some(pattern) = rule.get("pattern").and_then(Value::as_str) {
            if let Err(e) = regex::Regex::new(pattern) {
                errors.push(CheckIssue {
                    code: "E003".to_string(),
                    check: "classifier".to_string(),
                    message: format!("invalid pattern: {e}"),
                    path: Some(format!("$.classifier.rules[{i}].pattern")),
                });
            }
        }
    }
}

fn lint_checks(data: &Value, warnings: &mut Vec<CheckIssue>) {
    // W002: performance regressions only ever warn
    if data
        .pointer("/gates/performance/enforce")
        .and_then(Value::as_bool)
        == Some(true)
    {
        warnings.push(CheckIssue {
            code: "W002".to_string(),
            check: "lint".to_string(),
            message: "performance gate never denies; enforce has no effect".to_string(),
            path: Some("$.gates.performance.enforce".to_string()),
        });
    }

    // W003: everything switched off
    if data.get("enabled").and_then(Value::as_bool) == Some(false) {
        warnings.push(CheckIssue {
            code: "W003".to_string(),
            check: "lint".to_string(),
            message: "all gates are disabled".to_string(),
            path: Some("$.enabled".to_string()),
        });
    }
}
