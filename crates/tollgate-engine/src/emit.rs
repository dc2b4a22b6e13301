//! Host response document and exit code for a decision.

use std::io::Write;

use serde::Serialize;
use tollgate_core::decision::{Decision, EXIT_BLOCK};
use tollgate_core::types::{HookPhase, Verdict};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HookSpecificOutput {
    pub hook_event_name: String,
    pub permission_decision: String,
    pub permission_decision_reason: String,
}

/// JSON document written to stdout for the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HookResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_message: Option<String>,
    #[serde(rename = "continue")]
    pub proceed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hook_specific_output: Option<HookSpecificOutput>,
}

impl HookResponse {
    pub fn from_decision(decision: &Decision, phase: HookPhase) -> Self {
        let message = (!decision.message.is_empty()).then(|| match decision.gate {
            Some(gate) => format!("[tollgate:{gate}] {}", decision.message),
            None => format!("[tollgate] {}", decision.message),
        });

        if decision.verdict != Verdict::Deny {
            return Self {
                system_message: message,
                proceed: true,
                decision: None,
                reason: None,
                hook_specific_output: None,
            };
        }

        let reason = message.clone().unwrap_or_else(|| "[tollgate] denied".to_string());
        // Permission decisions only exist before the action runs.
        let hook_specific_output = (phase != HookPhase::PostToolUse).then(|| HookSpecificOutput {
            hook_event_name: phase.as_str().to_string(),
            permission_decision: "deny".to_string(),
            permission_decision_reason: reason.clone(),
        });
        Self {
            system_message: message,
            proceed: true,
            decision: Some("block".to_string()),
            reason: Some(reason),
            hook_specific_output,
        }
    }
}

/// Write the response to `out`, and the message to `err` when blocking.
/// Returns the process exit code.
pub fn emit(
    decision: &Decision,
    phase: HookPhase,
    out: &mut impl Write,
    err: &mut impl Write,
) -> std::io::Result<i32> {
    let response = HookResponse::from_decision(decision, phase);
    let json = serde_json::to_string(&response).map_err(std::io::Error::other)?;
    writeln!(out, "{json}")?;

    let code = decision.exit_code(phase);
    if code == EXIT_BLOCK {
        let text = response
            .reason
            .or(response.system_message)
            .unwrap_or_else(|| decision.verdict.to_string());
        writeln!(err, "{text}")?;
    }
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tollgate_core::decision::EXIT_CONTINUE;
    use tollgate_core::types::GateKind;

    fn run(decision: &Decision, phase: HookPhase) -> (serde_json::Value, String, i32) {
        let mut out = Vec::new();
        let mut err = Vec::new();
        let code = emit(decision, phase, &mut out, &mut err).unwrap();
        let doc = serde_json::from_slice(&out).unwrap();
        (doc, String::from_utf8(err).unwrap(), code)
    }

    #[test]
    fn silent_allow() {
        let (doc, err, code) = run(&Decision::allow(""), HookPhase::PreToolUse);
        assert_eq!(doc, serde_json::json!({"continue": true}));
        assert!(err.is_empty());
        assert_eq!(code, EXIT_CONTINUE);
    }

    #[test]
    fn deny_before_action() {
        let d = Decision::deny("Coverage 65.2% is below the 80.0% threshold").with_gate(GateKind::Coverage);
        let (doc, err, code) = run(&d, HookPhase::PreToolUse);
        assert_eq!(code, EXIT_BLOCK);
        assert_eq!(doc["decision"], "block");
        assert_eq!(doc["hookSpecificOutput"]["hookEventName"], "PreToolUse");
        assert_eq!(doc["hookSpecificOutput"]["permissionDecision"], "deny");
        assert!(doc["reason"].as_str().unwrap().starts_with("[tollgate:coverage] Coverage 65.2%"));
        assert!(err.contains("Coverage 65.2%"));
    }

    #[test]
    fn deny_after_action_has_no_permission_decision() {
        let d = Decision::deny("bundle too large");
        let (doc, _, code) = run(&d, HookPhase::PostToolUse);
        assert_eq!(code, EXIT_BLOCK);
        assert!(doc.get("hookSpecificOutput").is_none());
        assert_eq!(doc["decision"], "block");
    }

    #[test]
    fn warn_surfaces_only_after_action() {
        let d = Decision::warn("lcp_ms: 2400 -> 2880 (+20.0%)").with_gate(GateKind::Performance);
        let (doc, err, code) = run(&d, HookPhase::PreToolUse);
        assert_eq!(code, EXIT_CONTINUE);
        assert!(err.is_empty());
        assert_eq!(doc["continue"], true);
        assert!(doc.get("decision").is_none());
        assert!(doc["systemMessage"].as_str().unwrap().contains("+20.0%"));

        let (_, err, code) = run(&d, HookPhase::PostToolUse);
        assert_eq!(code, EXIT_BLOCK);
        assert!(err.contains("+20.0%"));
    }

    #[test]
    fn unknown_phase_reports_pre_tool_use() {
        let (doc, _, _) = run(&Decision::deny("x"), HookPhase::Unknown);
        assert_eq!(doc["hookSpecificOutput"]["hookEventName"], "PreToolUse");
    }
}
