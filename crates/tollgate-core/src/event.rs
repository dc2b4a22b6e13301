use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;

use crate::errors::EventError;
use crate::types::{HookPhase, ToolKind};

/// What the host is about to do (or just did).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Command(String),
    File {
        path: String,
        content: Option<String>,
    },
    /// No actionable content. Classifies to `Domain::None`.
    Empty,
}

/// One execution event, decoded from the host's hook input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionEvent {
    pub tool: ToolKind,
    pub payload: Payload,
    pub working_directory: PathBuf,
    pub phase: HookPhase,
    pub session_id: Option<String>,
}

impl ExecutionEvent {
    pub fn shell(command: &str, working_directory: impl Into<PathBuf>) -> Self {
        Self {
            tool: ToolKind::ShellCommand,
            payload: Payload::Command(command.to_string()),
            working_directory: working_directory.into(),
            phase: HookPhase::PreToolUse,
            session_id: None,
        }
    }

    pub fn file_write(path: &str, working_directory: impl Into<PathBuf>) -> Self {
        Self {
            tool: ToolKind::FileWrite,
            payload: Payload::File {
                path: path.to_string(),
                content: None,
            },
            working_directory: working_directory.into(),
            phase: HookPhase::PreToolUse,
            session_id: None,
        }
    }

    pub fn command(&self) -> Option<&str> {
        match &self.payload {
            Payload::Command(cmd) => Some(cmd.as_str()),
            _ => None,
        }
    }

    pub fn file_path(&self) -> Option<&str> {
        match &self.payload {
            Payload::File { path, .. } => Some(path.as_str()),
            _ => None,
        }
    }

    /// File path relative to the working directory when possible.
    pub fn relative_file_path(&self) -> Option<PathBuf> {
        let path = Path::new(self.file_path()?);
        Some(
            path.strip_prefix(&self.working_directory)
                .unwrap_or(path)
                .to_path_buf(),
        )
    }
}

/// Raw hook input. Both the host's snake_case keys and camelCase keys are
/// accepted; every field is optional so absent data never fails decoding.
#[derive(Debug, Deserialize)]
struct RawHookInput {
    #[serde(default, alias = "toolName")]
    tool_name: Option<String>,
    #[serde(default, alias = "toolInput")]
    tool_input: Option<Value>,
    #[serde(default, alias = "workingDirectory", alias = "working_directory")]
    cwd: Option<String>,
    #[serde(default, alias = "hookEventName")]
    hook_event_name: Option<String>,
    #[serde(default, alias = "sessionId")]
    session_id: Option<String>,
}

/// Decode one hook input document.
///
/// Only input that is empty or not a JSON object is malformed; missing fields
/// decode to an event with `Payload::Empty`.
pub fn decode(input: &str) -> Result<ExecutionEvent, EventError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(EventError::Malformed("empty input".to_string()));
    }
    let value: Value =
        serde_json::from_str(trimmed).map_err(|e| EventError::Malformed(e.to_string()))?;
    if !value.is_object() {
        return Err(EventError::Malformed(
            "hook input must be a JSON object".to_string(),
        ));
    }
    let raw: RawHookInput =
        serde_json::from_value(value).map_err(|e| EventError::Malformed(e.to_string()))?;

    let tool = ToolKind::from_host_name(raw.tool_name.as_deref().unwrap_or(""));
    let payload = decode_payload(&tool, raw.tool_input.as_ref());
    let working_directory = raw
        .cwd
        .filter(|c| !c.trim().is_empty())
        .map(PathBuf::from)
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));

    Ok(ExecutionEvent {
        tool,
        payload,
        working_directory,
        phase: raw
            .hook_event_name
            .as_deref()
            .map(HookPhase::from_host_name)
            .unwrap_or_default(),
        session_id: raw.session_id,
    })
}

fn decode_payload(tool: &ToolKind, input: Option<&Value>) -> Payload {
    let Some(input) = input else {
        return Payload::Empty;
    };
    let text = |key: &str| {
        input
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
    };
    match tool {
        ToolKind::ShellCommand => text("command").map_or(Payload::Empty, Payload::Command),
        ToolKind::FileWrite | ToolKind::FileEdit => {
            match text("file_path")
                .or_else(|| text("filePath"))
                .or_else(|| text("notebook_path"))
            {
                Some(path) => Payload::File {
                    path,
                    content: text("content").or_else(|| text("new_string")),
                },
                None => Payload::Empty,
            }
        }
        ToolKind::Other(_) => Payload::Empty,
    }
}
