use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Host tool that produced the execution event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    ShellCommand,
    FileWrite,
    FileEdit,
    /// A tool the gates do not inspect. Always classifies to `Domain::None`.
    Other(String),
}

impl ToolKind {
    /// Map a host tool name onto a tool kind.
    ///
    /// Accepts the host's own names (`Bash`, `Write`, `Edit`, `MultiEdit`) as
    /// well as the canonical kind names.
    pub fn from_host_name(name: &str) -> Self {
        match name {
            "Bash" | "Shell" | "ShellCommand" | "shell_command" => ToolKind::ShellCommand,
            "Write" | "FileWrite" | "file_write" => ToolKind::FileWrite,
            "Edit" | "MultiEdit" | "NotebookEdit" | "FileEdit" | "file_edit" => ToolKind::FileEdit,
            other => ToolKind::Other(other.to_string()),
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self, ToolKind::FileWrite | ToolKind::FileEdit)
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolKind::ShellCommand => write!(f, "shell_command"),
            ToolKind::FileWrite => write!(f, "file_write"),
            ToolKind::FileEdit => write!(f, "file_edit"),
            ToolKind::Other(name) => write!(f, "{name}"),
        }
    }
}

/// When the host invoked the gate relative to the action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HookPhase {
    PreToolUse,
    PostToolUse,
    #[default]
    Unknown,
}

impl HookPhase {
    pub fn from_host_name(name: &str) -> Self {
        match name {
            "PreToolUse" => HookPhase::PreToolUse,
            "PostToolUse" => HookPhase::PostToolUse,
            _ => HookPhase::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HookPhase::PreToolUse => "PreToolUse",
            HookPhase::PostToolUse => "PostToolUse",
            HookPhase::Unknown => "PreToolUse",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    DependencyInstall,
    BuildOrDeploy,
    FileModification,
    None,
}

impl Domain {
    pub fn as_str(self) -> &'static str {
        match self {
            Domain::DependencyInstall => "dependency_install",
            Domain::BuildOrDeploy => "build_or_deploy",
            Domain::FileModification => "file_modification",
            Domain::None => "none",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dependency_install" => Ok(Domain::DependencyInstall),
            "build_or_deploy" => Ok(Domain::BuildOrDeploy),
            "file_modification" => Ok(Domain::FileModification),
            "none" => Ok(Domain::None),
            other => Err(format!("unknown domain '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Web,
    Mobile,
    Game,
    #[default]
    Unspecified,
}

impl Platform {
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Web => "web",
            Platform::Mobile => "mobile",
            Platform::Game => "game",
            Platform::Unspecified => "unspecified",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "web" => Ok(Platform::Web),
            "mobile" => Ok(Platform::Mobile),
            "game" => Ok(Platform::Game),
            "unspecified" => Ok(Platform::Unspecified),
            other => Err(format!("unknown platform '{other}'")),
        }
    }
}

/// Advisory severity buckets, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Moderate,
    High,
    Critical,
}

impl Severity {
    /// Parse the severity labels used by advisory databases.
    ///
    /// `MEDIUM` is folded into `Moderate`.
    pub fn parse_label(label: &str) -> Option<Self> {
        match label.to_ascii_lowercase().as_str() {
            "critical" => Some(Severity::Critical),
            "high" => Some(Severity::High),
            "moderate" | "medium" => Some(Severity::Moderate),
            "low" => Some(Severity::Low),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Severity::Critical => "Critical",
            Severity::High => "High",
            Severity::Moderate => "Moderate",
            Severity::Low => "Low",
        }
    }
}

/// Gate verdict, ordered by strictness: `Allow < Warn < Deny`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Verdict {
    Allow,
    Warn,
    Deny,
}

impl Verdict {
    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Allow => "allow",
            Verdict::Warn => "warn",
            Verdict::Deny => "deny",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The four validator families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateKind {
    Dependency,
    Coverage,
    Bundle,
    Performance,
}

impl GateKind {
    pub const ALL: [GateKind; 4] = [
        GateKind::Dependency,
        GateKind::Coverage,
        GateKind::Bundle,
        GateKind::Performance,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            GateKind::Dependency => "dependency",
            GateKind::Coverage => "coverage",
            GateKind::Bundle => "bundle",
            GateKind::Performance => "performance",
        }
    }
}

impl fmt::Display for GateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GateKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        GateKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| {
                format!("unknown gate '{s}' (use: dependency, coverage, bundle, performance)")
            })
    }
}
