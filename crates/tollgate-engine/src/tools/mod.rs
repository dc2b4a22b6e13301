//! Default adapters for the external measurement tools.
//!
//! Commands are tokenized with `shell-words` and spawned directly, never
//! through a shell. A missing program is `ToolError::Unavailable`.

pub mod audit_command;
pub mod coverage;
pub mod endpoint;
pub mod gzip;
pub mod lighthouse;
pub mod osv;

use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::time::Instant;

use tollgate_core::errors::ToolError;

pub use self::audit_command::CommandScanner;
pub use self::coverage::SummaryCoverageRunner;
pub use self::endpoint::Endpoint;
pub use self::gzip::GzipSizeMeasurer;
pub use self::lighthouse::LighthouseProfiler;
pub use self::osv::OsvScanner;

/// Tokenize a configured command line.
pub(crate) fn split_command(tool: &str, command_line: &str) -> Result<Vec<String>, ToolError> {
    let argv = shell_words::split(command_line)
        .map_err(|e| ToolError::failed(tool, format!("cannot parse command '{command_line}': {e}")))?;
    if argv.is_empty() {
        return Err(ToolError::failed(tool, "command is empty"));
    }
    Ok(argv)
}

/// Locate a program the way the child will see it: paths relative to `dir`,
/// bare names on `PATH`.
fn locate(program: &str, dir: &Path) -> Option<PathBuf> {
    if program.contains(std::path::MAIN_SEPARATOR) || program.contains('/') {
        let path = dir.join(program);
        path.is_file().then_some(path)
    } else {
        which::which(program).ok()
    }
}

/// Run `argv` in `dir` with stdin closed and both output streams captured.
///
/// The exit status is not interpreted; callers decide what a non-zero status
/// means for their tool.
pub(crate) fn run_command(tool: &str, argv: &[String], dir: &Path) -> Result<Output, ToolError> {
    let Some((program, args)) = argv.split_first() else {
        return Err(ToolError::failed(tool, "command is empty"));
    };
    let resolved = locate(program, dir)
        .ok_or_else(|| ToolError::unavailable(tool, format!("'{program}' not found")))?;

    let start = Instant::now();
    let output = Command::new(resolved)
        .args(args)
        .current_dir(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| ToolError::failed(tool, format!("cannot spawn '{program}': {e}")))?;

    tracing::debug!(
        tool,
        elapsed_ms = start.elapsed().as_millis() as u64,
        status = %output.status,
        stdout_bytes = output.stdout.len(),
        "tool finished"
    );
    Ok(output)
}

/// Last few lines of stderr, for error messages.
pub(crate) fn stderr_tail(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let lines: Vec<&str> = stderr.trim().lines().collect();
    let start = lines.len().saturating_sub(3);
    lines[start..].join(" | ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_rejects_empty_and_unbalanced() {
        assert!(matches!(split_command("t", "   "), Err(ToolError::Failed { .. })));
        assert!(matches!(split_command("t", "echo 'oops"), Err(ToolError::Failed { .. })));
        assert_eq!(
            split_command("t", "lighthouse '{url}' --quiet").unwrap(),
            vec!["lighthouse", "{url}", "--quiet"]
        );
    }

    #[test]
    fn missing_program_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let argv = vec!["tollgate-no-such-program-xyz".to_string()];
        assert!(matches!(
            run_command("fake", &argv, dir.path()),
            Err(ToolError::Unavailable { .. })
        ));
        let argv = vec!["./missing.sh".to_string()];
        assert!(matches!(
            run_command("fake", &argv, dir.path()),
            Err(ToolError::Unavailable { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn runs_in_the_given_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "here").unwrap();
        let argv = vec!["cat".to_string(), "marker.txt".to_string()];
        let out = run_command("cat", &argv, dir.path()).unwrap();
        assert!(out.status.success());
        assert_eq!(String::from_utf8_lossy(&out.stdout), "here");
    }
}
