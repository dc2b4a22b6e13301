use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tollgate_core::errors::ToolError;
use tollgate_core::traits::{SizeMeasurer, SizeReport};

use super::{run_command, stderr_tail};

const TOOL: &str = "gzip";
/// Files per gzip invocation.
const CHUNK: usize = 256;

/// Sums gzip-compressed sizes of build artifacts using the `gzip` binary.
///
/// Hidden files and source maps are not shipped to users and are skipped.
#[derive(Debug, Default)]
pub struct GzipSizeMeasurer;

fn is_artifact(path: &Path) -> bool {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    !name.starts_with('.') && !name.ends_with(".map")
}

/// Regular files under `dir`, recursively, sorted.
fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), ToolError> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| ToolError::failed(TOOL, format!("cannot read {}: {e}", dir.display())))?;
    let mut entries: Vec<_> = entries
        .filter_map(|e| e.ok())
        .filter_map(|e| Some((e.path(), e.file_type().ok()?)))
        .collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    // Symlinks are not followed.
    for (path, kind) in entries {
        if kind.is_dir() {
            collect_files(&path, out)?;
        } else if kind.is_file() && is_artifact(&path) {
            out.push(path);
        }
    }
    Ok(())
}

fn compressed_size(files: &[PathBuf], dir: &Path) -> Result<u64, ToolError> {
    let mut total = 0u64;
    for chunk in files.chunks(CHUNK) {
        let mut argv = vec!["gzip".to_string(), "-c".to_string(), "-9".to_string(), "-n".to_string()];
        argv.extend(chunk.iter().map(|p| p.display().to_string()));
        let output = run_command(TOOL, &argv, dir)?;
        if !output.status.success() {
            return Err(ToolError::failed(
                TOOL,
                format!("{}: {}", output.status, stderr_tail(&output)),
            ));
        }
        total += output.stdout.len() as u64;
    }
    Ok(total)
}

impl SizeMeasurer for GzipSizeMeasurer {
    fn measure(&self, dirs: &[PathBuf]) -> Result<SizeReport, ToolError> {
        let mut report = SizeReport::default();
        let mut seen = BTreeSet::new();

        for dir in dirs {
            // `build` and `Builds` are one directory on case-insensitive filesystems.
            let canonical = dir.canonicalize().unwrap_or_else(|_| dir.clone());
            if !seen.insert(canonical) {
                continue;
            }
            let mut files = Vec::new();
            collect_files(dir, &mut files)?;
            if files.is_empty() {
                continue;
            }
            let raw: u64 = files
                .iter()
                .filter_map(|f| std::fs::metadata(f).ok())
                .map(|m| m.len())
                .sum();
            let compressed = compressed_size(&files, dir)?;

            report.files += files.len() as u64;
            report.raw_bytes += raw;
            report.compressed_bytes += compressed;
            report
                .per_dir
                .insert(dir.display().to_string(), compressed);
        }
        Ok(report)
    }
}
