use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};

/// A lock older than this is left over from a killed process.
const LOCK_STALE_SECS: i64 = 60;
const LOCK_ATTEMPTS: u32 = 50;
const LOCK_RETRY: Duration = Duration::from_millis(10);

/// Write content atomically: temp file in the same directory, fsync, rename.
///
/// A reader sees either the previous document or the new one, never a torn
/// write, even if the process is killed mid-write. Missing parent directories
/// are created.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    std::fs::create_dir_all(dir).with_context(|| format!("cannot create {}", dir.display()))?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("state");
    let temp_path = dir.join(format!(".{file_name}.{}.tmp", unique_suffix()));

    let result = (|| -> Result<()> {
        let mut file = std::fs::File::create(&temp_path)
            .with_context(|| format!("cannot create temp file for {}", path.display()))?;
        file.write_all(content)?;
        file.sync_all()?;
        drop(file);
        std::fs::rename(&temp_path, path)
            .with_context(|| format!("cannot rename temp to {}", path.display()))
    })();

    if result.is_err() {
        let _ = std::fs::remove_file(&temp_path);
    }
    result
}

/// Advisory lock for an append-only state file.
///
/// Creates `<file>.lock` holding the PID and a timestamp; dropping the guard
/// removes it. Waits briefly for another holder, then gives up.
pub struct AdvisoryLock {
    lock_path: PathBuf,
}

impl AdvisoryLock {
    pub fn acquire(path: &Path) -> Result<Self> {
        let mut name = path.as_os_str().to_owned();
        name.push(".lock");
        let lock_path = PathBuf::from(name);
        if let Some(dir) = lock_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("cannot create {}", dir.display()))?;
        }

        for _ in 0..LOCK_ATTEMPTS {
            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&lock_path)
            {
                Ok(mut file) => {
                    let ts = chrono::Utc::now().timestamp();
                    let _ = write!(file, "{}\n{ts}\n", std::process::id());
                    return Ok(Self { lock_path });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if is_stale(&lock_path) {
                        let _ = std::fs::remove_file(&lock_path);
                    } else {
                        std::thread::sleep(LOCK_RETRY);
                    }
                }
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("cannot acquire lock {}", lock_path.display()))
                }
            }
        }
        bail!("{} is locked by another process", path.display())
    }
}

impl Drop for AdvisoryLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.lock_path);
    }
}

/// A lock whose timestamp line is older than `LOCK_STALE_SECS`. A lock still
/// being written has no timestamp yet and is not stale.
fn is_stale(lock_path: &Path) -> bool {
    let content = std::fs::read_to_string(lock_path).unwrap_or_default();
    content
        .lines()
        .nth(1)
        .and_then(|ts| ts.parse::<i64>().ok())
        .is_some_and(|ts| chrono::Utc::now().timestamp() - ts > LOCK_STALE_SECS)
}

/// Process id, per-process counter, and nanoseconds.
fn unique_suffix() -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::{SystemTime, UNIX_EPOCH};

    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    format!("{}-{n}-{nanos:x}", std::process::id())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_write_creates_file_and_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/baselines/performance.json");
        atomic_write(&path, b"{}").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}");
    }

    #[test]
    fn atomic_write_replaces_and_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");

        atomic_write(&path, b"version 1").unwrap();
        atomic_write(&path, b"version 2").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "version 2");

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn lock_is_exclusive_until_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("decisions.jsonl");

        let held = AdvisoryLock::acquire(&path).unwrap();
        assert!(dir.path().join("decisions.jsonl.lock").exists());
        assert!(AdvisoryLock::acquire(&path).is_err());

        drop(held);
        assert!(!dir.path().join("decisions.jsonl.lock").exists());
        assert!(AdvisoryLock::acquire(&path).is_ok());
    }

    #[test]
    fn stale_lock_is_taken_over() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.jsonl");
        let old = chrono::Utc::now().timestamp() - 3600;
        std::fs::write(dir.path().join("history.jsonl.lock"), format!("1\n{old}\n")).unwrap();
        assert!(AdvisoryLock::acquire(&path).is_ok());
    }

    #[test]
    fn concurrent_writers_last_one_wins() {
        use std::sync::{Arc, Barrier};
        use std::thread;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bundle.json");
        let barrier = Arc::new(Barrier::new(4));

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let b = Arc::clone(&barrier);
                let p = path.clone();
                thread::spawn(move || {
                    b.wait();
                    atomic_write(&p, format!("writer-{i}").as_bytes()).unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        // Content is exactly one writer's document, never interleaved.
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("writer-"));
        assert_eq!(content.len(), "writer-0".len());
    }
}
