// src/consolidate/markdown.rs
// Durable writes to curated Markdown files: atomic rename plus a sibling lock
// file so the tailer's chunk re-indexing never observes a half-written file.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

pub struct FileLock {
    path: PathBuf,
}

impl FileLock {
    /// Best-effort advisory lock via a sibling `.lock` file. Not a kernel-level
    /// flock: the daemon is the only writer, so this only needs to serialize the
    /// daemon's own consolidation and hook-triggered writes against each other.
    pub fn acquire(target: &Path) -> std::io::Result<Self> {
        let lock_path = lock_path_for(target);
        // Spin briefly; consolidation writes are short (rewrite one Markdown file).
        for _ in 0..50 {
            match fs::OpenOptions::new().create_new(true).write(true).open(&lock_path) {
                Ok(_) => return Ok(Self { path: lock_path }),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    std::thread::sleep(std::time::Duration::from_millis(20));
                }
                Err(e) => return Err(e),
            }
        }
        Err(std::io::Error::new(std::io::ErrorKind::WouldBlock, "timed out acquiring markdown lock"))
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

fn lock_path_for(target: &Path) -> PathBuf {
    let mut name = target.file_name().and_then(|n| n.to_str()).unwrap_or("file").to_string();
    name.push_str(".lock");
    target.with_file_name(name)
}

/// Write `contents` to `target` atomically: write to `<target>.tmp.<pid>`, fsync,
/// then rename over the target. Acquires the sibling lock for the duration.
pub fn write_atomic(target: &Path, contents: &str) -> std::io::Result<()> {
    let _lock = FileLock::acquire(target)?;

    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }

    let pid = std::process::id();
    let mut tmp_name = target.file_name().and_then(|n| n.to_str()).unwrap_or("file").to_string();
    tmp_name.push_str(&format!(".tmp.{pid}"));
    let tmp_path = target.with_file_name(tmp_name);

    {
        let mut file = File::create(&tmp_path)?;
        file.write_all(contents.as_bytes())?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, target)?;
    Ok(())
}
