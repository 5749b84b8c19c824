// src/daemon/pid.rs
// PID file lifecycle (spec.md §7): `engram.pid` holds "<pid> <start_time_epoch>"
// so a second `engram serve` invocation (or `engram status`) can tell a stale
// file left by a crashed daemon from a genuinely running one, without relying
// on OS-level file locking.

use std::path::Path;

#[derive(Debug, Clone, Copy)]
pub struct PidInfo {
    pub pid: i32,
    pub started_at: i64,
}

pub fn write(path: &Path, started_at: i64) -> std::io::Result<()> {
    let pid = std::process::id() as i32;
    let contents = format!("{pid} {started_at}\n");
    std::fs::write(path, contents)
}

pub fn read(path: &Path) -> Option<PidInfo> {
    let contents = std::fs::read_to_string(path).ok()?;
    let mut parts = contents.split_whitespace();
    let pid: i32 = parts.next()?.parse().ok()?;
    let started_at: i64 = parts.next()?.parse().ok()?;
    Some(PidInfo { pid, started_at })
}

pub fn remove(path: &Path) {
    let _ = std::fs::remove_file(path);
}

/// Zero-signal liveness probe: `kill(pid, 0)` succeeds if the process exists
/// and is owned by us, without actually signaling it.
#[cfg(unix)]
pub fn is_alive(pid: i32) -> bool {
    unsafe { libc::kill(pid, 0) == 0 }
}

/// True if an `engram.pid` file names a process that is still running.
pub fn daemon_is_running(path: &Path) -> Option<PidInfo> {
    let info = read(path)?;
    is_alive(info.pid).then_some(info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn write_then_read_roundtrips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("engram.pid");
        write(&path, 1_700_000_000).unwrap();
        let info = read(&path).unwrap();
        assert_eq!(info.pid, std::process::id() as i32);
        assert_eq!(info.started_at, 1_700_000_000);
    }

    #[test]
    fn current_process_is_alive() {
        assert!(is_alive(std::process::id() as i32));
    }

    #[test]
    fn daemon_is_running_detects_current_process() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("engram.pid");
        write(&path, 0).unwrap();
        assert!(daemon_is_running(&path).is_some());
    }
}
