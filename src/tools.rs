//! External tool adapters.
//!
//! The scanners consult a handful of macOS utilities (`docker system df`,
//! `tmutil listlocalsnapshots /`, `diskutil info /`, `du -sk`). Every
//! invocation is best-effort: missing binaries, timeouts, and non-zero exits
//! all degrade to "no data" and the scan carries on. The trait seam lets
//! tests substitute canned output.

use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

const TOOL_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of one subprocess call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolOutput {
    /// Captured stdout of a zero-exit run.
    Ok(String),
    /// The binary is not installed.
    Missing,
    /// Non-zero exit, timeout, or spawn failure.
    Failed(String),
}

pub trait ToolRunner: Sync {
    fn run(&self, program: &str, args: &[&str]) -> ToolOutput;
}

/// Real subprocess runner with a hard timeout.
pub struct SystemRunner;

impl ToolRunner for SystemRunner {
    fn run(&self, program: &str, args: &[&str]) -> ToolOutput {
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn();
        let mut child = match child {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return ToolOutput::Missing,
            Err(e) => return ToolOutput::Failed(e.to_string()),
        };

        let (tx, rx) = mpsc::channel();
        let stdout = child.stdout.take();
        thread::spawn(move || {
            let mut buf = String::new();
            if let Some(mut out) = stdout {
                use std::io::Read;
                let _ = out.read_to_string(&mut buf);
            }
            let _ = tx.send(buf);
        });

        match rx.recv_timeout(TOOL_TIMEOUT) {
            Ok(output) => match child.wait() {
                Ok(status) if status.success() => ToolOutput::Ok(output),
                Ok(status) => ToolOutput::Failed(format!("{program} exited with {status}")),
                Err(e) => ToolOutput::Failed(e.to_string()),
            },
            Err(_) => {
                let _ = child.kill();
                let _ = child.wait();
                ToolOutput::Failed(format!("{program} timed out after 10s"))
            }
        }
    }
}

/// Count local Time Machine snapshots from `tmutil listlocalsnapshots /`.
pub fn snapshot_count(runner: &dyn ToolRunner) -> usize {
    match runner.run("tmutil", &["listlocalsnapshots", "/"]) {
        ToolOutput::Ok(out) => out.lines().filter(|l| l.contains("com.apple")).count(),
        _ => 0,
    }
}

/// Purgeable bytes reported by `diskutil info /`.
///
/// The relevant line looks like
/// `Purgeable Space: 12.3 GB (12345678900 Bytes) (exactly ...)`;
/// the parenthesized exact byte count is what we take.
pub fn purgeable_bytes(runner: &dyn ToolRunner) -> u64 {
    match runner.run("diskutil", &["info", "/"]) {
        ToolOutput::Ok(out) => parse_purgeable(&out),
        _ => 0,
    }
}

fn parse_purgeable(output: &str) -> u64 {
    for line in output.lines() {
        if !(line.contains("Purgeable") && line.contains("Bytes")) {
            continue;
        }
        // Take the last "(N Bytes)" group on the line.
        let mut rest = line;
        let mut found = 0u64;
        while let Some(open) = rest.find('(') {
            let after = &rest[open + 1..];
            if let Some(close) = after.find(')') {
                let inner = &after[..close];
                if let Some(num) = inner.strip_suffix(" Bytes") {
                    if let Ok(v) = num.trim().replace(',', "").parse::<u64>() {
                        found = v;
                    }
                }
                rest = &after[close + 1..];
            } else {
                break;
            }
        }
        if found > 0 {
            return found;
        }
    }
    0
}

/// Reclaimable bytes across the `docker system df` table, zero when docker is
/// unavailable. Returns `None` when docker is not installed at all, which
/// also tells the caller not to bother with the Desktop VM directory.
pub fn docker_reclaimable(runner: &dyn ToolRunner) -> Option<u64> {
    let out = match runner.run("docker", &["system", "df"]) {
        ToolOutput::Ok(out) => out,
        ToolOutput::Missing => return None,
        ToolOutput::Failed(_) => return Some(0),
    };

    let mut reclaimable = 0u64;
    for line in out.lines().skip(1) {
        // TYPE TOTAL ACTIVE SIZE RECLAIMABLE; reclaimable may carry a
        // trailing "(NN%)" column.
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 4 {
            continue;
        }
        let rec = if parts.last().is_some_and(|p| p.contains('%')) {
            parts[parts.len() - 2]
        } else {
            parts[parts.len() - 1]
        };
        reclaimable += parse_docker_size(rec);
    }
    Some(reclaimable)
}

/// Parse docker's human sizes ("1.2GB", "456.7MB", "0B").
pub fn parse_docker_size(size_str: &str) -> u64 {
    let s = size_str.trim().to_uppercase();
    if let Some(stripped) = s.strip_suffix("GB") {
        stripped
            .parse::<f64>()
            .map(|v| (v * 1_073_741_824.0) as u64)
            .unwrap_or(0)
    } else if let Some(stripped) = s.strip_suffix("MB") {
        stripped
            .parse::<f64>()
            .map(|v| (v * 1_048_576.0) as u64)
            .unwrap_or(0)
    } else if let Some(stripped) = s.strip_suffix("KB") {
        stripped
            .parse::<f64>()
            .map(|v| (v * 1_024.0) as u64)
            .unwrap_or(0)
    } else if let Some(stripped) = s.strip_suffix('B') {
        stripped.parse::<f64>().map(|v| v as u64).unwrap_or(0)
    } else {
        0
    }
}

/// `du -sk <path>` in bytes, for spots where the walking probe is the wrong
/// tool (APFS clone-heavy trees). Falls back to 0 on any failure.
pub fn du_bytes(runner: &dyn ToolRunner, path: &Path) -> u64 {
    let path_str = path.to_string_lossy();
    match runner.run("du", &["-sk", path_str.as_ref()]) {
        ToolOutput::Ok(out) => out
            .split_whitespace()
            .next()
            .and_then(|kb| kb.parse::<u64>().ok())
            .map(|kb| kb * 1024)
            .unwrap_or(0),
        _ => 0,
    }
}


#[cfg(test)]
mod tests {
    use super::fake::FakeRunner;
    use super::*;

    #[test]
    fn test_parse_docker_size() {
        assert_eq!(parse_docker_size("1KB"), 1024);
        assert_eq!(parse_docker_size("1MB"), 1_048_576);
        assert_eq!(parse_docker_size("1.5GB"), (1.5 * 1_073_741_824.0) as u64);
        assert_eq!(parse_docker_size("500B"), 500);
        assert_eq!(parse_docker_size("0B"), 0);
        assert_eq!(parse_docker_size("garbage"), 0);
    }

    #[test]
    fn test_snapshot_count_filters_apple_identifiers() {
        let runner = FakeRunner::default().with(
            "tmutil listlocalsnapshots /",
            ToolOutput::Ok(
                "Snapshots for disk /:\n\
                 com.apple.TimeMachine.2024-05-01-103000.local\n\
                 com.apple.TimeMachine.2024-05-02-103000.local\n"
                    .to_string(),
            ),
        );
        assert_eq!(snapshot_count(&runner), 2);
    }

    #[test]
    fn test_snapshot_count_missing_tool() {
        assert_eq!(snapshot_count(&FakeRunner::default()), 0);
    }

    #[test]
    fn test_parse_purgeable_line() {
        let out = "   Volume Total Space:  500.0 GB (500000000000 Bytes)\n\
                   Purgeable Space:       12.3 GB (12345678900 Bytes) (exactly 24112 512-Byte-Units)\n";
        assert_eq!(parse_purgeable(out), 12_345_678_900);
    }

    #[test]
    fn test_docker_reclaimable_parses_table() {
        let table = "TYPE   TOTAL  ACTIVE SIZE   RECLAIMABLE\n\
                     Images 10     2      5.1GB  3.2GB (62%)\n\
                     Containers 2  1      100MB  50MB (50%)\n";
        let runner =
            FakeRunner::default().with("docker system df", ToolOutput::Ok(table.to_string()));
        let total = docker_reclaimable(&runner).unwrap();
        assert_eq!(
            total,
            (3.2 * 1_073_741_824.0) as u64 + 50 * 1_048_576
        );
    }

    #[test]
    fn test_docker_missing_is_none() {
        assert_eq!(docker_reclaimable(&FakeRunner::default()), None);
    }

    #[test]
    fn test_du_bytes() {
        let runner = FakeRunner::default()
            .with("du -sk /tmp/x", ToolOutput::Ok("1024\t/tmp/x\n".to_string()));
        assert_eq!(du_bytes(&runner, Path::new("/tmp/x")), 1024 * 1024);
    }
}
