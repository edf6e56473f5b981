//! Bounded subprocess execution.
//!
//! Every call into an external substrate goes through here so no operation
//! can block indefinitely. The child runs under a current-thread tokio
//! runtime; when the deadline passes the pending output future is dropped,
//! `kill_on_drop` kills the child and the call fails with
//! `ErrorKind::TimedOut`.

use crate::errors::{ExError, ExErrorKind, ExResult};
use std::process::{Command, Output, Stdio};
use std::time::Duration;

/// Run an already-configured `Command` with a timeout.
///
/// stdout and stderr are collected concurrently by tokio, so a chatty
/// child cannot stall on a full pipe while we wait for it.
pub fn run_with_timeout(cmd: Command, timeout: Duration) -> std::io::Result<Output> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let mut cmd = tokio::process::Command::from(cmd);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    runtime.block_on(async move {
        match tokio::time::timeout(timeout, cmd.output()).await {
            Ok(output) => output,
            Err(_) => Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("command timed out after {} ms", timeout.as_millis()),
            )),
        }
    })
}

/// Run a backend command, mapping spawn and timeout failures onto the
/// backend error kinds. A non-zero exit is returned as-is.
pub fn run_backend(backend: &str, op: &str, cmd: Command, timeout: Duration) -> ExResult<Output> {
    let program = cmd.get_program().to_string_lossy().into_owned();
    run_with_timeout(cmd, timeout).map_err(|e| {
        let kind = if e.kind() == std::io::ErrorKind::TimedOut {
            ExErrorKind::BackendTimeout
        } else {
            ExErrorKind::BackendUnavailable
        };
        ExError::new(kind)
            .with_backend(backend)
            .with_op(op)
            .with_message(format!("{}: {}", program, e))
    })
}

/// Like [`run_backend`] but treats a non-zero exit as `BackendUnavailable`
/// and returns trimmed stdout.
pub fn run_backend_checked(
    backend: &str,
    op: &str,
    cmd: Command,
    timeout: Duration,
) -> ExResult<String> {
    let output = run_backend(backend, op, cmd, timeout)?;
    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
    } else {
        Err(ExError::new(ExErrorKind::BackendUnavailable)
            .with_backend(backend)
            .with_op(op)
            .with_message(format!(
                "exit {}: {}",
                output
                    .status
                    .code()
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "signal".to_string()),
                String::from_utf8_lossy(&output.stderr).trim()
            )))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[test]
    fn test_captures_output() {
        let out = run_with_timeout(sh("echo hello; echo oops >&2"), Duration::from_secs(5))
            .unwrap();
        assert!(out.status.success());
        assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "hello");
        assert_eq!(String::from_utf8_lossy(&out.stderr).trim(), "oops");
    }

    #[test]
    fn test_timeout_kills_child() {
        let err = run_with_timeout(sh("sleep 5"), Duration::from_millis(100)).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::TimedOut);
    }

    #[test]
    fn test_timed_out_child_does_not_outlive_the_call() {
        let dir = tempfile::TempDir::new().unwrap();
        let marker = dir.path().join("finished");
        let script = format!("sleep 1; touch '{}'", marker.display());

        let err = run_with_timeout(sh(&script), Duration::from_millis(100)).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::TimedOut);

        std::thread::sleep(Duration::from_millis(1500));
        assert!(!marker.exists(), "child kept running after the timeout");
    }

    #[test]
    fn test_backend_timeout_kind() {
        let err = run_backend("text", "diff", sh("sleep 5"), Duration::from_millis(100))
            .unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::BackendTimeout);
    }

    #[test]
    fn test_missing_program_is_unavailable() {
        let cmd = Command::new("definitely-not-a-real-program-tm");
        let err = run_backend("large-object", "add", cmd, Duration::from_secs(1)).unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::BackendUnavailable);
    }

    #[test]
    fn test_checked_reports_nonzero_exit() {
        let err = run_backend_checked("text", "commit", sh("echo nope >&2; exit 3"), Duration::from_secs(5))
            .unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::BackendUnavailable);
        assert!(err.message().contains("exit 3"));
        assert!(err.message().contains("nope"));
    }

    #[test]
    fn test_large_output_does_not_stall() {
        let out = run_with_timeout(
            sh("head -c 200000 /dev/zero | tr '\\0' 'x'"),
            Duration::from_secs(10),
        )
        .unwrap();
        assert_eq!(out.stdout.len(), 200000);
    }
}
