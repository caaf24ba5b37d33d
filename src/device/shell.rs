//! Bounded subprocess execution for transport binaries.

use std::io::Read;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::config::TIMING_CONFIG;

use super::DeviceError;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Captured output of a finished shell invocation.
#[derive(Debug, Clone)]
pub(crate) struct ShellOutput {
    pub stdout: String,
    pub stderr: String,
}

impl ShellOutput {
    /// Stdout and stderr concatenated; some adb builds report errors on
    /// stdout, others on stderr.
    pub fn combined(&self) -> String {
        format!("{}{}", self.stdout, self.stderr)
    }
}

/// Run a transport command with the configured subprocess timeout.
pub(crate) fn run(program: &str, args: &[String]) -> Result<ShellOutput, DeviceError> {
    run_with_timeout(program, args, TIMING_CONFIG.connection.subprocess_timeout)
}

/// Run a transport command, killing it when `timeout` elapses.
///
/// Stdout and stderr are drained on background threads so a chatty child
/// cannot block on a full pipe while the parent is polling for exit.
pub(crate) fn run_with_timeout(
    program: &str,
    args: &[String],
    timeout: Duration,
) -> Result<ShellOutput, DeviceError> {
    let display = command_display(program, args);

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| DeviceError::Spawn(display.clone(), e))?;

    let stdout_handle = child.stdout.take().map(drain);
    let stderr_handle = child.stderr.take().map(drain);

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(DeviceError::Timeout(display, timeout.as_secs()));
                }
                thread::sleep(POLL_INTERVAL);
            }
            Err(e) => {
                let _ = child.kill();
                return Err(DeviceError::Spawn(display, e));
            }
        }
    };

    let stdout = join_output(stdout_handle);
    let stderr = join_output(stderr_handle);

    if !status.success() {
        return Err(DeviceError::CommandFailed(
            display,
            status.code().unwrap_or(-1),
            stderr.trim().to_string(),
        ));
    }

    Ok(ShellOutput { stdout, stderr })
}

fn drain<R: Read + Send + 'static>(mut stream: R) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = stream.read_to_end(&mut buf);
        buf
    })
}

fn join_output(handle: Option<thread::JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|buf| String::from_utf8_lossy(&buf).into_owned())
        .unwrap_or_default()
}

fn command_display(program: &str, args: &[String]) -> String {
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{} {}", program, args.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_display() {
        assert_eq!(command_display("adb", &[]), "adb");
        assert_eq!(
            command_display("adb", &["shell".to_string(), "input".to_string()]),
            "adb shell input"
        );
    }

    #[test]
    fn test_run_unknown_binary_is_spawn_error() {
        let err = run_with_timeout(
            "definitely-not-a-real-binary-xyz",
            &[],
            Duration::from_secs(1),
        )
        .unwrap_err();
        assert!(matches!(err, DeviceError::Spawn(_, _)));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_captures_output() {
        let out = run_with_timeout(
            "sh",
            &["-c".to_string(), "echo hello".to_string()],
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[cfg(unix)]
    #[test]
    fn test_run_times_out() {
        let err = run_with_timeout(
            "sh",
            &["-c".to_string(), "sleep 5".to_string()],
            Duration::from_millis(100),
        )
        .unwrap_err();
        assert!(matches!(err, DeviceError::Timeout(_, _)));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_nonzero_exit_is_command_failed() {
        let err = run_with_timeout(
            "sh",
            &["-c".to_string(), "exit 3".to_string()],
            Duration::from_secs(5),
        )
        .unwrap_err();
        match err {
            DeviceError::CommandFailed(_, code, _) => assert_eq!(code, 3),
            other => panic!("unexpected error: {other}"),
        }
    }
}
