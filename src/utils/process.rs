//! Blocking execution of the external tools revisr drives (git and the
//! database clients).

use std::io::Write;
use std::process::{Command, Output, Stdio};
use tracing::trace;

use crate::error::{Result, RevisrError};

fn program_name(cmd: &Command) -> String {
    cmd.get_program().to_string_lossy().to_string()
}

fn spawn_error(cmd: &Command, source: std::io::Error) -> RevisrError {
    RevisrError::Spawn {
        program: program_name(cmd),
        source,
    }
}

fn check(cmd: &Command, output: Output) -> Result<Vec<u8>> {
    if output.status.success() {
        return Ok(output.stdout);
    }
    Err(RevisrError::Command {
        program: program_name(cmd),
        status: output.status.to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
}

/// Run `cmd` to completion and return its stdout.
pub fn run(cmd: &mut Command) -> Result<Vec<u8>> {
    trace!(command = ?cmd, "running");
    let output = cmd
        .stdin(Stdio::null())
        .output()
        .map_err(|e| spawn_error(cmd, e))?;
    check(cmd, output)
}

/// Run `cmd` and return its stdout as trimmed UTF-8 text.
pub fn run_text(cmd: &mut Command) -> Result<String> {
    let out = run(cmd)?;
    Ok(String::from_utf8_lossy(&out).trim().to_string())
}

/// Run `cmd` with `input` written to its stdin.
///
/// Stdin is fed from a separate thread so a client that writes a lot of
/// output while still reading input cannot deadlock us.
pub fn run_with_input(cmd: &mut Command, input: &[u8]) -> Result<Vec<u8>> {
    trace!(command = ?cmd, bytes = input.len(), "running with stdin");
    let mut child = cmd
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| spawn_error(cmd, e))?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| spawn_error(cmd, std::io::Error::other("stdin not captured")))?;
    let data = input.to_vec();
    let writer = std::thread::spawn(move || -> std::io::Result<()> {
        stdin.write_all(&data)?;
        stdin.flush()
    });

    let output = child.wait_with_output().map_err(|e| spawn_error(cmd, e))?;
    let write_result = writer
        .join()
        .unwrap_or_else(|_| Err(std::io::Error::other("stdin writer panicked")));
    let stdout = check(cmd, output)?;
    // A client that exits successfully without draining stdin is not an error
    // unless the write itself failed for another reason.
    if let Err(e) = write_result {
        if e.kind() != std::io::ErrorKind::BrokenPipe {
            return Err(RevisrError::Io(e));
        }
    }
    Ok(stdout)
}

/// Run `cmd` as a yes/no probe: exit code 0 is `true`, 1 is `false`, anything
/// else is an error.
pub fn run_probe(cmd: &mut Command) -> Result<bool> {
    trace!(command = ?cmd, "probing");
    let output = cmd
        .stdin(Stdio::null())
        .output()
        .map_err(|e| spawn_error(cmd, e))?;
    match output.status.code() {
        Some(0) => Ok(true),
        Some(1) => Ok(false),
        _ => check(cmd, output).map(|_| false),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn run_captures_stdout() {
        let out = run_text(Command::new("sh").args(["-c", "echo hello"])).unwrap();
        assert_eq!(out, "hello");
    }

    #[test]
    fn failing_command_reports_stderr() {
        let err = run(Command::new("sh").args(["-c", "echo boom >&2; exit 3"])).unwrap_err();
        match err {
            RevisrError::Command { program, stderr, .. } => {
                assert_eq!(program, "sh");
                assert_eq!(stderr, "boom");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let err = run(&mut Command::new("revisr-definitely-not-installed")).unwrap_err();
        assert!(matches!(err, RevisrError::Spawn { .. }));
    }

    #[test]
    fn input_is_piped_to_stdin() {
        let out = run_with_input(&mut Command::new("cat"), b"piped bytes").unwrap();
        assert_eq!(out, b"piped bytes");
    }

    #[test]
    fn probe_maps_exit_codes() {
        assert!(run_probe(Command::new("sh").args(["-c", "exit 0"])).unwrap());
        assert!(!run_probe(Command::new("sh").args(["-c", "exit 1"])).unwrap());
        assert!(run_probe(Command::new("sh").args(["-c", "exit 2"])).is_err());
    }
}
