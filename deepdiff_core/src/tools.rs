//! External tool invocation.
//!
//! Subprocess failures are folded into the tagged [`ComparatorFailure`]
//! shapes: a missing binary, a non-zero exit, or output that cannot be
//! parsed. No other failure mode escapes to the engine.

use deepdiff_common::ComparatorFailure;
use std::ffi::OsStr;
use std::process::{Command, Output, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tracing::debug;

const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Tools any comparator may invoke, with the package known to provide
/// them. Consulted for the `--list-tools` surface and for the install
/// hint attached to fallback comments.
static TOOL_PACKAGES: &[(&str, &str)] = &[("cmp", "diffutils"), ("readelf", "binutils")];

pub fn package_hint(tool: &str) -> Option<&'static str> {
    TOOL_PACKAGES
        .iter()
        .find(|(name, _)| *name == tool)
        .map(|(_, pkg)| *pkg)
}

pub fn required_tools() -> impl Iterator<Item = &'static str> {
    TOOL_PACKAGES.iter().map(|(name, _)| *name)
}

fn command_line(tool: &str, args: &[&OsStr]) -> String {
    let mut line = tool.to_string();
    for arg in args {
        line.push(' ');
        line.push_str(&arg.to_string_lossy());
    }
    line
}

/// Runs a tool and returns its raw output without judging the exit
/// status. Used where a non-zero exit is meaningful (`cmp` exits 1 when
/// the files differ).
///
/// A set `cancel` flag kills the in-flight child; the caller observes
/// the cancellation through its own flag check, not through the exit
/// status of the killed child.
pub fn run_with_status(
    tool: &str,
    args: &[&OsStr],
    cancel: Option<&AtomicBool>,
) -> Result<Output, ComparatorFailure> {
    debug!("running `{}`", command_line(tool, args));
    let spawned = Command::new(tool)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn();
    let mut child = match spawned {
        Ok(child) => child,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(ComparatorFailure::ToolNotFound {
                tool: tool.to_string(),
                package: package_hint(tool).map(str::to_string),
            });
        }
        Err(err) => {
            return Err(ComparatorFailure::ToolFailed {
                command: command_line(tool, args),
                code: -1,
                output: err.to_string().into_bytes(),
            });
        }
    };

    if let Some(flag) = cancel {
        loop {
            if flag.load(Ordering::Relaxed) {
                debug!("killing `{}` on cancellation", command_line(tool, args));
                let _ = child.kill();
                break;
            }
            match child.try_wait() {
                Ok(Some(_)) => break,
                Ok(None) => thread::sleep(CANCEL_POLL_INTERVAL),
                Err(_) => break,
            }
        }
    }

    child
        .wait_with_output()
        .map_err(|err| ComparatorFailure::ToolFailed {
            command: command_line(tool, args),
            code: -1,
            output: err.to_string().into_bytes(),
        })
}

/// Runs a tool, treating any non-zero exit as a failure carrying the
/// captured stderr.
pub fn run(
    tool: &str,
    args: &[&OsStr],
    cancel: Option<&AtomicBool>,
) -> Result<Output, ComparatorFailure> {
    let output = run_with_status(tool, args, cancel)?;
    if !output.status.success() {
        return Err(ComparatorFailure::ToolFailed {
            command: command_line(tool, args),
            code: output.status.code().unwrap_or(-1),
            output: output.stderr,
        });
    }
    Ok(output)
}

/// Decodes tool stdout where text output is required.
pub fn stdout_text(tool_line: &str, output: Output) -> Result<String, ComparatorFailure> {
    String::from_utf8(output.stdout).map_err(|_| ComparatorFailure::UnparseableOutput {
        command: tool_line.to_string(),
    })
}
