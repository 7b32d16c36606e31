//! One-shot worker invocation: spawn, feed stdin while collecting stdout.

use std::io::ErrorKind;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::{SupervisorError, SupervisorResult};

/// Run `program` once with `input` on stdin and return its whole stdout.
pub async fn run_once(
    name: &str,
    program: &Path,
    input: &[u8],
    timeout: Option<Duration>,
) -> SupervisorResult<String> {
    let run = async {
        let mut child = Command::new(program)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SupervisorError::SpawnFailed {
                name: name.to_string(),
                source,
            })?;

        let mut stdin = child.stdin.take().ok_or_else(|| SupervisorError::PipeAttachFailed {
            name: name.to_string(),
            pipe: "stdin",
        })?;

        // stdout has to drain while stdin is fed; echoing programs fill the pipe.
        let feed = async move {
            let written = stdin.write_all(input).await;
            drop(stdin);
            written
        };
        let (written, output) = tokio::join!(feed, child.wait_with_output());

        match written {
            Ok(()) => {}
            // The program finished without reading its input.
            Err(e) if e.kind() == ErrorKind::BrokenPipe => {}
            Err(source) => {
                return Err(SupervisorError::WriteFailed {
                    name: name.to_string(),
                    source,
                })
            }
        }

        let output = output.map_err(|e| SupervisorError::WaitFailed {
            name: name.to_string(),
            message: e.to_string(),
        })?;

        if !output.status.success() {
            return Err(SupervisorError::WaitFailed {
                name: name.to_string(),
                message: format!("process exited with {}", output.status),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    };

    match timeout {
        Some(after) => tokio::time::timeout(after, run)
            .await
            .map_err(|_| SupervisorError::Timeout {
                name: name.to_string(),
                after,
            })?,
        None => run.await,
    }
}
