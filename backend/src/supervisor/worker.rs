//! Persistent worker processes.
//!
//! A [`Worker`] owns one child process with a piped stdin and stdout. Requests
//! and replies are single lines. The pipes sit behind a mutex so one exchange
//! completes before the next one starts.

use std::io;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;

use crate::api::logs::log_warning;
use crate::error::{SupervisorError, SupervisorResult};

/// Outcome of a request against a persistent worker.
#[derive(Debug)]
pub(crate) enum Exchange {
    /// The worker answered.
    Reply(String),
    /// The worker is unusable; the caller should fall back to one-shot mode.
    Dead,
}

/// A long-lived worker process.
pub struct Worker {
    name: String,
    io: Mutex<WorkerIo>,
}

struct WorkerIo {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: Lines<BufReader<ChildStdout>>,
    /// Set while a request is written but its reply not yet read.
    pending: bool,
    dead: bool,
}

impl Worker {
    /// Spawn `program` with piped stdin/stdout.
    pub fn spawn(name: &str, program: &Path) -> SupervisorResult<Self> {
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

        let stdin = child.stdin.take().ok_or_else(|| SupervisorError::PipeAttachFailed {
            name: name.to_string(),
            pipe: "stdin",
        })?;
        let stdout = child.stdout.take().ok_or_else(|| SupervisorError::PipeAttachFailed {
            name: name.to_string(),
            pipe: "stdout",
        })?;

        Ok(Self {
            name: name.to_string(),
            io: Mutex::new(WorkerIo {
                child,
                stdin: Some(stdin),
                stdout: BufReader::new(stdout).lines(),
                pending: false,
                dead: false,
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Send one request line and wait for one reply line.
    ///
    /// Any error leaves the worker dead: its stream can no longer be trusted
    /// to pair requests with replies. The same holds when a previous caller
    /// abandoned its exchange halfway.
    pub(crate) async fn exchange(
        &self,
        line: &str,
        timeout: Option<Duration>,
    ) -> SupervisorResult<Exchange> {
        let mut io = self.io.lock().await;

        if io.dead {
            return Ok(Exchange::Dead);
        }
        if io.pending {
            log_warning(format!(
                "Worker '{}' has an abandoned request in flight, shutting it down",
                self.name
            ));
            io.kill(&self.name).await;
            return Ok(Exchange::Dead);
        }

        io.pending = true;
        let result = match timeout {
            Some(after) => {
                match tokio::time::timeout(after, io.round_trip(&self.name, line)).await {
                    Ok(result) => result,
                    Err(_) => Err(SupervisorError::Timeout {
                        name: self.name.clone(),
                        after,
                    }),
                }
            }
            None => io.round_trip(&self.name, line).await,
        };

        match result {
            Ok(reply) => {
                io.pending = false;
                Ok(Exchange::Reply(reply))
            }
            Err(err) => {
                io.kill(&self.name).await;
                Err(err)
            }
        }
    }

    /// Close stdin and wait for the process to exit.
    pub async fn close(&self) -> SupervisorResult<()> {
        let mut io = self.io.lock().await;
        io.dead = true;
        drop(io.stdin.take());

        let status = io
            .child
            .wait()
            .await
            .map_err(|e| SupervisorError::WaitFailed {
                name: self.name.clone(),
                message: e.to_string(),
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(SupervisorError::WaitFailed {
                name: self.name.clone(),
                message: format!("process exited with {}", status),
            })
        }
    }
}

impl WorkerIo {
    async fn round_trip(&mut self, name: &str, line: &str) -> SupervisorResult<String> {
        let write_failed = |source: io::Error| SupervisorError::WriteFailed {
            name: name.to_string(),
            source,
        };

        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| write_failed(io::Error::new(io::ErrorKind::BrokenPipe, "stdin closed")))?;

        let mut request = String::with_capacity(line.len() + 1);
        request.push_str(line);
        request.push('\n');
        stdin.write_all(request.as_bytes()).await.map_err(write_failed)?;
        stdin.flush().await.map_err(write_failed)?;

        match self.stdout.next_line().await {
            Ok(Some(reply)) => Ok(reply),
            Ok(None) => Err(SupervisorError::NoOutput(name.to_string())),
            Err(source) => Err(SupervisorError::ReadFailed {
                name: name.to_string(),
                source,
            }),
        }
    }

    async fn kill(&mut self, name: &str) {
        self.dead = true;
        drop(self.stdin.take());
        if let Err(e) = self.child.kill().await {
            // Already exited is the common case here.
            tracing::debug!(worker = name, error = %e, "kill failed");
        }
    }
}
