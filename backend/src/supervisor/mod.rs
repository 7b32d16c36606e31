//! External worker process supervision.
//!
//! Workers are executables under a handlers directory, addressed by file name.
//! A worker can be started once and kept alive ([`ProcessSupervisor::start`]),
//! or, when nothing is registered under its name, run once per call.
//!
//! ```text
//!  exec(name, value)
//!        │
//!        ├── registered? ──yes──▶ lock worker ─▶ write line ─▶ read line ─▶ reply
//!        │                          (one exchange at a time per worker)
//!        └── no ──▶ spawn ─▶ write all + read all ─▶ wait ─▶ stdout
//! ```
//!
//! The registry takes a write lock only to add or remove workers; lookups
//! share a read lock, and exchanges with different workers run in parallel.

pub mod encoding;
pub mod oneshot;
pub mod worker;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::RwLock;

use crate::api::logs::{log_success, log_warning};
use crate::config::HandlerConfig;
use crate::error::{SupervisorError, SupervisorResult};

pub use worker::Worker;
use worker::Exchange;

/// Default directory handler executables are resolved from.
pub const DEFAULT_HANDLERS_DIR: &str = "./handlers";

/// Owns the persistent workers and runs one-shot ones.
pub struct ProcessSupervisor {
    handlers_dir: PathBuf,
    timeout: Option<Duration>,
    workers: RwLock<HashMap<String, Arc<Worker>>>,
}

impl ProcessSupervisor {
    /// Create a supervisor resolving executables from `handlers_dir`.
    pub fn new(handlers_dir: impl Into<PathBuf>) -> Self {
        Self {
            handlers_dir: handlers_dir.into(),
            timeout: None,
            workers: RwLock::new(HashMap::new()),
        }
    }

    /// Bound every worker exchange by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn program_path(&self, name: &str) -> PathBuf {
        self.handlers_dir.join(name)
    }

    /// Start a persistent worker and register it under `name`.
    ///
    /// A worker already registered under that name is closed and replaced.
    pub async fn start(&self, name: &str) -> SupervisorResult<()> {
        let worker = Arc::new(Worker::spawn(name, &self.program_path(name))?);
        let previous = self.workers.write().await.insert(name.to_string(), worker);
        log_success(format!("Process {} started", name));

        if let Some(old) = previous {
            log_warning(format!("Replaced running process {}", name));
            if let Err(e) = old.close().await {
                log_warning(format!("{}", e));
            }
        }
        Ok(())
    }

    /// Start every handler marked persistent.
    pub async fn spawn_persistent(&self, handlers: &[HandlerConfig]) -> SupervisorResult<()> {
        for handler in handlers.iter().filter(|h| h.persistent) {
            self.start(&handler.name).await?;
        }
        Ok(())
    }

    /// Whether a persistent worker is registered under `name`.
    pub async fn is_running(&self, name: &str) -> bool {
        self.workers.read().await.contains_key(name)
    }

    /// Names of all registered workers, sorted.
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.workers.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Send `value` to the worker `name` and return its reply.
    ///
    /// Uses the persistent worker if one is registered, one-shot mode
    /// otherwise. A persistent worker that fails is removed from the registry;
    /// later calls for the same name run one-shot.
    pub async fn exec(&self, name: &str, value: &Value) -> SupervisorResult<String> {
        let worker = self.workers.read().await.get(name).cloned();

        if let Some(worker) = worker {
            match worker
                .exchange(&encoding::request_line(value), self.timeout)
                .await
            {
                Ok(Exchange::Reply(reply)) => return Ok(reply),
                Ok(Exchange::Dead) => {
                    self.evict(name, &worker).await;
                    log_warning(format!(
                        "Process {} is no longer usable, running it one-shot",
                        name
                    ));
                }
                Err(err) => {
                    self.evict(name, &worker).await;
                    return Err(err);
                }
            }
        }

        oneshot::run_once(
            name,
            &self.program_path(name),
            &encoding::one_shot_input(value),
            self.timeout,
        )
        .await
    }

    /// Close the worker `name`: close its stdin and wait for it to exit.
    pub async fn close(&self, name: &str) -> SupervisorResult<()> {
        let worker = self
            .workers
            .write()
            .await
            .remove(name)
            .ok_or_else(|| SupervisorError::UnknownWorker(name.to_string()))?;
        worker.close().await
    }

    /// Close every registered worker, logging failures.
    pub async fn shutdown(&self) {
        let workers: Vec<Arc<Worker>> = self
            .workers
            .write()
            .await
            .drain()
            .map(|(_, w)| w)
            .collect();

        for worker in workers {
            match worker.close().await {
                Ok(()) => log_success(format!("Process {} stopped", worker.name())),
                Err(e) => log_warning(format!("{}", e)),
            }
        }
    }

    /// Remove `worker` from the registry unless it was already replaced.
    async fn evict(&self, name: &str, worker: &Arc<Worker>) {
        let mut workers = self.workers.write().await;
        if workers.get(name).is_some_and(|w| Arc::ptr_eq(w, worker)) {
            workers.remove(name);
        }
    }
}
