//! In-memory fakes for the subprocess and container runtime boundaries.

use crate::error::ResolutionError;
use crate::process::{CommandRunner, ExecResult, Invocation};
use crate::resolver::ContainerInspector;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Records every invocation and exits 0 unless told otherwise.
#[derive(Debug, Default)]
pub(crate) struct RecordingRunner {
    calls: Mutex<Vec<Invocation>>,
    /// (needle, exit code, remaining failures; `None` is forever)
    failures: Mutex<Vec<(String, i32, Option<usize>)>>,
    delays: Mutex<Vec<(String, Duration)>>,
}

impl RecordingRunner {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Exit with `exit_code` for any invocation whose command line contains `needle`.
    pub(crate) fn fail_when(&self, needle: &str, exit_code: i32) {
        self.failures
            .lock()
            .unwrap()
            .push((needle.to_string(), exit_code, None));
    }

    /// Like [`fail_when`](Self::fail_when), but only for the first match.
    pub(crate) fn fail_once(&self, needle: &str, exit_code: i32) {
        self.failures
            .lock()
            .unwrap()
            .push((needle.to_string(), exit_code, Some(1)));
    }

    /// Sleep for `delay` before answering any invocation containing `needle`.
    pub(crate) fn delay_when(&self, needle: &str, delay: Duration) {
        self.delays
            .lock()
            .unwrap()
            .push((needle.to_string(), delay));
    }

    pub(crate) fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn count_matching(&self, needle: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.to_string().contains(needle))
            .count()
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, invocation: &Invocation) -> std::io::Result<ExecResult> {
        self.calls.lock().unwrap().push(invocation.clone());
        let rendered = invocation.to_string();

        let delay = self
            .delays
            .lock()
            .unwrap()
            .iter()
            .find(|(needle, _)| rendered.contains(needle.as_str()))
            .map(|(_, delay)| *delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let exit_code = self
            .failures
            .lock()
            .unwrap()
            .iter_mut()
            .find(|(needle, _, remaining)| {
                rendered.contains(needle.as_str()) && *remaining != Some(0)
            })
            .map(|(_, code, remaining)| {
                if let Some(left) = remaining {
                    *left -= 1;
                }
                *code
            })
            .unwrap_or(0);

        Ok(ExecResult {
            exit_code,
            stdout: String::new(),
            stderr: if exit_code == 0 {
                String::new()
            } else {
                format!("{} failed", invocation.program)
            },
        })
    }
}

/// Containers that become visible after a number of polls.
#[derive(Debug, Default)]
pub(crate) struct FakeInspector {
    containers: Mutex<HashMap<String, (IpAddr, usize)>>,
    polls: Mutex<HashMap<String, usize>>,
    hung: Mutex<HashSet<String>>,
    broken: Mutex<Option<String>>,
}

impl FakeInspector {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// `name` reports `ip` from the first poll onwards.
    pub(crate) fn running(&self, name: &str, ip: IpAddr) {
        self.appears_after(name, ip, 0);
    }

    /// `name` reports nothing for the first `polls` queries, then `ip`.
    pub(crate) fn appears_after(&self, name: &str, ip: IpAddr, polls: usize) {
        self.containers
            .lock()
            .unwrap()
            .insert(name.to_string(), (ip, polls));
    }

    /// Queries for `name` never return.
    pub(crate) fn hangs(&self, name: &str) {
        self.hung.lock().unwrap().insert(name.to_string());
    }

    /// Every query fails with a runtime error.
    pub(crate) fn break_runtime(&self, message: &str) {
        *self.broken.lock().unwrap() = Some(message.to_string());
    }

    pub(crate) fn polls(&self, name: &str) -> usize {
        self.polls.lock().unwrap().get(name).copied().unwrap_or(0)
    }
}

#[async_trait]
impl ContainerInspector for FakeInspector {
    async fn ip_address(&self, container: &str) -> Result<Option<IpAddr>, ResolutionError> {
        if let Some(message) = self.broken.lock().unwrap().clone() {
            return Err(ResolutionError::Inspect {
                container: container.to_string(),
                message,
            });
        }

        let hung = self.hung.lock().unwrap().contains(container);
        if hung {
            std::future::pending::<()>().await;
        }

        let seen = {
            let mut polls = self.polls.lock().unwrap();
            let count = polls.entry(container.to_string()).or_insert(0);
            *count += 1;
            *count
        };

        Ok(self
            .containers
            .lock()
            .unwrap()
            .get(container)
            .filter(|(_, hidden_for)| seen > *hidden_for)
            .map(|(ip, _)| *ip))
    }
}
