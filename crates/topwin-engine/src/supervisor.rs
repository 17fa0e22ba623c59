//! Collaborator service control: start/stop/is-running for the overlay
//! renderer and the foreground-app monitor.
//!
//! All three operations are idempotent commands with no acknowledgment
//! channel: starting a running service or stopping a stopped one is a no-op,
//! and `start` does not wait for the collaborator to finish initializing.

use std::{
    collections::{HashMap, HashSet},
    io,
    process::{Child, Command},
};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{Error, Result};

/// A collaborator service the toggles start and stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceKind {
    /// Draws the floating info overlay.
    OverlayRenderer,
    /// Watches foreground-app changes via the accessibility capability and
    /// emits activity-name events consumed elsewhere.
    ActivityMonitor,
}

impl std::fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::OverlayRenderer => "overlay-renderer",
            Self::ActivityMonitor => "activity-monitor",
        };
        f.write_str(s)
    }
}

/// Control surface for collaborator services.
pub trait ServiceControl: Send + Sync {
    /// Start `kind` if it is not already running. Fire-and-forget.
    fn start(&self, kind: ServiceKind) -> Result<()>;
    /// Stop `kind` if it is running.
    fn stop(&self, kind: ServiceKind);
    /// Whether `kind` is currently running, queried fresh (the OS can kill
    /// a collaborator without warning).
    fn is_running(&self, kind: ServiceKind) -> bool;
}

/// Launch configuration for one collaborator.
#[derive(Debug, Clone)]
pub struct ServiceSpec {
    /// Which collaborator this spec launches.
    pub kind: ServiceKind,
    /// Executable to spawn.
    pub command: String,
    /// Arguments passed to the executable.
    pub args: Vec<String>,
    /// Environment passed to the child (e.g. `RUST_LOG` so collaborator
    /// logs honor the same filter as the parent).
    pub env: Vec<(String, String)>,
    /// Ask the OS to keep the process alive under memory pressure. A hint
    /// only; coordinator logic does not depend on it.
    pub keep_alive: bool,
}

/// Child-process supervisor: each collaborator is an independent process.
pub struct ProcessControl {
    /// Launch spec per collaborator.
    specs: HashMap<ServiceKind, ServiceSpec>,
    /// Live children, pruned lazily when a process is found exited.
    children: Mutex<HashMap<ServiceKind, Child>>,
}

impl ProcessControl {
    /// Create a supervisor for the given launch specs.
    pub fn new(specs: impl IntoIterator<Item = ServiceSpec>) -> Self {
        Self {
            specs: specs.into_iter().map(|s| (s.kind, s)).collect(),
            children: Mutex::new(HashMap::new()),
        }
    }

    /// Check (and prune) the child entry for `kind`. Caller holds the lock.
    fn child_alive(children: &mut HashMap<ServiceKind, Child>, kind: ServiceKind) -> bool {
        match children.get_mut(&kind) {
            Some(child) => match child.try_wait() {
                Ok(None) => true,
                Ok(Some(status)) => {
                    debug!(%kind, %status, "collaborator exited");
                    children.remove(&kind);
                    false
                }
                Err(e) => {
                    warn!(%kind, error = %e, "could not query collaborator, assuming dead");
                    children.remove(&kind);
                    false
                }
            },
            None => false,
        }
    }
}

impl ServiceControl for ProcessControl {
    fn start(&self, kind: ServiceKind) -> Result<()> {
        let mut children = self.children.lock();
        if Self::child_alive(&mut children, kind) {
            return Ok(());
        }
        let Some(spec) = self.specs.get(&kind) else {
            debug!(%kind, "no launch spec configured, skipping start");
            return Ok(());
        };
        let mut cmd = Command::new(&spec.command);
        cmd.args(&spec.args);
        cmd.envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        if spec.keep_alive {
            cmd.env("TOPWIN_KEEP_ALIVE", "1");
        }
        let child = cmd.spawn().map_err(|source| Error::Spawn { kind, source })?;
        info!(%kind, pid = child.id(), "collaborator started");
        children.insert(kind, child);
        Ok(())
    }

    fn stop(&self, kind: ServiceKind) {
        let mut children = self.children.lock();
        if let Some(mut child) = children.remove(&kind) {
            if let Err(e) = child.kill() {
                debug!(%kind, error = %e, "kill failed, collaborator already gone");
            }
            let _ = child.wait();
            info!(%kind, "collaborator stopped");
        }
    }

    fn is_running(&self, kind: ServiceKind) -> bool {
        Self::child_alive(&mut self.children.lock(), kind)
    }
}

impl Drop for ProcessControl {
    fn drop(&mut self) {
        let kinds: Vec<ServiceKind> = self.children.lock().keys().copied().collect();
        for kind in kinds {
            self.stop(kind);
        }
    }
}

/// Recording fake for tests: tracks running state and call counts, and can
/// simulate spawn failure or an OS kill.
#[derive(Default)]
pub struct MockControl {
    /// Interior state behind one lock.
    inner: Mutex<MockControlState>,
}

/// State backing [`MockControl`].
#[derive(Default)]
struct MockControlState {
    /// Kinds currently "running".
    running: HashSet<ServiceKind>,
    /// Number of start calls per kind (no-op starts included).
    starts: HashMap<ServiceKind, usize>,
    /// Number of stop calls per kind.
    stops: HashMap<ServiceKind, usize>,
    /// Kinds whose next start should fail.
    fail_start: HashSet<ServiceKind>,
}

impl MockControl {
    /// Create a supervisor with nothing running.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent starts of `kind` fail (until cleared).
    pub fn fail_start(&self, kind: ServiceKind, fail: bool) {
        let mut inner = self.inner.lock();
        if fail {
            inner.fail_start.insert(kind);
        } else {
            inner.fail_start.remove(&kind);
        }
    }

    /// Simulate the OS killing `kind` without notice.
    pub fn kill(&self, kind: ServiceKind) {
        self.inner.lock().running.remove(&kind);
    }

    /// Number of `start` calls observed for `kind`.
    pub fn start_count(&self, kind: ServiceKind) -> usize {
        self.inner.lock().starts.get(&kind).copied().unwrap_or(0)
    }

    /// Number of `stop` calls observed for `kind`.
    pub fn stop_count(&self, kind: ServiceKind) -> usize {
        self.inner.lock().stops.get(&kind).copied().unwrap_or(0)
    }
}

impl ServiceControl for MockControl {
    fn start(&self, kind: ServiceKind) -> Result<()> {
        let mut inner = self.inner.lock();
        *inner.starts.entry(kind).or_insert(0) += 1;
        if inner.fail_start.contains(&kind) {
            return Err(Error::Spawn {
                kind,
                source: io::Error::new(io::ErrorKind::NotFound, "mock spawn failure"),
            });
        }
        inner.running.insert(kind);
        Ok(())
    }

    fn stop(&self, kind: ServiceKind) {
        let mut inner = self.inner.lock();
        *inner.stops.entry(kind).or_insert(0) += 1;
        inner.running.remove(&kind);
    }

    fn is_running(&self, kind: ServiceKind) -> bool {
        self.inner.lock().running.contains(&kind)
    }
}
