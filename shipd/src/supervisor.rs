use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use sysinfo::System;
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, Semaphore};
use tokio::time::sleep;
use tracing::{error, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("daemon already started")]
    AlreadyStarted,
    #[error("daemon has not started")]
    NotStarted,
    #[error("a reload is already in flight")]
    Busy,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Process-tree listing and termination. The heuristic orphan check only
/// needs these two primitives, so tests can script them.
pub trait ProcessProbe: Send + Sync + 'static {
    /// Sorted pids of the direct children of `parent`.
    fn child_pids(&self, parent: u32) -> Vec<u32>;
    fn kill(&self, pid: u32);
}

/// Production probe walking the system process table.
pub struct SysinfoProbe;

impl ProcessProbe for SysinfoProbe {
    fn child_pids(&self, parent: u32) -> Vec<u32> {
        let sys = System::new_all();
        let mut pids: Vec<u32> = sys
            .processes()
            .iter()
            .filter(|(_, proc)| proc.parent().map(|p| p.as_u32()) == Some(parent))
            .map(|(pid, _)| pid.as_u32())
            .collect();
        pids.sort_unstable();
        pids
    }

    fn kill(&self, pid: u32) {
        if let Err(e) = signal::kill(Pid::from_raw(pid as i32), Signal::SIGKILL) {
            warn!("failed to kill {pid}: {e}");
        }
    }
}

/// Owns the daemon's process handle. Built once at the composition root;
/// everything serving the control endpoint shares it.
pub struct Supervisor {
    program: String,
    args: Vec<String>,
    grace: Duration,
    child: Mutex<Option<Child>>,
    /// Single-capacity slot: at most one reload runs at a time,
    /// system-wide. Extra triggers are rejected, not queued.
    reload_slot: Arc<Semaphore>,
    probe: Arc<dyn ProcessProbe>,
}

impl Supervisor {
    pub fn new(
        program: String,
        args: Vec<String>,
        grace: Duration,
        probe: Arc<dyn ProcessProbe>,
    ) -> Self {
        Supervisor {
            program,
            args,
            grace,
            child: Mutex::new(None),
            reload_slot: Arc::new(Semaphore::new(1)),
            probe,
        }
    }

    /// Launch the daemon once, wiring its streams through to ours. Does
    /// not wait for it.
    pub async fn start(&self) -> Result<(), SupervisorError> {
        let mut child = self.child.lock().await;
        if child.is_some() {
            return Err(SupervisorError::AlreadyStarted);
        }
        info!("starting {} {}", self.program, self.args.join(" "));
        let spawned = Command::new(&self.program)
            .args(&self.args)
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()?;
        *child = Some(spawned);
        Ok(())
    }

    /// Trigger a coalesced reload. Returns as soon as the background task
    /// is started; `Busy` when one is already in flight.
    pub async fn reload(&self) -> Result<(), SupervisorError> {
        let pid = self
            .child
            .lock()
            .await
            .as_ref()
            .and_then(|c| c.id())
            .ok_or(SupervisorError::NotStarted)?;
        let permit = self
            .reload_slot
            .clone()
            .try_acquire_owned()
            .map_err(|_| SupervisorError::Busy)?;

        let probe = self.probe.clone();
        let grace = self.grace;
        tokio::spawn(async move {
            // Held for the whole cycle; dropping it reopens the slot even
            // if the probe or the signal failed.
            let _permit = permit;
            Self::reload_cycle(probe, grace, pid).await;
        });
        Ok(())
    }

    /// Signal the daemon to re-read its config, then apply the orphan
    /// heuristic: a worker set that is byte-identical after the grace
    /// period means the daemon failed to replace its workers, so the old
    /// ones are presumed stuck and killed to force recovery.
    pub(crate) async fn reload_cycle(probe: Arc<dyn ProcessProbe>, grace: Duration, pid: u32) {
        let before = probe.child_pids(pid);
        info!("reloading daemon {pid}, workers before: {before:?}");
        if let Err(e) = signal::kill(Pid::from_raw(pid as i32), Signal::SIGUSR2) {
            error!("failed to signal daemon {pid}: {e}");
        }
        sleep(grace).await;
        let after = probe.child_pids(pid);
        info!("workers after reload: {after:?}");
        if before == after {
            for worker in &before {
                warn!("worker {worker} survived reload unchanged, killing");
                probe.kill(*worker);
            }
        }
    }

    /// Whether a reload task is currently holding the slot.
    pub fn reloading(&self) -> bool {
        self.reload_slot.available_permits() == 0
    }
}
