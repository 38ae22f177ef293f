pub(crate) mod builder;
pub(crate) mod handle;
pub(crate) mod policy;

use std::{any::Any, panic::AssertUnwindSafe, sync::Arc, time::Duration};

use futures::FutureExt;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};

pub use policy::RestartPolicy;

use crate::{
    child::ChildHandle,
    encoder::EncoderCommand,
    error::SupervisorError,
    facade::{LogEntry, StatusFacade},
    filter::LineFilter,
    launcher::{ExitOutcome, Launcher},
    supervisor::handle::SupervisorHandle,
};

/// Messages sent to the supervisor by its own timers and child watchers.
#[derive(Debug)]
pub(crate) enum InternalMessage {
    /// A restart timer fired. Only the most recently scheduled ticket counts.
    Start { ticket: u64 },
    /// The child of the given generation is gone.
    Exited {
        generation: u64,
        outcome: Result<ExitOutcome, String>,
    },
}

/// Commands sent through a `SupervisorHandle`.
#[derive(Debug)]
pub(crate) enum SupervisorMessage {
    Restart,
    Stop(oneshot::Sender<()>),
}

/// Keeps one encoder process running.
///
/// All state transitions happen on a single task: the start edge
/// (`Offline -> Starting -> Live`), the exit edge (`Live -> Offline`, one
/// restart timer scheduled) and stop. Restarts are only ever scheduled from
/// the exit edge or from a failed start, so a new child is never spawned
/// while the previous one is still considered alive.
pub struct Supervisor {
    command: Option<EncoderCommand>,
    launcher: Arc<dyn Launcher>,
    facade: StatusFacade,
    filter: Arc<LineFilter>,
    policy: RestartPolicy,
    child: Option<ChildHandle>,
    next_generation: u64,
    restart_attempts: u32,
    pending_restart: Option<(u64, JoinHandle<()>)>,
    next_ticket: u64,
    restart_now: bool,
    gave_up: bool,
    launched_once: bool,
    tx: mpsc::UnboundedSender<InternalMessage>,
    rx: mpsc::UnboundedReceiver<InternalMessage>,
}

impl Supervisor {
    /// Runs the supervisor, consuming it and returning a handle for external control.
    ///
    /// The first start attempt happens immediately. A panic inside the
    /// supervision loop is recorded in the facade instead of escaping.
    pub fn run(self) -> SupervisorHandle {
        let (external_tx, external_rx) = mpsc::unbounded_channel();
        let facade = self.facade.clone();
        let guard_facade = facade.clone();
        let join_handle = tokio::spawn(async move {
            let supervise = tokio::spawn(self.run_and_supervise(external_rx));
            if let Err(e) = supervise.await {
                if e.is_panic() {
                    tracing::error!("supervisor loop panicked");
                    guard_facade.mark_offline();
                    guard_facade.record_error("supervisor fault: loop panicked");
                    guard_facade.append_log(LogEntry::error(
                        "Supervisor stopped after an internal fault",
                    ));
                }
            }
        });
        SupervisorHandle::new(join_handle, external_tx, facade)
    }

    pub fn facade(&self) -> &StatusFacade {
        &self.facade
    }

    async fn run_and_supervise(
        mut self,
        mut external_rx: mpsc::UnboundedReceiver<SupervisorMessage>,
    ) {
        self.start_child().await;

        loop {
            tokio::select! {
                Some(internal_msg) = self.rx.recv() => {
                    match internal_msg {
                        InternalMessage::Start { ticket } => {
                            self.handle_restart_timer(ticket).await;
                        }
                        InternalMessage::Exited { generation, outcome } => {
                            self.handle_exit(generation, outcome).await;
                        }
                    }
                },
                user_msg = external_rx.recv() => {
                    match user_msg {
                        Some(SupervisorMessage::Restart) => {
                            self.force_restart().await;
                        }
                        Some(SupervisorMessage::Stop(ack)) => {
                            self.shutdown().await;
                            let _ = ack.send(());
                            break;
                        }
                        // Every handle is gone; nobody can stop us later.
                        None => {
                            self.shutdown().await;
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Start edge. A no-op while a child is alive.
    async fn start_child(&mut self) {
        if self.child.is_some() {
            tracing::debug!("start ignored: encoder still running");
            return;
        }
        if self.gave_up {
            return;
        }

        let Some(command) = self.command.clone() else {
            self.fail_start(SupervisorError::MissingStreamKey);
            return;
        };
        if let Some(missing) = command.missing_assets().into_iter().next() {
            self.fail_start(SupervisorError::MissingAsset(missing));
            self.schedule_restart(self.policy.asset_retry_delay);
            return;
        }

        self.facade.mark_starting();
        if self.launched_once {
            self.facade.count_restart();
        }
        self.launched_once = true;
        tracing::info!(command = %command.display(), "starting encoder");
        let launched = AssertUnwindSafe(self.launcher.launch(&command))
            .catch_unwind()
            .await;
        match launched {
            Ok(Ok(child)) => {
                let generation = self.next_generation;
                self.next_generation += 1;
                let handle = ChildHandle::watch(
                    generation,
                    child,
                    self.facade.clone(),
                    self.filter.clone(),
                    self.tx.clone(),
                );
                let pid = handle.pid;
                self.child = Some(handle);
                self.facade.mark_live(pid);
                let started = match pid {
                    Some(pid) => format!("Encoder started (pid {pid})"),
                    None => "Encoder started".to_string(),
                };
                tracing::info!(?pid, generation, "encoder is live");
                self.facade.append_log(LogEntry::success(started));
            }
            Ok(Err(e)) => {
                self.fail_start(SupervisorError::Spawn(e));
                self.schedule_backoff_restart();
            }
            Err(panic) => {
                self.fail_start(SupervisorError::LauncherPanicked(panic_message(&*panic)));
                self.schedule_backoff_restart();
            }
        }
    }

    fn fail_start(&mut self, error: SupervisorError) {
        tracing::error!(error = %error, "encoder not started");
        let text = error.to_string();
        self.facade.mark_offline();
        self.facade.record_error(&text);
        self.facade.append_log(LogEntry::error(text));
    }

    async fn handle_restart_timer(&mut self, ticket: u64) {
        match self.pending_restart.as_ref() {
            Some((pending, _)) if *pending == ticket => {
                self.pending_restart = None;
            }
            _ => {
                tracing::debug!(ticket, "ignoring stale restart timer");
                return;
            }
        }
        self.start_child().await;
    }

    /// Exit edge. Notifications for anything but the current child are ignored.
    async fn handle_exit(&mut self, generation: u64, outcome: Result<ExitOutcome, String>) {
        if self.child.as_ref().map(|child| child.generation) != Some(generation) {
            tracing::debug!(generation, "ignoring exit of a stale encoder");
            return;
        }
        let Some(child) = self.child.take() else {
            return;
        };
        if child.live_since.elapsed() >= self.policy.stable_after {
            self.restart_attempts = 0;
        }
        child.stop().await;

        self.facade.mark_offline();
        let entry = match outcome {
            Ok(ExitOutcome { code: Some(0) }) => LogEntry::info("Encoder exited with code 0"),
            Ok(ExitOutcome { code: Some(code) }) => {
                LogEntry::error(format!("Encoder exited with code {code}"))
            }
            Ok(ExitOutcome { code: None }) => LogEntry::warning("Encoder terminated by signal"),
            Err(e) => {
                self.facade.record_error(&e);
                LogEntry::error(format!("Encoder lost: {e}"))
            }
        };
        tracing::warn!(generation, "{}", entry.text);
        self.facade.append_log(entry);

        if std::mem::take(&mut self.restart_now) {
            if let Some((_, pending)) = self.pending_restart.take() {
                pending.abort();
            }
            self.start_child().await;
        } else {
            self.schedule_backoff_restart();
        }
    }

    fn schedule_backoff_restart(&mut self) {
        if self.policy.has_exceeded_max_attempts(self.restart_attempts) {
            self.gave_up = true;
            let text = format!("Giving up after {} restart attempts", self.restart_attempts);
            tracing::error!("{text}");
            self.facade.record_error(&text);
            self.facade.append_log(LogEntry::error(text));
            return;
        }
        let delay = self.policy.delay_for(self.restart_attempts);
        self.restart_attempts = self.restart_attempts.saturating_add(1);
        self.schedule_restart(delay);
    }

    /// Replaces any pending restart timer with a new one.
    fn schedule_restart(&mut self, delay: Duration) {
        if let Some((_, pending)) = self.pending_restart.take() {
            pending.abort();
        }
        let ticket = self.next_ticket;
        self.next_ticket += 1;

        tracing::info!(delay_ms = delay.as_millis() as u64, "restart scheduled");
        self.facade
            .append_log(LogEntry::info(format!("Restarting in {}s", delay.as_secs())));
        let tx = self.tx.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(InternalMessage::Start { ticket });
        });
        self.pending_restart = Some((ticket, timer));
    }

    /// Terminates the live child and starts a fresh one right away. Also
    /// revives a supervisor that gave up or is waiting on a timer.
    async fn force_restart(&mut self) {
        self.gave_up = false;
        self.restart_attempts = 0;
        if let Some(child) = self.child.as_ref() {
            tracing::info!(generation = child.generation, "restart requested");
            self.restart_now = true;
            child.terminate();
            return;
        }
        if let Some((_, pending)) = self.pending_restart.take() {
            pending.abort();
        }
        self.start_child().await;
    }

    async fn shutdown(&mut self) {
        if let Some((_, pending)) = self.pending_restart.take() {
            pending.abort();
        }
        if let Some(child) = self.child.take() {
            tracing::info!(generation = child.generation, "stopping encoder");
            child.stop().await;
        }
        self.facade.mark_offline();
        self.facade.append_log(LogEntry::info("Stream stopped"));
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
