pub(crate) mod lines;

use std::{sync::Arc, time::Duration};

use futures::StreamExt;
use tokio::{sync::mpsc, task::JoinHandle, time::Instant};
use tokio_util::{codec::FramedRead, sync::CancellationToken};

use crate::{
    facade::{Severity, StatusFacade},
    filter::LineFilter,
    launcher::{ChildProcess, Diagnostics, ExitOutcome},
    supervisor::InternalMessage,
};

use lines::LineSplitter;

/// How long to keep reading diagnostics after the child has exited.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// How long a terminated encoder gets to flush before it is killed.
const TERMINATE_GRACE: Duration = Duration::from_secs(5);

/// The supervisor's ownership of the one running encoder.
///
/// The process itself lives inside a watcher task; this handle keeps the
/// means to stop it and to know when it is gone. Dropping the handle asks
/// the watcher to terminate the child.
#[derive(Debug)]
pub(crate) struct ChildHandle {
    pub(crate) generation: u64,
    pub(crate) pid: Option<u32>,
    pub(crate) live_since: Instant,
    cancellation_token: CancellationToken,
    join_handle: Option<JoinHandle<()>>,
}

impl ChildHandle {
    /// Starts watching `child`. Exactly one `Exited` message tagged with
    /// `generation` is sent once the process is gone, whether it exited on
    /// its own, was terminated, or the watcher itself failed.
    pub(crate) fn watch(
        generation: u64,
        mut child: Box<dyn ChildProcess>,
        facade: StatusFacade,
        filter: Arc<LineFilter>,
        tx: mpsc::UnboundedSender<InternalMessage>,
    ) -> Self {
        let pid = child.id();
        let token = CancellationToken::new();
        let token_watch = token.clone();

        let join_handle = tokio::spawn(async move {
            let diagnostics = child.take_diagnostics();
            let watched = tokio::spawn(run_child(child, diagnostics, token_watch, facade, filter));
            let outcome = match watched.await {
                Ok(outcome) => outcome,
                Err(e) => Err(format!("encoder watcher failed: {e}")),
            };
            let _ = tx.send(InternalMessage::Exited {
                generation,
                outcome,
            });
        });

        Self {
            generation,
            pid,
            live_since: Instant::now(),
            cancellation_token: token,
            join_handle: Some(join_handle),
        }
    }

    /// Asks the watcher to terminate the child without waiting.
    pub(crate) fn terminate(&self) {
        self.cancellation_token.cancel();
    }

    /// Terminates the child and waits until it has been reaped.
    pub(crate) async fn stop(mut self) {
        self.cancellation_token.cancel();
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for ChildHandle {
    fn drop(&mut self) {
        self.cancellation_token.cancel();
    }
}

async fn run_child(
    mut child: Box<dyn ChildProcess>,
    diagnostics: Option<Diagnostics>,
    token: CancellationToken,
    facade: StatusFacade,
    filter: Arc<LineFilter>,
) -> Result<ExitOutcome, String> {
    let mut reader = diagnostics.map(|d| tokio::spawn(forward_diagnostics(d, facade.clone(), filter)));

    let exited = tokio::select! {
        result = child.wait() => Some(result),
        _ = token.cancelled() => None,
    };
    let outcome = match exited {
        Some(result) => result,
        None => {
            tracing::debug!("terminating encoder");
            if let Err(e) = child.terminate().await {
                tracing::warn!(error = %e, "failed to signal encoder");
            }
            match tokio::time::timeout(TERMINATE_GRACE, child.wait()).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!("encoder ignored termination, killing it");
                    if let Err(e) = child.kill().await {
                        tracing::warn!(error = %e, "failed to kill encoder");
                    }
                    child.wait().await
                }
            }
        }
    };

    if let Some(reader) = reader.as_mut() {
        match tokio::time::timeout(DRAIN_TIMEOUT, &mut *reader).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) if e.is_panic() => {
                facade.record_error("diagnostic reader panicked");
            }
            Ok(Err(_)) => {}
            Err(_) => {
                tracing::debug!("diagnostic stream still open after exit");
                reader.abort();
            }
        }
    }

    outcome.map_err(|e| e.to_string())
}

/// Feeds every accepted diagnostic line into the facade. Error and warning
/// lines also become LastError.
async fn forward_diagnostics(diagnostics: Diagnostics, facade: StatusFacade, filter: Arc<LineFilter>) {
    let mut lines = FramedRead::new(diagnostics, LineSplitter::default());
    while let Some(line) = lines.next().await {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read encoder output");
                break;
            }
        };
        tracing::debug!(target: "encoder", "{line}");
        let Some(entry) = filter.accept(&line) else {
            continue;
        };
        if matches!(entry.severity, Severity::Error | Severity::Warning) {
            facade.record_error(&entry.text);
        }
        facade.append_log(entry);
    }
}
