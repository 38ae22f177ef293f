use thiserror::Error;
use tokio::{
    sync::{broadcast, mpsc, oneshot},
    task::{JoinError, JoinHandle},
};

use crate::{
    facade::{LogEntry, StatusFacade},
    status::StatusSnapshot,
    supervisor::SupervisorMessage,
};

#[derive(Debug, Error)]
pub enum SupervisorHandleError {
    #[error("supervisor is not running: {0}")]
    SendError(String),
    #[error("supervisor task failed: {0}")]
    Join(#[from] JoinError),
}

/// Controls a running [`Supervisor`](crate::Supervisor).
///
/// Dropping the handle stops the supervisor and its encoder.
#[derive(Debug)]
pub struct SupervisorHandle {
    join_handle: JoinHandle<()>,
    tx: mpsc::UnboundedSender<SupervisorMessage>,
    facade: StatusFacade,
}

impl SupervisorHandle {
    pub(crate) fn new(
        join_handle: JoinHandle<()>,
        tx: mpsc::UnboundedSender<SupervisorMessage>,
        facade: StatusFacade,
    ) -> Self {
        Self {
            join_handle,
            tx,
            facade,
        }
    }

    /// Status, uptime, LastError and recent logs. Works even after the
    /// supervisor has stopped.
    pub fn status(&self) -> StatusSnapshot {
        self.facade.snapshot()
    }

    pub fn facade(&self) -> &StatusFacade {
        &self.facade
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LogEntry> {
        self.facade.subscribe()
    }

    /// Terminates the current encoder and starts a new one without waiting
    /// for the restart delay.
    pub fn restart(&self) -> Result<(), SupervisorHandleError> {
        self.tx
            .send(SupervisorMessage::Restart)
            .map_err(|e| SupervisorHandleError::SendError(e.to_string()))
    }

    /// Cancels any pending restart, terminates the encoder and waits until
    /// it is gone.
    pub async fn stop(&self) -> Result<(), SupervisorHandleError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(SupervisorMessage::Stop(ack_tx))
            .map_err(|e| SupervisorHandleError::SendError(e.to_string()))?;
        ack_rx
            .await
            .map_err(|e| SupervisorHandleError::SendError(e.to_string()))
    }

    pub fn is_running(&self) -> bool {
        !self.join_handle.is_finished()
    }

    /// Waits for the supervisor task to finish, which only happens after
    /// `stop` or an internal fault.
    pub async fn wait(self) -> Result<(), SupervisorHandleError> {
        let Self {
            join_handle,
            tx: _tx,
            ..
        } = self;
        join_handle.await?;
        Ok(())
    }
}
