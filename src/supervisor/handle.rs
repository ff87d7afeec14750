use thiserror::Error;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};

use crate::{
    error::SupervisorError,
    supervisor::SupervisorExit,
    target::TargetStatus,
    TargetName,
};

#[derive(Debug, Error)]
pub enum SupervisorHandleError {
    #[error("Failed to send message to supervisor: {0}")]
    SendError(String),
    #[error("Supervisor stopped before replying")]
    RecvError(#[from] oneshot::error::RecvError),
}

impl<T> From<mpsc::error::SendError<T>> for SupervisorHandleError {
    fn from(err: mpsc::error::SendError<T>) -> Self {
        Self::SendError(err.to_string())
    }
}

/// Messages sent from a [`SupervisorHandle`] to the running supervisor.
pub(crate) enum SupervisorMessage {
    GetTargetStatus(TargetName, oneshot::Sender<Option<TargetStatus>>),
    GetAllTargetStatuses(oneshot::Sender<Vec<TargetStatus>>),
    Shutdown,
}

/// Control surface of a running supervisor.
pub struct SupervisorHandle {
    join_handle: Option<JoinHandle<Result<SupervisorExit, SupervisorError>>>,
    tx: mpsc::UnboundedSender<SupervisorMessage>,
}

impl SupervisorHandle {
    pub(crate) fn new(
        join_handle: JoinHandle<Result<SupervisorExit, SupervisorError>>,
        tx: mpsc::UnboundedSender<SupervisorMessage>,
    ) -> Self {
        Self {
            join_handle: Some(join_handle),
            tx,
        }
    }

    /// Waits until the supervisor stops and returns why it stopped.
    ///
    /// Cancel-safe: dropping the future leaves the handle waitable.
    pub async fn wait(&mut self) -> Result<SupervisorExit, SupervisorError> {
        let Some(join_handle) = self.join_handle.as_mut() else {
            return Err(SupervisorError::Crashed(
                "supervisor was already waited on".to_string(),
            ));
        };
        let result = join_handle.await;
        self.join_handle = None;
        match result {
            Ok(outcome) => outcome,
            Err(err) => Err(SupervisorError::Crashed(err.to_string())),
        }
    }

    /// Kills every forwarding process and stops the supervisor.
    pub fn shutdown(&self) -> Result<(), SupervisorHandleError> {
        self.tx.send(SupervisorMessage::Shutdown)?;
        Ok(())
    }

    pub async fn get_target_status(
        &self,
        name: &str,
    ) -> Result<Option<TargetStatus>, SupervisorHandleError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(SupervisorMessage::GetTargetStatus(name.to_string(), tx))?;
        Ok(rx.await?)
    }

    /// Statuses of every target, in the order they were configured.
    pub async fn get_all_target_statuses(
        &self,
    ) -> Result<Vec<TargetStatus>, SupervisorHandleError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(SupervisorMessage::GetAllTargetStatuses(tx))?;
        Ok(rx.await?)
    }
}
