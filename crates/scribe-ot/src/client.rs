//! Client side of the synchronization protocol.
//!
//! At most one operation is in flight at any time. Local edits made while
//! waiting for the acknowledgement are composed into a single buffer, and
//! remote operations are transformed against whatever is still pending.

use thiserror::Error;
use tracing::debug;

use crate::operation::{OperationError, Transformable};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ClientError {
    #[error("no pending operation")]
    NoPendingOperation,
    #[error(transparent)]
    Operation(#[from] OperationError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncState<O> {
    /// Nothing pending.
    Synchronized,
    /// One operation sent, not yet acknowledged.
    AwaitingConfirm(O),
    /// One operation sent plus local edits made since.
    AwaitingWithBuffer { outstanding: O, buffer: O },
}

impl<O> Default for SyncState<O> {
    fn default() -> Self {
        SyncState::Synchronized
    }
}

/// Side effects of the state machine.
pub trait ClientHooks<O> {
    type Error: From<ClientError>;

    /// Transmits an operation to the server.
    fn send_operation(&mut self, op: &O) -> Result<(), Self::Error>;

    /// Applies a (transformed) remote operation to the local document.
    fn apply_operation(&mut self, op: &O) -> Result<(), Self::Error>;
}

#[derive(Debug, Clone, Default)]
pub struct Client<O> {
    state: SyncState<O>,
}

impl<O: Transformable> Client<O> {
    pub fn new() -> Self {
        Self {
            state: SyncState::Synchronized,
        }
    }

    pub fn state(&self) -> &SyncState<O> {
        &self.state
    }

    pub fn is_synchronized(&self) -> bool {
        matches!(self.state, SyncState::Synchronized)
    }

    /// The user made an edit.
    pub fn apply_client<H: ClientHooks<O>>(&mut self, op: O, hooks: &mut H) -> Result<(), H::Error> {
        let next = match &self.state {
            SyncState::Synchronized => {
                hooks.send_operation(&op)?;
                SyncState::AwaitingConfirm(op)
            }
            SyncState::AwaitingConfirm(outstanding) => SyncState::AwaitingWithBuffer {
                outstanding: outstanding.clone(),
                buffer: op,
            },
            SyncState::AwaitingWithBuffer { outstanding, buffer } => SyncState::AwaitingWithBuffer {
                outstanding: outstanding.clone(),
                buffer: buffer.compose(&op).map_err(ClientError::from)?,
            },
        };
        self.state = next;
        Ok(())
    }

    /// A remote operation arrived.
    pub fn apply_server<H: ClientHooks<O>>(&mut self, op: O, hooks: &mut H) -> Result<(), H::Error> {
        let (next, remote) = match &self.state {
            SyncState::Synchronized => (SyncState::Synchronized, op),
            SyncState::AwaitingConfirm(outstanding) => {
                let (outstanding, remote) = outstanding.transform(&op).map_err(ClientError::from)?;
                (SyncState::AwaitingConfirm(outstanding), remote)
            }
            SyncState::AwaitingWithBuffer { outstanding, buffer } => {
                let (outstanding, remote) = outstanding.transform(&op).map_err(ClientError::from)?;
                let (buffer, remote) = buffer.transform(&remote).map_err(ClientError::from)?;
                (SyncState::AwaitingWithBuffer { outstanding, buffer }, remote)
            }
        };
        self.state = next;
        hooks.apply_operation(&remote)
    }

    /// The server acknowledged the outstanding operation.
    pub fn server_ack<H: ClientHooks<O>>(&mut self, hooks: &mut H) -> Result<(), H::Error> {
        let next = match &self.state {
            SyncState::Synchronized => return Err(ClientError::NoPendingOperation.into()),
            SyncState::AwaitingConfirm(_) => SyncState::Synchronized,
            SyncState::AwaitingWithBuffer { buffer, .. } => {
                hooks.send_operation(buffer)?;
                SyncState::AwaitingConfirm(buffer.clone())
            }
        };
        self.state = next;
        Ok(())
    }

    /// The outstanding operation has to be sent again.
    pub fn server_retry<H: ClientHooks<O>>(&mut self, hooks: &mut H) -> Result<(), H::Error> {
        let next = match &self.state {
            SyncState::Synchronized => return Err(ClientError::NoPendingOperation.into()),
            SyncState::AwaitingConfirm(outstanding) => {
                debug!("resending outstanding operation");
                hooks.send_operation(outstanding)?;
                SyncState::AwaitingConfirm(outstanding.clone())
            }
            SyncState::AwaitingWithBuffer { outstanding, buffer } => {
                debug!("resending outstanding operation composed with buffer");
                let composed = outstanding.compose(buffer).map_err(ClientError::from)?;
                hooks.send_operation(&composed)?;
                SyncState::AwaitingConfirm(composed)
            }
        };
        self.state = next;
        Ok(())
    }
}
