use thiserror::Error;

use crate::relay::router::RouterError;
use crate::relay::storage::StoreError;
use crate::relay::telegram::SendError;

/// Errors from the relay workflow and command handlers.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Send(#[from] SendError),
    #[error("invalid chat id '{0}'")]
    InvalidChatId(String),
    #[error("forward destination is not configured")]
    NoDestination,
}

/// Error from handling one inbound event. Logged by the worker, never retried.
#[derive(Debug, Error)]
pub enum HandleError {
    #[error(transparent)]
    Command(#[from] RouterError),
    #[error(transparent)]
    Relay(#[from] RelayError),
}
