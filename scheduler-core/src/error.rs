use thiserror::Error;

use crate::types::ExecutorId;

/// The five error kinds the backend distinguishes. `Protocol` and
/// `LaunchSend` are handled inline (reply/log) and never close a channel or
/// crash the Coordinator; `StopTimeout` is the only variant surfaced
/// synchronously to a caller.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("duplicate executor id: {0}")]
    DuplicateExecutor(ExecutorId),

    #[error("invalid host:port: {0}")]
    InvalidHostPort(String),

    #[error("unknown executor: {0}")]
    UnknownExecutor(ExecutorId),

    #[error("stop/removeExecutor timed out waiting for acknowledgement")]
    StopTimeout,

    #[error("coordinator mailbox closed")]
    MailboxClosed,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
