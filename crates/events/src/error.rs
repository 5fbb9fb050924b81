use thiserror::Error;

use crate::context::CancelReason;
use crate::message::MessageKind;

/// Where a submission was when its context finished.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SubmitStage {
    /// Waiting for the dispatch loop to accept the command.
    Send,
    /// Accepted, waiting for the command handler's result.
    Receive,
}

impl core::fmt::Display for SubmitStage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            SubmitStage::Send => f.write_str("cannot send command to the message bus"),
            SubmitStage::Receive => f.write_str("cannot receive the message bus result"),
        }
    }
}

#[derive(Debug, Error)]
pub enum BusError {
    #[error("a command handler is already registered for {command_type}")]
    DuplicateCommandHandler { command_type: &'static str },

    #[error("cannot register {kind} handler for {message_type}: message bus already started")]
    AlreadyStarted {
        kind: MessageKind,
        message_type: &'static str,
    },

    #[error("message bus has already been started")]
    AlreadyRunning,

    #[error("message bus must be started inside a tokio runtime")]
    NotInRuntime,

    #[error("message bus has stopped")]
    Stopped,

    #[error("no command handler registered for {command_type}")]
    NoHandler { command_type: &'static str },

    #[error(transparent)]
    Handler(anyhow::Error),

    #[error("{stage}: {reason}")]
    Cancelled {
        stage: SubmitStage,
        reason: CancelReason,
    },

    #[error("message bus lock poisoned")]
    Poisoned,
}

impl BusError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, BusError::Cancelled { .. })
    }

    /// The command handler's own error, if that is what this is.
    pub fn handler_error(&self) -> Option<&anyhow::Error> {
        match self {
            BusError::Handler(err) => Some(err),
            _ => None,
        }
    }
}
