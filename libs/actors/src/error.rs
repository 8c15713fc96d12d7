//! Actor Runtime Error Types
//!
//! Every failure the runtime can surface to a caller: handler failures,
//! routing failures, composer misuse, preempted flows and transport problems.
//! Failures are always local to one message; none of them stops an actor or
//! the system.

use crate::address::Address;
use thiserror::Error;

/// Main actor runtime error type
#[derive(Error, Debug)]
pub enum ActorError {
    /// Handler failed, panicked, or did not understand the message
    #[error("Handler error in {actor}: {message}")]
    Handler { actor: String, message: String },

    /// Target address names this system but no actor is registered under it
    #[error("Actor not found: {address}")]
    ActorNotFound { address: Address },

    /// Target address names a system with no live channel
    #[error("Actor system not found: {name}")]
    ActorSystemNotFound { name: String },

    /// Composer dispatched before every required field was bound
    #[error("Insufficient composer input: missing {}", .missing.join(", "))]
    InsufficientComposerInput { missing: Vec<&'static str> },

    /// Flow superseded by a newer message of the same type
    #[error("Cancelled: {message_type} was superseded")]
    Cancelled { message_type: String },

    /// Channel closed or acknowledgement lost
    #[error("Channel error: {message}")]
    Channel { message: String },

    /// Payload or envelope could not be encoded/decoded
    #[error("Codec error: {message}")]
    Codec {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Failure reported by the remote actor system
    #[error("Remote failure ({kind}): {message}")]
    Remote { kind: String, message: String },

    /// Actor stopped before the entry could be processed
    #[error("Mailbox closed for {address}")]
    MailboxClosed { address: Address },
}

/// Result type alias for actor operations
pub type Result<T> = std::result::Result<T, ActorError>;

impl ActorError {
    /// Create a handler error
    pub fn handler(actor: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Handler {
            actor: actor.into(),
            message: message.into(),
        }
    }

    pub fn actor_not_found(address: Address) -> Self {
        Self::ActorNotFound { address }
    }

    pub fn actor_system_not_found(name: impl Into<String>) -> Self {
        Self::ActorSystemNotFound { name: name.into() }
    }

    pub fn cancelled(message_type: impl Into<String>) -> Self {
        Self::Cancelled {
            message_type: message_type.into(),
        }
    }

    /// Create a channel error
    pub fn channel(message: impl Into<String>) -> Self {
        Self::Channel {
            message: message.into(),
        }
    }

    /// Create a codec error
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
            source: None,
        }
    }

    /// Create a codec error with source
    pub fn codec_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Codec {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a remote error from the kind/message pair carried on the wire
    pub fn remote(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Remote {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Stable name of the failure class, used on the wire
    pub fn kind(&self) -> &'static str {
        match self {
            ActorError::Handler { .. } => "HandlerError",
            ActorError::ActorNotFound { .. } => "ActorNotFound",
            ActorError::ActorSystemNotFound { .. } => "ActorSystemNotFound",
            ActorError::InsufficientComposerInput { .. } => "InsufficientComposerInput",
            ActorError::Cancelled { .. } => "Cancelled",
            ActorError::Channel { .. } => "ChannelError",
            ActorError::Codec { .. } => "CodecError",
            ActorError::Remote { .. } => "RemoteError",
            ActorError::MailboxClosed { .. } => "MailboxClosed",
        }
    }

    /// Get error category for metrics
    pub fn category(&self) -> &'static str {
        match self {
            ActorError::Handler { .. } => "handler",
            ActorError::ActorNotFound { .. } | ActorError::ActorSystemNotFound { .. } => "routing",
            ActorError::InsufficientComposerInput { .. } => "composer",
            ActorError::Cancelled { .. } => "flow",
            ActorError::Channel { .. } | ActorError::Remote { .. } => "transport",
            ActorError::Codec { .. } => "codec",
            ActorError::MailboxClosed { .. } => "mailbox",
        }
    }

    /// Check if this error comes from a preempted flow
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ActorError::Cancelled { .. })
    }

    /// Check if the target could not be resolved
    pub fn is_routing(&self) -> bool {
        self.category() == "routing"
    }
}

impl From<serde_json::Error> for ActorError {
    fn from(err: serde_json::Error) -> Self {
        Self::codec_with_source(err.to_string(), err)
    }
}

// Source errors are not cloneable, so clones omit them
impl Clone for ActorError {
    fn clone(&self) -> Self {
        match self {
            ActorError::Handler { actor, message } => ActorError::Handler {
                actor: actor.clone(),
                message: message.clone(),
            },
            ActorError::ActorNotFound { address } => ActorError::ActorNotFound {
                address: address.clone(),
            },
            ActorError::ActorSystemNotFound { name } => {
                ActorError::ActorSystemNotFound { name: name.clone() }
            }
            ActorError::InsufficientComposerInput { missing } => {
                ActorError::InsufficientComposerInput {
                    missing: missing.clone(),
                }
            }
            ActorError::Cancelled { message_type } => ActorError::Cancelled {
                message_type: message_type.clone(),
            },
            ActorError::Channel { message } => ActorError::Channel {
                message: message.clone(),
            },
            ActorError::Codec { message, .. } => ActorError::Codec {
                message: message.clone(),
                source: None,
            },
            ActorError::Remote { kind, message } => ActorError::Remote {
                kind: kind.clone(),
                message: message.clone(),
            },
            ActorError::MailboxClosed { address } => ActorError::MailboxClosed {
                address: address.clone(),
            },
        }
    }
}
