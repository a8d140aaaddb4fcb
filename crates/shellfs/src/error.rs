use std::path::PathBuf;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors produced while connecting to a host or running a file operation.
///
/// The `Display` output of every variant starts with the phase that failed, so
/// the message can be handed to callers verbatim.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Neither the key path nor the password produced a usable method
    #[error("no authentication method provided")]
    NoAuthMethod,

    /// TCP connect, handshake or authentication failed
    #[error("failed to dial {address}: {reason}")]
    Dial { address: String, reason: String },

    /// A new session could not be opened on an established connection
    #[error("failed to create session: {0}")]
    Session(String),

    /// The remote command failed or the transport broke while it ran
    #[error("{context}: {reason}")]
    Command {
        context: &'static str,
        reason: String,
    },

    #[error("failed to read local file {}: {source}", path.display())]
    LocalRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write local file {}: {source}", path.display())]
    LocalWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Acquiring a pooled connection failed
    #[error("failed to connect: {0}")]
    Connect(#[source] Box<Error>),
}

impl Error {
    pub(crate) fn command(context: &'static str, reason: impl Into<String>) -> Self {
        Self::Command {
            context,
            reason: reason.into(),
        }
    }

    pub(crate) fn dial(address: impl Into<String>, reason: impl ToString) -> Self {
        Self::Dial {
            address: address.into(),
            reason: reason.to_string(),
        }
    }

    /// Re-label a command failure with the context of the operation that ran it
    pub(crate) fn with_context(self, context: &'static str) -> Self {
        match self {
            Self::Command { reason, .. } => Self::Command { context, reason },
            other => other,
        }
    }
}
