use async_trait::async_trait;

use super::auth::AuthMethod;
use super::pool::Identity;
use crate::error::{Error, Result};

/// What a remote command left behind once its session closed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// `None` when the server closed the session without reporting a status
    pub exit_status: Option<u32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_status == Some(0)
    }

    /// Return stdout if the command exited zero, otherwise a command error
    /// labelled with `context`
    pub fn into_stdout(self, context: &'static str) -> Result<Vec<u8>> {
        match self.exit_status {
            Some(0) => Ok(self.stdout),
            Some(status) => {
                let stderr = String::from_utf8_lossy(&self.stderr);
                let stderr = stderr.trim();
                let reason = if stderr.is_empty() {
                    format!("process exited with status {status}")
                } else {
                    format!("process exited with status {status}: {stderr}")
                };
                Err(Error::command(context, reason))
            }
            None => Err(Error::command(
                context,
                "process exited without reporting a status",
            )),
        }
    }
}

/// An established, authenticated connection able to run commands.
///
/// Every call to [`Transport::exec`] opens its own session, so a transport can
/// be shared by concurrent operations.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open a throwaway session and close it again
    async fn probe(&self) -> Result<()>;

    /// Run `command` on a fresh session, closing the session before returning.
    ///
    /// Failing to open the session is [`Error::Session`]; failures after that
    /// are [`Error::Command`].
    async fn exec(&self, command: &[u8]) -> Result<CommandOutput>;

    async fn close(&self);
}

/// Dials new transports for the pool
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Transport: Transport;

    async fn dial(
        &self,
        identity: &Identity,
        methods: Vec<AuthMethod>,
    ) -> Result<Self::Transport>;
}
