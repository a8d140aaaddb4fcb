// The russh plumbing behind the Transport/Connector seam. Dial, authenticate,
// run one command per channel. Pooling lives in pool.rs.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{AuthResult, Handle, Msg};
use russh::keys::PrivateKeyWithHashAlg;
use russh::{Channel, ChannelMsg, Disconnect};
use tokio::time::timeout;

use super::auth::AuthMethod;
use super::pool::Identity;
use super::transport::{CommandOutput, Connector, Transport};
use crate::error::{Error, Result};

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// SSH client handler for russh
pub struct Client;

impl russh::client::Handler for Client {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &russh::keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        // Every host key is accepted. There is no known_hosts verification, so
        // the connection is not protected against an active man in the middle.
        Ok(true)
    }
}

/// Dials SSH connections with a fixed connect timeout
#[derive(Clone)]
pub struct SshConnector {
    config: Arc<russh::client::Config>,
    connect_timeout: Duration,
}

impl Default for SshConnector {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT)
    }
}

impl SshConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            config: Arc::new(russh::client::Config::default()),
            connect_timeout,
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }
}

#[async_trait]
impl Connector for SshConnector {
    type Transport = SshTransport;

    async fn dial(&self, identity: &Identity, methods: Vec<AuthMethod>) -> Result<SshTransport> {
        let address = identity.address();
        tracing::debug!("Connecting directly to: {address}");

        let connect = russh::client::connect(
            self.config.clone(),
            (identity.host(), identity.port()),
            Client,
        );
        let mut handle = timeout(self.connect_timeout, connect)
            .await
            .map_err(|_| {
                Error::dial(
                    &address,
                    format!("timed out after {}s", self.connect_timeout.as_secs()),
                )
            })?
            .map_err(|e| Error::dial(&address, e))?;

        authenticate(&mut handle, identity.user(), &methods)
            .await
            .map_err(|reason| Error::dial(&address, reason))?;

        tracing::info!("Authenticated as {}@{address}", identity.user());
        Ok(SshTransport { handle, address })
    }
}

/// Try each method in order until the server accepts one
async fn authenticate(
    handle: &mut Handle<Client>,
    user: &str,
    methods: &[AuthMethod],
) -> std::result::Result<(), String> {
    for method in methods {
        let result = match method {
            AuthMethod::PublicKey(key) => {
                // Query the server for the best RSA hash algorithm it supports
                let best_hash = handle
                    .best_supported_rsa_hash()
                    .await
                    .map_err(|e| e.to_string())?
                    .flatten();
                handle
                    .authenticate_publickey(user, PrivateKeyWithHashAlg::new(key.clone(), best_hash))
                    .await
            }
            AuthMethod::Password(password) => handle.authenticate_password(user, password).await,
        };

        match result {
            Ok(AuthResult::Success) => {
                tracing::debug!("{} authentication accepted for {user}", method.name());
                return Ok(());
            }
            Ok(AuthResult::Failure {
                remaining_methods,
                partial_success,
            }) => {
                tracing::debug!(
                    "Server rejected {} authentication (remaining methods: {:?}, partial: {})",
                    method.name(),
                    remaining_methods,
                    partial_success
                );
            }
            Err(e) => return Err(e.to_string()),
        }
    }

    let attempted: Vec<&str> = methods.iter().map(AuthMethod::name).collect();
    Err(format!(
        "unable to authenticate as {user}, attempted methods {attempted:?}"
    ))
}

/// An authenticated russh connection
pub struct SshTransport {
    handle: Handle<Client>,
    address: String,
}

impl SshTransport {
    pub fn address(&self) -> &str {
        &self.address
    }
}

async fn run_command(channel: &mut Channel<Msg>, command: &[u8]) -> Result<CommandOutput> {
    channel
        .exec(true, command.to_vec())
        .await
        .map_err(|e| Error::command("remote command", e.to_string()))?;

    let mut output = CommandOutput::default();
    let mut got_eof = false;

    loop {
        let Some(msg) = channel.wait().await else {
            break;
        };

        match msg {
            ChannelMsg::Data { data } => output.stdout.extend_from_slice(&data),
            ChannelMsg::ExtendedData { data, ext: 1 } => output.stderr.extend_from_slice(&data),
            ChannelMsg::ExitStatus { exit_status } => {
                output.exit_status = Some(exit_status);
                if got_eof {
                    break;
                }
            }
            ChannelMsg::Eof => {
                got_eof = true;
                if output.exit_status.is_some() {
                    break;
                }
            }
            ChannelMsg::Close => break,
            _ => {}
        }
    }

    Ok(output)
}

#[async_trait]
impl Transport for SshTransport {
    async fn probe(&self) -> Result<()> {
        if self.handle.is_closed() {
            return Err(Error::Session("connection closed".to_string()));
        }

        let check = async {
            let channel = self
                .handle
                .channel_open_session()
                .await
                .map_err(|e| Error::Session(e.to_string()))?;
            let _ = channel.close().await;
            Ok(())
        };

        match timeout(PROBE_TIMEOUT, check).await {
            Ok(result) => result,
            Err(_) => Err(Error::Session(format!(
                "probe of {} timed out",
                self.address
            ))),
        }
    }

    async fn exec(&self, command: &[u8]) -> Result<CommandOutput> {
        let mut channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| Error::Session(e.to_string()))?;

        let result = run_command(&mut channel, command).await;
        let _ = channel.close().await;
        result
    }

    async fn close(&self) {
        if let Err(e) = self
            .handle
            .disconnect(Disconnect::ByApplication, "", "")
            .await
        {
            tracing::debug!("Error disconnecting from {}: {e}", self.address);
        }
    }
}
