use std::path::PathBuf;

use clap::{Parser, Subcommand};
use eyre::{eyre, Result};
use shellfs::OperationConfig;

#[derive(Parser, Debug)]
#[command(name = "shellfs", about = "Read and write files on remote hosts over SSH")]
pub struct Args {
    /// SSH port of the remote host
    #[arg(short, long, default_value_t = shellfs::DEFAULT_SSH_PORT)]
    pub port: u16,

    /// Password for password authentication
    #[arg(long, env = "SHELLFS_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Path to an RSA private key (PEM); tried before the password
    #[arg(short, long)]
    pub key: Option<String>,

    /// Print the operation result as JSON
    #[arg(long)]
    pub json: bool,

    /// Remote destination, as user@host
    pub destination: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Print the contents of a remote file
    Read { remote: String },

    /// Replace a remote file with the given text ("-" reads stdin)
    Write { remote: String, content: String },

    /// Copy a local file to the remote host
    Upload { local: PathBuf, remote: String },

    /// Copy a remote file to a local path
    Download { remote: String, local: PathBuf },
}

impl Command {
    pub fn remote_path(&self) -> &str {
        match self {
            Self::Read { remote }
            | Self::Write { remote, .. }
            | Self::Upload { remote, .. }
            | Self::Download { remote, .. } => remote,
        }
    }
}

/// Split `user@host`, taking the last `@` so user names may contain one
pub fn parse_destination(destination: &str) -> Result<(&str, &str)> {
    match destination.rsplit_once('@') {
        Some((user, host)) if !user.is_empty() && !host.is_empty() => Ok((user, host)),
        _ => Err(eyre!(
            "invalid destination '{destination}', expected user@host"
        )),
    }
}

impl Args {
    pub fn operation_config(&self) -> Result<OperationConfig> {
        let (user, host) = parse_destination(&self.destination)?;

        Ok(OperationConfig::builder()
            .host(host)
            .user(user)
            .port(self.port)
            .password(self.password.clone().unwrap_or_default())
            .key_path(self.key.clone().unwrap_or_default())
            .remote_path(self.command.remote_path())
            .build())
    }
}
