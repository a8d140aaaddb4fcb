//! Remote file access over SSH, driven through the remote shell.
//!
//! This crate reads, writes, uploads and downloads files on remote hosts by
//! running ordinary shell commands (`cat`, `base64`, heredoc redirection) over
//! SSH sessions. It includes:
//!
//! - An authentication composer turning a key path and/or password into an
//!   ordered list of methods
//! - A reference-counted connection pool keyed by `(host, port, user)`, with
//!   liveness probing on reuse and background reclamation of idle connections
//! - A remote operation executor with a base64 primary and heredoc fallback
//!   write strategy
//! - Operation entry points producing a uniform [`OperationResult`]
//!
//! # Example
//!
//! ```ignore
//! use shellfs::{ConnectionPool, OperationConfig, PoolConfig, RemoteFs, SshConnector};
//!
//! let pool = ConnectionPool::start(SshConnector::default(), PoolConfig::default());
//! let fs = RemoteFs::new(pool.clone());
//!
//! let config = OperationConfig::builder()
//!     .host("example.com")
//!     .user("deploy")
//!     .password("hunter2")
//!     .remote_path("/etc/hostname")
//!     .build();
//!
//! let result = fs.read(&config).await;
//! pool.shutdown().await;
//! ```

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the tracing subscriber for standalone logging to the terminal.
///
/// This sets up tracing to output directly to stderr with the log level
/// controlled by the `RUST_LOG` environment variable (default `info`).
///
/// Applications that already install a subscriber, or that consume the `log`
/// facade, should not call this: `tracing` events from this crate are
/// forwarded to `log` when no subscriber is set.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

pub mod config;
pub mod error;
pub mod ops;
pub mod ssh;

pub use config::{OperationConfig, PoolConfig, DEFAULT_SSH_PORT};
pub use error::{Error, Result};
pub use ops::{Content, OperationResult, RemoteFs};
pub use ssh::{
    compose_auth_methods, AuthMethod, CommandOutput, ConnectionPool, Connector, Credential,
    Identity, Lease, SshConnector, SshTransport, Transport,
};
