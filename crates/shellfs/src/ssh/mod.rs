//! SSH connection pooling and management
//!
//! This module provides pooled SSH connections that the file operations in
//! [`crate::ops`] run their commands over.
//!
//! Features:
//! - Connection pooling with reference counting and idle cleanup
//! - Liveness probing before a pooled connection is reused
//! - Key (RSA, PKCS#1/PKCS#8) and password authentication

mod auth;
mod pool;
mod session;
mod transport;

#[cfg(test)]
pub(crate) mod memory;


pub use auth::{compose_auth_methods, load_private_key, AuthMethod, Credential, KeyLoadError};
pub use pool::{ConnectionPool, Identity, Lease};
pub use session::{Client, SshConnector, SshTransport, DEFAULT_CONNECT_TIMEOUT};
pub use transport::{CommandOutput, Connector, Transport};
