use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::ssh::{Credential, Identity};

pub const DEFAULT_SSH_PORT: u16 = 22;

/// Parameters for a single remote file operation.
///
/// `remote_path` is interpolated into shell commands as-is. It is NOT escaped
/// against shell metacharacters, so it must come from a trusted source.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct OperationConfig {
    #[builder(setter(into))]
    pub host: String,

    #[builder(setter(into))]
    pub user: String,

    #[serde(default)]
    #[builder(default, setter(into))]
    pub password: String,

    #[serde(default)]
    #[builder(default, setter(into))]
    pub key_path: String,

    /// 0 means "use the default port"
    #[serde(default)]
    #[builder(default)]
    pub port: u16,

    #[builder(setter(into))]
    pub remote_path: String,
}

impl OperationConfig {
    /// The port to dial, mapping an unset (zero) port to 22
    pub fn port(&self) -> u16 {
        if self.port == 0 {
            DEFAULT_SSH_PORT
        } else {
            self.port
        }
    }

    pub fn identity(&self) -> Identity {
        Identity::new(&self.host, self.port(), &self.user)
    }

    pub fn credential(&self) -> Credential {
        let key_path = if self.key_path.is_empty() {
            None
        } else {
            Some(PathBuf::from(
                shellexpand::tilde(&self.key_path).into_owned(),
            ))
        };

        Credential {
            key_path,
            password: self.password.clone(),
        }
    }
}

/// Idle reclamation settings for the connection pool
#[derive(Debug, Clone, PartialEq, Eq, TypedBuilder)]
pub struct PoolConfig {
    /// Unreferenced connections idle for longer than this are closed
    #[builder(default = Duration::from_secs(10 * 60))]
    pub max_idle_time: Duration,

    /// How often the background sweep looks for idle connections
    #[builder(default = Duration::from_secs(5 * 60))]
    pub cleanup_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig::builder().build()
    }
}
