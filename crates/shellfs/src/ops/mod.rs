//! Operation entry points.
//!
//! [`RemoteFs`] acquires a pooled connection for the operation's identity,
//! runs the operation, and releases the connection again whatever the outcome.
//! The `try_*` methods return a [`Result`]; the others fold it into an
//! [`OperationResult`].

mod commands;
pub mod executor;

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;

use crate::config::OperationConfig;
use crate::error::{Error, Result};
use crate::ssh::{ConnectionPool, Connector, SshConnector};

/// Content returned by a successful read or download
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Bytes(Bytes),
}

impl Content {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Bytes(bytes) => bytes,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Bytes(_) => None,
        }
    }
}

/// The outcome of one operation. On success `error` is `None`; on failure
/// `content` is `None` and `error` holds the full message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationResult {
    pub success: bool,
    pub content: Option<Content>,
    pub error: Option<String>,
}

impl OperationResult {
    pub fn succeeded(content: Option<Content>) -> Self {
        Self {
            success: true,
            content,
            error: None,
        }
    }

    pub fn failed(error: &Error) -> Self {
        Self {
            success: false,
            content: None,
            error: Some(error.to_string()),
        }
    }

    fn from_result<T>(result: Result<T>, content: impl FnOnce(T) -> Option<Content>) -> Self {
        match result {
            Ok(value) => Self::succeeded(content(value)),
            Err(e) => {
                tracing::debug!("operation failed: {e}");
                Self::failed(&e)
            }
        }
    }
}

/// File operations against pooled connections
pub struct RemoteFs<C: Connector = SshConnector> {
    pool: Arc<ConnectionPool<C>>,
}

impl<C: Connector> Clone for RemoteFs<C> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
        }
    }
}

impl<C: Connector> RemoteFs<C> {
    pub fn new(pool: Arc<ConnectionPool<C>>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Arc<ConnectionPool<C>> {
        &self.pool
    }

    async fn with_connection<F, Fut, R>(&self, config: &OperationConfig, op: F) -> Result<R>
    where
        F: FnOnce(Arc<C::Transport>) -> Fut,
        Fut: Future<Output = Result<R>>,
    {
        let lease = self
            .pool
            .lease(&config.identity(), &config.credential())
            .await
            .map_err(|e| Error::Connect(Box::new(e)))?;

        // if this future is dropped mid-operation, the lease releases itself
        let result = op(lease.transport().clone()).await;
        lease.release().await;
        result
    }

    pub async fn try_read(&self, config: &OperationConfig) -> Result<String> {
        self.with_connection(config, |transport| async move {
            executor::read_file(transport.as_ref(), &config.remote_path).await
        })
        .await
    }

    pub async fn try_write(&self, config: &OperationConfig, content: &str) -> Result<()> {
        self.with_connection(config, |transport| async move {
            executor::write_file(transport.as_ref(), &config.remote_path, content).await
        })
        .await
    }

    pub async fn try_upload(&self, config: &OperationConfig, data: &[u8]) -> Result<()> {
        self.with_connection(config, |transport| async move {
            executor::upload_file(transport.as_ref(), &config.remote_path, data).await
        })
        .await
    }

    pub async fn try_download(&self, config: &OperationConfig) -> Result<Bytes> {
        self.with_connection(config, |transport| async move {
            executor::download_file(transport.as_ref(), &config.remote_path).await
        })
        .await
    }

    /// Read `local_path` and upload it to the configured remote path
    pub async fn try_upload_from(&self, config: &OperationConfig, local_path: &Path) -> Result<()> {
        self.with_connection(config, |transport| async move {
            let data = tokio::fs::read(local_path)
                .await
                .map_err(|source| Error::LocalRead {
                    path: local_path.to_path_buf(),
                    source,
                })?;
            executor::upload_file(transport.as_ref(), &config.remote_path, &data).await
        })
        .await
    }

    /// Download the configured remote path into `local_path`
    pub async fn try_download_to(&self, config: &OperationConfig, local_path: &Path) -> Result<()> {
        self.with_connection(config, |transport| async move {
            let data = executor::download_file(transport.as_ref(), &config.remote_path).await?;
            tokio::fs::write(local_path, &data)
                .await
                .map_err(|source| Error::LocalWrite {
                    path: local_path.to_path_buf(),
                    source,
                })
        })
        .await
    }

    pub async fn read(&self, config: &OperationConfig) -> OperationResult {
        OperationResult::from_result(self.try_read(config).await, |text| {
            Some(Content::Text(text))
        })
    }

    pub async fn write(&self, config: &OperationConfig, content: &str) -> OperationResult {
        OperationResult::from_result(self.try_write(config, content).await, |()| None)
    }

    pub async fn upload(&self, config: &OperationConfig, data: &[u8]) -> OperationResult {
        OperationResult::from_result(self.try_upload(config, data).await, |()| None)
    }

    pub async fn download(&self, config: &OperationConfig) -> OperationResult {
        OperationResult::from_result(self.try_download(config).await, |bytes| {
            Some(Content::Bytes(bytes))
        })
    }

    pub async fn upload_from(
        &self,
        config: &OperationConfig,
        local_path: impl AsRef<Path>,
    ) -> OperationResult {
        OperationResult::from_result(
            self.try_upload_from(config, local_path.as_ref()).await,
            |()| None,
        )
    }

    pub async fn download_to(
        &self,
        config: &OperationConfig,
        local_path: impl AsRef<Path>,
    ) -> OperationResult {
        OperationResult::from_result(
            self.try_download_to(config, local_path.as_ref()).await,
            |()| None,
        )
    }
}
