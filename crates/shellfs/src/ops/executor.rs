//! The four remote file operations, run over an already-acquired transport.
//!
//! Each command gets its own session. Writes try a base64 pipeline first and,
//! if that command fails, fall back exactly once to a heredoc.

use bytes::Bytes;

use super::commands::{
    base64_write_command, cat_command, heredoc_delimiter, heredoc_write_command, single_quoted,
    UPLOAD_DELIMITER_PREFIX, WRITE_DELIMITER_PREFIX,
};
use crate::error::{Error, Result};
use crate::ssh::Transport;

const READ_CONTEXT: &str = "failed to read file";
const WRITE_CONTEXT: &str = "failed to write file";
const UPLOAD_CONTEXT: &str = "failed to upload file";
const DOWNLOAD_CONTEXT: &str = "failed to read remote file";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransferKind {
    Write,
    Upload,
}

impl TransferKind {
    fn target(self, remote_path: &str) -> String {
        match self {
            Self::Write => remote_path.to_string(),
            Self::Upload => single_quoted(remote_path),
        }
    }

    fn delimiter_prefix(self) -> &'static str {
        match self {
            Self::Write => WRITE_DELIMITER_PREFIX,
            Self::Upload => UPLOAD_DELIMITER_PREFIX,
        }
    }

    fn context(self) -> &'static str {
        match self {
            Self::Write => WRITE_CONTEXT,
            Self::Upload => UPLOAD_CONTEXT,
        }
    }
}

async fn run<T: Transport + ?Sized>(
    transport: &T,
    command: &[u8],
    context: &'static str,
) -> Result<Vec<u8>> {
    transport
        .exec(command)
        .await
        .map_err(|e| e.with_context(context))?
        .into_stdout(context)
}

/// `cat <remote_path>`, returning stdout as text (invalid UTF-8 is replaced)
pub async fn read_file<T: Transport + ?Sized>(transport: &T, remote_path: &str) -> Result<String> {
    let stdout = run(transport, cat_command(remote_path).as_bytes(), READ_CONTEXT).await?;
    Ok(String::from_utf8_lossy(&stdout).into_owned())
}

/// `cat '<remote_path>'`, returning stdout unchanged
pub async fn download_file<T: Transport + ?Sized>(
    transport: &T,
    remote_path: &str,
) -> Result<Bytes> {
    let target = single_quoted(remote_path);
    let stdout = run(transport, cat_command(&target).as_bytes(), DOWNLOAD_CONTEXT).await?;
    Ok(Bytes::from(stdout))
}

pub async fn write_file<T: Transport + ?Sized>(
    transport: &T,
    remote_path: &str,
    content: &str,
) -> Result<()> {
    transfer(transport, TransferKind::Write, remote_path, content.as_bytes()).await
}

pub async fn upload_file<T: Transport + ?Sized>(
    transport: &T,
    remote_path: &str,
    data: &[u8],
) -> Result<()> {
    transfer(transport, TransferKind::Upload, remote_path, data).await
}

async fn transfer<T: Transport + ?Sized>(
    transport: &T,
    kind: TransferKind,
    remote_path: &str,
    content: &[u8],
) -> Result<()> {
    let target = kind.target(remote_path);

    let primary = base64_write_command(&target, content);
    match run(transport, primary.as_bytes(), kind.context()).await {
        Ok(_) => return Ok(()),
        // no session means no command ran, so there is nothing to fall back from
        Err(e @ Error::Session(_)) => return Err(e),
        Err(e) => {
            tracing::debug!("base64 write to {remote_path} failed ({e}), retrying with heredoc");
        }
    }

    let delimiter = heredoc_delimiter(kind.delimiter_prefix());
    let fallback = heredoc_write_command(&target, content, &delimiter);
    run(transport, &fallback, kind.context()).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ssh::memory::{MemoryConnector, MemoryTransport, RemoteHost};
    use crate::ssh::{Connector, Identity};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    async fn transport() -> (MemoryTransport, Arc<RemoteHost>) {
        let host = Arc::new(RemoteHost::default());
        let transport = MemoryConnector::new(host.clone())
            .dial(&Identity::new("h", 22, "u"), Vec::new())
            .await
            .unwrap();
        (transport, host)
    }

    const TRICKY: &str = "it's a `test` with \\backslashes\\ and $VARS\n\
                          \"double quotes\"\n\
                          PNANA_EOF_12345\n\
                          EOF\n\
                          no trailing newline";

    #[tokio::test]
    async fn test_read_file() {
        let (transport, host) = transport().await;
        host.put_file("/etc/motd", b"welcome\n");

        let content = read_file(&transport, "/etc/motd").await.unwrap();

        assert_eq!(content, "welcome\n");
        assert_eq!(host.commands(), vec!["cat /etc/motd"]);
    }

    #[tokio::test]
    async fn test_read_missing_file() {
        let (transport, _host) = transport().await;

        let err = read_file(&transport, "/nope").await.unwrap_err();

        assert!(matches!(err, Error::Command { .. }));
        assert_eq!(
            err.to_string(),
            "failed to read file: process exited with status 1: cat: /nope: No such file or directory"
        );
    }

    #[tokio::test]
    async fn test_read_on_dead_connection_is_session_error() {
        let (transport, _host) = transport().await;
        transport.kill();

        let err = read_file(&transport, "/etc/motd").await.unwrap_err();

        assert!(matches!(err, Error::Session(_)));
    }

    #[tokio::test]
    async fn test_write_then_read_round_trip() {
        let (transport, host) = transport().await;

        write_file(&transport, "/tmp/tricky", TRICKY).await.unwrap();

        assert_eq!(read_file(&transport, "/tmp/tricky").await.unwrap(), TRICKY);
        let commands = host.commands();
        assert_eq!(commands.len(), 2);
        assert!(commands[0].starts_with("echo '"));
        assert!(commands[0].ends_with("' | base64 -d > /tmp/tricky"));
    }

    #[tokio::test]
    async fn test_write_empty_content() {
        let (transport, host) = transport().await;

        write_file(&transport, "/tmp/empty", "").await.unwrap();

        assert_eq!(host.file("/tmp/empty"), Some(Vec::new()));
    }

    #[tokio::test]
    async fn test_write_falls_back_to_heredoc_once() {
        let (transport, host) = transport().await;
        host.set_base64_installed(false);

        write_file(&transport, "/tmp/notes", "first line\nsecond line")
            .await
            .unwrap();

        let commands = host.commands();
        assert_eq!(commands.len(), 2);
        assert!(commands[0].contains("| base64 -d > /tmp/notes"));
        assert_eq!(
            commands[1],
            format!(
                "cat > /tmp/notes << 'PNANA_EOF_{pid}'\nfirst line\nsecond line\nPNANA_EOF_{pid}",
                pid = std::process::id()
            )
        );
        // the heredoc terminates the body with a newline
        assert_eq!(
            host.file("/tmp/notes").unwrap(),
            b"first line\nsecond line\n"
        );
    }

    #[tokio::test]
    async fn test_heredoc_fallback_stores_escaped_content() {
        let (transport, host) = transport().await;
        host.set_base64_installed(false);

        write_file(&transport, "/tmp/shell", r"it's `x` \ $HOME")
            .await
            .unwrap();

        // the quoted delimiter keeps the escapes literal
        assert_eq!(
            read_file(&transport, "/tmp/shell").await.unwrap(),
            "it's \\`x\\` \\\\ \\$HOME\n"
        );
    }

    #[tokio::test]
    async fn test_write_fails_when_fallback_fails() {
        let (transport, host) = transport().await;
        host.set_base64_installed(false);
        host.set_read_only(true);

        let err = write_file(&transport, "/tmp/notes", "data").await.unwrap_err();

        assert_eq!(host.commands().len(), 2);
        assert!(err.to_string().starts_with("failed to write file: "));
        assert!(err.to_string().contains("Read-only file system"));
    }

    #[tokio::test]
    async fn test_write_without_session_does_not_fall_back() {
        let (transport, host) = transport().await;
        transport.kill();

        let err = write_file(&transport, "/tmp/notes", "data").await.unwrap_err();

        assert!(matches!(err, Error::Session(_)));
        assert!(host.commands().is_empty());
    }

    #[tokio::test]
    async fn test_upload_quotes_path_and_round_trips_binary() {
        let (transport, host) = transport().await;
        let data: Vec<u8> = (0..=255u8).collect();

        upload_file(&transport, "/srv/blob.bin", &data).await.unwrap();
        let downloaded = download_file(&transport, "/srv/blob.bin").await.unwrap();

        assert_eq!(downloaded.as_ref(), data.as_slice());
        let commands = host.commands();
        assert!(commands[0].ends_with("| base64 -d > '/srv/blob.bin'"));
        assert_eq!(commands[1], "cat '/srv/blob.bin'");
    }

    #[tokio::test]
    async fn test_upload_fallback_uses_upload_delimiter() {
        let (transport, host) = transport().await;
        host.set_base64_installed(false);

        upload_file(&transport, "/srv/app.conf", b"port = 8080")
            .await
            .unwrap();

        let commands = host.commands();
        assert_eq!(commands.len(), 2);
        assert!(commands[1].starts_with(&format!(
            "cat > '/srv/app.conf' << 'PNANA_UPLOAD_EOF_{}'\n",
            std::process::id()
        )));
        assert_eq!(host.file("/srv/app.conf").unwrap(), b"port = 8080\n");
    }

    #[tokio::test]
    async fn test_upload_failure_context() {
        let (transport, host) = transport().await;
        host.set_read_only(true);

        let err = upload_file(&transport, "/srv/app.conf", b"x").await.unwrap_err();

        assert!(err.to_string().starts_with("failed to upload file: "));
    }

    #[tokio::test]
    async fn test_download_missing_file_context() {
        let (transport, _host) = transport().await;

        let err = download_file(&transport, "/missing").await.unwrap_err();

        assert!(err.to_string().starts_with("failed to read remote file: "));
    }
}
