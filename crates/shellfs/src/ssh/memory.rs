// In-memory stand-in for a remote host, used by the unit tests. It understands
// exactly the command shapes the executor emits: `cat PATH`, the base64 write
// pipeline, and a quoted-delimiter heredoc.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use super::auth::AuthMethod;
use super::pool::Identity;
use super::transport::{CommandOutput, Connector, Transport};
use crate::error::{Error, Result};

/// Files and installed tools of the fake remote machine
#[derive(Debug)]
pub(crate) struct RemoteHost {
    files: Mutex<HashMap<String, Vec<u8>>>,
    commands: Mutex<Vec<Vec<u8>>>,
    base64_installed: AtomicBool,
    read_only: AtomicBool,
    hang: AtomicBool,
}

impl Default for RemoteHost {
    fn default() -> Self {
        Self {
            files: Mutex::new(HashMap::new()),
            commands: Mutex::new(Vec::new()),
            base64_installed: AtomicBool::new(true),
            read_only: AtomicBool::new(false),
            hang: AtomicBool::new(false),
        }
    }
}

fn exited(status: u32, stderr: &str) -> CommandOutput {
    CommandOutput {
        stdout: Vec::new(),
        stderr: stderr.as_bytes().to_vec(),
        exit_status: Some(status),
    }
}

fn unquote(path: &str) -> &str {
    path.strip_prefix('\'')
        .and_then(|p| p.strip_suffix('\''))
        .unwrap_or(path)
}

impl RemoteHost {
    pub fn put_file(&self, path: &str, content: &[u8]) {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_string(), content.to_vec());
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(path).cloned()
    }

    pub fn set_base64_installed(&self, installed: bool) {
        self.base64_installed.store(installed, Ordering::SeqCst);
    }

    /// Make every redirect fail, as on a read-only filesystem
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    /// Make every command run forever without producing output
    pub fn set_hang(&self, hang: bool) {
        self.hang.store(hang, Ordering::SeqCst);
    }

    /// Every command run so far, lossily decoded
    pub fn commands(&self) -> Vec<String> {
        self.commands
            .lock()
            .unwrap()
            .iter()
            .map(|c| String::from_utf8_lossy(c).into_owned())
            .collect()
    }

    fn store(&self, path: &str, content: Vec<u8>) -> CommandOutput {
        if self.read_only.load(Ordering::SeqCst) {
            return exited(1, &format!("sh: {path}: Read-only file system"));
        }
        self.files.lock().unwrap().insert(path.to_string(), content);
        exited(0, "")
    }

    fn run(&self, command: &[u8]) -> CommandOutput {
        self.commands.lock().unwrap().push(command.to_vec());

        if let Some(rest) = command.strip_prefix(b"cat > ") {
            return self.run_heredoc(rest);
        }

        let text = String::from_utf8_lossy(command);

        if let Some(rest) = text.strip_prefix("echo '") {
            let Some((encoded, target)) = rest.split_once("' | base64 -d > ") else {
                return exited(2, "sh: syntax error");
            };
            if !self.base64_installed.load(Ordering::SeqCst) {
                return exited(127, "sh: base64: command not found");
            }
            let Ok(content) = STANDARD.decode(encoded) else {
                return exited(1, "base64: invalid input");
            };
            return self.store(unquote(target), content);
        }

        if let Some(path) = text.strip_prefix("cat ") {
            let path = unquote(path);
            return match self.file(path) {
                Some(content) => CommandOutput {
                    stdout: content,
                    stderr: Vec::new(),
                    exit_status: Some(0),
                },
                None => exited(1, &format!("cat: {path}: No such file or directory")),
            };
        }

        exited(127, "sh: command not found")
    }

    // `PATH << 'DELIM'\nBODY\nDELIM`: the body is copied verbatim up to the
    // first line equal to the delimiter, each line newline-terminated
    fn run_heredoc(&self, rest: &[u8]) -> CommandOutput {
        let Some(newline) = rest.iter().position(|&b| b == b'\n') else {
            return exited(2, "sh: syntax error");
        };
        let header = String::from_utf8_lossy(&rest[..newline]);
        let Some((target, delimiter)) = header.split_once(" << ") else {
            return exited(2, "sh: syntax error");
        };
        let delimiter = unquote(delimiter).as_bytes();

        let mut content = Vec::new();
        for line in rest[newline + 1..].split(|&b| b == b'\n') {
            if line == delimiter {
                return self.store(unquote(target), content);
            }
            content.extend_from_slice(line);
            content.push(b'\n');
        }

        exited(2, "sh: here-document delimited by end-of-file")
    }
}

#[derive(Debug)]
pub(crate) struct MemoryTransport {
    host: Arc<RemoteHost>,
    alive: AtomicBool,
    closed: AtomicBool,
}

impl MemoryTransport {
    /// Break the connection without telling the pool
    pub fn kill(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn probe(&self) -> Result<()> {
        if self.alive.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::Session("connection reset by peer".to_string()))
        }
    }

    async fn exec(&self, command: &[u8]) -> Result<CommandOutput> {
        self.probe().await?;
        if self.host.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        Ok(self.host.run(command))
    }

    async fn close(&self) {
        self.alive.store(false, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
    }
}

pub(crate) struct MemoryConnector {
    host: Arc<RemoteHost>,
    dials: AtomicUsize,
    refuse: AtomicBool,
    last_methods: Mutex<Vec<&'static str>>,
}

impl MemoryConnector {
    pub fn new(host: Arc<RemoteHost>) -> Self {
        Self {
            host,
            dials: AtomicUsize::new(0),
            refuse: AtomicBool::new(false),
            last_methods: Mutex::new(Vec::new()),
        }
    }

    pub fn dials(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }

    pub fn refuse_connections(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Names of the auth methods handed to the most recent dial
    pub fn last_methods(&self) -> Vec<&'static str> {
        self.last_methods.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    type Transport = MemoryTransport;

    async fn dial(&self, identity: &Identity, methods: Vec<AuthMethod>) -> Result<MemoryTransport> {
        *self.last_methods.lock().unwrap() = methods.iter().map(AuthMethod::name).collect();

        if self.refuse.load(Ordering::SeqCst) {
            return Err(Error::dial(identity.address(), "connection refused"));
        }

        self.dials.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryTransport {
            host: self.host.clone(),
            alive: AtomicBool::new(true),
            closed: AtomicBool::new(false),
        })
    }
}
