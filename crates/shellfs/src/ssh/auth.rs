// Build the list of authentication methods handed to the transport.
// Only RSA keys are accepted, in PKCS#1 or PKCS#8 PEM form.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use russh::keys::PrivateKey;

use crate::error::{Error, Result};

/// The secret material supplied with an operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credential {
    pub key_path: Option<PathBuf>,
    pub password: String,
}

/// A single way of authenticating, tried by the transport in list order
#[derive(Clone)]
pub enum AuthMethod {
    PublicKey(Arc<PrivateKey>),
    Password(String),
}

impl AuthMethod {
    /// The SSH method name, as the server would report it
    pub fn name(&self) -> &'static str {
        match self {
            Self::PublicKey(_) => "publickey",
            Self::Password(_) => "password",
        }
    }
}

impl fmt::Debug for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PublicKey(key) => f
                .debug_tuple("PublicKey")
                .field(&key.algorithm().as_str())
                .finish(),
            Self::Password(_) => f.debug_tuple("Password").field(&"<redacted>").finish(),
        }
    }
}

/// Reasons a private key file could not be turned into a signing key
#[derive(thiserror::Error, Debug)]
pub enum KeyLoadError {
    #[error("failed to read key file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to decode PEM block")]
    Pem,
    #[error("failed to parse private key: {0}")]
    Parse(String),
    #[error("not an RSA private key")]
    NotRsa,
}

struct PemBlock {
    label: String,
    der: Vec<u8>,
}

/// Decode the first PEM block in `data`
fn decode_pem_block(data: &[u8]) -> Option<PemBlock> {
    let text = std::str::from_utf8(data).ok()?;
    let mut lines = text.lines().map(str::trim);

    let label = lines
        .by_ref()
        .find_map(|l| l.strip_prefix("-----BEGIN ")?.strip_suffix("-----"))?
        .to_string();
    let end = format!("-----END {label}-----");

    let mut body = String::new();
    let mut terminated = false;
    for line in lines {
        if line == end {
            terminated = true;
            break;
        }
        // RFC 1421 headers (Proc-Type, DEK-Info) precede the body
        if line.contains(':') || line.is_empty() {
            continue;
        }
        body.push_str(line);
    }

    if !terminated {
        return None;
    }

    let der = STANDARD.decode(body).ok()?;
    Some(PemBlock { label, der })
}

fn armor(label: &str, der: &[u8]) -> String {
    let encoded = STANDARD.encode(der);
    let mut out = format!("-----BEGIN {label}-----\n");
    for chunk in encoded.as_bytes().chunks(64) {
        // base64 output is always ASCII
        out.push_str(std::str::from_utf8(chunk).unwrap_or_default());
        out.push('\n');
    }
    out.push_str(&format!("-----END {label}-----\n"));
    out
}

/// Load an RSA private key from a PEM file.
///
/// The DER body is tried as PKCS#1 first, then as PKCS#8; a PKCS#8 key of any
/// other algorithm is rejected.
pub async fn load_private_key(path: &Path) -> Result<PrivateKey, KeyLoadError> {
    let data = tokio::fs::read(path).await?;
    let block = decode_pem_block(&data).ok_or(KeyLoadError::Pem)?;
    tracing::trace!("decoded PEM block '{}' from {}", block.label, path.display());

    if let Ok(key) = russh::keys::decode_secret_key(&armor("RSA PRIVATE KEY", &block.der), None) {
        return Ok(key);
    }

    let key = russh::keys::decode_secret_key(&armor("PRIVATE KEY", &block.der), None)
        .map_err(|e| KeyLoadError::Parse(e.to_string()))?;

    if !key.algorithm().is_rsa() {
        return Err(KeyLoadError::NotRsa);
    }

    Ok(key)
}

/// Turn a credential into an ordered, non-empty list of authentication methods.
///
/// A usable key comes first, then the password. A key that fails to load is
/// logged and skipped rather than failing the whole composition.
pub async fn compose_auth_methods(credential: &Credential) -> Result<Vec<AuthMethod>> {
    let mut methods = Vec::new();

    if let Some(key_path) = &credential.key_path {
        match load_private_key(key_path).await {
            Ok(key) => methods.push(AuthMethod::PublicKey(Arc::new(key))),
            Err(e) => {
                tracing::warn!("Ignoring private key {}: {e}", key_path.display());
            }
        }
    }

    if !credential.password.is_empty() {
        methods.push(AuthMethod::Password(credential.password.clone()));
    }

    if methods.is_empty() {
        return Err(Error::NoAuthMethod);
    }

    Ok(methods)
}
