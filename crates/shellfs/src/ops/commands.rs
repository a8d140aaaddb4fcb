// Shell command construction. These strings are the wire contract with the
// remote host and must not change shape.
//
// Remote paths are interpolated without escaping.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

pub const WRITE_DELIMITER_PREFIX: &str = "PNANA_EOF_";
pub const UPLOAD_DELIMITER_PREFIX: &str = "PNANA_UPLOAD_EOF_";

/// Heredoc terminator for this process
pub fn heredoc_delimiter(prefix: &str) -> String {
    format!("{prefix}{}", std::process::id())
}

/// Backslash-escape `\`, `$`, `` ` `` and `"`
pub fn escape_heredoc_content(content: &[u8]) -> Vec<u8> {
    let mut escaped = Vec::with_capacity(content.len());
    for &byte in content {
        if matches!(byte, b'\\' | b'$' | b'`' | b'"') {
            escaped.push(b'\\');
        }
        escaped.push(byte);
    }
    escaped
}

pub fn cat_command(target: &str) -> String {
    format!("cat {target}")
}

/// `echo '<base64>' | base64 -d > <target>`
pub fn base64_write_command(target: &str, content: &[u8]) -> String {
    format!("echo '{}' | base64 -d > {target}", STANDARD.encode(content))
}

/// `cat > <target> << '<delimiter>'`, the escaped content, then the delimiter
pub fn heredoc_write_command(target: &str, content: &[u8], delimiter: &str) -> Vec<u8> {
    let escaped = escape_heredoc_content(content);

    let mut command = format!("cat > {target} << '{delimiter}'\n").into_bytes();
    command.reserve(escaped.len() + delimiter.len() + 1);
    command.extend_from_slice(&escaped);
    command.push(b'\n');
    command.extend_from_slice(delimiter.as_bytes());
    command
}

/// Wrap a path in single quotes, as the upload and download commands do
pub fn single_quoted(path: &str) -> String {
    format!("'{path}'")
}
