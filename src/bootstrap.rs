//! Parses the out-of-band SSH bootstrap channel's output.
//!
//! The SSH session that launches the remote server prints a line of the
//! form `MOSH CONNECT <port> <key>` on its control channel before the
//! session proper starts. This module only scans and decodes that text; it
//! never opens an SSH connection itself (see the crate's scope notes).

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;

use crate::error::BootstrapError;

/// Host-selection policy applied when a `MOSH CONNECT` line is found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpResolutionPolicy {
    /// Always use the caller-supplied default host.
    Default,
    /// Use the locally resolved host if one was supplied, else default.
    Local,
    /// Extract the server IP from a preceding `MOSH SSH_CONNECTION` line,
    /// falling back to default when no such line is present.
    Remote,
}

/// The session parameters recovered from the bootstrap channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapInfo {
    pub host: String,
    pub udp_port: u16,
    /// The 16-byte OCB3 session key.
    pub key: [u8; 16],
}

/// The four space-separated fields of a `MOSH SSH_CONNECTION` line.
struct SshConnection {
    server_ip: String,
}

fn parse_ssh_connection_line(line: &str) -> Option<SshConnection> {
    let rest = line.strip_prefix("MOSH SSH_CONNECTION")?;
    let tokens: Vec<&str> = rest.split_whitespace().collect();
    if tokens.len() != 4 {
        return None;
    }
    Some(SshConnection {
        server_ip: tokens[2].to_string(),
    })
}

/// Scan `output` for a `MOSH CONNECT <port> <key>` line (and, if the policy
/// needs it, a preceding `MOSH SSH_CONNECTION` line), resolving the session
/// host/port/key.
///
/// # Errors
///
/// Returns [`BootstrapError::NoConnectLine`] if no connect line is found,
/// [`BootstrapError::MalformedConnectLine`] if it doesn't have exactly four
/// tokens, [`BootstrapError::InvalidPort`] if the port token doesn't parse,
/// or [`BootstrapError::InvalidKey`] if the key doesn't base64-decode to
/// exactly 16 bytes.
pub fn parse(
    output: &str,
    default_host: &str,
    local_resolved_host: Option<&str>,
    policy: IpResolutionPolicy,
) -> Result<BootstrapInfo, BootstrapError> {
    let mut last_ssh_connection: Option<SshConnection> = None;
    let mut connect_line: Option<&str> = None;

    for line in output.lines() {
        let trimmed = line.trim();
        if let Some(conn) = parse_ssh_connection_line(trimmed) {
            last_ssh_connection = Some(conn);
            continue;
        }
        if trimmed.starts_with("MOSH CONNECT") {
            connect_line = Some(trimmed);
            break;
        }
    }

    let Some(connect_line) = connect_line else {
        return Err(BootstrapError::NoConnectLine);
    };

    let tokens: Vec<&str> = connect_line.split_whitespace().collect();
    if tokens.len() != 4 {
        return Err(BootstrapError::MalformedConnectLine(connect_line.to_string()));
    }

    let udp_port: u16 = tokens[2]
        .parse()
        .map_err(|_| BootstrapError::InvalidPort(tokens[2].to_string()))?;

    let key_token = tokens[3];
    let padded = pad_base64(key_token);
    let decoded = STANDARD_NO_PAD
        .decode(key_token)
        .or_else(|_| base64::engine::general_purpose::STANDARD.decode(&padded))
        .map_err(|_| BootstrapError::InvalidKey(key_token.to_string()))?;
    let key: [u8; 16] = decoded
        .try_into()
        .map_err(|_| BootstrapError::InvalidKey(key_token.to_string()))?;

    let host = match policy {
        IpResolutionPolicy::Default => default_host.to_string(),
        IpResolutionPolicy::Local => local_resolved_host
            .map(str::to_string)
            .unwrap_or_else(|| default_host.to_string()),
        IpResolutionPolicy::Remote => last_ssh_connection
            .map(|conn| conn.server_ip)
            .unwrap_or_else(|| default_host.to_string()),
    };

    Ok(BootstrapInfo {
        host,
        udp_port,
        key,
    })
}

/// Restore `=` padding to a multiple of 4 characters, per the spec's note
/// that the consumer (not the producer) is responsible for padding.
fn pad_base64(token: &str) -> String {
    let remainder = token.len() % 4;
    if remainder == 0 {
        return token.to_string();
    }
    let mut padded = token.to_string();
    for _ in 0..(4 - remainder) {
        padded.push('=');
    }
    padded
}
