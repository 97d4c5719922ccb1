use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

use crate::error::{RemoteError, Result};

/// Output of one remote command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Standard output
    pub stdout: String,
    /// Standard error
    pub stderr: String,
    /// Exit status, when the server reported one
    pub exit_status: Option<u32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_status == Some(0)
    }
}

/// Opens sessions on remote hosts
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establish an authenticated session within `timeout`
    async fn connect(&self, host: &str, timeout: Duration) -> Result<Box<dyn RemoteSession>>;
}

/// An open session on one host
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// Run a command and collect its output within `timeout`
    async fn exec(&self, command: &str, timeout: Duration) -> Result<CommandOutput>;

    /// Release the session
    async fn close(self: Box<Self>) -> Result<()>;

    /// Host this session is connected to
    fn host(&self) -> &str;
}

/// Host name and port parsed from a user-supplied host string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostAddress {
    pub host: String,
    pub port: u16,
}

impl HostAddress {
    /// Parse `host`, `host:port`, `[v6]` or `[v6]:port`.
    ///
    /// Bare IPv6 literals (more than one colon, no brackets) keep the default port.
    pub fn parse(input: &str, default_port: u16) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(RemoteError::InvalidHost("empty host name".to_string()));
        }

        if let Some(rest) = input.strip_prefix('[') {
            let (host, tail) = rest
                .split_once(']')
                .ok_or_else(|| RemoteError::InvalidHost(format!("unclosed bracket in {}", input)))?;
            let port = match tail.strip_prefix(':') {
                Some(port) => parse_port(port, input)?,
                None if tail.is_empty() => default_port,
                None => return Err(RemoteError::InvalidHost(input.to_string())),
            };
            return Ok(Self { host: host.to_string(), port });
        }

        match input.split_once(':') {
            Some((host, port)) if !port.contains(':') => {
                if host.is_empty() {
                    return Err(RemoteError::InvalidHost(input.to_string()));
                }
                Ok(Self { host: host.to_string(), port: parse_port(port, input)? })
            }
            _ => Ok(Self { host: input.to_string(), port: default_port }),
        }
    }
}

impl fmt::Display for HostAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

fn parse_port(port: &str, input: &str) -> Result<u16> {
    port.parse::<u16>()
        .map_err(|_| RemoteError::InvalidHost(format!("invalid port in {}", input)))
}
