//! SSH transport built on russh
//!
//! Each [`SshTransport::connect`] opens a fresh TCP connection, performs the
//! handshake and authenticates; the returned session runs one channel per
//! command.

use async_trait::async_trait;
use russh::client;
#[cfg(unix)]
use russh_keys::agent::client::AgentClient;
use russh_keys::key::{KeyPair, PublicKey};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::{Credentials, SshConfig};
use crate::error::{RemoteError, Result};
use crate::transport::{CommandOutput, HostAddress, RemoteSession, Transport};

/// russh client handler; host keys are accepted as presented
struct ClientHandler {
    host: String,
}

#[async_trait]
impl client::Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        debug!("Accepting host key presented by {}", self.host);
        Ok(true)
    }
}

/// Opens SSH sessions for one user and credential set
pub struct SshTransport {
    username: String,
    credentials: Credentials,
    config: SshConfig,
}

impl SshTransport {
    pub fn new(username: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            username: username.into(),
            credentials,
            config: SshConfig::default(),
        }
    }

    /// Replace the transport configuration
    pub fn with_config(mut self, config: SshConfig) -> Self {
        self.config = config;
        self
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    async fn establish(&self, host: &str) -> Result<SshSession> {
        let address = HostAddress::parse(host, self.config.port)?;
        debug!("Opening TCP connection to {}", address);

        let stream = TcpStream::connect((address.host.as_str(), address.port))
            .await
            .map_err(|e| RemoteError::Connection(format!("{}: {}", address, e)))?;

        let config = Arc::new(client::Config {
            inactivity_timeout: Some(self.config.inactivity_timeout),
            ..Default::default()
        });
        let handler = ClientHandler { host: host.to_string() };
        let mut handle = client::connect_stream(config, stream, handler).await?;

        self.authenticate(&mut handle).await?;
        info!("Authenticated to {} as {} ({})", host, self.username, self.credentials.kind());

        Ok(SshSession {
            handle: Mutex::new(handle),
            host: host.to_string(),
        })
    }

    async fn authenticate(&self, handle: &mut client::Handle<ClientHandler>) -> Result<()> {
        let accepted = match &self.credentials {
            Credentials::Password(password) => {
                handle
                    .authenticate_password(self.username.as_str(), password.as_str())
                    .await?
            }
            Credentials::KeyFile { path, passphrase } => {
                let key = load_private_key(path, passphrase.as_deref()).await?;
                handle
                    .authenticate_publickey(self.username.as_str(), Arc::new(key))
                    .await?
            }
            Credentials::Ambient => {
                self.authenticate_with_agent(handle).await?
                    || self.authenticate_with_identity_files(handle).await?
            }
        };

        if accepted {
            Ok(())
        } else {
            Err(RemoteError::Authentication(format!(
                "server rejected {} credentials for user '{}'",
                self.credentials.kind(),
                self.username
            )))
        }
    }

    /// Offer every identity held by the running SSH agent
    #[cfg(unix)]
    async fn authenticate_with_agent(&self, handle: &mut client::Handle<ClientHandler>) -> Result<bool> {
        let Some(mut agent) = open_agent(agent_socket().as_deref()).await else {
            return Ok(false);
        };

        let identities = match agent.request_identities().await {
            Ok(identities) => identities,
            Err(e) => {
                debug!("SSH agent did not list identities: {}", e);
                return Ok(false);
            }
        };

        for key in identities {
            let fingerprint = key.fingerprint();
            let (returned, result) = handle
                .authenticate_future(self.username.as_str(), key, agent)
                .await;
            agent = returned;

            match result {
                Ok(true) => return Ok(true),
                Ok(false) => debug!("Agent key {} rejected", fingerprint),
                Err(e) => warn!("Agent authentication with key {} failed: {}", fingerprint, e),
            }
        }

        Ok(false)
    }

    #[cfg(not(unix))]
    async fn authenticate_with_agent(&self, _handle: &mut client::Handle<ClientHandler>) -> Result<bool> {
        Ok(false)
    }

    async fn authenticate_with_identity_files(
        &self,
        handle: &mut client::Handle<ClientHandler>,
    ) -> Result<bool> {
        for key_path in self.config.identity_files.iter().filter(|p| p.exists()) {
            let key = match load_private_key(key_path, None).await {
                Ok(key) => key,
                Err(e) => {
                    debug!("Skipping identity file: {}", e);
                    continue;
                }
            };

            match handle
                .authenticate_publickey(self.username.as_str(), Arc::new(key))
                .await
            {
                Ok(true) => return Ok(true),
                Ok(false) => debug!("Key {} rejected", key_path.display()),
                Err(e) => warn!("Public key authentication with {} failed: {}", key_path.display(), e),
            }
        }

        Ok(false)
    }
}

#[async_trait]
impl Transport for SshTransport {
    async fn connect(&self, host: &str, connect_timeout: Duration) -> Result<Box<dyn RemoteSession>> {
        let session = timeout(connect_timeout, self.establish(host))
            .await
            .map_err(|_| RemoteError::Timeout(connect_timeout))??;
        Ok(Box::new(session))
    }
}

/// Authenticated SSH session
pub struct SshSession {
    handle: Mutex<client::Handle<ClientHandler>>,
    host: String,
}

impl SshSession {
    async fn run(&self, command: &str) -> Result<CommandOutput> {
        let mut channel = self
            .handle
            .lock()
            .await
            .channel_open_session()
            .await
            .map_err(|e| RemoteError::Channel(format!("open session: {}", e)))?;
        channel
            .exec(true, command)
            .await
            .map_err(|e| RemoteError::Channel(format!("exec request: {}", e)))?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut exit_status = None;

        loop {
            match channel.wait().await {
                Some(russh::ChannelMsg::Data { data }) => {
                    stdout.extend_from_slice(&data);
                }
                Some(russh::ChannelMsg::ExtendedData { data, ext }) => {
                    // ext 1 is stderr
                    if ext == 1 {
                        stderr.extend_from_slice(&data);
                    }
                }
                Some(russh::ChannelMsg::ExitStatus { exit_status: status }) => {
                    exit_status = Some(status);
                }
                Some(russh::ChannelMsg::Close) | None => break,
                _ => {}
            }
        }

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            exit_status,
        })
    }
}

#[async_trait]
impl RemoteSession for SshSession {
    async fn exec(&self, command: &str, command_timeout: Duration) -> Result<CommandOutput> {
        debug!("{}: exec `{}`", self.host, command);
        timeout(command_timeout, self.run(command))
            .await
            .map_err(|_| RemoteError::Timeout(command_timeout))?
    }

    async fn close(self: Box<Self>) -> Result<()> {
        debug!("Closing session to {}", self.host);
        self.handle
            .into_inner()
            .disconnect(russh::Disconnect::ByApplication, "", "en")
            .await?;
        Ok(())
    }

    fn host(&self) -> &str {
        &self.host
    }
}

/// Agent socket advertised through `SSH_AUTH_SOCK`
#[cfg(unix)]
fn agent_socket() -> Option<PathBuf> {
    std::env::var_os("SSH_AUTH_SOCK")
        .filter(|socket| !socket.is_empty())
        .map(PathBuf::from)
}

/// Connect to the agent listening on `socket`; a missing or dead agent yields `None`
#[cfg(unix)]
async fn open_agent(socket: Option<&Path>) -> Option<AgentClient<tokio::net::UnixStream>> {
    let socket = socket?;
    match AgentClient::connect_uds(socket).await {
        Ok(agent) => Some(agent),
        Err(e) => {
            debug!("SSH agent at {} unavailable: {}", socket.display(), e);
            None
        }
    }
}

/// Load a private key from file
async fn load_private_key(path: &Path, passphrase: Option<&str>) -> Result<KeyPair> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| RemoteError::Key {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    russh_keys::decode_secret_key(&content, passphrase).map_err(|e| RemoteError::Key {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_builder() {
        let config = SshConfig {
            port: 2222,
            ..Default::default()
        };
        let transport = SshTransport::new("admin", Credentials::Ambient).with_config(config);

        assert_eq!(transport.username(), "admin");
        assert_eq!(transport.config.port, 2222);
    }

    #[tokio::test]
    async fn test_missing_key_file() {
        let path = PathBuf::from("/nonexistent/gpufleet/id_ed25519");
        let err = load_private_key(&path, None).await.err().unwrap();

        assert!(matches!(err, RemoteError::Key { .. }));
        assert!(err.to_string().contains("/nonexistent/gpufleet/id_ed25519"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_agent_absent_falls_through() {
        assert!(open_agent(None).await.is_none());

        let stale = PathBuf::from("/nonexistent/gpufleet/agent.sock");
        assert!(open_agent(Some(&stale)).await.is_none());
    }

    #[tokio::test]
    async fn test_invalid_host_rejected_before_connecting() {
        let transport = SshTransport::new("admin", Credentials::Ambient);
        let result = transport.connect("node:notaport", Duration::from_secs(1)).await;

        assert!(matches!(result, Err(RemoteError::InvalidHost(_))));
    }
}
