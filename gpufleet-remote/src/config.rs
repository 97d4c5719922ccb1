use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// How to authenticate against remote hosts
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Private key file, optionally protected by a passphrase
    KeyFile {
        path: PathBuf,
        passphrase: Option<String>,
    },

    /// Password authentication
    Password(String),

    /// Whatever the user's environment provides (default identity files)
    Ambient,
}

impl Credentials {
    /// Pick credentials from the usual command-line options.
    ///
    /// A key file wins over a password; when both are given the password
    /// unlocks the key.
    pub fn from_options(key: Option<PathBuf>, password: Option<String>) -> Self {
        match (key, password) {
            (Some(path), passphrase) => Credentials::KeyFile { path, passphrase },
            (None, Some(password)) => Credentials::Password(password),
            (None, None) => Credentials::Ambient,
        }
    }

    /// Short label for log lines
    pub fn kind(&self) -> &'static str {
        match self {
            Credentials::KeyFile { .. } => "key file",
            Credentials::Password(_) => "password",
            Credentials::Ambient => "ambient",
        }
    }
}

// Secrets never reach log output
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::KeyFile { path, passphrase } => f
                .debug_struct("KeyFile")
                .field("path", path)
                .field("passphrase", &passphrase.as_ref().map(|_| "<redacted>"))
                .finish(),
            Credentials::Password(_) => f.debug_tuple("Password").field(&"<redacted>").finish(),
            Credentials::Ambient => f.write_str("Ambient"),
        }
    }
}

/// SSH transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshConfig {
    /// Port used when the host string does not name one
    #[serde(default = "default_port")]
    pub port: u16,

    /// Idle time after which an open session is dropped
    #[serde(default = "default_inactivity_timeout")]
    pub inactivity_timeout: Duration,

    /// Keys tried, in order, for ambient authentication
    #[serde(default = "default_identity_files")]
    pub identity_files: Vec<PathBuf>,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            inactivity_timeout: default_inactivity_timeout(),
            identity_files: default_identity_files(),
        }
    }
}

// Default value functions for serde
fn default_port() -> u16 { 22 }
fn default_inactivity_timeout() -> Duration { Duration::from_secs(60) }

/// `~/.ssh/id_ed25519`, `~/.ssh/id_rsa` and `~/.ssh/id_ecdsa`
pub fn default_identity_files() -> Vec<PathBuf> {
    dirs::home_dir()
        .map(|home| {
            ["id_ed25519", "id_rsa", "id_ecdsa"]
                .iter()
                .map(|name| home.join(".ssh").join(name))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_from_options() {
        let creds = Credentials::from_options(Some("/keys/id".into()), None);
        assert_eq!(
            creds,
            Credentials::KeyFile { path: "/keys/id".into(), passphrase: None }
        );

        let creds = Credentials::from_options(Some("/keys/id".into()), Some("pw".into()));
        assert_eq!(
            creds,
            Credentials::KeyFile { path: "/keys/id".into(), passphrase: Some("pw".into()) }
        );

        let creds = Credentials::from_options(None, Some("pw".into()));
        assert_eq!(creds, Credentials::Password("pw".into()));

        assert_eq!(Credentials::from_options(None, None), Credentials::Ambient);
    }

    #[test]
    fn test_credentials_debug_redacts() {
        let rendered = format!("{:?}", Credentials::Password("hunter2".into()));
        assert!(!rendered.contains("hunter2"));

        let rendered = format!(
            "{:?}",
            Credentials::KeyFile { path: "/k".into(), passphrase: Some("secret".into()) }
        );
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("/k"));
    }

    #[test]
    fn test_ssh_config_defaults() {
        let config = SshConfig::default();
        assert_eq!(config.port, 22);
        assert_eq!(config.inactivity_timeout, Duration::from_secs(60));
    }
}
