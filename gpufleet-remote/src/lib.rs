//! gpufleet remote transport
//!
//! The probing engine only needs "connect to a host, run a command, get
//! stdout/stderr back, disconnect". That capability is the [`Transport`] /
//! [`RemoteSession`] trait pair; [`SshTransport`] implements it over SSH and
//! [`MockTransport`] implements it from an in-memory script.
//!
//! # Example
//!
//! ```no_run
//! use gpufleet_remote::{Credentials, SshTransport, Transport};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let creds = Credentials::from_options(Some("/home/me/.ssh/id_ed25519".into()), None);
//!     let transport = SshTransport::new("me", creds);
//!
//!     let session = transport.connect("gpu-node01", Duration::from_secs(30)).await?;
//!     let output = session.exec("nvidia-smi -L", Duration::from_secs(10)).await?;
//!     println!("{}", output.stdout);
//!     session.close().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod mock;
pub mod ssh;
pub mod transport;

// Re-export main types
pub use config::{Credentials, SshConfig};
pub use error::{RemoteError, Result};
pub use mock::{MockHost, MockReply, MockTransport};
pub use ssh::{SshSession, SshTransport};
pub use transport::{CommandOutput, HostAddress, RemoteSession, Transport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
