pub mod args;
pub mod config;
pub mod monitor;
pub mod nodes;
pub mod output;

// Re-export commonly used types
pub use args::{Cli, FormatArg};
pub use config::{FileConfig, Settings, UsageError};
pub use nodes::load_nodes_file;
