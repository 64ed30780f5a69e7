//! Command-line interface and orchestration for snapshotter
//!
//! The `run` function parses command-line arguments with clap and routes them to one of
//! three commands:
//!
//! - **run**: load configuration, field set, and entity list, take the output lock, then
//!   drive a [`SnapshotScheduler`](crate::snapshot::SnapshotScheduler) over an
//!   [`HttpTransport`](crate::snapshot::HttpTransport) and persist the result
//! - **init**: write the default field set and configuration files
//! - **validate**: load and check every input without network traffic
//!
//! Shared concerns live in `common` (logging, color mode), `config` (the TOML
//! configuration), and `progress_reporter` (the terminal progress bar).

mod common;
mod config;
mod host;
mod init;
mod progress_reporter;
mod run;
mod snapshot;
mod validate;

#[cfg(debug_assertions)]
pub use config::Config;

pub use host::Host;
pub use init::{InitArgs, init_files};
pub use progress_reporter::ProgressReporter;
pub use run::run;
pub use snapshot::{SnapshotArgs, process_snapshot};
pub use validate::{ValidateArgs, validate_inputs};
