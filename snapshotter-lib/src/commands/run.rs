//! Command dispatch logic for snapshotter

use super::{InitArgs, SnapshotArgs, ValidateArgs, init_files, process_snapshot, validate_inputs};
use crate::{Host, Result};
use clap::builder::Styles;
use clap::builder::styling::{AnsiColor, Effects};
use clap::{Parser, Subcommand};

const CLAP_STYLES: Styles = Styles::styled()
    .header(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .usage(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .literal(AnsiColor::Cyan.on_default().effects(Effects::BOLD))
    .placeholder(AnsiColor::Cyan.on_default());

#[derive(Parser, Debug)]
#[command(name = "snapshotter", version, author, long_about = None)]
#[command(about = "Capture rate-limited snapshots of paginated REST APIs")]
#[command(styles = CLAP_STYLES)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch every listed entity and write the snapshot file
    Run(Box<SnapshotArgs>),
    /// Generate the default field set and configuration files
    Init(InitArgs),
    /// Check field set, configuration, and entity list without fetching anything
    Validate(ValidateArgs),
}

/// Dispatch command-line arguments to the appropriate handler
///
/// # Errors
///
/// Returns an error if the executed command fails
pub async fn run<I, T, H>(host: &mut H, args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
    H: Host,
{
    match &Cli::parse_from(args).command {
        Command::Run(snapshot_args) => process_snapshot(host, snapshot_args).await,
        Command::Init(init_args) => init_files(host, init_args),
        Command::Validate(validate_args) => validate_inputs(host, validate_args),
    }
}
