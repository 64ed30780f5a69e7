use super::Host;
use super::ProgressReporter;
use super::common::{ColorMode, LogLevel, init_logging};
use super::config::Config;
use crate::Result;
use crate::snapshot::{
    EntityId, FieldSet, HttpTransport, Progress, ResourceFetcher, RunResult, SnapshotScheduler, SnapshotStore, acquire_output_lock,
    load_entities,
};
use camino::{Utf8Path, Utf8PathBuf};
use core::time::Duration;
use ohno::IntoAppError;
use owo_colors::OwoColorize;
use std::io::{IsTerminal, Write};
use std::sync::Arc;

const LOG_TARGET: &str = "       run";

#[derive(clap::Args, Debug)]
pub struct SnapshotArgs {
    /// File listing the entities to snapshot (one per line, or a JSON array if named `*.json`)
    #[arg(long, value_name = "PATH")]
    pub entities: Utf8PathBuf,

    /// Field set definition (default is the built-in GitHub repository preset)
    #[arg(long, value_name = "PATH")]
    pub fields: Option<Utf8PathBuf>,

    /// Where to write the aggregate JSON snapshot
    #[arg(long, value_name = "PATH")]
    pub out: Utf8PathBuf,

    /// Maximum number of entities fetched at the same time (overrides the configuration)
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u16).range(1..))]
    pub concurrency: Option<u16>,

    /// Also write each entity to `<DIR>/<owner>-<repo>.json` as soon as it finishes
    #[arg(long, value_name = "DIR")]
    pub per_entity_dir: Option<Utf8PathBuf>,

    /// Merge entities into an existing output file instead of replacing it
    #[arg(long)]
    pub append: bool,

    /// Path to configuration file (default is `snapshotter.toml` if present)
    #[arg(long, short = 'c', value_name = "PATH")]
    pub config: Option<Utf8PathBuf>,

    /// Base URL of the API (overrides the configuration)
    #[arg(long, value_name = "URL")]
    pub api_url: Option<String>,

    /// API access token
    #[arg(long, value_name = "TOKEN", env = "GITHUB_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Set the logging level for diagnostic output
    #[arg(long, value_name = "LEVEL", default_value = "none")]
    pub log_level: LogLevel,

    /// Control when to use colored output
    #[arg(long, value_name = "WHEN", default_value = "auto")]
    pub color: ColorMode,
}

pub async fn process_snapshot<H: Host>(host: &mut H, args: &SnapshotArgs) -> Result<()> {
    init_logging(args.log_level);

    let config = Config::load(args.config.as_deref())?;
    let field_set = FieldSet::load(args.fields.as_deref())?;
    let entities = load_entities(args.entities.as_std_path())?;
    let concurrency = args.concurrency.map_or(config.concurrency, usize::from);
    let api_url = args.api_url.as_deref().unwrap_or(&config.api_url);

    let out_dir = output_dir(&args.out);
    let _lock = acquire_output_lock(out_dir.as_std_path()).await?;

    let store = Arc::new(SnapshotStore::new());
    if args.append {
        store
            .check_mergeable(args.out.as_std_path())
            .await
            .into_app_err_with(|| format!("cannot append to '{}'", args.out))?;
    }

    let transport = HttpTransport::new(
        api_url,
        args.token.as_deref(),
        Arc::new(config.rate_limiter()),
        config.retry_policy(),
        config.page_metadata(),
    )?;

    log::info!(
        target: LOG_TARGET,
        "Fetching {} entities from {api_url} (rate limited as '{}')",
        entities.len(),
        transport.host()
    );

    let delay = if args.log_level == LogLevel::None {
        Duration::from_millis(300)
    } else {
        Duration::from_hours(365 * 24)
    };
    let progress: Arc<dyn Progress> = Arc::new(ProgressReporter::new(delay, args.color.use_colors(std::io::stderr().is_terminal())));

    let mut scheduler = SnapshotScheduler::new(
        ResourceFetcher::new(transport, config.field_timeout),
        config.base_delay,
        Arc::clone(&store),
        progress,
    );
    if let Some(dir) = &args.per_entity_dir {
        scheduler = scheduler.with_per_entity_dir(dir.as_std_path());
    }
    if args.append {
        scheduler = scheduler.with_append_to(args.out.as_std_path());
    }

    let result = scheduler.run(&entities, &field_set, concurrency).await;

    // entities were already streamed into the file; this final merge makes a failed write fatal
    if args.append {
        store
            .merge(args.out.as_std_path(), &result)
            .await
            .into_app_err_with(|| format!("merging results into '{}'", args.out))?;
    } else {
        store
            .save(args.out.as_std_path(), &result)
            .await
            .into_app_err_with(|| format!("writing results to '{}'", args.out))?;
    }

    report_summary(host, &result, &args.out, args.color.use_colors(std::io::stdout().is_terminal()));
    Ok(())
}

/// Directory that holds the output file, used for the whole-run lock.
fn output_dir(out: &Utf8Path) -> Utf8PathBuf {
    match out.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent.to_path_buf(),
        _ => Utf8PathBuf::from("."),
    }
}

fn report_summary<H: Host>(host: &mut H, result: &RunResult, out: &Utf8Path, use_colors: bool) {
    let unavailable: Vec<&EntityId> = result.iter().filter(|(_, s)| s.is_unavailable()).map(|(id, _)| id).collect();
    let field_errors: usize = result
        .iter()
        .filter(|(_, s)| !s.is_unavailable())
        .map(|(_, s)| s.errors.len())
        .sum();

    let headline = format!("Captured {} entities into {out}", result.len());
    let details = format!("{} unavailable, {field_errors} field errors", unavailable.len());

    let _ = if use_colors {
        if unavailable.is_empty() && field_errors == 0 {
            writeln!(host.output(), "{} ({})", headline.green(), details)
        } else {
            writeln!(host.output(), "{} ({})", headline.green(), details.yellow())
        }
    } else {
        writeln!(host.output(), "{headline} ({details})")
    };

    for id in unavailable {
        let _ = writeln!(host.error(), "  Could not capture '{id}'");
    }
}
