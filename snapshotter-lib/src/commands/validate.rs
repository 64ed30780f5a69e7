use super::Host;
use super::config::Config;
use crate::Result;
use crate::snapshot::{FieldSet, dedup_entities, load_entities};
use camino::Utf8PathBuf;
use clap::Parser;
use std::io::Write;

#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Field set to check (default is the built-in preset)
    #[arg(long, value_name = "PATH")]
    pub fields: Option<Utf8PathBuf>,

    /// Configuration file to check (default is `snapshotter.toml` if present)
    #[arg(long, short = 'c', value_name = "PATH")]
    pub config: Option<Utf8PathBuf>,

    /// Entity list to check
    #[arg(long, value_name = "PATH")]
    pub entities: Option<Utf8PathBuf>,
}

/// What a successful validation found.
#[derive(Debug)]
struct Summary {
    fields: usize,
    entities: Option<(usize, usize)>,
}

fn validate_inner(args: &ValidateArgs) -> Result<Summary> {
    let _ = Config::load(args.config.as_deref())?;
    let field_set = FieldSet::load(args.fields.as_deref())?;

    let entities = match &args.entities {
        Some(path) => {
            let all = load_entities(path.as_std_path())?;
            let unique = dedup_entities(&all).len();
            Some((all.len(), unique))
        }
        None => None,
    };

    Ok(Summary {
        fields: field_set.fields.len(),
        entities,
    })
}

/// Load every input the way `run` would and report problems, without touching the network.
pub fn validate_inputs<H: Host>(host: &mut H, args: &ValidateArgs) -> Result<()> {
    match validate_inner(args) {
        Ok(summary) => {
            match &args.config {
                Some(path) => {
                    let _ = writeln!(host.output(), "Configuration file is valid: {path}");
                }
                None => {
                    let _ = writeln!(host.output(), "Configuration is valid");
                }
            }

            match &args.fields {
                Some(path) => {
                    let _ = writeln!(host.output(), "Field set is valid: {path} ({} fields)", summary.fields);
                }
                None => {
                    let _ = writeln!(host.output(), "Using built-in field set ({} fields)", summary.fields);
                }
            }

            if let Some((total, unique)) = summary.entities {
                let _ = writeln!(host.output(), "Entity list is valid: {unique} entities");
                if total != unique {
                    let _ = writeln!(host.output(), "  {} duplicate entries will be ignored", total - unique);
                }
            }

            Ok(())
        }
        Err(e) => {
            let _ = writeln!(host.error(), "❌ Validation failed: {e}");
            host.exit(1);
            Err(e)
        }
    }
}
