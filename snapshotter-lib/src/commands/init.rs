use super::Host;
use super::config::{Config, DEFAULT_CONFIG_FILE};
use crate::Result;
use crate::snapshot::FieldSet;
use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use ohno::bail;
use std::io::Write;

const DEFAULT_FIELDS_FILE: &str = "fields.toml";

#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Write the default field set to this path
    #[arg(long, value_name = "PATH")]
    pub fields: Option<Utf8PathBuf>,

    /// Write the default configuration to this path
    #[arg(long, short = 'c', value_name = "PATH")]
    pub config: Option<Utf8PathBuf>,

    /// Overwrite files that already exist
    #[arg(long)]
    pub force: bool,
}

/// Write the default field set and/or configuration.
///
/// With neither path given, both files are written to the current directory under their
/// default names.
pub fn init_files<H: Host>(host: &mut H, args: &InitArgs) -> Result<()> {
    let (fields, config) = match (&args.fields, &args.config) {
        (None, None) => (Some(Utf8PathBuf::from(DEFAULT_FIELDS_FILE)), Some(Utf8PathBuf::from(DEFAULT_CONFIG_FILE))),
        (fields, config) => (fields.clone(), config.clone()),
    };

    for path in fields.iter().chain(config.iter()) {
        check_writable(path, args.force)?;
    }

    if let Some(path) = &fields {
        FieldSet::save_default(path)?;
        let _ = writeln!(host.output(), "Generated default field set: {path}");
    }

    if let Some(path) = &config {
        Config::save_default(path)?;
        let _ = writeln!(host.output(), "Generated default configuration file: {path}");
    }

    Ok(())
}

fn check_writable(path: &Utf8Path, force: bool) -> Result<()> {
    if !force && path.exists() {
        bail!("'{path}' already exists, use --force to overwrite it");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::host::TestHost;
    use std::fs;

    fn utf8_dir(tmp: &tempfile::TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).unwrap()
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    fn test_init_writes_requested_files() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = utf8_dir(&tmp);
        let args = InitArgs {
            fields: Some(dir.join("f.toml")),
            config: Some(dir.join("c.toml")),
            force: false,
        };

        let mut host = TestHost::new();
        init_files(&mut host, &args).unwrap();

        assert!(fs::read_to_string(dir.join("f.toml")).unwrap().contains("basic_endpoint"));
        assert!(fs::read_to_string(dir.join("c.toml")).unwrap().contains("[default_host]"));
        assert_eq!(host.output_str().lines().count(), 2);
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    fn test_init_only_fields() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = utf8_dir(&tmp);
        let args = InitArgs {
            fields: Some(dir.join("f.toml")),
            config: None,
            force: false,
        };

        init_files(&mut TestHost::new(), &args).unwrap();

        assert!(dir.join("f.toml").exists());
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 1);
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    fn test_init_refuses_to_overwrite() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = utf8_dir(&tmp);
        fs::write(dir.join("c.toml"), "keep me").unwrap();

        let mut args = InitArgs {
            fields: None,
            config: Some(dir.join("c.toml")),
            force: false,
        };
        let _ = init_files(&mut TestHost::new(), &args).unwrap_err();
        assert_eq!(fs::read_to_string(dir.join("c.toml")).unwrap(), "keep me");

        args.force = true;
        init_files(&mut TestHost::new(), &args).unwrap();
        assert_ne!(fs::read_to_string(dir.join("c.toml")).unwrap(), "keep me");
    }
}
