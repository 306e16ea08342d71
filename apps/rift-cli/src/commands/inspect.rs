use std::path::Path;

use anyhow::Result;

use rift_core::Config;
use rift_formats::{codec, inspect, report};

use super::engine;

pub fn list(config: &Config, changeset: &Path, output: Option<&Path>) -> Result<()> {
    match output {
        Some(json) => engine(config)?.list_changes(changeset, json)?,
        None => {
            let changes = codec::read_file(changeset)?;
            report::write_json(std::io::stdout().lock(), &inspect::list_changes(&changes))?;
        }
    }
    Ok(())
}

pub fn summary(config: &Config, changeset: &Path, output: Option<&Path>) -> Result<()> {
    match output {
        Some(json) => engine(config)?.list_changes_summary(changeset, json)?,
        None => {
            let changes = codec::read_file(changeset)?;
            report::write_json(
                std::io::stdout().lock(),
                &inspect::list_changes_summary(&changes),
            )?;
        }
    }
    Ok(())
}

pub fn count(config: &Config, changeset: &Path) -> Result<()> {
    println!("{}", engine(config)?.changes_count(changeset)?);
    Ok(())
}

pub fn has_changes(config: &Config, changeset: &Path) -> Result<()> {
    println!("{}", engine(config)?.has_changes(changeset)?);
    Ok(())
}
