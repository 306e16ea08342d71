use std::path::{Path, PathBuf};

use anyhow::Result;
use colored::Colorize;

use rift_core::Config;

use super::engine;

pub fn diff(config: &Config, base: &Path, modified: &Path, output: &Path) -> Result<()> {
    let rift = engine(config)?;
    rift.create_changeset(base, modified, output)?;
    let count = rift.changes_count(output)?;
    println!("{} {} changes to {}", "Wrote".green(), count, output.display());
    Ok(())
}

pub fn apply(
    config: &Config,
    database: &Path,
    changeset: &Path,
    conflicts: Option<&Path>,
) -> Result<()> {
    let rift = engine(config)?;
    let count = match conflicts {
        Some(path) => rift.apply_changeset_with_report(database, changeset, path)?,
        None => rift.apply_changeset(database, changeset)?.len(),
    };
    print_conflicts(count);
    Ok(())
}

pub fn invert(config: &Config, changeset: &Path, output: &Path) -> Result<()> {
    engine(config)?.invert_changeset(changeset, output)?;
    println!("{} inverse to {}", "Wrote".green(), output.display());
    Ok(())
}

pub fn rebase(config: &Config, base: &Path, their: &Path, local: &Path, conflicts: &Path) -> Result<()> {
    let count = engine(config)?.rebase(base, their, local, conflicts)?;
    print_conflicts(count);
    if count > 0 {
        println!("  see {}", conflicts.display());
    }
    Ok(())
}

pub fn rebase_changeset(
    config: &Config,
    base: &Path,
    local: &Path,
    their_changeset: &Path,
    output: &Path,
    conflicts: &Path,
) -> Result<()> {
    let count =
        engine(config)?.create_rebased_changeset(base, local, their_changeset, output, conflicts)?;
    println!("{} rebased changeset to {}", "Wrote".green(), output.display());
    print_conflicts(count);
    Ok(())
}

pub fn concat(config: &Config, inputs: &[PathBuf], output: &Path) -> Result<()> {
    let rift = engine(config)?;
    rift.concat_changes(inputs, output)?;
    println!(
        "{} {} changesets into {} ({} changes)",
        "Combined".green(),
        inputs.len(),
        output.display(),
        rift.changes_count(output)?
    );
    Ok(())
}

fn print_conflicts(count: usize) {
    if count == 0 {
        println!("{}", "No conflicts".green());
    } else {
        println!("{} {}", count.to_string().yellow().bold(), "conflicts".yellow());
    }
}
