use std::path::Path;

use anyhow::Result;
use colored::Colorize;

use rift_core::Config;
use rift_formats::report;

use super::engine;

pub fn dump(config: &Config, database: &Path, output: &Path) -> Result<()> {
    let rift = engine(config)?;
    rift.dump_data(database, output)?;
    println!(
        "{} {} rows to {}",
        "Dumped".green(),
        rift.changes_count(output)?,
        output.display()
    );
    Ok(())
}

pub fn schema(config: &Config, database: &Path, output: Option<&Path>) -> Result<()> {
    let rift = engine(config)?;
    match output {
        Some(json) => rift.schema(database, json)?,
        None => {
            let tables = rift.tables(database)?;
            report::write_json(std::io::stdout().lock(), &report::schema_json(&tables))?;
        }
    }
    Ok(())
}

pub fn copy(config: &Config, src: &Path, dst: &Path) -> Result<()> {
    engine(config)?.make_copy(src, dst)?;
    println!("{} {} to {}", "Copied".green(), src.display(), dst.display());
    Ok(())
}
