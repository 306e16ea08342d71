pub mod changeset;
pub mod database;
pub mod inspect;

use anyhow::Result;
use rift_core::Config;
use rift_merge::Rift;

fn engine(config: &Config) -> Result<Rift> {
    Ok(Rift::new(config.clone())?)
}
