//! Engine configuration (rift.toml / environment)

use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::logging::LogLevel;

/// Environment variable with `;`-separated table patterns to skip.
pub const SKIP_TABLES_ENV: &str = "RIFT_SKIP_TABLES";

/// How rebase resolves a cell both sides changed to different values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    /// Their value is kept and the local edit is dropped.
    #[default]
    Theirs,
    /// The local edit is re-applied on top of their value.
    Local,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Config {
    /// Regular expressions (matched against the whole table name) of tables
    /// that diff, apply and rebase ignore.
    #[serde(default)]
    pub skip_tables: Vec<String>,

    #[serde(default)]
    pub conflict_policy: ConflictPolicy,

    #[serde(default)]
    pub log_level: LogLevel,
}

impl Config {
    /// Load config from TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml(&contents)
    }

    /// Load config from TOML string
    pub fn from_toml(toml: &str) -> Result<Self> {
        let config: Config = toml::from_str(toml).map_err(|e| Error::Config(e.to_string()))?;
        config.table_filter()?;
        Ok(config)
    }

    /// Defaults overridden by `RIFT_LOGGER_LEVEL` and `RIFT_SKIP_TABLES`.
    pub fn from_env() -> Result<Self> {
        let mut config = Config {
            log_level: LogLevel::from_env(),
            ..Config::default()
        };
        if let Ok(tables) = std::env::var(SKIP_TABLES_ENV) {
            config.skip_tables = split_table_list(&tables);
        }
        config.table_filter()?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let toml = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        std::fs::write(path, toml)?;
        Ok(())
    }

    /// Compile `skip_tables` into a matcher.
    pub fn table_filter(&self) -> Result<TableFilter> {
        TableFilter::new(&self.skip_tables)
    }
}

fn split_table_list(list: &str) -> Vec<String> {
    list.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Decides which tables take part in an operation.
///
/// SQLite's internal tables, GeoPackage metadata and R-tree shadow tables are
/// always excluded; user patterns add to that list.
#[derive(Debug, Clone, Default)]
pub struct TableFilter {
    patterns: Vec<Regex>,
}

const INTERNAL_PREFIXES: &[&str] = &["sqlite_", "gpkg_", "rtree_"];

impl TableFilter {
    pub fn new(patterns: &[String]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| {
                Regex::new(&format!("^(?:{})$", p))
                    .map_err(|e| Error::Config(format!("bad skip_tables pattern '{}': {}", p, e)))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    pub fn is_internal(name: &str) -> bool {
        let lower = name.to_ascii_lowercase();
        INTERNAL_PREFIXES.iter().any(|p| lower.starts_with(p))
    }

    pub fn is_skipped(&self, name: &str) -> bool {
        Self::is_internal(name) || self.patterns.iter().any(|re| re.is_match(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.conflict_policy, ConflictPolicy::Theirs);
        assert_eq!(config.log_level, LogLevel::Error);
        assert!(config.skip_tables.is_empty());
    }

    #[test]
    fn parse_toml() {
        let config = Config::from_toml(
            r#"
            skip_tables = ["audit_.*", "cache"]
            conflict_policy = "local"
            log_level = 4
            "#,
        )
        .unwrap();
        assert_eq!(config.conflict_policy, ConflictPolicy::Local);
        assert_eq!(config.log_level, LogLevel::Debug);

        let filter = config.table_filter().unwrap();
        assert!(filter.is_skipped("audit_2024"));
        assert!(filter.is_skipped("cache"));
        assert!(!filter.is_skipped("cache_hits"));
        assert!(!filter.is_skipped("roads"));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(Config::from_toml("log_level = 9").is_err());
        assert!(Config::from_toml("skip_tables = [\"(\"]").is_err());
        assert!(Config::from_toml("conflict_policy = \"mine\"").is_err());
    }

    #[test]
    fn internal_tables_always_skipped() {
        let filter = TableFilter::default();
        assert!(filter.is_skipped("sqlite_sequence"));
        assert!(filter.is_skipped("gpkg_contents"));
        assert!(filter.is_skipped("rtree_roads_geom_node"));
        assert!(!filter.is_skipped("roads"));
    }

    #[test]
    fn config_toml_roundtrip() {
        let config = Config {
            skip_tables: vec!["tmp_.*".into()],
            conflict_policy: ConflictPolicy::Local,
            log_level: LogLevel::Info,
        };
        let toml = toml::to_string(&config).unwrap();
        assert_eq!(Config::from_toml(&toml).unwrap(), config);
    }

    #[test]
    fn table_list_splitting() {
        assert_eq!(split_table_list(" a; b ;;c"), vec!["a", "b", "c"]);
    }
}
