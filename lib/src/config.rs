//! Defines `EngineConfig`, the settings of a fragmentation engine, and how
//! they are read from JSON files and the environment.

use crate::errors::{FragmentError, Result};
use crate::fragmenters::{FragmenterKind, DEFAULT_FAN_OUT, DEFAULT_MAX_DEPTH};
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_DATA_FOLDER: &str = "./data";
pub const DEFAULT_BASE_IRI: &str = "http://localhost:8888/";
pub const DEFAULT_PAGE_CAPACITY: usize = 10;
pub const DEFAULT_CACHE_SIZE: usize = 1000;
pub const DEFAULT_IO_TIMEOUT_MS: u64 = 30_000;

#[derive(Serialize, Deserialize, Builder, Debug, Clone, PartialEq)]
#[builder(default, build_fn(error = "FragmentError", validate = "Self::validate"))]
#[serde(default)]
pub struct EngineConfig {
    /// Root under which every stream folder lives.
    #[builder(setter(into))]
    pub data_folder: PathBuf,
    /// Prefix of every page IRI; the stream folder is appended to it.
    #[builder(setter(into))]
    pub base_iri: String,
    pub page_capacity: usize,
    pub cache_size: usize,
    pub fragmenter: FragmenterKind,
    /// Fragmentation path; the strategy's default when unset.
    #[builder(setter(into, strip_option))]
    pub relation_path: Option<String>,
    pub fan_out: usize,
    pub max_depth: usize,
    #[builder(setter(strip_option))]
    pub io_timeout_ms: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            data_folder: PathBuf::from(DEFAULT_DATA_FOLDER),
            base_iri: DEFAULT_BASE_IRI.to_string(),
            page_capacity: DEFAULT_PAGE_CAPACITY,
            cache_size: DEFAULT_CACHE_SIZE,
            fragmenter: FragmenterKind::default(),
            relation_path: None,
            fan_out: DEFAULT_FAN_OUT,
            max_depth: DEFAULT_MAX_DEPTH,
            io_timeout_ms: Some(DEFAULT_IO_TIMEOUT_MS),
        }
    }
}

impl From<derive_builder::UninitializedFieldError> for FragmentError {
    fn from(e: derive_builder::UninitializedFieldError) -> Self {
        FragmentError::validation(e.to_string())
    }
}

impl EngineConfigBuilder {
    fn validate(&self) -> std::result::Result<(), FragmentError> {
        if self.page_capacity == Some(0) {
            return Err(FragmentError::validation("page capacity must be at least 1"));
        }
        if self.cache_size == Some(0) {
            return Err(FragmentError::validation("cache size must be at least 1"));
        }
        Ok(())
    }
}

impl EngineConfig {
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Defaults overridden by `DATA_FOLDER`, `LDES_BASE_IRI`,
    /// `LDES_PAGE_CAPACITY`, `LDES_CACHE_SIZE`, `LDES_FRAGMENTER`,
    /// `LDES_RELATION_PATH` and `LDES_IO_TIMEOUT_MS`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = EngineConfig::default();
        if let Some(folder) = lookup("DATA_FOLDER") {
            config.data_folder = PathBuf::from(folder);
        }
        if let Some(base) = lookup("LDES_BASE_IRI") {
            config.base_iri = base;
        }
        if let Some(value) = lookup("LDES_PAGE_CAPACITY") {
            config.page_capacity = parse_var("LDES_PAGE_CAPACITY", &value)?;
        }
        if let Some(value) = lookup("LDES_CACHE_SIZE") {
            config.cache_size = parse_var("LDES_CACHE_SIZE", &value)?;
        }
        if let Some(name) = lookup("LDES_FRAGMENTER") {
            config.fragmenter = name.parse()?;
        }
        if let Some(path) = lookup("LDES_RELATION_PATH") {
            config.relation_path = Some(path);
        }
        if let Some(value) = lookup("LDES_IO_TIMEOUT_MS") {
            config.io_timeout_ms = match parse_var::<u64>("LDES_IO_TIMEOUT_MS", &value)? {
                0 => None,
                ms => Some(ms),
            };
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.page_capacity == 0 {
            return Err(FragmentError::validation("page capacity must be at least 1"));
        }
        if self.cache_size == 0 {
            return Err(FragmentError::validation("cache size must be at least 1"));
        }
        Ok(())
    }

    /// Fragmentation path in effect: the configured one or the strategy's default.
    pub fn relation_path(&self) -> String {
        self.relation_path
            .clone()
            .unwrap_or_else(|| self.fragmenter.default_path().as_str().to_string())
    }

    pub fn io_timeout(&self) -> Option<Duration> {
        self.io_timeout_ms.map(Duration::from_millis)
    }

    /// IRI under which the pages of `folder` are published.
    pub fn view_iri(&self, folder: &str) -> String {
        format!(
            "{}/{}",
            self.base_iri.trim_end_matches('/'),
            folder.trim_matches('/')
        )
    }

    pub fn save_to_file(&self, file: &Path) -> Result<()> {
        let config_str = serde_json::to_string_pretty(&self)
            .map_err(|e| FragmentError::internal(e.to_string()))?;
        let mut f = std::fs::File::create(file).map_err(|e| FragmentError::storage(file, e))?;
        f.write_all(config_str.as_bytes())
            .map_err(|e| FragmentError::storage(file, e))?;
        Ok(())
    }

    pub fn from_file(file: &Path) -> Result<Self> {
        let f = std::fs::File::open(file).map_err(|e| FragmentError::storage(file, e))?;
        let reader = BufReader::new(f);
        let config: EngineConfig = serde_json::from_reader(reader).map_err(|e| {
            FragmentError::validation(format!("invalid configuration {}: {}", file.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Prints out the current EngineConfig in a clear and readable way for command line output.
    pub fn print(&self) {
        println!("Configuration:");
        println!("  Data folder: {}", self.data_folder.display());
        println!("  Base IRI: {}", self.base_iri);
        println!("  Fragmenter: {}", self.fragmenter);
        println!("  Relation path: {}", self.relation_path());
        println!("  Page capacity: {}", self.page_capacity);
        println!("  Cache size: {}", self.cache_size);
        if self.fragmenter == FragmenterKind::PrefixTree {
            println!("  Fan-out: {}", self.fan_out);
            println!("  Max depth: {}", self.max_depth);
        }
        match self.io_timeout_ms {
            Some(ms) => println!("  I/O timeout: {} ms", ms),
            None => println!("  I/O timeout: none"),
        }
    }
}

fn parse_var<T: FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| FragmentError::validation(format!("{name} has an invalid value {value:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_builder_defaults_and_overrides() {
        let config = EngineConfig::builder()
            .data_folder("/srv/ldes")
            .page_capacity(2)
            .fragmenter(FragmenterKind::PrefixTree)
            .build()
            .unwrap();
        assert_eq!(config.data_folder, PathBuf::from("/srv/ldes"));
        assert_eq!(config.page_capacity, 2);
        assert_eq!(config.cache_size, DEFAULT_CACHE_SIZE);
        assert_eq!(config.relation_path(), "http://example.org/name");

        let err = EngineConfig::builder().cache_size(0).build().unwrap_err();
        assert_eq!(err.kind(), "validation");
    }

    #[test]
    fn test_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("DATA_FOLDER", "/tmp/pages"),
            ("LDES_PAGE_CAPACITY", "25"),
            ("LDES_FRAGMENTER", "prefix-tree-fragmenter"),
            ("LDES_IO_TIMEOUT_MS", "0"),
        ]
        .into_iter()
        .collect();
        let config = EngineConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.data_folder, PathBuf::from("/tmp/pages"));
        assert_eq!(config.page_capacity, 25);
        assert_eq!(config.fragmenter, FragmenterKind::PrefixTree);
        assert_eq!(config.io_timeout(), None);

        let bad = EngineConfig::from_lookup(|k| {
            (k == "LDES_CACHE_SIZE").then(|| "many".to_string())
        });
        assert!(matches!(bad, Err(FragmentError::Validation(_))));
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("engine.json");
        let config = EngineConfig::builder()
            .base_iri("http://example.org/ldes/")
            .relation_path("http://www.w3.org/ns/sosa/resultTime")
            .build()
            .unwrap();
        config.save_to_file(&file).unwrap();
        assert_eq!(EngineConfig::from_file(&file).unwrap(), config);
        assert_eq!(config.view_iri("stream/"), "http://example.org/ldes/stream");
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"page_capacity": 3, "fragmenter": "time-fragmenter"}"#)
                .unwrap();
        assert_eq!(config.page_capacity, 3);
        assert_eq!(config.base_iri, DEFAULT_BASE_IRI);
    }
}
