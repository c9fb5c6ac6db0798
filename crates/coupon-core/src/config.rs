//! Validator configuration

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::cache::DEFAULT_CACHE_CAPACITY;
use crate::codec::Compression;
use crate::error::{CouponError, Result};
use crate::index::MAX_SOURCES;
use crate::ingest::{FileSource, IngestConfig, SourceOpener, MIN_SOURCES};

/// One coupon list on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Path to the (compressed) source file
    pub path: PathBuf,
    /// Display name; defaults to the path
    #[serde(default)]
    pub name: Option<String>,
    /// Compression of the file
    #[serde(default)]
    pub compression: Compression,
}

impl SourceConfig {
    /// Source at `path` with detected compression
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            name: None,
            compression: Compression::Auto,
        }
    }

    /// Build the opener for this source
    pub fn opener(&self) -> FileSource {
        let source = FileSource::new(&self.path).with_compression(self.compression);
        match &self.name {
            Some(name) => source.with_name(name),
            None => source,
        }
    }
}

/// Top-level configuration for the validation core
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Ordered source lists; position decides the source bit
    pub sources: Vec<SourceConfig>,
    /// Result cache capacity
    pub cache_capacity: usize,
    /// Ingestion tuning
    pub ingest: IngestConfig,
    /// Default log filter when `RUST_LOG` is unset
    pub log_level: String,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            ingest: IngestConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl ValidatorConfig {
    /// Load from a `.toml` or `.json` file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        match ext.to_lowercase().as_str() {
            "toml" => toml::from_str(&contents).map_err(|e| CouponError::ConfigParse(e.to_string())),
            "json" => {
                serde_json::from_str(&contents).map_err(|e| CouponError::ConfigParse(e.to_string()))
            }
            _ => Err(CouponError::ConfigParse(format!(
                "unsupported config file extension: {ext}"
            ))),
        }
    }

    /// Check source count and sizes
    pub fn validate(&self) -> Result<()> {
        if self.sources.len() < MIN_SOURCES {
            return Err(CouponError::InsufficientSources {
                required: MIN_SOURCES,
                available: self.sources.len(),
            });
        }
        if self.sources.len() > MAX_SOURCES {
            return Err(CouponError::TooManySources {
                max: MAX_SOURCES,
                supplied: self.sources.len(),
            });
        }
        if self.cache_capacity == 0 {
            return Err(CouponError::InvalidConfig(
                "cache_capacity must be greater than zero".to_string(),
            ));
        }
        if self.ingest.max_line_bytes == 0 {
            return Err(CouponError::InvalidConfig(
                "ingest.max_line_bytes must be greater than zero".to_string(),
            ));
        }
        if self.sources.iter().any(|s| s.path.as_os_str().is_empty()) {
            return Err(CouponError::InvalidConfig(
                "source path cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Openers for every configured source, in order
    pub fn source_openers(&self) -> Vec<Box<dyn SourceOpener>> {
        self.sources
            .iter()
            .map(|s| Box::new(s.opener()) as Box<dyn SourceOpener>)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn two_sources() -> ValidatorConfig {
        ValidatorConfig {
            sources: vec![SourceConfig::new("/data/a.gz"), SourceConfig::new("/data/b.gz")],
            ..Default::default()
        }
    }

    #[test]
    fn test_default_values() {
        let config = ValidatorConfig::default();
        assert!(config.sources.is_empty());
        assert_eq!(config.cache_capacity, 100_000);
        assert_eq!(config.ingest.max_line_bytes, 10 * 1024 * 1024);
        assert!(config.ingest.parallel);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_validate_source_counts() {
        assert!(two_sources().validate().is_ok());

        let mut config = two_sources();
        config.sources.truncate(1);
        assert!(matches!(
            config.validate(),
            Err(CouponError::InsufficientSources { required: 2, available: 1 })
        ));

        let mut config = two_sources();
        config.sources.push(SourceConfig::new("/data/c.gz"));
        assert!(config.validate().is_ok());
        config.sources.push(SourceConfig::new("/data/d.gz"));
        assert!(matches!(
            config.validate(),
            Err(CouponError::TooManySources { max: 3, supplied: 4 })
        ));
    }

    #[test]
    fn test_validate_sizes() {
        let mut config = two_sources();
        config.cache_capacity = 0;
        assert!(matches!(config.validate(), Err(CouponError::InvalidConfig(_))));

        let mut config = two_sources();
        config.ingest.max_line_bytes = 0;
        assert!(matches!(config.validate(), Err(CouponError::InvalidConfig(_))));
    }

    #[test]
    fn test_from_file_toml() {
        let mut file = NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(
            file,
            r#"
cache_capacity = 500
log_level = "debug"

[[sources]]
path = "/data/couponbase1.gz"
name = "base1"

[[sources]]
path = "/data/couponbase2.zst"
compression = "zstd"

[ingest]
parallel = false
"#
        )
        .unwrap();

        let config = ValidatorConfig::from_file(file.path()).unwrap();
        assert_eq!(config.cache_capacity, 500);
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.sources.len(), 2);
        assert_eq!(config.sources[0].name.as_deref(), Some("base1"));
        assert_eq!(config.sources[0].compression, Compression::Auto);
        assert_eq!(config.sources[1].compression, Compression::Zstd);
        assert!(!config.ingest.parallel);
        assert_eq!(config.ingest.read_buffer_bytes, 4 * 1024 * 1024);
        config.validate().unwrap();
    }

    #[test]
    fn test_from_file_json() {
        let mut file = NamedTempFile::with_suffix(".json").unwrap();
        writeln!(
            file,
            r#"{{"sources": [{{"path": "/a.gz"}}, {{"path": "/b.gz"}}, {{"path": "/c.lz4", "compression": "lz4"}}]}}"#
        )
        .unwrap();

        let config = ValidatorConfig::from_file(file.path()).unwrap();
        assert_eq!(config.sources.len(), 3);
        assert_eq!(config.sources[2].compression, Compression::Lz4);
        assert_eq!(config.cache_capacity, 100_000);
    }

    #[test]
    fn test_from_file_unsupported_extension() {
        let file = NamedTempFile::with_suffix(".yaml").unwrap();
        assert!(matches!(
            ValidatorConfig::from_file(file.path()),
            Err(CouponError::ConfigParse(_))
        ));
    }

    #[test]
    fn test_source_openers_keep_order_and_names() {
        let mut config = two_sources();
        config.sources[1].name = Some("second".to_string());
        let openers = config.source_openers();
        assert_eq!(openers.len(), 2);
        assert_eq!(openers[0].name(), "/data/a.gz");
        assert_eq!(openers[1].name(), "second");
    }
}
