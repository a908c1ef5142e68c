//! Configuration for the jitter engine

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{JitterError, Result};
use crate::header::InjectionStrategy;
use crate::types::{JitterVector, DEFAULT_PASS_COUNT};

/// Engine and searcher configuration. Immutable once an engine holds it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JitterConfig {
    /// Passes in the temporal loop
    pub pass_count: usize,
    /// Jitter injected on every pass when flash search is disabled
    pub default_jitter: JitterVector,
    /// Consult the knowledge base for jitter
    pub enable_flash_search: bool,
    /// LRU capacity for resolved jitter (0 disables the cache)
    pub cache_size: usize,
    /// Per-pass debug logging
    pub verbose: bool,
    /// How jitter is folded into the header
    pub injection: InjectionStrategy,
    /// Unix socket used by the jitter RPC endpoint
    pub socket_path: PathBuf,
}

impl Default for JitterConfig {
    fn default() -> Self {
        Self {
            pass_count: DEFAULT_PASS_COUNT,
            default_jitter: 0xDEAD_BEEF,
            enable_flash_search: true,
            cache_size: 10_000,
            verbose: false,
            injection: InjectionStrategy::Rotating,
            socket_path: PathBuf::from("/tmp/jitter.sock"),
        }
    }
}

impl JitterConfig {
    /// Create a config builder
    pub fn builder() -> JitterConfigBuilder {
        JitterConfigBuilder::default()
    }

    /// Load a TOML config file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: JitterConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.pass_count == 0 {
            return Err(JitterError::Config("pass_count must be > 0".into()));
        }
        Ok(())
    }
}

/// Builder for [`JitterConfig`]
#[derive(Debug, Clone, Default)]
pub struct JitterConfigBuilder {
    config: JitterConfig,
}

impl JitterConfigBuilder {
    /// Set the number of passes
    pub fn pass_count(mut self, pass_count: usize) -> Self {
        self.config.pass_count = pass_count;
        self
    }

    /// Set the jitter used when lookups are disabled
    pub fn default_jitter(mut self, jitter: JitterVector) -> Self {
        self.config.default_jitter = jitter;
        self
    }

    /// Enable or disable knowledge-base lookups
    pub fn enable_flash_search(mut self, enable: bool) -> Self {
        self.config.enable_flash_search = enable;
        self
    }

    /// Set the LRU cache capacity
    pub fn cache_size(mut self, size: usize) -> Self {
        self.config.cache_size = size;
        self
    }

    /// Enable per-pass logging
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.config.verbose = verbose;
        self
    }

    /// Set the injection strategy
    pub fn injection(mut self, injection: InjectionStrategy) -> Self {
        self.config.injection = injection;
        self
    }

    /// Set the RPC socket path
    pub fn socket_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config.socket_path = path.as_ref().to_path_buf();
        self
    }

    /// Validate and build
    pub fn build(self) -> Result<JitterConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = JitterConfig::default();
        assert_eq!(config.pass_count, 21);
        assert_eq!(config.default_jitter, 0xDEADBEEF);
        assert!(config.enable_flash_search);
        assert_eq!(config.cache_size, 10_000);
        assert_eq!(config.injection, InjectionStrategy::Rotating);
    }

    #[test]
    fn test_builder_rejects_zero_passes() {
        assert!(JitterConfig::builder().pass_count(0).build().is_err());
        let config = JitterConfig::builder()
            .pass_count(5)
            .cache_size(0)
            .injection(InjectionStrategy::PassSelected)
            .build()
            .unwrap();
        assert_eq!(config.pass_count, 5);
        assert_eq!(config.cache_size, 0);
    }

    #[test]
    fn test_from_file_partial() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "pass_count = 12").unwrap();
        writeln!(file, "injection = \"pass_selected\"").unwrap();
        writeln!(file, "socket_path = \"/tmp/other.sock\"").unwrap();

        let config = JitterConfig::from_file(file.path()).unwrap();
        assert_eq!(config.pass_count, 12);
        assert_eq!(config.injection, InjectionStrategy::PassSelected);
        assert_eq!(config.socket_path, PathBuf::from("/tmp/other.sock"));
        assert_eq!(config.cache_size, 10_000);
    }

    #[test]
    fn test_from_file_invalid() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "pass_count = 0").unwrap();
        assert!(matches!(
            JitterConfig::from_file(file.path()),
            Err(JitterError::Config(_))
        ));

        let mut garbage = NamedTempFile::new().unwrap();
        writeln!(garbage, "pass_count = [").unwrap();
        assert!(JitterConfig::from_file(garbage.path()).is_err());
    }
}
