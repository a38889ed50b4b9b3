//! File store configuration.

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable prefix for configuration overrides
/// (e.g. `GRIDSTORE_DEFAULT_CHUNK_SIZE=1048576`).
pub const ENV_PREFIX: &str = "GRIDSTORE_";

/// Configuration for a file store over a pair of collections.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStoreConfig {
    /// Collection prefix; files live in `<prefix>.files`, chunks in
    /// `<prefix>.chunks`.
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Chunk size used when neither the caller's metadata nor the per-call
    /// options supply a positive one.
    #[serde(default = "default_chunk_size")]
    pub default_chunk_size: u32,
    /// Exclusive upper bound on a stored file's length.
    #[serde(default = "default_max_file_length")]
    pub max_file_length: u64,
}

fn default_prefix() -> String {
    crate::DEFAULT_PREFIX.to_string()
}

fn default_chunk_size() -> u32 {
    crate::DEFAULT_CHUNK_SIZE
}

fn default_max_file_length() -> u64 {
    crate::MAX_FILE_LENGTH
}

impl Default for FileStoreConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            default_chunk_size: default_chunk_size(),
            max_file_length: default_max_file_length(),
        }
    }
}

impl FileStoreConfig {
    /// Configuration with a different collection prefix.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Self::default()
        }
    }

    /// Name of the files collection.
    pub fn files_collection(&self) -> String {
        format!("{}.files", self.prefix)
    }

    /// Name of the chunks collection.
    pub fn chunks_collection(&self) -> String {
        format!("{}.chunks", self.prefix)
    }

    /// Validate configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.prefix.is_empty() {
            return Err("prefix cannot be empty".to_string());
        }
        if self.prefix.split('.').any(str::is_empty) {
            return Err(format!(
                "prefix {:?} contains an empty '.'-separated segment",
                self.prefix
            ));
        }
        if self.default_chunk_size == 0 {
            return Err("default_chunk_size must be positive".to_string());
        }
        // chunkSize is persisted as a 32-bit signed integer.
        if i32::try_from(self.default_chunk_size).is_err() {
            return Err(format!(
                "default_chunk_size {} exceeds {}",
                self.default_chunk_size,
                i32::MAX
            ));
        }
        if self.max_file_length == 0 {
            return Err("max_file_length must be positive".to_string());
        }
        Ok(())
    }

    /// Layered configuration source: defaults, then an optional TOML file,
    /// then `GRIDSTORE_*` environment variables.
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX))
    }

    /// Load and validate configuration.
    pub fn load(path: Option<&Path>) -> crate::Result<Self> {
        let config: Self = Self::figment(path)
            .extract()
            .map_err(|e| crate::Error::Config(e.to_string()))?;
        config.validate().map_err(crate::Error::Config)?;
        Ok(config)
    }
}
