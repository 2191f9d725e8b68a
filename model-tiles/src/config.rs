//! Worker configuration.
//!
//! Settings can be built in code with the `with_*` setters or loaded from an
//! INI file:
//!
//! ```ini
//! [worker]
//! tile_extent = 8192
//! promote_id = building_id
//! max_concurrent_decodes = 4
//! fetch_timeout_secs = 30
//! user_agent = model-tiles/0.1
//!
//! [logging]
//! filter = model_tiles=debug
//! directory = /var/log/model-tiles
//! ```
//!
//! Unknown keys are ignored; missing keys keep their defaults.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use ini::{Ini, Properties};
use thiserror::Error;

use crate::coord::DEFAULT_TILE_EXTENT;
use crate::feature_index::PromoteId;

/// Default fetch timeout (in seconds).
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

/// Default user agent sent by the HTTP fetcher.
pub const DEFAULT_USER_AGENT: &str = concat!("model-tiles/", env!("CARGO_PKG_VERSION"));

/// Default tracing filter directive.
pub const DEFAULT_LOG_FILTER: &str = "model_tiles=info";

/// Default file name prefix for rolling log files.
pub const DEFAULT_LOG_FILE_PREFIX: &str = "model-tiles.log";

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read or parsed.
    #[error("Failed to read config file {path}: {message}")]
    Read { path: PathBuf, message: String },

    /// The INI text is malformed.
    #[error("Failed to parse config: {0}")]
    Parse(String),

    /// A key has a value of the wrong type or range.
    #[error("Invalid value for {section}.{key}: '{value}'")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
    },
}

/// Settings for a [`ModelTileWorker`](crate::ModelTileWorker).
#[derive(Clone, Debug, PartialEq)]
pub struct WorkerConfig {
    /// Tile units along one tile edge.
    pub tile_extent: u32,
    /// Feature id promotion policy for new feature indexes.
    pub promote_id: PromoteId,
    /// Upper bound on decodes running at once.
    pub max_concurrent_decodes: usize,
    /// HTTP fetch timeout in seconds.
    pub fetch_timeout_secs: u64,
    /// HTTP user agent.
    pub user_agent: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            tile_extent: DEFAULT_TILE_EXTENT,
            promote_id: PromoteId::None,
            max_concurrent_decodes: default_decode_concurrency(),
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl WorkerConfig {
    pub fn with_tile_extent(mut self, tile_extent: u32) -> Self {
        self.tile_extent = tile_extent;
        self
    }

    pub fn with_promote_id(mut self, promote_id: PromoteId) -> Self {
        self.promote_id = promote_id;
        self
    }

    /// Set the decode concurrency (clamped to at least 1).
    pub fn with_max_concurrent_decodes(mut self, max: usize) -> Self {
        self.max_concurrent_decodes = max.max(1);
        self
    }

    pub fn with_fetch_timeout_secs(mut self, secs: u64) -> Self {
        self.fetch_timeout_secs = secs;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    fn apply(&mut self, section: &Properties) -> Result<(), ConfigError> {
        if let Some(v) = section.get("tile_extent") {
            self.tile_extent = parse_positive("worker", "tile_extent", v)?;
        }
        if let Some(v) = section.get("promote_id") {
            let v = v.trim();
            self.promote_id = if v.is_empty() {
                PromoteId::None
            } else {
                PromoteId::Property(v.to_string())
            };
        }
        if let Some(v) = section.get("max_concurrent_decodes") {
            self.max_concurrent_decodes = parse_positive("worker", "max_concurrent_decodes", v)?;
        }
        if let Some(v) = section.get("fetch_timeout_secs") {
            self.fetch_timeout_secs = parse_positive("worker", "fetch_timeout_secs", v)?;
        }
        if let Some(v) = section.get("user_agent") {
            self.user_agent = v.trim().to_string();
        }
        Ok(())
    }
}

/// Logging settings consumed by [`init_logging`](crate::logging::init_logging).
#[derive(Clone, Debug, PartialEq)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, overridden by `RUST_LOG` when set.
    pub filter: String,
    /// Directory for daily rolling log files; stderr only when `None`.
    pub directory: Option<PathBuf>,
    /// File name prefix for rolling files.
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
            directory: None,
            file_prefix: DEFAULT_LOG_FILE_PREFIX.to_string(),
        }
    }
}

impl LoggingConfig {
    fn apply(&mut self, section: &Properties) {
        if let Some(v) = section.get("filter") {
            self.filter = v.trim().to_string();
        }
        if let Some(v) = section.get("directory") {
            let v = v.trim();
            self.directory = (!v.is_empty()).then(|| PathBuf::from(v));
        }
        if let Some(v) = section.get("file_prefix") {
            self.file_prefix = v.trim().to_string();
        }
    }
}

/// All settings loadable from one INI file.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConfigFile {
    pub worker: WorkerConfig,
    pub logging: LoggingConfig,
}

impl ConfigFile {
    /// Loads settings from an INI file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_file(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_ini(&ini)
    }

    /// Parses settings from INI text.
    pub fn from_ini_str(text: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(section) = ini.section(Some("worker")) {
            config.worker.apply(section)?;
        }
        if let Some(section) = ini.section(Some("logging")) {
            config.logging.apply(section);
        }
        Ok(config)
    }
}

fn parse_positive<T>(section: &str, key: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + Default,
{
    match value.trim().parse::<T>() {
        Ok(parsed) if parsed > T::default() => Ok(parsed),
        _ => Err(ConfigError::InvalidValue {
            section: section.to_string(),
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

fn default_decode_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
