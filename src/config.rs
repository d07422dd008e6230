//! Engine configuration.
//!
//! The data directory holds the dictionary files, grid catalogs and grid files. It is
//! taken from the `GEOCONV_DICTIONARY` environment variable when set, otherwise from the
//! first existing directory of [`SEARCH_PATH`].

use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::context::Engine;
use crate::dictionary::ByteOrder;
use crate::error::{Error, WarningMask};
pub use crate::grid::OutOfCoveragePolicy;

pub const DICTIONARY_ENV: &str = "GEOCONV_DICTIONARY";

/// Compiled-in data directories, in order of preference.
pub const SEARCH_PATH: [&str; 3] = [
    "./Dictionaries",
    "/usr/local/share/geoconv",
    "/usr/share/geoconv",
];

pub const DEFAULT_CS_CAPACITY: usize = 8;
pub const DEFAULT_PATH_CAPACITY: usize = 8;
pub const DEFAULT_ROW_BUFFER: usize = 16;
pub const DEFAULT_HUB: &str = "WGS84";

/// Everything an [`Engine`] is built from.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub data_dir: PathBuf,
    /// Activated coordinate systems kept resident
    pub cs_capacity: usize,
    /// Datum-pair paths kept resident
    pub path_capacity: usize,
    /// Rows buffered per open grid file
    pub grid_row_buffer: usize,
    /// Datum that every datum's own shift parameters lead to
    pub hub_datum: String,
    pub out_of_coverage: OutOfCoveragePolicy,
    pub warning_mask: WarningMask,
    /// Byte order of dictionary files created from scratch
    pub create_order: ByteOrder,
}

impl EngineConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        EngineConfig {
            data_dir: data_dir.into(),
            cs_capacity: DEFAULT_CS_CAPACITY,
            path_capacity: DEFAULT_PATH_CAPACITY,
            grid_row_buffer: DEFAULT_ROW_BUFFER,
            hub_datum: DEFAULT_HUB.to_string(),
            out_of_coverage: OutOfCoveragePolicy::default(),
            warning_mask: WarningMask::NONE,
            create_order: ByteOrder::NATIVE,
        }
    }

    /// Defaults with the data directory taken from the environment.
    pub fn from_env() -> Self {
        let search: Vec<&Path> = SEARCH_PATH.iter().map(Path::new).collect();
        let dir = data_dir(env::var_os(DICTIONARY_ENV), &search);
        debug!(data_dir = %dir.display(), "resolved data directory");
        Self::new(dir)
    }

    pub fn validate(&self) -> Result<(), Error> {
        for (what, n) in [
            ("coordinate system cache capacity", self.cs_capacity),
            ("path cache capacity", self.path_capacity),
            ("grid row buffer", self.grid_row_buffer),
        ] {
            if n == 0 {
                return Err(Error::Configuration(format!("{what} must be at least 1")));
            }
        }
        if self.hub_datum.trim().is_empty() {
            return Err(Error::Configuration("hub datum name is empty".into()));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// An explicit setting wins; otherwise the first existing search directory, otherwise
/// the first one named.
fn data_dir(var: Option<OsString>, search: &[&Path]) -> PathBuf {
    if let Some(dir) = var.filter(|v| !v.is_empty()) {
        return PathBuf::from(dir);
    }
    search
        .iter()
        .find(|dir| dir.is_dir())
        .or_else(|| search.first())
        .map(|dir| dir.to_path_buf())
        .unwrap_or_default()
}

/// Builder for an [`Engine`].
///
/// ```
/// use geoconv::{EngineBuilder, OutOfCoveragePolicy, WarningMask};
///
/// let dir = tempfile::tempdir().unwrap();
/// let engine = EngineBuilder::new()
///     .data_dir(dir.path())
///     .cs_cache_capacity(4)
///     .out_of_coverage(OutOfCoveragePolicy::Fatal)
///     .suppress(WarningMask::USEFUL_RANGE)
///     .build()
///     .unwrap();
/// assert_eq!(engine.config().cs_capacity, 4);
/// ```
#[derive(Debug, Clone)]
pub struct EngineBuilder {
    config: EngineConfig,
}

impl EngineBuilder {
    /// Start from [`EngineConfig::from_env`].
    pub fn new() -> Self {
        EngineBuilder {
            config: EngineConfig::from_env(),
        }
    }

    pub fn from_config(config: EngineConfig) -> Self {
        EngineBuilder { config }
    }

    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.data_dir = dir.into();
        self
    }

    pub fn cs_cache_capacity(mut self, capacity: usize) -> Self {
        self.config.cs_capacity = capacity;
        self
    }

    pub fn path_cache_capacity(mut self, capacity: usize) -> Self {
        self.config.path_capacity = capacity;
        self
    }

    pub fn grid_row_buffer(mut self, rows: usize) -> Self {
        self.config.grid_row_buffer = rows;
        self
    }

    pub fn hub_datum(mut self, key: &str) -> Self {
        self.config.hub_datum = key.to_string();
        self
    }

    pub fn out_of_coverage(mut self, policy: OutOfCoveragePolicy) -> Self {
        self.config.out_of_coverage = policy;
        self
    }

    /// Drop the given warning kinds from every result.
    pub fn suppress(mut self, mask: WarningMask) -> Self {
        self.config.warning_mask = self.config.warning_mask | mask;
        self
    }

    pub fn create_byte_order(mut self, order: ByteOrder) -> Self {
        self.config.create_order = order;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn build(self) -> Result<Engine, Error> {
        Engine::new(self.config)
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn environment_overrides_search_path() {
        let dir = tempfile::tempdir().unwrap();
        let search = [dir.path()];
        assert_eq!(
            data_dir(Some("/srv/geo".into()), &search),
            PathBuf::from("/srv/geo")
        );
        assert_eq!(data_dir(Some("".into()), &search), dir.path());
        assert_eq!(data_dir(None, &search), dir.path());
    }

    #[test]
    fn first_existing_directory_wins() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing");
        let search = [missing.as_path(), dir.path()];
        assert_eq!(data_dir(None, &search), dir.path());
        let none = [missing.as_path()];
        assert_eq!(data_dir(None, &none), missing);
    }

    #[test]
    fn builder_validates() {
        let dir = tempfile::tempdir().unwrap();
        let base = EngineBuilder::from_config(EngineConfig::new(dir.path()));
        assert!(matches!(
            base.clone().cs_cache_capacity(0).build(),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            base.clone().hub_datum(" ").build(),
            Err(Error::Configuration(_))
        ));
        let config = base
            .suppress(WarningMask::NOT_CONVERGED)
            .suppress(WarningMask::FALLBACK)
            .config()
            .clone();
        assert_eq!(config.path_capacity, DEFAULT_PATH_CAPACITY);
        assert_eq!(config.hub_datum, "WGS84");
        assert_eq!(config.out_of_coverage, OutOfCoveragePolicy::Unshifted);
        assert_eq!(
            config.warning_mask,
            WarningMask::NOT_CONVERGED | WarningMask::FALLBACK
        );
    }
}
