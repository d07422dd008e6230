//! Datum-shift and geoid grids.
//!
//! Grids are grouped into catalogs; a catalog is consulted in order and the first grid
//! covering a point supplies the correction. Grid files are opened header-only and
//! shared between every path or engine operation that names them.

mod catalog;
mod file;

pub use catalog::{CatalogSpec, GridCatalog};
pub use file::{GRID_MAGIC, GridFile, GridHeader, GridKind, HEADER_LEN, write_grid_file};

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{Conversion, Error, Outcome, Warning};

/// A value interpolated from a grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CorrectionValue {
    /// Arc-seconds to add to longitude and latitude
    Shift { dlng: f64, dlat: f64 },
    /// Geoid separation above the ellipsoid, metres
    GeoidHeight(f64),
}

/// What to do with a point no grid covers when no fallback technique is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutOfCoveragePolicy {
    /// Fail with [`Error::Range`].
    Fatal,
    /// Pass the coordinate through uncorrected, tagged [`Warning::Unshifted`].
    #[default]
    Unshifted,
}

impl OutOfCoveragePolicy {
    pub(crate) fn uncovered<T>(self, value: T, what: String) -> Conversion<T> {
        match self {
            OutOfCoveragePolicy::Fatal => Err(Error::Range(what)),
            OutOfCoveragePolicy::Unshifted => {
                debug!(%what, "passing coordinate through unshifted");
                Ok(Outcome::warn(value, Warning::Unshifted(what)))
            }
        }
    }
}

/// Open grid files and catalogs, shared by path.
#[derive(Debug)]
pub struct GridRegistry {
    row_buffer: usize,
    grids: Mutex<HashMap<PathBuf, Arc<GridFile>>>,
    catalogs: Mutex<HashMap<PathBuf, Arc<GridCatalog>>>,
}

impl GridRegistry {
    pub fn new(row_buffer: usize) -> Self {
        GridRegistry {
            row_buffer,
            grids: Mutex::new(HashMap::new()),
            catalogs: Mutex::new(HashMap::new()),
        }
    }

    pub fn grid(&self, path: &Path) -> Result<Arc<GridFile>, Error> {
        if let Some(grid) = self.grids.lock().get(path) {
            return Ok(Arc::clone(grid));
        }
        let opened = Arc::new(GridFile::open(path, self.row_buffer)?);
        Ok(Arc::clone(
            self.grids
                .lock()
                .entry(path.to_path_buf())
                .or_insert(opened),
        ))
    }

    /// Load a catalog and open (header only) every grid it lists.
    ///
    /// A grid that cannot be opened is skipped when the catalog names a fallback,
    /// and is fatal otherwise.
    pub fn catalog(&self, path: &Path) -> Result<Arc<GridCatalog>, Error> {
        if let Some(catalog) = self.catalogs.lock().get(path) {
            return Ok(Arc::clone(catalog));
        }
        let spec = CatalogSpec::read(path)?;
        let mut grids = Vec::with_capacity(spec.grids.len());
        for grid_path in &spec.grids {
            match self.grid(grid_path) {
                Ok(grid) => grids.push(grid),
                Err(err @ Error::Io { .. }) if spec.fallback.is_some() => {
                    warn!(catalog = %path.display(), error = %err, "skipping unreadable grid");
                }
                Err(err) => return Err(err),
            }
        }
        let catalog = Arc::new(GridCatalog::new(path.to_path_buf(), grids, spec.fallback)?);
        Ok(Arc::clone(
            self.catalogs
                .lock()
                .entry(path.to_path_buf())
                .or_insert(catalog),
        ))
    }

    /// Forget every open grid and catalog. Handles already given out stay valid.
    pub fn clear(&self) {
        self.catalogs.lock().clear();
        self.grids.lock().clear();
    }

    pub fn open_grids(&self) -> usize {
        self.grids.lock().len()
    }
}
