use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::Error;

use super::file::{GridFile, GridKind};
use super::CorrectionValue;

/// Parsed text form of a catalog.
///
/// ```text
/// # finest grids first
/// grid = conus.gxg
/// grid = alaska.gxg
/// fallback = NAD27_TO_WGS84_MOLO
/// ```
///
/// Relative grid paths are resolved against the catalog's directory.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CatalogSpec {
    pub grids: Vec<PathBuf>,
    pub fallback: Option<String>,
}

impl CatalogSpec {
    pub fn parse(path: &Path, text: &str) -> Result<Self, Error> {
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        let mut spec = CatalogSpec::default();
        for (n, line) in text.lines().enumerate() {
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let Some((name, value)) = line.split_once('=') else {
                return Err(Error::format(path, format!("line {}: expected `name = value`", n + 1)));
            };
            let value = value.trim();
            if value.is_empty() {
                return Err(Error::format(path, format!("line {}: empty value", n + 1)));
            }
            match name.trim().to_ascii_lowercase().as_str() {
                "grid" => spec.grids.push(base.join(value)),
                "fallback" if spec.fallback.is_some() => {
                    return Err(Error::format(path, format!("line {}: second fallback", n + 1)));
                }
                "fallback" => spec.fallback = Some(value.to_string()),
                other => {
                    return Err(Error::format(path, format!("line {}: unknown entry `{other}`", n + 1)));
                }
            }
        }
        if spec.grids.is_empty() && spec.fallback.is_none() {
            return Err(Error::format(path, "catalog names neither grids nor a fallback"));
        }
        Ok(spec)
    }

    pub fn read(path: &Path) -> Result<Self, Error> {
        let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::parse(path, &text)
    }

    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for grid in &self.grids {
            out.push_str(&format!("grid = {}\n", grid.display()));
        }
        if let Some(fallback) = &self.fallback {
            out.push_str(&format!("fallback = {fallback}\n"));
        }
        out
    }
}

/// An ordered list of grids sharing one kind, plus an optional named fallback.
#[derive(Debug)]
pub struct GridCatalog {
    path: PathBuf,
    kind: Option<GridKind>,
    grids: Vec<Arc<GridFile>>,
    fallback: Option<String>,
}

impl GridCatalog {
    pub(crate) fn new(
        path: PathBuf,
        grids: Vec<Arc<GridFile>>,
        fallback: Option<String>,
    ) -> Result<Self, Error> {
        let kind = grids.first().map(|g| g.header().kind);
        if let Some(odd) = grids.iter().find(|g| Some(g.header().kind) != kind) {
            return Err(Error::format(
                &path,
                format!("{} mixes grid kinds", odd.path().display()),
            ));
        }
        Ok(GridCatalog {
            path,
            kind,
            grids,
            fallback,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `None` for a catalog holding only a fallback.
    pub fn kind(&self) -> Option<GridKind> {
        self.kind
    }

    pub fn grids(&self) -> &[Arc<GridFile>] {
        &self.grids
    }

    pub fn fallback(&self) -> Option<&str> {
        self.fallback.as_deref()
    }

    pub fn covers(&self, lng: f64, lat: f64) -> bool {
        self.grids.iter().any(|g| g.contains(lng, lat))
    }

    /// Correction from the first grid whose coverage holds the point.
    pub fn query(&self, lng: f64, lat: f64) -> Result<Option<CorrectionValue>, Error> {
        for grid in &self.grids {
            if let Some([a, b]) = grid.interpolate(lng, lat)? {
                return Ok(Some(match grid.header().kind {
                    GridKind::Shift => CorrectionValue::Shift { dlng: a, dlat: b },
                    GridKind::Geoid => CorrectionValue::GeoidHeight(a),
                }));
            }
        }
        Ok(None)
    }
}
