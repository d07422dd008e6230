//! Datum transformations.
//!
//! A [`GeodeticPath`] is an ordered list of elementary [`GeodeticStep`]s leading from
//! one datum to another, either directly through a dictionary transformation or via
//! the hub datum that every datum's own shift parameters point at.

mod iterate;
mod path;
mod steps;

pub use iterate::IterationPolicy;
pub use path::{GeodeticPath, PathLeg};
pub(crate) use path::PathResolver;
pub use steps::{Coverage, GeodeticStep, Helmert, MultipleRegression};

use tracing::trace;

use crate::dictionary::{DatumDef, Dictionary, EllipsoidDef};
use crate::ellipsoid::Ellipsoid;
use crate::error::Error;

/// A datum definition merged with its ellipsoid.
#[derive(Debug, Clone, PartialEq)]
pub struct Datum {
    pub def: DatumDef,
    pub ellipsoid: Ellipsoid,
}

impl Datum {
    pub fn new(def: DatumDef, ellipsoid: Ellipsoid) -> Self {
        Datum { def, ellipsoid }
    }

    /// Load a datum and the ellipsoid it references.
    pub fn resolve(dict: &Dictionary, key: &str) -> Result<Self, Error> {
        let def: DatumDef = dict.load(key)?;
        let ell: EllipsoidDef = dict.load(&def.ell_knm).map_err(|e| match e {
            Error::NotFound { kind, key } => Error::Configuration(format!(
                "datum `{}` references missing {kind} `{key}`",
                def.key_nm
            )),
            other => other,
        })?;
        let ellipsoid = Ellipsoid::from_def(&ell)?;
        trace!(datum = %def.key_nm, %ellipsoid, "resolved datum");
        Ok(Datum { def, ellipsoid })
    }

    pub fn key(&self) -> &str {
        &self.def.key_nm
    }

    pub fn is(&self, key: &str) -> bool {
        self.def.key_nm.eq_ignore_ascii_case(key)
    }
}
