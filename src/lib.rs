//! `geoconv` converts coordinates between map projections and geodetic datums, driven by
//! binary dictionaries of ellipsoid, datum, coordinate system and transformation
//! definitions.
//!
//! A conversion runs in three stages: the source coordinate system's inverse projection
//! yields longitude and latitude on the source datum, a [`GeodeticPath`] shifts them to
//! the target datum, and the target system's forward projection produces the result.
//! Every stage reports non-fatal conditions as [`Warning`]s attached to the value, so
//! callers can tell an imprecise but usable answer from a failure.
//!
//! # Usage
//!
//! 1. Create an [`Engine`], either with [`Engine::from_env`] (the data directory comes
//!    from `GEOCONV_DICTIONARY`) or through an [`EngineBuilder`] to set cache
//!    capacities, the hub datum and the out-of-coverage policy;
//! 2. Call [`Engine::converter`] with two coordinate system keys. The resolved systems
//!    and the datum path are cached, so repeated calls are cheap;
//! 3. Call [`Converter::convert`] or [`Converter::convert_array`] with anything that
//!    implements [`Coord`], or use the [`Transform`] trait on `geo-types` geometries.
//!
//! ## Grids
//!
//! Grid based datum shifts and geoid heights read catalogs: text files listing grid
//! files in order of preference plus an optional fallback. Grid payloads are read
//! lazily, a few rows at a time. When no grid covers a point the fallback technique is
//! used and the result is tagged [`Warning::FallbackApplied`]; without a fallback the
//! [`OutOfCoveragePolicy`] decides between failing and passing the point through
//! unshifted.
//!
//! # Example
//!
//! ```
//! use geoconv::{EngineBuilder, Projected};
//! use geoconv::dictionary::{CoordSystemDef, DatumDef, EllipsoidDef, ShiftMethod};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let engine = EngineBuilder::new().data_dir(dir.path()).build().unwrap();
//! engine.store(&EllipsoidDef::from_flattening("WGS84", 6_378_137.0, 298.257_223_563)).unwrap();
//! engine.store(&EllipsoidDef::new("CLRK66", 6_378_206.4, 6_356_583.8)).unwrap();
//! engine.store(&DatumDef::new("WGS84", "WGS84")).unwrap();
//! engine.store(
//!     &DatumDef::new("NAD27", "CLRK66").with_shift(ShiftMethod::Molodensky, [-8.0, 160.0, 176.0]),
//! ).unwrap();
//! engine.store(&CoordSystemDef::new("LL27", "LL", "DEGREE").on_datum("NAD27")).unwrap();
//! let mut utm = CoordSystemDef::new("UTM84-10N", "UTM", "METER").on_datum("WGS84");
//! utm.prj_prms[0] = 10.0;
//! utm.prj_prms[1] = 1.0;
//! engine.store(&utm).unwrap();
//!
//! let out = engine
//!     .convert("LL27", "UTM84-10N", &Projected::new(-122.0, 45.0))
//!     .unwrap();
//! assert!(out.is_clean());
//! // NAD27 and WGS84 differ by tens of metres here
//! assert!((out.value.x - 578_815.3).abs() > 10.0);
//! assert!((out.value.x - 578_815.3).abs() < 200.0);
//! ```

pub mod cache;
pub mod config;
mod context;
mod convert;
mod coord;
pub mod dictionary;
mod ellipsoid;
mod error;
pub mod geodetic;
pub mod grid;
pub mod projection;
pub mod units;

#[cfg(feature = "geo-types")]
mod geo_types;
mod transform;

pub use crate::config::{EngineBuilder, EngineConfig, OutOfCoveragePolicy};
pub use crate::context::Engine;
pub use crate::convert::{Converter, Coord, CoordinateType};
pub use crate::coord::{Geographic, Projected};
pub use crate::ellipsoid::Ellipsoid;
pub use crate::error::{Conversion, Error, Outcome, Warning, WarningMask};
pub use crate::geodetic::{Datum, GeodeticPath, GeodeticStep, IterationPolicy};
pub use crate::projection::{DomainStatus, Projection, ResolvedCoordSystem};
pub use crate::transform::Transform;
