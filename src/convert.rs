use num_traits::Float;
use std::fmt::Debug;
use std::sync::Arc;

use crate::coord::Projected;
use crate::error::{Conversion, Error, Outcome, Warning, WarningMask};
use crate::geodetic::GeodeticPath;
use crate::projection::ResolvedCoordSystem;

/// Numeric types a [`Coord`] may be built from.
pub trait CoordinateType: Float + Copy + PartialOrd + Debug {}
impl<T: Float + Copy + PartialOrd + Debug> CoordinateType for T {}

/// A planar point, in whatever units its coordinate system uses.
///
/// Implemented for `(T, T)` and, with the `geo-types` feature, for `geo_types::Coord`
/// and `geo_types::Point`.
pub trait Coord<T>
where
    T: CoordinateType,
{
    fn x(&self) -> T;
    fn y(&self) -> T;
    fn from_xy(x: T, y: T) -> Self;
}

impl<T: CoordinateType> Coord<T> for (T, T) {
    fn x(&self) -> T {
        self.0
    }
    fn y(&self) -> T {
        self.1
    }
    fn from_xy(x: T, y: T) -> Self {
        (x, y)
    }
}

/// Converts points from one activated coordinate system to another.
///
/// The source system's inverse yields geographic coordinates on the source datum, the
/// geodetic path carries them to the target datum, and the target system's forward
/// projection finishes the job. Warnings from every stage are collected, less the
/// kinds the engine suppresses.
#[derive(Debug, Clone)]
pub struct Converter {
    source: Arc<ResolvedCoordSystem>,
    target: Arc<ResolvedCoordSystem>,
    path: Arc<GeodeticPath>,
    mask: WarningMask,
}

impl Converter {
    pub fn new(
        source: Arc<ResolvedCoordSystem>,
        target: Arc<ResolvedCoordSystem>,
        path: Arc<GeodeticPath>,
        mask: WarningMask,
    ) -> Self {
        Converter {
            source,
            target,
            path,
            mask,
        }
    }

    pub fn source(&self) -> &ResolvedCoordSystem {
        &self.source
    }

    pub fn target(&self) -> &ResolvedCoordSystem {
        &self.target
    }

    pub fn path(&self) -> &GeodeticPath {
        &self.path
    }

    /// Convert one point; `z` travels as ellipsoidal height.
    pub fn convert_point(&self, point: &Projected) -> Conversion<Projected> {
        let out = self
            .source
            .inverse(point)?
            .and_then(|ll| self.path.apply_forward(&ll))?
            .and_then(|ll| self.target.forward(&ll))?;
        Ok(self.mask.apply(out))
    }

    /// Convert any [`Coord`].
    ///
    /// ```
    /// use geoconv::{Engine, EngineConfig};
    /// use geoconv::dictionary::{CoordSystemDef, DatumDef, EllipsoidDef};
    ///
    /// let dir = tempfile::tempdir().unwrap();
    /// let engine = Engine::new(EngineConfig::new(dir.path())).unwrap();
    /// engine.store(&EllipsoidDef::from_flattening("WGS84", 6_378_137.0, 298.257_223_563)).unwrap();
    /// engine.store(&DatumDef::new("WGS84", "WGS84")).unwrap();
    /// engine.store(&CoordSystemDef::new("LL84", "LL", "DEGREE").on_datum("WGS84")).unwrap();
    /// let mut utm = CoordSystemDef::new("UTM84-10N", "UTM", "METER").on_datum("WGS84");
    /// utm.prj_prms[0] = 10.0;
    /// utm.prj_prms[1] = 1.0;
    /// engine.store(&utm).unwrap();
    ///
    /// let converter = engine.converter("LL84", "UTM84-10N").unwrap();
    /// let out = converter.convert((-122.0f64, 45.0f64)).unwrap();
    /// assert!(out.is_clean());
    /// assert!((out.value.0 - 578_815.303).abs() < 1e-3);
    /// assert!((out.value.1 - 4_983_436.768).abs() < 1e-3);
    /// ```
    pub fn convert<C, T>(&self, point: C) -> Conversion<C>
    where
        C: Coord<T>,
        T: CoordinateType,
    {
        let out = self.convert_point(&to_projected(&point)?)?;
        Ok(Outcome {
            value: from_projected(out.value)?,
            warnings: out.warnings,
        })
    }

    /// Convert a slice of points in place.
    ///
    /// Stops at the first fatal error, leaving the points before it converted. Each
    /// distinct warning is reported once.
    pub fn convert_array<'a, C, T>(&self, points: &'a mut [C]) -> Conversion<&'a mut [C]>
    where
        C: Coord<T>,
        T: CoordinateType,
    {
        let mut warnings: Vec<Warning> = Vec::new();
        for point in points.iter_mut() {
            let out = self.convert_point(&to_projected(point)?)?;
            for w in out.warnings {
                if !warnings.contains(&w) {
                    warnings.push(w);
                }
            }
            *point = from_projected(out.value)?;
        }
        Ok(Outcome {
            value: points,
            warnings,
        })
    }
}

fn to_projected<C: Coord<T>, T: CoordinateType>(point: &C) -> Result<Projected, Error> {
    match (point.x().to_f64(), point.y().to_f64()) {
        (Some(x), Some(y)) => Ok(Projected::new(x, y)),
        _ => Err(Error::Range("coordinate is not representable as f64".into())),
    }
}

fn from_projected<C: Coord<T>, T: CoordinateType>(p: Projected) -> Result<C, Error> {
    match (T::from(p.x), T::from(p.y)) {
        (Some(x), Some(y)) => Ok(C::from_xy(x, y)),
        _ => Err(Error::Range(format!(
            "({}, {}) is not representable in the point type",
            p.x, p.y
        ))),
    }
}
