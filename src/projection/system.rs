use tracing::debug;

use crate::coord::{Geographic, Projected};
use crate::dictionary::{CoordSystemDef, Dictionary, EllipsoidDef};
use crate::ellipsoid::Ellipsoid;
use crate::error::{Conversion, Error, Warning};
use crate::geodetic::Datum;
use crate::units::{self, Unit, UnitKind};

use super::{Method, Projection, ProjectionSetup, Projector};

/// How much of a point set a coordinate system can represent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainStatus {
    Inside,
    /// Some points fall outside; `outside` counts them.
    Partial { outside: usize },
    Outside,
}

/// A coordinate system definition bound to its datum, ellipsoid, unit and projection.
///
/// Immutable once built; the engine hands these out behind an `Arc`.
#[derive(Debug, Clone)]
pub struct ResolvedCoordSystem {
    def: CoordSystemDef,
    datum: Option<Datum>,
    ellipsoid: Ellipsoid,
    unit: &'static Unit,
    method: &'static Method,
    projector: Projector,
}

impl ResolvedCoordSystem {
    /// Bind a definition to an already resolved datum (or bare ellipsoid).
    pub fn new(def: CoordSystemDef, datum: Option<Datum>, ellipsoid: Ellipsoid) -> Result<Self, Error> {
        let method = super::method(&def.prj_knm).ok_or_else(|| {
            Error::Configuration(format!(
                "coordinate system `{}` uses unknown projection `{}`",
                def.key_nm, def.prj_knm
            ))
        })?;
        let unit = units::lookup(&def.unit).ok_or_else(|| {
            Error::Configuration(format!(
                "coordinate system `{}` uses unknown unit `{}`",
                def.key_nm, def.unit
            ))
        })?;
        let expected = if method.geographic {
            UnitKind::Angular
        } else {
            UnitKind::Linear
        };
        if unit.kind != expected {
            return Err(Error::Configuration(format!(
                "coordinate system `{}`: {} cannot be expressed in {}",
                def.key_nm, method.key, unit.name
            )));
        }
        if !(-4..=4).contains(&def.quad) {
            return Err(Error::Configuration(format!(
                "coordinate system `{}` has invalid quadrant {}",
                def.key_nm, def.quad
            )));
        }
        let (scale, scaled) = if method.geographic {
            (1.0 / unit.factor, ellipsoid)
        } else {
            if !(def.map_scl.is_finite() && def.map_scl > 0.0) {
                return Err(Error::Configuration(format!(
                    "coordinate system `{}` has invalid map scale {}",
                    def.key_nm, def.map_scl
                )));
            }
            let scale = 1.0 / (unit.factor * def.map_scl);
            (scale, Ellipsoid::new(ellipsoid.a * scale, ellipsoid.f))
        };
        let projector = method.build(&ProjectionSetup {
            def: &def,
            ellipsoid: scaled,
            scale,
        })?;
        Ok(ResolvedCoordSystem {
            def,
            datum,
            ellipsoid,
            unit,
            method,
            projector,
        })
    }

    /// Load a coordinate system and everything it references from a dictionary.
    pub fn resolve(dict: &Dictionary, key: &str) -> Result<Self, Error> {
        let def: CoordSystemDef = dict.load(key)?;
        let (datum, ellipsoid) = if def.is_geodetic() {
            let datum = Datum::resolve(dict, &def.dat_knm)?;
            let ellipsoid = datum.ellipsoid;
            (Some(datum), ellipsoid)
        } else {
            let elp: EllipsoidDef = dict.load(&def.elp_knm)?;
            (None, Ellipsoid::from_def(&elp)?)
        };
        debug!(
            key = %def.key_nm,
            method = %def.prj_knm,
            datum = datum.as_ref().map(Datum::key),
            "resolved coordinate system"
        );
        Self::new(def, datum, ellipsoid)
    }

    pub fn key(&self) -> &str {
        &self.def.key_nm
    }

    pub fn def(&self) -> &CoordSystemDef {
        &self.def
    }

    /// `None` for systems referenced to a bare ellipsoid.
    pub fn datum(&self) -> Option<&Datum> {
        self.datum.as_ref()
    }

    /// The ellipsoid in metres.
    pub fn ellipsoid(&self) -> &Ellipsoid {
        &self.ellipsoid
    }

    pub fn unit(&self) -> &'static Unit {
        self.unit
    }

    pub fn method(&self) -> &'static Method {
        self.method
    }

    pub fn projection(&self) -> &Projector {
        &self.projector
    }

    pub fn is_geographic(&self) -> bool {
        self.method.geographic
    }

    /// Geographic to system coordinates; the height passes through as `z`.
    pub fn forward(&self, ll: &Geographic) -> Conversion<Projected> {
        check_geographic(ll)?;
        let mut out = self.projector.forward(ll)?;
        let (x, y) = self.orient(out.value.x, out.value.y);
        out.value = Projected::with_z(x, y, ll.hgt);
        if !self.in_useful_range(ll) {
            out.warnings.push(Warning::OutsideUsefulRange);
        }
        Ok(out)
    }

    /// System coordinates to geographic; `z` passes through as the height.
    pub fn inverse(&self, xy: &Projected) -> Conversion<Geographic> {
        if !(xy.x.is_finite() && xy.y.is_finite() && xy.z.is_finite()) {
            return Err(Error::Range(format!(
                "non-finite coordinate ({}, {}, {})",
                xy.x, xy.y, xy.z
            )));
        }
        let (x, y) = self.unorient(xy.x, xy.y);
        let mut out = self.projector.inverse(&Projected::new(x, y))?;
        out.value.hgt = xy.z;
        if !self.in_useful_range(&out.value) {
            out.warnings.push(Warning::OutsideUsefulRange);
        }
        Ok(out)
    }

    pub fn point_scale(&self, ll: &Geographic) -> Result<f64, Error> {
        check_geographic(ll)?;
        self.projector.point_scale(ll)
    }

    pub fn meridian_scale(&self, ll: &Geographic) -> Result<f64, Error> {
        check_geographic(ll)?;
        self.projector.meridian_scale(ll)
    }

    /// Grid convergence in degrees.
    pub fn convergence(&self, ll: &Geographic) -> Result<f64, Error> {
        check_geographic(ll)?;
        self.projector.convergence(ll)
    }

    /// Whether `ll` lies within the definition's useful range; unbounded if none is set.
    pub fn in_useful_range(&self, ll: &Geographic) -> bool {
        if !self.def.has_useful_range() {
            return true;
        }
        let ([lng_min, lat_min], [lng_max, lat_max]) = (self.def.ll_min, self.def.ll_max);
        let lng_ok = if lng_min <= lng_max {
            (lng_min..=lng_max).contains(&ll.lng)
        } else {
            // range straddles the antimeridian
            ll.lng >= lng_min || ll.lng <= lng_max
        };
        lng_ok && (lat_min..=lat_max).contains(&ll.lat)
    }

    /// Count the points the projection's formulas or the useful range exclude.
    pub fn check_domain(&self, points: &[Geographic]) -> DomainStatus {
        let outside = points
            .iter()
            .filter(|p| !(p.is_finite() && self.projector.in_domain(p) && self.in_useful_range(p)))
            .count();
        match outside {
            0 => DomainStatus::Inside,
            n if n == points.len() => DomainStatus::Outside,
            n => DomainStatus::Partial { outside: n },
        }
    }

    /// Apply the quadrant flag about the false origin, then the zero thresholds.
    fn orient(&self, x: f64, y: f64) -> (f64, f64) {
        let (x0, y0) = self.projector.false_origin();
        let (sx, sy) = self.flips();
        let (mut x, mut y) = (x0 + sx * (x - x0), y0 + sy * (y - y0));
        if self.def.quad < 0 {
            (x, y) = (y, x);
        }
        let [zx, zy] = self.def.zero;
        if zx > 0.0 && x.abs() < zx {
            x = 0.0;
        }
        if zy > 0.0 && y.abs() < zy {
            y = 0.0;
        }
        (x, y)
    }

    fn unorient(&self, x: f64, y: f64) -> (f64, f64) {
        let (x, y) = if self.def.quad < 0 { (y, x) } else { (x, y) };
        let (x0, y0) = self.projector.false_origin();
        let (sx, sy) = self.flips();
        (x0 + sx * (x - x0), y0 + sy * (y - y0))
    }

    fn flips(&self) -> (f64, f64) {
        match self.def.quad.abs() {
            2 => (-1.0, 1.0),
            3 => (-1.0, -1.0),
            4 => (1.0, -1.0),
            _ => (1.0, 1.0),
        }
    }
}

fn check_geographic(ll: &Geographic) -> Result<(), Error> {
    if !ll.is_finite() {
        return Err(Error::Range(format!(
            "non-finite coordinate ({}, {}, {})",
            ll.lng, ll.lat, ll.hgt
        )));
    }
    if ll.lat.abs() > 90.0 {
        return Err(Error::Range(format!("latitude {} beyond the pole", ll.lat)));
    }
    Ok(())
}
