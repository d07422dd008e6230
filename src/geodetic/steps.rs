use std::sync::Arc;
use tracing::{debug, warn};

use crate::coord::{Geographic, normalize_lng};
use crate::dictionary::{GeodeticTransformDef, ShiftMethod, TransformMethod};
use crate::ellipsoid::Ellipsoid;
use crate::error::{Conversion, Error, Outcome, Warning};
use crate::grid::{CorrectionValue, GridCatalog, GridKind, OutOfCoveragePolicy};

use super::{Datum, IterationPolicy};

const ARC_SECONDS: f64 = 3600.0;

/// Seven parameter similarity transformation of earth-centred coordinates,
/// position vector convention.
#[derive(Debug, Clone, PartialEq)]
pub struct Helmert {
    translation: [f64; 3],
    matrix: [[f64; 3]; 3],
    inverse: [[f64; 3]; 3],
}

impl Helmert {
    /// Translation in metres, rotations in arc-seconds, scale in ppm.
    pub fn new(translation: [f64; 3], rotation: [f64; 3], scale_ppm: f64) -> Result<Self, Error> {
        let [rx, ry, rz] = rotation.map(|r| (r / ARC_SECONDS).to_radians());
        let m = 1.0 + scale_ppm * 1e-6;
        let matrix = [
            [m, -m * rz, m * ry],
            [m * rz, m, -m * rx],
            [-m * ry, m * rx, m],
        ];
        let inverse = invert3(&matrix).ok_or_else(|| {
            Error::Configuration(format!(
                "rotation {rotation:?} with scale {scale_ppm} ppm is singular"
            ))
        })?;
        if !translation.iter().all(|t| t.is_finite()) {
            return Err(Error::Configuration(format!(
                "non-finite translation {translation:?}"
            )));
        }
        Ok(Helmert {
            translation,
            matrix,
            inverse,
        })
    }

    pub fn translation(translation: [f64; 3]) -> Result<Self, Error> {
        Self::new(translation, [0.0; 3], 0.0)
    }

    pub fn apply(&self, xyz: [f64; 3]) -> [f64; 3] {
        let r = mul3(&self.matrix, xyz);
        [
            r[0] + self.translation[0],
            r[1] + self.translation[1],
            r[2] + self.translation[2],
        ]
    }

    /// Exact inverse of [`Helmert::apply`].
    pub fn unapply(&self, xyz: [f64; 3]) -> [f64; 3] {
        let t = self.translation;
        mul3(&self.inverse, [xyz[0] - t[0], xyz[1] - t[1], xyz[2] - t[2]])
    }
}

fn mul3(m: &[[f64; 3]; 3], v: [f64; 3]) -> [f64; 3] {
    m.map(|row| row[0] * v[0] + row[1] * v[1] + row[2] * v[2])
}

fn invert3(m: &[[f64; 3]; 3]) -> Option<[[f64; 3]; 3]> {
    let c = |r: usize, k: usize| {
        let (r1, r2) = ((r + 1) % 3, (r + 2) % 3);
        let (k1, k2) = ((k + 1) % 3, (k + 2) % 3);
        m[r1][k1] * m[r2][k2] - m[r1][k2] * m[r2][k1]
    };
    let det = m[0][0] * c(0, 0) + m[0][1] * c(0, 1) + m[0][2] * c(0, 2);
    if !det.is_finite() || det.abs() < 1e-12 {
        return None;
    }
    let mut inv = [[0.0; 3]; 3];
    for (r, row) in inv.iter_mut().enumerate() {
        for (k, v) in row.iter_mut().enumerate() {
            *v = c(k, r) / det;
        }
    }
    Some(inv)
}

/// Geographic to cartesian on one ellipsoid, shift, and back on another.
#[derive(Debug, Clone, PartialEq)]
pub struct Geocentric {
    src: Ellipsoid,
    trg: Ellipsoid,
    helmert: Helmert,
    policy: IterationPolicy,
}

impl Geocentric {
    pub fn new(src: Ellipsoid, trg: Ellipsoid, helmert: Helmert) -> Self {
        Geocentric {
            src,
            trg,
            helmert,
            policy: IterationPolicy::GEOCENTRIC,
        }
    }

    fn forward(&self, p: &Geographic) -> Conversion<Geographic> {
        let xyz = self.helmert.apply(self.src.cartesian(p)?);
        self.trg.geographic(xyz, &self.policy)
    }

    fn inverse(&self, p: &Geographic) -> Conversion<Geographic> {
        let xyz = self.helmert.unapply(self.trg.cartesian(p)?);
        self.src.geographic(xyz, &self.policy)
    }
}

/// Standard Molodensky formulae.
#[derive(Debug, Clone, PartialEq)]
pub struct Molodensky {
    src: Ellipsoid,
    delta: [f64; 3],
    da: f64,
    df: f64,
    policy: IterationPolicy,
}

impl Molodensky {
    pub fn new(src: Ellipsoid, trg: Ellipsoid, delta: [f64; 3]) -> Self {
        Molodensky {
            src,
            delta,
            da: trg.a - src.a,
            df: trg.f - src.f,
            policy: IterationPolicy::FIXED_POINT,
        }
    }

    pub fn with_policy(mut self, policy: IterationPolicy) -> Self {
        self.policy = policy;
        self
    }

    fn shift(&self, p: &Geographic) -> Result<Geographic, Error> {
        let e = &self.src;
        if !p.is_finite() || p.hgt <= -0.5 * e.b() {
            return Err(Error::Range(format!(
                "height {} is outside the Molodensky domain",
                p.hgt
            )));
        }
        let [tx, ty, tz] = self.delta;
        let (a, b, e2) = (e.a, e.b(), e.e2());
        let (phi, lam) = (p.lat.to_radians(), p.lng.to_radians());
        let (sphi, cphi) = phi.sin_cos();
        let (slam, clam) = lam.sin_cos();
        let rho = e.meridional_radius(phi);
        let nu = e.prime_vertical_radius(phi);

        let dphi = (-tx * sphi * clam - ty * sphi * slam
            + tz * cphi
            + self.da * nu * e2 * sphi * cphi / a
            + self.df * (rho * a / b + nu * b / a) * sphi * cphi)
            / (rho + p.hgt);
        let dlam = if cphi.abs() < 1e-12 {
            0.0
        } else {
            (-tx * slam + ty * clam) / ((nu + p.hgt) * cphi)
        };
        let dh = tx * cphi * clam + ty * cphi * slam + tz * sphi - self.da * a / nu
            + self.df * (b / a) * nu * sphi * sphi;
        Ok(Geographic::with_height(
            p.lng + dlam.to_degrees(),
            p.lat + dphi.to_degrees(),
            p.hgt + dh,
        ))
    }

    fn forward(&self, p: &Geographic) -> Conversion<Geographic> {
        Ok(Outcome::ok(self.shift(p)?))
    }

    fn inverse(&self, p: &Geographic) -> Conversion<Geographic> {
        self.policy.invert(*p, |g| self.shift(g))
    }
}

/// Where to go when a spatially varying step has no data for a point.
#[derive(Debug, Clone)]
pub struct Coverage {
    fallback: Option<(String, Box<GeodeticStep>)>,
    policy: OutOfCoveragePolicy,
}

impl Coverage {
    pub fn new(policy: OutOfCoveragePolicy) -> Self {
        Coverage {
            fallback: None,
            policy,
        }
    }

    /// Substitute `step`, named `technique`, wherever the precise data is missing.
    pub fn with_fallback(mut self, technique: &str, step: GeodeticStep) -> Self {
        self.fallback = Some((technique.to_string(), Box::new(step)));
        self
    }

    pub fn fallback(&self) -> Option<&str> {
        self.fallback.as_ref().map(|(name, _)| name.as_str())
    }

    fn uncovered(&self, p: &Geographic, inverse: bool, what: String) -> Conversion<Geographic> {
        match &self.fallback {
            Some((technique, step)) => {
                debug!(%technique, lng = p.lng, lat = p.lat, "applying fallback technique");
                Ok(step.run(p, inverse)?.with(Warning::FallbackApplied {
                    technique: technique.clone(),
                }))
            }
            None => {
                if self.policy == OutOfCoveragePolicy::Fatal {
                    warn!(lng = p.lng, lat = p.lat, %what, "no correction data and no fallback");
                }
                self.policy.uncovered(*p, what)
            }
        }
    }
}

/// Latitude and longitude shifts as cubic polynomials of normalised offsets from an
/// origin.
#[derive(Debug, Clone)]
pub struct MultipleRegression {
    /// (lat, lng), degrees
    origin: [f64; 2],
    scale: f64,
    lat: [f64; crate::dictionary::MREG_TERMS],
    lng: [f64; crate::dictionary::MREG_TERMS],
    /// ([lng, lat] min, [lng, lat] max)
    range: Option<([f64; 2], [f64; 2])>,
    coverage: Coverage,
    policy: IterationPolicy,
}

impl MultipleRegression {
    pub fn from_def(def: &GeodeticTransformDef, coverage: Coverage) -> Result<Self, Error> {
        if !(def.mreg_scale.is_finite() && def.mreg_scale != 0.0) {
            return Err(Error::Configuration(format!(
                "transformation `{}` has normalising factor {}",
                def.key_nm, def.mreg_scale
            )));
        }
        Ok(MultipleRegression {
            origin: def.mreg_origin,
            scale: def.mreg_scale,
            lat: def.mreg_lat,
            lng: def.mreg_lng,
            range: def.has_range().then_some((def.rng_min, def.rng_max)),
            coverage,
            policy: IterationPolicy::or_default(def.max_iterations, def.convergence, def.error_threshold),
        })
    }

    fn covers(&self, p: &Geographic) -> bool {
        self.range.is_none_or(|(min, max)| {
            (min[0]..=max[0]).contains(&p.lng) && (min[1]..=max[1]).contains(&p.lat)
        })
    }

    fn shift(&self, p: &Geographic) -> Geographic {
        let u = self.scale * (p.lat - self.origin[0]);
        let v = self.scale * (p.lng - self.origin[1]);
        let terms = [
            1.0,
            u,
            v,
            u * u,
            u * v,
            v * v,
            u * u * u,
            u * u * v,
            u * v * v,
            v * v * v,
        ];
        let sum = |c: &[f64]| c.iter().zip(terms).map(|(c, t)| c * t).sum::<f64>();
        Geographic::with_height(
            p.lng + sum(&self.lng) / ARC_SECONDS,
            p.lat + sum(&self.lat) / ARC_SECONDS,
            p.hgt,
        )
    }

    fn forward(&self, p: &Geographic) -> Conversion<Geographic> {
        if !self.covers(p) {
            return self.coverage.uncovered(p, false, outside("regression range", p));
        }
        Ok(Outcome::ok(self.shift(p)))
    }

    fn inverse(&self, p: &Geographic) -> Conversion<Geographic> {
        if !self.covers(p) {
            return self.coverage.uncovered(p, true, outside("regression range", p));
        }
        self.policy.invert(*p, |g| Ok(self.shift(g)))
    }
}

/// Shifts interpolated from the grids of a catalog.
#[derive(Debug, Clone)]
pub struct GridShift {
    catalog: Arc<GridCatalog>,
    coverage: Coverage,
    policy: IterationPolicy,
}

impl GridShift {
    pub fn new(catalog: Arc<GridCatalog>, coverage: Coverage, policy: IterationPolicy) -> Result<Self, Error> {
        if catalog.kind() == Some(GridKind::Geoid) {
            return Err(Error::Configuration(format!(
                "{} holds geoid heights, not datum shifts",
                catalog.path().display()
            )));
        }
        Ok(GridShift {
            catalog,
            coverage,
            policy,
        })
    }

    pub fn catalog(&self) -> &Arc<GridCatalog> {
        &self.catalog
    }

    fn shift(&self, p: &Geographic) -> Result<Option<Geographic>, Error> {
        Ok(match self.catalog.query(p.lng, p.lat)? {
            Some(CorrectionValue::Shift { dlng, dlat }) => Some(Geographic::with_height(
                p.lng + dlng / ARC_SECONDS,
                p.lat + dlat / ARC_SECONDS,
                p.hgt,
            )),
            _ => None,
        })
    }

    fn forward(&self, p: &Geographic) -> Conversion<Geographic> {
        match self.shift(p)? {
            Some(shifted) => Ok(Outcome::ok(shifted)),
            None => self.coverage.uncovered(p, false, outside("grid coverage", p)),
        }
    }

    fn inverse(&self, p: &Geographic) -> Conversion<Geographic> {
        if !self.catalog.covers(p.lng, p.lat) {
            return self.coverage.uncovered(p, true, outside("grid coverage", p));
        }
        // Guesses straying off the grid edge are taken as unshifted.
        self.policy
            .invert(*p, |g| Ok(self.shift(g)?.unwrap_or(*g)))
    }
}

fn outside(what: &str, p: &Geographic) -> String {
    format!("({}, {}) is outside the {what}", p.lng, p.lat)
}

/// One elementary datum transformation.
#[derive(Debug, Clone)]
pub enum GeodeticStep {
    /// Datums that differ in name only.
    Null,
    GeocentricTranslation(Geocentric),
    Molodensky(Molodensky),
    BursaWolf(Geocentric),
    MultipleRegression(MultipleRegression),
    GridInterpolation(GridShift),
}

impl GeodeticStep {
    /// The step taking `datum` to the hub frame its own shift parameters refer to, or
    /// `None` when the datum carries no shift.
    pub fn to_hub(datum: &Datum, hub: &Datum) -> Result<Option<Self>, Error> {
        if datum.is(hub.key()) {
            return Ok(Some(GeodeticStep::Null));
        }
        let def = &datum.def;
        let (src, trg) = (datum.ellipsoid, hub.ellipsoid);
        Ok(Some(match def.shift_method()? {
            ShiftMethod::None => return Ok(None),
            ShiftMethod::GeocentricTranslation => {
                GeodeticStep::GeocentricTranslation(Geocentric::new(src, trg, Helmert::translation(def.delta)?))
            }
            ShiftMethod::Molodensky => GeodeticStep::Molodensky(Molodensky::new(src, trg, def.delta)),
            ShiftMethod::BursaWolf => GeodeticStep::BursaWolf(Geocentric::new(
                src,
                trg,
                Helmert::new(def.delta, def.rotation, def.bwscale)?,
            )),
        }))
    }

    /// Build a dictionary transformation between two resolved datums.
    ///
    /// Grid steps need their catalog already loaded; both spatially varying methods
    /// take their out-of-coverage behaviour from `coverage`.
    pub fn from_def(
        def: &GeodeticTransformDef,
        src: &Datum,
        trg: &Datum,
        catalog: Option<Arc<GridCatalog>>,
        coverage: Coverage,
    ) -> Result<Self, Error> {
        let policy = IterationPolicy::or_default(def.max_iterations, def.convergence, def.error_threshold);
        let (se, te) = (src.ellipsoid, trg.ellipsoid);
        Ok(match def.method()? {
            TransformMethod::Null => GeodeticStep::Null,
            TransformMethod::GeocentricTranslation => {
                GeodeticStep::GeocentricTranslation(Geocentric::new(se, te, Helmert::translation(def.delta)?))
            }
            TransformMethod::Molodensky => {
                GeodeticStep::Molodensky(Molodensky::new(se, te, def.delta).with_policy(policy))
            }
            TransformMethod::BursaWolf => GeodeticStep::BursaWolf(Geocentric::new(
                se,
                te,
                Helmert::new(def.delta, def.rotation, def.bwscale)?,
            )),
            TransformMethod::MultipleRegression => {
                GeodeticStep::MultipleRegression(MultipleRegression::from_def(def, coverage)?)
            }
            TransformMethod::GridInterpolation => {
                let catalog = catalog.ok_or_else(|| {
                    Error::Configuration(format!(
                        "grid transformation `{}` has no catalog loaded",
                        def.key_nm
                    ))
                })?;
                GeodeticStep::GridInterpolation(GridShift::new(catalog, coverage, policy)?)
            }
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            GeodeticStep::Null => "null",
            GeodeticStep::GeocentricTranslation(_) => "geocentric translation",
            GeodeticStep::Molodensky(_) => "Molodensky",
            GeodeticStep::BursaWolf(_) => "Bursa-Wolf",
            GeodeticStep::MultipleRegression(_) => "multiple regression",
            GeodeticStep::GridInterpolation(_) => "grid interpolation",
        }
    }

    pub fn forward(&self, p: &Geographic) -> Conversion<Geographic> {
        let out = match self {
            GeodeticStep::Null => Ok(Outcome::ok(*p)),
            GeodeticStep::GeocentricTranslation(g) | GeodeticStep::BursaWolf(g) => g.forward(p),
            GeodeticStep::Molodensky(m) => m.forward(p),
            GeodeticStep::MultipleRegression(m) => m.forward(p),
            GeodeticStep::GridInterpolation(g) => g.forward(p),
        }?;
        Ok(out.map(wrap))
    }

    pub fn inverse(&self, p: &Geographic) -> Conversion<Geographic> {
        let out = match self {
            GeodeticStep::Null => Ok(Outcome::ok(*p)),
            GeodeticStep::GeocentricTranslation(g) | GeodeticStep::BursaWolf(g) => g.inverse(p),
            GeodeticStep::Molodensky(m) => m.inverse(p),
            GeodeticStep::MultipleRegression(m) => m.inverse(p),
            GeodeticStep::GridInterpolation(g) => g.inverse(p),
        }?;
        Ok(out.map(wrap))
    }

    pub(crate) fn run(&self, p: &Geographic, inverse: bool) -> Conversion<Geographic> {
        if inverse {
            self.inverse(p)
        } else {
            self.forward(p)
        }
    }
}

fn wrap(mut p: Geographic) -> Geographic {
    p.lng = normalize_lng(p.lng);
    p
}
