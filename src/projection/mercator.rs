use crate::coord::{Geographic, Projected, normalize_lng};
use crate::ellipsoid::Ellipsoid;
use crate::error::{Conversion, Error, Outcome, Warning};

use super::math::{from_isometric, isometric};
use super::{Projection, ProjectionSetup};

/// Latitudes beyond this are clamped; the northing diverges at the pole.
const LAT_LIMIT: f64 = 89.999;

/// Normal-aspect Mercator on the ellipsoid, one standard parallel form.
#[derive(Debug, Clone)]
pub struct Mercator {
    ellipsoid: Ellipsoid,
    lng0: f64,
    k0: f64,
    x0: f64,
    y0: f64,
    es: f64,
}

impl Mercator {
    pub fn new(ellipsoid: Ellipsoid, lng0: f64, k0: f64, false_origin: (f64, f64)) -> Self {
        Mercator {
            ellipsoid,
            lng0,
            k0,
            x0: false_origin.0,
            y0: false_origin.1,
            es: ellipsoid.e(),
        }
    }

    pub(crate) fn from_setup(setup: &ProjectionSetup<'_>) -> Result<Self, Error> {
        let lng0 = setup.longitude("central meridian", setup.org_lng())?;
        let k0 = setup.scale_reduction()?;
        Ok(Self::new(setup.ellipsoid, lng0, k0, setup.false_origin()))
    }

    fn ak0(&self) -> f64 {
        self.ellipsoid.a * self.k0
    }
}

impl Projection for Mercator {
    fn ellipsoid(&self) -> &Ellipsoid {
        &self.ellipsoid
    }

    fn false_origin(&self) -> (f64, f64) {
        (self.x0, self.y0)
    }

    fn forward(&self, ll: &Geographic) -> Conversion<Projected> {
        let mut warnings = Vec::new();
        let mut lat = ll.lat;
        if lat.abs() > LAT_LIMIT {
            lat = LAT_LIMIT.copysign(lat);
            warnings.push(Warning::OutOfDomain(format!(
                "Mercator latitude {} clamped to {lat}",
                ll.lat
            )));
        }
        let dlng = normalize_lng(ll.lng - self.lng0).to_radians();
        let psi = isometric(lat.to_radians(), self.es);
        Ok(Outcome {
            value: Projected::new(self.x0 + self.ak0() * dlng, self.y0 + self.ak0() * psi),
            warnings,
        })
    }

    fn inverse(&self, xy: &Projected) -> Conversion<Geographic> {
        let dlng = ((xy.x - self.x0) / self.ak0()).to_degrees();
        let psi = (xy.y - self.y0) / self.ak0();
        if !(dlng.is_finite() && psi.is_finite()) {
            return Err(Error::Range("non-finite projected coordinate".into()));
        }
        Ok(Outcome::ok(Geographic::new(
            normalize_lng(dlng + self.lng0),
            from_isometric(psi, self.es).to_degrees(),
        )))
    }

    fn in_domain(&self, ll: &Geographic) -> bool {
        ll.lng.is_finite() && ll.lat.abs() <= LAT_LIMIT
    }

    fn point_scale(&self, ll: &Geographic) -> Result<f64, Error> {
        let lat = ll.lat.clamp(-LAT_LIMIT, LAT_LIMIT).to_radians();
        let (s, c) = lat.sin_cos();
        let e2 = self.ellipsoid.e2();
        Ok(self.k0 * (1.0 - e2 * s * s).sqrt() / c)
    }

    fn meridian_scale(&self, ll: &Geographic) -> Result<f64, Error> {
        self.point_scale(ll)
    }

    fn convergence(&self, _: &Geographic) -> Result<f64, Error> {
        Ok(0.0)
    }
}
