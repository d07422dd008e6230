use crate::coord::{Geographic, Projected, normalize_lng};
use crate::ellipsoid::Ellipsoid;
use crate::error::{Conversion, Error, Outcome};

use super::{Projection, ProjectionSetup};

/// The identity "projection" of geographic systems, in any angular unit.
#[derive(Debug, Clone)]
pub struct Unity {
    ellipsoid: Ellipsoid,
    /// Prime meridian offset (degrees)
    org_lng: f64,
    /// Units per degree
    scale: f64,
    x0: f64,
    y0: f64,
}

impl Unity {
    pub fn new(ellipsoid: Ellipsoid, org_lng: f64, scale: f64) -> Self {
        Unity {
            ellipsoid,
            org_lng,
            scale,
            x0: 0.0,
            y0: 0.0,
        }
    }

    pub(crate) fn from_setup(setup: &ProjectionSetup<'_>) -> Result<Self, Error> {
        let org = setup.org_lng();
        let org_lng = if org.is_finite() {
            setup.longitude("prime meridian", org)?
        } else {
            0.0
        };
        let (x0, y0) = setup.false_origin();
        Ok(Unity {
            x0,
            y0,
            ..Unity::new(setup.ellipsoid, org_lng, setup.scale)
        })
    }
}

impl Projection for Unity {
    fn ellipsoid(&self) -> &Ellipsoid {
        &self.ellipsoid
    }

    fn false_origin(&self) -> (f64, f64) {
        (self.x0, self.y0)
    }

    fn forward(&self, ll: &Geographic) -> Conversion<Projected> {
        let lng = normalize_lng(ll.lng - self.org_lng);
        Ok(Outcome::ok(Projected::new(
            self.x0 + lng * self.scale,
            self.y0 + ll.lat * self.scale,
        )))
    }

    fn inverse(&self, xy: &Projected) -> Conversion<Geographic> {
        let lat = (xy.y - self.y0) / self.scale;
        if lat.abs() > 90.0 + 1e-9 {
            return Err(Error::Range(format!("latitude {lat} beyond the pole")));
        }
        let lng = normalize_lng((xy.x - self.x0) / self.scale + self.org_lng);
        Ok(Outcome::ok(Geographic::new(lng, lat.clamp(-90.0, 90.0))))
    }

    fn point_scale(&self, _: &Geographic) -> Result<f64, Error> {
        Ok(1.0)
    }

    fn meridian_scale(&self, _: &Geographic) -> Result<f64, Error> {
        Ok(1.0)
    }

    fn convergence(&self, _: &Geographic) -> Result<f64, Error> {
        Ok(0.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn grads_with_prime_meridian() {
        // Paris meridian, grads
        let u = Unity::new(Ellipsoid::CLARKE_1866, 2.337_229_166_7, 1.0 / 0.9);
        let p = u.forward(&Geographic::new(3.0, 45.0)).unwrap().value;
        assert_relative_eq!(p.y, 50.0, epsilon = 1e-12);
        assert_relative_eq!(p.x, (3.0 - 2.337_229_166_7) / 0.9, epsilon = 1e-12);
        let back = u.inverse(&p).unwrap().value;
        assert_relative_eq!(back.lng, 3.0, epsilon = 1e-12);
        assert_relative_eq!(back.lat, 45.0, epsilon = 1e-12);
    }

    #[test]
    fn latitude_beyond_pole_is_range_error() {
        let u = Unity::new(Ellipsoid::WGS84, 0.0, 1.0);
        assert!(matches!(
            u.inverse(&Projected::new(0.0, 91.0)),
            Err(Error::Range(_))
        ));
    }
}
