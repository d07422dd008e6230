use crate::coord::{Geographic, Projected, normalize_lng};
use crate::ellipsoid::Ellipsoid;
use crate::error::{Conversion, Error, Outcome};

use super::math::{authalic_q, lat_from_authalic_q};
use super::{Projection, ProjectionSetup};

/// Albers equal-area conic (Snyder 14-1 to 14-21).
#[derive(Debug, Clone)]
pub struct AlbersEqualArea {
    ellipsoid: Ellipsoid,
    lng0: f64,
    x0: f64,
    y0: f64,
    e: f64,
    n: f64,
    c: f64,
    rho0: f64,
    /// q at the pole
    qp: f64,
}

impl AlbersEqualArea {
    pub fn new(
        ellipsoid: Ellipsoid,
        origin: (f64, f64),
        parallels: (f64, f64),
        false_origin: (f64, f64),
    ) -> Result<Self, Error> {
        let e = ellipsoid.e();
        let (phi1, phi2) = (parallels.0.to_radians(), parallels.1.to_radians());
        let m = |phi: f64| {
            let s = e * phi.sin();
            phi.cos() / (1.0 - s * s).sqrt()
        };
        let (m1, m2) = (m(phi1), m(phi2));
        let (q1, q2) = (authalic_q(phi1.sin(), e), authalic_q(phi2.sin(), e));
        let n = if (phi1 - phi2).abs() < 1e-10 {
            phi1.sin()
        } else {
            (m1 * m1 - m2 * m2) / (q2 - q1)
        };
        if !n.is_finite() || n.abs() < 1e-10 {
            return Err(Error::Configuration(format!(
                "standard parallels {} and {} define no cone",
                parallels.0, parallels.1
            )));
        }
        let mut albers = AlbersEqualArea {
            ellipsoid,
            lng0: origin.0,
            x0: false_origin.0,
            y0: false_origin.1,
            e,
            n,
            c: m1 * m1 + n * q1,
            rho0: 0.0,
            qp: authalic_q(1.0, e),
        };
        albers.rho0 = albers.rho(origin.1)?;
        Ok(albers)
    }

    pub(crate) fn from_setup(setup: &ProjectionSetup<'_>) -> Result<Self, Error> {
        let lng0 = setup.longitude("central meridian", setup.org_lng())?;
        let lat0 = setup.latitude("origin latitude", setup.org_lat())?;
        let phi1 = setup.latitude("standard parallel", setup.prm(1))?;
        let phi2 = setup.latitude("standard parallel", setup.prm(2))?;
        Self::new(setup.ellipsoid, (lng0, lat0), (phi1, phi2), setup.false_origin())
            .map_err(|e| setup.config_error(e))
    }

    fn rho(&self, lat: f64) -> Result<f64, Error> {
        let q = authalic_q(lat.to_radians().sin(), self.e);
        let radicand = self.c - self.n * q;
        if radicand < 0.0 {
            return Err(Error::Range(format!(
                "latitude {lat} has no radius on this cone"
            )));
        }
        Ok(self.ellipsoid.a * radicand.sqrt() / self.n)
    }
}

impl Projection for AlbersEqualArea {
    fn ellipsoid(&self) -> &Ellipsoid {
        &self.ellipsoid
    }

    fn false_origin(&self) -> (f64, f64) {
        (self.x0, self.y0)
    }

    fn forward(&self, ll: &Geographic) -> Conversion<Projected> {
        let theta = self.n * normalize_lng(ll.lng - self.lng0).to_radians();
        let rho = self.rho(ll.lat)?;
        Ok(Outcome::ok(Projected::new(
            self.x0 + rho * theta.sin(),
            self.y0 + self.rho0 - rho * theta.cos(),
        )))
    }

    fn inverse(&self, xy: &Projected) -> Conversion<Geographic> {
        let sign = self.n.signum();
        let dx = xy.x - self.x0;
        let dy = self.rho0 - (xy.y - self.y0);
        if !(dx.is_finite() && dy.is_finite()) {
            return Err(Error::Range("non-finite projected coordinate".into()));
        }
        let rho = dx.hypot(dy);
        let theta = (sign * dx).atan2(sign * dy);
        let rn = rho * self.n / self.ellipsoid.a;
        let q = (self.c - rn * rn) / self.n;
        // Tolerate rounding at the polar edge of the annulus, nothing more.
        if q.abs() > self.qp.abs() * (1.0 + 1e-9) {
            return Err(Error::Range(format!(
                "({}, {}) lies outside the Albers annulus",
                xy.x, xy.y
            )));
        }
        Ok(Outcome::ok(Geographic::new(
            normalize_lng(self.lng0 + (theta / self.n).to_degrees()),
            lat_from_authalic_q(q, self.qp, self.e).to_degrees(),
        )))
    }

    fn point_scale(&self, ll: &Geographic) -> Result<f64, Error> {
        let lat = ll.lat.to_radians();
        let m = lat.cos() * self.ellipsoid.prime_vertical_radius(lat) / self.ellipsoid.a;
        if m.abs() < 1e-12 {
            return Err(Error::Range("parallel scale is undefined at the pole".into()));
        }
        Ok((self.n * self.rho(ll.lat)?).abs() / (self.ellipsoid.a * m))
    }

    /// Equal area: h·k = 1.
    fn meridian_scale(&self, ll: &Geographic) -> Result<f64, Error> {
        Ok(1.0 / self.point_scale(ll)?)
    }

    fn convergence(&self, ll: &Geographic) -> Result<f64, Error> {
        Ok(self.n * normalize_lng(ll.lng - self.lng0))
    }
}
