use crate::coord::{Geographic, Projected, normalize_lng};
use crate::ellipsoid::Ellipsoid;
use crate::error::{Conversion, Error, Outcome, Warning};

use super::math::{from_isometric, isometric};
use super::{Projection, ProjectionSetup};

/// Standard parallels closer to a pole than this make the cone degenerate.
const PARALLEL_LIMIT: f64 = 89.99;
/// How close to the pole opposite the apex a latitude may get before it is clamped.
const FAR_POLE_LIMIT: f64 = 89.999;

/// Lambert conformal conic with two standard parallels (Snyder 15-1 to 15-11).
///
/// Radii are computed from the isometric latitude, `ρ = a·F·k0·exp(-n·ψ)`, which is
/// Snyder's `t^n` without the tangent blowing up near the poles.
#[derive(Debug, Clone)]
pub struct LambertConformal {
    ellipsoid: Ellipsoid,
    lng0: f64,
    x0: f64,
    y0: f64,
    es: f64,
    /// Cone constant
    n: f64,
    /// a·F·k0
    af: f64,
    rho0: f64,
}

impl LambertConformal {
    /// Angles in degrees; `k0` is 1 for the usual two-parallel form.
    pub fn new(
        ellipsoid: Ellipsoid,
        origin: (f64, f64),
        parallels: (f64, f64),
        k0: f64,
        false_origin: (f64, f64),
    ) -> Result<Self, Error> {
        let es = ellipsoid.e();
        let (phi1, phi2) = (parallels.0.to_radians(), parallels.1.to_radians());
        let m = |phi: f64| {
            let s = es * phi.sin();
            phi.cos() / (1.0 - s * s).sqrt()
        };
        let (m1, m2) = (m(phi1), m(phi2));
        let (psi1, psi2) = (isometric(phi1, es), isometric(phi2, es));
        let n = if (phi1 - phi2).abs() < 1e-10 {
            phi1.sin()
        } else {
            (m1.ln() - m2.ln()) / (psi2 - psi1)
        };
        if !n.is_finite() || n.abs() < 1e-10 {
            return Err(Error::Configuration(format!(
                "standard parallels {} and {} define no cone",
                parallels.0, parallels.1
            )));
        }
        let af = ellipsoid.a * k0 * m1 * (n * psi1).exp() / n;
        let rho0 = af * (-n * isometric(origin.1.to_radians(), es)).exp();
        if !rho0.is_finite() {
            return Err(Error::Configuration(format!(
                "origin latitude {} is the pole opposite the cone's apex",
                origin.1
            )));
        }
        Ok(LambertConformal {
            ellipsoid,
            lng0: origin.0,
            x0: false_origin.0,
            y0: false_origin.1,
            es,
            n,
            af,
            rho0,
        })
    }

    pub(crate) fn from_setup(setup: &ProjectionSetup<'_>) -> Result<Self, Error> {
        let lng0 = setup.longitude("central meridian", setup.org_lng())?;
        let lat0 = setup.latitude("origin latitude", setup.org_lat())?;
        let phi1 = setup.latitude("standard parallel", setup.prm(1))?;
        let phi2 = setup.latitude("standard parallel", setup.prm(2))?;
        if phi1.abs() > PARALLEL_LIMIT || phi2.abs() > PARALLEL_LIMIT {
            return Err(setup.config_error("a standard parallel lies at a pole"));
        }
        let k0 = if setup.scl_red().is_finite() {
            setup.scale_reduction()?
        } else {
            1.0
        };
        Self::new(
            setup.ellipsoid,
            (lng0, lat0),
            (phi1, phi2),
            k0,
            setup.false_origin(),
        )
        .map_err(|e| setup.config_error(e))
    }

    pub fn cone_constant(&self) -> f64 {
        self.n
    }

    fn rho(&self, lat: f64) -> f64 {
        self.af * (-self.n * isometric(lat.to_radians(), self.es)).exp()
    }

    /// Latitude limit on the side away from the apex.
    fn far_pole(&self) -> f64 {
        -FAR_POLE_LIMIT.copysign(self.n)
    }
}

impl Projection for LambertConformal {
    fn ellipsoid(&self) -> &Ellipsoid {
        &self.ellipsoid
    }

    fn false_origin(&self) -> (f64, f64) {
        (self.x0, self.y0)
    }

    fn forward(&self, ll: &Geographic) -> Conversion<Projected> {
        let mut warnings = Vec::new();
        let mut lat = ll.lat;
        if lat * self.n.signum() < -FAR_POLE_LIMIT {
            lat = self.far_pole();
            warnings.push(Warning::OutOfDomain(format!(
                "latitude {} clamped to {lat} away from the cone's apex",
                ll.lat
            )));
        }
        let theta = self.n * normalize_lng(ll.lng - self.lng0).to_radians();
        let rho = self.rho(lat);
        Ok(Outcome {
            value: Projected::new(
                self.x0 + rho * theta.sin(),
                self.y0 + self.rho0 - rho * theta.cos(),
            ),
            warnings,
        })
    }

    fn inverse(&self, xy: &Projected) -> Conversion<Geographic> {
        let sign = self.n.signum();
        let dx = xy.x - self.x0;
        let dy = self.rho0 - (xy.y - self.y0);
        if !(dx.is_finite() && dy.is_finite()) {
            return Err(Error::Range("non-finite projected coordinate".into()));
        }
        let rho = sign * dx.hypot(dy);
        // At the apex the radius vanishes and the angle is meaningless.
        if rho.abs() < 1e-12 * self.af.abs() {
            return Ok(Outcome::ok(Geographic::new(self.lng0, 90.0 * sign)));
        }
        let theta = (sign * dx).atan2(sign * dy);
        let psi = -(rho / self.af).ln() / self.n;
        Ok(Outcome::ok(Geographic::new(
            normalize_lng(self.lng0 + (theta / self.n).to_degrees()),
            from_isometric(psi, self.es).to_degrees(),
        )))
    }

    fn in_domain(&self, ll: &Geographic) -> bool {
        ll.lng.is_finite() && ll.lat.abs() <= 90.0 && ll.lat * self.n.signum() >= -FAR_POLE_LIMIT
    }

    fn point_scale(&self, ll: &Geographic) -> Result<f64, Error> {
        let lat = ll.lat.to_radians();
        let m = lat.cos() * self.ellipsoid.prime_vertical_radius(lat) / self.ellipsoid.a;
        if m.abs() < 1e-12 {
            return Err(Error::Range("parallel scale is undefined at the pole".into()));
        }
        Ok((self.n * self.rho(ll.lat)).abs() / (self.ellipsoid.a * m))
    }

    fn meridian_scale(&self, ll: &Geographic) -> Result<f64, Error> {
        self.point_scale(ll)
    }

    fn convergence(&self, ll: &Geographic) -> Result<f64, Error> {
        Ok(self.n * normalize_lng(ll.lng - self.lng0))
    }
}
