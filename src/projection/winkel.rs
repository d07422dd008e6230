use std::f64::consts::{FRAC_2_PI, FRAC_PI_2, PI};

use crate::coord::{Geographic, Projected, normalize_lng};
use crate::ellipsoid::Ellipsoid;
use crate::error::{Conversion, Error, Outcome};
use crate::geodetic::IterationPolicy;

use super::{Projection, ProjectionSetup};

/// Winkel tripel on the sphere of the datum's equatorial radius.
///
/// The forward mapping is the mean of equirectangular and Aitoff; it has no closed
/// inverse, so the inverse runs Newton's method on the forward mapping under the
/// same iteration contract as the geodetic inverses.
#[derive(Debug, Clone)]
pub struct WinkelTripel {
    sphere: Ellipsoid,
    lng0: f64,
    cos_phi1: f64,
    x0: f64,
    y0: f64,
    policy: IterationPolicy,
}

impl WinkelTripel {
    pub const POLICY: IterationPolicy = IterationPolicy {
        max_iterations: 20,
        epsilon: 1e-12,
        error_threshold: 1e-6,
    };

    /// `phi1` is the equirectangular standard parallel, degrees; Winkel's own choice
    /// is acos(2/π).
    pub fn new(radius: f64, lng0: f64, phi1: Option<f64>, false_origin: (f64, f64)) -> Self {
        WinkelTripel {
            sphere: Ellipsoid::new(radius, 0.0),
            lng0,
            cos_phi1: phi1.map_or(FRAC_2_PI, |p| p.to_radians().cos()),
            x0: false_origin.0,
            y0: false_origin.1,
            policy: Self::POLICY,
        }
    }

    pub(crate) fn from_setup(setup: &ProjectionSetup<'_>) -> Result<Self, Error> {
        let lng0 = setup.longitude("central meridian", setup.org_lng())?;
        let phi1 = match setup.prm(1) {
            p if p.is_finite() => Some(setup.latitude("standard parallel", p)?),
            _ => None,
        };
        Ok(Self::new(setup.ellipsoid.a, lng0, phi1, setup.false_origin()))
    }

    pub fn with_policy(mut self, policy: IterationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Unit-sphere mapping of radians.
    fn raw(&self, lam: f64, phi: f64) -> (f64, f64) {
        let (sphi, cphi) = phi.sin_cos();
        let half = 0.5 * lam;
        let alpha = (cphi * half.cos()).clamp(-1.0, 1.0).acos();
        let sinc = if alpha < 1e-12 { 1.0 } else { alpha.sin() / alpha };
        (
            0.5 * (lam * self.cos_phi1 + 2.0 * cphi * half.sin() / sinc),
            0.5 * (phi + sphi / sinc),
        )
    }
}

impl Projection for WinkelTripel {
    fn ellipsoid(&self) -> &Ellipsoid {
        &self.sphere
    }

    fn false_origin(&self) -> (f64, f64) {
        (self.x0, self.y0)
    }

    fn forward(&self, ll: &Geographic) -> Conversion<Projected> {
        let lam = normalize_lng(ll.lng - self.lng0).to_radians();
        let (x, y) = self.raw(lam, ll.lat.to_radians());
        let r = self.sphere.a;
        Ok(Outcome::ok(Projected::new(self.x0 + r * x, self.y0 + r * y)))
    }

    fn inverse(&self, xy: &Projected) -> Conversion<Geographic> {
        const H: f64 = 1e-7;
        let r = self.sphere.a;
        let (tx, ty) = ((xy.x - self.x0) / r, (xy.y - self.y0) / r);
        if !(tx.is_finite() && ty.is_finite()) {
            return Err(Error::Range("non-finite projected coordinate".into()));
        }
        let misfit = |lam: f64, phi: f64| {
            let (x, y) = self.raw(lam, phi);
            (x - tx, y - ty)
        };
        // Near the origin the mapping is the identity scaled by (1 + cos φ1)/2 in x.
        let mut lam = (2.0 * tx / (1.0 + self.cos_phi1)).clamp(-PI, PI);
        let mut phi = ty.clamp(-FRAC_PI_2, FRAC_PI_2);
        let (mut fx, mut fy) = misfit(lam, phi);
        let mut residual = fx.abs().max(fy.abs()).to_degrees();
        let mut iterations = 0;
        while residual >= self.policy.epsilon && iterations < self.policy.max_iterations {
            iterations += 1;
            let (xe, ye) = misfit(lam + H, phi);
            let (xw, yw) = misfit(lam - H, phi);
            let (xn, yn) = misfit(lam, phi + H);
            let (xs, ys) = misfit(lam, phi - H);
            let (j11, j21) = ((xe - xw) / (2.0 * H), (ye - yw) / (2.0 * H));
            let (j12, j22) = ((xn - xs) / (2.0 * H), (yn - ys) / (2.0 * H));
            let det = j11 * j22 - j12 * j21;
            if det.abs() < 1e-14 {
                break;
            }
            lam = (lam - (fx * j22 - fy * j12) / det).clamp(-PI, PI);
            phi = (phi - (fy * j11 - fx * j21) / det).clamp(-FRAC_PI_2, FRAC_PI_2);
            (fx, fy) = misfit(lam, phi);
            residual = fx.abs().max(fy.abs()).to_degrees();
            if !residual.is_finite() {
                break;
            }
        }
        let ll = Geographic::new(
            normalize_lng(lam.to_degrees() + self.lng0),
            phi.to_degrees(),
        );
        self.policy.settle(ll, residual, iterations)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;

    const R: f64 = 6_371_000.0;

    #[test]
    fn closed_values_on_the_axes() {
        let w = WinkelTripel::new(R, 0.0, None, (0.0, 0.0));
        let p = w.forward(&Geographic::new(0.0, 45.0)).unwrap().value;
        assert_abs_diff_eq!(p.x, 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(p.y, R * PI / 4.0, epsilon = 1e-6);
        let p = w.forward(&Geographic::new(90.0, 0.0)).unwrap().value;
        assert_abs_diff_eq!(p.x, R * (0.5 + PI / 4.0), epsilon = 1e-6);
    }

    #[test]
    fn newton_inverse_round_trips() {
        let w = WinkelTripel::new(R, 10.0, None, (1000.0, -500.0));
        for (lng, lat) in [(10.0, 0.0), (55.0, 10.0), (-120.0, -70.0), (170.0, 60.0), (-100.0, 75.0)] {
            let ll = Geographic::new(lng, lat);
            let back = w.inverse(&w.forward(&ll).unwrap().value).unwrap();
            assert!(back.is_clean(), "{lng} {lat}: {:?}", back.warnings);
            assert_abs_diff_eq!(back.value.lng, lng, epsilon = 1e-8);
            assert_abs_diff_eq!(back.value.lat, lat, epsilon = 1e-8);
        }
    }

    #[test]
    fn starved_budget_warns_or_fails_but_terminates() {
        let w = WinkelTripel::new(R, 0.0, Some(40.0), (0.0, 0.0)).with_policy(IterationPolicy {
            max_iterations: 1,
            epsilon: 1e-15,
            error_threshold: 1e3,
        });
        let p = w.forward(&Geographic::new(120.0, 50.0)).unwrap().value;
        let res = w.inverse(&p).unwrap();
        assert!(!res.is_clean());
    }

    #[test]
    fn off_the_map_is_fatal() {
        let w = WinkelTripel::new(R, 0.0, None, (0.0, 0.0));
        let res = w.inverse(&Projected::new(3.0 * R, 3.0 * R));
        assert!(matches!(res, Err(Error::ConvergenceFatal { .. })));
    }

    #[test]
    fn numeric_scale_defaults() {
        let w = WinkelTripel::new(R, 0.0, None, (0.0, 0.0));
        let origin = Geographic::new(0.0, 0.0);
        assert_abs_diff_eq!(w.point_scale(&origin).unwrap(), 0.5 * (1.0 + FRAC_2_PI), epsilon = 1e-6);
        assert_abs_diff_eq!(w.meridian_scale(&origin).unwrap(), 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(w.convergence(&origin).unwrap(), 0.0, epsilon = 1e-6);
    }
}
