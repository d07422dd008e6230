//! Transverse Mercator by the Krüger series to sixth order in the third flattening
//! (Karney 2011, "Transverse Mercator with an accuracy of a few nanometers").
//!
//! Both directions are closed form: the series is summed with Clenshaw's method in
//! the complex plane, and the only inner loop is the Newton refinement of the
//! conformal latitude, which settles in two or three rounds.

use num_complex::Complex64;
use std::f64::consts::{FRAC_PI_2, PI};

use crate::coord::{Geographic, Projected, normalize_lng};
use crate::ellipsoid::Ellipsoid;
use crate::error::{Conversion, Error, Outcome};

use super::math::{eatanhe, polyval, sincosd, taupf, tauf};
use super::{Projection, ProjectionSetup};

const ORDER: usize = 6;

/// α coefficients: numerator polynomial in n, highest power first, then the divisor.
#[rustfmt::skip]
const ALPHA: [&[f64]; ORDER] = [
    &[31564.0, -66675.0, 34440.0, 47250.0, -100800.0, 75600.0, 151200.0],
    &[-1983433.0, 863232.0, 748608.0, -1161216.0, 524160.0, 1935360.0],
    &[670412.0, 406647.0, -533952.0, 184464.0, 725760.0],
    &[6601661.0, -7732800.0, 2230245.0, 7257600.0],
    &[-13675556.0, 3438171.0, 7983360.0],
    &[212378941.0, 319334400.0],
];

#[rustfmt::skip]
const BETA: [&[f64]; ORDER] = [
    &[384796.0, -382725.0, -6720.0, 932400.0, -1612800.0, 1209600.0, 2419200.0],
    &[-1118711.0, 1695744.0, -1174656.0, 258048.0, 80640.0, 3870720.0],
    &[22276.0, -16929.0, -15984.0, 12852.0, 362880.0],
    &[-830251.0, -158400.0, 197865.0, 7257600.0],
    &[-435388.0, 453717.0, 15966720.0],
    &[20648693.0, 638668800.0],
];

/// Rectifying radius factor, polynomial in n².
const B1: [f64; 5] = [1.0, 4.0, 64.0, 256.0, 256.0];

const UTM_SCALE: f64 = 0.9996;
const UTM_FALSE_EASTING: f64 = 500_000.0;
const UTM_FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

#[derive(Debug, Clone)]
pub struct TransverseMercator {
    ellipsoid: Ellipsoid,
    lng0: f64,
    k0: f64,
    x0: f64,
    y0: f64,
    e2: f64,
    es: f64,
    e2m: f64,
    /// Point scale at the pole, before k0
    c: f64,
    b1: f64,
    a1: f64,
    alp: [f64; ORDER],
    bet: [f64; ORDER],
    /// Unshifted northing of the origin latitude on the central meridian
    m0: f64,
}

#[derive(Debug, Clone, Copy)]
struct Series {
    x: f64,
    y: f64,
    gamma: f64,
    k: f64,
}

impl TransverseMercator {
    /// Build directly; `lng0`/`lat0` in degrees, false origin in the ellipsoid's units.
    pub fn new(ellipsoid: Ellipsoid, lng0: f64, lat0: f64, k0: f64, false_origin: (f64, f64)) -> Self {
        let f = ellipsoid.f;
        let e2 = ellipsoid.e2();
        let es = f.signum() * e2.abs().sqrt();
        let e2m = 1.0 - e2;
        let n = ellipsoid.n();
        let b1 = polyval(&B1[..4], n * n) / (B1[4] * (1.0 + n));

        let mut alp = [0.0; ORDER];
        let mut bet = [0.0; ORDER];
        let mut d = n;
        for l in 0..ORDER {
            let m = ALPHA[l].len() - 1;
            alp[l] = d * polyval(&ALPHA[l][..m], n) / ALPHA[l][m];
            let m = BETA[l].len() - 1;
            bet[l] = d * polyval(&BETA[l][..m], n) / BETA[l][m];
            d *= n;
        }

        let mut tm = TransverseMercator {
            ellipsoid,
            lng0,
            k0,
            x0: false_origin.0,
            y0: false_origin.1,
            e2,
            es,
            e2m,
            c: e2m.sqrt() * eatanhe(1.0, es).exp(),
            b1,
            a1: b1 * ellipsoid.a,
            alp,
            bet,
            m0: 0.0,
        };
        tm.m0 = tm.series(0.0, lat0).y;
        tm
    }

    pub(crate) fn from_setup(setup: &ProjectionSetup<'_>) -> Result<Self, Error> {
        let lng0 = setup.longitude("central meridian", setup.org_lng())?;
        let lat0 = setup.latitude("origin latitude", setup.org_lat())?;
        let k0 = setup.scale_reduction()?;
        Ok(Self::new(setup.ellipsoid, lng0, lat0, k0, setup.false_origin()))
    }

    /// UTM: parameter 1 is the zone, parameter 2 the hemisphere (negative for south).
    pub(crate) fn utm(setup: &ProjectionSetup<'_>) -> Result<Self, Error> {
        let zone = setup.prm(1);
        if zone.fract() != 0.0 || !(1.0..=60.0).contains(&zone) {
            return Err(setup.config_error(format_args!("UTM zone {zone} does not exist")));
        }
        let lng0 = zone * 6.0 - 183.0;
        let north = setup.prm(2) >= 0.0;
        let x0 = UTM_FALSE_EASTING * setup.scale;
        let y0 = if north {
            0.0
        } else {
            UTM_FALSE_NORTHING_SOUTH * setup.scale
        };
        Ok(Self::new(setup.ellipsoid, lng0, 0.0, UTM_SCALE, (x0, y0)))
    }

    pub fn central_meridian(&self) -> f64 {
        self.lng0
    }

    pub fn scale_factor(&self) -> f64 {
        self.k0
    }

    /// Forward series for a longitude relative to the central meridian.
    fn series(&self, dlng: f64, lat: f64) -> Series {
        let mut latsign = if lat.is_sign_negative() { -1.0 } else { 1.0 };
        let lngsign = if dlng.is_sign_negative() { -1.0 } else { 1.0 };
        let lat = lat.abs();
        let mut lam = dlng.abs();
        let backside = lam > 90.0;
        if backside {
            if lat == 0.0 {
                latsign = -1.0;
            }
            lam = 180.0 - lam;
        }

        let (sphi, cphi) = sincosd(lat);
        let (slam, clam) = sincosd(lam);
        let (xip, etap, mut gamma, mut k);
        if lat == 90.0 {
            xip = FRAC_PI_2;
            etap = 0.0;
            gamma = lam;
            k = self.c;
        } else {
            let tau = sphi / cphi;
            let taup = taupf(tau, self.es);
            xip = taup.atan2(clam);
            etap = (slam / taup.hypot(clam)).asinh();
            gamma = (slam * taup).atan2(clam * taup.hypot(1.0)).to_degrees();
            k = (self.e2m + self.e2 * cphi * cphi).sqrt() * tau.hypot(1.0) / taup.hypot(clam);
        }

        let (s0, c0) = (2.0 * xip).sin_cos();
        let (sh0, ch0) = ((2.0 * etap).sinh(), (2.0 * etap).cosh());
        let a = Complex64::new(2.0 * c0 * ch0, -2.0 * s0 * sh0);
        let (mut y0, mut y1) = (Complex64::default(), Complex64::default());
        let (mut z0, mut z1) = (Complex64::default(), Complex64::default());
        for j in (0..ORDER).rev() {
            let (py, pz) = (y0, z0);
            y0 = a * y0 - y1 + self.alp[j];
            z0 = a * z0 - z1 + (2 * (j + 1)) as f64 * self.alp[j];
            y1 = py;
            z1 = pz;
        }
        let z = Complex64::new(1.0, 0.0) - z1 + (a / 2.0) * z0;
        let y = Complex64::new(xip, etap) + Complex64::new(s0 * ch0, c0 * sh0) * y0;
        let (xi, eta) = (y.re, y.im);

        gamma -= z.im.atan2(z.re).to_degrees();
        k *= self.b1 * z.norm();
        if backside {
            gamma = 180.0 - gamma;
        }
        Series {
            x: self.a1 * self.k0 * eta * lngsign,
            y: self.a1 * self.k0 * (if backside { PI - xi } else { xi }) * latsign,
            gamma: gamma * latsign * lngsign,
            k: self.k0 * k,
        }
    }

    fn series_at(&self, ll: &Geographic) -> Series {
        self.series(normalize_lng(ll.lng - self.lng0), ll.lat)
    }
}

impl Projection for TransverseMercator {
    fn ellipsoid(&self) -> &Ellipsoid {
        &self.ellipsoid
    }

    fn false_origin(&self) -> (f64, f64) {
        (self.x0, self.y0)
    }

    fn forward(&self, ll: &Geographic) -> Conversion<Projected> {
        let s = self.series_at(ll);
        Ok(Outcome::ok(Projected::new(
            self.x0 + s.x,
            self.y0 + s.y - self.m0,
        )))
    }

    fn inverse(&self, xy: &Projected) -> Conversion<Geographic> {
        let scale = self.a1 * self.k0;
        let xi = (xy.y - self.y0 + self.m0) / scale;
        let eta = (xy.x - self.x0) / scale;
        if !(xi.is_finite() && eta.is_finite()) {
            return Err(Error::Range("non-finite projected coordinate".into()));
        }
        let xisign = if xi.is_sign_negative() { -1.0 } else { 1.0 };
        let etasign = if eta.is_sign_negative() { -1.0 } else { 1.0 };
        let mut xi = xi.abs();
        let eta = eta.abs();
        let backside = xi > FRAC_PI_2;
        if backside {
            xi = PI - xi;
        }

        let (s0, c0) = (2.0 * xi).sin_cos();
        let (sh0, ch0) = ((2.0 * eta).sinh(), (2.0 * eta).cosh());
        let a = Complex64::new(2.0 * c0 * ch0, -2.0 * s0 * sh0);
        let (mut y0, mut y1) = (Complex64::default(), Complex64::default());
        for j in (0..ORDER).rev() {
            let prev = y0;
            y0 = a * y0 - y1 - self.bet[j];
            y1 = prev;
        }
        let y = Complex64::new(xi, eta) + Complex64::new(s0 * ch0, c0 * sh0) * y0;
        let (xip, etap) = (y.re, y.im);

        let s = etap.sinh();
        let c = xip.cos().max(0.0);
        let r = s.hypot(c);
        let (mut lam, mut lat) = if r == 0.0 {
            (0.0, 90.0)
        } else {
            let tau = tauf(xip.sin() / r, self.es);
            (s.atan2(c).to_degrees(), tau.atan().to_degrees())
        };
        lat *= xisign;
        if backside {
            lam = 180.0 - lam;
        }
        lam *= etasign;
        Ok(Outcome::ok(Geographic::new(
            normalize_lng(lam + self.lng0),
            lat,
        )))
    }

    fn in_domain(&self, ll: &Geographic) -> bool {
        ll.lat.abs() <= 90.0 && normalize_lng(ll.lng - self.lng0).abs() <= 90.0
    }

    fn point_scale(&self, ll: &Geographic) -> Result<f64, Error> {
        Ok(self.series_at(ll).k)
    }

    fn meridian_scale(&self, ll: &Geographic) -> Result<f64, Error> {
        Ok(self.series_at(ll).k)
    }

    fn convergence(&self, ll: &Geographic) -> Result<f64, Error> {
        Ok(self.series_at(ll).gamma)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn utm10n() -> TransverseMercator {
        TransverseMercator::new(Ellipsoid::WGS84, -123.0, 0.0, UTM_SCALE, (500_000.0, 0.0))
    }

    #[test]
    fn utm_zone_10_reference_point() {
        let tm = utm10n();
        let p = tm.forward(&Geographic::new(-122.0, 45.0)).unwrap().value;
        assert_abs_diff_eq!(p.x, 578_815.302_916_7, epsilon = 1e-4);
        assert_abs_diff_eq!(p.y, 4_983_436.768_349_3, epsilon = 1e-4);
        let back = tm.inverse(&p).unwrap().value;
        assert_abs_diff_eq!(back.lng, -122.0, epsilon = 1e-9);
        assert_abs_diff_eq!(back.lat, 45.0, epsilon = 1e-9);
    }

    #[test]
    fn round_trip_across_the_zone() {
        let tm = utm10n();
        for lat in [-80.0, -45.5, -0.1, 0.0, 12.0, 60.25, 84.0] {
            for lng in [-129.0, -125.3, -123.0, -121.9, -117.0] {
                let ll = Geographic::new(lng, lat);
                let back = tm.inverse(&tm.forward(&ll).unwrap().value).unwrap().value;
                assert_abs_diff_eq!(back.lng, lng, epsilon = 1e-9);
                assert_abs_diff_eq!(back.lat, lat, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn origin_latitude_shifts_northing() {
        let tm = TransverseMercator::new(Ellipsoid::WGS84, 9.0, 49.0, 1.0, (0.0, 0.0));
        let p = tm.forward(&Geographic::new(9.0, 49.0)).unwrap().value;
        assert_abs_diff_eq!(p.x, 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(p.y, 0.0, epsilon = 1e-6);
        let back = tm.inverse(&Projected::new(1000.0, -2000.0)).unwrap().value;
        assert!(back.lat < 49.0 && back.lng > 9.0);
    }

    #[test]
    fn scale_and_convergence() {
        let tm = utm10n();
        let on_meridian = Geographic::new(-123.0, 45.0);
        assert_abs_diff_eq!(tm.point_scale(&on_meridian).unwrap(), UTM_SCALE, epsilon = 1e-12);
        assert_abs_diff_eq!(tm.convergence(&on_meridian).unwrap(), 0.0, epsilon = 1e-12);

        let east = Geographic::new(-122.0, 45.0);
        let gamma = tm.convergence(&east).unwrap();
        // γ ≈ Δλ·sin φ near the central meridian
        assert_abs_diff_eq!(gamma, 45f64.to_radians().sin(), epsilon = 1e-3);
        assert!(tm.point_scale(&east).unwrap() > UTM_SCALE);
        assert!(tm.convergence(&Geographic::new(-124.0, 45.0)).unwrap() < 0.0);
    }

    #[test]
    fn southern_hemisphere_and_pole() {
        let tm = TransverseMercator::new(Ellipsoid::WGS84, 15.0, 0.0, UTM_SCALE, (500_000.0, 10_000_000.0));
        let p = tm.forward(&Geographic::new(18.0, -33.9)).unwrap().value;
        assert!(p.y < 10_000_000.0 && p.x > 500_000.0);
        let pole = tm.forward(&Geographic::new(40.0, 90.0)).unwrap().value;
        let back = tm.inverse(&pole).unwrap().value;
        assert_abs_diff_eq!(back.lat, 90.0, epsilon = 1e-9);
    }
}
