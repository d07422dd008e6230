//! Conformal and authalic latitude helpers shared by the ellipsoidal families.

/// `es * atanh(es * x)`, continued to prolate ellipsoids through a negative `es`.
#[inline]
pub(crate) fn eatanhe(x: f64, es: f64) -> f64 {
    if es > 0.0 {
        es * (es * x).atanh()
    } else if es < 0.0 {
        -es * (-es * x).atan()
    } else {
        0.0
    }
}

/// tan φ to tan χ, where χ is the conformal latitude.
#[inline]
pub(crate) fn taupf(tau: f64, es: f64) -> f64 {
    if !tau.is_finite() {
        return tau;
    }
    let tau1 = tau.hypot(1.0);
    let sig = eatanhe(tau / tau1, es).sinh();
    sig.hypot(1.0) * tau - sig * tau1
}

/// tan χ back to tan φ by Newton's method; converges in two or three rounds.
pub(crate) fn tauf(taup: f64, es: f64) -> f64 {
    const MAX_ROUNDS: usize = 8;
    if !taup.is_finite() {
        return taup;
    }
    let e2m = 1.0 - es * es;
    let tol = f64::EPSILON.sqrt() * 0.1 * taup.abs().max(1.0);
    let mut tau = taup / e2m;
    for _ in 0..MAX_ROUNDS {
        let taupa = taupf(tau, es);
        let dtau = (taup - taupa) * (1.0 + e2m * tau * tau)
            / (e2m * tau.hypot(1.0) * taupa.hypot(1.0));
        tau += dtau;
        if dtau.abs() < tol {
            break;
        }
    }
    tau
}

/// Isometric latitude ψ for a geodetic latitude in radians.
#[inline]
pub(crate) fn isometric(lat: f64, es: f64) -> f64 {
    taupf(lat.tan(), es).asinh()
}

/// Geodetic latitude in radians from an isometric latitude.
#[inline]
pub(crate) fn from_isometric(psi: f64, es: f64) -> f64 {
    tauf(psi.sinh(), es).atan()
}

/// Horner evaluation; `coeffs[0]` is the highest order term.
#[inline]
pub(crate) fn polyval(coeffs: &[f64], x: f64) -> f64 {
    coeffs.iter().fold(0.0, |acc, &c| acc * x + c)
}

/// sin and cos of an angle in degrees, exact at multiples of 90.
pub(crate) fn sincosd(x: f64) -> (f64, f64) {
    let mut r = x % 360.0;
    if r < 0.0 {
        r += 360.0;
    }
    let q = (r / 90.0 + 0.5).floor() as i32;
    r -= 90.0 * f64::from(q);
    let (s, c) = r.to_radians().sin_cos();
    match q & 3 {
        0 => (s, c),
        1 => (c, -s),
        2 => (-s, -c),
        _ => (-c, s),
    }
}

/// Snyder's q(φ) for the authalic latitude, given sin φ.
pub(crate) fn authalic_q(sin_lat: f64, e: f64) -> f64 {
    let e2 = e * e;
    if e < 1e-12 {
        return 2.0 * sin_lat;
    }
    let es = e * sin_lat;
    (1.0 - e2) * (sin_lat / (1.0 - es * es) - (0.5 / e) * ((1.0 - es) / (1.0 + es)).ln())
}

/// Latitude in radians whose q is `q`; `qp` is q at the pole.
pub(crate) fn lat_from_authalic_q(q: f64, qp: f64, e: f64) -> f64 {
    let ratio = q / qp;
    if ratio.abs() >= 1.0 {
        return std::f64::consts::FRAC_PI_2.copysign(ratio);
    }
    let beta = ratio.asin();
    if e < 1e-12 {
        return beta;
    }
    let e2 = e * e;
    let e4 = e2 * e2;
    let e6 = e4 * e2;
    let mut lat = beta
        + (e2 / 3.0 + 31.0 * e4 / 180.0 + 517.0 * e6 / 5040.0) * (2.0 * beta).sin()
        + (23.0 * e4 / 360.0 + 251.0 * e6 / 3780.0) * (4.0 * beta).sin()
        + (761.0 * e6 / 45360.0) * (6.0 * beta).sin();
    // The series leaves an e^8 residue; Snyder 3-16 polishes it off.
    for _ in 0..4 {
        let (s, c) = lat.sin_cos();
        if c.abs() < 1e-12 {
            break;
        }
        let es = e * s;
        let one = 1.0 - es * es;
        let step = one * one / (2.0 * c)
            * (q / (1.0 - e2) - s / one + (0.5 / e) * ((1.0 - es) / (1.0 + es)).ln());
        lat += step;
        if step.abs() < 1e-15 {
            break;
        }
    }
    lat
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;

    const ES: f64 = 0.081_819_190_842_621_5;

    #[test]
    fn conformal_latitude_round_trip() {
        for lat in [-85.0_f64, -45.0, 0.0, 30.0, 89.0] {
            let tau = lat.to_radians().tan();
            assert_abs_diff_eq!(tauf(taupf(tau, ES), ES), tau, epsilon = 1e-12 * tau.abs().max(1.0));
        }
    }

    #[test]
    fn isometric_round_trip() {
        for lat in [-60.0_f64, -3.0, 0.0, 45.0, 80.0] {
            let psi = isometric(lat.to_radians(), ES);
            assert_abs_diff_eq!(from_isometric(psi, ES).to_degrees(), lat, epsilon = 1e-11);
        }
    }

    #[test]
    fn authalic_round_trip() {
        let qp = authalic_q(1.0, ES);
        for lat in [-75.0_f64, -10.0, 0.0, 35.0, 60.0] {
            let q = authalic_q(lat.to_radians().sin(), ES);
            let back = lat_from_authalic_q(q, qp, ES).to_degrees();
            assert_abs_diff_eq!(back, lat, epsilon = 1e-11);
        }
        assert_abs_diff_eq!(lat_from_authalic_q(qp, qp, ES), std::f64::consts::FRAC_PI_2);
    }

    #[test]
    fn sincosd_is_exact_on_axes() {
        assert_eq!(sincosd(90.0), (1.0, 0.0));
        assert_eq!(sincosd(-180.0).1, -1.0);
        assert_eq!(polyval(&[1.0, 0.0, -1.0], 3.0), 8.0);
    }
}
