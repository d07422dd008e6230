//! Reference ellipsoid geometry.
//!
//! ```
//! use geoconv::Ellipsoid;
//!
//! let wgs84 = Ellipsoid::WGS84;
//! assert!((wgs84.b() - 6_356_752.314_245).abs() < 1e-3);
//! ```

use crate::coord::Geographic;
use crate::dictionary::EllipsoidDef;
use crate::error::{Conversion, Error, Outcome};
use crate::geodetic::IterationPolicy;

/// An oblate ellipsoid of revolution, described by its equatorial radius and flattening.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ellipsoid {
    /// Equatorial radius (m)
    pub a: f64,
    /// Flattening
    pub f: f64,
}

impl Ellipsoid {
    pub const WGS84: Self = Self::new(6_378_137.0, 1.0 / 298.257_223_563);
    pub const GRS80: Self = Self::new(6_378_137.0, 1.0 / 298.257_222_101);
    pub const CLARKE_1866: Self = Self::from_radii_const(6_378_206.4, 6_356_583.8);
    pub const INTERNATIONAL_1924: Self = Self::new(6_378_388.0, 1.0 / 297.0);

    pub const fn new(a: f64, f: f64) -> Self {
        Self { a, f }
    }

    const fn from_radii_const(a: f64, b: f64) -> Self {
        Self { a, f: (a - b) / a }
    }

    pub fn from_radii(a: f64, b: f64) -> Self {
        Self::from_radii_const(a, b)
    }

    /// Build from a dictionary record, rejecting radii no real ellipsoid has.
    pub fn from_def(def: &EllipsoidDef) -> Result<Self, Error> {
        let (a, b) = (def.e_rad, def.p_rad);
        if !(a.is_finite() && b.is_finite()) || a < 1.0 || b < 1.0 || b > a {
            return Err(Error::Configuration(format!(
                "ellipsoid `{}` has invalid radii {a} / {b}",
                def.key_nm
            )));
        }
        let ellipsoid = Self::from_radii(a, b);
        if ellipsoid.f > 0.01 {
            return Err(Error::Configuration(format!(
                "ellipsoid `{}` flattening {} is not geodetic",
                def.key_nm, ellipsoid.f
            )));
        }
        Ok(ellipsoid)
    }

    /// Polar radius b = a(1-f)
    #[inline]
    pub fn b(&self) -> f64 {
        self.a * (1.0 - self.f)
    }

    /// First eccentricity squared e² = 2f - f²
    #[inline]
    pub fn e2(&self) -> f64 {
        self.f * (2.0 - self.f)
    }

    #[inline]
    pub fn e(&self) -> f64 {
        self.e2().sqrt()
    }

    /// Second eccentricity squared e'² = e²/(1-e²)
    #[inline]
    pub fn ep2(&self) -> f64 {
        let e2 = self.e2();
        e2 / (1.0 - e2)
    }

    /// Third flattening n = f/(2-f)
    #[inline]
    pub fn n(&self) -> f64 {
        self.f / (2.0 - self.f)
    }

    pub fn is_sphere(&self) -> bool {
        self.f.abs() < 1e-12
    }

    /// Meridional radius of curvature M = a(1-e²) / (1-e²sin²φ)^(3/2)
    #[inline]
    pub fn meridional_radius(&self, lat_rad: f64) -> f64 {
        let s = lat_rad.sin();
        let e2 = self.e2();
        self.a * (1.0 - e2) / (1.0 - e2 * s * s).powf(1.5)
    }

    /// Prime vertical radius of curvature N = a / √(1-e²sin²φ)
    #[inline]
    pub fn prime_vertical_radius(&self, lat_rad: f64) -> f64 {
        let s = lat_rad.sin();
        self.a / (1.0 - self.e2() * s * s).sqrt()
    }

    /// Geographic (degrees, metres) to earth-centred cartesian (metres).
    pub fn cartesian(&self, p: &Geographic) -> Result<[f64; 3], Error> {
        let (lat, lng) = (p.lat.to_radians(), p.lng.to_radians());
        let n = self.prime_vertical_radius(lat);
        // Below this the point folds through the centre and the inverse is ambiguous.
        if !p.is_finite() || p.hgt <= -0.5 * self.b() {
            return Err(Error::Range(format!(
                "height {} is outside the geocentric domain",
                p.hgt
            )));
        }
        let (slat, clat) = lat.sin_cos();
        let (slng, clng) = lng.sin_cos();
        Ok([
            (n + p.hgt) * clat * clng,
            (n + p.hgt) * clat * slng,
            (n * (1.0 - self.e2()) + p.hgt) * slat,
        ])
    }

    /// Earth-centred cartesian back to geographic.
    ///
    /// Latitude and height depend on each other, so latitude is refined until the change
    /// drops below `policy.epsilon` radians or the iteration budget runs out.
    pub fn geographic(&self, xyz: [f64; 3], policy: &IterationPolicy) -> Conversion<Geographic> {
        let [x, y, z] = xyz;
        if !(x.is_finite() && y.is_finite() && z.is_finite()) {
            return Err(Error::Range("non-finite cartesian coordinate".into()));
        }
        let e2 = self.e2();
        let p = x.hypot(y);
        let lng = y.atan2(x).to_degrees();

        if p < 1e-9 * self.a {
            let lat = if z < 0.0 { -90.0 } else { 90.0 };
            return Ok(Outcome::ok(Geographic::with_height(
                lng,
                lat,
                z.abs() - self.b(),
            )));
        }

        let mut lat = z.atan2(p * (1.0 - e2));
        let mut hgt = 0.0;
        let mut residual = f64::INFINITY;
        let mut iterations = 0;
        while iterations < policy.max_iterations {
            iterations += 1;
            let n = self.prime_vertical_radius(lat);
            hgt = p / lat.cos() - n;
            let next = z.atan2(p * (1.0 - e2 * n / (n + hgt)));
            residual = (next - lat).abs();
            lat = next;
            if residual < policy.epsilon {
                break;
            }
        }
        let n = self.prime_vertical_radius(lat);
        if lat.cos().abs() > 1e-10 {
            hgt = p / lat.cos() - n;
        }
        policy.settle(
            Geographic::with_height(lng, lat.to_degrees(), hgt),
            residual,
            iterations,
        )
    }
}

impl Default for Ellipsoid {
    fn default() -> Self {
        Self::WGS84
    }
}

impl std::fmt::Display for Ellipsoid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Ellipsoid(a={}, f=1/{:.6})", self.a, 1.0 / self.f)
    }
}
