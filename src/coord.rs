/// A geographic position: longitude and latitude in degrees, ellipsoidal height in metres.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Geographic {
    pub lng: f64,
    pub lat: f64,
    pub hgt: f64,
}

impl Geographic {
    pub const fn new(lng: f64, lat: f64) -> Self {
        Geographic { lng, lat, hgt: 0.0 }
    }

    pub const fn with_height(lng: f64, lat: f64, hgt: f64) -> Self {
        Geographic { lng, lat, hgt }
    }

    pub fn is_finite(&self) -> bool {
        self.lng.is_finite() && self.lat.is_finite() && self.hgt.is_finite()
    }

    /// Largest absolute horizontal difference in degrees.
    pub(crate) fn max_delta(&self, other: &Geographic) -> f64 {
        (self.lng - other.lng).abs().max((self.lat - other.lat).abs())
    }
}

/// A position in a projected (or otherwise planar) system, in the system's units.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Projected {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Projected {
    pub const fn new(x: f64, y: f64) -> Self {
        Projected { x, y, z: 0.0 }
    }

    pub const fn with_z(x: f64, y: f64, z: f64) -> Self {
        Projected { x, y, z }
    }
}

/// Wrap a longitude into [-180, 180).
pub(crate) fn normalize_lng(lng: f64) -> f64 {
    let mut x = lng % 360.0;
    if x < -180.0 {
        x += 360.0;
    }
    if x >= 180.0 {
        x -= 360.0;
    }
    x
}
