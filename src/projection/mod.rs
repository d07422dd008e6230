//! Map projections.
//!
//! Every family implements [`Projection`]; [`Projector`] is the closed set of families
//! the registry can build from a [`CoordSystemDef`]. The registry records which
//! definition parameters each method needs, so a definition missing one fails once at
//! activation instead of producing NaN coordinates later.
//!
//! Families work in the coordinate system's own units: the ellipsoid they are given has
//! its radius already converted to those units and divided by the map scale, and the
//! false origin is expressed in them too.

mod albers;
mod lambert;
pub(crate) mod math;
mod mercator;
mod system;
mod tmerc;
mod unity;
mod winkel;

pub use albers::AlbersEqualArea;
pub use lambert::LambertConformal;
pub use mercator::Mercator;
pub use system::{DomainStatus, ResolvedCoordSystem};
pub use tmerc::TransverseMercator;
pub use unity::Unity;
pub use winkel::WinkelTripel;

use std::fmt;

use crate::coord::{Geographic, Projected};
use crate::dictionary::CoordSystemDef;
use crate::ellipsoid::Ellipsoid;
use crate::error::{Conversion, Error};

/// The capability set shared by every projection family.
///
/// Scale factors and convergence have finite-difference defaults so a family only
/// needs `forward` and `inverse`; families with closed forms override them.
pub trait Projection: fmt::Debug + Send + Sync {
    /// The ellipsoid the family projects from, radius in system units.
    fn ellipsoid(&self) -> &Ellipsoid;

    /// Easting and northing of the natural origin.
    fn false_origin(&self) -> (f64, f64);

    fn forward(&self, ll: &Geographic) -> Conversion<Projected>;

    fn inverse(&self, xy: &Projected) -> Conversion<Geographic>;

    /// Whether the family's formulas are defined at `ll`.
    fn in_domain(&self, ll: &Geographic) -> bool {
        ll.lng.is_finite() && ll.lat.abs() <= 90.0
    }

    /// Scale along the parallel (k).
    fn point_scale(&self, ll: &Geographic) -> Result<f64, Error> {
        let d = Partials::estimate(self, ll)?;
        let (lat, e) = (ll.lat.to_radians(), self.ellipsoid());
        let parallel = e.prime_vertical_radius(lat) * lat.cos();
        if parallel.abs() < 1e-9 {
            return Err(Error::Range("parallel scale is undefined at the pole".into()));
        }
        Ok(d.dx_dlng.hypot(d.dy_dlng) / parallel)
    }

    /// Scale along the meridian (h).
    fn meridian_scale(&self, ll: &Geographic) -> Result<f64, Error> {
        let d = Partials::estimate(self, ll)?;
        Ok(d.dx_dlat.hypot(d.dy_dlat) / self.ellipsoid().meridional_radius(ll.lat.to_radians()))
    }

    /// Angle from true north to grid north, degrees, positive clockwise.
    fn convergence(&self, ll: &Geographic) -> Result<f64, Error> {
        let d = Partials::estimate(self, ll)?;
        Ok((-d.dx_dlat).atan2(d.dy_dlat).to_degrees())
    }
}

/// Partial derivatives of the forward mapping per radian of longitude and latitude.
#[derive(Debug, Clone, Copy)]
struct Partials {
    dx_dlng: f64,
    dy_dlng: f64,
    dx_dlat: f64,
    dy_dlat: f64,
}

impl Partials {
    const STEP: f64 = 1e-5;

    fn estimate<P: Projection + ?Sized>(p: &P, ll: &Geographic) -> Result<Self, Error> {
        let h = Self::STEP;
        // Keep the latitude stencil on the sphere near the poles.
        let lat = ll.lat.clamp(-90.0 + h, 90.0 - h);
        let at = |lng: f64, lat: f64| -> Result<Projected, Error> {
            Ok(p.forward(&Geographic::new(lng, lat))?.value)
        };
        let (e, w) = (at(ll.lng + h, lat)?, at(ll.lng - h, lat)?);
        let (n, s) = (at(ll.lng, lat + h)?, at(ll.lng, lat - h)?);
        let span = (2.0 * h).to_radians();
        Ok(Partials {
            dx_dlng: (e.x - w.x) / span,
            dy_dlng: (e.y - w.y) / span,
            dx_dlat: (n.x - s.x) / span,
            dy_dlat: (n.y - s.y) / span,
        })
    }
}

/// Definition parameters a method insists on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamMask(u8);

impl ParamMask {
    pub const NONE: ParamMask = ParamMask(0);
    pub const ORG_LNG: ParamMask = ParamMask(1);
    pub const ORG_LAT: ParamMask = ParamMask(1 << 1);
    pub const SCL_RED: ParamMask = ParamMask(1 << 2);
    pub const PRM1: ParamMask = ParamMask(1 << 3);
    pub const PRM2: ParamMask = ParamMask(1 << 4);

    pub const fn with(self, other: ParamMask) -> ParamMask {
        ParamMask(self.0 | other.0)
    }

    pub fn contains(self, other: ParamMask) -> bool {
        self.0 & other.0 == other.0
    }
}

/// A definition normalised for a family constructor.
#[derive(Debug, Clone)]
pub struct ProjectionSetup<'a> {
    pub def: &'a CoordSystemDef,
    /// The datum's ellipsoid, radius in system units.
    pub ellipsoid: Ellipsoid,
    /// System units per metre, map scale included (units per degree for geographic systems).
    pub scale: f64,
}

impl ProjectionSetup<'_> {
    pub fn key(&self) -> &str {
        &self.def.key_nm
    }

    pub fn org_lng(&self) -> f64 {
        self.def.org_lng
    }

    pub fn org_lat(&self) -> f64 {
        self.def.org_lat
    }

    pub fn scl_red(&self) -> f64 {
        self.def.scl_red
    }

    /// One-based generic projection parameter.
    pub fn prm(&self, n: usize) -> f64 {
        self.def.prj_prms.get(n - 1).copied().unwrap_or(f64::NAN)
    }

    pub fn false_origin(&self) -> (f64, f64) {
        (self.def.x_off, self.def.y_off)
    }

    fn present(&self, mask: ParamMask) -> bool {
        let value = match mask {
            ParamMask::ORG_LNG => self.org_lng(),
            ParamMask::ORG_LAT => self.org_lat(),
            ParamMask::SCL_RED => self.scl_red(),
            ParamMask::PRM1 => self.prm(1),
            ParamMask::PRM2 => self.prm(2),
            _ => return true,
        };
        value.is_finite()
    }

    pub(crate) fn config_error(&self, what: impl fmt::Display) -> Error {
        Error::Configuration(format!("coordinate system `{}`: {what}", self.key()))
    }

    pub(crate) fn latitude(&self, name: &str, value: f64) -> Result<f64, Error> {
        if (-90.0..=90.0).contains(&value) {
            Ok(value)
        } else {
            Err(self.config_error(format_args!("{name} {value} is not a latitude")))
        }
    }

    pub(crate) fn longitude(&self, name: &str, value: f64) -> Result<f64, Error> {
        if (-360.0..=360.0).contains(&value) {
            Ok(crate::coord::normalize_lng(value))
        } else {
            Err(self.config_error(format_args!("{name} {value} is not a longitude")))
        }
    }

    pub(crate) fn scale_reduction(&self) -> Result<f64, Error> {
        let k0 = self.scl_red();
        if (0.5..=2.0).contains(&k0) {
            Ok(k0)
        } else {
            Err(self.config_error(format_args!("scale reduction {k0} is absurd")))
        }
    }
}

type Builder = fn(&ProjectionSetup<'_>) -> Result<Projector, Error>;

/// A registry entry.
pub struct Method {
    pub key: &'static str,
    pub name: &'static str,
    pub required: ParamMask,
    /// Geographic methods take angular units and ignore the map scale.
    pub geographic: bool,
    build: Builder,
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("key", &self.key)
            .field("required", &self.required)
            .finish()
    }
}

const REQUIRED_NAMES: [(ParamMask, &str); 5] = [
    (ParamMask::ORG_LNG, "origin longitude"),
    (ParamMask::ORG_LAT, "origin latitude"),
    (ParamMask::SCL_RED, "scale reduction"),
    (ParamMask::PRM1, "parameter 1"),
    (ParamMask::PRM2, "parameter 2"),
];

impl Method {
    /// Check the required parameters and build the family.
    pub fn build(&self, setup: &ProjectionSetup<'_>) -> Result<Projector, Error> {
        for (bit, name) in REQUIRED_NAMES {
            if self.required.contains(bit) && !setup.present(bit) {
                return Err(setup.config_error(format_args!(
                    "{} requires {name}",
                    self.key
                )));
            }
        }
        (self.build)(setup)
    }
}

const ORIGIN: ParamMask = ParamMask::ORG_LNG.with(ParamMask::ORG_LAT);
const CONIC: ParamMask = ORIGIN.with(ParamMask::PRM1).with(ParamMask::PRM2);

static METHODS: &[Method] = &[
    Method {
        key: "LL",
        name: "Unity (geographic)",
        required: ParamMask::NONE,
        geographic: true,
        build: |s| Unity::from_setup(s).map(Projector::Unity),
    },
    Method {
        key: "TM",
        name: "Transverse Mercator",
        required: ORIGIN.with(ParamMask::SCL_RED),
        geographic: false,
        build: |s| TransverseMercator::from_setup(s).map(Projector::TransverseMercator),
    },
    Method {
        key: "UTM",
        name: "Universal Transverse Mercator",
        required: ParamMask::PRM1.with(ParamMask::PRM2),
        geographic: false,
        build: |s| TransverseMercator::utm(s).map(Projector::TransverseMercator),
    },
    Method {
        key: "MRCAT",
        name: "Mercator",
        required: ParamMask::ORG_LNG.with(ParamMask::SCL_RED),
        geographic: false,
        build: |s| Mercator::from_setup(s).map(Projector::Mercator),
    },
    Method {
        key: "LM",
        name: "Lambert Conformal Conic, two standard parallels",
        required: CONIC,
        geographic: false,
        build: |s| LambertConformal::from_setup(s).map(Projector::LambertConformal),
    },
    Method {
        key: "AE",
        name: "Albers Equal Area Conic",
        required: CONIC,
        geographic: false,
        build: |s| AlbersEqualArea::from_setup(s).map(Projector::AlbersEqualArea),
    },
    Method {
        key: "WINKT",
        name: "Winkel Tripel",
        required: ParamMask::ORG_LNG,
        geographic: false,
        build: |s| WinkelTripel::from_setup(s).map(Projector::WinkelTripel),
    },
];

/// Look a projection method up by key, ignoring case.
pub fn method(key: &str) -> Option<&'static Method> {
    METHODS.iter().find(|m| m.key.eq_ignore_ascii_case(key))
}

/// Every registered method.
pub fn methods() -> &'static [Method] {
    METHODS
}

/// One projection family with its precomputed constants.
#[derive(Debug, Clone)]
pub enum Projector {
    Unity(Unity),
    TransverseMercator(TransverseMercator),
    Mercator(Mercator),
    LambertConformal(LambertConformal),
    AlbersEqualArea(AlbersEqualArea),
    WinkelTripel(WinkelTripel),
}

macro_rules! dispatch {
    ($self:ident, $p:ident => $call:expr) => {
        match $self {
            Projector::Unity($p) => $call,
            Projector::TransverseMercator($p) => $call,
            Projector::Mercator($p) => $call,
            Projector::LambertConformal($p) => $call,
            Projector::AlbersEqualArea($p) => $call,
            Projector::WinkelTripel($p) => $call,
        }
    };
}

impl Projection for Projector {
    fn ellipsoid(&self) -> &Ellipsoid {
        dispatch!(self, p => p.ellipsoid())
    }

    fn false_origin(&self) -> (f64, f64) {
        dispatch!(self, p => p.false_origin())
    }

    fn forward(&self, ll: &Geographic) -> Conversion<Projected> {
        dispatch!(self, p => p.forward(ll))
    }

    fn inverse(&self, xy: &Projected) -> Conversion<Geographic> {
        dispatch!(self, p => p.inverse(xy))
    }

    fn in_domain(&self, ll: &Geographic) -> bool {
        dispatch!(self, p => p.in_domain(ll))
    }

    fn point_scale(&self, ll: &Geographic) -> Result<f64, Error> {
        dispatch!(self, p => p.point_scale(ll))
    }

    fn meridian_scale(&self, ll: &Geographic) -> Result<f64, Error> {
        dispatch!(self, p => p.meridian_scale(ll))
    }

    fn convergence(&self, ll: &Geographic) -> Result<f64, Error> {
        dispatch!(self, p => p.convergence(ll))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn registry_is_case_insensitive() {
        assert_eq!(method("utm").unwrap().key, "UTM");
        assert!(method("LL").unwrap().geographic);
        assert!(method("ROBINSON").is_none());
        assert!(methods().iter().all(|m| method(m.key).is_some()));
    }

    #[test]
    fn missing_parameter_fails_fast() {
        let mut def = CoordSystemDef::new("TEST-TM", "TM", "METER").on_datum("WGS84");
        def.org_lng = -123.0;
        def.org_lat = 0.0;
        let setup = ProjectionSetup {
            def: &def,
            ellipsoid: Ellipsoid::WGS84,
            scale: 1.0,
        };
        let err = method("TM").unwrap().build(&setup).unwrap_err();
        assert!(err.to_string().contains("scale reduction"), "{err}");
    }

    #[test]
    fn absurd_parameter_is_rejected() {
        let mut def = CoordSystemDef::new("TEST-LM", "LM", "METER").on_datum("WGS84");
        def.org_lng = -99.0;
        def.org_lat = 27.0;
        def.prj_prms[0] = 90.0;
        def.prj_prms[1] = 30.0;
        let setup = ProjectionSetup {
            def: &def,
            ellipsoid: Ellipsoid::WGS84,
            scale: 1.0,
        };
        assert!(matches!(
            method("LM").unwrap().build(&setup),
            Err(Error::Configuration(_))
        ));
    }
}
