//! The five dictionary record kinds and their on-disk layouts.

use super::codec::{RecordReader, RecordWriter, TRAILER};
use crate::error::Error;
use crate::units;
use std::cmp::Ordering;
use std::fmt;

/// Which dictionary file a record lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DictionaryKind {
    CoordinateSystem,
    Datum,
    Ellipsoid,
    Category,
    GeodeticTransform,
}

impl DictionaryKind {
    /// Kind and schema version specific magic number.
    pub fn magic(self) -> u32 {
        u32::from_be_bytes(match self {
            DictionaryKind::CoordinateSystem => *b"GXC1",
            DictionaryKind::Datum => *b"GXD1",
            DictionaryKind::Ellipsoid => *b"GXE1",
            DictionaryKind::Category => *b"GXK1",
            DictionaryKind::GeodeticTransform => *b"GXT1",
        })
    }

    pub fn file_name(self) -> &'static str {
        match self {
            DictionaryKind::CoordinateSystem => "Coordsys.csd",
            DictionaryKind::Datum => "Datums.csd",
            DictionaryKind::Ellipsoid => "Elipsoid.csd",
            DictionaryKind::Category => "Category.csd",
            DictionaryKind::GeodeticTransform => "GeodeticTransform.csd",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DictionaryKind::CoordinateSystem => "coordinate system",
            DictionaryKind::Datum => "datum",
            DictionaryKind::Ellipsoid => "ellipsoid",
            DictionaryKind::Category => "category",
            DictionaryKind::GeodeticTransform => "geodetic transformation",
        }
    }
}

impl fmt::Display for DictionaryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Dictionary ordering: ASCII case-insensitive.
pub fn compare_keys(a: &str, b: &str) -> Ordering {
    a.bytes()
        .map(|c| c.to_ascii_uppercase())
        .cmp(b.bytes().map(|c| c.to_ascii_uppercase()))
}

/// A fixed-layout record stored in one dictionary file.
pub trait Record: Sized + Clone {
    const KIND: DictionaryKind;
    /// Field-width descriptor; drives size checks and byte swapping.
    const LAYOUT: &'static str;
    /// Width of the key field, including its terminating NUL.
    const KEY_WIDTH: usize;

    fn key(&self) -> &str;
    fn encode(&self, w: &mut RecordWriter);
    fn decode(r: &mut RecordReader<'_>) -> Self;

    /// Distribution records are obfuscated on disk.
    fn is_protected(&self) -> bool {
        false
    }

    /// Does this record refer to `key` of `kind`?
    fn references(&self, _kind: DictionaryKind, _key: &str) -> bool {
        false
    }

    fn validate(&self) -> Result<(), Error> {
        validate_key(Self::KIND, self.key(), Self::KEY_WIDTH)
    }
}

fn validate_key(kind: DictionaryKind, key: &str, width: usize) -> Result<(), Error> {
    if key.is_empty() || key.len() >= width {
        return Err(Error::Configuration(format!(
            "{kind} key `{key}` must be 1 to {} characters",
            width - 1
        )));
    }
    if key.starts_with(' ') || !key.bytes().all(|b| b.is_ascii_graphic() || b == b' ') {
        return Err(Error::Configuration(format!(
            "{kind} key `{key}` contains invalid characters"
        )));
    }
    Ok(())
}

fn matches_key(field: &str, key: &str) -> bool {
    !field.is_empty() && field.eq_ignore_ascii_case(key)
}

/// Reference ellipsoid definition.
#[derive(Debug, Clone, PartialEq)]
pub struct EllipsoidDef {
    pub key_nm: String,
    pub group: String,
    /// Equatorial radius (m)
    pub e_rad: f64,
    /// Polar radius (m)
    pub p_rad: f64,
    pub flat: f64,
    pub ecent: f64,
    pub description: String,
    pub source: String,
    pub protect: i16,
    pub epsg: i32,
}

impl EllipsoidDef {
    pub fn new(key: &str, e_rad: f64, p_rad: f64) -> Self {
        let flat = (e_rad - p_rad) / e_rad;
        EllipsoidDef {
            key_nm: key.to_string(),
            group: String::new(),
            e_rad,
            p_rad,
            flat,
            ecent: (flat * (2.0 - flat)).sqrt(),
            description: String::new(),
            source: String::new(),
            protect: 0,
            epsg: 0,
        }
    }

    pub fn from_flattening(key: &str, e_rad: f64, inverse_flattening: f64) -> Self {
        Self::new(key, e_rad, e_rad * (1.0 - 1.0 / inverse_flattening))
    }
}

impl Record for EllipsoidDef {
    const KIND: DictionaryKind = DictionaryKind::Ellipsoid;
    const LAYOUT: &'static str = "24c24c4d64c64cs2cl8c";
    const KEY_WIDTH: usize = 24;

    fn key(&self) -> &str {
        &self.key_nm
    }

    fn encode(&self, w: &mut RecordWriter) {
        w.text(&self.key_nm, 24);
        w.text(&self.group, 24);
        w.f64s(&[self.e_rad, self.p_rad, self.flat, self.ecent]);
        w.text(&self.description, 64);
        w.text(&self.source, 64);
        w.i16(self.protect);
        w.fill(2);
        w.i32(self.epsg);
        w.fill(TRAILER);
    }

    fn decode(r: &mut RecordReader<'_>) -> Self {
        let key_nm = r.text(24);
        let group = r.text(24);
        let [e_rad, p_rad, flat, ecent] = r.f64s();
        let description = r.text(64);
        let source = r.text(64);
        let protect = r.i16();
        r.skip(2);
        let epsg = r.i32();
        EllipsoidDef {
            key_nm,
            group,
            e_rad,
            p_rad,
            flat,
            ecent,
            description,
            source,
            protect,
            epsg,
        }
    }

    fn is_protected(&self) -> bool {
        self.protect == 1
    }

    fn validate(&self) -> Result<(), Error> {
        validate_key(Self::KIND, &self.key_nm, Self::KEY_WIDTH)?;
        if !(self.p_rad > 0.0 && self.e_rad >= self.p_rad) {
            return Err(Error::Configuration(format!(
                "ellipsoid `{}`: radii {} / {} are inconsistent",
                self.key_nm, self.e_rad, self.p_rad
            )));
        }
        Ok(())
    }
}

/// How a datum's shift to the hub reference frame is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftMethod {
    None,
    GeocentricTranslation,
    Molodensky,
    BursaWolf,
}

impl ShiftMethod {
    pub fn code(self) -> i16 {
        match self {
            ShiftMethod::None => 0,
            ShiftMethod::GeocentricTranslation => 1,
            ShiftMethod::Molodensky => 2,
            ShiftMethod::BursaWolf => 3,
        }
    }

    pub fn from_code(code: i16) -> Option<Self> {
        Some(match code {
            0 => ShiftMethod::None,
            1 => ShiftMethod::GeocentricTranslation,
            2 => ShiftMethod::Molodensky,
            3 => ShiftMethod::BursaWolf,
            _ => return None,
        })
    }
}

/// Geodetic datum definition with its shift to the hub frame.
#[derive(Debug, Clone, PartialEq)]
pub struct DatumDef {
    pub key_nm: String,
    pub ell_knm: String,
    pub group: String,
    pub locatn: String,
    pub cntry_st: String,
    /// Translation to the hub frame (m)
    pub delta: [f64; 3],
    /// Rotation (arc-seconds, position vector convention)
    pub rotation: [f64; 3],
    /// Scale (ppm)
    pub bwscale: f64,
    pub description: String,
    pub source: String,
    pub protect: i16,
    pub to84_via: i16,
    pub epsg: i32,
}

impl DatumDef {
    pub fn new(key: &str, ellipsoid: &str) -> Self {
        DatumDef {
            key_nm: key.to_string(),
            ell_knm: ellipsoid.to_string(),
            group: String::new(),
            locatn: String::new(),
            cntry_st: String::new(),
            delta: [0.0; 3],
            rotation: [0.0; 3],
            bwscale: 0.0,
            description: String::new(),
            source: String::new(),
            protect: 0,
            to84_via: ShiftMethod::None.code(),
            epsg: 0,
        }
    }

    pub fn with_shift(mut self, method: ShiftMethod, delta: [f64; 3]) -> Self {
        self.to84_via = method.code();
        self.delta = delta;
        self
    }

    pub fn with_rotation(mut self, rotation: [f64; 3], bwscale: f64) -> Self {
        self.rotation = rotation;
        self.bwscale = bwscale;
        self
    }

    pub fn shift_method(&self) -> Result<ShiftMethod, Error> {
        ShiftMethod::from_code(self.to84_via).ok_or_else(|| {
            Error::Configuration(format!(
                "datum `{}` has unknown shift method {}",
                self.key_nm, self.to84_via
            ))
        })
    }
}

impl Record for DatumDef {
    const KIND: DictionaryKind = DictionaryKind::Datum;
    const LAYOUT: &'static str = "24c24c24c24c48c7d64c64c2sl8c";
    const KEY_WIDTH: usize = 24;

    fn key(&self) -> &str {
        &self.key_nm
    }

    fn encode(&self, w: &mut RecordWriter) {
        w.text(&self.key_nm, 24);
        w.text(&self.ell_knm, 24);
        w.text(&self.group, 24);
        w.text(&self.locatn, 24);
        w.text(&self.cntry_st, 48);
        w.f64s(&self.delta);
        w.f64s(&self.rotation);
        w.f64(self.bwscale);
        w.text(&self.description, 64);
        w.text(&self.source, 64);
        w.i16(self.protect);
        w.i16(self.to84_via);
        w.i32(self.epsg);
        w.fill(TRAILER);
    }

    fn decode(r: &mut RecordReader<'_>) -> Self {
        DatumDef {
            key_nm: r.text(24),
            ell_knm: r.text(24),
            group: r.text(24),
            locatn: r.text(24),
            cntry_st: r.text(48),
            delta: r.f64s(),
            rotation: r.f64s(),
            bwscale: r.f64(),
            description: r.text(64),
            source: r.text(64),
            protect: r.i16(),
            to84_via: r.i16(),
            epsg: r.i32(),
        }
    }

    fn is_protected(&self) -> bool {
        self.protect == 1
    }

    fn references(&self, kind: DictionaryKind, key: &str) -> bool {
        kind == DictionaryKind::Ellipsoid && matches_key(&self.ell_knm, key)
    }

    fn validate(&self) -> Result<(), Error> {
        validate_key(Self::KIND, &self.key_nm, Self::KEY_WIDTH)?;
        validate_key(DictionaryKind::Ellipsoid, &self.ell_knm, 24)?;
        self.shift_method().map(|_| ())
    }
}

/// Number of generic projection parameters a coordinate system carries.
pub const PRJ_PRM_COUNT: usize = 24;

/// Coordinate system definition.
///
/// Unset projection parameters, origin and scale reduction are NaN.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordSystemDef {
    pub key_nm: String,
    /// Datum key; empty for cartographic systems referenced to a bare ellipsoid.
    pub dat_knm: String,
    pub elp_knm: String,
    /// Projection method identifier, e.g. `TM`, `LM`, `LL`.
    pub prj_knm: String,
    pub group: String,
    pub locatn: String,
    pub cntry_st: String,
    pub unit: String,
    pub prj_prms: [f64; PRJ_PRM_COUNT],
    pub org_lng: f64,
    pub org_lat: f64,
    pub x_off: f64,
    pub y_off: f64,
    pub scl_red: f64,
    pub map_scl: f64,
    /// Magnitudes below these snap to zero on output.
    pub zero: [f64; 2],
    /// Useful range, longitude/latitude; all zero means unbounded.
    pub ll_min: [f64; 2],
    pub ll_max: [f64; 2],
    pub xy_min: [f64; 2],
    pub xy_max: [f64; 2],
    pub quad: i16,
    pub order: i16,
    pub zones: i16,
    pub protect: i16,
    pub epsg: i32,
    pub description: String,
    pub source: String,
}

impl CoordSystemDef {
    pub fn new(key: &str, method: &str, unit: &str) -> Self {
        CoordSystemDef {
            key_nm: key.to_string(),
            prj_knm: method.to_string(),
            unit: unit.to_string(),
            ..Default::default()
        }
    }

    pub fn on_datum(mut self, datum: &str) -> Self {
        self.dat_knm = datum.to_string();
        self
    }

    pub fn on_ellipsoid(mut self, ellipsoid: &str) -> Self {
        self.elp_knm = ellipsoid.to_string();
        self
    }

    pub fn is_geodetic(&self) -> bool {
        !self.dat_knm.is_empty()
    }

    pub fn has_useful_range(&self) -> bool {
        self.ll_min != [0.0; 2] || self.ll_max != [0.0; 2]
    }
}

impl Default for CoordSystemDef {
    fn default() -> Self {
        CoordSystemDef {
            key_nm: String::new(),
            dat_knm: String::new(),
            elp_knm: String::new(),
            prj_knm: String::new(),
            group: String::new(),
            locatn: String::new(),
            cntry_st: String::new(),
            unit: "METER".to_string(),
            prj_prms: [f64::NAN; PRJ_PRM_COUNT],
            org_lng: f64::NAN,
            org_lat: f64::NAN,
            x_off: 0.0,
            y_off: 0.0,
            scl_red: f64::NAN,
            map_scl: 1.0,
            zero: [0.0; 2],
            ll_min: [0.0; 2],
            ll_max: [0.0; 2],
            xy_min: [0.0; 2],
            xy_max: [0.0; 2],
            quad: 1,
            order: 0,
            zones: 0,
            protect: 0,
            epsg: 0,
            description: String::new(),
            source: String::new(),
        }
    }
}

impl Record for CoordSystemDef {
    const KIND: DictionaryKind = DictionaryKind::CoordinateSystem;
    const LAYOUT: &'static str = "24c24c24c24c24c24c48c16c24d8d8d4sl4c64c64c8c";
    const KEY_WIDTH: usize = 24;

    fn key(&self) -> &str {
        &self.key_nm
    }

    fn encode(&self, w: &mut RecordWriter) {
        w.text(&self.key_nm, 24);
        w.text(&self.dat_knm, 24);
        w.text(&self.elp_knm, 24);
        w.text(&self.prj_knm, 24);
        w.text(&self.group, 24);
        w.text(&self.locatn, 24);
        w.text(&self.cntry_st, 48);
        w.text(&self.unit, 16);
        w.f64s(&self.prj_prms);
        w.f64s(&[
            self.org_lng,
            self.org_lat,
            self.x_off,
            self.y_off,
            self.scl_red,
            self.map_scl,
        ]);
        w.f64s(&self.zero);
        w.f64s(&self.ll_min);
        w.f64s(&self.ll_max);
        w.f64s(&self.xy_min);
        w.f64s(&self.xy_max);
        for v in [self.quad, self.order, self.zones, self.protect] {
            w.i16(v);
        }
        w.i32(self.epsg);
        w.fill(4);
        w.text(&self.description, 64);
        w.text(&self.source, 64);
        w.fill(TRAILER);
    }

    fn decode(r: &mut RecordReader<'_>) -> Self {
        let key_nm = r.text(24);
        let dat_knm = r.text(24);
        let elp_knm = r.text(24);
        let prj_knm = r.text(24);
        let group = r.text(24);
        let locatn = r.text(24);
        let cntry_st = r.text(48);
        let unit = r.text(16);
        let prj_prms = r.f64s();
        let [org_lng, org_lat, x_off, y_off, scl_red, map_scl] = r.f64s();
        let zero = r.f64s();
        let ll_min = r.f64s();
        let ll_max = r.f64s();
        let xy_min = r.f64s();
        let xy_max = r.f64s();
        let quad = r.i16();
        let order = r.i16();
        let zones = r.i16();
        let protect = r.i16();
        let epsg = r.i32();
        r.skip(4);
        let description = r.text(64);
        let source = r.text(64);
        CoordSystemDef {
            key_nm,
            dat_knm,
            elp_knm,
            prj_knm,
            group,
            locatn,
            cntry_st,
            unit,
            prj_prms,
            org_lng,
            org_lat,
            x_off,
            y_off,
            scl_red,
            map_scl,
            zero,
            ll_min,
            ll_max,
            xy_min,
            xy_max,
            quad,
            order,
            zones,
            protect,
            epsg,
            description,
            source,
        }
    }

    fn is_protected(&self) -> bool {
        self.protect == 1
    }

    fn references(&self, kind: DictionaryKind, key: &str) -> bool {
        match kind {
            DictionaryKind::Datum => matches_key(&self.dat_knm, key),
            DictionaryKind::Ellipsoid => matches_key(&self.elp_knm, key),
            _ => false,
        }
    }

    fn validate(&self) -> Result<(), Error> {
        validate_key(Self::KIND, &self.key_nm, Self::KEY_WIDTH)?;
        if self.prj_knm.is_empty() {
            return Err(Error::Configuration(format!(
                "coordinate system `{}` names no projection",
                self.key_nm
            )));
        }
        if self.dat_knm.is_empty() && self.elp_knm.is_empty() {
            return Err(Error::Configuration(format!(
                "coordinate system `{}` references neither a datum nor an ellipsoid",
                self.key_nm
            )));
        }
        if units::lookup(&self.unit).is_none() {
            return Err(Error::Configuration(format!(
                "coordinate system `{}` uses unknown unit `{}`",
                self.key_nm, self.unit
            )));
        }
        Ok(())
    }
}

/// Most members a single category record can list.
pub const MAX_CATEGORY_MEMBERS: usize = 32;

/// A named grouping of coordinate systems.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryDef {
    pub name: String,
    pub description: String,
    pub members: Vec<String>,
}

impl CategoryDef {
    pub fn new(name: &str, members: &[&str]) -> Self {
        CategoryDef {
            name: name.to_string(),
            description: String::new(),
            members: members.iter().map(|m| m.to_string()).collect(),
        }
    }
}

impl Record for CategoryDef {
    const KIND: DictionaryKind = DictionaryKind::Category;
    const LAYOUT: &'static str = "48c80c1l4c768c8c";
    const KEY_WIDTH: usize = 48;

    fn key(&self) -> &str {
        &self.name
    }

    fn encode(&self, w: &mut RecordWriter) {
        w.text(&self.name, 48);
        w.text(&self.description, 80);
        w.i32(self.members.len().min(MAX_CATEGORY_MEMBERS) as i32);
        w.fill(4);
        for i in 0..MAX_CATEGORY_MEMBERS {
            w.text(self.members.get(i).map_or("", String::as_str), 24);
        }
        w.fill(TRAILER);
    }

    fn decode(r: &mut RecordReader<'_>) -> Self {
        let name = r.text(48);
        let description = r.text(80);
        let count = (r.i32().max(0) as usize).min(MAX_CATEGORY_MEMBERS);
        r.skip(4);
        let mut members = Vec::with_capacity(count);
        for i in 0..MAX_CATEGORY_MEMBERS {
            let m = r.text(24);
            if i < count {
                members.push(m);
            }
        }
        CategoryDef {
            name,
            description,
            members,
        }
    }

    fn validate(&self) -> Result<(), Error> {
        validate_key(Self::KIND, &self.name, Self::KEY_WIDTH)?;
        if self.members.len() > MAX_CATEGORY_MEMBERS {
            return Err(Error::Configuration(format!(
                "category `{}` lists {} members, at most {MAX_CATEGORY_MEMBERS} fit",
                self.name,
                self.members.len()
            )));
        }
        for m in &self.members {
            validate_key(DictionaryKind::CoordinateSystem, m, 24)?;
        }
        Ok(())
    }
}

/// Elementary transformation technique of a dictionary transformation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformMethod {
    Null,
    GeocentricTranslation,
    Molodensky,
    BursaWolf,
    MultipleRegression,
    GridInterpolation,
}

impl TransformMethod {
    pub fn code(self) -> i16 {
        match self {
            TransformMethod::Null => 0,
            TransformMethod::GeocentricTranslation => 1,
            TransformMethod::Molodensky => 2,
            TransformMethod::BursaWolf => 3,
            TransformMethod::MultipleRegression => 4,
            TransformMethod::GridInterpolation => 5,
        }
    }

    pub fn from_code(code: i16) -> Option<Self> {
        Some(match code {
            0 => TransformMethod::Null,
            1 => TransformMethod::GeocentricTranslation,
            2 => TransformMethod::Molodensky,
            3 => TransformMethod::BursaWolf,
            4 => TransformMethod::MultipleRegression,
            5 => TransformMethod::GridInterpolation,
            _ => return None,
        })
    }
}

/// Number of multiple-regression coefficients per axis (a full cubic in U and V).
pub const MREG_TERMS: usize = 10;

/// A direct transformation between two datums.
#[derive(Debug, Clone, PartialEq)]
pub struct GeodeticTransformDef {
    pub key_nm: String,
    pub src_dtm: String,
    pub trg_dtm: String,
    pub group: String,
    pub description: String,
    pub source: String,
    /// Grid catalog file, relative to the dictionary directory.
    pub grid_catalog: String,
    /// Transformation used where this one has no data.
    pub fallback: String,
    pub method: i16,
    pub inverse_support: i16,
    pub max_iterations: i16,
    pub protect: i16,
    pub epsg: i32,
    /// Stated accuracy (m)
    pub accuracy: f64,
    pub convergence: f64,
    pub error_threshold: f64,
    /// Validity range, longitude/latitude; all zero means unbounded.
    pub rng_min: [f64; 2],
    pub rng_max: [f64; 2],
    pub delta: [f64; 3],
    pub rotation: [f64; 3],
    pub bwscale: f64,
    /// Multiple regression origin (lat, lng, degrees) and normalising factor.
    pub mreg_origin: [f64; 2],
    pub mreg_scale: f64,
    /// Latitude and longitude shift polynomials, arc-seconds.
    pub mreg_lat: [f64; MREG_TERMS],
    pub mreg_lng: [f64; MREG_TERMS],
}

impl GeodeticTransformDef {
    pub fn new(key: &str, src: &str, trg: &str, method: TransformMethod) -> Self {
        GeodeticTransformDef {
            key_nm: key.to_string(),
            src_dtm: src.to_string(),
            trg_dtm: trg.to_string(),
            group: String::new(),
            description: String::new(),
            source: String::new(),
            grid_catalog: String::new(),
            fallback: String::new(),
            method: method.code(),
            inverse_support: 1,
            max_iterations: 0,
            protect: 0,
            epsg: 0,
            accuracy: 0.0,
            convergence: 0.0,
            error_threshold: 0.0,
            rng_min: [0.0; 2],
            rng_max: [0.0; 2],
            delta: [0.0; 3],
            rotation: [0.0; 3],
            bwscale: 0.0,
            mreg_origin: [0.0; 2],
            mreg_scale: 1.0,
            mreg_lat: [0.0; MREG_TERMS],
            mreg_lng: [0.0; MREG_TERMS],
        }
    }

    pub fn method(&self) -> Result<TransformMethod, Error> {
        TransformMethod::from_code(self.method).ok_or_else(|| {
            Error::Configuration(format!(
                "transformation `{}` has unknown method {}",
                self.key_nm, self.method
            ))
        })
    }

    pub fn has_range(&self) -> bool {
        self.rng_min != [0.0; 2] || self.rng_max != [0.0; 2]
    }
}

impl Record for GeodeticTransformDef {
    const KIND: DictionaryKind = DictionaryKind::GeodeticTransform;
    const LAYOUT: &'static str = "48c24c24c24c64c64c64c48c4sl4c3d4d7d3d10d10d8c";
    const KEY_WIDTH: usize = 48;

    fn key(&self) -> &str {
        &self.key_nm
    }

    fn encode(&self, w: &mut RecordWriter) {
        w.text(&self.key_nm, 48);
        w.text(&self.src_dtm, 24);
        w.text(&self.trg_dtm, 24);
        w.text(&self.group, 24);
        w.text(&self.description, 64);
        w.text(&self.source, 64);
        w.text(&self.grid_catalog, 64);
        w.text(&self.fallback, 48);
        for v in [
            self.method,
            self.inverse_support,
            self.max_iterations,
            self.protect,
        ] {
            w.i16(v);
        }
        w.i32(self.epsg);
        w.fill(4);
        w.f64s(&[self.accuracy, self.convergence, self.error_threshold]);
        w.f64s(&self.rng_min);
        w.f64s(&self.rng_max);
        w.f64s(&self.delta);
        w.f64s(&self.rotation);
        w.f64(self.bwscale);
        w.f64s(&self.mreg_origin);
        w.f64(self.mreg_scale);
        w.f64s(&self.mreg_lat);
        w.f64s(&self.mreg_lng);
        w.fill(TRAILER);
    }

    fn decode(r: &mut RecordReader<'_>) -> Self {
        let key_nm = r.text(48);
        let src_dtm = r.text(24);
        let trg_dtm = r.text(24);
        let group = r.text(24);
        let description = r.text(64);
        let source = r.text(64);
        let grid_catalog = r.text(64);
        let fallback = r.text(48);
        let method = r.i16();
        let inverse_support = r.i16();
        let max_iterations = r.i16();
        let protect = r.i16();
        let epsg = r.i32();
        r.skip(4);
        let [accuracy, convergence, error_threshold] = r.f64s();
        GeodeticTransformDef {
            key_nm,
            src_dtm,
            trg_dtm,
            group,
            description,
            source,
            grid_catalog,
            fallback,
            method,
            inverse_support,
            max_iterations,
            protect,
            epsg,
            accuracy,
            convergence,
            error_threshold,
            rng_min: r.f64s(),
            rng_max: r.f64s(),
            delta: r.f64s(),
            rotation: r.f64s(),
            bwscale: r.f64(),
            mreg_origin: r.f64s(),
            mreg_scale: r.f64(),
            mreg_lat: r.f64s(),
            mreg_lng: r.f64s(),
        }
    }

    fn is_protected(&self) -> bool {
        self.protect == 1
    }

    fn references(&self, kind: DictionaryKind, key: &str) -> bool {
        kind == DictionaryKind::Datum
            && (matches_key(&self.src_dtm, key) || matches_key(&self.trg_dtm, key))
    }

    fn validate(&self) -> Result<(), Error> {
        validate_key(Self::KIND, &self.key_nm, Self::KEY_WIDTH)?;
        validate_key(DictionaryKind::Datum, &self.src_dtm, 24)?;
        validate_key(DictionaryKind::Datum, &self.trg_dtm, 24)?;
        let method = self.method()?;
        if method == TransformMethod::GridInterpolation && self.grid_catalog.is_empty() {
            return Err(Error::Configuration(format!(
                "grid transformation `{}` names no grid catalog",
                self.key_nm
            )));
        }
        Ok(())
    }
}
