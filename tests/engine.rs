use std::fs;
use std::path::Path;

use approx::assert_abs_diff_eq;
use geoconv::dictionary::{
    ByteOrder, CoordSystemDef, DatumDef, EllipsoidDef, GeodeticTransformDef, ShiftMethod,
    TransformMethod,
};
use geoconv::grid::{GridHeader, GridKind, write_grid_file};
use geoconv::{Engine, EngineBuilder, Error, OutOfCoveragePolicy, Projected, Warning, WarningMask};

fn populate(engine: &Engine) {
    engine
        .store(&EllipsoidDef::from_flattening("WGS84", 6_378_137.0, 298.257_223_563))
        .unwrap();
    engine
        .store(&EllipsoidDef::new("CLRK66", 6_378_206.4, 6_356_583.8))
        .unwrap();
    engine.store(&DatumDef::new("WGS84", "WGS84")).unwrap();
    engine
        .store(&DatumDef::new("NAD27", "CLRK66").with_shift(ShiftMethod::Molodensky, [-8.0, 160.0, 176.0]))
        .unwrap();
    engine
        .store(&CoordSystemDef::new("LL84", "LL", "DEGREE").on_datum("WGS84"))
        .unwrap();
    engine
        .store(&CoordSystemDef::new("LL27", "LL", "DEGREE").on_datum("NAD27"))
        .unwrap();
    engine
        .store(&CoordSystemDef::new("LL-CLRK66", "LL", "DEGREE").on_ellipsoid("CLRK66"))
        .unwrap();
    let mut utm = CoordSystemDef::new("UTM84-10N", "UTM", "METER").on_datum("WGS84");
    utm.prj_prms[0] = 10.0;
    utm.prj_prms[1] = 1.0;
    engine.store(&utm).unwrap();
    let mut utm27 = CoordSystemDef::new("UTM27-10N", "UTM", "METER").on_datum("NAD27");
    utm27.prj_prms[0] = 10.0;
    utm27.prj_prms[1] = 1.0;
    engine.store(&utm27).unwrap();
}

fn engine(dir: &Path) -> Engine {
    let engine = EngineBuilder::new().data_dir(dir).build().unwrap();
    populate(&engine);
    engine
}

/// A 5x5 shift grid over 100W..96W, 30N..34N, with its catalog.
fn shift_grid(dir: &Path, catalog: &str) {
    let header = GridHeader::new(GridKind::Shift, (-100.0, 30.0), (1.0, 1.0), 5, 5);
    let mut values = Vec::new();
    for _ in 0..25 {
        values.push(-1.5);
        values.push(0.4);
    }
    write_grid_file(dir.join("conus.gxg"), &header, &values, ByteOrder::Little).unwrap();
    fs::write(dir.join(catalog), "# test grid\ngrid = conus.gxg\n").unwrap();
}

#[test]
fn utm_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(dir.path());
    let there = engine.converter("LL84", "UTM84-10N").unwrap();
    let back = engine.converter("UTM84-10N", "LL84").unwrap();
    assert!(there.path().is_identity());

    let mut points = [(-122.0, 45.0), (-123.5, 47.25), (-121.1, 38.0)];
    let original = points;
    assert!(there.convert_array(&mut points).unwrap().is_clean());
    assert_abs_diff_eq!(points[0].0, 578_815.303, epsilon = 1e-3);
    assert_abs_diff_eq!(points[0].1, 4_983_436.768, epsilon = 1e-3);
    assert!(back.convert_array(&mut points).unwrap().is_clean());
    for (p, q) in points.iter().zip(original.iter()) {
        assert_abs_diff_eq!(p.0, q.0, epsilon = 1e-8);
        assert_abs_diff_eq!(p.1, q.1, epsilon = 1e-8);
    }
}

#[test]
fn datum_shift_composes_with_projections() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(dir.path());
    let p = Projected::with_z(-122.0, 45.0, 100.0);

    let shifted = engine.convert("LL27", "LL84", &p).unwrap();
    assert!(shifted.is_clean());
    // Oregon moves west by roughly four arc-seconds from NAD27 to WGS84.
    let dlng = (shifted.value.x - p.x) * 3600.0;
    assert!(dlng < -2.0 && dlng > -6.0, "{dlng}");

    let back = engine.convert("LL84", "LL27", &shifted.value).unwrap().value;
    assert_abs_diff_eq!(back.x, p.x, epsilon = 1e-8);
    assert_abs_diff_eq!(back.y, p.y, epsilon = 1e-8);
    assert_abs_diff_eq!(back.z, p.z, epsilon = 1e-3);

    // Projecting on NAD27 then converting equals converting then projecting.
    let via_utm27 = engine.convert("LL27", "UTM27-10N", &p).unwrap().value;
    let direct = engine.convert("UTM27-10N", "UTM84-10N", &via_utm27).unwrap().value;
    let expected = engine.convert("LL84", "UTM84-10N", &shifted.value).unwrap().value;
    assert_abs_diff_eq!(direct.x, expected.x, epsilon = 1e-3);
    assert_abs_diff_eq!(direct.y, expected.y, epsilon = 1e-3);
}

#[test]
fn ellipsoid_systems_skip_datum_shifts() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(dir.path());
    let converter = engine.converter("LL-CLRK66", "LL84").unwrap();
    assert!(converter.path().is_identity());
    let out = converter.convert((-122.0, 45.0)).unwrap();
    assert!(out.is_clean());
    assert_abs_diff_eq!(out.value.0, -122.0, epsilon = 1e-12);
    assert_abs_diff_eq!(out.value.1, 45.0, epsilon = 1e-12);
}

#[test]
fn grid_transformations_fall_back_in_three_tiers() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(dir.path());
    shift_grid(dir.path(), "conus.cat");

    let mut grid = GeodeticTransformDef::new("NAD27_GRID", "NAD27", "WGS84", TransformMethod::GridInterpolation);
    grid.grid_catalog = "conus.cat".into();
    grid.fallback = "NAD27_MOLO".into();
    let mut molo = GeodeticTransformDef::new("NAD27_MOLO", "NAD27", "WGS84", TransformMethod::Molodensky);
    molo.delta = [-8.0, 160.0, 176.0];
    engine.store(&grid).unwrap();
    engine.store(&molo).unwrap();

    let converter = engine.converter("LL27", "LL84").unwrap();
    assert_eq!(converter.path().legs()[0].name, "NAD27_GRID");

    let covered = converter.convert((-98.0, 32.0)).unwrap();
    assert!(covered.is_clean());
    assert_abs_diff_eq!(covered.value.0, -98.0 - 1.5 / 3600.0, epsilon = 1e-9);
    assert_abs_diff_eq!(covered.value.1, 32.0 + 0.4 / 3600.0, epsilon = 1e-9);

    let elsewhere = converter.convert((-122.0, 45.0)).unwrap();
    assert_eq!(
        elsewhere.warnings,
        [Warning::FallbackApplied {
            technique: "NAD27_MOLO".into()
        }]
    );
    assert!(elsewhere.value.0 < -122.0);

    // Without a fallback the policy decides.
    grid.fallback.clear();
    engine.store(&grid).unwrap();
    let unshifted = engine.convert("LL27", "LL84", &Projected::new(-122.0, 45.0)).unwrap();
    assert!(unshifted.unshifted());
    assert_abs_diff_eq!(unshifted.value.x, -122.0, epsilon = 1e-12);
    assert_abs_diff_eq!(unshifted.value.y, 45.0, epsilon = 1e-12);

    let quiet = EngineBuilder::new()
        .data_dir(dir.path())
        .suppress(WarningMask::UNSHIFTED)
        .build()
        .unwrap();
    let out = quiet.convert("LL27", "LL84", &Projected::new(-122.0, 45.0)).unwrap();
    assert!(out.is_clean());

    let strict = EngineBuilder::new()
        .data_dir(dir.path())
        .out_of_coverage(OutOfCoveragePolicy::Fatal)
        .build()
        .unwrap();
    assert!(matches!(
        strict.convert("LL27", "LL84", &Projected::new(-122.0, 45.0)),
        Err(Error::Range(_))
    ));
    assert!(strict.convert("LL27", "LL84", &Projected::new(-98.0, 32.0)).is_ok());
}

#[test]
fn missing_catalog_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(dir.path());
    let mut grid = GeodeticTransformDef::new("NAD27_GRID", "NAD27", "WGS84", TransformMethod::GridInterpolation);
    grid.grid_catalog = "absent.cat".into();
    engine.store(&grid).unwrap();
    assert!(matches!(engine.converter("LL27", "LL84"), Err(Error::Io { .. })));
}

#[test]
fn caches_share_and_evict() {
    let dir = tempfile::tempdir().unwrap();
    let engine = EngineBuilder::new()
        .data_dir(dir.path())
        .cs_cache_capacity(2)
        .build()
        .unwrap();
    populate(&engine);

    let a = engine.converter("LL27", "UTM84-10N").unwrap();
    let b = engine.converter("ll27", "utm84-10n").unwrap();
    assert!(std::ptr::eq(a.source(), b.source()));
    assert!(std::ptr::eq(a.path(), b.path()));
    assert_eq!(engine.cached_systems(), 2);
    assert_eq!(engine.cached_paths(), 1);

    engine.activate("LL84").unwrap();
    assert_eq!(engine.cached_systems(), 2);

    // Converters outlive eviction and invalidation.
    engine.clear_caches();
    assert_eq!(engine.cached_systems(), 0);
    assert!(a.convert((-122.0, 45.0)).unwrap().is_clean());
}

#[test]
fn unknown_keys_fail_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(dir.path());
    assert!(matches!(
        engine.converter("LL84", "NO-SUCH-CS"),
        Err(Error::NotFound { .. })
    ));
    assert_eq!(engine.cached_systems(), 1);
}

#[test]
fn engine_updates_from_many_threads() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(dir.path());
    std::thread::scope(|s| {
        for t in 0..4 {
            let engine = &engine;
            s.spawn(move || {
                for i in 0..10 {
                    let key = format!("LL84-{t}-{i}");
                    engine
                        .store(&CoordSystemDef::new(&key, "LL", "DEGREE").on_datum("WGS84"))
                        .unwrap();
                    engine.activate(&key).unwrap();
                }
            });
        }
    });
    let keys = engine.dictionary().enumerate::<CoordSystemDef>().unwrap();
    // 40 new systems next to the five stored up front
    assert_eq!(keys.len(), 45);
}
