use std::sync::Arc;
use tracing::{debug, info};

use crate::cache::ActivationCache;
use crate::config::EngineConfig;
use crate::convert::Converter;
use crate::coord::{Geographic, Projected};
use crate::dictionary::{Dictionary, DictionaryKind, Record};
use crate::error::{Conversion, Error, Outcome, Warning};
use crate::geodetic::{GeodeticPath, PathResolver};
use crate::grid::{CorrectionValue, GridKind, GridRegistry};
use crate::projection::ResolvedCoordSystem;

/// Geoid catalogs falling back on each other past this depth are taken to be cyclic.
const MAX_GEOID_FALLBACKS: usize = 4;

/// The conversion engine: a dictionary, the activation caches built on it, and the
/// open grid files.
///
/// Every operation takes `&self`; an engine may be shared between threads.
#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    dictionary: Dictionary,
    systems: ActivationCache<ResolvedCoordSystem>,
    paths: ActivationCache<GeodeticPath>,
    grids: GridRegistry,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Result<Self, Error> {
        config.validate()?;
        let dictionary = Dictionary::open(&config.data_dir).with_byte_order(config.create_order);
        info!(data_dir = %config.data_dir.display(), hub = %config.hub_datum, "engine created");
        Ok(Engine {
            systems: ActivationCache::new("coordinate systems", config.cs_capacity),
            paths: ActivationCache::new("geodetic paths", config.path_capacity),
            grids: GridRegistry::new(config.grid_row_buffer),
            dictionary,
            config,
        })
    }

    /// An engine configured from the environment.
    pub fn from_env() -> Result<Self, Error> {
        Self::new(EngineConfig::from_env())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn dictionary(&self) -> &Dictionary {
        &self.dictionary
    }

    /// Resolve a coordinate system by key, sharing the cached object when there is one.
    pub fn activate(&self, key: &str) -> Result<Arc<ResolvedCoordSystem>, Error> {
        self.systems
            .get_or_build(key, || ResolvedCoordSystem::resolve(&self.dictionary, key))
    }

    /// The path between two datums, sharing the cached object when there is one.
    pub fn build_path(&self, source: &str, target: &str) -> Result<Arc<GeodeticPath>, Error> {
        // Dictionary keys are printable, so a newline cannot occur inside either one.
        let key = format!("{source}\n{target}");
        self.paths.get_or_build(&key, || {
            PathResolver {
                dict: &self.dictionary,
                grids: &self.grids,
                coverage: self.config.out_of_coverage,
                hub: &self.config.hub_datum,
            }
            .resolve(source, target)
        })
    }

    /// A converter between two coordinate systems.
    ///
    /// Systems referenced to a bare ellipsoid have no datum to shift from or to; a
    /// conversion involving one uses the identity path.
    pub fn converter(&self, source: &str, target: &str) -> Result<Converter, Error> {
        let src = self.activate(source)?;
        let trg = self.activate(target)?;
        let path = match (src.datum(), trg.datum()) {
            (Some(a), Some(b)) => self.build_path(a.key(), b.key())?,
            _ => {
                debug!(source, target, "no datum on one side, using identity path");
                Arc::new(GeodeticPath::identity(source, target))
            }
        };
        Ok(Converter::new(src, trg, path, self.config.warning_mask))
    }

    /// Convert one point between two coordinate systems.
    pub fn convert(&self, source: &str, target: &str, point: &Projected) -> Conversion<Projected> {
        self.converter(source, target)?.convert_point(point)
    }

    /// Geoid separation at a point from the named catalog, relative to the data
    /// directory.
    ///
    /// A point no geoid grid covers is answered by the catalog's fallback catalog, if it
    /// names one, and otherwise by the engine's out-of-coverage policy with a
    /// separation of zero.
    pub fn geoid_height(&self, catalog: &str, point: &Geographic) -> Conversion<f64> {
        let out = self.geoid_height_in(catalog, point, 0)?;
        Ok(self.config.warning_mask.apply(out))
    }

    fn geoid_height_in(&self, name: &str, point: &Geographic, depth: usize) -> Conversion<f64> {
        if depth > MAX_GEOID_FALLBACKS {
            return Err(Error::Configuration(format!(
                "geoid catalog fallbacks through `{name}` do not end"
            )));
        }
        let catalog = self.grids.catalog(&self.config.data_dir.join(name))?;
        if catalog.kind() == Some(GridKind::Shift) {
            return Err(Error::Configuration(format!(
                "catalog `{name}` holds datum shifts, not geoid heights"
            )));
        }
        match catalog.query(point.lng, point.lat)? {
            Some(CorrectionValue::GeoidHeight(n)) => Ok(Outcome::ok(n)),
            Some(CorrectionValue::Shift { .. }) => Err(Error::Configuration(format!(
                "catalog `{name}` returned a datum shift"
            ))),
            None => match catalog.fallback() {
                Some(fallback) => {
                    debug!(catalog = name, fallback, "geoid fallback");
                    Ok(self
                        .geoid_height_in(fallback, point, depth + 1)?
                        .with(Warning::FallbackApplied {
                            technique: fallback.to_string(),
                        }))
                }
                None => self.config.out_of_coverage.uncovered(
                    0.0,
                    format!("({}, {}) is outside geoid catalog `{name}`", point.lng, point.lat),
                ),
            },
        }
    }

    /// Drop every cached object and open grid. Handles already given out stay valid.
    pub fn clear_caches(&self) {
        self.systems.clear();
        self.paths.clear();
        self.grids.clear();
    }

    /// Drop cached objects built from the coordinate system or datum `key`.
    pub fn invalidate(&self, key: &str) {
        self.systems.invalidate(key);
        self.systems
            .invalidate_where(|_, cs| cs.datum().is_some_and(|d| d.is(key)));
        self.paths.invalidate_where(|_, path| {
            path.source().eq_ignore_ascii_case(key) || path.target().eq_ignore_ascii_case(key)
        });
    }

    /// Write a definition to the dictionary and drop every cached object it may feed.
    pub fn store<R: Record>(&self, def: &R) -> Result<(), Error> {
        self.dictionary.store(def)?;
        self.after_update::<R>(def.key());
        Ok(())
    }

    /// Delete a definition from the dictionary and drop every cached object it fed.
    pub fn delete<R: Record>(&self, key: &str) -> Result<(), Error> {
        self.dictionary.delete::<R>(key)?;
        self.after_update::<R>(key);
        Ok(())
    }

    fn after_update<R: Record>(&self, key: &str) {
        match R::KIND {
            DictionaryKind::CoordinateSystem => {
                self.systems.invalidate(key);
            }
            DictionaryKind::Category => {}
            DictionaryKind::GeodeticTransform => self.paths.clear(),
            DictionaryKind::Datum | DictionaryKind::Ellipsoid => {
                self.systems.clear();
                self.paths.clear();
            }
        }
    }

    pub fn cached_systems(&self) -> usize {
        self.systems.len()
    }

    pub fn cached_paths(&self) -> usize {
        self.paths.len()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::dictionary::{ByteOrder, CoordSystemDef, DatumDef, EllipsoidDef, ShiftMethod};
    use crate::grid::{GridHeader, write_grid_file};
    use std::fs;

    fn engine(dir: &std::path::Path) -> Engine {
        let engine = Engine::new(EngineConfig::new(dir)).unwrap();
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
    }

    #[test]
    fn activation_is_cached_and_shared() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        let a = engine.activate("LL84").unwrap();
        let b = engine.activate("ll84").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(engine.cached_systems(), 1);
        assert!(matches!(engine.activate("NOPE"), Err(Error::NotFound { .. })));
        assert_eq!(engine.cached_systems(), 1);
    }

    #[test]
    fn updates_invalidate_dependents() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        let before = engine.activate("LL27").unwrap();
        engine.build_path("NAD27", "WGS84").unwrap();
        assert_eq!(engine.cached_paths(), 1);

        engine
            .store(&DatumDef::new("NAD27", "CLRK66").with_shift(ShiftMethod::Molodensky, [-9.0, 161.0, 179.0]))
            .unwrap();
        assert_eq!(engine.cached_systems(), 0);
        assert_eq!(engine.cached_paths(), 0);
        let after = engine.activate("LL27").unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(after.datum().unwrap().def.delta, [-9.0, 161.0, 179.0]);
        // The old handle is untouched.
        assert_eq!(before.datum().unwrap().def.delta, [-8.0, 160.0, 176.0]);

        engine.activate("LL84").unwrap();
        engine.invalidate("nad27");
        assert_eq!(engine.cached_systems(), 1);
    }

    #[test]
    fn path_keys_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        for key in ["A>B", "A", "B>C", "C"] {
            engine.store(&DatumDef::new(key, "WGS84").with_shift(ShiftMethod::Molodensky, [0.0; 3])).unwrap();
        }
        let first = engine.build_path("A>B", "C").unwrap();
        let second = engine.build_path("A", "B>C").unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!((second.source(), second.target()), ("A", "B>C"));
        assert_eq!(engine.cached_paths(), 2);
    }

    #[test]
    fn geoid_heights_use_three_tiers() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        let grid = |name: &str, sw: (f64, f64), n: f64| {
            let header = GridHeader::new(GridKind::Geoid, sw, (1.0, 1.0), 3, 3);
            write_grid_file(dir.path().join(name), &header, &[n; 9], ByteOrder::NATIVE).unwrap();
        };
        grid("local.gxg", (10.0, 50.0), 47.5);
        grid("world.gxg", (0.0, 40.0), 45.0);
        fs::write(dir.path().join("local.cat"), "grid = local.gxg\nfallback = world.cat\n").unwrap();
        fs::write(dir.path().join("world.cat"), "grid = world.gxg\n").unwrap();

        let here = engine.geoid_height("local.cat", &Geographic::new(11.0, 51.0)).unwrap();
        assert!(here.is_clean());
        assert_eq!(here.value, 47.5);

        let coarse = engine.geoid_height("local.cat", &Geographic::new(1.0, 41.0)).unwrap();
        assert!(coarse.fallback_applied());
        assert_eq!(coarse.value, 45.0);

        let nowhere = engine.geoid_height("local.cat", &Geographic::new(-70.0, 41.0)).unwrap();
        assert!(nowhere.fallback_applied() && nowhere.unshifted());
        assert_eq!(nowhere.value, 0.0);

        let strict = Engine::new(EngineConfig {
            out_of_coverage: crate::grid::OutOfCoveragePolicy::Fatal,
            ..EngineConfig::new(dir.path())
        })
        .unwrap();
        assert!(matches!(
            strict.geoid_height("world.cat", &Geographic::new(-70.0, 41.0)),
            Err(Error::Range(_))
        ));
    }
}
