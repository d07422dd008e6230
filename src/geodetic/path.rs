use tracing::debug;

use crate::coord::Geographic;
use crate::dictionary::{Dictionary, GeodeticTransformDef, compare_keys};
use crate::error::{Conversion, Error, Outcome};
use crate::grid::{GridRegistry, OutOfCoveragePolicy};

use super::{Coverage, Datum, GeodeticStep};

/// Fallback chains longer than this are taken to be cyclic.
const MAX_FALLBACK_DEPTH: usize = 4;

/// One step of a path, possibly run backwards.
#[derive(Debug, Clone)]
pub struct PathLeg {
    /// Dictionary transformation key, or the datum whose own shift this is.
    pub name: String,
    pub step: GeodeticStep,
    pub inverted: bool,
    /// Stated accuracy in metres; zero when unknown.
    pub accuracy: f64,
}

impl PathLeg {
    fn run(&self, p: &Geographic, backwards: bool) -> Conversion<Geographic> {
        self.step.run(p, self.inverted != backwards)
    }
}

/// An ordered sequence of steps from a source datum to a target datum.
#[derive(Debug, Clone)]
pub struct GeodeticPath {
    source: String,
    target: String,
    legs: Vec<PathLeg>,
}

impl GeodeticPath {
    pub fn new(source: &str, target: &str, legs: Vec<PathLeg>) -> Self {
        GeodeticPath {
            source: source.to_string(),
            target: target.to_string(),
            legs: legs
                .into_iter()
                .filter(|leg| !matches!(leg.step, GeodeticStep::Null))
                .collect(),
        }
    }

    pub fn identity(source: &str, target: &str) -> Self {
        Self::new(source, target, Vec::new())
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn legs(&self) -> &[PathLeg] {
        &self.legs
    }

    pub fn is_identity(&self) -> bool {
        self.legs.is_empty()
    }

    /// Sum of the legs' stated accuracies, if every leg states one.
    pub fn accuracy(&self) -> Option<f64> {
        self.legs
            .iter()
            .map(|leg| (leg.accuracy > 0.0).then_some(leg.accuracy))
            .sum()
    }

    /// The same legs in reverse order, each run the other way.
    pub fn reversed(&self) -> GeodeticPath {
        GeodeticPath {
            source: self.target.clone(),
            target: self.source.clone(),
            legs: self
                .legs
                .iter()
                .rev()
                .map(|leg| PathLeg {
                    inverted: !leg.inverted,
                    ..leg.clone()
                })
                .collect(),
        }
    }

    /// Source datum to target datum.
    pub fn apply_forward(&self, p: &Geographic) -> Conversion<Geographic> {
        let mut out = Outcome::ok(*p);
        for leg in &self.legs {
            let next = leg.run(&out.value, false)?;
            out.value = out.absorb(next);
        }
        Ok(out)
    }

    /// Target datum back to source datum.
    pub fn apply_inverse(&self, p: &Geographic) -> Conversion<Geographic> {
        let mut out = Outcome::ok(*p);
        for leg in self.legs.iter().rev() {
            let next = leg.run(&out.value, true)?;
            out.value = out.absorb(next);
        }
        Ok(out)
    }
}

/// Finds and builds paths from dictionary definitions.
pub(crate) struct PathResolver<'a> {
    pub dict: &'a Dictionary,
    pub grids: &'a GridRegistry,
    pub coverage: OutOfCoveragePolicy,
    pub hub: &'a str,
}

impl PathResolver<'_> {
    /// Prefer a dictionary transformation joining the two datums, else compose
    /// source to hub and hub to target.
    pub fn resolve(&self, source: &str, target: &str) -> Result<GeodeticPath, Error> {
        let src = Datum::resolve(self.dict, source)?;
        let trg = Datum::resolve(self.dict, target)?;
        if src.is(trg.key()) {
            return Ok(GeodeticPath::identity(src.key(), trg.key()));
        }
        let transforms: Vec<GeodeticTransformDef> = self.dict.load_all_or_empty()?;
        if let Some(leg) = self.direct(&transforms, &src, &trg)? {
            debug!(from = src.key(), to = trg.key(), via = %leg.name, "direct geodetic path");
            return Ok(GeodeticPath::new(src.key(), trg.key(), vec![leg]));
        }

        let no_path = || Error::NoPath {
            from: src.key().to_string(),
            to: trg.key().to_string(),
        };
        let hub = match Datum::resolve(self.dict, self.hub) {
            Ok(hub) => hub,
            Err(Error::NotFound { .. }) => return Err(no_path()),
            Err(e) => return Err(e),
        };
        let first = match self.direct(&transforms, &src, &hub)? {
            Some(leg) => leg,
            None => self.own_shift(&src, &hub)?.ok_or_else(no_path)?,
        };
        let second = match self.direct(&transforms, &hub, &trg)? {
            Some(leg) => leg,
            None => {
                let mut leg = self.own_shift(&trg, &hub)?.ok_or_else(no_path)?;
                leg.inverted = true;
                leg
            }
        };
        debug!(from = src.key(), to = trg.key(), hub = hub.key(), "geodetic path via hub");
        Ok(GeodeticPath::new(src.key(), trg.key(), vec![first, second]))
    }

    fn own_shift(&self, datum: &Datum, hub: &Datum) -> Result<Option<PathLeg>, Error> {
        Ok(GeodeticStep::to_hub(datum, hub)?.map(|step| PathLeg {
            name: datum.key().to_string(),
            step,
            inverted: false,
            accuracy: 0.0,
        }))
    }

    fn direct(
        &self,
        transforms: &[GeodeticTransformDef],
        src: &Datum,
        trg: &Datum,
    ) -> Result<Option<PathLeg>, Error> {
        let joins = |def: &GeodeticTransformDef, a: &Datum, b: &Datum| {
            a.is(&def.src_dtm) && b.is(&def.trg_dtm)
        };
        if let Some(def) = transforms.iter().find(|d| joins(d, src, trg)) {
            return Ok(Some(self.leg(def, src, trg, false)?));
        }
        if let Some(def) = transforms
            .iter()
            .find(|d| d.inverse_support != 0 && joins(d, trg, src))
        {
            return Ok(Some(self.leg(def, trg, src, true)?));
        }
        Ok(None)
    }

    fn leg(&self, def: &GeodeticTransformDef, src: &Datum, trg: &Datum, inverted: bool) -> Result<PathLeg, Error> {
        Ok(PathLeg {
            name: def.key_nm.clone(),
            step: self.build(def, src, trg, 0)?,
            inverted,
            accuracy: def.accuracy,
        })
    }

    /// Build a transformation with its catalog and fallback chain.
    fn build(&self, def: &GeodeticTransformDef, src: &Datum, trg: &Datum, depth: usize) -> Result<GeodeticStep, Error> {
        if depth > MAX_FALLBACK_DEPTH {
            return Err(Error::Configuration(format!(
                "fallback chain through `{}` does not end",
                def.key_nm
            )));
        }
        let catalog = if def.grid_catalog.is_empty() {
            None
        } else {
            Some(self.grids.catalog(&self.dict.root().join(&def.grid_catalog))?)
        };
        let fallback = match (def.fallback.as_str(), &catalog) {
            ("", Some(catalog)) => catalog.fallback().map(str::to_string),
            ("", None) => None,
            (name, _) => Some(name.to_string()),
        };
        let mut coverage = Coverage::new(self.coverage);
        if let Some(name) = fallback {
            let fb: GeodeticTransformDef = self.dict.load(&name).map_err(|e| match e {
                Error::NotFound { .. } => Error::Configuration(format!(
                    "transformation `{}` falls back to missing `{name}`",
                    def.key_nm
                )),
                other => other,
            })?;
            if compare_keys(&fb.src_dtm, &def.src_dtm).is_ne() || compare_keys(&fb.trg_dtm, &def.trg_dtm).is_ne() {
                return Err(Error::Configuration(format!(
                    "fallback `{}` does not join `{}` to `{}`",
                    fb.key_nm, def.src_dtm, def.trg_dtm
                )));
            }
            let step = self.build(&fb, src, trg, depth + 1)?;
            coverage = coverage.with_fallback(&fb.key_nm, step);
        }
        GeodeticStep::from_def(def, src, trg, catalog, coverage)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::dictionary::{DatumDef, EllipsoidDef, ShiftMethod, TransformMethod};
    use approx::assert_abs_diff_eq;

    fn dictionary(dir: &std::path::Path) -> Dictionary {
        let dict = Dictionary::open(dir);
        dict.store(&EllipsoidDef::from_flattening("WGS84", 6_378_137.0, 298.257_223_563)).unwrap();
        dict.store(&EllipsoidDef::new("CLRK66", 6_378_206.4, 6_356_583.8)).unwrap();
        dict.store(&EllipsoidDef::from_flattening("INTNL", 6_378_388.0, 297.0)).unwrap();
        dict.store(&DatumDef::new("WGS84", "WGS84")).unwrap();
        dict.store(&DatumDef::new("NAD27", "CLRK66").with_shift(ShiftMethod::Molodensky, [-8.0, 160.0, 176.0]))
            .unwrap();
        dict.store(
            &DatumDef::new("ED50", "INTNL").with_shift(ShiftMethod::GeocentricTranslation, [-87.0, -98.0, -121.0]),
        )
        .unwrap();
        dict.store(&DatumDef::new("LOCAL", "WGS84")).unwrap();
        dict
    }

    fn resolver<'a>(dict: &'a Dictionary, grids: &'a GridRegistry) -> PathResolver<'a> {
        PathResolver {
            dict,
            grids,
            coverage: OutOfCoveragePolicy::Unshifted,
            hub: "WGS84",
        }
    }

    #[test]
    fn identity_for_the_same_datum() {
        let dir = tempfile::tempdir().unwrap();
        let dict = dictionary(dir.path());
        let grids = GridRegistry::new(4);
        let path = resolver(&dict, &grids).resolve("wgs84", "WGS84").unwrap();
        assert!(path.is_identity());
        let p = Geographic::with_height(1.0, 2.0, 3.0);
        assert_eq!(path.apply_forward(&p).unwrap().value, p);
    }

    #[test]
    fn composes_through_the_hub_and_back() {
        let dir = tempfile::tempdir().unwrap();
        let dict = dictionary(dir.path());
        let grids = GridRegistry::new(4);
        let r = resolver(&dict, &grids);
        let there = r.resolve("NAD27", "ED50").unwrap();
        assert_eq!(there.legs().len(), 2);
        assert!(!there.legs()[0].inverted);
        assert!(there.legs()[1].inverted);
        assert_eq!(there.accuracy(), None);

        let back = r.resolve("ED50", "NAD27").unwrap();
        let p = Geographic::with_height(-3.7, 40.4, 650.0);
        let q = there.apply_forward(&p).unwrap();
        assert!(q.is_clean());
        assert!(q.value.max_delta(&p) > 1e-4);
        for r in [back.apply_forward(&q.value).unwrap(), there.apply_inverse(&q.value).unwrap()] {
            assert_abs_diff_eq!(r.value.lng, p.lng, epsilon = 1e-8);
            assert_abs_diff_eq!(r.value.lat, p.lat, epsilon = 1e-8);
            assert_abs_diff_eq!(r.value.hgt, p.hgt, epsilon = 1e-3);
        }
        let rev = there.reversed().apply_forward(&q.value).unwrap().value;
        assert_abs_diff_eq!(rev.lat, p.lat, epsilon = 1e-8);
    }

    #[test]
    fn dictionary_transformations_take_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let dict = dictionary(dir.path());
        let mut def = GeodeticTransformDef::new("NAD27_TO_WGS84", "NAD27", "WGS84", TransformMethod::GeocentricTranslation);
        def.delta = [-8.0, 159.0, 175.0];
        def.accuracy = 5.0;
        dict.store(&def).unwrap();
        let grids = GridRegistry::new(4);
        let r = resolver(&dict, &grids);

        let fwd = r.resolve("NAD27", "WGS84").unwrap();
        assert_eq!(fwd.legs()[0].name, "NAD27_TO_WGS84");
        assert_eq!(fwd.accuracy(), Some(5.0));
        let inv = r.resolve("WGS84", "NAD27").unwrap();
        assert_eq!(inv.legs()[0].name, "NAD27_TO_WGS84");
        assert!(inv.legs()[0].inverted);

        def.inverse_support = 0;
        dict.store(&def).unwrap();
        let inv = r.resolve("WGS84", "NAD27").unwrap();
        assert_eq!(inv.legs()[0].name, "NAD27");
    }

    #[test]
    fn fallback_chain_is_checked() {
        let dir = tempfile::tempdir().unwrap();
        let dict = dictionary(dir.path());
        let mut a = GeodeticTransformDef::new("A", "NAD27", "WGS84", TransformMethod::MultipleRegression);
        a.fallback = "B".into();
        a.rng_min = [-100.0, 30.0];
        a.rng_max = [-90.0, 40.0];
        let mut b = GeodeticTransformDef::new("B", "NAD27", "WGS84", TransformMethod::Molodensky);
        b.delta = [-8.0, 160.0, 176.0];
        dict.store(&a).unwrap();
        dict.store(&b).unwrap();
        let grids = GridRegistry::new(4);
        let path = resolver(&dict, &grids).resolve("NAD27", "WGS84").unwrap();
        let res = path.apply_forward(&Geographic::new(-120.0, 45.0)).unwrap();
        assert!(res.fallback_applied());

        b.fallback = "A".into();
        b.method = TransformMethod::MultipleRegression.code();
        dict.store(&b).unwrap();
        assert!(matches!(
            resolver(&dict, &grids).resolve("NAD27", "WGS84"),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn unrelated_datums_have_no_path() {
        let dir = tempfile::tempdir().unwrap();
        let dict = dictionary(dir.path());
        let grids = GridRegistry::new(4);
        assert!(matches!(
            resolver(&dict, &grids).resolve("LOCAL", "ED50"),
            Err(Error::NoPath { .. })
        ));
        assert!(matches!(
            resolver(&dict, &grids).resolve("NOPE", "ED50"),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn pathological_heights_fail_instead_of_looping() {
        let dir = tempfile::tempdir().unwrap();
        let dict = dictionary(dir.path());
        let grids = GridRegistry::new(4);
        let path = resolver(&dict, &grids).resolve("NAD27", "ED50").unwrap();
        let p = Geographic::with_height(-3.7, 40.4, -1e9);
        assert!(path.apply_forward(&p).is_err());
        assert!(path.apply_inverse(&p).is_err());
    }
}
