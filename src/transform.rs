use crate::context::Engine;
use crate::convert::{Converter, CoordinateType};
use crate::error::{Conversion, Outcome, Warning};

/// Convert a geometry between coordinate systems.
pub trait Transform<T> {
    type Output;

    /// Transform a geometry in place, returning the warnings collected on the way.
    ///
    #[cfg_attr(feature = "geo-types", doc = r##"
# Examples

```
use geoconv::{Engine, EngineConfig, Transform};
use geoconv::dictionary::{CoordSystemDef, DatumDef, EllipsoidDef};
# use approx::assert_relative_eq;

let dir = tempfile::tempdir().unwrap();
let engine = Engine::new(EngineConfig::new(dir.path())).unwrap();
engine.store(&EllipsoidDef::from_flattening("WGS84", 6_378_137.0, 298.257_223_563)).unwrap();
engine.store(&DatumDef::new("WGS84", "WGS84")).unwrap();
engine.store(&CoordSystemDef::new("LL84", "LL", "DEGREE").on_datum("WGS84")).unwrap();
let mut utm = CoordSystemDef::new("UTM84-10N", "UTM", "METER").on_datum("WGS84");
utm.prj_prms[0] = 10.0;
utm.prj_prms[1] = 1.0;
engine.store(&utm).unwrap();

let mut point = geo_types::point!(x: -122.0f64, y: 45.0f64);
let converter = engine.converter("LL84", "UTM84-10N").unwrap();
assert!(point.transform(&converter).unwrap().is_clean());
assert_relative_eq!(point, geo_types::point!(x: 578_815.303, y: 4_983_436.768), epsilon = 1e-3);
```
"##)]
    fn transform(&mut self, converter: &Converter) -> Conversion<()>;

    /// Immutable flavor of [`Transform::transform`], which allocates a new geometry.
    fn transformed(&self, converter: &Converter) -> Conversion<Self::Output>;

    /// Transform a geometry in place between two coordinate systems named by key.
    fn transform_cs_to_cs(&mut self, engine: &Engine, source: &str, target: &str) -> Conversion<()> {
        let converter = engine.converter(source, target)?;
        self.transform(&converter)
    }

    /// Immutable flavor of [`Transform::transform_cs_to_cs`].
    fn transformed_cs_to_cs(
        &self,
        engine: &Engine,
        source: &str,
        target: &str,
    ) -> Conversion<Self::Output> {
        let converter = engine.converter(source, target)?;
        self.transformed(&converter)
    }
}

fn merge(into: &mut Vec<Warning>, from: Vec<Warning>) {
    for w in from {
        if !into.contains(&w) {
            into.push(w);
        }
    }
}

#[cfg(feature = "geo-types")]
mod geo_impls {
    use super::*;
    use geo_types::{
        Coord, Line, LineString, MultiLineString, MultiPoint, MultiPolygon, Point, Polygon,
    };

    macro_rules! transformed_by_clone {
        () => {
            fn transformed(&self, converter: &Converter) -> Conversion<Self::Output> {
                let mut geometry = self.clone();
                let out = geometry.transform(converter)?;
                Ok(out.map(|()| geometry))
            }
        };
    }

    impl<T: CoordinateType> Transform<T> for Coord<T> {
        type Output = Self;

        fn transform(&mut self, converter: &Converter) -> Conversion<()> {
            let out = converter.convert(*self)?;
            *self = out.value;
            Ok(Outcome {
                value: (),
                warnings: out.warnings,
            })
        }

        transformed_by_clone!();
    }

    impl<T: CoordinateType> Transform<T> for Point<T> {
        type Output = Self;

        fn transform(&mut self, converter: &Converter) -> Conversion<()> {
            self.0.transform(converter)
        }

        transformed_by_clone!();
    }

    impl<T: CoordinateType> Transform<T> for Line<T> {
        type Output = Self;

        fn transform(&mut self, converter: &Converter) -> Conversion<()> {
            let mut ends = [self.start, self.end];
            let warnings = converter.convert_array(&mut ends)?.warnings;
            (self.start, self.end) = (ends[0], ends[1]);
            Ok(Outcome {
                value: (),
                warnings,
            })
        }

        transformed_by_clone!();
    }

    impl<T: CoordinateType> Transform<T> for LineString<T> {
        type Output = Self;

        fn transform(&mut self, converter: &Converter) -> Conversion<()> {
            Ok(converter.convert_array(&mut self.0)?.map(|_| ()))
        }

        transformed_by_clone!();
    }

    impl<T: CoordinateType> Transform<T> for Polygon<T> {
        type Output = Self;

        fn transform(&mut self, converter: &Converter) -> Conversion<()> {
            let mut warnings = Vec::new();
            let mut failure = None;
            self.exterior_mut(|ring| match ring.transform(converter) {
                Ok(out) => merge(&mut warnings, out.warnings),
                Err(e) => failure = Some(e),
            });
            if let Some(e) = failure {
                return Err(e);
            }
            self.interiors_mut(|rings| {
                for ring in rings {
                    match ring.transform(converter) {
                        Ok(out) => merge(&mut warnings, out.warnings),
                        Err(e) => {
                            failure = Some(e);
                            return;
                        }
                    }
                }
            });
            match failure {
                Some(e) => Err(e),
                None => Ok(Outcome {
                    value: (),
                    warnings,
                }),
            }
        }

        transformed_by_clone!();
    }

    macro_rules! transform_each {
        ($($multi:ident),*) => {
            $(
                impl<T: CoordinateType> Transform<T> for $multi<T> {
                    type Output = Self;

                    fn transform(&mut self, converter: &Converter) -> Conversion<()> {
                        let mut warnings = Vec::new();
                        for part in self.0.iter_mut() {
                            merge(&mut warnings, part.transform(converter)?.warnings);
                        }
                        Ok(Outcome {
                            value: (),
                            warnings,
                        })
                    }

                    transformed_by_clone!();
                }
            )*
        };
    }

    transform_each!(MultiPoint, MultiLineString, MultiPolygon);
}

#[cfg(all(test, feature = "geo-types"))]
mod test {
    use super::*;
    use crate::config::EngineConfig;
    use crate::dictionary::{CoordSystemDef, DatumDef, EllipsoidDef};
    use approx::assert_relative_eq;
    use geo_types::{Line, LineString, MultiPoint, Point, Polygon, coord, line_string, point, polygon};

    fn engine(dir: &std::path::Path) -> Engine {
        let engine = Engine::new(EngineConfig::new(dir)).unwrap();
        engine
            .store(&EllipsoidDef::from_flattening("WGS84", 6_378_137.0, 298.257_223_563))
            .unwrap();
        engine.store(&DatumDef::new("WGS84", "WGS84")).unwrap();
        engine
            .store(&CoordSystemDef::new("LL84", "LL", "DEGREE").on_datum("WGS84"))
            .unwrap();
        let mut merc = CoordSystemDef::new("WORLD-MERC", "MRCAT", "METER").on_datum("WGS84");
        merc.org_lng = 0.0;
        merc.scl_red = 1.0;
        engine.store(&merc).unwrap();
        engine
    }

    #[test]
    fn line_string_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        let original: LineString<f64> = line_string![(x: 10.0, y: 20.0), (x: -30.0, y: 60.0)];
        let projected = original
            .transformed_cs_to_cs(&engine, "LL84", "WORLD-MERC")
            .unwrap()
            .value;
        assert_relative_eq!(projected.0[0].x, 1_113_194.907_932_7, epsilon = 1e-6);
        let mut back = projected.clone();
        back.transform_cs_to_cs(&engine, "WORLD-MERC", "LL84").unwrap();
        assert_relative_eq!(back, original, epsilon = 1e-9);
    }

    #[test]
    fn line_ends_are_both_converted() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        let converter = engine.converter("LL84", "WORLD-MERC").unwrap();
        let mut line = Line::new(coord! { x: 10.0, y: 0.0 }, coord! { x: 1.0, y: 0.0 });
        assert!(line.transform(&converter).unwrap().is_clean());
        assert_relative_eq!(line.start.x, 1_113_194.907_932_7, epsilon = 1e-6);
        assert_relative_eq!(line.end.x, 111_319.490_793_27, epsilon = 1e-6);
        assert_relative_eq!(line.end.y, 0.0, epsilon = 1e-6);

        let back = line.transformed_cs_to_cs(&engine, "WORLD-MERC", "LL84").unwrap();
        assert_relative_eq!(back.value.start.x, 10.0, epsilon = 1e-9);
        assert_relative_eq!(back.value.end.x, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn polygon_and_multi_point() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        let converter = engine.converter("LL84", "WORLD-MERC").unwrap();
        let poly: Polygon<f64> = polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0)];
        let out = poly.transformed(&converter).unwrap();
        assert!(out.is_clean());
        assert_relative_eq!(out.value.exterior().0[1].x, 111_319.490_793_27, epsilon = 1e-6);

        // Mercator clamps the pole and says so once.
        let mut points = MultiPoint(vec![point!(x: 0.0, y: 90.0), point!(x: 1.0, y: 90.0)]);
        let res = points.transform(&converter).unwrap();
        assert_eq!(res.warnings.len(), 1);
        assert!(matches!(res.warnings[0], Warning::OutOfDomain(_)));
        let p: Point<f64> = points.0[0];
        assert!(p.y().is_finite());
    }
}
