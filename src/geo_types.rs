use crate::convert::{Coord, CoordinateType};

///```rust
/// use geoconv::Coord;
///
/// let c = geo_types::coord! { x: 578_815.3f64, y: 4_983_436.8f64 };
/// assert_eq!(Coord::x(&c), 578_815.3);
/// let back: geo_types::Coord<f64> = Coord::from_xy(1.0, 2.0);
/// assert_eq!(back, geo_types::coord! { x: 1.0, y: 2.0 });
/// ```
impl<T: CoordinateType> Coord<T> for geo_types::Coord<T> {
    fn x(&self) -> T {
        self.x
    }
    fn y(&self) -> T {
        self.y
    }
    fn from_xy(x: T, y: T) -> Self {
        Self { x, y }
    }
}

///```rust
/// use geoconv::Coord;
/// use geo_types::Point;
///
/// let p: Point<f32> = Coord::from_xy(-122.0, 45.0);
/// assert_eq!(p.x(), -122.0);
/// assert_eq!(Coord::y(&p), 45.0);
/// ```
impl<T: CoordinateType> Coord<T> for geo_types::Point<T> {
    fn x(&self) -> T {
        geo_types::Point::x(*self)
    }
    fn y(&self) -> T {
        geo_types::Point::y(*self)
    }
    fn from_xy(x: T, y: T) -> Self {
        Self::new(x, y)
    }
}
