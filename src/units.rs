//! Units of measure recognised in coordinate system definitions.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    Linear,
    Angular,
}

/// `factor` is metres per unit for linear units and degrees per unit for angular ones.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Unit {
    pub name: &'static str,
    pub kind: UnitKind,
    pub factor: f64,
}

#[rustfmt::skip]
const UNITS: &[Unit] = &[
    Unit { name: "METER", kind: UnitKind::Linear, factor: 1.0 },
    Unit { name: "KILOMETER", kind: UnitKind::Linear, factor: 1000.0 },
    Unit { name: "CENTIMETER", kind: UnitKind::Linear, factor: 0.01 },
    Unit { name: "FOOT", kind: UnitKind::Linear, factor: 0.3048 },
    Unit { name: "IFOOT", kind: UnitKind::Linear, factor: 0.3048 },
    Unit { name: "US FOOT", kind: UnitKind::Linear, factor: 1200.0 / 3937.0 },
    Unit { name: "USFOOT", kind: UnitKind::Linear, factor: 1200.0 / 3937.0 },
    Unit { name: "YARD", kind: UnitKind::Linear, factor: 0.9144 },
    Unit { name: "CHAIN", kind: UnitKind::Linear, factor: 20.1168 },
    Unit { name: "MILE", kind: UnitKind::Linear, factor: 1609.344 },
    Unit { name: "NAUT-MILE", kind: UnitKind::Linear, factor: 1852.0 },
    Unit { name: "DEGREE", kind: UnitKind::Angular, factor: 1.0 },
    Unit { name: "GRAD", kind: UnitKind::Angular, factor: 0.9 },
    Unit { name: "MINUTE", kind: UnitKind::Angular, factor: 1.0 / 60.0 },
    Unit { name: "SECOND", kind: UnitKind::Angular, factor: 1.0 / 3600.0 },
    Unit { name: "RADIAN", kind: UnitKind::Angular, factor: 180.0 / std::f64::consts::PI },
];

/// Find a unit by name, ignoring ASCII case.
pub fn lookup(name: &str) -> Option<&'static Unit> {
    let name = name.trim();
    UNITS.iter().find(|u| u.name.eq_ignore_ascii_case(name))
}
