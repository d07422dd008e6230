use std::{fmt, io, path::PathBuf};
use thiserror::Error;

/// Fatal outcomes of dictionary access, activation and conversion.
///
/// Anything that still produced a usable coordinate is reported as a [`Warning`]
/// inside an [`Outcome`] instead.
#[derive(Error, Debug)]
pub enum Error {
    /// A dictionary definition is missing a parameter or carries an absurd value.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Bad magic number, truncated record or malformed descriptor.
    #[error("format error in {}: {reason}", .path.display())]
    Format { path: PathBuf, reason: String },
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The coordinate lies outside any domain the math can be stretched to.
    #[error("coordinate out of range: {0}")]
    Range(String),
    #[error(
        "iteration failed after {iterations} iterations: residual {residual:e} exceeds threshold {threshold:e}"
    )]
    ConvergenceFatal {
        residual: f64,
        threshold: f64,
        iterations: usize,
    },
    #[error("{kind} `{key}` not found")]
    NotFound { kind: &'static str, key: String },
    #[error("no geodetic path from `{from}` to `{to}`")]
    NoPath { from: String, to: String },
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn format(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::Format {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// A non-fatal condition attached to a converted value.
#[derive(Debug, Clone, PartialEq)]
pub enum Warning {
    /// An iterative inverse stopped short of its epsilon but within its error threshold.
    NotConverged { residual: f64, iterations: usize },
    /// The input left the projection's domain and was clamped to the nearest defined value.
    OutOfDomain(String),
    /// The point lies outside the coordinate system's declared useful range.
    OutsideUsefulRange,
    /// No correction data covers the point; the coordinate was passed through unshifted.
    Unshifted(String),
    /// A lower precision technique was substituted for missing correction data.
    FallbackApplied { technique: String },
}

impl Warning {
    fn bit(&self) -> u8 {
        match self {
            Warning::NotConverged { .. } => WarningMask::NOT_CONVERGED.0,
            Warning::OutOfDomain(_) => WarningMask::OUT_OF_DOMAIN.0,
            Warning::OutsideUsefulRange => WarningMask::USEFUL_RANGE.0,
            Warning::Unshifted(_) => WarningMask::UNSHIFTED.0,
            Warning::FallbackApplied { .. } => WarningMask::FALLBACK.0,
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::NotConverged {
                residual,
                iterations,
            } => write!(
                f,
                "not converged after {iterations} iterations (residual {residual:e})"
            ),
            Warning::OutOfDomain(msg) => write!(f, "outside projection domain: {msg}"),
            Warning::OutsideUsefulRange => f.write_str("outside useful range"),
            Warning::Unshifted(msg) => write!(f, "no correction applied: {msg}"),
            Warning::FallbackApplied { technique } => {
                write!(f, "fallback technique `{technique}` applied")
            }
        }
    }
}

/// Set of warning kinds to drop before results reach the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WarningMask(u8);

impl WarningMask {
    pub const NONE: WarningMask = WarningMask(0);
    pub const NOT_CONVERGED: WarningMask = WarningMask(1);
    pub const OUT_OF_DOMAIN: WarningMask = WarningMask(1 << 1);
    pub const USEFUL_RANGE: WarningMask = WarningMask(1 << 2);
    pub const UNSHIFTED: WarningMask = WarningMask(1 << 3);
    pub const FALLBACK: WarningMask = WarningMask(1 << 4);

    pub fn union(self, other: WarningMask) -> WarningMask {
        WarningMask(self.0 | other.0)
    }

    pub fn suppresses(&self, warning: &Warning) -> bool {
        self.0 & warning.bit() != 0
    }

    /// Remove suppressed warnings from an outcome.
    pub fn apply<T>(&self, mut outcome: Outcome<T>) -> Outcome<T> {
        if self.0 != 0 {
            outcome.warnings.retain(|w| !self.suppresses(w));
        }
        outcome
    }
}

impl std::ops::BitOr for WarningMask {
    type Output = WarningMask;

    fn bitor(self, rhs: WarningMask) -> WarningMask {
        self.union(rhs)
    }
}

/// A converted value together with every warning raised while producing it.
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub struct Outcome<T> {
    pub value: T,
    pub warnings: Vec<Warning>,
}

/// The result of any operation that may degrade gracefully.
pub type Conversion<T> = Result<Outcome<T>, Error>;

impl<T> Outcome<T> {
    pub fn ok(value: T) -> Self {
        Outcome {
            value,
            warnings: Vec::new(),
        }
    }

    pub fn warn(value: T, warning: Warning) -> Self {
        Outcome {
            value,
            warnings: vec![warning],
        }
    }

    pub fn with(mut self, warning: Warning) -> Self {
        self.warnings.push(warning);
        self
    }

    /// `true` when no warning was raised.
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn fallback_applied(&self) -> bool {
        self.warnings
            .iter()
            .any(|w| matches!(w, Warning::FallbackApplied { .. }))
    }

    pub fn unshifted(&self) -> bool {
        self.warnings.iter().any(|w| matches!(w, Warning::Unshifted(_)))
    }

    pub fn into_value(self) -> T {
        self.value
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        Outcome {
            value: f(self.value),
            warnings: self.warnings,
        }
    }

    /// Chain a further fallible step, carrying the warnings collected so far.
    pub fn and_then<U>(self, f: impl FnOnce(T) -> Conversion<U>) -> Conversion<U> {
        let mut next = f(self.value)?;
        let mut warnings = self.warnings;
        warnings.append(&mut next.warnings);
        Ok(Outcome {
            value: next.value,
            warnings,
        })
    }

    /// Move another outcome's warnings into this one and return its value.
    pub(crate) fn absorb<U>(&mut self, other: Outcome<U>) -> U {
        self.warnings.extend(other.warnings);
        other.value
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn and_then_accumulates_warnings() {
        let first = Outcome::warn(1.0, Warning::OutsideUsefulRange);
        let chained = first
            .and_then(|v| {
                Ok(Outcome::warn(
                    v * 2.0,
                    Warning::FallbackApplied {
                        technique: "MOLODENSKY".into(),
                    },
                ))
            })
            .unwrap();
        assert_eq!(chained.value, 2.0);
        assert_eq!(chained.warnings.len(), 2);
        assert!(chained.fallback_applied());
        assert!(!chained.unshifted());
    }

    #[test]
    fn and_then_propagates_fatal() {
        let res: Conversion<f64> =
            Outcome::ok(1.0).and_then(|_| Err(Error::Range("pole".into())));
        assert!(matches!(res, Err(Error::Range(_))));
    }

    #[test]
    fn mask_drops_only_selected_kinds() {
        let outcome = Outcome::ok(())
            .with(Warning::OutsideUsefulRange)
            .with(Warning::Unshifted("no grid".into()));
        let filtered = WarningMask::USEFUL_RANGE.apply(outcome);
        assert_eq!(filtered.warnings, vec![Warning::Unshifted("no grid".into())]);
    }

    #[test]
    fn error_messages_name_the_problem() {
        let e = Error::NotFound {
            kind: "datum",
            key: "NAD27".into(),
        };
        assert_eq!(e.to_string(), "datum `NAD27` not found");
        let e = Error::format("Datums.csd", "bad magic number");
        assert_eq!(e.to_string(), "format error in Datums.csd: bad magic number");
    }
}
