// shape.rs — The (rows, cols) shape model
//
// A dimension is either a known non-negative count or unknown. The unknown
// sentinel is a distinct variant, so no other "negative" value can exist.
//
// Preconditions: none (types only).
// Postconditions: arithmetic on `Dim` propagates unknown.
// Failure modes: none.
// Side effects: none.

use std::fmt;

use serde::{Deserialize, Serialize};

// ── Dim ─────────────────────────────────────────────────────────────────────

/// One dimension of a shape: a row or column count.
///
/// Serialized as `null` when unknown and as a plain integer otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "Option<u64>", into = "Option<u64>")]
pub enum Dim {
    Known(u64),
    #[default]
    Unknown,
}

impl Dim {
    pub fn is_known(self) -> bool {
        matches!(self, Dim::Known(_))
    }

    pub fn known(self) -> Option<u64> {
        match self {
            Dim::Known(n) => Some(n),
            Dim::Unknown => None,
        }
    }

    /// Build a dimension from a signed count; negative values mean unknown.
    pub fn from_signed(n: i64) -> Dim {
        u64::try_from(n).map_or(Dim::Unknown, Dim::Known)
    }

    /// Product of two dimensions, unknown if either side is unknown or the
    /// product overflows.
    pub fn times(self, other: Dim) -> Dim {
        match (self, other) {
            (Dim::Known(a), Dim::Known(b)) => a.checked_mul(b).map_or(Dim::Unknown, Dim::Known),
            _ => Dim::Unknown,
        }
    }

    /// Sum of two dimensions, unknown if either side is unknown.
    pub fn plus(self, other: Dim) -> Dim {
        match (self, other) {
            (Dim::Known(a), Dim::Known(b)) => a.checked_add(b).map_or(Dim::Unknown, Dim::Known),
            _ => Dim::Unknown,
        }
    }

    /// The common value of two dimensions, or unknown when they differ.
    pub fn meet(self, other: Dim) -> Dim {
        if self == other {
            self
        } else {
            Dim::Unknown
        }
    }

    /// At least one side unknown, or both equal.
    pub fn compatible(self, other: Dim) -> bool {
        match (self, other) {
            (Dim::Known(a), Dim::Known(b)) => a == b,
            _ => true,
        }
    }
}

impl From<u64> for Dim {
    fn from(n: u64) -> Self {
        Dim::Known(n)
    }
}

impl From<Option<u64>> for Dim {
    fn from(n: Option<u64>) -> Self {
        n.map_or(Dim::Unknown, Dim::Known)
    }
}

impl From<Dim> for Option<u64> {
    fn from(d: Dim) -> Self {
        d.known()
    }
}

impl fmt::Display for Dim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dim::Known(n) => write!(f, "{n}"),
            Dim::Unknown => write!(f, "?"),
        }
    }
}

// ── ShapePair ───────────────────────────────────────────────────────────────

/// The inferred `(rows, cols)` fact for one IR value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ShapePair {
    pub rows: Dim,
    pub cols: Dim,
}

impl ShapePair {
    pub const UNKNOWN: ShapePair = ShapePair {
        rows: Dim::Unknown,
        cols: Dim::Unknown,
    };

    pub const SCALAR: ShapePair = ShapePair {
        rows: Dim::Known(1),
        cols: Dim::Known(1),
    };

    pub fn new(rows: Dim, cols: Dim) -> Self {
        Self { rows, cols }
    }

    pub fn known(rows: u64, cols: u64) -> Self {
        Self::new(Dim::Known(rows), Dim::Known(cols))
    }

    pub fn with_rows(self, rows: Dim) -> Self {
        Self { rows, ..self }
    }

    pub fn with_cols(self, cols: Dim) -> Self {
        Self { cols, ..self }
    }

    pub fn is_fully_known(&self) -> bool {
        self.rows.is_known() && self.cols.is_known()
    }

    /// Fieldwise: at least one side unknown or both equal.
    pub fn compatible(&self, other: &ShapePair) -> bool {
        self.rows.compatible(other.rows) && self.cols.compatible(other.cols)
    }

    /// Fieldwise equal-or-unknown combination.
    pub fn meet(&self, other: &ShapePair) -> ShapePair {
        ShapePair {
            rows: self.rows.meet(other.rows),
            cols: self.cols.meet(other.cols),
        }
    }

    pub fn dim(&self, axis: Axis) -> Dim {
        match axis {
            Axis::Rows => self.rows,
            Axis::Cols => self.cols,
        }
    }

    pub fn with_dim(self, axis: Axis, dim: Dim) -> ShapePair {
        match axis {
            Axis::Rows => self.with_rows(dim),
            Axis::Cols => self.with_cols(dim),
        }
    }
}

impl fmt::Display for ShapePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.rows, self.cols)
    }
}

/// Which dimension of a shape a rule or error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Axis {
    Rows,
    Cols,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::Rows => write!(f, "rows"),
            Axis::Cols => write!(f, "columns"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_propagates_through_arithmetic() {
        assert_eq!(Dim::Known(3).times(Dim::Known(4)), Dim::Known(12));
        assert_eq!(Dim::Known(3).times(Dim::Unknown), Dim::Unknown);
        assert_eq!(Dim::Unknown.plus(Dim::Known(2)), Dim::Unknown);
        assert_eq!(Dim::Known(u64::MAX).plus(Dim::Known(1)), Dim::Unknown);
    }

    #[test]
    fn negative_counts_become_unknown() {
        assert_eq!(Dim::from_signed(-1), Dim::Unknown);
        assert_eq!(Dim::from_signed(0), Dim::Known(0));
        assert_eq!(Dim::from_signed(7), Dim::Known(7));
    }

    #[test]
    fn compatibility() {
        let a = ShapePair::known(3, 4);
        assert!(a.compatible(&ShapePair::new(Dim::Unknown, Dim::Known(4))));
        assert!(a.compatible(&ShapePair::UNKNOWN));
        assert!(!a.compatible(&ShapePair::known(3, 5)));
    }

    #[test]
    fn meet_keeps_agreeing_fields() {
        let a = ShapePair::known(3, 4);
        let b = ShapePair::known(3, 5);
        assert_eq!(a.meet(&b), ShapePair::new(Dim::Known(3), Dim::Unknown));
    }

    #[test]
    fn display_uses_question_mark() {
        assert_eq!(ShapePair::new(Dim::Unknown, Dim::Known(1)).to_string(), "?x1");
        assert_eq!(ShapePair::known(10, 3).to_string(), "10x3");
    }

    #[test]
    fn serializes_unknown_as_null() {
        let json = serde_json::to_string(&ShapePair::new(Dim::Known(5), Dim::Unknown)).unwrap();
        assert_eq!(json, r#"{"rows":5,"cols":null}"#);
    }
}
