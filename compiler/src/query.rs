// query.rs — Shape and constant queries shared by rules and traits
//
// Free functions over an operation and a `ShapeEnv`. Errors always carry the
// querying operation's mnemonic and span.
//
// Preconditions: operand types are resolved by the environment.
// Postconditions: unknown inputs yield `Dim::Unknown`, never an error.
// Failure modes: `ShapeMismatch` on disagreeing known counts;
//   `UnsupportedValueKind` when a shape is requested for an unknown-kind value;
//   `MissingOperand` when an operand index is out of range.
// Side effects: none.

use crate::env::ShapeEnv;
use crate::error::ShapeError;
use crate::id::ValueId;
use crate::ir::{Constant, Operation, ValueKind};
use crate::shape::{Axis, Dim, ShapePair};

// ── Operands ────────────────────────────────────────────────────────────────

/// The `index`-th operand of `op`.
pub fn operand(op: &Operation, index: usize) -> Result<ValueId, ShapeError> {
    op.operands
        .get(index)
        .copied()
        .ok_or(ShapeError::MissingOperand {
            op: op.kind.mnemonic(),
            index,
            count: op.operands.len(),
            span: op.span,
        })
}

// ── Shapes ──────────────────────────────────────────────────────────────────

/// Shape of `value` as seen by `op`: scalars are `1x1`, columns `Rx1`.
pub fn get_shape(op: &Operation, env: &dyn ShapeEnv, value: ValueId) -> Result<ShapePair, ShapeError> {
    match env.classify(value) {
        ValueKind::Scalar => Ok(ShapePair::SCALAR),
        ValueKind::Matrix | ValueKind::Frame => Ok(env.shape_of(value)),
        ValueKind::Column => Ok(env.shape_of(value).with_cols(Dim::Known(1))),
        kind @ ValueKind::Unknown => Err(ShapeError::UnsupportedValueKind {
            op: op.kind.mnemonic(),
            index: op.operands.iter().position(|&v| v == value),
            kind,
            span: op.span,
        }),
    }
}

/// Shape of the `index`-th operand.
pub fn operand_shape(op: &Operation, env: &dyn ShapeEnv, index: usize) -> Result<ShapePair, ShapeError> {
    get_shape(op, env, operand(op, index)?)
}

/// Common extent along `axis`: all known counts must agree, and any unknown
/// count makes the result unknown.
fn infer_from_args(
    op: &Operation,
    env: &dyn ShapeEnv,
    values: &[ValueId],
    axis: Axis,
) -> Result<Dim, ShapeError> {
    let mut agreed: Option<u64> = None;
    let mut some_unknown = values.is_empty();
    for &v in values {
        match get_shape(op, env, v)?.dim(axis) {
            Dim::Unknown => some_unknown = true,
            Dim::Known(n) => match agreed {
                None => agreed = Some(n),
                Some(first) if first != n => {
                    return Err(ShapeError::ShapeMismatch {
                        op: op.kind.mnemonic(),
                        axis,
                        first,
                        second: n,
                        span: op.span,
                    })
                }
                Some(_) => {}
            },
        }
    }
    Ok(if some_unknown { Dim::Unknown } else { Dim::from(agreed) })
}

pub fn infer_rows_from_args(op: &Operation, env: &dyn ShapeEnv, values: &[ValueId]) -> Result<Dim, ShapeError> {
    infer_from_args(op, env, values, Axis::Rows)
}

pub fn infer_cols_from_args(op: &Operation, env: &dyn ShapeEnv, values: &[ValueId]) -> Result<Dim, ShapeError> {
    infer_from_args(op, env, values, Axis::Cols)
}

/// Sum of the extents along `axis`; a single unknown makes it unknown.
fn infer_from_sum_of_args(
    op: &Operation,
    env: &dyn ShapeEnv,
    values: &[ValueId],
    axis: Axis,
) -> Result<Dim, ShapeError> {
    let mut sum = Dim::Known(0);
    for &v in values {
        sum = sum.plus(get_shape(op, env, v)?.dim(axis));
        if sum == Dim::Unknown {
            break;
        }
    }
    Ok(sum)
}

pub fn infer_rows_from_sum_of_args(
    op: &Operation,
    env: &dyn ShapeEnv,
    values: &[ValueId],
) -> Result<Dim, ShapeError> {
    infer_from_sum_of_args(op, env, values, Axis::Rows)
}

pub fn infer_cols_from_sum_of_args(
    op: &Operation,
    env: &dyn ShapeEnv,
    values: &[ValueId],
) -> Result<Dim, ShapeError> {
    infer_from_sum_of_args(op, env, values, Axis::Cols)
}

// ── Constants ───────────────────────────────────────────────────────────────

/// Primitive types a compile-time constant can be read as.
pub trait FromConstant: Sized {
    fn from_constant(c: &Constant) -> Option<Self>;
}

impl FromConstant for bool {
    fn from_constant(c: &Constant) -> Option<Self> {
        match c {
            Constant::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl FromConstant for i64 {
    fn from_constant(c: &Constant) -> Option<Self> {
        match c {
            Constant::Int(n) => Some(*n),
            Constant::UInt(n) => i64::try_from(*n).ok(),
            _ => None,
        }
    }
}

impl FromConstant for u64 {
    fn from_constant(c: &Constant) -> Option<Self> {
        match c {
            Constant::UInt(n) => Some(*n),
            Constant::Int(n) => u64::try_from(*n).ok(),
            _ => None,
        }
    }
}

impl FromConstant for f64 {
    fn from_constant(c: &Constant) -> Option<Self> {
        match c {
            Constant::Float(f) => Some(*f),
            _ => None,
        }
    }
}

impl FromConstant for f32 {
    fn from_constant(c: &Constant) -> Option<Self> {
        match c {
            Constant::Float(f) => Some(*f as f32),
            _ => None,
        }
    }
}

impl FromConstant for String {
    fn from_constant(c: &Constant) -> Option<Self> {
        match c {
            Constant::Str(s) => Some(s.clone()),
            _ => None,
        }
    }
}

/// The value of `value` as a `T` constant, if it is one.
pub fn constant_as<T: FromConstant>(env: &dyn ShapeEnv, value: ValueId) -> Option<T> {
    env.constant(value).and_then(T::from_constant)
}

/// An integer constant as a dimension; negative or non-constant is unknown.
pub fn constant_dim(env: &dyn ShapeEnv, value: ValueId) -> Dim {
    constant_as::<i64>(env, value).map_or(Dim::Unknown, Dim::from_signed)
}

// ── Frame labels ────────────────────────────────────────────────────────────

/// Source-frame prefix of a label: the text before the first `.`.
pub fn frame_name(label: &str) -> &str {
    label.split_once('.').map_or(label, |(frame, _)| frame)
}

/// A column selector label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelPattern<'a> {
    /// `*`: every column.
    All,
    /// `<frame>.*`: every column of one source frame.
    FrameWildcard(&'a str),
    /// Any other label, naming one column.
    Exact(&'a str),
}

impl<'a> LabelPattern<'a> {
    pub fn parse(label: &'a str) -> Self {
        if label == "*" {
            return LabelPattern::All;
        }
        match label.split_once('.') {
            Some((frame, "*")) => LabelPattern::FrameWildcard(frame),
            _ => LabelPattern::Exact(label),
        }
    }

    pub fn is_wildcard(self) -> bool {
        !matches!(self, LabelPattern::Exact(_))
    }

    /// Number of columns selected from a frame with `labels`. An exact
    /// label always selects one column.
    pub fn count_in(self, labels: &[String]) -> u64 {
        match self {
            LabelPattern::All => labels.len() as u64,
            LabelPattern::FrameWildcard(frame) => {
                labels.iter().filter(|l| frame_name(l) == frame).count() as u64
            }
            LabelPattern::Exact(_) => 1,
        }
    }
}
