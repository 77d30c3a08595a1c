// shape_traits.rs — Declarative shape traits and the engine applying them
//
// A single-result operation kind without a bespoke rule declares a set of
// traits. The engine starts from a fully unknown shape and applies the
// declared traits in a fixed stage order; later traits overwrite only the
// fields they govern. Row-only and column-only hooks run last.
//
// Preconditions: the operation has exactly one result.
// Postconditions: the returned shape depends only on the operation and the
//   environment.
// Failure modes: errors from shape queries (`ShapeMismatch`,
//   `UnsupportedValueKind`, `MissingOperand`) and from hooks.
// Side effects: none.

use crate::env::ShapeEnv;
use crate::error::ShapeError;
use crate::ir::Operation;
use crate::query::{
    constant_dim, infer_cols_from_args, infer_cols_from_sum_of_args, infer_rows_from_args,
    infer_rows_from_sum_of_args, operand, operand_shape,
};
use crate::shape::{Dim, ShapePair};

/// One declarative shape relation. Indexed variants name an operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeTrait {
    OneRow,
    OneCol,
    /// Rows equal the integer constant bound to operand `i`.
    RowsFromScalar(usize),
    ColsFromScalar(usize),
    /// Rows copied from operand `i`'s rows.
    RowsFromArg(usize),
    ColsFromArg(usize),
    /// Rows copied from operand `i`'s columns.
    RowsFromArgCols(usize),
    /// Columns copied from operand `i`'s rows.
    ColsFromArgRows(usize),
    RowsFromAllArgs,
    ColsFromAllArgs,
    RowsFromSumOfArgs,
    ColsFromSumOfArgs,
    /// Whole shape copied from operand `i`.
    ShapeFromArg(usize),
    /// Element-wise binary operation without broadcasting.
    EwBinary,
}

impl ShapeTrait {
    /// `(stage, family, operand index)`; traits apply in ascending order.
    fn order_key(self) -> (u8, u8, usize) {
        use ShapeTrait::*;
        match self {
            OneRow => (1, 0, 0),
            OneCol => (1, 1, 0),
            RowsFromScalar(i) => (2, 0, i),
            ColsFromScalar(i) => (2, 1, i),
            RowsFromArg(i) => (3, 0, i),
            ColsFromArg(i) => (3, 1, i),
            RowsFromArgCols(i) => (4, 0, i),
            ColsFromArgRows(i) => (4, 1, i),
            RowsFromAllArgs => (5, 0, 0),
            ColsFromAllArgs => (5, 1, 0),
            RowsFromSumOfArgs => (6, 0, 0),
            ColsFromSumOfArgs => (6, 1, 0),
            ShapeFromArg(i) => (7, 0, i),
            EwBinary => (8, 0, 0),
        }
    }

    fn apply(
        self,
        op: &Operation,
        env: &dyn ShapeEnv,
        shape: ShapePair,
    ) -> Result<ShapePair, ShapeError> {
        use ShapeTrait::*;
        Ok(match self {
            OneRow => shape.with_rows(Dim::Known(1)),
            OneCol => shape.with_cols(Dim::Known(1)),
            RowsFromScalar(i) => shape.with_rows(constant_dim(env, operand(op, i)?)),
            ColsFromScalar(i) => shape.with_cols(constant_dim(env, operand(op, i)?)),
            RowsFromArg(i) => shape.with_rows(operand_shape(op, env, i)?.rows),
            ColsFromArg(i) => shape.with_cols(operand_shape(op, env, i)?.cols),
            RowsFromArgCols(i) => shape.with_rows(operand_shape(op, env, i)?.cols),
            ColsFromArgRows(i) => shape.with_cols(operand_shape(op, env, i)?.rows),
            RowsFromAllArgs => shape.with_rows(infer_rows_from_args(op, env, &op.operands)?),
            ColsFromAllArgs => shape.with_cols(infer_cols_from_args(op, env, &op.operands)?),
            RowsFromSumOfArgs => {
                shape.with_rows(infer_rows_from_sum_of_args(op, env, &op.operands)?)
            }
            ColsFromSumOfArgs => {
                shape.with_cols(infer_cols_from_sum_of_args(op, env, &op.operands)?)
            }
            ShapeFromArg(i) => operand_shape(op, env, i)?,
            EwBinary => ew_binary(op, env)?,
        })
    }
}

/// Result takes the left operand's shape. Two unknown-length column vectors
/// give an unknown-length column vector; a partially known right operand
/// gives a fully unknown result.
fn ew_binary(op: &Operation, env: &dyn ShapeEnv) -> Result<ShapePair, ShapeError> {
    let lhs = operand_shape(op, env, 0)?;
    let rhs = operand_shape(op, env, 1)?;
    let unknown_col = ShapePair::new(Dim::Unknown, Dim::Known(1));
    Ok(if lhs == unknown_col && rhs == unknown_col {
        unknown_col
    } else if !rhs.is_fully_known() {
        ShapePair::UNKNOWN
    } else {
        lhs
    })
}

/// Computes one dimension of an operation's result.
pub type DimHook = fn(&Operation, &dyn ShapeEnv) -> Result<Dim, ShapeError>;

/// The traits and hooks an operation kind declares.
#[derive(Clone, Copy)]
pub struct TraitSet {
    pub traits: &'static [ShapeTrait],
    pub rows_hook: Option<DimHook>,
    pub cols_hook: Option<DimHook>,
}

impl TraitSet {
    pub const fn new(traits: &'static [ShapeTrait]) -> Self {
        Self {
            traits,
            rows_hook: None,
            cols_hook: None,
        }
    }

    pub const fn with_rows_hook(self, hook: DimHook) -> Self {
        Self {
            rows_hook: Some(hook),
            ..self
        }
    }

    pub const fn with_cols_hook(self, hook: DimHook) -> Self {
        Self {
            cols_hook: Some(hook),
            ..self
        }
    }
}

impl std::fmt::Debug for TraitSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraitSet")
            .field("traits", &self.traits)
            .field("rows_hook", &self.rows_hook.is_some())
            .field("cols_hook", &self.cols_hook.is_some())
            .finish()
    }
}

/// Apply `set` to a single-result operation.
pub fn apply_traits(
    op: &Operation,
    env: &dyn ShapeEnv,
    set: &TraitSet,
) -> Result<ShapePair, ShapeError> {
    let mut ordered = set.traits.to_vec();
    ordered.sort_by_key(|t| t.order_key());

    let mut shape = ShapePair::UNKNOWN;
    for t in ordered {
        shape = t.apply(op, env, shape)?;
    }
    if let Some(hook) = set.rows_hook {
        shape = shape.with_rows(hook(op, env)?);
    }
    if let Some(hook) = set.cols_hook {
        shape = shape.with_cols(hook(op, env)?);
    }
    Ok(shape)
}
