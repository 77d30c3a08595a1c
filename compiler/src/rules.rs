// rules.rs — Per-kind shape rules
//
// `shape_rule` decides, by exhaustive match over `OpKind`, whether a kind has
// a bespoke rule, a declarative trait set, or no shape knowledge at all.
// Bespoke rules produce one shape per declared result.
//
// Preconditions: the operation satisfies its kind's operand/result arity.
// Postconditions: a custom rule returns exactly `result_arity` shapes.
// Failure modes: `ShapeError` variants for contract violations; missing
//   constants and unknown operand shapes produce `Dim::Unknown` instead.
// Side effects: `read` consults the file catalog.

use crate::env::ShapeEnv;
use crate::error::ShapeError;
use crate::id::ValueId;
use crate::ir::{ElemType, Operation, ValueKind};
use crate::opcode::OpKind;
use crate::query::{
    constant_as, constant_dim, get_shape, infer_cols_from_sum_of_args,
    infer_rows_from_args, operand, operand_shape, LabelPattern,
};
use crate::shape::{Axis, Dim, ShapePair};
use crate::shape_traits::{ShapeTrait, TraitSet};
use ShapeTrait::*;

/// A bespoke rule: one shape per result.
pub type CustomRule = fn(&Operation, &dyn ShapeEnv) -> Result<Vec<ShapePair>, ShapeError>;

/// How shapes of a kind's results are derived.
#[derive(Clone, Copy)]
pub enum ShapeRule {
    Custom(CustomRule),
    Traits(TraitSet),
    /// No shape knowledge; every result is fully unknown.
    Opaque,
}

impl std::fmt::Debug for ShapeRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShapeRule::Custom(_) => f.write_str("Custom"),
            ShapeRule::Traits(set) => f.debug_tuple("Traits").field(set).finish(),
            ShapeRule::Opaque => f.write_str("Opaque"),
        }
    }
}

// ── Trait tables ────────────────────────────────────────────────────────────

const TRANSPOSE: TraitSet = TraitSet::new(&[RowsFromArgCols(0), ColsFromArgRows(0)]);
const SAME_AS_ARG: TraitSet = TraitSet::new(&[ShapeFromArg(0)]);
const EW_BINARY: TraitSet = TraitSet::new(&[EwBinary]);
const FILL: TraitSet = TraitSet::new(&[RowsFromScalar(1), ColsFromScalar(2)]);
const RAND_MATRIX: TraitSet = TraitSet::new(&[RowsFromScalar(0), ColsFromScalar(1)]);
const COL_BIND: TraitSet = TraitSet::new(&[RowsFromAllArgs, ColsFromSumOfArgs]);
const ROW_BIND: TraitSet = TraitSet::new(&[RowsFromSumOfArgs, ColsFromAllArgs]);
const ROW_AGG: TraitSet = TraitSet::new(&[RowsFromArg(0), OneCol]);
const COL_AGG: TraitSet = TraitSet::new(&[OneRow, ColsFromArg(0)]);
const ALL_AGG: TraitSet = TraitSet::new(&[OneRow, OneCol]);
const DIAG_MATRIX: TraitSet = TraitSet::new(&[RowsFromArg(0), ColsFromArgRows(0)]);
const SYRK: TraitSet = TraitSet::new(&[RowsFromArgCols(0), ColsFromArg(0)]);
const GEMV: TraitSet = TraitSet::new(&[RowsFromArgCols(0), OneCol]);
const EXTRACT_ROW: TraitSet = TraitSet::new(&[RowsFromArg(1), ColsFromArg(0)]);
const SAMPLE: TraitSet = TraitSet::new(&[RowsFromScalar(1), OneCol]);
const SEQ: TraitSet = TraitSet::new(&[OneCol]).with_rows_hook(seq_rows);
const CARTESIAN: TraitSet = TraitSet::new(&[ColsFromSumOfArgs]).with_rows_hook(cartesian_rows);
const SET_COL_LABELS: TraitSet = TraitSet::new(&[RowsFromArg(0)]).with_cols_hook(label_count);

/// The shape rule of `kind`.
pub fn shape_rule(kind: OpKind) -> ShapeRule {
    match kind {
        OpKind::CreateFrame => ShapeRule::Custom(create_frame),
        OpKind::GroupJoin => ShapeRule::Custom(group_join),
        OpKind::Group => ShapeRule::Custom(group),
        OpKind::MatMul => ShapeRule::Custom(matmul),
        OpKind::Read => ShapeRule::Custom(read),
        OpKind::Order => ShapeRule::Custom(order),
        OpKind::Cond => ShapeRule::Custom(cond),
        OpKind::Conv2DForward => ShapeRule::Custom(conv2d),
        OpKind::AvgPoolForward | OpKind::MaxPoolForward => ShapeRule::Custom(pool2d),
        OpKind::CTable => ShapeRule::Custom(ctable),
        OpKind::MatrixConstant => ShapeRule::Custom(matrix_constant),
        OpKind::SliceRow => ShapeRule::Custom(slice_row),
        OpKind::SliceCol => ShapeRule::Custom(slice_col),
        OpKind::ExtractCol => ShapeRule::Custom(extract_col),
        OpKind::Eigen => ShapeRule::Custom(eigen),
        OpKind::Recode => ShapeRule::Custom(recode),

        OpKind::Seq => ShapeRule::Traits(SEQ),
        OpKind::Cartesian => ShapeRule::Traits(CARTESIAN),
        OpKind::SetColLabels => ShapeRule::Traits(SET_COL_LABELS),
        OpKind::Transpose => ShapeRule::Traits(TRANSPOSE),
        OpKind::EwUnary(_) | OpKind::Cast => ShapeRule::Traits(SAME_AS_ARG),
        OpKind::EwBinary(_) => ShapeRule::Traits(EW_BINARY),
        OpKind::Fill | OpKind::Reshape => ShapeRule::Traits(FILL),
        OpKind::RandMatrix => ShapeRule::Traits(RAND_MATRIX),
        OpKind::ColBind => ShapeRule::Traits(COL_BIND),
        OpKind::RowBind => ShapeRule::Traits(ROW_BIND),
        OpKind::RowAgg(_) => ShapeRule::Traits(ROW_AGG),
        OpKind::ColAgg(_) => ShapeRule::Traits(COL_AGG),
        OpKind::AllAgg(_) => ShapeRule::Traits(ALL_AGG),
        OpKind::DiagMatrix => ShapeRule::Traits(DIAG_MATRIX),
        OpKind::Syrk => ShapeRule::Traits(SYRK),
        OpKind::Gemv => ShapeRule::Traits(GEMV),
        OpKind::ExtractRow => ShapeRule::Traits(EXTRACT_ROW),
        OpKind::Sample => ShapeRule::Traits(SAMPLE),

        OpKind::Call | OpKind::Print => ShapeRule::Opaque,
    }
}

// ── Frames ──────────────────────────────────────────────────────────────────

fn create_frame(op: &Operation, env: &dyn ShapeEnv) -> Result<Vec<ShapePair>, ShapeError> {
    Ok(vec![ShapePair::new(
        infer_rows_from_args(op, env, &op.operands)?,
        infer_cols_from_sum_of_args(op, env, &op.operands)?,
    )])
}

fn group_join(_: &Operation, _: &dyn ShapeEnv) -> Result<Vec<ShapePair>, ShapeError> {
    Ok(vec![
        ShapePair::new(Dim::Unknown, Dim::Known(2)),
        ShapePair::new(Dim::Unknown, Dim::Known(1)),
    ])
}

/// Rows depend on the runtime number of groups. Columns are the expanded
/// key labels plus one per aggregation.
fn group(op: &Operation, env: &dyn ShapeEnv) -> Result<Vec<ShapePair>, ShapeError> {
    let frame = operand(op, 0)?;
    let keys = op
        .int_attr("keys")
        .and_then(|k| usize::try_from(k).ok())
        .filter(|&k| k < op.operands.len())
        .ok_or(ShapeError::MissingAttribute {
            op: op.kind.mnemonic(),
            name: "keys",
            span: op.span,
        })?;
    let labels = env.labels_of(frame);

    let mut cols = Dim::Known(0);
    for &key in &op.operands[1..=keys] {
        let Some(label) = constant_as::<String>(env, key) else {
            cols = Dim::Unknown;
            break;
        };
        let pattern = LabelPattern::parse(&label);
        let expanded = match (pattern.is_wildcard(), labels) {
            (false, _) => Dim::Known(1),
            (true, Some(labels)) => Dim::Known(pattern.count_in(labels)),
            (true, None) => Dim::Unknown,
        };
        cols = cols.plus(expanded);
    }
    let aggregations = (op.operands.len() - 1 - keys) as u64;
    Ok(vec![ShapePair::new(Dim::Unknown, cols.plus(Dim::Known(aggregations)))])
}

/// A wildcard selector on a frame counts matching labels; any other selector
/// keeps the selector's own column count.
fn extract_col(op: &Operation, env: &dyn ShapeEnv) -> Result<Vec<ShapePair>, ShapeError> {
    let source = operand(op, 0)?;
    let selector = operand(op, 1)?;
    let rows = get_shape(op, env, source)?.rows;

    let wildcard_cols = if env.classify(source) == ValueKind::Frame {
        constant_as::<String>(env, selector).and_then(|label| {
            let pattern = LabelPattern::parse(&label);
            pattern.is_wildcard().then(|| {
                env.labels_of(source)
                    .map_or(Dim::Unknown, |labels| Dim::Known(pattern.count_in(labels)))
            })
        })
    } else {
        None
    };
    let cols = match wildcard_cols {
        Some(cols) => cols,
        None => get_shape(op, env, selector)?.cols,
    };
    Ok(vec![ShapePair::new(rows, cols)])
}

fn recode(op: &Operation, env: &dyn ShapeEnv) -> Result<Vec<ShapePair>, ShapeError> {
    let arg = operand(op, 0)?;
    let data = match env.classify(arg) {
        ValueKind::Matrix | ValueKind::Frame => env.shape_of(arg),
        ValueKind::Unknown => ShapePair::UNKNOWN,
        kind @ (ValueKind::Scalar | ValueKind::Column) => {
            return Err(ShapeError::UnsupportedValueKind {
                op: op.kind.mnemonic(),
                index: Some(0),
                kind,
                span: op.span,
            })
        }
    };
    Ok(vec![data, ShapePair::new(Dim::Unknown, Dim::Known(1))])
}

// ── Linear algebra ──────────────────────────────────────────────────────────

fn matmul(op: &Operation, env: &dyn ShapeEnv) -> Result<Vec<ShapePair>, ShapeError> {
    let lhs = operand_shape(op, env, 0)?;
    let rhs = operand_shape(op, env, 1)?;
    let rows = match constant_as::<bool>(env, operand(op, 2)?) {
        Some(true) => lhs.cols,
        Some(false) => lhs.rows,
        None => Dim::Unknown,
    };
    let cols = match constant_as::<bool>(env, operand(op, 3)?) {
        Some(true) => rhs.rows,
        Some(false) => rhs.cols,
        None => Dim::Unknown,
    };
    Ok(vec![ShapePair::new(rows, cols)])
}

fn eigen(op: &Operation, env: &dyn ShapeEnv) -> Result<Vec<ShapePair>, ShapeError> {
    let n = operand_shape(op, env, 0)?.rows;
    Ok(vec![ShapePair::new(n, Dim::Known(1)), ShapePair::new(n, n)])
}

// result rows and cols are operands 3 and 4
fn ctable(op: &Operation, env: &dyn ShapeEnv) -> Result<Vec<ShapePair>, ShapeError> {
    Ok(vec![ShapePair::new(
        constant_dim(env, operand(op, 3)?),
        constant_dim(env, operand(op, 4)?),
    )])
}

fn matrix_constant(op: &Operation, env: &dyn ShapeEnv) -> Result<Vec<ShapePair>, ShapeError> {
    let address = constant_as::<u64>(env, operand(op, 0)?).ok_or(ShapeError::NonConstantAddress {
        op: op.kind.mnemonic(),
        span: op.span,
    })?;
    let matrix = env.literal(address).ok_or(ShapeError::UnknownLiteral {
        op: op.kind.mnemonic(),
        address,
        span: op.span,
    })?;
    Ok(vec![ShapePair::known(matrix.rows, matrix.cols)])
}

// ── Data sources and control ────────────────────────────────────────────────

fn read(op: &Operation, env: &dyn ShapeEnv) -> Result<Vec<ShapePair>, ShapeError> {
    let Some(path) = constant_as::<String>(env, operand(op, 0)?) else {
        return Ok(vec![ShapePair::UNKNOWN]);
    };
    let meta = env
        .file_metadata(&path)
        .map_err(|e| ShapeError::FileMetadata {
            op: op.kind.mnemonic(),
            path: path.clone(),
            reason: e.to_string(),
            span: op.span,
        })?;
    Ok(vec![ShapePair::new(meta.num_rows, meta.num_cols)])
}

/// Operands: argument, sort keys..., return-indices flag (last).
fn order(op: &Operation, env: &dyn ShapeEnv) -> Result<Vec<ShapePair>, ShapeError> {
    let arg = operand(op, 0)?;
    let flag = operand(op, op.operands.len() - 1)?;
    let base = match env.classify(arg) {
        ValueKind::Matrix | ValueKind::Frame => env.shape_of(arg),
        _ => ShapePair::UNKNOWN,
    };
    let shape = match constant_as::<bool>(env, flag) {
        Some(true) => base.with_cols(Dim::Known(1)),
        Some(false) => base,
        None => base.with_cols(Dim::Unknown),
    };
    Ok(vec![shape])
}

fn cond(op: &Operation, env: &dyn ShapeEnv) -> Result<Vec<ShapePair>, ShapeError> {
    let condition = operand(op, 0)?;
    let then_value = operand(op, 1)?;
    let else_value = operand(op, 2)?;
    let is_data = |v| matches!(env.classify(v), ValueKind::Matrix | ValueKind::Frame);

    let shape = match env.classify(condition) {
        ValueKind::Unknown => ShapePair::UNKNOWN,
        ValueKind::Matrix => env.shape_of(condition),
        kind @ (ValueKind::Frame | ValueKind::Column) => {
            return Err(ShapeError::UnsupportedConditionType {
                op: op.kind.mnemonic(),
                kind,
                span: op.span,
            })
        }
        ValueKind::Scalar if is_data(then_value) && is_data(else_value) => {
            env.shape_of(then_value).meet(&env.shape_of(else_value))
        }
        ValueKind::Scalar => ShapePair::UNKNOWN,
    };
    Ok(vec![shape])
}

// ── Slicing ─────────────────────────────────────────────────────────────────

fn slice_row(op: &Operation, env: &dyn ShapeEnv) -> Result<Vec<ShapePair>, ShapeError> {
    slice(op, env, Axis::Rows).map(|shape| vec![shape])
}

fn slice_col(op: &Operation, env: &dyn ShapeEnv) -> Result<Vec<ShapePair>, ShapeError> {
    slice(op, env, Axis::Cols).map(|shape| vec![shape])
}

/// Operands: source, lower bound (inclusive), upper bound (exclusive).
fn slice(op: &Operation, env: &dyn ShapeEnv, axis: Axis) -> Result<ShapePair, ShapeError> {
    let source = operand(op, 0)?;
    let base = match env.classify(source) {
        ValueKind::Unknown => ShapePair::UNKNOWN,
        ValueKind::Matrix | ValueKind::Frame => env.shape_of(source),
        kind @ (ValueKind::Scalar | ValueKind::Column) => {
            return Err(ShapeError::UnsupportedValueKind {
                op: op.kind.mnemonic(),
                index: Some(0),
                kind,
                span: op.span,
            })
        }
    };
    let lower = constant_as::<i64>(env, operand(op, 1)?);
    let upper = constant_as::<i64>(env, operand(op, 2)?);

    let sliced = match (base.dim(axis), lower, upper) {
        (Dim::Known(count), Some(lower), Some(upper)) => {
            let in_bounds = 0 <= lower
                && lower <= upper
                && u64::try_from(upper).is_ok_and(|upper| upper <= count);
            if !in_bounds {
                return Err(ShapeError::InvalidSliceBounds {
                    op: op.kind.mnemonic(),
                    axis,
                    lower,
                    upper,
                    count,
                    span: op.span,
                });
            }
            Dim::Known(upper.abs_diff(lower))
        }
        _ => Dim::Unknown,
    };
    Ok(base.with_dim(axis, sliced))
}

// ── Convolution and pooling ─────────────────────────────────────────────────

/// Spatial parameters of a 2-D window operation. Non-constant parameters
/// default to 1; `None` marks a constant that is not a valid count.
struct Window {
    input_h: Option<u64>,
    input_w: Option<u64>,
    window_h: Option<u64>,
    window_w: Option<u64>,
    stride_h: Option<u64>,
    stride_w: Option<u64>,
    pad_h: Option<u64>,
    pad_w: Option<u64>,
}

/// A window count: 1 when not a compile-time constant, `None` when the
/// constant is negative or not an integer.
fn window_param(env: &dyn ShapeEnv, value: ValueId) -> Option<u64> {
    match env.constant(value) {
        None => Some(1),
        Some(_) => constant_as::<u64>(env, value),
    }
}

impl Window {
    /// Read eight consecutive operands starting at `first`: input height and
    /// width, window height and width, strides, then paddings.
    fn from_operands(op: &Operation, env: &dyn ShapeEnv, first: usize) -> Result<Self, ShapeError> {
        let param = |offset: usize| -> Result<Option<u64>, ShapeError> {
            Ok(window_param(env, operand(op, first + offset)?))
        };
        Ok(Window {
            input_h: param(0)?,
            input_w: param(1)?,
            window_h: param(2)?,
            window_w: param(3)?,
            stride_h: param(4)?,
            stride_w: param(5)?,
            pad_h: param(6)?,
            pad_w: param(7)?,
        })
    }

    fn out_h(&self) -> Dim {
        window_extent(self.input_h, self.window_h, self.pad_h, self.stride_h)
    }

    fn out_w(&self) -> Dim {
        window_extent(self.input_w, self.window_w, self.pad_w, self.stride_w)
    }
}

fn window_extent(
    input: Option<u64>,
    window: Option<u64>,
    pad: Option<u64>,
    stride: Option<u64>,
) -> Dim {
    match (input, window, pad, stride) {
        (Some(input), Some(window), Some(pad), Some(stride)) => output_extent(input, window, pad, stride),
        _ => Dim::Unknown,
    }
}

/// `floor((input + 2*pad - window) / stride) + 1`; unknown when the window
/// does not fit, the stride is zero, or the arithmetic overflows.
fn output_extent(input: u64, window: u64, pad: u64, stride: u64) -> Dim {
    let extent = pad
        .checked_mul(2)
        .and_then(|p| p.checked_add(input))
        .and_then(|padded| padded.checked_sub(window))
        .and_then(|span| span.checked_div(stride))
        .and_then(|steps| steps.checked_add(1));
    Dim::from(extent)
}

/// Operands: input, filter, bias, images, channels, then the eight window
/// parameters. Columns count one output plane per filter.
fn conv2d(op: &Operation, env: &dyn ShapeEnv) -> Result<Vec<ShapePair>, ShapeError> {
    let input = operand_shape(op, env, 0)?;
    let filters = operand_shape(op, env, 1)?.rows;
    let window = Window::from_operands(op, env, 5)?;
    let cols = filters.times(window.out_h()).times(window.out_w());
    Ok(vec![
        ShapePair::new(input.rows, cols),
        ShapePair::SCALAR,
        ShapePair::SCALAR,
    ])
}

/// Operands: input, images, channels, then the eight window parameters.
fn pool2d(op: &Operation, env: &dyn ShapeEnv) -> Result<Vec<ShapePair>, ShapeError> {
    let input = operand_shape(op, env, 0)?;
    let channels = Dim::from(window_param(env, operand(op, 2)?));
    let window = Window::from_operands(op, env, 3)?;
    let cols = channels.times(window.out_h()).times(window.out_w());
    Ok(vec![
        ShapePair::new(input.rows, cols),
        ShapePair::SCALAR,
        ShapePair::SCALAR,
    ])
}

// ── Hooks ───────────────────────────────────────────────────────────────────

/// Number of generated elements. The element type of `from` picks the
/// arithmetic; all three operands must be constants of that type.
fn seq_rows(op: &Operation, env: &dyn ShapeEnv) -> Result<Dim, ShapeError> {
    let from = operand(op, 0)?;
    let to = operand(op, 1)?;
    let inc = operand(op, 2)?;
    match env.element_type(from) {
        Some(ElemType::F64) => Ok(
            match (constant_as::<f64>(env, from), constant_as::<f64>(env, to), constant_as::<f64>(env, inc)) {
                (Some(from), Some(to), Some(inc)) => float_count((to / inc - from / inc).floor() + 1.0),
                _ => Dim::Unknown,
            },
        ),
        Some(ElemType::F32) => Ok(
            match (constant_as::<f32>(env, from), constant_as::<f32>(env, to), constant_as::<f32>(env, inc)) {
                (Some(from), Some(to), Some(inc)) => {
                    float_count(f64::from((to / inc - from / inc).floor() + 1.0))
                }
                _ => Dim::Unknown,
            },
        ),
        Some(ElemType::SI64) => Ok(
            match (constant_as::<i64>(env, from), constant_as::<i64>(env, to), constant_as::<i64>(env, inc)) {
                (Some(_), Some(_), Some(0)) => Dim::Unknown,
                (Some(from), Some(to), Some(inc)) => {
                    let distance = (i128::from(to) - i128::from(from)).unsigned_abs();
                    let step = u128::from(inc.unsigned_abs());
                    u64::try_from(distance / step + 1).map_or(Dim::Unknown, Dim::Known)
                }
                _ => Dim::Unknown,
            },
        ),
        other => Err(ShapeError::UnsupportedElementType {
            op: op.kind.mnemonic(),
            elem: other.map_or("unknown", ElemType::name).to_string(),
            supported: "f64, f32, si64",
            span: op.span,
        }),
    }
}

fn float_count(n: f64) -> Dim {
    // `u64::MAX as f64` rounds up to 2^64, so the bound is exclusive.
    if n.is_finite() && n >= 0.0 && n < u64::MAX as f64 {
        Dim::Known(n as u64)
    } else {
        Dim::Unknown
    }
}

/// Product of the row counts of two frame operands.
fn cartesian_rows(op: &Operation, env: &dyn ShapeEnv) -> Result<Dim, ShapeError> {
    let mut rows = Dim::Known(1);
    for index in 0..2 {
        let value = operand(op, index)?;
        match env.classify(value) {
            ValueKind::Frame => rows = rows.times(env.shape_of(value).rows),
            kind => {
                return Err(ShapeError::UnsupportedValueKind {
                    op: op.kind.mnemonic(),
                    index: Some(index),
                    kind,
                    span: op.span,
                })
            }
        }
    }
    Ok(rows)
}

// frame, then one operand per label
fn label_count(op: &Operation, _: &dyn ShapeEnv) -> Result<Dim, ShapeError> {
    Ok(Dim::Known(op.operands.len().saturating_sub(1) as u64))
}
