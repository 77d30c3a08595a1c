// opcode.rs — Closed set of IR operation kinds
//
// One tag per operation kind, with its textual mnemonic and operand/result
// arity. How each kind's shape is inferred lives in `rules::shape_rule`,
// which matches this enum exhaustively.

use std::fmt;

// ── Function families ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryFn {
    Abs,
    Sign,
    Neg,
    Sqrt,
    Exp,
    Ln,
    Sin,
    Cos,
    Round,
    Floor,
    Ceil,
    IsNan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryFn {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Mod,
    Min,
    Max,
    And,
    Or,
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggFn {
    Sum,
    Min,
    Max,
    Mean,
    Var,
    Stddev,
    IdxMin,
    IdxMax,
}

const UNARY_FNS: [(UnaryFn, &str); 12] = [
    (UnaryFn::Abs, "ew_abs"),
    (UnaryFn::Sign, "ew_sign"),
    (UnaryFn::Neg, "ew_neg"),
    (UnaryFn::Sqrt, "ew_sqrt"),
    (UnaryFn::Exp, "ew_exp"),
    (UnaryFn::Ln, "ew_ln"),
    (UnaryFn::Sin, "ew_sin"),
    (UnaryFn::Cos, "ew_cos"),
    (UnaryFn::Round, "ew_round"),
    (UnaryFn::Floor, "ew_floor"),
    (UnaryFn::Ceil, "ew_ceil"),
    (UnaryFn::IsNan, "ew_isnan"),
];

const BINARY_FNS: [(BinaryFn, &str); 16] = [
    (BinaryFn::Add, "ew_add"),
    (BinaryFn::Sub, "ew_sub"),
    (BinaryFn::Mul, "ew_mul"),
    (BinaryFn::Div, "ew_div"),
    (BinaryFn::Pow, "ew_pow"),
    (BinaryFn::Mod, "ew_mod"),
    (BinaryFn::Min, "ew_min"),
    (BinaryFn::Max, "ew_max"),
    (BinaryFn::And, "ew_and"),
    (BinaryFn::Or, "ew_or"),
    (BinaryFn::Eq, "ew_eq"),
    (BinaryFn::Neq, "ew_neq"),
    (BinaryFn::Lt, "ew_lt"),
    (BinaryFn::Le, "ew_le"),
    (BinaryFn::Gt, "ew_gt"),
    (BinaryFn::Ge, "ew_ge"),
];

// (fn, row-wise, column-wise, full)
const AGG_FNS: [(AggFn, &str, &str, &str); 8] = [
    (AggFn::Sum, "row_sum", "col_sum", "all_sum"),
    (AggFn::Min, "row_min", "col_min", "all_min"),
    (AggFn::Max, "row_max", "col_max", "all_max"),
    (AggFn::Mean, "row_mean", "col_mean", "all_mean"),
    (AggFn::Var, "row_var", "col_var", "all_var"),
    (AggFn::Stddev, "row_stddev", "col_stddev", "all_stddev"),
    (AggFn::IdxMin, "row_idxmin", "col_idxmin", "all_idxmin"),
    (AggFn::IdxMax, "row_idxmax", "col_idxmax", "all_idxmax"),
];

// ── Operation kinds ─────────────────────────────────────────────────────────

/// Every operation kind of the IR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    // Kinds with a bespoke shape rule.
    CreateFrame,
    GroupJoin,
    Group,
    MatMul,
    Read,
    Order,
    Cond,
    Conv2DForward,
    AvgPoolForward,
    MaxPoolForward,
    CTable,
    MatrixConstant,
    SliceRow,
    SliceCol,
    ExtractCol,
    Eigen,
    Recode,

    // Kinds shaped by declarative traits.
    Seq,
    Cartesian,
    SetColLabels,
    Transpose,
    EwUnary(UnaryFn),
    EwBinary(BinaryFn),
    Fill,
    RandMatrix,
    Reshape,
    ColBind,
    RowBind,
    RowAgg(AggFn),
    ColAgg(AggFn),
    AllAgg(AggFn),
    DiagMatrix,
    Syrk,
    Gemv,
    ExtractRow,
    Cast,
    Sample,

    // Kinds without any shape knowledge.
    Call,
    Print,
}

/// Allowed number of operands or results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
    Any,
}

impl Arity {
    pub fn accepts(self, n: usize) -> bool {
        match self {
            Arity::Exact(k) => n == k,
            Arity::AtLeast(k) => n >= k,
            Arity::Any => true,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(k) => write!(f, "exactly {k}"),
            Arity::AtLeast(k) => write!(f, "at least {k}"),
            Arity::Any => write!(f, "any number of"),
        }
    }
}

impl OpKind {
    /// Parse a textual mnemonic (e.g. `matmul`, `ew_add`, `row_sum`).
    pub fn from_mnemonic(name: &str) -> Option<OpKind> {
        let fixed = match name {
            "create_frame" => Some(OpKind::CreateFrame),
            "group_join" => Some(OpKind::GroupJoin),
            "group" => Some(OpKind::Group),
            "matmul" => Some(OpKind::MatMul),
            "read" => Some(OpKind::Read),
            "order" => Some(OpKind::Order),
            "cond" => Some(OpKind::Cond),
            "conv2d" => Some(OpKind::Conv2DForward),
            "avg_pool2d" => Some(OpKind::AvgPoolForward),
            "max_pool2d" => Some(OpKind::MaxPoolForward),
            "ctable" => Some(OpKind::CTable),
            "matrix_constant" => Some(OpKind::MatrixConstant),
            "slice_row" => Some(OpKind::SliceRow),
            "slice_col" => Some(OpKind::SliceCol),
            "extract_col" => Some(OpKind::ExtractCol),
            "eigen" => Some(OpKind::Eigen),
            "recode" => Some(OpKind::Recode),
            "seq" => Some(OpKind::Seq),
            "cartesian" => Some(OpKind::Cartesian),
            "set_col_labels" => Some(OpKind::SetColLabels),
            "transpose" => Some(OpKind::Transpose),
            "fill" => Some(OpKind::Fill),
            "rand_matrix" => Some(OpKind::RandMatrix),
            "reshape" => Some(OpKind::Reshape),
            "cbind" => Some(OpKind::ColBind),
            "rbind" => Some(OpKind::RowBind),
            "diag_matrix" => Some(OpKind::DiagMatrix),
            "syrk" => Some(OpKind::Syrk),
            "gemv" => Some(OpKind::Gemv),
            "extract_row" => Some(OpKind::ExtractRow),
            "cast" => Some(OpKind::Cast),
            "sample" => Some(OpKind::Sample),
            "call" => Some(OpKind::Call),
            "print" => Some(OpKind::Print),
            _ => None,
        };
        fixed
            .or_else(|| {
                UNARY_FNS
                    .iter()
                    .find(|(_, m)| *m == name)
                    .map(|(f, _)| OpKind::EwUnary(*f))
            })
            .or_else(|| {
                BINARY_FNS
                    .iter()
                    .find(|(_, m)| *m == name)
                    .map(|(f, _)| OpKind::EwBinary(*f))
            })
            .or_else(|| {
                AGG_FNS.iter().find_map(|(f, row, col, all)| {
                    if *row == name {
                        Some(OpKind::RowAgg(*f))
                    } else if *col == name {
                        Some(OpKind::ColAgg(*f))
                    } else if *all == name {
                        Some(OpKind::AllAgg(*f))
                    } else {
                        None
                    }
                })
            })
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            OpKind::CreateFrame => "create_frame",
            OpKind::GroupJoin => "group_join",
            OpKind::Group => "group",
            OpKind::MatMul => "matmul",
            OpKind::Read => "read",
            OpKind::Order => "order",
            OpKind::Cond => "cond",
            OpKind::Conv2DForward => "conv2d",
            OpKind::AvgPoolForward => "avg_pool2d",
            OpKind::MaxPoolForward => "max_pool2d",
            OpKind::CTable => "ctable",
            OpKind::MatrixConstant => "matrix_constant",
            OpKind::SliceRow => "slice_row",
            OpKind::SliceCol => "slice_col",
            OpKind::ExtractCol => "extract_col",
            OpKind::Eigen => "eigen",
            OpKind::Recode => "recode",
            OpKind::Seq => "seq",
            OpKind::Cartesian => "cartesian",
            OpKind::SetColLabels => "set_col_labels",
            OpKind::Transpose => "transpose",
            OpKind::EwUnary(f) => lookup(&UNARY_FNS, f),
            OpKind::EwBinary(f) => lookup(&BINARY_FNS, f),
            OpKind::Fill => "fill",
            OpKind::RandMatrix => "rand_matrix",
            OpKind::Reshape => "reshape",
            OpKind::ColBind => "cbind",
            OpKind::RowBind => "rbind",
            OpKind::RowAgg(f) => agg_mnemonic(f, 0),
            OpKind::ColAgg(f) => agg_mnemonic(f, 1),
            OpKind::AllAgg(f) => agg_mnemonic(f, 2),
            OpKind::DiagMatrix => "diag_matrix",
            OpKind::Syrk => "syrk",
            OpKind::Gemv => "gemv",
            OpKind::ExtractRow => "extract_row",
            OpKind::Cast => "cast",
            OpKind::Sample => "sample",
            OpKind::Call => "call",
            OpKind::Print => "print",
        }
    }

    /// Number of operands this kind accepts.
    pub fn operand_arity(self) -> Arity {
        use Arity::*;
        match self {
            OpKind::CreateFrame => AtLeast(1),
            OpKind::GroupJoin => Exact(5),
            // frame, key labels..., aggregation labels...
            OpKind::Group => AtLeast(1),
            OpKind::MatMul => Exact(4),
            OpKind::Read => Exact(1),
            // arg, sort keys..., return-indices flag
            OpKind::Order => AtLeast(2),
            OpKind::Cond => Exact(3),
            OpKind::Conv2DForward => Exact(13),
            OpKind::AvgPoolForward | OpKind::MaxPoolForward => Exact(11),
            OpKind::CTable => Exact(5),
            OpKind::MatrixConstant => Exact(1),
            OpKind::SliceRow | OpKind::SliceCol => Exact(3),
            OpKind::ExtractCol => Exact(2),
            OpKind::Eigen => Exact(1),
            OpKind::Recode => Exact(2),
            OpKind::Seq => Exact(3),
            OpKind::Cartesian => Exact(2),
            OpKind::SetColLabels => AtLeast(1),
            OpKind::Transpose | OpKind::EwUnary(_) => Exact(1),
            OpKind::EwBinary(_) => Exact(2),
            OpKind::Fill => Exact(3),
            OpKind::RandMatrix => Exact(6),
            OpKind::Reshape => Exact(3),
            OpKind::ColBind | OpKind::RowBind => AtLeast(1),
            OpKind::RowAgg(_) | OpKind::ColAgg(_) | OpKind::AllAgg(_) => Exact(1),
            OpKind::DiagMatrix | OpKind::Syrk => Exact(1),
            OpKind::Gemv | OpKind::ExtractRow => Exact(2),
            OpKind::Cast => Exact(1),
            OpKind::Sample => Exact(4),
            OpKind::Call => Any,
            OpKind::Print => Exact(1),
        }
    }

    /// Number of results this kind produces.
    pub fn result_arity(self) -> Arity {
        match self {
            OpKind::GroupJoin | OpKind::Eigen | OpKind::Recode => Arity::Exact(2),
            OpKind::Conv2DForward | OpKind::AvgPoolForward | OpKind::MaxPoolForward => {
                Arity::Exact(3)
            }
            OpKind::Call => Arity::Any,
            OpKind::Print => Arity::Exact(0),
            _ => Arity::Exact(1),
        }
    }
}

fn lookup<F: PartialEq + Copy>(table: &[(F, &'static str)], f: F) -> &'static str {
    table
        .iter()
        .find(|(g, _)| *g == f)
        .map_or("?", |(_, m)| *m)
}

fn agg_mnemonic(f: AggFn, column: usize) -> &'static str {
    AGG_FNS
        .iter()
        .find(|(g, ..)| *g == f)
        .map_or("?", |(_, row, col, all)| match column {
            0 => *row,
            1 => *col,
            _ => *all,
        })
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}
