// ir.rs — In-memory IR graph consumed by shape inference
//
// Values are single-assignment edges; each has exactly one producer (a graph
// argument, a constant definition, or an operation result). Operations are
// stored in definition-before-use order, which the builder enforces by only
// accepting operands that already exist.
//
// Preconditions: none.
// Postconditions: every operation satisfies its kind's operand/result arity
//   and required attributes.
// Failure modes: `GraphError` on arity, attribute, or literal violations.
// Side effects: none.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::ast::Span;
use crate::id::{IdAllocator, OpId, ValueId};
use crate::opcode::{Arity, OpKind};
use crate::shape::{Dim, ShapePair};

// ── Value classification ────────────────────────────────────────────────────

/// Coarse data type of a value, as resolved by type inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Scalar,
    Matrix,
    Frame,
    Column,
    Unknown,
}

impl ValueKind {
    /// Kinds that carry a `(rows, cols)` shape of their own.
    pub fn is_shaped(self) -> bool {
        matches!(self, ValueKind::Matrix | ValueKind::Frame | ValueKind::Column)
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValueKind::Scalar => "scalar",
            ValueKind::Matrix => "matrix",
            ValueKind::Frame => "frame",
            ValueKind::Column => "column",
            ValueKind::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Element (value) type of scalars, matrices, and columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ElemType {
    F64,
    F32,
    SI64,
    UI64,
    Bool,
    Str,
}

impl ElemType {
    pub fn from_name(name: &str) -> Option<ElemType> {
        match name {
            "f64" => Some(ElemType::F64),
            "f32" => Some(ElemType::F32),
            "si64" => Some(ElemType::SI64),
            "ui64" => Some(ElemType::UI64),
            "bool" => Some(ElemType::Bool),
            "str" => Some(ElemType::Str),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ElemType::F64 => "f64",
            ElemType::F32 => "f32",
            ElemType::SI64 => "si64",
            ElemType::UI64 => "ui64",
            ElemType::Bool => "bool",
            ElemType::Str => "str",
        }
    }
}

impl fmt::Display for ElemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A compile-time constant attached to a value.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
}

/// Resolved type of a value: kind, element type, shape, and frame labels.
///
/// For operation results, `shape` starts out as the type-provided default
/// and is replaced when shape inference visits the producer.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueType {
    pub kind: ValueKind,
    pub elem: Option<ElemType>,
    pub shape: ShapePair,
    pub labels: Option<Vec<String>>,
}

impl ValueType {
    pub fn scalar(elem: ElemType) -> Self {
        Self {
            kind: ValueKind::Scalar,
            elem: Some(elem),
            shape: ShapePair::SCALAR,
            labels: None,
        }
    }

    pub fn matrix(shape: ShapePair, elem: Option<ElemType>) -> Self {
        Self {
            kind: ValueKind::Matrix,
            elem,
            shape,
            labels: None,
        }
    }

    pub fn frame(shape: ShapePair, labels: Option<Vec<String>>) -> Self {
        Self {
            kind: ValueKind::Frame,
            elem: None,
            shape,
            labels,
        }
    }

    pub fn column(rows: Dim, elem: Option<ElemType>) -> Self {
        Self {
            kind: ValueKind::Column,
            elem,
            shape: ShapePair::new(rows, Dim::Known(1)),
            labels: None,
        }
    }

    pub fn unknown() -> Self {
        Self {
            kind: ValueKind::Unknown,
            elem: None,
            shape: ShapePair::UNKNOWN,
            labels: None,
        }
    }
}

// ── Values and operations ───────────────────────────────────────────────────

/// Where a value comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum Producer {
    /// Graph input; its shape is whatever type inference declared.
    Arg,
    /// Compile-time constant definition.
    Const(Constant),
    /// The `index`-th result of an operation.
    Op(OpId, usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Value {
    pub id: ValueId,
    pub name: Option<String>,
    pub ty: ValueType,
    pub producer: Producer,
    pub span: Span,
}

impl Value {
    /// Source-level name, or the stable id when the value is anonymous.
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => self.id.to_string(),
        }
    }
}

/// Named compile-time attribute of an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attr {
    Int(i64),
    Str(String),
}

pub type Attrs = BTreeMap<String, Attr>;

#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub id: OpId,
    pub kind: OpKind,
    pub operands: Vec<ValueId>,
    pub results: Vec<ValueId>,
    pub attrs: Attrs,
    pub span: Span,
}

impl Operation {
    pub fn int_attr(&self, name: &str) -> Option<i64> {
        match self.attrs.get(name)? {
            Attr::Int(n) => Some(*n),
            Attr::Str(_) => None,
        }
    }
}

/// A materialized dense matrix referenced by address from the IR.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseMatrix {
    pub rows: u64,
    pub cols: u64,
    pub values: Vec<f64>,
}

impl DenseMatrix {
    /// Build from row-major nested rows. Returns `None` for ragged input.
    pub fn from_rows(rows: &[Vec<f64>]) -> Option<DenseMatrix> {
        let cols = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|r| r.len() != cols) {
            return None;
        }
        Some(DenseMatrix {
            rows: rows.len() as u64,
            cols: cols as u64,
            values: rows.iter().flatten().copied().collect(),
        })
    }
}

// ── Graph errors ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphError {
    #[error("'{op}' expects {expected} operands, found {found}")]
    OperandArity {
        op: &'static str,
        expected: Arity,
        found: usize,
    },
    #[error("'{op}' produces {expected} results, found {found}")]
    ResultArity {
        op: &'static str,
        expected: Arity,
        found: usize,
    },
    #[error("'{op}' requires attribute '{name}'")]
    MissingAttribute { op: &'static str, name: &'static str },
    #[error("'{op}' attribute '{name}' is invalid: {reason}")]
    InvalidAttribute {
        op: &'static str,
        name: &'static str,
        reason: String,
    },
    #[error("literal address {address} is already defined")]
    DuplicateLiteral { address: u64 },
}

// ── Graph ───────────────────────────────────────────────────────────────────

/// An IR graph: values, operations in definition order, and the literal
/// store that `matrix_constant` operations dereference.
#[derive(Debug, Default)]
pub struct Graph {
    values: Vec<Value>,
    ops: Vec<Operation>,
    literals: BTreeMap<u64, DenseMatrix>,
    ids: IdAllocator,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn ops(&self) -> &[Operation] {
        &self.ops
    }

    pub fn value(&self, id: ValueId) -> &Value {
        &self.values[id.index()]
    }

    pub fn op(&self, id: OpId) -> &Operation {
        &self.ops[id.index()]
    }

    pub fn literal(&self, address: u64) -> Option<&DenseMatrix> {
        self.literals.get(&address)
    }

    /// Find a value by its source name.
    pub fn lookup(&self, name: &str) -> Option<ValueId> {
        self.values
            .iter()
            .find(|v| v.name.as_deref() == Some(name))
            .map(|v| v.id)
    }

    fn push_value(
        &mut self,
        name: Option<String>,
        ty: ValueType,
        producer: Producer,
        span: Span,
    ) -> ValueId {
        let id = self.ids.alloc_value();
        self.values.push(Value {
            id,
            name,
            ty,
            producer,
            span,
        });
        id
    }

    /// Add a graph input with a type (and shape) provided by type inference.
    pub fn add_arg(&mut self, name: impl Into<String>, ty: ValueType, span: Span) -> ValueId {
        self.push_value(Some(name.into()), ty, Producer::Arg, span)
    }

    /// Add a scalar compile-time constant.
    pub fn add_const(
        &mut self,
        name: impl Into<String>,
        value: Constant,
        elem: ElemType,
        span: Span,
    ) -> ValueId {
        self.push_value(
            Some(name.into()),
            ValueType::scalar(elem),
            Producer::Const(value),
            span,
        )
    }

    /// Register a materialized literal under `address`.
    pub fn add_literal(&mut self, address: u64, matrix: DenseMatrix) -> Result<(), GraphError> {
        if self.literals.contains_key(&address) {
            return Err(GraphError::DuplicateLiteral { address });
        }
        self.literals.insert(address, matrix);
        Ok(())
    }

    /// Append an operation. Result values are created from `result_types`
    /// (named by `result_names` where given).
    pub fn add_op(
        &mut self,
        kind: OpKind,
        operands: Vec<ValueId>,
        attrs: Attrs,
        results: Vec<(Option<String>, ValueType)>,
        span: Span,
    ) -> Result<Vec<ValueId>, GraphError> {
        let op_name = kind.mnemonic();
        let expected = kind.operand_arity();
        if !expected.accepts(operands.len()) {
            return Err(GraphError::OperandArity {
                op: op_name,
                expected,
                found: operands.len(),
            });
        }
        let expected = kind.result_arity();
        if !expected.accepts(results.len()) {
            return Err(GraphError::ResultArity {
                op: op_name,
                expected,
                found: results.len(),
            });
        }
        check_attrs(kind, &operands, &attrs)?;

        let op_id = self.ids.alloc_op();
        let result_ids: Vec<ValueId> = results
            .into_iter()
            .enumerate()
            .map(|(idx, (name, ty))| self.push_value(name, ty, Producer::Op(op_id, idx), span))
            .collect();
        self.ops.push(Operation {
            id: op_id,
            kind,
            operands,
            results: result_ids.clone(),
            attrs,
            span,
        });
        Ok(result_ids)
    }

    /// Record the inferred shape of a value. Columns keep exactly one column.
    pub fn set_shape(&mut self, id: ValueId, shape: ShapePair) {
        let value = &mut self.values[id.index()];
        value.ty.shape = match value.ty.kind {
            ValueKind::Column => shape.with_cols(Dim::Known(1)),
            _ => shape,
        };
    }
}

/// Validate the attributes a kind depends on.
fn check_attrs(kind: OpKind, operands: &[ValueId], attrs: &Attrs) -> Result<(), GraphError> {
    let op = kind.mnemonic();
    match kind {
        OpKind::Group => match attrs.get("keys") {
            None => Err(GraphError::MissingAttribute { op, name: "keys" }),
            Some(Attr::Int(keys)) => {
                let max = operands.len().saturating_sub(1);
                match usize::try_from(*keys) {
                    Ok(k) if k <= max => Ok(()),
                    _ => Err(GraphError::InvalidAttribute {
                        op,
                        name: "keys",
                        reason: format!("must be in [0, {max}], got {keys}"),
                    }),
                }
            }
            Some(Attr::Str(_)) => Err(GraphError::InvalidAttribute {
                op,
                name: "keys",
                reason: "expected an integer".to_string(),
            }),
        },
        OpKind::Call => match attrs.get("callee") {
            None => Err(GraphError::MissingAttribute { op, name: "callee" }),
            Some(Attr::Str(_)) => Ok(()),
            Some(Attr::Int(_)) => Err(GraphError::InvalidAttribute {
                op,
                name: "callee",
                reason: "expected a string".to_string(),
            }),
        },
        _ => Ok(()),
    }
}
