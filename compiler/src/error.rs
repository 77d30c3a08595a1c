// error.rs — Fatal shape-inference errors
//
// Every variant names the operation (by mnemonic) and carries its span.
// Missing preconditions (non-constant parameters, unknown operand shapes)
// are never errors; they produce unknown dimensions instead.

use thiserror::Error;

use crate::ast::Span;
use crate::diag::{codes, DiagCode, DiagLevel, Diagnostic};
use crate::ir::ValueKind;
use crate::shape::Axis;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ShapeError {
    #[error("{op}: operands must agree on the number of {axis}, but one has {first} and one has {second}")]
    ShapeMismatch {
        op: &'static str,
        axis: Axis,
        first: u64,
        second: u64,
        span: Span,
    },

    #[error("{op}: slice [{lower}, {upper}) is out of bounds for {count} {axis} (need 0 <= lower <= upper <= {count})")]
    InvalidSliceBounds {
        op: &'static str,
        axis: Axis,
        lower: i64,
        upper: i64,
        count: u64,
        span: Span,
    },

    #[error("{op}: element type '{elem}' is not supported (supported: {supported})")]
    UnsupportedElementType {
        op: &'static str,
        elem: String,
        supported: &'static str,
        span: Span,
    },

    #[error("{op}: {} of kind {kind} is not supported here", operand_label(.index))]
    UnsupportedValueKind {
        op: &'static str,
        /// Position among the operation's operands, when the value is one.
        index: Option<usize>,
        kind: ValueKind,
        span: Span,
    },

    #[error("{op}: a condition of kind {kind} is not supported")]
    UnsupportedConditionType {
        op: &'static str,
        kind: ValueKind,
        span: Span,
    },

    #[error("{op}: expected an operand at position {index}, but the operation has {count}")]
    MissingOperand {
        op: &'static str,
        index: usize,
        count: usize,
        span: Span,
    },

    #[error("{op}: required attribute '{name}' is missing")]
    MissingAttribute {
        op: &'static str,
        name: &'static str,
        span: Span,
    },

    #[error("{op}: literal address is not a compile-time constant")]
    NonConstantAddress { op: &'static str, span: Span },

    #[error("{op}: no literal is registered at address {address}")]
    UnknownLiteral {
        op: &'static str,
        address: u64,
        span: Span,
    },

    #[error("{op}: cannot obtain metadata for '{path}': {reason}")]
    FileMetadata {
        op: &'static str,
        path: String,
        reason: String,
        span: Span,
    },
}

fn operand_label(index: &Option<usize>) -> String {
    match index {
        Some(i) => format!("operand {i}"),
        None => "a value".to_string(),
    }
}

impl ShapeError {
    pub fn span(&self) -> Span {
        match self {
            ShapeError::ShapeMismatch { span, .. }
            | ShapeError::InvalidSliceBounds { span, .. }
            | ShapeError::UnsupportedElementType { span, .. }
            | ShapeError::UnsupportedValueKind { span, .. }
            | ShapeError::UnsupportedConditionType { span, .. }
            | ShapeError::MissingOperand { span, .. }
            | ShapeError::MissingAttribute { span, .. }
            | ShapeError::NonConstantAddress { span, .. }
            | ShapeError::UnknownLiteral { span, .. }
            | ShapeError::FileMetadata { span, .. } => *span,
        }
    }

    pub fn code(&self) -> DiagCode {
        match self {
            ShapeError::ShapeMismatch { .. } => codes::E0300,
            ShapeError::InvalidSliceBounds { .. } => codes::E0301,
            ShapeError::UnsupportedElementType { .. } => codes::E0302,
            ShapeError::UnsupportedValueKind { .. } => codes::E0303,
            ShapeError::UnsupportedConditionType { .. } => codes::E0304,
            ShapeError::MissingOperand { .. } => codes::E0305,
            ShapeError::MissingAttribute { .. } => codes::E0306,
            ShapeError::NonConstantAddress { .. } => codes::E0307,
            ShapeError::UnknownLiteral { .. } => codes::E0308,
            ShapeError::FileMetadata { .. } => codes::E0309,
        }
    }

    /// Convert into a host diagnostic at the operation's location.
    pub fn to_diagnostic(&self) -> Diagnostic {
        let diag = Diagnostic::new(DiagLevel::Error, self.span(), self.to_string())
            .with_code(self.code());
        match self {
            ShapeError::ShapeMismatch { .. } => {
                diag.with_hint("insert an explicit reshape or slice so the operands agree")
            }
            ShapeError::NonConstantAddress { .. } => {
                diag.with_hint("literal matrices must be referenced through a `const` address")
            }
            _ => diag,
        }
    }
}
