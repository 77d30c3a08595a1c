// diag.rs — Unified diagnostics model
//
// Provides the shared diagnostic type used by the parser, the resolver, and
// shape inference, plus the table of stable diagnostic codes.
//
// Preconditions: none (types only).
// Postconditions: none (types only).
// Failure modes: none.
// Side effects: none.

use std::fmt;

use crate::ast::Span;

// ── Diagnostic code ──────────────────────────────────────────────────────

/// A stable diagnostic code (e.g., `E0300`).
///
/// Once assigned, a code must never be reassigned to a different meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DiagCode(pub &'static str);

impl fmt::Display for DiagCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub mod codes {
    use super::DiagCode;

    // E01xx: lexing and parsing
    pub const E0100: DiagCode = DiagCode("E0100"); // syntax error

    // E02xx: resolution
    pub const E0200: DiagCode = DiagCode("E0200"); // undefined value
    pub const E0201: DiagCode = DiagCode("E0201"); // value redefined
    pub const E0202: DiagCode = DiagCode("E0202"); // unknown operation
    pub const E0203: DiagCode = DiagCode("E0203"); // operand/result arity
    pub const E0204: DiagCode = DiagCode("E0204"); // result/type count mismatch
    pub const E0205: DiagCode = DiagCode("E0205"); // invalid type annotation
    pub const E0206: DiagCode = DiagCode("E0206"); // constant does not fit its type
    pub const E0207: DiagCode = DiagCode("E0207"); // invalid or missing attribute
    pub const E0208: DiagCode = DiagCode("E0208"); // invalid literal matrix

    // E03xx: shape inference
    pub const E0300: DiagCode = DiagCode("E0300"); // shape mismatch
    pub const E0301: DiagCode = DiagCode("E0301"); // invalid slice bounds
    pub const E0302: DiagCode = DiagCode("E0302"); // unsupported element type
    pub const E0303: DiagCode = DiagCode("E0303"); // unsupported value kind
    pub const E0304: DiagCode = DiagCode("E0304"); // unsupported condition type
    pub const E0305: DiagCode = DiagCode("E0305"); // missing operand
    pub const E0306: DiagCode = DiagCode("E0306"); // missing attribute
    pub const E0307: DiagCode = DiagCode("E0307"); // non-constant literal address
    pub const E0308: DiagCode = DiagCode("E0308"); // unknown literal
    pub const E0309: DiagCode = DiagCode("E0309"); // file metadata unavailable
}

// ── Severity level ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagLevel {
    Error,
    Warning,
}

// ── Diagnostic ───────────────────────────────────────────────────────────

/// A diagnostic emitted by any phase.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub code: Option<DiagCode>,
    pub level: DiagLevel,
    pub span: Span,
    pub message: String,
    pub hint: Option<String>,
}

impl Diagnostic {
    /// Create a new diagnostic with no code or hint.
    pub fn new(level: DiagLevel, span: Span, message: impl Into<String>) -> Self {
        Self {
            code: None,
            level,
            span,
            message: message.into(),
            hint: None,
        }
    }

    pub fn error(span: Span, message: impl Into<String>) -> Self {
        Self::new(DiagLevel::Error, span, message)
    }

    /// Attach a stable diagnostic code.
    pub fn with_code(mut self, code: DiagCode) -> Self {
        self.code = Some(code);
        self
    }

    /// Attach a remediation hint.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Render with a `line:col` location computed from `source`.
    pub fn render(&self, file: &str, source: &str) -> String {
        let (line, col) = line_col(source, self.span.start);
        format!("{file}:{line}:{col}: {self}")
    }
}

/// 1-based line and column of a byte offset.
pub fn line_col(source: &str, offset: usize) -> (usize, usize) {
    let offset = offset.min(source.len());
    let before = &source[..offset];
    let line = before.matches('\n').count() + 1;
    let col = match before.rfind('\n') {
        Some(nl) => before[nl + 1..].chars().count() + 1,
        None => before.chars().count() + 1,
    };
    (line, col)
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level {
            DiagLevel::Error => "error",
            DiagLevel::Warning => "warning",
        };
        if let Some(code) = &self.code {
            write!(f, "{}[{}]: {}", level, code, self.message)?;
        } else {
            write!(f, "{}: {}", level, self.message)?;
        }
        if let Some(hint) = &self.hint {
            write!(f, "\n  hint: {}", hint)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_span() -> Span {
        (0..1).into()
    }

    #[test]
    fn display_without_code() {
        let d = Diagnostic::new(DiagLevel::Error, dummy_span(), "something failed");
        assert_eq!(format!("{d}"), "error: something failed");
    }

    #[test]
    fn display_with_code() {
        let d = Diagnostic::new(DiagLevel::Warning, dummy_span(), "unused value")
            .with_code(DiagCode("W0001"));
        assert_eq!(format!("{d}"), "warning[W0001]: unused value");
    }

    #[test]
    fn builder_chain() {
        let d = Diagnostic::error(dummy_span(), "shape mismatch")
            .with_code(codes::E0300)
            .with_hint("insert a reshape");
        assert_eq!(d.code, Some(codes::E0300));
        assert_eq!(d.hint.as_deref(), Some("insert a reshape"));
    }

    #[test]
    fn line_col_counts_from_one() {
        let src = "%a = arg : matrix\n%b = transpose(%a) : matrix\n";
        assert_eq!(line_col(src, 0), (1, 1));
        assert_eq!(line_col(src, 18), (2, 1));
        assert_eq!(line_col(src, 23), (2, 6));
    }

    #[test]
    fn render_prefixes_location() {
        let src = "\n  bad";
        let d = Diagnostic::error((3..6).into(), "oops").with_code(codes::E0100);
        assert_eq!(d.render("f.sir", src), "f.sir:2:3: error[E0100]: oops");
    }
}
