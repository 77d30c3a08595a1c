// AST node types for tabshape .sir source files.
//
// Every node carries a `SimpleSpan` for error reporting in downstream phases.
//
// Preconditions: produced by the parser from a valid or partially-valid token stream.
// Postconditions: each node's span covers the source range of the construct.
// Failure modes: none (data-only module).
// Side effects: none.

use chumsky::span::SimpleSpan;

/// Byte-offset span (alias for chumsky's `SimpleSpan`).
pub type Span = SimpleSpan;

// ── Root ──

/// A complete text IR module: a sequence of statements.
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub statements: Vec<Statement>,
    pub span: Span,
}

// ── Statements ──

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub kind: StatementKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatementKind {
    Arg(ArgStmt),
    Const(ConstStmt),
    Literal(LiteralStmt),
    Op(OpStmt),
}

/// `%name`, stored without the sigil.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueName {
    pub name: String,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

// ── arg_stmt: VALUE '=' 'arg' ':' type ──

#[derive(Debug, Clone, PartialEq)]
pub struct ArgStmt {
    pub name: ValueName,
    pub ty: TypeAnn,
}

// ── const_stmt: VALUE '=' 'const' const_value ':' type ──

#[derive(Debug, Clone, PartialEq)]
pub struct ConstStmt {
    pub name: ValueName,
    pub value: ConstValue,
    pub ty: TypeAnn,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConstValue {
    Bool(bool, Span),
    Int(i64, Span),
    Float(f64, Span),
    Str(String, Span),
}

impl ConstValue {
    pub fn span(&self) -> Span {
        match self {
            ConstValue::Bool(_, s)
            | ConstValue::Int(_, s)
            | ConstValue::Float(_, s)
            | ConstValue::Str(_, s) => *s,
        }
    }
}

// ── literal_stmt: 'literal' INT '=' (rows | type) ──

#[derive(Debug, Clone, PartialEq)]
pub struct LiteralStmt {
    pub address: u64,
    pub address_span: Span,
    pub value: LiteralValue,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    /// Row-major values, e.g. `[[1, 2], [3, 4]]`.
    Rows(Vec<Vec<f64>>, Span),
    /// Zero-filled matrix of the annotated shape, e.g. `matrix<2x3>`.
    Type(TypeAnn),
}

// ── op_stmt: (VALUE (',' VALUE)* '=')? IDENT '(' operands ')' attrs? (':' types)? ──

#[derive(Debug, Clone, PartialEq)]
pub struct OpStmt {
    pub results: Vec<ValueName>,
    pub op: Ident,
    pub operands: Vec<ValueName>,
    pub attrs: Vec<AttrEntry>,
    pub types: Vec<TypeAnn>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttrEntry {
    pub name: Ident,
    pub value: AttrValue,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Int(i64, Span),
    Str(String, Span),
}

// ── Types ──

/// A type annotation: `IDENT ('<' type_param (',' type_param)* '>')?`.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeAnn {
    pub name: Ident,
    pub params: Vec<TypeParam>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeParam {
    /// `RxC` shape; `None` is `?`.
    Dims(Option<u64>, Option<u64>, Span),
    /// Single extent (column row count); `None` is `?`.
    Extent(Option<u64>, Span),
    /// Element type name.
    Elem(Ident),
    /// Frame column labels.
    Labels(Vec<String>, Span),
}

impl TypeParam {
    pub fn span(&self) -> Span {
        match self {
            TypeParam::Dims(_, _, s) | TypeParam::Extent(_, s) | TypeParam::Labels(_, s) => *s,
            TypeParam::Elem(id) => id.span,
        }
    }
}
