// resolve.rs — Name resolution and graph construction for the text IR
//
// Walks the parsed AST in source order, binds every `%name` to a `ValueId`,
// maps operation mnemonics to `OpKind`, converts type annotations into
// `ValueType`s, and builds the `Graph` that shape inference walks.
//
// Preconditions: `module` is a well-formed AST from the parser.
// Postconditions: every operation in the graph refers only to values defined
//   by earlier statements.
// Failure modes: undefined or duplicate names, unknown operations, arity and
//   attribute violations, and malformed types or constants produce
//   `Diagnostic` entries. Resolution continues past errors.
// Side effects: none.

use std::collections::{HashMap, HashSet};

use crate::ast::*;
use crate::diag::{codes, Diagnostic};
use crate::ir::{Attr, Attrs, Constant, DenseMatrix, ElemType, Graph, GraphError, ValueType};
use crate::id::ValueId;
use crate::opcode::OpKind;
use crate::shape::{Dim, ShapePair};

// ── Public types ────────────────────────────────────────────────────────────

/// Result of resolution: the graph plus all accumulated diagnostics.
#[derive(Debug)]
pub struct ResolveResult {
    pub graph: Graph,
    pub diagnostics: Vec<Diagnostic>,
}

/// Resolve a parsed module into an IR graph.
pub fn resolve(module: &Module) -> ResolveResult {
    let mut resolver = Resolver::default();
    for stmt in &module.statements {
        match &stmt.kind {
            StatementKind::Arg(arg) => resolver.resolve_arg(arg, stmt.span),
            StatementKind::Const(c) => resolver.resolve_const(c, stmt.span),
            StatementKind::Literal(lit) => resolver.resolve_literal(lit),
            StatementKind::Op(op) => resolver.resolve_op(op, stmt.span),
        }
    }
    ResolveResult {
        graph: resolver.graph,
        diagnostics: resolver.diagnostics,
    }
}

// ── Resolver ────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Resolver {
    graph: Graph,
    names: HashMap<String, ValueId>,
    /// Names whose defining statement failed; uses are skipped silently.
    poisoned: HashSet<String>,
    diagnostics: Vec<Diagnostic>,
}

impl Resolver {
    fn error(&mut self, diag: Diagnostic) {
        self.diagnostics.push(diag);
    }

    /// Returns false (and reports) when `name` is already bound.
    fn check_fresh(&mut self, name: &ValueName) -> bool {
        if self.names.contains_key(&name.name) || self.poisoned.contains(&name.name) {
            self.error(
                Diagnostic::error(name.span, format!("value '%{}' is defined more than once", name.name))
                    .with_code(codes::E0201)
                    .with_hint("every value is assigned exactly once"),
            );
            return false;
        }
        true
    }

    fn poison(&mut self, names: &[ValueName]) {
        for n in names {
            if !self.names.contains_key(&n.name) {
                self.poisoned.insert(n.name.clone());
            }
        }
    }

    fn resolve_arg(&mut self, arg: &ArgStmt, span: Span) {
        if !self.check_fresh(&arg.name) {
            return;
        }
        match resolve_type(&arg.ty) {
            Ok(ty) => {
                let id = self.graph.add_arg(arg.name.name.clone(), ty, span);
                self.names.insert(arg.name.name.clone(), id);
            }
            Err(diag) => {
                self.error(diag);
                self.poison(std::slice::from_ref(&arg.name));
            }
        }
    }

    fn resolve_const(&mut self, c: &ConstStmt, span: Span) {
        if !self.check_fresh(&c.name) {
            return;
        }
        let resolved = resolve_type(&c.ty).and_then(|ty| match ty.elem {
            Some(elem) if ty.kind == crate::ir::ValueKind::Scalar => coerce_const(&c.value, elem),
            _ => Err(Diagnostic::error(
                c.ty.span,
                format!("constant '%{}' must have a scalar type", c.name.name),
            )
            .with_code(codes::E0205)),
        });
        match resolved {
            Ok((value, elem)) => {
                let id = self.graph.add_const(c.name.name.clone(), value, elem, span);
                self.names.insert(c.name.name.clone(), id);
            }
            Err(diag) => {
                self.error(diag);
                self.poison(std::slice::from_ref(&c.name));
            }
        }
    }

    fn resolve_literal(&mut self, lit: &LiteralStmt) {
        let matrix = match &lit.value {
            LiteralValue::Rows(rows, span) => DenseMatrix::from_rows(rows).ok_or_else(|| {
                Diagnostic::error(*span, "literal rows must all have the same length")
                    .with_code(codes::E0208)
            }),
            LiteralValue::Type(ann) => zero_literal(ann),
        };
        let result = matrix.and_then(|m| {
            self.graph
                .add_literal(lit.address, m)
                .map_err(|e| graph_error(e, lit.address_span))
        });
        if let Err(diag) = result {
            self.error(diag);
        }
    }

    fn resolve_op(&mut self, stmt: &OpStmt, span: Span) {
        let kind = match OpKind::from_mnemonic(&stmt.op.name) {
            Some(kind) => kind,
            None => {
                self.error(
                    Diagnostic::error(stmt.op.span, format!("unknown operation '{}'", stmt.op.name))
                        .with_code(codes::E0202),
                );
                self.poison(&stmt.results);
                return;
            }
        };

        let mut operands = Vec::with_capacity(stmt.operands.len());
        let mut ok = true;
        for name in &stmt.operands {
            match self.names.get(&name.name) {
                Some(&id) => operands.push(id),
                None if self.poisoned.contains(&name.name) => ok = false,
                None => {
                    self.error(
                        Diagnostic::error(name.span, format!("undefined value '%{}'", name.name))
                            .with_code(codes::E0200)
                            .with_hint("values must be defined before they are used"),
                    );
                    ok = false;
                }
            }
        }

        let mut fresh = true;
        for name in &stmt.results {
            fresh &= self.check_fresh(name);
        }
        if !fresh {
            return;
        }

        let types: Result<Vec<ValueType>, Diagnostic> = if stmt.types.is_empty() {
            Ok(vec![ValueType::unknown(); stmt.results.len()])
        } else if stmt.types.len() != stmt.results.len() {
            Err(Diagnostic::error(
                span,
                format!(
                    "'{}' names {} results but annotates {} types",
                    stmt.op.name,
                    stmt.results.len(),
                    stmt.types.len()
                ),
            )
            .with_code(codes::E0204))
        } else {
            stmt.types.iter().map(resolve_type).collect()
        };

        let attrs = resolve_attrs(&stmt.attrs);

        let (types, attrs) = match (types, attrs) {
            (Ok(t), Ok(a)) if ok => (t, a),
            (t, a) => {
                if let Err(d) = t {
                    self.error(d);
                }
                if let Err(d) = a {
                    self.error(d);
                }
                self.poison(&stmt.results);
                return;
            }
        };

        let results = stmt
            .results
            .iter()
            .map(|n| Some(n.name.clone()))
            .zip(types)
            .collect();
        match self.graph.add_op(kind, operands, attrs, results, span) {
            Ok(ids) => {
                for (name, id) in stmt.results.iter().zip(ids) {
                    self.names.insert(name.name.clone(), id);
                }
            }
            Err(e) => {
                let diag = graph_error(e, stmt.op.span);
                self.error(diag);
                self.poison(&stmt.results);
            }
        }
    }
}

// ── Types ───────────────────────────────────────────────────────────────────

fn bad_type(span: Span, message: impl Into<String>) -> Diagnostic {
    Diagnostic::error(span, message).with_code(codes::E0205)
}

fn elem_of(id: &Ident) -> Result<ElemType, Diagnostic> {
    ElemType::from_name(&id.name).ok_or_else(|| {
        bad_type(id.span, format!("unknown element type '{}'", id.name))
            .with_hint("expected one of f64, f32, si64, ui64, bool, str")
    })
}

fn dims(rows: Option<u64>, cols: Option<u64>) -> ShapePair {
    ShapePair::new(Dim::from(rows), Dim::from(cols))
}

/// Convert a type annotation into a resolved value type.
pub fn resolve_type(ann: &TypeAnn) -> Result<ValueType, Diagnostic> {
    let name = ann.name.name.as_str();
    if let Some(elem) = ElemType::from_name(name) {
        if let Some(p) = ann.params.first() {
            return Err(bad_type(p.span(), format!("scalar type '{name}' takes no parameters")));
        }
        return Ok(ValueType::scalar(elem));
    }

    let mut shape: Option<ShapePair> = None;
    let mut elem: Option<ElemType> = None;
    let mut labels: Option<Vec<String>> = None;
    for param in &ann.params {
        let duplicate = match param {
            TypeParam::Dims(r, c, _) if name != "column" => shape.replace(dims(*r, *c)).is_some(),
            TypeParam::Extent(r, _) if name == "column" => {
                shape.replace(dims(*r, Some(1))).is_some()
            }
            TypeParam::Elem(id) if name == "matrix" || name == "column" => {
                elem.replace(elem_of(id)?).is_some()
            }
            TypeParam::Labels(l, _) if name == "frame" => labels.replace(l.clone()).is_some(),
            other => {
                return Err(bad_type(
                    other.span(),
                    format!("parameter is not valid for type '{name}'"),
                ))
            }
        };
        if duplicate {
            return Err(bad_type(param.span(), "parameter given more than once"));
        }
    }

    let shape = shape.unwrap_or(ShapePair::UNKNOWN);
    match name {
        "matrix" => Ok(ValueType::matrix(shape, elem)),
        "frame" => Ok(ValueType::frame(shape, labels)),
        "column" => Ok(ValueType::column(shape.rows, elem)),
        "unknown" if ann.params.is_empty() => Ok(ValueType::unknown()),
        "unknown" => Err(bad_type(ann.span, "type 'unknown' takes no parameters")),
        _ => Err(bad_type(ann.name.span, format!("unknown type '{name}'"))),
    }
}

// ── Constants, literals, attributes ─────────────────────────────────────────

fn coerce_const(value: &ConstValue, elem: ElemType) -> Result<(Constant, ElemType), Diagnostic> {
    let constant = match (value, elem) {
        (ConstValue::Bool(b, _), ElemType::Bool) => Some(Constant::Bool(*b)),
        (ConstValue::Int(n, _), ElemType::SI64) => Some(Constant::Int(*n)),
        (ConstValue::Int(n, _), ElemType::UI64) => u64::try_from(*n).ok().map(Constant::UInt),
        (ConstValue::Int(n, _), ElemType::F64 | ElemType::F32) => Some(Constant::Float(*n as f64)),
        (ConstValue::Float(f, _), ElemType::F64 | ElemType::F32) => Some(Constant::Float(*f)),
        (ConstValue::Str(s, _), ElemType::Str) => Some(Constant::Str(s.clone())),
        _ => None,
    };
    constant.map(|c| (c, elem)).ok_or_else(|| {
        Diagnostic::error(value.span(), format!("constant does not fit type {elem}"))
            .with_code(codes::E0206)
    })
}

fn zero_literal(ann: &TypeAnn) -> Result<DenseMatrix, Diagnostic> {
    let ty = resolve_type(ann)?;
    match (ty.kind, ty.shape.rows, ty.shape.cols) {
        (crate::ir::ValueKind::Matrix, Dim::Known(rows), Dim::Known(cols)) => {
            let len = usize::try_from(rows.saturating_mul(cols)).unwrap_or(usize::MAX);
            Ok(DenseMatrix {
                rows,
                cols,
                values: vec![0.0; len],
            })
        }
        _ => Err(Diagnostic::error(
            ann.span,
            "a literal declared by type must be a matrix with a known shape",
        )
        .with_code(codes::E0208)),
    }
}

fn resolve_attrs(entries: &[AttrEntry]) -> Result<Attrs, Diagnostic> {
    let mut attrs = Attrs::new();
    for entry in entries {
        let value = match &entry.value {
            AttrValue::Int(n, _) => Attr::Int(*n),
            AttrValue::Str(s, _) => Attr::Str(s.clone()),
        };
        if attrs.insert(entry.name.name.clone(), value).is_some() {
            return Err(Diagnostic::error(
                entry.name.span,
                format!("attribute '{}' given more than once", entry.name.name),
            )
            .with_code(codes::E0207));
        }
    }
    Ok(attrs)
}

fn graph_error(err: GraphError, span: Span) -> Diagnostic {
    let code = match err {
        GraphError::OperandArity { .. } | GraphError::ResultArity { .. } => codes::E0203,
        GraphError::MissingAttribute { .. } | GraphError::InvalidAttribute { .. } => codes::E0207,
        GraphError::DuplicateLiteral { .. } => codes::E0208,
    };
    Diagnostic::error(span, err.to_string()).with_code(code)
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Producer, ValueKind};
    use crate::parser::parse;

    fn resolve_src(source: &str) -> ResolveResult {
        let parsed = parse(source);
        assert!(parsed.errors.is_empty(), "parse errors: {:?}", parsed.errors);
        resolve(&parsed.module.expect("module"))
    }

    fn resolve_ok(source: &str) -> Graph {
        let result = resolve_src(source);
        assert!(
            result.diagnostics.is_empty(),
            "unexpected diagnostics: {:#?}",
            result.diagnostics
        );
        result.graph
    }

    fn first_code(source: &str) -> crate::diag::DiagCode {
        let result = resolve_src(source);
        result.diagnostics[0].code.expect("code")
    }

    #[test]
    fn builds_values_in_source_order() {
        let g = resolve_ok(
            "%a = arg : matrix<3x4, f64>\n%t = const false : bool\n%b = transpose(%a) : matrix<f64>",
        );
        assert_eq!(g.values().len(), 3);
        assert_eq!(g.ops().len(), 1);
        let a = g.lookup("a").unwrap();
        assert_eq!(g.value(a).ty.shape, ShapePair::known(3, 4));
        let t = g.lookup("t").unwrap();
        assert_eq!(g.value(t).producer, Producer::Const(Constant::Bool(false)));
        let b = g.lookup("b").unwrap();
        assert_eq!(g.value(b).ty.kind, ValueKind::Matrix);
        assert_eq!(g.value(b).ty.shape, ShapePair::UNKNOWN);
    }

    #[test]
    fn column_and_frame_types() {
        let g = resolve_ok(
            "%c = arg : column<5, si64>\n%f = arg : frame<?x2, [\"t.a\", \"t.b\"]>\n%u = arg : unknown",
        );
        let c = g.value(g.lookup("c").unwrap());
        assert_eq!(c.ty.shape, ShapePair::known(5, 1));
        assert_eq!(c.ty.elem, Some(ElemType::SI64));
        let f = g.value(g.lookup("f").unwrap());
        assert_eq!(f.ty.labels.as_deref().map(<[String]>::len), Some(2));
        assert_eq!(g.value(g.lookup("u").unwrap()).ty.kind, ValueKind::Unknown);
    }

    #[test]
    fn int_constant_coerces_to_float() {
        let g = resolve_ok("%x = const 3 : f64");
        let x = g.value(g.lookup("x").unwrap());
        assert_eq!(x.producer, Producer::Const(Constant::Float(3.0)));
        assert_eq!(x.ty.elem, Some(ElemType::F64));
    }

    #[test]
    fn undefined_value() {
        assert_eq!(first_code("%b = transpose(%a) : matrix"), codes::E0200);
    }

    #[test]
    fn redefinition() {
        assert_eq!(
            first_code("%a = arg : f64\n%a = arg : f64"),
            codes::E0201
        );
    }

    #[test]
    fn unknown_operation_poisons_results() {
        let result = resolve_src("%a = arg : matrix\n%b = frobnicate(%a) : matrix\n%c = transpose(%b) : matrix");
        assert_eq!(result.diagnostics.len(), 1);
        assert_eq!(result.diagnostics[0].code, Some(codes::E0202));
    }

    #[test]
    fn operand_arity() {
        assert_eq!(
            first_code("%a = arg : matrix\n%m = matmul(%a, %a) : matrix"),
            codes::E0203
        );
    }

    #[test]
    fn result_type_count() {
        assert_eq!(
            first_code("%f = arg : frame\n%t = const true : bool\n%d, %k = recode(%f, %t) : frame"),
            codes::E0204
        );
    }

    #[test]
    fn bad_type_parameter() {
        assert_eq!(first_code("%a = arg : matrix<[\"x\"]>"), codes::E0205);
        assert_eq!(first_code("%a = arg : tensor"), codes::E0205);
        assert_eq!(first_code("%a = arg : matrix<1x2, 3x4>"), codes::E0205);
    }

    #[test]
    fn constant_type_mismatch() {
        assert_eq!(first_code("%a = const 1.5 : si64"), codes::E0206);
        assert_eq!(first_code("%a = const -1 : ui64"), codes::E0206);
    }

    #[test]
    fn group_without_keys() {
        assert_eq!(
            first_code("%f = arg : frame\n%g = group(%f) : frame"),
            codes::E0207
        );
    }

    #[test]
    fn literals_register_by_address() {
        let g = resolve_ok("literal 0 = [[1, 2, 3], [4, 5, 6]]\nliteral 1 = matrix<2x2>");
        assert_eq!(g.literal(0).map(|m| (m.rows, m.cols)), Some((2, 3)));
        assert_eq!(g.literal(1).map(|m| m.values.len()), Some(4));
    }

    #[test]
    fn ragged_or_duplicate_literal() {
        assert_eq!(first_code("literal 0 = [[1, 2], [3]]"), codes::E0208);
        assert_eq!(
            first_code("literal 0 = [[1]]\nliteral 0 = [[2]]"),
            codes::E0208
        );
        assert_eq!(first_code("literal 0 = matrix<?x2>"), codes::E0208);
    }

    #[test]
    fn results_without_types_are_unknown() {
        let g = resolve_ok("%a = arg : matrix\n%r = call(%a) {callee = \"f\"}");
        let r = g.value(g.lookup("r").unwrap());
        assert_eq!(r.ty.kind, ValueKind::Unknown);
    }
}
