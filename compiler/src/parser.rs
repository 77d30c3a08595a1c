// Parser for tabshape .sir source files.
//
// Parses a token stream (from the lexer) into an AST. Uses chumsky
// combinators.
//
// Preconditions: input is a valid token stream from `lexer::lex()`.
// Postconditions: returns an AST plus any parse errors (non-fatal).
// Failure modes: syntax errors produce `Rich` diagnostics; parsing continues.
// Side effects: none.

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;
use chumsky::span::SimpleSpan;

use crate::ast::*;
use crate::diag::{codes, Diagnostic};
use crate::lexer::Token;

/// Result of parsing: AST plus any errors.
#[derive(Debug)]
pub struct ParseResult {
    pub module: Option<Module>,
    pub errors: Vec<Rich<'static, Token, SimpleSpan>>,
}

impl ParseResult {
    /// Parse errors as host diagnostics (code E0100).
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.errors
            .iter()
            .map(|e| Diagnostic::error(*e.span(), e.to_string()).with_code(codes::E0100))
            .collect()
    }
}

/// Parse a text IR source string. Lexes then parses.
pub fn parse(source: &str) -> ParseResult {
    let lex_result = crate::lexer::lex(source);
    let len = source.len();

    let token_iter = lex_result.tokens.into_iter();
    let eoi: SimpleSpan = (len..len).into();
    let stream = Stream::from_iter(token_iter).map(eoi, |(t, s): (_, _)| (t, s));

    let parser = module_parser(source);
    let (module, parse_errors) = parser.parse(stream).into_output_errors();

    // Merge lex errors + parse errors.
    let mut all_errors: Vec<Rich<'static, Token, SimpleSpan>> = lex_result
        .errors
        .into_iter()
        .map(|e| Rich::custom(e.span, e.message))
        .collect();
    all_errors.extend(parse_errors.into_iter().map(|e| e.into_owned()));

    ParseResult {
        module,
        errors: all_errors,
    }
}

/// Right-hand side of a definition, before the result list is checked.
enum Rhs {
    Arg(TypeAnn),
    Const(ConstValue, TypeAnn),
    Op(OpCall),
}

type OpCall = (Ident, Vec<ValueName>, Vec<AttrEntry>, Vec<TypeAnn>);

// ── Main parser builder ──
//
// All grammar rules are built inside `module_parser` so that the `source`
// reference is captured once and shared by all combinators.

fn module_parser<'tokens, 'src: 'tokens, I>(
    source: &'src str,
) -> impl Parser<'tokens, I, Module, extra::Err<Rich<'tokens, Token, SimpleSpan>>> + 'src
where
    'tokens: 'src,
    I: ValueInput<'tokens, Token = Token, Span = SimpleSpan>,
{
    // ── Newlines ──

    let nl = just(Token::Newline).repeated().ignored();

    // ── Names ──

    let ident = just(Token::Ident).map_with(move |_, e| {
        let span: SimpleSpan = e.span();
        Ident {
            name: source[span.start()..span.end()].to_string(),
            span,
        }
    });

    let value_name = select! {
        Token::Value(name) = e => ValueName { name, span: e.span() },
    };

    // ── Types ──

    let labels = select! { Token::StringLit(s) => s }
        .separated_by(just(Token::Comma))
        .collect::<Vec<_>>()
        .delimited_by(just(Token::LBracket), just(Token::RBracket))
        .map_with(|labels, e| TypeParam::Labels(labels, e.span()));

    let extent = select! {
        Token::Int(n) = e => (Some(n), e.span()),
        Token::Question = e => (None, e.span()),
    }
    .try_map(|(n, span), _| match n {
        None => Ok(TypeParam::Extent(None, span)),
        Some(n) => u64::try_from(n)
            .map(|n| TypeParam::Extent(Some(n), span))
            .map_err(|_| Rich::custom(span, format!("extent must be non-negative, found {n}"))),
    });

    let type_param = choice((
        select! { Token::Dims((r, c)) = e => TypeParam::Dims(r, c, e.span()) },
        extent,
        labels,
        ident.clone().map(TypeParam::Elem),
    ));

    let type_ann = ident
        .clone()
        .then(
            type_param
                .separated_by(just(Token::Comma))
                .at_least(1)
                .collect::<Vec<_>>()
                .delimited_by(just(Token::Lt), just(Token::Gt))
                .or_not(),
        )
        .map_with(|(name, params), e| TypeAnn {
            name,
            params: params.unwrap_or_default(),
            span: e.span(),
        });

    // ── Constants ──

    let const_value = select! {
        Token::True = e => ConstValue::Bool(true, e.span()),
        Token::False = e => ConstValue::Bool(false, e.span()),
        Token::Int(n) = e => ConstValue::Int(n, e.span()),
        Token::Float(f) = e => ConstValue::Float(f, e.span()),
        Token::StringLit(s) = e => ConstValue::Str(s, e.span()),
    };

    // ── Literal matrices ──

    let number = select! {
        Token::Int(n) => n as f64,
        Token::Float(f) => f,
    };

    let literal_rows = number
        .separated_by(just(Token::Comma))
        .at_least(1)
        .collect::<Vec<_>>()
        .delimited_by(just(Token::LBracket), just(Token::RBracket))
        .separated_by(just(Token::Comma))
        .at_least(1)
        .collect::<Vec<_>>()
        .delimited_by(just(Token::LBracket), just(Token::RBracket))
        .map_with(|rows, e| LiteralValue::Rows(rows, e.span()));

    let address = select! { Token::Int(n) = e => (n, e.span()) }.try_map(|(n, span), _| {
        u64::try_from(n)
            .map(|a| (a, span))
            .map_err(|_| Rich::custom(span, format!("literal address must be non-negative, found {n}")))
    });

    let literal_stmt = just(Token::Literal)
        .ignore_then(address)
        .then_ignore(just(Token::Equals))
        .then(literal_rows.or(type_ann.clone().map(LiteralValue::Type)))
        .map(|((address, address_span), value)| {
            StatementKind::Literal(LiteralStmt {
                address,
                address_span,
                value,
            })
        });

    // ── Operations ──

    let attr_value = select! {
        Token::Int(n) = e => AttrValue::Int(n, e.span()),
        Token::StringLit(s) = e => AttrValue::Str(s, e.span()),
    };

    let attrs = ident
        .clone()
        .then_ignore(just(Token::Equals))
        .then(attr_value)
        .map(|(name, value)| AttrEntry { name, value })
        .separated_by(just(Token::Comma))
        .allow_trailing()
        .collect::<Vec<_>>()
        .delimited_by(just(Token::LBrace), just(Token::RBrace));

    let op_call = ident
        .clone()
        .then(
            value_name
                .clone()
                .separated_by(just(Token::Comma))
                .collect::<Vec<_>>()
                .delimited_by(just(Token::LParen), just(Token::RParen)),
        )
        .then(attrs.or_not())
        .then(
            just(Token::Colon)
                .ignore_then(
                    type_ann
                        .clone()
                        .separated_by(just(Token::Comma))
                        .at_least(1)
                        .collect::<Vec<_>>(),
                )
                .or_not(),
        )
        .map(|(((op, operands), attrs), types)| -> OpCall {
            (
                op,
                operands,
                attrs.unwrap_or_default(),
                types.unwrap_or_default(),
            )
        });

    // ── Definitions: results '=' rhs ──

    let arg_rhs = just(Token::Arg)
        .ignore_then(just(Token::Colon))
        .ignore_then(type_ann.clone())
        .map(Rhs::Arg);

    let const_rhs = just(Token::Const)
        .ignore_then(const_value)
        .then_ignore(just(Token::Colon))
        .then(type_ann.clone())
        .map(|(value, ty)| Rhs::Const(value, ty));

    let definition = value_name
        .separated_by(just(Token::Comma))
        .at_least(1)
        .collect::<Vec<_>>()
        .then_ignore(just(Token::Equals))
        .then(choice((arg_rhs, const_rhs, op_call.clone().map(Rhs::Op))))
        .try_map(|(mut names, rhs), span| match rhs {
            Rhs::Arg(ty) if names.len() == 1 => Ok(StatementKind::Arg(ArgStmt {
                name: names.remove(0),
                ty,
            })),
            Rhs::Const(value, ty) if names.len() == 1 => Ok(StatementKind::Const(ConstStmt {
                name: names.remove(0),
                value,
                ty,
            })),
            Rhs::Arg(_) | Rhs::Const(..) => Err(Rich::custom(
                span,
                "`arg` and `const` define exactly one value",
            )),
            Rhs::Op((op, operands, attrs, types)) => Ok(StatementKind::Op(OpStmt {
                results: names,
                op,
                operands,
                attrs,
                types,
            })),
        });

    let bare_op = op_call.map(|(op, operands, attrs, types)| {
        StatementKind::Op(OpStmt {
            results: Vec::new(),
            op,
            operands,
            attrs,
            types,
        })
    });

    // ── Statement dispatch ──

    let statement = choice((literal_stmt, definition, bare_op)).map_with(|kind, e| Statement {
        kind,
        span: e.span(),
    });

    // ── Module ──

    nl.clone()
        .ignore_then(
            statement
                .separated_by(just(Token::Newline).repeated().at_least(1))
                .allow_trailing()
                .collect::<Vec<_>>(),
        )
        .then_ignore(nl)
        .map_with(move |statements, e| Module {
            statements,
            span: e.span(),
        })
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> Module {
        let result = parse(source);
        assert!(
            result.errors.is_empty(),
            "unexpected errors: {:#?}",
            result.errors
        );
        result.module.expect("expected module")
    }

    fn parse_one_stmt(source: &str) -> Statement {
        let module = parse_ok(source);
        assert_eq!(module.statements.len(), 1, "expected 1 statement");
        module.statements.into_iter().next().unwrap()
    }

    #[test]
    fn empty_module() {
        assert!(parse_ok("").statements.is_empty());
        assert!(parse_ok("\n\n# only a comment\n").statements.is_empty());
    }

    #[test]
    fn arg_with_shape_and_elem() {
        let s = parse_one_stmt("%a = arg : matrix<10x4, f64>");
        let StatementKind::Arg(arg) = &s.kind else {
            panic!("expected Arg")
        };
        assert_eq!(arg.name.name, "a");
        assert_eq!(arg.ty.name.name, "matrix");
        assert!(matches!(arg.ty.params[0], TypeParam::Dims(Some(10), Some(4), _)));
        assert!(matches!(&arg.ty.params[1], TypeParam::Elem(id) if id.name == "f64"));
    }

    #[test]
    fn frame_labels() {
        let s = parse_one_stmt(r#"%f = arg : frame<3x?, ["t.a", "t.b"]>"#);
        let StatementKind::Arg(arg) = &s.kind else {
            panic!("expected Arg")
        };
        assert!(matches!(arg.ty.params[0], TypeParam::Dims(Some(3), None, _)));
        assert!(
            matches!(&arg.ty.params[1], TypeParam::Labels(l, _) if l == &["t.a".to_string(), "t.b".to_string()])
        );
    }

    #[test]
    fn column_extent() {
        let s = parse_one_stmt("%c = arg : column<?, si64>");
        let StatementKind::Arg(arg) = &s.kind else {
            panic!("expected Arg")
        };
        assert!(matches!(arg.ty.params[0], TypeParam::Extent(None, _)));
    }

    #[test]
    fn const_values() {
        let s = parse_one_stmt("%t = const true : bool");
        assert!(matches!(
            &s.kind,
            StatementKind::Const(c) if matches!(c.value, ConstValue::Bool(true, _))
        ));
        let s = parse_one_stmt("%x = const -2.5 : f64");
        assert!(matches!(
            &s.kind,
            StatementKind::Const(c) if matches!(c.value, ConstValue::Float(v, _) if v == -2.5)
        ));
        let s = parse_one_stmt(r#"%p = const "data.csv" : str"#);
        assert!(matches!(
            &s.kind,
            StatementKind::Const(c) if matches!(&c.value, ConstValue::Str(v, _) if v == "data.csv")
        ));
    }

    #[test]
    fn op_with_multiple_results() {
        let s = parse_one_stmt("%d, %k = recode(%f, %t) : frame, frame");
        let StatementKind::Op(op) = &s.kind else {
            panic!("expected Op")
        };
        assert_eq!(op.op.name, "recode");
        assert_eq!(op.results.len(), 2);
        assert_eq!(op.operands.len(), 2);
        assert_eq!(op.types.len(), 2);
    }

    #[test]
    fn op_without_results() {
        let s = parse_one_stmt("print(%m)");
        let StatementKind::Op(op) = &s.kind else {
            panic!("expected Op")
        };
        assert!(op.results.is_empty());
        assert!(op.types.is_empty());
    }

    #[test]
    fn op_attributes() {
        let s = parse_one_stmt(r#"%g = group(%f, %k, %a) {keys = 1, note = "x"} : frame"#);
        let StatementKind::Op(op) = &s.kind else {
            panic!("expected Op")
        };
        assert_eq!(op.attrs.len(), 2);
        assert_eq!(op.attrs[0].name.name, "keys");
        assert!(matches!(op.attrs[0].value, AttrValue::Int(1, _)));
    }

    #[test]
    fn literal_rows_and_type() {
        let s = parse_one_stmt("literal 3 = [[1, 2.5], [3, 4]]");
        let StatementKind::Literal(lit) = &s.kind else {
            panic!("expected Literal")
        };
        assert_eq!(lit.address, 3);
        assert!(matches!(&lit.value, LiteralValue::Rows(r, _) if r.len() == 2 && r[0][1] == 2.5));

        let s = parse_one_stmt("literal 0 = matrix<2x3>");
        assert!(matches!(
            &s.kind,
            StatementKind::Literal(LiteralStmt { value: LiteralValue::Type(_), .. })
        ));
    }

    #[test]
    fn multiple_statements() {
        let src = "%a = arg : matrix<2x2>\n\n%b = transpose(%a) : matrix\nprint(%b)\n";
        let module = parse_ok(src);
        assert_eq!(module.statements.len(), 3);
    }

    #[test]
    fn statement_spans() {
        let module = parse_ok("%a = arg : f64\n%b = arg : f64");
        assert_eq!(module.statements[1].span.start, 15);
    }

    #[test]
    fn arg_with_two_names_is_rejected() {
        let result = parse("%a, %b = arg : f64");
        assert!(!result.errors.is_empty());
    }

    #[test]
    fn negative_literal_address_is_rejected() {
        let result = parse("literal -1 = matrix<1x1>");
        assert!(!result.errors.is_empty());
    }

    #[test]
    fn missing_paren_reports_error() {
        let result = parse("%b = transpose(%a : matrix");
        assert!(!result.errors.is_empty());
        let diags = result.diagnostics();
        assert_eq!(diags[0].code, Some(codes::E0100));
    }

    #[test]
    fn lex_errors_are_merged() {
        let result = parse("%a = arg : f64 @");
        assert!(result
            .errors
            .iter()
            .any(|e| e.to_string().contains("unexpected input")));
    }
}
