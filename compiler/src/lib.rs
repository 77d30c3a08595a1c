// tabshape — shape inference for an array/relational IR
//
// Library root. The core is `shape`, `query`, `rules`, `shape_traits` and
// `infer`; the rest is the host around it (text IR, resolver, catalog,
// pipeline).

pub mod ast;
pub mod catalog;
pub mod diag;
pub mod env;
pub mod error;
pub mod id;
pub mod infer;
pub mod ir;
pub mod lexer;
pub mod opcode;
pub mod parser;
pub mod pass;
pub mod pipeline;
pub mod query;
pub mod resolve;
pub mod rules;
pub mod shape;
pub mod shape_traits;
