// infer.rs — Shape dispatch and the forward graph walk
//
// `infer_shapes` picks a kind's custom rule, its trait set, or the
// all-unknown fallback. `infer_graph` visits operations in definition order,
// writes each result's shape back into the graph, and returns the final
// shape table.
//
// Preconditions: operations are stored in definition-before-use order.
// Postconditions: every matrix/frame/column result carries its inferred
//   shape; scalar and unknown-kind results are untouched.
// Failure modes: the first `ShapeError` aborts the walk.
// Side effects: mutates value shapes in the graph; emits `tracing` events.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::catalog::FileCatalog;
use crate::env::{GraphEnv, ShapeEnv};
use crate::error::ShapeError;
use crate::ir::{Graph, Operation, Producer, ValueKind};
use crate::rules::{shape_rule, ShapeRule};
use crate::shape::ShapePair;
use crate::shape_traits::apply_traits;

// ── Dispatch ────────────────────────────────────────────────────────────────

/// One shape per result of `op`.
pub fn infer_shapes(op: &Operation, env: &dyn ShapeEnv) -> Result<Vec<ShapePair>, ShapeError> {
    match shape_rule(op.kind) {
        ShapeRule::Custom(rule) => rule(op, env),
        ShapeRule::Traits(set) if op.results.len() == 1 => Ok(vec![apply_traits(op, env, &set)?]),
        ShapeRule::Traits(_) | ShapeRule::Opaque => Ok(vec![ShapePair::UNKNOWN; op.results.len()]),
    }
}

// ── Graph walk ──────────────────────────────────────────────────────────────

/// Infer and attach shapes for every operation of `graph`.
pub fn infer_graph(graph: &mut Graph, catalog: &dyn FileCatalog) -> Result<ShapeTable, ShapeError> {
    for index in 0..graph.ops().len() {
        let (results, shapes) = {
            let env = GraphEnv::new(graph, catalog);
            let op = &graph.ops()[index];
            let shapes = infer_shapes(op, &env)?;
            tracing::debug!(op = %op.id, kind = %op.kind, ?shapes, "inferred shapes");
            (op.results.clone(), shapes)
        };
        for (value, shape) in results.into_iter().zip(shapes) {
            if graph.value(value).ty.kind.is_shaped() {
                graph.set_shape(value, shape);
            }
        }
    }
    Ok(ShapeTable::from_graph(graph))
}

// ── Shape table ─────────────────────────────────────────────────────────────

/// Shape of one matrix, frame, or column value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShapeEntry {
    pub value: String,
    pub kind: ValueKind,
    /// `arg`, `const`, or the producing operation's mnemonic.
    pub producer: String,
    pub shape: ShapePair,
}

/// Shapes of all shaped values, in definition order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShapeTable {
    pub entries: Vec<ShapeEntry>,
}

impl ShapeTable {
    pub fn from_graph(graph: &Graph) -> Self {
        let entries = graph
            .values()
            .iter()
            .filter(|v| v.ty.kind.is_shaped())
            .map(|v| ShapeEntry {
                value: v.display_name(),
                kind: v.ty.kind,
                producer: match v.producer {
                    Producer::Arg => "arg".to_string(),
                    Producer::Const(_) => "const".to_string(),
                    Producer::Op(id, _) => graph.op(id).kind.mnemonic().to_string(),
                },
                shape: v.ty.shape,
            })
            .collect();
        Self { entries }
    }

    /// Look up the entry of a named value.
    pub fn get(&self, value: &str) -> Option<&ShapeEntry> {
        self.entries.iter().find(|e| e.value == value)
    }

    /// One line per value, e.g. `%m = matmul : matrix<3x5>`.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for e in &self.entries {
            out.push_str(&format!("%{} = {} : {}<{}>\n", e.value, e.producer, e.kind, e.shape));
        }
        out
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// SHA-256 of the rendered table.
    pub fn fingerprint(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.render().as_bytes());
        hasher.finalize().into()
    }
}
