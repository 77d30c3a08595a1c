// env.rs — Facts shape inference consumes from its collaborators
//
// `ShapeEnv` gathers what type inference, constant folding, the literal
// store, and the file catalog already know about IR values. `GraphEnv`
// answers these queries from a resolved `Graph`.
//
// Preconditions: none.
// Postconditions: queries are pure; repeated calls return identical answers
//   while the graph is unchanged.
// Failure modes: file metadata lookups may fail with `CatalogError`.
// Side effects: `file_metadata` may read from the filesystem.

use crate::catalog::{CatalogError, FileCatalog, FileMetadata};
use crate::id::ValueId;
use crate::ir::{Constant, DenseMatrix, ElemType, Graph, Producer, ValueKind};
use crate::shape::ShapePair;

/// Read-only view of everything a shape rule may ask about values.
pub trait ShapeEnv {
    /// Data kind resolved by type inference.
    fn classify(&self, value: ValueId) -> ValueKind;

    /// Stored shape of a matrix, frame, or column value.
    fn shape_of(&self, value: ValueId) -> ShapePair;

    fn element_type(&self, value: ValueId) -> Option<ElemType>;

    /// Column labels of a frame value, when known.
    fn labels_of(&self, value: ValueId) -> Option<&[String]>;

    /// The compile-time constant a value is bound to, if any.
    fn constant(&self, value: ValueId) -> Option<&Constant>;

    fn file_metadata(&self, path: &str) -> Result<FileMetadata, CatalogError>;

    /// Materialized literal registered under `address`.
    fn literal(&self, address: u64) -> Option<&DenseMatrix>;
}

/// `ShapeEnv` over a resolved graph and a file catalog.
pub struct GraphEnv<'a> {
    graph: &'a Graph,
    catalog: &'a dyn FileCatalog,
}

impl<'a> GraphEnv<'a> {
    pub fn new(graph: &'a Graph, catalog: &'a dyn FileCatalog) -> Self {
        Self { graph, catalog }
    }
}

impl ShapeEnv for GraphEnv<'_> {
    fn classify(&self, value: ValueId) -> ValueKind {
        self.graph.value(value).ty.kind
    }

    fn shape_of(&self, value: ValueId) -> ShapePair {
        self.graph.value(value).ty.shape
    }

    fn element_type(&self, value: ValueId) -> Option<ElemType> {
        self.graph.value(value).ty.elem
    }

    fn labels_of(&self, value: ValueId) -> Option<&[String]> {
        self.graph.value(value).ty.labels.as_deref()
    }

    fn constant(&self, value: ValueId) -> Option<&Constant> {
        match &self.graph.value(value).producer {
            Producer::Const(c) => Some(c),
            Producer::Arg | Producer::Op(..) => None,
        }
    }

    fn file_metadata(&self, path: &str) -> Result<FileMetadata, CatalogError> {
        self.catalog.metadata(path)
    }

    fn literal(&self, address: u64) -> Option<&DenseMatrix> {
        self.graph.literal(address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MemoryCatalog;
    use crate::ir::ValueType;
    use crate::shape::Dim;

    #[test]
    fn answers_from_graph() {
        let span = (0..0).into();
        let mut g = Graph::new();
        let f = g.add_arg(
            "f",
            ValueType::frame(ShapePair::known(3, 2), Some(vec!["t.a".into(), "t.b".into()])),
            span,
        );
        let k = g.add_const("k", Constant::Int(4), ElemType::SI64, span);
        let mut catalog = MemoryCatalog::new();
        catalog.insert("x.csv", Dim::Known(9), Dim::Known(2));

        let env = GraphEnv::new(&g, &catalog);
        assert_eq!(env.classify(f), ValueKind::Frame);
        assert_eq!(env.shape_of(f), ShapePair::known(3, 2));
        assert_eq!(env.labels_of(f).map(<[String]>::len), Some(2));
        assert_eq!(env.constant(f), None);
        assert_eq!(env.constant(k), Some(&Constant::Int(4)));
        assert_eq!(env.element_type(k), Some(ElemType::SI64));
        assert_eq!(env.file_metadata("x.csv").unwrap().num_rows, Dim::Known(9));
        assert!(env.literal(0).is_none());
    }
}
