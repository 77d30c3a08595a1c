// catalog.rs — File metadata lookup for externally stored datasets
//
// `read` operations with a constant path ask a `FileCatalog` for the row and
// column counts of the file. The sidecar catalog reads `<path>.meta` JSON
// documents; extra fields (value type, schema, labels) are ignored.
//
// Preconditions: none.
// Postconditions: negative counts in a metadata document map to unknown.
// Failure modes: missing or malformed metadata yields `CatalogError`.
// Side effects: `SidecarCatalog` reads from the filesystem.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::shape::Dim;

/// Row and column counts of an external dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMetadata {
    pub num_rows: Dim,
    pub num_cols: Dim,
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("no metadata registered")]
    NotFound,
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed metadata in {}: {source}", path.display())]
    Malformed {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Source of file metadata.
pub trait FileCatalog {
    fn metadata(&self, path: &str) -> Result<FileMetadata, CatalogError>;
}

// ── Sidecar `.meta` files ───────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MetaDocument {
    num_rows: i64,
    num_cols: i64,
}

/// Reads `<base>/<path>.meta` for each requested path.
#[derive(Debug, Clone)]
pub struct SidecarCatalog {
    base: PathBuf,
}

impl SidecarCatalog {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    fn meta_path(&self, path: &str) -> PathBuf {
        self.base.join(format!("{path}.meta"))
    }
}

impl FileCatalog for SidecarCatalog {
    fn metadata(&self, path: &str) -> Result<FileMetadata, CatalogError> {
        let meta_path = self.meta_path(path);
        let text = std::fs::read_to_string(&meta_path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                CatalogError::NotFound
            } else {
                CatalogError::Io {
                    path: meta_path.clone(),
                    source,
                }
            }
        })?;
        parse_meta(&text, &meta_path)
    }
}

fn parse_meta(text: &str, origin: &Path) -> Result<FileMetadata, CatalogError> {
    let doc: MetaDocument =
        serde_json::from_str(text).map_err(|source| CatalogError::Malformed {
            path: origin.to_path_buf(),
            source,
        })?;
    Ok(FileMetadata {
        num_rows: Dim::from_signed(doc.num_rows),
        num_cols: Dim::from_signed(doc.num_cols),
    })
}

// ── In-memory catalog ───────────────────────────────────────────────────────

/// Catalog backed by a map; used by embedders and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    entries: HashMap<String, FileMetadata>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, rows: Dim, cols: Dim) {
        self.entries.insert(
            path.into(),
            FileMetadata {
                num_rows: rows,
                num_cols: cols,
            },
        );
    }
}

impl FileCatalog for MemoryCatalog {
    fn metadata(&self, path: &str) -> Result<FileMetadata, CatalogError> {
        self.entries.get(path).copied().ok_or(CatalogError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_counts_and_ignores_extra_fields() {
        let text = r#"{"numRows": 120, "numCols": 4, "valueType": "f64", "numNonZeros": -1}"#;
        let meta = parse_meta(text, Path::new("x.csv.meta")).unwrap();
        assert_eq!(meta.num_rows, Dim::Known(120));
        assert_eq!(meta.num_cols, Dim::Known(4));
    }

    #[test]
    fn negative_counts_are_unknown() {
        let meta = parse_meta(r#"{"numRows": -1, "numCols": 3}"#, Path::new("m")).unwrap();
        assert_eq!(meta.num_rows, Dim::Unknown);
    }

    #[test]
    fn malformed_document() {
        let err = parse_meta(r#"{"numRows": 1}"#, Path::new("m")).unwrap_err();
        assert!(matches!(err, CatalogError::Malformed { .. }));
    }

    #[test]
    fn sidecar_reads_meta_next_to_data() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("data.csv.meta"),
            r#"{"numRows": 10, "numCols": 2}"#,
        )
        .unwrap();
        let catalog = SidecarCatalog::new(dir.path());
        let meta = catalog.metadata("data.csv").unwrap();
        assert_eq!(meta.num_rows, Dim::Known(10));
        assert!(matches!(
            catalog.metadata("missing.csv"),
            Err(CatalogError::NotFound)
        ));
    }

    #[test]
    fn memory_catalog_lookup() {
        let mut catalog = MemoryCatalog::new();
        catalog.insert("a.csv", Dim::Known(3), Dim::Unknown);
        assert_eq!(catalog.metadata("a.csv").unwrap().num_cols, Dim::Unknown);
        assert!(catalog.metadata("b.csv").is_err());
    }
}
