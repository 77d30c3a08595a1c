// pipeline.rs — Compilation state and pass orchestration
//
// Holds the pass artifacts and runs the minimal set of passes for a given
// terminal PassId.
//
// Preconditions: the module must be parsed before calling run_pipeline.
// Postconditions: all artifacts for required passes are populated, or has_error is set.
// Failure modes: any pass emitting error-level diagnostics.
// Side effects: calls on_pass_complete after each pass for immediate display;
//   shape inference may read metadata sidecars.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};

use crate::ast::Module;
use crate::catalog::{FileCatalog, SidecarCatalog};
use crate::diag::{DiagLevel, Diagnostic};
use crate::infer::ShapeTable;
use crate::ir::Graph;
use crate::pass::{descriptor, required_passes, PassId};

// ── Options ────────────────────────────────────────────────────────────────

/// Settings for the library entry point.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Directory that `<path>.meta` sidecars are resolved against.
    pub meta_dir: PathBuf,
    /// Print per-pass timings to stderr.
    pub verbose: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            meta_dir: PathBuf::from("."),
            verbose: false,
        }
    }
}

// ── Provenance ─────────────────────────────────────────────────────────────

/// Provenance metadata for reproducible runs and cache-key use.
///
/// `source_hash`: SHA-256 of the raw `.sir` source text.
/// `shape_fingerprint`: SHA-256 of the rendered shape table, once inferred.
/// `compiler_version`: crate version from `Cargo.toml`.
#[derive(Debug, Clone)]
pub struct Provenance {
    pub source_hash: [u8; 32],
    pub shape_fingerprint: Option<[u8; 32]>,
    pub compiler_version: &'static str,
}

impl Provenance {
    /// Hex string of the source hash (64 characters).
    pub fn source_hash_hex(&self) -> String {
        bytes_to_hex(&self.source_hash)
    }

    pub fn shape_fingerprint_hex(&self) -> Option<String> {
        self.shape_fingerprint.as_ref().map(bytes_to_hex)
    }

    pub fn to_json(&self) -> String {
        let doc = serde_json::json!({
            "source_hash": self.source_hash_hex(),
            "shape_fingerprint": self.shape_fingerprint_hex(),
            "compiler_version": self.compiler_version,
        });
        format!("{doc:#}\n")
    }
}

fn bytes_to_hex(bytes: &[u8; 32]) -> String {
    let mut s = String::with_capacity(64);
    for b in bytes {
        use std::fmt::Write;
        let _ = write!(s, "{:02x}", b);
    }
    s
}

/// Compute provenance from source text and, if available, the shape table.
pub fn compute_provenance(source: &str, shapes: Option<&ShapeTable>) -> Provenance {
    Provenance {
        source_hash: Sha256::digest(source.as_bytes()).into(),
        shape_fingerprint: shapes.map(ShapeTable::fingerprint),
        compiler_version: env!("CARGO_PKG_VERSION"),
    }
}

// ── Compilation state ──────────────────────────────────────────────────────

/// Holds all artifacts and accumulated diagnostics.
pub struct CompilationState {
    pub module: Module,
    pub graph: Option<Graph>,
    pub shapes: Option<ShapeTable>,
    pub diagnostics: Vec<Diagnostic>,
    pub has_error: bool,
    pub provenance: Option<Provenance>,
}

impl CompilationState {
    pub fn new(module: Module) -> Self {
        Self {
            module,
            graph: None,
            shapes: None,
            diagnostics: Vec::new(),
            has_error: false,
            provenance: None,
        }
    }
}

// ── Error type ─────────────────────────────────────────────────────────────

/// Pipeline execution failed due to error-level diagnostics in a pass.
/// The specific diagnostics are available in `CompilationState.diagnostics`.
#[derive(Debug)]
pub struct PipelineError {
    /// The pass that produced the error.
    pub failing_pass: PassId,
}

// ── Per-pass bookkeeping ───────────────────────────────────────────────────

fn has_error_diags(diags: &[Diagnostic]) -> bool {
    diags.iter().any(|d| d.level == DiagLevel::Error)
}

/// Per-pass post-processing: callback, accumulate, verbose, error check.
fn finish_pass(
    state: &mut CompilationState,
    pass_id: PassId,
    diags: Vec<Diagnostic>,
    elapsed: Duration,
    verbose: bool,
    on_pass_complete: &mut impl FnMut(PassId, &[Diagnostic]),
) -> Result<(), PipelineError> {
    on_pass_complete(pass_id, &diags);
    let is_err = has_error_diags(&diags);
    state.diagnostics.extend(diags);
    let ms = elapsed.as_secs_f64() * 1000.0;
    tracing::debug!(pass = descriptor(pass_id).name, ms, "pass complete");
    if verbose {
        eprintln!("tabshape: {} complete, {:.1}ms", descriptor(pass_id).name, ms);
    }
    if is_err {
        state.has_error = true;
        return Err(PipelineError {
            failing_pass: pass_id,
        });
    }
    Ok(())
}

// ── Pipeline runner ────────────────────────────────────────────────────────

/// Run the minimal set of passes to produce `terminal`.
///
/// Per-pass sequence: execute → on_pass_complete(callback) → verbose → error check.
pub fn run_pipeline(
    state: &mut CompilationState,
    terminal: PassId,
    catalog: &dyn FileCatalog,
    verbose: bool,
    mut on_pass_complete: impl FnMut(PassId, &[Diagnostic]),
) -> Result<(), PipelineError> {
    for pass_id in required_passes(terminal) {
        match pass_id {
            PassId::Resolve => {
                let t = Instant::now();
                let result = crate::resolve::resolve(&state.module);
                let elapsed = t.elapsed();
                state.graph = Some(result.graph);
                finish_pass(
                    state,
                    PassId::Resolve,
                    result.diagnostics,
                    elapsed,
                    verbose,
                    &mut on_pass_complete,
                )?;
            }
            PassId::InferShapes => {
                let t = Instant::now();
                let graph = state.graph.as_mut().ok_or(PipelineError {
                    failing_pass: PassId::InferShapes,
                })?;
                let diags = match crate::infer::infer_graph(graph, catalog) {
                    Ok(table) => {
                        state.shapes = Some(table);
                        Vec::new()
                    }
                    Err(e) => vec![e.to_diagnostic()],
                };
                let elapsed = t.elapsed();
                finish_pass(
                    state,
                    PassId::InferShapes,
                    diags,
                    elapsed,
                    verbose,
                    &mut on_pass_complete,
                )?;
            }
        }
    }
    Ok(())
}

/// Parse `source` and infer all shapes, resolving metadata sidecars against
/// `options.meta_dir`. Parse errors are returned as diagnostics; pass errors
/// are recorded in the returned state.
pub fn infer_source(
    source: &str,
    options: &PipelineOptions,
    on_pass_complete: impl FnMut(PassId, &[Diagnostic]),
) -> Result<CompilationState, Vec<Diagnostic>> {
    let t = Instant::now();
    let parsed = crate::parser::parse(source);
    let diags = parsed.diagnostics();
    let module = match parsed.module {
        Some(module) if diags.is_empty() => module,
        _ => return Err(diags),
    };
    if options.verbose {
        eprintln!(
            "tabshape: parse complete, {:.1}ms ({} statements)",
            t.elapsed().as_secs_f64() * 1000.0,
            module.statements.len()
        );
    }

    let mut state = CompilationState::new(module);
    let catalog = SidecarCatalog::new(&options.meta_dir);
    // Errors are already recorded in `state.diagnostics` and `has_error`.
    let _ = run_pipeline(
        &mut state,
        PassId::InferShapes,
        &catalog,
        options.verbose,
        on_pass_complete,
    );
    state.provenance = Some(compute_provenance(source, state.shapes.as_ref()));
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MemoryCatalog;

    fn parsed(source: &str) -> CompilationState {
        CompilationState::new(crate::parser::parse(source).module.unwrap())
    }

    #[test]
    fn resolve_only_skips_inference() {
        let mut state = parsed("%a = arg : matrix<2x3, f64>\n%t = transpose(%a) : matrix\n");
        let mut seen = Vec::new();
        run_pipeline(
            &mut state,
            PassId::Resolve,
            &MemoryCatalog::new(),
            false,
            |pass, _| seen.push(pass),
        )
        .unwrap();
        assert_eq!(seen, vec![PassId::Resolve]);
        assert!(state.graph.is_some());
        assert!(state.shapes.is_none());
    }

    #[test]
    fn infer_shapes_fills_table() {
        let mut state = parsed("%a = arg : matrix<2x3, f64>\n%t = transpose(%a) : matrix\n");
        run_pipeline(
            &mut state,
            PassId::InferShapes,
            &MemoryCatalog::new(),
            false,
            |_, _| {},
        )
        .unwrap();
        let shapes = state.shapes.unwrap();
        assert_eq!(shapes.render(), "%a = arg : matrix<2x3>\n%t = transpose : matrix<3x2>\n");
    }

    #[test]
    fn resolve_error_stops_pipeline() {
        let mut state = parsed("%t = transpose(%missing) : matrix\n");
        let err = run_pipeline(
            &mut state,
            PassId::InferShapes,
            &MemoryCatalog::new(),
            false,
            |_, _| {},
        )
        .unwrap_err();
        assert_eq!(err.failing_pass, PassId::Resolve);
        assert!(state.has_error);
        assert!(state.shapes.is_none());
    }

    #[test]
    fn shape_error_becomes_diagnostic() {
        let mut state = parsed(
            "%a = arg : matrix<5x1>\n%b = arg : matrix<7x1>\n%c = cbind(%a, %b) : matrix\n",
        );
        let err = run_pipeline(
            &mut state,
            PassId::InferShapes,
            &MemoryCatalog::new(),
            false,
            |_, _| {},
        )
        .unwrap_err();
        assert_eq!(err.failing_pass, PassId::InferShapes);
        assert_eq!(state.diagnostics.len(), 1);
        assert_eq!(state.diagnostics[0].code, Some(crate::diag::codes::E0300));
    }

    #[test]
    fn provenance_hashes_are_hex() {
        let p = compute_provenance("%a = arg : matrix\n", None);
        assert_eq!(p.source_hash_hex().len(), 64);
        assert!(p.shape_fingerprint_hex().is_none());
        assert!(p.to_json().contains("\"compiler_version\""));
    }

    #[test]
    fn infer_source_reports_parse_errors() {
        let diags = match infer_source("%a = = arg\n", &PipelineOptions::default(), |_, _| {}) {
            Err(diags) => diags,
            Ok(_) => panic!("expected a parse error"),
        };
        assert!(!diags.is_empty());
        assert_eq!(diags[0].code, Some(crate::diag::codes::E0100));
    }
}
