// Snapshot tests: lock the shape tables of the demo programs.
//
// Uses the library entry point (parse → resolve → infer_shapes) and
// snapshots the rendered table inline with `insta`.
//
// Run `cargo insta review` after intentional output changes to update baselines.

use std::path::{Path, PathBuf};

use tabshape::pipeline::{infer_source, PipelineOptions};

fn project_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .to_path_buf()
}

fn demos_dir() -> PathBuf {
    project_root().join("demos")
}

/// Run the full pipeline on a demo and return the rendered shape table.
fn shapes_of(demo: &str) -> String {
    let path = demos_dir().join(demo);
    let source = std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("failed to read {}: {}", path.display(), e));
    let options = PipelineOptions {
        meta_dir: demos_dir(),
        verbose: false,
    };
    let state = match infer_source(&source, &options, |_, _| {}) {
        Ok(state) => state,
        Err(diags) => panic!("{demo} failed to parse: {diags:#?}"),
    };
    assert!(
        !state.has_error,
        "{demo} failed: {:#?}",
        state.diagnostics
    );
    state.shapes.expect("shape table").render()
}

#[test]
fn snapshot_regression() {
    insta::assert_snapshot!(shapes_of("regression.sir"), @r"
    %X = arg : matrix<1000x20>
    %y = arg : matrix<1000x1>
    %Xt = transpose : matrix<20x1000>
    %XtX = matmul : matrix<20x20>
    %G = syrk : matrix<20x20>
    %Xty = matmul : matrix<20x1>
    %d = col_sum : matrix<1x20>
    %I = diag_matrix : matrix<20x20>
    %reg = ew_mul : matrix<20x20>
    %A = ew_add : matrix<20x20>
    %vals = eigen : matrix<20x1>
    %vecs = eigen : matrix<20x20>
    %b = row_mean : matrix<20x1>
    %pred = matmul : matrix<1000x1>
    %res = ew_sub : matrix<1000x1>
    %sq = ew_pow : matrix<1000x1>
    %mse = all_mean : matrix<1x1>
    ");
}

#[test]
fn snapshot_frames() {
    insta::assert_snapshot!(shapes_of("frames.sir"), @r#"
    %customers = read : frame<250x4>
    %orders = read : frame<12000x6>
    %regions = arg : frame<?x3>
    %amounts = arg : column<?x1>
    %ids = arg : column<?x1>
    %ledger = create_frame : frame<?x2>
    %cc = extract_col : frame<?x3>
    %pairs = cartesian : frame<?x5>
    %by_region = group : frame<?x2>
    %named = set_col_labels : frame<?x2>
    %sorted = order : frame<250x4>
    %perm = order : matrix<12000x1>
    %head = slice_col : frame<?x2>
    %ji = group_join : frame<?x2>
    %jk = group_join : frame<?x1>
    "#);
}

#[test]
fn snapshot_convnet() {
    insta::assert_snapshot!(shapes_of("convnet.sir"), @r"
    %images = arg : matrix<64x784>
    %filters = arg : matrix<16x9>
    %bias = arg : matrix<16x1>
    %conv = conv2d : matrix<64x12544>
    %act = ew_max : matrix<64x12544>
    %pool = max_pool2d : matrix<64x3136>
    %avg = avg_pool2d : matrix<64x?>
    %flat = reshape : matrix<64x3136>
    ");
}

#[test]
fn snapshot_misc() {
    insta::assert_snapshot!(shapes_of("misc.sir"), @r"
    %s = seq : matrix<4x1>
    %fs = seq : matrix<5x1>
    %L = matrix_constant : matrix<2x3>
    %Z = matrix_constant : matrix<4x4>
    %F = fill : matrix<4x3>
    %R = rand_matrix : matrix<4x3>
    %stack = rbind : matrix<10x3>
    %wide = cbind : matrix<4x7>
    %mid = slice_row : matrix<4x3>
    %firsttwo = slice_col : matrix<10x2>
    %pick = cond : matrix<4x3>
    %mask = ew_gt : matrix<4x3>
    %masked = cond : matrix<4x3>
    %v = arg : matrix<3x1>
    %mv = gemv : matrix<3x1>
    %sel = arg : matrix<2x1>
    %picked = extract_row : matrix<2x3>
    %ct = ctable : matrix<4x3>
    %draw = sample : matrix<20x1>
    %as_f = cast : matrix<20x1>
    %r = call : matrix<?x?>
    ");
}

#[test]
fn snapshot_mismatch_diagnostic() {
    let path = demos_dir().join("mismatch.sir");
    let source = std::fs::read_to_string(&path).unwrap();
    let state = infer_source(&source, &PipelineOptions::default(), |_, _| {}).unwrap();
    assert!(state.has_error);
    let rendered: Vec<String> = state
        .diagnostics
        .iter()
        .map(|d| d.render("mismatch.sir", &source))
        .collect();
    insta::assert_snapshot!(rendered.join("\n"), @r"
    mismatch.sir:3:1: error[E0300]: cbind: operands must agree on the number of rows, but one has 5 and one has 7
      hint: insert an explicit reshape or slice so the operands agree
    ");
}
