// Property-based tests for shape inference invariants.
//
// Four categories:
// 1. Argument agreement and sums: generated bind programs over known and
//    unknown extents
// 2. Constant arithmetic: sequence lengths, slice bounds, window extents
// 3. Algebraic identities: transpose involution, aggregation shapes
// 4. Determinism: re-running a walk reproduces the table and fingerprint
//
// Uses proptest with explicit configuration to prevent CI flakiness.

use proptest::prelude::*;
use tabshape::catalog::MemoryCatalog;
use tabshape::error::ShapeError;
use tabshape::infer::ShapeTable;
use tabshape::shape::{Dim, ShapePair};

// ── Test helpers ────────────────────────────────────────────────────────────

fn infer(source: &str) -> Result<ShapeTable, ShapeError> {
    let parsed = tabshape::parser::parse(source);
    assert!(
        parsed.errors.is_empty(),
        "parse errors in generated program:\n{source}\n{:?}",
        parsed.errors
    );
    let mut resolved = tabshape::resolve::resolve(&parsed.module.expect("module"));
    assert!(
        resolved.diagnostics.is_empty(),
        "resolve diagnostics in generated program:\n{source}\n{:#?}",
        resolved.diagnostics
    );
    tabshape::infer::infer_graph(&mut resolved.graph, &MemoryCatalog::new())
}

fn extent(d: Option<u64>) -> String {
    d.map_or_else(|| "?".to_string(), |n| n.to_string())
}

fn shape_of(table: &ShapeTable, value: &str) -> ShapePair {
    table.get(value).expect("value in table").shape
}

// ── Generators ──────────────────────────────────────────────────────────────

/// An extent that is known about three times in four.
fn arb_extent() -> impl Strategy<Value = Option<u64>> {
    prop_oneof![3 => (0u64..50).prop_map(Some), 1 => Just(None)]
}

/// A `cbind` over 1..6 matrices sharing `rows`, each with its own width.
fn arb_cbind(rows: Option<u64>) -> impl Strategy<Value = (String, Vec<Option<u64>>)> {
    prop::collection::vec(arb_extent(), 1..6).prop_map(move |widths| {
        let mut src = String::new();
        let mut names = Vec::new();
        for (i, w) in widths.iter().enumerate() {
            src.push_str(&format!("%m{i} = arg : matrix<{}x{}>\n", extent(rows), extent(*w)));
            names.push(format!("%m{i}"));
        }
        src.push_str(&format!("%out = cbind({}) : matrix\n", names.join(", ")));
        (src, widths)
    })
}

// ── Properties ──────────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 100,
        max_shrink_iters: 200,
        .. ProptestConfig::default()
    })]

    /// Column binding keeps the shared row count and sums widths; a single
    /// unknown width makes the sum unknown.
    #[test]
    fn cbind_sums_known_widths(
        (src, widths) in arb_extent().prop_flat_map(arb_cbind)
    ) {
        let table = infer(&src).unwrap();
        let out = shape_of(&table, "out");
        let first = shape_of(&table, "m0");
        prop_assert_eq!(out.rows, first.rows);
        let expected_cols = widths
            .iter()
            .try_fold(0u64, |acc, w| w.map(|w| acc + w));
        prop_assert_eq!(out.cols, Dim::from(expected_cols));
    }

    /// Two different known row counts never bind.
    #[test]
    fn cbind_rejects_disagreeing_rows(a in 0u64..100, b in 0u64..100) {
        prop_assume!(a != b);
        let src = format!(
            "%x = arg : matrix<{a}x1>\n%y = arg : matrix<{b}x1>\n%z = cbind(%x, %y) : matrix\n"
        );
        match infer(&src) {
            Err(ShapeError::ShapeMismatch { first, second, .. }) => {
                prop_assert_eq!((first, second), (a, b));
            }
            other => prop_assert!(false, "expected a mismatch, got {:?}", other),
        }
    }

    /// The integer sequence length equals the number of steps a loop takes.
    #[test]
    fn integer_seq_matches_iteration(
        from in -40i64..40,
        to in -40i64..40,
        step in 1i64..7,
    ) {
        let inc = if to >= from { step } else { -step };
        let src = format!(
            "%f = const {from} : si64\n%t = const {to} : si64\n%i = const {inc} : si64\n\
             %s = seq(%f, %t, %i) : matrix<si64>\n"
        );
        let table = infer(&src).unwrap();
        let mut count = 0u64;
        let mut x = from;
        while (inc > 0 && x <= to) || (inc < 0 && x >= to) {
            count += 1;
            x += inc;
        }
        prop_assert_eq!(shape_of(&table, "s"), ShapePair::known(count, 1));
    }

    /// Slices succeed exactly when `0 <= lower <= upper <= count`.
    #[test]
    fn slice_bounds_are_validated(
        count in 0u64..20,
        lower in -3i64..25,
        upper in -3i64..25,
        cols in arb_extent(),
    ) {
        let src = format!(
            "%a = arg : matrix<{count}x{}>\n%l = const {lower} : si64\n%u = const {upper} : si64\n\
             %s = slice_row(%a, %l, %u) : matrix\n",
            extent(cols)
        );
        let valid = 0 <= lower && lower <= upper && upper as u64 <= count;
        match infer(&src) {
            Ok(table) => {
                prop_assert!(valid);
                let s = shape_of(&table, "s");
                prop_assert_eq!(s.rows, Dim::Known((upper - lower) as u64));
                prop_assert_eq!(s.cols, Dim::from(cols));
            }
            Err(ShapeError::InvalidSliceBounds { .. }) => prop_assert!(!valid),
            Err(other) => prop_assert!(false, "unexpected error {:?}", other),
        }
    }

    /// Pooling planes follow `floor((in + 2*pad - window) / stride) + 1`.
    #[test]
    fn pooling_extent_formula(
        input in 1u64..64,
        window in 1u64..8,
        pad in 0u64..3,
        stride in 1u64..4,
        channels in 1u64..5,
    ) {
        let src = format!(
            "%x = arg : matrix<2x?>\n%n = const 2 : ui64\n%c = const {channels} : ui64\n\
             %in = const {input} : ui64\n%w = const {window} : ui64\n\
             %s = const {stride} : ui64\n%p = const {pad} : ui64\n\
             %o, %oh, %ow = max_pool2d(%x, %n, %c, %in, %in, %w, %w, %s, %s, %p, %p) : matrix, ui64, ui64\n"
        );
        let table = infer(&src).unwrap();
        let padded = input + 2 * pad;
        let expected = if padded >= window {
            let side = (padded - window) / stride + 1;
            Dim::Known(channels * side * side)
        } else {
            Dim::Unknown
        };
        prop_assert_eq!(shape_of(&table, "o"), ShapePair::new(Dim::Known(2), expected));
    }

    /// Transposing twice restores the original shape.
    #[test]
    fn transpose_is_an_involution(rows in arb_extent(), cols in arb_extent()) {
        let src = format!(
            "%a = arg : matrix<{}x{}>\n%t = transpose(%a) : matrix\n%b = transpose(%t) : matrix\n",
            extent(rows),
            extent(cols)
        );
        let table = infer(&src).unwrap();
        prop_assert_eq!(shape_of(&table, "b"), shape_of(&table, "a"));
        prop_assert_eq!(
            shape_of(&table, "t"),
            ShapePair::new(Dim::from(cols), Dim::from(rows))
        );
    }

    /// Aggregations collapse exactly the aggregated axis.
    #[test]
    fn aggregations_collapse_one_axis(rows in arb_extent(), cols in arb_extent()) {
        let src = format!(
            "%a = arg : matrix<{}x{}>\n%r = row_max(%a) : matrix\n%c = col_mean(%a) : matrix\n\
             %g = all_sum(%a) : matrix\n",
            extent(rows),
            extent(cols)
        );
        let table = infer(&src).unwrap();
        prop_assert_eq!(shape_of(&table, "r"), ShapePair::new(Dim::from(rows), Dim::Known(1)));
        prop_assert_eq!(shape_of(&table, "c"), ShapePair::new(Dim::Known(1), Dim::from(cols)));
        prop_assert_eq!(shape_of(&table, "g"), ShapePair::known(1, 1));
    }

    /// The walk is a pure function of the source text.
    #[test]
    fn walk_is_deterministic((src, _) in arb_extent().prop_flat_map(arb_cbind)) {
        let first = infer(&src).unwrap();
        let second = infer(&src).unwrap();
        prop_assert_eq!(first.render(), second.render());
        prop_assert_eq!(first.fingerprint(), second.fingerprint());
    }
}
