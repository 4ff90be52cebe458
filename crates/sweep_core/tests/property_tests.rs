//! Property-based tests for the sweep domain model.
//!
//! - Grid enumeration invariants (count, bijection, ordering)
//! - Expression resolution independent of declaration order
//! - Sampler identities
//! - Capture mode consistency

use proptest::prelude::*;
use sweep_core::capture::{CaptureMode, CaptureRule, Captured, NumberKind};
use sweep_core::expressions::{ExpressionDef, ExpressionGraph};
use sweep_core::parameters::{coordinate_of, graded, index_of, uniform, ParameterSpace};
use sweep_core::value::Scalar;

// ============================================================================
// Strategies
// ============================================================================

/// Between one and four dimensions of one to five values each.
fn arb_shape() -> impl Strategy<Value = Vec<usize>> {
    proptest::collection::vec(1usize..=5, 1..=4)
}

fn space_for_shape(shape: &[usize]) -> ParameterSpace {
    let mut builder = ParameterSpace::grid();
    for (axis, &size) in shape.iter().enumerate() {
        let values = (0..size as i64).map(Scalar::Int).collect();
        builder = builder.values(&format!("p{axis}"), values);
    }
    builder.build().expect("generated space should build")
}

/// A chain of expressions `e0 = p0 + 1`, `e{k} = e{k-1} * 2 + p0`, declared
/// in the order given by `permutation`.
fn chain_graph(length: usize, permutation: &[usize]) -> ExpressionGraph {
    let mut graph = ExpressionGraph::new(["p0"]);
    for &position in permutation {
        let formula = if position == 0 {
            "p0 + 1".to_string()
        } else {
            format!("e{} * 2 + p0", position - 1)
        };
        graph
            .register(format!("e{position}"), ExpressionDef::Formula(formula))
            .expect("formula should register");
    }
    assert_eq!(graph.len(), length);
    graph.check().expect("chain should be acyclic");
    graph
}

fn arb_chain() -> impl Strategy<Value = (usize, Vec<usize>)> {
    (1usize..8).prop_flat_map(|length| {
        (
            Just(length),
            Just((0..length).collect::<Vec<_>>()).prop_shuffle(),
        )
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: the number of cases is the product of the cardinalities
    #[test]
    fn prop_case_count_is_product_of_cardinalities(shape in arb_shape()) {
        let space = space_for_shape(&shape);
        let graph = ExpressionGraph::new(space.names());
        let cases = sweep_core::cases::CaseEnumerator::new(&space, &graph);
        prop_assert_eq!(cases.len(), shape.iter().product::<usize>());
        prop_assert_eq!(cases.enumerate().count(), cases.len());
    }

    /// Property: index and coordinate form a bijection
    #[test]
    fn prop_coordinate_bijection(shape in arb_shape()) {
        let total: usize = shape.iter().product();
        let mut previous: Option<Vec<usize>> = None;
        for index in 0..total {
            let coordinate = coordinate_of(index, &shape).expect("index should decode");
            prop_assert_eq!(index_of(&coordinate, &shape), Some(index));
            // Row-major order: coordinates increase lexicographically.
            if let Some(previous) = &previous {
                prop_assert!(previous < &coordinate);
            }
            previous = Some(coordinate);
        }
        prop_assert!(coordinate_of(total, &shape).is_none());
    }

    /// Property: expression values do not depend on declaration order
    #[test]
    fn prop_resolution_independent_of_declaration_order(
        (length, permutation) in arb_chain(),
        p0 in -50i64..50,
    ) {
        let declared = chain_graph(length, &(0..length).collect::<Vec<_>>());
        let shuffled = chain_graph(length, &permutation);
        let assignment = vec![("p0".to_string(), Scalar::Int(p0))];

        let expected = declared.resolve(&assignment).expect("chain should resolve");
        let actual = shuffled.resolve(&assignment).expect("chain should resolve");
        prop_assert_eq!(&expected, &actual);
        prop_assert_eq!(&expected["e0"], &Scalar::Int(p0 + 1));
    }

    /// Property: a grading of one is uniform sampling
    #[test]
    fn prop_unit_grading_is_uniform(
        lo in -100.0f64..100.0,
        width in 0.0f64..100.0,
        num in 1i64..20,
    ) {
        let hi = lo + width;
        prop_assert_eq!(graded(lo, hi, num, 1.0).unwrap(), uniform(lo, hi, num).unwrap());
    }

    /// Property: samplers produce `num` non-decreasing values ending at `hi`
    #[test]
    fn prop_graded_is_monotone_and_closed(
        lo in -100.0f64..100.0,
        width in 0.0f64..100.0,
        num in 2i64..20,
        grading in 0.2f64..5.0,
    ) {
        let hi = lo + width;
        let values = graded(lo, hi, num, grading).unwrap();
        prop_assert_eq!(values.len(), num as usize);
        prop_assert_eq!(values[0], lo);
        prop_assert_eq!(values[values.len() - 1], hi);
        for pair in values.windows(2) {
            prop_assert!(pair[0] <= pair[1] + 1e-9);
        }
    }

    /// Property: first/last are the ends of the `all` list, and no match means absent
    #[test]
    fn prop_capture_modes_agree(values in proptest::collection::vec(-1000i64..1000, 0..10)) {
        let text: String = values
            .iter()
            .map(|value| format!("noise value: {value} more noise\n"))
            .collect();
        let rule = |mode| CaptureRule::number(NumberKind::Integer, "value", "value:", mode)
            .expect("rule should compile");

        let all = rule(CaptureMode::All).apply(&text);
        let first = rule(CaptureMode::First).apply(&text);
        let last = rule(CaptureMode::Last).apply(&text);

        if values.is_empty() {
            prop_assert!(all.is_empty());
            prop_assert!(first.is_empty());
            prop_assert!(last.is_empty());
        } else {
            let expected: Vec<String> = values.iter().map(i64::to_string).collect();
            prop_assert_eq!(&all[0].1, &Captured::Many(expected.clone()));
            prop_assert_eq!(&first[0].1, &Captured::One(expected[0].clone()));
            prop_assert_eq!(&last[0].1, &Captured::One(expected[expected.len() - 1].clone()));
        }
    }
}
