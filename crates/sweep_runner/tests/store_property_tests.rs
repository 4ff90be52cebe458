//! Property-based tests for result recording.
//!
//! - Recording the same result twice is the same as recording it once
//! - The order in which distinct cases arrive does not matter
//! - A failed re-run masks everything but the parameters

use std::collections::BTreeMap;

use proptest::prelude::*;
use sweep_core::manifest::StudyManifest;
use sweep_core::parameters::coordinate_of;
use sweep_core::study::Study;
use sweep_core::value::{FieldValue, Scalar};
use sweep_runner::pipeline::{CaseResult, CaseStatus};
use sweep_runner::ResultStore;

// ============================================================================
// Strategies
// ============================================================================

const SHAPE: [usize; 2] = [3, 4];

fn manifest() -> StudyManifest {
    Study::from_yaml_str(
        "parameters:\n  a: [1, 2, 3]\n  b: [w, x, y, z]\nscript:\n  - command: solve\n    capture: 'v=(?P<v>\\S+) w=(?P<w>\\S+)'\ntypes: {v: float, w: integer}\n",
    )
    .expect("study should build")
    .manifest()
}

fn case_result(index: usize, v: Option<f64>, w: Option<i64>) -> CaseResult {
    let mut values = BTreeMap::new();
    if let Some(v) = v {
        values.insert("v".to_string(), FieldValue::Scalar(Scalar::Float(v)));
    }
    if let Some(w) = w {
        values.insert("w".to_string(), FieldValue::Scalar(Scalar::Int(w)));
    }
    CaseResult {
        index,
        coordinate: coordinate_of(index, &SHAPE).expect("index should be inside the grid"),
        log_key: format!("case-{index}"),
        status: CaseStatus::Done,
        error: None,
        values,
        commands: Vec::new(),
        missing: Vec::new(),
    }
}

fn arb_result() -> impl Strategy<Value = CaseResult> {
    (
        0usize..12,
        proptest::option::of(-1.0e6f64..1.0e6),
        proptest::option::of(any::<i64>()),
    )
        .prop_map(|(index, v, w)| case_result(index, v, w))
}

/// One result per case index, in a random arrival order.
fn arb_distinct_results() -> impl Strategy<Value = Vec<CaseResult>> {
    proptest::collection::btree_map(0usize..12, (proptest::option::of(-1.0e6f64..1.0e6), proptest::option::of(any::<i64>())), 0..12)
        .prop_map(|entries| {
            entries
                .into_iter()
                .map(|(index, (v, w))| case_result(index, v, w))
                .collect::<Vec<_>>()
        })
        .prop_shuffle()
}

fn open_store() -> (tempfile::TempDir, ResultStore) {
    let dir = tempfile::tempdir().expect("temp dir");
    let store = ResultStore::open(dir.path(), &manifest()).expect("store should open");
    (dir, store)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: recording is idempotent
    #[test]
    fn prop_recording_twice_equals_once(result in arb_result()) {
        let (_dir, mut once) = open_store();
        once.record(&result).expect("record");

        let (_dir2, mut twice) = open_store();
        twice.record(&result).expect("record");
        twice.record(&result).expect("record again");

        prop_assert_eq!(once.array(), twice.array());
    }

    /// Property: arrival order of distinct cases does not change the array
    #[test]
    fn prop_arrival_order_does_not_matter(results in arb_distinct_results()) {
        let (_dir, mut forward) = open_store();
        for result in &results {
            forward.record(result).expect("record");
        }
        let (_dir2, mut backward) = open_store();
        for result in results.iter().rev() {
            backward.record(result).expect("record");
        }
        prop_assert_eq!(forward.array(), backward.array());
    }

    /// Property: a failed re-run leaves only parameters unmasked
    #[test]
    fn prop_failed_rerun_masks_outputs(result in arb_result()) {
        let (_dir, mut store) = open_store();
        store.record(&result).expect("record");

        let failed = CaseResult {
            status: CaseStatus::Failed,
            values: BTreeMap::new(),
            ..result.clone()
        };
        store.record(&failed).expect("record failure");

        let coordinate = &result.coordinate;
        prop_assert!(store.array().is_masked("v", coordinate));
        prop_assert!(store.array().is_masked("w", coordinate));
        prop_assert!(!store.array().is_masked("a", coordinate));
        prop_assert!(!store.array().is_masked("b", coordinate));
    }
}
