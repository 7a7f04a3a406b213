//! Property-based tests for schemas and tree evaluation.

use parkcast_ml::{FeatureSchema, Node, Objective, Tree, TreeEnsemble};
use proptest::prelude::*;

fn names_strategy() -> impl Strategy<Value = Vec<String>> {
    proptest::collection::btree_set("[a-z][a-z0-9_]{0,12}", 2..10)
        .prop_map(|set| set.into_iter().collect())
}

proptest! {
    #[test]
    fn fingerprint_tracks_order(names in names_strategy(), i in 0usize..10, j in 0usize..10) {
        let i = i % names.len();
        let j = j % names.len();
        prop_assume!(i != j);

        let schema = FeatureSchema::from_names(names.clone()).unwrap();
        let same = FeatureSchema::from_names(names.clone()).unwrap();
        prop_assert_eq!(schema.fingerprint(), same.fingerprint());
        prop_assert!(schema.matches(&same));

        let mut swapped = names.clone();
        swapped.swap(i, j);
        let swapped = FeatureSchema::from_names(swapped).unwrap();
        prop_assert_ne!(schema.fingerprint(), swapped.fingerprint());
        prop_assert!(!schema.matches(&swapped));

        let diff = schema.diff(&swapped);
        prop_assert!(diff.reordered);
        prop_assert!(diff.missing.is_empty() && diff.unexpected.is_empty());
    }

    #[test]
    fn stump_splits_on_strict_less_than(
        x in -1.0e6f64..1.0e6,
        threshold in -1.0e6f64..1.0e6,
    ) {
        let tree = Tree::stump(0, threshold, -1.0, 1.0);
        let expected = if x < threshold { -1.0 } else { 1.0 };
        prop_assert_eq!(tree.evaluate(&[x]), expected);
    }

    #[test]
    fn missing_values_follow_default_branch(threshold in -100.0f64..100.0, default_left: bool) {
        let tree = Tree::new(vec![
            Node::Split { feature: 0, threshold, left: 1, right: 2, default_left },
            Node::Leaf { value: 10.0 },
            Node::Leaf { value: 20.0 },
        ]).unwrap();
        let expected = if default_left { 10.0 } else { 20.0 };
        prop_assert_eq!(tree.evaluate(&[f64::NAN]), expected);
    }

    #[test]
    fn log_link_predictions_are_positive(
        base in 0.1f64..1000.0,
        leaves in proptest::collection::vec(-3.0f64..3.0, 1..20),
        x in -50.0f64..50.0,
    ) {
        let trees = leaves
            .iter()
            .map(|&v| Tree::stump(0, 0.0, v, -v))
            .collect();
        let ensemble = TreeEnsemble::new(1, Objective::Poisson, base, trees).unwrap();
        let prediction = ensemble.predict(&[x]).unwrap();
        prop_assert!(prediction > 0.0);
        prop_assert!(prediction.is_finite());
    }

    #[test]
    fn wrong_width_is_rejected(width in 0usize..10) {
        prop_assume!(width != 3);
        let ensemble = TreeEnsemble::new(3, Objective::SquaredError, 0.5, vec![Tree::leaf(1.0)]).unwrap();
        prop_assert!(ensemble.predict(&vec![0.0; width]).is_err());
    }
}
