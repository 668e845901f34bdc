//! Property-based tests for the patch codec.

use parley_patch::{
    apply_ops, build_delete_ops, build_set_ops, map_to_json, normalize_property, MetadataMap,
};
use proptest::prelude::*;
use serde_json::json;

/// Strategy for valid metadata values: strings or nested string maps.
fn metadata_value_strategy() -> impl Strategy<Value = serde_json::Value> {
    let leaf = "[a-zA-Z0-9 ]{0,12}".prop_map(serde_json::Value::String);
    leaf.prop_recursive(3, 16, 4, |inner| {
        prop::collection::btree_map("[a-y]{1,8}", inner, 0..4)
            .prop_map(|map| serde_json::Value::Object(map.into_iter().collect()))
    })
}

/// Strategy for a top-level mapping of distinct keys to valid values.
fn metadata_mapping_strategy(
) -> impl Strategy<Value = std::collections::BTreeMap<String, serde_json::Value>> {
    prop::collection::btree_map("[a-y]{1,8}", metadata_value_strategy(), 0..5)
}

/// Strategy for dotted paths without a `metadata.` prefix.
fn bare_path_strategy() -> impl Strategy<Value = String> {
    "[a-y]{1,6}(\\.[a-y]{1,6}){0,3}"
}

proptest! {
    #[test]
    fn build_then_apply_materializes_mapping(mapping in metadata_mapping_strategy()) {
        let ops = build_set_ops(mapping.clone());
        let mut target = MetadataMap::new();
        apply_ops(&mut target, &ops).unwrap();

        let expected = json!({
            "metadata": serde_json::Value::Object(mapping.into_iter().collect())
        });
        // An empty mapping produces no ops and no metadata root
        if ops.is_empty() {
            prop_assert!(target.is_empty());
        } else {
            prop_assert_eq!(map_to_json(&target), expected);
        }
    }

    #[test]
    fn prefixing_is_idempotent(path in bare_path_strategy()) {
        let once = normalize_property(&path);
        prop_assert!(once.starts_with("metadata."));
        prop_assert_eq!(normalize_property(&once), once);
    }

    #[test]
    fn deleting_missing_paths_changes_nothing(mapping in metadata_mapping_strategy()) {
        let mut target = MetadataMap::new();
        apply_ops(&mut target, &build_set_ops(mapping)).unwrap();
        let before = target.clone();

        // Keys are drawn from [a-y], so a "zz" segment never resolves
        apply_ops(&mut target, &build_delete_ops(vec!["zz", "zz.zz"])).unwrap();
        prop_assert_eq!(target, before);
    }

    #[test]
    fn invalid_leaves_leave_target_unchanged(
        mapping in metadata_mapping_strategy(),
        bad in prop_oneof![
            Just(json!(7)),
            Just(json!(true)),
            Just(json!([1, 2, 3])),
            Just(json!(null)),
        ],
    ) {
        let mut target = MetadataMap::new();
        apply_ops(&mut target, &build_set_ops(mapping)).unwrap();
        let before = target.clone();

        let ops = build_set_ops(vec![
            ("zz".to_string(), json!("fine")),
            ("zy".to_string(), bad),
        ]);
        prop_assert!(apply_ops(&mut target, &ops).is_err());
        prop_assert_eq!(target, before);
    }
}
