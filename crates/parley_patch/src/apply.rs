//! Applying patch operations to a metadata tree.

use crate::error::{PatchError, PatchResult};
use crate::op::{PatchOp, PatchOperation};
use crate::value::{MetadataMap, MetadataValue};

/// Validates every `set` value in a batch.
///
/// Runs as a separate pass before application: if any value is a
/// disallowed leaf type, nothing gets applied.
pub fn validate_ops(ops: &[PatchOp]) -> PatchResult<()> {
    for op in ops {
        if op.operation == PatchOperation::Set {
            match op.value.as_ref() {
                Some(value) => {
                    MetadataValue::from_json(value)
                        .map_err(|e| e.at_property(&op.property))?;
                }
                None => {
                    return Err(PatchError::invalid_value(&op.property, "missing value"));
                }
            }
        }
    }
    Ok(())
}

/// Applies a batch of operations to a metadata tree.
///
/// Values are validated up front, so a disallowed leaf leaves the target
/// untouched. A `set` auto-creates intermediate maps; a path that runs
/// through a text leaf fails that one operation. Path failures are
/// best-effort across the batch: the offending operation is skipped, the
/// remaining operations still apply, and the first path error is
/// returned once the batch finishes.
pub fn apply_ops(target: &mut MetadataMap, ops: &[PatchOp]) -> PatchResult<()> {
    validate_ops(ops)?;

    let mut first_error = None;
    for op in ops {
        let outcome = match op.operation {
            PatchOperation::Set => apply_set(target, op),
            PatchOperation::Delete => {
                apply_delete(target, op);
                Ok(())
            }
        };
        if let Err(error) = outcome {
            first_error.get_or_insert(error);
        }
    }

    match first_error {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

fn apply_set(target: &mut MetadataMap, op: &PatchOp) -> PatchResult<()> {
    let value = match op.value.as_ref() {
        Some(json) => MetadataValue::from_json(json).map_err(|e| e.at_property(&op.property))?,
        None => return Err(PatchError::invalid_value(&op.property, "missing value")),
    };

    let segments: Vec<&str> = op.property.split('.').collect();
    let (last, parents) = match segments.split_last() {
        Some(split) => split,
        None => return Ok(()),
    };

    let mut current = target;
    for segment in parents {
        let entry = current
            .entry((*segment).to_string())
            .or_insert_with(|| MetadataValue::Map(MetadataMap::new()));
        match entry {
            MetadataValue::Map(map) => current = map,
            MetadataValue::Text(_) => {
                return Err(PatchError::invalid_path(&op.property, *segment));
            }
        }
    }
    current.insert((*last).to_string(), value);
    Ok(())
}

fn apply_delete(target: &mut MetadataMap, op: &PatchOp) {
    let segments: Vec<&str> = op.property.split('.').collect();
    let (last, parents) = match segments.split_last() {
        Some(split) => split,
        None => return,
    };

    let mut current = target;
    for segment in parents {
        match current.get_mut(*segment) {
            Some(MetadataValue::Map(map)) => current = map,
            // Missing path or leaf in the way: nothing to delete
            _ => return,
        }
    }
    current.remove(*last);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op::{build_delete_ops, build_set_ops};
    use crate::value::map_to_json;
    use serde_json::json;

    #[test]
    fn set_builds_nested_maps() {
        let mut target = MetadataMap::new();
        let ops = build_set_ops(vec![("colors.background", json!("blue"))]);
        apply_ops(&mut target, &ops).unwrap();

        assert_eq!(
            map_to_json(&target),
            json!({ "metadata": { "colors": { "background": "blue" } } })
        );
    }

    #[test]
    fn set_through_leaf_fails_that_op() {
        let mut target = MetadataMap::new();
        apply_ops(&mut target, &build_set_ops(vec![("title", json!("hello"))])).unwrap();

        let err = apply_ops(
            &mut target,
            &build_set_ops(vec![("title.size", json!("big"))]),
        )
        .unwrap_err();
        assert!(matches!(err, PatchError::InvalidPath { .. }));

        // The existing leaf is untouched
        assert_eq!(
            map_to_json(&target),
            json!({ "metadata": { "title": "hello" } })
        );
    }

    #[test]
    fn path_failure_is_best_effort_across_batch() {
        let mut target = MetadataMap::new();
        apply_ops(&mut target, &build_set_ops(vec![("title", json!("hello"))])).unwrap();

        let ops = build_set_ops(vec![
            ("before", json!("1")),
            ("title.size", json!("big")),
            ("after", json!("2")),
        ]);
        let err = apply_ops(&mut target, &ops).unwrap_err();
        assert!(matches!(err, PatchError::InvalidPath { .. }));

        // Both the earlier and the later operations applied
        assert_eq!(
            map_to_json(&target),
            json!({ "metadata": { "before": "1", "title": "hello", "after": "2" } })
        );
    }

    #[test]
    fn delete_of_missing_path_is_noop() {
        let mut target = MetadataMap::new();
        apply_ops(&mut target, &build_set_ops(vec![("a", json!("1"))])).unwrap();
        let before = target.clone();

        apply_ops(&mut target, &build_delete_ops(vec!["does.not.exist"])).unwrap();
        assert_eq!(target, before);
    }

    #[test]
    fn delete_removes_subtree() {
        let mut target = MetadataMap::new();
        apply_ops(
            &mut target,
            &build_set_ops(vec![
                ("colors.background", json!("blue")),
                ("colors.accent", json!("gold")),
                ("title", json!("hello")),
            ]),
        )
        .unwrap();

        apply_ops(&mut target, &build_delete_ops(vec!["colors"])).unwrap();
        assert_eq!(
            map_to_json(&target),
            json!({ "metadata": { "title": "hello" } })
        );
    }

    #[test]
    fn invalid_value_applies_nothing() {
        let mut target = MetadataMap::new();
        let ops = build_set_ops(vec![
            ("good", json!("1")),
            ("bad", json!(42)),
        ]);

        let err = apply_ops(&mut target, &ops).unwrap_err();
        assert!(matches!(err, PatchError::InvalidMetadataValue { .. }));
        assert!(target.is_empty());
    }

    #[test]
    fn set_whole_metadata_map() {
        let mut target = MetadataMap::new();
        let ops = vec![PatchOp::set("metadata", json!({ "a": "1", "b": { "c": "2" } }))];
        apply_ops(&mut target, &ops).unwrap();

        assert_eq!(
            map_to_json(&target),
            json!({ "metadata": { "a": "1", "b": { "c": "2" } } })
        );
    }
}
