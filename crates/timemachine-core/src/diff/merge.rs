use crate::model::{ChangeKind, DiffReport, FileChange, ObjectChange, PathChange};
use crate::paths;
use crate::tag::VersionTag;
use std::collections::BTreeMap;

/// Merge both change sets into one report.
///
/// Output ordering is lexical by path no matter what order the backends
/// returned; a path touched by both appears once in `paths` carrying both
/// deltas.
pub fn merge(
    from_tag: &VersionTag,
    to_tag: &VersionTag,
    mut text_changes: Vec<FileChange>,
    mut large_object_changes: Vec<ObjectChange>,
    key_prefixes: &[String],
) -> DiffReport {
    text_changes.sort_by(|a, b| a.path.cmp(&b.path));
    large_object_changes.sort_by(|a, b| a.path.cmp(&b.path));

    let mut merged: BTreeMap<String, PathChange> = BTreeMap::new();
    for change in &text_changes {
        merged
            .entry(change.path.clone())
            .or_insert_with(|| PathChange {
                path: change.path.clone(),
                text: None,
                object: None,
            })
            .text = Some(change.clone());
    }
    for change in &large_object_changes {
        merged
            .entry(change.path.clone())
            .or_insert_with(|| PathChange {
                path: change.path.clone(),
                text: None,
                object: None,
            })
            .object = Some(change.clone());
    }

    let key_changes = merged
        .keys()
        .filter(|path| paths::matches_any(key_prefixes, path))
        .cloned()
        .collect();
    let binary_files = text_changes
        .iter()
        .filter(|c| c.binary)
        .map(|c| c.path.clone())
        .collect();

    DiffReport {
        from_tag: from_tag.clone(),
        to_tag: to_tag.clone(),
        text_changes,
        large_object_changes,
        paths: merged.into_values().collect(),
        key_changes,
        binary_files,
    }
}

/// Per-path hash delta between two `path -> hash` manifests, lexical order.
pub fn manifest_delta(
    old: &BTreeMap<String, String>,
    new: &BTreeMap<String, String>,
) -> Vec<ObjectChange> {
    let mut changes = Vec::new();
    for (path, old_hash) in old {
        match new.get(path) {
            None => changes.push(ObjectChange {
                path: path.clone(),
                kind: ChangeKind::Removed,
                old_hash: Some(old_hash.clone()),
                new_hash: None,
            }),
            Some(new_hash) if new_hash != old_hash => changes.push(ObjectChange {
                path: path.clone(),
                kind: ChangeKind::Modified,
                old_hash: Some(old_hash.clone()),
                new_hash: Some(new_hash.clone()),
            }),
            Some(_) => {}
        }
    }
    for (path, new_hash) in new {
        if !old.contains_key(path) {
            changes.push(ObjectChange {
                path: path.clone(),
                kind: ChangeKind::Added,
                old_hash: None,
                new_hash: Some(new_hash.clone()),
            });
        }
    }
    changes.sort_by(|a, b| a.path.cmp(&b.path));
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::parse_tag;

    fn tags() -> (VersionTag, VersionTag) {
        (
            parse_tag("stable/20240301-120000-aaaa").unwrap(),
            parse_tag("stable/20240302-120000-bbbb").unwrap(),
        )
    }

    fn text(path: &str, kind: ChangeKind) -> FileChange {
        FileChange {
            path: path.to_string(),
            kind,
            text_delta: String::new(),
            binary: false,
        }
    }

    fn object(path: &str, kind: ChangeKind) -> ObjectChange {
        ObjectChange {
            path: path.to_string(),
            kind,
            old_hash: Some("00".to_string()),
            new_hash: Some("11".to_string()),
        }
    }

    #[test]
    fn test_shared_path_reported_once() {
        let (a, b) = tags();
        let report = merge(
            &a,
            &b,
            vec![text("models/model.bin.dvc", ChangeKind::Modified)],
            vec![object("models/model.bin.dvc", ChangeKind::Modified)],
            &[],
        );
        assert_eq!(report.paths.len(), 1);
        assert!(report.paths[0].text.is_some());
        assert!(report.paths[0].object.is_some());
    }

    #[test]
    fn test_ordering_independent_of_input_order() {
        let (a, b) = tags();
        let forward = merge(
            &a,
            &b,
            vec![text("b", ChangeKind::Added), text("a", ChangeKind::Added)],
            vec![object("c", ChangeKind::Modified)],
            &[],
        );
        let reverse = merge(
            &a,
            &b,
            vec![text("a", ChangeKind::Added), text("b", ChangeKind::Added)],
            vec![object("c", ChangeKind::Modified)],
            &[],
        );
        assert_eq!(forward, reverse);
        let order: Vec<&str> = forward.paths.iter().map(|p| p.path.as_str()).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_key_changes_and_binaries() {
        let (a, b) = tags();
        let mut logo = text("assets/logo.png", ChangeKind::Modified);
        logo.binary = true;
        let report = merge(
            &a,
            &b,
            vec![text("config/app.yaml", ChangeKind::Modified), logo],
            vec![],
            &["config".to_string(), "scripts".to_string()],
        );
        assert_eq!(report.key_changes, vec!["config/app.yaml".to_string()]);
        assert_eq!(report.binary_files, vec!["assets/logo.png".to_string()]);
    }

    #[test]
    fn test_manifest_delta_kinds() {
        let old: BTreeMap<String, String> = [("a", "1"), ("b", "2")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let new: BTreeMap<String, String> = [("b", "3"), ("c", "4")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let delta = manifest_delta(&old, &new);
        let kinds: Vec<(&str, ChangeKind)> =
            delta.iter().map(|c| (c.path.as_str(), c.kind)).collect();
        assert_eq!(
            kinds,
            vec![
                ("a", ChangeKind::Removed),
                ("b", ChangeKind::Modified),
                ("c", ChangeKind::Added)
            ]
        );
        assert!(manifest_delta(&old, &old).is_empty());
    }
}
