//! Dependency closure, compatibility and conflict checks, and deterministic
//! installation order for an activated pack set.
//!
//! Checks run in a fixed order and the first violation wins:
//!
//! 1. every manifest normalizes
//! 2. selection is non-empty and every selected pack exists
//! 3. requirement closure (missing dependencies fail here; cycles do not)
//! 4. engine compatibility
//! 5. declared conflicts
//! 6. unique surface ownership
//! 7. touched surfaces require their owner
//! 8. topological order (cycles fail here)
//!
//! Changing that order changes which error a broken pack set reports.

use packlock_schema::{
    LockError, LockPayload, ManifestError, PackId, PackManifest, Record, SurfaceTag, Version,
    VersionError,
};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),
    #[error("manifest registered as '{key}' declares id '{id}'")]
    IdMismatch { key: PackId, id: PackId },
    #[error("invalid engine version: {0}")]
    InvalidEngineVersion(VersionError),
    #[error("no packs selected")]
    EmptySelection,
    #[error("selected pack '{pack_id}' has no activated manifest")]
    UnknownSelection { pack_id: PackId },
    #[error("missing required dependency '{dependency}' for pack '{pack_id}'")]
    MissingDependency { pack_id: PackId, dependency: PackId },
    #[error(
        "engine version {engine_version} incompatible with pack '{pack_id}' (supports {engine_min} through {engine_max})"
    )]
    IncompatibleEngine {
        pack_id: PackId,
        engine_version: Version,
        engine_min: Version,
        engine_max: Version,
    },
    #[error("pack conflict detected: '{pack_id}' conflicts with '{conflicts_with}'")]
    Conflict {
        pack_id: PackId,
        conflicts_with: PackId,
    },
    #[error("surface conflict detected: '{first}' and '{second}' both own '{surface}'")]
    SurfaceConflict {
        surface: SurfaceTag,
        first: PackId,
        second: PackId,
    },
    #[error("pack '{pack_id}' touches surface '{surface}' but does not require owner '{owner}'")]
    UnrequiredSurfaceOwner {
        pack_id: PackId,
        surface: SurfaceTag,
        owner: PackId,
    },
    #[error("dependency cycle detected among required packs: {}", join_ids(.packs))]
    Cycle { packs: Vec<PackId> },
    #[error("lock error: {0}")]
    Lock(#[from] LockError),
}

fn join_ids(ids: &[PackId]) -> String {
    ids.iter()
        .map(PackId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Resolve `selected` against the activated `manifests` for `engine_version`
/// and assemble the lock.
///
/// Pure: the same inputs always produce the same lock, and nothing is written.
pub fn resolve_lock<S: AsRef<str>>(
    manifests: &BTreeMap<PackId, Record>,
    selected: &[S],
    engine_version: &str,
) -> Result<LockPayload, ResolveError> {
    let normalized = normalize_all(manifests)?;

    let selection: Vec<PackId> = selected
        .iter()
        .map(|s| s.as_ref().trim())
        .filter(|s| !s.is_empty())
        .map(PackId::from)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    if selection.is_empty() {
        return Err(ResolveError::EmptySelection);
    }
    if let Some(unknown) = selection.iter().find(|id| !normalized.contains_key(*id)) {
        return Err(ResolveError::UnknownSelection {
            pack_id: unknown.clone(),
        });
    }
    let engine = Version::parse(engine_version).map_err(ResolveError::InvalidEngineVersion)?;

    let closure = requirement_closure(&normalized, &selection)?;
    debug!(
        "closure of {} selected pack(s) has {} pack(s)",
        selection.len(),
        closure.len()
    );

    check_engine_compat(&normalized, &closure, &engine)?;
    check_conflicts(&normalized, &closure)?;
    check_surfaces(&normalized, &closure)?;

    let order = topological_order(&normalized, &closure)?;
    debug!("resolved order: {}", join_ids(&order));

    let ordered: Vec<&PackManifest> = order.iter().map(|id| &normalized[id]).collect();
    Ok(LockPayload::assemble(engine, &selection, &ordered)?)
}

fn normalize_all(
    manifests: &BTreeMap<PackId, Record>,
) -> Result<BTreeMap<PackId, PackManifest>, ResolveError> {
    let mut out = BTreeMap::new();
    for (key, record) in manifests {
        let manifest = PackManifest::from_record(record)?;
        if manifest.id() != key {
            return Err(ResolveError::IdMismatch {
                key: key.clone(),
                id: manifest.id().clone(),
            });
        }
        out.insert(key.clone(), manifest);
    }
    Ok(out)
}

/// Transitive `requires` closure, breadth-first from the selection.
///
/// The visited set makes this terminate on cyclic input; cycles are reported
/// by [`topological_order`].
pub fn requirement_closure(
    manifests: &BTreeMap<PackId, PackManifest>,
    selection: &[PackId],
) -> Result<BTreeSet<PackId>, ResolveError> {
    let mut visited: BTreeSet<PackId> = selection.iter().cloned().collect();
    let mut queue: VecDeque<PackId> = selection.iter().cloned().collect();

    while let Some(pack_id) = queue.pop_front() {
        let Some(manifest) = manifests.get(&pack_id) else {
            return Err(ResolveError::UnknownSelection { pack_id });
        };
        for dependency in manifest.requires() {
            if !manifests.contains_key(dependency) {
                return Err(ResolveError::MissingDependency {
                    pack_id,
                    dependency: dependency.clone(),
                });
            }
            if visited.insert(dependency.clone()) {
                queue.push_back(dependency.clone());
            }
        }
    }

    Ok(visited)
}

fn check_engine_compat(
    manifests: &BTreeMap<PackId, PackManifest>,
    closure: &BTreeSet<PackId>,
    engine: &Version,
) -> Result<(), ResolveError> {
    for pack_id in closure {
        let compat = manifests[pack_id].compat();
        if !compat.contains(engine) {
            return Err(ResolveError::IncompatibleEngine {
                pack_id: pack_id.clone(),
                engine_version: *engine,
                engine_min: compat.engine_min,
                engine_max: compat.engine_max,
            });
        }
    }
    Ok(())
}

fn check_conflicts(
    manifests: &BTreeMap<PackId, PackManifest>,
    closure: &BTreeSet<PackId>,
) -> Result<(), ResolveError> {
    for pack_id in closure {
        if let Some(other) = manifests[pack_id]
            .conflicts_with()
            .iter()
            .find(|other| closure.contains(*other))
        {
            return Err(ResolveError::Conflict {
                pack_id: pack_id.clone(),
                conflicts_with: other.clone(),
            });
        }
    }
    Ok(())
}

fn check_surfaces(
    manifests: &BTreeMap<PackId, PackManifest>,
    closure: &BTreeSet<PackId>,
) -> Result<(), ResolveError> {
    let mut owners: BTreeMap<&SurfaceTag, &PackId> = BTreeMap::new();
    for pack_id in closure {
        for surface in manifests[pack_id].owns_surfaces() {
            if let Some(first) = owners.insert(surface, pack_id) {
                return Err(ResolveError::SurfaceConflict {
                    surface: surface.clone(),
                    first: first.clone(),
                    second: pack_id.clone(),
                });
            }
        }
    }

    for pack_id in closure {
        let manifest = &manifests[pack_id];
        for surface in manifest.touches_surfaces() {
            let Some(owner) = owners.get(surface) else {
                continue;
            };
            if *owner != pack_id && !manifest.requires().contains(*owner) {
                return Err(ResolveError::UnrequiredSurfaceOwner {
                    pack_id: pack_id.clone(),
                    surface: surface.clone(),
                    owner: (*owner).clone(),
                });
            }
        }
    }
    Ok(())
}

/// Kahn's algorithm over `dependency → dependent` edges inside the closure.
///
/// The ready frontier is kept sorted and the smallest id is always taken
/// next, so the order depends only on the graph, never on input order.
pub fn topological_order(
    manifests: &BTreeMap<PackId, PackManifest>,
    closure: &BTreeSet<PackId>,
) -> Result<Vec<PackId>, ResolveError> {
    let mut indegree: BTreeMap<&PackId, usize> = closure.iter().map(|id| (id, 0)).collect();
    let mut dependents: BTreeMap<&PackId, Vec<&PackId>> = BTreeMap::new();

    for pack_id in closure {
        let Some(manifest) = manifests.get(pack_id) else {
            return Err(ResolveError::UnknownSelection {
                pack_id: pack_id.clone(),
            });
        };
        for dependency in manifest.requires() {
            let Some(dependency) = closure.get(dependency) else {
                continue;
            };
            if let Some(count) = indegree.get_mut(pack_id) {
                *count += 1;
            }
            dependents.entry(dependency).or_default().push(pack_id);
        }
    }

    let mut ready: BTreeSet<&PackId> = indegree
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(id, _)| *id)
        .collect();
    let mut order = Vec::with_capacity(closure.len());

    while let Some(pack_id) = ready.pop_first() {
        order.push(pack_id.clone());
        for dependent in dependents.get(pack_id).into_iter().flatten() {
            if let Some(count) = indegree.get_mut(*dependent) {
                *count -= 1;
                if *count == 0 {
                    ready.insert(*dependent);
                }
            }
        }
    }

    if order.len() < closure.len() {
        let packs = indegree
            .into_iter()
            .filter(|(_, count)| *count > 0)
            .map(|(id, _)| id.clone())
            .collect();
        return Err(ResolveError::Cycle { packs });
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn pack(id: &str, extra: Value) -> (PackId, Record) {
        let mut record = json!({
            "id": id,
            "version": "1.0.0",
            "compat": {"engine_min": "1.0.0", "engine_max": "9.9.9"},
        });
        if let (Value::Object(base), Value::Object(more)) = (&mut record, extra) {
            base.extend(more);
        }
        let Value::Object(map) = record else {
            unreachable!()
        };
        (PackId::from(id), map)
    }

    fn catalog(packs: Vec<(PackId, Record)>) -> BTreeMap<PackId, Record> {
        packs.into_iter().collect()
    }

    #[test]
    fn resolves_shared_dependency_once() {
        let m = catalog(vec![
            pack("core", json!({})),
            pack("addon-a", json!({"requires": ["core"]})),
            pack("addon-b", json!({"requires": ["core"]})),
        ]);
        let lock = resolve_lock(&m, &["addon-b", "addon-a"], "2.0.0").unwrap();
        assert_eq!(lock.selected, vec!["addon-a", "addon-b"]);
        assert_eq!(lock.resolved_order, vec!["core", "addon-a", "addon-b"]);
    }

    #[test]
    fn unselected_manifests_must_still_normalize() {
        let mut m = catalog(vec![pack("core", json!({}))]);
        let (id, mut broken) = pack("broken", json!({}));
        broken.insert("version".to_owned(), json!("1.0"));
        m.insert(id, broken);
        assert!(matches!(
            resolve_lock(&m, &["core"], "2.0.0"),
            Err(ResolveError::Manifest(_))
        ));
    }

    #[test]
    fn key_must_match_manifest_id() {
        let (_, record) = pack("core", json!({}));
        let mut m = BTreeMap::new();
        m.insert(PackId::from("kernel"), record);
        assert!(matches!(
            resolve_lock(&m, &["kernel"], "2.0.0"),
            Err(ResolveError::IdMismatch { .. })
        ));
    }

    #[test]
    fn empty_or_blank_selection_fails() {
        let m = catalog(vec![pack("core", json!({}))]);
        let none: [&str; 0] = [];
        assert!(matches!(
            resolve_lock(&m, &none, "2.0.0"),
            Err(ResolveError::EmptySelection)
        ));
        assert!(matches!(
            resolve_lock(&m, &["  ", ""], "2.0.0"),
            Err(ResolveError::EmptySelection)
        ));
    }

    #[test]
    fn unknown_selection_fails() {
        let m = catalog(vec![pack("core", json!({}))]);
        let err = resolve_lock(&m, &["nope"], "2.0.0").unwrap_err();
        assert!(err.to_string().contains("'nope'"));
    }

    #[test]
    fn invalid_engine_version_fails() {
        let m = catalog(vec![pack("core", json!({}))]);
        assert!(matches!(
            resolve_lock(&m, &["core"], "2.0"),
            Err(ResolveError::InvalidEngineVersion(_))
        ));
    }

    #[test]
    fn transitive_dependencies_are_pulled_in() {
        let m = catalog(vec![
            pack("base", json!({})),
            pack("core", json!({"requires": ["base"]})),
            pack("addon", json!({"requires": ["core"]})),
            pack("unrelated", json!({})),
        ]);
        let lock = resolve_lock(&m, &["addon"], "2.0.0").unwrap();
        assert_eq!(lock.resolved_order, vec!["base", "core", "addon"]);
    }

    #[test]
    fn compat_bounds_are_inclusive_and_numeric() {
        let m = catalog(vec![pack(
            "core",
            json!({"compat": {"engine_min": "1.9.0", "engine_max": "1.10.0"}}),
        )]);
        assert!(resolve_lock(&m, &["core"], "1.10.0").is_ok());
        assert!(resolve_lock(&m, &["core"], "1.9.0").is_ok());
        assert!(matches!(
            resolve_lock(&m, &["core"], "1.10.1"),
            Err(ResolveError::IncompatibleEngine { .. })
        ));
    }

    #[test]
    fn incompatible_dependency_fails_even_if_selected_pack_is_fine() {
        let m = catalog(vec![
            pack(
                "core",
                json!({"compat": {"engine_min": "3.0.0", "engine_max": "4.0.0"}}),
            ),
            pack("addon", json!({"requires": ["core"]})),
        ]);
        let err = resolve_lock(&m, &["addon"], "2.0.0").unwrap_err();
        assert!(err.to_string().contains("incompatible with pack 'core'"));
    }

    #[test]
    fn conflict_declared_outside_closure_is_ignored() {
        let m = catalog(vec![
            pack("a", json!({"conflicts_with": ["b"]})),
            pack("b", json!({})),
        ]);
        assert!(resolve_lock(&m, &["a"], "2.0.0").is_ok());
    }

    #[test]
    fn conflict_reached_transitively_fails() {
        let m = catalog(vec![
            pack("a", json!({"conflicts_with": ["legacy"]})),
            pack("legacy", json!({})),
            pack("b", json!({"requires": ["legacy"]})),
        ]);
        assert!(matches!(
            resolve_lock(&m, &["a", "b"], "2.0.0"),
            Err(ResolveError::Conflict { .. })
        ));
    }

    #[test]
    fn duplicate_surface_owner_fails() {
        let m = catalog(vec![
            pack("fmt-a", json!({"owns_surfaces": ["format"]})),
            pack("fmt-b", json!({"owns_surfaces": ["format"]})),
        ]);
        let err = resolve_lock(&m, &["fmt-a", "fmt-b"], "2.0.0").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("surface conflict detected"), "{msg}");
        assert!(msg.contains("both own 'format'"), "{msg}");
    }

    #[test]
    fn touching_surface_requires_owner() {
        let m = catalog(vec![
            pack("core", json!({"owns_surfaces": ["format"]})),
            pack("helper", json!({"requires": ["core"]})),
            pack(
                "addon",
                json!({"requires": ["helper"], "touches_surfaces": ["format"]}),
            ),
        ]);
        let err = resolve_lock(&m, &["addon"], "2.0.0").unwrap_err();
        assert!(err
            .to_string()
            .contains("touches surface 'format' but does not require owner 'core'"));

        let m = catalog(vec![
            pack("core", json!({"owns_surfaces": ["format"]})),
            pack(
                "addon",
                json!({"requires": ["core"], "touches_surfaces": ["format"]}),
            ),
        ]);
        assert!(resolve_lock(&m, &["addon"], "2.0.0").is_ok());
    }

    #[test]
    fn touching_own_or_unowned_surface_is_fine() {
        let m = catalog(vec![pack(
            "core",
            json!({"owns_surfaces": ["format"], "touches_surfaces": ["format", "telemetry"]}),
        )]);
        assert!(resolve_lock(&m, &["core"], "2.0.0").is_ok());
    }

    #[test]
    fn cycle_is_reported_by_topological_sort() {
        let m = catalog(vec![
            pack("a", json!({"requires": ["b"]})),
            pack("b", json!({"requires": ["a"]})),
            pack("leaf", json!({})),
        ]);
        let err = resolve_lock(&m, &["a", "leaf"], "2.0.0").unwrap_err();
        match err {
            ResolveError::Cycle { packs } => assert_eq!(packs, vec!["a", "b"]),
            other => panic!("expected cycle, got {other}"),
        }
    }

    #[test]
    fn closure_tolerates_cycles() {
        let m = catalog(vec![
            pack("a", json!({"requires": ["b"]})),
            pack("b", json!({"requires": ["a"]})),
        ]);
        let normalized = normalize_all(&m).unwrap();
        let closure = requirement_closure(&normalized, &[PackId::from("a")]).unwrap();
        assert_eq!(closure.len(), 2);
    }

    #[test]
    fn single_requirement_orders_dependency_first() {
        let m = catalog(vec![
            pack("core", json!({})),
            pack("addon-a", json!({"requires": ["core"]})),
        ]);
        let lock = resolve_lock(&m, &["addon-a"], "2.0.0").unwrap();
        assert_eq!(lock.resolved_order, vec!["core", "addon-a"]);
    }

    #[test]
    fn diamond_places_shared_base_once_before_both_branches() {
        let m = catalog(vec![
            pack("base", json!({})),
            pack("left", json!({"requires": ["base"]})),
            pack("right", json!({"requires": ["base"]})),
            pack("top", json!({"requires": ["left", "right"]})),
        ]);
        let normalized = normalize_all(&m).unwrap();
        let closure = requirement_closure(&normalized, &[PackId::from("top")]).unwrap();
        let order = topological_order(&normalized, &closure).unwrap();
        assert_eq!(order, vec!["base", "left", "right", "top"]);
    }

    #[test]
    fn closure_rejects_queued_id_without_manifest() {
        let normalized = normalize_all(&catalog(vec![pack("core", json!({}))])).unwrap();
        let err = requirement_closure(&normalized, &[PackId::from("ghost")]).unwrap_err();
        assert!(matches!(err, ResolveError::UnknownSelection { pack_id } if pack_id == "ghost"));
    }

    #[test]
    fn cyclic_and_conflicting_set_reports_conflict_first() {
        let m = catalog(vec![
            pack("a", json!({"requires": ["b"], "conflicts_with": ["c"]})),
            pack("b", json!({"requires": ["a"]})),
            pack("c", json!({})),
        ]);
        assert!(matches!(
            resolve_lock(&m, &["a", "c"], "2.0.0"),
            Err(ResolveError::Conflict { .. })
        ));
    }

    #[test]
    fn frontier_is_lexicographic() {
        let m = catalog(vec![
            pack("zz", json!({})),
            pack("mm", json!({})),
            pack("aa", json!({"requires": ["zz"]})),
        ]);
        let lock = resolve_lock(&m, &["aa", "mm"], "2.0.0").unwrap();
        assert_eq!(lock.resolved_order, vec!["mm", "zz", "aa"]);
    }
}
