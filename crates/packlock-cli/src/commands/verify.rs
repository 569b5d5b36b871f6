use super::{has_candidates, json_pretty, load_request, EXIT_POLICY_VIOLATION, EXIT_SUCCESS};
use crate::SourceArgs;
use packlock_core::Pipeline;
use packlock_schema::{LockPayload, PackId, PackManifest};
use std::collections::BTreeMap;
use std::path::Path;

pub fn run(lock_path: &Path, sources: &SourceArgs, json: bool) -> Result<u8, String> {
    let lock = LockPayload::read_from_file(lock_path)
        .map_err(|e| format!("failed to read lock '{}': {e}", lock_path.display()))?;

    let mut problems = Vec::new();
    if let Err(e) = lock.verify_integrity() {
        problems.push(e.to_string());
    }

    let drift_checked = has_candidates(sources);
    if drift_checked {
        let current = current_manifests(sources)?;
        if let Err(e) = lock.verify_manifests(&current) {
            problems.push(e.to_string());
        }
    }

    if json {
        let payload = serde_json::json!({
            "lock_path": lock_path.display().to_string(),
            "lock_hash": lock.lock_hash,
            "packs": lock.packs.len(),
            "drift_checked": drift_checked,
            "ok": problems.is_empty(),
            "problems": problems,
        });
        println!("{}", json_pretty(&payload)?);
    } else if problems.is_empty() {
        println!(
            "{}: ok ({} pack(s), lock_hash {})",
            lock_path.display(),
            lock.packs.len(),
            lock.lock_hash
        );
        if !drift_checked {
            println!("no candidate lists given; manifest drift not checked");
        }
    } else {
        println!("{}: FAILED", lock_path.display());
        for problem in &problems {
            println!("  {problem}");
        }
    }

    if problems.is_empty() {
        Ok(EXIT_SUCCESS)
    } else {
        Ok(EXIT_POLICY_VIOLATION)
    }
}

/// Manifests that would be activated today under the current trust policy.
fn current_manifests(sources: &SourceArgs) -> Result<BTreeMap<PackId, PackManifest>, String> {
    let request = load_request(sources, &[], "")?;
    let (_, active) = Pipeline::activate(&request).map_err(|e| e.to_string())?;

    active
        .iter()
        .map(|(id, record)| {
            PackManifest::from_record(record)
                .map(|m| (id.clone(), m))
                .map_err(|e| format!("manifest error: {e}"))
        })
        .collect()
}
