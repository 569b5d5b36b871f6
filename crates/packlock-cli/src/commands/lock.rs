use super::{json_pretty, load_request, EXIT_SUCCESS};
use crate::SourceArgs;
use packlock_core::Pipeline;
use std::path::Path;

pub fn run(
    select: &[String],
    engine_version: &str,
    sources: &SourceArgs,
    out: &Path,
    dry_run: bool,
    json: bool,
) -> Result<u8, String> {
    let request = load_request(sources, select, engine_version)?;

    let outcome = if dry_run {
        Pipeline::run(&request)
    } else {
        Pipeline::write(&request, out)
    }
    .map_err(|e| e.to_string())?;
    let lock = &outcome.lock;

    if json {
        let payload = serde_json::json!({
            "lock_path": if dry_run { None } else { Some(out.display().to_string()) },
            "policy": outcome.policy,
            "active": outcome.active_ids(),
            "lock": lock,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!(
            "trust policy: workspace overrides {} ({})",
            if outcome.policy.workspace_overrides_enabled {
                "enabled"
            } else {
                "disabled"
            },
            outcome.policy.policy_source
        );
        println!("resolved {} pack(s):", lock.packs.len());
        for pack in &lock.packs {
            let source = outcome.active[&pack.id]
                .get("source")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("?");
            println!("  {} {} ({source})", pack.id, pack.version);
        }
        println!("lock_hash: {}", lock.lock_hash);
        if dry_run {
            println!("dry run: {} not written", out.display());
        } else {
            println!("wrote {}", out.display());
        }
    }
    Ok(EXIT_SUCCESS)
}
