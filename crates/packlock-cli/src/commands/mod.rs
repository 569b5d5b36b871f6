pub mod lock;
pub mod scan;
pub mod verify;

use crate::SourceArgs;
use packlock_core::{
    parse_override, runtime_override_from_env, DiscoveryInput, LockRequest, PolicyConfig,
};
use packlock_schema::read_record_list_file;
use serde_json::Value;
use std::path::Path;
use tracing::debug;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_MANIFEST_ERROR: u8 = 2;
pub const EXIT_RESOLVE_ERROR: u8 = 3;
pub const EXIT_POLICY_VIOLATION: u8 = 4;

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

/// Map an error message to the process exit code by its prefix.
pub fn exit_code_for(msg: &str) -> u8 {
    if msg.starts_with("discovery error:")
        || msg.starts_with("manifest error:")
        || msg.starts_with("record error:")
        || msg.starts_with("configuration error:")
        || msg.starts_with("resolution error: manifest error:")
        || msg.starts_with("resolution error: manifest registered as")
    {
        EXIT_MANIFEST_ERROR
    } else if msg.starts_with("activation error:") || msg.starts_with("resolution error:") {
        EXIT_RESOLVE_ERROR
    } else {
        EXIT_FAILURE
    }
}

/// Load candidate lists and trust inputs from the files named on the command
/// line, falling back to the default policy locations under the working
/// directory and `$HOME`.
pub fn load_request(
    sources: &SourceArgs,
    selected: &[String],
    engine_version: &str,
) -> Result<LockRequest, String> {
    let candidates = DiscoveryInput {
        workspace: load_candidates(sources.workspace.as_deref())?,
        installer: load_candidates(sources.installer.as_deref())?,
        user: load_candidates(sources.user.as_deref())?,
    };

    let cwd = std::env::current_dir()
        .map_err(|e| format!("cannot determine working directory: {e}"))?;
    let discovered = PolicyConfig::discover(&cwd);
    let config = PolicyConfig {
        repo_policy: sources.repo_policy.clone().or(discovered.repo_policy),
        global_policy: sources.global_policy.clone().or(discovered.global_policy),
    };
    debug!(
        "policy files: repo {:?}, global {:?}",
        config.repo_policy, config.global_policy
    );
    let (repo_policy, global_policy) = config
        .load()
        .map_err(|e| format!("configuration error: {e}"))?;

    let runtime_override = match sources.workspace_overrides.as_deref() {
        Some(raw) => Some(parse_override(raw).ok_or_else(|| {
            format!("invalid --workspace-overrides value '{raw}': expected true or false")
        })?),
        None => runtime_override_from_env(),
    };

    Ok(LockRequest {
        candidates,
        repo_policy,
        global_policy,
        runtime_override,
        selected: selected.to_vec(),
        engine_version: engine_version.to_owned(),
    })
}

pub fn has_candidates(sources: &SourceArgs) -> bool {
    sources.workspace.is_some() || sources.installer.is_some() || sources.user.is_some()
}

fn load_candidates(path: Option<&Path>) -> Result<Vec<Value>, String> {
    match path {
        Some(p) => {
            let records =
                read_record_list_file(p).map_err(|e| format!("record error: {e}"))?;
            debug!("loaded {} candidate(s) from {}", records.len(), p.display());
            Ok(records)
        }
        None => Ok(Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_pretty_serializes_object() {
        let val = serde_json::json!({"key": "value"});
        let result = json_pretty(&val).unwrap();
        assert!(result.contains("\"key\""));
        assert!(result.contains("\"value\""));
    }

    #[test]
    fn exit_codes_are_distinct() {
        let codes = [
            EXIT_SUCCESS,
            EXIT_FAILURE,
            EXIT_MANIFEST_ERROR,
            EXIT_RESOLVE_ERROR,
            EXIT_POLICY_VIOLATION,
        ];
        for (i, a) in codes.iter().enumerate() {
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn manifest_problems_map_to_manifest_exit() {
        for msg in [
            "discovery error: user candidate #0 has no pack id",
            "record error: failed to read 'x': not found",
            "resolution error: manifest error: pack 'a': missing field 'version'",
        ] {
            assert_eq!(exit_code_for(msg), EXIT_MANIFEST_ERROR, "{msg}");
        }
    }

    #[test]
    fn resolution_problems_map_to_resolve_exit() {
        for msg in [
            "activation error: pack 'x' has no candidate from a trusted source",
            "resolution error: pack conflict detected: 'a' conflicts with 'b'",
            "resolution error: dependency cycle detected among required packs: a, b",
        ] {
            assert_eq!(exit_code_for(msg), EXIT_RESOLVE_ERROR, "{msg}");
        }
    }

    #[test]
    fn unknown_messages_are_plain_failures() {
        assert_eq!(exit_code_for("something else"), EXIT_FAILURE);
    }
}
