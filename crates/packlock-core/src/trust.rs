//! Trust policy: whether workspace-supplied packs may take part in activation.
//!
//! Precedence, highest first: repo policy, global policy, runtime override,
//! default (`false`). A tier that does not carry a boolean
//! `workspace_overrides_enabled` is skipped.

use packlock_schema::{read_record_file, Record, RecordError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

pub const OVERRIDE_FIELD: &str = "workspace_overrides_enabled";
pub const RUNTIME_OVERRIDE_ENV: &str = "PACKLOCK_WORKSPACE_OVERRIDES";

const POLICY_FILE_NAMES: [&str; 2] = ["policy.json", "policy.toml"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("policy file error: {0}")]
    Record(#[from] RecordError),
}

/// Which tier decided the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolicySource {
    RepoPolicy,
    GlobalPolicy,
    RuntimeOverride,
    Default,
}

impl PolicySource {
    pub fn as_str(self) -> &'static str {
        match self {
            PolicySource::RepoPolicy => "repo-policy",
            PolicySource::GlobalPolicy => "global-policy",
            PolicySource::RuntimeOverride => "runtime-override",
            PolicySource::Default => "default",
        }
    }
}

impl fmt::Display for PolicySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustPolicy {
    pub workspace_overrides_enabled: bool,
    pub policy_source: PolicySource,
}

/// Resolve the trust policy. Never fails.
pub fn resolve_trust_policy(
    repo: Option<&Record>,
    global: Option<&Record>,
    runtime_override: Option<bool>,
) -> TrustPolicy {
    let decided = [
        (override_flag(repo), PolicySource::RepoPolicy),
        (override_flag(global), PolicySource::GlobalPolicy),
        (runtime_override, PolicySource::RuntimeOverride),
    ]
    .into_iter()
    .find_map(|(flag, source)| flag.map(|enabled| (enabled, source)));

    let (workspace_overrides_enabled, policy_source) =
        decided.unwrap_or((false, PolicySource::Default));
    debug!("trust policy: workspace overrides {workspace_overrides_enabled} ({policy_source})");

    TrustPolicy {
        workspace_overrides_enabled,
        policy_source,
    }
}

fn override_flag(record: Option<&Record>) -> Option<bool> {
    record?.get(OVERRIDE_FIELD).and_then(Value::as_bool)
}

/// Parse a boolean-ish runtime override value. Unrecognized values are `None`.
pub fn parse_override(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Read the runtime override from `PACKLOCK_WORKSPACE_OVERRIDES`.
pub fn runtime_override_from_env() -> Option<bool> {
    let raw = std::env::var(RUNTIME_OVERRIDE_ENV).ok()?;
    let parsed = parse_override(&raw);
    if parsed.is_none() {
        warn!("ignoring {RUNTIME_OVERRIDE_ENV}={raw:?}: expected a boolean");
    }
    parsed
}

/// Locations of the repo and global policy files.
#[derive(Debug, Clone, Default)]
pub struct PolicyConfig {
    pub repo_policy: Option<PathBuf>,
    pub global_policy: Option<PathBuf>,
}

impl PolicyConfig {
    /// Default locations: `<repo>/.packlock/policy.{json,toml}` and
    /// `~/.config/packlock/policy.{json,toml}`.
    pub fn discover(repo_root: &Path) -> Self {
        Self {
            repo_policy: first_existing(&repo_root.join(".packlock")),
            global_policy: default_global_dir().and_then(|dir| first_existing(&dir)),
        }
    }

    /// Load both policy records. A configured file that does not exist counts
    /// as "not specified"; a file that exists but cannot be parsed is an error.
    pub fn load(&self) -> Result<(Option<Record>, Option<Record>), ConfigError> {
        Ok((
            load_optional(self.repo_policy.as_deref())?,
            load_optional(self.global_policy.as_deref())?,
        ))
    }
}

fn load_optional(path: Option<&Path>) -> Result<Option<Record>, ConfigError> {
    match path {
        Some(p) if p.exists() => {
            debug!("loading policy {}", p.display());
            Ok(Some(read_record_file(p)?))
        }
        Some(p) => {
            debug!("policy {} not present", p.display());
            Ok(None)
        }
        None => Ok(None),
    }
}

fn first_existing(dir: &Path) -> Option<PathBuf> {
    POLICY_FILE_NAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.is_file())
}

/// `~/.config/packlock`, or `None` without `HOME` (no global policy then).
fn default_global_dir() -> Option<PathBuf> {
    let home = std::env::var_os("HOME")?;
    Some(PathBuf::from(home).join(".config/packlock"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        let Value::Object(map) = value else {
            panic!("expected object");
        };
        map
    }

    #[test]
    fn repo_policy_wins() {
        let repo = record(json!({"workspace_overrides_enabled": true}));
        let global = record(json!({"workspace_overrides_enabled": false}));
        let policy = resolve_trust_policy(Some(&repo), Some(&global), Some(false));
        assert!(policy.workspace_overrides_enabled);
        assert_eq!(policy.policy_source, PolicySource::RepoPolicy);
    }

    #[test]
    fn global_policy_used_when_repo_silent() {
        let repo = record(json!({"other": 1}));
        let global = record(json!({"workspace_overrides_enabled": true}));
        let policy = resolve_trust_policy(Some(&repo), Some(&global), Some(false));
        assert!(policy.workspace_overrides_enabled);
        assert_eq!(policy.policy_source, PolicySource::GlobalPolicy);
    }

    #[test]
    fn non_boolean_values_fall_through() {
        let repo = record(json!({"workspace_overrides_enabled": "true"}));
        let global = record(json!({"workspace_overrides_enabled": 1}));
        let policy = resolve_trust_policy(Some(&repo), Some(&global), Some(true));
        assert!(policy.workspace_overrides_enabled);
        assert_eq!(policy.policy_source, PolicySource::RuntimeOverride);
    }

    #[test]
    fn explicit_false_in_repo_is_respected() {
        let repo = record(json!({"workspace_overrides_enabled": false}));
        let policy = resolve_trust_policy(Some(&repo), None, Some(true));
        assert!(!policy.workspace_overrides_enabled);
        assert_eq!(policy.policy_source, PolicySource::RepoPolicy);
    }

    #[test]
    fn defaults_to_disabled() {
        let policy = resolve_trust_policy(None, None, None);
        assert!(!policy.workspace_overrides_enabled);
        assert_eq!(policy.policy_source, PolicySource::Default);
    }

    #[test]
    fn policy_source_serializes_kebab_case() {
        assert_eq!(
            serde_json::to_string(&PolicySource::RuntimeOverride).unwrap(),
            "\"runtime-override\""
        );
        assert_eq!(PolicySource::RepoPolicy.to_string(), "repo-policy");
    }

    #[test]
    fn parses_override_values() {
        assert_eq!(parse_override("TRUE"), Some(true));
        assert_eq!(parse_override(" 0 "), Some(false));
        assert_eq!(parse_override("maybe"), None);
    }

    #[test]
    fn config_discovers_repo_policy() {
        let repo = tempfile::tempdir().unwrap();
        let dir = repo.path().join(".packlock");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("policy.toml"), "workspace_overrides_enabled = true\n").unwrap();

        let config = PolicyConfig::discover(repo.path());
        assert_eq!(config.repo_policy, Some(dir.join("policy.toml")));

        let (repo_policy, _) = config.load().unwrap();
        let policy = resolve_trust_policy(repo_policy.as_ref(), None, None);
        assert_eq!(policy.policy_source, PolicySource::RepoPolicy);
    }

    #[test]
    fn config_missing_files_are_unspecified() {
        let dir = tempfile::tempdir().unwrap();
        let config = PolicyConfig {
            repo_policy: Some(dir.path().join("absent.json")),
            global_policy: None,
        };
        let (repo, global) = config.load().unwrap();
        assert!(repo.is_none() && global.is_none());
    }

    #[test]
    fn config_unparsable_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.json");
        std::fs::write(&path, "{not json").unwrap();
        let config = PolicyConfig {
            repo_policy: Some(path),
            global_policy: None,
        };
        assert!(config.load().is_err());
    }
}
