//! Choosing exactly one manifest per pack id among competing sources.

use crate::discovery::{PackCandidate, PackSource};
use crate::trust::TrustPolicy;
use packlock_schema::{PackId, Record};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

/// Higher-trust sources win regardless of discovery order.
pub const ACTIVATION_ORDER: [PackSource; 3] =
    [PackSource::Installer, PackSource::User, PackSource::Workspace];

#[derive(Debug, Error)]
pub enum ActivationError {
    #[error(
        "pack '{pack_id}' has no candidate from a trusted source (offered by: {offered}; allowed: {allowed})"
    )]
    NoTrustedSource {
        pack_id: PackId,
        offered: String,
        allowed: String,
    },
}

/// One activated manifest record per pack id, ordered by id.
pub type ActivePacks = BTreeMap<PackId, Record>;

/// Sources allowed to supply manifests under `policy`, in precedence order.
/// Workspace is dropped entirely unless overrides are enabled.
pub fn allowed_sources(policy: &TrustPolicy) -> Vec<PackSource> {
    ACTIVATION_ORDER
        .into_iter()
        .filter(|s| *s != PackSource::Workspace || policy.workspace_overrides_enabled)
        .collect()
}

/// Pick one manifest per pack id and annotate it with `source` and
/// `policy_source`.
pub fn select_active(
    candidates: &[PackCandidate],
    policy: &TrustPolicy,
) -> Result<ActivePacks, ActivationError> {
    let allowed = allowed_sources(policy);

    let mut by_id: BTreeMap<&PackId, BTreeMap<PackSource, &PackCandidate>> = BTreeMap::new();
    for candidate in candidates {
        by_id
            .entry(&candidate.pack_id)
            .or_default()
            .entry(candidate.source)
            .or_insert(candidate);
    }

    let mut active = ActivePacks::new();
    for (pack_id, offered) in by_id {
        let Some(chosen) = allowed.iter().find_map(|s| offered.get(s)) else {
            return Err(ActivationError::NoTrustedSource {
                pack_id: pack_id.clone(),
                offered: join_sources(offered.keys().copied()),
                allowed: join_sources(allowed.iter().copied()),
            });
        };

        let mut record = chosen.manifest.clone();
        record.insert(
            "source".to_owned(),
            Value::String(chosen.source.as_str().to_owned()),
        );
        record.insert(
            "policy_source".to_owned(),
            Value::String(policy.policy_source.as_str().to_owned()),
        );
        debug!("activated pack '{pack_id}' from {}", chosen.source);
        active.insert(pack_id.clone(), record);
    }

    Ok(active)
}

fn join_sources(sources: impl Iterator<Item = PackSource>) -> String {
    let names: Vec<&str> = sources.map(PackSource::as_str).collect();
    if names.is_empty() {
        "none".to_owned()
    } else {
        names.join(", ")
    }
}
