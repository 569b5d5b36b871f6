//! Merging per-source candidate lists into one ordered candidate list.

use packlock_schema::{PackId, Record};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("{tier} candidate #{index} is not an object")]
    NotAnObject { tier: PackSource, index: usize },
    #[error("{tier} candidate #{index} has no pack id")]
    MissingId { tier: PackSource, index: usize },
    #[error("{tier} supplies pack '{pack_id}' more than once")]
    DuplicateCandidate { tier: PackSource, pack_id: PackId },
}

/// Trust tier a candidate manifest was discovered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackSource {
    Workspace,
    Installer,
    User,
}

impl PackSource {
    /// Collection order. Activation uses a different precedence.
    pub const DISCOVERY_ORDER: [PackSource; 3] =
        [PackSource::Workspace, PackSource::Installer, PackSource::User];

    pub fn as_str(self) -> &'static str {
        match self {
            PackSource::Workspace => "workspace",
            PackSource::Installer => "installer",
            PackSource::User => "user",
        }
    }
}

impl fmt::Display for PackSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One manifest offered for a pack id by one source.
#[derive(Debug, Clone, PartialEq)]
pub struct PackCandidate {
    pub pack_id: PackId,
    pub source: PackSource,
    pub manifest: Record,
}

/// Raw candidate records, one list per source, as produced by the catalog.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryInput {
    pub workspace: Vec<Value>,
    pub installer: Vec<Value>,
    pub user: Vec<Value>,
}

impl DiscoveryInput {
    pub fn records(&self, source: PackSource) -> &[Value] {
        match source {
            PackSource::Workspace => &self.workspace,
            PackSource::Installer => &self.installer,
            PackSource::User => &self.user,
        }
    }
}

/// Collect candidates in `workspace → installer → user` order.
///
/// Any record without a non-empty `id` fails the whole collection; no partial
/// list is returned.
pub fn collect_candidates(input: &DiscoveryInput) -> Result<Vec<PackCandidate>, DiscoveryError> {
    let mut candidates = Vec::new();

    for source in PackSource::DISCOVERY_ORDER {
        let mut seen = BTreeSet::new();
        for (index, raw) in input.records(source).iter().enumerate() {
            let Value::Object(record) = raw else {
                return Err(DiscoveryError::NotAnObject { tier: source, index });
            };
            let id = record
                .get("id")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .ok_or(DiscoveryError::MissingId { tier: source, index })?;
            let pack_id = PackId::from(id);
            if !seen.insert(pack_id.clone()) {
                return Err(DiscoveryError::DuplicateCandidate {
                    tier: source,
                    pack_id,
                });
            }
            candidates.push(PackCandidate {
                pack_id,
                source,
                manifest: record.clone(),
            });
        }
        debug!("discovered {} {source} candidate(s)", seen.len());
    }

    Ok(candidates)
}
