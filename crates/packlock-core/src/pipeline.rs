//! End-to-end lock production: discovery, trust, activation, resolution.

use crate::activation::{select_active, ActivePacks};
use crate::concurrency::WriteGuard;
use crate::discovery::{collect_candidates, DiscoveryInput};
use crate::resolve::resolve_lock;
use crate::trust::{resolve_trust_policy, TrustPolicy};
use crate::CoreError;
use packlock_schema::{LockPayload, PackId, Record};
use std::path::Path;
use tracing::{debug, info};

/// Everything needed to produce one lock.
#[derive(Debug, Clone, Default)]
pub struct LockRequest {
    pub candidates: DiscoveryInput,
    pub repo_policy: Option<Record>,
    pub global_policy: Option<Record>,
    pub runtime_override: Option<bool>,
    pub selected: Vec<String>,
    pub engine_version: String,
}

#[derive(Debug, Clone)]
pub struct LockOutcome {
    pub policy: TrustPolicy,
    /// Activated manifests, annotated with their source.
    pub active: ActivePacks,
    pub lock: LockPayload,
}

impl LockOutcome {
    pub fn active_ids(&self) -> Vec<&PackId> {
        self.active.keys().collect()
    }
}

pub struct Pipeline;

impl Pipeline {
    /// Discovery, trust and activation only; `selected` and
    /// `engine_version` are not looked at.
    pub fn activate(request: &LockRequest) -> Result<(TrustPolicy, ActivePacks), CoreError> {
        let candidates = collect_candidates(&request.candidates)?;
        debug!("collected {} candidate(s)", candidates.len());

        let policy = resolve_trust_policy(
            request.repo_policy.as_ref(),
            request.global_policy.as_ref(),
            request.runtime_override,
        );

        let active = select_active(&candidates, &policy)?;
        debug!("activated {} pack(s)", active.len());
        Ok((policy, active))
    }

    /// Run every stage in memory. Nothing touches the filesystem.
    pub fn run(request: &LockRequest) -> Result<LockOutcome, CoreError> {
        let (policy, active) = Self::activate(request)?;
        let lock = resolve_lock(&active, &request.selected, &request.engine_version)?;

        Ok(LockOutcome {
            policy,
            active,
            lock,
        })
    }

    /// Run every stage and persist the lock at `path`.
    ///
    /// Resolution finishes before the write guard is taken, so a failing
    /// request never creates or replaces a file.
    pub fn write(request: &LockRequest, path: &Path) -> Result<LockOutcome, CoreError> {
        let outcome = Self::run(request)?;

        let _guard = WriteGuard::acquire(path)?;
        outcome.lock.write_to_file(path)?;
        info!(
            "wrote {} ({} pack(s), lock_hash {})",
            path.display(),
            outcome.lock.packs.len(),
            outcome.lock.lock_hash
        );

        Ok(outcome)
    }
}
