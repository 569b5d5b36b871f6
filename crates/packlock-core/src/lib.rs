//! Governance pack resolution for packlock.
//!
//! This crate turns candidate pack manifests from several trust tiers into a
//! single deterministic lock: candidates are collected per source, a trust
//! policy decides whether workspace packs may participate, one manifest is
//! activated per pack id, and the selected packs are closed over their
//! requirements, checked for compatibility, conflicts and surface ownership,
//! and ordered for installation. [`Pipeline`] runs all of it end to end.

pub mod activation;
pub mod concurrency;
pub mod discovery;
pub mod pipeline;
pub mod resolve;
pub mod trust;

pub use activation::{allowed_sources, select_active, ActivationError, ActivePacks};
pub use concurrency::WriteGuard;
pub use discovery::{collect_candidates, DiscoveryError, DiscoveryInput, PackCandidate, PackSource};
pub use pipeline::{LockOutcome, LockRequest, Pipeline};
pub use resolve::{requirement_closure, resolve_lock, topological_order, ResolveError};
pub use trust::{
    parse_override, resolve_trust_policy, runtime_override_from_env, ConfigError, PolicyConfig,
    PolicySource, TrustPolicy,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("discovery error: {0}")]
    Discovery(#[from] DiscoveryError),
    #[error("activation error: {0}")]
    Activation(#[from] ActivationError),
    #[error("resolution error: {0}")]
    Resolve(#[from] ResolveError),
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("record error: {0}")]
    Record(#[from] packlock_schema::RecordError),
    #[error("lock error: {0}")]
    Lock(#[from] packlock_schema::LockError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
