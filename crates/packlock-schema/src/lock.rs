use crate::canonical::{sha256_hex, to_canonical_json, to_pretty_ascii_json};
use crate::manifest::PackManifest;
use crate::types::{Digest, PackId, SurfaceTag};
use crate::version::{CompatRange, Version};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use thiserror::Error;

pub const LOCK_SCHEMA: &str = "governance-lock.v1";

#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock file I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("lock file serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("unsupported lock schema '{0}', expected 'governance-lock.v1'")]
    UnsupportedSchema(String),
    #[error("lock hash mismatch: lock has '{lock_hash}', recomputed '{computed}'")]
    HashMismatch { lock_hash: String, computed: String },
    #[error("lock file is internally inconsistent: {0}")]
    Inconsistent(String),
    #[error("lock file manifest drift: {0}")]
    ManifestDrift(String),
}

/// Projection of one resolved manifest as recorded in the lock.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockedPack {
    pub id: PackId,
    pub version: Version,
    pub sha256: Digest,
    pub compat: CompatRange,
    pub requires: Vec<PackId>,
    pub conflicts_with: Vec<PackId>,
    pub owns_surfaces: Vec<SurfaceTag>,
    pub touches_surfaces: Vec<SurfaceTag>,
}

impl LockedPack {
    pub fn from_manifest(manifest: &PackManifest) -> Result<Self, LockError> {
        Ok(Self {
            id: manifest.id().clone(),
            version: manifest.version(),
            sha256: manifest.sha256()?,
            compat: manifest.compat(),
            requires: manifest.requires().to_vec(),
            conflicts_with: manifest.conflicts_with().to_vec(),
            owns_surfaces: manifest.owns_surfaces().to_vec(),
            touches_surfaces: manifest.touches_surfaces().to_vec(),
        })
    }
}

/// The lock captures one fully resolved pack set and its installation order.
///
/// `lock_hash` is the SHA-256 of the canonical JSON of every other field, so
/// same resolution → same bytes → same hash.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockPayload {
    pub schema: String,
    pub engine_version: Version,
    pub selected: Vec<PackId>,
    pub resolved_order: Vec<PackId>,
    pub packs: Vec<LockedPack>,
    pub lock_hash: Digest,
}

/// Everything but the hash; this is what `lock_hash` is computed over.
#[derive(Serialize)]
struct UnsealedLock<'a> {
    schema: &'a str,
    engine_version: &'a Version,
    selected: &'a [PackId],
    resolved_order: &'a [PackId],
    packs: &'a [LockedPack],
}

impl LockPayload {
    /// Assemble a lock from an already validated resolution.
    ///
    /// `ordered` must be the manifests in installation order. `selected` is
    /// stored sorted and de-duplicated.
    pub fn assemble(
        engine_version: Version,
        selected: &[PackId],
        ordered: &[&PackManifest],
    ) -> Result<Self, LockError> {
        let selected: Vec<PackId> = selected
            .iter()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let packs = ordered
            .iter()
            .map(|m| LockedPack::from_manifest(m))
            .collect::<Result<Vec<_>, _>>()?;

        let lock = LockPayload {
            schema: LOCK_SCHEMA.to_owned(),
            engine_version,
            selected,
            resolved_order: ordered.iter().map(|m| m.id().clone()).collect(),
            packs,
            lock_hash: Digest::new(String::new()), // computed below
        };

        let lock_hash = lock.compute_lock_hash()?;
        Ok(LockPayload { lock_hash, ..lock })
    }

    /// Recompute the lock hash from the locked fields (ignoring the stored one).
    pub fn compute_lock_hash(&self) -> Result<Digest, LockError> {
        let unsealed = UnsealedLock {
            schema: &self.schema,
            engine_version: &self.engine_version,
            selected: &self.selected,
            resolved_order: &self.resolved_order,
            packs: &self.packs,
        };
        let canonical = to_canonical_json(&unsealed)?;
        Ok(Digest::new(sha256_hex(canonical.as_bytes())))
    }

    /// Verify that this lock is internally consistent: known schema, stored
    /// hash matches the recomputed one, and the pack list agrees with
    /// `resolved_order` and covers `selected`.
    pub fn verify_integrity(&self) -> Result<(), LockError> {
        if self.schema != LOCK_SCHEMA {
            return Err(LockError::UnsupportedSchema(self.schema.clone()));
        }

        let computed = self.compute_lock_hash()?;
        if computed != self.lock_hash {
            return Err(LockError::HashMismatch {
                lock_hash: self.lock_hash.to_string(),
                computed: computed.into_inner(),
            });
        }

        let pack_ids: Vec<&PackId> = self.packs.iter().map(|p| &p.id).collect();
        let order: Vec<&PackId> = self.resolved_order.iter().collect();
        if pack_ids != order {
            return Err(LockError::Inconsistent(
                "packs are not listed in resolved_order".to_owned(),
            ));
        }
        for id in &self.selected {
            if !self.resolved_order.contains(id) {
                return Err(LockError::Inconsistent(format!(
                    "selected pack '{id}' is missing from resolved_order"
                )));
            }
        }
        Ok(())
    }

    /// Check that the locked per-pack digests still match current manifests.
    ///
    /// This catches a manifest that changed after the lock was written.
    pub fn verify_manifests(
        &self,
        manifests: &BTreeMap<PackId, PackManifest>,
    ) -> Result<(), LockError> {
        for pack in &self.packs {
            let Some(current) = manifests.get(&pack.id) else {
                return Err(LockError::ManifestDrift(format!(
                    "pack '{}' is locked but no longer available",
                    pack.id
                )));
            };
            let digest = current.sha256()?;
            if digest != pack.sha256 {
                return Err(LockError::ManifestDrift(format!(
                    "pack '{}' changed: lock has sha256 '{}', manifest has '{digest}'. Re-run 'packlock lock' to re-resolve.",
                    pack.id, pack.sha256
                )));
            }
        }
        Ok(())
    }

    /// Indented, ASCII-safe JSON with a trailing newline: the on-disk form.
    pub fn to_file_contents(&self) -> Result<String, LockError> {
        let mut content = to_pretty_ascii_json(self)?;
        content.push('\n');
        Ok(content)
    }

    /// Atomically replace `path` with this lock, creating parent directories.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<(), LockError> {
        let path = path.as_ref();
        let content = self.to_file_contents()?;
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        std::io::Write::write_all(&mut tmp, content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| LockError::Io(e.error))?;
        // Fsync parent directory to ensure rename durability on power loss.
        if let Ok(f) = fs::File::open(dir) {
            let _ = f.sync_all();
        }
        Ok(())
    }

    pub fn read_from_file(path: impl AsRef<Path>) -> Result<Self, LockError> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}
