//! Pack manifests, canonical hashing, content policy, and lock files for packlock.
//!
//! This crate defines the value layer: strict versions (`Version`), manifest
//! normalization (`PackManifest::from_record`), canonical JSON and SHA-256
//! digests, pack content screening (`scan_pack_content`), record loading from
//! JSON/TOML files, and the `governance-lock.v1` lock payload (`LockPayload`).

pub mod canonical;
pub mod content;
pub mod lock;
pub mod manifest;
pub mod record;
pub mod types;
pub mod version;

pub use canonical::{sha256_hex, to_canonical_json, to_pretty_ascii_json};
pub use content::{scan_pack_content, PackPolicyViolation, ALLOWED_EXTENSIONS};
pub use lock::{LockError, LockPayload, LockedPack, LOCK_SCHEMA};
pub use manifest::{ManifestError, PackManifest, UNKNOWN_PACK};
pub use record::{read_record_file, read_record_list_file, RecordError};
pub use types::{Digest, PackId, Record, SurfaceTag};
pub use version::{CompatRange, Version, VersionError};
