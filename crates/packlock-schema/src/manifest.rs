use crate::canonical::{sha256_hex, to_canonical_json};
use crate::types::{Digest, PackId, Record, SurfaceTag};
use crate::version::{CompatRange, Version, VersionError};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Placeholder used in errors when the pack id itself is missing or invalid.
pub const UNKNOWN_PACK: &str = "<unknown>";

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("pack '{pack_id}': missing required field '{field}'")]
    MissingField { pack_id: String, field: String },
    #[error("pack '{pack_id}': field '{field}' must not be empty")]
    EmptyField { pack_id: String, field: String },
    #[error("pack '{pack_id}': field '{field}' must be {expected}")]
    WrongType {
        pack_id: String,
        field: String,
        expected: &'static str,
    },
    #[error("pack '{pack_id}': field '{field}' is not a valid version: {source}")]
    InvalidVersion {
        pack_id: String,
        field: String,
        source: VersionError,
    },
    #[error("pack '{pack_id}': field '{field}' contains unsafe path '{path}'")]
    PathTraversal {
        pack_id: String,
        field: String,
        path: String,
    },
    #[error("pack '{pack_id}': field '{field}' must not reference the pack itself")]
    SelfReference { pack_id: String, field: String },
}

/// A validated, normalized pack manifest.
///
/// Only constructible through [`PackManifest::from_record`]; every list is
/// trimmed, de-duplicated and sorted, so two manifests that differ only in
/// list order or duplicates compare (and hash) equal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackManifest {
    id: PackId,
    version: Version,
    compat: CompatRange,
    requires: Vec<PackId>,
    conflicts_with: Vec<PackId>,
    owns_surfaces: Vec<SurfaceTag>,
    touches_surfaces: Vec<SurfaceTag>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    artifacts: Vec<String>,
}

impl PackManifest {
    /// Parse and validate an untyped manifest record.
    ///
    /// Unknown keys are ignored, which lets activation annotations such as
    /// `source` and `policy_source` ride along on the record.
    pub fn from_record(record: &Record) -> Result<Self, ManifestError> {
        let id = required_str(record, UNKNOWN_PACK, "id")?;
        let pack_id = id.as_str();

        let raw_version = required_str(record, pack_id, "version")?;
        let version = parse_version(pack_id, "version", &raw_version)?;

        let compat = match record.get("compat") {
            None | Some(Value::Null) => {
                return Err(ManifestError::MissingField {
                    pack_id: pack_id.to_owned(),
                    field: "compat".to_owned(),
                })
            }
            Some(Value::Object(block)) => CompatRange {
                engine_min: parse_version(
                    pack_id,
                    "compat.engine_min",
                    &required_str(block, pack_id, "compat.engine_min")?,
                )?,
                engine_max: parse_version(
                    pack_id,
                    "compat.engine_max",
                    &required_str(block, pack_id, "compat.engine_max")?,
                )?,
            },
            Some(_) => {
                return Err(ManifestError::WrongType {
                    pack_id: pack_id.to_owned(),
                    field: "compat".to_owned(),
                    expected: "an object",
                })
            }
        };

        let requires: Vec<PackId> = string_list(record, pack_id, "requires")?
            .into_iter()
            .map(PackId::from)
            .collect();
        let conflicts_with: Vec<PackId> = string_list(record, pack_id, "conflicts_with")?
            .into_iter()
            .map(PackId::from)
            .collect();
        for (field, list) in [("requires", &requires), ("conflicts_with", &conflicts_with)] {
            if list.iter().any(|other| other == pack_id) {
                return Err(ManifestError::SelfReference {
                    pack_id: pack_id.to_owned(),
                    field: field.to_owned(),
                });
            }
        }

        let artifacts = string_list(record, pack_id, "artifacts")?;
        for path in &artifacts {
            if !is_safe_relative_path(path) {
                return Err(ManifestError::PathTraversal {
                    pack_id: pack_id.to_owned(),
                    field: "artifacts".to_owned(),
                    path: path.clone(),
                });
            }
        }

        let owns_surfaces = string_list(record, pack_id, "owns_surfaces")?
            .into_iter()
            .map(SurfaceTag::from)
            .collect();
        let touches_surfaces = string_list(record, pack_id, "touches_surfaces")?
            .into_iter()
            .map(SurfaceTag::from)
            .collect();

        Ok(Self {
            id: PackId::new(id),
            version,
            compat,
            requires,
            conflicts_with,
            owns_surfaces,
            touches_surfaces,
            artifacts,
        })
    }

    pub fn id(&self) -> &PackId {
        &self.id
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn compat(&self) -> CompatRange {
        self.compat
    }

    pub fn requires(&self) -> &[PackId] {
        &self.requires
    }

    pub fn conflicts_with(&self) -> &[PackId] {
        &self.conflicts_with
    }

    pub fn owns_surfaces(&self) -> &[SurfaceTag] {
        &self.owns_surfaces
    }

    pub fn touches_surfaces(&self) -> &[SurfaceTag] {
        &self.touches_surfaces
    }

    pub fn artifacts(&self) -> &[String] {
        &self.artifacts
    }

    pub fn canonical_json(&self) -> Result<String, serde_json::Error> {
        to_canonical_json(self)
    }

    /// SHA-256 of the canonical form; this is the per-pack digest in a lock.
    pub fn sha256(&self) -> Result<Digest, serde_json::Error> {
        Ok(Digest::new(sha256_hex(self.canonical_json()?.as_bytes())))
    }
}

fn required_str(record: &Record, pack_id: &str, field: &str) -> Result<String, ManifestError> {
    // Nested fields are addressed as "compat.engine_min"; look up the leaf key.
    let key = field.rsplit('.').next().unwrap_or(field);
    match record.get(key) {
        None | Some(Value::Null) => Err(ManifestError::MissingField {
            pack_id: pack_id.to_owned(),
            field: field.to_owned(),
        }),
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Err(ManifestError::EmptyField {
                    pack_id: pack_id.to_owned(),
                    field: field.to_owned(),
                })
            } else {
                Ok(trimmed.to_owned())
            }
        }
        Some(_) => Err(ManifestError::WrongType {
            pack_id: pack_id.to_owned(),
            field: field.to_owned(),
            expected: "a string",
        }),
    }
}

fn parse_version(pack_id: &str, field: &str, raw: &str) -> Result<Version, ManifestError> {
    Version::parse(raw).map_err(|source| ManifestError::InvalidVersion {
        pack_id: pack_id.to_owned(),
        field: field.to_owned(),
        source,
    })
}

/// Read an optional list-of-strings field, returning it trimmed, sorted and
/// de-duplicated. Absent or `null` means empty.
fn string_list(record: &Record, pack_id: &str, field: &str) -> Result<Vec<String>, ManifestError> {
    let items = match record.get(field) {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(_) => {
            return Err(ManifestError::WrongType {
                pack_id: pack_id.to_owned(),
                field: field.to_owned(),
                expected: "a list of strings",
            })
        }
    };

    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let Value::String(s) = item else {
            return Err(ManifestError::WrongType {
                pack_id: pack_id.to_owned(),
                field: field.to_owned(),
                expected: "a list of strings",
            });
        };
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(ManifestError::EmptyField {
                pack_id: pack_id.to_owned(),
                field: field.to_owned(),
            });
        }
        out.push(trimmed.to_owned());
    }
    out.sort();
    out.dedup();
    Ok(out)
}

/// Relative, `/`-separated, and free of `..`, `.`-only or empty components.
pub(crate) fn is_safe_relative_path(path: &str) -> bool {
    if path.starts_with('/') || path.contains('\\') || path.contains(':') {
        return false;
    }
    path.split('/')
        .all(|component| !component.is_empty() && component != "." && component != "..")
}
