//! Strict `major.minor.patch` versions and inclusive engine compatibility ranges.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    #[error("version must not be empty")]
    Empty,
    #[error("invalid version '{0}': expected major.minor.patch with numeric components")]
    Malformed(String),
}

/// A strict semantic version. Pre-release and build metadata are rejected.
///
/// Ordering compares `(major, minor, patch)` numerically, so `1.10.0 > 1.9.9`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl Version {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(VersionError::Empty);
        }
        let malformed = || VersionError::Malformed(trimmed.to_owned());

        let mut parts = trimmed.split('.');
        let mut next = || -> Result<u64, VersionError> {
            let part = parts.next().ok_or_else(malformed)?;
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(malformed());
            }
            part.parse().map_err(|_| malformed())
        };
        let version = Self::new(next()?, next()?, next()?);
        if parts.next().is_some() {
            return Err(malformed());
        }
        Ok(version)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Inclusive engine version range a pack declares itself compatible with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatRange {
    pub engine_min: Version,
    pub engine_max: Version,
}

impl CompatRange {
    pub fn contains(&self, engine: &Version) -> bool {
        self.engine_min <= *engine && *engine <= self.engine_max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_triples() {
        assert_eq!(Version::parse("2.0.0").unwrap(), Version::new(2, 0, 0));
        assert_eq!(Version::parse(" 10.4.12 ").unwrap(), Version::new(10, 4, 12));
    }

    #[test]
    fn rejects_non_strict_forms() {
        for bad in [
            "1", "1.2", "1.2.3.4", "1.2.x", "v1.2.3", "1.2.3-rc.1", "1.2.3+build", "1..3", "+1.2.3",
            "-1.2.3", "1. 2.3",
        ] {
            assert!(Version::parse(bad).is_err(), "{bad} should be rejected");
        }
        assert_eq!(Version::parse("   "), Err(VersionError::Empty));
    }

    #[test]
    fn compares_numerically_not_lexically() {
        assert!(Version::parse("1.10.0").unwrap() > Version::parse("1.9.9").unwrap());
        assert!(Version::parse("2.0.0").unwrap() > Version::parse("1.99.99").unwrap());
    }

    #[test]
    fn compat_range_is_inclusive() {
        let range = CompatRange {
            engine_min: Version::new(1, 0, 0),
            engine_max: Version::new(2, 0, 0),
        };
        assert!(range.contains(&Version::new(1, 0, 0)));
        assert!(range.contains(&Version::new(2, 0, 0)));
        assert!(range.contains(&Version::new(1, 5, 3)));
        assert!(!range.contains(&Version::new(0, 9, 9)));
        assert!(!range.contains(&Version::new(2, 0, 1)));
    }

    #[test]
    fn serializes_as_string() {
        let json = serde_json::to_string(&Version::new(1, 2, 3)).unwrap();
        assert_eq!(json, "\"1.2.3\"");
        let back: Version = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Version::new(1, 2, 3));
        assert!(serde_json::from_str::<Version>("\"1.2\"").is_err());
    }
}
