//! Payload versioning utilities

use semver::Version;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::VersionCompatibilityError;

/// Schema version stamped on every envelope
///
/// Always exactly `MAJOR.MINOR.PATCH`; pre-release and build suffixes are
/// rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VersionInfo {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl VersionInfo {
    /// Create a new version
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self { major, minor, patch }
    }

    /// Parse from a version string (e.g. "1.2.3")
    pub fn parse(version_str: &str) -> Result<Self, VersionCompatibilityError> {
        let invalid = || VersionCompatibilityError::InvalidVersion(version_str.to_string());
        let version = Version::parse(version_str).map_err(|_| invalid())?;
        if !version.pre.is_empty() || !version.build.is_empty() {
            return Err(invalid());
        }
        Ok(Self::new(version.major, version.minor, version.patch))
    }

    /// Check if this version shares a major version with another
    pub fn same_major(&self, other: &VersionInfo) -> bool {
        self.major == other.major
    }
}

impl Default for VersionInfo {
    fn default() -> Self {
        Self::new(1, 0, 0)
    }
}

impl fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for VersionInfo {
    type Err = VersionCompatibilityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for VersionInfo {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for VersionInfo {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_version_parsing() {
        let v = VersionInfo::parse("1.2.3").unwrap();
        assert_eq!(v, VersionInfo::new(1, 2, 3));
        assert_eq!(v.to_string(), "1.2.3");
    }

    #[test]
    fn test_version_parsing_is_strict() {
        let rejected = [
            "1.2",
            "1.2.3.4",
            "v1.2.3",
            "1.2.3-alpha",
            "1.2.3+build",
            "a.b.c",
            "",
            "01.2.3",
        ];
        for bad in rejected {
            assert!(
                matches!(
                    VersionInfo::parse(bad),
                    Err(VersionCompatibilityError::InvalidVersion(_))
                ),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_version_ordering() {
        let v1 = VersionInfo::parse("1.9.0").unwrap();
        let v2 = VersionInfo::parse("1.10.0").unwrap();
        let v3 = VersionInfo::parse("2.0.0").unwrap();
        assert!(v1 < v2);
        assert!(v2 < v3);
        assert!(!v3.same_major(&v1));
        assert!(v1.same_major(&v2));
    }

    proptest! {
        #[test]
        fn prop_ordering_matches_numeric_triples(
            a in (0u64..50, 0u64..50, 0u64..50),
            b in (0u64..50, 0u64..50, 0u64..50),
        ) {
            let va = VersionInfo::new(a.0, a.1, a.2);
            let vb = VersionInfo::new(b.0, b.1, b.2);
            prop_assert_eq!(va.cmp(&vb), a.cmp(&b));
            prop_assert_eq!(VersionInfo::parse(&va.to_string()).unwrap(), va);
        }
    }
}
