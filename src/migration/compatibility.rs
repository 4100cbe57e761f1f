//! Version compatibility strategies

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::VersionCompatibilityError;
use crate::version::VersionInfo;

/// Which stored versions a reader at the current version accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompatibilityStrategy {
    /// Exact match only
    Strict,
    /// Any version at or below current
    #[default]
    Backward,
    /// Any version at or above current
    Forward,
    /// Any version sharing the current major
    Flexible,
}

impl CompatibilityStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            CompatibilityStrategy::Strict => "strict",
            CompatibilityStrategy::Backward => "backward",
            CompatibilityStrategy::Forward => "forward",
            CompatibilityStrategy::Flexible => "flexible",
        }
    }

    pub fn is_compatible(&self, found: &VersionInfo, current: &VersionInfo) -> bool {
        match self {
            CompatibilityStrategy::Strict => found == current,
            CompatibilityStrategy::Backward => found <= current,
            CompatibilityStrategy::Forward => found >= current,
            CompatibilityStrategy::Flexible => found.same_major(current),
        }
    }

    /// Like [`is_compatible`](Self::is_compatible), as an error
    pub fn check(
        &self,
        found: &VersionInfo,
        current: &VersionInfo,
    ) -> Result<(), VersionCompatibilityError> {
        if self.is_compatible(found, current) {
            Ok(())
        } else {
            Err(VersionCompatibilityError::Incompatible {
                found: found.to_string(),
                current: current.to_string(),
                strategy: self.name().to_string(),
            })
        }
    }
}

impl fmt::Display for CompatibilityStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CompatibilityStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "strict" => Ok(CompatibilityStrategy::Strict),
            "backward" => Ok(CompatibilityStrategy::Backward),
            "forward" => Ok(CompatibilityStrategy::Forward),
            "flexible" => Ok(CompatibilityStrategy::Flexible),
            other => Err(format!("unknown compatibility strategy '{}'", other)),
        }
    }
}
