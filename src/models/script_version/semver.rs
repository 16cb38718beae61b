use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::AppError;

/// Which component of the version a new snapshot increments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionBump {
    Major,
    Minor,
    Patch,
}

impl FromStr for VersionBump {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "major" => Ok(VersionBump::Major),
            "minor" => Ok(VersionBump::Minor),
            "patch" => Ok(VersionBump::Patch),
            other => Err(AppError::Validation(format!("unknown version bump '{other}'"))),
        }
    }
}

/// `major.minor.patch`, ordered numerically component by component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SemVer {
    pub major: i32,
    pub minor: i32,
    pub patch: i32,
}

impl SemVer {
    /// Version a script's first bump is computed from.
    pub const BASE: SemVer = SemVer { major: 1, minor: 0, patch: 0 };

    pub const fn new(major: i32, minor: i32, patch: i32) -> Self {
        SemVer { major, minor, patch }
    }

    /// Increment one component and zero everything below it.
    pub fn bump(self, bump: VersionBump) -> SemVer {
        match bump {
            VersionBump::Major => SemVer::new(self.major + 1, 0, 0),
            VersionBump::Minor => SemVer::new(self.major, self.minor + 1, 0),
            VersionBump::Patch => SemVer::new(self.major, self.minor, self.patch + 1),
        }
    }

    /// Next number for a script whose highest existing version is `highest`.
    pub fn next_after(highest: Option<SemVer>, bump: VersionBump) -> SemVer {
        highest.unwrap_or(SemVer::BASE).bump(bump)
    }
}

impl fmt::Display for SemVer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for SemVer {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || AppError::Validation(format!("invalid version '{s}'"));
        let mut parts = s.trim().split('.');
        let mut next = || -> Result<i32, AppError> {
            let n: i32 = parts.next().ok_or_else(invalid)?.parse().map_err(|_| invalid())?;
            if n < 0 { Err(invalid()) } else { Ok(n) }
        };
        let version = SemVer::new(next()?, next()?, next()?);
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(version)
    }
}
