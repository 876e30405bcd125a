// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Platform version parsing and the version thresholds that change the
//! shape of the REST API.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::SessionError;

/// Last release series without organization segments in the base URL.
pub const GETI_18_VERSION: PlatformVersion = PlatformVersion::new(1, 8, 0);

/// First release that serves the organization id from the profile endpoint.
pub const GETI_114_VERSION: PlatformVersion = PlatformVersion::new(1, 14, 0);

/// Organization id assumed for servers older than [`GETI_114_VERSION`].
pub const DEFAULT_ORGANIZATION_ID: &str = "000000000000000000000001";

/// Semantic platform version, e.g. `1.8.0-release-20230504`.
///
/// Ordering and equality consider only `(major, minor, patch)`; the build
/// suffix is informational.
#[derive(Debug, Clone)]
pub struct PlatformVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub build: Option<String>,
}

impl PlatformVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self { major, minor, patch, build: None }
    }

    fn triple(&self) -> (u32, u32, u32) {
        (self.major, self.minor, self.patch)
    }

    /// Whether URLs for this version carry an `organizations/{id}/` segment.
    pub fn uses_organization_path(&self) -> bool {
        *self > GETI_18_VERSION
    }

    /// Whether the organization id must be fetched from the profile endpoint.
    pub fn fetches_organization_id(&self) -> bool {
        *self >= GETI_114_VERSION
    }
}

impl PartialEq for PlatformVersion {
    fn eq(&self, other: &Self) -> bool {
        self.triple() == other.triple()
    }
}

impl Eq for PlatformVersion {}

impl PartialOrd for PlatformVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PlatformVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.triple().cmp(&other.triple())
    }
}

impl FromStr for PlatformVersion {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (numbers, build) = match trimmed.split_once(['-', '+']) {
            Some((numbers, build)) => (numbers, Some(build.to_owned())),
            None => (trimmed, None),
        };

        let mut parts = numbers.split('.');
        let mut next = |name: &str, required: bool| -> Result<u32, SessionError> {
            match parts.next() {
                Some(p) => p.parse().map_err(|_| {
                    SessionError::Configuration(format!("invalid {name} version in {s:?}"))
                }),
                None if required => Err(SessionError::Configuration(format!(
                    "missing {name} version in {s:?}"
                ))),
                None => Ok(0),
            }
        };
        let major = next("major", true)?;
        let minor = next("minor", true)?;
        let patch = next("patch", false)?;

        Ok(Self { major, minor, patch, build: build.filter(|b| !b.is_empty()) })
    }
}

impl fmt::Display for PlatformVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(ref build) = self.build {
            write!(f, "-{build}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "version_tests.rs"]
mod tests;
