//! Protocol versions and compatibility ranges
//!
//! Every dispatch node declares the range of protocol versions it understands.
//! The active version is negotiated once per session and checked against that
//! range before a node is allowed to handle anything.

use core::cmp::Ordering;
use core::fmt;

/// Semantic version of the environment protocol
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Version {
    pub major: u16,
    pub minor: u16,
    pub patch: u16,
}

impl Version {
    /// Create a new version
    #[inline]
    pub const fn new(major: u16, minor: u16, patch: u16) -> Self {
        Self { major, minor, patch }
    }

    /// Version 0.0.0
    pub const ZERO: Version = Version::new(0, 0, 0);

    /// Parse from "major.minor.patch"; missing trailing parts default to 0
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.trim().split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = match parts.next() {
            Some(p) => p.parse().ok()?,
            None => 0,
        };
        let patch = match parts.next() {
            Some(p) => p.parse().ok()?,
            None => 0,
        };
        if parts.next().is_some() {
            return None;
        }
        Some(Self { major, minor, patch })
    }

    /// Convert to a single u64 for easy comparison
    #[inline]
    pub const fn to_u64(&self) -> u64 {
        (self.major as u64) << 32 | (self.minor as u64) << 16 | self.patch as u64
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_u64().cmp(&other.to_u64())
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl fmt::Debug for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Version({})", self)
    }
}

impl Default for Version {
    fn default() -> Self {
        Self::new(1, 0, 0)
    }
}

/// Half-open range of versions: `min <= v < max`, unbounded above when `max` is `None`
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VersionRange {
    pub min: Version,
    pub max: Option<Version>,
}

impl VersionRange {
    /// Accepts every version
    pub const fn any() -> Self {
        Self {
            min: Version::ZERO,
            max: None,
        }
    }

    /// Accepts `min` and everything above
    pub const fn at_least(min: Version) -> Self {
        Self { min, max: None }
    }

    /// Accepts `min <= v < max`
    pub const fn between(min: Version, max: Version) -> Self {
        Self {
            min,
            max: Some(max),
        }
    }

    /// Check whether `version` falls in the range
    pub fn contains(&self, version: &Version) -> bool {
        *version >= self.min && self.max.map_or(true, |max| *version < max)
    }

    /// True when no version can satisfy the range
    pub fn is_empty(&self) -> bool {
        self.max.map_or(false, |max| max <= self.min)
    }
}

impl Default for VersionRange {
    fn default() -> Self {
        Self::any()
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.max {
            Some(max) => write!(f, "[{}, {})", self.min, max),
            None => write!(f, "[{}, *)", self.min),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_parsing() {
        let v = Version::parse("1.2.3").unwrap();
        assert_eq!(v, Version::new(1, 2, 3));
        assert_eq!(Version::parse("2.4"), Some(Version::new(2, 4, 0)));
        assert_eq!(Version::parse("1.2.3.4"), None);
        assert_eq!(Version::parse("one"), None);
    }

    #[test]
    fn test_version_ordering() {
        assert!(Version::new(1, 0, 0) < Version::new(1, 1, 0));
        assert!(Version::new(1, 9, 9) < Version::new(2, 0, 0));
    }

    #[test]
    fn test_range_contains() {
        let range = VersionRange::between(Version::new(1, 0, 0), Version::new(2, 0, 0));
        assert!(range.contains(&Version::new(1, 0, 0)));
        assert!(range.contains(&Version::new(1, 9, 3)));
        assert!(!range.contains(&Version::new(2, 0, 0)));
        assert!(!range.contains(&Version::new(0, 9, 0)));

        let open = VersionRange::at_least(Version::new(1, 5, 0));
        assert!(open.contains(&Version::new(40, 0, 0)));
        assert!(VersionRange::any().contains(&Version::ZERO));
    }

    #[test]
    fn test_empty_range() {
        let empty = VersionRange::between(Version::new(2, 0, 0), Version::new(1, 0, 0));
        assert!(empty.is_empty());
        assert!(!empty.contains(&Version::new(1, 5, 0)));
    }
}
