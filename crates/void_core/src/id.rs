//! Entity identifiers
//!
//! Ids come from the server and are never allocated locally. Zero is reserved
//! as "no entity" on the wire, so [`EntityId`] wraps a `NonZeroU64` and the
//! invalid value simply cannot be constructed.

use core::fmt;
use core::num::NonZeroU64;
use core::str::FromStr;

/// Identifier of a remote entity. Never zero.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "u64", into = "u64"))]
pub struct EntityId(NonZeroU64);

impl EntityId {
    /// Create an id, returning `None` for the reserved value 0
    #[inline]
    pub const fn new(raw: u64) -> Option<Self> {
        match NonZeroU64::new(raw) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Get the raw value
    #[inline]
    pub const fn get(&self) -> u64 {
        self.0.get()
    }

    /// Decode an optional id from its wire form, where 0 means "none"
    #[inline]
    pub const fn from_wire(raw: u64) -> Option<Self> {
        Self::new(raw)
    }

    /// Encode an optional id to its wire form
    #[inline]
    pub fn to_wire(id: Option<Self>) -> u64 {
        id.map(|id| id.get()).unwrap_or(0)
    }
}

/// Error returned when converting 0 into an [`EntityId`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InvalidEntityId;

impl fmt::Display for InvalidEntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity id 0 is reserved")
    }
}

impl std::error::Error for InvalidEntityId {}

impl TryFrom<u64> for EntityId {
    type Error = InvalidEntityId;

    fn try_from(raw: u64) -> Result<Self, Self::Error> {
        Self::new(raw).ok_or(InvalidEntityId)
    }
}

impl From<EntityId> for u64 {
    fn from(id: EntityId) -> Self {
        id.get()
    }
}

impl FromStr for EntityId {
    type Err = InvalidEntityId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw: u64 = s.trim().parse().map_err(|_| InvalidEntityId)?;
        Self::try_from(raw)
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_is_rejected() {
        assert!(EntityId::new(0).is_none());
        assert_eq!(EntityId::try_from(0u64), Err(InvalidEntityId));
        assert_eq!(EntityId::new(42).map(|id| id.get()), Some(42));
    }

    #[test]
    fn test_wire_roundtrip_of_none() {
        assert_eq!(EntityId::to_wire(None), 0);
        assert_eq!(EntityId::from_wire(0), None);
        let id = EntityId::new(7).unwrap();
        assert_eq!(EntityId::from_wire(EntityId::to_wire(Some(id))), Some(id));
    }

    #[test]
    fn test_parse() {
        assert_eq!("12".parse::<EntityId>().unwrap().get(), 12);
        assert!("0".parse::<EntityId>().is_err());
        assert!("abc".parse::<EntityId>().is_err());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_serde_rejects_zero() {
        let id: EntityId = serde_json::from_str("5").unwrap();
        assert_eq!(id.get(), 5);
        assert!(serde_json::from_str::<EntityId>("0").is_err());
    }
}
