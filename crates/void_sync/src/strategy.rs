//! Per-variant filtering strategies
//!
//! A strategy maps a [`PropertyValue`] to the flat channel vector the filters
//! work on and back. Rotations are never filtered as quaternion components:
//! they travel as a forward and an up direction (three channels each) and are
//! rebuilt with a look rotation.

use glam::{Mat3, Quat, Vec2, Vec3, Vec4};
use void_dispatch::{PropertyKey, PropertyValue, ValueKind};
use void_entity::Color;

use crate::error::{SyncError, SyncResult};

const DEGENERATE_EPSILON: f32 = 1e-6;

/// How one value kind is filtered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterStrategy {
    Float,
    /// One channel, rounded on output
    Int,
    Vec2,
    Vec3,
    Vec4,
    Color,
    /// Forward and up directions
    Rotation,
}

impl FilterStrategy {
    /// Strategy for `kind`, or `UnfilterableType`
    pub fn for_kind(key: PropertyKey, kind: ValueKind) -> SyncResult<Self> {
        Ok(match kind {
            ValueKind::Float => Self::Float,
            ValueKind::Int => Self::Int,
            ValueKind::Vec2 => Self::Vec2,
            ValueKind::Vec3 => Self::Vec3,
            ValueKind::Vec4 => Self::Vec4,
            ValueKind::Color => Self::Color,
            ValueKind::Rotation => Self::Rotation,
            ValueKind::Bool | ValueKind::Text | ValueKind::Entity | ValueKind::List => {
                return Err(SyncError::UnfilterableType { key, kind })
            }
        })
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Float => ValueKind::Float,
            Self::Int => ValueKind::Int,
            Self::Vec2 => ValueKind::Vec2,
            Self::Vec3 => ValueKind::Vec3,
            Self::Vec4 => ValueKind::Vec4,
            Self::Color => ValueKind::Color,
            Self::Rotation => ValueKind::Rotation,
        }
    }

    pub fn channels(&self) -> usize {
        match self {
            Self::Float | Self::Int => 1,
            Self::Vec2 => 2,
            Self::Vec3 => 3,
            Self::Vec4 | Self::Color => 4,
            Self::Rotation => 6,
        }
    }

    /// Flatten `value` into channels
    pub fn encode(&self, key: PropertyKey, value: &PropertyValue) -> SyncResult<Vec<f32>> {
        let channels = match (self, value) {
            (Self::Float, PropertyValue::Float(v)) => vec![*v],
            (Self::Int, PropertyValue::Int(v)) => vec![*v as f32],
            (Self::Vec2, PropertyValue::Vec2(v)) => v.to_array().to_vec(),
            (Self::Vec3, PropertyValue::Vec3(v)) => v.to_array().to_vec(),
            (Self::Vec4, PropertyValue::Vec4(v)) => v.to_array().to_vec(),
            (Self::Color, PropertyValue::Color(c)) => c.to_array().to_vec(),
            (Self::Rotation, PropertyValue::Rotation(q)) => {
                let (forward, up) = decompose(*q);
                let mut channels = forward.to_array().to_vec();
                channels.extend_from_slice(&up.to_array());
                channels
            }
            _ => {
                return Err(SyncError::KindMismatch {
                    key,
                    expected: self.kind(),
                    found: value.kind(),
                })
            }
        };
        Ok(channels)
    }

    /// Rebuild a value from channels. `previous` is held when a rotation
    /// basis is degenerate.
    pub fn decode(&self, channels: &[f32], previous: &PropertyValue) -> PropertyValue {
        let c = |i: usize| channels.get(i).copied().unwrap_or_default();
        match self {
            Self::Float => PropertyValue::Float(c(0)),
            Self::Int => PropertyValue::Int(c(0).round() as i64),
            Self::Vec2 => PropertyValue::Vec2(Vec2::new(c(0), c(1))),
            Self::Vec3 => PropertyValue::Vec3(Vec3::new(c(0), c(1), c(2))),
            Self::Vec4 => PropertyValue::Vec4(Vec4::new(c(0), c(1), c(2), c(3))),
            Self::Color => PropertyValue::Color(Color::rgba(c(0), c(1), c(2), c(3))),
            Self::Rotation => {
                let forward = Vec3::new(c(0), c(1), c(2));
                let up = Vec3::new(c(3), c(4), c(5));
                match look_rotation(forward, up) {
                    Some(q) => PropertyValue::Rotation(q),
                    None => previous.clone(),
                }
            }
        }
    }
}

/// Forward (+Z) and up (+Y) directions of a rotation
pub fn decompose(rotation: Quat) -> (Vec3, Vec3) {
    let rotation = rotation.normalize();
    (rotation * Vec3::Z, rotation * Vec3::Y)
}

/// Rotation whose +Z axis points along `forward` with +Y as close to `up` as
/// possible. `None` when the two directions do not span a basis.
pub fn look_rotation(forward: Vec3, up: Vec3) -> Option<Quat> {
    if forward.length_squared() < DEGENERATE_EPSILON {
        return None;
    }
    let forward = forward.normalize();
    let right = up.cross(forward);
    if right.length_squared() < DEGENERATE_EPSILON {
        return None;
    }
    let right = right.normalize();
    let up = forward.cross(right);
    Some(Quat::from_mat3(&Mat3::from_cols(right, up, forward)).normalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unfilterable_kinds() {
        for kind in [ValueKind::Bool, ValueKind::Text, ValueKind::Entity, ValueKind::List] {
            assert_eq!(
                FilterStrategy::for_kind(PropertyKey::ACTIVE, kind),
                Err(SyncError::UnfilterableType {
                    key: PropertyKey::ACTIVE,
                    kind
                })
            );
        }
        assert_eq!(
            FilterStrategy::for_kind(PropertyKey::POSITION, ValueKind::Vec3).unwrap().channels(),
            3
        );
    }

    #[test]
    fn test_rotation_decomposes_and_recomposes() {
        let q = Quat::from_euler(glam::EulerRot::YXZ, 0.7, -0.3, 0.2);
        let strategy = FilterStrategy::Rotation;
        let channels = strategy.encode(PropertyKey::ROTATION, &PropertyValue::Rotation(q)).unwrap();
        assert_eq!(channels.len(), 6);

        let back = strategy.decode(&channels, &PropertyValue::Rotation(Quat::IDENTITY));
        let back = back.as_rotation().unwrap();
        // q and -q are the same rotation
        assert!(back.dot(q).abs() > 0.9999);
    }

    #[test]
    fn test_degenerate_basis_holds_previous() {
        let previous = PropertyValue::Rotation(Quat::from_rotation_y(1.0));
        let strategy = FilterStrategy::Rotation;
        // forward parallel to up
        let channels = [0.0, 1.0, 0.0, 0.0, 1.0, 0.0];
        assert_eq!(strategy.decode(&channels, &previous), previous);
        // zero forward
        let channels = [0.0; 6];
        assert_eq!(strategy.decode(&channels, &previous), previous);
    }

    #[test]
    fn test_int_rounds() {
        let strategy = FilterStrategy::Int;
        assert_eq!(
            strategy.decode(&[2.6], &PropertyValue::Int(0)),
            PropertyValue::Int(3)
        );
        assert!(matches!(
            strategy.encode(PropertyKey::LIGHT_RANGE, &PropertyValue::Float(1.0)),
            Err(SyncError::KindMismatch { .. })
        ));
    }

    #[test]
    fn test_look_rotation_identity() {
        let q = look_rotation(Vec3::Z, Vec3::Y).unwrap();
        assert!(q.abs_diff_eq(Quat::IDENTITY, 1e-6));
    }
}
