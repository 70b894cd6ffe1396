//! Property keys and values
//!
//! Keys form one dense `u16` namespace shared by every handler. The values
//! carried for a key are a closed set of shapes, tagged by [`ValueKind`].

use core::fmt;

use glam::{Quat, Vec2, Vec3, Vec4};
use void_core::EntityId;
use void_entity::Color;

/// Identifies a property across all entity kinds
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropertyKey(pub u16);

impl PropertyKey {
    // Node
    pub const POSITION: PropertyKey = PropertyKey(1);
    pub const ROTATION: PropertyKey = PropertyKey(2);
    pub const SCALE: PropertyKey = PropertyKey(3);
    pub const PARENT: PropertyKey = PropertyKey(4);
    pub const ACTIVE: PropertyKey = PropertyKey(5);
    pub const STATIC: PropertyKey = PropertyKey(6);

    // Rendering
    pub const MATERIAL_OVERRIDES: PropertyKey = PropertyKey(20);
    pub const COLOR: PropertyKey = PropertyKey(21);

    // Line
    pub const LINE_POSITIONS: PropertyKey = PropertyKey(30);
    pub const LINE_WIDTH: PropertyKey = PropertyKey(31);
    pub const LINE_LOOP: PropertyKey = PropertyKey(32);

    // Light
    pub const LIGHT_INTENSITY: PropertyKey = PropertyKey(40);
    pub const LIGHT_RANGE: PropertyKey = PropertyKey(41);

    // UI layout
    pub const UI_SIZE: PropertyKey = PropertyKey(50);
    pub const UI_ANCHOR_MIN: PropertyKey = PropertyKey(51);
    pub const UI_ANCHOR_MAX: PropertyKey = PropertyKey(52);
    pub const UI_PIVOT: PropertyKey = PropertyKey(53);

    // Group
    pub const GROUP_MEMBERS: PropertyKey = PropertyKey(60);

    // Audio
    pub const AUDIO_VOLUME: PropertyKey = PropertyKey(70);
    pub const AUDIO_LOOP: PropertyKey = PropertyKey(71);

    /// First key free for extension handlers
    pub const USER_START: PropertyKey = PropertyKey(1000);

    /// Name of a built-in key
    pub fn name(&self) -> Option<&'static str> {
        let name = match *self {
            Self::POSITION => "position",
            Self::ROTATION => "rotation",
            Self::SCALE => "scale",
            Self::PARENT => "parent",
            Self::ACTIVE => "active",
            Self::STATIC => "static",
            Self::MATERIAL_OVERRIDES => "material_overrides",
            Self::COLOR => "color",
            Self::LINE_POSITIONS => "line_positions",
            Self::LINE_WIDTH => "line_width",
            Self::LINE_LOOP => "line_loop",
            Self::LIGHT_INTENSITY => "light_intensity",
            Self::LIGHT_RANGE => "light_range",
            Self::UI_SIZE => "ui_size",
            Self::UI_ANCHOR_MIN => "ui_anchor_min",
            Self::UI_ANCHOR_MAX => "ui_anchor_max",
            Self::UI_PIVOT => "ui_pivot",
            Self::GROUP_MEMBERS => "group_members",
            Self::AUDIO_VOLUME => "audio_volume",
            Self::AUDIO_LOOP => "audio_loop",
            _ => return None,
        };
        Some(name)
    }

    pub fn is_user(&self) -> bool {
        *self >= Self::USER_START
    }
}

impl fmt::Debug for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "PropertyKey({})", name),
            None => write!(f, "PropertyKey({})", self.0),
        }
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "#{}", self.0),
        }
    }
}

/// Shape of a [`PropertyValue`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Bool,
    Int,
    Float,
    Vec2,
    Vec3,
    Vec4,
    Rotation,
    Color,
    Text,
    Entity,
    List,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Vec2 => "vec2",
            Self::Vec3 => "vec3",
            Self::Vec4 => "vec4",
            Self::Rotation => "rotation",
            Self::Color => "color",
            Self::Text => "text",
            Self::Entity => "entity",
            Self::List => "list",
        };
        f.write_str(name)
    }
}

/// Declared type of a property: one value, or an ordered list of values
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PropertyType {
    Scalar(ValueKind),
    List(ValueKind),
}

impl PropertyType {
    pub fn is_list(&self) -> bool {
        matches!(self, Self::List(_))
    }

    /// Kind of a single value, or of each list element
    pub fn element(&self) -> ValueKind {
        match *self {
            Self::Scalar(kind) | Self::List(kind) => kind,
        }
    }
}

/// A property value
#[derive(Clone, Debug, PartialEq)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    Float(f32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Rotation(Quat),
    Color(Color),
    Text(String),
    Entity(Option<EntityId>),
    List(Vec<PropertyValue>),
}

impl PropertyValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Bool(_) => ValueKind::Bool,
            Self::Int(_) => ValueKind::Int,
            Self::Float(_) => ValueKind::Float,
            Self::Vec2(_) => ValueKind::Vec2,
            Self::Vec3(_) => ValueKind::Vec3,
            Self::Vec4(_) => ValueKind::Vec4,
            Self::Rotation(_) => ValueKind::Rotation,
            Self::Color(_) => ValueKind::Color,
            Self::Text(_) => ValueKind::Text,
            Self::Entity(_) => ValueKind::Entity,
            Self::List(_) => ValueKind::List,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Float value; integers convert
    pub fn as_float(&self) -> Option<f32> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f32),
            _ => None,
        }
    }

    pub fn as_vec2(&self) -> Option<Vec2> {
        match self {
            Self::Vec2(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_vec3(&self) -> Option<Vec3> {
        match self {
            Self::Vec3(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_vec4(&self) -> Option<Vec4> {
        match self {
            Self::Vec4(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_rotation(&self) -> Option<Quat> {
        match self {
            Self::Rotation(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_color(&self) -> Option<Color> {
        match self {
            Self::Color(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Entity reference; the outer `None` means "not an entity value"
    pub fn as_entity(&self) -> Option<Option<EntityId>> {
        match self {
            Self::Entity(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[PropertyValue]> {
        match self {
            Self::List(v) => Some(v),
            _ => None,
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f32> for PropertyValue {
    fn from(v: f32) -> Self {
        Self::Float(v)
    }
}

impl From<Vec2> for PropertyValue {
    fn from(v: Vec2) -> Self {
        Self::Vec2(v)
    }
}

impl From<Vec3> for PropertyValue {
    fn from(v: Vec3) -> Self {
        Self::Vec3(v)
    }
}

impl From<Vec4> for PropertyValue {
    fn from(v: Vec4) -> Self {
        Self::Vec4(v)
    }
}

impl From<Quat> for PropertyValue {
    fn from(v: Quat) -> Self {
        Self::Rotation(v)
    }
}

impl From<Color> for PropertyValue {
    fn from(v: Color) -> Self {
        Self::Color(v)
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<EntityId> for PropertyValue {
    fn from(v: EntityId) -> Self {
        Self::Entity(Some(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_names() {
        assert_eq!(PropertyKey::POSITION.to_string(), "position");
        assert_eq!(PropertyKey(1234).to_string(), "#1234");
        assert!(PropertyKey(1234).is_user());
        assert!(!PropertyKey::GROUP_MEMBERS.is_user());
    }

    #[test]
    fn test_value_accessors() {
        let v = PropertyValue::from(Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(v.kind(), ValueKind::Vec3);
        assert_eq!(v.as_vec3(), Some(Vec3::new(1.0, 2.0, 3.0)));
        assert_eq!(v.as_vec2(), None);

        assert_eq!(PropertyValue::Int(3).as_float(), Some(3.0));
        assert_eq!(PropertyValue::Entity(None).as_entity(), Some(None));
        assert_eq!(PropertyValue::Bool(true).as_entity(), None);
    }
}
