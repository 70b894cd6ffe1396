//! Entity payloads - the declared kind and attributes of an entity
//!
//! Payloads arrive as JSON descriptors from the environment server. The set of
//! kinds is closed: every kind the loader understands is a variant of
//! [`EntityPayload`]. Kinds owned by third-party modules travel as
//! [`EntityPayload::Extension`] and are picked up by whichever dispatch node
//! registered for their `kind` string.

use glam::{Quat, Vec2, Vec3};
use serde::{Deserialize, Serialize};
use void_core::EntityId;

/// Linear RGBA color
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const WHITE: Color = Color::rgba(1.0, 1.0, 1.0, 1.0);
    pub const BLACK: Color = Color::rgba(0.0, 0.0, 0.0, 1.0);

    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }

    pub fn from_array(c: [f32; 4]) -> Self {
        Self::rgba(c[0], c[1], c[2], c[3])
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::WHITE
    }
}

fn default_scale() -> Vec3 {
    Vec3::ONE
}

fn default_rotation() -> Quat {
    Quat::IDENTITY
}

fn default_true() -> bool {
    true
}

fn default_one() -> f32 {
    1.0
}

/// Spatial attributes shared by every node-like kind
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    #[serde(default)]
    pub position: Vec3,
    #[serde(default = "default_rotation")]
    pub rotation: Quat,
    #[serde(default = "default_scale")]
    pub scale: Vec3,
    #[serde(default)]
    pub parent: Option<EntityId>,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default, rename = "static")]
    pub is_static: bool,
}

impl Default for NodeDescriptor {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            parent: None,
            active: true,
            is_static: false,
        }
    }
}

/// Reference to a binary resource
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRef {
    /// Absolute URL or library-relative path
    pub url: String,
    /// Format override; the URL extension is used when absent
    #[serde(default)]
    pub format: Option<String>,
    /// Named object to extract from a bundle
    #[serde(default)]
    pub sub_asset: Option<String>,
    /// Library the resource belongs to, if bundled
    #[serde(default)]
    pub library: Option<String>,
}

impl ResourceRef {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            format: None,
            sub_asset: None,
            library: None,
        }
    }

    /// Extension used to select a decoder
    pub fn extension(&self) -> Option<String> {
        if let Some(format) = &self.format {
            return Some(format.trim_start_matches('.').to_lowercase());
        }
        let path = self.url.split(['?', '#']).next().unwrap_or_default();
        let file = path.rsplit('/').next().unwrap_or_default();
        file.rsplit_once('.').map(|(_, ext)| ext.to_lowercase())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneDescriptor {
    #[serde(default)]
    pub node: NodeDescriptor,
    /// Libraries required before the scene content can load
    #[serde(default)]
    pub libraries: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GenericNodeDescriptor {
    #[serde(flatten)]
    pub node: NodeDescriptor,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    #[serde(default)]
    pub node: NodeDescriptor,
    pub resource: ResourceRef,
    /// Material entities replacing the model's own materials, in slot order
    #[serde(default)]
    pub material_overrides: Vec<EntityId>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LineDescriptor {
    #[serde(default)]
    pub node: NodeDescriptor,
    #[serde(default)]
    pub positions: Vec<Vec3>,
    #[serde(default = "default_one")]
    pub width: f32,
    #[serde(default)]
    pub color: Color,
    #[serde(default, rename = "loop")]
    pub looped: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LightType {
    #[default]
    Point,
    Spot,
    Directional,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LightDescriptor {
    #[serde(default)]
    pub node: NodeDescriptor,
    #[serde(default)]
    pub light_type: LightType,
    #[serde(default)]
    pub color: Color,
    #[serde(default = "default_one")]
    pub intensity: f32,
    #[serde(default = "default_one")]
    pub range: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UiRectDescriptor {
    #[serde(default)]
    pub node: NodeDescriptor,
    #[serde(default)]
    pub size: Vec2,
    #[serde(default)]
    pub anchor_min: Vec2,
    #[serde(default)]
    pub anchor_max: Vec2,
    #[serde(default)]
    pub pivot: Vec2,
    #[serde(default)]
    pub color: Color,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AudioDescriptor {
    pub resource: ResourceRef,
    #[serde(default = "default_one")]
    pub volume: f32,
    #[serde(default)]
    pub looping: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MaterialDescriptor {
    #[serde(default)]
    pub texture: Option<ResourceRef>,
    #[serde(default)]
    pub color: Color,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupDescriptor {
    #[serde(default)]
    pub members: Vec<EntityId>,
}

/// Payload of a kind registered outside this crate
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExtensionDescriptor {
    pub kind: String,
    #[serde(default)]
    pub data: Vec<u8>,
}

/// Tag of an [`EntityPayload`] variant
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Scene,
    Node,
    Model,
    Line,
    Light,
    UiRect,
    Audio,
    Material,
    Group,
    Extension,
}

impl EntityKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Scene => "scene",
            Self::Node => "node",
            Self::Model => "model",
            Self::Line => "line",
            Self::Light => "light",
            Self::UiRect => "ui_rect",
            Self::Audio => "audio",
            Self::Material => "material",
            Self::Group => "group",
            Self::Extension => "extension",
        }
    }
}

impl core::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// Declared kind and attributes of an entity
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EntityPayload {
    Scene(SceneDescriptor),
    Node(GenericNodeDescriptor),
    Model(ModelDescriptor),
    Line(LineDescriptor),
    Light(LightDescriptor),
    UiRect(UiRectDescriptor),
    Audio(AudioDescriptor),
    Material(MaterialDescriptor),
    Group(GroupDescriptor),
    Extension(ExtensionDescriptor),
}

impl EntityPayload {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Scene(_) => EntityKind::Scene,
            Self::Node(_) => EntityKind::Node,
            Self::Model(_) => EntityKind::Model,
            Self::Line(_) => EntityKind::Line,
            Self::Light(_) => EntityKind::Light,
            Self::UiRect(_) => EntityKind::UiRect,
            Self::Audio(_) => EntityKind::Audio,
            Self::Material(_) => EntityKind::Material,
            Self::Group(_) => EntityKind::Group,
            Self::Extension(_) => EntityKind::Extension,
        }
    }

    /// Spatial attributes, for kinds that are nodes
    pub fn node(&self) -> Option<&NodeDescriptor> {
        match self {
            Self::Scene(d) => Some(&d.node),
            Self::Node(d) => Some(&d.node),
            Self::Model(d) => Some(&d.node),
            Self::Line(d) => Some(&d.node),
            Self::Light(d) => Some(&d.node),
            Self::UiRect(d) => Some(&d.node),
            Self::Audio(_) | Self::Material(_) | Self::Group(_) | Self::Extension(_) => None,
        }
    }

    /// True for kinds that become a [`NodeData`](crate::entity::NodeData)
    pub fn is_spatial(&self) -> bool {
        self.node().is_some()
    }

    /// Binary resource the kind depends on, if any
    pub fn resource(&self) -> Option<&ResourceRef> {
        match self {
            Self::Model(d) => Some(&d.resource),
            Self::Audio(d) => Some(&d.resource),
            Self::Material(d) => d.texture.as_ref(),
            _ => None,
        }
    }

    /// Extension kind string, for extension payloads
    pub fn extension_kind(&self) -> Option<&str> {
        match self {
            Self::Extension(d) => Some(&d.kind),
            _ => None,
        }
    }
}

/// Typed access to one payload variant
pub trait PayloadDescriptor: Sized + 'static {
    const KIND: EntityKind;

    fn from_payload(payload: &EntityPayload) -> Option<&Self>;

    fn from_payload_mut(payload: &mut EntityPayload) -> Option<&mut Self>;
}

macro_rules! impl_descriptor {
    ($ty:ty, $variant:ident) => {
        impl PayloadDescriptor for $ty {
            const KIND: EntityKind = EntityKind::$variant;

            fn from_payload(payload: &EntityPayload) -> Option<&Self> {
                match payload {
                    EntityPayload::$variant(d) => Some(d),
                    _ => None,
                }
            }

            fn from_payload_mut(payload: &mut EntityPayload) -> Option<&mut Self> {
                match payload {
                    EntityPayload::$variant(d) => Some(d),
                    _ => None,
                }
            }
        }

        impl From<$ty> for EntityPayload {
            fn from(d: $ty) -> Self {
                EntityPayload::$variant(d)
            }
        }
    };
}

impl_descriptor!(SceneDescriptor, Scene);
impl_descriptor!(GenericNodeDescriptor, Node);
impl_descriptor!(ModelDescriptor, Model);
impl_descriptor!(LineDescriptor, Line);
impl_descriptor!(LightDescriptor, Light);
impl_descriptor!(UiRectDescriptor, UiRect);
impl_descriptor!(AudioDescriptor, Audio);
impl_descriptor!(MaterialDescriptor, Material);
impl_descriptor!(GroupDescriptor, Group);
impl_descriptor!(ExtensionDescriptor, Extension);

/// An entity as announced by the server: id plus payload
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntityDescriptor {
    pub id: EntityId,
    #[serde(flatten)]
    pub payload: EntityPayload,
}

impl EntityDescriptor {
    pub fn new(id: EntityId, payload: impl Into<EntityPayload>) -> Self {
        Self {
            id,
            payload: payload.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_from_json() {
        let json = r#"{
            "id": 12,
            "type": "model",
            "node": { "position": [1.0, 2.0, 3.0], "parent": 4 },
            "resource": { "url": "https://cdn.example.com/models/chair.GLB?v=3" }
        }"#;
        let descriptor: EntityDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(descriptor.id.get(), 12);
        assert_eq!(descriptor.payload.kind(), EntityKind::Model);

        let node = descriptor.payload.node().unwrap();
        assert_eq!(node.position, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(node.scale, Vec3::ONE);
        assert_eq!(node.parent.map(|p| p.get()), Some(4));
        assert!(node.active);

        let resource = descriptor.payload.resource().unwrap();
        assert_eq!(resource.extension().as_deref(), Some("glb"));
    }

    #[test]
    fn test_plain_node_flattens() {
        let json = r#"{ "id": 3, "type": "node", "position": [0.0, 1.0, 0.0], "static": true }"#;
        let descriptor: EntityDescriptor = serde_json::from_str(json).unwrap();
        let node = descriptor.payload.node().unwrap();
        assert_eq!(node.position.y, 1.0);
        assert!(node.is_static);
    }

    #[test]
    fn test_typed_access() {
        let payload = EntityPayload::from(GroupDescriptor::default());
        assert!(GroupDescriptor::from_payload(&payload).is_some());
        assert!(ModelDescriptor::from_payload(&payload).is_none());
        assert!(!payload.is_spatial());
    }

    #[test]
    fn test_format_override_wins() {
        let mut resource = ResourceRef::new("https://h/bundle");
        assert_eq!(resource.extension(), None);
        resource.format = Some(".Bundle".into());
        assert_eq!(resource.extension().as_deref(), Some("bundle"));
    }
}
