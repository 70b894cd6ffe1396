//! Raw inbound operations and their payload codec
//!
//! The network delivers `(entity, key, operation, payload)` tuples. Payload
//! bytes are `bincode`-encoded and only make sense once the property's
//! [`PropertyType`] is known, which is why decoding goes through the read
//! chain. Layouts:
//!
//! | value              | bytes                                 |
//! |--------------------|---------------------------------------|
//! | bool / int / float | `bool` / `i64` / `f32`                |
//! | vec2..4, rotation  | `[f32; N]` (rotation as x, y, z, w)   |
//! | color              | `[f32; 4]` RGBA                       |
//! | text               | `String`                              |
//! | entity             | `u64`, 0 for none                     |
//! | list               | `u64` length, then the elements       |
//!
//! `AddAt` and `SetAt` carry a `u32` index followed by one element,
//! `RemoveAt` only the index, `ReplaceAll` a full list.

use bincode::Options;
use glam::{Quat, Vec2, Vec3, Vec4};
use serde::de::DeserializeOwned;
use void_core::EntityId;
use void_entity::Color;

use crate::delta::ListDelta;
use crate::error::{DispatchError, DispatchResult};
use crate::property::{PropertyKey, PropertyType, PropertyValue, ValueKind};

/// Operation carried by an inbound tuple
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OperationId {
    Set = 0,
    AddAt = 1,
    RemoveAt = 2,
    SetAt = 3,
    ReplaceAll = 4,
}

impl OperationId {
    pub fn is_list_edit(&self) -> bool {
        !matches!(self, Self::Set)
    }
}

impl TryFrom<u8> for OperationId {
    type Error = DispatchError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Set),
            1 => Ok(Self::AddAt),
            2 => Ok(Self::RemoveAt),
            3 => Ok(Self::SetAt),
            4 => Ok(Self::ReplaceAll),
            other => Err(DispatchError::UnknownOperation(other)),
        }
    }
}

/// Change requested for one property
#[derive(Clone, Debug, PartialEq)]
pub enum PropertyChange {
    Set(PropertyValue),
    List(ListDelta<PropertyValue>),
}

/// Decoded property update, the form every set-property path converges on
#[derive(Clone, Debug, PartialEq)]
pub struct PropertyUpdate {
    pub key: PropertyKey,
    pub change: PropertyChange,
}

impl PropertyUpdate {
    pub fn set(key: PropertyKey, value: impl Into<PropertyValue>) -> Self {
        Self {
            key,
            change: PropertyChange::Set(value.into()),
        }
    }

    pub fn list(key: PropertyKey, delta: ListDelta<PropertyValue>) -> Self {
        Self {
            key,
            change: PropertyChange::List(delta),
        }
    }

    /// The value of a `Set` change
    pub fn value(&self) -> Option<&PropertyValue> {
        match &self.change {
            PropertyChange::Set(value) => Some(value),
            PropertyChange::List(_) => None,
        }
    }
}

/// Property operation as delivered by the transport
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundOperation {
    pub entity: EntityId,
    pub key: PropertyKey,
    pub operation: OperationId,
    pub payload: Vec<u8>,
}

impl InboundOperation {
    pub fn new(entity: EntityId, key: PropertyKey, operation: OperationId, payload: Vec<u8>) -> Self {
        Self {
            entity,
            key,
            operation,
            payload,
        }
    }

    /// Encode a structured update into its wire form
    pub fn encode(entity: EntityId, update: &PropertyUpdate) -> DispatchResult<Self> {
        let key = update.key;
        let mut buf = Vec::new();
        let operation = match &update.change {
            PropertyChange::Set(value) => {
                write_value(&mut buf, value).map_err(|e| codec(key, e))?;
                OperationId::Set
            }
            PropertyChange::List(delta) => {
                match delta {
                    ListDelta::AddAt(index, value) | ListDelta::SetAt(index, value) => {
                        write_index(&mut buf, key, *index)?;
                        write_value(&mut buf, value).map_err(|e| codec(key, e))?;
                    }
                    ListDelta::RemoveAt(index) => write_index(&mut buf, key, *index)?,
                    ListDelta::ReplaceAll(values) => {
                        write_list(&mut buf, values).map_err(|e| codec(key, e))?
                    }
                }
                match delta {
                    ListDelta::AddAt(..) => OperationId::AddAt,
                    ListDelta::RemoveAt(_) => OperationId::RemoveAt,
                    ListDelta::SetAt(..) => OperationId::SetAt,
                    ListDelta::ReplaceAll(_) => OperationId::ReplaceAll,
                }
            }
        };
        Ok(Self::new(entity, key, operation, buf))
    }

    pub fn set(entity: EntityId, key: PropertyKey, value: impl Into<PropertyValue>) -> DispatchResult<Self> {
        Self::encode(entity, &PropertyUpdate::set(key, value))
    }

    pub fn list(
        entity: EntityId,
        key: PropertyKey,
        delta: ListDelta<PropertyValue>,
    ) -> DispatchResult<Self> {
        Self::encode(entity, &PropertyUpdate::list(key, delta))
    }
}

fn codec(key: PropertyKey, error: impl ToString) -> DispatchError {
    DispatchError::Codec {
        key,
        message: error.to_string(),
    }
}

fn write_index(buf: &mut Vec<u8>, key: PropertyKey, index: usize) -> DispatchResult<()> {
    let index = u32::try_from(index).map_err(|e| codec(key, e))?;
    bincode::serialize_into(buf, &index).map_err(|e| codec(key, e))
}

fn write_list(buf: &mut Vec<u8>, values: &[PropertyValue]) -> bincode::Result<()> {
    bincode::serialize_into(&mut *buf, &(values.len() as u64))?;
    for value in values {
        write_value(buf, value)?;
    }
    Ok(())
}

/// Append the wire encoding of `value`
pub fn write_value(buf: &mut Vec<u8>, value: &PropertyValue) -> bincode::Result<()> {
    match value {
        PropertyValue::Bool(v) => bincode::serialize_into(&mut *buf, v),
        PropertyValue::Int(v) => bincode::serialize_into(&mut *buf, v),
        PropertyValue::Float(v) => bincode::serialize_into(&mut *buf, v),
        PropertyValue::Vec2(v) => bincode::serialize_into(&mut *buf, &v.to_array()),
        PropertyValue::Vec3(v) => bincode::serialize_into(&mut *buf, &v.to_array()),
        PropertyValue::Vec4(v) => bincode::serialize_into(&mut *buf, &v.to_array()),
        PropertyValue::Rotation(v) => bincode::serialize_into(&mut *buf, &v.to_array()),
        PropertyValue::Color(v) => bincode::serialize_into(&mut *buf, &v.to_array()),
        PropertyValue::Text(v) => bincode::serialize_into(&mut *buf, v),
        PropertyValue::Entity(v) => bincode::serialize_into(&mut *buf, &EntityId::to_wire(*v)),
        PropertyValue::List(values) => write_list(buf, values),
    }
}

fn read<T: DeserializeOwned>(reader: &mut &[u8]) -> bincode::Result<T> {
    // Length prefixes may not claim more than what is left
    let limit = reader.len() as u64;
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .allow_trailing_bytes()
        .with_limit(limit)
        .deserialize_from(reader)
}

fn read_element(reader: &mut &[u8], kind: ValueKind) -> bincode::Result<PropertyValue> {
    Ok(match kind {
        ValueKind::Bool => PropertyValue::Bool(read(reader)?),
        ValueKind::Int => PropertyValue::Int(read(reader)?),
        ValueKind::Float => PropertyValue::Float(read(reader)?),
        ValueKind::Vec2 => PropertyValue::Vec2(Vec2::from_array(read(reader)?)),
        ValueKind::Vec3 => PropertyValue::Vec3(Vec3::from_array(read(reader)?)),
        ValueKind::Vec4 => PropertyValue::Vec4(Vec4::from_array(read(reader)?)),
        ValueKind::Rotation => PropertyValue::Rotation(Quat::from_array(read(reader)?)),
        ValueKind::Color => PropertyValue::Color(Color::from_array(read(reader)?)),
        ValueKind::Text => PropertyValue::Text(read(reader)?),
        ValueKind::Entity => PropertyValue::Entity(EntityId::from_wire(read(reader)?)),
        ValueKind::List => {
            return Err(Box::new(bincode::ErrorKind::Custom(
                "nested lists are not supported".to_string(),
            )))
        }
    })
}

fn read_list(reader: &mut &[u8], kind: ValueKind) -> bincode::Result<Vec<PropertyValue>> {
    let len: u64 = read(reader)?;
    // Every element takes at least one byte
    if len > reader.len() as u64 {
        return Err(Box::new(bincode::ErrorKind::Custom(format!(
            "list length {} exceeds payload",
            len
        ))));
    }
    (0..len).map(|_| read_element(reader, kind)).collect()
}

fn read_index(reader: &mut &[u8]) -> bincode::Result<usize> {
    let index: u32 = read(reader)?;
    Ok(index as usize)
}

/// Decode `payload` for a property of type `ty`
pub fn decode_change(
    key: PropertyKey,
    ty: PropertyType,
    operation: OperationId,
    payload: &[u8],
) -> DispatchResult<PropertyChange> {
    let mut reader = payload;
    let kind = ty.element();
    let change = match (ty, operation) {
        (PropertyType::Scalar(_), OperationId::Set) => {
            read_element(&mut reader, kind).map(PropertyChange::Set)
        }
        (PropertyType::List(_), OperationId::Set) => read_list(&mut reader, kind)
            .map(|values| PropertyChange::Set(PropertyValue::List(values))),
        (PropertyType::List(_), OperationId::AddAt) => read_index(&mut reader).and_then(|i| {
            read_element(&mut reader, kind).map(|v| PropertyChange::List(ListDelta::AddAt(i, v)))
        }),
        (PropertyType::List(_), OperationId::RemoveAt) => {
            read_index(&mut reader).map(|i| PropertyChange::List(ListDelta::RemoveAt(i)))
        }
        (PropertyType::List(_), OperationId::SetAt) => read_index(&mut reader).and_then(|i| {
            read_element(&mut reader, kind).map(|v| PropertyChange::List(ListDelta::SetAt(i, v)))
        }),
        (PropertyType::List(_), OperationId::ReplaceAll) => read_list(&mut reader, kind)
            .map(|values| PropertyChange::List(ListDelta::ReplaceAll(values))),
        (PropertyType::Scalar(_), op) => {
            return Err(codec(key, format!("{:?} on a scalar property", op)));
        }
    }
    .map_err(|e| codec(key, e))?;

    if !reader.is_empty() {
        log::warn!(
            "Property {}: {} trailing payload bytes ignored",
            key,
            reader.len()
        );
    }
    Ok(change)
}
