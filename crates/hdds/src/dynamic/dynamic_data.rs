// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! `DynamicData`: a value bound to a `DynamicType`.
//!
//! Per the §9 design note, storage is always the polymorphic representation
//! keyed by `MemberId`, never a compile-time switch between "checked" and
//! "packed" layouts: a value holds either a tagged primitive cell or a
//! `MemberId -> child` map, never both.

use std::collections::{BTreeMap, HashSet};

use super::dynamic_type::DynamicType;
use super::ids::MemberId;
use crate::dynamic::ids::TypeKind;
use crate::error::ReturnCode;

/// A single scalar leaf value.
#[derive(Debug, Clone, PartialEq)]
pub enum PrimitiveValue {
    Boolean(bool),
    Byte(u8),
    Int16(i16),
    Uint16(u16),
    Int32(i32),
    Uint32(u32),
    Int64(i64),
    Uint64(u64),
    Float32(f32),
    Float64(f64),
    /// Raw 16-byte storage; this crate doesn't model `long double` math, it
    /// only round-trips the bytes (same stance as the teacher's
    /// `LONG_DOUBLE_SIZE`/`LONG_DOUBLE_ALIGN` constants).
    Float128([u8; 16]),
    Char8(u8),
    /// `char16` is 4 bytes wide on the wire; stored as the code point.
    Char16(u32),
    String8(String),
    String16(String),
    /// ENUM: the active literal's 32-bit value.
    EnumValue(i32),
    /// BITMASK: the full storage word, regardless of declared width.
    BitmaskValue(u64),
}

impl PrimitiveValue {
    fn default_for(kind: TypeKind) -> Option<PrimitiveValue> {
        Some(match kind {
            TypeKind::Boolean => PrimitiveValue::Boolean(false),
            TypeKind::Byte => PrimitiveValue::Byte(0),
            TypeKind::Int16 => PrimitiveValue::Int16(0),
            TypeKind::Uint16 => PrimitiveValue::Uint16(0),
            TypeKind::Int32 => PrimitiveValue::Int32(0),
            TypeKind::Uint32 => PrimitiveValue::Uint32(0),
            TypeKind::Int64 => PrimitiveValue::Int64(0),
            TypeKind::Uint64 => PrimitiveValue::Uint64(0),
            TypeKind::Float32 => PrimitiveValue::Float32(0.0),
            TypeKind::Float64 => PrimitiveValue::Float64(0.0),
            TypeKind::Float128 => PrimitiveValue::Float128([0; 16]),
            TypeKind::Char8 => PrimitiveValue::Char8(0),
            TypeKind::Char16 => PrimitiveValue::Char16(0),
            TypeKind::String8 => PrimitiveValue::String8(String::new()),
            TypeKind::String16 => PrimitiveValue::String16(String::new()),
            TypeKind::Bitmask => PrimitiveValue::BitmaskValue(0),
            _ => return None,
        })
    }

    /// NaN-equals-itself for deterministic value comparison.
    fn value_equals(&self, other: &PrimitiveValue) -> bool {
        match (self, other) {
            (PrimitiveValue::Float32(a), PrimitiveValue::Float32(b)) => a.to_bits() == b.to_bits() || a == b,
            (PrimitiveValue::Float64(a), PrimitiveValue::Float64(b)) => a.to_bits() == b.to_bits() || a == b,
            _ => self == other,
        }
    }
}

#[derive(Debug, Clone)]
enum ValueStorage {
    Primitive(PrimitiveValue),
    Children(BTreeMap<MemberId, Box<DynamicData>>),
}

/// A value bound to a `DynamicType`. Created exclusively by
/// `DynamicDataFactory`, destroyed by it.
#[derive(Debug, Clone)]
pub struct DynamicData {
    data_type: DynamicType,
    storage: ValueStorage,
    loaned_members: HashSet<MemberId>,
    key_element: bool,
    default_array_value: Option<Box<DynamicData>>,
    union_id: MemberId,
    pub(crate) deleted: bool,
}

impl DynamicData {
    /// Default construction rules (§4.5): ALIAS binds to the underlying
    /// type, ENUM initializes to its first literal, ARRAY additionally
    /// allocates a `default_array_value` prototype, STRUCTURE/BITSET with a
    /// base recursively materializes inherited members too, everything else
    /// gets a primitive slot or an empty child map.
    #[must_use]
    pub fn create(data_type: DynamicType) -> DynamicData {
        let kind = data_type.kind();
        match kind {
            TypeKind::Alias => {
                let base = data_type.base_type().expect("alias always has a base type");
                DynamicData::create(base)
            }
            TypeKind::Enum => {
                let value = data_type
                    .descriptor()
                    .members
                    .first()
                    .and_then(|m| m.default_value_literal.as_deref())
                    .and_then(|v| v.parse::<i32>().ok())
                    .unwrap_or(0);
                DynamicData {
                    data_type,
                    storage: ValueStorage::Primitive(PrimitiveValue::EnumValue(value)),
                    loaned_members: HashSet::new(),
                    key_element: false,
                    default_array_value: None,
                    union_id: MemberId::INVALID,
                    deleted: false,
                }
            }
            TypeKind::Array => {
                let element = data_type.element_type().expect("array always has an element type");
                let prototype = Box::new(DynamicData::create(element));
                DynamicData {
                    data_type,
                    storage: ValueStorage::Children(BTreeMap::new()),
                    loaned_members: HashSet::new(),
                    key_element: false,
                    default_array_value: Some(prototype),
                    union_id: MemberId::INVALID,
                    deleted: false,
                }
            }
            TypeKind::Structure | TypeKind::Bitset => {
                let mut children = BTreeMap::new();
                for member in data_type.all_members_ordered() {
                    let member_type = data_type.resolve(member.member_type);
                    children.insert(member.id, Box::new(DynamicData::create(member_type)));
                }
                DynamicData {
                    data_type,
                    storage: ValueStorage::Children(children),
                    loaned_members: HashSet::new(),
                    key_element: false,
                    default_array_value: None,
                    union_id: MemberId::INVALID,
                    deleted: false,
                }
            }
            TypeKind::Union => DynamicData {
                data_type,
                storage: ValueStorage::Children(BTreeMap::new()),
                loaned_members: HashSet::new(),
                key_element: false,
                default_array_value: None,
                union_id: MemberId::INVALID,
                deleted: false,
            },
            TypeKind::Sequence | TypeKind::Map => DynamicData {
                data_type,
                storage: ValueStorage::Children(BTreeMap::new()),
                loaned_members: HashSet::new(),
                key_element: false,
                default_array_value: None,
                union_id: MemberId::INVALID,
                deleted: false,
            },
            _ => {
                let value = PrimitiveValue::default_for(kind).unwrap_or(PrimitiveValue::Int32(0));
                DynamicData {
                    data_type,
                    storage: ValueStorage::Primitive(value),
                    loaned_members: HashSet::new(),
                    key_element: false,
                    default_array_value: None,
                    union_id: MemberId::INVALID,
                    deleted: false,
                }
            }
        }
    }

    #[must_use]
    pub fn data_type(&self) -> &DynamicType {
        &self.data_type
    }

    #[must_use]
    pub fn default_array_value(&self) -> Option<&DynamicData> {
        self.default_array_value.as_deref()
    }

    #[must_use]
    pub fn is_key_element(&self) -> bool {
        self.key_element
    }

    pub(crate) fn set_key_element(&mut self, value: bool) {
        self.key_element = value;
    }

    fn children(&self) -> Result<&BTreeMap<MemberId, Box<DynamicData>>, ReturnCode> {
        match &self.storage {
            ValueStorage::Children(c) => Ok(c),
            ValueStorage::Primitive(_) => Err(ReturnCode::BadParameter),
        }
    }

    fn children_mut(&mut self) -> Result<&mut BTreeMap<MemberId, Box<DynamicData>>, ReturnCode> {
        match &mut self.storage {
            ValueStorage::Children(c) => Ok(c),
            ValueStorage::Primitive(_) => Err(ReturnCode::BadParameter),
        }
    }

    pub(crate) fn child(&self, id: MemberId) -> Result<&DynamicData, ReturnCode> {
        self.children()?.get(&id).map(|b| b.as_ref()).ok_or(ReturnCode::BadParameter)
    }

    pub(crate) fn child_mut(&mut self, id: MemberId) -> Result<&mut DynamicData, ReturnCode> {
        if self.loaned_members.contains(&id) {
            return Err(ReturnCode::PreconditionNotMet);
        }
        self.children_mut()?.get_mut(&id).map(|b| b.as_mut()).ok_or(ReturnCode::BadParameter)
    }

    /// Iterate present children in `MemberId` order. Empty for primitive
    /// slots.
    pub fn children_iter(&self) -> impl Iterator<Item = (MemberId, &DynamicData)> {
        match &self.storage {
            ValueStorage::Children(c) => c.iter().map(|(id, v)| (*id, v.as_ref())).collect::<Vec<_>>(),
            ValueStorage::Primitive(_) => Vec::new(),
        }
        .into_iter()
    }

    // ---------------------------------------------------------------
    // Scalar accessors
    // ---------------------------------------------------------------

    fn union_label_for(&self, value: i64) -> Result<MemberId, ReturnCode> {
        let id = self.data_type.get_id_from_label(value);
        if !id.is_valid() {
            return Err(ReturnCode::BadParameter);
        }
        Ok(id)
    }
}

macro_rules! scalar_accessor {
    ($get:ident, $set:ident, $variant:ident, $ty:ty) => {
        impl DynamicData {
            pub fn $get(&self, id: MemberId) -> Result<$ty, ReturnCode> {
                if id == MemberId::INVALID {
                    match &self.storage {
                        ValueStorage::Primitive(PrimitiveValue::$variant(v)) => Ok(*v),
                        _ => Err(ReturnCode::BadParameter),
                    }
                } else if self.data_type.kind() == TypeKind::Bitmask {
                    Err(ReturnCode::BadParameter)
                } else {
                    self.child(id)?.$get(MemberId::INVALID)
                }
            }

            pub fn $set(&mut self, id: MemberId, value: $ty) -> Result<(), ReturnCode> {
                if id == MemberId::INVALID {
                    if self.data_type.kind() == TypeKind::Union {
                        let branch = self.union_label_for(value as i64)?;
                        return self.set_discriminator_value(branch);
                    }
                    match &mut self.storage {
                        ValueStorage::Primitive(PrimitiveValue::$variant(v)) => {
                            *v = value;
                            Ok(())
                        }
                        _ => Err(ReturnCode::BadParameter),
                    }
                } else {
                    self.child_mut(id)?.$set(MemberId::INVALID, value)
                }
            }
        }
    };
}

scalar_accessor!(get_boolean_value, set_boolean_value, Boolean, bool);
scalar_accessor!(get_int16_value, set_int16_value, Int16, i16);
scalar_accessor!(get_uint16_value, set_uint16_value, Uint16, u16);
scalar_accessor!(get_int32_value, set_int32_value, Int32, i32);
scalar_accessor!(get_uint32_value, set_uint32_value, Uint32, u32);
scalar_accessor!(get_int64_value, set_int64_value, Int64, i64);
scalar_accessor!(get_uint64_value, set_uint64_value, Uint64, u64);
scalar_accessor!(get_float32_value, set_float32_value, Float32, f32);
scalar_accessor!(get_float64_value, set_float64_value, Float64, f64);

impl DynamicData {
    pub fn get_byte_value(&self, id: MemberId) -> Result<u8, ReturnCode> {
        if id == MemberId::INVALID {
            match &self.storage {
                ValueStorage::Primitive(PrimitiveValue::Byte(v)) => Ok(*v),
                _ => Err(ReturnCode::BadParameter),
            }
        } else {
            self.child(id)?.get_byte_value(MemberId::INVALID)
        }
    }

    pub fn set_byte_value(&mut self, id: MemberId, value: u8) -> Result<(), ReturnCode> {
        if id == MemberId::INVALID {
            match &mut self.storage {
                ValueStorage::Primitive(PrimitiveValue::Byte(v)) => {
                    *v = value;
                    Ok(())
                }
                _ => Err(ReturnCode::BadParameter),
            }
        } else {
            self.child_mut(id)?.set_byte_value(MemberId::INVALID, value)
        }
    }

    /// `int8` aliases the `byte` slot via a sign cast.
    pub fn get_int8_value(&self, id: MemberId) -> Result<i8, ReturnCode> {
        self.get_byte_value(id).map(|v| v as i8)
    }

    pub fn set_int8_value(&mut self, id: MemberId, value: i8) -> Result<(), ReturnCode> {
        self.set_byte_value(id, value as u8)
    }

    /// `uint8` aliases the `byte` slot directly.
    pub fn get_uint8_value(&self, id: MemberId) -> Result<u8, ReturnCode> {
        self.get_byte_value(id)
    }

    pub fn set_uint8_value(&mut self, id: MemberId, value: u8) -> Result<(), ReturnCode> {
        self.set_byte_value(id, value)
    }

    pub fn get_char8_value(&self, id: MemberId) -> Result<u8, ReturnCode> {
        if id == MemberId::INVALID {
            match &self.storage {
                ValueStorage::Primitive(PrimitiveValue::Char8(v)) => Ok(*v),
                _ => Err(ReturnCode::BadParameter),
            }
        } else {
            self.child(id)?.get_char8_value(MemberId::INVALID)
        }
    }

    pub fn set_char8_value(&mut self, id: MemberId, value: u8) -> Result<(), ReturnCode> {
        if id == MemberId::INVALID {
            match &mut self.storage {
                ValueStorage::Primitive(PrimitiveValue::Char8(v)) => {
                    *v = value;
                    Ok(())
                }
                _ => Err(ReturnCode::BadParameter),
            }
        } else {
            self.child_mut(id)?.set_char8_value(MemberId::INVALID, value)
        }
    }

    pub fn get_char16_value(&self, id: MemberId) -> Result<u32, ReturnCode> {
        if id == MemberId::INVALID {
            match &self.storage {
                ValueStorage::Primitive(PrimitiveValue::Char16(v)) => Ok(*v),
                _ => Err(ReturnCode::BadParameter),
            }
        } else {
            self.child(id)?.get_char16_value(MemberId::INVALID)
        }
    }

    pub fn set_char16_value(&mut self, id: MemberId, value: u32) -> Result<(), ReturnCode> {
        if id == MemberId::INVALID {
            match &mut self.storage {
                ValueStorage::Primitive(PrimitiveValue::Char16(v)) => {
                    *v = value;
                    Ok(())
                }
                _ => Err(ReturnCode::BadParameter),
            }
        } else {
            self.child_mut(id)?.set_char16_value(MemberId::INVALID, value)
        }
    }

    pub fn get_string_value(&self, id: MemberId) -> Result<String, ReturnCode> {
        if id == MemberId::INVALID {
            match &self.storage {
                ValueStorage::Primitive(PrimitiveValue::String8(v)) => Ok(v.clone()),
                _ => Err(ReturnCode::BadParameter),
            }
        } else {
            self.child(id)?.get_string_value(MemberId::INVALID)
        }
    }

    pub fn set_string_value(&mut self, id: MemberId, value: impl Into<String>) -> Result<(), ReturnCode> {
        if id == MemberId::INVALID {
            match &mut self.storage {
                ValueStorage::Primitive(PrimitiveValue::String8(v)) => {
                    *v = value.into();
                    Ok(())
                }
                _ => Err(ReturnCode::BadParameter),
            }
        } else {
            self.child_mut(id)?.set_string_value(MemberId::INVALID, value)
        }
    }

    pub fn get_wstring_value(&self, id: MemberId) -> Result<String, ReturnCode> {
        if id == MemberId::INVALID {
            match &self.storage {
                ValueStorage::Primitive(PrimitiveValue::String16(v)) => Ok(v.clone()),
                _ => Err(ReturnCode::BadParameter),
            }
        } else {
            self.child(id)?.get_wstring_value(MemberId::INVALID)
        }
    }

    pub fn set_wstring_value(&mut self, id: MemberId, value: impl Into<String>) -> Result<(), ReturnCode> {
        if id == MemberId::INVALID {
            match &mut self.storage {
                ValueStorage::Primitive(PrimitiveValue::String16(v)) => {
                    *v = value.into();
                    Ok(())
                }
                _ => Err(ReturnCode::BadParameter),
            }
        } else {
            self.child_mut(id)?.set_wstring_value(MemberId::INVALID, value)
        }
    }

    /// Readable as `uint32` regardless of accessor used, per §4.6.
    pub fn get_enum_value(&self, id: MemberId) -> Result<u32, ReturnCode> {
        if id == MemberId::INVALID {
            match &self.storage {
                ValueStorage::Primitive(PrimitiveValue::EnumValue(v)) => Ok(*v as u32),
                _ => Err(ReturnCode::BadParameter),
            }
        } else {
            self.child(id)?.get_enum_value(MemberId::INVALID)
        }
    }

    pub fn set_enum_value(&mut self, id: MemberId, value: u32) -> Result<(), ReturnCode> {
        if id == MemberId::INVALID {
            match &mut self.storage {
                ValueStorage::Primitive(PrimitiveValue::EnumValue(v)) => {
                    *v = value as i32;
                    Ok(())
                }
                _ => Err(ReturnCode::BadParameter),
            }
        } else {
            self.child_mut(id)?.set_enum_value(MemberId::INVALID, value)
        }
    }

    /// Readable as the literal's name string.
    pub fn get_enum_literal_name(&self, id: MemberId) -> Result<String, ReturnCode> {
        if id != MemberId::INVALID {
            return self.child(id)?.get_enum_literal_name(MemberId::INVALID);
        }
        let value = self.get_enum_value(MemberId::INVALID)? as i32;
        let descriptor = self.data_type.descriptor();
        descriptor
            .members
            .iter()
            .find(|m| m.default_value_literal.as_deref() == Some(value.to_string().as_str()))
            .map(|m| m.name.clone())
            .ok_or(ReturnCode::BadParameter)
    }

    /// Writing an unknown literal name returns `BAD_PARAMETER`.
    pub fn set_enum_literal_name(&mut self, id: MemberId, name: &str) -> Result<(), ReturnCode> {
        if id != MemberId::INVALID {
            return self.child_mut(id)?.set_enum_literal_name(MemberId::INVALID, name);
        }
        let descriptor = self.data_type.descriptor();
        let value = descriptor
            .members
            .iter()
            .find(|m| m.name == name)
            .and_then(|m| m.default_value_literal.as_deref())
            .and_then(|v| v.parse::<i32>().ok())
            .ok_or(ReturnCode::BadParameter)?;
        self.set_enum_value(MemberId::INVALID, value as u32)
    }

    /// Readable as a single `uint64` regardless of storage width.
    pub fn get_bitmask_value(&self, id: MemberId) -> Result<u64, ReturnCode> {
        if id == MemberId::INVALID {
            match &self.storage {
                ValueStorage::Primitive(PrimitiveValue::BitmaskValue(v)) => Ok(*v),
                _ => Err(ReturnCode::BadParameter),
            }
        } else {
            self.child(id)?.get_bitmask_value(MemberId::INVALID)
        }
    }

    pub fn set_bitmask_value(&mut self, id: MemberId, value: u64) -> Result<(), ReturnCode> {
        if id == MemberId::INVALID {
            match &mut self.storage {
                ValueStorage::Primitive(PrimitiveValue::BitmaskValue(v)) => {
                    *v = value;
                    Ok(())
                }
                _ => Err(ReturnCode::BadParameter),
            }
        } else {
            self.child_mut(id)?.set_bitmask_value(MemberId::INVALID, value)
        }
    }
}

impl DynamicData {
    pub fn get_float128_value(&self, id: MemberId) -> Result<[u8; 16], ReturnCode> {
        if id == MemberId::INVALID {
            match &self.storage {
                ValueStorage::Primitive(PrimitiveValue::Float128(v)) => Ok(*v),
                _ => Err(ReturnCode::BadParameter),
            }
        } else {
            self.child(id)?.get_float128_value(MemberId::INVALID)
        }
    }

    pub fn set_float128_value(&mut self, id: MemberId, value: [u8; 16]) -> Result<(), ReturnCode> {
        if id == MemberId::INVALID {
            match &mut self.storage {
                ValueStorage::Primitive(PrimitiveValue::Float128(v)) => {
                    *v = value;
                    Ok(())
                }
                _ => Err(ReturnCode::BadParameter),
            }
        } else {
            self.child_mut(id)?.set_float128_value(MemberId::INVALID, value)
        }
    }

    /// Materializes (or overwrites) one ARRAY element. Indices not set this
    /// way read back as `default_array_value` (elision).
    pub(crate) fn set_array_element(&mut self, id: MemberId, value: DynamicData) -> Result<(), ReturnCode> {
        if self.data_type.kind() != TypeKind::Array {
            return Err(ReturnCode::BadParameter);
        }
        self.children_mut()?.insert(id, Box::new(value));
        Ok(())
    }
}

// Re-route the `boolean` accessor to BITMASK flag access when addressing a
// named flag by its bit position (`id != INVALID` on a BITMASK value).
impl DynamicData {
    pub fn get_flag(&self, flag_id: MemberId) -> Result<bool, ReturnCode> {
        if self.data_type.kind() != TypeKind::Bitmask {
            return Err(ReturnCode::BadParameter);
        }
        let bits = self.get_bitmask_value(MemberId::INVALID)?;
        Ok((bits >> flag_id.0) & 1 != 0)
    }

    pub fn set_flag(&mut self, flag_id: MemberId, value: bool) -> Result<(), ReturnCode> {
        if self.data_type.kind() != TypeKind::Bitmask {
            return Err(ReturnCode::BadParameter);
        }
        let mut bits = self.get_bitmask_value(MemberId::INVALID)?;
        if value {
            bits |= 1 << flag_id.0;
        } else {
            bits &= !(1 << flag_id.0);
        }
        self.set_bitmask_value(MemberId::INVALID, bits)
    }
}

// ---------------------------------------------------------------
// Collection mutations
// ---------------------------------------------------------------

impl DynamicData {
    /// Appends an element of the element type; the produced id equals the
    /// new index.
    pub fn insert_sequence_data(&mut self) -> Result<MemberId, ReturnCode> {
        if self.data_type.kind() != TypeKind::Sequence {
            return Err(ReturnCode::BadParameter);
        }
        let bound = self.data_type.descriptor().bounds.first().copied().unwrap_or(0);
        let element_type = self.data_type.element_type().expect("sequence always has an element type");
        let len = self.children()?.len() as u32;
        if bound != 0 && len >= bound {
            return Err(ReturnCode::OutOfResources);
        }
        let id = MemberId(len);
        self.children_mut()?.insert(id, Box::new(DynamicData::create(element_type)));
        Ok(id)
    }

    pub fn remove_sequence_data(&mut self, id: MemberId) -> Result<(), ReturnCode> {
        if self.data_type.kind() != TypeKind::Sequence {
            return Err(ReturnCode::BadParameter);
        }
        let children = self.children_mut()?;
        if children.remove(&id).is_none() {
            return Err(ReturnCode::BadParameter);
        }
        let rest: Vec<_> = children.split_off(&id).into_values().collect();
        for (offset, value) in rest.into_iter().enumerate() {
            children.insert(MemberId(id.0 + offset as u32), value);
        }
        Ok(())
    }

    /// Appends a (key, value) pair; rejects duplicate keys (compared via
    /// value equality).
    pub fn insert_map_data(&mut self, key: DynamicData, value: Option<DynamicData>) -> Result<(MemberId, MemberId), ReturnCode> {
        if self.data_type.kind() != TypeKind::Map {
            return Err(ReturnCode::BadParameter);
        }
        let bound = self.data_type.descriptor().bounds.first().copied().unwrap_or(0);
        let value_type = self.data_type.element_type().expect("map always has a value type");
        let pair_count = (self.children()?.len() / 2) as u32;
        if bound != 0 && pair_count >= bound {
            return Err(ReturnCode::OutOfResources);
        }
        for existing_key in self.children()?.values().step_by(2).take(pair_count as usize) {
            if existing_key.equals(&key) {
                return Err(ReturnCode::BadParameter);
            }
        }
        let value = value.unwrap_or_else(|| DynamicData::create(value_type));
        let key_id = MemberId(pair_count * 2);
        let value_id = MemberId(pair_count * 2 + 1);
        let mut key = key;
        key.set_key_element(true);
        let children = self.children_mut()?;
        children.insert(key_id, Box::new(key));
        children.insert(value_id, Box::new(value));
        Ok((key_id, value_id))
    }

    pub fn remove_map_data(&mut self, key_id: MemberId) -> Result<(), ReturnCode> {
        if self.data_type.kind() != TypeKind::Map {
            return Err(ReturnCode::BadParameter);
        }
        let children = self.children_mut()?;
        if !children.contains_key(&key_id) {
            return Err(ReturnCode::BadParameter);
        }
        let value_id = MemberId(key_id.0 + 1);
        children.remove(&key_id);
        children.remove(&value_id);
        let rest: Vec<_> = children.split_off(&value_id).into_values().collect();
        for (offset, value) in rest.into_iter().enumerate() {
            children.insert(MemberId(key_id.0 + offset as u32), value);
        }
        Ok(())
    }

    /// Resets one array element to `default_array_value` (i.e. elides it).
    pub fn clear_array_data(&mut self, index_id: MemberId) -> Result<(), ReturnCode> {
        if self.data_type.kind() != TypeKind::Array {
            return Err(ReturnCode::BadParameter);
        }
        self.children_mut()?.remove(&index_id);
        Ok(())
    }

    /// Resets to the member's declared `default_value_literal` when present,
    /// otherwise to the type's zero-value default (§4.5's creation rules
    /// only special-case ENUM; this is the one other place a literal is
    /// honored, per §4.6's "reset targeted members to defaults").
    pub fn clear_value(&mut self, id: MemberId) -> Result<(), ReturnCode> {
        let member = self.data_type.get_member(id).ok_or(ReturnCode::BadParameter)?;
        let member_type = self.data_type.resolve(member.member_type);
        let mut default = DynamicData::create(member_type);
        if let Some(literal) = member.default_value_literal.as_deref() {
            default.apply_default_literal(literal);
        }
        let child = self.child_mut(id)?;
        *child = default;
        Ok(())
    }

    /// Best-effort literal parse into this value's primitive slot; a literal
    /// that doesn't parse for the slot's kind leaves the zero-value default
    /// in place rather than failing `clear_value`.
    fn apply_default_literal(&mut self, literal: &str) {
        let kind = self.data_type.kind();
        let _ = (|| -> Result<(), ReturnCode> {
            match kind {
                TypeKind::Boolean => self.set_boolean_value(MemberId::INVALID, literal == "true"),
                TypeKind::Byte => self.set_byte_value(MemberId::INVALID, parse(literal)?),
                TypeKind::Char8 => self.set_char8_value(MemberId::INVALID, literal.bytes().next().unwrap_or(0)),
                TypeKind::Char16 => {
                    self.set_char16_value(MemberId::INVALID, literal.chars().next().map_or(0, |c| c as u32))
                }
                TypeKind::Int16 => self.set_int16_value(MemberId::INVALID, parse(literal)?),
                TypeKind::Uint16 => self.set_uint16_value(MemberId::INVALID, parse(literal)?),
                TypeKind::Int32 => self.set_int32_value(MemberId::INVALID, parse(literal)?),
                TypeKind::Uint32 => self.set_uint32_value(MemberId::INVALID, parse(literal)?),
                TypeKind::Int64 => self.set_int64_value(MemberId::INVALID, parse(literal)?),
                TypeKind::Uint64 => self.set_uint64_value(MemberId::INVALID, parse(literal)?),
                TypeKind::Float32 => self.set_float32_value(MemberId::INVALID, parse(literal)?),
                TypeKind::Float64 => self.set_float64_value(MemberId::INVALID, parse(literal)?),
                TypeKind::String8 => self.set_string_value(MemberId::INVALID, literal),
                TypeKind::String16 => self.set_wstring_value(MemberId::INVALID, literal),
                TypeKind::Bitmask => self.set_bitmask_value(MemberId::INVALID, parse(literal)?),
                _ => Ok(()),
            }
        })();

        fn parse<T: std::str::FromStr>(literal: &str) -> Result<T, ReturnCode> {
            literal.parse().map_err(|_| ReturnCode::BadParameter)
        }
    }

    pub fn clear_all_values(&mut self) -> Result<(), ReturnCode> {
        let ids: Vec<MemberId> = self.children()?.keys().copied().collect();
        for id in ids {
            self.clear_value(id)?;
        }
        Ok(())
    }

    /// Preserves children whose declaring member is `@key`-annotated.
    pub fn clear_nonkey_values(&mut self) -> Result<(), ReturnCode> {
        let descriptor = self.data_type.descriptor();
        let ids: Vec<MemberId> = self
            .children()?
            .keys()
            .copied()
            .filter(|id| !descriptor.member_by_id(*id).is_some_and(|m| m.annotations.is_key()))
            .collect();
        for id in ids {
            self.clear_value(id)?;
        }
        Ok(())
    }

    // ---------------------------------------------------------------
    // Loans
    // ---------------------------------------------------------------

    /// Temporarily removes a child for exclusive access by the caller;
    /// `return_loaned_value` must bring it back. Refuses an overlapping
    /// loan of the same id.
    pub fn loan_value(&mut self, id: MemberId) -> Result<Box<DynamicData>, ReturnCode> {
        if self.loaned_members.contains(&id) {
            return Err(ReturnCode::PreconditionNotMet);
        }
        let child = self.children_mut()?.remove(&id).ok_or(ReturnCode::BadParameter)?;
        self.loaned_members.insert(id);
        Ok(child)
    }

    /// Returns a value previously obtained from `loan_value(id)`.
    /// `PRECONDITION_NOT_MET` if `id` wasn't on loan.
    pub fn return_loaned_value(&mut self, id: MemberId, value: Box<DynamicData>) -> Result<(), ReturnCode> {
        if !self.loaned_members.remove(&id) {
            return Err(ReturnCode::PreconditionNotMet);
        }
        self.children_mut()?.insert(id, value);
        Ok(())
    }

    #[must_use]
    pub fn has_outstanding_loans(&self) -> bool {
        !self.loaned_members.is_empty()
    }

    // ---------------------------------------------------------------
    // Union coherence
    // ---------------------------------------------------------------

    /// Sets `union_id`, discards any previously stored branch value, and
    /// allocates a default value for the new branch.
    pub fn set_discriminator_value(&mut self, id: MemberId) -> Result<(), ReturnCode> {
        if self.data_type.kind() != TypeKind::Union {
            return Err(ReturnCode::BadParameter);
        }
        if id.is_valid() && self.data_type.get_member(id).is_none() {
            return Err(ReturnCode::BadParameter);
        }
        let children = self.children_mut()?;
        children.clear();
        if let Some(member) = id.is_valid().then(|| self.data_type.get_member(id)).flatten() {
            let member_type = self.data_type.resolve(member.member_type);
            self.children_mut()?.insert(id, Box::new(DynamicData::create(member_type)));
        }
        self.union_id = id;
        Ok(())
    }

    #[must_use]
    pub fn get_discriminator_value(&self) -> MemberId {
        self.union_id
    }

    /// First label of the active branch, or `0` for the default branch or
    /// when no branch is selected.
    #[must_use]
    pub fn get_union_label(&self) -> i64 {
        if !self.union_id.is_valid() {
            return 0;
        }
        self.data_type
            .get_member(self.union_id)
            .filter(|m| !m.is_default_label)
            .and_then(|m| m.union_labels.iter().next().copied())
            .unwrap_or(0)
    }

    // ---------------------------------------------------------------
    // Equality (§4.6)
    // ---------------------------------------------------------------

    #[must_use]
    pub fn equals(&self, other: &DynamicData) -> bool {
        if !self.data_type.equals(other.data_type()) {
            return false;
        }
        match self.data_type.kind() {
            TypeKind::Union => {
                match (self.union_id.is_valid(), other.union_id.is_valid()) {
                    (false, false) => true,
                    (true, true) => {
                        self.union_id == other.union_id
                            && match (self.children().ok(), other.children().ok()) {
                                (Some(a), Some(b)) => {
                                    let (ca, cb) = (a.get(&self.union_id), b.get(&other.union_id));
                                    match (ca, cb) {
                                        (Some(x), Some(y)) => x.equals(y),
                                        _ => false,
                                    }
                                }
                                _ => false,
                            }
                    }
                    _ => false,
                }
            }
            TypeKind::Structure | TypeKind::Bitset => {
                let descriptor = self.data_type.descriptor();
                descriptor.members.iter().all(|m| {
                    let member_type = self.data_type.resolve(m.member_type);
                    let a = self.child(m.id).ok();
                    let b = other.child(m.id).ok();
                    match (a, b) {
                        (Some(x), Some(y)) => x.equals(y),
                        (Some(present), None) | (None, Some(present)) => {
                            let default = DynamicData::create(member_type);
                            present.equals(&default)
                        }
                        (None, None) => true,
                    }
                })
            }
            TypeKind::Sequence | TypeKind::Map => match (self.children(), other.children()) {
                (Ok(a), Ok(b)) => {
                    a.len() == b.len() && a.values().zip(b.values()).all(|(x, y)| x.equals(y))
                }
                _ => false,
            },
            TypeKind::Array => {
                let total = self.data_type.total_bounds();
                for i in 0..total {
                    let id = MemberId(i);
                    let default_a = self.default_array_value.as_deref();
                    let default_b = other.default_array_value.as_deref();
                    let a = self.children().ok().and_then(|c| c.get(&id)).map(|b| b.as_ref()).or(default_a);
                    let b = other.children().ok().and_then(|c| c.get(&id)).map(|b| b.as_ref()).or(default_b);
                    match (a, b) {
                        (Some(x), Some(y)) if x.equals(y) => continue,
                        _ => return false,
                    }
                }
                true
            }
            _ => match (&self.storage, &other.storage) {
                (ValueStorage::Primitive(a), ValueStorage::Primitive(b)) => a.value_equals(b),
                _ => false,
            },
        }
    }

    // ---------------------------------------------------------------
    // Item count (§4.6)
    // ---------------------------------------------------------------

    #[must_use]
    pub fn item_count(&self) -> u32 {
        match self.data_type.kind() {
            TypeKind::Sequence | TypeKind::Map => self.children().map(|c| c.len() as u32).unwrap_or(0),
            TypeKind::Array => self.data_type.total_bounds(),
            TypeKind::Bitmask => {
                let bits = self.get_bitmask_value(MemberId::INVALID).unwrap_or(0);
                bits.count_ones()
            }
            TypeKind::Structure | TypeKind::Bitset => self.children().map(|c| c.len() as u32).unwrap_or(0),
            TypeKind::Union => {
                if self.union_id.is_valid() {
                    2
                } else {
                    1
                }
            }
            TypeKind::Alias => {
                // alias defers to base; our storage already is the base's.
                1
            }
            _ => 1,
        }
    }
}
