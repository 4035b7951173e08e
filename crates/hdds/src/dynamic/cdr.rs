// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! CDR encoding/decoding driven by a `DynamicType` graph.
//!
//! Grounded on the prototype `cdr_dynamic.rs`'s `CdrEncoder`/`CdrDecoder`
//! split and its `align`/`read_bytes` primitives, generalized from a
//! fixed little-endian single-pass codec into one parameterized by
//! endianness (OMG CDR leaves byte order to the enclosing frame) and driven
//! by the handle-based type graph instead of an owned `TypeKind` tree.

use std::fmt;

use super::dynamic_data::DynamicData;
use super::dynamic_type::DynamicType;
use super::ids::{MemberId, TypeKind};

/// Byte order requested by the enclosing frame; the core doesn't negotiate
/// this itself (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    Little,
    Big,
}

#[derive(Debug)]
pub enum DynamicCdrError {
    BufferTooSmall { need: usize, have: usize },
    InvalidData(String),
    UnsupportedType(String),
    Utf8Error(std::string::FromUtf8Error),
    TypeMismatch { expected: String, found: String },
    UnknownDiscriminator(i64),
}

impl fmt::Display for DynamicCdrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BufferTooSmall { need, have } => write!(f, "buffer too small: need {need} bytes, have {have}"),
            Self::InvalidData(msg) => write!(f, "invalid data: {msg}"),
            Self::UnsupportedType(t) => write!(f, "unsupported type: {t}"),
            Self::Utf8Error(e) => write!(f, "utf-8 error: {e}"),
            Self::TypeMismatch { expected, found } => write!(f, "type mismatch: expected {expected}, found {found}"),
            Self::UnknownDiscriminator(v) => write!(f, "no union branch matches discriminator {v}"),
        }
    }
}

impl std::error::Error for DynamicCdrError {}

impl From<std::string::FromUtf8Error> for DynamicCdrError {
    fn from(e: std::string::FromUtf8Error) -> Self {
        Self::Utf8Error(e)
    }
}

type CdrResult<T> = Result<T, DynamicCdrError>;

/// Growable little/big-endian CDR byte sink with natural alignment.
pub struct CdrWriter {
    buffer: Vec<u8>,
    endianness: Endianness,
}

impl CdrWriter {
    #[must_use]
    pub fn new(endianness: Endianness) -> Self {
        CdrWriter { buffer: Vec::new(), endianness }
    }

    /// A writer whose buffer starts `padding` bytes "into" the frame, so
    /// `align()` computes offsets relative to an already-aligned prefix the
    /// caller owns. Used by `cdr_serialized_size` to measure without
    /// re-implementing the alignment walk.
    fn with_padding(padding: usize, endianness: Endianness) -> Self {
        CdrWriter { buffer: vec![0; padding], endianness }
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    fn align(&mut self, alignment: usize) {
        let padding = (alignment - (self.buffer.len() % alignment)) % alignment;
        self.buffer.extend(std::iter::repeat_n(0u8, padding));
    }

    fn write_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    fn write_u8(&mut self, v: u8) {
        self.buffer.push(v);
    }

    fn write_u16(&mut self, v: u16) {
        self.align(2);
        self.write_bytes(&match self.endianness {
            Endianness::Little => v.to_le_bytes(),
            Endianness::Big => v.to_be_bytes(),
        });
    }

    fn write_u32(&mut self, v: u32) {
        self.align(4);
        self.write_bytes(&match self.endianness {
            Endianness::Little => v.to_le_bytes(),
            Endianness::Big => v.to_be_bytes(),
        });
    }

    fn write_u64(&mut self, v: u64) {
        self.align(8);
        self.write_bytes(&match self.endianness {
            Endianness::Little => v.to_le_bytes(),
            Endianness::Big => v.to_be_bytes(),
        });
    }

    fn write_f32(&mut self, v: f32) {
        self.write_u32(v.to_bits());
    }

    fn write_f64(&mut self, v: f64) {
        self.write_u64(v.to_bits());
    }

    /// Length includes the null terminator, per CDR string encoding.
    fn write_string8(&mut self, s: &str, bound: u32) -> CdrResult<()> {
        if bound != 0 && s.len() as u32 > bound {
            return Err(DynamicCdrError::InvalidData("string exceeds bound".into()));
        }
        self.write_u32((s.len() + 1) as u32);
        self.write_bytes(s.as_bytes());
        self.write_u8(0);
        Ok(())
    }

    /// No null terminator on the wire; length is the raw UTF-16 code unit
    /// count.
    fn write_string16(&mut self, s: &str, bound: u32) -> CdrResult<()> {
        let units: Vec<u16> = s.encode_utf16().collect();
        if bound != 0 && units.len() as u32 > bound {
            return Err(DynamicCdrError::InvalidData("wstring exceeds bound".into()));
        }
        self.write_u32(units.len() as u32);
        for u in units {
            self.write_u16(u);
        }
        Ok(())
    }
}

/// Mirror reader over a borrowed byte slice.
pub struct CdrReader<'a> {
    buffer: &'a [u8],
    offset: usize,
    endianness: Endianness,
}

impl<'a> CdrReader<'a> {
    #[must_use]
    pub fn new(buffer: &'a [u8], endianness: Endianness) -> Self {
        CdrReader { buffer, offset: 0, endianness }
    }

    fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.offset)
    }

    fn align(&mut self, alignment: usize) {
        let padding = (alignment - (self.offset % alignment)) % alignment;
        self.offset += padding;
    }

    fn read_bytes(&mut self, count: usize) -> CdrResult<&'a [u8]> {
        if self.offset + count > self.buffer.len() {
            return Err(DynamicCdrError::BufferTooSmall { need: count, have: self.remaining() });
        }
        let slice = &self.buffer[self.offset..self.offset + count];
        self.offset += count;
        Ok(slice)
    }

    fn read_u8(&mut self) -> CdrResult<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    fn read_u16(&mut self) -> CdrResult<u16> {
        self.align(2);
        let b = self.read_bytes(2)?;
        Ok(match self.endianness {
            Endianness::Little => u16::from_le_bytes([b[0], b[1]]),
            Endianness::Big => u16::from_be_bytes([b[0], b[1]]),
        })
    }

    fn read_u32(&mut self) -> CdrResult<u32> {
        self.align(4);
        let b = self.read_bytes(4)?;
        Ok(match self.endianness {
            Endianness::Little => u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
            Endianness::Big => u32::from_be_bytes([b[0], b[1], b[2], b[3]]),
        })
    }

    fn read_u64(&mut self) -> CdrResult<u64> {
        self.align(8);
        let b = self.read_bytes(8)?;
        Ok(match self.endianness {
            Endianness::Little => u64::from_le_bytes(b.try_into().unwrap()),
            Endianness::Big => u64::from_be_bytes(b.try_into().unwrap()),
        })
    }

    fn read_f32(&mut self) -> CdrResult<f32> {
        Ok(f32::from_bits(self.read_u32()?))
    }

    fn read_f64(&mut self) -> CdrResult<f64> {
        Ok(f64::from_bits(self.read_u64()?))
    }

    fn read_string8(&mut self, bound: u32) -> CdrResult<String> {
        let len = self.read_u32()? as usize;
        if bound != 0 && len > bound as usize + 1 {
            return Err(DynamicCdrError::InvalidData("string exceeds bound".into()));
        }
        if len == 0 {
            return Ok(String::new());
        }
        let bytes = self.read_bytes(len)?;
        let content = if bytes[len - 1] == 0 { &bytes[..len - 1] } else { bytes };
        Ok(String::from_utf8(content.to_vec())?)
    }

    fn read_string16(&mut self, bound: u32) -> CdrResult<String> {
        let len = self.read_u32()? as usize;
        if bound != 0 && len > bound as usize {
            return Err(DynamicCdrError::InvalidData("wstring exceeds bound".into()));
        }
        let mut units = Vec::with_capacity(len);
        for _ in 0..len {
            units.push(self.read_u16()?);
        }
        String::from_utf16(&units).map_err(|_| DynamicCdrError::InvalidData("invalid utf-16".into()))
    }
}

const LONG_DOUBLE_ALIGN: usize = super::LONG_DOUBLE_ALIGN;
const LONG_DOUBLE_SIZE: usize = super::LONG_DOUBLE_SIZE;

// ---------------------------------------------------------------
// Top-level entry points
// ---------------------------------------------------------------

pub fn serialize(data: &DynamicData, endianness: Endianness) -> CdrResult<Vec<u8>> {
    let mut writer = CdrWriter::new(endianness);
    encode_value(data, &mut writer)?;
    Ok(writer.into_bytes())
}

pub fn deserialize(data_type: &DynamicType, bytes: &[u8], endianness: Endianness) -> CdrResult<DynamicData> {
    let mut reader = CdrReader::new(bytes, endianness);
    decode_value(data_type, &mut reader)
}

/// Emits only key-annotated members (recursively through nested
/// structs/bitsets); non-aggregate key-defined types delegate straight to
/// `serialize`. Types with no key members at all emit nothing.
pub fn serialize_key(data: &DynamicData, endianness: Endianness) -> CdrResult<Vec<u8>> {
    let mut writer = CdrWriter::new(endianness);
    encode_key(data, &mut writer)?;
    Ok(writer.into_bytes())
}

pub fn cdr_serialized_size(data: &DynamicData, current_alignment: usize) -> CdrResult<usize> {
    let mut writer = CdrWriter::with_padding(current_alignment, Endianness::Little);
    encode_value(data, &mut writer)?;
    Ok(writer.len() - current_alignment)
}

pub fn empty_cdr_serialized_size(data_type: &DynamicType, current_alignment: usize) -> CdrResult<usize> {
    cdr_serialized_size(&DynamicData::create(data_type.clone()), current_alignment)
}

pub fn max_cdr_serialized_size(data_type: &DynamicType, current_alignment: usize) -> CdrResult<usize> {
    let mut counter = SizeCounter::new(current_alignment);
    max_size_for_type(data_type, &mut counter)?;
    Ok(counter.result(current_alignment))
}

pub fn max_key_cdr_size(data_type: &DynamicType, current_alignment: usize) -> CdrResult<usize> {
    let mut counter = SizeCounter::new(current_alignment);
    max_key_size_for_type(data_type, &mut counter)?;
    Ok(counter.result(current_alignment))
}

// ---------------------------------------------------------------
// Encode
// ---------------------------------------------------------------

fn encode_value(data: &DynamicData, writer: &mut CdrWriter) -> CdrResult<()> {
    let t = data.data_type();
    let kind = t.kind();
    if kind.is_primitive() {
        return encode_primitive(data, kind, writer);
    }
    match kind {
        TypeKind::String8 => {
            let bound = t.descriptor().bounds.first().copied().unwrap_or(0);
            writer.align(4);
            writer.write_string8(&data.get_string_value(MemberId::INVALID).map_err(to_codec_err)?, bound)
        }
        TypeKind::String16 => {
            let bound = t.descriptor().bounds.first().copied().unwrap_or(0);
            writer.align(4);
            writer.write_string16(&data.get_wstring_value(MemberId::INVALID).map_err(to_codec_err)?, bound)
        }
        TypeKind::Enum => {
            writer.write_u32(data.get_enum_value(MemberId::INVALID).map_err(to_codec_err)?);
            Ok(())
        }
        TypeKind::Bitmask => {
            let width = t.bitmask_storage_width();
            let value = data.get_bitmask_value(MemberId::INVALID).map_err(to_codec_err)?;
            write_width(writer, width, value);
            Ok(())
        }
        TypeKind::Alias => unreachable!("DynamicData::create binds ALIAS values directly to their base type"),
        TypeKind::Structure | TypeKind::Bitset => {
            for member in t.all_members_ordered() {
                if member.annotations.is_non_serialized() {
                    continue;
                }
                let member_type = t.resolve(member.member_type);
                match data.child(member.id) {
                    Ok(child) => encode_value(child, writer)?,
                    Err(_) => encode_value(&DynamicData::create(member_type), writer)?,
                }
            }
            Ok(())
        }
        TypeKind::Union => {
            let disc_type = t.discriminator_type().expect("union has a discriminator type");
            let union_id = data.get_discriminator_value();
            let label = if union_id.is_valid() { data.get_union_label() } else { i64::from(u32::MAX) };
            write_discriminator(writer, &disc_type, label)?;
            if union_id.is_valid() {
                encode_value(data.child(union_id).map_err(to_codec_err)?, writer)?;
            }
            Ok(())
        }
        TypeKind::Sequence => {
            let children: Vec<_> = data.children_iter().collect();
            writer.write_u32(children.len() as u32);
            for (_, child) in children {
                encode_value(child, writer)?;
            }
            Ok(())
        }
        TypeKind::Map => {
            let children: Vec<_> = data.children_iter().collect();
            writer.write_u32((children.len() / 2) as u32);
            for (_, child) in children {
                encode_value(child, writer)?;
            }
            Ok(())
        }
        TypeKind::Array => {
            let total = t.total_bounds();
            let default = data.default_array_value().expect("array carries a default prototype");
            for i in 0..total {
                let id = MemberId(i);
                match data.child(id) {
                    Ok(child) => encode_value(child, writer)?,
                    Err(_) => encode_value(default, writer)?,
                }
            }
            Ok(())
        }
        _ => Err(DynamicCdrError::UnsupportedType(format!("{kind:?}"))),
    }
}

fn encode_primitive(data: &DynamicData, kind: TypeKind, writer: &mut CdrWriter) -> CdrResult<()> {
    match kind {
        TypeKind::Boolean => {
            writer.write_u8(u8::from(data.get_boolean_value(MemberId::INVALID).map_err(to_codec_err)?));
        }
        TypeKind::Byte => writer.write_u8(data.get_byte_value(MemberId::INVALID).map_err(to_codec_err)?),
        TypeKind::Char8 => writer.write_u8(data.get_char8_value(MemberId::INVALID).map_err(to_codec_err)?),
        TypeKind::Int16 => writer.write_u16(data.get_int16_value(MemberId::INVALID).map_err(to_codec_err)? as u16),
        TypeKind::Uint16 => writer.write_u16(data.get_uint16_value(MemberId::INVALID).map_err(to_codec_err)?),
        TypeKind::Int32 => writer.write_u32(data.get_int32_value(MemberId::INVALID).map_err(to_codec_err)? as u32),
        TypeKind::Uint32 => writer.write_u32(data.get_uint32_value(MemberId::INVALID).map_err(to_codec_err)?),
        TypeKind::Char16 => writer.write_u32(data.get_char16_value(MemberId::INVALID).map_err(to_codec_err)?),
        TypeKind::Int64 => writer.write_u64(data.get_int64_value(MemberId::INVALID).map_err(to_codec_err)? as u64),
        TypeKind::Uint64 => writer.write_u64(data.get_uint64_value(MemberId::INVALID).map_err(to_codec_err)?),
        TypeKind::Float32 => writer.write_f32(data.get_float32_value(MemberId::INVALID).map_err(to_codec_err)?),
        TypeKind::Float64 => writer.write_f64(data.get_float64_value(MemberId::INVALID).map_err(to_codec_err)?),
        TypeKind::Float128 => {
            writer.align(LONG_DOUBLE_ALIGN);
            let value = data.get_float128_value(MemberId::INVALID).map_err(to_codec_err)?;
            writer.write_bytes(&value[..LONG_DOUBLE_SIZE]);
        }
        _ => return Err(DynamicCdrError::UnsupportedType(format!("{kind:?}"))),
    }
    Ok(())
}

fn to_codec_err(e: crate::error::ReturnCode) -> DynamicCdrError {
    DynamicCdrError::InvalidData(format!("accessor failed: {e}"))
}

fn write_width(writer: &mut CdrWriter, width: usize, value: u64) {
    writer.align(width);
    match width {
        1 => writer.write_u8(value as u8),
        2 => writer.write_u16(value as u16),
        4 => writer.write_u32(value as u32),
        _ => writer.write_u64(value),
    }
}

fn read_width(reader: &mut CdrReader<'_>, width: usize) -> CdrResult<u64> {
    reader.align(width);
    Ok(match width {
        1 => u64::from(reader.read_u8()?),
        2 => u64::from(reader.read_u16()?),
        4 => u64::from(reader.read_u32()?),
        _ => reader.read_u64()?,
    })
}

/// Promotes a 64-bit union label into the discriminator's CDR
/// representation (§4.7's promotion matrix), and writes it.
fn write_discriminator(writer: &mut CdrWriter, disc_type: &DynamicType, label: i64) -> CdrResult<()> {
    match disc_type.kind() {
        TypeKind::Boolean => writer.write_u8(u8::from(label != 0)),
        TypeKind::Byte | TypeKind::Char8 => writer.write_u8(label as u8),
        TypeKind::Int16 | TypeKind::Uint16 => writer.write_u16(label as u16),
        TypeKind::Char16 => writer.write_u32(label as u32),
        TypeKind::Int32 | TypeKind::Uint32 | TypeKind::Enum => writer.write_u32(label as u32),
        TypeKind::Float32 => writer.write_f32(f32::from_bits(label as u32)),
        TypeKind::Int64 | TypeKind::Uint64 => writer.write_u64(label as u64),
        TypeKind::Float64 => writer.write_f64(label as f64),
        TypeKind::Float128 => {
            writer.align(LONG_DOUBLE_ALIGN);
            let mut bytes = [0u8; LONG_DOUBLE_SIZE];
            bytes[..8].copy_from_slice(&(label as f64).to_le_bytes());
            writer.write_bytes(&bytes);
        }
        TypeKind::String8 => {
            writer.align(4);
            writer.write_string8(&label.to_string(), 0)?;
        }
        TypeKind::String16 => {
            writer.align(4);
            writer.write_string16(&label.to_string(), 0)?;
        }
        TypeKind::Bitmask => write_width(writer, disc_type.bitmask_storage_width(), label as u64),
        other => return Err(DynamicCdrError::UnsupportedType(format!("{other:?} as discriminator"))),
    }
    Ok(())
}

fn read_discriminator(reader: &mut CdrReader<'_>, disc_type: &DynamicType) -> CdrResult<i64> {
    Ok(match disc_type.kind() {
        TypeKind::Boolean => i64::from(reader.read_u8()? != 0),
        TypeKind::Byte | TypeKind::Char8 => i64::from(reader.read_u8()?),
        TypeKind::Int16 => i64::from(reader.read_u16()? as i16),
        TypeKind::Uint16 => i64::from(reader.read_u16()?),
        TypeKind::Char16 => i64::from(reader.read_u32()?),
        TypeKind::Int32 | TypeKind::Enum => i64::from(reader.read_u32()? as i32),
        TypeKind::Uint32 => i64::from(reader.read_u32()?),
        TypeKind::Float32 => i64::from(reader.read_u32()? as i32),
        TypeKind::Int64 => reader.read_u64()? as i64,
        TypeKind::Uint64 => reader.read_u64()? as i64,
        TypeKind::Float64 => reader.read_f64()? as i64,
        TypeKind::Float128 => {
            reader.align(LONG_DOUBLE_ALIGN);
            let bytes = reader.read_bytes(LONG_DOUBLE_SIZE)?;
            f64::from_le_bytes(bytes[..8].try_into().unwrap()) as i64
        }
        TypeKind::String8 => {
            reader.align(4);
            reader.read_string8(0)?.parse().unwrap_or(0)
        }
        TypeKind::String16 => {
            reader.align(4);
            reader.read_string16(0)?.parse().unwrap_or(0)
        }
        TypeKind::Bitmask => read_width(reader, disc_type.bitmask_storage_width())? as i64,
        other => return Err(DynamicCdrError::UnsupportedType(format!("{other:?} as discriminator"))),
    })
}

// ---------------------------------------------------------------
// Decode
// ---------------------------------------------------------------

fn decode_value(data_type: &DynamicType, reader: &mut CdrReader<'_>) -> CdrResult<DynamicData> {
    let kind = data_type.kind();
    if kind.is_primitive() {
        return decode_primitive(data_type, kind, reader);
    }
    match kind {
        TypeKind::String8 => {
            let bound = data_type.descriptor().bounds.first().copied().unwrap_or(0);
            reader.align(4);
            let s = reader.read_string8(bound)?;
            let mut data = DynamicData::create(data_type.clone());
            data.set_string_value(MemberId::INVALID, s).map_err(to_codec_err)?;
            Ok(data)
        }
        TypeKind::String16 => {
            let bound = data_type.descriptor().bounds.first().copied().unwrap_or(0);
            reader.align(4);
            let s = reader.read_string16(bound)?;
            let mut data = DynamicData::create(data_type.clone());
            data.set_wstring_value(MemberId::INVALID, s).map_err(to_codec_err)?;
            Ok(data)
        }
        TypeKind::Enum => {
            let mut data = DynamicData::create(data_type.clone());
            data.set_enum_value(MemberId::INVALID, reader.read_u32()?).map_err(to_codec_err)?;
            Ok(data)
        }
        TypeKind::Bitmask => {
            let width = data_type.bitmask_storage_width();
            let value = read_width(reader, width)?;
            let mut data = DynamicData::create(data_type.clone());
            data.set_bitmask_value(MemberId::INVALID, value).map_err(to_codec_err)?;
            Ok(data)
        }
        TypeKind::Alias => decode_value(&data_type.base_type().expect("alias has a base type"), reader),
        TypeKind::Structure | TypeKind::Bitset => {
            let mut data = DynamicData::create(data_type.clone());
            for member in data_type.all_members_ordered() {
                if member.annotations.is_non_serialized() {
                    continue;
                }
                let member_type = data_type.resolve(member.member_type);
                let value = decode_value(&member_type, reader)?;
                *data.child_mut(member.id).map_err(to_codec_err)? = value;
            }
            Ok(data)
        }
        TypeKind::Union => {
            let disc_type = data_type.discriminator_type().expect("union has a discriminator type");
            let label = read_discriminator(reader, &disc_type)?;
            let mut data = DynamicData::create(data_type.clone());
            let id = data_type.get_id_from_label(label);
            if !id.is_valid() {
                return Err(DynamicCdrError::UnknownDiscriminator(label));
            }
            data.set_discriminator_value(id).map_err(to_codec_err)?;
            let member_type = data_type.resolve(data_type.get_member(id).expect("id came from this type").member_type);
            let value = decode_value(&member_type, reader)?;
            *data.child_mut(id).map_err(to_codec_err)? = value;
            Ok(data)
        }
        TypeKind::Sequence => {
            let count = reader.read_u32()?;
            let element_type = data_type.element_type().expect("sequence has an element type");
            let mut data = DynamicData::create(data_type.clone());
            for _ in 0..count {
                let value = decode_value(&element_type, reader)?;
                let id = data.insert_sequence_data().map_err(to_codec_err)?;
                *data.child_mut(id).map_err(to_codec_err)? = value;
            }
            Ok(data)
        }
        TypeKind::Map => {
            let pairs = reader.read_u32()?;
            let key_type = data_type.key_element_type().expect("map has a key type");
            let value_type = data_type.element_type().expect("map has a value type");
            let mut data = DynamicData::create(data_type.clone());
            for _ in 0..pairs {
                let key = decode_value(&key_type, reader)?;
                let value = decode_value(&value_type, reader)?;
                data.insert_map_data(key, Some(value)).map_err(to_codec_err)?;
            }
            Ok(data)
        }
        TypeKind::Array => {
            let total = data_type.total_bounds();
            let element_type = data_type.element_type().expect("array has an element type");
            let mut data = DynamicData::create(data_type.clone());
            for i in 0..total {
                let value = decode_value(&element_type, reader)?;
                // ARRAY prototype elision is a write-side-only hint (see
                // `DESIGN.md`): every decoded element is stored as-is.
                data.set_array_element(MemberId(i), value).map_err(to_codec_err)?;
            }
            Ok(data)
        }
        _ => Err(DynamicCdrError::UnsupportedType(format!("{kind:?}"))),
    }
}

fn decode_primitive(data_type: &DynamicType, kind: TypeKind, reader: &mut CdrReader<'_>) -> CdrResult<DynamicData> {
    let mut data = DynamicData::create(data_type.clone());
    match kind {
        TypeKind::Boolean => data.set_boolean_value(MemberId::INVALID, reader.read_u8()? != 0),
        TypeKind::Byte => data.set_byte_value(MemberId::INVALID, reader.read_u8()?),
        TypeKind::Char8 => data.set_char8_value(MemberId::INVALID, reader.read_u8()?),
        TypeKind::Int16 => data.set_int16_value(MemberId::INVALID, reader.read_u16()? as i16),
        TypeKind::Uint16 => data.set_uint16_value(MemberId::INVALID, reader.read_u16()?),
        TypeKind::Int32 => data.set_int32_value(MemberId::INVALID, reader.read_u32()? as i32),
        TypeKind::Uint32 => data.set_uint32_value(MemberId::INVALID, reader.read_u32()?),
        TypeKind::Char16 => data.set_char16_value(MemberId::INVALID, reader.read_u32()?),
        TypeKind::Int64 => data.set_int64_value(MemberId::INVALID, reader.read_u64()? as i64),
        TypeKind::Uint64 => data.set_uint64_value(MemberId::INVALID, reader.read_u64()?),
        TypeKind::Float32 => data.set_float32_value(MemberId::INVALID, reader.read_f32()?),
        TypeKind::Float64 => data.set_float64_value(MemberId::INVALID, reader.read_f64()?),
        TypeKind::Float128 => {
            reader.align(LONG_DOUBLE_ALIGN);
            let bytes = reader.read_bytes(LONG_DOUBLE_SIZE)?;
            let mut storage = [0u8; 16];
            storage[..LONG_DOUBLE_SIZE].copy_from_slice(bytes);
            data.set_float128_value(MemberId::INVALID, storage)
        }
        other => return Err(DynamicCdrError::UnsupportedType(format!("{other:?}"))),
    }
    .map_err(to_codec_err)?;
    Ok(data)
}

fn encode_key(data: &DynamicData, writer: &mut CdrWriter) -> CdrResult<()> {
    let t = data.data_type();
    match t.kind() {
        TypeKind::Structure | TypeKind::Bitset => {
            for member in t.all_members_ordered() {
                if !member.annotations.is_key() {
                    continue;
                }
                let member_type = t.resolve(member.member_type);
                let owned;
                let child = match data.child(member.id) {
                    Ok(c) => c,
                    Err(_) => {
                        owned = DynamicData::create(member_type.clone());
                        &owned
                    }
                };
                match member_type.kind() {
                    TypeKind::Structure | TypeKind::Bitset => encode_key(child, writer)?,
                    _ => encode_value(child, writer)?,
                }
            }
            Ok(())
        }
        _ => {
            if t.is_key_defined() {
                encode_value(data, writer)
            } else {
                Ok(())
            }
        }
    }
}

// ---------------------------------------------------------------
// Size prediction (§4.7)
// ---------------------------------------------------------------

struct SizeCounter {
    len: usize,
}

impl SizeCounter {
    fn new(current_alignment: usize) -> Self {
        SizeCounter { len: current_alignment }
    }

    fn align(&mut self, n: usize) {
        let pad = (n - self.len % n) % n;
        self.len += pad;
    }

    fn add(&mut self, n: usize) {
        self.len += n;
    }

    fn result(&self, current_alignment: usize) -> usize {
        self.len - current_alignment
    }
}

/// Worst case over the type graph alone (no data): bounded collections
/// full, strings at max bound, unions sized to their largest branch.
/// Unbounded strings/sequences/maps (`bounds[0] == 0`) have no finite
/// worst case; this treats them as empty, a documented limitation (see
/// `DESIGN.md`) rather than an unbounded return value.
fn max_size_for_type(t: &DynamicType, counter: &mut SizeCounter) -> CdrResult<()> {
    let kind = t.kind();
    if let Some(width) = kind.primitive_width() {
        counter.align(width);
        counter.add(width);
        return Ok(());
    }
    match kind {
        TypeKind::String8 => {
            let bound = t.descriptor().bounds.first().copied().unwrap_or(0) as usize;
            counter.align(4);
            counter.add(4 + bound + 1);
        }
        TypeKind::String16 => {
            let bound = t.descriptor().bounds.first().copied().unwrap_or(0) as usize;
            counter.align(4);
            counter.add(4);
            for _ in 0..bound {
                counter.align(2);
                counter.add(2);
            }
        }
        TypeKind::Enum => {
            counter.align(4);
            counter.add(4);
        }
        TypeKind::Bitmask => {
            let width = t.bitmask_storage_width();
            counter.align(width);
            counter.add(width);
        }
        TypeKind::Alias => max_size_for_type(&t.base_type().expect("alias has a base type"), counter)?,
        TypeKind::Structure | TypeKind::Bitset => {
            for member in t.all_members_ordered() {
                if member.annotations.is_non_serialized() {
                    continue;
                }
                max_size_for_type(&t.resolve(member.member_type), counter)?;
            }
        }
        TypeKind::Union => {
            let disc_type = t.discriminator_type().expect("union has a discriminator type");
            max_size_for_type(&disc_type, counter)?;
            let base_len = counter.len;
            let mut max_growth = 0usize;
            for member in &t.descriptor().members {
                let mut branch = SizeCounter { len: base_len };
                max_size_for_type(&t.resolve(member.member_type), &mut branch)?;
                max_growth = max_growth.max(branch.len - base_len);
            }
            counter.len = base_len + max_growth;
        }
        TypeKind::Sequence => {
            let bound = t.descriptor().bounds.first().copied().unwrap_or(0);
            let element_type = t.element_type().expect("sequence has an element type");
            counter.align(4);
            counter.add(4);
            for _ in 0..bound {
                max_size_for_type(&element_type, counter)?;
            }
        }
        TypeKind::Map => {
            let bound = t.descriptor().bounds.first().copied().unwrap_or(0);
            let key_type = t.key_element_type().expect("map has a key type");
            let value_type = t.element_type().expect("map has a value type");
            counter.align(4);
            counter.add(4);
            for _ in 0..bound {
                max_size_for_type(&key_type, counter)?;
                max_size_for_type(&value_type, counter)?;
            }
        }
        TypeKind::Array => {
            let total = t.total_bounds();
            let element_type = t.element_type().expect("array has an element type");
            for _ in 0..total {
                max_size_for_type(&element_type, counter)?;
            }
        }
        other => return Err(DynamicCdrError::UnsupportedType(format!("{other:?}"))),
    }
    Ok(())
}

fn max_key_size_for_type(t: &DynamicType, counter: &mut SizeCounter) -> CdrResult<()> {
    match t.kind() {
        TypeKind::Structure | TypeKind::Bitset => {
            for member in t.all_members_ordered() {
                if member.annotations.is_key() {
                    max_size_for_type(&t.resolve(member.member_type), counter)?;
                }
            }
            Ok(())
        }
        _ if t.is_key_defined() => max_size_for_type(t, counter),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamic::annotation::AnnotationDescriptor;
    use crate::dynamic::builder::{DynamicTypeBuilderFactory, MemberDescriptor};

    #[test]
    fn primitive_struct_round_trip_matches_scenario_bytes() {
        let factory = DynamicTypeBuilderFactory::new();
        let i32t = factory.create_primitive(TypeKind::Int32);
        let string_t = factory.create_string_type(0);
        let mut builder = factory.create_structure_builder("S");
        let a_id = builder.add_member(MemberDescriptor::new("a", i32t)).unwrap();
        let b_id = builder.add_member(MemberDescriptor::new("b", string_t)).unwrap();
        let t = builder.build().unwrap();

        let mut data = DynamicData::create(t.clone());
        data.set_int32_value(a_id, -7).unwrap();
        data.set_string_value(b_id, "hi").unwrap();

        let bytes = serialize(&data, Endianness::Little).unwrap();
        assert_eq!(bytes, vec![0xF9, 0xFF, 0xFF, 0xFF, 0x03, 0x00, 0x00, 0x00, b'h', b'i', 0x00]);
        assert_eq!(cdr_serialized_size(&data, 0).unwrap(), bytes.len());

        let decoded = deserialize(&t, &bytes, Endianness::Little).unwrap();
        assert!(decoded.equals(&data));
    }

    #[test]
    fn union_with_int32_discriminator_matches_scenario_bytes() {
        let factory = DynamicTypeBuilderFactory::new();
        let i32t = factory.create_primitive(TypeKind::Int32);
        let i16t = factory.create_primitive(TypeKind::Int16);
        let string_t = factory.create_string_type(0);
        let bool_t = factory.create_primitive(TypeKind::Boolean);
        let mut builder = factory.create_union_builder("U", &i32t);
        let s_id = builder.add_member(MemberDescriptor::new("s", i16t).with_labels([1])).unwrap();
        builder.add_member(MemberDescriptor::new("t", string_t).with_labels([2])).unwrap();
        builder.add_member(MemberDescriptor::new("f", bool_t).as_default_branch()).unwrap();
        let t = builder.build().unwrap();

        let mut data = DynamicData::create(t.clone());
        data.set_discriminator_value(s_id).unwrap();
        data.set_int16_value(s_id, 0x1234).unwrap();
        assert_eq!(data.get_union_label(), 1);

        let bytes = serialize(&data, Endianness::Little).unwrap();
        assert_eq!(bytes, vec![0x01, 0x00, 0x00, 0x00, 0x34, 0x12]);
        assert_eq!(cdr_serialized_size(&data, 0).unwrap(), bytes.len());

        let decoded = deserialize(&t, &bytes, Endianness::Little).unwrap();
        assert!(decoded.equals(&data));
    }

    #[test]
    fn union_decode_rejects_label_with_no_matching_branch_and_no_default() {
        let factory = DynamicTypeBuilderFactory::new();
        let i32t = factory.create_primitive(TypeKind::Int32);
        let i16t = factory.create_primitive(TypeKind::Int16);
        let mut builder = factory.create_union_builder("U", &i32t);
        builder.add_member(MemberDescriptor::new("s", i16t).with_labels([1])).unwrap();
        let t = builder.build().unwrap();

        let bytes = vec![0x63, 0x00, 0x00, 0x00]; // discriminator = 99, no branch claims it
        let err = deserialize(&t, &bytes, Endianness::Little).unwrap_err();
        assert!(matches!(err, DynamicCdrError::UnknownDiscriminator(99)));
    }

    #[test]
    fn array_elision_round_trips() {
        let factory = DynamicTypeBuilderFactory::new();
        let i32t = factory.create_primitive(TypeKind::Int32);
        let array_t = factory.create_array_type(&i32t, vec![3]).unwrap();
        let mut data = DynamicData::create(array_t.clone());
        data.set_array_element(MemberId(1), {
            let mut el = DynamicData::create(i32t);
            el.set_int32_value(MemberId::INVALID, 42).unwrap();
            el
        })
        .unwrap();

        let bytes = serialize(&data, Endianness::Little).unwrap();
        assert_eq!(
            bytes,
            vec![0, 0, 0, 0, 0x2A, 0, 0, 0, 0, 0, 0, 0]
        );

        let decoded = deserialize(&array_t, &bytes, Endianness::Little).unwrap();
        assert!(decoded.equals(&data));
    }

    #[test]
    fn key_only_serialization_emits_just_the_key_member() {
        let factory = DynamicTypeBuilderFactory::new();
        let i32t = factory.create_primitive(TypeKind::Int32);
        let string_t = factory.create_string_type(0);
        let mut builder = factory.create_structure_builder("K");
        let id_id = builder
            .add_member(MemberDescriptor::new("id", i32t).with_annotation(AnnotationDescriptor::new("key")))
            .unwrap();
        let payload_id = builder.add_member(MemberDescriptor::new("payload", string_t)).unwrap();
        let t = builder.build().unwrap();

        let mut data = DynamicData::create(t.clone());
        data.set_int32_value(id_id, 7).unwrap();
        data.set_string_value(payload_id, "x").unwrap();

        let key_bytes = serialize_key(&data, Endianness::Little).unwrap();
        assert_eq!(key_bytes, vec![7, 0, 0, 0]);
        assert_eq!(max_key_cdr_size(&t, 0).unwrap(), 4);
    }

    #[test]
    fn bitmask_of_twelve_bits_serializes_as_two_bytes() {
        let factory = DynamicTypeBuilderFactory::new();
        let mut builder = factory.create_bitmask_builder("Flags", 12);
        let bool_t = factory.create_primitive(TypeKind::Boolean);
        let f0 = builder.add_member(MemberDescriptor::new("a", bool_t.clone()).with_id(MemberId(0))).unwrap();
        let f5 = builder.add_member(MemberDescriptor::new("b", bool_t.clone()).with_id(MemberId(5))).unwrap();
        let f11 = builder.add_member(MemberDescriptor::new("c", bool_t).with_id(MemberId(11))).unwrap();
        let t = builder.build().unwrap();

        let mut data = DynamicData::create(t);
        data.set_flag(f0, true).unwrap();
        data.set_flag(f5, true).unwrap();
        data.set_flag(f11, true).unwrap();
        assert_eq!(data.get_bitmask_value(MemberId::INVALID).unwrap(), 0x0821);

        let bytes = serialize(&data, Endianness::Little).unwrap();
        assert_eq!(bytes, vec![0x21, 0x08]);
    }
}
