// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Dynamic Types for DDS
//!
//! Runtime type manipulation without compile-time type knowledge: build a
//! type graph from a `DynamicTypeBuilder`, populate values in a `DynamicData`
//! tree without a generated Rust struct, and encode/decode that tree to CDR.
//! Enables generic tools, bridges, and introspection.
//!
//! # Layers
//!
//! - [`ids`]/[`annotation`] - shared identity primitives and the well-known
//!   annotation set (`@key`, `@bit_bound`, `@extensibility`, …)
//! - [`type_descriptor`]/[`registry`]/[`dynamic_type`] - the type graph: an
//!   append-only arena of [`type_descriptor::TypeDescriptor`] nodes addressed
//!   through [`dynamic_type::DynamicType`] handles
//! - [`builder`] - [`builder::DynamicTypeBuilder`]/[`builder::DynamicTypeBuilderFactory`],
//!   the only way to produce a [`dynamic_type::DynamicType`]
//! - [`dynamic_data`]/[`data_factory`] - the value tree and its lifecycle
//! - [`cdr`] - CDR encode/decode and size prediction driven by the type graph
//!
//! # Example
//!
//! ```rust
//! use hdds::dynamic::builder::{DynamicTypeBuilderFactory, MemberDescriptor};
//! use hdds::dynamic::dynamic_data::DynamicData;
//! use hdds::dynamic::ids::TypeKind;
//!
//! let factory = DynamicTypeBuilderFactory::new();
//! let f64t = factory.create_primitive(TypeKind::Float64);
//! let mut builder = factory.create_structure_builder("SensorReading");
//! let temp_id = builder.add_member(MemberDescriptor::new("temperature", f64t)).unwrap();
//! let reading_type = builder.build().unwrap();
//!
//! let mut data = DynamicData::create(reading_type);
//! data.set_float64_value(temp_id, 23.5).unwrap();
//! assert_eq!(data.get_float64_value(temp_id).unwrap(), 23.5);
//! ```

pub mod annotation;
pub mod builder;
pub mod cdr;
pub mod data_factory;
pub mod dynamic_data;
pub mod dynamic_type;
pub mod ids;
pub(crate) mod registry;
pub mod type_descriptor;

pub use builder::{DynamicTypeBuilder, DynamicTypeBuilderFactory, MemberDescriptor};
pub use cdr::{CdrReader, CdrWriter, DynamicCdrError, Endianness};
pub use data_factory::{DataHandle, DynamicDataFactory};
pub use dynamic_data::DynamicData;
pub use dynamic_type::DynamicType;
pub use ids::{MemberId, TypeKind};
pub use registry::TypeHandle;
pub use type_descriptor::{DynamicTypeMember, TypeDescriptor};

/// `long double`'s wire size: 8 bytes on Windows (`long double` == `double`
/// there), 16 elsewhere. `PrimitiveValue::Float128` storage is always a
/// fixed 16-byte array regardless of platform; only the wire representation
/// (and its alignment) tracks this constant.
#[cfg(target_os = "windows")]
pub const LONG_DOUBLE_SIZE: usize = 8;
#[cfg(not(target_os = "windows"))]
pub const LONG_DOUBLE_SIZE: usize = 16;

#[cfg(target_os = "windows")]
pub const LONG_DOUBLE_ALIGN: usize = 8;
#[cfg(not(target_os = "windows"))]
pub const LONG_DOUBLE_ALIGN: usize = 16;

#[cfg(test)]
mod tests;
