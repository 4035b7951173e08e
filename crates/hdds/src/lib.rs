// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # hdds-dynamic - DDS XTypes Dynamic Language Binding
//!
//! Runtime type manipulation for DDS/XTypes: build a type graph at runtime,
//! populate and introspect values without a compile-time generated struct,
//! and encode/decode those values to CDR. Intended for generic tools,
//! protocol bridges, and introspection utilities that can't depend on a
//! fixed, code-generated type.
//!
//! ## Quick Start
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
//!
//! ## Modules Overview
//!
//! - [`dynamic`] - the type graph, the dynamic value tree, and the CDR codec
//! - [`error`] - the `ReturnCode` taxonomy shared across the dynamic-types API

// Clippy: No blanket suppressions. Fix issues properly or use inline #[allow] with justification.

/// `ReturnCode` and the dynamic-types error taxonomy.
pub mod error;
/// Dynamic Types for runtime type manipulation without compile-time type knowledge.
pub mod dynamic;

/// Crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
