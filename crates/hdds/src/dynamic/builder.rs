// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! `DynamicTypeBuilder` and `DynamicTypeBuilderFactory`.
//!
//! Grounded on the teacher's fluent `TypeDescriptorBuilder`/`EnumBuilder`/
//! `UnionBuilder`/`SequenceBuilder`/`ArrayBuilder` split in the prototype
//! `builder.rs`, generalized to the full consistency-checked builder the
//! governing contract requires (monotonic id allocation, annotation
//! application, copy-on-build freezing into the shared arena) plus a
//! process-wide-by-convention `DynamicTypeBuilderFactory` context object
//! (§9 design note: context objects threaded explicitly, not true globals).

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use super::annotation::{AnnotationDescriptor, AnnotationStore};
use super::dynamic_type::DynamicType;
use super::ids::{MemberId, TypeKind};
use super::registry::TypeRegistry;
use super::type_descriptor::{DynamicTypeMember, TypeDescriptor};
use crate::error::ReturnCode;

/// Input to `DynamicTypeBuilder::add_member`. Mirrors `DynamicTypeMember`
/// minus the fields the builder itself assigns (`index`, and `id` when the
/// caller passes `MemberId::INVALID`).
#[derive(Debug, Clone)]
pub struct MemberDescriptor {
    pub id: MemberId,
    pub name: String,
    pub member_type: DynamicType,
    pub default_value_literal: Option<String>,
    pub union_labels: Vec<i64>,
    pub is_default_label: bool,
    pub annotations: Vec<AnnotationDescriptor>,
}

impl MemberDescriptor {
    #[must_use]
    pub fn new(name: impl Into<String>, member_type: DynamicType) -> Self {
        MemberDescriptor {
            id: MemberId::INVALID,
            name: name.into(),
            member_type,
            default_value_literal: None,
            union_labels: Vec::new(),
            is_default_label: false,
            annotations: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: MemberId) -> Self {
        self.id = id;
        self
    }

    #[must_use]
    pub fn with_default(mut self, literal: impl Into<String>) -> Self {
        self.default_value_literal = Some(literal.into());
        self
    }

    #[must_use]
    pub fn with_labels(mut self, labels: impl IntoIterator<Item = i64>) -> Self {
        self.union_labels = labels.into_iter().collect();
        self
    }

    #[must_use]
    pub fn as_default_branch(mut self) -> Self {
        self.is_default_label = true;
        self
    }

    #[must_use]
    pub fn with_annotation(mut self, annotation: AnnotationDescriptor) -> Self {
        self.annotations.push(annotation);
        self
    }
}

/// Mutable staging area for a `TypeDescriptor`. Produced by
/// `DynamicTypeBuilderFactory::create_*_builder`, consumed by `build()`.
pub struct DynamicTypeBuilder {
    registry: Arc<TypeRegistry>,
    descriptor: TypeDescriptor,
    annotations: AnnotationStore,
    next_member_id: u32,
}

impl DynamicTypeBuilder {
    pub(crate) fn new(registry: Arc<TypeRegistry>, kind: TypeKind, name: impl Into<String>) -> Self {
        DynamicTypeBuilder {
            registry,
            descriptor: TypeDescriptor::leaf(kind, name),
            annotations: AnnotationStore::new(),
            next_member_id: 0,
        }
    }

    pub fn set_base_type(&mut self, base: &DynamicType) -> &mut Self {
        self.descriptor.base_type = Some(base.handle());
        self
    }

    pub fn set_discriminator_type(&mut self, discriminator: &DynamicType) -> &mut Self {
        self.descriptor.discriminator_type = Some(discriminator.handle());
        self
    }

    pub fn set_element_type(&mut self, element: &DynamicType) -> &mut Self {
        self.descriptor.element_type = Some(element.handle());
        self
    }

    pub fn set_key_element_type(&mut self, key: &DynamicType) -> &mut Self {
        self.descriptor.key_element_type = Some(key.handle());
        self
    }

    pub fn set_bounds(&mut self, bounds: Vec<u32>) -> &mut Self {
        self.descriptor.bounds = bounds;
        self
    }

    /// Applies a type-level annotation (e.g. `@bit_bound`, `@extensibility`).
    pub fn apply_annotation(&mut self, annotation: AnnotationDescriptor) -> Result<(), ReturnCode> {
        if annotation.name.is_empty() {
            return Err(ReturnCode::BadParameter);
        }
        self.annotations.apply(annotation);
        Ok(())
    }

    /// Allocates `id` monotonically when the caller passes `MemberId::INVALID`,
    /// validates id/name uniqueness and union label non-overlap, and appends
    /// the member. Returns the assigned `MemberId`.
    pub fn add_member(&mut self, descriptor: MemberDescriptor) -> Result<MemberId, ReturnCode> {
        let id = if descriptor.id.is_valid() {
            descriptor.id
        } else {
            MemberId(self.next_member_id)
        };

        if self.descriptor.members.iter().any(|m| m.id == id) {
            log::warn!(
                "dynamic type builder: duplicate member id {id} on '{}'",
                self.descriptor.name
            );
            return Err(ReturnCode::BadParameter);
        }
        if !descriptor.name.is_empty() && self.descriptor.members.iter().any(|m| m.name == descriptor.name) {
            log::warn!(
                "dynamic type builder: duplicate member name '{}' on '{}'",
                descriptor.name,
                self.descriptor.name
            );
            return Err(ReturnCode::BadParameter);
        }
        if self.descriptor.kind == TypeKind::Union && !descriptor.is_default_label {
            for label in &descriptor.union_labels {
                let overlaps = self
                    .descriptor
                    .members
                    .iter()
                    .any(|m| !m.is_default_label && m.union_labels.contains(label));
                if overlaps {
                    log::warn!("dynamic type builder: union label {label} already claimed");
                    return Err(ReturnCode::BadParameter);
                }
            }
        }
        if self.descriptor.kind == TypeKind::Union
            && descriptor.is_default_label
            && self.descriptor.members.iter().any(|m| m.is_default_label)
        {
            return Err(ReturnCode::BadParameter);
        }

        let index = self.descriptor.members.len();
        let mut member = DynamicTypeMember::new(id, descriptor.name, index, descriptor.member_type.handle());
        member.default_value_literal = descriptor.default_value_literal;
        member.union_labels = descriptor.union_labels.into_iter().collect();
        member.is_default_label = descriptor.is_default_label;
        for a in descriptor.annotations {
            member.annotations.apply(a);
        }
        self.descriptor.members.push(member);
        self.next_member_id = self.next_member_id.max(id.0.saturating_add(1));
        Ok(id)
    }

    /// Validates the staged descriptor and interns it into the registry,
    /// producing an immutable, shareable `DynamicType`. Further mutation of
    /// this builder does not affect the returned type (copy-on-build: the
    /// registry stores its own copy).
    pub fn build(&self) -> Result<DynamicType, ReturnCode> {
        let mut descriptor = self.descriptor.clone();
        descriptor.is_key_defined = descriptor.compute_is_key_defined(&self.registry);
        descriptor.validate(&self.annotations, &self.registry).inspect_err(|e| {
            log::warn!(
                "dynamic type builder: '{}' failed consistency validation: {e}",
                descriptor.name
            );
        })?;
        let handle = self.registry.insert(descriptor, self.annotations.clone());
        Ok(DynamicType::new(self.registry.clone(), handle))
    }
}

/// Process-wide-by-convention context owning the shared type arena and a
/// cache of primitive/common-composite builders. Threaded explicitly per
/// the §9 design note rather than reached for as a global; [`ambient`]
/// provides a default instance for call sites that don't want to plumb one.
///
/// [`ambient`]: DynamicTypeBuilderFactory::ambient
pub struct DynamicTypeBuilderFactory {
    registry: Arc<TypeRegistry>,
    primitives: Mutex<HashMap<TypeKind, DynamicType>>,
    outstanding: Option<Mutex<u64>>,
}

impl DynamicTypeBuilderFactory {
    #[must_use]
    pub fn new() -> Self {
        DynamicTypeBuilderFactory {
            registry: TypeRegistry::new(),
            primitives: Mutex::new(HashMap::new()),
            outstanding: None,
        }
    }

    /// Same as `new()`, but counts outstanding (not yet `build()`-consumed)
    /// builders for leak diagnostics.
    #[must_use]
    pub fn with_leak_tracking() -> Self {
        DynamicTypeBuilderFactory {
            registry: TypeRegistry::new(),
            primitives: Mutex::new(HashMap::new()),
            outstanding: Some(Mutex::new(0)),
        }
    }

    /// Default shared factory for convenience call sites.
    pub fn ambient() -> &'static DynamicTypeBuilderFactory {
        static AMBIENT: OnceLock<DynamicTypeBuilderFactory> = OnceLock::new();
        AMBIENT.get_or_init(DynamicTypeBuilderFactory::new)
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// Number of builders created but not yet turned into a `DynamicType`,
    /// or `None` if leak tracking isn't enabled.
    #[must_use]
    pub fn outstanding_count(&self) -> Option<u64> {
        self.outstanding.as_ref().map(|m| *m.lock())
    }

    fn new_builder(&self, kind: TypeKind, name: impl Into<String>) -> DynamicTypeBuilder {
        if let Some(counter) = &self.outstanding {
            *counter.lock() += 1;
        }
        DynamicTypeBuilder::new(self.registry.clone(), kind, name)
    }

    /// Cached primitive singleton: repeat calls for the same `kind` return
    /// the same underlying type node.
    pub fn create_primitive(&self, kind: TypeKind) -> DynamicType {
        if let Some(t) = self.primitives.lock().get(&kind) {
            return t.clone();
        }
        let builder = self.new_builder(kind, "");
        let t = builder.build().expect("primitive descriptors are always consistent");
        self.primitives.lock().insert(kind, t.clone());
        if let Some(counter) = &self.outstanding {
            *counter.lock() -= 1;
        }
        t
    }

    pub fn create_string_type(&self, bound: u32) -> DynamicType {
        let mut builder = self.new_builder(TypeKind::String8, "");
        builder.set_bounds(vec![bound]);
        let t = builder.build().expect("string descriptors are always consistent");
        if let Some(counter) = &self.outstanding {
            *counter.lock() -= 1;
        }
        t
    }

    pub fn create_wstring_type(&self, bound: u32) -> DynamicType {
        let mut builder = self.new_builder(TypeKind::String16, "");
        builder.set_bounds(vec![bound]);
        let t = builder.build().expect("wstring descriptors are always consistent");
        if let Some(counter) = &self.outstanding {
            *counter.lock() -= 1;
        }
        t
    }

    pub fn create_sequence_type(&self, element: &DynamicType, bound: u32) -> DynamicType {
        let mut builder = self.new_builder(TypeKind::Sequence, "");
        builder.set_element_type(element);
        builder.set_bounds(vec![bound]);
        let t = builder.build().expect("sequence descriptors are always consistent");
        if let Some(counter) = &self.outstanding {
            *counter.lock() -= 1;
        }
        t
    }

    pub fn create_map_type(&self, key: &DynamicType, value: &DynamicType, bound: u32) -> DynamicType {
        let mut builder = self.new_builder(TypeKind::Map, "");
        builder.set_element_type(value);
        builder.set_key_element_type(key);
        builder.set_bounds(vec![bound]);
        let t = builder.build().expect("map descriptors are always consistent");
        if let Some(counter) = &self.outstanding {
            *counter.lock() -= 1;
        }
        t
    }

    pub fn create_alias_type(&self, base: &DynamicType, name: impl Into<String>) -> DynamicType {
        let mut builder = self.new_builder(TypeKind::Alias, name);
        builder.set_base_type(base);
        let t = builder.build().expect("alias descriptors are always consistent");
        if let Some(counter) = &self.outstanding {
            *counter.lock() -= 1;
        }
        t
    }

    pub fn create_array_type(&self, element: &DynamicType, dimensions: Vec<u32>) -> Result<DynamicType, ReturnCode> {
        let mut builder = self.new_builder(TypeKind::Array, "");
        builder.set_element_type(element);
        builder.set_bounds(dimensions);
        let result = builder.build();
        if let Some(counter) = &self.outstanding {
            *counter.lock() -= 1;
        }
        result
    }

    /// A fresh enum builder; callers add literals via `add_member` using
    /// `MemberDescriptor::with_default` to carry the literal's numeric value.
    pub fn create_enum_builder(&self, name: impl Into<String>) -> DynamicTypeBuilder {
        self.new_builder(TypeKind::Enum, name)
    }

    /// A fresh bitmask builder; `bit_bound` defaults to 32 unless overridden
    /// via `apply_annotation`.
    pub fn create_bitmask_builder(&self, name: impl Into<String>, bit_bound: u32) -> DynamicTypeBuilder {
        let mut builder = self.new_builder(TypeKind::Bitmask, name);
        let _ = builder.apply_annotation(AnnotationDescriptor::with_value("bit_bound", bit_bound.to_string()));
        builder
    }

    pub fn create_structure_builder(&self, name: impl Into<String>) -> DynamicTypeBuilder {
        self.new_builder(TypeKind::Structure, name)
    }

    pub fn create_bitset_builder(&self, name: impl Into<String>) -> DynamicTypeBuilder {
        self.new_builder(TypeKind::Bitset, name)
    }

    pub fn create_union_builder(&self, name: impl Into<String>, discriminator: &DynamicType) -> DynamicTypeBuilder {
        let mut builder = self.new_builder(TypeKind::Union, name);
        builder.set_discriminator_type(discriminator);
        builder
    }
}

impl Default for DynamicTypeBuilderFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_member_allocates_ids_monotonically() {
        let factory = DynamicTypeBuilderFactory::new();
        let i32t = factory.create_primitive(TypeKind::Int32);
        let mut builder = factory.create_structure_builder("S");
        let a = builder.add_member(MemberDescriptor::new("a", i32t.clone())).unwrap();
        let b = builder.add_member(MemberDescriptor::new("b", i32t)).unwrap();
        assert_eq!(a, MemberId(0));
        assert_eq!(b, MemberId(1));
    }

    #[test]
    fn duplicate_member_name_is_rejected() {
        let factory = DynamicTypeBuilderFactory::new();
        let i32t = factory.create_primitive(TypeKind::Int32);
        let mut builder = factory.create_structure_builder("S");
        builder.add_member(MemberDescriptor::new("a", i32t.clone())).unwrap();
        assert_eq!(
            builder.add_member(MemberDescriptor::new("a", i32t)),
            Err(ReturnCode::BadParameter)
        );
    }

    #[test]
    fn union_rejects_overlapping_labels_at_add_time() {
        let factory = DynamicTypeBuilderFactory::new();
        let i32t = factory.create_primitive(TypeKind::Int32);
        let i16t = factory.create_primitive(TypeKind::Int16);
        let mut builder = factory.create_union_builder("U", &i32t);
        builder
            .add_member(MemberDescriptor::new("a", i16t.clone()).with_labels([1]))
            .unwrap();
        assert_eq!(
            builder.add_member(MemberDescriptor::new("b", i16t).with_labels([1])),
            Err(ReturnCode::BadParameter)
        );
    }

    #[test]
    fn build_freezes_a_copy_further_mutation_does_not_leak() {
        let factory = DynamicTypeBuilderFactory::new();
        let i32t = factory.create_primitive(TypeKind::Int32);
        let mut builder = factory.create_structure_builder("S");
        builder.add_member(MemberDescriptor::new("a", i32t.clone())).unwrap();
        let frozen = builder.build().unwrap();
        builder.add_member(MemberDescriptor::new("b", i32t)).unwrap();
        assert_eq!(frozen.member_count(), 1);
    }

    #[test]
    fn leak_tracking_counts_unbuild_builders() {
        let factory = DynamicTypeBuilderFactory::with_leak_tracking();
        let i32t = factory.create_primitive(TypeKind::Int32);
        let _builder = factory.create_structure_builder("S");
        let _ = i32t;
        assert_eq!(factory.outstanding_count(), Some(1));
    }
}
