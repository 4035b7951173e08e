// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! `DynamicType`: an immutable, shareable type graph node.
//!
//! A `DynamicType` is a cheap `{Arc<TypeRegistry>, TypeHandle}` pair (see
//! `registry.rs` for why cross-references are handles rather than direct
//! references). It is the entry point for the codec helpers in `cdr.rs`.

use std::sync::Arc;

use super::annotation::AnnotationStore;
use super::ids::{MemberId, TypeKind};
use super::registry::{TypeHandle, TypeRegistry};
use super::type_descriptor::{DynamicTypeMember, TypeDescriptor};

/// A frozen, shareable type graph node. Produced exclusively by
/// `DynamicTypeBuilder::build()`; thereafter immutable.
#[derive(Clone, Debug)]
pub struct DynamicType {
    registry: Arc<TypeRegistry>,
    handle: TypeHandle,
}

impl DynamicType {
    pub(crate) fn new(registry: Arc<TypeRegistry>, handle: TypeHandle) -> Self {
        DynamicType { registry, handle }
    }

    #[must_use]
    pub fn handle(&self) -> TypeHandle {
        self.handle
    }

    pub(crate) fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// Build a `DynamicType` referring to a different node of the same
    /// underlying registry.
    pub(crate) fn resolve(&self, handle: TypeHandle) -> DynamicType {
        DynamicType {
            registry: self.registry.clone(),
            handle,
        }
    }

    #[must_use]
    pub fn descriptor(&self) -> Arc<TypeDescriptor> {
        self.registry.descriptor(self.handle)
    }

    #[must_use]
    pub fn annotations(&self) -> Arc<AnnotationStore> {
        self.registry.annotations(self.handle)
    }

    #[must_use]
    pub fn kind(&self) -> TypeKind {
        self.descriptor().kind
    }

    #[must_use]
    pub fn name(&self) -> String {
        self.descriptor().name.clone()
    }

    #[must_use]
    pub fn is_key_defined(&self) -> bool {
        self.descriptor().is_key_defined
    }

    #[must_use]
    pub fn base_type(&self) -> Option<DynamicType> {
        self.descriptor().base_type.map(|h| self.resolve(h))
    }

    #[must_use]
    pub fn discriminator_type(&self) -> Option<DynamicType> {
        self.descriptor().discriminator_type.map(|h| self.resolve(h))
    }

    #[must_use]
    pub fn element_type(&self) -> Option<DynamicType> {
        self.descriptor().element_type.map(|h| self.resolve(h))
    }

    #[must_use]
    pub fn key_element_type(&self) -> Option<DynamicType> {
        self.descriptor().key_element_type.map(|h| self.resolve(h))
    }

    #[must_use]
    pub fn total_bounds(&self) -> u32 {
        self.descriptor().total_bounds()
    }

    #[must_use]
    pub fn bit_bound(&self) -> u32 {
        self.annotations().bit_bound()
    }

    /// Storage width in bytes for a BITMASK: `ceil(bit_bound/8)` rounded up
    /// to one of `{1, 2, 4, 8}`.
    #[must_use]
    pub fn bitmask_storage_width(&self) -> usize {
        bitmask_storage_width(self.bit_bound())
    }

    #[must_use]
    pub fn member_count(&self) -> usize {
        self.descriptor().members.len()
    }

    #[must_use]
    pub fn get_member(&self, id: MemberId) -> Option<DynamicTypeMember> {
        self.descriptor().member_by_id(id).cloned()
    }

    #[must_use]
    pub fn get_member_by_name(&self, name: &str) -> Option<DynamicTypeMember> {
        self.descriptor().member_by_name(name).cloned()
    }

    #[must_use]
    pub fn get_member_id_by_name(&self, name: &str) -> MemberId {
        self.descriptor().member_id_by_name(name)
    }

    #[must_use]
    pub fn get_id_from_label(&self, label: i64) -> MemberId {
        self.descriptor().id_from_label(label)
    }

    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.descriptor().validate(&self.annotations(), &self.registry).is_ok()
    }

    /// STRUCTURE/BITSET inherited members (recursively through `base_type`,
    /// outermost ancestor first) followed by this type's own members, in
    /// declared order. Used by the codec and by `DynamicDataFactory` so a
    /// derived struct's child map can stay flat (one `MemberId` namespace
    /// across base and derived members).
    #[must_use]
    pub fn all_members_ordered(&self) -> Vec<DynamicTypeMember> {
        let mut out = Vec::new();
        if let Some(base) = self.base_type() {
            out.extend(base.all_members_ordered());
        }
        out.extend(self.descriptor().members.iter().cloned());
        out
    }

    /// Structural type equality: same kind, name, bounds, reference children
    /// (recursively), and member table. Cycle-safe via a visited-pair guard.
    #[must_use]
    pub fn equals(&self, other: &DynamicType) -> bool {
        let mut visited = std::collections::HashSet::new();
        types_equal(self, other, &mut visited)
    }
}

#[must_use]
pub fn bitmask_storage_width(bit_bound: u32) -> usize {
    let bytes = bit_bound.div_ceil(8) as usize;
    match bytes {
        0 | 1 => 1,
        2 => 2,
        3 | 4 => 4,
        _ => 8,
    }
}

fn types_equal(a: &DynamicType, b: &DynamicType, visited: &mut std::collections::HashSet<(TypeHandle, TypeHandle)>) -> bool {
    let key = (a.handle, b.handle);
    if !visited.insert(key) {
        return true; // already comparing this pair further up the recursion
    }
    let (da, db) = (a.descriptor(), b.descriptor());
    if da.kind != db.kind || da.name != db.name || da.bounds != db.bounds {
        return false;
    }
    if da.members.len() != db.members.len() {
        return false;
    }
    for (ma, mb) in da.members.iter().zip(db.members.iter()) {
        if ma.id != mb.id
            || ma.name != mb.name
            || ma.index != mb.index
            || ma.default_value_literal != mb.default_value_literal
            || ma.union_labels != mb.union_labels
            || ma.is_default_label != mb.is_default_label
        {
            return false;
        }
        if !types_equal(&a.resolve(ma.member_type), &b.resolve(mb.member_type), visited) {
            return false;
        }
    }
    match (da.base_type, db.base_type) {
        (Some(ha), Some(hb)) => {
            if !types_equal(&a.resolve(ha), &b.resolve(hb), visited) {
                return false;
            }
        }
        (None, None) => {}
        _ => return false,
    }
    match (da.discriminator_type, db.discriminator_type) {
        (Some(ha), Some(hb)) => {
            if !types_equal(&a.resolve(ha), &b.resolve(hb), visited) {
                return false;
            }
        }
        (None, None) => {}
        _ => return false,
    }
    match (da.element_type, db.element_type) {
        (Some(ha), Some(hb)) => types_equal(&a.resolve(ha), &b.resolve(hb), visited),
        (None, None) => true,
        _ => false,
    }
}
