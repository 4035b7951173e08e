// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! `TypeDescriptor` and `DynamicTypeMember`: the structural description of a
//! single type graph node, and the consistency checks a descriptor must
//! pass before a builder may freeze it into a `DynamicType`.

use std::collections::{BTreeSet, HashSet};

use super::annotation::AnnotationStore;
use super::ids::{MemberId, TypeKind};
use super::registry::{TypeHandle, TypeRegistry};
use crate::error::ReturnCode;

/// A member within an aggregate (STRUCTURE/UNION/BITSET), or a named flag
/// (BITMASK) / literal (ENUM).
#[derive(Debug, Clone)]
pub struct DynamicTypeMember {
    pub id: MemberId,
    pub name: String,
    pub index: usize,
    pub member_type: TypeHandle,
    /// String form of the member's default value, if any (also used to
    /// carry an ENUM literal's numeric value as decimal text).
    pub default_value_literal: Option<String>,
    /// UNION-only: the set of discriminator labels selecting this member.
    pub union_labels: BTreeSet<i64>,
    /// UNION-only: whether this member is the `default:` branch.
    pub is_default_label: bool,
    pub annotations: AnnotationStore,
}

impl DynamicTypeMember {
    #[must_use]
    pub fn new(id: MemberId, name: impl Into<String>, index: usize, member_type: TypeHandle) -> Self {
        DynamicTypeMember {
            id,
            name: name.into(),
            index,
            member_type,
            default_value_literal: None,
            union_labels: BTreeSet::new(),
            is_default_label: false,
            annotations: AnnotationStore::new(),
        }
    }
}

/// Structural description of a single type graph node. Cross-references to
/// other nodes (`base_type`, `discriminator_type`, `element_type`,
/// `key_element_type`, a member's `member_type`) are `TypeHandle`s into the
/// owning `TypeRegistry`.
#[derive(Debug, Clone)]
pub struct TypeDescriptor {
    pub kind: TypeKind,
    pub name: String,
    pub base_type: Option<TypeHandle>,
    pub discriminator_type: Option<TypeHandle>,
    pub element_type: Option<TypeHandle>,
    pub key_element_type: Option<TypeHandle>,
    /// String max length (STRING8/16), bit count (BITMASK/ENUM), one
    /// dimension per axis (ARRAY), capacity (SEQUENCE/MAP, 0 = unbounded).
    pub bounds: Vec<u32>,
    pub members: Vec<DynamicTypeMember>,
    /// Fixpoint cache: "this type or one of its members carries `@key`".
    pub is_key_defined: bool,
}

impl TypeDescriptor {
    #[must_use]
    pub fn leaf(kind: TypeKind, name: impl Into<String>) -> Self {
        TypeDescriptor {
            kind,
            name: name.into(),
            base_type: None,
            discriminator_type: None,
            element_type: None,
            key_element_type: None,
            bounds: Vec::new(),
            members: Vec::new(),
            is_key_defined: false,
        }
    }

    #[must_use]
    pub fn member_by_id(&self, id: MemberId) -> Option<&DynamicTypeMember> {
        self.members.iter().find(|m| m.id == id)
    }

    #[must_use]
    pub fn member_by_name(&self, name: &str) -> Option<&DynamicTypeMember> {
        self.members.iter().find(|m| m.name == name)
    }

    #[must_use]
    pub fn member_id_by_name(&self, name: &str) -> MemberId {
        self.member_by_name(name).map_or(MemberId::INVALID, |m| m.id)
    }

    /// ARRAY: product of `bounds` (0 if `bounds` is empty, which is itself
    /// an inconsistency caught by [`TypeDescriptor::validate`]).
    #[must_use]
    pub fn total_bounds(&self) -> u32 {
        self.bounds.iter().copied().fold(1u32, |acc, d| acc.saturating_mul(d))
    }

    /// UNION: the member whose label set contains `label`, falling back to
    /// the default-branch member, or `INVALID` if neither exists.
    #[must_use]
    pub fn id_from_label(&self, label: i64) -> MemberId {
        for m in &self.members {
            if !m.is_default_label && m.union_labels.contains(&label) {
                return m.id;
            }
        }
        self.members
            .iter()
            .find(|m| m.is_default_label)
            .map_or(MemberId::INVALID, |m| m.id)
    }

    /// Validates every §3 structural invariant reachable from this node.
    /// `annotations` are this node's own annotations (bit_bound lives there,
    /// not on the descriptor). Does not recurse into referenced nodes'
    /// *members* (those were validated when they themselves were built);
    /// it does resolve referenced nodes' `kind` to check eligibility rules.
    pub fn validate(&self, annotations: &AnnotationStore, registry: &TypeRegistry) -> Result<(), ReturnCode> {
        let mut seen_ids = HashSet::new();
        let mut seen_names = HashSet::new();
        for (i, m) in self.members.iter().enumerate() {
            if m.index != i {
                return Err(ReturnCode::BadParameter);
            }
            if !seen_ids.insert(m.id) {
                return Err(ReturnCode::BadParameter);
            }
            if !m.name.is_empty() && !seen_names.insert(m.name.as_str()) {
                return Err(ReturnCode::BadParameter);
            }
        }

        match self.kind {
            TypeKind::Union => {
                let disc = self.discriminator_type.ok_or(ReturnCode::BadParameter)?;
                if !registry.descriptor(disc).kind.is_discriminator_eligible() {
                    return Err(ReturnCode::BadParameter);
                }
                let mut seen_labels = HashSet::new();
                let mut default_count = 0u32;
                for m in &self.members {
                    if m.is_default_label {
                        default_count += 1;
                        continue;
                    }
                    for label in &m.union_labels {
                        if !seen_labels.insert(*label) {
                            return Err(ReturnCode::BadParameter);
                        }
                    }
                }
                if default_count > 1 {
                    return Err(ReturnCode::BadParameter);
                }
            }
            TypeKind::Array => {
                if self.bounds.is_empty() || self.bounds.iter().any(|b| *b == 0) {
                    return Err(ReturnCode::BadParameter);
                }
            }
            TypeKind::Bitmask => {
                let bit_bound = annotations.bit_bound();
                if !(1..=64).contains(&bit_bound) {
                    return Err(ReturnCode::BadParameter);
                }
                if self.members.len() as u32 > bit_bound {
                    return Err(ReturnCode::BadParameter);
                }
                if self.members.iter().any(|m| m.id.0 >= bit_bound) {
                    return Err(ReturnCode::BadParameter);
                }
            }
            TypeKind::Enum => {
                if self.members.is_empty() {
                    return Err(ReturnCode::BadParameter);
                }
                for m in &self.members {
                    let fits = m
                        .default_value_literal
                        .as_deref()
                        .and_then(|v| v.parse::<i64>().ok())
                        .is_some_and(|v| i64::from(i32::MIN) <= v && v <= i64::from(i32::MAX));
                    if !fits {
                        return Err(ReturnCode::BadParameter);
                    }
                }
            }
            TypeKind::Alias => {
                let mut seen = HashSet::new();
                let mut current = self.base_type.ok_or(ReturnCode::BadParameter)?;
                loop {
                    if !seen.insert(current) {
                        return Err(ReturnCode::BadParameter);
                    }
                    let d = registry.descriptor(current);
                    if d.kind != TypeKind::Alias {
                        break;
                    }
                    current = d.base_type.ok_or(ReturnCode::BadParameter)?;
                }
            }
            TypeKind::String8 | TypeKind::String16 => {
                if self.bounds.len() != 1 {
                    return Err(ReturnCode::BadParameter);
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Fixpoint of: any member with `@key`, a base type that has it, or the
    /// member-type of any constituent member having it. Cycles through
    /// self-referential members resolve to `false` unless directly
    /// `@key`-annotated (a one-pass approximation; see `DESIGN.md`).
    #[must_use]
    pub fn compute_is_key_defined(&self, registry: &TypeRegistry) -> bool {
        if self.members.iter().any(|m| m.annotations.is_key()) {
            return true;
        }
        if let Some(base) = self.base_type {
            if registry.descriptor(base).is_key_defined {
                return true;
            }
        }
        self.members
            .iter()
            .any(|m| registry.descriptor(m.member_type).is_key_defined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reg() -> std::sync::Arc<TypeRegistry> {
        TypeRegistry::new()
    }

    #[test]
    fn duplicate_member_ids_are_rejected() {
        let registry = reg();
        let i32h = registry.insert(TypeDescriptor::leaf(TypeKind::Int32, ""), AnnotationStore::new());
        let mut desc = TypeDescriptor::leaf(TypeKind::Structure, "S");
        desc.members.push(DynamicTypeMember::new(MemberId(0), "a", 0, i32h));
        desc.members.push(DynamicTypeMember::new(MemberId(0), "b", 1, i32h));
        assert_eq!(desc.validate(&AnnotationStore::new(), &registry), Err(ReturnCode::BadParameter));
    }

    #[test]
    fn union_rejects_overlapping_labels() {
        let registry = reg();
        let disc = registry.insert(TypeDescriptor::leaf(TypeKind::Int32, ""), AnnotationStore::new());
        let branch = registry.insert(TypeDescriptor::leaf(TypeKind::Int16, ""), AnnotationStore::new());
        let mut desc = TypeDescriptor::leaf(TypeKind::Union, "U");
        desc.discriminator_type = Some(disc);
        let mut m0 = DynamicTypeMember::new(MemberId(0), "a", 0, branch);
        m0.union_labels.insert(1);
        let mut m1 = DynamicTypeMember::new(MemberId(1), "b", 1, branch);
        m1.union_labels.insert(1);
        desc.members.push(m0);
        desc.members.push(m1);
        assert_eq!(desc.validate(&AnnotationStore::new(), &registry), Err(ReturnCode::BadParameter));
    }

    #[test]
    fn array_requires_nonempty_positive_bounds() {
        let registry = reg();
        let mut desc = TypeDescriptor::leaf(TypeKind::Array, "");
        assert_eq!(desc.validate(&AnnotationStore::new(), &registry), Err(ReturnCode::BadParameter));
        desc.bounds = vec![0];
        assert_eq!(desc.validate(&AnnotationStore::new(), &registry), Err(ReturnCode::BadParameter));
        desc.bounds = vec![3];
        assert_eq!(desc.validate(&AnnotationStore::new(), &registry), Ok(()));
    }

    #[test]
    fn bitmask_rejects_flag_position_past_bit_bound() {
        let registry = reg();
        let mut desc = TypeDescriptor::leaf(TypeKind::Bitmask, "Flags");
        let elem = registry.insert(TypeDescriptor::leaf(TypeKind::Boolean, ""), AnnotationStore::new());
        desc.members.push(DynamicTypeMember::new(MemberId(9), "hi", 0, elem));
        let mut ann = AnnotationStore::new();
        ann.apply(crate::dynamic::annotation::AnnotationDescriptor::with_value("bit_bound", "9"));
        assert_eq!(desc.validate(&ann, &registry), Err(ReturnCode::BadParameter));
    }

    #[test]
    fn alias_cycle_is_rejected() {
        let registry = reg();
        let mut a = TypeDescriptor::leaf(TypeKind::Alias, "A");
        let b_handle_placeholder = registry.insert(TypeDescriptor::leaf(TypeKind::Alias, "B"), AnnotationStore::new());
        a.base_type = Some(b_handle_placeholder);
        let a_handle = registry.insert(a, AnnotationStore::new());
        // Rewrite B to point back at A by inserting a fresh node (arena is
        // append-only) and re-checking against the cyclic pair directly.
        let mut b = TypeDescriptor::leaf(TypeKind::Alias, "B");
        b.base_type = Some(a_handle);
        assert_eq!(b.validate(&AnnotationStore::new(), &registry), Err(ReturnCode::BadParameter));
    }
}
