// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! `TypeRegistry`: the shared arena backing cyclic type graphs.
//!
//! A struct referencing a sequence of itself (directly, or through a chain
//! of aliases/structures) cannot be represented with owning references
//! without unsafe code or reference counting cycles. Following the arena
//! strategy, every `TypeDescriptor` cross-reference (`base_type`,
//! `element_type`, a member's `member_type`, …) is a small integer
//! `TypeHandle` into a shared arena instead of a direct reference. The arena
//! owns every node and is dropped as a whole; no node owns another, so
//! cycles require nothing special.

use std::sync::Arc;

use parking_lot::Mutex;

use super::annotation::AnnotationStore;
use super::type_descriptor::TypeDescriptor;

/// Integer handle into a `TypeRegistry`. Cheap to copy, meaningless outside
/// the registry that minted it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeHandle(u32);

impl TypeHandle {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug)]
struct TypeNode {
    descriptor: Arc<TypeDescriptor>,
    annotations: Arc<AnnotationStore>,
}

/// Append-only arena of frozen `TypeDescriptor` nodes.
///
/// Insertion is the only mutation: once a `DynamicTypeBuilder::build()` call
/// interns a descriptor, the resulting node never changes again (copy-on-build
/// semantics live in the builder, not here). A `parking_lot::Mutex` guards
/// the node list, matching the registry's requirement that registration be
/// safe to call from any thread.
#[derive(Default, Debug)]
pub struct TypeRegistry {
    nodes: Mutex<Vec<TypeNode>>,
}

impl TypeRegistry {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(TypeRegistry::default())
    }

    pub(crate) fn insert(&self, descriptor: TypeDescriptor, annotations: AnnotationStore) -> TypeHandle {
        let mut nodes = self.nodes.lock();
        let handle = TypeHandle(nodes.len() as u32);
        nodes.push(TypeNode {
            descriptor: Arc::new(descriptor),
            annotations: Arc::new(annotations),
        });
        handle
    }

    pub(crate) fn descriptor(&self, handle: TypeHandle) -> Arc<TypeDescriptor> {
        self.nodes.lock()[handle.index()].descriptor.clone()
    }

    pub(crate) fn annotations(&self, handle: TypeHandle) -> Arc<AnnotationStore> {
        self.nodes.lock()[handle.index()].annotations.clone()
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.lock().len()
    }
}
