// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! `DynamicDataFactory`: lifecycle management for `DynamicData` values.
//!
//! Mirrors `DynamicTypeBuilderFactory`'s context-object shape (explicit
//! construction, a static `ambient()` convenience, optional leak tracking)
//! but tracks instances instead of builders, since `delete_data`'s
//! idempotency behavior depends on whether an instance is still outstanding.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use parking_lot::Mutex;

use super::dynamic_data::DynamicData;
use super::dynamic_type::DynamicType;
use crate::error::ReturnCode;

/// Opaque handle an outstanding `DynamicData` is tracked under when the
/// owning factory has tracking enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DataHandle(u64);

/// Process-wide-by-convention context for `create_data`/`delete_data`.
///
/// Without tracking, `delete_data` on an already-deleted value is a silent
/// no-op. With tracking, a double-delete returns `ALREADY_DELETED` because
/// the factory can tell the handle was already retired (see `DESIGN.md` for
/// why this split exists: the governing contract's "idempotent... unless
/// tracking is enabled" wording is otherwise ambiguous).
pub struct DynamicDataFactory {
    next_handle: AtomicU64,
    outstanding: Option<Mutex<HashSet<u64>>>,
}

impl DynamicDataFactory {
    #[must_use]
    pub fn new() -> Self {
        DynamicDataFactory {
            next_handle: AtomicU64::new(0),
            outstanding: None,
        }
    }

    #[must_use]
    pub fn with_leak_tracking() -> Self {
        DynamicDataFactory {
            next_handle: AtomicU64::new(0),
            outstanding: Some(Mutex::new(HashSet::new())),
        }
    }

    pub fn ambient() -> &'static DynamicDataFactory {
        static AMBIENT: OnceLock<DynamicDataFactory> = OnceLock::new();
        AMBIENT.get_or_init(DynamicDataFactory::new)
    }

    #[must_use]
    pub fn is_tracking(&self) -> bool {
        self.outstanding.is_some()
    }

    #[must_use]
    pub fn outstanding_count(&self) -> Option<usize> {
        self.outstanding.as_ref().map(|s| s.lock().len())
    }

    /// Creates a value per the default-construction rules of
    /// `DynamicData::create`, optionally registering a handle for leak
    /// tracking.
    #[must_use]
    pub fn create_data(&self, data_type: DynamicType) -> (DynamicData, Option<DataHandle>) {
        let data = DynamicData::create(data_type);
        let handle = self.outstanding.as_ref().map(|set| {
            let id = self.next_handle.fetch_add(1, Ordering::Relaxed);
            set.lock().insert(id);
            DataHandle(id)
        });
        (data, handle)
    }

    /// Retires `data`. `data.deleted` already short-circuits an untracked
    /// double-delete to `Ok(())`; when tracking is enabled and `handle` was
    /// already retired (or never issued by this factory), returns
    /// `ALREADY_DELETED`.
    pub fn delete_data(&self, data: &mut DynamicData, handle: Option<DataHandle>) -> Result<(), ReturnCode> {
        if data.has_outstanding_loans() {
            return Err(ReturnCode::PreconditionNotMet);
        }
        match (&self.outstanding, handle) {
            (Some(set), Some(h)) => {
                if !set.lock().remove(&h.0) {
                    return Err(ReturnCode::AlreadyDeleted);
                }
            }
            (Some(_), None) => return Err(ReturnCode::BadParameter),
            (None, _) => {
                if data.deleted {
                    return Ok(());
                }
            }
        }
        data.deleted = true;
        Ok(())
    }
}

impl Default for DynamicDataFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamic::builder::DynamicTypeBuilderFactory;
    use crate::dynamic::ids::TypeKind;

    #[test]
    fn untracked_double_delete_is_a_silent_no_op() {
        let types = DynamicTypeBuilderFactory::new();
        let factory = DynamicDataFactory::new();
        let i32t = types.create_primitive(TypeKind::Int32);
        let (mut data, handle) = factory.create_data(i32t);
        assert!(handle.is_none());
        factory.delete_data(&mut data, None).unwrap();
        assert_eq!(factory.delete_data(&mut data, None), Ok(()));
    }

    #[test]
    fn tracked_double_delete_is_rejected() {
        let types = DynamicTypeBuilderFactory::new();
        let factory = DynamicDataFactory::with_leak_tracking();
        let i32t = types.create_primitive(TypeKind::Int32);
        let (mut data, handle) = factory.create_data(i32t);
        let handle = handle.unwrap();
        factory.delete_data(&mut data, Some(handle)).unwrap();
        assert_eq!(factory.delete_data(&mut data, Some(handle)), Err(ReturnCode::AlreadyDeleted));
    }

    #[test]
    fn delete_with_outstanding_loan_is_rejected() {
        let types = DynamicTypeBuilderFactory::new();
        let factory = DynamicDataFactory::new();
        let mut builder = types.create_structure_builder("S");
        let i32t = types.create_primitive(TypeKind::Int32);
        let id = builder
            .add_member(crate::dynamic::builder::MemberDescriptor::new("a", i32t))
            .unwrap();
        let t = builder.build().unwrap();
        let (mut data, _) = factory.create_data(t);
        let _loan = data.loan_value(id).unwrap();
        assert_eq!(factory.delete_data(&mut data, None), Err(ReturnCode::PreconditionNotMet));
    }
}
