// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Return code taxonomy for the dynamic types runtime.
//!
//! Every fallible operation on `TypeDescriptor`, `DynamicTypeBuilder`, and
//! `DynamicData` returns a `ReturnCode` rather than a richer error type: the
//! callers are generic (content filters, discovery bridges, wire codecs) and
//! don't benefit from per-variant payloads the way `dds::Error` does.

/// Outcome of a dynamic-types operation.
///
/// The full taxonomy is exposed even though only a subset is produced by
/// this crate today (see the module-level docs on [`dynamic`](crate::dynamic)
/// for which operations return which codes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReturnCode {
    /// Operation completed normally.
    Ok,
    /// Catch-all for unexpected internal state; should not occur on valid inputs.
    Error,
    /// Requested feature or operation is not supported.
    Unsupported,
    /// Wrong id, wrong accessor type, inconsistent descriptor, duplicate member/label.
    BadParameter,
    /// Return-of-loan with an alien id, or mutation of a loaned member via the parent.
    PreconditionNotMet,
    /// Insertion past a bounded collection's capacity.
    OutOfResources,
    NotEnabled,
    ImmutablePolicy,
    InconsistentPolicy,
    /// Double delete observed by the data factory's tracker.
    AlreadyDeleted,
    Timeout,
    NoData,
    IllegalOperation,
    NotAllowedBySecurity,
}

impl ReturnCode {
    /// `true` for [`ReturnCode::Ok`].
    #[must_use]
    pub fn is_ok(self) -> bool {
        matches!(self, ReturnCode::Ok)
    }
}

impl std::fmt::Display for ReturnCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReturnCode::Ok => write!(f, "ok"),
            ReturnCode::Error => write!(f, "internal error"),
            ReturnCode::Unsupported => write!(f, "unsupported operation"),
            ReturnCode::BadParameter => write!(f, "bad parameter"),
            ReturnCode::PreconditionNotMet => write!(f, "precondition not met"),
            ReturnCode::OutOfResources => write!(f, "out of resources"),
            ReturnCode::NotEnabled => write!(f, "not enabled"),
            ReturnCode::ImmutablePolicy => write!(f, "immutable policy"),
            ReturnCode::InconsistentPolicy => write!(f, "inconsistent policy"),
            ReturnCode::AlreadyDeleted => write!(f, "already deleted"),
            ReturnCode::Timeout => write!(f, "timeout"),
            ReturnCode::NoData => write!(f, "no data"),
            ReturnCode::IllegalOperation => write!(f, "illegal operation"),
            ReturnCode::NotAllowedBySecurity => write!(f, "not allowed by security"),
        }
    }
}

impl std::error::Error for ReturnCode {}

/// Convenient alias for dynamic-types operations returning a [`ReturnCode`].
pub type DynResult<T> = Result<T, ReturnCode>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_is_ok() {
        assert!(ReturnCode::Ok.is_ok());
        assert!(!ReturnCode::BadParameter.is_ok());
    }

    #[test]
    fn display_is_lowercase_and_stable() {
        assert_eq!(ReturnCode::BadParameter.to_string(), "bad parameter");
        assert_eq!(ReturnCode::AlreadyDeleted.to_string(), "already deleted");
    }
}
