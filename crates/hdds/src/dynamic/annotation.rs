// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! `AnnotationStore`: typed access to the well-known annotations carried by
//! a `TypeDescriptor` or `DynamicTypeMember`.
//!
//! Grounded on `AnnotationManager.cpp` in the Fast-DDS `v1_3` dynamic types
//! (well-known annotation name set, FINAL default extensibility, bit_bound
//! default of 32), expressed as a small ordered multiset rather than the
//! original's annotation-descriptor vector with a string-keyed parameter map
//! lookup on every access.

use std::collections::BTreeMap;

/// A single applied annotation: its name (`key`, `optional`, `extensibility`, …)
/// and a flat parameter map. Single-value annotations (`@bit_bound(12)`) store
/// their value under the conventional `"value"` key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnnotationDescriptor {
    pub name: String,
    pub params: BTreeMap<String, String>,
}

impl AnnotationDescriptor {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        AnnotationDescriptor {
            name: name.into(),
            params: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_value(name: impl Into<String>, value: impl Into<String>) -> Self {
        let mut d = AnnotationDescriptor::new(name);
        d.params.insert("value".to_string(), value.into());
        d
    }
}

/// Extensibility kind, narrowed from `@final`/`@appendable`/`@mutable` or the
/// equivalent `@extensibility(FINAL|APPENDABLE|MUTABLE)` form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Extensibility {
    #[default]
    Final,
    Appendable,
    Mutable,
}

/// Ordered multiset of `AnnotationDescriptor`s. Setters are upsert-by-name:
/// applying the same name twice replaces the prior entry and moves it to the
/// back, which is why this is a multiset and not a map.
#[derive(Debug, Clone, Default)]
pub struct AnnotationStore {
    entries: Vec<AnnotationDescriptor>,
}

impl AnnotationStore {
    #[must_use]
    pub fn new() -> Self {
        AnnotationStore::default()
    }

    /// Idempotent upsert by annotation name.
    pub fn apply(&mut self, descriptor: AnnotationDescriptor) {
        self.entries.retain(|e| e.name != descriptor.name);
        self.entries.push(descriptor);
    }

    /// Convenience for name-only annotations (`@key`, `@optional`, …).
    pub fn apply_flag(&mut self, name: &str) {
        self.apply(AnnotationDescriptor::new(name));
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&AnnotationDescriptor> {
        self.entries.iter().find(|e| e.name == name)
    }

    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    #[must_use]
    pub fn iter(&self) -> impl Iterator<Item = &AnnotationDescriptor> {
        self.entries.iter()
    }

    fn param(&self, name: &str, param: &str) -> Option<&str> {
        self.get(name).and_then(|d| d.params.get(param)).map(String::as_str)
    }

    #[must_use]
    pub fn get_bool(&self, name: &str) -> bool {
        match self.param(name, "value") {
            Some(v) => v == "true",
            None => self.has(name),
        }
    }

    #[must_use]
    pub fn get_i64(&self, name: &str, param: &str, default: i64) -> i64 {
        self.param(name, param).and_then(|v| v.parse().ok()).unwrap_or(default)
    }

    #[must_use]
    pub fn get_string(&self, name: &str, param: &str) -> Option<String> {
        self.param(name, param).map(str::to_string)
    }

    /// `@key` or the legacy `@epkey` alias.
    #[must_use]
    pub fn is_key(&self) -> bool {
        self.get_bool("key") || self.get_bool("epkey")
    }

    #[must_use]
    pub fn is_optional(&self) -> bool {
        self.get_bool("optional")
    }

    #[must_use]
    pub fn is_must_understand(&self) -> bool {
        self.get_bool("must_understand")
    }

    #[must_use]
    pub fn is_non_serialized(&self) -> bool {
        self.get_bool("non_serialized")
    }

    #[must_use]
    pub fn is_external(&self) -> bool {
        self.get_bool("external")
    }

    #[must_use]
    pub fn is_nested(&self) -> bool {
        self.get_bool("nested")
    }

    #[must_use]
    pub fn position(&self) -> Option<u32> {
        self.param("position", "value").and_then(|v| v.parse().ok())
    }

    #[must_use]
    pub fn default_literal(&self) -> Option<String> {
        self.get_string("default", "value")
            .or_else(|| self.get_string("default_literal", "value"))
    }

    /// Default bit width when `@bit_bound` is absent is 32.
    #[must_use]
    pub fn bit_bound(&self) -> u32 {
        let v = self.get_i64("bit_bound", "value", 32);
        v.clamp(1, 64) as u32
    }

    /// `@mutable`/`@final`/`@appendable` shorthands and the explicit
    /// `@extensibility(KIND)` form are equivalent; FINAL is the default.
    #[must_use]
    pub fn extensibility(&self) -> Extensibility {
        if self.has("mutable") {
            return Extensibility::Mutable;
        }
        if self.has("appendable") {
            return Extensibility::Appendable;
        }
        if self.has("final") {
            return Extensibility::Final;
        }
        match self.get_string("extensibility", "value").as_deref() {
            Some("MUTABLE") => Extensibility::Mutable,
            Some("APPENDABLE") => Extensibility::Appendable,
            _ => Extensibility::Final,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_is_idempotent_and_reorders() {
        let mut store = AnnotationStore::new();
        store.apply_flag("key");
        store.apply(AnnotationDescriptor::with_value("bit_bound", "12"));
        store.apply_flag("key");
        assert_eq!(store.iter().count(), 2);
        assert_eq!(store.iter().last().unwrap().name, "key");
    }

    #[test]
    fn bit_bound_defaults_to_32() {
        assert_eq!(AnnotationStore::new().bit_bound(), 32);
        let mut s = AnnotationStore::new();
        s.apply(AnnotationDescriptor::with_value("bit_bound", "9"));
        assert_eq!(s.bit_bound(), 9);
    }

    #[test]
    fn extensibility_shorthands_match_explicit_form() {
        let mut a = AnnotationStore::new();
        a.apply_flag("mutable");
        let mut b = AnnotationStore::new();
        b.apply(AnnotationDescriptor::with_value("extensibility", "MUTABLE"));
        assert_eq!(a.extensibility(), Extensibility::Mutable);
        assert_eq!(b.extensibility(), Extensibility::Mutable);
        assert_eq!(AnnotationStore::new().extensibility(), Extensibility::Final);
    }

    #[test]
    fn key_and_epkey_are_equivalent() {
        let mut a = AnnotationStore::new();
        a.apply_flag("key");
        let mut b = AnnotationStore::new();
        b.apply_flag("epkey");
        assert!(a.is_key());
        assert!(b.is_key());
    }
}
