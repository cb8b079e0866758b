// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::borrow::Borrow;
use std::collections::HashMap;

crate::define_id! {
    /// Id type used only by these tests.
    pub struct SampleId;
}

#[test]
fn display_and_as_str_agree() {
    let id = SampleId::new("abc");
    assert_eq!(id.as_str(), "abc");
    assert_eq!(id.to_string(), "abc");
}

#[test]
fn compares_against_plain_strings() {
    let id: SampleId = "sample".into();
    assert_eq!(id, "sample");
    assert_eq!(id, *"sample");
}

#[test]
fn map_lookup_by_str() {
    let mut map = HashMap::new();
    map.insert(SampleId::new("k"), 7);
    assert_eq!(map.get("k"), Some(&7));
    let id = SampleId::new("k");
    let borrowed: &str = id.borrow();
    assert_eq!(borrowed, "k");
}

#[test]
fn serializes_as_bare_string() {
    let json = serde_json::to_string(&SampleId::new("s-1")).unwrap();
    assert_eq!(json, "\"s-1\"");
    let back: SampleId = serde_json::from_str(&json).unwrap();
    assert_eq!(back, "s-1");
}

#[test]
fn sequential_gen_counts_from_one() {
    let gen = SequentialIdGen::new("sess");
    assert_eq!(gen.next(), "sess-1");
    let typed: SampleId = gen.mint();
    assert_eq!(typed, "sess-2");
}

#[test]
fn sequential_gen_clones_share_counter() {
    let a = SequentialIdGen::new("x");
    let b = a.clone();
    assert_eq!(a.next(), "x-1");
    assert_eq!(b.next(), "x-2");
}

#[test]
fn uuid_gen_applies_prefix_and_is_unique() {
    let gen = UuidIdGen::with_prefix("cli-");
    let first = gen.next();
    let second = gen.next();
    assert!(first.starts_with("cli-"));
    assert_eq!(first.len(), "cli-".len() + 36);
    assert_ne!(first, second);
}
