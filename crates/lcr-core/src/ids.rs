// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deterministic identity for components, instances, connections, and the
//! records the sync/event engines hand out.
//!
//! `component_id` is derived from `(type, props, parent_id)` rather than
//! assigned by a counter so a reconnecting client that re-sends the same
//! `component_mount` lands on the same instance (see `registry::mount`).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Declares one of the runtime's string-backed id newtypes. Each kind of id
/// is a distinct type so a `ComponentId` can never stand in for a
/// `ClientId` at a call site; the string inside is whatever the generation
/// rules in this module (or the connected client) produced.
#[macro_export]
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        pub struct $name:ident;
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_string(self) -> String {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

crate::define_id! {
    /// Identifies a mount; stable for the lifetime of that mount, and
    /// reproducible from `(type, props, parent_id)` alone.
    pub struct ComponentId;
}

crate::define_id! {
    /// Identifies a concrete live instance behind a `ComponentId`. Unlike
    /// `ComponentId`, never reused even if the same component re-mounts.
    pub struct InstanceId;
}

crate::define_id! {
    /// Identifies one accepted duplex connection.
    pub struct ClientId;
}

crate::define_id! {
    /// Identifies one `StateOperation`.
    pub struct OpId;
}

crate::define_id! {
    /// Identifies one emitted `Event`.
    pub struct EventId;
}

crate::define_id! {
    /// Identifies one active `Subscription`.
    pub struct SubscriptionId;
}

crate::define_id! {
    /// Identifies a recorded `Conflict`.
    pub struct ConflictId;
}

/// Allocates the runtime-generated suffixes ids are built from (instance
/// suffixes, op/event/conflict ids, outbound frame ids). The daemon runs
/// [`UuidIdGen`]; tests inject [`SequentialIdGen`] so every minted id is
/// predictable.
pub trait IdGen: Clone + Send + Sync {
    fn next(&self) -> String;
}

/// Random, collision-free ids for production runtimes.
#[derive(Clone)]
pub struct UuidIdGen;

impl IdGen for UuidIdGen {
    fn next(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// Deterministic `prefix-1`, `prefix-2`, ... ids. Clones share one counter,
/// so subsystems built from the same generator never mint the same id
/// twice.
#[derive(Clone)]
pub struct SequentialIdGen {
    prefix: String,
    counter: Arc<AtomicU64>,
}

impl SequentialIdGen {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into(), counter: Arc::new(AtomicU64::new(0)) }
    }
}

impl IdGen for SequentialIdGen {
    fn next(&self) -> String {
        format!("{}-{}", self.prefix, self.counter.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

/// Errors raised while computing or parsing identity.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("hierarchy walk exceeded {0} hops, suspect a cycle")]
    CyclicHierarchy(usize),
    #[error("component_id '{0}' does not match the expected grammar")]
    MalformedComponentId(String),
}

/// Maximum number of `parent_id` hops [`walk_depth`] will follow before
/// concluding the hierarchy is cyclic.
pub const MAX_HIERARCHY_DEPTH: usize = 100;

/// FNV-1a, 64-bit, folded into base36. Used for both `component_id` hashes
/// and `fingerprint`s: cheap, stable across platforms, and good enough for
/// collision-avoidance on a namespaced-by-parent key space (not a security
/// boundary).
fn fnv1a_64(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;
    let mut hash = OFFSET;
    for b in bytes {
        hash ^= *b as u64;
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

/// Base36, lowercase, no leading zeros (except for the value zero itself).
fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).expect("base36 digits are ASCII")
}

/// Canonical JSON used as hash input: sorted keys, no whitespace.
fn canonical_json(value: &serde_json::Value) -> String {
    fn sort(value: &serde_json::Value) -> serde_json::Value {
        match value {
            serde_json::Value::Object(map) => {
                let mut sorted = serde_json::Map::new();
                let mut keys: Vec<_> = map.keys().cloned().collect();
                keys.sort();
                for k in keys {
                    sorted.insert(k.clone(), sort(&map[&k]));
                }
                serde_json::Value::Object(sorted)
            }
            serde_json::Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(sort).collect())
            }
            other => other.clone(),
        }
    }
    serde_json::to_string(&sort(value)).expect("json values always serialize")
}

/// Lowercase a type name for use in `component_id`/`path` segments.
pub fn type_slug(type_name: &str) -> String {
    type_name.to_ascii_lowercase()
}

/// Compute `hash36` over `(type, props, parent_id?)`.
pub fn identity_hash(type_name: &str, props: &serde_json::Value, parent_id: Option<&ComponentId>) -> String {
    let input = serde_json::json!({
        "type": type_name,
        "props": props,
        "parent_id": parent_id.map(|p| p.as_str()),
    });
    to_base36(fnv1a_64(canonical_json(&input).as_bytes()))
}

/// Compute the hydration `fingerprint` over `(type, props, initial_state)`.
pub fn fingerprint(type_name: &str, props: &serde_json::Value, initial_state: &serde_json::Value) -> String {
    let input = serde_json::json!({
        "type": type_name,
        "props": props,
        "initial_state": initial_state,
    });
    to_base36(fnv1a_64(canonical_json(&input).as_bytes()))
}

/// Build a `component_id` of the form
/// `[parent_path.]<type>-<hash36>-<ts36>[-<disambiguator>]`.
pub fn make_component_id(
    type_name: &str,
    props: &serde_json::Value,
    parent_id: Option<&ComponentId>,
    parent_path: Option<&str>,
    mounted_at_ms: u64,
    disambiguator: Option<&str>,
) -> ComponentId {
    let slug = type_slug(type_name);
    let hash36 = identity_hash(type_name, props, parent_id);
    let ts36 = to_base36(mounted_at_ms);
    let mut body = format!("{slug}-{hash36}-{ts36}");
    if let Some(d) = disambiguator {
        body.push('-');
        body.push_str(d);
    }
    let full = match parent_path {
        Some(p) if !p.is_empty() => format!("{p}.{body}"),
        _ => body,
    };
    ComponentId::new(full)
}

/// Allocate a never-reused `instance_id` for a freshly created mount.
pub fn make_instance_id(component_id: &ComponentId, gen: &impl IdGen) -> InstanceId {
    InstanceId::new(format!("{}~{}", component_id.as_str(), gen.next()))
}

/// Grammar:
/// `^([a-z0-9.-]+\.)?[A-Za-z][A-Za-z0-9]*-[a-z0-9]+-[a-z0-9]+(-[a-z0-9]+)*$`
fn is_valid_segment_char(c: char) -> bool {
    c.is_ascii_alphanumeric()
}

/// Parsed structure of a `component_id`, reversible back into the original
/// string via [`ParsedComponentId::to_component_id`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedComponentId {
    pub parent_path: Option<String>,
    pub type_slug: String,
    pub hash36: String,
    pub ts36: String,
    pub disambiguator: Option<String>,
}

impl fmt::Display for ParsedComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(p) = &self.parent_path {
            write!(f, "{p}.")?;
        }
        write!(f, "{}-{}-{}", self.type_slug, self.hash36, self.ts36)?;
        if let Some(d) = &self.disambiguator {
            write!(f, "-{d}")?;
        }
        Ok(())
    }
}

impl ParsedComponentId {
    pub fn to_component_id(&self) -> ComponentId {
        ComponentId::new(self.to_string())
    }
}

/// Parse a `component_id` string into its structured parts. Fails with
/// [`IdentityError::MalformedComponentId`] if the grammar doesn't match.
pub fn parse_component_id(raw: &str) -> Result<ParsedComponentId, IdentityError> {
    let malformed = || IdentityError::MalformedComponentId(raw.to_string());

    let (parent_path, rest) = match raw.rfind('.') {
        Some(idx) => (Some(raw[..idx].to_string()), &raw[idx + 1..]),
        None => (None, raw),
    };
    if let Some(p) = &parent_path {
        if p.is_empty() || !p.chars().all(|c| is_valid_segment_char(c) || c == '.' || c == '-') {
            return Err(malformed());
        }
    }

    let parts: Vec<&str> = rest.split('-').collect();
    if parts.len() < 3 {
        return Err(malformed());
    }
    let type_slug = parts[0];
    if type_slug.is_empty() || !type_slug.chars().next().unwrap().is_ascii_alphabetic() {
        return Err(malformed());
    }
    if !type_slug.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(malformed());
    }
    let hash36 = parts[1];
    let ts36 = parts[2];
    if hash36.is_empty() || !hash36.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(malformed());
    }
    if ts36.is_empty() || !ts36.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(malformed());
    }
    let disambiguator = if parts.len() > 3 {
        let tail = parts[3..].join("-");
        if tail.is_empty() || !tail.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(malformed());
        }
        Some(tail)
    } else {
        None
    };

    Ok(ParsedComponentId {
        parent_path,
        type_slug: type_slug.to_string(),
        hash36: hash36.to_string(),
        ts36: ts36.to_string(),
        disambiguator,
    })
}

/// Walk `parent_id` via `lookup` until reaching a root (`None`), counting
/// hops. Fails with [`IdentityError::CyclicHierarchy`] past
/// [`MAX_HIERARCHY_DEPTH`] hops.
pub fn walk_depth<F>(start: &ComponentId, mut lookup: F) -> Result<usize, IdentityError>
where
    F: FnMut(&ComponentId) -> Option<ComponentId>,
{
    let mut depth = 0usize;
    let mut current = start.clone();
    loop {
        match lookup(&current) {
            None => return Ok(depth),
            Some(parent) => {
                depth += 1;
                if depth > MAX_HIERARCHY_DEPTH {
                    return Err(IdentityError::CyclicHierarchy(MAX_HIERARCHY_DEPTH));
                }
                current = parent;
            }
        }
    }
}

#[cfg(test)]
#[path = "ids_tests.rs"]
mod tests;
