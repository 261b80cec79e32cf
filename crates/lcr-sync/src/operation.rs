// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `StateOperation`, the atomic mutation descriptor, and the eight ways it
//! can rewrite a component's state value.

use crate::error::SyncError;
use lcr_core::{ClientId, ComponentId, OpId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    Set,
    Merge,
    Delete,
    Inc,
    Dec,
    Push,
    Pop,
    Splice,
}

/// An atomic mutation against one component's state. `path` is a dotted key
/// path; an empty path addresses the state root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateOperation {
    pub op_id: OpId,
    pub component_id: ComponentId,
    pub op: OpKind,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_value: Option<Value>,
    pub timestamp: u64,
    pub origin_client_id: ClientId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    #[serde(default)]
    pub optimistic: bool,
}

impl StateOperation {
    pub fn new(
        op_id: OpId,
        component_id: ComponentId,
        op: OpKind,
        path: impl Into<String>,
        value: Value,
        timestamp: u64,
        origin_client_id: ClientId,
    ) -> Self {
        Self {
            op_id,
            component_id,
            op,
            path: path.into(),
            value,
            prev_value: None,
            timestamp,
            origin_client_id,
            version: None,
            optimistic: false,
        }
    }

    pub fn optimistic(mut self) -> Self {
        self.optimistic = true;
        self
    }

    fn segments(&self) -> Vec<&str> {
        split_path(&self.path)
    }
}

fn split_path(path: &str) -> Vec<&str> {
    if path.is_empty() {
        Vec::new()
    } else {
        path.split('.').collect()
    }
}

fn ensure_object_mut(v: &mut Value) -> &mut Map<String, Value> {
    if !v.is_object() {
        *v = Value::Object(Map::new());
    }
    match v {
        Value::Object(map) => map,
        _ => unreachable!("just normalized to an object"),
    }
}

/// Walks to the parent container of the final path segment, creating missing
/// intermediate objects along the way. Returns `None` only when `path` is
/// empty (the root has no parent).
fn parent_mut<'a>(state: &'a mut Value, segments: &[&'a str]) -> Option<(&'a mut Map<String, Value>, &'a str)> {
    let (last, init) = segments.split_last()?;
    let mut cur = state;
    for seg in init {
        let map = ensure_object_mut(cur);
        cur = map.entry(seg.to_string()).or_insert_with(|| Value::Object(Map::new()));
    }
    Some((ensure_object_mut(cur), last))
}

/// Returns the parent container without creating anything, or `None` if any
/// segment along the way is absent.
#[cfg(test)]
fn parent_ref<'a>(state: &'a Value, segments: &[&'a str]) -> Option<(&'a Map<String, Value>, &'a str)> {
    let (last, init) = segments.split_last()?;
    let mut cur = state;
    for seg in init {
        cur = cur.as_object()?.get(*seg)?;
    }
    Some((cur.as_object()?, last))
}

fn as_number(v: &Value) -> f64 {
    v.as_f64().unwrap_or(0.0)
}

fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < (i64::MAX as f64) {
        Value::from(n as i64)
    } else {
        Value::from(n)
    }
}

/// Applies `op` against `state` in place and returns the value the path held
/// immediately beforehand (`Value::Null` if it was absent).
pub fn apply(state: &mut Value, op: &StateOperation) -> Result<Value, SyncError> {
    let segments = op.segments();
    match op.op {
        OpKind::Set => {
            if segments.is_empty() {
                return Ok(std::mem::replace(state, op.value.clone()));
            }
            let Some((map, key)) = parent_mut(state, &segments) else {
                return Ok(Value::Null);
            };
            Ok(map.insert(key.to_string(), op.value.clone()).unwrap_or(Value::Null))
        }
        OpKind::Merge => {
            let Value::Object(patch) = &op.value else {
                return Err(SyncError::MergeTargetNotObject(op.path.clone()));
            };
            let target = if segments.is_empty() {
                state
            } else {
                let Some((map, key)) = parent_mut(state, &segments) else {
                    unreachable!("merge path already checked non-empty")
                };
                map.entry(key.to_string()).or_insert_with(|| Value::Object(Map::new()))
            };
            if !target.is_object() && !target.is_null() {
                return Err(SyncError::MergeTargetNotObject(op.path.clone()));
            }
            let prev = target.clone();
            let map = ensure_object_mut(target);
            for (k, v) in patch {
                map.insert(k.clone(), v.clone());
            }
            Ok(prev)
        }
        OpKind::Delete => {
            if segments.is_empty() {
                return Ok(std::mem::replace(state, Value::Null));
            }
            let Some((last, init)) = segments.split_last() else {
                return Ok(Value::Null);
            };
            let mut cur = &mut *state;
            for seg in init {
                match cur.as_object_mut().and_then(|m| m.get_mut(*seg)) {
                    Some(next) => cur = next,
                    None => return Ok(Value::Null),
                }
            }
            match cur.as_object_mut() {
                Some(map) => Ok(map.remove(*last).unwrap_or(Value::Null)),
                None => Ok(Value::Null),
            }
        }
        OpKind::Inc | OpKind::Dec => {
            let delta = if op.value.is_null() { 1.0 } else { as_number(&op.value) };
            let delta = if op.op == OpKind::Dec { -delta } else { delta };
            if segments.is_empty() {
                if !state.is_null() && !state.is_number() {
                    return Err(SyncError::NotNumeric(op.path.clone()));
                }
                let prev = state.clone();
                *state = number_value(as_number(state) + delta);
                return Ok(prev);
            }
            let Some((map, key)) = parent_mut(state, &segments) else {
                unreachable!("checked non-empty above")
            };
            let current = map.get(key).cloned().unwrap_or(Value::Null);
            if !current.is_null() && !current.is_number() {
                return Err(SyncError::NotNumeric(op.path.clone()));
            }
            map.insert(key.to_string(), number_value(as_number(&current) + delta));
            Ok(current)
        }
        OpKind::Push => {
            if segments.is_empty() {
                return push_into(state, op.value.clone(), &op.path);
            }
            let Some((map, key)) = parent_mut(state, &segments) else {
                unreachable!("checked non-empty above")
            };
            let slot = map.entry(key.to_string()).or_insert_with(|| Value::Array(Vec::new()));
            push_into(slot, op.value.clone(), &op.path)
        }
        OpKind::Pop => {
            let Some((arr, existed)) = array_slot_mut(state, &segments) else {
                return Err(SyncError::ArrayTargetRequired { op: "pop", path: op.path.clone() });
            };
            if !existed {
                return Ok(Value::Null);
            }
            Ok(arr.pop().unwrap_or(Value::Null))
        }
        OpKind::Splice => {
            let items = op
                .value
                .as_array()
                .ok_or(SyncError::MalformedSplice)?;
            if items.len() < 2 {
                return Err(SyncError::MalformedSplice);
            }
            let start = items[0].as_u64().ok_or(SyncError::MalformedSplice)? as usize;
            let delete_count = items[1].as_u64().ok_or(SyncError::MalformedSplice)? as usize;
            let insert: Vec<Value> = items[2..].to_vec();
            let (arr, _) = match array_slot_mut(state, &segments) {
                Some(found) => found,
                None => return Err(SyncError::ArrayTargetRequired { op: "splice", path: op.path.clone() }),
            };
            let prev = Value::Array(arr.clone());
            let start = start.min(arr.len());
            let end = (start + delete_count).min(arr.len());
            arr.splice(start..end, insert);
            Ok(prev)
        }
    }
}

fn push_into(slot: &mut Value, value: Value, path: &str) -> Result<Value, SyncError> {
    if slot.is_null() {
        *slot = Value::Array(Vec::new());
    }
    let Some(arr) = slot.as_array_mut() else {
        return Err(SyncError::ArrayTargetRequired { op: "push", path: path.to_string() });
    };
    let prev = Value::Array(arr.clone());
    arr.push(value);
    Ok(prev)
}

/// Resolves the array at `segments`, returning `(array, existed)`. `existed`
/// is false when the slot was absent (treated as an empty array, a no-op for
/// pop/splice rather than an error).
fn array_slot_mut<'a>(state: &'a mut Value, segments: &[&'a str]) -> Option<(&'a mut Vec<Value>, bool)> {
    if segments.is_empty() {
        if state.is_null() {
            *state = Value::Array(Vec::new());
            return state.as_array_mut().map(|a| (a, false));
        }
        return state.as_array_mut().map(|a| (a, true));
    }
    let (map, key) = parent_mut(state, segments)?;
    let existed = map.contains_key(key);
    let slot = map.entry(key.to_string()).or_insert_with(|| Value::Array(Vec::new()));
    slot.as_array_mut().map(|a| (a, existed))
}

/// Returns the set of top-level keys an operation touches, used for conflict
/// overlap checks. A root-path op touches every key currently present plus
/// any keys its value introduces.
pub fn touched_keys(op: &StateOperation, state_before: &Value) -> Vec<String> {
    let segments = split_path(&op.path);
    if let Some(first) = segments.first() {
        return vec![(*first).to_string()];
    }
    match &op.value {
        Value::Object(patch) => patch.keys().cloned().collect(),
        _ => state_before
            .as_object()
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default(),
    }
}

#[cfg(test)]
#[path = "operation_tests.rs"]
mod tests;

#[cfg(test)]
pub(crate) fn get_at<'a>(state: &'a Value, path: &'a str) -> Option<&'a Value> {
    let segments = split_path(path);
    if segments.is_empty() {
        return Some(state);
    }
    let (map, key) = parent_ref(state, &segments)?;
    map.get(key)
}
