//! # Reference & Union Policy
//!
//! Object ids are assigned in pre-order, the first time an object is entered, by both
//! the encoder ([`ReferenceTracker`]) and the decoder ([`ReferenceTable`]). Because both
//! sides walk the same sequence, a back-reference only needs the id.
//!
//! A cycle is an object that is entered again while it is still on the active path.
//! Objects that are merely shared (reachable twice, never nested in themselves) are not
//! cycles.

use crate::core::value::ObjectRef;
use crate::error::{CircularReferenceError, ErrorCode, Result, SerializerError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// What the decoder does with a polymorphic type tag that is not registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum UnionFallbackBehavior {
    /// Abort the decode with `UnknownType`.
    #[default]
    ThrowException,
    ReturnNull,
    /// Zero value of the declared member type, or a default instance when the
    /// declared type is a concrete registered type.
    ReturnDefault,
    /// Omit the member from the decoded object.
    Skip,
    /// Decode the payload as the configured fallback type.
    UseFallbackType,
}

/// Encoder-side id assignment and cycle detection.
#[derive(Debug, Default)]
pub struct ReferenceTracker {
    ids: HashMap<usize, u32>,
    path: Vec<(usize, String)>,
    next_id: u32,
}

impl ReferenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of an object that has already been entered.
    pub fn lookup(&self, addr: usize) -> Option<u32> {
        self.ids.get(&addr).copied()
    }

    /// Position of `addr` on the active path, if it is an ancestor of the current node.
    pub fn active_index(&self, addr: usize) -> Option<usize> {
        self.path.iter().rposition(|(a, _)| *a == addr)
    }

    /// Assign the next id to `addr` and push it on the active path.
    pub fn enter(&mut self, addr: usize, type_name: &str) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        self.ids.insert(addr, id);
        self.path.push((addr, type_name.to_string()));
        id
    }

    pub fn exit(&mut self) {
        self.path.pop();
    }

    /// Ids handed out so far.
    pub fn allocated(&self) -> u32 {
        self.next_id
    }

    /// Describe the cycle closed by re-entering the path entry at `index`.
    pub fn cycle_error(&self, index: usize) -> CircularReferenceError {
        let mut path: Vec<String> = self.path.iter().map(|(_, name)| name.clone()).collect();
        if let Some((_, repeated)) = self.path.get(index) {
            path.push(repeated.clone());
        }
        let depth = self.path.len() - index;
        CircularReferenceError {
            path,
            is_self_reference: depth == 1,
            depth,
        }
    }
}

/// Decoder-side id table.
#[derive(Debug, Default)]
pub struct ReferenceTable {
    slots: Vec<Option<ObjectRef>>,
}

impl ReferenceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a freshly allocated object under the next id.
    pub fn register(&mut self, object: ObjectRef) -> u32 {
        self.slots.push(Some(object));
        (self.slots.len() - 1) as u32
    }

    /// Burn `count` ids for objects inside a skipped payload.
    pub fn reserve(&mut self, count: usize) {
        self.slots.resize(self.slots.len() + count, None);
    }

    pub fn resolve(&self, id: u32) -> Result<ObjectRef> {
        match self.slots.get(id as usize) {
            Some(Some(object)) => Ok(object.clone()),
            Some(None) => Err(SerializerError::new(
                ErrorCode::UnresolvedReference,
                format!("back-reference {id} points at a skipped object"),
            )),
            None => Err(SerializerError::new(
                ErrorCode::InvalidReference,
                format!(
                    "back-reference {id} is beyond the {} objects decoded so far",
                    self.slots.len()
                ),
            )),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
