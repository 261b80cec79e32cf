// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scope resolution needs to walk the component hierarchy, but this crate
//! has no dependency on `lcr-registry` (which owns that hierarchy) by
//! design. `ComponentTree` is the seam: the embedder hands an adapter over
//! its `Registry` to `EventEngine::emit`, and this crate only ever reads
//! through the trait.

use lcr_core::ComponentId;

pub trait ComponentTree: Send + Sync {
    fn parent_of(&self, id: &ComponentId) -> Option<ComponentId>;
    fn children_of(&self, id: &ComponentId) -> Vec<ComponentId>;
    fn all_ids(&self) -> Vec<ComponentId>;
}
