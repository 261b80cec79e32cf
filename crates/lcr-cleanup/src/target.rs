// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `lcr-cleanup` tracks cleanup bookkeeping (hooks, priority, liveness) for
//! component ids, but the actual hierarchy and the actual teardown live in
//! the component registry. `CleanupTarget` is the seam the embedder
//! implements over its registry, mirroring the `ComponentTree` split in
//! `lcr-events`.

use async_trait::async_trait;
use lcr_core::ComponentId;

#[async_trait]
pub trait CleanupTarget: Send + Sync {
    /// Direct children of `id`, for post-order cascade.
    fn children_of(&self, id: &ComponentId) -> Vec<ComponentId>;

    /// Removes `id` from its parent's child set. Called before a cascade
    /// descends into `id`'s own children, so a half-torn-down subtree never
    /// dangles off a still-live parent.
    fn detach_from_parent(&self, id: &ComponentId);

    /// Performs the registry-level teardown of `id` itself (state removal,
    /// lifecycle transition to destroyed). Called after `id`'s hooks have
    /// run and after its children have already been torn down.
    async fn teardown(&self, id: &ComponentId);
}
