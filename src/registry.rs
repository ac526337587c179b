// Copyright © 2022 The Radicle Link Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! The centralized rendezvous used by `Meta_Object` construction: a single
//! server, resident on a designated root locality, that collects every
//! participant's handle and releases all of them at once.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::substrate::{GlobalHandle, LocalityId, Substrate, SubstrateError};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RegistryError {
    #[error(transparent)]
    Substrate(#[from] SubstrateError),
}

/// One instance per distributed-object construction that uses `Meta_Object`
/// mode. Collecting while `members.len() < expected_count`, Ready (terminal)
/// once it reaches it. Never reused across constructions: every
/// [`DistObject::new_with_mode`][crate::handle::DistObject::new_with_mode]
/// call that picks `Meta_Object` creates a fresh instance.
pub struct MetaRegistryServer {
    handle: GlobalHandle,
    expected_count: usize,
    root: LocalityId,
}

impl MetaRegistryServer {
    pub(crate) fn new(handle: GlobalHandle, expected_count: usize, root: LocalityId) -> Self {
        Self {
            handle,
            expected_count,
            root,
        }
    }

    pub fn handle(&self) -> GlobalHandle {
        self.handle
    }

    pub fn expected_count(&self) -> usize {
        self.expected_count
    }

    pub fn root(&self) -> LocalityId {
        self.root
    }

    /// Publish `member` under `source`, then suspend until all
    /// `expected_count` participants have registered. Returns a copy of the
    /// full member map to every caller simultaneously: no call returns
    /// before all have registered, and every returned map contains all
    /// `expected_count` entries (the barrier is the happens-before edge
    /// between the mutation and its observation).
    #[tracing::instrument(skip(self, substrate))]
    pub async fn register<S: Substrate>(
        &self,
        substrate: &S,
        source: LocalityId,
        member: GlobalHandle,
    ) -> Result<BTreeMap<LocalityId, GlobalHandle>, RegistryError> {
        Ok(substrate
            .invoke_register(self.handle, source, member)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::substrate::InProcessSubstrate;
    use pretty_assertions::assert_eq;

    #[tokio::test(flavor = "multi_thread")]
    async fn no_participant_returns_before_all_have_registered() {
        let net = InProcessSubstrate::network(4);
        let registry_handle = net[0].create_registry(4).await;

        let mut tasks = Vec::new();
        for substrate in net.iter().cloned() {
            let registry = MetaRegistryServer::new(registry_handle, 4, LocalityId(0));
            tasks.push(tokio::spawn(async move {
                let here = substrate.here();
                let partition = substrate.create_local(here.0 as i32).await;
                registry.register(&substrate, here, partition).await
            }));
        }

        let mut maps = Vec::new();
        for task in tasks {
            maps.push(task.await.unwrap().unwrap());
        }

        for map in &maps {
            assert_eq!(map.len(), 4, "every returned map must contain all entries");
        }
        for window in maps.windows(2) {
            assert_eq!(window[0], window[1], "all participants see the same map");
        }
    }
}
