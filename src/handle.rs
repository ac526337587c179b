// Copyright © 2022 The Radicle Link Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! The user-facing client: constructs a local partition, registers it under
//! a basename, and resolves peer partitions lazily on first use.

use std::{collections::BTreeSet, sync::Arc};

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::{OnceCell, OwnedRwLockWriteGuard, RwLock};

use crate::{
    partition::PartitionServer,
    registry::MetaRegistryServer,
    substrate::{Basename, Fetchable, GlobalHandle, LocalityId, Substrate},
};

/// Selects how a [`DistObject`] rendezvouses with its peers at construction
/// time.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConstructionMode {
    /// Each locality registers its own partition under a symbolic name; peers
    /// are resolved lazily on first `fetch`. No intrinsic barrier -- callers
    /// insert one if strict collective semantics are required.
    AllToAll,
    /// Participants rendezvous at a central [`MetaRegistryServer`] and
    /// receive the full peer map synchronously before construction returns.
    MetaObject,
}

/// Construction-time options beyond basename, mode and initial value.
#[derive(Clone, Debug, Default)]
pub struct DistObjectConfig {
    pub mode: Option<ConstructionMode>,
    /// Restricts participation to this set. `None` means every locality the
    /// substrate knows about. A locality not in the set may still construct
    /// an observer handle: it resolves peers by polling, but registers no
    /// partition of its own.
    pub localities: Option<BTreeSet<LocalityId>>,
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConstructError {
    #[error("basename `{basename}` is already registered on locality {locality}")]
    NameConflict {
        basename: Basename,
        locality: LocalityId,
        #[source]
        source: crate::substrate::SubstrateError,
    },

    #[error("invalid construction configuration for `{basename}`: {reason}")]
    ConfigError { basename: Basename, reason: String },

    #[error("collective construction for `{basename}` did not complete")]
    CollectiveTimeout {
        basename: Basename,
        #[source]
        source: crate::substrate::SubstrateError,
    },
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FetchError {
    #[error("`{basename}`/{locality} is not local to this handle")]
    NotLocal {
        basename: Basename,
        locality: LocalityId,
    },

    #[error("could not resolve `{basename}`/{locality}")]
    LookupFailed {
        basename: Basename,
        locality: LocalityId,
        #[source]
        source: crate::substrate::SubstrateError,
    },

    #[error("remote fetch of `{basename}`/{locality} failed")]
    RemoteFault {
        basename: Basename,
        locality: LocalityId,
        #[source]
        source: crate::substrate::SubstrateError,
    },
}

/// A sequence-like container whose length [`DistObject::size`] can report.
pub trait HasLen {
    fn len_of(&self) -> usize;
}

impl<U> HasLen for Vec<U> {
    fn len_of(&self) -> usize {
        self.len()
    }
}

impl<U> HasLen for std::collections::VecDeque<U> {
    fn len_of(&self) -> usize {
        self.len()
    }
}

/// Per-locality client for one partition of a distributed object.
///
/// Move-only: there is no `Clone` impl. Dropping a handle drops its local
/// server reference and any cached peer handles; the substrate is
/// responsible for tearing down the underlying component once no further
/// references exist (out of scope for this core, see `spec.md` §1).
pub struct DistObject<T, S: Substrate> {
    basename: Basename,
    substrate: S,
    /// `None` for an observer handle: constructed outside the participant
    /// set, it resolves peers but holds no partition of its own.
    server: Option<PartitionServer<T>>,
    local_cache: OnceCell<Arc<RwLock<T>>>,
    peer_cells: DashMap<LocalityId, Arc<OnceCell<GlobalHandle>>>,
}

impl<T, S> DistObject<T, S>
where
    T: Fetchable,
    S: Substrate,
{
    /// `AllToAll` construction across every locality the substrate knows
    /// about.
    pub async fn new(
        substrate: S,
        basename: impl Into<String>,
        data: T,
    ) -> Result<Self, ConstructError> {
        Self::new_with_mode(substrate, basename, data, ConstructionMode::AllToAll).await
    }

    pub async fn new_with_mode(
        substrate: S,
        basename: impl Into<String>,
        data: T,
        mode: ConstructionMode,
    ) -> Result<Self, ConstructError> {
        Self::new_with_config(
            substrate,
            basename,
            data,
            DistObjectConfig {
                mode: Some(mode),
                localities: None,
            },
        )
        .await
    }

    pub async fn new_with_mode_and_locs(
        substrate: S,
        basename: impl Into<String>,
        data: T,
        mode: ConstructionMode,
        locs: BTreeSet<LocalityId>,
    ) -> Result<Self, ConstructError> {
        Self::new_with_config(
            substrate,
            basename,
            data,
            DistObjectConfig {
                mode: Some(mode),
                localities: Some(locs),
            },
        )
        .await
    }

    #[tracing::instrument(skip(substrate, data, config))]
    pub async fn new_with_config(
        substrate: S,
        basename: impl Into<String>,
        data: T,
        config: DistObjectConfig,
    ) -> Result<Self, ConstructError> {
        let basename = Basename::new(basename);
        let mode = config.mode.unwrap_or(ConstructionMode::AllToAll);
        let here = substrate.here();

        if let Some(locs) = &config.localities {
            if locs.is_empty() {
                return Err(ConstructError::ConfigError {
                    basename,
                    reason: "locality set must not be empty".into(),
                });
            }
        }
        let is_member = config
            .localities
            .as_ref()
            .map_or(true, |locs| locs.contains(&here));

        match mode {
            ConstructionMode::AllToAll => {
                if !is_member {
                    return Err(ConstructError::ConfigError {
                        basename,
                        reason: "All_to_All requires here() to be a participant".into(),
                    });
                }
                Self::construct_all_to_all(substrate, basename, data, here).await
            },
            ConstructionMode::MetaObject => {
                let expected_count = match &config.localities {
                    Some(locs) => locs.len(),
                    None => substrate.all_localities().len(),
                };
                let root = config
                    .localities
                    .as_ref()
                    .and_then(|locs| locs.iter().min().copied())
                    .unwrap_or(LocalityId(0));

                if is_member {
                    Self::construct_meta_object(
                        substrate,
                        basename,
                        data,
                        here,
                        root,
                        expected_count,
                    )
                    .await
                } else {
                    Self::construct_observer(substrate, basename, expected_count).await
                }
            },
        }
    }

    async fn construct_all_to_all(
        substrate: S,
        basename: Basename,
        data: T,
        here: LocalityId,
    ) -> Result<Self, ConstructError> {
        let self_handle = substrate.create_local(data).await;
        substrate
            .register_name(basename.partition_key(here), self_handle)
            .await
            .map_err(|source| {
                tracing::warn!(%basename, %here, "basename already registered on this locality");
                ConstructError::NameConflict {
                    basename: basename.clone(),
                    locality: here,
                    source,
                }
            })?;

        Ok(Self {
            basename,
            substrate,
            server: Some(PartitionServer::new(self_handle)),
            local_cache: OnceCell::new(),
            peer_cells: DashMap::new(),
        })
    }

    async fn construct_meta_object(
        substrate: S,
        basename: Basename,
        data: T,
        here: LocalityId,
        root: LocalityId,
        expected_count: usize,
    ) -> Result<Self, ConstructError> {
        let self_handle = substrate.create_local(data).await;

        let registry_handle = if here == root {
            let registry_handle = substrate.create_registry(expected_count).await;
            substrate
                .register_name(basename.as_str().to_owned(), registry_handle)
                .await
                .map_err(|source| {
                    tracing::warn!(%basename, %here, "meta-registry basename already registered");
                    ConstructError::NameConflict {
                        basename: basename.clone(),
                        locality: here,
                        source,
                    }
                })?;
            registry_handle
        } else {
            substrate
                .lookup_name(basename.as_str())
                .await
                .map_err(|source| {
                    tracing::error!(%basename, "could not resolve the meta-registry root");
                    ConstructError::CollectiveTimeout {
                        basename: basename.clone(),
                        source,
                    }
                })?
        };

        let registry = MetaRegistryServer::new(registry_handle, expected_count, root);
        let members = registry
            .register(&substrate, here, self_handle)
            .await
            .map_err(|err| {
                tracing::error!(%basename, "meta-registry rendezvous did not complete");
                ConstructError::CollectiveTimeout {
                    basename: basename.clone(),
                    source: match err {
                        crate::registry::RegistryError::Substrate(e) => e,
                    },
                }
            })?;

        // Also publish under the per-locality key, so All_to_All-style
        // lookup is available too.
        substrate
            .register_name(basename.partition_key(here), self_handle)
            .await
            .map_err(|source| {
                tracing::warn!(%basename, %here, "basename already registered on this locality");
                ConstructError::NameConflict {
                    basename: basename.clone(),
                    locality: here,
                    source,
                }
            })?;

        let peer_cells = DashMap::new();
        for (locality, handle) in members {
            peer_cells.insert(locality, Arc::new(OnceCell::new_with(Some(handle))));
        }

        Ok(Self {
            basename,
            substrate,
            server: Some(PartitionServer::new(self_handle)),
            local_cache: OnceCell::new(),
            peer_cells,
        })
    }

    /// Observer path: constructed outside the participant set, holds no
    /// partition, and resolves the full peer map by polling the registry's
    /// snapshot rather than registering.
    async fn construct_observer(
        substrate: S,
        basename: Basename,
        expected_count: usize,
    ) -> Result<Self, ConstructError> {
        let registry_handle = substrate
            .lookup_name(basename.as_str())
            .await
            .map_err(|source| {
                tracing::error!(%basename, "observer could not resolve the meta-registry");
                ConstructError::CollectiveTimeout {
                    basename: basename.clone(),
                    source,
                }
            })?;

        let members = loop {
            let snapshot = substrate
                .registry_snapshot(registry_handle)
                .await
                .map_err(|source| {
                    tracing::error!(%basename, "observer's registry poll failed");
                    ConstructError::CollectiveTimeout {
                        basename: basename.clone(),
                        source,
                    }
                })?;
            if snapshot.len() == expected_count {
                break snapshot;
            }
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        };

        let peer_cells = DashMap::new();
        for (locality, handle) in members {
            peer_cells.insert(locality, Arc::new(OnceCell::new_with(Some(handle))));
        }

        Ok(Self {
            basename,
            substrate,
            server: None,
            local_cache: OnceCell::new(),
            peer_cells,
        })
    }

    /// Idempotent: at most one `lookup_name` is issued per peer across this
    /// handle's lifetime, even under concurrent callers, because each
    /// locality's resolution is gated by its own [`OnceCell`].
    #[tracing::instrument(skip(self))]
    async fn resolve_peer(&self, i: LocalityId) -> Result<GlobalHandle, FetchError> {
        let cell = self
            .peer_cells
            .entry(i)
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();
        let key = self.basename.partition_key(i);
        let handle = cell
            .get_or_try_init(move || async move { self.substrate.lookup_name(&key).await })
            .await
            .map_err(|source| {
                tracing::warn!(basename = %self.basename, locality = %i, "peer resolution failed");
                FetchError::LookupFailed {
                    basename: self.basename.clone(),
                    locality: i,
                    source,
                }
            })?;
        Ok(*handle)
    }

    /// Asynchronous remote read. Resolves to a local snapshot without any
    /// substrate round-trip if `i == here()`.
    #[tracing::instrument(skip(self))]
    pub async fn fetch(&self, i: LocalityId) -> Result<T, FetchError> {
        if i == self.substrate.here() {
            let server = self.server.as_ref().ok_or_else(|| FetchError::NotLocal {
                basename: self.basename.clone(),
                locality: i,
            })?;
            return server
                .fetch(&self.substrate)
                .await
                .map_err(|crate::partition::PartitionError::Unreachable(source)| {
                    FetchError::RemoteFault {
                        basename: self.basename.clone(),
                        locality: i,
                        source,
                    }
                });
        }

        let handle = self.resolve_peer(i).await?;
        self.substrate
            .invoke_fetch(handle)
            .await
            .map_err(|source| {
                tracing::warn!(basename = %self.basename, locality = %i, "remote fetch failed");
                FetchError::RemoteFault {
                    basename: self.basename.clone(),
                    locality: i,
                    source,
                }
            })
    }

    async fn local_lock(&self) -> Result<Arc<RwLock<T>>, FetchError> {
        let server = self.server.as_ref().ok_or_else(|| FetchError::NotLocal {
            basename: self.basename.clone(),
            locality: self.substrate.here(),
        })?;
        let lock = self
            .local_cache
            .get_or_try_init(|| async {
                server
                    .local_lock(&self.substrate)
                    .await
                    .ok_or_else(|| FetchError::NotLocal {
                        basename: self.basename.clone(),
                        locality: self.substrate.here(),
                    })
            })
            .await?;
        Ok(lock.clone())
    }

    /// Local, mutable access to this locality's own partition (the `*`
    /// operator in the source). Fails with [`FetchError::NotLocal`] for an
    /// observer handle, which holds no partition.
    pub async fn local(&self) -> Result<OwnedRwLockWriteGuard<T>, FetchError> {
        let lock = self.local_lock().await?;
        Ok(lock.write_owned().await)
    }

    pub fn basename(&self) -> &Basename {
        &self.basename
    }

    pub fn substrate(&self) -> &S {
        &self.substrate
    }
}

impl<T, S> DistObject<T, S>
where
    T: Fetchable + HasLen,
    S: Substrate,
{
    /// The length of this locality's own partition, for sequence-like `T`.
    pub async fn size(&self) -> Result<usize, FetchError> {
        let lock = self.local_lock().await?;
        let guard = lock.read().await;
        Ok(guard.len_of())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::substrate::InProcessSubstrate;
    use pretty_assertions::assert_eq;

    #[tokio::test(flavor = "multi_thread")]
    async fn self_fetch_matches_local() {
        let net = InProcessSubstrate::network(1);
        let obj = DistObject::new(net[0].clone(), "solo", 42i32).await.unwrap();
        assert_eq!(obj.fetch(LocalityId(0)).await.unwrap(), 42);
        assert_eq!(*obj.local().await.unwrap(), 42);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn duplicate_basename_on_same_locality_conflicts() {
        let net = InProcessSubstrate::network(1);
        let _first = DistObject::new(net[0].clone(), "dup", 1i32).await.unwrap();
        let second = DistObject::new(net[0].clone(), "dup", 2i32).await;
        assert!(matches!(second, Err(ConstructError::NameConflict { .. })));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn size_reports_local_partition_length() {
        let net = InProcessSubstrate::network(1);
        let obj = DistObject::new(net[0].clone(), "vec", vec![1, 2, 3])
            .await
            .unwrap();
        assert_eq!(obj.size().await.unwrap(), 3);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn empty_locality_set_is_a_config_error() {
        let net = InProcessSubstrate::network(1);
        let result = DistObject::new_with_mode_and_locs(
            net[0].clone(),
            "empty",
            1i32,
            ConstructionMode::MetaObject,
            BTreeSet::new(),
        )
        .await;
        assert!(matches!(result, Err(ConstructError::ConfigError { .. })));
    }
}
