// Copyright © 2022 The Radicle Link Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! The boundary between the distributed-object core and the runtime that
//! actually creates remote components, invokes remote actions, and resolves
//! symbolic names. The core treats [`Substrate`] as an injected dependency,
//! never as a process-global -- see the "Global scheduler coupling" redesign
//! note in `DESIGN.md`.

pub mod in_process;

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

pub use in_process::InProcessSubstrate;

/// A zero-based index identifying one participating process.
///
/// The set of participating localities is fixed for the lifetime of a
/// distributed object; nothing in this crate supports adding or removing
/// members after construction.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct LocalityId(pub u32);

impl fmt::Display for LocalityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for LocalityId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// Opaque, copyable reference to a remote-addressable component.
///
/// Two handles compare equal iff they address the same component on the same
/// locality. There is deliberately no [`Ord`] impl: handle identity is not
/// meant to carry ordering semantics.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct GlobalHandle {
    id: u64,
    owner: LocalityId,
}

impl GlobalHandle {
    pub(crate) fn new(id: u64, owner: LocalityId) -> Self {
        Self { id, owner }
    }

    /// The locality that created the component this handle addresses.
    pub fn owner(&self) -> LocalityId {
        self.owner
    }
}

/// A caller-chosen public identity for a distributed object.
///
/// `basename.partition_key(i)` is the symbolic registration key for locality
/// `i`'s partition; both construction modes register under it.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct Basename(String);

impl Basename {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `basename + "/" + decimal(locality_id)`, the per-partition registration
    /// key used by both construction modes.
    pub fn partition_key(&self, locality: LocalityId) -> String {
        format!("{}/{}", self.0, locality)
    }
}

impl fmt::Display for Basename {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Values a [`PartitionServer`][crate::partition::PartitionServer] may hold
/// and a [`DistObject::fetch`][crate::handle::DistObject::fetch] may return.
///
/// This is the generalization the source's per-type action registration
/// macros ask for: rather than instantiating a `fetch` action once per `T`,
/// every `T` satisfying this bound is dispatched through the same generic
/// action at the substrate boundary.
pub trait Fetchable: Clone + Send + Sync + 'static {}

impl<T> Fetchable for T where T: Clone + Send + Sync + 'static {}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SubstrateError {
    #[error("name `{0}` is already registered")]
    NameConflict(String),

    #[error("name `{0}` could not be resolved")]
    NameNotFound(String),

    #[error("handle on locality {0} is unreachable")]
    HandleUnreachable(LocalityId),

    #[error("collective `{0}` did not complete")]
    BarrierTimeout(String),
}

/// The capabilities the core consumes from the distributed runtime.
///
/// Treated as reliable by the core: a failing call surfaces as a terminal
/// [`SubstrateError`] to the caller, and the core retries nothing -- retry is
/// the substrate's or the application's responsibility.
#[async_trait]
pub trait Substrate: Clone + Send + Sync + 'static {
    /// The locality this handle to the substrate acts as.
    fn here(&self) -> LocalityId;

    /// The full, fixed set of participating localities.
    fn all_localities(&self) -> Vec<LocalityId>;

    /// Allocate a component holding `value` on [`Substrate::here`].
    async fn create_local<T>(&self, value: T) -> GlobalHandle
    where
        T: Fetchable;

    /// Allocate a fresh meta-registry component, expecting `expected_count`
    /// registrants, on [`Substrate::here`].
    async fn create_registry(&self, expected_count: usize) -> GlobalHandle;

    /// Bind `name` to `handle`. Duplicate names are [`SubstrateError::NameConflict`].
    async fn register_name(
        &self,
        name: String,
        handle: GlobalHandle,
    ) -> Result<(), SubstrateError>;

    /// Resolve `name`, suspending until it is registered by some locality.
    async fn lookup_name(&self, name: &str) -> Result<GlobalHandle, SubstrateError>;

    /// Invoke the generic `fetch` action on `handle`, returning a deep copy
    /// of the value it holds.
    async fn invoke_fetch<T>(&self, handle: GlobalHandle) -> Result<T, SubstrateError>
    where
        T: Fetchable;

    /// Invoke the meta-registry's `register` action on `handle`: publish
    /// `member` under `source`, suspend until `expected_count` participants
    /// have registered, then return the full member map.
    async fn invoke_register(
        &self,
        handle: GlobalHandle,
        source: LocalityId,
        member: GlobalHandle,
    ) -> Result<std::collections::BTreeMap<LocalityId, GlobalHandle>, SubstrateError>;

    /// Non-blocking snapshot of a meta-registry's current members, used by
    /// observer-mode handles that poll rather than register.
    async fn registry_snapshot(
        &self,
        handle: GlobalHandle,
    ) -> Result<std::collections::BTreeMap<LocalityId, GlobalHandle>, SubstrateError>;

    /// Synchronous local-pointer access; returns `None` if `handle` is not
    /// local to [`Substrate::here`]. May briefly suspend if the substrate
    /// defers, hence the `async` signature despite typically resolving
    /// immediately.
    async fn get_local_ptr<T>(&self, handle: GlobalHandle) -> Option<std::sync::Arc<tokio::sync::RwLock<T>>>
    where
        T: Fetchable;

    /// Collective barrier: suspends until `arity` participants have called it
    /// under the same `name`.
    async fn barrier(&self, name: &str, arity: usize);
}
