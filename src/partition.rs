// Copyright © 2022 The Radicle Link Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! The per-locality, per-object state holder: owns exactly one value of type
//! `T` and serves reads to it, locally and remotely.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::RwLock;

use crate::substrate::{Fetchable, GlobalHandle, Substrate};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PartitionError {
    #[error("partition handle is unreachable: {0}")]
    Unreachable(#[from] crate::substrate::SubstrateError),
}

/// Holds one value of `T`, reachable via `handle` on the locality that
/// created it.
///
/// `PartitionServer` never constructs itself: it is always produced by
/// [`Substrate::create_local`][crate::substrate::Substrate::create_local],
/// which is what [`DistObject::new`][crate::handle::DistObject::new] calls.
/// Concurrent access is serialized through the substrate's own lock around
/// the stored value (a shared lock for `fetch`, an exclusive lock for
/// mutation through `access`); isolation is per-call, consistent with some
/// linearization point between lock acquire and release.
pub struct PartitionServer<T> {
    handle: GlobalHandle,
    _marker: std::marker::PhantomData<T>,
}

impl<T: Fetchable> PartitionServer<T> {
    pub(crate) fn new(handle: GlobalHandle) -> Self {
        Self {
            handle,
            _marker: std::marker::PhantomData,
        }
    }

    /// The handle by which this partition is addressed.
    pub fn handle(&self) -> GlobalHandle {
        self.handle
    }

    /// Remote-invokable read: returns a deep copy of the held value.
    pub async fn fetch<S: Substrate>(&self, substrate: &S) -> Result<T, PartitionError> {
        Ok(substrate.invoke_fetch(self.handle).await?)
    }

    /// Synchronous local access to the underlying lock. Only valid when
    /// `handle` is local to `substrate`; the caller is responsible for
    /// holding the returned lock for as long as exclusion is required.
    pub(crate) async fn local_lock<S: Substrate>(
        &self,
        substrate: &S,
    ) -> Option<Arc<RwLock<T>>> {
        substrate.get_local_ptr(self.handle).await
    }
}

/// A non-owning, non-serializable partition over caller-provided storage.
///
/// This supersedes the source's `T = &U` specialization (a raw,
/// non-owning pointer stored behind the generic partition type), which
/// breaks ownership discipline and cannot be made to satisfy
/// [`Fetchable`][crate::substrate::Fetchable]. A [`PartitionView`] records an
/// explicit borrow instead: it supports [`PartitionView::get`] and
/// [`PartitionView::get_mut`] but has no `fetch` action, because a view
/// cannot be serialized to a remote caller. The caller must guarantee the
/// borrowed storage outlives every use of the view.
pub struct PartitionView<'a, U> {
    storage: &'a mut U,
}

impl<'a, U> PartitionView<'a, U> {
    pub fn new(storage: &'a mut U) -> Self {
        Self { storage }
    }

    pub fn get(&self) -> &U {
        self.storage
    }

    pub fn get_mut(&mut self) -> &mut U {
        self.storage
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::substrate::InProcessSubstrate;
    use pretty_assertions::assert_eq;

    #[tokio::test(flavor = "multi_thread")]
    async fn fetch_is_a_deep_copy() {
        let net = InProcessSubstrate::network(1);
        let handle = net[0].create_local(vec![1, 2, 3]).await;
        let server: PartitionServer<Vec<i32>> = PartitionServer::new(handle);

        let mut snapshot = server.fetch(&net[0]).await.unwrap();
        snapshot.push(4);

        assert_eq!(server.fetch(&net[0]).await.unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn view_exposes_mutable_borrow() {
        let mut storage = 41;
        let mut view = PartitionView::new(&mut storage);
        *view.get_mut() += 1;
        assert_eq!(*view.get(), 42);
    }
}
