// Copyright © 2022 The Radicle Link Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! A [`Substrate`] that simulates several localities inside one process,
//! addressing components through a shared in-memory registry instead of a
//! real network. This is the only concrete `Substrate` this crate ships;
//! everything else in the core is written against the trait so a networked
//! implementation can be dropped in without touching
//! [`DistObject`][crate::handle::DistObject].

use std::{
    any::Any,
    collections::BTreeMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{Barrier, Mutex, Notify, RwLock};

use super::{Fetchable, GlobalHandle, LocalityId, Substrate, SubstrateError};

struct Component {
    owner: LocalityId,
    value: Arc<dyn Any + Send + Sync>,
}

struct RegistryState {
    members: Mutex<BTreeMap<LocalityId, GlobalHandle>>,
    barrier: Barrier,
}

struct Shared {
    localities: Vec<LocalityId>,
    next_id: AtomicU64,
    lookups_issued: AtomicU64,
    components: DashMap<u64, Component>,
    registries: DashMap<u64, Arc<RegistryState>>,
    names: DashMap<String, GlobalHandle>,
    lookups: DashMap<String, Arc<Notify>>,
    barriers: DashMap<String, Arc<Barrier>>,
}

impl Shared {
    fn alloc_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn notify_for(&self, name: &str) -> Arc<Notify> {
        self.lookups
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Notify::new()))
            .clone()
    }
}

/// A handle to one simulated locality's view of an [`InProcessSubstrate`]
/// network. Cloning preserves the locality identity; all clones of handles
/// produced by the same [`InProcessSubstrate::network`] call share state.
#[derive(Clone)]
pub struct InProcessSubstrate {
    id: LocalityId,
    shared: Arc<Shared>,
}

impl InProcessSubstrate {
    /// Build `count` localities, numbered `0..count`, sharing one substrate.
    pub fn network(count: usize) -> Vec<Self> {
        let localities: Vec<LocalityId> = (0..count as u32).map(LocalityId).collect();
        let shared = Arc::new(Shared {
            localities: localities.clone(),
            next_id: AtomicU64::new(0),
            lookups_issued: AtomicU64::new(0),
            components: DashMap::new(),
            registries: DashMap::new(),
            names: DashMap::new(),
            lookups: DashMap::new(),
            barriers: DashMap::new(),
        });
        localities
            .into_iter()
            .map(|id| Self {
                id,
                shared: shared.clone(),
            })
            .collect()
    }

    /// Total `lookup_name` calls issued across every locality sharing this
    /// network. Exposed for tests verifying idempotent resolution (P5).
    pub fn lookups_issued(&self) -> u64 {
        self.shared.lookups_issued.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Substrate for InProcessSubstrate {
    fn here(&self) -> LocalityId {
        self.id
    }

    fn all_localities(&self) -> Vec<LocalityId> {
        self.shared.localities.clone()
    }

    async fn create_local<T>(&self, value: T) -> GlobalHandle
    where
        T: Fetchable,
    {
        let id = self.shared.alloc_id();
        self.shared.components.insert(
            id,
            Component {
                owner: self.id,
                value: Arc::new(RwLock::new(value)),
            },
        );
        GlobalHandle::new(id, self.id)
    }

    async fn create_registry(&self, expected_count: usize) -> GlobalHandle {
        let id = self.shared.alloc_id();
        self.shared.registries.insert(
            id,
            Arc::new(RegistryState {
                members: Mutex::new(BTreeMap::new()),
                barrier: Barrier::new(expected_count),
            }),
        );
        GlobalHandle::new(id, self.id)
    }

    async fn register_name(
        &self,
        name: String,
        handle: GlobalHandle,
    ) -> Result<(), SubstrateError> {
        use dashmap::mapref::entry::Entry;

        match self.shared.names.entry(name.clone()) {
            Entry::Occupied(_) => {
                tracing::warn!(name = %name, "name already registered");
                Err(SubstrateError::NameConflict(name))
            },
            Entry::Vacant(slot) => {
                slot.insert(handle);
                if let Some(notify) = self.shared.lookups.get(&name) {
                    notify.notify_waiters();
                }
                Ok(())
            },
        }
    }

    async fn lookup_name(&self, name: &str) -> Result<GlobalHandle, SubstrateError> {
        self.shared.lookups_issued.fetch_add(1, Ordering::Relaxed);
        loop {
            if let Some(handle) = self.shared.names.get(name) {
                return Ok(*handle);
            }
            let notify = self.shared.notify_for(name);
            // Re-check after registering interest: a registration may have
            // raced in between the first check and acquiring `notify`.
            if let Some(handle) = self.shared.names.get(name) {
                return Ok(*handle);
            }
            notify.notified().await;
        }
    }

    async fn invoke_fetch<T>(&self, handle: GlobalHandle) -> Result<T, SubstrateError>
    where
        T: Fetchable,
    {
        let component = self.shared.components.get(&handle.id).ok_or_else(|| {
            tracing::warn!(owner = %handle.owner, "fetch target is unreachable");
            SubstrateError::HandleUnreachable(handle.owner)
        })?;
        let value = component
            .value
            .clone()
            .downcast::<RwLock<T>>()
            .map_err(|_| {
                tracing::error!(owner = %handle.owner, "stored component type mismatch on fetch");
                SubstrateError::HandleUnreachable(handle.owner)
            })?;
        let guard = value.read().await;
        Ok(guard.clone())
    }

    async fn invoke_register(
        &self,
        handle: GlobalHandle,
        source: LocalityId,
        member: GlobalHandle,
    ) -> Result<BTreeMap<LocalityId, GlobalHandle>, SubstrateError> {
        let registry = self
            .shared
            .registries
            .get(&handle.id)
            .map(|entry| entry.clone())
            .ok_or_else(|| {
                tracing::error!(owner = %handle.owner, "registry handle is unreachable");
                SubstrateError::HandleUnreachable(handle.owner)
            })?;

        {
            let mut members = registry.members.lock().await;
            members.insert(source, member);
        }
        // The barrier is the publication point: every registrant's insert
        // above happens-before any registrant observes release here.
        registry.barrier.wait().await;

        Ok(registry.members.lock().await.clone())
    }

    async fn registry_snapshot(
        &self,
        handle: GlobalHandle,
    ) -> Result<BTreeMap<LocalityId, GlobalHandle>, SubstrateError> {
        let registry = self
            .shared
            .registries
            .get(&handle.id)
            .map(|entry| entry.clone())
            .ok_or_else(|| {
                tracing::warn!(owner = %handle.owner, "registry handle is unreachable for snapshot");
                SubstrateError::HandleUnreachable(handle.owner)
            })?;
        Ok(registry.members.lock().await.clone())
    }

    async fn get_local_ptr<T>(&self, handle: GlobalHandle) -> Option<Arc<RwLock<T>>>
    where
        T: Fetchable,
    {
        if handle.owner != self.id {
            return None;
        }
        let component = self.shared.components.get(&handle.id)?;
        component.value.clone().downcast::<RwLock<T>>().ok()
    }

    async fn barrier(&self, name: &str, arity: usize) {
        let barrier = self
            .shared
            .barriers
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Barrier::new(arity)))
            .clone();
        barrier.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test(flavor = "multi_thread")]
    async fn name_registration_is_exclusive() {
        let net = InProcessSubstrate::network(2);
        let handle = net[0].create_local(42i32).await;
        net[0]
            .register_name("dup".into(), handle)
            .await
            .expect("first registration succeeds");
        let err = net[1]
            .register_name("dup".into(), handle)
            .await
            .expect_err("second registration must conflict");
        assert!(matches!(err, SubstrateError::NameConflict(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn lookup_waits_for_registration() {
        let net = InProcessSubstrate::network(2);
        let registrar = net[0].clone();
        let waiter = net[1].clone();

        let lookup = tokio::spawn(async move { waiter.lookup_name("late").await });
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        let handle = registrar.create_local(7i32).await;
        registrar
            .register_name("late".into(), handle)
            .await
            .unwrap();

        assert_eq!(lookup.await.unwrap().unwrap(), handle);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn fetch_returns_deep_copy() {
        let net = InProcessSubstrate::network(1);
        let handle = net[0].create_local(vec![1, 2, 3]).await;
        let copy: Vec<i32> = net[0].invoke_fetch(handle).await.unwrap();
        assert_eq!(copy, vec![1, 2, 3]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn get_local_ptr_is_none_for_remote_handle() {
        let net = InProcessSubstrate::network(2);
        let handle = net[0].create_local(1i32).await;
        assert!(net[1].get_local_ptr::<i32>(handle).await.is_none());
        assert!(net[0].get_local_ptr::<i32>(handle).await.is_some());
    }
}
