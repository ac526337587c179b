// Copyright © 2022 The Radicle Link Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! A thin wrapper around the ambient async runtime, used by the demos to
//! spawn one task per simulated locality. An injected handle to the
//! runtime rather than a bare `tokio::spawn` scattered through the crate.

use std::future::Future;

use tokio::task::JoinHandle;

/// Wraps a [`tokio::runtime::Handle`] so callers don't have to depend on a
/// particular way of obtaining one.
#[derive(Clone)]
pub struct LocalitySpawner {
    inner: tokio::runtime::Handle,
}

impl LocalitySpawner {
    /// Capture the handle of the runtime the caller is currently executing
    /// on. Returns `None` outside of an async context.
    pub fn from_current() -> Option<Self> {
        tokio::runtime::Handle::try_current()
            .ok()
            .map(|inner| Self { inner })
    }

    pub fn spawn<F>(&self, task: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.inner.spawn(task)
    }
}
