// Copyright © 2022 The Radicle Link Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Distributed-object partitioning for a fixed set of cooperating
//! localities.
//!
//! A [`DistObject<T>`] lets every participating [`LocalityId`] construct its
//! own partition of a single logical object under a shared [`Basename`], then
//! resolve and [`fetch`][DistObject::fetch] any other partition through a
//! uniform handle. The hard parts -- partition registration, collective
//! construction, and cached remote access -- are covered here; the
//! [`Substrate`] trait is the seam at which a real transport, AGAS-backed
//! runtime would be plugged in. [`substrate::in_process`] ships the one
//! concrete implementation this crate needs to exercise the core end to end.

pub mod error;
pub mod handle;
pub mod partition;
pub mod registry;
pub mod spawner;
pub mod substrate;

pub use error::Error;
pub use handle::{ConstructError, ConstructionMode, DistObject, DistObjectConfig, FetchError};
pub use partition::{PartitionError, PartitionServer};
pub use registry::{MetaRegistryServer, RegistryError};
pub use spawner::LocalitySpawner;
pub use substrate::{Basename, Fetchable, GlobalHandle, LocalityId, Substrate, SubstrateError};
