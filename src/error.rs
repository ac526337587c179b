// Copyright © 2022 The Radicle Link Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Crate-level error type, composing the per-module error enums at the
//! public API edge. Internally, modules propagate their own narrower error
//! types (`substrate::SubstrateError`, `partition::PartitionError`,
//! `registry::RegistryError`, `handle::ConstructError`,
//! `handle::FetchError`); this type exists for callers who want one `Result`
//! alias to bubble up through `?`.

use thiserror::Error;

use crate::{handle::ConstructError, handle::FetchError};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Construct(#[from] ConstructError),

    #[error(transparent)]
    Fetch(#[from] FetchError),
}
