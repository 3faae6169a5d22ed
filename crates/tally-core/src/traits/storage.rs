// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage adapter trait for persistence backends.

use async_trait::async_trait;

use crate::error::TallyError;
use crate::traits::adapter::PluginAdapter;

/// Lifecycle of a persistence backend.
#[async_trait]
pub trait StorageAdapter: PluginAdapter {
    /// Initializes the backend (open connection, run migrations).
    async fn initialize(&self) -> Result<(), TallyError>;

    /// Closes the backend, flushing pending writes.
    async fn close(&self) -> Result<(), TallyError>;
}
