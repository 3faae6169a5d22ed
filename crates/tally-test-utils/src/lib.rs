// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Tally integration tests.
//!
//! Provides mock adapters and fixtures for fast, deterministic,
//! CI-runnable tests without external services.
//!
//! # Components
//!
//! - [`MockProvider`] - Mock LLM provider with scripted replies
//! - [`MemoryUsageSink`] - Usage sink that keeps records in memory
//! - [`TestDatastore`] - Temporary migrated SQLite database with seed data

pub mod datastore;
pub mod mock_provider;
pub mod usage_sink;

pub use datastore::TestDatastore;
pub use mock_provider::{MOCK_USAGE, MockProvider, MockReply};
pub use usage_sink::MemoryUsageSink;
