// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory usage sink.

use async_trait::async_trait;
use tokio::sync::Mutex;

use tally_core::TallyError;
use tally_cost::{UsageRecord, UsageSink};

/// Collects usage records in memory, or rejects every write when failing.
#[derive(Default)]
pub struct MemoryUsageSink {
    records: Mutex<Vec<UsageRecord>>,
    failing: bool,
}

impl MemoryUsageSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose writes always fail.
    pub fn failing() -> Self {
        Self {
            records: Mutex::default(),
            failing: true,
        }
    }

    pub async fn records(&self) -> Vec<UsageRecord> {
        self.records.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }
}

#[async_trait]
impl UsageSink for MemoryUsageSink {
    async fn write(&self, record: &UsageRecord) -> Result<(), TallyError> {
        if self.failing {
            return Err(TallyError::Internal("usage sink unavailable".into()));
        }
        self.records.lock().await.push(record.clone());
        Ok(())
    }
}
