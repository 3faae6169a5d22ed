// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Usage recording that never fails a turn.

use std::sync::Arc;

use async_trait::async_trait;
use tally_core::TallyError;
use tracing::warn;

use crate::ledger::UsageRecord;

/// Destination for usage records.
#[async_trait]
pub trait UsageSink: Send + Sync {
    async fn write(&self, record: &UsageRecord) -> Result<(), TallyError>;
}

/// Writes usage records to a sink, logging and swallowing sink failures.
#[derive(Clone)]
pub struct UsageRecorder {
    sink: Arc<dyn UsageSink>,
}

impl UsageRecorder {
    pub fn new(sink: Arc<dyn UsageSink>) -> Self {
        Self { sink }
    }

    /// Persist `record`. Sink errors are logged at `warn` and dropped.
    pub async fn record(&self, record: &UsageRecord) {
        if let Err(e) = self.sink.write(record).await {
            warn!(
                error = %e,
                conversation_id = %record.conversation_id,
                "failed to record usage (non-fatal)"
            );
        }
    }
}

impl std::fmt::Debug for UsageRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsageRecorder").finish_non_exhaustive()
    }
}
