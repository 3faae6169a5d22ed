// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provider adapters keyed by name.

use std::collections::BTreeMap;
use std::sync::Arc;

use tally_core::{PluginAdapter, ProviderAdapter, TallyError};
use tracing::info;

/// The set of configured provider backends, built once at startup.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an adapter under its own name. Names must be unique.
    pub fn register(&mut self, provider: Arc<dyn ProviderAdapter>) -> Result<(), TallyError> {
        let name = provider.name().to_string();
        if self.providers.contains_key(&name) {
            return Err(TallyError::Config(format!(
                "provider `{name}` is already registered"
            )));
        }
        info!(provider = %name, supports_tools = provider.supports_tools(), "provider registered");
        self.providers.insert(name, provider);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ProviderAdapter>> {
        self.providers.get(name).cloned()
    }

    /// Registered provider names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.providers.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Shut down every adapter, logging failures.
    pub async fn shutdown(&self) {
        for (name, provider) in &self.providers {
            if let Err(e) = provider.shutdown().await {
                tracing::warn!(provider = %name, error = %e, "provider shutdown failed (non-fatal)");
            }
        }
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names())
            .finish()
    }
}
