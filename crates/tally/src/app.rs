// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Process wiring: storage, providers, tools, and the orchestrator.

use std::sync::Arc;

use tally_agent::{Orchestrator, load_system_prompt};
use tally_config::TallyConfig;
use tally_core::{StorageAdapter, TallyError};
use tally_cost::{SqliteUsageLedger, UsageRecorder};
use tally_resilience::ProviderRegistry;
use tally_storage::SqliteStorage;
use tally_tools::{ToolRegistry, register_financial_tools};
use tracing::{info, warn};

#[cfg(feature = "anthropic")]
use tally_anthropic::AnthropicProvider;
#[cfg(feature = "claude-cli")]
use tally_claude_cli::ClaudeCliProvider;
#[cfg(feature = "ollama")]
use tally_ollama::OllamaProvider;
#[cfg(feature = "openai")]
use tally_openai::OpenAiProvider;

/// Everything a running Tally process shares.
pub struct App {
    pub config: TallyConfig,
    pub storage: Arc<SqliteStorage>,
    pub ledger: SqliteUsageLedger,
    pub orchestrator: Orchestrator,
}

impl App {
    /// Build the application with providers constructed from `config`.
    pub async fn start(config: TallyConfig) -> Result<Self, TallyError> {
        let providers = build_providers(&config)?;
        Self::with_providers(config, providers).await
    }

    /// Build the application around an existing provider registry.
    pub async fn with_providers(
        config: TallyConfig,
        providers: ProviderRegistry,
    ) -> Result<Self, TallyError> {
        let storage = SqliteStorage::new(config.storage.clone());
        storage.initialize().await?;
        let db = storage.database()?.clone();

        let mut tools = ToolRegistry::new();
        register_financial_tools(&mut tools, &db)?;

        let ledger = SqliteUsageLedger::new(db);
        let recorder = UsageRecorder::new(Arc::new(ledger.clone()));
        let system_prompt = load_system_prompt(&config.agent).await;

        if providers.is_empty() {
            warn!("no provider is enabled; every turn will fail until one is configured");
        }

        let storage = Arc::new(storage);
        let orchestrator = Orchestrator::new(
            &config,
            providers,
            Arc::new(tools),
            storage.clone(),
            recorder,
            system_prompt,
        );
        info!(
            providers = ?orchestrator.providers().names(),
            tools = orchestrator.tools().len(),
            database = %config.storage.database_path,
            "tally initialized"
        );

        Ok(Self {
            config,
            storage,
            ledger,
            orchestrator,
        })
    }

    /// Shut down providers and checkpoint the database.
    pub async fn shutdown(&self) {
        self.orchestrator.providers().shutdown().await;
        if let Err(e) = self.storage.close().await {
            warn!(error = %e, "storage close failed (non-fatal)");
        }
    }
}

/// Construct an adapter for every enabled provider compiled into this binary.
pub fn build_providers(config: &TallyConfig) -> Result<ProviderRegistry, TallyError> {
    let mut registry = ProviderRegistry::new();

    if config.anthropic.enabled {
        #[cfg(feature = "anthropic")]
        registry.register(Arc::new(AnthropicProvider::new(&config.anthropic)?))?;
        #[cfg(not(feature = "anthropic"))]
        warn!("anthropic is enabled in config but this build lacks the `anthropic` feature");
    }

    if config.openai.enabled {
        #[cfg(feature = "openai")]
        registry.register(Arc::new(OpenAiProvider::new(&config.openai)?))?;
        #[cfg(not(feature = "openai"))]
        warn!("openai is enabled in config but this build lacks the `openai` feature");
    }

    if config.ollama.enabled {
        #[cfg(feature = "ollama")]
        registry.register(Arc::new(OllamaProvider::new(&config.ollama)?))?;
        #[cfg(not(feature = "ollama"))]
        warn!("ollama is enabled in config but this build lacks the `ollama` feature");
    }

    if config.claude_cli.enabled {
        #[cfg(feature = "claude-cli")]
        registry.register(Arc::new(ClaudeCliProvider::new(&config.claude_cli)))?;
        #[cfg(not(feature = "claude-cli"))]
        warn!("claude_cli is enabled in config but this build lacks the `claude-cli` feature");
    }

    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_providers_are_not_built() {
        let registry = build_providers(&TallyConfig::default()).unwrap();
        assert!(registry.is_empty());
    }

    #[cfg(feature = "ollama")]
    #[test]
    fn enabled_providers_are_registered() {
        let mut config = TallyConfig::default();
        config.ollama.enabled = true;
        config.claude_cli.enabled = cfg!(feature = "claude-cli");
        let registry = build_providers(&config).unwrap();
        assert!(registry.get("ollama").is_some());
        assert_eq!(registry.get("claude_cli").is_some(), cfg!(feature = "claude-cli"));
    }
}
