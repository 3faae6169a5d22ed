// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Policy-driven provider selection.
//!
//! Turns a [`Classification`] plus a [`CostMode`] into an ordered list of
//! [`ProviderCandidate`]s. Selection is pure: it reads configuration only and
//! never fails. An empty list means no enabled provider could serve the turn.

use tally_config::model::{ANTHROPIC, CLAUDE_CLI, OLLAMA, OPENAI};
use tally_config::{CostMode, ProviderProfile, TallyConfig};
use tally_core::{Classification, Complexity, ProviderCandidate};
use tracing::debug;

/// Map a classified tier to the model tier a policy wants.
pub fn model_tier(policy: CostMode, tier: Complexity) -> Complexity {
    match (policy, tier) {
        (CostMode::CostConscious, Complexity::Complex) => Complexity::Moderate,
        (CostMode::CostConscious, _) => Complexity::Simple,
        (CostMode::Balanced, tier) => tier,
        (CostMode::Quality, Complexity::Simple) => Complexity::Moderate,
        (CostMode::Quality, _) => Complexity::Complex,
    }
}

/// Default provider preference for a policy.
pub fn provider_order(policy: CostMode) -> [&'static str; 4] {
    match policy {
        CostMode::CostConscious => [CLAUDE_CLI, OLLAMA, ANTHROPIC, OPENAI],
        CostMode::Balanced => [CLAUDE_CLI, ANTHROPIC, OPENAI, OLLAMA],
        CostMode::Quality => [ANTHROPIC, OPENAI, CLAUDE_CLI, OLLAMA],
    }
}

/// Builds ranked candidate lists from static provider profiles.
#[derive(Debug, Clone)]
pub struct ProviderSelector {
    profiles: Vec<ProviderProfile>,
    fallback_order: Vec<String>,
}

impl ProviderSelector {
    /// Snapshot provider profiles and the configured fallback order.
    pub fn new(config: &TallyConfig) -> Self {
        Self {
            profiles: config.provider_profiles(),
            fallback_order: config.routing.fallback_order.clone(),
        }
    }

    /// Names of enabled providers.
    pub fn enabled(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.profiles.iter().filter(|p| p.enabled).map(|p| p.name)
    }

    /// Ordered candidates for a turn.
    pub fn select(&self, classification: &Classification, policy: CostMode) -> Vec<ProviderCandidate> {
        self.select_with_preference(classification, policy, None)
    }

    /// Ordered candidates, with `preferred` moved to the front when it is enabled.
    pub fn select_with_preference(
        &self,
        classification: &Classification,
        policy: CostMode,
        preferred: Option<&str>,
    ) -> Vec<ProviderCandidate> {
        let tier = model_tier(policy, classification.suggested_tier);

        let mut ordered: Vec<&ProviderProfile> = self
            .preference(policy)
            .into_iter()
            .filter_map(|name| self.profiles.iter().find(|p| p.name == name))
            .filter(|p| p.enabled)
            .collect();

        if classification.needs_tools && ordered.iter().any(|p| p.supports_tools) {
            ordered.retain(|p| p.supports_tools);
        }

        if let Some(name) = preferred {
            if let Some(pos) = ordered.iter().position(|p| p.name == name) {
                let profile = ordered.remove(pos);
                ordered.insert(0, profile);
            }
        }

        let candidates: Vec<ProviderCandidate> = ordered
            .into_iter()
            .enumerate()
            .map(|(rank, profile)| ProviderCandidate {
                provider: profile.name.to_string(),
                model: match tier {
                    Complexity::Simple => profile.models.simple.clone(),
                    Complexity::Moderate => profile.models.moderate.clone(),
                    Complexity::Complex => profile.models.complex.clone(),
                },
                tier,
                rank,
                supports_tools: profile.supports_tools,
            })
            .collect();

        debug!(
            policy = %policy,
            tier = %tier,
            needs_tools = classification.needs_tools,
            candidates = candidates.len(),
            "selected providers"
        );
        candidates
    }

    /// The configured fallback order when set, otherwise the policy default.
    fn preference(&self, policy: CostMode) -> Vec<&str> {
        if self.fallback_order.is_empty() {
            provider_order(policy).to_vec()
        } else {
            self.fallback_order.iter().map(String::as_str).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classification(complexity: Complexity, needs_tools: bool) -> Classification {
        Classification {
            complexity,
            needs_tools,
            suggested_tier: complexity,
            confidence: 0.8,
            reason: "test",
        }
    }

    fn all_enabled() -> TallyConfig {
        let mut config = TallyConfig::default();
        config.anthropic.enabled = true;
        config.openai.enabled = true;
        config.ollama.enabled = true;
        config.claude_cli.enabled = true;
        config
    }

    fn names(candidates: &[ProviderCandidate]) -> Vec<&str> {
        candidates.iter().map(|c| c.provider.as_str()).collect()
    }

    #[test]
    fn policy_tier_table() {
        use Complexity::*;
        assert_eq!(model_tier(CostMode::CostConscious, Simple), Simple);
        assert_eq!(model_tier(CostMode::CostConscious, Moderate), Simple);
        assert_eq!(model_tier(CostMode::CostConscious, Complex), Moderate);
        assert_eq!(model_tier(CostMode::Balanced, Moderate), Moderate);
        assert_eq!(model_tier(CostMode::Quality, Simple), Moderate);
        assert_eq!(model_tier(CostMode::Quality, Moderate), Complex);
        assert_eq!(model_tier(CostMode::Quality, Complex), Complex);
    }

    #[test]
    fn balanced_order_without_tools() {
        let selector = ProviderSelector::new(&all_enabled());
        let candidates =
            selector.select(&classification(Complexity::Simple, false), CostMode::Balanced);
        assert_eq!(names(&candidates), ["claude_cli", "anthropic", "openai", "ollama"]);
        let ranks: Vec<usize> = candidates.iter().map(|c| c.rank).collect();
        assert_eq!(ranks, [0, 1, 2, 3]);
    }

    #[test]
    fn tool_turns_drop_providers_without_tools() {
        let mut config = all_enabled();
        config.ollama.models.simple = "phi3:mini".into();
        let selector = ProviderSelector::new(&config);
        let candidates =
            selector.select(&classification(Complexity::Simple, true), CostMode::CostConscious);
        assert_eq!(names(&candidates), ["anthropic", "openai"]);
        assert!(candidates.iter().all(|c| c.supports_tools));
    }

    #[test]
    fn tool_filter_keeps_list_when_nothing_supports_tools() {
        let mut config = TallyConfig::default();
        config.claude_cli.enabled = true;
        let selector = ProviderSelector::new(&config);
        let candidates = selector.select(&classification(Complexity::Complex, true), CostMode::Quality);
        assert_eq!(names(&candidates), ["claude_cli"]);
        assert_eq!(candidates[0].model, "opus");
    }

    #[test]
    fn disabled_providers_never_appear() {
        let mut config = TallyConfig::default();
        config.openai.enabled = true;
        let selector = ProviderSelector::new(&config);
        let candidates =
            selector.select(&classification(Complexity::Moderate, true), CostMode::Balanced);
        assert_eq!(names(&candidates), ["openai"]);
        assert_eq!(candidates[0].model, "gpt-4o");
    }

    #[test]
    fn no_enabled_provider_yields_empty_list() {
        let selector = ProviderSelector::new(&TallyConfig::default());
        assert!(selector
            .select(&classification(Complexity::Simple, false), CostMode::Balanced)
            .is_empty());
    }

    #[test]
    fn preferred_provider_moves_to_front() {
        let selector = ProviderSelector::new(&all_enabled());
        let candidates = selector.select_with_preference(
            &classification(Complexity::Simple, false),
            CostMode::Balanced,
            Some("ollama"),
        );
        assert_eq!(names(&candidates), ["ollama", "claude_cli", "anthropic", "openai"]);
        assert_eq!(candidates[0].rank, 0);
    }

    #[test]
    fn unknown_preference_is_ignored() {
        let selector = ProviderSelector::new(&all_enabled());
        let candidates = selector.select_with_preference(
            &classification(Complexity::Simple, false),
            CostMode::Quality,
            Some("gemini"),
        );
        assert_eq!(names(&candidates)[0], "anthropic");
    }

    #[test]
    fn configured_fallback_order_wins() {
        let mut config = all_enabled();
        config.routing.fallback_order = vec!["openai".into(), "anthropic".into()];
        let selector = ProviderSelector::new(&config);
        let candidates =
            selector.select(&classification(Complexity::Simple, false), CostMode::Quality);
        assert_eq!(names(&candidates), ["openai", "anthropic"]);
    }

    #[test]
    fn momentum_tier_drives_model_choice() {
        let selector = ProviderSelector::new(&all_enabled());
        let mut c = classification(Complexity::Simple, true);
        c.suggested_tier = Complexity::Complex;
        let candidates = selector.select(&c, CostMode::Balanced);
        assert_eq!(candidates[0].provider, "anthropic");
        assert_eq!(candidates[0].tier, Complexity::Complex);
        assert_eq!(candidates[0].model, "claude-sonnet-4-20250514");
    }
}
