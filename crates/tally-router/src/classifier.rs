// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Heuristic classification of personal-finance queries.
//!
//! Classifies user messages into simple/moderate/complex tiers and decides
//! whether answering needs datastore tools. Rules are regex based and pure:
//! no network, no clock, no randomness, so the same message and history
//! always produce the same [`Classification`].

use std::sync::LazyLock;

use regex::Regex;
use tally_core::{Classification, Complexity};

fn rx(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static classifier pattern must compile")
}

/// Greetings, thanks, acknowledgements, and questions about the assistant.
static CONVERSATIONAL: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        rx(r"(?i)^\s*(hi|hello|hey|yo|thanks|thank you|thx|ty|ok|okay|cool|great|nice|got it|sounds good|bye|goodbye|good (morning|afternoon|evening|night))\b[\s!.,?]*(there|tally)?[\s!.?]*$"),
        rx(r"(?i)^\s*(who|what) are you\b[\s!.?]*$"),
        rx(r"(?i)^\s*(what can you do|how do you work|help)\b[\s!.?]*$"),
        rx(r"(?i)^\s*how are you( doing)?( today)?[\s!.,?]*(tally)?[\s!.?]*$"),
    ]
});

/// Questions about something the user said earlier in the conversation.
static NAME_RECALL: LazyLock<Regex> =
    LazyLock::new(|| rx(r"(?i)\b(what(['’]s| is) my name|who am i)\b"));
static GENERIC_RECALL: LazyLock<Regex> = LazyLock::new(|| {
    rx(r"(?i)\b(what did i (just )?(say|tell you|mention|ask)|what was my (last )?question|remind me what i (said|told you))\b")
});
static NAME_STATEMENT: LazyLock<Regex> =
    LazyLock::new(|| rx(r"(?i)\b(my name is|call me|i am called|i['’]m called)\b"));

/// Comparison, optimization, and planning requests.
static COMPLEX_KEYWORDS: LazyLock<Regex> = LazyLock::new(|| {
    rx(r"(?i)\b(compar\w*|versus|vs\.?|optimi[sz]\w*|recommend\w*|strateg\w*|forecast\w*|project(ion|ed)?s?|analy[sz]\w*|should i|pros and cons|what if|plan(ning)? for|retire\w*|rebalanc\w*|tax[- ](plan\w*|strateg\w*|optimi[sz]\w*|loss\w*|harvest\w*|saving\w*)|comprehensive)\b")
});

/// Ranges spanning several periods.
static MULTI_PERIOD: LazyLock<Regex> = LazyLock::new(|| {
    rx(r"(?i)\b((last|past|previous) (\d+|two|three|four|five|six|twelve|several|few) (years|months|quarters|weeks)|year[- ]over[- ]year|month[- ]over[- ]month|yoy|across (the )?(years|months|quarters)|20\d{2}\s*(-|to|through|thru|vs\.?|and|versus)\s*20\d{2})\b")
});

/// Phrases that ask for aggregation or explanation.
static MODERATE_KEYWORDS: LazyLock<Regex> = LazyLock::new(|| {
    rx(r"(?i)\b(trends?|breakdown|break down|summar(y|ize|ise)|top \d+|average|why|explain|patterns?|recurring|cash flow|net worth|savings rate|how has|changed?)\b")
});

/// Single-entity lookups.
static LOOKUP_PATTERNS: LazyLock<Regex> = LazyLock::new(|| {
    rx(r"(?i)\b(balances?|how much (did|have) i (spend|spent|pay|paid)|list (all )?(my )?(accounts|budgets)|find (the |a |my )?transactions?|show (me )?(my )?(last|latest|recent) transactions?|when did i (last )?(pay|buy))\b")
});

/// Financial domains; two or more in one query escalates complexity.
static DOMAINS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    vec![
        ("banking", rx(r"(?i)\b(balances?|checking|savings accounts?|bank\w*|accounts?)\b")),
        ("spending", rx(r"(?i)\b(spen[dt]\w*|expenses?|purchases?|transactions?|merchants?|bought|groceries|restaurants?)\b")),
        ("budget", rx(r"(?i)\bbudget\w*")),
        ("investments", rx(r"(?i)\b(portfolio|invest\w*|holdings?|stocks?|etfs?|brokerage|401k|ira|roth|allocation)\b")),
        ("crypto", rx(r"(?i)\b(crypto\w*|bitcoin|btc|ethereum|eth|defi|wallets?|tokens?)\b")),
        ("tax", rx(r"(?i)\btax\w*")),
        ("income", rx(r"(?i)\b(income|salary|paychecks?|deposits?|earn\w*)\b")),
        ("debt", rx(r"(?i)\b(debts?|loans?|mortgage|credit cards?|interest)\b")),
        ("documents", rx(r"(?i)\b(documents?|receipts?|statements?|w-?2|1099|insurance)\b")),
    ]
});

/// Data the assistant can only know through its tools, outside the domains above.
static TOOL_TERMS: LazyLock<Regex> = LazyLock::new(|| {
    rx(r"(?i)\b(goals?|remember|memor(y|ies)|net worth|category|categories|sync|how much|my money|finances?)\b")
});

/// Score at or above which a query is complex.
const COMPLEX_THRESHOLD: i32 = 3;

/// Deterministic heuristic classifier.
#[derive(Debug, Clone)]
pub struct QueryClassifier {
    /// How many trailing history messages feed the momentum signal.
    history_window: usize,
}

impl QueryClassifier {
    /// Create a classifier that looks at the last 3 history messages.
    pub fn new() -> Self {
        Self { history_window: 3 }
    }

    /// Create a classifier with a custom momentum window.
    pub fn with_history_window(history_window: usize) -> Self {
        Self { history_window }
    }

    /// Classify `message` given the user's recent messages (oldest first).
    pub fn classify(&self, message: &str, recent_history: &[&str]) -> Classification {
        let trimmed = message.trim();
        if trimmed.is_empty() {
            return Self::without_tools(1.0, "empty message");
        }

        // Signal 1: small talk never needs the datastore, unless it names
        // financial data.
        if CONVERSATIONAL.iter().any(|re| re.is_match(trimmed)) && !Self::mentions_data(trimmed) {
            return Self::without_tools(0.95, "conversational message");
        }

        // Signal 2: recall of something already in the conversation.
        if Self::answerable_from_history(trimmed, recent_history) {
            return Self::without_tools(0.85, "answerable from conversation history");
        }

        let complex_keyword = COMPLEX_KEYWORDS.is_match(trimmed);
        let multi_period = MULTI_PERIOD.is_match(trimmed);
        let moderate_keyword = MODERATE_KEYWORDS.is_match(trimmed);
        let lookup = LOOKUP_PATTERNS.is_match(trimmed);
        let domains = Self::domain_count(trimmed);

        let mut score: i32 = 0;

        // Signal 3: comparison / optimization / planning.
        if complex_keyword {
            score += 2;
        }

        // Signal 4: multi-period range.
        if multi_period {
            score += 1;
        }

        // Signal 5: several financial domains in one query.
        score += match domains {
            0 | 1 => 0,
            2 => 1,
            _ => 2,
        };

        // Signal 6: aggregation or explanation.
        if moderate_keyword {
            score += 1;
        }

        // Signal 7: several questions at once.
        if trimmed.matches('?').count() > 1 {
            score += 1;
        }

        // Signal 8: a single-entity lookup pulls toward simple.
        if lookup {
            score -= 1;
        }

        let (complexity, confidence, reason) = Self::score_to_tier(score, lookup);
        let suggested_tier = if self.momentum(recent_history) {
            complexity.escalate()
        } else {
            complexity
        };

        Classification {
            complexity,
            needs_tools: true,
            suggested_tier,
            confidence,
            reason,
        }
    }

    fn without_tools(confidence: f32, reason: &'static str) -> Classification {
        Classification {
            complexity: Complexity::Simple,
            needs_tools: false,
            suggested_tier: Complexity::Simple,
            confidence,
            reason,
        }
    }

    fn answerable_from_history(message: &str, recent_history: &[&str]) -> bool {
        if NAME_RECALL.is_match(message) {
            return recent_history.iter().any(|m| NAME_STATEMENT.is_match(m));
        }
        // Recall questions that also reference financial data still need tools.
        GENERIC_RECALL.is_match(message)
            && !recent_history.is_empty()
            && !Self::mentions_data(message)
    }

    fn mentions_data(message: &str) -> bool {
        Self::domain_count(message) > 0 || TOOL_TERMS.is_match(message)
    }

    fn domain_count(message: &str) -> usize {
        DOMAINS.iter().filter(|(_, re)| re.is_match(message)).count()
    }

    fn indicates_complex(message: &str) -> bool {
        COMPLEX_KEYWORDS.is_match(message)
            || MULTI_PERIOD.is_match(message)
            || Self::domain_count(message) >= 3
    }

    /// Two of the last few user messages carried complex indicators.
    fn momentum(&self, recent_history: &[&str]) -> bool {
        let start = recent_history.len().saturating_sub(self.history_window);
        recent_history[start..]
            .iter()
            .filter(|m| Self::indicates_complex(m))
            .count()
            >= 2
    }

    fn score_to_tier(score: i32, lookup: bool) -> (Complexity, f32, &'static str) {
        if score >= COMPLEX_THRESHOLD {
            let confidence = (0.6 + 0.1 * (score - COMPLEX_THRESHOLD) as f32).min(0.95);
            (Complexity::Complex, confidence, "comparison, planning, or multi-domain request")
        } else if score >= 1 {
            (Complexity::Moderate, 0.7, "aggregation or single-domain analysis")
        } else if lookup {
            (Complexity::Simple, 0.85, "single-entity lookup")
        } else {
            (Complexity::Moderate, 0.5, "no strong signal, defaulting to moderate")
        }
    }
}

impl Default for QueryClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn classify(message: &str) -> Classification {
        QueryClassifier::new().classify(message, &[])
    }

    #[test]
    fn checking_balance_is_simple_lookup_with_tools() {
        let c = classify("What's my checking balance?");
        assert_eq!(c.complexity, Complexity::Simple);
        assert!(c.needs_tools);
    }

    #[test]
    fn multi_year_tax_comparison_is_complex() {
        let c = classify(
            "Compare my spending trend across the last 3 years and recommend tax optimizations",
        );
        assert_eq!(c.complexity, Complexity::Complex);
        assert!(c.needs_tools);
    }

    #[test]
    fn greetings_need_no_tools() {
        for msg in ["hi", "Hello!", "thanks", "Thank you", "good morning", "ok"] {
            let c = classify(msg);
            assert_eq!(c.complexity, Complexity::Simple, "failed for: {msg}");
            assert!(!c.needs_tools, "failed for: {msg}");
        }
    }

    #[test]
    fn questions_about_the_assistant_need_no_tools() {
        for msg in ["Who are you?", "what are you", "How are you doing today?"] {
            let c = classify(msg);
            assert!(!c.needs_tools, "failed for: {msg}");
        }
    }

    #[test]
    fn finance_questions_phrased_like_small_talk_keep_tools() {
        for msg in [
            "What are you seeing in my spending this month?",
            "How are you tracking my budget for groceries?",
            "Who are you sending my bank balance to?",
            "thanks, and what's my checking balance?",
        ] {
            let c = classify(msg);
            assert!(c.needs_tools, "failed for: {msg}");
        }
    }

    #[test]
    fn name_recall_accepts_typographic_apostrophe() {
        let c = QueryClassifier::new().classify("What\u{2019}s my name?", &["I\u{2019}m called Sam"]);
        assert!(!c.needs_tools);
        assert_eq!(c.reason, "answerable from conversation history");
    }

    #[test]
    fn name_recall_uses_history_when_available() {
        let classifier = QueryClassifier::new();
        let with_history = classifier.classify("What's my name?", &["Hi, my name is Sam"]);
        assert!(!with_history.needs_tools);

        let without_history = classifier.classify("What's my name?", &["How are my budgets?"]);
        assert!(without_history.needs_tools);
    }

    #[test]
    fn recall_of_financial_facts_still_needs_tools() {
        let c = QueryClassifier::new()
            .classify("What did I tell you about my mortgage?", &["I refinanced"]);
        assert!(c.needs_tools);
    }

    #[test]
    fn single_domain_summary_is_moderate() {
        let c = classify("Give me a breakdown of my spending by category this month");
        assert_eq!(c.complexity, Complexity::Moderate);
    }

    #[test]
    fn unknown_phrasing_defaults_to_moderate() {
        let c = classify("Tell me something about my situation");
        assert_eq!(c.complexity, Complexity::Moderate);
        assert!(c.needs_tools);
    }

    #[test]
    fn single_period_lookup_stays_simple() {
        let c = classify("How much did I spend on groceries last month?");
        assert_eq!(c.complexity, Complexity::Simple);
    }

    #[test]
    fn many_domains_escalate() {
        let c = classify("Compare my crypto and stocks against my mortgage and income");
        assert_eq!(c.complexity, Complexity::Complex);
    }

    #[test]
    fn momentum_bumps_suggested_tier_only() {
        let history = [
            "Should I rebalance my portfolio?",
            "Compare my 2023 vs 2024 taxes",
            "ok",
        ];
        let c = QueryClassifier::new().classify("What's my checking balance?", &history);
        assert_eq!(c.complexity, Complexity::Simple);
        assert_eq!(c.suggested_tier, Complexity::Moderate);
    }

    #[test]
    fn momentum_window_is_respected() {
        let history = [
            "Should I rebalance my portfolio?",
            "Compare my 2023 vs 2024 taxes",
            "ok",
            "thanks",
            "cool",
        ];
        let c = QueryClassifier::with_history_window(3).classify("What's my checking balance?", &history);
        assert_eq!(c.suggested_tier, Complexity::Simple);
    }

    #[test]
    fn empty_message_is_simple() {
        let c = classify("   ");
        assert_eq!(c.complexity, Complexity::Simple);
        assert!(!c.needs_tools);
    }

    proptest! {
        #[test]
        fn classification_is_deterministic(
            message in ".{0,120}",
            history in proptest::collection::vec(".{0,60}", 0..4),
        ) {
            let classifier = QueryClassifier::new();
            let refs: Vec<&str> = history.iter().map(String::as_str).collect();
            let first = classifier.classify(&message, &refs);
            let second = classifier.classify(&message, &refs);
            prop_assert_eq!(first, second);
        }

        #[test]
        fn suggested_tier_never_below_complexity(message in "[a-z ?]{0,80}") {
            let c = QueryClassifier::new().classify(&message, &[]);
            prop_assert!(c.suggested_tier >= c.complexity);
        }
    }
}
