//! Process-wide usage counters: calls, tokens, and errors per provider.
//!
//! The tracker is the only mutable state shared across concurrent provider
//! calls. Every update takes the lock for a single increment. Each pipeline
//! run counts into its own fresh tracker; the process-wide tracker is
//! overwritten with that run's snapshot when the run finishes.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::provider::{ProviderErrorKind, ProviderId, TokenUsage};

/// Counters for a single provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderUsage {
    pub calls: u64,
    pub successes: u64,
    pub errors: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    /// Error counts keyed by error kind (`rate_limited`, `timeout`, ...).
    pub errors_by_kind: BTreeMap<String, u64>,
}

impl ProviderUsage {
    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Point-in-time copy of all counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    pub providers: BTreeMap<String, ProviderUsage>,
}

impl UsageSnapshot {
    pub fn total_calls(&self) -> u64 {
        self.providers.values().map(|u| u.calls).sum()
    }

    pub fn total_tokens(&self) -> u64 {
        self.providers.values().map(|u| u.total_tokens()).sum()
    }

    pub fn total_errors(&self) -> u64 {
        self.providers.values().map(|u| u.errors).sum()
    }

    pub fn provider(&self, id: &str) -> Option<&ProviderUsage> {
        self.providers.get(id)
    }
}

/// Shared usage tracker handle.
pub type SharedUsageTracker = Arc<UsageTracker>;

#[derive(Debug, Default)]
pub struct UsageTracker {
    inner: Mutex<HashMap<ProviderId, ProviderUsage>>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedUsageTracker {
        Arc::new(Self::new())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ProviderId, ProviderUsage>> {
        // Counters stay meaningful even if a holder panicked mid-update.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Count one outgoing attempt.
    pub fn record_call(&self, provider: &ProviderId) {
        self.lock().entry(provider.clone()).or_default().calls += 1;
    }

    pub fn record_success(&self, provider: &ProviderId, tokens: &TokenUsage) {
        let mut map = self.lock();
        let entry = map.entry(provider.clone()).or_default();
        entry.successes += 1;
        entry.prompt_tokens += tokens.prompt_tokens;
        entry.completion_tokens += tokens.completion_tokens;
    }

    pub fn record_error(&self, provider: &ProviderId, kind: ProviderErrorKind) {
        let mut map = self.lock();
        let entry = map.entry(provider.clone()).or_default();
        entry.errors += 1;
        *entry.errors_by_kind.entry(kind.to_string()).or_default() += 1;
    }

    /// Clear all counters.
    pub fn reset(&self) {
        self.lock().clear();
    }

    /// Overwrite every counter with the contents of `snapshot`.
    pub fn replace(&self, snapshot: &UsageSnapshot) {
        let mut map = self.lock();
        map.clear();
        map.extend(
            snapshot
                .providers
                .iter()
                .map(|(id, usage)| (ProviderId::new(id.as_str()), usage.clone())),
        );
    }

    pub fn snapshot(&self) -> UsageSnapshot {
        UsageSnapshot {
            providers: self
                .lock()
                .iter()
                .map(|(id, usage)| (id.to_string(), usage.clone()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_accumulate_per_provider() {
        let tracker = UsageTracker::new();
        let openai = ProviderId::new("openai");
        let gemini = ProviderId::new("gemini");

        tracker.record_call(&openai);
        tracker.record_call(&openai);
        tracker.record_error(&openai, ProviderErrorKind::RateLimited);
        tracker.record_success(
            &openai,
            &TokenUsage {
                prompt_tokens: 100,
                completion_tokens: 20,
            },
        );
        tracker.record_call(&gemini);
        tracker.record_error(&gemini, ProviderErrorKind::Timeout);

        let snap = tracker.snapshot();
        let o = snap.provider("openai").unwrap();
        assert_eq!(o.calls, 2);
        assert_eq!(o.successes, 1);
        assert_eq!(o.errors_by_kind.get("rate_limited"), Some(&1));
        assert_eq!(o.total_tokens(), 120);
        assert_eq!(snap.total_calls(), 3);
        assert_eq!(snap.total_errors(), 2);
    }

    #[test]
    fn test_reset_clears() {
        let tracker = UsageTracker::new();
        tracker.record_call(&ProviderId::new("xai"));
        tracker.reset();
        assert_eq!(tracker.snapshot(), UsageSnapshot::default());
    }

    #[tokio::test]
    async fn test_concurrent_increments_are_not_lost() {
        let tracker = UsageTracker::shared();
        let mut set = tokio::task::JoinSet::new();
        for _ in 0..8 {
            let t = Arc::clone(&tracker);
            set.spawn(async move {
                for _ in 0..100 {
                    t.record_call(&ProviderId::new("openai"));
                }
            });
        }
        while set.join_next().await.is_some() {}
        assert_eq!(tracker.snapshot().total_calls(), 800);
    }

    #[test]
    fn test_replace_overwrites_counters() {
        let run = UsageTracker::new();
        let anthropic = ProviderId::new("anthropic");
        run.record_call(&anthropic);
        run.record_error(&anthropic, ProviderErrorKind::Timeout);

        let process = UsageTracker::new();
        process.record_call(&ProviderId::new("openai"));
        process.replace(&run.snapshot());

        let snap = process.snapshot();
        assert!(snap.provider("openai").is_none());
        assert_eq!(snap, run.snapshot());
        assert_eq!(snap.provider("anthropic").unwrap().errors_by_kind["timeout"], 1);
    }
}
