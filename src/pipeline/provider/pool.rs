//! Provider pool: round-robin selection weighted toward the primary, with
//! a fixed fallback order.
//!
//! Selection is a pure function of the pool's call counter: call indices
//! 0, 1, 2, 3 go to the primary, index 4 to the secondary, repeating with
//! period 5. The counter lives in the pool instance (not a global) and is
//! advanced under a mutex, so concurrent pipeline runs observe a single
//! global ordering with no duplicated or skipped indices.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use super::{LlmProvider, ProviderError};

/// Every `SECONDARY_PERIOD`-th call (zero-indexed `PERIOD - 1`) goes to the secondary.
pub const SECONDARY_PERIOD: u64 = 5;

/// Monotonic selection counter shared by all runs using one pool.
#[derive(Debug, Default)]
pub struct CallCounter {
    next: Mutex<u64>,
}

impl CallCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counter whose first issued index is `start`.
    pub fn starting_at(start: u64) -> Self {
        Self {
            next: Mutex::new(start),
        }
    }

    /// Take the current index and advance.
    pub fn advance(&self) -> u64 {
        let mut guard = self.next.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let index = *guard;
        *guard = guard.wrapping_add(1);
        index
    }

    /// Number of selections issued so far (for observability).
    pub fn issued(&self) -> u64 {
        *self.next.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Which pool slot a call index maps to.
pub fn slot_for_index(index: u64) -> usize {
    if index % SECONDARY_PERIOD == SECONDARY_PERIOD - 1 {
        1
    } else {
        0
    }
}

/// Ordered set of interchangeable providers. Slot 0 is the primary, slot 1
/// the secondary; any further providers are only reached through fallback.
pub struct ProviderPool {
    providers: Vec<Arc<dyn LlmProvider>>,
    counter: CallCounter,
}

impl std::fmt::Debug for ProviderPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderPool")
            .field("providers", &self.names())
            .field("counter", &self.counter)
            .finish()
    }
}

impl ProviderPool {
    pub fn new(providers: Vec<Arc<dyn LlmProvider>>) -> Result<Self, ProviderError> {
        Self::with_counter(providers, CallCounter::new())
    }

    /// Build a pool around an injected counter.
    pub fn with_counter(
        providers: Vec<Arc<dyn LlmProvider>>,
        counter: CallCounter,
    ) -> Result<Self, ProviderError> {
        if providers.len() < 2 {
            return Err(ProviderError::NotConfigured(format!(
                "provider pool needs at least two providers, got {}",
                providers.len()
            )));
        }

        let mut seen = HashSet::new();
        for provider in &providers {
            if !seen.insert(provider.name().to_string()) {
                return Err(ProviderError::NotConfigured(format!(
                    "duplicate provider name: {}",
                    provider.name()
                )));
            }
        }

        Ok(Self { providers, counter })
    }

    pub fn names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    pub fn primary(&self) -> &dyn LlmProvider {
        self.providers[0].as_ref()
    }

    pub fn secondary(&self) -> &dyn LlmProvider {
        self.providers[1].as_ref()
    }

    /// Choose the provider for the next call and advance the counter.
    pub fn select(&self) -> &dyn LlmProvider {
        let index = self.counter.advance();
        let provider = self.providers[slot_for_index(index)].as_ref();
        tracing::debug!(call_index = index, provider = provider.name(), "Provider selected");
        provider
    }

    /// The provider to retry on after `name` failed.
    ///
    /// The next provider in pool order, wrapping around; with exactly two
    /// providers this is a swap. Returns `None` for an unknown name.
    pub fn fallback_for(&self, name: &str) -> Option<&dyn LlmProvider> {
        let position = self.providers.iter().position(|p| p.name() == name)?;
        let next = (position + 1) % self.providers.len();
        Some(self.providers[next].as_ref())
    }

    pub fn counter(&self) -> &CallCounter {
        &self.counter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::provider::testing::{shared, ScriptedProvider};

    fn two_pool() -> ProviderPool {
        ProviderPool::new(vec![
            shared(ScriptedProvider::answering("openai", "a")),
            shared(ScriptedProvider::answering("gemini", "b")),
        ])
        .unwrap()
    }

    #[test]
    fn twenty_selections_pick_secondary_at_every_fifth_call() {
        let pool = two_pool();
        let picks: Vec<&str> = (0..20).map(|_| pool.select().name()).collect();

        let secondary_indices: Vec<usize> = picks
            .iter()
            .enumerate()
            .filter(|(_, name)| **name == "gemini")
            .map(|(i, _)| i)
            .collect();
        assert_eq!(secondary_indices, vec![4, 9, 14, 19]);
        assert_eq!(pool.counter().issued(), 20);
    }

    #[test]
    fn slot_is_pure_function_of_index() {
        for index in 0..50u64 {
            let expected = if index % 5 == 4 { 1 } else { 0 };
            assert_eq!(slot_for_index(index), expected, "index {index}");
        }
    }

    #[test]
    fn injected_counter_continues_sequence() {
        let pool = ProviderPool::with_counter(
            vec![
                shared(ScriptedProvider::answering("openai", "a")),
                shared(ScriptedProvider::answering("gemini", "b")),
            ],
            CallCounter::starting_at(4),
        )
        .unwrap();
        assert_eq!(pool.select().name(), "gemini");
        assert_eq!(pool.select().name(), "openai");
    }

    #[test]
    fn concurrent_selection_has_no_duplicate_or_skipped_indices() {
        let pool = Arc::new(two_pool());
        let threads = 8;
        let per_thread = 25;

        let secondary_total: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..threads)
                .map(|_| {
                    let pool = Arc::clone(&pool);
                    scope.spawn(move || {
                        (0..per_thread)
                            .filter(|_| pool.select().name() == "gemini")
                            .count()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });

        let total = (threads * per_thread) as u64;
        assert_eq!(pool.counter().issued(), total);
        assert_eq!(secondary_total as u64, total / SECONDARY_PERIOD);
    }

    #[test]
    fn counter_keeps_counting_after_a_panicking_holder() {
        let counter = CallCounter::starting_at(3);
        let poisoned = std::thread::scope(|scope| {
            scope
                .spawn(|| {
                    let _guard = counter.next.lock().unwrap();
                    panic!("selection aborted");
                })
                .join()
                .is_err()
        });
        assert!(poisoned);
        assert!(counter.next.is_poisoned());

        assert_eq!(counter.advance(), 3);
        assert_eq!(counter.advance(), 4);
        assert_eq!(counter.issued(), 5);
    }

    #[test]
    fn fallback_swaps_between_two_providers() {
        let pool = two_pool();
        assert_eq!(pool.fallback_for("openai").unwrap().name(), "gemini");
        assert_eq!(pool.fallback_for("gemini").unwrap().name(), "openai");
        assert!(pool.fallback_for("claude").is_none());
    }

    #[test]
    fn fallback_order_wraps_for_three_providers() {
        let pool = ProviderPool::new(vec![
            shared(ScriptedProvider::answering("openai", "a")),
            shared(ScriptedProvider::answering("gemini", "b")),
            shared(ScriptedProvider::answering("local", "c")),
        ])
        .unwrap();
        assert_eq!(pool.fallback_for("openai").unwrap().name(), "gemini");
        assert_eq!(pool.fallback_for("gemini").unwrap().name(), "local");
        assert_eq!(pool.fallback_for("local").unwrap().name(), "openai");
        // Selection still only alternates between the first two slots.
        let picks: HashSet<&str> = (0..10).map(|_| pool.select().name()).collect();
        assert!(!picks.contains("local"));
    }

    #[test]
    fn pool_requires_two_distinct_providers() {
        let single = ProviderPool::new(vec![shared(ScriptedProvider::answering("openai", "a"))]);
        assert!(matches!(single, Err(ProviderError::NotConfigured(_))));

        let duplicate = ProviderPool::new(vec![
            shared(ScriptedProvider::answering("openai", "a")),
            shared(ScriptedProvider::answering("openai", "b")),
        ]);
        assert!(matches!(duplicate, Err(ProviderError::NotConfigured(_))));
    }
}
