//! Language-model usage accounting.
//!
//! Each session owns a [`UsageCounters`]; the root handle owns another that
//! aggregates every session it created. Both are reached through the
//! [`UsageSink`] trait so that the metered client never knows which scope it
//! is feeding. Counters only ever increase.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Token counts reported by a single model call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    /// Build from prompt/completion counts; the total is their sum.
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// Receives one record per model call, successful or not.
pub trait UsageSink: Send + Sync {
    fn record(&self, usage: Option<&TokenUsage>, latency: Duration);
}

/// Lock-free, increment-only usage accumulators.
#[derive(Debug, Default)]
pub struct UsageCounters {
    prompt_tokens: AtomicU64,
    completion_tokens: AtomicU64,
    total_tokens: AtomicU64,
    calls: AtomicU64,
    latency_ms: AtomicU64,
}

impl UsageCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Point-in-time copy of the counters.
    pub fn snapshot(&self) -> UsageSnapshot {
        UsageSnapshot {
            prompt_tokens: self.prompt_tokens.load(Ordering::Relaxed),
            completion_tokens: self.completion_tokens.load(Ordering::Relaxed),
            total_tokens: self.total_tokens.load(Ordering::Relaxed),
            calls: self.calls.load(Ordering::Relaxed),
            total_latency_ms: self.latency_ms.load(Ordering::Relaxed),
        }
    }
}

impl UsageSink for UsageCounters {
    fn record(&self, usage: Option<&TokenUsage>, latency: Duration) {
        if let Some(u) = usage {
            self.prompt_tokens
                .fetch_add(u.prompt_tokens, Ordering::Relaxed);
            self.completion_tokens
                .fetch_add(u.completion_tokens, Ordering::Relaxed);
            self.total_tokens.fetch_add(u.total_tokens, Ordering::Relaxed);
        }
        self.calls.fetch_add(1, Ordering::Relaxed);
        let ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.latency_ms.fetch_add(ms, Ordering::Relaxed);
    }
}

/// Serializable view of [`UsageCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub calls: u64,
    pub total_latency_ms: u64,
}

impl std::fmt::Display for UsageSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "calls: {}, tokens: {} (prompt {}, completion {}), latency: {}ms",
            self.calls,
            self.total_tokens,
            self.prompt_tokens,
            self.completion_tokens,
            self.total_latency_ms
        )
    }
}
