//! Explicit configuration for index storage and query execution.
//!
//! Everything the pipeline needs from its environment is passed in through
//! these structs; there are no ambient directories or globals.

use std::path::PathBuf;
use std::time::Duration;

/// Settings for building and locating per-document vector indexes.
#[derive(Clone, Debug)]
pub struct IndexConfig {
    /// Directory holding every `<key>.index.sqlite` / `<key>.meta.json` pair.
    pub index_root: PathBuf,
    /// Window length of a chunk, in characters.
    pub chunk_len: usize,
    /// Overlap between consecutive chunks, in characters. Must be < `chunk_len`.
    pub chunk_overlap: usize,
    /// Pages whose cleaned text is shorter than this are not indexed.
    pub min_chars_per_page: usize,
}

impl IndexConfig {
    pub fn new(index_root: impl Into<PathBuf>) -> Self {
        Self {
            index_root: index_root.into(),
            chunk_len: 512,
            chunk_overlap: 50,
            min_chars_per_page: 40,
        }
    }

    #[must_use]
    pub fn with_chunking(mut self, chunk_len: usize, chunk_overlap: usize) -> Self {
        self.chunk_len = chunk_len;
        self.chunk_overlap = chunk_overlap;
        self
    }

    #[must_use]
    pub fn with_min_chars_per_page(mut self, min_chars: usize) -> Self {
        self.min_chars_per_page = min_chars;
        self
    }
}

/// Bounded retry with exponential backoff for generation round trips.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles per subsequent attempt.
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Backoff delay after the given failed attempt (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1 << exponent)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2, Duration::from_millis(500))
    }
}

/// Query-time settings for the orchestrator.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Nearest chunks requested per sub-query before page deduplication.
    pub top_k: usize,
    pub retry: RetryPolicy,
}

impl EngineConfig {
    #[must_use]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            top_k: 2,
            retry: RetryPolicy::default(),
        }
    }
}
