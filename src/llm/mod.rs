//! Generation-side plumbing: the completion trait, the structured-output
//! extractor, and the bounded-retry round trip that ties them together.

pub mod extract;
pub mod http;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use crate::config::RetryPolicy;
use crate::types::RagError;

pub use extract::{Extracted, extract_json};
pub use http::HttpCompletionProvider;

/// Text-completion capability: given a system instruction and a context
/// string, return a free-form text completion. No structural guarantees.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, system: &str, context: &str) -> Result<String, RagError>;
}

/// Runs a completion round trip and extracts structured JSON from it,
/// retrying the full round trip on transport or parse failure.
///
/// Generation endpoints occasionally produce malformed output; re-invoking is
/// a probabilistic mitigation, not a guarantee, so attempts are bounded by
/// `policy` with exponential backoff in between. Exhausting the budget
/// surfaces the last failure.
pub async fn complete_structured(
    provider: &dyn CompletionProvider,
    system: &str,
    context: &str,
    policy: &RetryPolicy,
) -> Result<Value, RagError> {
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let failure = match provider.complete(system, context).await {
            Ok(raw) => match extract_json(&raw) {
                Extracted::Parsed(value) => return Ok(value),
                Extracted::Failed(reason) => RagError::Parse(reason),
            },
            Err(err) => err,
        };
        if attempt >= policy.max_attempts {
            return Err(failure);
        }
        let delay = policy.delay_for_attempt(attempt);
        warn!(
            attempt,
            max_attempts = policy.max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %failure,
            "generation round trip failed, retrying"
        );
        tokio::time::sleep(delay).await;
    }
}
