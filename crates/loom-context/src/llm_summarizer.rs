//! LLM-based summarizer.
//!
//! Spawns a subagent (Haiku) for intelligent context summarization.
//! Falls back to [`KeywordSummarizer`] on any failure.
//!
//! Uses [`serialize_messages`](crate::summarizer::serialize_messages) and
//! [`parse_summarizer_response`](crate::summarizer::parse_summarizer_response)
//! from the shared summarizer module.

use async_trait::async_trait;
use tracing::warn;

use loom_core::messages::Message;

use crate::summarizer::{
    parse_summarizer_response, serialize_messages, KeywordSummarizer, Summarizer,
};
use crate::types::SummaryResult;

// =============================================================================
// Types
// =============================================================================

/// Result of spawning a summarizer subsession.
#[derive(Clone, Debug)]
pub struct SubsessionResult {
    /// Whether the subsession succeeded.
    pub success: bool,
    /// Output text from the subsession.
    pub output: Option<String>,
    /// Error message if failed.
    pub error: Option<String>,
}

/// Dependency for spawning a summarizer subsession.
///
/// Abstracted as a trait for testability.
#[async_trait]
pub trait SubsessionSpawner: Send + Sync {
    /// Spawn a summarizer subsession with the given task transcript.
    async fn spawn_summarizer(&self, task: &str) -> SubsessionResult;
}

// =============================================================================
// LlmSummarizer
// =============================================================================

/// LLM-based summarizer that spawns a subagent for intelligent summaries.
///
/// On any failure (subsession error, invalid JSON, missing narrative),
/// falls back to [`KeywordSummarizer`].
pub struct LlmSummarizer<S: SubsessionSpawner> {
    spawner: S,
    fallback: KeywordSummarizer,
}

impl<S: SubsessionSpawner> LlmSummarizer<S> {
    /// Create a new LLM summarizer with the given subsession spawner.
    pub fn new(spawner: S) -> Self {
        Self {
            spawner,
            fallback: KeywordSummarizer,
        }
    }
}

#[async_trait]
impl<S: SubsessionSpawner> Summarizer for LlmSummarizer<S> {
    async fn summarize(
        &self,
        messages: &[Message],
    ) -> Result<SummaryResult, Box<dyn std::error::Error + Send + Sync>> {
        let serialized = serialize_messages(messages);

        let result = self.spawner.spawn_summarizer(&serialized).await;

        let output = match result {
            ref r if r.success => r.output.clone(),
            _ => None,
        };
        let Some(output) = output else {
            warn!(
                error = result.error.as_deref().unwrap_or("unknown"),
                "LLM summarizer subagent failed, using fallback"
            );
            return self.fallback.summarize(messages).await;
        };
        if let Ok(parsed) = parse_summarizer_response(&output) {
            Ok(parsed)
        } else {
            warn!(
                output_length = output.len(),
                "LLM summarizer returned invalid JSON, using fallback"
            );
            self.fallback.summarize(messages).await
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
