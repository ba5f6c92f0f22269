//! Anthropic provider implementing the [`Provider`] trait.
//!
//! Builds and sends streaming requests to the Anthropic Messages API.
//! Supports API key and OAuth authentication, prompt caching with TTL breakpoints,
//! extended thinking (adaptive for Opus 4.6, budget-based for older models),
//! and effort levels.

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::{json, Value};
use tracing::{debug, error, info, instrument, warn};

use loom_core::events::StreamEvent;
use loom_core::messages::Context;
use loom_llm::models::types::ProviderType;
use loom_llm::provider::{
    Provider, ProviderError, ProviderResult, ProviderStreamOptions, StreamEventStream,
};
use loom_llm::{compose_context_parts, compose_context_parts_grouped};
use loom_llm::sse::parse_sse_lines;

use crate::cache_pruning::{
    is_cache_cold, prune_tool_results_for_recache, DEFAULT_RECENT_TURNS, DEFAULT_TTL_MS,
};
use crate::message_converter::convert_messages;
use crate::message_sanitizer::sanitize_messages;
use crate::stream_handler::{create_stream_state, process_sse_event};
use crate::types::{
    get_claude_model, AnthropicAuth, AnthropicConfig, AnthropicMessageParam,
    AnthropicRequest, AnthropicSseEvent, AnthropicTool, CacheControl,
    SystemPromptBlock, DEFAULT_MAX_OUTPUT_TOKENS, OAUTH_SYSTEM_PROMPT_PREFIX,
};

/// Default base URL for the Anthropic API.
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

/// Default SSE parser options.
static SSE_OPTIONS: loom_llm::sse::SseParserOptions = loom_llm::sse::SseParserOptions {
    process_remaining_buffer: true,
};

/// API version header value.
const API_VERSION: &str = "2023-06-01";

/// Anthropic LLM provider.
pub struct AnthropicProvider {
    /// Configuration.
    config: AnthropicConfig,
    /// HTTP client.
    client: reqwest::Client,
    /// Timestamp of last API call (milliseconds since epoch).
    last_api_call_ms: u64,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider.
    #[must_use]
    pub fn new(config: AnthropicConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            last_api_call_ms: 0,
        }
    }

    /// Create a new Anthropic provider with a shared HTTP client.
    #[must_use]
    pub fn with_client(config: AnthropicConfig, client: reqwest::Client) -> Self {
        Self {
            config,
            client,
            last_api_call_ms: 0,
        }
    }

    /// Whether this provider uses OAuth authentication.
    fn is_oauth(&self) -> bool {
        matches!(self.config.auth, AnthropicAuth::OAuth { .. })
    }

    /// Build HTTP headers for the request.
    ///
    /// OAuth requests require:
    /// - `anthropic-beta: oauth-2025-04-20,...` (always includes the OAuth beta)
    /// - `anthropic-dangerous-direct-browser-access: true`
    ///
    /// API key requests only add `anthropic-beta` for models needing thinking beta.
    fn build_headers(&self) -> ProviderResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        let _ = headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let _ = headers.insert(
            "anthropic-version",
            HeaderValue::from_static(API_VERSION),
        );

        match &self.config.auth {
            AnthropicAuth::ApiKey { api_key } => {
                let _ = headers.insert(
                    "x-api-key",
                    HeaderValue::from_str(api_key).map_err(|e| ProviderError::Auth {
                        message: format!("Invalid API key header: {e}"),
                    })?,
                );
                // API key: only add thinking beta for models that need it
                if let Some(model_info) = get_claude_model(&self.config.model) {
                    if model_info.supports_thinking_beta_headers {
                        let _ = headers.insert(
                            "anthropic-beta",
                            HeaderValue::from_static("interleaved-thinking-2025-05-14"),
                        );
                    }
                }
            }
            AnthropicAuth::OAuth { tokens, .. } => {
                let auth_value = format!("Bearer {}", tokens.access_token);
                let _ = headers.insert(
                    AUTHORIZATION,
                    HeaderValue::from_str(&auth_value).map_err(|e| ProviderError::Auth {
                        message: format!("Invalid OAuth header: {e}"),
                    })?,
                );
                // OAuth: always add browser access header
                let _ = headers.insert(
                    "anthropic-dangerous-direct-browser-access",
                    HeaderValue::from_static("true"),
                );
                // OAuth: beta headers — full set for models needing thinking beta,
                // just `oauth-2025-04-20` for models that don't (e.g., Opus 4.6)
                let model_info = get_claude_model(&self.config.model);
                let needs_thinking_beta =
                    model_info.is_none_or(|m| m.supports_thinking_beta_headers);
                let beta_value = if needs_thinking_beta {
                    &self.config.provider_settings.oauth_beta_headers
                } else {
                    "oauth-2025-04-20"
                };
                let _ = headers.insert(
                    "anthropic-beta",
                    HeaderValue::from_str(beta_value).map_err(|e| ProviderError::Auth {
                        message: format!("Invalid beta header: {e}"),
                    })?,
                );
            }
        }

        Ok(headers)
    }

    /// Build the system prompt parameter.
    ///
    /// For API key auth: returns a single string.
    /// For OAuth auth: returns an array of `SystemPromptBlock`s with cache breakpoints.
    fn build_system_param(&self, context: &Context) -> Option<Value> {
        if self.is_oauth() {
            self.build_oauth_system_param(context)
        } else {
            Self::build_simple_system_param(context)
        }
    }

    /// Build a simple string system prompt (API key mode).
    fn build_simple_system_param(context: &Context) -> Option<Value> {
        let parts = compose_context_parts(context);
        if parts.is_empty() {
            return None;
        }
        Some(json!(parts.join("\n\n")))
    }

    /// Build multi-block system prompt with cache breakpoints (OAuth mode).
    fn build_oauth_system_param(&self, context: &Context) -> Option<Value> {
        let grouped = compose_context_parts_grouped(context);

        let prefix = self
            .config
            .provider_settings
            .system_prompt_prefix
            .as_deref()
            .unwrap_or(OAUTH_SYSTEM_PROMPT_PREFIX);

        let mut blocks: Vec<SystemPromptBlock> = Vec::new();

        // OAuth prefix block
        blocks.push(SystemPromptBlock::text(prefix));

        // Stable blocks (system prompt, rules, memory)
        for part in &grouped.stable {
            blocks.push(SystemPromptBlock::text(part));
        }

        // Volatile blocks (dynamic rules, skills, subagent results, tasks)
        for part in &grouped.volatile {
            blocks.push(SystemPromptBlock::text(part));
        }

        if blocks.is_empty() {
            return None;
        }

        // Apply cache breakpoints
        if !grouped.volatile.is_empty() {
            // Breakpoint 2: Last stable block → 1h TTL
            let last_stable_idx = 1 + grouped.stable.len(); // +1 for prefix
            if last_stable_idx > 0 && last_stable_idx <= blocks.len() {
                blocks[last_stable_idx - 1].cache_control = Some(CacheControl {
                    cache_type: "ephemeral".into(),
                    ttl: Some("1h".into()),
                });
            }
            // Breakpoint 3: Last volatile block → 5m default
            if let Some(last) = blocks.last_mut() {
                last.cache_control = Some(CacheControl {
                    cache_type: "ephemeral".into(),
                    ttl: None,
                });
            }
        } else if !grouped.stable.is_empty() {
            // Only stable: last stable block → 1h TTL
            if let Some(last) = blocks.last_mut() {
                last.cache_control = Some(CacheControl {
                    cache_type: "ephemeral".into(),
                    ttl: Some("1h".into()),
                });
            }
        } else {
            // Only prefix → 5m default
            if let Some(last) = blocks.last_mut() {
                last.cache_control = Some(CacheControl {
                    cache_type: "ephemeral".into(),
                    ttl: None,
                });
            }
        }

        Some(serde_json::to_value(&blocks).unwrap_or_default())
    }

    /// Build tool definitions with cache breakpoints.
    fn build_tools(&self, context: &Context) -> Option<Vec<AnthropicTool>> {
        let tools = context.tools.as_ref()?;
        if tools.is_empty() {
            return None;
        }

        let mut anthropic_tools: Vec<AnthropicTool> = tools
            .iter()
            .map(|t| AnthropicTool {
                name: t.name.clone(),
                description: t.description.clone(),
                input_schema: serde_json::to_value(&t.parameters).unwrap_or_default(),
                cache_control: None,
            })
            .collect();

        // Breakpoint 1: Last tool → 1h TTL (OAuth only)
        if self.is_oauth() {
            if let Some(last) = anthropic_tools.last_mut() {
                last.cache_control = Some(CacheControl {
                    cache_type: "ephemeral".into(),
                    ttl: Some("1h".into()),
                });
            }
        }

        Some(anthropic_tools)
    }

    /// Build thinking configuration.
    fn build_thinking_config(&self, options: &ProviderStreamOptions) -> Option<Value> {
        if options.enable_thinking != Some(true) {
            return None;
        }

        let model_info = get_claude_model(&self.config.model);

        if model_info.is_some_and(|m| m.supports_adaptive_thinking) {
            Some(json!({ "type": "adaptive" }))
        } else {
            let budget = options.thinking_budget.unwrap_or_else(|| {
                model_info
                    .map_or(DEFAULT_MAX_OUTPUT_TOKENS / 4, |m| m.max_output / 4)
            });
            Some(json!({
                "type": "enabled",
                "budget_tokens": budget,
            }))
        }
    }

    /// Build output configuration (effort levels).
    fn build_output_config(&self, options: &ProviderStreamOptions) -> Option<Value> {
        let effort = options.effort_level.as_deref()?;
        let model_info = get_claude_model(&self.config.model)?;
        if !model_info.supports_effort {
            return None;
        }
        Some(json!({ "effort": effort }))
    }

    /// Calculate `max_tokens` for the request.
    fn calculate_max_tokens(&self, options: &ProviderStreamOptions) -> u32 {
        options.max_tokens.unwrap_or_else(|| {
            self.config.max_tokens.unwrap_or_else(|| {
                get_claude_model(&self.config.model)
                    .map_or(DEFAULT_MAX_OUTPUT_TOKENS, |m| m.max_output)
            })
        })
    }

    /// Apply cache control to the last user message (Breakpoint 4: 5m TTL).
    fn apply_cache_to_last_user_message(messages: &mut [AnthropicMessageParam]) {
        for msg in messages.iter_mut().rev() {
            if msg.role == "user" && !msg.content.is_empty() {
                if let Some(last_block) = msg.content.last_mut() {
                    if let Some(obj) = last_block.as_object_mut() {
                        let _ = obj.insert(
                            "cache_control".into(),
                            json!({"type": "ephemeral"}),
                        );
                    }
                }
                break;
            }
        }
    }

    /// Build the request body.
    fn build_request(
        &self,
        context: &Context,
        options: &ProviderStreamOptions,
        messages: Vec<AnthropicMessageParam>,
    ) -> AnthropicRequest {
        AnthropicRequest {
            model: self.config.model.clone(),
            max_tokens: self.calculate_max_tokens(options),
            messages,
            system: self.build_system_param(context),
            tools: self.build_tools(context),
            stream: true,
            thinking: self.build_thinking_config(options),
            output_config: self.build_output_config(options),
            stop_sequences: options.stop_sequences.clone(),
        }
    }

    /// Perform the streaming HTTP request and return the event stream.
    #[instrument(skip_all, fields(model = %self.config.model))]
    async fn stream_internal(
        &self,
        context: &Context,
        options: &ProviderStreamOptions,
    ) -> ProviderResult<StreamEventStream> {
        let sanitized = sanitize_messages(context.messages.clone());
        let mut messages = convert_messages(&sanitized);

        // Cache cold detection and pruning (OAuth only)
        if self.is_oauth() && self.last_api_call_ms > 0 {
            if is_cache_cold(self.last_api_call_ms, DEFAULT_TTL_MS) {
                let msg_count = messages.len();
                messages = prune_tool_results_for_recache(&messages, DEFAULT_RECENT_TURNS);
                info!(
                    elapsed_ms = %now_ms().saturating_sub(self.last_api_call_ms),
                    message_count = msg_count,
                    "[CACHE] Cold — pruned old tool results"
                );
            } else {
                debug!(
                    elapsed_ms = %now_ms().saturating_sub(self.last_api_call_ms),
                    "[CACHE] Warm"
                );
            }
        }

        // Breakpoint 4: cache last user message (OAuth only)
        if self.is_oauth() {
            Self::apply_cache_to_last_user_message(&mut messages);
        }

        let request = self.build_request(context, options, messages);

        let base_url = self
            .config
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL);
        let url = format!("{base_url}/v1/messages");

        let headers = self.build_headers()?;
        let body = serde_json::to_value(&request).map_err(ProviderError::Json)?;

        debug!(
            model = %request.model,
            max_tokens = request.max_tokens,
            message_count = request.messages.len(),
            has_tools = request.tools.is_some(),
            has_thinking = request.thinking.is_some(),
            "Sending Anthropic request"
        );

        let response = self
            .client
            .post(&url)
            .headers(headers)
            .json(&body)
            .send()
            .await
            .map_err(ProviderError::Http)?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(loom_core::retry::parse_retry_after_header);
            let body_text = response.text().await.unwrap_or_default();
            let (message, code, retryable) = parse_api_error(&body_text, status.as_u16());
            error!(
                status = status.as_u16(),
                code = code.as_deref().unwrap_or("unknown"),
                retryable,
                "Anthropic API error"
            );
            if status.as_u16() == 429 {
                return Err(ProviderError::RateLimited {
                    retry_after_ms: retry_after.unwrap_or(0),
                    message,
                });
            }
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
                code,
                retryable,
            });
        }

        // Parse SSE stream
        let byte_stream = response.bytes_stream();
        let sse_lines = parse_sse_lines(byte_stream, &SSE_OPTIONS);

        let event_stream = sse_lines
            .scan(create_stream_state(), |state, line| {
                // Parse the SSE data as JSON
                let event: AnthropicSseEvent = match serde_json::from_str(&line) {
                    Ok(e) => e,
                    Err(e) => {
                        warn!(line = %line, error = %e, "Failed to parse SSE event");
                        return std::future::ready(Some(vec![]));
                    }
                };

                let events = process_sse_event(&event, state);
                std::future::ready(Some(events))
            })
            .flat_map(stream::iter)
            .map(Ok);

        Ok(Box::pin(event_stream))
    }
}

/// Current time in milliseconds since epoch.
#[allow(clippy::cast_possible_truncation)] // u128→u64 truncation won't happen before year 584 million
fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Parse an API error response body.
fn parse_api_error(body: &str, status: u16) -> (String, Option<String>, bool) {
    if let Ok(json) = serde_json::from_str::<Value>(body) {
        let error = &json["error"];
        let message = error["message"]
            .as_str()
            .unwrap_or("Unknown error")
            .to_string();
        let code = error["type"].as_str().map(String::from);
        let retryable = status == 429 || status >= 500;
        (message, code, retryable)
    } else {
        (
            format!("HTTP {status}: {body}"),
            None,
            status == 429 || status >= 500,
        )
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn provider_type(&self) -> ProviderType {
        ProviderType::Anthropic
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    #[instrument(skip_all, fields(provider = "anthropic", model = %self.config.model))]
    async fn stream(
        &self,
        context: &Context,
        options: &ProviderStreamOptions,
    ) -> ProviderResult<StreamEventStream> {
        debug!(message_count = context.messages.len(), "starting stream");
        let start_event = stream::once(async { Ok(StreamEvent::Start) });
        let inner_stream = match self.stream_internal(context, options).await {
            Ok(s) => s,
            Err(e) => {
                error!(error = %e, "Anthropic stream failed");
                return Err(e);
            }
        };
        Ok(Box::pin(start_event.chain(inner_stream)))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
