//! # loom-llm
//!
//! LLM provider trait and shared streaming utilities.
//!
//! Defines the `Provider` trait that all LLM backends implement:
//! - Shared SSE parser (handles Anthropic / `OpenAI` / Google format differences)
//! - Stream retry with exponential backoff + jitter
//! - Tool call JSON parsing from incremental deltas
//! - ID remapping utilities
//! - Model registry: `model_id -> ModelInfo { context_window, max_output, pricing, capabilities }`
//! - Provider factory: `create_provider(config) -> Box<dyn Provider>`

#![deny(unsafe_code)]

pub mod context_composition;
pub mod error_parsing;
pub mod health;
pub mod id_remapping;
pub mod models;
pub mod provider;
pub mod retry;
pub mod sse;
pub mod stream_pipeline;
pub mod tool_parsing;

pub use context_composition::{compose_context_parts, compose_context_parts_grouped};
pub use id_remapping::{build_tool_call_id_mapping, detect_id_format, remap_tool_call_id, IdFormat};
pub use provider::{Provider, ProviderError, ProviderFactory, ProviderResult, ProviderStreamOptions, StreamEventStream};
pub use tool_parsing::{parse_tool_call_arguments, ToolCallContext};
