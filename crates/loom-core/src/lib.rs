//! # loom-core
//!
//! Foundation types, errors, branded IDs, and utilities for the Loom agent.
//!
//! This crate provides the shared vocabulary that all other Loom crates depend on:
//!
//! - **Branded IDs**: `EventId`, `SessionId`, `WorkspaceId` as newtypes for type safety
//! - **Messages**: `Message` enum with `User`, `Assistant`, `ToolResult` variants
//! - **Content blocks**: `ContentBlock` enum covering text, images, thinking, tool use/results
//! - **Tool results**: `LoomToolResult` with content, details, error/stop flags
//! - **Errors**: `LoomError` hierarchy via `thiserror`, RPC error codes
//! - **Stream events**: `StreamEvent` enum for LLM streaming protocol

#![deny(unsafe_code)]

pub mod ask_user_question;
pub mod constants;
pub mod content;
pub mod errors;
pub mod events;
pub mod ids;
pub mod messages;
pub mod retry;
pub mod text;
pub mod tools;
