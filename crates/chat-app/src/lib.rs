#![deny(unsafe_code)]

//! Veritas chat core.
//!
//! Session state, the research-level request table, and the orchestrator
//! that turns provider streams into transcript updates. The terminal front
//! end in `main.rs` is a thin driver over these modules.

/// Chat domain: messages, transcript store, turn lifecycle, sessions.
pub mod chat;
/// Streaming completion orchestration over an injected provider.
pub mod orchestrator;
/// Research levels and their fixed request profiles.
pub mod research;
/// Settings persistence.
pub mod settings;
