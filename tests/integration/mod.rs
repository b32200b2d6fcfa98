//! Integration tests for tracesync
//!
//! These tests drive the renderer, transport and replay runner together
//! against in-memory client surfaces.

#[path = "../common/mod.rs"]
pub mod common;

pub mod renderer_flow;
pub mod replay_script;
