//! Test utilities for the AniDB UDP connection core
//!
//! This crate provides a scripted transport, canned server replies and a
//! handler builder for driving the connection handler without a network.

pub mod fixtures;
pub mod mocks;

// Re-export commonly used types
pub use fixtures::{compressed, handler_with, handler_with_limiter, replies, test_settings};
pub use mocks::{MockReply, MockTransport};
