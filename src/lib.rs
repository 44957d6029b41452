#![deny(missing_docs)]
//! Feed Relay
//!
//! Relays fresh items from content feeds to a Telegram chat, downloading
//! their media through a chain of extraction strategies and remembering
//! what was already sent across restarts.

/// Telegram delivery: captions, sink transport and routing
pub mod bot;
/// Configuration management
pub mod config;
/// Source feed contract and adapters
pub mod feed;
/// Shared HTTP client helpers
pub mod http_utils;
/// Normalized feed items
pub mod item;
/// Media acquisition and classification
pub mod media;
/// Relay orchestration
pub mod relay;
/// Seen-item store and batch snapshots
pub mod storage;
/// Utility functions
pub mod utils;
