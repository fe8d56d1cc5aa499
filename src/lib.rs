//! Bridges one upstream chat session to a single downstream subscriber while
//! recording observed messages and per-chat configuration.

pub mod audit;
pub mod common;
pub mod config;
pub mod error;
pub mod network;
pub mod storage;
