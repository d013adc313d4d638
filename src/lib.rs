//! Legged YES/NO binary arbitrage engine.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod feed;
pub mod gateway;
pub mod strategy;
pub mod engine;
pub mod shutdown;
pub mod dashboard;
