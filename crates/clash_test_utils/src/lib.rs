//! # Clash Test Utilities
//!
//! Shared testing utilities for all crates:
//! - Card and deck fixtures
//! - Determinism test harness
//! - Property-based testing strategies
//! - CPU-vs-CPU balance runs

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod balance;
pub mod determinism;
pub mod fixtures;

/// Re-export proptest for convenience.
pub use proptest;
