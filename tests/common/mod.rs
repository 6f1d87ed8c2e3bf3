//! Common test utilities for harvest integration tests
//!
//! This module provides an in-memory vault fixture and canned classifier
//! replies.

#![allow(dead_code)]

pub mod classifier;
pub mod vault;

pub use classifier::{enable_classification, freeform, structured, unreachable};
pub use vault::{TestVault, HOUR, NOW};
