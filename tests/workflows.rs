//! Workflow integration tests entry point.
//!
//! This module includes all workflow-related integration tests:
//! - Learning: execute → background passes → merged practices
//! - Auto-apply: learn → apply to a YAML document → rollback
//! - Error recovery: storage failures, torn history, tripped breaker

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, clippy::float_cmp)]

mod integration;
