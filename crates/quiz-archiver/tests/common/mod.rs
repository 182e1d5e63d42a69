//! Shared test utilities for quiz-archiver integration tests.
//!
//! This module provides:
//! - `TestHarness` for isolated job tests on a temp directory and an in-memory database
//! - `OneShotServer`, a local HTTP responder standing in for the TSP server and the worker

pub mod harness;
pub mod http;

pub use harness::TestHarness;
pub use http::{CapturedRequest, OneShotServer};
