//! Shared test utilities for barista integration tests.
//!
//! This module provides:
//! - `TestHarness` wiring a real engine to an in-memory database and temp upload root
//! - `FakeMailbox` and `RecordingTransport` standing in for Microsoft Graph and SMTP
//! - Builders for messages and attachments

pub mod builders;
pub mod fakes;
pub mod harness;

pub use builders::*;
pub use fakes::{FakeMailbox, Gate, RecordingTransport};
pub use harness::TestHarness;
