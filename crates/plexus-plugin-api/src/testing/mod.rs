//! Testing utilities for plugin developers
//!
//! This module provides helpers and mocks to make plugin testing easier.

pub mod helpers;
pub mod mocks;

pub use helpers::{test_context, RecordedExtension, RecordingRegistrar};
pub use mocks::{MockHook, MockPlugin};
