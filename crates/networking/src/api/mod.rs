//! High-level API wrappers for the rewards endpoints
//!
//! This module provides convenient wrappers around the raw HTTP and realtime
//! clients, adding validation and decoding of reward rows.

mod rewards;

pub use rewards::*;
