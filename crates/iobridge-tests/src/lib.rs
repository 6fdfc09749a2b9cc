//! Integration tests for the I/O bridge
//!
//! End-to-end tests that drive the full poll loop against the simulated
//! controller:
//! - frame exchange and registry publishing
//! - corrupted and missing input frames
//! - device loss, re-enumeration and reconnect
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p iobridge-tests
//! ```
//!
//! # Test Structure
//!
//! - `bridge_test.rs` - Cycle behaviour with the mock controller
//! - `reconnect_test.rs` - Device loss and recovery

// This crate only contains tests, no library code
