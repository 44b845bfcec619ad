//! # Atomic Swap Test Suite
//!
//! Cross-component scenarios driven through in-process ledgers and a manual
//! clock.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── harness.rs        # TestNetwork: two ledgers, coordinator, monitor
//! └── integration/
//!     ├── flows.rs      # Happy path, refund, bad secret, hashlock conflict
//!     ├── recovery.rs   # Restart on a file-backed store
//!     └── races.rs      # Monitor vs coordinator, retries
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p swap-tests
//! cargo test -p swap-tests integration::races
//!
//! # Benchmarks
//! cargo bench -p swap-tests
//! ```

pub mod harness;
pub mod integration;
