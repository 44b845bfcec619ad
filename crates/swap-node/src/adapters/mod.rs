//! # Node Adapters
//!
//! Port implementations that only the node needs.

pub mod storage;
