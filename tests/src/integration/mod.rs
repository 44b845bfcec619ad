//! Integration scenarios.

pub mod flows;
pub mod races;
pub mod recovery;
