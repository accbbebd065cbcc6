//! # Scheduler Testing Utils
//!
//! Shared testing utilities for the job scheduler workspace: test data builders
//! and in-memory doubles for the RPC, alarm and trigger seams.
//!
//! ```toml
//! [dev-dependencies]
//! scheduler-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod helpers;
pub mod mocks;

pub use builders::*;
pub use helpers::*;
pub use mocks::*;
