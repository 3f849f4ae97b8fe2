//! Common test utilities for bookgen-client integration tests

#[allow(dead_code)]
pub mod backend;

#[allow(unused_imports)]
pub use assertions::*;
pub use backend::*;
