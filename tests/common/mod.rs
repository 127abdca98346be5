//! Common test utilities for veo-drive end-to-end tests

#[allow(dead_code)]
pub mod drive;
#[allow(dead_code)]
pub mod fixtures;

#[allow(unused_imports)]
pub use drive::*;
#[allow(unused_imports)]
pub use fixtures::*;
