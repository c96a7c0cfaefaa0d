//! Plain data shared by the pools, processors and registry.

pub mod payload;
pub mod target;
