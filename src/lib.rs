//! Weighted Rules: weighted pool selection and chance-gated rule
//! processing for world-generation content.
//!
//! Content (template pools, processor lists, loot tables) is loaded from
//! RON packs, registered into a builder, checked for dangling and cyclic
//! references, then frozen into a read-only registry that any number of
//! threads can roll against with their own random streams.

pub mod core;
pub mod schema;
