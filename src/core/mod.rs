pub mod content;
pub mod engine;
pub mod loot;
pub mod pool;
pub mod processor;
pub mod registry;
