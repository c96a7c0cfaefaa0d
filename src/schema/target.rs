use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Number of decorated-pot faces that can carry a sherd.
pub const POT_FACES: usize = 4;

/// Face filler used when a pot face is left without a sherd.
pub const BRICK: &str = "minecraft:brick";

/// A placed-block descriptor that processor rules read and rewrite.
///
/// Holds the block identity, its state properties (as strings, e.g.
/// `candles = "4"`, `lit = "true"`) and the block-entity data the rules in
/// this crate know how to attach: a loot table reference and pot faces.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Target {
    pub block: String,
    #[serde(default)]
    pub state: FxHashMap<String, String>,
    #[serde(default)]
    pub loot_table: Option<String>,
    #[serde(default)]
    pub sherds: Vec<String>,
}

impl Target {
    pub fn new(block: impl Into<String>) -> Self {
        Self {
            block: block.into(),
            ..Self::default()
        }
    }

    /// Builder-style state property setter.
    pub fn with_state(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.state.insert(key.into(), value.into());
        self
    }

    pub fn state(&self, key: &str) -> Option<&str> {
        self.state.get(key).map(String::as_str)
    }

    pub fn is(&self, block: &str) -> bool {
        self.block == block
    }
}
