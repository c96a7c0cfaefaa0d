use serde::{Deserialize, Serialize};
use std::fmt;

/// Which registry a named reference points into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RegistryKind {
    Pool,
    Processor,
    LootTable,
}

impl RegistryKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pool => "pool",
            Self::Processor => "processor",
            Self::LootTable => "loot_table",
        }
    }
}

impl fmt::Display for RegistryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a weighted entry hands back when it is selected.
///
/// Payloads are opaque to the pool itself; only the registry looks inside
/// them, to follow `Pool`, `LootTable` and template processor references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    /// A concrete item id, e.g. `minecraft:bone`.
    Item(String),
    /// A concrete block id.
    Block(String),
    /// A structure piece, optionally aged by a named processor list.
    Template {
        location: String,
        #[serde(default)]
        processors: Option<String>,
    },
    /// Roll another pool in place of this entry.
    Pool(String),
    /// Defer to a named loot table.
    LootTable(String),
    /// Selects nothing.
    Empty,
}

impl Payload {
    /// The id an entry carrying this payload gets when none is given.
    pub fn default_id(&self) -> String {
        match self {
            Self::Item(id) | Self::Block(id) => id.clone(),
            Self::Template { location, .. } => location.clone(),
            Self::Pool(key) => format!("pool:{key}"),
            Self::LootTable(key) => format!("loot_table:{key}"),
            Self::Empty => "empty".to_string(),
        }
    }

    /// Named references this payload makes into the registry.
    pub fn references(&self) -> Vec<(RegistryKind, &str)> {
        match self {
            Self::Template {
                processors: Some(key),
                ..
            } => vec![(RegistryKind::Processor, key.as_str())],
            Self::Pool(key) => vec![(RegistryKind::Pool, key.as_str())],
            Self::LootTable(key) => vec![(RegistryKind::LootTable, key.as_str())],
            _ => Vec::new(),
        }
    }
}
