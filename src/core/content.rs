/// Content packs: loading and merging RON packs.
///
/// The core types never parse files. This module turns RON content packs
/// into validated pools, processor lists and loot tables, then hands them
/// to a `RegistryBuilder`.
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::core::loot::{LootEntry, LootError, LootPool, LootTable, Rolls};
use crate::core::pool::{PoolError, WeightedPool};
use crate::core::processor::{Predicate, ProcessorError, Replacement, Rule, RuleProcessorList, SherdRule};
use crate::core::registry::{Registry, RegistryBuilder, RegistryError};
use crate::schema::payload::{Payload, RegistryKind};

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error(transparent)]
    Loot(#[from] LootError),
    #[error("processor list '{list}' rule {index}: {source}")]
    Rule {
        list: String,
        index: usize,
        #[source]
        source: ProcessorError,
    },
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

// RON shapes. Content files use a friendlier layout than the core types
// (optional ids, signed weights, defaulted predicates), so they are read
// into these first.

#[derive(Debug, Deserialize)]
enum RonExternal {
    Pool(String),
    Processor(String),
    LootTable(String),
}

impl RonExternal {
    fn into_node(self) -> (RegistryKind, String) {
        match self {
            Self::Pool(key) => (RegistryKind::Pool, key),
            Self::Processor(key) => (RegistryKind::Processor, key),
            Self::LootTable(key) => (RegistryKind::LootTable, key),
        }
    }
}

fn one() -> i64 {
    1
}

fn certain() -> f32 {
    1.0
}

fn always() -> Predicate {
    Predicate::Always
}

#[derive(Debug, Deserialize)]
struct RonEntry {
    #[serde(default)]
    id: Option<String>,
    #[serde(default = "one")]
    weight: i64,
    payload: Payload,
    #[serde(default)]
    functions: Vec<String>,
}

impl RonEntry {
    fn id(&self) -> String {
        self.id.clone().unwrap_or_else(|| self.payload.default_id())
    }
}

#[derive(Debug, Deserialize)]
struct RonPool {
    #[serde(default)]
    fallback: Option<String>,
    entries: Vec<RonEntry>,
}

#[derive(Debug, Deserialize)]
enum RonReplacement {
    SetBlock {
        block: String,
        #[serde(default)]
        state: FxHashMap<String, String>,
    },
    SwapBlock(String),
    AppendLoot(String),
    AppendSherds {
        chance: f32,
        #[serde(default)]
        default_to_bricks: bool,
        sherds: Vec<String>,
    },
    Processor(String),
}

#[derive(Debug, Deserialize)]
struct RonRule {
    #[serde(default = "always")]
    when: Predicate,
    #[serde(default = "certain")]
    chance: f32,
    then: RonReplacement,
}

#[derive(Debug, Deserialize)]
struct RonLootPool {
    #[serde(default)]
    rolls: Rolls,
    entries: Vec<RonEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename = "ContentPack")]
struct RonContentPack {
    #[serde(default)]
    externals: Vec<RonExternal>,
    #[serde(default)]
    pools: FxHashMap<String, RonPool>,
    #[serde(default)]
    processors: FxHashMap<String, Vec<RonRule>>,
    #[serde(default)]
    loot_tables: FxHashMap<String, Vec<RonLootPool>>,
}

/// Validated content from one or more packs, not yet registered.
#[derive(Debug, Clone, Default)]
pub struct ContentSet {
    pub externals: FxHashSet<(RegistryKind, String)>,
    pub pools: FxHashMap<String, WeightedPool<Payload>>,
    pub processors: FxHashMap<String, RuleProcessorList>,
    pub loot_tables: FxHashMap<String, LootTable>,
}

impl ContentSet {
    /// Load a content pack from a RON file.
    pub fn load_from_ron(path: &Path) -> Result<ContentSet, ContentError> {
        let contents = std::fs::read_to_string(path)?;
        let set = Self::parse_ron(&contents)?;
        debug!(
            path = %path.display(),
            pools = set.pools.len(),
            processors = set.processors.len(),
            loot_tables = set.loot_tables.len(),
            "loaded content pack"
        );
        Ok(set)
    }

    /// Load and merge every `.ron` file under `dir`, recursively, in path
    /// order. Later files override earlier ones key by key.
    pub fn load_dir(dir: &Path) -> Result<ContentSet, ContentError> {
        let mut set = ContentSet::default();
        for path in ron_files(dir)? {
            set.merge(Self::load_from_ron(&path)?);
        }
        Ok(set)
    }

    /// Parse a content pack from a RON string.
    pub fn parse_ron(input: &str) -> Result<ContentSet, ContentError> {
        let raw: RonContentPack = ron::from_str(input)?;
        let mut set = ContentSet {
            externals: raw.externals.into_iter().map(RonExternal::into_node).collect(),
            ..ContentSet::default()
        };

        for (name, pool) in raw.pools {
            let entries = pool.entries.into_iter().map(|e| (e.id(), e.weight, e.payload));
            let mut built = WeightedPool::from_signed(name.clone(), entries)?;
            if let Some(fallback) = pool.fallback {
                built = built.with_fallback(fallback);
            }
            set.pools.insert(name, built);
        }

        for (name, rules) in raw.processors {
            let mut built = Vec::with_capacity(rules.len());
            for (index, rule) in rules.into_iter().enumerate() {
                let rule = build_rule(rule).map_err(|source| ContentError::Rule {
                    list: name.clone(),
                    index,
                    source,
                })?;
                built.push(rule);
            }
            set.processors.insert(name.clone(), RuleProcessorList::new(name, built));
        }

        for (name, pools) in raw.loot_tables {
            let mut built = Vec::with_capacity(pools.len());
            for (index, pool) in pools.into_iter().enumerate() {
                let entries = pool.entries.into_iter().map(|e| {
                    let id = e.id();
                    (
                        id,
                        e.weight,
                        LootEntry {
                            payload: e.payload,
                            functions: e.functions,
                        },
                    )
                });
                built.push(LootPool {
                    rolls: pool.rolls,
                    entries: WeightedPool::from_signed(format!("{name}#{index}"), entries)?,
                });
            }
            set.loot_tables.insert(name.clone(), LootTable::new(name, built)?);
        }

        Ok(set)
    }

    /// Merge another set into this one. Definitions from `other` replace
    /// same-keyed definitions or external declarations in `self`.
    pub fn merge(&mut self, other: ContentSet) {
        for (kind, key) in other.externals {
            match kind {
                RegistryKind::Pool => {
                    self.pools.remove(&key);
                }
                RegistryKind::Processor => {
                    self.processors.remove(&key);
                }
                RegistryKind::LootTable => {
                    self.loot_tables.remove(&key);
                }
            }
            self.externals.insert((kind, key));
        }
        for (key, pool) in other.pools {
            self.externals.remove(&(RegistryKind::Pool, key.clone()));
            self.pools.insert(key, pool);
        }
        for (key, list) in other.processors {
            self.externals.remove(&(RegistryKind::Processor, key.clone()));
            self.processors.insert(key, list);
        }
        for (key, table) in other.loot_tables {
            self.externals.remove(&(RegistryKind::LootTable, key.clone()));
            self.loot_tables.insert(key, table);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.externals.is_empty() && self.pools.is_empty() && self.processors.is_empty() && self.loot_tables.is_empty()
    }

    /// Register everything, in sorted key order, into `builder`.
    pub fn register_into(&self, builder: &mut RegistryBuilder) -> Result<(), RegistryError> {
        let mut externals: Vec<_> = self.externals.iter().collect();
        externals.sort();
        for (kind, key) in externals {
            builder.declare_external(*kind, key.clone())?;
        }
        for key in sorted_keys(&self.pools) {
            builder.register_pool(self.pools[key].clone())?;
        }
        for key in sorted_keys(&self.processors) {
            builder.register_processor(self.processors[key].clone())?;
        }
        for key in sorted_keys(&self.loot_tables) {
            builder.register_loot_table(self.loot_tables[key].clone())?;
        }
        Ok(())
    }

    /// Register into a fresh builder and finalize.
    pub fn into_registry(self) -> Result<Registry, RegistryError> {
        let mut builder = Registry::builder();
        self.register_into(&mut builder)?;
        builder.finalize()
    }
}

fn build_rule(rule: RonRule) -> Result<Rule, ProcessorError> {
    let replacement = match rule.then {
        RonReplacement::SetBlock { block, state } => Replacement::SetBlock { block, state },
        RonReplacement::SwapBlock(block) => Replacement::SwapBlock(block),
        RonReplacement::AppendLoot(key) => Replacement::AppendLoot(key),
        RonReplacement::AppendSherds {
            chance,
            default_to_bricks,
            sherds,
        } => Replacement::AppendSherds(SherdRule::new(chance, default_to_bricks, sherds)?),
        RonReplacement::Processor(key) => Replacement::Processor(key),
    };
    Rule::new(rule.when, rule.chance, replacement)
}

fn sorted_keys<T>(map: &FxHashMap<String, T>) -> Vec<&String> {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();
    keys
}

/// Every `.ron` file under `dir`, recursively, sorted by path.
pub fn ron_files(dir: &Path) -> Result<Vec<PathBuf>, std::io::Error> {
    let mut files = Vec::new();
    collect_ron_files(dir, &mut files)?;
    files.sort();
    Ok(files)
}

fn collect_ron_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<(), std::io::Error> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_ron_files(&path, files)?;
        } else if path.extension().and_then(|s| s.to_str()) == Some("ron") {
            files.push(path);
        }
    }
    Ok(())
}
