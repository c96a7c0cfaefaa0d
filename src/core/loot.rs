/// Loot tables: rolled pools of weighted loot entries.
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::pool::{PoolError, WeightedPool};
use crate::schema::payload::{Payload, RegistryKind};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LootError {
    #[error("loot table '{table}': invalid roll range {min}..={max}")]
    InvalidRolls { table: String, min: u32, max: u32 },
    #[error("loot table '{table}': entry '{entry}' carries a template, which cannot drop as loot")]
    UnsupportedPayload { table: String, entry: String },
    #[error("loot table '{table}': pool {index}: {source}")]
    Pool {
        table: String,
        index: usize,
        #[source]
        source: PoolError,
    },
}

/// How many times a loot pool is rolled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rolls {
    Fixed(u32),
    Uniform { min: u32, max: u32 },
}

impl Default for Rolls {
    fn default() -> Self {
        Self::Fixed(1)
    }
}

impl Rolls {
    pub fn roll<R: Rng + ?Sized>(&self, rng: &mut R) -> u32 {
        match *self {
            Self::Fixed(n) => n,
            Self::Uniform { min, max } => rng.gen_range(min..=max),
        }
    }
}

/// A loot entry: what drops, plus opaque item functions for the host
/// (e.g. `enchant_randomly`).
#[derive(Debug, Clone, PartialEq)]
pub struct LootEntry {
    pub payload: Payload,
    pub functions: Vec<String>,
}

impl LootEntry {
    pub fn item(id: impl Into<String>) -> Self {
        Self {
            payload: Payload::Item(id.into()),
            functions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LootPool {
    pub rolls: Rolls,
    pub entries: WeightedPool<LootEntry>,
}

/// What a loot roll hands back.
#[derive(Debug, Clone, PartialEq)]
pub enum LootDrop {
    Item { id: String, functions: Vec<String> },
    /// A loot table or pool owned by the host; the host rolls it.
    External { kind: RegistryKind, key: String },
}

/// A named list of loot pools, each rolled independently.
#[derive(Debug, Clone)]
pub struct LootTable {
    name: String,
    pools: Vec<LootPool>,
}

impl LootTable {
    pub fn new(name: impl Into<String>, pools: Vec<LootPool>) -> Result<Self, LootError> {
        let name = name.into();
        for (index, pool) in pools.iter().enumerate() {
            if let Rolls::Uniform { min, max } = pool.rolls {
                if min > max {
                    return Err(LootError::InvalidRolls { table: name, min, max });
                }
            }
            if pool.entries.is_empty() {
                return Err(LootError::Pool {
                    table: name,
                    index,
                    source: PoolError::Empty {
                        pool: pool.entries.name().to_string(),
                    },
                });
            }
            if let Some(entry) = pool
                .entries
                .entries()
                .iter()
                .find(|e| matches!(e.payload.payload, Payload::Template { .. }))
            {
                return Err(LootError::UnsupportedPayload {
                    table: name,
                    entry: entry.id.clone(),
                });
            }
        }
        Ok(Self { name, pools })
    }

    /// A table with a single pool rolled once.
    pub fn single(name: impl Into<String>, entries: WeightedPool<LootEntry>) -> Result<Self, LootError> {
        Self::new(
            name,
            vec![LootPool {
                rolls: Rolls::default(),
                entries,
            }],
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pools(&self) -> &[LootPool] {
        &self.pools
    }

    pub fn references(&self) -> Vec<(RegistryKind, &str)> {
        self.pools
            .iter()
            .flat_map(|pool| pool.entries.entries())
            .flat_map(|entry| entry.payload.payload.references())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn items(name: &str, ids: &[(&str, u32)]) -> WeightedPool<LootEntry> {
        ids.iter()
            .fold(WeightedPool::builder(name), |b, (id, w)| b.add(*id, *w, LootEntry::item(*id)))
            .build()
            .unwrap()
    }

    #[test]
    fn uniform_rolls_stay_in_range() {
        let rolls = Rolls::Uniform { min: 1, max: 3 };
        let mut rng = StdRng::seed_from_u64(2);
        let mut seen = [false; 4];
        for _ in 0..1000 {
            let n = rolls.roll(&mut rng);
            assert!((1..=3).contains(&n));
            seen[n as usize] = true;
        }
        assert!(seen[1] && seen[2] && seen[3]);
        assert_eq!(Rolls::default().roll(&mut rng), 1);
    }

    #[test]
    fn inverted_roll_range_rejected() {
        let err = LootTable::new(
            "bad",
            vec![LootPool {
                rolls: Rolls::Uniform { min: 4, max: 2 },
                entries: items("p", &[("minecraft:bone", 1)]),
            }],
        )
        .unwrap_err();
        assert!(matches!(err, LootError::InvalidRolls { min: 4, max: 2, .. }));
    }

    #[test]
    fn template_entries_rejected() {
        let entries = WeightedPool::builder("p")
            .add(
                "room",
                1,
                LootEntry {
                    payload: Payload::Template {
                        location: "catacombs/room/jail".into(),
                        processors: None,
                    },
                    functions: Vec::new(),
                },
            )
            .build()
            .unwrap();
        assert!(matches!(
            LootTable::single("bad", entries),
            Err(LootError::UnsupportedPayload { .. })
        ));
    }

    #[test]
    fn empty_loot_pool_rejected() {
        let entries: WeightedPool<LootEntry> = WeightedPool::new("p", Vec::new()).unwrap();
        assert!(matches!(
            LootTable::single("bad", entries),
            Err(LootError::Pool { index: 0, .. })
        ));
    }

    #[test]
    fn references_cover_nested_tables() {
        let entries = WeightedPool::builder("p")
            .add("bone", 5, LootEntry::item("minecraft:bone"))
            .add(
                "pots",
                1,
                LootEntry {
                    payload: Payload::LootTable("desert_ruins_pots".into()),
                    functions: Vec::new(),
                },
            )
            .build()
            .unwrap();
        let table = LootTable::single("t", entries).unwrap();
        assert_eq!(
            table.references(),
            vec![(RegistryKind::LootTable, "desert_ruins_pots")]
        );
    }
}
