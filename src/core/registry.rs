/// Two-phase content registry: register, finalize, then read.
///
/// `RegistryBuilder` is the mutable setup phase. `finalize` checks every
/// named reference, rejects cycles, and freezes the content into a
/// `Registry`, which is read-only and can be shared across threads. A
/// frozen registry has no way to register anything further.
use rand::Rng;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::core::loot::{LootDrop, LootError, LootTable};
use crate::core::pool::{PoolError, WeightedPool};
use crate::core::processor::{ProcessorLookup, RuleProcessorList};
use crate::schema::payload::{Payload, RegistryKind};
use crate::schema::target::Target;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistryError {
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error(transparent)]
    Loot(#[from] LootError),
    #[error("duplicate {kind} key '{key}'")]
    Duplicate { kind: RegistryKind, key: String },
    #[error("unresolved references: {}", join(.0))]
    Unresolved(Vec<MissingReference>),
    #[error("cyclic reference: {}", .0.join(" -> "))]
    Cyclic(Vec<String>),
    #[error("no {kind} registered under '{key}'")]
    NotFound { kind: RegistryKind, key: String },
    #[error("{kind} '{key}' is provided by the host and has no value here")]
    External { kind: RegistryKind, key: String },
    #[error("pool '{pool}' entry '{entry}' cannot drop as loot")]
    NotLoot { pool: String, entry: String },
}

impl RegistryError {
    /// True for content errors caught while building or finalizing.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Pool(_)
                | Self::Loot(_)
                | Self::Duplicate { .. }
                | Self::Unresolved(_)
                | Self::Cyclic(_)
                | Self::NotLoot { .. }
        )
    }
}

/// A reference that names nothing registered or declared external.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct MissingReference {
    pub from_kind: RegistryKind,
    pub from: String,
    pub kind: RegistryKind,
    pub key: String,
}

impl fmt::Display for MissingReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} '{}' -> {} '{}'",
            self.from_kind, self.from, self.kind, self.key
        )
    }
}

fn join(missing: &[MissingReference]) -> String {
    missing
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

type Node = (RegistryKind, String);

/// Mutable setup phase of the registry.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    pools: FxHashMap<String, WeightedPool<Payload>>,
    processors: FxHashMap<String, RuleProcessorList>,
    loot_tables: FxHashMap<String, LootTable>,
    externals: FxHashSet<Node>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pool under its own name. Empty pools are rejected here.
    pub fn register_pool(&mut self, pool: WeightedPool<Payload>) -> Result<(), RegistryError> {
        if pool.is_empty() {
            return Err(PoolError::Empty {
                pool: pool.name().to_string(),
            }
            .into());
        }
        self.check_free(RegistryKind::Pool, pool.name())?;
        self.pools.insert(pool.name().to_string(), pool);
        Ok(())
    }

    pub fn register_processor(&mut self, list: RuleProcessorList) -> Result<(), RegistryError> {
        self.check_free(RegistryKind::Processor, list.name())?;
        self.processors.insert(list.name().to_string(), list);
        Ok(())
    }

    pub fn register_loot_table(&mut self, table: LootTable) -> Result<(), RegistryError> {
        self.check_free(RegistryKind::LootTable, table.name())?;
        self.loot_tables.insert(table.name().to_string(), table);
        Ok(())
    }

    /// Declare a key the host provides, so references to it resolve.
    pub fn declare_external(&mut self, kind: RegistryKind, key: impl Into<String>) -> Result<(), RegistryError> {
        let key = key.into();
        self.check_free(kind, &key)?;
        self.externals.insert((kind, key));
        Ok(())
    }

    fn check_free(&self, kind: RegistryKind, key: &str) -> Result<(), RegistryError> {
        let taken = match kind {
            RegistryKind::Pool => self.pools.contains_key(key),
            RegistryKind::Processor => self.processors.contains_key(key),
            RegistryKind::LootTable => self.loot_tables.contains_key(key),
        } || self.externals.contains(&(kind, key.to_string()));
        if taken {
            return Err(RegistryError::Duplicate {
                kind,
                key: key.to_string(),
            });
        }
        Ok(())
    }

    fn contains(&self, kind: RegistryKind, key: &str) -> bool {
        match kind {
            RegistryKind::Pool => self.pools.contains_key(key),
            RegistryKind::Processor => self.processors.contains_key(key),
            RegistryKind::LootTable => self.loot_tables.contains_key(key),
        }
    }

    fn edges(&self) -> BTreeMap<Node, Vec<Node>> {
        let mut edges = BTreeMap::new();
        for (key, pool) in &self.pools {
            let mut out: Vec<Node> = pool
                .entries()
                .iter()
                .flat_map(|entry| entry.payload.references())
                .map(|(kind, to)| (kind, to.to_string()))
                .collect();
            if let Some(fallback) = pool.fallback() {
                out.push((RegistryKind::Pool, fallback.to_string()));
            }
            edges.insert((RegistryKind::Pool, key.clone()), out);
        }
        for (key, list) in &self.processors {
            let out = owned(list.references());
            edges.insert((RegistryKind::Processor, key.clone()), out);
        }
        for (key, table) in &self.loot_tables {
            let out = owned(table.references());
            edges.insert((RegistryKind::LootTable, key.clone()), out);
        }
        edges
    }

    /// Check every reference, reject cycles, and freeze.
    pub fn finalize(self) -> Result<Registry, RegistryError> {
        let edges = self.edges();

        let mut missing: Vec<MissingReference> = edges
            .iter()
            .flat_map(|((from_kind, from), out)| {
                out.iter().map(move |(kind, key)| MissingReference {
                    from_kind: *from_kind,
                    from: from.clone(),
                    kind: *kind,
                    key: key.clone(),
                })
            })
            .filter(|m| !self.contains(m.kind, &m.key) && !self.externals.contains(&(m.kind, m.key.clone())))
            .collect();
        if !missing.is_empty() {
            missing.sort();
            missing.dedup();
            return Err(RegistryError::Unresolved(missing));
        }

        if let Some(cycle) = find_cycle(&edges) {
            return Err(RegistryError::Cyclic(
                cycle
                    .into_iter()
                    .map(|(kind, key)| format!("{kind}:{key}"))
                    .collect(),
            ));
        }

        self.check_loot_pools()?;

        info!(
            pools = self.pools.len(),
            processors = self.processors.len(),
            loot_tables = self.loot_tables.len(),
            externals = self.externals.len(),
            "registry frozen"
        );

        Ok(Registry {
            pools: arc_values(self.pools),
            processors: arc_values(self.processors),
            loot_tables: arc_values(self.loot_tables),
            externals: self.externals,
        })
    }
}

impl RegistryBuilder {
    /// Every pool a loot table can roll into, nested pools included, must
    /// end in droppable entries. Runs after cycle detection.
    fn check_loot_pools(&self) -> Result<(), RegistryError> {
        let mut tables: Vec<&LootTable> = self.loot_tables.values().collect();
        tables.sort_by(|a, b| a.name().cmp(b.name()));

        let mut pending: Vec<&str> = Vec::new();
        for table in tables {
            for pool in table.pools() {
                for entry in pool.entries.entries() {
                    if let Payload::Pool(key) = &entry.payload.payload {
                        pending.push(key);
                    }
                }
            }
        }
        pending.reverse();

        let mut checked: FxHashSet<&str> = FxHashSet::default();
        while let Some(key) = pending.pop() {
            if !checked.insert(key) {
                continue;
            }
            // Host pools are opaque here.
            let Some(pool) = self.pools.get(key) else {
                continue;
            };
            for entry in pool.entries() {
                match &entry.payload {
                    Payload::Template { .. } => {
                        return Err(RegistryError::NotLoot {
                            pool: key.to_string(),
                            entry: entry.id.clone(),
                        })
                    }
                    Payload::Pool(next) => pending.push(next),
                    _ => {}
                }
            }
        }
        Ok(())
    }
}

fn owned(refs: Vec<(RegistryKind, &str)>) -> Vec<Node> {
    refs.into_iter().map(|(kind, key)| (kind, key.to_string())).collect()
}

fn arc_values<T>(map: FxHashMap<String, T>) -> FxHashMap<String, Arc<T>> {
    map.into_iter().map(|(k, v)| (k, Arc::new(v))).collect()
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Visiting,
    Done,
}

/// Depth-first search for a reference cycle; returns the loop, first node
/// repeated at the end.
fn find_cycle(edges: &BTreeMap<Node, Vec<Node>>) -> Option<Vec<Node>> {
    let mut marks: FxHashMap<&Node, Mark> = FxHashMap::default();
    let mut stack: Vec<&Node> = Vec::new();
    for start in edges.keys() {
        if marks.contains_key(start) {
            continue;
        }
        if let Some(cycle) = visit(start, edges, &mut marks, &mut stack) {
            return Some(cycle);
        }
    }
    None
}

fn visit<'a>(
    node: &'a Node,
    edges: &'a BTreeMap<Node, Vec<Node>>,
    marks: &mut FxHashMap<&'a Node, Mark>,
    stack: &mut Vec<&'a Node>,
) -> Option<Vec<Node>> {
    marks.insert(node, Mark::Visiting);
    stack.push(node);
    if let Some(children) = edges.get(node) {
        for child in children {
            match marks.get(child).copied() {
                Some(Mark::Visiting) => {
                    let start = stack.iter().position(|n| *n == child).unwrap_or(0);
                    let mut cycle: Vec<Node> = stack[start..].iter().map(|n| (*n).clone()).collect();
                    cycle.push(child.clone());
                    return Some(cycle);
                }
                Some(Mark::Done) => {}
                None => {
                    if let Some(cycle) = visit(child, edges, marks, stack) {
                        return Some(cycle);
                    }
                }
            }
        }
    }
    stack.pop();
    marks.insert(node, Mark::Done);
    None
}

/// A resolved registry value.
#[derive(Debug, Clone)]
pub enum Resolved {
    Pool(Arc<WeightedPool<Payload>>),
    Processor(Arc<RuleProcessorList>),
    LootTable(Arc<LootTable>),
    /// Provided by the host; only the key is known.
    External(String),
}

/// The outcome of rolling a pool down to a terminal entry.
#[derive(Debug, Clone)]
pub struct Selection {
    /// The pool the terminal entry was drawn from.
    pub pool: String,
    pub entry_id: String,
    pub payload: Payload,
    /// The processor list a selected template is aged with, shared with
    /// every other template naming the same key.
    pub processors: Option<Arc<RuleProcessorList>>,
}

/// Frozen, read-only content registry.
#[derive(Debug, Default)]
pub struct Registry {
    pools: FxHashMap<String, Arc<WeightedPool<Payload>>>,
    processors: FxHashMap<String, Arc<RuleProcessorList>>,
    loot_tables: FxHashMap<String, Arc<LootTable>>,
    externals: FxHashSet<Node>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub fn is_external(&self, kind: RegistryKind, key: &str) -> bool {
        self.externals.contains(&(kind, key.to_string()))
    }

    pub fn resolve(&self, kind: RegistryKind, key: &str) -> Result<Resolved, RegistryError> {
        if self.is_external(kind, key) {
            return Ok(Resolved::External(key.to_string()));
        }
        let found = match kind {
            RegistryKind::Pool => self.pools.get(key).cloned().map(Resolved::Pool),
            RegistryKind::Processor => self.processors.get(key).cloned().map(Resolved::Processor),
            RegistryKind::LootTable => self.loot_tables.get(key).cloned().map(Resolved::LootTable),
        };
        found.ok_or_else(|| RegistryError::NotFound {
            kind,
            key: key.to_string(),
        })
    }

    pub fn pool(&self, key: &str) -> Result<Arc<WeightedPool<Payload>>, RegistryError> {
        lookup(&self.pools, &self.externals, RegistryKind::Pool, key)
    }

    pub fn processor_list(&self, key: &str) -> Result<Arc<RuleProcessorList>, RegistryError> {
        lookup(&self.processors, &self.externals, RegistryKind::Processor, key)
    }

    pub fn loot_table(&self, key: &str) -> Result<Arc<LootTable>, RegistryError> {
        lookup(&self.loot_tables, &self.externals, RegistryKind::LootTable, key)
    }

    /// Registered keys of one kind, sorted. Externals are not included.
    pub fn keys(&self, kind: RegistryKind) -> Vec<&str> {
        let mut keys: Vec<&str> = match kind {
            RegistryKind::Pool => self.pools.keys().map(String::as_str).collect(),
            RegistryKind::Processor => self.processors.keys().map(String::as_str).collect(),
            RegistryKind::LootTable => self.loot_tables.keys().map(String::as_str).collect(),
        };
        keys.sort_unstable();
        keys
    }

    /// Roll a pool, following nested pool entries to a terminal one.
    ///
    /// A nested reference to a host-provided pool is terminal: it comes
    /// back as the selected `Payload::Pool` for the host to roll.
    pub fn roll<R: Rng + ?Sized>(&self, key: &str, rng: &mut R) -> Result<Selection, RegistryError> {
        let mut pool = self.pool(key)?;
        loop {
            let entry = pool.resolve(rng)?;
            let next = match &entry.payload {
                Payload::Pool(next) if !self.is_external(RegistryKind::Pool, next) => next.clone(),
                payload => {
                    let processors = match payload {
                        Payload::Template {
                            processors: Some(list),
                            ..
                        } if !self.is_external(RegistryKind::Processor, list) => {
                            Some(self.processor_list(list)?)
                        }
                        _ => None,
                    };
                    return Ok(Selection {
                        pool: pool.name().to_string(),
                        entry_id: entry.id.clone(),
                        payload: payload.clone(),
                        processors,
                    });
                }
            };
            pool = self.pool(&next)?;
        }
    }

    /// Roll a loot table: every loot pool is rolled its roll count.
    pub fn roll_loot<R: Rng + ?Sized>(&self, key: &str, rng: &mut R) -> Result<Vec<LootDrop>, RegistryError> {
        let mut drops = Vec::new();
        self.roll_loot_into(key, rng, &mut drops)?;
        Ok(drops)
    }

    fn roll_loot_into<R: Rng + ?Sized>(
        &self,
        key: &str,
        rng: &mut R,
        drops: &mut Vec<LootDrop>,
    ) -> Result<(), RegistryError> {
        if self.is_external(RegistryKind::LootTable, key) {
            drops.push(LootDrop::External {
                kind: RegistryKind::LootTable,
                key: key.to_string(),
            });
            return Ok(());
        }
        let table = self.loot_table(key)?;
        for pool in table.pools() {
            for _ in 0..pool.rolls.roll(rng) {
                let entry = pool.entries.resolve(rng)?;
                self.drop_payload(
                    pool.entries.name(),
                    &entry.id,
                    &entry.payload.payload,
                    &entry.payload.functions,
                    rng,
                    drops,
                )?;
            }
        }
        Ok(())
    }

    fn drop_payload<R: Rng + ?Sized>(
        &self,
        pool: &str,
        entry: &str,
        payload: &Payload,
        functions: &[String],
        rng: &mut R,
        drops: &mut Vec<LootDrop>,
    ) -> Result<(), RegistryError> {
        match payload {
            Payload::Item(id) | Payload::Block(id) => drops.push(LootDrop::Item {
                id: id.clone(),
                functions: functions.to_vec(),
            }),
            Payload::LootTable(key) => self.roll_loot_into(key, rng, drops)?,
            Payload::Pool(key) if self.is_external(RegistryKind::Pool, key) => drops.push(LootDrop::External {
                kind: RegistryKind::Pool,
                key: key.clone(),
            }),
            Payload::Pool(key) => {
                let selection = self.roll(key, rng)?;
                self.drop_payload(
                    &selection.pool,
                    &selection.entry_id,
                    &selection.payload,
                    functions,
                    rng,
                    drops,
                )?;
            }
            Payload::Template { .. } => {
                return Err(RegistryError::NotLoot {
                    pool: pool.to_string(),
                    entry: entry.to_string(),
                })
            }
            Payload::Empty => {}
        }
        Ok(())
    }

    /// Run a registered processor list over one target.
    pub fn process<R: Rng + ?Sized>(&self, key: &str, target: Target, rng: &mut R) -> Result<Target, RegistryError> {
        let list = self.processor_list(key)?;
        Ok(list.apply(target, rng, self))
    }
}

fn lookup<T>(
    map: &FxHashMap<String, Arc<T>>,
    externals: &FxHashSet<Node>,
    kind: RegistryKind,
    key: &str,
) -> Result<Arc<T>, RegistryError> {
    if let Some(value) = map.get(key) {
        return Ok(Arc::clone(value));
    }
    if externals.contains(&(kind, key.to_string())) {
        return Err(RegistryError::External {
            kind,
            key: key.to_string(),
        });
    }
    Err(RegistryError::NotFound {
        kind,
        key: key.to_string(),
    })
}

impl ProcessorLookup for Registry {
    fn processor(&self, key: &str) -> Option<&RuleProcessorList> {
        self.processors.get(key).map(|list| list.as_ref())
    }
}
