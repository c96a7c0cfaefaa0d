/// Rule processors: ordered, chance-gated block substitution.
///
/// A `RuleProcessorList` is applied to one target at a time. Rules run in
/// declared order, each rewrite is visible to the rules after it, and every
/// rule rolls its own chance. Malformed targets never abort a list: the
/// offending rule is skipped and reported.
use rand::Rng;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::core::pool::{PoolError, WeightedEntry, WeightedPool};
use crate::schema::payload::RegistryKind;
use crate::schema::target::{Target, BRICK, POT_FACES};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProcessorError {
    #[error("rule chance {0} is outside [0, 1]")]
    InvalidChance(f32),
    #[error("invalid sherd list: {0}")]
    Sherds(#[from] PoolError),
    #[error("target '{block}' has no state property '{field}'")]
    UnknownTargetState { block: String, field: String },
    #[error("processor list '{0}' is not available")]
    UnknownProcessor(String),
    #[error("processor lists include each other: {}", .0.join(" -> "))]
    Cyclic(Vec<String>),
}

/// A test evaluated against the current target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    Always,
    BlockIs(String),
    BlockIn(Vec<String>),
    /// Same block, and every listed state property present and equal.
    StateMatches {
        block: String,
        state: FxHashMap<String, String>,
    },
    /// A state property equals a value, whatever the block.
    HasState { key: String, value: String },
    Not(Box<Predicate>),
    All(Vec<Predicate>),
    Any(Vec<Predicate>),
}

impl Predicate {
    /// Evaluate against `target`.
    ///
    /// Fails with `UnknownTargetState` when a property the test needs is
    /// missing from the target.
    pub fn test(&self, target: &Target) -> Result<bool, ProcessorError> {
        match self {
            Self::Always => Ok(true),
            Self::BlockIs(block) => Ok(target.is(block)),
            Self::BlockIn(blocks) => Ok(blocks.iter().any(|b| target.is(b))),
            Self::StateMatches { block, state } => {
                if !target.is(block) {
                    return Ok(false);
                }
                for (key, expected) in state {
                    match target.state(key) {
                        Some(actual) if actual == expected => {}
                        Some(_) => return Ok(false),
                        None => return Err(missing(target, key)),
                    }
                }
                Ok(true)
            }
            Self::HasState { key, value } => match target.state(key) {
                Some(actual) => Ok(actual == value),
                None => Err(missing(target, key)),
            },
            Self::Not(inner) => Ok(!inner.test(target)?),
            Self::All(preds) => {
                for pred in preds {
                    if !pred.test(target)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Self::Any(preds) => {
                for pred in preds {
                    if pred.test(target)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }
}

fn missing(target: &Target, key: &str) -> ProcessorError {
    ProcessorError::UnknownTargetState {
        block: target.block.clone(),
        field: key.to_string(),
    }
}

/// Per-face sherd assignment for decorated pots.
///
/// Each face rolls `chance` on its own; a face that passes then draws one
/// sherd from the candidate pool. Candidates are equally weighted and
/// duplicates are kept, so a sherd listed twice is twice as likely.
#[derive(Debug, Clone)]
pub struct SherdRule {
    chance: f32,
    default_to_bricks: bool,
    sherds: WeightedPool<String>,
}

impl SherdRule {
    pub fn new(
        chance: f32,
        default_to_bricks: bool,
        sherds: Vec<String>,
    ) -> Result<Self, ProcessorError> {
        check_chance(chance)?;
        let entries = sherds
            .into_iter()
            .map(|sherd| WeightedEntry::new(sherd.clone(), 1, sherd))
            .collect();
        let sherds = WeightedPool::new("sherds", entries)?;
        if sherds.is_empty() {
            return Err(PoolError::Empty {
                pool: "sherds".to_string(),
            }
            .into());
        }
        Ok(Self {
            chance,
            default_to_bricks,
            sherds,
        })
    }

    pub fn candidates(&self) -> &WeightedPool<String> {
        &self.sherds
    }

    fn faces<R: Rng + ?Sized>(&self, current: &[String], rng: &mut R) -> Result<Vec<String>, ProcessorError> {
        let mut faces = Vec::with_capacity(POT_FACES);
        for face in 0..POT_FACES {
            if rng.gen::<f32>() < self.chance {
                faces.push(self.sherds.resolve(rng)?.payload.clone());
            } else if self.default_to_bricks {
                faces.push(BRICK.to_string());
            } else {
                faces.push(current.get(face).cloned().unwrap_or_else(|| BRICK.to_string()));
            }
        }
        Ok(faces)
    }
}

/// What a fired rule does to the target.
#[derive(Debug, Clone)]
pub enum Replacement {
    /// Replace block identity and state outright.
    SetBlock {
        block: String,
        state: FxHashMap<String, String>,
    },
    /// Replace block identity, keeping existing state properties.
    SwapBlock(String),
    /// Attach a loot table reference to the target.
    AppendLoot(String),
    AppendSherds(SherdRule),
    /// Run another registered processor list on the target.
    Processor(String),
}

impl Replacement {
    pub fn set_block(block: impl Into<String>) -> Self {
        Self::SetBlock {
            block: block.into(),
            state: FxHashMap::default(),
        }
    }

    fn references(&self) -> Option<(RegistryKind, &str)> {
        match self {
            Self::AppendLoot(key) => Some((RegistryKind::LootTable, key.as_str())),
            Self::Processor(key) => Some((RegistryKind::Processor, key.as_str())),
            _ => None,
        }
    }
}

/// A chance-gated conditional substitution. The chance is always in
/// `[0, 1]`; rules are only built through `new` or `always`.
#[derive(Debug, Clone)]
pub struct Rule {
    predicate: Predicate,
    chance: f32,
    replacement: Replacement,
}

impl Rule {
    pub fn new(predicate: Predicate, chance: f32, replacement: Replacement) -> Result<Self, ProcessorError> {
        check_chance(chance)?;
        Ok(Self {
            predicate,
            chance,
            replacement,
        })
    }

    /// A rule that always fires.
    pub fn always(replacement: Replacement) -> Self {
        Self {
            predicate: Predicate::Always,
            chance: 1.0,
            replacement,
        }
    }

    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    pub fn chance(&self) -> f32 {
        self.chance
    }

    pub fn replacement(&self) -> &Replacement {
        &self.replacement
    }
}

fn check_chance(chance: f32) -> Result<(), ProcessorError> {
    if (0.0..=1.0).contains(&chance) {
        Ok(())
    } else {
        Err(ProcessorError::InvalidChance(chance))
    }
}

/// Something reported to the caller's sink while a list runs.
#[derive(Debug)]
pub enum RuleEvent<'a> {
    Fired {
        list: &'a str,
        index: usize,
        replacement: &'a Replacement,
        target: &'a Target,
    },
    Skipped {
        list: &'a str,
        index: usize,
        error: &'a ProcessorError,
    },
}

/// Lookup for sub-processor references during `apply`.
pub trait ProcessorLookup {
    fn processor(&self, key: &str) -> Option<&RuleProcessorList>;
}

/// Lookup for lists that reference no other list.
pub struct NoLookup;

impl ProcessorLookup for NoLookup {
    fn processor(&self, _key: &str) -> Option<&RuleProcessorList> {
        None
    }
}

/// A named, ordered list of rules.
#[derive(Debug, Clone)]
pub struct RuleProcessorList {
    name: String,
    rules: Vec<Rule>,
}

impl RuleProcessorList {
    pub fn new(name: impl Into<String>, rules: Vec<Rule>) -> Self {
        Self {
            name: name.into(),
            rules,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Named references made by this list's rules, in rule order.
    pub fn references(&self) -> Vec<(RegistryKind, &str)> {
        self.rules
            .iter()
            .filter_map(|rule| rule.replacement.references())
            .collect()
    }

    /// Run every rule over `target` and return the rewritten target.
    pub fn apply<R, L>(&self, target: Target, rng: &mut R, lookup: &L) -> Target
    where
        R: Rng + ?Sized,
        L: ProcessorLookup + ?Sized,
    {
        self.apply_with(target, rng, lookup, &mut |_| {})
    }

    /// Like `apply`, reporting every fired and skipped rule to `sink`.
    ///
    /// A sub-processor already running further up the chain (matched by
    /// list name) is skipped with `ProcessorError::Cyclic`.
    pub fn apply_with<R, L, F>(&self, target: Target, rng: &mut R, lookup: &L, sink: &mut F) -> Target
    where
        R: Rng + ?Sized,
        L: ProcessorLookup + ?Sized,
        F: FnMut(&RuleEvent<'_>),
    {
        let mut running = Vec::new();
        self.run(target, rng, lookup, sink, &mut running)
    }

    fn run<R, L, F>(
        &self,
        mut target: Target,
        rng: &mut R,
        lookup: &L,
        sink: &mut F,
        running: &mut Vec<String>,
    ) -> Target
    where
        R: Rng + ?Sized,
        L: ProcessorLookup + ?Sized,
        F: FnMut(&RuleEvent<'_>),
    {
        running.push(self.name.clone());
        for (index, rule) in self.rules.iter().enumerate() {
            let matched = match rule.predicate.test(&target) {
                Ok(matched) => matched,
                Err(error) => {
                    self.skip(index, &error, sink);
                    continue;
                }
            };
            if !matched || rng.gen::<f32>() >= rule.chance {
                continue;
            }

            match &rule.replacement {
                Replacement::SetBlock { block, state } => {
                    target.block = block.clone();
                    target.state = state.clone();
                }
                Replacement::SwapBlock(block) => target.block = block.clone(),
                Replacement::AppendLoot(key) => target.loot_table = Some(key.clone()),
                Replacement::AppendSherds(sherds) => match sherds.faces(&target.sherds, rng) {
                    Ok(faces) => target.sherds = faces,
                    Err(error) => {
                        self.skip(index, &error, sink);
                        continue;
                    }
                },
                Replacement::Processor(key) => match lookup.processor(key) {
                    Some(sub) if running.iter().any(|name| name == sub.name()) => {
                        let mut chain = running.clone();
                        chain.push(sub.name().to_string());
                        self.skip(index, &ProcessorError::Cyclic(chain), sink);
                        continue;
                    }
                    Some(sub) => target = sub.run(target, rng, lookup, sink, running),
                    None => {
                        self.skip(index, &ProcessorError::UnknownProcessor(key.clone()), sink);
                        continue;
                    }
                },
            }

            sink(&RuleEvent::Fired {
                list: &self.name,
                index,
                replacement: &rule.replacement,
                target: &target,
            });
        }
        running.pop();
        target
    }

    fn skip<F>(&self, index: usize, error: &ProcessorError, sink: &mut F)
    where
        F: FnMut(&RuleEvent<'_>),
    {
        debug!(list = %self.name, rule = index, %error, "skipping rule");
        sink(&RuleEvent::Skipped {
            list: &self.name,
            index,
            error,
        });
    }
}
