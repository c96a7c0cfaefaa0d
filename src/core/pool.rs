/// Weighted pools: validated entry lists and single weighted picks.
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PoolError {
    #[error("pool '{pool}' has no entries")]
    Empty { pool: String },
    #[error("pool '{pool}' entry '{entry}' has weight {weight}; weights must be at least 1")]
    InvalidWeight {
        pool: String,
        entry: String,
        weight: i64,
    },
}

/// One alternative in a pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedEntry<P> {
    pub id: String,
    pub weight: u32,
    pub payload: P,
}

impl<P> WeightedEntry<P> {
    pub fn new(id: impl Into<String>, weight: u32, payload: P) -> Self {
        Self {
            id: id.into(),
            weight,
            payload,
        }
    }
}

/// An immutable, validated list of weighted alternatives.
///
/// Cumulative weight bounds are built once, in declared order, so a given
/// draw always maps to the same entry. Duplicate entries are kept: each
/// one contributes its own weight to the total.
#[derive(Debug, Clone)]
pub struct WeightedPool<P> {
    name: String,
    entries: Vec<WeightedEntry<P>>,
    cumulative: Vec<u64>,
    fallback: Option<String>,
}

impl<P> WeightedPool<P> {
    /// Build a pool, rejecting any zero weight.
    ///
    /// An empty entry list is accepted here; it fails on `resolve`, and the
    /// registry refuses to register it.
    pub fn new(name: impl Into<String>, entries: Vec<WeightedEntry<P>>) -> Result<Self, PoolError> {
        let name = name.into();
        let mut cumulative = Vec::with_capacity(entries.len());
        let mut total = 0u64;
        for entry in &entries {
            if entry.weight == 0 {
                return Err(PoolError::InvalidWeight {
                    pool: name,
                    entry: entry.id.clone(),
                    weight: 0,
                });
            }
            total += u64::from(entry.weight);
            cumulative.push(total);
        }

        Ok(Self {
            name,
            entries,
            cumulative,
            fallback: None,
        })
    }

    /// Build a pool from signed weights, as read from content files.
    pub fn from_signed<I>(name: impl Into<String>, entries: I) -> Result<Self, PoolError>
    where
        I: IntoIterator<Item = (String, i64, P)>,
    {
        let name = name.into();
        let mut checked = Vec::new();
        for (id, weight, payload) in entries {
            let weight = match u32::try_from(weight) {
                Ok(w) if w > 0 => w,
                _ => {
                    return Err(PoolError::InvalidWeight {
                        pool: name,
                        entry: id,
                        weight,
                    })
                }
            };
            checked.push(WeightedEntry::new(id, weight, payload));
        }
        Self::new(name, checked)
    }

    pub fn builder(name: impl Into<String>) -> PoolBuilder<P> {
        PoolBuilder {
            name: name.into(),
            entries: Vec::new(),
            fallback: None,
        }
    }

    /// Name the pool the host falls back to when a piece cannot be placed.
    pub fn with_fallback(mut self, key: impl Into<String>) -> Self {
        self.fallback = Some(key.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entries(&self) -> &[WeightedEntry<P>] {
        &self.entries
    }

    pub fn fallback(&self) -> Option<&str> {
        self.fallback.as_deref()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_weight(&self) -> u64 {
        self.cumulative.last().copied().unwrap_or(0)
    }

    /// Exact selection probability of the entry at `index`.
    pub fn probability(&self, index: usize) -> f64 {
        match self.entries.get(index) {
            Some(entry) => f64::from(entry.weight) / self.total_weight() as f64,
            None => 0.0,
        }
    }

    /// Map a draw in `[0, total_weight)` to an entry index.
    ///
    /// Picks the first entry whose cumulative bound exceeds the draw, so a
    /// draw sitting exactly on a bound belongs to the later entry.
    pub fn pick_index(&self, draw: u64) -> Option<usize> {
        if draw >= self.total_weight() {
            return None;
        }
        Some(self.cumulative.partition_point(|&bound| bound <= draw))
    }

    /// Draw one entry, with probability weight / total weight.
    pub fn resolve<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<&WeightedEntry<P>, PoolError> {
        let total = self.total_weight();
        if total == 0 {
            return Err(PoolError::Empty {
                pool: self.name.clone(),
            });
        }
        let draw = rng.gen_range(0..total);
        let index = self.cumulative.partition_point(|&bound| bound <= draw);
        Ok(&self.entries[index])
    }
}

/// Fluent construction for pools written in code rather than content files.
pub struct PoolBuilder<P> {
    name: String,
    entries: Vec<WeightedEntry<P>>,
    fallback: Option<String>,
}

impl<P> PoolBuilder<P> {
    pub fn add(mut self, id: impl Into<String>, weight: u32, payload: P) -> Self {
        self.entries.push(WeightedEntry::new(id, weight, payload));
        self
    }

    pub fn fallback(mut self, key: impl Into<String>) -> Self {
        self.fallback = Some(key.into());
        self
    }

    pub fn build(self) -> Result<WeightedPool<P>, PoolError> {
        let pool = WeightedPool::new(self.name, self.entries)?;
        Ok(match self.fallback {
            Some(key) => pool.with_fallback(key),
            None => pool,
        })
    }
}
