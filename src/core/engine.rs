/// The content engine: loads packs, freezes a registry, and rolls it.
///
/// Wires together the content loader, the registry, and per-call seeded
/// random streams.
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::core::content::{ContentError, ContentSet};
use crate::core::loot::LootDrop;
use crate::core::processor::RuleEvent;
use crate::core::registry::{Registry, RegistryError, Selection};
use crate::schema::target::Target;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("content error: {0}")]
    Content(#[from] ContentError),
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),
}

/// A rolled template and the targets its processor list rewrote.
#[derive(Debug, Clone)]
pub struct Placement {
    pub selection: Selection,
    pub targets: Vec<Target>,
}

/// The top-level engine. Built via `ContentEngine::builder()`.
pub struct ContentEngine {
    registry: Arc<Registry>,
    seed: u64,
    generation_count: u64,
}

/// Builder for constructing a `ContentEngine`.
pub struct ContentEngineBuilder {
    content_dirs: Vec<PathBuf>,
    content_files: Vec<PathBuf>,
    seed: u64,
    /// Directly provided content (for testing without files).
    content: Option<ContentSet>,
}

impl ContentEngine {
    pub fn builder() -> ContentEngineBuilder {
        ContentEngineBuilder {
            content_dirs: Vec::new(),
            content_files: Vec::new(),
            seed: 0,
            content: None,
        }
    }

    /// The frozen registry, for sharing with other threads.
    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Roll a pool down to a terminal entry.
    pub fn roll_pool(&mut self, key: &str) -> Result<Selection, EngineError> {
        let mut rng = self.next_rng();
        Ok(self.registry.roll(key, &mut rng)?)
    }

    pub fn roll_loot(&mut self, key: &str) -> Result<Vec<LootDrop>, EngineError> {
        let mut rng = self.next_rng();
        Ok(self.registry.roll_loot(key, &mut rng)?)
    }

    /// Run a processor list over one target.
    pub fn process(&mut self, key: &str, target: Target) -> Result<Target, EngineError> {
        let mut rng = self.next_rng();
        Ok(self.registry.process(key, target, &mut rng)?)
    }

    /// Roll a template from `pool_key`, then age every target with the
    /// template's processor list. Targets pass through untouched when the
    /// selection carries no list.
    pub fn place(&mut self, pool_key: &str, targets: Vec<Target>) -> Result<Placement, EngineError> {
        self.place_with(pool_key, targets, &mut |_| {})
    }

    /// Like `place`, reporting every fired and skipped rule to `sink`.
    pub fn place_with<F>(&mut self, pool_key: &str, targets: Vec<Target>, sink: &mut F) -> Result<Placement, EngineError>
    where
        F: FnMut(&RuleEvent<'_>),
    {
        let mut rng = self.next_rng();
        let selection = self.registry.roll(pool_key, &mut rng)?;
        let targets = match &selection.processors {
            Some(list) => targets
                .into_iter()
                .map(|target| list.apply_with(target, &mut rng, self.registry.as_ref(), &mut *sink))
                .collect(),
            None => targets,
        };
        Ok(Placement { selection, targets })
    }

    fn next_rng(&mut self) -> StdRng {
        let rng = StdRng::seed_from_u64(call_seed(self.seed, self.generation_count));
        self.generation_count += 1;
        rng
    }
}

/// Seed for the `call`-th random stream of an engine seeded with `seed`.
/// Neighbouring engine seeds never share a stream one call apart.
fn call_seed(seed: u64, call: u64) -> u64 {
    seed.wrapping_mul(0x9E37_79B9_7F4A_7C15).wrapping_add(call)
}

impl ContentEngineBuilder {
    /// Load every `.ron` pack under `path`, recursively.
    pub fn content_dir(mut self, path: impl AsRef<Path>) -> Self {
        self.content_dirs.push(path.as_ref().to_path_buf());
        self
    }

    pub fn content_file(mut self, path: impl AsRef<Path>) -> Self {
        self.content_files.push(path.as_ref().to_path_buf());
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Provide content directly (for testing without files).
    pub fn with_content(mut self, content: ContentSet) -> Self {
        match self.content.as_mut() {
            Some(existing) => existing.merge(content),
            None => self.content = Some(content),
        }
        self
    }

    /// Load content and freeze the registry.
    ///
    /// Directly provided content loads first, then directories, then
    /// single files; later sources override earlier ones key by key.
    pub fn build(self) -> Result<ContentEngine, EngineError> {
        let mut content = self.content.unwrap_or_default();
        for dir in &self.content_dirs {
            content.merge(ContentSet::load_dir(dir)?);
        }
        for file in &self.content_files {
            content.merge(ContentSet::load_from_ron(file)?);
        }

        Ok(ContentEngine {
            registry: Arc::new(content.into_registry()?),
            seed: self.seed,
            generation_count: 0,
        })
    }
}
