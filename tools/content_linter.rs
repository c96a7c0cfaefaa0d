/// Content Linter: validates content packs before they ship.
///
/// Usage: content_linter <content_dir_or_file>
///
/// Loads every pack it can, finalizes a registry from the merged content,
/// and reports broken packs and references as errors. Duplicate entries
/// within one pool and keys that differ only by case are warnings.
use rustc_hash::FxHashMap;
use std::path::Path;
use std::process;
use tracing::warn;
use weighted_rules::core::content::{ron_files, ContentSet};
use weighted_rules::core::pool::WeightedPool;
use weighted_rules::core::registry::RegistryError;
use weighted_rules::schema::payload::RegistryKind;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        println!("Usage: content_linter <content_dir_or_file>");
        process::exit(0);
    }

    let path = Path::new(&args[1]);
    let mut errors = Vec::new();
    let mut content = ContentSet::default();

    if path.is_file() {
        match ContentSet::load_from_ron(path) {
            Ok(set) => content.merge(set),
            Err(e) => {
                eprintln!("ERROR: Failed to load content file: {}", e);
                process::exit(1);
            }
        }
    } else if path.is_dir() {
        errors.extend(load_packs(path, &mut content));
    } else {
        eprintln!("ERROR: Path '{}' does not exist", path.display());
        process::exit(1);
    }

    println!(
        "Loaded {} pools, {} processor lists, {} loot tables",
        content.pools.len(),
        content.processors.len(),
        content.loot_tables.len()
    );

    let warnings = lint_content(&content);
    if let Err(e) = content.into_registry() {
        errors.extend(registry_errors(e));
    }

    println!("\n=== Content Lint Report ===\n");

    if errors.is_empty() && warnings.is_empty() {
        println!("All checks passed!");
    }

    for warning in &warnings {
        println!("WARNING: {}", warning);
    }

    for error in &errors {
        println!("ERROR: {}", error);
    }

    println!("\nSummary: {} errors, {} warnings", errors.len(), warnings.len());

    if errors.is_empty() {
        process::exit(0);
    } else {
        process::exit(1);
    }
}

/// Load every pack under `dir`, skipping the ones that fail.
fn load_packs(dir: &Path, content: &mut ContentSet) -> Vec<String> {
    let files = match ron_files(dir) {
        Ok(files) => files,
        Err(e) => return vec![format!("{}: {}", dir.display(), e)],
    };
    let mut errors = Vec::new();
    for path in files {
        match ContentSet::load_from_ron(&path) {
            Ok(set) => {
                println!("  Loaded: {}", path.display());
                content.merge(set);
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping content pack");
                errors.push(format!("{}: {}", path.display(), e));
            }
        }
    }
    errors
}

/// Unresolved references come back as one error each.
fn registry_errors(error: RegistryError) -> Vec<String> {
    match error {
        RegistryError::Unresolved(missing) => missing
            .iter()
            .map(|m| format!("unresolved reference: {}", m))
            .collect(),
        other => vec![other.to_string()],
    }
}

fn lint_content(content: &ContentSet) -> Vec<String> {
    let mut warnings = Vec::new();

    let mut pools: Vec<_> = content.pools.iter().collect();
    pools.sort_by(|a, b| a.0.cmp(b.0));
    for (key, pool) in pools {
        warnings.extend(duplicate_entries("pool", key, pool));
    }

    let mut tables: Vec<_> = content.loot_tables.iter().collect();
    tables.sort_by(|a, b| a.0.cmp(b.0));
    for (key, table) in tables {
        for pool in table.pools() {
            warnings.extend(duplicate_entries("loot table", key, &pool.entries));
        }
    }

    let keys = |kind: RegistryKind| -> Vec<&str> {
        let mut keys: Vec<&str> = match kind {
            RegistryKind::Pool => content.pools.keys().map(String::as_str).collect(),
            RegistryKind::Processor => content.processors.keys().map(String::as_str).collect(),
            RegistryKind::LootTable => content.loot_tables.keys().map(String::as_str).collect(),
        };
        keys.extend(
            content
                .externals
                .iter()
                .filter(|(k, _)| *k == kind)
                .map(|(_, key)| key.as_str()),
        );
        keys
    };
    for kind in [RegistryKind::Pool, RegistryKind::Processor, RegistryKind::LootTable] {
        warnings.extend(case_collisions(kind, keys(kind)));
    }

    warnings
}

/// Entries listed more than once in one pool; each copy adds its weight.
fn duplicate_entries<P>(what: &str, key: &str, pool: &WeightedPool<P>) -> Vec<String> {
    let mut seen: FxHashMap<&str, (usize, u64)> = FxHashMap::default();
    for entry in pool.entries() {
        let slot = seen.entry(entry.id.as_str()).or_insert((0, 0));
        slot.0 += 1;
        slot.1 += u64::from(entry.weight);
    }
    let mut dupes: Vec<_> = seen.into_iter().filter(|(_, (count, _))| *count > 1).collect();
    dupes.sort();
    dupes
        .into_iter()
        .map(|(id, (count, weight))| {
            format!(
                "{} '{}' lists '{}' {} times (combined weight {} of {})",
                what,
                key,
                id,
                count,
                weight,
                pool.total_weight()
            )
        })
        .collect()
}

/// Keys of one kind that are equal ignoring ASCII case.
fn case_collisions(kind: RegistryKind, keys: Vec<&str>) -> Vec<String> {
    let mut groups: FxHashMap<String, Vec<&str>> = FxHashMap::default();
    for key in keys {
        groups.entry(key.to_ascii_lowercase()).or_default().push(key);
    }
    let mut warnings: Vec<String> = groups
        .into_values()
        .filter(|group| group.len() > 1)
        .map(|mut group| {
            group.sort_unstable();
            format!("{} keys differ only by case: {}", kind, group.join(", "))
        })
        .collect();
    warnings.sort();
    warnings
}
