/// Roll Preview: rolls a pool or loot table many times and prints how
/// often each outcome came up next to its expected share.
///
/// Usage: roll_preview <content_dir_or_file> <pool|loot> <key> [--count <n>] [--seed <n>]
use rustc_hash::FxHashMap;
use std::path::Path;
use std::process;
use weighted_rules::core::engine::{ContentEngine, EngineError};
use weighted_rules::core::loot::LootDrop;
use weighted_rules::core::registry::Registry;
use weighted_rules::schema::payload::Payload;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Mode {
    Pool,
    Loot,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 4 || args[1] == "--help" || args[1] == "-h" {
        print_usage();
        return;
    }

    let mode = match args[2].as_str() {
        "pool" => Mode::Pool,
        "loot" => Mode::Loot,
        other => {
            eprintln!("Unknown mode: {}", other);
            print_usage();
            process::exit(1);
        }
    };
    let key = args[3].clone();
    let mut count: usize = 10_000;
    let mut seed: u64 = 42;

    let mut i = 4;
    while i < args.len() {
        match args[i].as_str() {
            "--count" if i + 1 < args.len() => {
                i += 1;
                count = args[i].parse().unwrap_or(10_000);
            }
            "--seed" if i + 1 < args.len() => {
                i += 1;
                seed = args[i].parse().unwrap_or(42);
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_usage();
                process::exit(1);
            }
        }
        i += 1;
    }

    let path = Path::new(&args[1]);
    let builder = ContentEngine::builder().seed(seed);
    let builder = if path.is_dir() {
        builder.content_dir(path)
    } else {
        builder.content_file(path)
    };
    let mut engine = match builder.build() {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            process::exit(1);
        }
    };

    let tally = match roll(&mut engine, mode, &key, count) {
        Ok(tally) => tally,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            process::exit(1);
        }
    };

    let expected = if mode == Mode::Pool {
        expected_shares(&engine.registry(), &key)
    } else {
        FxHashMap::default()
    };
    print_table(&key, count, &tally, &expected);
}

fn print_usage() {
    println!("Usage: roll_preview <content_dir_or_file> <pool|loot> <key> [--count <n>] [--seed <n>]");
}

/// Roll `count` times and count outcomes by label.
fn roll(engine: &mut ContentEngine, mode: Mode, key: &str, count: usize) -> Result<FxHashMap<String, usize>, EngineError> {
    let mut tally: FxHashMap<String, usize> = FxHashMap::default();
    for _ in 0..count {
        match mode {
            Mode::Pool => {
                let selection = engine.roll_pool(key)?;
                *tally.entry(selection.entry_id).or_default() += 1;
            }
            Mode::Loot => {
                let drops = engine.roll_loot(key)?;
                if drops.is_empty() {
                    *tally.entry("(nothing)".to_string()).or_default() += 1;
                }
                for drop in drops {
                    *tally.entry(drop_label(&drop)).or_default() += 1;
                }
            }
        }
    }
    Ok(tally)
}

fn drop_label(drop: &LootDrop) -> String {
    match drop {
        LootDrop::Item { id, functions } if functions.is_empty() => id.clone(),
        LootDrop::Item { id, functions } => format!("{} [{}]", id, functions.join(", ")),
        LootDrop::External { kind, key } => format!("({} {})", kind, key),
    }
}

/// Exact share of each entry id in a pool, duplicates summed. Entries that
/// nest another pool are left out, since they never come back as-is.
fn expected_shares(registry: &Registry, key: &str) -> FxHashMap<String, f64> {
    let mut shares = FxHashMap::default();
    if let Ok(pool) = registry.pool(key) {
        for (i, entry) in pool.entries().iter().enumerate() {
            if matches!(entry.payload, Payload::Pool(_)) {
                continue;
            }
            *shares.entry(entry.id.clone()).or_insert(0.0) += pool.probability(i);
        }
    }
    shares
}

fn print_table(key: &str, count: usize, tally: &FxHashMap<String, usize>, expected: &FxHashMap<String, f64>) {
    let mut rows: Vec<(&String, &usize)> = tally.iter().collect();
    rows.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

    let width = rows.iter().map(|(label, _)| label.len()).max().unwrap_or(0).max(7);
    println!("\n=== {} x{} ===\n", key, count);
    println!("{:<width$}  {:>8}  {:>8}  {:>8}", "outcome", "count", "share", "expected");
    for (label, n) in rows {
        let share = *n as f64 / count as f64;
        match expected.get(label.as_str()) {
            Some(p) => println!("{:<width$}  {:>8}  {:>7.3}%  {:>7.3}%", label, n, share * 100.0, p * 100.0),
            None => println!("{:<width$}  {:>8}  {:>7.3}%  {:>8}", label, n, share * 100.0, "-"),
        }
    }
}
