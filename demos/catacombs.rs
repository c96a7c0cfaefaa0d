/// Catacombs example: walks one catacombs layout the way a host would.
///
/// A sequence: roll the start piece → pick corridors and small rooms →
///             age a handful of blocks from each piece → roll the
///             archaeology loot buried in the corridors.
///
/// The host owns placement; this only shows which pieces come up, what
/// the aging rules turn each block into, and what the brushable blocks
/// would drop.
///
/// Run with: cargo run --example catacombs
use weighted_rules::core::engine::ContentEngine;
use weighted_rules::core::loot::LootDrop;
use weighted_rules::core::processor::RuleEvent;
use weighted_rules::schema::payload::Payload;
use weighted_rules::schema::target::Target;

fn sample_blocks() -> Vec<Target> {
    vec![
        Target::new("minecraft:deepslate_bricks"),
        Target::new("minecraft:deepslate_tiles"),
        Target::new("minecraft:deepslate_brick_stairs")
            .with_state("facing", "north")
            .with_state("half", "bottom"),
        Target::new("minecraft:cobweb"),
        Target::new("minecraft:candle").with_state("candles", "4"),
        Target::new("minecraft:red_candle")
            .with_state("candles", "4")
            .with_state("lit", "true"),
        Target::new("minecraft:suspicious_gravel"),
        Target::new("minecraft:decorated_pot"),
    ]
}

fn describe(target: &Target) -> String {
    let mut state: Vec<String> = target.state.iter().map(|(k, v)| format!("{k}={v}")).collect();
    state.sort();
    let mut out = target.block.clone();
    if !state.is_empty() {
        out.push_str(&format!("[{}]", state.join(",")));
    }
    if let Some(loot) = &target.loot_table {
        out.push_str(&format!(" loot={loot}"));
    }
    if !target.sherds.is_empty() {
        out.push_str(&format!(" sherds={}", target.sherds.join("/")));
    }
    out
}

fn main() {
    let mut engine = ContentEngine::builder()
        .content_dir("content/catacombs")
        .seed(1488497114)
        .build()
        .expect("Failed to load catacombs content");

    println!("=== Catacombs ===\n");

    let pieces = [
        "trailiertales:catacombs/dungeon",
        "trailiertales:catacombs/corridor",
        "trailiertales:catacombs/corridor_connector",
        "trailiertales:catacombs/small_room",
        "trailiertales:catacombs/corridor_decoration",
    ];

    for pool in pieces {
        let mut fired = 0;
        let placement = engine
            .place_with(pool, sample_blocks(), &mut |event| {
                if matches!(event, RuleEvent::Fired { .. }) {
                    fired += 1;
                }
            })
            .expect("Failed to place piece");

        let location = match &placement.selection.payload {
            Payload::Template { location, .. } => location.clone(),
            other => format!("{other:?}"),
        };
        let list = placement
            .selection
            .processors
            .as_ref()
            .map(|list| list.name().to_string())
            .unwrap_or_else(|| "none".to_string());

        println!("[{pool}]");
        println!("  piece: {location}");
        println!("  aged with: {list} ({fired} rules fired)");
        for (before, after) in sample_blocks().iter().zip(&placement.targets) {
            if before != after {
                println!("    {} -> {}", describe(before), describe(after));
            }
        }
        println!();
    }

    println!("=== Brushing suspicious blocks ===\n");
    for table in [
        "trailiertales:archaeology/catacombs_corridor",
        "trailiertales:archaeology/catacombs_corridor_rare",
        "trailiertales:archaeology/catacombs_tomb",
    ] {
        let drops: Vec<String> = (0..5)
            .flat_map(|_| engine.roll_loot(table).expect("Failed to roll loot"))
            .map(|drop| match drop {
                LootDrop::Item { id, functions } if functions.is_empty() => id,
                LootDrop::Item { id, functions } => format!("{id} ({})", functions.join(", ")),
                LootDrop::External { key, .. } => format!("<{key}>"),
            })
            .collect();
        println!("[{table}]");
        for drop in drops {
            println!("  {drop}");
        }
        println!();
    }
}
