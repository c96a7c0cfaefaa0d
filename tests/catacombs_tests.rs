/// Integration tests against the shipped catacombs content pack.
use rand::rngs::mock::StepRng;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::Path;
use std::sync::Arc;
use weighted_rules::core::content::ContentSet;
use weighted_rules::core::engine::ContentEngine;
use weighted_rules::core::loot::LootDrop;
use weighted_rules::core::processor::RuleEvent;
use weighted_rules::core::registry::Registry;
use weighted_rules::schema::payload::{Payload, RegistryKind};
use weighted_rules::schema::target::Target;

const DEGRADATION: &str = "trailiertales:catacombs_degradation";
const ARCHERY: &str = "trailiertales:catacombs_degradation_archery";
const POT_LOOT: &str = "trailiertales:archaeology/catacombs_decorated_pot";

fn registry() -> Registry {
    ContentSet::load_dir(Path::new("content/catacombs"))
        .unwrap()
        .into_registry()
        .unwrap()
}

#[test]
fn catacombs_pack_loads_and_finalizes() {
    let registry = registry();
    let pools = registry.keys(RegistryKind::Pool);
    assert_eq!(pools.len(), 16);
    for key in [
        "trailiertales:catacombs/dungeon",
        "trailiertales:catacombs/corridor",
        "trailiertales:catacombs/corridor_connector",
        "trailiertales:catacombs/corridor/ladder_bottom",
        "trailiertales:catacombs/corridor/ladder_top",
        "trailiertales:catacombs/small_room",
        "trailiertales:catacombs/corridor_decoration",
        "trailiertales:catacombs/tomb_decoration",
        "trailiertales:catacombs/decoration/chain",
        "trailiertales:catacombs/decoration/chain_2",
        "trailiertales:catacombs/staircase_up",
    ] {
        assert!(pools.contains(&key), "missing pool {key}");
    }
    assert_eq!(registry.keys(RegistryKind::Processor).len(), 6);
    assert_eq!(registry.keys(RegistryKind::LootTable).len(), 11);
    assert!(registry.is_external(RegistryKind::Pool, "minecraft:empty"));
    assert!(registry.is_external(RegistryKind::LootTable, POT_LOOT));
}

#[test]
fn every_pool_falls_back_to_empty() {
    let registry = registry();
    for key in registry.keys(RegistryKind::Pool) {
        assert_eq!(registry.pool(key).unwrap().fallback(), Some("minecraft:empty"), "{key}");
    }
}

#[test]
fn pool_weights_match_content() {
    let registry = registry();
    let weights = |key: &str| -> Vec<u32> {
        registry.pool(key).unwrap().entries().iter().map(|e| e.weight).collect()
    };
    assert_eq!(weights("trailiertales:catacombs/dungeon"), vec![1]);
    assert_eq!(
        weights("trailiertales:catacombs/corridor/ladder_bottom"),
        vec![4, 2, 3, 3, 2, 3, 1]
    );
    assert_eq!(
        weights("trailiertales:catacombs/corridor_decoration"),
        vec![2, 19, 19, 19, 19, 19, 123]
    );
    assert_eq!(weights("trailiertales:catacombs/small_room"), vec![10; 11]);
    assert_eq!(weights("trailiertales:catacombs/decoration/chain_2"), vec![150, 5, 5]);

    let corridor = registry.pool("trailiertales:catacombs/corridor").unwrap();
    assert_eq!(corridor.total_weight(), 77);
    let buried = corridor
        .entries()
        .iter()
        .filter(|e| e.id == "trailiertales:catacombs/corridor/corridor_buried1")
        .count();
    assert_eq!(buried, 2);
}

#[test]
fn templates_share_processor_lists() {
    let registry = registry();
    let mut rng = StdRng::seed_from_u64(17);
    let room = registry.roll("trailiertales:catacombs/small_room", &mut rng).unwrap();
    let start = registry.roll("trailiertales:catacombs/dungeon", &mut rng).unwrap();
    let a = room.processors.unwrap();
    let b = start.processors.unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(a.name(), DEGRADATION);
}

#[test]
fn archery_tomb_uses_archery_list() {
    let registry = registry();
    let connector = registry.pool("trailiertales:catacombs/corridor_connector").unwrap();
    let archery = connector
        .entries()
        .iter()
        .find(|e| e.id == "trailiertales:catacombs/tomb/archery")
        .unwrap();
    assert_eq!(
        archery.payload,
        Payload::Template {
            location: "trailiertales:catacombs/tomb/archery".into(),
            processors: Some(ARCHERY.into()),
        }
    );
    let lava = connector
        .entries()
        .iter()
        .find(|e| e.id == "trailiertales:catacombs/tomb/lava_trap")
        .unwrap();
    assert!(matches!(
        &lava.payload,
        Payload::Template { processors: Some(list), .. } if list == "trailiertales:catacombs_degradation_fire"
    ));
}

#[test]
fn deepslate_bricks_crack_or_moss() {
    let registry = registry();
    let mut rng = StdRng::seed_from_u64(5);
    let n = 40_000;
    let mut cracked = 0;
    let mut mossy = 0;
    for _ in 0..n {
        let out = registry
            .process(DEGRADATION, Target::new("minecraft:deepslate_bricks"), &mut rng)
            .unwrap();
        match out.block.as_str() {
            "minecraft:cracked_deepslate_bricks" => cracked += 1,
            "trailiertales:mossy_deepslate_bricks" => mossy += 1,
            "minecraft:deepslate_bricks" => {}
            other => panic!("unexpected block {other}"),
        }
    }
    // The moss rule only sees bricks the crack rule left alone.
    assert!((cracked as f64 / n as f64 - 0.3).abs() < 0.015);
    assert!((mossy as f64 / n as f64 - 0.7 * 0.15).abs() < 0.015);
}

#[test]
fn lit_red_candles_burn_down() {
    let registry = registry();
    let mut rng = StdRng::seed_from_u64(23);
    let n = 40_000;
    let mut counts = [0usize; 5];
    for _ in 0..n {
        let candle = Target::new("minecraft:red_candle")
            .with_state("candles", "4")
            .with_state("lit", "true");
        let out = registry.process(DEGRADATION, candle, &mut rng).unwrap();
        assert_eq!(out.state("lit"), Some("true"));
        let left: usize = out.state("candles").unwrap().parse().unwrap();
        counts[left] += 1;
    }
    let freq = |i: usize| counts[i] as f64 / n as f64;
    assert!((freq(3) - 0.15).abs() < 0.015);
    assert!((freq(2) - 0.85 * 0.5).abs() < 0.015);
    assert!((freq(1) - 0.85 * 0.5 * 0.7).abs() < 0.015);
    assert!((freq(4) - 0.85 * 0.5 * 0.3).abs() < 0.015);
}

#[test]
fn candle_without_lit_state_is_skipped_not_fatal() {
    let registry = registry();
    let list = registry.processor_list("trailiertales:catacombs_rules").unwrap();
    let mut skipped = 0;
    let out = list.apply_with(
        Target::new("minecraft:red_candle").with_state("candles", "4"),
        &mut StdRng::seed_from_u64(1),
        &registry,
        &mut |event| {
            if matches!(event, RuleEvent::Skipped { .. }) {
                skipped += 1;
            }
        },
    );
    assert_eq!(skipped, 3);
    assert_eq!(out.block, "minecraft:red_candle");
    assert_eq!(out.state("candles"), Some("4"));
}

#[test]
fn scripted_draws_fire_first_matching_rule() {
    let registry = registry();
    // Every chance gate passes on a zero draw, so the first rule wins and
    // the second no longer matches the rewritten block.
    let mut pass = StepRng::new(0, 0);
    let out = registry
        .process(DEGRADATION, Target::new("minecraft:deepslate_bricks"), &mut pass)
        .unwrap();
    assert_eq!(out.block, "minecraft:cracked_deepslate_bricks");

    let candle = Target::new("minecraft:candle").with_state("candles", "4");
    let out = registry.process(DEGRADATION, candle, &mut pass).unwrap();
    assert_eq!(out.block, "minecraft:cave_air");
    assert!(out.state.is_empty());
}

#[test]
fn scripted_high_draw_only_fires_certain_rules() {
    let registry = registry();
    let mut high = StepRng::new(u64::MAX, 0);
    let out = registry
        .process("trailiertales:catacombs_rules", Target::new("minecraft:suspicious_gravel"), &mut high)
        .unwrap();
    assert_eq!(out.block, "minecraft:suspicious_gravel");

    let out = registry
        .process("trailiertales:catacombs_pot_loot", Target::new("minecraft:decorated_pot"), &mut high)
        .unwrap();
    assert_eq!(out.loot_table.as_deref(), Some(POT_LOOT));
}

#[test]
fn mossy_swap_keeps_stair_state() {
    let registry = registry();
    let stairs = Target::new("minecraft:deepslate_tile_stairs")
        .with_state("facing", "east")
        .with_state("half", "bottom")
        .with_state("waterlogged", "false");
    let out = registry
        .process("trailiertales:catacombs_moss", stairs, &mut StepRng::new(0, 0))
        .unwrap();
    assert_eq!(out.block, "trailiertales:mossy_deepslate_tile_stairs");
    assert_eq!(out.state("facing"), Some("east"));
    assert_eq!(out.state("half"), Some("bottom"));
    assert_eq!(out.state("waterlogged"), Some("false"));
}

#[test]
fn surviving_pots_get_loot_and_sherds() {
    let registry = registry();
    let candidates = [
        "minecraft:skull_pottery_sherd",
        "minecraft:prize_pottery_sherd",
        "minecraft:plenty_pottery_sherd",
        "minecraft:sheaf_pottery_sherd",
        "minecraft:heart_pottery_sherd",
        "minecraft:archer_pottery_sherd",
        "minecraft:blade_pottery_sherd",
        "minecraft:brewer_pottery_sherd",
        "trailiertales:wither_pottery_sherd",
    ];
    let mut rng = StdRng::seed_from_u64(31);
    let n = 20_000;
    let mut broken = 0;
    for _ in 0..n {
        let out = registry
            .process(DEGRADATION, Target::new("minecraft:decorated_pot"), &mut rng)
            .unwrap();
        if out.block == "minecraft:cave_air" {
            broken += 1;
            assert!(out.loot_table.is_none());
            continue;
        }
        assert_eq!(out.block, "minecraft:decorated_pot");
        assert_eq!(out.loot_table.as_deref(), Some(POT_LOOT));
        assert_eq!(out.sherds.len(), 4);
        assert!(out.sherds.iter().all(|s| candidates.contains(&s.as_str())));
    }
    assert!((broken as f64 / n as f64 - 0.333).abs() < 0.015);
}

#[test]
fn archery_pots_use_archery_sherds() {
    let registry = registry();
    let candidates = [
        "minecraft:skull_pottery_sherd",
        "minecraft:archer_pottery_sherd",
        "trailiertales:bullseye_pottery_sherd",
        "trailiertales:wither_pottery_sherd",
    ];
    let mut rng = StdRng::seed_from_u64(8);
    let mut bullseye = 0;
    let mut faces = 0;
    for _ in 0..5_000 {
        let out = registry
            .process(ARCHERY, Target::new("minecraft:decorated_pot"), &mut rng)
            .unwrap();
        if out.block == "minecraft:decorated_pot" {
            assert!(out.sherds.iter().all(|s| candidates.contains(&s.as_str())));
            faces += out.sherds.len();
            bullseye += out
                .sherds
                .iter()
                .filter(|s| *s == "trailiertales:bullseye_pottery_sherd")
                .count();
        }
    }
    // Bullseye is listed twice out of five.
    assert!((bullseye as f64 / faces as f64 - 0.4).abs() < 0.03);
}

#[test]
fn corridor_archaeology_drops_one_item() {
    let registry = registry();
    let mut rng = StdRng::seed_from_u64(2);
    let n = 50_000;
    let mut bones = 0;
    for _ in 0..n {
        let drops = registry
            .roll_loot("trailiertales:archaeology/catacombs_corridor", &mut rng)
            .unwrap();
        assert_eq!(drops.len(), 1);
        if let LootDrop::Item { id, .. } = &drops[0] {
            if id == "minecraft:bone" {
                bones += 1;
            }
        } else {
            panic!("corridor loot is all items");
        }
    }
    let total = 4.0 * 7.0 + 1.0 + 2.0 + 10.0 + 2.0 + 40.0 + 35.0 + 20.0 + 10.0 + 20.0;
    assert!((bones as f64 / n as f64 - 40.0 / total).abs() < 0.01);
}

#[test]
fn enchanted_books_carry_functions() {
    let registry = registry();
    let tomb = registry.loot_table("trailiertales:archaeology/catacombs_tomb").unwrap();
    let books: Vec<_> = tomb.pools()[0]
        .entries
        .entries()
        .iter()
        .filter(|e| e.id == "minecraft:book")
        .collect();
    assert_eq!(books.len(), 2);
    assert_eq!(books[0].payload.functions, vec!["enchant_randomly".to_string()]);
    assert!(books[1].payload.functions.is_empty());
}

#[test]
fn duplicate_loot_entries_are_kept() {
    let registry = registry();
    for key in [
        "trailiertales:archaeology/savanna_ruins",
        "trailiertales:archaeology/savanna_ruins_surface",
    ] {
        let table = registry.loot_table(key).unwrap();
        let pool = &table.pools()[0].entries;
        let purple: Vec<usize> = pool
            .entries()
            .iter()
            .enumerate()
            .filter(|(_, e)| e.id == "minecraft:purple_dye")
            .map(|(i, _)| i)
            .collect();
        assert_eq!(purple.len(), 2, "{key}");
        let p: f64 = purple.iter().map(|&i| pool.probability(i)).sum();
        assert!((p - 40.0 / pool.total_weight() as f64).abs() < 1e-12);
    }

    let fossil = registry.loot_table("trailiertales:archaeology/desert_ruins_fossil").unwrap();
    assert_eq!(fossil.pools()[0].entries.total_weight(), 6);
}

#[test]
fn pot_loot_is_left_to_the_host() {
    let registry = registry();
    let drops = registry.roll_loot(POT_LOOT, &mut StdRng::seed_from_u64(0)).unwrap();
    assert_eq!(
        drops,
        vec![LootDrop::External {
            kind: RegistryKind::LootTable,
            key: POT_LOOT.to_string(),
        }]
    );
}

#[test]
fn later_pack_overrides_shared_list() {
    let mut engine = ContentEngine::builder()
        .content_dir("content/catacombs")
        .content_file("tests/fixtures/override.ron")
        .seed(4)
        .build()
        .unwrap();
    for _ in 0..2_000 {
        let out = engine
            .process(DEGRADATION, Target::new("minecraft:deepslate_brick_wall"))
            .unwrap();
        assert_eq!(out.block, "minecraft:deepslate_brick_wall");
    }
}

#[test]
fn engine_places_rooms_deterministically() {
    let build = || {
        ContentEngine::builder()
            .content_dir("content/catacombs")
            .seed(99)
            .build()
            .unwrap()
    };
    let targets = || {
        vec![
            Target::new("minecraft:cobweb"),
            Target::new("minecraft:deepslate_tiles"),
            Target::new("minecraft:decorated_pot"),
        ]
    };
    let mut a = build();
    let mut b = build();
    for _ in 0..100 {
        let pa = a.place("trailiertales:catacombs/small_room", targets()).unwrap();
        let pb = b.place("trailiertales:catacombs/small_room", targets()).unwrap();
        assert_eq!(pa.selection.entry_id, pb.selection.entry_id);
        assert_eq!(pa.targets, pb.targets);
        assert!(pa.selection.processors.is_some());
    }
}
