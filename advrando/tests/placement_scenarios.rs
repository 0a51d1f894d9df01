use advrando::randomize::{Assignment, Randomizer};
use advrando::settings::{parse_randomizer_settings, RandomizerSettings};
use advrando::traverse::{reach, ReachContext};
use advrando::{randomize_world, RandomizationError};
use advrando_game::LogicGraph;
use advrando_logic::SimulatedState;
use anyhow::{Context, Result};

fn parse_graph(world: &str, zones: &[&str]) -> Result<LogicGraph> {
    let mut zone_jsons = vec![];
    for zone in zones {
        zone_jsons.push(json::parse(zone)?);
    }
    LogicGraph::parse(&json::parse(world)?, &zone_jsons)
}

// A -> B is gated on X; B -> C is open.
const CHAIN: &str = r#"{"zone": "field", "nodes": [
    {"id": "A", "checks": [{"location": "check_a"}], "paths": [{"to": "B", "requires": "X"}]},
    {"id": "B", "checks": [{"location": "check_b"}], "paths": [{"to": "A"}, {"to": "C"}]},
    {"id": "C", "checks": [{"location": "check_c"}], "paths": [{"to": "B"}]}
]}"#;

fn forward_coverage(graph: &LogicGraph, assignment: &Assignment) -> Result<Vec<String>> {
    let placements = assignment.placements(graph);
    let cx = ReachContext::new(graph, &graph.vanilla_connections, &placements);
    let result = reach(&cx, &graph.roots, &SimulatedState::new())?;
    Ok(result.unreached_checks(graph))
}

#[test]
fn gating_item_lands_before_its_gate() -> Result<()> {
    let graph = parse_graph(r#"{"roots": ["A"]}"#, &[CHAIN])?;
    let settings = parse_randomizer_settings(
        r#"{"item_pool": [
            {"item": "X", "class": "Progression"},
            {"item": "Y", "class": "Filler"},
            {"item": "Z", "class": "Filler"}
        ]}"#,
    )?;
    let randomizer = Randomizer::new(&graph, &graph.vanilla_connections, &settings)?;
    for seed in 0..50 {
        let r = randomizer.randomize(1, seed)?;
        assert_eq!(r.assignment.get("check_a").map(|s| s.as_str()), Some("X"), "seed {seed}");
        assert_eq!(r.assignment.len(), 3);
        assert!(forward_coverage(&graph, &r.assignment)?.is_empty());
    }
    Ok(())
}

fn chain_settings(max_attempts: usize, max_deferrals: usize) -> Result<RandomizerSettings> {
    parse_randomizer_settings(&format!(
        r#"{{
            "item_pool": [
                {{"item": "X", "class": "Progression"}},
                {{"item": "Y", "class": "Progression"}},
                {{"item": "Z", "class": "Progression"}}
            ],
            "item_progression_settings": {{"max_attempts": {max_attempts}, "max_deferrals": {max_deferrals}}}
        }}"#
    ))
}

#[test]
fn deferral_takes_back_the_blocking_placement() -> Result<()> {
    let graph = parse_graph(r#"{"roots": ["A"]}"#, &[CHAIN])?;
    let settings = chain_settings(1, 10)?;
    let randomizer = Randomizer::new(&graph, &graph.vanilla_connections, &settings)?;

    // Seed 1 places Z in check_b, then Y takes check_a, leaving X nowhere to go.
    // Taking Y back frees check_a for X.
    let r = randomizer.randomize(1, 1)?;
    assert_eq!(r.deferrals, 1);
    let order: Vec<(&str, &str)> = r
        .placement_order
        .iter()
        .map(|s| (s.item.as_str(), s.location.as_str()))
        .collect();
    assert_eq!(
        order,
        vec![("Z", "check_b"), ("X", "check_a"), ("Y", "check_c")]
    );
    assert!(forward_coverage(&graph, &r.assignment)?.is_empty());

    for seed in 0..100 {
        let r = randomizer.randomize(1, seed)?;
        assert_eq!(r.assignment.get("check_a").map(|s| s.as_str()), Some("X"));
    }
    Ok(())
}

#[test]
fn attempts_retry_when_deferrals_are_disabled() -> Result<()> {
    let graph = parse_graph(r#"{"roots": ["A"]}"#, &[CHAIN])?;
    let settings = chain_settings(5, 0)?;
    let randomizer = Randomizer::new(&graph, &graph.vanilla_connections, &settings)?;

    let err = randomizer.randomize(1, 1).unwrap_err();
    assert_eq!(
        err.downcast_ref::<RandomizationError>(),
        Some(&RandomizationError::PlacementExhausted {
            attempt: 1,
            item: "X".to_string(),
            deferrals: 0,
        })
    );

    assert_eq!(randomizer.randomize_with_retries(1)?.attempt, 3);
    assert_eq!(randomizer.randomize_with_retries(4)?.attempt, 2);
    for seed in 0..20 {
        let r = randomizer.randomize_with_retries(seed)?;
        assert_eq!(r.deferrals, 0);
        assert_eq!(r.assignment.get("check_a").map(|s| s.as_str()), Some("X"));
        assert!(forward_coverage(&graph, &r.assignment)?.is_empty());
    }
    Ok(())
}

#[test]
fn placement_is_deterministic() -> Result<()> {
    let graph = parse_graph(r#"{"roots": ["A"]}"#, &[CHAIN])?;
    let settings = parse_randomizer_settings(
        r#"{"item_pool": [
            {"item": "X", "class": "Progression"},
            {"item": "Y", "class": "Progression"},
            {"item": "Z", "class": "Filler"}
        ]}"#,
    )?;
    let randomizer = Randomizer::new(&graph, &graph.vanilla_connections, &settings)?;
    for seed in [3, 99, 123456789] {
        let a = randomizer.randomize_with_retries(seed)?;
        let b = randomizer.randomize_with_retries(seed)?;
        assert_eq!(a, b);
        assert_eq!(
            serde_json::to_string(&a.assignment)?,
            serde_json::to_string(&b.assignment)?
        );
    }
    Ok(())
}

#[test]
fn unreachable_check_is_a_malformed_graph() -> Result<()> {
    let zone = r#"{"zone": "field", "nodes": [
        {"id": "A", "checks": [{"location": "check_a"}, {"location": "sealed", "requires": "NoSuchItem"}]}
    ]}"#;
    let graph = parse_graph(r#"{"roots": ["A"]}"#, &[zone])?;
    let settings = parse_randomizer_settings(r#"{"item_pool": [{"item": "X", "class": "Progression"}]}"#)?;
    let err = Randomizer::new(&graph, &graph.vanilla_connections, &settings)
        .err()
        .context("expected a malformed graph")?;
    assert_eq!(
        err.downcast_ref::<RandomizationError>(),
        Some(&RandomizationError::MalformedGraph {
            locations: vec!["sealed".to_string()]
        })
    );
    Ok(())
}

#[test]
fn npc_flag_gates_progress() -> Result<()> {
    let zone = r#"{"zone": "field", "nodes": [
        {"id": "A", "npcs": [{"location": "sage", "flag": "met_sage"}],
         "checks": [{"location": "check_a"}],
         "paths": [{"to": "B", "requires": {"and": ["met_sage", "X"]}}]},
        {"id": "B", "checks": [{"location": "check_b"}], "paths": [{"to": "A"}]}
    ]}"#;
    let graph = parse_graph(r#"{"roots": ["A"]}"#, &[zone])?;
    let settings = parse_randomizer_settings(
        r#"{"item_pool": [{"item": "X", "class": "Progression"}], "filler_item": "Rupee"}"#,
    )?;
    let randomizer = Randomizer::new(&graph, &graph.vanilla_connections, &settings)?;
    for seed in 0..20 {
        let r = randomizer.randomize(1, seed)?;
        let x_location = r
            .assignment
            .iter()
            .find(|(_, item)| item.as_str() == "X")
            .map(|(loc, _)| loc.as_str());
        assert!(matches!(x_location, Some("sage") | Some("check_a")));
        assert_eq!(r.assignment.get("check_b").map(|s| s.as_str()), Some("Rupee"));
    }
    Ok(())
}

#[test]
fn self_locking_dungeon_falls_back_to_vanilla() -> Result<()> {
    let world = r#"{"roots": ["entry"], "doors": [{"id": "cell_door", "zone": "keep", "lock": "smallKey"}]}"#;
    let zone = r#"{"zone": "keep", "nodes": [
        {"id": "entry", "checks": [{"location": "entry_chest", "vanillaItem": "Bow"}],
         "paths": [{"to": "cell", "door": "cell_door"}]},
        {"id": "cell", "checks": [{"location": "cell_key", "keyDrop": true}],
         "paths": [{"to": "entry", "door": "cell_door"}]}
    ]}"#;
    let graph = parse_graph(world, &[zone])?;
    let settings = parse_randomizer_settings(
        r#"{"seeds": {"items": 5}, "item_pool": [{"item": "Bow", "class": "Progression"}]}"#,
    )?;
    let (randomization, spoiler_log) = randomize_world(&graph, &settings)?;
    assert!(!randomization.is_fully_randomized());
    assert!(randomization.failures[0].contains("Self-locking door cell_door"));
    assert_eq!(randomization.item_attempt, None);
    assert_eq!(
        randomization.assignment.get("entry_chest").map(|s| s.as_str()),
        Some("Bow")
    );
    assert_eq!(
        randomization.assignment.get("cell_key").map(|s| s.as_str()),
        Some("SmallKey(keep)")
    );
    assert!(spoiler_log.key_logic.doors.is_empty());
    assert_eq!(spoiler_log.unreached, vec!["cell_key"]);
    Ok(())
}

// Town's two one-way exits can trade targets; the exit to B needs the Key
// that sits in A.
const KEY_TOWN: &str = r#"{"zone": "town", "nodes": [
    {"id": "town", "exits": [
        {"id": "e1", "to": "a_in", "randomizable": true},
        {"id": "e2", "to": "b_in", "requires": "Key", "randomizable": true}
    ]},
    {"id": "A", "entrances": ["a_in"], "checks": [{"location": "a_chest", "vanillaItem": "Key"}]},
    {"id": "B", "entrances": ["b_in"], "checks": [{"location": "b_chest", "vanillaItem": "Rupee"}]}
]}"#;

#[test]
fn entrance_only_seeds_keep_vanilla_items_completable() -> Result<()> {
    let graph = parse_graph(r#"{"roots": ["town"]}"#, &[KEY_TOWN])?;
    for seed in 0..20 {
        let settings = parse_randomizer_settings(&format!(
            r#"{{
                "seeds": {{"entrances": {seed}}},
                "item_pool": [
                    {{"item": "Key", "class": "Progression"}},
                    {{"item": "Rupee", "class": "Filler"}}
                ]
            }}"#
        ))?;
        let (randomization, spoiler_log) = randomize_world(&graph, &settings)?;
        assert!(randomization.is_fully_randomized(), "seed {seed}: {:?}", randomization.failures);
        assert!(spoiler_log.unreached.is_empty(), "seed {seed}: {:?}", spoiler_log.unreached);
        // Swapping the targets strands the Key behind its own gate.
        assert_eq!(randomization.connections, graph.vanilla_connections, "seed {seed}");
    }
    Ok(())
}

#[test]
fn item_fallback_reverts_incompletable_entrances() -> Result<()> {
    let graph = parse_graph(r#"{"roots": ["town"]}"#, &[KEY_TOWN])?;
    let mut reverted = 0;
    for seed in 0..20 {
        // Three items for two checks: item placement always falls back.
        let settings = parse_randomizer_settings(&format!(
            r#"{{
                "seeds": {{"items": {seed}, "entrances": {seed}}},
                "item_pool": [
                    {{"item": "Key", "class": "Progression"}},
                    {{"item": "Rupee", "class": "Filler", "count": 2}}
                ]
            }}"#
        ))?;
        let (randomization, spoiler_log) = randomize_world(&graph, &settings)?;
        assert_eq!(randomization.item_attempt, None);
        assert!(randomization.failures[0].starts_with("Item: "), "seed {seed}");
        assert!(spoiler_log.unreached.is_empty(), "seed {seed}: {:?}", spoiler_log.unreached);
        assert_eq!(randomization.connections, graph.vanilla_connections, "seed {seed}");
        if randomization
            .failures
            .iter()
            .any(|f| f.starts_with("Entrance: "))
        {
            reverted += 1;
        }
    }
    assert!(reverted > 0);
    Ok(())
}
