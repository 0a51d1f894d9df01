use advrando_game::{ConnectionMap, LogicGraph};
use anyhow::{anyhow, Error, Result};
use log::{error, info};
use serde::{Deserialize, Serialize};

use crate::enemies::{randomize_enemies, EnemyMap};
use crate::entrances::{is_completable, randomize_entrances, FixedItems};
use crate::key_logic::{compute_key_logic, KeyLogic};
use crate::randomize::{vanilla_assignment, Assignment, Randomizer};
use crate::settings::{RandomizerSettings, SeedSettings};
use crate::spoiler_log::{get_spheres, get_spoiler_entrances, SpoilerLog};

/// The outputs applied to world content.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Randomization {
    pub seeds: SeedSettings,
    pub item_attempt: Option<usize>,
    pub assignment: Assignment,
    pub connections: ConnectionMap,
    pub enemies: Option<EnemyMap>,
    pub failures: Vec<String>,
}

impl Randomization {
    pub fn is_fully_randomized(&self) -> bool {
        self.failures.is_empty()
    }
}

fn record_failure(failures: &mut Vec<String>, category: &str, e: &Error) {
    error!("{category} randomization failed, using vanilla content: {e:#}");
    failures.push(format!("{category}: {e:#}"));
}

fn get_key_logic(
    graph: &LogicGraph,
    connections: &mut ConnectionMap,
    settings: &RandomizerSettings,
    failures: &mut Vec<String>,
) -> Option<KeyLogic> {
    let everything = settings.everything_held();
    match compute_key_logic(graph, connections, &everything) {
        Ok(k) => return Some(k),
        Err(e) => record_failure(failures, "Key logic", &e),
    }
    if *connections == graph.vanilla_connections {
        return None;
    }
    info!("Reverting entrances to vanilla and recomputing key logic");
    *connections = graph.vanilla_connections.clone();
    failures.push("Entrances: reverted to vanilla after key logic failure".to_string());
    match compute_key_logic(graph, connections, &everything) {
        Ok(k) => Some(k),
        Err(e) => {
            record_failure(failures, "Key logic", &e);
            None
        }
    }
}

fn with_key_logic(graph: &LogicGraph, key_logic: Option<&KeyLogic>) -> LogicGraph {
    let mut logic_graph = graph.clone();
    if let Some(k) = key_logic {
        k.inject(&mut logic_graph);
    }
    logic_graph
}

/// Runs every randomization category enabled by the configured seeds:
/// entrances, key logic, items, enemies, then the spoiler log.
///
/// Category failures are logged and recorded in `Randomization::failures`;
/// the failed category falls back to vanilla content. The returned error is
/// reserved for failures of the fallback itself.
pub fn randomize_world(
    graph: &LogicGraph,
    settings: &RandomizerSettings,
) -> Result<(Randomization, SpoilerLog)> {
    let seeds = settings.seeds;
    let mut failures: Vec<String> = vec![];
    let everything = settings.everything_held();
    let start_state = settings.start_state();
    let vanilla = vanilla_assignment(graph, settings)?;
    let vanilla_placements = vanilla.placements(graph);
    let vanilla_items = FixedItems {
        placements: &vanilla_placements,
        start_state: &start_state,
    };

    let mut connections = graph.vanilla_connections.clone();
    if let Some(seed) = seeds.entrances {
        // Without an item seed the vanilla items must stay completable.
        let fixed_items = seeds.items.is_none().then_some(&vanilla_items);
        match randomize_entrances(
            graph,
            seed,
            &settings.entrance_settings,
            &everything,
            fixed_items,
        ) {
            Ok(c) => connections = c,
            Err(e) => record_failure(&mut failures, "Entrance", &e),
        }
    }

    let mut key_logic = get_key_logic(graph, &mut connections, settings, &mut failures);

    let mut item_attempt = None;
    let assignment = match (seeds.items, &key_logic) {
        (Some(seed), Some(k)) => {
            let logic_graph = with_key_logic(graph, Some(k));
            let result = Randomizer::new(&logic_graph, &connections, settings)
                .and_then(|r| r.randomize_with_retries(seed));
            match result {
                Ok(r) => {
                    item_attempt = Some(r.attempt);
                    r.assignment
                }
                Err(e) => {
                    record_failure(&mut failures, "Item", &e);
                    vanilla.clone()
                }
            }
        }
        (Some(_), None) => {
            error!("Item randomization skipped: no valid key logic");
            failures.push("Item: skipped without valid key logic".to_string());
            vanilla.clone()
        }
        (None, _) => vanilla.clone(),
    };

    // Vanilla items were never placed against these connections.
    if item_attempt.is_none()
        && connections != graph.vanilla_connections
        && !is_completable(graph, &connections, &everything, &vanilla_items)?
    {
        record_failure(
            &mut failures,
            "Entrance",
            &anyhow!("Randomized entrances leave vanilla items incompletable"),
        );
        connections = graph.vanilla_connections.clone();
        key_logic = get_key_logic(graph, &mut connections, settings, &mut failures);
    }
    let logic_graph = with_key_logic(graph, key_logic.as_ref());

    let enemies = seeds.enemies.map(|seed| randomize_enemies(graph, seed));

    let (spheres, unreached) = get_spheres(
        &logic_graph,
        &connections,
        &assignment,
        &start_state,
    )?;
    if !unreached.is_empty() {
        info!("{} checks unreachable in the final world", unreached.len());
    }

    let spoiler_log = SpoilerLog {
        seeds,
        spheres,
        unreached,
        key_logic: key_logic.unwrap_or_default(),
        entrances: get_spoiler_entrances(graph, &connections),
        enemies: enemies.clone(),
        failures: failures.clone(),
    };
    let randomization = Randomization {
        seeds,
        item_attempt,
        assignment,
        connections,
        enemies,
        failures,
    };
    Ok((randomization, spoiler_log))
}
