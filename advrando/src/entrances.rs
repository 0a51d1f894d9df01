use advrando_game::{ConnectionMap, EntranceId, ExitId, ItemId, LinkType, LogicGraph};
use advrando_logic::{SeedRng, SimulatedState};
use anyhow::{bail, ensure, Context, Result};
use log::{debug, info};

use crate::error::RandomizationError;
use crate::key_logic::compute_key_logic;
use crate::settings::EntranceSettings;
use crate::traverse::{reach, ReachContext};

// A randomizable two-way doorway: leaving through `exit`, arriving through `entrance`.
#[derive(Clone, Debug)]
struct Doorway {
    exit: ExitId,
    entrance: EntranceId,
}

/// Items that keep their checks while entrances are shuffled.
pub struct FixedItems<'a> {
    pub placements: &'a [Option<ItemId>], // indexed by CheckIdx
    pub start_state: &'a SimulatedState,
}

/// Whether every check is collected by playing `items` forward through
/// `connections`, with key logic recomputed for those connections.
pub fn is_completable(
    graph: &LogicGraph,
    connections: &ConnectionMap,
    everything: &SimulatedState,
    items: &FixedItems,
) -> Result<bool> {
    let key_logic = match compute_key_logic(graph, connections, everything) {
        Ok(k) => k,
        Err(e) if e.downcast_ref::<RandomizationError>().is_some() => {
            debug!("Key logic fails for entrance permutation: {e:#}");
            return Ok(false);
        }
        Err(e) => return Err(e),
    };
    let mut logic_graph = graph.clone();
    key_logic.inject(&mut logic_graph);
    let cx = ReachContext::new(&logic_graph, connections, items.placements);
    let result = reach(&cx, &logic_graph.roots, items.start_state)?;
    let unreached = result.unreached_checks(&logic_graph);
    if !unreached.is_empty() {
        debug!(
            "Entrance permutation leaves checks unreachable with fixed items: {}",
            unreached.join(", ")
        );
    }
    Ok(unreached.is_empty())
}

fn two_way_doorways(graph: &LogicGraph) -> Result<Vec<Doorway>> {
    let mut out = vec![];
    for exit_id in graph.randomizable_exits(LinkType::TwoWay) {
        let exit = graph
            .exit(&exit_id)
            .with_context(|| format!("Unknown exit {exit_id}"))?;
        let entrance = exit
            .entrance
            .clone()
            .with_context(|| format!("Two-way exit {exit_id} has no arrival entrance"))?;
        out.push(Doorway {
            exit: exit_id,
            entrance,
        });
    }
    ensure!(
        out.len() % 2 == 0,
        "Odd number of randomizable two-way doorways ({})",
        out.len()
    );
    Ok(out)
}

fn propose(
    graph: &LogicGraph,
    doorways: &[Doorway],
    one_way_exits: &[ExitId],
    one_way_targets: &[EntranceId],
    rng: SeedRng,
) -> (ConnectionMap, SeedRng) {
    let mut connections = graph.vanilla_connections.clone();
    let (doorways, rng) = rng.shuffle(doorways.to_vec());
    for pair in doorways.chunks(2) {
        if let [a, b] = pair {
            connections.insert(a.exit.clone(), b.entrance.clone());
            connections.insert(b.exit.clone(), a.entrance.clone());
        }
    }
    let (targets, rng) = rng.shuffle(one_way_targets.to_vec());
    for (exit, target) in one_way_exits.iter().zip(targets) {
        connections.insert(exit.clone(), target);
    }
    (connections, rng)
}

fn is_acceptable(
    graph: &LogicGraph,
    connections: &ConnectionMap,
    settings: &EntranceSettings,
    everything: &SimulatedState,
    fixed_items: Option<&FixedItems>,
) -> Result<bool> {
    let structural = reach(
        &ReachContext::structural(graph, connections),
        &graph.roots,
        everything,
    )?;
    if !structural.all_nodes() {
        debug!(
            "Entrance permutation leaves {} of {} nodes unreachable",
            graph.nodes.len() - structural.node_count(),
            graph.nodes.len()
        );
        return Ok(false);
    }
    if settings.require_logical_completion {
        let logical = reach(
            &ReachContext::new(graph, connections, &[]),
            &graph.roots,
            everything,
        )?;
        let unreached = logical.unreached_checks(graph);
        if !unreached.is_empty() {
            debug!(
                "Entrance permutation leaves checks unreachable with every item held: {}",
                unreached.join(", ")
            );
            return Ok(false);
        }
    }
    if let Some(items) = fixed_items {
        return is_completable(graph, connections, everything, items);
    }
    Ok(true)
}

/// Shuffles randomizable exits and resamples until the result is connected.
///
/// Two-way doorways are paired up so that every crossing has a matching
/// return trip; one-way exits receive a permutation of the one-way targets.
/// `everything` is the everything-held state used for the logical check. With
/// `fixed_items`, a permutation must also leave those items completable.
pub fn randomize_entrances(
    graph: &LogicGraph,
    seed: u64,
    settings: &EntranceSettings,
    everything: &SimulatedState,
    fixed_items: Option<&FixedItems>,
) -> Result<ConnectionMap> {
    let doorways = two_way_doorways(graph)?;
    let one_way_exits = graph.randomizable_exits(LinkType::OneWay);
    let mut one_way_targets = vec![];
    for exit in &one_way_exits {
        one_way_targets.push(
            graph
                .vanilla_connections
                .get(exit)
                .cloned()
                .with_context(|| format!("Exit {exit} has no vanilla target"))?,
        );
    }

    let mut rng = SeedRng::new(seed);
    for attempt in 1..=settings.max_attempts {
        let (connections, next_rng) =
            propose(graph, &doorways, &one_way_exits, &one_way_targets, rng);
        rng = next_rng;
        if is_acceptable(graph, &connections, settings, everything, fixed_items)? {
            info!(
                "Entrance permutation accepted on attempt {attempt}/{} (seed={seed}, {} doorways, {} one-way exits)",
                settings.max_attempts,
                doorways.len(),
                one_way_exits.len()
            );
            return Ok(connections);
        }
        debug!("Entrance permutation rejected on attempt {attempt}");
    }
    bail!(RandomizationError::EntrancesExhausted {
        attempts: settings.max_attempts
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring_graph() -> Result<LogicGraph> {
        // Hub with four doorways leading to four rooms, each of which only
        // connects back through its own doorway.
        let mut nodes = vec![];
        let mut hub_exits = vec![];
        let mut hub_entrances = vec![];
        for i in 0..4 {
            hub_entrances.push(format!(r#""hub_in{i}""#));
            hub_exits.push(format!(
                r#"{{"id": "hub_out{i}", "to": "room{i}_in", "link": "twoWay", "entrance": "hub_in{i}", "randomizable": true}}"#
            ));
            nodes.push(format!(
                r#"{{"id": "room{i}", "entrances": ["room{i}_in"],
                    "checks": [{{"location": "chest{i}"}}],
                    "exits": [{{"id": "room{i}_out", "to": "hub_in{i}", "link": "twoWay", "entrance": "room{i}_in", "randomizable": true}}]}}"#
            ));
        }
        let hub = format!(
            r#"{{"id": "hub", "entrances": [{}], "exits": [{}]}}"#,
            hub_entrances.join(","),
            hub_exits.join(",")
        );
        let zone = format!(r#"{{"zone": "ring", "nodes": [{hub}, {}]}}"#, nodes.join(","));
        LogicGraph::parse(&json::parse(r#"{"roots": ["hub"]}"#)?, &[json::parse(&zone)?])
    }

    #[test]
    fn two_way_links_stay_symmetric() -> Result<()> {
        let g = ring_graph()?;
        let settings = EntranceSettings::default();
        let connections = randomize_entrances(&g, 17, &settings, &SimulatedState::new(), None)?;
        assert_eq!(connections.len(), g.vanilla_connections.len());
        for (exit_id, entrance) in &connections {
            let exit = g.exit(exit_id).unwrap();
            let target = g.entrance_owner[entrance];
            // The target doorway's exit must lead back to this doorway's entrance.
            let back = g.nodes[target]
                .exits
                .iter()
                .find(|x| x.entrance.as_ref() == Some(entrance))
                .unwrap();
            assert_eq!(connections.get(&back.id), exit.entrance.as_ref());
        }
        Ok(())
    }

    #[test]
    fn accepted_permutations_are_connected_and_deterministic() -> Result<()> {
        let g = ring_graph()?;
        let settings = EntranceSettings::default();
        for seed in 0..20 {
            let connections = randomize_entrances(&g, seed, &settings, &SimulatedState::new(), None)?;
            let reached = g.structural_reach(&connections);
            assert!(reached.iter().all(|&x| x), "seed {seed}");
            let again = randomize_entrances(&g, seed, &settings, &SimulatedState::new(), None)?;
            assert_eq!(connections, again);
        }
        Ok(())
    }

    #[test]
    fn exhausted_attempts_are_reported() -> Result<()> {
        let g = ring_graph()?;
        let settings = EntranceSettings {
            max_attempts: 0,
            require_logical_completion: true,
        };
        let err = randomize_entrances(&g, 1, &settings, &SimulatedState::new(), None).unwrap_err();
        assert_eq!(
            err.downcast_ref::<RandomizationError>(),
            Some(&RandomizationError::EntrancesExhausted { attempts: 0 })
        );
        Ok(())
    }
}
