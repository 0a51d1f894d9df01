use advrando_game::{CheckKind, ConnectionMap, ItemId, LocationId, LogicGraph, NodeId};
use advrando_logic::{FlagValue, SimulatedState, ZoneId};
use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::enemies::EnemyMap;
use crate::key_logic::KeyLogic;
use crate::randomize::Assignment;
use crate::settings::SeedSettings;
use crate::traverse::{reach, ReachContext};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SpoilerItem {
    pub item: ItemId,
    pub location: LocationId,
    pub zone: ZoneId,
    pub node: NodeId,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SpoilerSphere {
    pub step: usize,
    pub items: Vec<SpoilerItem>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SpoilerEntrance {
    pub exit: String,
    pub entrance: String,
    pub vanilla: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SpoilerLog {
    pub seeds: SeedSettings,
    pub spheres: Vec<SpoilerSphere>,
    pub unreached: Vec<LocationId>,
    pub key_logic: KeyLogic,
    pub entrances: Vec<SpoilerEntrance>,
    pub enemies: Option<EnemyMap>,
    pub failures: Vec<String>,
}

/// Forward playthrough in steps: each step collects everything reachable with
/// the items from previous steps.
pub fn get_spheres(
    graph: &LogicGraph,
    connections: &ConnectionMap,
    assignment: &Assignment,
    start_state: &SimulatedState,
) -> Result<(Vec<SpoilerSphere>, Vec<LocationId>)> {
    let placements = assignment.placements(graph);
    let mut collected = vec![false; graph.checks.len()];
    let mut state = start_state.clone();
    let mut spheres = vec![];
    let mut unreached = vec![];
    loop {
        // Nothing is collected during the reach itself; items, keys and NPC flags
        // from this step only take effect on the next one.
        let mut cx = ReachContext::new(graph, connections, &[]);
        cx.collect_keys = false;
        cx.set_npc_flags = false;
        let result = reach(&cx, &graph.roots, &state)?;
        state = result.state;
        let mut items = vec![];
        let mut progressed = false;
        for (c, check) in graph.checks.iter().enumerate() {
            if !result.checks[c] || collected[c] {
                continue;
            }
            collected[c] = true;
            progressed = true;
            match &check.kind {
                CheckKind::KeyDrop => state.add_key(&check.zone),
                CheckKind::Npc { flag } => {
                    state.set_flag(flag, FlagValue::Bool(true));
                }
                CheckKind::Item => {}
            }
            if let Some(item) = &placements[c] {
                if check.kind != CheckKind::KeyDrop {
                    state.collect(item);
                }
                items.push(SpoilerItem {
                    item: item.clone(),
                    location: check.id.clone(),
                    zone: check.zone.clone(),
                    node: graph.nodes[check.node].id.clone(),
                });
            }
        }
        if !progressed {
            for (c, check) in graph.checks.iter().enumerate() {
                if !collected[c] {
                    unreached.push(check.id.clone());
                }
            }
            break;
        }
        spheres.push(SpoilerSphere {
            step: spheres.len() + 1,
            items,
        });
    }
    Ok((spheres, unreached))
}

pub fn get_spoiler_entrances(graph: &LogicGraph, connections: &ConnectionMap) -> Vec<SpoilerEntrance> {
    connections
        .iter()
        .map(|(exit, entrance)| SpoilerEntrance {
            exit: exit.clone(),
            entrance: entrance.clone(),
            vanilla: graph.vanilla_connections.get(exit) == Some(entrance),
        })
        .collect()
}
