use advrando_game::{CheckIdx, ConnectionMap, DoorIdx, LocationId, LogicGraph};
use advrando_logic::{LogicPredicate, SimulatedState, ZoneId};
use anyhow::{bail, Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::RandomizationError;
use crate::traverse::{reach, DoorPolicy, ReachContext, ReachResult};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoorKeyLogic {
    pub door: DoorIdx,
    pub door_id: String,
    pub zone: ZoneId,
    /// Same-zone small-key doors reachable while this door is shut (itself included).
    pub required: u32,
    /// Smallest key count at which the door can be reached and opened.
    pub min_keys: u32,
    /// Same-zone key drops reachable while this door is shut.
    pub available: u32,
    /// Checks that cannot be reached while this door is shut.
    pub gated_checks: Vec<LocationId>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyLogic {
    pub doors: Vec<DoorKeyLogic>,
}

impl KeyLogic {
    /// Writes the synthesized key predicates into the graph: each door requires
    /// `keys(zone) >= min_keys`, and the same requirement is added to every check
    /// behind it.
    pub fn inject(&self, graph: &mut LogicGraph) {
        for door_logic in &self.doors {
            let pred = LogicPredicate::keys_at_least(&door_logic.zone, door_logic.min_keys);
            graph.doors[door_logic.door].requirement = Some(pred.clone());
            for location in &door_logic.gated_checks {
                if let Some(idx) = graph.check_idx(location) {
                    let check = &mut graph.checks[idx];
                    let req = std::mem::take(&mut check.requirement);
                    check.requirement = LogicPredicate::make_and(vec![req, pred.clone()]);
                }
            }
        }
    }

    pub fn door(&self, door_id: &str) -> Option<&DoorKeyLogic> {
        self.doors.iter().find(|d| d.door_id == door_id)
    }
}

/// Computes key logic for every zone owning small-key doors. `state` should be
/// the everything-held state so that only keys and doors limit reachability.
///
/// Before crossing a door the player may already have spent keys on every other
/// door of the zone reachable while it stays shut, so the door needs that many
/// keys plus one, all dropping on its near side. Otherwise the dungeon can lock
/// the player out of its own keys and is rejected.
pub fn compute_key_logic(
    graph: &LogicGraph,
    connections: &ConnectionMap,
    state: &SimulatedState,
) -> Result<KeyLogic> {
    let mut out = KeyLogic::default();
    for zone in graph.key_zones() {
        let doors = compute_zone(graph, connections, state, &zone)
            .with_context(|| format!("Computing key logic for {zone}"))?;
        out.doors.extend(doors);
    }
    Ok(out)
}

fn source_reached(graph: &LogicGraph, door: DoorIdx, result: &ReachResult) -> bool {
    graph.door_sources[door].iter().any(|&n| result.nodes[n])
}

fn compute_zone(
    graph: &LogicGraph,
    connections: &ConnectionMap,
    state: &SimulatedState,
    zone: &str,
) -> Result<Vec<DoorKeyLogic>> {
    let zone_doors = graph.small_key_doors(zone);
    let key_drops: Vec<CheckIdx> = graph.key_drops(zone);
    let total_keys = key_drops.len() as u32;

    // Region reachable with each door shut and every other door open.
    let mut required = vec![0u32; graph.doors.len()];
    let mut available = vec![0u32; graph.doors.len()];
    let mut gated: Vec<Vec<LocationId>> = vec![vec![]; graph.doors.len()];
    for &d in &zone_doors {
        let mut cx = ReachContext::new(graph, connections, &[]);
        cx.door_policy = DoorPolicy::OpenExcept(Some(d));
        let region = reach(&cx, &graph.roots, state)?;
        required[d] = zone_doors
            .iter()
            .filter(|&&other| source_reached(graph, other, &region))
            .count() as u32;
        available[d] = key_drops.iter().filter(|&&c| region.checks[c]).count() as u32;
        gated[d] = region.unreached_checks(graph);
    }

    // Fixed-key passes: which doors can be reached and opened holding exactly k keys.
    let mut min_keys: Vec<Option<u32>> = vec![None; graph.doors.len()];
    for k in 0..=total_keys {
        let mut cx = ReachContext::new(graph, connections, &[]);
        cx.door_policy = DoorPolicy::KeyPass {
            zone,
            required: &required,
        };
        cx.collect_keys = false;
        let mut pass_state = state.clone();
        pass_state.set_key_count(zone, k);
        let result = reach(&cx, &graph.roots, &pass_state)?;
        for &d in &zone_doors {
            if min_keys[d].is_none() && k >= required[d] && source_reached(graph, d, &result) {
                min_keys[d] = Some(k);
            }
        }
        debug!("Key logic {zone}: pass k={k} reached {} nodes", result.node_count());
    }

    let mut out = vec![];
    for &d in &zone_doors {
        let door = &graph.doors[d];
        let Some(min) = min_keys[d] else {
            bail!(RandomizationError::UnreachableDoor {
                zone: zone.to_string(),
                door: door.id.clone(),
            });
        };
        if available[d] < min {
            bail!(RandomizationError::SelfLockingDoor {
                zone: zone.to_string(),
                door: door.id.clone(),
                required: min,
                available: available[d],
            });
        }
        out.push(DoorKeyLogic {
            door: d,
            door_id: door.id.clone(),
            zone: zone.to_string(),
            required: required[d],
            min_keys: min,
            available: available[d],
            gated_checks: std::mem::take(&mut gated[d]),
        });
    }
    info!(
        "Key logic {zone}: {} doors, {total_keys} keys",
        zone_doors.len()
    );
    Ok(out)
}
