use advrando_game::{
    CheckIdx, CheckKind, ConnectionMap, DoorIdx, DoorLock, ItemId, LocationId, LogicGraph, NodeIdx,
};
use advrando_logic::{evaluate, FlagValue, LogicPredicate, SimulatedState};
use anyhow::{bail, Result};

/// Guard against authoring errors; flags only accumulate, so real graphs settle far sooner.
pub const MAX_REACH_PASSES: usize = 1000;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ReachMode {
    Logical,
    // Every predicate and door is treated as satisfied; only topology matters.
    Structural,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DoorPolicy<'a> {
    /// Injected key predicates, otherwise the door's own lock rule.
    Logical,
    /// Every door is open except the given one.
    OpenExcept(Option<DoorIdx>),
    /// Small-key doors of `zone` are open iff the zone's key counter reaches
    /// `required[door]`; every other door is open.
    KeyPass { zone: &'a str, required: &'a [u32] },
}

pub struct ReachContext<'a> {
    pub graph: &'a LogicGraph,
    pub connections: &'a ConnectionMap,
    pub placements: &'a [Option<ItemId>], // indexed by CheckIdx
    pub mode: ReachMode,
    pub door_policy: DoorPolicy<'a>,
    pub collect_keys: bool,
    // NPC rewards set their interaction flag when reached.
    pub set_npc_flags: bool,
}

impl<'a> ReachContext<'a> {
    pub fn new(
        graph: &'a LogicGraph,
        connections: &'a ConnectionMap,
        placements: &'a [Option<ItemId>],
    ) -> Self {
        ReachContext {
            graph,
            connections,
            placements,
            mode: ReachMode::Logical,
            door_policy: DoorPolicy::Logical,
            collect_keys: true,
            set_npc_flags: true,
        }
    }

    pub fn structural(graph: &'a LogicGraph, connections: &'a ConnectionMap) -> Self {
        ReachContext {
            graph,
            connections,
            placements: &[],
            mode: ReachMode::Structural,
            door_policy: DoorPolicy::OpenExcept(None),
            collect_keys: false,
            set_npc_flags: false,
        }
    }

    fn holds(&self, pred: &LogicPredicate, state: &SimulatedState) -> bool {
        match self.mode {
            ReachMode::Structural => true,
            ReachMode::Logical => evaluate(pred, state),
        }
    }

    fn door_open(&self, door_idx: DoorIdx, state: &SimulatedState) -> bool {
        if self.mode == ReachMode::Structural {
            return true;
        }
        let door = &self.graph.doors[door_idx];
        match self.door_policy {
            DoorPolicy::Logical => match &door.requirement {
                Some(req) => evaluate(req, state),
                None => match &door.lock {
                    DoorLock::SmallKey => state.key_count(&door.zone) >= 1,
                    DoorLock::Flag(flag) => state.has_flag(flag),
                },
            },
            DoorPolicy::OpenExcept(closed) => closed != Some(door_idx),
            DoorPolicy::KeyPass { zone, required } => {
                if door.lock == DoorLock::SmallKey && door.zone == zone {
                    state.key_count(zone) >= required[door_idx]
                } else {
                    true
                }
            }
        }
    }

    fn collect_check(&self, check_idx: CheckIdx, state: &mut SimulatedState) {
        let check = &self.graph.checks[check_idx];
        match &check.kind {
            CheckKind::KeyDrop => {
                if self.collect_keys {
                    state.add_key(&check.zone);
                }
                return;
            }
            CheckKind::Npc { flag } => {
                if self.set_npc_flags {
                    state.set_flag(flag, FlagValue::Bool(true));
                }
            }
            CheckKind::Item => {}
        }
        if let Some(Some(item)) = self.placements.get(check_idx) {
            state.collect(item);
        }
    }
}

#[derive(Clone, Debug)]
pub struct ReachResult {
    pub nodes: Vec<bool>,
    pub checks: Vec<bool>,
    pub state: SimulatedState,
    pub passes: usize,
}

impl ReachResult {
    pub fn all_nodes(&self) -> bool {
        self.nodes.iter().all(|&x| x)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.iter().filter(|&&x| x).count()
    }

    pub fn check_count(&self) -> usize {
        self.checks.iter().filter(|&&x| x).count()
    }

    pub fn unreached_checks(&self, graph: &LogicGraph) -> Vec<LocationId> {
        graph
            .checks
            .iter()
            .zip(self.checks.iter())
            .filter(|(_, r)| !**r)
            .map(|(c, _)| c.id.clone())
            .collect()
    }
}

/// Computes the maximal set of nodes and checks reachable from `starts`.
///
/// Runs full passes over the reached nodes in index order until a pass adds no
/// node, check, or flag. While visiting a node the state's current zone is set
/// to the node's zone, its side-effect flags are merged in, reached checks are
/// collected, and path and exit edges whose gates hold are followed.
pub fn reach(cx: &ReachContext, starts: &[NodeIdx], state: &SimulatedState) -> Result<ReachResult> {
    let graph = cx.graph;
    let mut state = state.clone();
    let mut nodes = vec![false; graph.nodes.len()];
    let mut checks = vec![false; graph.checks.len()];
    for &s in starts {
        nodes[s] = true;
    }

    let mut passes = 0;
    loop {
        passes += 1;
        if passes > MAX_REACH_PASSES {
            bail!("Reachability did not settle after {MAX_REACH_PASSES} passes");
        }
        let mut changed = false;
        for idx in 0..graph.nodes.len() {
            if !nodes[idx] {
                continue;
            }
            let node = &graph.nodes[idx];
            if state.current_zone() != Some(node.zone.as_str()) {
                state.current_zone = Some(node.zone.clone());
            }

            if cx.mode == ReachMode::Logical {
                for f in &node.flags {
                    if !state.has_flag(&f.flag) && cx.holds(&f.requirement, &state) {
                        state.set_flag(&f.flag, FlagValue::Bool(true));
                        changed = true;
                    }
                }
            }

            for &c in &node.checks {
                if !checks[c] && cx.holds(&graph.checks[c].requirement, &state) {
                    checks[c] = true;
                    changed = true;
                    if cx.mode == ReachMode::Logical {
                        cx.collect_check(c, &mut state);
                    }
                }
            }

            for edge in &node.paths {
                if nodes[edge.to] || !cx.holds(&edge.requirement, &state) {
                    continue;
                }
                if let Some(d) = edge.door {
                    if !cx.door_open(d, &state) {
                        continue;
                    }
                }
                nodes[edge.to] = true;
                changed = true;
            }

            for exit in &node.exits {
                if let Some(target) = graph.exit_target(cx.connections, &exit.id) {
                    if !nodes[target] && cx.holds(&exit.requirement, &state) {
                        nodes[target] = true;
                        changed = true;
                    }
                }
            }
        }
        if !changed {
            break;
        }
    }

    Ok(ReachResult {
        nodes,
        checks,
        state,
        passes,
    })
}
