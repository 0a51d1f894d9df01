pub mod parse;
pub mod validate;

use advrando_logic::{LogicPredicate, ZoneId};
use anyhow::{Context, Result};
use hashbrown::HashMap;
use json::JsonValue;
use log::info;
use serde::{Deserialize, Serialize};
use std::borrow::ToOwned;
use std::collections::BTreeMap;
use std::fs::File;
use std::hash::Hash;
use std::path::Path;
use strum_macros::{Display, EnumString};

pub use parse::parse_predicate;

pub type NodeId = String; // Node identifier from the zone files, unique within the graph
pub type NodeIdx = usize; // Index into LogicGraph.nodes
pub type CheckIdx = usize; // Index into LogicGraph.checks (item checks and NPC rewards)
pub type DoorIdx = usize; // Index into LogicGraph.doors
pub type LocationId = String;
pub type ItemId = String;
pub type ExitId = String;
pub type EntranceId = String;
pub type ConnectionMap = BTreeMap<ExitId, EntranceId>; // exit -> entrance it leads to

#[derive(Default, Clone, Debug)]
pub struct IndexedVec<T: Hash + Eq> {
    pub keys: Vec<T>,
    pub index_by_key: HashMap<T, usize>,
}

impl<T: Hash + Eq> IndexedVec<T> {
    pub fn add<U: ToOwned<Owned = T> + ?Sized>(&mut self, name: &U) -> usize {
        if !self.index_by_key.contains_key(&name.to_owned()) {
            let idx = self.keys.len();
            self.index_by_key.insert(name.to_owned(), self.keys.len());
            self.keys.push(name.to_owned());
            idx
        } else {
            self.index_by_key[&name.to_owned()]
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, EnumString, Display, Serialize, Deserialize)]
#[strum(serialize_all = "camelCase")]
#[serde(rename_all = "camelCase")]
pub enum LinkType {
    OneWay,
    TwoWay,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DoorLock {
    SmallKey,
    Flag(String),
}

#[derive(Clone, Debug)]
pub struct LockedDoor {
    pub id: String,
    pub zone: ZoneId,
    pub lock: DoorLock,
    // Synthesized by key logic; replaces the default lock rule when present.
    pub requirement: Option<LogicPredicate>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CheckKind {
    Item,
    Npc { flag: String },
    KeyDrop,
}

#[derive(Clone, Debug)]
pub struct CheckLocation {
    pub id: LocationId,
    pub node: NodeIdx,
    pub zone: ZoneId,
    pub requirement: LogicPredicate,
    pub kind: CheckKind,
    pub vanilla_item: Option<ItemId>,
}

impl CheckLocation {
    pub fn is_key_drop(&self) -> bool {
        self.kind == CheckKind::KeyDrop
    }
}

#[derive(Clone, Debug)]
pub struct Edge {
    pub to: NodeIdx,
    pub requirement: LogicPredicate,
    pub door: Option<DoorIdx>,
}

#[derive(Clone, Debug)]
pub struct Exit {
    pub id: ExitId,
    pub link: LinkType,
    // Arrival entrance of the same doorway, used for the reverse trip of a two-way link.
    pub entrance: Option<EntranceId>,
    pub requirement: LogicPredicate,
    pub randomizable: bool,
}

#[derive(Clone, Debug)]
pub struct NodeFlag {
    pub flag: String,
    pub requirement: LogicPredicate,
}

#[derive(Clone, Debug)]
pub struct LogicNode {
    pub id: NodeId,
    pub zone: ZoneId,
    pub checks: Vec<CheckIdx>,
    pub paths: Vec<Edge>,
    pub entrances: Vec<EntranceId>,
    pub exits: Vec<Exit>,
    pub flags: Vec<NodeFlag>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnemySpawn {
    pub id: String,
    pub zone: ZoneId,
    pub kind: String,
    pub group: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntranceConflict {
    pub entrance: EntranceId,
    pub owner: NodeId,
    pub duplicate: NodeId,
}

/// The world graph consumed by the randomizer. Built once from data and never
/// mutated by reachability; key logic is the only pass that writes into it.
#[derive(Default, Clone, Debug)]
pub struct LogicGraph {
    pub nodes: Vec<LogicNode>,
    pub node_isv: IndexedVec<NodeId>,
    pub roots: Vec<NodeIdx>,
    pub checks: Vec<CheckLocation>,
    pub check_isv: IndexedVec<LocationId>,
    pub doors: Vec<LockedDoor>,
    pub door_isv: IndexedVec<String>,
    pub door_sources: Vec<Vec<NodeIdx>>, // nodes with a path through each door
    pub entrance_owner: HashMap<EntranceId, NodeIdx>,
    pub exit_owner: HashMap<ExitId, (NodeIdx, usize)>, // (node, index into node.exits)
    pub vanilla_connections: ConnectionMap,
    pub enemies: Vec<EnemySpawn>,
    pub entrance_conflicts: Vec<EntranceConflict>,
}

pub fn small_key_item(zone: &str) -> ItemId {
    format!("SmallKey({zone})")
}

fn read_json(path: &Path) -> Result<JsonValue> {
    let file = File::open(path).with_context(|| format!("unable to open {}", path.display()))?;
    let json_str = std::io::read_to_string(file)
        .with_context(|| format!("unable to read {}", path.display()))?;
    let json_data =
        json::parse(&json_str).with_context(|| format!("unable to parse {}", path.display()))?;
    Ok(json_data)
}

impl LogicGraph {
    /// Loads `world.json` and every `zones/*.json` file under `dir`.
    pub fn load(dir: &Path) -> Result<LogicGraph> {
        let world_json = read_json(&dir.join("world.json"))?;
        let zone_pattern = dir.join("zones").join("*.json");
        let zone_pattern_str = zone_pattern
            .to_str()
            .with_context(|| format!("Unable to convert path to string: {}", zone_pattern.display()))?;
        let mut zone_paths = vec![];
        for entry in glob::glob(zone_pattern_str)? {
            zone_paths.push(entry.context("Error processing zone path")?);
        }
        // glob yields alphabetical order, but sort anyway so node indices never depend on the platform.
        zone_paths.sort();
        let mut zone_jsons = vec![];
        for path in &zone_paths {
            zone_jsons.push(read_json(path)?);
        }
        let graph = LogicGraph::parse(&world_json, &zone_jsons)
            .with_context(|| format!("Loading world graph from {}", dir.display()))?;
        info!(
            "Loaded world graph: {} zones, {} nodes, {} checks, {} doors",
            zone_jsons.len(),
            graph.nodes.len(),
            graph.checks.len(),
            graph.doors.len()
        );
        Ok(graph)
    }

    pub fn node_idx(&self, id: &str) -> Option<NodeIdx> {
        self.node_isv.index_by_key.get(id).copied()
    }

    pub fn check_idx(&self, location: &str) -> Option<CheckIdx> {
        self.check_isv.index_by_key.get(location).copied()
    }

    pub fn door_idx(&self, id: &str) -> Option<DoorIdx> {
        self.door_isv.index_by_key.get(id).copied()
    }

    pub fn exit(&self, id: &str) -> Option<&Exit> {
        let &(node_idx, exit_idx) = self.exit_owner.get(id)?;
        self.nodes[node_idx].exits.get(exit_idx)
    }

    /// Checks that take part in item placement (everything except key drops).
    pub fn open_checks(&self) -> Vec<CheckIdx> {
        (0..self.checks.len())
            .filter(|&i| !self.checks[i].is_key_drop())
            .collect()
    }

    pub fn key_drops(&self, zone: &str) -> Vec<CheckIdx> {
        (0..self.checks.len())
            .filter(|&i| self.checks[i].is_key_drop() && self.checks[i].zone == zone)
            .collect()
    }

    /// Zones owning at least one small-key door, sorted.
    pub fn key_zones(&self) -> Vec<ZoneId> {
        let mut zones: Vec<ZoneId> = self
            .doors
            .iter()
            .filter(|d| d.lock == DoorLock::SmallKey)
            .map(|d| d.zone.clone())
            .collect();
        zones.sort();
        zones.dedup();
        zones
    }

    pub fn small_key_doors(&self, zone: &str) -> Vec<DoorIdx> {
        (0..self.doors.len())
            .filter(|&i| self.doors[i].lock == DoorLock::SmallKey && self.doors[i].zone == zone)
            .collect()
    }

    /// Node reached by taking `exit` under the given connections.
    pub fn exit_target(&self, connections: &ConnectionMap, exit: &str) -> Option<NodeIdx> {
        let entrance = connections.get(exit)?;
        self.entrance_owner.get(entrance).copied()
    }
}
