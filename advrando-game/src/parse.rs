use crate::{
    CheckKind, CheckLocation, DoorIdx, DoorLock, Edge, EnemySpawn, EntranceConflict, Exit,
    LinkType, LockedDoor, LogicGraph, LogicNode, NodeFlag, NodeIdx,
};
use advrando_logic::LogicPredicate;
use anyhow::{bail, ensure, Context, Result};
use hashbrown::HashSet;
use json::JsonValue;
use log::warn;
use std::str::FromStr;

/// Parses a predicate from its JSON form. A missing (`null`) predicate is free.
pub fn parse_predicate(json: &JsonValue) -> Result<LogicPredicate> {
    if json.is_null() {
        return Ok(LogicPredicate::free());
    }
    if let Some(b) = json.as_bool() {
        return Ok(LogicPredicate::Always(b));
    }
    if let Some(flag) = json.as_str() {
        return Ok(LogicPredicate::requires(&[flag]));
    }
    if json.is_array() {
        return Ok(LogicPredicate::make_and(parse_predicate_list(json)?));
    }
    if json.is_object() && json.len() == 1 {
        let (key, value) = json
            .entries()
            .next()
            .context("empty predicate object")?;
        if key == "and" {
            ensure!(value.is_array(), "'and' expects a list: {}", json);
            return Ok(LogicPredicate::make_and(parse_predicate_list(value)?));
        } else if key == "or" {
            ensure!(value.is_array(), "'or' expects a list: {}", json);
            return Ok(LogicPredicate::make_or(parse_predicate_list(value)?));
        } else if key == "not" {
            return Ok(LogicPredicate::excludes(&parse_string_list(value)?));
        } else if key == "inZone" {
            return Ok(LogicPredicate::in_zones(&parse_string_list(value)?));
        } else if key == "simple" {
            return Ok(LogicPredicate::Simple {
                required: parse_string_list(&value["required"])?.into_iter().collect(),
                excluded: parse_string_list(&value["excluded"])?.into_iter().collect(),
                zones: parse_string_list(&value["zones"])?.into_iter().collect(),
            });
        }
    }
    bail!("Unrecognized predicate: {}", json)
}

fn parse_predicate_list(json: &JsonValue) -> Result<Vec<LogicPredicate>> {
    json.members().map(parse_predicate).collect()
}

// Accepts a single string or a list of strings; null is an empty list.
fn parse_string_list(json: &JsonValue) -> Result<Vec<String>> {
    if json.is_null() {
        return Ok(vec![]);
    }
    if let Some(s) = json.as_str() {
        return Ok(vec![s.to_string()]);
    }
    ensure!(json.is_array(), "expected a string or list of strings: {}", json);
    let mut out = vec![];
    for x in json.members() {
        out.push(
            x.as_str()
                .with_context(|| format!("expected a string: {x}"))?
                .to_string(),
        );
    }
    Ok(out)
}

fn required_str<'a>(json: &'a JsonValue, key: &str) -> Result<&'a str> {
    json[key]
        .as_str()
        .with_context(|| format!("missing/invalid '{key}' in {json}"))
}

fn optional_string(json: &JsonValue, key: &str) -> Option<String> {
    json[key].as_str().map(|s| s.to_string())
}

// Paths and exit targets may point forward into zones not yet read, so they are
// resolved after every node has been registered.
struct PendingPath {
    from: NodeIdx,
    to: String,
    requirement: LogicPredicate,
    door: Option<String>,
}

struct PendingExit {
    exit_id: String,
    to: String,
}

impl LogicGraph {
    /// Builds the graph from an already-parsed `world.json` and the per-zone files.
    pub fn parse(world_json: &JsonValue, zone_jsons: &[JsonValue]) -> Result<LogicGraph> {
        let mut graph = LogicGraph::default();
        graph.load_doors(world_json).context("Processing doors")?;

        let mut pending_paths = vec![];
        let mut pending_exits = vec![];
        for zone_json in zone_jsons {
            let zone = required_str(zone_json, "zone")?.to_string();
            graph
                .process_zone(&zone, zone_json, &mut pending_paths, &mut pending_exits)
                .with_context(|| format!("Processing zone {zone}"))?;
        }

        graph.resolve_paths(pending_paths)?;
        graph.resolve_exits(pending_exits)?;
        graph.load_roots(world_json)?;
        graph.load_enemies(world_json).context("Processing enemies")?;
        graph.validate()?;
        Ok(graph)
    }

    fn load_doors(&mut self, world_json: &JsonValue) -> Result<()> {
        for door_json in world_json["doors"].members() {
            let id = required_str(door_json, "id")?;
            let zone = required_str(door_json, "zone")?;
            let lock_json = &door_json["lock"];
            let lock = if lock_json.as_str() == Some("smallKey") {
                DoorLock::SmallKey
            } else if let Some(flag) = lock_json["flag"].as_str() {
                DoorLock::Flag(flag.to_string())
            } else {
                bail!("Unrecognized lock for door {id}: {lock_json}");
            };
            ensure!(
                !self.door_isv.index_by_key.contains_key(id),
                "Duplicate door id {id}"
            );
            self.door_isv.add(id);
            self.doors.push(LockedDoor {
                id: id.to_string(),
                zone: zone.to_string(),
                lock,
                requirement: None,
            });
            self.door_sources.push(vec![]);
        }
        Ok(())
    }

    fn process_zone(
        &mut self,
        zone: &str,
        zone_json: &JsonValue,
        pending_paths: &mut Vec<PendingPath>,
        pending_exits: &mut Vec<PendingExit>,
    ) -> Result<()> {
        ensure!(zone_json["nodes"].is_array(), "missing node list");
        for node_json in zone_json["nodes"].members() {
            let node_id = required_str(node_json, "id")?;
            self.process_node(zone, node_json, pending_paths, pending_exits)
                .with_context(|| format!("Processing node {node_id}"))?;
        }
        Ok(())
    }

    fn process_node(
        &mut self,
        zone: &str,
        node_json: &JsonValue,
        pending_paths: &mut Vec<PendingPath>,
        pending_exits: &mut Vec<PendingExit>,
    ) -> Result<()> {
        let node_id = required_str(node_json, "id")?;
        ensure!(
            !self.node_isv.index_by_key.contains_key(node_id),
            "Duplicate node id {node_id}"
        );
        let node_idx = self.node_isv.add(node_id);
        let mut node = LogicNode {
            id: node_id.to_string(),
            zone: zone.to_string(),
            checks: vec![],
            paths: vec![],
            entrances: vec![],
            exits: vec![],
            flags: vec![],
        };

        for check_json in node_json["checks"].members() {
            let kind = if check_json["keyDrop"].as_bool().unwrap_or(false) {
                CheckKind::KeyDrop
            } else {
                CheckKind::Item
            };
            let check_idx = self.add_check(node_idx, zone, check_json, kind)?;
            node.checks.push(check_idx);
        }
        for npc_json in node_json["npcs"].members() {
            let flag = required_str(npc_json, "flag")?.to_string();
            let check_idx = self.add_check(node_idx, zone, npc_json, CheckKind::Npc { flag })?;
            node.checks.push(check_idx);
        }

        for path_json in node_json["paths"].members() {
            pending_paths.push(PendingPath {
                from: node_idx,
                to: required_str(path_json, "to")?.to_string(),
                requirement: parse_predicate(&path_json["requires"])
                    .with_context(|| format!("Parsing path requirement {path_json}"))?,
                door: optional_string(path_json, "door"),
            });
        }

        for entrance_json in node_json["entrances"].members() {
            let entrance = entrance_json
                .as_str()
                .with_context(|| format!("invalid entrance id {entrance_json}"))?;
            if let Some(&owner) = self.entrance_owner.get(entrance) {
                let owner_id = self.node_isv.keys[owner].clone();
                warn!(
                    "Duplicate entrance {entrance}: declared by {owner_id} and {node_id}; keeping {owner_id}"
                );
                self.entrance_conflicts.push(EntranceConflict {
                    entrance: entrance.to_string(),
                    owner: owner_id,
                    duplicate: node_id.to_string(),
                });
                continue;
            }
            self.entrance_owner.insert(entrance.to_string(), node_idx);
            node.entrances.push(entrance.to_string());
        }

        for exit_json in node_json["exits"].members() {
            let exit_id = required_str(exit_json, "id")?;
            ensure!(
                !self.exit_owner.contains_key(exit_id),
                "Duplicate exit id {exit_id}"
            );
            let link_str = exit_json["link"].as_str().unwrap_or("oneWay");
            let link = LinkType::from_str(link_str)
                .map_err(|_| anyhow::anyhow!("Unrecognized link type {link_str} on exit {exit_id}"))?;
            let entrance = optional_string(exit_json, "entrance");
            if link == LinkType::TwoWay {
                ensure!(
                    entrance.is_some(),
                    "Two-way exit {exit_id} has no arrival entrance"
                );
            }
            self.exit_owner
                .insert(exit_id.to_string(), (node_idx, node.exits.len()));
            node.exits.push(Exit {
                id: exit_id.to_string(),
                link,
                entrance,
                requirement: parse_predicate(&exit_json["requires"])
                    .with_context(|| format!("Parsing exit requirement {exit_json}"))?,
                randomizable: exit_json["randomizable"].as_bool().unwrap_or(false),
            });
            pending_exits.push(PendingExit {
                exit_id: exit_id.to_string(),
                to: required_str(exit_json, "to")?.to_string(),
            });
        }

        for flag_json in node_json["flags"].members() {
            node.flags.push(NodeFlag {
                flag: required_str(flag_json, "flag")?.to_string(),
                requirement: parse_predicate(&flag_json["requires"])
                    .with_context(|| format!("Parsing flag requirement {flag_json}"))?,
            });
        }

        self.nodes.push(node);
        Ok(())
    }

    fn add_check(
        &mut self,
        node_idx: NodeIdx,
        zone: &str,
        check_json: &JsonValue,
        kind: CheckKind,
    ) -> Result<usize> {
        let location = required_str(check_json, "location")?;
        ensure!(
            !self.check_isv.index_by_key.contains_key(location),
            "Duplicate check location {location}"
        );
        let check_idx = self.check_isv.add(location);
        self.checks.push(CheckLocation {
            id: location.to_string(),
            node: node_idx,
            zone: zone.to_string(),
            requirement: parse_predicate(&check_json["requires"])
                .with_context(|| format!("Parsing requirement of check {location}"))?,
            kind,
            vanilla_item: optional_string(check_json, "vanillaItem"),
        });
        Ok(check_idx)
    }

    fn resolve_paths(&mut self, pending_paths: Vec<PendingPath>) -> Result<()> {
        for path in pending_paths {
            let from_id = self.node_isv.keys[path.from].clone();
            let to = self
                .node_idx(&path.to)
                .with_context(|| format!("Unknown path target {} from node {from_id}", path.to))?;
            let door: Option<DoorIdx> = match &path.door {
                Some(door_id) => Some(
                    self.door_idx(door_id)
                        .with_context(|| format!("Unknown door {door_id} on path from {from_id}"))?,
                ),
                None => None,
            };
            if let Some(d) = door {
                if !self.door_sources[d].contains(&path.from) {
                    self.door_sources[d].push(path.from);
                }
            }
            self.nodes[path.from].paths.push(Edge {
                to,
                requirement: path.requirement,
                door,
            });
        }
        Ok(())
    }

    fn resolve_exits(&mut self, pending_exits: Vec<PendingExit>) -> Result<()> {
        for exit in pending_exits {
            ensure!(
                self.entrance_owner.contains_key(&exit.to),
                "Exit {} leads to unknown entrance {}",
                exit.exit_id,
                exit.to
            );
            self.vanilla_connections.insert(exit.exit_id, exit.to);
        }
        for node in &self.nodes {
            for exit in &node.exits {
                if let Some(entrance) = &exit.entrance {
                    ensure!(
                        self.entrance_owner.get(entrance) == self.node_isv.index_by_key.get(&node.id),
                        "Arrival entrance {entrance} of exit {} is not owned by node {}",
                        exit.id,
                        node.id
                    );
                }
            }
        }
        Ok(())
    }

    fn load_roots(&mut self, world_json: &JsonValue) -> Result<()> {
        ensure!(world_json["roots"].is_array(), "world.json is missing 'roots'");
        for root_json in world_json["roots"].members() {
            let root = root_json
                .as_str()
                .with_context(|| format!("invalid root {root_json}"))?;
            let idx = self
                .node_idx(root)
                .with_context(|| format!("Unknown root node {root}"))?;
            self.roots.push(idx);
        }
        ensure!(!self.roots.is_empty(), "world.json declares no roots");
        Ok(())
    }

    fn load_enemies(&mut self, world_json: &JsonValue) -> Result<()> {
        let mut seen: HashSet<String> = HashSet::new();
        for enemy_json in world_json["enemies"].members() {
            let id = required_str(enemy_json, "id")?;
            ensure!(seen.insert(id.to_string()), "Duplicate enemy spawn {id}");
            let kind = required_str(enemy_json, "kind")?;
            self.enemies.push(EnemySpawn {
                id: id.to_string(),
                zone: required_str(enemy_json, "zone")?.to_string(),
                kind: kind.to_string(),
                group: optional_string(enemy_json, "group").unwrap_or_else(|| kind.to_string()),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use advrando_logic::{evaluate, FlagValue, SimulatedState};

    fn state_with(flags: &[&str]) -> SimulatedState {
        let mut state = SimulatedState::new();
        for f in flags {
            state.set_flag(f, FlagValue::Bool(true));
        }
        state
    }

    #[test]
    fn parse_predicate_forms() -> Result<()> {
        assert!(parse_predicate(&JsonValue::Null)?.is_free());
        assert!(matches!(
            parse_predicate(&json::parse("false")?)?,
            LogicPredicate::Always(false)
        ));

        let pred = parse_predicate(&json::parse(r#"{"and": ["Bow", {"or": ["Lamp", "Torch"]}]}"#)?)?;
        assert!(!evaluate(&pred, &state_with(&["Bow"])));
        assert!(evaluate(&pred, &state_with(&["Bow", "Torch"])));

        let pred = parse_predicate(&json::parse(r#"{"not": "Cursed"}"#)?)?;
        assert!(evaluate(&pred, &state_with(&[])));
        assert!(!evaluate(&pred, &state_with(&["Cursed"])));

        let pred = parse_predicate(&json::parse(r#"{"inZone": ["castle"]}"#)?)?;
        assert!(evaluate(&pred, &state_with(&[]).with_zone("castle")));
        assert!(!evaluate(&pred, &state_with(&[]).with_zone("field")));

        let pred = parse_predicate(&json::parse(
            r#"{"simple": {"required": ["Bow"], "excluded": ["Cursed"], "zones": ["cave"]}}"#,
        )?)?;
        assert!(evaluate(&pred, &state_with(&["Bow"]).with_zone("cave")));
        assert!(!evaluate(&pred, &state_with(&["Bow", "Cursed"]).with_zone("cave")));

        assert!(parse_predicate(&json::parse(r#"{"xor": []}"#)?).is_err());
        assert!(parse_predicate(&json::parse("12")?).is_err());
        Ok(())
    }

    const WORLD: &str = r#"{
        "roots": ["town"],
        "doors": [{"id": "cellar_door", "zone": "field", "lock": {"flag": "CellarKey"}}],
        "enemies": [
            {"id": "e1", "zone": "field", "kind": "Slime", "group": "small"},
            {"id": "e2", "zone": "field", "kind": "Bat", "group": "small"}
        ]
    }"#;

    const FIELD: &str = r#"{
        "zone": "field",
        "nodes": [
            {
                "id": "town",
                "checks": [{"location": "town_chest", "vanillaItem": "Bow"}],
                "npcs": [{"location": "elder", "flag": "talked_to_elder", "requires": "Bow"}],
                "paths": [{"to": "cellar", "door": "cellar_door"}],
                "entrances": ["town_gate"],
                "exits": [{"id": "town_to_cave", "to": "cave_mouth", "link": "twoWay", "entrance": "town_gate"}]
            },
            {
                "id": "cellar",
                "paths": [{"to": "town"}],
                "flags": [{"flag": "cellar_lit", "requires": "Lamp"}]
            }
        ]
    }"#;

    const CAVE: &str = r#"{
        "zone": "cave",
        "nodes": [
            {
                "id": "cave_entry",
                "entrances": ["cave_mouth"],
                "exits": [{"id": "cave_to_town", "to": "town_gate", "link": "twoWay", "entrance": "cave_mouth"}],
                "checks": [{"location": "cave_key", "keyDrop": true}]
            }
        ]
    }"#;

    fn parse_graph(world: &str, zones: &[&str]) -> Result<LogicGraph> {
        let zone_jsons = zones
            .iter()
            .map(|z| json::parse(z))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        LogicGraph::parse(&json::parse(world)?, &zone_jsons)
    }

    #[test]
    fn parse_small_world() -> Result<()> {
        let graph = parse_graph(WORLD, &[FIELD, CAVE])?;
        assert_eq!(graph.nodes.len(), 3);
        assert_eq!(graph.roots, vec![0]);
        assert_eq!(graph.checks.len(), 3);
        assert_eq!(
            graph.checks[graph.check_idx("elder").unwrap()].kind,
            CheckKind::Npc {
                flag: "talked_to_elder".to_string()
            }
        );
        assert!(graph.checks[graph.check_idx("cave_key").unwrap()].is_key_drop());
        assert_eq!(graph.open_checks().len(), 2);
        assert_eq!(graph.key_drops("cave").len(), 1);

        let cellar_door = graph.door_idx("cellar_door").unwrap();
        assert_eq!(graph.doors[cellar_door].lock, DoorLock::Flag("CellarKey".to_string()));
        assert_eq!(graph.door_sources[cellar_door], vec![graph.node_idx("town").unwrap()]);

        assert_eq!(
            graph.vanilla_connections.get("town_to_cave").map(|s| s.as_str()),
            Some("cave_mouth")
        );
        assert_eq!(
            graph.exit_target(&graph.vanilla_connections, "cave_to_town"),
            graph.node_idx("town")
        );
        assert_eq!(graph.exit("town_to_cave").unwrap().link, LinkType::TwoWay);
        assert_eq!(graph.enemies.len(), 2);
        assert!(graph.entrance_conflicts.is_empty());
        Ok(())
    }

    #[test]
    fn unknown_path_target_is_an_error() {
        let zone = r#"{"zone": "field", "nodes": [{"id": "town", "paths": [{"to": "nowhere"}]}]}"#;
        let err = parse_graph(r#"{"roots": ["town"]}"#, &[zone]).unwrap_err();
        assert!(format!("{err:#}").contains("Unknown path target nowhere"));
    }

    #[test]
    fn duplicate_node_is_an_error() {
        let zone = r#"{"zone": "field", "nodes": [{"id": "town"}, {"id": "town"}]}"#;
        let err = parse_graph(r#"{"roots": ["town"]}"#, &[zone]).unwrap_err();
        assert!(format!("{err:#}").contains("Duplicate node id town"));
    }

    #[test]
    fn duplicate_entrance_keeps_first_owner() -> Result<()> {
        let zone = r#"{"zone": "field", "nodes": [
            {"id": "a", "entrances": ["gate"], "paths": [{"to": "b"}]},
            {"id": "b", "entrances": ["gate"], "paths": [{"to": "a"}]}
        ]}"#;
        let graph = parse_graph(r#"{"roots": ["a"]}"#, &[zone])?;
        assert_eq!(graph.entrance_owner.get("gate").copied(), graph.node_idx("a"));
        assert_eq!(
            graph.entrance_conflicts,
            vec![EntranceConflict {
                entrance: "gate".to_string(),
                owner: "a".to_string(),
                duplicate: "b".to_string(),
            }]
        );
        Ok(())
    }
}
