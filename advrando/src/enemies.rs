use std::collections::BTreeMap;

use advrando_game::LogicGraph;
use advrando_logic::SeedRng;
use log::info;

pub type EnemyMap = BTreeMap<String, String>; // spawn id -> enemy kind

/// Permutes enemy kinds among the spawns of each group. Groups are visited in
/// name order so the result depends only on the seed and the spawn list.
pub fn randomize_enemies(graph: &LogicGraph, seed: u64) -> EnemyMap {
    let mut groups: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (i, spawn) in graph.enemies.iter().enumerate() {
        groups.entry(spawn.group.as_str()).or_default().push(i);
    }

    let mut rng = SeedRng::new(seed);
    let mut out = EnemyMap::new();
    for spawns in groups.values() {
        let kinds: Vec<&str> = spawns
            .iter()
            .map(|&i| graph.enemies[i].kind.as_str())
            .collect();
        let (kinds, next_rng) = rng.shuffle(kinds);
        rng = next_rng;
        for (&i, kind) in spawns.iter().zip(kinds) {
            out.insert(graph.enemies[i].id.clone(), kind.to_string());
        }
    }
    info!(
        "Shuffled {} enemy spawns across {} groups",
        out.len(),
        groups.len()
    );
    out
}
