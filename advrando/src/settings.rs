use std::collections::BTreeMap;

use advrando_game::ItemId;
use advrando_logic::{Flag, FlagValue, SaveStateView, SimulatedState, ZoneId};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RandomizerSettings {
    #[serde(default = "default_version")]
    pub version: usize,
    pub name: Option<String>,
    #[serde(default)]
    pub seeds: SeedSettings,
    pub item_pool: Vec<PoolEntry>,
    #[serde(default = "default_filler_item")]
    pub filler_item: ItemId,
    #[serde(default)]
    pub starting_state: StartingState,
    #[serde(default)]
    pub item_progression_settings: ItemProgressionSettings,
    #[serde(default)]
    pub entrance_settings: EntranceSettings,
    #[serde(default)]
    pub debug: bool,
}

fn default_version() -> usize {
    1
}

fn default_filler_item() -> ItemId {
    "Nothing".to_string()
}

/// Independent seeds per randomization category. A missing seed leaves that
/// category with its default content.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SeedSettings {
    pub items: Option<u64>,
    pub enemies: Option<u64>,
    pub entrances: Option<u64>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ItemClass {
    Progression,
    Filler,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PoolEntry {
    pub item: ItemId,
    pub class: ItemClass,
    #[serde(default = "default_count")]
    pub count: usize,
}

fn default_count() -> usize {
    1
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct StartingState {
    #[serde(default)]
    pub flags: BTreeMap<Flag, FlagValue>,
    pub zone: Option<ZoneId>,
}

impl SaveStateView for StartingState {
    fn flags(&self) -> Vec<(Flag, FlagValue)> {
        self.flags
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn current_zone(&self) -> Option<ZoneId> {
        self.zone.clone()
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ItemProgressionSettings {
    #[serde(default = "default_item_attempts")]
    pub max_attempts: usize,
    #[serde(default = "default_max_deferrals")]
    pub max_deferrals: usize,
}

fn default_item_attempts() -> usize {
    5
}

fn default_max_deferrals() -> usize {
    100
}

impl Default for ItemProgressionSettings {
    fn default() -> Self {
        ItemProgressionSettings {
            max_attempts: default_item_attempts(),
            max_deferrals: default_max_deferrals(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct EntranceSettings {
    #[serde(default = "default_entrance_attempts")]
    pub max_attempts: usize,
    #[serde(default = "default_true")]
    pub require_logical_completion: bool,
}

fn default_entrance_attempts() -> usize {
    200
}

fn default_true() -> bool {
    true
}

impl Default for EntranceSettings {
    fn default() -> Self {
        EntranceSettings {
            max_attempts: default_entrance_attempts(),
            require_logical_completion: true,
        }
    }
}

impl RandomizerSettings {
    /// Baseline state captured from the configured starting save.
    pub fn start_state(&self) -> SimulatedState {
        SimulatedState::capture(&self.starting_state)
    }

    /// Item names expanded to one entry per copy, in declaration order.
    pub fn expanded_pool(&self, class: ItemClass) -> Vec<ItemId> {
        let mut out = vec![];
        for entry in &self.item_pool {
            if entry.class == class {
                for _ in 0..entry.count {
                    out.push(entry.item.clone());
                }
            }
        }
        out
    }

    /// Starting state plus every item in the pool.
    pub fn everything_held(&self) -> SimulatedState {
        let mut state = self.start_state();
        for entry in &self.item_pool {
            for _ in 0..entry.count {
                state.collect(&entry.item);
            }
        }
        state
    }
}

pub fn parse_randomizer_settings(settings_json: &str) -> Result<RandomizerSettings> {
    let mut des = serde_json::Deserializer::from_str(settings_json);
    let settings = serde_path_to_error::deserialize(&mut des)?;
    Ok(settings)
}

pub fn load_randomizer_settings(path: &std::path::Path) -> Result<RandomizerSettings> {
    let settings_str = std::fs::read_to_string(path)
        .with_context(|| format!("Unable to read settings file at {}", path.display()))?;
    parse_randomizer_settings(&settings_str)
        .with_context(|| format!("Unable to parse settings file at {}", path.display()))
}
