pub mod predicate;
pub mod rng;

pub use predicate::{evaluate, CustomPredicate, LogicPredicate};
pub use rng::SeedRng;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

pub type Flag = String; // Flag or item name, e.g. "Bow" or "talked_to_sage"
pub type ZoneId = String; // Zone identifier from the world data, e.g. "castle"
pub type ItemCount = i64;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlagValue {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl FlagValue {
    pub fn is_set(&self) -> bool {
        match self {
            FlagValue::Bool(b) => *b,
            FlagValue::Int(x) => *x != 0,
            FlagValue::Text(s) => !s.is_empty(),
        }
    }
}

impl From<bool> for FlagValue {
    fn from(value: bool) -> Self {
        FlagValue::Bool(value)
    }
}

/// Read-only view of the live game's save state. The engine only ever sees the
/// flags, current zone and key counters exposed here.
pub trait SaveStateView {
    fn flags(&self) -> Vec<(Flag, FlagValue)>;

    fn current_zone(&self) -> Option<ZoneId>;

    fn key_counts(&self) -> Vec<(ZoneId, u32)> {
        vec![]
    }
}

/// Reduced copy of the game state used as evaluation input. Items are held as
/// integer flags (one count per copy collected); small keys are counted per dungeon zone.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulatedState {
    pub flags: HashMap<Flag, FlagValue>,
    pub current_zone: Option<ZoneId>,
    pub keys: HashMap<ZoneId, u32>,
}

impl SimulatedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn capture(view: &dyn SaveStateView) -> Self {
        let mut state = SimulatedState::new();
        for (flag, value) in view.flags() {
            state.flags.insert(flag, value);
        }
        for (zone, count) in view.key_counts() {
            state.keys.insert(zone, count);
        }
        state.current_zone = view.current_zone();
        state
    }

    pub fn has_flag(&self, key: &str) -> bool {
        match self.flags.get(key) {
            Some(value) => value.is_set(),
            None => false,
        }
    }

    pub fn flag(&self, key: &str) -> Option<&FlagValue> {
        self.flags.get(key)
    }

    /// Sets a flag, returning true if this changed whether the flag is held.
    pub fn set_flag(&mut self, key: &str, value: FlagValue) -> bool {
        let was_set = self.has_flag(key);
        let now_set = value.is_set();
        self.flags.insert(key.to_string(), value);
        was_set != now_set
    }

    pub fn with_flag(&self, key: &str, value: FlagValue) -> Self {
        let mut out = self.clone();
        out.set_flag(key, value);
        out
    }

    pub fn current_zone(&self) -> Option<&str> {
        self.current_zone.as_deref()
    }

    pub fn with_zone(&self, zone: &str) -> Self {
        let mut out = self.clone();
        out.current_zone = Some(zone.to_string());
        out
    }

    pub fn item_count(&self, item: &str) -> ItemCount {
        match self.flags.get(item) {
            Some(FlagValue::Int(x)) => *x,
            Some(value) => value.is_set() as ItemCount,
            None => 0,
        }
    }

    /// Adds one copy of an item. Returns true if the item was not held before.
    pub fn collect(&mut self, item: &str) -> bool {
        let count = self.item_count(item);
        self.flags
            .insert(item.to_string(), FlagValue::Int(count + 1));
        count == 0
    }

    /// Un-holds one copy of an item.
    pub fn remove_item(&mut self, item: &str) {
        let count = self.item_count(item);
        if count <= 1 {
            self.flags.remove(item);
        } else {
            self.flags.insert(item.to_string(), FlagValue::Int(count - 1));
        }
    }

    pub fn key_count(&self, zone: &str) -> u32 {
        self.keys.get(zone).copied().unwrap_or(0)
    }

    pub fn add_key(&mut self, zone: &str) {
        *self.keys.entry(zone.to_string()).or_insert(0) += 1;
    }

    pub fn set_key_count(&mut self, zone: &str, count: u32) {
        self.keys.insert(zone.to_string(), count);
    }

    /// Names of all held flags, sorted.
    pub fn held_flags(&self) -> Vec<&str> {
        let mut out: Vec<&str> = self
            .flags
            .iter()
            .filter(|(_, v)| v.is_set())
            .map(|(k, _)| k.as_str())
            .collect();
        out.sort();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeSave;

    impl SaveStateView for FakeSave {
        fn flags(&self) -> Vec<(Flag, FlagValue)> {
            vec![
                ("intro_done".to_string(), FlagValue::Bool(true)),
                ("hearts".to_string(), FlagValue::Int(3)),
                ("name".to_string(), FlagValue::Text(String::new())),
            ]
        }

        fn current_zone(&self) -> Option<ZoneId> {
            Some("field".to_string())
        }

        fn key_counts(&self) -> Vec<(ZoneId, u32)> {
            vec![("castle".to_string(), 2)]
        }
    }

    #[test]
    fn capture_save_state() {
        let state = SimulatedState::capture(&FakeSave);
        assert!(state.has_flag("intro_done"));
        assert!(state.has_flag("hearts"));
        assert!(!state.has_flag("name"));
        assert!(!state.has_flag("missing"));
        assert_eq!(state.current_zone(), Some("field"));
        assert_eq!(state.key_count("castle"), 2);
        assert_eq!(state.key_count("cave"), 0);
    }

    #[test]
    fn collect_and_remove_items() {
        let mut state = SimulatedState::new();
        assert!(state.collect("Heart"));
        assert!(!state.collect("Heart"));
        assert_eq!(state.item_count("Heart"), 2);
        state.remove_item("Heart");
        assert!(state.has_flag("Heart"));
        state.remove_item("Heart");
        assert!(!state.has_flag("Heart"));
        assert_eq!(state.item_count("Heart"), 0);
    }

    #[test]
    fn set_flag_reports_changes() {
        let mut state = SimulatedState::new();
        assert!(state.set_flag("door_open", true.into()));
        assert!(!state.set_flag("door_open", FlagValue::Int(1)));
        assert!(state.set_flag("door_open", false.into()));

        let other = state.with_flag("lamp", true.into());
        assert!(other.has_flag("lamp"));
        assert!(!state.has_flag("lamp"));
        assert_eq!(other.held_flags(), vec!["lamp"]);
    }

    #[test]
    fn flag_values_deserialize_untagged() {
        let values: Vec<FlagValue> = serde_json::from_str(r#"[true, 0, "x"]"#).unwrap();
        assert_eq!(
            values,
            vec![
                FlagValue::Bool(true),
                FlagValue::Int(0),
                FlagValue::Text("x".to_string())
            ]
        );
    }
}
