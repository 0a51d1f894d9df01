use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

use hashbrown::HashSet;

use crate::{Flag, SimulatedState, ZoneId};

type PredicateFn = dyn Fn(&SimulatedState) -> bool + Send + Sync;

/// A named condition that cannot be expressed declaratively. The function must
/// depend on nothing but the state it is given.
#[derive(Clone)]
pub struct CustomPredicate {
    pub name: String,
    func: Arc<PredicateFn>,
}

impl CustomPredicate {
    pub fn new<F>(name: &str, func: F) -> Self
    where
        F: Fn(&SimulatedState) -> bool + Send + Sync + 'static,
    {
        CustomPredicate {
            name: name.to_string(),
            func: Arc::new(func),
        }
    }

    pub fn call(&self, state: &SimulatedState) -> bool {
        (self.func)(state)
    }
}

impl Debug for CustomPredicate {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[derive(Clone, Debug)]
pub enum LogicPredicate {
    Always(bool),
    Simple {
        required: HashSet<Flag>,
        excluded: HashSet<Flag>,
        zones: HashSet<ZoneId>,
    },
    And(Vec<LogicPredicate>),
    Or(Vec<LogicPredicate>),
    Custom(CustomPredicate),
}

impl Default for LogicPredicate {
    fn default() -> Self {
        LogicPredicate::Always(true)
    }
}

impl LogicPredicate {
    pub fn free() -> LogicPredicate {
        LogicPredicate::Always(true)
    }

    pub fn never() -> LogicPredicate {
        LogicPredicate::Always(false)
    }

    pub fn requires<S: AsRef<str>>(flags: &[S]) -> LogicPredicate {
        LogicPredicate::Simple {
            required: flags.iter().map(|x| x.as_ref().to_string()).collect(),
            excluded: HashSet::new(),
            zones: HashSet::new(),
        }
    }

    pub fn excludes<S: AsRef<str>>(flags: &[S]) -> LogicPredicate {
        LogicPredicate::Simple {
            required: HashSet::new(),
            excluded: flags.iter().map(|x| x.as_ref().to_string()).collect(),
            zones: HashSet::new(),
        }
    }

    pub fn in_zones<S: AsRef<str>>(zones: &[S]) -> LogicPredicate {
        LogicPredicate::Simple {
            required: HashSet::new(),
            excluded: HashSet::new(),
            zones: zones.iter().map(|x| x.as_ref().to_string()).collect(),
        }
    }

    pub fn custom<F>(name: &str, func: F) -> LogicPredicate
    where
        F: Fn(&SimulatedState) -> bool + Send + Sync + 'static,
    {
        LogicPredicate::Custom(CustomPredicate::new(name, func))
    }

    /// Holds once at least `count` small keys of the zone have been collected.
    pub fn keys_at_least(zone: &str, count: u32) -> LogicPredicate {
        if count == 0 {
            return LogicPredicate::free();
        }
        let zone_owned = zone.to_string();
        LogicPredicate::custom(&format!("keys({zone}) >= {count}"), move |state| {
            state.key_count(&zone_owned) >= count
        })
    }

    pub fn make_and(preds: Vec<LogicPredicate>) -> LogicPredicate {
        let mut out_preds: Vec<LogicPredicate> = vec![];
        for pred in preds {
            match pred {
                LogicPredicate::Always(false) => return LogicPredicate::never(),
                LogicPredicate::Always(true) => continue,
                LogicPredicate::And(and_preds) => out_preds.extend(and_preds),
                _ => out_preds.push(pred),
            }
        }
        if out_preds.is_empty() {
            LogicPredicate::free()
        } else if out_preds.len() == 1 {
            out_preds.pop().unwrap_or_default()
        } else {
            LogicPredicate::And(out_preds)
        }
    }

    pub fn make_or(preds: Vec<LogicPredicate>) -> LogicPredicate {
        let mut out_preds: Vec<LogicPredicate> = vec![];
        for pred in preds {
            match pred {
                LogicPredicate::Always(false) => continue,
                LogicPredicate::Always(true) => return LogicPredicate::free(),
                LogicPredicate::Or(or_preds) => out_preds.extend(or_preds),
                _ => out_preds.push(pred),
            }
        }
        if out_preds.is_empty() {
            LogicPredicate::never()
        } else if out_preds.len() == 1 {
            out_preds.pop().unwrap_or_default()
        } else {
            LogicPredicate::Or(out_preds)
        }
    }

    pub fn is_free(&self) -> bool {
        matches!(self, LogicPredicate::Always(true))
    }

    /// Collects (sorted, deduplicated) the flags this predicate requires somewhere in its tree.
    pub fn required_flags(&self) -> Vec<Flag> {
        let mut out = vec![];
        extract_required_flags(self, &mut out);
        out.sort();
        out.dedup();
        out
    }
}

fn extract_required_flags(pred: &LogicPredicate, out: &mut Vec<Flag>) {
    match pred {
        LogicPredicate::Simple { required, .. } => out.extend(required.iter().cloned()),
        LogicPredicate::And(preds) | LogicPredicate::Or(preds) => {
            for p in preds {
                extract_required_flags(p, out);
            }
        }
        LogicPredicate::Always(_) | LogicPredicate::Custom(_) => {}
    }
}

/// Evaluates a predicate against a simulated state. And/Or short-circuit left to right.
pub fn evaluate(pred: &LogicPredicate, state: &SimulatedState) -> bool {
    match pred {
        LogicPredicate::Always(b) => *b,
        LogicPredicate::Simple {
            required,
            excluded,
            zones,
        } => {
            if !required.iter().all(|f| state.has_flag(f)) {
                return false;
            }
            if excluded.iter().any(|f| state.has_flag(f)) {
                return false;
            }
            if zones.is_empty() {
                return true;
            }
            match state.current_zone() {
                Some(zone) => zones.contains(zone),
                None => false,
            }
        }
        LogicPredicate::And(preds) => preds.iter().all(|p| evaluate(p, state)),
        LogicPredicate::Or(preds) => preds.iter().any(|p| evaluate(p, state)),
        LogicPredicate::Custom(custom) => custom.call(state),
    }
}
