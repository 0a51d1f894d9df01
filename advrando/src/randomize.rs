use std::collections::{BTreeMap, VecDeque};

use advrando_game::{small_key_item, CheckIdx, ConnectionMap, ItemId, LocationId, LogicGraph};
use advrando_logic::{SeedRng, SimulatedState};
use anyhow::{bail, Context, Result};
use log::{debug, error, info};
use serde::{Deserialize, Serialize};

use crate::error::RandomizationError;
use crate::settings::{ItemClass, RandomizerSettings};
use crate::traverse::{reach, ReachContext};

/// Check -> item map. Every location is bound at most once.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Assignment(BTreeMap<LocationId, ItemId>);

impl Assignment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, location: &str, item: &str) -> Result<()> {
        if let Some(existing) = self.0.get(location) {
            bail!("Location {location} is already bound to {existing}");
        }
        self.0.insert(location.to_string(), item.to_string());
        Ok(())
    }

    pub fn get(&self, location: &str) -> Option<&ItemId> {
        self.0.get(location)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&LocationId, &ItemId)> {
        self.0.iter()
    }

    /// Per-check placements in graph order.
    pub fn placements(&self, graph: &LogicGraph) -> Vec<Option<ItemId>> {
        graph.checks.iter().map(|c| self.0.get(&c.id).cloned()).collect()
    }

    pub fn from_placements(graph: &LogicGraph, placements: &[Option<ItemId>]) -> Result<Self> {
        let mut out = Assignment::new();
        for (check, item) in graph.checks.iter().zip(placements.iter()) {
            let item = item
                .as_ref()
                .with_context(|| format!("Location {} has no item", check.id))?;
            out.bind(&check.id, item)?;
        }
        Ok(out)
    }
}

/// Unrandomized content: each check keeps its vanilla item, or the filler item
/// when it declares none. Key drops always hold their zone's small key.
pub fn vanilla_assignment(graph: &LogicGraph, settings: &RandomizerSettings) -> Result<Assignment> {
    let mut out = Assignment::new();
    for check in &graph.checks {
        let item = if check.is_key_drop() {
            small_key_item(&check.zone)
        } else {
            check
                .vanilla_item
                .clone()
                .unwrap_or_else(|| settings.filler_item.clone())
        };
        out.bind(&check.id, &item)?;
    }
    Ok(out)
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementStep {
    pub item: ItemId,
    pub location: LocationId,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRandomization {
    pub seed: u64,
    pub attempt: usize,
    pub assignment: Assignment,
    pub placement_order: Vec<PlacementStep>,
    pub deferrals: usize,
}

/// Assumed-fill item placement over a graph with key logic already injected.
pub struct Randomizer<'a> {
    pub graph: &'a LogicGraph,
    pub connections: &'a ConnectionMap,
    pub settings: &'a RandomizerSettings,
    pub start_state: SimulatedState,
    pub progression_items: Vec<ItemId>, // one entry per copy
    pub filler_items: Vec<ItemId>,      // padded to fill every open check
    base_placements: Vec<Option<ItemId>>, // key drops pre-filled
}

impl<'a> Randomizer<'a> {
    /// Prepares the item pool and checks that every location is reachable with
    /// every item held. A failure here is an authoring error and is not retried.
    pub fn new(
        graph: &'a LogicGraph,
        connections: &'a ConnectionMap,
        settings: &'a RandomizerSettings,
    ) -> Result<Randomizer<'a>> {
        let progression_items = settings.expanded_pool(ItemClass::Progression);
        let mut filler_items = settings.expanded_pool(ItemClass::Filler);
        let open_checks = graph.open_checks().len();
        let num_items = progression_items.len() + filler_items.len();
        if num_items > open_checks {
            bail!(RandomizationError::PoolTooLarge {
                items: num_items,
                checks: open_checks,
            });
        }
        filler_items.extend(
            std::iter::repeat(settings.filler_item.clone()).take(open_checks - num_items),
        );

        let base_placements: Vec<Option<ItemId>> = graph
            .checks
            .iter()
            .map(|c| {
                if c.is_key_drop() {
                    Some(small_key_item(&c.zone))
                } else {
                    None
                }
            })
            .collect();

        let everything = settings.everything_held();
        let cx = ReachContext::new(graph, connections, &base_placements);
        let result = reach(&cx, &graph.roots, &everything)?;
        let unreached = result.unreached_checks(graph);
        if !unreached.is_empty() {
            bail!(RandomizationError::MalformedGraph {
                locations: unreached
            });
        }

        Ok(Randomizer {
            graph,
            connections,
            settings,
            start_state: settings.start_state(),
            progression_items,
            filler_items,
            base_placements,
        })
    }

    fn place_progression(
        &self,
        attempt_num_rando: usize,
        rng: SeedRng,
        placements: &mut [Option<ItemId>],
    ) -> Result<(Vec<PlacementStep>, usize, SeedRng)> {
        let (shuffled, mut rng) = rng.shuffle(self.progression_items.clone());
        debug!("[attempt {attempt_num_rando}] Placement order: {:?}", shuffled);

        // Everything not yet placed is assumed held; placed items come back only
        // when their check is reached.
        let mut assumed = self.start_state.clone();
        for item in &shuffled {
            assumed.collect(item);
        }
        let mut queue: VecDeque<ItemId> = shuffled.into();
        let max_deferrals = self.settings.item_progression_settings.max_deferrals;
        let mut deferrals = 0;
        let mut order: Vec<PlacementStep> = vec![];
        let mut placed_checks: Vec<CheckIdx> = vec![];

        while let Some(item) = queue.pop_front() {
            let mut reduced = assumed.clone();
            reduced.remove_item(&item);
            let cx = ReachContext::new(self.graph, self.connections, placements);
            let result = reach(&cx, &self.graph.roots, &reduced)?;
            let candidates: Vec<CheckIdx> = (0..placements.len())
                .filter(|&c| result.checks[c] && placements[c].is_none())
                .collect();
            let (choice, next_rng) = rng.choice(&candidates);
            rng = next_rng;
            if let Some(&c) = choice {
                let location = &self.graph.checks[c].id;
                debug!(
                    "[attempt {attempt_num_rando}] {item} -> {location} ({} candidates)",
                    candidates.len()
                );
                order.push(PlacementStep {
                    item: item.clone(),
                    location: location.clone(),
                });
                placed_checks.push(c);
                placements[c] = Some(item);
                assumed = reduced;
                continue;
            }

            // More placements never make a stuck item placeable; undo the latest
            // placement instead and place the stuck item first.
            let undo = if deferrals < max_deferrals {
                order.pop().zip(placed_checks.pop())
            } else {
                None
            };
            let Some((undone, undone_check)) = undo else {
                bail!(RandomizationError::PlacementExhausted {
                    attempt: attempt_num_rando,
                    item,
                    deferrals,
                });
            };
            deferrals += 1;
            debug!(
                "[attempt {attempt_num_rando}] Deferring {item}: no open check reachable without it; taking {} back from {}",
                undone.item, undone.location
            );
            placements[undone_check] = None;
            assumed.collect(&undone.item);
            queue.push_front(undone.item);
            queue.push_front(item);
        }
        Ok((order, deferrals, rng))
    }

    /// One placement attempt. Deterministic in `seed`.
    pub fn randomize(&self, attempt_num_rando: usize, seed: u64) -> Result<ItemRandomization> {
        info!("[attempt {attempt_num_rando}] Item placement seed={seed}");
        let mut placements = self.base_placements.clone();
        let (order, deferrals, rng) =
            self.place_progression(attempt_num_rando, SeedRng::new(seed), &mut placements)?;

        let (fillers, _) = rng.shuffle(self.filler_items.clone());
        let empty: Vec<CheckIdx> = (0..placements.len())
            .filter(|&c| placements[c].is_none())
            .collect();
        if empty.len() != fillers.len() {
            bail!(
                "[attempt {attempt_num_rando}] {} open checks left for {} filler items",
                empty.len(),
                fillers.len()
            );
        }
        for (c, item) in empty.into_iter().zip(fillers) {
            placements[c] = Some(item);
        }

        let cx = ReachContext::new(self.graph, self.connections, &placements);
        let result = reach(&cx, &self.graph.roots, &self.start_state)?;
        let unreached = result.unreached_checks(self.graph);
        if !unreached.is_empty() {
            bail!(RandomizationError::Incompletable {
                attempt: attempt_num_rando,
                locations: unreached,
            });
        }

        let assignment = Assignment::from_placements(self.graph, &placements)?;
        info!(
            "[attempt {attempt_num_rando}] Placed {} progression items with {deferrals} deferrals",
            order.len()
        );
        Ok(ItemRandomization {
            seed,
            attempt: attempt_num_rando,
            assignment,
            placement_order: order,
            deferrals,
        })
    }

    /// Runs up to `max_attempts` attempts. Attempt 1 uses `item_seed`; later
    /// attempts draw their seeds from a generator seeded with it.
    pub fn randomize_with_retries(&self, item_seed: u64) -> Result<ItemRandomization> {
        let max_attempts = self.settings.item_progression_settings.max_attempts.max(1);
        let mut seed_rng = SeedRng::new(item_seed);
        let mut seed = item_seed;
        for attempt_num in 1..=max_attempts {
            match self.randomize(attempt_num, seed) {
                Ok(r) => return Ok(r),
                Err(e) => {
                    let retryable = e
                        .downcast_ref::<RandomizationError>()
                        .map(|x| x.is_retryable())
                        .unwrap_or(false);
                    if !retryable || attempt_num == max_attempts {
                        return Err(e.context(format!(
                            "Item placement failed after {attempt_num} attempts"
                        )));
                    }
                    error!("Attempt {attempt_num}/{max_attempts}: Randomization failed: {e}");
                }
            }
            let (next_seed, next_rng) = seed_rng.next_seed();
            seed = next_seed;
            seed_rng = next_rng;
        }
        bail!("Exhausted item placement attempts")
    }
}
