use advrando_game::{ItemId, LocationId};
use advrando_logic::ZoneId;
use thiserror::Error;

/// Raised with `bail!` and recovered with `downcast_ref` by callers that pick a
/// fallback.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RandomizationError {
    /// A declared check cannot be reached even with every item held.
    #[error("Malformed graph: unreachable with every item held: {}", .locations.join(", "))]
    MalformedGraph { locations: Vec<LocationId> },

    #[error("Self-locking door {door} in {zone}: needs {required} keys but only {available} are reachable without it")]
    SelfLockingDoor {
        zone: ZoneId,
        door: String,
        required: u32,
        available: u32,
    },

    #[error("Door {door} in {zone} can never be crossed")]
    UnreachableDoor { zone: ZoneId, door: String },

    #[error("[attempt {attempt}] Unable to place {item} after {deferrals} deferrals")]
    PlacementExhausted {
        attempt: usize,
        item: ItemId,
        deferrals: usize,
    },

    #[error("Item pool has {items} items but only {checks} checks are open")]
    PoolTooLarge { items: usize, checks: usize },

    #[error("No connected entrance permutation found in {attempts} attempts")]
    EntrancesExhausted { attempts: usize },

    #[error("[attempt {attempt}] Assignment is not completable; unreached: {}", .locations.join(", "))]
    Incompletable {
        attempt: usize,
        locations: Vec<LocationId>,
    },
}

impl RandomizationError {
    /// Whether another attempt with a fresh seed may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RandomizationError::PlacementExhausted { .. } | RandomizationError::Incompletable { .. }
        )
    }
}
