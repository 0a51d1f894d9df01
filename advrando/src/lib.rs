// The changes suggested by this lint usually make the code more cluttered and less clear:
#![allow(clippy::needless_range_loop)]

pub mod enemies;
pub mod entrances;
pub mod error;
pub mod key_logic;
pub mod randomize;
pub mod settings;
pub mod spoiler_log;
pub mod traverse;
pub mod world;

pub use error::RandomizationError;
pub use world::{randomize_world, Randomization};
