use advrando::randomize_world;
use advrando::settings::load_randomizer_settings;
use advrando_game::LogicGraph;
use advrando_logic::SeedRng;
use anyhow::{bail, Result};
use clap::Parser;
use log::info;
use rand::{RngCore, SeedableRng};
use std::path::PathBuf;

#[derive(Parser)]
struct Args {
    #[arg(long, default_value = "data/world")]
    world: PathBuf,

    #[arg(long, default_value = "data/settings/default.json")]
    settings: PathBuf,

    /// Root seed from which the item, entrance and enemy seeds are derived.
    #[arg(long)]
    random_seed: Option<u64>,

    /// Draw the root seed from system entropy.
    #[arg(long)]
    random: bool,

    #[arg(long)]
    item_seed: Option<u64>,

    #[arg(long)]
    entrance_seed: Option<u64>,

    #[arg(long)]
    enemy_seed: Option<u64>,

    #[arg(long)]
    output: Option<PathBuf>,

    #[arg(long)]
    output_spoiler_log: Option<PathBuf>,

    /// Exit with an error if any category fell back to vanilla content.
    #[arg(long)]
    strict: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = Args::parse();
    let graph = LogicGraph::load(&args.world)?;
    let mut settings = load_randomizer_settings(&args.settings)?;

    let root_seed = match args.random_seed {
        Some(s) => Some(s),
        None if args.random => {
            Some(rand::rngs::StdRng::from_entropy().next_u64() & 0xFFFFFFFF)
        }
        None => None,
    };
    if let Some(root_seed) = root_seed {
        info!("Root seed: {root_seed}");
        let rng = SeedRng::new(root_seed);
        let (item_seed, rng) = rng.next_seed();
        let (entrance_seed, rng) = rng.next_seed();
        let (enemy_seed, _) = rng.next_seed();
        settings.seeds.items = Some(item_seed);
        settings.seeds.entrances = Some(entrance_seed);
        settings.seeds.enemies = Some(enemy_seed);
    }
    if args.item_seed.is_some() {
        settings.seeds.items = args.item_seed;
    }
    if args.entrance_seed.is_some() {
        settings.seeds.entrances = args.entrance_seed;
    }
    if args.enemy_seed.is_some() {
        settings.seeds.enemies = args.enemy_seed;
    }
    info!(
        "Seeds: items={:?}, entrances={:?}, enemies={:?}",
        settings.seeds.items, settings.seeds.entrances, settings.seeds.enemies
    );

    let (randomization, spoiler_log) = randomize_world(&graph, &settings)?;

    if let Some(output_path) = &args.output {
        println!("Writing randomization to {}", output_path.display());
        let output_str = serde_json::to_string_pretty(&randomization)?;
        std::fs::write(output_path, output_str)?;
    } else {
        println!("{}", serde_json::to_string_pretty(&randomization)?);
    }

    if let Some(output_spoiler_log_path) = &args.output_spoiler_log {
        println!(
            "Writing spoiler log to {}",
            output_spoiler_log_path.display()
        );
        let spoiler_str = serde_json::to_string_pretty(&spoiler_log)?;
        std::fs::write(output_spoiler_log_path, spoiler_str)?;
    }

    if args.strict && !randomization.is_fully_randomized() {
        bail!(
            "Randomization fell back to vanilla content: {}",
            randomization.failures.join("; ")
        );
    }
    Ok(())
}
