// =============================================================================
// Random-agent baseline for the NES experiment loop
// =============================================================================
// Build & Run:
//   cargo run --release --features nes -- --rom kung_fu.nes --epochs 1
//   cargo run --release --features nes -- --rom kung_fu.nes --config experiment.json

use anyhow::Result;
use arcade_experiment::nes::{Action, NesAdapter};
use arcade_experiment::{Experiment, ExperimentConfig, RandomAgent};
use clap::Parser;
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser)]
#[command(name = "arcade-baseline", about = "Run a random agent through training/testing epochs")]
struct Cli {
    #[arg(long)]
    rom: PathBuf,
    /// JSON experiment config; flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    epochs: Option<u32>,
    #[arg(long)]
    epoch_length: Option<u64>,
    #[arg(long)]
    test_length: Option<u64>,
    #[arg(long)]
    frame_skip: Option<u32>,
    #[arg(long)]
    max_start_nullops: Option<u32>,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long, default_value_t = false)]
    length_in_episodes: bool,
    #[arg(long, default_value_t = false)]
    headless: bool,
}

impl Cli {
    fn experiment_config(&self) -> Result<ExperimentConfig> {
        let mut config = match self.config.as_ref() {
            Some(path) => ExperimentConfig::load(path)?,
            None => ExperimentConfig::default(),
        };
        if let Some(epochs) = self.epochs {
            config.num_epochs = epochs;
        }
        if let Some(len) = self.epoch_length {
            config.epoch_length = len;
        }
        if let Some(len) = self.test_length {
            config.test_length = len;
        }
        if let Some(skip) = self.frame_skip {
            config.frame_skip = skip;
        }
        if let Some(nullops) = self.max_start_nullops {
            config.max_start_nullops = nullops;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        config.length_in_episodes |= self.length_in_episodes;
        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".to_string()))
        .init();

    let cli = Cli::parse();
    let config = cli.experiment_config()?;

    eprintln!("═══════════════════════════════════════════════════════════");
    eprintln!("  BASELINE — random agent, {} epochs", config.num_epochs);
    eprintln!("═══════════════════════════════════════════════════════════");

    let env = NesAdapter::new(&cli.rom, cli.headless)?;
    let agent = RandomAgent::new(Action::COUNT, config.agent_seed())?;
    let mut experiment = Experiment::new(env, agent, config)?;

    let t_start = Instant::now();
    let history = experiment.run()?;
    for stats in &history {
        let mode = if stats.testing { "test " } else { "train" };
        eprintln!(
            "Epoch {epoch:>3} {mode} | Episodes {episodes:>5} | Steps {steps:>8} | Mean R {mean:>8.1}",
            epoch = stats.epoch,
            episodes = stats.episodes,
            steps = stats.steps,
            mean = stats.mean_reward(),
        );
    }
    eprintln!(
        "\nDone in {:.1}s, best episode reward {:.1}",
        t_start.elapsed().as_secs_f64(),
        experiment.agent().best_reward()
    );
    Ok(())
}
