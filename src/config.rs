use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;

// =============================================================================
// Experiment Configuration
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Observation width handed to the agent.
    pub resized_width: u32,
    /// Observation height handed to the agent.
    pub resized_height: u32,
    pub num_epochs: u32,
    /// Training budget per epoch, in steps (or episodes, see `length_in_episodes`).
    pub epoch_length: u64,
    /// Testing budget after each training epoch. Zero disables testing.
    pub test_length: u64,
    /// Environment ticks per agent decision.
    pub frame_skip: u32,
    /// Treat a lost life as the end of a training episode.
    pub death_ends_episode: bool,
    /// Upper bound (inclusive) on random no-op ticks after a reset.
    pub max_start_nullops: u32,
    /// Measure `epoch_length`/`test_length` in episodes instead of steps.
    pub length_in_episodes: bool,
    /// Seed for the null-op draw. OS entropy when absent.
    pub seed: Option<u64>,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            resized_width: 84,
            resized_height: 84,
            num_epochs: 100,
            epoch_length: 250_000,
            test_length: 125_000,
            frame_skip: 4,
            death_ends_episode: true,
            max_start_nullops: 30,
            length_in_episodes: false,
            seed: None,
        }
    }
}

impl ExperimentConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open config: {}", path.display()))?;
        let reader = std::io::BufReader::new(file);
        let config: Self = serde_json::from_reader(reader)
            .with_context(|| format!("Failed to parse config: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path.as_ref())?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.resized_width > 0 && self.resized_height > 0,
            "resized observation must be non-empty, got {}x{}",
            self.resized_width,
            self.resized_height
        );
        ensure!(self.frame_skip > 0, "frame_skip must be at least 1");
        Ok(())
    }

    /// Seed for the agent's own RNG, offset so it never replays the null-op stream.
    pub fn agent_seed(&self) -> Option<u64> {
        self.seed.map(|s| s.wrapping_add(1))
    }

    pub fn length_unit(&self) -> &'static str {
        if self.length_in_episodes {
            "episodes"
        } else {
            "steps"
        }
    }
}
