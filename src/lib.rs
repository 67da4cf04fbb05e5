pub mod agent;
pub mod config;
pub mod env;
pub mod experiment;
pub mod frame;
#[cfg(feature = "nes")]
pub mod nes;

pub use agent::{Agent, RandomAgent};
pub use config::ExperimentConfig;
pub use env::{EnvironmentAdapter, GymAdapter, StepEnvironment, StepOutcome, luma, rgb_to_gray};
pub use experiment::{EpisodeOutcome, EpisodePhase, EpochStats, Experiment, NULL_ACTION};
pub use frame::{BUFFER_DEPTH, FrameBuffer};
#[cfg(feature = "nes")]
pub use nes::{Action, NesAdapter};
