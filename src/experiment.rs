use anyhow::{Context, Result, ensure};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::agent::Agent;
use crate::config::ExperimentConfig;
use crate::env::EnvironmentAdapter;
use crate::frame::FrameBuffer;

/// Agent-space index of the null action.
pub const NULL_ACTION: usize = 0;

/// Null actions issued after every init so the frame buffer holds two screens.
const PRIMING_NULLOPS: u32 = 2;

// =============================================================================
// Episode bookkeeping
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpisodePhase {
    Uninitialized,
    WarmingUp,
    Running,
    Terminal,
}

#[derive(Debug, Clone, Copy, Default)]
struct EpisodeState {
    steps: u64,
    start_lives: i32,
    terminal_lol: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpisodeOutcome {
    /// The game ended or (in training) a life was lost.
    pub terminal: bool,
    /// Units charged to the epoch budget: 1 in episode mode, else `steps`.
    pub consumed: u64,
    /// Agent decisions taken.
    pub steps: u64,
    pub reward: f64,
    /// Episode ended on a life loss. The next episode continues without a
    /// reset unless the game is over.
    pub terminal_lol: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct EpochStats {
    pub epoch: u32,
    pub testing: bool,
    pub episodes: u64,
    pub steps: u64,
    pub total_reward: f64,
    pub terminal_episodes: u64,
}

impl EpochStats {
    fn record(&mut self, outcome: &EpisodeOutcome) {
        self.episodes += 1;
        self.steps += outcome.steps;
        self.total_reward += outcome.reward;
        if outcome.terminal {
            self.terminal_episodes += 1;
        }
    }

    pub fn mean_reward(&self) -> f64 {
        if self.episodes == 0 {
            0.0
        } else {
            self.total_reward / self.episodes as f64
        }
    }
}

// =============================================================================
// Experiment
// =============================================================================

/// Drives an agent against an environment for a number of training epochs,
/// each optionally followed by a testing epoch.
pub struct Experiment<E, A, R = SmallRng> {
    env: E,
    agent: A,
    config: ExperimentConfig,
    buffer: FrameBuffer,
    rng: R,
    phase: EpisodePhase,
}

impl<E: EnvironmentAdapter, A: Agent> Experiment<E, A> {
    /// Null-op draws use `config.seed` when set, OS entropy otherwise.
    pub fn new(env: E, agent: A, config: ExperimentConfig) -> Result<Self> {
        let rng = match config.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_os_rng(),
        };
        Self::with_rng(env, agent, config, rng)
    }
}

impl<E: EnvironmentAdapter, A: Agent, R: Rng> Experiment<E, A, R> {
    pub fn with_rng(env: E, agent: A, config: ExperimentConfig, rng: R) -> Result<Self> {
        config.validate()?;
        let (width, height) = env.screen_size();
        ensure!(
            width > 0 && height > 0,
            "environment reported an empty screen ({width}x{height})"
        );

        let internal_skip = env.internal_frame_skip();
        if let Some(ticks) = compounded_frame_skip(internal_skip, config.frame_skip) {
            tracing::warn!(
                internal_frame_skip = internal_skip,
                frame_skip = config.frame_skip,
                "environment already skips frames; each decision spans {ticks} ticks",
            );
        }

        let buffer = FrameBuffer::new(width, height, config.resized_width, config.resized_height);
        Ok(Self {
            env,
            agent,
            config,
            buffer,
            rng,
            phase: EpisodePhase::Uninitialized,
        })
    }

    pub fn env(&self) -> &E {
        &self.env
    }

    pub fn agent(&self) -> &A {
        &self.agent
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    pub fn frame_buffer(&self) -> &FrameBuffer {
        &self.buffer
    }

    pub fn phase(&self) -> EpisodePhase {
        self.phase
    }

    pub fn into_parts(self) -> (E, A) {
        (self.env, self.agent)
    }

    /// Run every configured epoch and return the stats of each training and
    /// testing epoch in the order they ran.
    pub fn run(&mut self) -> Result<Vec<EpochStats>> {
        let mut history = Vec::new();
        for epoch in 1..=self.config.num_epochs {
            history.push(self.run_epoch(epoch, self.config.epoch_length, false)?);
            self.agent.finish_epoch(epoch)?;

            if self.config.test_length > 0 {
                self.agent.start_testing()?;
                history.push(self.run_epoch(epoch, self.config.test_length, true)?);
                self.agent.finish_testing(epoch)?;
            }
        }
        self.agent.cleanup()?;
        Ok(history)
    }

    /// Run episodes until `budget` steps (or episodes) are used up.
    pub fn run_epoch(&mut self, epoch: u32, budget: u64, testing: bool) -> Result<EpochStats> {
        let mode = if testing { "testing" } else { "training" };
        let unit = self.config.length_unit();
        let mut stats = EpochStats {
            epoch,
            testing,
            ..Default::default()
        };

        // Every epoch starts from a freshly reset game.
        let mut terminal_lol = false;
        let mut remaining = budget;
        while remaining > 0 {
            tracing::info!("{mode} epoch: {epoch} {unit}_left: {remaining}");
            let outcome = self.run_episode(remaining, testing, terminal_lol)?;
            terminal_lol = outcome.terminal_lol;
            remaining = remaining.saturating_sub(outcome.consumed);
            stats.record(&outcome);
        }

        tracing::info!(
            epoch,
            testing,
            episodes = stats.episodes,
            steps = stats.steps,
            mean_reward = stats.mean_reward(),
            "{mode} epoch finished"
        );
        Ok(stats)
    }

    /// Run one episode.
    ///
    /// `terminal_lol` is the flag returned by the previous episode of the
    /// same epoch. In step mode the episode is cut off after `max_steps`
    /// decisions; in episode mode only the environment ends it.
    pub fn run_episode(
        &mut self,
        max_steps: u64,
        testing: bool,
        terminal_lol: bool,
    ) -> Result<EpisodeOutcome> {
        let random_nullops = self.init_episode(terminal_lol)?;

        let mut state = EpisodeState {
            start_lives: self.env.lives(),
            ..Default::default()
        };
        self.set_phase(EpisodePhase::Running);
        tracing::debug!(random_nullops, lives = state.start_lives, testing, "episode start");

        let observation = self.buffer.observation();
        let mut action = self.env.map_action(self.agent.start_episode(&observation)?)?;
        let mut total_reward = 0.0;

        let terminal = loop {
            let reward = self.repeat_action(action)?;
            total_reward += reward;
            state.terminal_lol = self.config.death_ends_episode
                && !testing
                && self.env.lives() < state.start_lives;
            let terminal = self.env.game_over() || state.terminal_lol;
            state.steps += 1;

            if terminal || (state.steps >= max_steps && !self.config.length_in_episodes) {
                self.agent.end_episode(reward, terminal)?;
                break terminal;
            }

            let observation = self.buffer.observation();
            action = self.env.map_action(self.agent.step(reward, &observation)?)?;
        };
        self.set_phase(EpisodePhase::Terminal);

        let consumed = if self.config.length_in_episodes {
            1
        } else {
            state.steps
        };
        Ok(EpisodeOutcome {
            terminal,
            consumed,
            steps: state.steps,
            reward: total_reward,
            terminal_lol: state.terminal_lol,
        })
    }

    /// Reset when needed, randomize the start with null actions and prime
    /// the frame buffer. Returns the number of randomized null actions.
    fn init_episode(&mut self, terminal_lol: bool) -> Result<u32> {
        self.set_phase(EpisodePhase::WarmingUp);

        let mut random_nullops = 0;
        if !terminal_lol || self.env.game_over() {
            self.env.reset_game().context("Failed to reset environment")?;

            if self.config.max_start_nullops > 0 {
                random_nullops = self.rng.random_range(0..=self.config.max_start_nullops);
                for _ in 0..random_nullops {
                    self.do_nothing()?;
                }
            }
        } else {
            tracing::debug!(lives = self.env.lives(), "continuing after life loss");
        }

        for _ in 0..PRIMING_NULLOPS {
            self.do_nothing()?;
        }
        Ok(random_nullops)
    }

    fn do_nothing(&mut self) -> Result<f64> {
        let action = self.env.map_action(NULL_ACTION)?;
        self.act(action)
    }

    /// One environment tick; the screen lands in the next buffer slot.
    fn act(&mut self, action: E::Action) -> Result<f64> {
        let env = &mut self.env;
        self.buffer.write_with(|screen| env.interact(action, screen))
    }

    fn repeat_action(&mut self, action: E::Action) -> Result<f64> {
        let mut reward = 0.0;
        for _ in 0..self.config.frame_skip {
            reward += self.act(action)?;
        }
        Ok(reward)
    }

    fn set_phase(&mut self, phase: EpisodePhase) {
        tracing::trace!(from = ?self.phase, to = ?phase, "episode phase");
        self.phase = phase;
    }
}

/// Ticks per decision when the backend skips frames on its own. `None` when
/// it does not, i.e. when there is nothing to warn about.
fn compounded_frame_skip(internal_skip: u32, frame_skip: u32) -> Option<u32> {
    (internal_skip > 1 && frame_skip > 0).then(|| internal_skip.saturating_mul(frame_skip))
}
