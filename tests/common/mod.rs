//! Scripted environment and recording agent shared by the integration tests.
#![allow(dead_code)]

use anyhow::{Result, bail};
use arcade_experiment::{Agent, EnvironmentAdapter, ExperimentConfig};
use image::GrayImage;

/// Deterministic environment driven by tick counts since the last reset.
pub struct ScriptedEnv {
    pub width: u32,
    pub height: u32,
    pub start_lives: i32,
    /// Ticks after a reset at which one life is lost.
    pub life_drops: Vec<u64>,
    /// Ticks after a reset at which the game ends.
    pub game_over_at: Option<u64>,
    pub reward_per_tick: f64,
    pub fail_reset: bool,

    pub ticks_since_reset: u64,
    pub total_ticks: u64,
    pub resets: u32,
    /// Leading null actions issued after each reset.
    pub nullops_after_reset: Vec<u64>,
    counting_nullops: bool,
}

impl ScriptedEnv {
    pub fn new() -> Self {
        Self {
            width: 8,
            height: 6,
            start_lives: 3,
            life_drops: Vec::new(),
            game_over_at: None,
            reward_per_tick: 1.0,
            fail_reset: false,
            ticks_since_reset: 0,
            total_ticks: 0,
            resets: 0,
            nullops_after_reset: Vec::new(),
            counting_nullops: false,
        }
    }
}

impl EnvironmentAdapter for ScriptedEnv {
    type Action = u8;

    fn screen_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn game_over(&self) -> bool {
        self.game_over_at
            .is_some_and(|t| self.ticks_since_reset >= t)
    }

    fn lives(&self) -> i32 {
        let lost = self
            .life_drops
            .iter()
            .filter(|&&t| self.ticks_since_reset >= t)
            .count() as i32;
        self.start_lives - lost
    }

    fn reset_game(&mut self) -> Result<()> {
        if self.fail_reset {
            bail!("emulator refused to reset");
        }
        self.resets += 1;
        self.ticks_since_reset = 0;
        self.nullops_after_reset.push(0);
        self.counting_nullops = true;
        Ok(())
    }

    fn map_action(&self, index: usize) -> Result<u8> {
        Ok(index as u8)
    }

    fn interact(&mut self, action: u8, screen: &mut GrayImage) -> Result<f64> {
        if action == 0 && self.counting_nullops {
            if let Some(count) = self.nullops_after_reset.last_mut() {
                *count += 1;
            }
        } else {
            self.counting_nullops = false;
        }
        self.ticks_since_reset += 1;
        self.total_ticks += 1;
        let shade = (self.total_ticks % 251) as u8;
        for p in screen.pixels_mut() {
            p.0[0] = shade;
        }
        Ok(self.reward_per_tick)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    StartEpisode,
    Step(f64),
    EndEpisode(f64, bool),
    StartTesting,
    FinishTesting(u32),
    FinishEpoch(u32),
    Cleanup,
}

/// Always picks `action` and records every callback.
pub struct RecordingAgent {
    pub action: usize,
    pub events: Vec<Event>,
    pub observation_sizes: Vec<(u32, u32)>,
}

impl RecordingAgent {
    pub fn new() -> Self {
        Self {
            action: 1,
            events: Vec::new(),
            observation_sizes: Vec::new(),
        }
    }

    pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }

    pub fn lifecycle(&self) -> Vec<Event> {
        self.events
            .iter()
            .filter(|e| {
                !matches!(
                    e,
                    Event::StartEpisode | Event::Step(_) | Event::EndEpisode(..)
                )
            })
            .cloned()
            .collect()
    }
}

impl Agent for RecordingAgent {
    fn start_episode(&mut self, observation: &GrayImage) -> Result<usize> {
        self.observation_sizes.push(observation.dimensions());
        self.events.push(Event::StartEpisode);
        Ok(self.action)
    }

    fn step(&mut self, reward: f64, observation: &GrayImage) -> Result<usize> {
        self.observation_sizes.push(observation.dimensions());
        self.events.push(Event::Step(reward));
        Ok(self.action)
    }

    fn end_episode(&mut self, reward: f64, terminal: bool) -> Result<()> {
        self.events.push(Event::EndEpisode(reward, terminal));
        Ok(())
    }

    fn start_testing(&mut self) -> Result<()> {
        self.events.push(Event::StartTesting);
        Ok(())
    }

    fn finish_testing(&mut self, epoch: u32) -> Result<()> {
        self.events.push(Event::FinishTesting(epoch));
        Ok(())
    }

    fn finish_epoch(&mut self, epoch: u32) -> Result<()> {
        self.events.push(Event::FinishEpoch(epoch));
        Ok(())
    }

    fn cleanup(&mut self) -> Result<()> {
        self.events.push(Event::Cleanup);
        Ok(())
    }
}

/// Frame skip 4, death ends episode, no random null-ops, 4x3 observations.
pub fn base_config() -> ExperimentConfig {
    ExperimentConfig {
        resized_width: 4,
        resized_height: 3,
        num_epochs: 1,
        epoch_length: 100,
        test_length: 0,
        frame_skip: 4,
        death_ends_episode: true,
        max_start_nullops: 0,
        length_in_episodes: false,
        seed: Some(42),
    }
}
