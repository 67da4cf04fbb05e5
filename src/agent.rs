use anyhow::{Result, ensure};
use image::GrayImage;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;

const RECENT_WINDOW: usize = 100;

// =============================================================================
// Agent
// =============================================================================

/// Learner side of the loop. Actions are indices into the agent's own action
/// space; the environment adapter maps them to native actions.
pub trait Agent {
    fn start_episode(&mut self, observation: &GrayImage) -> Result<usize>;

    fn step(&mut self, reward: f64, observation: &GrayImage) -> Result<usize>;

    fn end_episode(&mut self, reward: f64, terminal: bool) -> Result<()>;

    /// Switch to evaluation behaviour until [`finish_testing`](Self::finish_testing).
    fn start_testing(&mut self) -> Result<()> {
        Ok(())
    }

    fn finish_testing(&mut self, _epoch: u32) -> Result<()> {
        Ok(())
    }

    fn finish_epoch(&mut self, _epoch: u32) -> Result<()> {
        Ok(())
    }

    fn cleanup(&mut self) -> Result<()> {
        Ok(())
    }
}

// =============================================================================
// Random baseline
// =============================================================================

/// Uniform random policy, used as a baseline and for smoke runs.
pub struct RandomAgent {
    num_actions: usize,
    rng: SmallRng,
    testing: bool,
    episode_reward: f64,
    episode_steps: u64,
    episodes: u64,
    recent_rewards: VecDeque<f64>,
    best_reward: f64,
}

impl RandomAgent {
    pub fn new(num_actions: usize, seed: Option<u64>) -> Result<Self> {
        ensure!(num_actions > 0, "agent needs at least one action");
        let rng = match seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_os_rng(),
        };
        Ok(Self {
            num_actions,
            rng,
            testing: false,
            episode_reward: 0.0,
            episode_steps: 0,
            episodes: 0,
            recent_rewards: VecDeque::with_capacity(RECENT_WINDOW),
            best_reward: f64::NEG_INFINITY,
        })
    }

    pub fn episodes(&self) -> u64 {
        self.episodes
    }

    pub fn is_testing(&self) -> bool {
        self.testing
    }

    pub fn best_reward(&self) -> f64 {
        self.best_reward
    }

    /// Mean reward over the last 100 episodes.
    pub fn recent_mean(&self) -> f64 {
        if self.recent_rewards.is_empty() {
            return 0.0;
        }
        self.recent_rewards.iter().sum::<f64>() / self.recent_rewards.len() as f64
    }

    fn choose(&mut self) -> usize {
        self.rng.random_range(0..self.num_actions)
    }
}

impl Agent for RandomAgent {
    fn start_episode(&mut self, _observation: &GrayImage) -> Result<usize> {
        self.episode_reward = 0.0;
        self.episode_steps = 0;
        Ok(self.choose())
    }

    fn step(&mut self, reward: f64, _observation: &GrayImage) -> Result<usize> {
        self.episode_reward += reward;
        self.episode_steps += 1;
        Ok(self.choose())
    }

    fn end_episode(&mut self, reward: f64, terminal: bool) -> Result<()> {
        self.episode_reward += reward;
        self.episode_steps += 1;
        self.episodes += 1;

        if !self.testing {
            self.recent_rewards.push_back(self.episode_reward);
            if self.recent_rewards.len() > RECENT_WINDOW {
                self.recent_rewards.pop_front();
            }
        }
        self.best_reward = self.best_reward.max(self.episode_reward);

        tracing::debug!(
            episode = self.episodes,
            steps = self.episode_steps,
            reward = self.episode_reward,
            terminal,
            testing = self.testing,
            "episode finished"
        );
        Ok(())
    }

    fn start_testing(&mut self) -> Result<()> {
        self.testing = true;
        Ok(())
    }

    fn finish_testing(&mut self, epoch: u32) -> Result<()> {
        self.testing = false;
        tracing::info!(epoch, best = self.best_reward, "testing finished");
        Ok(())
    }

    fn finish_epoch(&mut self, epoch: u32) -> Result<()> {
        tracing::info!(
            epoch,
            episodes = self.episodes,
            avg100 = self.recent_mean(),
            "training epoch finished"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_actions_stay_in_range() {
        let mut agent = RandomAgent::new(3, Some(11)).unwrap();
        let obs = GrayImage::new(2, 2);
        let mut seen = [false; 3];
        seen[agent.start_episode(&obs).unwrap()] = true;
        for _ in 0..200 {
            let a = agent.step(0.0, &obs).unwrap();
            assert!(a < 3);
            seen[a] = true;
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn test_episode_reward_accumulates() {
        let mut agent = RandomAgent::new(2, Some(1)).unwrap();
        let obs = GrayImage::new(1, 1);
        agent.start_episode(&obs).unwrap();
        agent.step(1.5, &obs).unwrap();
        agent.step(2.0, &obs).unwrap();
        agent.end_episode(0.5, true).unwrap();
        assert_eq!(agent.episodes(), 1);
        assert_eq!(agent.best_reward(), 4.0);
        assert_eq!(agent.recent_mean(), 4.0);
    }

    #[test]
    fn test_testing_episodes_skip_recent_window() {
        let mut agent = RandomAgent::new(2, Some(1)).unwrap();
        let obs = GrayImage::new(1, 1);
        agent.start_testing().unwrap();
        assert!(agent.is_testing());
        agent.start_episode(&obs).unwrap();
        agent.end_episode(10.0, true).unwrap();
        agent.finish_testing(1).unwrap();
        assert!(!agent.is_testing());
        assert_eq!(agent.recent_mean(), 0.0);
    }

    #[test]
    fn test_zero_actions_rejected() {
        assert!(RandomAgent::new(0, None).is_err());
    }
}
