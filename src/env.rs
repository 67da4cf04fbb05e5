use anyhow::{Result, ensure};
use image::{GrayImage, RgbImage};

// =============================================================================
// Environment Adapter
// =============================================================================

/// What the experiment loop needs from an environment backend.
///
/// `interact` advances the underlying environment by exactly one tick.
/// Repeating an action across frames is the loop's job, not the adapter's.
pub trait EnvironmentAdapter {
    /// Backend-native action, produced by [`map_action`](Self::map_action).
    type Action: Copy;

    /// Native screen size as `(width, height)`.
    fn screen_size(&self) -> (u32, u32);

    fn game_over(&self) -> bool;

    fn lives(&self) -> i32;

    fn reset_game(&mut self) -> Result<()>;

    /// Map an index in the agent's action space to a native action.
    fn map_action(&self, index: usize) -> Result<Self::Action>;

    /// Issue one native action for a single tick, write the resulting
    /// grayscale screen into `screen` and return the tick's reward.
    fn interact(&mut self, action: Self::Action, screen: &mut GrayImage) -> Result<f64>;

    /// Ticks the backend already skips per `interact`. Anything above 1 means
    /// the loop's own frame skip compounds with it.
    fn internal_frame_skip(&self) -> u32 {
        1
    }
}

/// ITU-R 601 luma, the same weighting the arcade emulators use for their
/// grayscale screens.
pub fn luma(r: u8, g: u8, b: u8) -> u8 {
    let y = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
    y.round().clamp(0.0, 255.0) as u8
}

pub fn rgb_to_gray(rgb: &RgbImage, out: &mut GrayImage) {
    debug_assert_eq!(rgb.dimensions(), out.dimensions());
    for (dst, src) in out.pixels_mut().zip(rgb.pixels()) {
        dst.0[0] = luma(src.0[0], src.0[1], src.0[2]);
    }
}

// =============================================================================
// Generic step/reset environments
// =============================================================================

pub struct StepOutcome {
    pub frame: RgbImage,
    pub reward: f64,
    pub done: bool,
    /// Remaining lives when the backend exposes them in its step metadata.
    pub lives: Option<i32>,
}

/// Minimal gym-style environment: reset, then step with an action index.
pub trait StepEnvironment {
    fn screen_size(&self) -> (u32, u32);

    fn num_actions(&self) -> usize;

    fn reset(&mut self) -> Result<()>;

    fn step(&mut self, action: usize) -> Result<StepOutcome>;

    fn internal_frame_skip(&self) -> u32 {
        1
    }
}

/// Adapts a [`StepEnvironment`] to the loop contract.
///
/// Lives: metadata from the last step when the backend provides it,
/// otherwise 0 once the environment is done and 1 while it runs.
pub struct GymAdapter<E> {
    env: E,
    done: bool,
    lives: Option<i32>,
}

impl<E: StepEnvironment> GymAdapter<E> {
    pub fn new(env: E) -> Self {
        let skip = env.internal_frame_skip();
        if skip > 1 {
            tracing::warn!(
                internal_frame_skip = skip,
                "environment skips frames internally; each interact covers {skip} ticks"
            );
        }
        Self {
            env,
            done: false,
            lives: None,
        }
    }

    pub fn inner(&self) -> &E {
        &self.env
    }

    pub fn into_inner(self) -> E {
        self.env
    }
}

impl<E: StepEnvironment> EnvironmentAdapter for GymAdapter<E> {
    type Action = usize;

    fn screen_size(&self) -> (u32, u32) {
        self.env.screen_size()
    }

    fn game_over(&self) -> bool {
        self.done
    }

    fn lives(&self) -> i32 {
        match self.lives {
            Some(lives) => lives,
            None if self.done => 0,
            None => 1,
        }
    }

    fn reset_game(&mut self) -> Result<()> {
        self.env.reset()?;
        self.done = false;
        self.lives = None;
        Ok(())
    }

    fn map_action(&self, index: usize) -> Result<usize> {
        ensure!(
            index < self.env.num_actions(),
            "action {index} outside action space of {}",
            self.env.num_actions()
        );
        Ok(index)
    }

    fn interact(&mut self, action: usize, screen: &mut GrayImage) -> Result<f64> {
        ensure!(
            action < self.env.num_actions(),
            "action {action} outside action space of {}",
            self.env.num_actions()
        );
        let outcome = self.env.step(action)?;
        ensure!(
            outcome.frame.dimensions() == screen.dimensions(),
            "environment returned a {:?} frame, expected {:?}",
            outcome.frame.dimensions(),
            screen.dimensions()
        );
        rgb_to_gray(&outcome.frame, screen);
        self.done = outcome.done;
        if outcome.lives.is_some() {
            self.lives = outcome.lives;
        }
        Ok(outcome.reward)
    }

    fn internal_frame_skip(&self) -> u32 {
        self.env.internal_frame_skip()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Corridor {
        pos: u32,
        len: u32,
        report_lives: bool,
    }

    impl StepEnvironment for Corridor {
        fn screen_size(&self) -> (u32, u32) {
            (3, 1)
        }

        fn num_actions(&self) -> usize {
            2
        }

        fn reset(&mut self) -> Result<()> {
            self.pos = 0;
            Ok(())
        }

        fn step(&mut self, action: usize) -> Result<StepOutcome> {
            if action == 1 {
                self.pos += 1;
            }
            let done = self.pos >= self.len;
            Ok(StepOutcome {
                frame: RgbImage::from_pixel(3, 1, image::Rgb([255, 0, 0])),
                reward: if done { 1.0 } else { 0.0 },
                done,
                lives: self.report_lives.then_some(5 - self.pos as i32),
            })
        }
    }

    #[test]
    fn test_luma_weights() {
        assert_eq!(luma(0, 0, 0), 0);
        assert_eq!(luma(255, 255, 255), 255);
        assert_eq!(luma(255, 0, 0), 76);
        assert_eq!(luma(0, 255, 0), 150);
        assert_eq!(luma(0, 0, 255), 29);
    }

    #[test]
    fn test_lives_placeholder_without_metadata() {
        let mut adapter = GymAdapter::new(Corridor {
            pos: 0,
            len: 2,
            report_lives: false,
        });
        let mut screen = GrayImage::new(3, 1);
        adapter.reset_game().unwrap();
        assert_eq!(adapter.lives(), 1);

        adapter.interact(1, &mut screen).unwrap();
        assert!(!adapter.game_over());
        assert_eq!(adapter.lives(), 1);
        assert!(screen.pixels().all(|p| p.0[0] == 76));

        let reward = adapter.interact(1, &mut screen).unwrap();
        assert_eq!(reward, 1.0);
        assert!(adapter.game_over());
        assert_eq!(adapter.lives(), 0);

        adapter.reset_game().unwrap();
        assert!(!adapter.game_over());
        assert_eq!(adapter.lives(), 1);
    }

    #[test]
    fn test_lives_from_metadata() {
        let mut adapter = GymAdapter::new(Corridor {
            pos: 0,
            len: 10,
            report_lives: true,
        });
        let mut screen = GrayImage::new(3, 1);
        adapter.interact(1, &mut screen).unwrap();
        adapter.interact(1, &mut screen).unwrap();
        assert_eq!(adapter.lives(), 3);
    }

    #[test]
    fn test_out_of_range_action_is_an_error() {
        let mut adapter = GymAdapter::new(Corridor {
            pos: 0,
            len: 2,
            report_lives: false,
        });
        assert_eq!(adapter.map_action(1).unwrap(), 1);
        assert!(adapter.map_action(2).is_err());
        let mut screen = GrayImage::new(3, 1);
        assert!(adapter.interact(7, &mut screen).is_err());
    }
}
