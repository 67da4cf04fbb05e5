use anyhow::{Context, Result, bail, ensure};
use image::GrayImage;
use std::path::Path;
use tetanes_core::input::{JoypadBtn, JoypadBtnState};
use tetanes_core::mem::Read;
use tetanes_core::prelude::*;

use crate::env::{EnvironmentAdapter, luma};

pub const SCREEN_WIDTH: u32 = 256;
pub const SCREEN_HEIGHT: u32 = 240;

// =============================================================================
// RAM Addresses (Kung Fu / Spartan X)
// =============================================================================

pub mod ram {
    pub const PLAYER_LIVES: u16 = 0x005C;
    // 0x00 = title screen, 0x01 = countdown, 0x02 = demo/playing (see START_TIMER)
    pub const GAME_MODE: u16 = 0x0062;
    // Counts down to 0 before player input is accepted
    pub const START_TIMER: u16 = 0x003A;
    pub const SCORE_DIGITS: [u16; 6] = [0x0531, 0x0532, 0x0533, 0x0534, 0x0535, 0x0536];
}

const GAME_MODE_TITLE: u8 = 0x00;
const GAME_MODE_COUNTDOWN: u8 = 0x01;
const GAME_MODE_ACTION: u8 = 0x02;

const START_PRESS_FRAMES: u32 = 2;
const START_PRESS_INTERVAL: u32 = 30;
const RESET_MAX_FRAMES: u32 = 600;

// =============================================================================
// Action Space
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Noop,
    Right,
    Left,
    Crouch,
    Jump,
    RightPunch,
    RightKick,
    LeftPunch,
    LeftKick,
    CrouchPunch,
    CrouchKick,
    JumpPunch,
    JumpKick,
}

impl Action {
    pub const ALL: [Action; 13] = [
        Action::Noop,
        Action::Right,
        Action::Left,
        Action::Crouch,
        Action::Jump,
        Action::RightPunch,
        Action::RightKick,
        Action::LeftPunch,
        Action::LeftKick,
        Action::CrouchPunch,
        Action::CrouchKick,
        Action::JumpPunch,
        Action::JumpKick,
    ];
    pub const COUNT: usize = Self::ALL.len();

    pub fn from_index(i: usize) -> Option<Self> {
        Self::ALL.get(i).copied()
    }

    fn buttons(self) -> &'static [JoypadBtn] {
        use JoypadBtn::*;
        match self {
            Action::Noop => &[],
            Action::Right => &[Right],
            Action::Left => &[Left],
            Action::Crouch => &[Down],
            Action::Jump => &[Up],
            Action::RightPunch => &[Right, B],
            Action::RightKick => &[Right, A],
            Action::LeftPunch => &[Left, B],
            Action::LeftKick => &[Left, A],
            Action::CrouchPunch => &[Down, B],
            Action::CrouchKick => &[Down, A],
            Action::JumpPunch => &[Up, B],
            Action::JumpKick => &[Up, A],
        }
    }

    pub fn to_joypad(self) -> JoypadBtnState {
        let mut state = JoypadBtnState::empty();
        for &btn in self.buttons() {
            state.set(btn.into(), true);
        }
        state
    }
}

// =============================================================================
// NES Adapter
// =============================================================================

pub struct NesAdapter {
    deck: ControlDeck,
    prev_score: u32,
    prev_lives: u8,
    game_over: bool,
}

impl NesAdapter {
    pub fn new(rom_path: &Path, headless: bool) -> Result<Self> {
        let mut deck = ControlDeck::new();
        if headless {
            deck.set_headless_mode(tetanes_core::control_deck::HeadlessMode::NO_AUDIO);
        }
        deck.load_rom_path(rom_path)
            .with_context(|| format!("Failed to load ROM: {}", rom_path.display()))?;
        Ok(Self {
            deck,
            prev_score: 0,
            prev_lives: 0,
            game_over: true,
        })
    }

    fn peek(&self, addr: u16) -> u8 {
        self.deck.bus().peek(addr)
    }

    pub fn read_score(&self) -> u32 {
        score_from_digits(ram::SCORE_DIGITS.map(|addr| self.peek(addr)))
    }

    fn set_buttons(&mut self, btn_state: JoypadBtnState) {
        let joypad = self.deck.joypad_mut(Player::One);
        for button in [
            JoypadBtnState::LEFT,
            JoypadBtnState::RIGHT,
            JoypadBtnState::UP,
            JoypadBtnState::DOWN,
            JoypadBtnState::A,
            JoypadBtnState::B,
            JoypadBtnState::START,
            JoypadBtnState::SELECT,
        ] {
            joypad.set_button(button, btn_state.contains(button));
        }
    }

    fn clock_frame(&mut self) -> Result<()> {
        self.deck.clock_frame()?;
        Ok(())
    }

    fn press_start(&mut self) -> Result<()> {
        for _ in 0..START_PRESS_FRAMES {
            self.set_buttons(JoypadBtnState::START);
            self.clock_frame()?;
        }
        self.set_buttons(JoypadBtnState::empty());
        Ok(())
    }

    /// Press Start through title and demo screens until the countdown of a
    /// real game has finished.
    fn wait_for_play(&mut self) -> Result<()> {
        let mut frames = 0u32;
        let mut since_press = START_PRESS_INTERVAL;
        let mut countdown_seen = false;

        while frames < RESET_MAX_FRAMES {
            let mode = self.peek(ram::GAME_MODE);
            let start_timer = self.peek(ram::START_TIMER);
            if start_timer > 0 || mode == GAME_MODE_COUNTDOWN {
                countdown_seen = true;
            }

            match mode {
                GAME_MODE_ACTION if start_timer == 0 && countdown_seen => return Ok(()),
                // Attract-mode demo: back to the title screen.
                GAME_MODE_ACTION if start_timer == 0 => {
                    self.press_start()?;
                    frames += START_PRESS_FRAMES;
                    since_press = 0;
                }
                GAME_MODE_TITLE if since_press >= START_PRESS_INTERVAL => {
                    countdown_seen = false;
                    self.press_start()?;
                    frames += START_PRESS_FRAMES;
                    since_press = 0;
                }
                _ => {
                    self.clock_frame()?;
                    frames += 1;
                    since_press += 1;
                }
            }
        }
        bail!(
            "Timed out waiting for play state (mode: 0x{:02X}, start_timer: {})",
            self.peek(ram::GAME_MODE),
            self.peek(ram::START_TIMER)
        )
    }
}

impl EnvironmentAdapter for NesAdapter {
    type Action = Action;

    fn screen_size(&self) -> (u32, u32) {
        (SCREEN_WIDTH, SCREEN_HEIGHT)
    }

    fn game_over(&self) -> bool {
        self.game_over
    }

    fn lives(&self) -> i32 {
        self.peek(ram::PLAYER_LIVES) as i32
    }

    fn reset_game(&mut self) -> Result<()> {
        self.deck.reset(ResetKind::Soft);
        self.set_buttons(JoypadBtnState::empty());
        self.wait_for_play()?;
        self.prev_score = self.read_score();
        self.prev_lives = self.peek(ram::PLAYER_LIVES);
        self.game_over = false;
        Ok(())
    }

    fn map_action(&self, index: usize) -> Result<Action> {
        Action::from_index(index)
            .with_context(|| format!("action {index} outside action space of {}", Action::COUNT))
    }

    fn interact(&mut self, action: Action, screen: &mut GrayImage) -> Result<f64> {
        self.set_buttons(action.to_joypad());
        self.clock_frame()?;

        let fb = self.deck.frame_buffer();
        ensure!(
            fb.len() == (SCREEN_WIDTH * SCREEN_HEIGHT * 4) as usize,
            "unexpected frame buffer size {}",
            fb.len()
        );
        rgba_to_gray(fb, screen);

        let score = self.read_score();
        let reward = score.saturating_sub(self.prev_score) as f64;
        self.prev_score = score;

        let lives = self.peek(ram::PLAYER_LIVES);
        if (lives < self.prev_lives && lives == 0) || self.peek(ram::GAME_MODE) == GAME_MODE_TITLE {
            self.game_over = true;
        }
        self.prev_lives = lives;
        Ok(reward)
    }
}

/// Six BCD score digits, most significant first.
fn score_from_digits(digits: [u8; 6]) -> u32 {
    digits
        .iter()
        .fold(0u32, |acc, &d| acc * 10 + (d & 0x0F) as u32)
}

fn rgba_to_gray(fb: &[u8], out: &mut GrayImage) {
    for (dst, src) in out.pixels_mut().zip(fb.chunks_exact(4)) {
        dst.0[0] = luma(src[0], src[1], src[2]);
    }
}
