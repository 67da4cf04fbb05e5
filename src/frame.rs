use anyhow::Result;
use image::GrayImage;
use image::imageops::{self, FilterType};

/// Number of raw frames kept for deflickering.
pub const BUFFER_DEPTH: usize = 2;

// =============================================================================
// Frame Buffer
// =============================================================================

/// Two-slot ring of raw screens.
///
/// Arcade hardware often draws sprites on alternate frames only, so the
/// observation handed to the agent is the pixel-wise max of the last two
/// screens, resized to the network input size.
pub struct FrameBuffer {
    slots: [GrayImage; BUFFER_DEPTH],
    count: u64,
    resized_width: u32,
    resized_height: u32,
}

impl FrameBuffer {
    pub fn new(width: u32, height: u32, resized_width: u32, resized_height: u32) -> Self {
        Self {
            slots: [GrayImage::new(width, height), GrayImage::new(width, height)],
            count: 0,
            resized_width,
            resized_height,
        }
    }

    pub fn screen_size(&self) -> (u32, u32) {
        self.slots[0].dimensions()
    }

    pub fn observation_size(&self) -> (u32, u32) {
        (self.resized_width, self.resized_height)
    }

    /// Total number of frames written since construction.
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn is_primed(&self) -> bool {
        self.count >= BUFFER_DEPTH as u64
    }

    fn slot_index(count: u64) -> usize {
        (count % BUFFER_DEPTH as u64) as usize
    }

    /// Copy `frame` into the next slot, overwriting the oldest screen.
    pub fn write(&mut self, frame: &GrayImage) {
        assert_eq!(
            frame.dimensions(),
            self.screen_size(),
            "frame size does not match screen size"
        );
        let slot = &mut self.slots[Self::slot_index(self.count)];
        slot.copy_from_slice(frame.as_raw());
        self.count += 1;
    }

    /// Lend the next slot to `fill`. The write only counts if `fill` succeeds,
    /// so a failed tick never exposes a half-written screen.
    pub fn write_with<R>(&mut self, fill: impl FnOnce(&mut GrayImage) -> Result<R>) -> Result<R> {
        let expected = self.screen_size();
        let slot = &mut self.slots[Self::slot_index(self.count)];
        let out = fill(slot)?;
        assert_eq!(slot.dimensions(), expected, "adapter resized the screen slot");
        self.count += 1;
        Ok(out)
    }

    /// Pixel-wise maximum of the two most recently written screens.
    pub fn max_frame(&self) -> GrayImage {
        assert!(
            self.is_primed(),
            "need {BUFFER_DEPTH} frames before deriving an observation, have {}",
            self.count
        );
        let newest = &self.slots[Self::slot_index(self.count - 1)];
        let previous = &self.slots[Self::slot_index(self.count - 2)];
        let (width, height) = newest.dimensions();
        let pixels = newest
            .as_raw()
            .iter()
            .zip(previous.as_raw())
            .map(|(&a, &b)| a.max(b))
            .collect();
        match GrayImage::from_raw(width, height, pixels) {
            Some(merged) => merged,
            None => unreachable!("screen slots diverged in size"),
        }
    }

    /// Agent-facing observation: deflickered screen at the resized resolution.
    pub fn observation(&self) -> GrayImage {
        let merged = self.max_frame();
        if merged.dimensions() == self.observation_size() {
            return merged;
        }
        imageops::resize(
            &merged,
            self.resized_width,
            self.resized_height,
            FilterType::Triangle,
        )
    }
}
