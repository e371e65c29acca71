//! Built-in producer used by the `frameserver` binary and the integration
//! tests: color bars with a player-controlled box and a square-wave tone.

use crate::input::{BUTTON_A, BUTTON_DOWN, BUTTON_LEFT, BUTTON_RIGHT, BUTTON_UP, DEVICE_JOYPAD};
use crate::producer::{AvInfo, Content, FrameIo, Producer, StepStatus, SystemInfo};
use crate::video::{PixelFormat, VideoFrame};

pub const MAX_WIDTH: u16 = 320;
pub const MAX_HEIGHT: u16 = 240;
pub const FRAME_WIDTH: u32 = 256;
pub const FRAME_HEIGHT: u32 = 224;
pub const FPS: f64 = 60.0;
pub const SAMPLE_RATE: f64 = 48_000.0;

const BOX_SIZE: u32 = 16;
const TONE_HZ: u32 = 440;
const AMPLITUDE: i16 = 4_000;
const BARS: [u16; 8] = [
    0xffff, 0xffe0, 0x07ff, 0x07e0, 0xf81f, 0xf800, 0x001f, 0x0000,
];

pub struct TestPattern {
    pixels: Vec<u8>,
    audio: Vec<i16>,
    box_x: u32,
    box_y: u32,
    phase: u32,
    frames: u64,
    stop_after: Option<u64>,
}

impl TestPattern {
    pub fn new() -> Self {
        Self {
            pixels: vec![0; (FRAME_WIDTH * FRAME_HEIGHT * 2) as usize],
            audio: Vec::new(),
            box_x: 0,
            box_y: 0,
            phase: 0,
            frames: 0,
            stop_after: None,
        }
    }

    /// Reports `Stop` after `frames` steps.
    pub fn stop_after(mut self, frames: u64) -> Self {
        self.stop_after = Some(frames);
        self
    }

    pub fn box_position(&self) -> (u32, u32) {
        (self.box_x, self.box_y)
    }

    fn read_input(&mut self, io: &FrameIo<'_>) {
        let pressed = |id: usize| io.input_state(0, DEVICE_JOYPAD, 0, id as u32) != 0;
        if pressed(BUTTON_LEFT) {
            self.box_x = self.box_x.saturating_sub(1);
        }
        if pressed(BUTTON_RIGHT) {
            self.box_x = (self.box_x + 1).min(FRAME_WIDTH - BOX_SIZE);
        }
        if pressed(BUTTON_UP) {
            self.box_y = self.box_y.saturating_sub(1);
        }
        if pressed(BUTTON_DOWN) {
            self.box_y = (self.box_y + 1).min(FRAME_HEIGHT - BOX_SIZE);
        }
    }

    fn draw(&mut self, highlight: bool) {
        let bar_width = FRAME_WIDTH / BARS.len() as u32;
        let box_color: u16 = if highlight { 0xf800 } else { 0x0000 };
        for (y, row) in self
            .pixels
            .chunks_exact_mut(FRAME_WIDTH as usize * 2)
            .enumerate()
        {
            let y = y as u32;
            for (x, px) in row.chunks_exact_mut(2).enumerate() {
                let x = x as u32;
                let inside = (self.box_x..self.box_x + BOX_SIZE).contains(&x)
                    && (self.box_y..self.box_y + BOX_SIZE).contains(&y);
                let color = if inside {
                    box_color
                } else {
                    BARS[((x / bar_width) as usize).min(BARS.len() - 1)]
                };
                px.copy_from_slice(&color.to_le_bytes());
            }
        }
    }

    fn tone(&mut self) {
        let frames = (SAMPLE_RATE / FPS).round() as u32;
        let half_period = SAMPLE_RATE as u32 / TONE_HZ / 2;
        self.audio.clear();
        for _ in 0..frames {
            let sample = if (self.phase / half_period) % 2 == 0 {
                AMPLITUDE
            } else {
                -AMPLITUDE
            };
            self.audio.extend_from_slice(&[sample, sample]);
            self.phase = (self.phase + 1) % (half_period * 2);
        }
    }
}

impl Default for TestPattern {
    fn default() -> Self {
        Self::new()
    }
}

impl Producer for TestPattern {
    fn init(&mut self) -> SystemInfo {
        SystemInfo {
            library_name: "testpattern".into(),
            library_version: env!("CARGO_PKG_VERSION").into(),
            valid_extensions: String::new(),
        }
    }

    fn load(&mut self, _content: &Content) -> bool {
        true
    }

    fn av_info(&self) -> AvInfo {
        AvInfo {
            max_width: MAX_WIDTH,
            max_height: MAX_HEIGHT,
            fps: FPS,
            sample_rate: SAMPLE_RATE,
        }
    }

    fn reset(&mut self) {
        self.box_x = (FRAME_WIDTH - BOX_SIZE) / 2;
        self.box_y = (FRAME_HEIGHT - BOX_SIZE) / 2;
        self.phase = 0;
    }

    fn step(&mut self, io: &mut FrameIo<'_>) -> StepStatus {
        if self.stop_after.is_some_and(|limit| self.frames >= limit) {
            return StepStatus::Stop;
        }
        self.read_input(io);
        let highlight = io.input_state(0, DEVICE_JOYPAD, 0, BUTTON_A as u32) != 0;
        self.draw(highlight);
        let frame = VideoFrame::new(
            &self.pixels,
            FRAME_WIDTH,
            FRAME_HEIGHT,
            FRAME_WIDTH as usize * 2,
            PixelFormat::Rgb565,
        );
        io.video_refresh(&frame);

        self.tone();
        io.audio_sample_batch(&self.audio);
        self.frames += 1;
        StepStatus::Continue
    }
}
