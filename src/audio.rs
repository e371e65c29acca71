//! Per-frame audio accumulation ring.
//!
//! The ring holds `capacity` interleaved stereo samples plus one guard slot.
//! A producer that appends more than it reported wraps the write offset back
//! to the start of the ring, overwriting samples of the current frame, and the
//! guard slot is stamped with [`AUDIO_GUARD_PATTERN`]. The overrun is detected,
//! not prevented.

use crate::constants::{AUDIO_GUARD_PATTERN, AUDIO_HEADROOM_SAMPLES};

#[derive(Debug)]
pub struct AudioRing {
    samples: Vec<i16>,
    capacity: usize,
    used: usize,
    overruns: u64,
}

impl AudioRing {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(2);
        Self {
            samples: vec![0; capacity + 1],
            capacity,
            used: 0,
            overruns: 0,
        }
    }

    /// Ring sized for one frame of stereo audio plus headroom:
    /// `round(sample_rate / fps) * 2 + headroom`.
    pub fn for_timing(sample_rate: f64, fps: f64) -> Self {
        let per_frame = if fps > 0.0 {
            (sample_rate / fps).round().max(0.0) as usize
        } else {
            0
        };
        Self::new(per_frame * 2 + AUDIO_HEADROOM_SAMPLES)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Samples (not frames) written since the last reset.
    pub fn used(&self) -> usize {
        self.used
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples[..self.used]
    }

    /// True once an append has run past the nominal end since the last reset.
    pub fn guard_tripped(&self) -> bool {
        self.samples[self.capacity] == AUDIO_GUARD_PATTERN
    }

    /// Overruns seen over the life of the ring.
    pub fn overruns(&self) -> u64 {
        self.overruns
    }

    fn push(&mut self, sample: i16) {
        if self.used == self.capacity {
            if !self.guard_tripped() {
                self.overruns += 1;
            }
            self.samples[self.capacity] = AUDIO_GUARD_PATTERN;
            self.used = 0;
        }
        self.samples[self.used] = sample;
        self.used += 1;
    }

    /// Appends interleaved stereo frames; returns the number of frames taken.
    pub fn append_frames(&mut self, interleaved: &[i16]) -> usize {
        let frames = interleaved.len() / 2;
        for &sample in &interleaved[..frames * 2] {
            self.push(sample);
        }
        frames
    }

    pub fn append_sample(&mut self, left: i16, right: i16) {
        self.push(left);
        self.push(right);
    }

    /// Starts a new cycle. Returns whether the guard had been tripped.
    pub fn reset(&mut self) -> bool {
        let tripped = self.guard_tripped();
        self.samples[self.capacity] = 0;
        self.used = 0;
        tripped
    }
}
