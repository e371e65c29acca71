use std::time::{Duration, Instant};

/// Frames of lag after which the schedule is reset instead of caught up.
const RESYNC_FRAMES: u32 = 8;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FrameSkip {
    #[default]
    Off,
    /// Drop video conversions to keep the producer on its native schedule
    /// when the consumer refreshes slower than the producer runs.
    Auto,
}

impl std::str::FromStr for FrameSkip {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "off" => Ok(FrameSkip::Off),
            "auto" => Ok(FrameSkip::Auto),
            other => Err(format!("unknown frameskip mode {other:?} (expected off or auto)")),
        }
    }
}

/// Tracks the producer's native schedule against wall time.
#[derive(Debug)]
pub struct FramePacer {
    mode: FrameSkip,
    period: Duration,
    origin: Instant,
    frames: u64,
}

impl FramePacer {
    pub fn new(mode: FrameSkip, fps: f64, now: Instant) -> Self {
        let period = if fps > 0.0 {
            Duration::from_secs_f64(1.0 / fps)
        } else {
            Duration::ZERO
        };
        Self {
            mode,
            period,
            origin: now,
            frames: 0,
        }
    }

    /// Records that one producer frame has run.
    pub fn frame_done(&mut self) {
        self.frames += 1;
    }

    /// True when the producer is a full frame or more behind its schedule and
    /// the next frame should run with its video conversion skipped.
    pub fn should_skip(&mut self, now: Instant) -> bool {
        if self.mode == FrameSkip::Off || self.period.is_zero() {
            return false;
        }
        let expected = self.origin + self.period * self.frames.min(u32::MAX as u64) as u32;
        let Some(lag) = now.checked_duration_since(expected) else {
            return false;
        };
        if lag > self.period * RESYNC_FRAMES {
            tracing::debug!(?lag, "frame schedule resynchronized");
            self.origin = now;
            self.frames = 0;
            return false;
        }
        lag >= self.period
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_pacer_never_skips() {
        let start = Instant::now();
        let mut pacer = FramePacer::new(FrameSkip::Off, 60.0, start);
        assert!(!pacer.should_skip(start + Duration::from_secs(1)));
    }

    #[test]
    fn skips_when_a_full_frame_behind() {
        let start = Instant::now();
        let mut pacer = FramePacer::new(FrameSkip::Auto, 50.0, start);
        // 20ms period; two frames run in 50ms leaves the schedule 10ms late
        pacer.frame_done();
        pacer.frame_done();
        assert!(!pacer.should_skip(start + Duration::from_millis(50)));
        // at 65ms it is 25ms (more than one frame) late
        assert!(pacer.should_skip(start + Duration::from_millis(65)));
        pacer.frame_done();
        assert!(!pacer.should_skip(start + Duration::from_millis(65)));
    }

    #[test]
    fn ahead_of_schedule_never_skips() {
        let start = Instant::now();
        let mut pacer = FramePacer::new(FrameSkip::Auto, 60.0, start);
        for _ in 0..10 {
            pacer.frame_done();
        }
        assert!(!pacer.should_skip(start + Duration::from_millis(10)));
    }

    #[test]
    fn long_stall_resynchronizes() {
        let start = Instant::now();
        let mut pacer = FramePacer::new(FrameSkip::Auto, 50.0, start);
        let later = start + Duration::from_secs(2);
        assert!(!pacer.should_skip(later));
        assert!(!pacer.should_skip(later + Duration::from_millis(5)));
        assert!(pacer.should_skip(later + Duration::from_millis(25)));
    }

    #[test]
    fn modes_parse_from_text() {
        assert_eq!("auto".parse::<FrameSkip>(), Ok(FrameSkip::Auto));
        assert_eq!("off".parse::<FrameSkip>(), Ok(FrameSkip::Off));
        assert!("sometimes".parse::<FrameSkip>().is_err());
    }
}
