//! The capability interface a frame producer (emulator core, terminal
//! renderer, test source) implements for the frame pump.

use std::path::{Path, PathBuf};

use crate::channel::{ChannelManager, VideoOutcome};
use crate::constants::{CANONICAL_BPP, PRODUCER_API_VERSION};
use crate::error::{FsrvError, Result};
use crate::input::InputState;
use crate::layout::PageGeometry;
use crate::video::VideoFrame;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SystemInfo {
    pub library_name: String,
    pub library_version: String,
    pub valid_extensions: String,
}

/// Geometry and timing the producer runs at.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AvInfo {
    pub max_width: u16,
    pub max_height: u16,
    pub fps: f64,
    pub sample_rate: f64,
}

impl AvInfo {
    /// Page geometry this producer needs: canonical pixels, stereo audio.
    pub fn geometry(&self) -> PageGeometry {
        PageGeometry::new(
            self.max_width,
            self.max_height,
            CANONICAL_BPP,
            2,
            self.sample_rate.ceil().max(0.0) as u32,
        )
    }
}

/// Content handed to `Producer::load`: the resource path and its bytes.
#[derive(Clone, Debug, Default)]
pub struct Content {
    pub path: Option<PathBuf>,
    pub data: Vec<u8>,
}

impl Content {
    pub fn from_path(path: &Path) -> Result<Self> {
        let data = std::fs::read(path).map_err(|err| FsrvError::from_io(err, "reading content"))?;
        Ok(Self {
            path: Some(path.to_path_buf()),
            data,
        })
    }

    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self { path: None, data }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepStatus {
    Continue,
    /// The producer cannot go on; the pump terminates.
    Stop,
}

pub trait Producer {
    fn api_version(&self) -> u32 {
        PRODUCER_API_VERSION
    }

    fn init(&mut self) -> SystemInfo;

    /// Returns false when the content cannot be used.
    fn load(&mut self, content: &Content) -> bool;

    fn av_info(&self) -> AvInfo;

    fn reset(&mut self);

    /// Runs one frame, delivering video, audio and reading input through `io`.
    fn step(&mut self, io: &mut FrameIo<'_>) -> StepStatus;
}

impl<P: Producer + ?Sized> Producer for Box<P> {
    fn api_version(&self) -> u32 {
        (**self).api_version()
    }

    fn init(&mut self) -> SystemInfo {
        (**self).init()
    }

    fn load(&mut self, content: &Content) -> bool {
        (**self).load(content)
    }

    fn av_info(&self) -> AvInfo {
        (**self).av_info()
    }

    fn reset(&mut self) {
        (**self).reset()
    }

    fn step(&mut self, io: &mut FrameIo<'_>) -> StepStatus {
        (**self).step(io)
    }
}

/// Callback surface offered to the producer for the duration of one step.
pub struct FrameIo<'a> {
    channels: &'a mut ChannelManager,
    input: &'a InputState,
}

impl<'a> FrameIo<'a> {
    pub fn new(channels: &'a mut ChannelManager, input: &'a InputState) -> Self {
        Self { channels, input }
    }

    /// Video-frame delivery. A frame that cannot be converted is dropped
    /// with a warning so frame delivery keeps going.
    pub fn video_refresh(&mut self, frame: &VideoFrame<'_>) -> Option<VideoOutcome> {
        match self.channels.submit_video(frame) {
            Ok(outcome) => Some(outcome),
            Err(err) => {
                tracing::warn!(
                    width = frame.width,
                    height = frame.height,
                    "dropping video frame: {err}"
                );
                None
            }
        }
    }

    /// Audio-batch delivery of interleaved stereo frames.
    pub fn audio_sample_batch(&mut self, interleaved: &[i16]) -> usize {
        self.channels.append_audio_frames(interleaved)
    }

    /// Single stereo sample delivery.
    pub fn audio_sample(&mut self, left: i16, right: i16) {
        self.channels.append_audio_sample(left, right);
    }

    pub fn input_state(&self, port: u32, device: u32, index: u32, id: u32) -> i16 {
        self.input.query(port, device, index, id)
    }
}
