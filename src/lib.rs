#![forbid(unsafe_op_in_unsafe_fn)]

mod audio;
mod channel;
mod client;
mod constants;
mod error;
mod gates;
mod layout;
mod naming;
mod pacing;
mod posix;
mod producer;
mod pump;
mod queue;
mod server;
mod shared;

pub mod cell;
pub mod event;
pub mod ffi;
pub mod input;
pub mod testpattern;
pub mod video;

pub use audio::AudioRing;
pub use channel::{ChannelManager, VideoOutcome};
pub use client::ChildPage;
pub use constants::{
    AUDIO_GUARD_PATTERN, EVENT_QUEUE_CAPACITY, MAX_BUTTONS, MAX_PORTS, PRODUCER_API_VERSION,
    SHARED_MAGIC, SHARED_VERSION,
};
pub use error::{FsrvError, Result};
pub use event::{ControlEvent, Event, InputValue, IoEvent, Label};
pub use gates::{Gate, SemaphoreTriad};
pub use input::{InputState, InputUpdate};
pub use layout::PageGeometry;
pub use pacing::FrameSkip;
pub use producer::{AvInfo, Content, FrameIo, Producer, StepStatus, SystemInfo};
pub use pump::{serve, FramePump, PumpOptions, PumpState, Termination};
pub use server::{FrameView, ParentPage};
