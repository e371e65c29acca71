//! Передача видео и звука в общую страницу (сторона child).

use std::sync::atomic::Ordering;
use std::time::Duration;

use crate::audio::AudioRing;
use crate::error::{FsrvError, Result};
use crate::gates::Gate;
use crate::shared::SharedView;
use crate::video::{self, VideoFrame};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VideoOutcome {
    Written { resized: bool },
    /// Был выставлен флаг пропуска кадра; общий буфер не тронут.
    Skipped,
}

pub struct ChannelManager {
    view: SharedView,
    max_width: u32,
    max_height: u32,
    skip_next: bool,
    audio: AudioRing,
    frames_written: u64,
    frames_skipped: u64,
}

impl ChannelManager {
    pub fn new(view: SharedView, audio: AudioRing) -> Result<Self> {
        let header = view.header();
        let (max_width, max_height) = (header.max_width as u32, header.max_height as u32);
        if (audio.capacity() + 1) * std::mem::size_of::<i16>() > view.layout().audio_capacity {
            return Err(FsrvError::CapacityExceeded);
        }
        Ok(Self {
            view,
            max_width,
            max_height,
            skip_next: false,
            audio,
            frames_written: 0,
            frames_skipped: 0,
        })
    }

    /// Пропустить следующую конвертацию видео. Сбрасывается после применения.
    pub fn set_skip_next(&mut self) {
        self.skip_next = true;
    }

    pub fn skip_pending(&self) -> bool {
        self.skip_next
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    pub fn frames_skipped(&self) -> u64 {
        self.frames_skipped
    }

    pub fn audio(&self) -> &AudioRing {
        &self.audio
    }

    /// Конвертирует кадр producer'а в общий видеобуфер. Вызывающий должен
    /// держать video gate. Смена размера обновляет заголовок и выставляет
    /// `resized`; сам буфер никогда не перевыделяется.
    pub fn submit_video(&mut self, frame: &VideoFrame<'_>) -> Result<VideoOutcome> {
        if self.skip_next {
            self.skip_next = false;
            self.frames_skipped += 1;
            return Ok(VideoOutcome::Skipped);
        }
        frame.validate()?;
        if frame.width > self.max_width || frame.height > self.max_height {
            return Err(FsrvError::InvalidFrame("frame exceeds page capacity"));
        }

        video::convert(frame, unsafe { self.view.video_mut() })?;

        let header = self.view.header();
        let resized = header.width.load(Ordering::Relaxed) as u32 != frame.width
            || header.height.load(Ordering::Relaxed) as u32 != frame.height;
        if resized {
            header.width.store(frame.width as u16, Ordering::Relaxed);
            header.height.store(frame.height as u16, Ordering::Relaxed);
            header.resized.store(true, Ordering::Release);
            tracing::info!(width = frame.width, height = frame.height, "frameserver resized");
        }
        self.frames_written += 1;
        Ok(VideoOutcome::Written { resized })
    }

    pub fn append_audio_frames(&mut self, interleaved: &[i16]) -> usize {
        self.audio.append_frames(interleaved)
    }

    pub fn append_audio_sample(&mut self, left: i16, right: i16) {
        self.audio.append_sample(left, right);
    }

    /// Копирует накопленные сэмплы в общий аудиорегион, выставляет
    /// `audio_ready` и начинает новый цикл. Вызывающий должен держать audio
    /// gate. Возвращает число опубликованных байт.
    pub fn publish_audio(&mut self) -> usize {
        let header = self.view.header();
        let region = unsafe { self.view.audio_mut() };
        let samples = self.audio.samples();
        let bytes = samples.len() * std::mem::size_of::<i16>();
        for (dst, sample) in region.chunks_exact_mut(2).zip(samples) {
            dst.copy_from_slice(&sample.to_le_bytes());
        }
        header.audio_bytes_used.store(bytes as u32, Ordering::Relaxed);
        header.audio_ready.store(true, Ordering::Release);

        if self.audio.reset() {
            tracing::warn!(
                overruns = self.audio.overruns(),
                "producer overran the audio ring, guard sample tripped"
            );
        }
        bytes
    }

    /// Ждёт аудиорегион, публикует звук и отдаёт регион родителю.
    /// `Ok(None)` при таймауте.
    pub fn flush_audio(&mut self, gate: &Gate, timeout: Option<Duration>) -> Result<Option<usize>> {
        if !gate.acquire_from_parent(timeout)? {
            return Ok(None);
        }
        let bytes = self.publish_audio();
        gate.release_to_parent()?;
        Ok(Some(bytes))
    }

    /// Выставляет `video_ready` перед post в gate.
    pub fn mark_video_ready(&self) {
        self.view.header().video_ready.store(true, Ordering::Release);
    }
}
