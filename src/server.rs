use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use crate::error::Result;
use crate::event::Event;
use crate::gates::SemaphoreTriad;
use crate::layout::PageGeometry;
use crate::naming::page_path;
use crate::posix::Mapping;
use crate::queue::EventQueue;
use crate::shared::SharedView;

/// Кадр, переданный child, в каноническом упакованном формате.
#[derive(Clone, Copy, Debug)]
pub struct FrameView<'a> {
    pub width: u32,
    pub height: u32,
    pub pixels: &'a [u8],
}

/// Конец страницы со стороны display server (родитель). Создаёт страницу и
/// семафоры и удаляет их при drop.
pub struct ParentPage {
    _mapping: Mapping,
    view: SharedView,
    sems: SemaphoreTriad,
    outbound: EventQueue,
    inbound: EventQueue,
    holding_frame: bool,
}

unsafe impl Send for ParentPage {}

impl ParentPage {
    /// Создаёт страницу для `key` с максимальной геометрией. Ёмкость
    /// фиксируется здесь; child меняет только логические размеры и флаги.
    pub fn create(key: &str, geometry: PageGeometry) -> Result<Self> {
        let layout = geometry.layout()?;
        let path = page_path(key)?;
        let mut mapping = Mapping::create(&path, layout.size)?;
        let mut view = unsafe { SharedView::new(mapping.as_mut_ptr(), layout) };

        view.header_mut().init(&geometry, &layout);
        view.child_queue().reset();
        view.parent_queue().reset();

        let sems = SemaphoreTriad::create(key)?;
        // аудиорегион изначально свободен для child
        sems.audio.release_to_child()?;

        let outbound = unsafe { EventQueue::new(view.parent_queue()) };
        let inbound = unsafe { EventQueue::new(view.child_queue()) };

        tracing::info!(key, ?geometry, size = layout.size, "created shared page");

        Ok(Self {
            _mapping: mapping,
            view,
            sems,
            outbound,
            inbound,
            holding_frame: false,
        })
    }

    pub fn geometry(&self) -> PageGeometry {
        self.view.header().geometry()
    }

    /// Первый post видео: child может писать в страницу.
    pub fn signal_ready(&self) -> Result<()> {
        self.sems.video.release_to_child()
    }

    /// Ждёт кадр от child. Пока кадр удерживается, child не может писать
    /// в видеобуфер.
    pub fn wait_frame(&mut self, timeout: Option<Duration>) -> Result<bool> {
        if self.holding_frame {
            return Ok(true);
        }
        self.holding_frame = self.sems.video.acquire_from_child(timeout)?;
        Ok(self.holding_frame)
    }

    /// Удерживаемый кадр, если есть.
    pub fn frame(&self) -> Option<FrameView<'_>> {
        if !self.holding_frame {
            return None;
        }
        let header = self.view.header();
        let width = header.width.load(Ordering::Acquire) as u32;
        let height = header.height.load(Ordering::Acquire) as u32;
        let len = (width as usize * height as usize * 4).min(self.view.layout().video_capacity);
        let pixels = unsafe { &self.view.video()[..len] };
        Some(FrameView {
            width,
            height,
            pixels,
        })
    }

    pub fn video_ready(&self) -> bool {
        self.view.header().video_ready.load(Ordering::Acquire)
    }

    /// Прочитать и сбросить флаг resize.
    pub fn take_resized(&self) -> bool {
        self.view.header().resized.swap(false, Ordering::AcqRel)
    }

    /// Возвращает удерживаемый кадр child.
    pub fn release_frame(&mut self) -> Result<()> {
        if !self.holding_frame {
            return Ok(());
        }
        self.view.header().video_ready.store(false, Ordering::Release);
        self.holding_frame = false;
        self.sems.video.release_to_child()
    }

    /// Шаг present раз за обновление экрана: ждёт кадр до `timeout`, отдаёт
    /// его в `present` вместе со сброшенным флагом resize и возвращает буфер
    /// child. Результат: был ли показан кадр.
    pub fn present<F>(&mut self, timeout: Option<Duration>, present: F) -> Result<bool>
    where
        F: FnOnce(&FrameView<'_>, bool),
    {
        if !self.wait_frame(timeout)? {
            return Ok(false);
        }
        let resized = self.take_resized();
        if let Some(frame) = self.frame() {
            present(&frame, resized);
        }
        self.release_frame()?;
        Ok(true)
    }

    /// Забирает звук одного цикла в `out` (interleaved i16). `Ok(None)`, если
    /// child не передал регион вовремя.
    pub fn take_audio(
        &self,
        timeout: Option<Duration>,
        out: &mut Vec<i16>,
    ) -> Result<Option<usize>> {
        if !self.sems.audio.acquire_from_child(timeout)? {
            return Ok(None);
        }
        let header = self.view.header();
        let region = unsafe { self.view.audio() };
        let used = (header.audio_bytes_used.load(Ordering::Acquire) as usize).min(region.len());
        out.clear();
        out.extend(
            region[..used]
                .chunks_exact(2)
                .map(|b| i16::from_le_bytes([b[0], b[1]])),
        );
        header.audio_ready.store(false, Ordering::Release);
        self.sems.audio.release_to_child()?;
        Ok(Some(out.len()))
    }

    /// Ставит событие в очередь child и делает post семафора событий.
    /// `Ok(false)`, если очередь полна и событие отброшено.
    pub fn send_event(&self, event: &Event) -> Result<bool> {
        if !self.outbound.enqueue(&event.to_record()) {
            return Ok(false);
        }
        self.sems.event.post()?;
        Ok(true)
    }

    /// Следующее событие от child, если есть. Не блокирует.
    pub fn poll_event(&self) -> Option<Event> {
        self.inbound.poll_event()
    }

    /// Забирает всё, что child успел поставить в очередь.
    pub fn poll_events(&self) -> Vec<Event> {
        std::iter::from_fn(|| self.poll_event()).collect()
    }

    /// Ждёт, пока child что-то поставит в очередь или истечёт `timeout`, затем
    /// забирает очередь child. Семафор событий общий для обоих направлений, а
    /// child его не забирает, поэтому post от нашего же `send_event`
    /// поглощается здесь и ожидание не прерывает.
    pub fn wait_events(&self, timeout: Option<Duration>) -> Result<Vec<Event>> {
        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        while self.inbound.is_empty() {
            let remaining = match deadline {
                Some(deadline) => {
                    let left = deadline.saturating_duration_since(Instant::now());
                    if left.is_zero() {
                        break;
                    }
                    Some(left)
                }
                None => None,
            };
            if !self.sems.event.wait(remaining)? {
                break;
            }
        }
        Ok(self.poll_events())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioRing;
    use crate::channel::ChannelManager;
    use crate::client::ChildPage;

    const WAIT: Option<Duration> = Some(Duration::from_secs(1));

    fn unique_key(tag: &str) -> String {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        format!("server_{tag}_{}_{nanos}", std::process::id())
    }

    #[test]
    fn take_audio_leaves_the_byte_count_to_the_child() {
        let key = unique_key("audio_owner");
        let page = ParentPage::create(&key, PageGeometry::new(64, 64, 4, 2, 8_000)).unwrap();
        let child = ChildPage::attach(&key).unwrap();
        let mut channels = ChannelManager::new(child.view().clone(), AudioRing::new(24)).unwrap();

        for i in 0..5 {
            channels.append_audio_sample(i, -i);
        }
        assert_eq!(channels.flush_audio(&child.semaphores().audio, WAIT).unwrap(), Some(20));

        let mut out = Vec::new();
        assert_eq!(page.take_audio(WAIT, &mut out).unwrap(), Some(10));
        assert_eq!(out, vec![0, 0, 1, -1, 2, -2, 3, -3, 4, -4]);

        let header = child.view().header();
        assert_eq!(header.audio_bytes_used.load(Ordering::Acquire), 20);
        assert!(!header.audio_ready.load(Ordering::Acquire));
    }
}
