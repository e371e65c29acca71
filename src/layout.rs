use core::cell::UnsafeCell;
use core::mem::size_of;
use core::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, Ordering};

use crate::constants::*;
use crate::error::{FsrvError, Result};

/// Заголовок страницы. Первый блок полей виден потребителю как протокол;
/// слова геометрии после него пишет только создатель, один раз.
#[repr(C, align(64))]
pub struct PageHeader {
    pub magic: u32,
    pub version: u32,
    pub width: AtomicU16,
    pub height: AtomicU16,
    pub resized: AtomicBool,
    pub video_ready: AtomicBool,
    pub audio_ready: AtomicBool,
    _pad0: u8,
    pub audio_buffer_offset: AtomicU32,
    pub audio_bytes_used: AtomicU32,
    pub max_width: u16,
    pub max_height: u16,
    pub bpp: u8,
    pub channels: u8,
    _pad1: [u8; 2],
    pub samplerate: u32,
    pub audio_capacity: u32,
    pub page_size: u32,
    pub reserved: [u32; 5],
}

impl PageHeader {
    /// Пишет новый заголовок. Вызывает только создатель, до подключения пира.
    pub fn init(&mut self, geometry: &PageGeometry, layout: &PageLayout) {
        self.magic = SHARED_MAGIC;
        self.version = SHARED_VERSION;
        self.width.store(0, Ordering::Relaxed);
        self.height.store(0, Ordering::Relaxed);
        self.resized.store(false, Ordering::Relaxed);
        self.video_ready.store(false, Ordering::Relaxed);
        self.audio_ready.store(false, Ordering::Relaxed);
        self._pad0 = 0;
        self.audio_buffer_offset
            .store(layout.audio_offset as u32, Ordering::Relaxed);
        self.audio_bytes_used.store(0, Ordering::Relaxed);
        self.max_width = geometry.max_width;
        self.max_height = geometry.max_height;
        self.bpp = geometry.bpp;
        self.channels = geometry.channels;
        self._pad1 = [0; 2];
        self.samplerate = geometry.samplerate;
        self.audio_capacity = layout.audio_capacity as u32;
        self.page_size = layout.size as u32;
        self.reserved = [0; 5];
    }

    pub fn geometry(&self) -> PageGeometry {
        PageGeometry {
            max_width: self.max_width,
            max_height: self.max_height,
            bpp: self.bpp,
            channels: self.channels,
            samplerate: self.samplerate,
        }
    }

    /// Проверяет страницу другой стороны на соответствие её геометрии.
    pub fn validate(&self, mapped_len: usize) -> Result<PageLayout> {
        if self.magic != SHARED_MAGIC {
            return Err(FsrvError::Corrupted);
        }
        if self.version != SHARED_VERSION {
            return Err(FsrvError::VersionMismatch {
                found: self.version,
                expected: SHARED_VERSION,
            });
        }
        let layout = self.geometry().layout()?;
        if layout.size != self.page_size as usize
            || layout.size > mapped_len
            || layout.audio_offset != self.audio_buffer_offset.load(Ordering::Acquire) as usize
            || layout.audio_capacity != self.audio_capacity as usize
        {
            return Err(FsrvError::Corrupted);
        }
        Ok(layout)
    }
}

/// Запись события фиксированного размера, хранится прямо в слоте очереди.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EventRecord {
    pub category: u8,
    pub kind: u8,
    pub label_len: u8,
    pub reserved: u8,
    pub value: i32,
    pub label: [u8; EVENT_LABEL_LEN],
}

impl EventRecord {
    pub const EMPTY: EventRecord = EventRecord {
        category: 0,
        kind: 0,
        label_len: 0,
        reserved: 0,
        value: 0,
        label: [0; EVENT_LABEL_LEN],
    };
}

const _: () = assert!(size_of::<EventRecord>() == 32);

/// Встроенная очередь событий: массив слотов и два индекса.
/// `back` двигает только пишущая сторона, `front` только читающая.
#[repr(C, align(64))]
pub struct QueueBlock {
    pub slots: [UnsafeCell<EventRecord>; EVENT_QUEUE_CAPACITY],
    pub front: AtomicU32,
    pub back: AtomicU32,
    pub reserved: [u32; 14],
}

// Слоты трогает только сторона, владеющая соответствующим индексом.
unsafe impl Sync for QueueBlock {}

impl QueueBlock {
    pub fn new() -> Self {
        QueueBlock {
            slots: core::array::from_fn(|_| UnsafeCell::new(EventRecord::EMPTY)),
            front: AtomicU32::new(0),
            back: AtomicU32::new(0),
            reserved: [0; 14],
        }
    }

    pub fn reset(&self) {
        self.front.store(0, Ordering::Relaxed);
        self.back.store(0, Ordering::Relaxed);
    }
}

impl Default for QueueBlock {
    fn default() -> Self {
        Self::new()
    }
}

/// Размеры и формат звука, согласованные при создании страницы.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageGeometry {
    pub max_width: u16,
    pub max_height: u16,
    pub bpp: u8,
    pub channels: u8,
    pub samplerate: u32,
}

impl PageGeometry {
    pub fn new(max_width: u16, max_height: u16, bpp: u8, channels: u8, samplerate: u32) -> Self {
        Self {
            max_width,
            max_height,
            bpp,
            channels,
            samplerate,
        }
    }

    pub fn video_capacity(&self) -> usize {
        self.max_width as usize * self.max_height as usize * self.bpp as usize
    }

    pub fn audio_capacity(&self) -> usize {
        self.samplerate as usize
            * self.channels as usize
            * size_of::<i16>()
            * AUDIO_REGION_SECONDS
    }

    /// true, если все размеры `other` помещаются в эту страницу.
    pub fn contains(&self, other: &PageGeometry) -> bool {
        other.max_width <= self.max_width
            && other.max_height <= self.max_height
            && other.bpp == self.bpp
            && other.channels <= self.channels
            && other.audio_capacity() <= self.audio_capacity()
    }

    pub fn layout(&self) -> Result<PageLayout> {
        if self.bpp != CANONICAL_BPP {
            return Err(FsrvError::UnsupportedFormat(self.bpp));
        }
        let video_offset = align_up(size_of::<PageHeader>());
        let video_capacity = self.video_capacity();
        let child_queue_offset = align_up(video_offset + video_capacity);
        let parent_queue_offset = align_up(child_queue_offset + size_of::<QueueBlock>());
        let audio_offset = align_up(parent_queue_offset + size_of::<QueueBlock>());
        let audio_capacity = self.audio_capacity();
        let size = align_up(audio_offset + audio_capacity);
        if size > u32::MAX as usize {
            return Err(FsrvError::CapacityExceeded);
        }
        Ok(PageLayout {
            video_offset,
            video_capacity,
            child_queue_offset,
            parent_queue_offset,
            audio_offset,
            audio_capacity,
            size,
        })
    }
}

/// Смещения (байты) всех регионов внутри страницы.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageLayout {
    pub video_offset: usize,
    pub video_capacity: usize,
    /// Очередь пишет child, читает родитель.
    pub child_queue_offset: usize,
    /// Очередь пишет родитель, читает child.
    pub parent_queue_offset: usize,
    pub audio_offset: usize,
    pub audio_capacity: usize,
    pub size: usize,
}

const fn align_up(value: usize) -> usize {
    (value + REGION_ALIGN - 1) & !(REGION_ALIGN - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regions_are_ordered_and_aligned() {
        let layout = PageGeometry::new(320, 240, 4, 2, 48_000).layout().unwrap();
        assert_eq!(layout.video_offset % REGION_ALIGN, 0);
        assert_eq!(layout.video_capacity, 320 * 240 * 4);
        assert!(layout.child_queue_offset >= layout.video_offset + layout.video_capacity);
        assert!(layout.parent_queue_offset >= layout.child_queue_offset + size_of::<QueueBlock>());
        assert!(layout.audio_offset >= layout.parent_queue_offset + size_of::<QueueBlock>());
        assert_eq!(layout.audio_capacity, 48_000 * 2 * 2);
        assert!(layout.size >= layout.audio_offset + layout.audio_capacity);
    }

    #[test]
    fn non_canonical_bpp_is_rejected() {
        let err = PageGeometry::new(64, 64, 2, 2, 48_000).layout().unwrap_err();
        assert_eq!(err, FsrvError::UnsupportedFormat(2));
    }

    #[test]
    fn containment_compares_every_dimension() {
        let page = PageGeometry::new(320, 240, 4, 2, 48_000);
        assert!(page.contains(&PageGeometry::new(256, 224, 4, 2, 44_100)));
        assert!(!page.contains(&PageGeometry::new(321, 224, 4, 2, 44_100)));
        assert!(!page.contains(&PageGeometry::new(256, 224, 4, 2, 96_000)));
    }
}
