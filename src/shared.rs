use std::ptr::NonNull;

use crate::layout::{PageHeader, PageLayout, QueueBlock};

/// Типизированный доступ к регионам страницы. Клонируется дёшево; само
/// отображение принадлежит концу, создавшему view.
#[derive(Clone)]
pub struct SharedView {
    base: NonNull<u8>,
    layout: PageLayout,
}

unsafe impl Send for SharedView {}
unsafe impl Sync for SharedView {}

impl SharedView {
    /// # Safety
    /// `base` должен указывать на отображение не меньше `layout.size` байт,
    /// выровненное на 64 и живущее дольше всех клонов view.
    pub unsafe fn new(base: *mut u8, layout: PageLayout) -> Self {
        SharedView {
            base: NonNull::new(base).expect("shared mapping pointer must be valid"),
            layout,
        }
    }

    pub fn layout(&self) -> &PageLayout {
        &self.layout
    }

    pub fn header(&self) -> &PageHeader {
        unsafe { &*(self.base.as_ptr() as *const PageHeader) }
    }

    /// Допустимо только до того, как страницу увидит пир.
    pub fn header_mut(&mut self) -> &mut PageHeader {
        unsafe { &mut *(self.base.as_ptr() as *mut PageHeader) }
    }

    /// Очередь, которую пишет child.
    pub fn child_queue(&self) -> &QueueBlock {
        unsafe { &*(self.base.as_ptr().add(self.layout.child_queue_offset) as *const QueueBlock) }
    }

    /// Очередь, которую пишет родитель.
    pub fn parent_queue(&self) -> &QueueBlock {
        unsafe { &*(self.base.as_ptr().add(self.layout.parent_queue_offset) as *const QueueBlock) }
    }

    /// Буфер пикселей на полную ёмкость.
    ///
    /// # Safety
    /// Вызывающий должен держать video gate всё время заимствования.
    pub unsafe fn video_mut(&self) -> &mut [u8] {
        unsafe {
            std::slice::from_raw_parts_mut(
                self.base.as_ptr().add(self.layout.video_offset),
                self.layout.video_capacity,
            )
        }
    }

    /// # Safety
    /// Вызывающий должен держать video gate всё время заимствования.
    pub unsafe fn video(&self) -> &[u8] {
        unsafe {
            std::slice::from_raw_parts(
                self.base.as_ptr().add(self.layout.video_offset),
                self.layout.video_capacity,
            )
        }
    }

    /// # Safety
    /// Вызывающий должен держать audio gate всё время заимствования.
    pub unsafe fn audio_mut(&self) -> &mut [u8] {
        unsafe {
            std::slice::from_raw_parts_mut(
                self.base.as_ptr().add(self.layout.audio_offset),
                self.layout.audio_capacity,
            )
        }
    }

    /// # Safety
    /// Вызывающий должен держать audio gate всё время заимствования.
    pub unsafe fn audio(&self) -> &[u8] {
        unsafe {
            std::slice::from_raw_parts(
                self.base.as_ptr().add(self.layout.audio_offset),
                self.layout.audio_capacity,
            )
        }
    }
}
