use std::mem::size_of;
use std::time::Duration;

use crate::error::{FsrvError, Result};
use crate::event::Event;
use crate::gates::SemaphoreTriad;
use crate::layout::{PageGeometry, PageHeader};
use crate::naming::page_path;
use crate::posix::{Mapping, PeerWatch};
use crate::queue::EventQueue;
use crate::shared::SharedView;

/// Конец страницы со стороны frameserver (child).
pub struct ChildPage {
    _mapping: Mapping,
    view: SharedView,
    sems: SemaphoreTriad,
    inbound: EventQueue,
    outbound: EventQueue,
}

unsafe impl Send for ChildPage {}

impl ChildPage {
    /// Отображает страницу, созданную родителем под `key`, и открывает её
    /// семафоры. Проверяются magic и version.
    pub fn attach(key: &str) -> Result<Self> {
        let path = page_path(key)?;
        let mut mapping = Mapping::open(&path)?;
        if mapping.len() < size_of::<PageHeader>() {
            return Err(FsrvError::Corrupted);
        }
        let base = mapping.as_mut_ptr();
        let layout = unsafe { &*(base as *const PageHeader) }.validate(mapping.len())?;
        let view = unsafe { SharedView::new(base, layout) };

        let sems = SemaphoreTriad::open(key, PeerWatch::new(&path)?)?;

        let inbound = unsafe { EventQueue::new(view.parent_queue()) };
        let outbound = unsafe { EventQueue::new(view.child_queue()) };

        tracing::info!(
            key,
            max_width = view.header().max_width,
            max_height = view.header().max_height,
            "attached to shared page"
        );

        Ok(Self {
            _mapping: mapping,
            view,
            sems,
            inbound,
            outbound,
        })
    }

    /// Подключается и проверяет, что `required` помещается в ёмкость страницы.
    pub fn attach_for(key: &str, required: &PageGeometry) -> Result<Self> {
        let page = Self::attach(key)?;
        if !page.geometry().contains(required) {
            tracing::error!(?required, page = ?page.geometry(), "producer does not fit the page");
            return Err(FsrvError::CapacityExceeded);
        }
        Ok(page)
    }

    pub fn geometry(&self) -> PageGeometry {
        self.view.header().geometry()
    }

    pub fn view(&self) -> &SharedView {
        &self.view
    }

    pub fn semaphores(&self) -> &SemaphoreTriad {
        &self.sems
    }

    /// Начальный handshake: первый post видео от родителя значит, что child
    /// может писать в страницу.
    pub fn wait_ready(&self, timeout: Option<Duration>) -> Result<bool> {
        self.sems.video.acquire_from_parent(timeout)
    }

    /// Следующее входящее событие, если есть. Не блокирует.
    pub fn poll_event(&self) -> Option<Event> {
        self.inbound.poll_event()
    }

    /// Ставит событие в очередь родителя и делает post семафора событий.
    /// `Ok(false)`, если очередь полна и событие отброшено.
    pub fn send_event(&self, event: &Event) -> Result<bool> {
        if !self.outbound.enqueue(&event.to_record()) {
            return Ok(false);
        }
        self.sems.event.post()?;
        Ok(true)
    }
}
