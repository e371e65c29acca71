//! Ограниченная SPSC очередь событий внутри страницы.
//!
//! `back` двигает только пишущая сторона, `front` только читающая, поэтому
//! блокировки не нужны. Слот пишется до Release-записи `back` и читается
//! после Acquire-чтения; post/wait семафора событий добавляет к этому
//! пробуждение между процессами.

use std::ptr::NonNull;
use std::sync::atomic::Ordering;

use crate::constants::EVENT_QUEUE_CAPACITY;
use crate::event::Event;
use crate::layout::{EventRecord, QueueBlock};

const SLOTS: u32 = EVENT_QUEUE_CAPACITY as u32;

pub struct EventQueue {
    block: NonNull<QueueBlock>,
}

unsafe impl Send for EventQueue {}
unsafe impl Sync for EventQueue {}

impl EventQueue {
    /// # Safety
    /// `block` должен жить дольше очереди; работать с ним могут не больше
    /// одного писателя и одного читателя.
    pub unsafe fn new(block: *const QueueBlock) -> Self {
        EventQueue {
            block: NonNull::new(block as *mut QueueBlock).expect("queue pointer must be valid"),
        }
    }

    fn block(&self) -> &QueueBlock {
        unsafe { self.block.as_ref() }
    }

    fn indices(&self) -> Option<(u32, u32)> {
        let block = self.block();
        let front = block.front.load(Ordering::Acquire);
        let back = block.back.load(Ordering::Acquire);
        if front >= SLOTS || back >= SLOTS {
            tracing::warn!(front, back, "event queue indices out of range");
            return None;
        }
        Some((front, back))
    }

    pub fn len(&self) -> usize {
        match self.indices() {
            Some((front, back)) => ((back + SLOTS - front) % SLOTS) as usize,
            None => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Сторона писателя. Возвращает false, если очередь полна; непрочитанные
    /// записи никогда не перезаписываются.
    pub fn enqueue(&self, record: &EventRecord) -> bool {
        let Some((front, back)) = self.indices() else {
            return false;
        };
        let next = (back + 1) % SLOTS;
        if next == front {
            return false;
        }
        unsafe {
            *self.block().slots[back as usize].get() = *record;
        }
        self.block().back.store(next, Ordering::Release);
        true
    }

    /// Сторона читателя. `None`, когда `front == back`.
    pub fn poll(&self) -> Option<EventRecord> {
        let (front, back) = self.indices()?;
        if front == back {
            return None;
        }
        let record = unsafe { *self.block().slots[front as usize].get() };
        self.block().front.store((front + 1) % SLOTS, Ordering::Release);
        Some(record)
    }

    /// Читает, пока запись не декодируется или очередь не опустеет. Записи
    /// неизвестной категории забираются и пропускаются.
    pub fn poll_event(&self) -> Option<Event> {
        while let Some(record) = self.poll() {
            match Event::from_record(&record) {
                Some(event) => return Some(event),
                None => tracing::debug!(
                    category = record.category,
                    kind = record.kind,
                    "skipping unknown event"
                ),
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::VecDeque;

    fn record(value: i32) -> EventRecord {
        EventRecord {
            category: 1,
            value,
            ..EventRecord::EMPTY
        }
    }

    #[test]
    fn fifo_order_is_preserved() {
        let block = Box::new(QueueBlock::new());
        let queue = unsafe { EventQueue::new(&*block) };
        for i in 0..10 {
            assert!(queue.enqueue(&record(i)));
        }
        for i in 0..10 {
            assert_eq!(queue.poll(), Some(record(i)));
        }
        assert_eq!(queue.poll(), None);
    }

    #[test]
    fn full_queue_rejects_instead_of_overwriting() {
        let block = Box::new(QueueBlock::new());
        let queue = unsafe { EventQueue::new(&*block) };
        for i in 0..(EVENT_QUEUE_CAPACITY - 1) as i32 {
            assert!(queue.enqueue(&record(i)));
        }
        assert_eq!(queue.len(), EVENT_QUEUE_CAPACITY - 1);
        assert!(!queue.enqueue(&record(-1)));
        assert_eq!(queue.poll(), Some(record(0)));
        assert!(queue.enqueue(&record(-1)));
    }

    #[test]
    fn empty_queue_never_returns_stale_records() {
        let block = Box::new(QueueBlock::new());
        let queue = unsafe { EventQueue::new(&*block) };
        assert!(queue.enqueue(&record(7)));
        assert_eq!(queue.poll(), Some(record(7)));
        assert_eq!(queue.poll(), None);
        assert!(queue.is_empty());
    }

    #[test]
    fn unknown_records_are_skipped_when_decoding() {
        let block = Box::new(QueueBlock::new());
        let queue = unsafe { EventQueue::new(&*block) };
        let reset = Event::Control(crate::event::ControlEvent::Reset);
        assert!(queue.enqueue(&EventRecord {
            category: 200,
            ..EventRecord::EMPTY
        }));
        assert!(queue.enqueue(&reset.to_record()));
        assert_eq!(queue.poll_event(), Some(reset));
        assert_eq!(queue.poll_event(), None);
    }

    #[test]
    fn corrupt_indices_read_as_empty() {
        let block = Box::new(QueueBlock::new());
        block.back.store(SLOTS + 3, Ordering::Relaxed);
        let queue = unsafe { EventQueue::new(&*block) };
        assert_eq!(queue.poll(), None);
        assert!(!queue.enqueue(&record(1)));
    }

    proptest! {
        #[test]
        fn interleaved_producer_consumer_matches_model(
            ops in proptest::collection::vec(any::<bool>(), 1..600),
        ) {
            let block = Box::new(QueueBlock::new());
            let producer = unsafe { EventQueue::new(&*block) };
            let consumer = unsafe { EventQueue::new(&*block) };
            let mut model = VecDeque::new();
            let mut next = 0i32;

            for push in ops {
                if push {
                    let accepted = producer.enqueue(&record(next));
                    prop_assert_eq!(accepted, model.len() < EVENT_QUEUE_CAPACITY - 1);
                    if accepted {
                        model.push_back(next);
                    }
                    next += 1;
                } else {
                    let polled = consumer.poll().map(|r| r.value);
                    prop_assert_eq!(polled, model.pop_front());
                }
                let front = block.front.load(Ordering::Relaxed);
                let back = block.back.load(Ordering::Relaxed);
                prop_assert!(front < SLOTS && back < SLOTS);
                prop_assert_eq!(((back + SLOTS - front) % SLOTS) as usize, model.len());
            }
        }
    }
}
