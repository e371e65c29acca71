use std::time::Duration;

use crate::constants::{PEER_POLL_INTERVAL, SEM_AUDIO_SUFFIX, SEM_EVENT_SUFFIX, SEM_VIDEO_SUFFIX};
use crate::error::Result;
use crate::naming::{Direction, gate_name, sem_name};
use crate::posix::{PeerWatch, Semaphore};

/// Строгое чередование передачи для одного канала. У каждого направления
/// свой семафор: сторона никогда не забирает собственный post, и в полёте
/// не больше одной передачи.
pub struct Gate {
    pub to_parent: Semaphore,
    pub to_child: Semaphore,
    /// Только у child: прерывает бесконечное ожидание, когда страницы родителя нет.
    peer: Option<PeerWatch>,
}

impl Gate {
    fn create(key: &str, suffix: &str) -> Result<Self> {
        Ok(Self {
            to_parent: Semaphore::create(&gate_name(key, suffix, Direction::ToParent)?)?,
            to_child: Semaphore::create(&gate_name(key, suffix, Direction::ToChild)?)?,
            peer: None,
        })
    }

    fn open(key: &str, suffix: &str, peer: PeerWatch) -> Result<Self> {
        Ok(Self {
            to_parent: Semaphore::open(&gate_name(key, suffix, Direction::ToParent)?)?,
            to_child: Semaphore::open(&gate_name(key, suffix, Direction::ToChild)?)?,
            peer: Some(peer),
        })
    }

    /// Сторона child: отдать канал родителю.
    pub fn release_to_parent(&self) -> Result<()> {
        self.to_parent.post()
    }

    /// Сторона child: ждать, пока родитель вернёт канал. Бесконечное ожидание
    /// возвращает `Ok(false)`, когда родитель удалил страницу.
    pub fn acquire_from_parent(&self, timeout: Option<Duration>) -> Result<bool> {
        match (timeout, &self.peer) {
            (None, Some(peer)) => self.to_child.wait_while(PEER_POLL_INTERVAL, || peer.alive()),
            _ => self.to_child.wait(timeout),
        }
    }

    /// Сторона родителя: отдать канал child.
    pub fn release_to_child(&self) -> Result<()> {
        self.to_child.post()
    }

    /// Сторона родителя: ждать, пока child передаст канал.
    pub fn acquire_from_child(&self, timeout: Option<Duration>) -> Result<bool> {
        self.to_parent.wait(timeout)
    }
}

/// Примитивы синхронизации видео, аудио и событий для одного ключа.
pub struct SemaphoreTriad {
    pub video: Gate,
    pub audio: Gate,
    /// Общий для обеих очередей событий: post значит «в какой-то очереди есть записи».
    pub event: Semaphore,
}

impl SemaphoreTriad {
    pub fn create(key: &str) -> Result<Self> {
        Ok(Self {
            video: Gate::create(key, SEM_VIDEO_SUFFIX)?,
            audio: Gate::create(key, SEM_AUDIO_SUFFIX)?,
            event: Semaphore::create(&sem_name(key, SEM_EVENT_SUFFIX)?)?,
        })
    }

    /// Сторона child. `peer` следит за страницей, созданной родителем.
    pub fn open(key: &str, peer: PeerWatch) -> Result<Self> {
        Ok(Self {
            video: Gate::open(key, SEM_VIDEO_SUFFIX, peer.clone())?,
            audio: Gate::open(key, SEM_AUDIO_SUFFIX, peer)?,
            event: Semaphore::open(&sem_name(key, SEM_EVENT_SUFFIX)?)?,
        })
    }
}
