//! Главный цикл child: Init → Ready → Running → Terminated.
//!
//! Каждая точка приостановки это ожидание семафора. Таймаут или ошибка
//! ожидания (включая handshake) значит, что родителя нет; это обычный
//! способ завершения сессии.

use std::time::{Duration, Instant};

use crate::audio::AudioRing;
use crate::channel::ChannelManager;
use crate::client::ChildPage;
use crate::constants::PRODUCER_API_VERSION;
use crate::error::{FsrvError, Result};
use crate::event::{ControlEvent, Event, Label};
use crate::input::{InputState, InputUpdate};
use crate::pacing::{FramePacer, FrameSkip};
use crate::producer::{AvInfo, Content, FrameIo, Producer, StepStatus};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PumpState {
    Init,
    Ready,
    Running,
    Terminated,
}

/// Почему pump остановился.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Termination {
    /// Ожидание семафора истекло или завершилось ошибкой.
    PeerLost,
    /// Producer сообщил, что продолжать не может.
    ProducerStopped,
}

#[derive(Clone, Debug)]
pub struct PumpOptions {
    /// Предел каждого ожидания в работе; `None` ждёт бесконечно.
    pub wait_timeout: Option<Duration>,
    /// Предел ожидания начального handshake.
    pub handshake_timeout: Option<Duration>,
    pub frame_skip: FrameSkip,
}

impl Default for PumpOptions {
    fn default() -> Self {
        Self {
            wait_timeout: Some(Duration::from_secs(5)),
            handshake_timeout: Some(Duration::from_secs(10)),
            frame_skip: FrameSkip::Off,
        }
    }
}

struct Session {
    page: ChildPage,
    channels: ChannelManager,
    input: InputState,
    pacer: FramePacer,
}

pub struct FramePump<P: Producer> {
    producer: P,
    options: PumpOptions,
    state: PumpState,
    av: Option<AvInfo>,
    page: Option<ChildPage>,
    session: Option<Session>,
}

impl<P: Producer> FramePump<P> {
    pub fn new(producer: P, options: PumpOptions) -> Self {
        Self {
            producer,
            options,
            state: PumpState::Init,
            av: None,
            page: None,
            session: None,
        }
    }

    pub fn state(&self) -> PumpState {
        self.state
    }

    pub fn producer(&self) -> &P {
        &self.producer
    }

    /// Проверяет producer, загружает контент, подключается к странице и ждёт
    /// handshake родителя. Ошибки фатальны. Если handshake так и не пришёл,
    /// родителя нет: pump завершается с `Ok(Some(PeerLost))`.
    pub fn init(&mut self, key: &str, content: &Content) -> Result<Option<Termination>> {
        if self.state != PumpState::Init {
            return Err(FsrvError::InvalidState("init"));
        }
        let found = self.producer.api_version();
        if found != PRODUCER_API_VERSION {
            return Err(FsrvError::ProducerVersion {
                found,
                expected: PRODUCER_API_VERSION,
            });
        }

        let info = self.producer.init();
        tracing::info!(
            name = %info.library_name,
            version = %info.library_version,
            extensions = %info.valid_extensions,
            "producer initialized"
        );
        if !self.producer.load(content) {
            tracing::error!(path = ?content.path, "producer rejected content");
            return Err(FsrvError::LoadFailed);
        }

        let av = self.producer.av_info();
        let page = ChildPage::attach_for(key, &av.geometry())?;
        if !page.send_event(&Event::Control(ControlEvent::Ident(Label::truncated(
            &info.library_name,
        ))))? {
            tracing::warn!("event queue full, identification not sent");
        }

        if !handed_over(page.wait_ready(self.options.handshake_timeout), "handshake") {
            return Ok(Some(self.terminate(Termination::PeerLost)));
        }

        tracing::info!(key, fps = av.fps, sample_rate = av.sample_rate, "frameserver ready");
        self.av = Some(av);
        self.page = Some(page);
        self.state = PumpState::Ready;
        Ok(None)
    }

    /// Однократный reset producer'а и расчёт аудиокольца.
    pub fn start(&mut self) -> Result<()> {
        if self.state != PumpState::Ready {
            return Err(FsrvError::InvalidState("ready"));
        }
        let (Some(av), Some(page)) = (self.av, self.page.take()) else {
            return Err(FsrvError::InvalidState("ready"));
        };

        self.producer.reset();

        let mut ring = AudioRing::for_timing(av.sample_rate, av.fps);
        if self.options.frame_skip == FrameSkip::Auto {
            // догоняющий шаг делит flush с обычным
            ring = AudioRing::new(ring.capacity() * 2);
        }
        tracing::debug!(samples = ring.capacity(), "audio ring sized");

        let channels = ChannelManager::new(page.view().clone(), ring)?;
        self.session = Some(Session {
            page,
            channels,
            input: InputState::new(),
            pacer: FramePacer::new(self.options.frame_skip, av.fps, Instant::now()),
        });
        self.state = PumpState::Running;
        Ok(())
    }

    /// Один полный цикл. `Ok(Some(_))`, когда pump завершился.
    pub fn cycle(&mut self) -> Result<Option<Termination>> {
        if self.state != PumpState::Running {
            return Err(FsrvError::InvalidState("running"));
        }
        let Some(session) = self.session.as_mut() else {
            return Err(FsrvError::InvalidState("running"));
        };
        let producer = &mut self.producer;
        let timeout = self.options.wait_timeout;

        drain_inbound(session, producer);

        if session.pacer.should_skip(Instant::now()) {
            session.channels.set_skip_next();
            let mut io = FrameIo::new(&mut session.channels, &session.input);
            let status = producer.step(&mut io);
            session.pacer.frame_done();
            if status == StepStatus::Stop {
                return Ok(Some(self.terminate(Termination::ProducerStopped)));
            }
        }

        let mut io = FrameIo::new(&mut session.channels, &session.input);
        let status = producer.step(&mut io);
        session.pacer.frame_done();
        if status == StepStatus::Stop {
            return Ok(Some(self.terminate(Termination::ProducerStopped)));
        }

        let flushed = session
            .channels
            .flush_audio(&session.page.semaphores().audio, timeout);
        if !handed_over(flushed.map(|bytes| bytes.is_some()), "audio") {
            return Ok(Some(self.terminate(Termination::PeerLost)));
        }

        session.channels.mark_video_ready();
        let video = &session.page.semaphores().video;
        if let Err(err) = video.release_to_parent() {
            tracing::warn!("posting video failed: {err}");
            return Ok(Some(self.terminate(Termination::PeerLost)));
        }
        if !handed_over(video.acquire_from_parent(timeout), "video") {
            return Ok(Some(self.terminate(Termination::PeerLost)));
        }

        Ok(None)
    }

    /// Запускает pump при необходимости и крутит циклы до завершения.
    pub fn run(&mut self) -> Result<Termination> {
        if self.state == PumpState::Ready {
            self.start()?;
        }
        loop {
            if let Some(reason) = self.cycle()? {
                return Ok(reason);
            }
        }
    }

    fn terminate(&mut self, reason: Termination) -> Termination {
        if let Some(session) = self.session.take() {
            tracing::info!(
                ?reason,
                frames = session.channels.frames_written(),
                skipped = session.channels.frames_skipped(),
                overruns = session.channels.audio().overruns(),
                "frameserver terminated"
            );
        }
        self.page = None;
        self.state = PumpState::Terminated;
        reason
    }
}

/// Подключает, выполняет и закрывает одну сессию.
pub fn serve<P: Producer>(
    producer: P,
    key: &str,
    content: &Content,
    options: PumpOptions,
) -> Result<Termination> {
    let mut pump = FramePump::new(producer, options);
    if let Some(reason) = pump.init(key, content)? {
        return Ok(reason);
    }
    pump.run()
}

fn drain_inbound<P: Producer>(session: &mut Session, producer: &mut P) {
    while let Some(event) = session.page.poll_event() {
        match event {
            Event::Io(io) => {
                if let InputUpdate::Ignored(reason) = session.input.apply(&io) {
                    tracing::debug!(label = io.label.as_str(), ?reason, "input event ignored");
                }
            }
            Event::Control(ControlEvent::Reset) => {
                tracing::info!("reset requested");
                producer.reset();
            }
            other => tracing::debug!(?other, "event ignored"),
        }
    }
}

fn handed_over(waited: Result<bool>, channel: &'static str) -> bool {
    match waited {
        Ok(true) => true,
        Ok(false) => {
            tracing::info!(channel, "wait timed out, parent presumed gone");
            false
        }
        Err(err) => {
            tracing::warn!(channel, "wait failed, parent presumed gone: {err}");
            false
        }
    }
}
