//! FFI-интерфейс родительского конца для display server'ов на C.
//!
//! Таймауты в миллисекундах; `u32::MAX` ждёт бесконечно.

use std::ffi::CStr;
use std::os::raw::{c_char, c_void};
use std::ptr::null_mut;
use std::time::Duration;

use crate::constants::{CANONICAL_BPP, EVENT_LABEL_LEN};
use crate::error::{FsrvError, Result};
use crate::event::{ControlEvent, Event};
use crate::layout::PageGeometry;
use crate::server::ParentPage;

#[repr(C)]
#[allow(non_camel_case_types)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum fsrv_status_t {
    FSRV_SUCCESS = 0,
    FSRV_ERROR_INVALID_PARAM = -1,
    FSRV_ERROR_TIMEOUT = -2,
    FSRV_ERROR_EMPTY = -3,
    FSRV_ERROR_FULL = -4,
    FSRV_ERROR_PROTOCOL = -5,
    FSRV_ERROR_CAPACITY = -6,
    FSRV_ERROR_NOT_READY = -7,
    FSRV_ERROR_OS = -8,
}

impl From<FsrvError> for fsrv_status_t {
    fn from(value: FsrvError) -> Self {
        match value {
            FsrvError::InvalidKey(_) | FsrvError::LabelTooLong { .. } => {
                fsrv_status_t::FSRV_ERROR_INVALID_PARAM
            }
            FsrvError::Corrupted
            | FsrvError::VersionMismatch { .. }
            | FsrvError::ProducerVersion { .. } => fsrv_status_t::FSRV_ERROR_PROTOCOL,
            FsrvError::CapacityExceeded
            | FsrvError::UnsupportedFormat(_)
            | FsrvError::InvalidFrame(_) => fsrv_status_t::FSRV_ERROR_CAPACITY,
            FsrvError::QueueFull => fsrv_status_t::FSRV_ERROR_FULL,
            FsrvError::MissingProducer(_) | FsrvError::LoadFailed | FsrvError::InvalidState(_) => {
                fsrv_status_t::FSRV_ERROR_NOT_READY
            }
            FsrvError::OsError { .. } => fsrv_status_t::FSRV_ERROR_OS,
        }
    }
}

/// Held video frame. `pixels` stays valid until `fsrv_parent_release_frame`.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct fsrv_frame_t {
    pub width: u32,
    pub height: u32,
    pub pixels: *const u8,
    pub len: usize,
    pub resized: bool,
}

#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct fsrv_event_t {
    pub category: u8,
    pub kind: u8,
    pub label_len: u8,
    pub value: i32,
    pub label: [u8; EVENT_LABEL_LEN],
}

pub type ParentHandle = c_void;

struct ParentState {
    inner: ParentPage,
    resized: bool,
    audio: Vec<i16>,
}

fn parent_state_from(handle: *mut ParentHandle) -> *mut ParentState {
    handle as *mut ParentState
}

fn to_rust_str(ptr: *const c_char) -> Result<String> {
    if ptr.is_null() {
        return Err(FsrvError::InvalidKey(String::new()));
    }
    let cstr = unsafe { CStr::from_ptr(ptr) };
    Ok(cstr.to_string_lossy().into_owned())
}

fn timeout_from_ms(timeout_ms: u32) -> Option<Duration> {
    if timeout_ms == u32::MAX {
        None
    } else {
        Some(Duration::from_millis(timeout_ms as u64))
    }
}

fn status_of(waited: Result<bool>) -> fsrv_status_t {
    match waited {
        Ok(true) => fsrv_status_t::FSRV_SUCCESS,
        Ok(false) => fsrv_status_t::FSRV_ERROR_TIMEOUT,
        Err(err) => err.into(),
    }
}

fn status(result: Result<()>) -> fsrv_status_t {
    match result {
        Ok(()) => fsrv_status_t::FSRV_SUCCESS,
        Err(err) => err.into(),
    }
}

/// Отброшенное событие превращается в `QueueFull`.
fn queued(sent: Result<bool>) -> Result<()> {
    if sent? {
        Ok(())
    } else {
        Err(FsrvError::QueueFull)
    }
}

/// Creates the page and semaphores for `key`. Returns null on failure.
#[unsafe(no_mangle)]
pub extern "C" fn fsrv_parent_create(
    key: *const c_char,
    max_width: u16,
    max_height: u16,
    channels: u8,
    samplerate: u32,
) -> *mut ParentHandle {
    let key = match to_rust_str(key) {
        Ok(key) => key,
        Err(_) => return null_mut(),
    };
    let geometry = PageGeometry::new(max_width, max_height, CANONICAL_BPP, channels, samplerate);
    match ParentPage::create(&key, geometry) {
        Ok(inner) => Box::into_raw(Box::new(ParentState {
            inner,
            resized: false,
            audio: Vec::new(),
        })) as *mut ParentHandle,
        Err(err) => {
            tracing::error!(key, "creating shared page failed: {err}");
            null_mut()
        }
    }
}

/// Unmaps the page and removes it together with its semaphores.
#[unsafe(no_mangle)]
pub extern "C" fn fsrv_parent_destroy(handle: *mut ParentHandle) {
    if handle.is_null() {
        return;
    }
    unsafe {
        drop(Box::from_raw(parent_state_from(handle)));
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn fsrv_parent_signal_ready(handle: *mut ParentHandle) -> fsrv_status_t {
    if handle.is_null() {
        return fsrv_status_t::FSRV_ERROR_INVALID_PARAM;
    }
    let state = unsafe { &*parent_state_from(handle) };
    status(state.inner.signal_ready())
}

/// Waits for the next frame and takes the resize flag with it.
#[unsafe(no_mangle)]
pub extern "C" fn fsrv_parent_wait_frame(
    handle: *mut ParentHandle,
    timeout_ms: u32,
) -> fsrv_status_t {
    if handle.is_null() {
        return fsrv_status_t::FSRV_ERROR_INVALID_PARAM;
    }
    let state = unsafe { &mut *parent_state_from(handle) };
    let status = status_of(state.inner.wait_frame(timeout_from_ms(timeout_ms)));
    if status == fsrv_status_t::FSRV_SUCCESS {
        state.resized |= state.inner.take_resized();
    }
    status
}

#[unsafe(no_mangle)]
pub extern "C" fn fsrv_parent_frame(
    handle: *mut ParentHandle,
    out: *mut fsrv_frame_t,
) -> fsrv_status_t {
    if handle.is_null() || out.is_null() {
        return fsrv_status_t::FSRV_ERROR_INVALID_PARAM;
    }
    let state = unsafe { &*parent_state_from(handle) };
    let Some(frame) = state.inner.frame() else {
        return fsrv_status_t::FSRV_ERROR_NOT_READY;
    };
    unsafe {
        *out = fsrv_frame_t {
            width: frame.width,
            height: frame.height,
            pixels: frame.pixels.as_ptr(),
            len: frame.pixels.len(),
            resized: state.resized,
        };
    }
    fsrv_status_t::FSRV_SUCCESS
}

#[unsafe(no_mangle)]
pub extern "C" fn fsrv_parent_release_frame(handle: *mut ParentHandle) -> fsrv_status_t {
    if handle.is_null() {
        return fsrv_status_t::FSRV_ERROR_INVALID_PARAM;
    }
    let state = unsafe { &mut *parent_state_from(handle) };
    state.resized = false;
    status(state.inner.release_frame())
}

/// Copies up to `capacity` interleaved samples of the current audio cycle
/// into `out`; `written` receives the count copied.
#[unsafe(no_mangle)]
pub extern "C" fn fsrv_parent_take_audio(
    handle: *mut ParentHandle,
    timeout_ms: u32,
    out: *mut i16,
    capacity: usize,
    written: *mut usize,
) -> fsrv_status_t {
    if handle.is_null() || (out.is_null() && capacity > 0) {
        return fsrv_status_t::FSRV_ERROR_INVALID_PARAM;
    }
    let state = unsafe { &mut *parent_state_from(handle) };
    let mut audio = std::mem::take(&mut state.audio);
    let status = match state.inner.take_audio(timeout_from_ms(timeout_ms), &mut audio) {
        Ok(Some(count)) => {
            let count = count.min(capacity);
            if count > 0 {
                let dst = unsafe { std::slice::from_raw_parts_mut(out, count) };
                dst.copy_from_slice(&audio[..count]);
            }
            if !written.is_null() {
                unsafe { *written = count };
            }
            fsrv_status_t::FSRV_SUCCESS
        }
        Ok(None) => fsrv_status_t::FSRV_ERROR_TIMEOUT,
        Err(err) => err.into(),
    };
    state.audio = audio;
    status
}

/// Queues a labelled input event for the child. `analog` selects between
/// a digital (`value != 0`) and an analog value clamped to i16.
#[unsafe(no_mangle)]
pub extern "C" fn fsrv_parent_send_input(
    handle: *mut ParentHandle,
    label: *const c_char,
    value: i32,
    analog: bool,
) -> fsrv_status_t {
    if handle.is_null() {
        return fsrv_status_t::FSRV_ERROR_INVALID_PARAM;
    }
    let state = unsafe { &*parent_state_from(handle) };
    let event = to_rust_str(label).and_then(|label| {
        if analog {
            Event::analog(&label, value.clamp(i16::MIN as i32, i16::MAX as i32) as i16)
        } else {
            Event::digital(&label, value != 0)
        }
    });
    status(event.and_then(|event| queued(state.inner.send_event(&event))))
}

#[unsafe(no_mangle)]
pub extern "C" fn fsrv_parent_send_reset(handle: *mut ParentHandle) -> fsrv_status_t {
    if handle.is_null() {
        return fsrv_status_t::FSRV_ERROR_INVALID_PARAM;
    }
    let state = unsafe { &*parent_state_from(handle) };
    status(queued(state.inner.send_event(&Event::Control(ControlEvent::Reset))))
}

/// Takes the next event from the child, `FSRV_ERROR_EMPTY` when none.
#[unsafe(no_mangle)]
pub extern "C" fn fsrv_parent_poll_event(
    handle: *mut ParentHandle,
    out: *mut fsrv_event_t,
) -> fsrv_status_t {
    if handle.is_null() || out.is_null() {
        return fsrv_status_t::FSRV_ERROR_INVALID_PARAM;
    }
    let state = unsafe { &*parent_state_from(handle) };
    let Some(event) = state.inner.poll_event() else {
        return fsrv_status_t::FSRV_ERROR_EMPTY;
    };
    let record = event.to_record();
    unsafe {
        *out = fsrv_event_t {
            category: record.category,
            kind: record.kind,
            label_len: record.label_len,
            value: record.value,
            label: record.label,
        };
    }
    fsrv_status_t::FSRV_SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;
    use std::thread;

    use crate::client::ChildPage;
    use crate::constants::EVENT_QUEUE_CAPACITY;
    use crate::event::Label;
    use crate::pacing::FrameSkip;
    use crate::producer::Content;
    use crate::pump::{serve, PumpOptions, Termination};
    use crate::testpattern::{TestPattern, FRAME_HEIGHT, FRAME_WIDTH};

    const WAIT_MS: u32 = 3_000;

    fn empty_frame() -> fsrv_frame_t {
        fsrv_frame_t {
            width: 0,
            height: 0,
            pixels: std::ptr::null(),
            len: 0,
            resized: false,
        }
    }

    fn unique_key(tag: &str) -> String {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        format!("ffi_{tag}_{}_{nanos}", std::process::id())
    }

    #[test]
    fn null_handles_are_rejected() {
        assert_eq!(
            fsrv_parent_signal_ready(null_mut()),
            fsrv_status_t::FSRV_ERROR_INVALID_PARAM
        );
        assert!(fsrv_parent_create(std::ptr::null(), 64, 64, 2, 48_000).is_null());
        fsrv_parent_destroy(null_mut());
    }

    #[test]
    fn events_cross_the_c_interface() {
        let key = unique_key("events");
        let c_key = CString::new(key.clone()).unwrap();
        let handle = fsrv_parent_create(c_key.as_ptr(), 64, 64, 2, 8_000);
        assert!(!handle.is_null());

        let child = ChildPage::attach(&key).unwrap();
        let ident = Event::Control(ControlEvent::Ident(Label::truncated("core")));
        assert!(child.send_event(&ident).unwrap());

        let mut out = fsrv_event_t {
            category: 0,
            kind: 0,
            label_len: 0,
            value: 0,
            label: [0; EVENT_LABEL_LEN],
        };
        assert_eq!(fsrv_parent_poll_event(handle, &mut out), fsrv_status_t::FSRV_SUCCESS);
        assert_eq!(&out.label[..out.label_len as usize], b"core");
        assert_eq!(fsrv_parent_poll_event(handle, &mut out), fsrv_status_t::FSRV_ERROR_EMPTY);

        let label = CString::new("PLAYER1_BUTTONA").unwrap();
        assert_eq!(
            fsrv_parent_send_input(handle, label.as_ptr(), 1, false),
            fsrv_status_t::FSRV_SUCCESS
        );
        assert!(matches!(child.poll_event(), Some(Event::Io(_))));

        assert_eq!(fsrv_parent_wait_frame(handle, 0), fsrv_status_t::FSRV_ERROR_TIMEOUT);

        drop(child);
        fsrv_parent_destroy(handle);
    }

    #[test]
    fn frames_and_audio_cross_the_c_interface() {
        let key = unique_key("av");
        let c_key = CString::new(key.clone()).unwrap();
        let handle = fsrv_parent_create(c_key.as_ptr(), 320, 240, 2, 48_000);
        assert!(!handle.is_null());

        let child = thread::spawn(move || {
            let options = PumpOptions {
                wait_timeout: Some(Duration::from_secs(3)),
                handshake_timeout: Some(Duration::from_secs(3)),
                frame_skip: FrameSkip::Off,
            };
            serve(TestPattern::new().stop_after(2), &key, &Content::default(), options)
        });
        assert_eq!(fsrv_parent_signal_ready(handle), fsrv_status_t::FSRV_SUCCESS);

        let mut frame = empty_frame();
        assert_eq!(fsrv_parent_frame(handle, &mut frame), fsrv_status_t::FSRV_ERROR_NOT_READY);
        assert_eq!(fsrv_parent_wait_frame(handle, WAIT_MS), fsrv_status_t::FSRV_SUCCESS);
        assert_eq!(fsrv_parent_frame(handle, &mut frame), fsrv_status_t::FSRV_SUCCESS);
        assert_eq!((frame.width, frame.height), (FRAME_WIDTH, FRAME_HEIGHT));
        assert_eq!(frame.len, (FRAME_WIDTH * FRAME_HEIGHT * 4) as usize);
        assert!(frame.resized);
        let pixels = unsafe { std::slice::from_raw_parts(frame.pixels, frame.len) };
        assert_eq!(&pixels[..4], &[0xf8, 0xfc, 0xf8, 0xff]);
        assert_eq!(fsrv_parent_release_frame(handle), fsrv_status_t::FSRV_SUCCESS);

        let mut samples = vec![0i16; 2048];
        let (out, capacity) = (samples.as_mut_ptr(), samples.len());
        let mut written = 0usize;
        assert_eq!(
            fsrv_parent_take_audio(handle, WAIT_MS, out, capacity, &mut written),
            fsrv_status_t::FSRV_SUCCESS
        );
        assert_eq!(written, 1600);
        assert!(samples[..written].iter().all(|s| s.abs() == 4_000));

        assert_eq!(fsrv_parent_wait_frame(handle, WAIT_MS), fsrv_status_t::FSRV_SUCCESS);
        assert_eq!(fsrv_parent_frame(handle, &mut frame), fsrv_status_t::FSRV_SUCCESS);
        assert!(!frame.resized);
        assert_eq!(fsrv_parent_release_frame(handle), fsrv_status_t::FSRV_SUCCESS);

        let mut short = [0i16; 100];
        let (out, capacity) = (short.as_mut_ptr(), short.len());
        assert_eq!(
            fsrv_parent_take_audio(handle, WAIT_MS, out, capacity, &mut written),
            fsrv_status_t::FSRV_SUCCESS
        );
        assert_eq!(written, short.len());
        assert!(short.iter().all(|s| s.abs() == 4_000));

        assert_eq!(child.join().unwrap(), Ok(Termination::ProducerStopped));
        fsrv_parent_destroy(handle);
    }

    #[test]
    fn full_queue_reports_full() {
        let key = unique_key("full");
        let c_key = CString::new(key).unwrap();
        let handle = fsrv_parent_create(c_key.as_ptr(), 64, 64, 2, 8_000);
        assert!(!handle.is_null());

        for _ in 0..EVENT_QUEUE_CAPACITY - 1 {
            assert_eq!(fsrv_parent_send_reset(handle), fsrv_status_t::FSRV_SUCCESS);
        }
        assert_eq!(fsrv_parent_send_reset(handle), fsrv_status_t::FSRV_ERROR_FULL);

        fsrv_parent_destroy(handle);
    }
}
