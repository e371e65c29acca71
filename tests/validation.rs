//! Init-time failures: page validation on attach, the pump's fatal checks
//! and a handshake that never arrives.

use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::time::Duration;

use frameshm::testpattern::TestPattern;
use frameshm::{
    serve, AvInfo, ChildPage, Content, FramePump, FrameIo, FsrvError, PageGeometry, ParentPage,
    Producer, PumpOptions, PumpState, StepStatus, SystemInfo, Termination, PRODUCER_API_VERSION,
    SHARED_VERSION,
};

fn unique_name(tag: &str) -> String {
    use std::time::SystemTime;
    let ts = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("FSRV_VALID_{}_{}_{}", tag, std::process::id(), ts % 1_000_000)
}

/// Absolute keys name the page file directly, so tests can tamper with it.
fn file_key(tag: &str) -> String {
    std::env::temp_dir()
        .join(unique_name(tag))
        .to_string_lossy()
        .into_owned()
}

fn overwrite_u32(path: &str, offset: u64, value: u32) {
    let mut file = OpenOptions::new().write(true).open(path).unwrap();
    file.seek(SeekFrom::Start(offset)).unwrap();
    file.write_all(&value.to_ne_bytes()).unwrap();
    file.sync_all().unwrap();
}

fn quick_options() -> PumpOptions {
    PumpOptions {
        wait_timeout: Some(Duration::from_millis(200)),
        handshake_timeout: Some(Duration::from_millis(200)),
        ..PumpOptions::default()
    }
}

#[test]
fn bad_magic_is_rejected() {
    let key = file_key("MAGIC");
    let _page = ParentPage::create(&key, PageGeometry::new(64, 64, 4, 2, 8_000)).unwrap();
    overwrite_u32(&key, 0, 0xdead_beef);
    assert_eq!(ChildPage::attach(&key).err(), Some(FsrvError::Corrupted));
}

#[test]
fn version_mismatch_is_rejected() {
    let key = file_key("VERSION");
    let _page = ParentPage::create(&key, PageGeometry::new(64, 64, 4, 2, 8_000)).unwrap();
    overwrite_u32(&key, 4, SHARED_VERSION + 1);
    assert_eq!(
        ChildPage::attach(&key).err(),
        Some(FsrvError::VersionMismatch {
            found: SHARED_VERSION + 1,
            expected: SHARED_VERSION,
        })
    );
}

#[test]
fn missing_page_fails_to_attach() {
    let key = unique_name("MISSING");
    assert!(matches!(
        ChildPage::attach(&key),
        Err(FsrvError::OsError { .. })
    ));
}

#[test]
fn only_the_canonical_pixel_layout_is_accepted() {
    let key = unique_name("BPP");
    assert_eq!(
        ParentPage::create(&key, PageGeometry::new(64, 64, 3, 2, 8_000)).err(),
        Some(FsrvError::UnsupportedFormat(3))
    );
}

#[test]
fn producer_larger_than_the_page_is_rejected() {
    let key = unique_name("CAPACITY");
    let _page = ParentPage::create(&key, PageGeometry::new(64, 64, 4, 2, 48_000)).unwrap();
    let mut pump = FramePump::new(TestPattern::new(), quick_options());
    assert_eq!(
        pump.init(&key, &Content::default()),
        Err(FsrvError::CapacityExceeded)
    );
    assert_eq!(pump.state(), PumpState::Init);
}

#[test]
fn missing_handshake_ends_the_pump_as_peer_lost() {
    let key = unique_name("HANDSHAKE");
    let _page = ParentPage::create(&key, PageGeometry::new(320, 240, 4, 2, 48_000)).unwrap();
    let mut pump = FramePump::new(TestPattern::new(), quick_options());
    assert_eq!(
        pump.init(&key, &Content::default()),
        Ok(Some(Termination::PeerLost))
    );
    assert_eq!(pump.state(), PumpState::Terminated);
    assert_eq!(pump.start(), Err(FsrvError::InvalidState("ready")));
}

#[test]
fn serve_returns_peer_lost_without_a_handshake() {
    let key = unique_name("SERVE_HANDSHAKE");
    let _page = ParentPage::create(&key, PageGeometry::new(320, 240, 4, 2, 48_000)).unwrap();
    assert_eq!(
        serve(TestPattern::new(), &key, &Content::default(), quick_options()),
        Ok(Termination::PeerLost)
    );
}

#[test]
fn pump_refuses_to_run_before_init() {
    let mut pump = FramePump::new(TestPattern::new(), quick_options());
    assert_eq!(pump.start(), Err(FsrvError::InvalidState("ready")));
    assert_eq!(pump.cycle(), Err(FsrvError::InvalidState("running")));
}

#[derive(Default)]
struct Picky {
    version: Option<u32>,
    loads: usize,
}

impl Producer for Picky {
    fn api_version(&self) -> u32 {
        self.version.unwrap_or(PRODUCER_API_VERSION)
    }

    fn init(&mut self) -> SystemInfo {
        SystemInfo {
            library_name: "picky".into(),
            ..SystemInfo::default()
        }
    }

    fn load(&mut self, content: &Content) -> bool {
        self.loads += 1;
        !content.data.is_empty()
    }

    fn av_info(&self) -> AvInfo {
        AvInfo {
            max_width: 16,
            max_height: 16,
            fps: 60.0,
            sample_rate: 8_000.0,
        }
    }

    fn reset(&mut self) {}

    fn step(&mut self, _io: &mut FrameIo<'_>) -> StepStatus {
        StepStatus::Stop
    }
}

#[test]
fn producer_api_version_is_checked_first() {
    let mut pump = FramePump::new(
        Picky {
            version: Some(99),
            ..Picky::default()
        },
        quick_options(),
    );
    assert!(matches!(
        pump.init("unused", &Content::from_bytes(vec![1])),
        Err(FsrvError::ProducerVersion { found: 99, .. })
    ));
    assert_eq!(pump.producer().loads, 0);
}

#[test]
fn rejected_content_is_fatal() {
    let mut pump = FramePump::new(Picky::default(), quick_options());
    assert_eq!(
        pump.init("unused", &Content::default()),
        Err(FsrvError::LoadFailed)
    );
    assert_eq!(pump.producer().loads, 1);
}
