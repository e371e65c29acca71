use std::time::Duration;

/// Общее «магическое» значение для страницы.
pub const SHARED_MAGIC: u32 = 0x4653_5256; // 'FSRV'
/// Текущая версия протокола страницы.
pub const SHARED_VERSION: u32 = 0x0001_0000;

/// Версия контракта `Producer`, который ведёт frame pump.
pub const PRODUCER_API_VERSION: u32 = 1;

/// Канонический размер пикселя в общем видеобуфере (байты).
pub const CANONICAL_BPP: u8 = 4;

/// Логические порты джойпада.
pub const MAX_PORTS: usize = 4;
/// Кнопок на порт.
pub const MAX_BUTTONS: usize = 12;
/// Аналоговые оси в таблице ввода.
pub const MAX_AXES: usize = 2;

/// Слотов в каждой очереди событий (один всегда свободен).
pub const EVENT_QUEUE_CAPACITY: usize = 64;
/// Байт под метку в записи события.
pub const EVENT_LABEL_LEN: usize = 24;

/// Запас сэмплов в аудиокольце на кадр.
pub const AUDIO_HEADROOM_SAMPLES: usize = 4;
/// Значение guard-слота при переполнении аудиокольца producer'ом.
pub const AUDIO_GUARD_PATTERN: i16 = 0xADEDu16 as i16;
/// Сколько секунд звука вмещает общий аудиорегион.
pub const AUDIO_REGION_SECONDS: usize = 1;

/// Выравнивание каждого региона внутри страницы.
pub const REGION_ALIGN: usize = 64;

/// Суффиксы имён семафоров.
pub const SEM_VIDEO_SUFFIX: &str = "V";
pub const SEM_AUDIO_SUFFIX: &str = "A";
pub const SEM_EVENT_SUFFIX: &str = "E";

/// Шаг бесконечного ожидания; между шагами проверяется владелец страницы.
pub const PEER_POLL_INTERVAL: Duration = Duration::from_millis(250);
