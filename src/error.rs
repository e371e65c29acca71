/// Удобный тип результата для библиотеки.
pub type Result<T> = std::result::Result<T, FsrvError>;

/// Ошибки страницы, её концов и frame pump.
///
/// Таймаут ожидания семафора ошибкой не считается: ожидание возвращает
/// `Ok(false)`, а вызывающая сторона считает это потерей пира.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FsrvError {
    /// Из ключа нельзя получить путь или имена семафоров.
    #[error("invalid page key {0:?}")]
    InvalidKey(String),
    /// Неверное «магическое» значение или несогласованная геометрия страницы.
    #[error("shared page is corrupted")]
    Corrupted,
    /// Страница создана несовместимой версией протокола.
    #[error("page protocol version {found:#x}, expected {expected:#x}")]
    VersionMismatch { found: u32, expected: u32 },
    /// Геометрия producer'а не помещается в ёмкость, заданную при создании.
    #[error("requested geometry exceeds page capacity")]
    CapacityExceeded,
    /// Поддерживается только канонический формат 4 байта на пиксель.
    #[error("unsupported pixel layout of {0} bytes per pixel")]
    UnsupportedFormat(u8),
    /// В очереди событий нет свободного слота.
    #[error("event queue is full")]
    QueueFull,
    /// Метка события хранится inline и ограничена по длине.
    #[error("event label exceeds {max} bytes")]
    LabelTooLong { max: usize },
    /// Кадр от producer'а нельзя сконвертировать.
    #[error("invalid video frame: {0}")]
    InvalidFrame(&'static str),
    /// Producer реализует другую версию API.
    #[error("producer API version {found}, expected {expected}")]
    ProducerVersion { found: u32, expected: u32 },
    /// Producer с таким именем не зарегистрирован.
    #[error("no producer named {0:?}")]
    MissingProducer(String),
    /// Producer отказался загружать контент.
    #[error("producer failed to load content")]
    LoadFailed,
    /// Операция недопустима в текущем состоянии pump.
    #[error("frame pump is not in the {0} state")]
    InvalidState(&'static str),
    /// Системная ошибка (errno) при вызове ОС.
    #[error("os error {code} while {context}")]
    OsError {
        /// Значение errno, либо -1, если его нет.
        code: i32,
        /// Что выполнялось.
        context: &'static str,
    },
}

impl FsrvError {
    pub(crate) fn last_os_error(context: &'static str) -> Self {
        Self::from_io(std::io::Error::last_os_error(), context)
    }

    pub(crate) fn from_io(err: std::io::Error, context: &'static str) -> Self {
        FsrvError::OsError {
            code: err.raw_os_error().unwrap_or(-1),
            context,
        }
    }
}
