//! Платформенный слой: именованные POSIX-семафоры через `libc` и
//! отображение файлов через `memmap2`.

use std::ffi::CString;
use std::fs::{self, OpenOptions};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use memmap2::{MmapMut, MmapOptions};

use crate::error::{FsrvError, Result};

// ============================================================================
// Semaphore - named POSIX semaphore
// ============================================================================

pub struct Semaphore {
    sem: *mut libc::sem_t,
    name: CString,
    owner: bool,
}

// Операции над sem_t потокобезопасны.
unsafe impl Send for Semaphore {}
unsafe impl Sync for Semaphore {}

impl Semaphore {
    /// Создаёт семафор со счётчиком 0, заменяя оставшийся от упавшей сессии.
    /// Создатель удаляет имя при drop.
    pub fn create(name: &str) -> Result<Self> {
        let cname = CString::new(name).map_err(|_| FsrvError::InvalidKey(name.to_owned()))?;
        unsafe {
            libc::sem_unlink(cname.as_ptr());
        }
        let sem = unsafe {
            libc::sem_open(
                cname.as_ptr(),
                libc::O_CREAT | libc::O_EXCL,
                0o600 as libc::c_uint,
                0 as libc::c_uint,
            )
        };
        if sem == libc::SEM_FAILED {
            return Err(FsrvError::last_os_error("sem_open(create)"));
        }
        Ok(Semaphore {
            sem,
            name: cname,
            owner: true,
        })
    }

    pub fn open(name: &str) -> Result<Self> {
        let cname = CString::new(name).map_err(|_| FsrvError::InvalidKey(name.to_owned()))?;
        let sem = unsafe { libc::sem_open(cname.as_ptr(), 0) };
        if sem == libc::SEM_FAILED {
            return Err(FsrvError::last_os_error("sem_open"));
        }
        Ok(Semaphore {
            sem,
            name: cname,
            owner: false,
        })
    }

    pub fn post(&self) -> Result<()> {
        if unsafe { libc::sem_post(self.sem) } != 0 {
            return Err(FsrvError::last_os_error("sem_post"));
        }
        Ok(())
    }

    /// Неблокирующее ожидание. `Ok(false)`, если счётчик равен нулю.
    pub fn try_wait(&self) -> Result<bool> {
        loop {
            if unsafe { libc::sem_trywait(self.sem) } == 0 {
                return Ok(true);
            }
            match errno() {
                libc::EINTR => continue,
                libc::EAGAIN => return Ok(false),
                code => {
                    return Err(FsrvError::OsError {
                        code,
                        context: "sem_trywait",
                    })
                }
            }
        }
    }

    /// Блокирующее ожидание. `None` ждёт бесконечно; `Ok(false)` означает таймаут.
    pub fn wait(&self, timeout: Option<Duration>) -> Result<bool> {
        match timeout {
            None => loop {
                if unsafe { libc::sem_wait(self.sem) } == 0 {
                    return Ok(true);
                }
                match errno() {
                    libc::EINTR => continue,
                    code => {
                        return Err(FsrvError::OsError {
                            code,
                            context: "sem_wait",
                        })
                    }
                }
            },
            Some(timeout) => self.timed_wait(timeout),
        }
    }

    /// Бесконечное ожидание, разбитое на шаги длиной `slice`. Возвращает
    /// `Ok(false)`, как только `alive` между шагами сообщит, что пира нет.
    pub fn wait_while<F>(&self, slice: Duration, mut alive: F) -> Result<bool>
    where
        F: FnMut() -> bool,
    {
        loop {
            if self.timed_wait(slice)? {
                return Ok(true);
            }
            if !alive() {
                return Ok(false);
            }
        }
    }

    #[cfg(target_os = "linux")]
    fn timed_wait(&self, timeout: Duration) -> Result<bool> {
        let mut now = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        if unsafe { libc::clock_gettime(libc::CLOCK_REALTIME, &mut now) } != 0 {
            return Err(FsrvError::last_os_error("clock_gettime"));
        }
        let nanos = now.tv_nsec as u64 + timeout.subsec_nanos() as u64;
        let carry = (nanos / 1_000_000_000) as libc::time_t;
        let deadline = libc::timespec {
            tv_sec: now.tv_sec + timeout.as_secs() as libc::time_t + carry,
            tv_nsec: (nanos % 1_000_000_000) as libc::c_long,
        };
        loop {
            if unsafe { libc::sem_timedwait(self.sem, &deadline) } == 0 {
                return Ok(true);
            }
            match errno() {
                libc::EINTR => continue,
                libc::ETIMEDOUT => return Ok(false),
                code => {
                    return Err(FsrvError::OsError {
                        code,
                        context: "sem_timedwait",
                    })
                }
            }
        }
    }

    // Вне Linux нет sem_timedwait, поэтому опрос с короткой паузой.
    #[cfg(not(target_os = "linux"))]
    fn timed_wait(&self, timeout: Duration) -> Result<bool> {
        let start = std::time::Instant::now();
        loop {
            if self.try_wait()? {
                return Ok(true);
            }
            if start.elapsed() >= timeout {
                return Ok(false);
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            libc::sem_close(self.sem);
            if self.owner {
                libc::sem_unlink(self.name.as_ptr());
            }
        }
    }
}

fn errno() -> i32 {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(-1)
}

// ============================================================================
// PeerWatch - liveness of the page owner
// ============================================================================

/// Идентичность файла страницы на момент attach. Владелец удаляет файл при
/// завершении, поэтому пропавший или подменённый файл означает, что его нет.
#[derive(Clone, Debug)]
pub struct PeerWatch {
    path: PathBuf,
    dev: u64,
    ino: u64,
}

impl PeerWatch {
    pub fn new(path: &Path) -> Result<Self> {
        let meta =
            fs::metadata(path).map_err(|err| FsrvError::from_io(err, "inspecting page file"))?;
        Ok(Self {
            path: path.to_path_buf(),
            dev: meta.dev(),
            ino: meta.ino(),
        })
    }

    pub fn alive(&self) -> bool {
        fs::metadata(&self.path)
            .map(|meta| meta.dev() == self.dev && meta.ino() == self.ino)
            .unwrap_or(false)
    }
}

// ============================================================================
// Mapping - file-backed shared mapping
// ============================================================================

pub struct Mapping {
    map: MmapMut,
    path: Option<PathBuf>,
}

impl Mapping {
    /// Создаёт (или обрезает) файл размером `size` байт и отображает его.
    /// Создатель удаляет файл при drop.
    pub fn create(path: &Path, size: usize) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|err| FsrvError::from_io(err, "creating page file"))?;
        file.set_len(size as u64)
            .map_err(|err| FsrvError::from_io(err, "sizing page file"))?;
        let map = unsafe { MmapOptions::new().len(size).map_mut(&file) }
            .map_err(|err| FsrvError::from_io(err, "mapping page file"))?;
        Ok(Mapping {
            map,
            path: Some(path.to_path_buf()),
        })
    }

    /// Отображает существующий файл страницы целиком.
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|err| FsrvError::from_io(err, "opening page file"))?;
        let map = unsafe { MmapMut::map_mut(&file) }
            .map_err(|err| FsrvError::from_io(err, "mapping page file"))?;
        Ok(Mapping { map, path: None })
    }

    /// Приватное отображение, когда пиру не нужно подключаться.
    #[cfg(test)]
    pub fn anonymous(size: usize) -> Result<Self> {
        let map = MmapMut::map_anon(size)
            .map_err(|err| FsrvError::from_io(err, "mapping anonymous page"))?;
        Ok(Mapping { map, path: None })
    }

    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.map.as_mut_ptr()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }
}

impl Drop for Mapping {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            let _ = fs::remove_file(path);
        }
    }
}
