use std::path::{Path, PathBuf};

use crate::error::{FsrvError, Result};

/// Запас под NAME_MAX с учётом префикса "sem.", который добавляет libc.
const MAX_SEM_NAME: usize = 240;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    ToParent,
    ToChild,
}

impl Direction {
    fn as_str(&self) -> &'static str {
        match self {
            Direction::ToParent => "P",
            Direction::ToChild => "C",
        }
    }
}

fn validate(key: &str) -> Result<()> {
    if key.is_empty() || key.contains('\0') {
        return Err(FsrvError::InvalidKey(key.to_owned()));
    }
    Ok(())
}

/// Файл страницы: абсолютный ключ используется как есть, остальные ключи
/// кладутся в `/dev/shm` (или во временный каталог, если его нет).
pub fn page_path(key: &str) -> Result<PathBuf> {
    validate(key)?;
    let path = Path::new(key);
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    if key.contains('/') {
        return Err(FsrvError::InvalidKey(key.to_owned()));
    }
    let shm = Path::new("/dev/shm");
    let dir = if shm.is_dir() {
        shm.to_path_buf()
    } else {
        std::env::temp_dir()
    };
    Ok(dir.join(format!("fsrv_{key}")))
}

/// 64-bit FNV-1a.
fn key_hash(key: &str) -> u64 {
    key.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ byte as u64).wrapping_mul(0x0100_0000_01b3)
    })
}

/// Читаемый хвост ключа плюс хэш всего ключа: ключи, которые после очистки
/// или обрезки совпадают, всё равно получают разные имена.
fn sem_prefix(key: &str) -> String {
    let body: String = key
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    let body = body.trim_start_matches('_');
    let keep = body.len().min(MAX_SEM_NAME - 32);
    format!("/fsrv_{:016x}_{}", key_hash(key), &body[body.len() - keep..])
}

/// Имя однонаправленного семафора (канал событий).
pub fn sem_name(key: &str, suffix: &str) -> Result<String> {
    validate(key)?;
    Ok(format!("{}_{}", sem_prefix(key), suffix))
}

/// Имя одного направления gate.
pub fn gate_name(key: &str, suffix: &str, direction: Direction) -> Result<String> {
    validate(key)?;
    Ok(format!("{}_{}{}", sem_prefix(key), suffix, direction.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_keys_are_kept() {
        let path = page_path("/tmp/fsrv_page_key").unwrap();
        assert_eq!(path, PathBuf::from("/tmp/fsrv_page_key"));
    }

    #[test]
    fn relative_keys_with_separators_are_rejected() {
        assert!(matches!(page_path("a/b"), Err(FsrvError::InvalidKey(_))));
        assert!(matches!(page_path(""), Err(FsrvError::InvalidKey(_))));
    }

    #[test]
    fn semaphore_names_are_single_component() {
        let name = gate_name("/tmp/some dir/key.1", "V", Direction::ToChild).unwrap();
        assert!(name.starts_with("/fsrv_"));
        assert_eq!(name.matches('/').count(), 1);
        assert!(name.ends_with("_VC"));
        assert_ne!(
            name,
            gate_name("/tmp/some dir/key.1", "V", Direction::ToParent).unwrap()
        );
    }

    #[test]
    fn long_keys_are_truncated_from_the_front() {
        let key = "k".repeat(600) + "tail";
        let name = sem_name(&key, "E").unwrap();
        assert!(name.len() <= MAX_SEM_NAME);
        assert!(name.ends_with("tail_E"));
    }

    #[test]
    fn keys_that_sanitize_alike_get_distinct_names() {
        assert_ne!(sem_name("a.b", "E").unwrap(), sem_name("a_b", "E").unwrap());
        assert_ne!(
            gate_name("k.x", "V", Direction::ToChild).unwrap(),
            gate_name("k_x", "V", Direction::ToChild).unwrap()
        );
    }

    #[test]
    fn long_keys_with_the_same_tail_get_distinct_names() {
        let tail = "t".repeat(400);
        let first = sem_name(&format!("a{tail}"), "E").unwrap();
        let second = sem_name(&format!("b{tail}"), "E").unwrap();
        assert_ne!(first, second);
        assert!(first.len() <= MAX_SEM_NAME);
    }

    #[test]
    fn names_are_stable_per_key() {
        assert_eq!(sem_name("session", "E").unwrap(), sem_name("session", "E").unwrap());
    }
}
