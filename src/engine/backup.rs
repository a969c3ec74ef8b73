//! Соглашение о резервных копиях `.bak`.
//!
//! Перед записью вызывающий код переименовывает архив в `<путь>.bak`, а
//! если чтение основного файла не удалось, восстанавливает копию и
//! пробует ещё раз. Сами читатель и писатель файлов не трогают: эти
//! функции вызываются только явно.

use std::{
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
};

use posdata_error::{ArchiveError, PosResult, StackError};
use tracing::{info, warn};

/// `<путь>.bak`: суффикс дописывается к полному имени файла.
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".bak");
    PathBuf::from(name)
}

/// Переименовывает существующий архив в `.bak`. Возвращает путь копии или
/// `None`, если архива ещё нет.
pub fn backup_file(path: &Path) -> PosResult<Option<PathBuf>> {
    if !path.exists() {
        return Ok(None);
    }
    let bak = backup_path(path);
    fs::rename(path, &bak).map_err(|e| ArchiveError::open(bak.display().to_string(), &e))?;
    Ok(Some(bak))
}

/// Копирует `.bak` поверх основного файла. Копия остаётся на месте.
pub fn restore_backup(path: &Path) -> PosResult<bool> {
    let bak = backup_path(path);
    if !bak.exists() {
        return Ok(false);
    }
    fs::copy(&bak, path).map_err(|e| ArchiveError::open(path.display().to_string(), &e))?;
    info!(path = %path.display(), backup = %bak.display(), "Restored archive from backup");
    Ok(true)
}

/// Загрузка по правилу «записать в лог, восстановить копию, повторить один
/// раз». Если копии нет, возвращается исходная ошибка.
pub fn load_with_restore<T, F>(
    path: &Path,
    mut load: F,
) -> PosResult<T>
where
    F: FnMut(&Path) -> PosResult<T>,
{
    let first = match load(path) {
        Ok(v) => return Ok(v),
        Err(e) => e,
    };

    warn!(
        path = %path.display(),
        error = %first,
        code = %first.status_code(),
        "Archive load failed, trying backup"
    );

    match restore_backup(path) {
        Ok(true) => load(path).map_err(|e: StackError| e.context("loading restored backup")),
        Ok(false) => Err(first),
        Err(restore_err) => {
            warn!(error = %restore_err, "Backup restore failed");
            Err(first)
        }
    }
}

/// Сохраняет архив, предварительно убрав старую версию в `.bak`.
pub fn save_with_backup<F>(
    path: &Path,
    save: F,
) -> PosResult<()>
where
    F: FnOnce(&Path) -> PosResult<()>,
{
    backup_file(path)?;
    save(path)
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use posdata_error::{GenericError, StatusCode};
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_backup_path_appends_suffix() {
        assert_eq!(
            backup_path(Path::new("/data/employee.dat")),
            PathBuf::from("/data/employee.dat.bak")
        );
    }

    /// Тест проверяет полный цикл: backup → испорченный файл → restore.
    #[test]
    fn test_backup_and_restore() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("menu.dat");
        fs::write(&path, b"good").unwrap();

        let bak = backup_file(&path).unwrap().unwrap();
        assert!(!path.exists());
        assert_eq!(fs::read(&bak).unwrap(), b"good");

        fs::write(&path, b"bad").unwrap();
        assert!(restore_backup(&path).unwrap());
        assert_eq!(fs::read(&path).unwrap(), b"good");
        assert!(bak.exists());
    }

    /// Тест проверяет, что сохранение уносит старую версию в `.bak`, а
    /// новая попадает в основной файл.
    #[test]
    fn test_save_with_backup() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("staff.dat");

        save_with_backup(&path, |p| Ok(fs::write(p, b"v1")?)).unwrap();
        assert!(!backup_path(&path).exists());

        save_with_backup(&path, |p| Ok(fs::write(p, b"v2")?)).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"v2");
        assert_eq!(fs::read(backup_path(&path)).unwrap(), b"v1");
    }

    /// Тест проверяет, что при сбое сохранения копия остаётся и её можно
    /// восстановить.
    #[test]
    fn test_failed_save_keeps_backup() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("menu.dat");
        fs::write(&path, b"old").unwrap();

        let err = save_with_backup(&path, |_| {
            Err(GenericError::new(StatusCode::DiskFull, "no space").into())
        })
        .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::DiskFull);
        assert!(!path.exists());
        assert!(restore_backup(&path).unwrap());
        assert_eq!(fs::read(&path).unwrap(), b"old");
    }

    #[test]
    fn test_backup_missing_file() {
        let dir = tempdir().unwrap();
        assert!(backup_file(&dir.path().join("none.dat")).unwrap().is_none());
        assert!(!restore_backup(&dir.path().join("none.dat")).unwrap());
    }

    /// Тест проверяет, что загрузка повторяется ровно один раз после
    /// восстановления копии.
    #[test]
    fn test_load_with_restore_retries_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("jobs.dat");
        fs::write(&path, b"bad").unwrap();
        fs::write(backup_path(&path), b"good").unwrap();

        let calls = Cell::new(0);
        let result = load_with_restore(&path, |p| {
            calls.set(calls.get() + 1);
            let data = fs::read(p)?;
            if data == b"good" {
                Ok(data)
            } else {
                Err(GenericError::new(StatusCode::CorruptedData, "bad archive").into())
            }
        });
        assert_eq!(result.unwrap(), b"good");
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_load_without_backup_returns_first_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("jobs.dat");
        let err = load_with_restore(&path, |_| -> PosResult<()> {
            Err(GenericError::new(StatusCode::CorruptedData, "first").into())
        })
        .unwrap_err();
        assert_eq!(err.to_string(), "first");
    }
}
