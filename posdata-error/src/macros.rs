/// Немедленно возвращает ошибку из текущей функции.
///
/// Формы:
/// - `bail!(err)` — любой тип, конвертируемый в `StackError`;
/// - `bail!(code, "msg")` — `GenericError` с кодом и сообщением;
/// - `bail!(code, "fmt {}", arg)` — с форматированием.
///
/// ```ignore
/// use posdata_error::{bail, StatusCode};
///
/// fn check_delimiter(delimiter: char) -> posdata_error::PosResult<()> {
///     if delimiter == '\n' {
///         bail!(StatusCode::InvalidArgs, "newline cannot be a delimiter");
///     }
///     Ok(())
/// }
/// ```
#[macro_export]
macro_rules! bail {
    ($err:expr) => {
        return Err($crate::StackError::from($err))
    };
    ($code:expr, $msg:expr) => {
        return Err($crate::StackError::new(
            $crate::types::GenericError::new($code, $msg)
        ))
    };
    ($code:expr, $fmt:expr, $($arg:tt)*) => {
        return Err($crate::StackError::new(
            $crate::types::GenericError::new($code, format!($fmt, $($arg)*))
        ))
    };
}

/// Проверяет условие и вызывает `bail!`, если оно ложно.
///
/// ```ignore
/// use posdata_error::{ensure, ArchiveError};
///
/// fn check_len(len: usize, limit: usize) -> posdata_error::PosResult<()> {
///     ensure!(
///         len <= limit,
///         ArchiveError::SizeLimit {
///             what: "string".into(),
///             size: len as u64,
///             limit: limit as u64,
///             offset: None,
///         }
///     );
///     Ok(())
/// }
/// ```
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $err:expr) => {
        if !($cond) {
            $crate::bail!($err);
        }
    };
    ($cond:expr, $code:expr, $msg:expr) => {
        if !($cond) {
            $crate::bail!($code, $msg);
        }
    };
    ($cond:expr, $code:expr, $fmt:expr, $($arg:tt)*) => {
        if !($cond) {
            $crate::bail!($code, $fmt, $($arg)*);
        }
    };
}

/// Трейт-расширение для `Result`: `.context(...)` и `.with_context(...)`
/// превращают ошибку в [`StackError`](crate::StackError) и добавляют к ней
/// контекст с местом вызова.
pub trait ResultExt<T> {
    /// Добавляет контекст к ошибке.
    fn context<C>(
        self,
        ctx: C,
    ) -> Result<T, crate::StackError>
    where
        C: Into<String>;

    /// Ленивый контекст: строка формируется только в случае ошибки.
    fn with_context<C, F>(
        self,
        f: F,
    ) -> Result<T, crate::StackError>
    where
        C: Into<String>,
        F: FnOnce() -> C;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: Into<crate::StackError>,
{
    #[track_caller]
    fn context<C>(
        self,
        ctx: C,
    ) -> Result<T, crate::StackError>
    where
        C: Into<String>,
    {
        self.map_err(|e| e.into().context(ctx))
    }

    #[track_caller]
    fn with_context<C, F>(
        self,
        f: F,
    ) -> Result<T, crate::StackError>
    where
        C: Into<String>,
        F: FnOnce() -> C,
    {
        self.map_err(|e| e.into().context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ArchiveError, GenericError, PosResult, StatusCode};

    #[test]
    fn test_bail_typed_error() {
        fn open() -> PosResult<()> {
            bail!(ArchiveError::Closed {
                operation: "read".to_string()
            });
        }

        let err = open().unwrap_err();
        assert_eq!(err.status_code(), StatusCode::ArchiveClosed);
    }

    #[test]
    fn test_bail_with_format() {
        fn example(width: u8) -> PosResult<()> {
            bail!(StatusCode::InvalidArgs, "unsupported width hint: {}", width);
        }

        let err = example(3).unwrap_err();
        assert!(err.to_string().contains("unsupported width hint: 3"));
    }

    #[test]
    fn test_ensure() {
        fn validate(delimiter: char) -> PosResult<()> {
            ensure!(
                delimiter != '\n',
                StatusCode::InvalidArgs,
                "newline cannot be a delimiter"
            );
            ensure!(
                delimiter.is_ascii(),
                StatusCode::InvalidArgs,
                "delimiter must be ASCII, got {:?}",
                delimiter
            );
            Ok(())
        }

        assert!(validate(':').is_ok());
        assert!(validate('\n').is_err());
        assert!(validate('→').is_err());
    }

    /// Тест проверяет, что `context` добавляет ровно один контекст.
    #[test]
    fn test_result_ext_context() {
        fn inner() -> Result<(), GenericError> {
            Err(GenericError::new(StatusCode::Io, "disk gone"))
        }

        fn outer() -> PosResult<()> {
            inner().context("saving employee archive")?;
            Ok(())
        }

        let err = outer().unwrap_err();
        assert_eq!(err.contexts().len(), 1);
        assert_eq!(err.contexts()[0].message, "saving employee archive");
        assert!(err.contexts()[0].location.is_some());
    }

    /// Тест проверяет, что ленивый контекст не вычисляется при успехе.
    #[test]
    fn test_with_context_lazy() {
        let mut calls = 0;
        let ok: Result<(), GenericError> = Ok(());
        ok.with_context(|| {
            calls += 1;
            "never"
        })
        .unwrap();
        assert_eq!(calls, 0);

        let failed: Result<(), GenericError> =
            Err(GenericError::new(StatusCode::Internal, "boom"));
        let err = failed.with_context(|| "loading menu").unwrap_err();
        assert_eq!(err.contexts()[0].message, "loading menu");
    }
}
