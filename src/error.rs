//! Unified error taxonomy / 统一错误类型
//!
//! Every driver translates its native failures into [`Error`] before they
//! leave the driver. The native error is kept as the source of
//! [`Error::Backend`] for diagnostics.

use std::fmt;
use std::io;

use crate::storage::Operation;

/// Crate-wide result type / 统一返回类型
pub type Result<T> = std::result::Result<T, Error>;

/// Error kind, a `Copy` discriminant of [`Error`] / 错误种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Config,
    Unsupported,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    IsADirectory,
    NotADirectory,
    Backend,
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Config => "ConfigError",
            ErrorKind::Unsupported => "Unsupported",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::AlreadyExists => "AlreadyExists",
            ErrorKind::PermissionDenied => "PermissionDenied",
            ErrorKind::IsADirectory => "IsADirectory",
            ErrorKind::NotADirectory => "NotADirectory",
            ErrorKind::Backend => "BackendError",
            ErrorKind::Cancelled => "Cancelled",
        };
        f.write_str(s)
    }
}

/// Storage error / 存储错误
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Bad or missing configuration at construction / 配置错误
    #[error("config error: {0}")]
    Config(String),

    /// Capability bit is false / 驱动不支持该操作
    #[error("operation {operation} is not supported by {scheme}")]
    Unsupported { scheme: String, operation: Operation },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("is a directory: {0}")]
    IsADirectory(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// Backend failure not otherwise classified / 后端错误
    #[error("backend error: {message}")]
    Backend {
        message: String,
        /// Retrying the same call may succeed / 可重试
        temporary: bool,
        #[source]
        source: anyhow::Error,
    },

    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    pub fn unsupported(scheme: impl Into<String>, operation: Operation) -> Self {
        Error::Unsupported {
            scheme: scheme.into(),
            operation,
        }
    }

    /// Permanent backend error / 不可重试的后端错误
    pub fn backend(message: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Error::Backend {
            message: message.into(),
            temporary: false,
            source: source.into(),
        }
    }

    /// Transient backend error, eligible for retry / 可重试的后端错误
    pub fn temporary(message: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Error::Backend {
            message: message.into(),
            temporary: true,
            source: source.into(),
        }
    }

    /// Backend error without a native cause / 无底层原因的后端错误
    pub fn unexpected(message: impl Into<String>) -> Self {
        let message = message.into();
        Error::Backend {
            source: anyhow::anyhow!(message.clone()),
            message,
            temporary: false,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Config(_) => ErrorKind::Config,
            Error::Unsupported { .. } => ErrorKind::Unsupported,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::AlreadyExists(_) => ErrorKind::AlreadyExists,
            Error::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Error::IsADirectory(_) => ErrorKind::IsADirectory,
            Error::NotADirectory(_) => ErrorKind::NotADirectory,
            Error::Backend { .. } => ErrorKind::Backend,
            Error::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Only temporary backend errors are retried / 仅临时后端错误可重试
    pub fn is_temporary(&self) -> bool {
        matches!(self, Error::Backend { temporary: true, .. })
    }

    /// Translate an OS error for `path` / 转换系统IO错误
    pub fn from_io(err: io::Error, path: &str) -> Self {
        // Our own errors tunnelled through AsyncRead come back intact
        if err.get_ref().map_or(false, |e| e.is::<Error>()) {
            if let Some(Ok(inner)) = err.into_inner().map(|e| e.downcast::<Error>()) {
                return *inner;
            }
            return Error::unexpected(format!("io error on {}", path));
        }

        match err.kind() {
            io::ErrorKind::NotFound => Error::NotFound(path.to_string()),
            io::ErrorKind::PermissionDenied => Error::PermissionDenied(path.to_string()),
            io::ErrorKind::AlreadyExists => Error::AlreadyExists(path.to_string()),
            io::ErrorKind::Interrupted
            | io::ErrorKind::TimedOut
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted => {
                Error::temporary(format!("io error on {}", path), err)
            }
            _ => Error::backend(format!("io error on {}", path), err),
        }
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_cancelled() {
            Error::Cancelled
        } else {
            Error::backend("blocking task panicked", err)
        }
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        let kind = match err.kind() {
            ErrorKind::NotFound => io::ErrorKind::NotFound,
            ErrorKind::PermissionDenied => io::ErrorKind::PermissionDenied,
            ErrorKind::AlreadyExists => io::ErrorKind::AlreadyExists,
            ErrorKind::Unsupported => io::ErrorKind::Unsupported,
            ErrorKind::Cancelled => io::ErrorKind::Interrupted,
            _ => io::ErrorKind::Other,
        };
        io::Error::new(kind, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_and_temporary() {
        let err = Error::temporary("slow down", anyhow::anyhow!("503"));
        assert_eq!(err.kind(), ErrorKind::Backend);
        assert!(err.is_temporary());

        let err = Error::NotFound("a".to_string());
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(!err.is_temporary());

        let err = Error::unsupported("memory", Operation::Rename);
        assert_eq!(err.to_string(), "operation rename is not supported by memory");
    }

    #[test]
    fn test_io_round_trip_keeps_kind() {
        let io_err: io::Error = Error::IsADirectory("dir/".to_string()).into();
        let back = Error::from_io(io_err, "dir/");
        assert_eq!(back.kind(), ErrorKind::IsADirectory);

        let io_err = io::Error::new(io::ErrorKind::NotFound, "gone");
        assert_eq!(Error::from_io(io_err, "x").kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_backend_keeps_source() {
        use std::error::Error as _;
        let err = Error::backend("put failed", io::Error::new(io::ErrorKind::Other, "disk full"));
        assert_eq!(err.source().map(|s| s.to_string()), Some("disk full".to_string()));
    }
}
