use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// 读取 /proc 时的错误
#[derive(Debug, Error)]
pub enum ProcError {
    /// 内核接口返回的数据格式不符合预期
    #[error("unexpected format: {0}")]
    Format(String),

    /// 进程在枚举与读取之间退出
    #[error("process {0} no longer exists")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl ProcError {
    /// 将单个进程路径上的 IO 错误归类：进程消失的情况映射为 `NotFound`
    pub fn from_pid_io(pid: &str, err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::NotFound || err.raw_os_error() == Some(libc::ESRCH) {
            ProcError::NotFound(pid.to_string())
        } else {
            ProcError::Io(err)
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ProcError::NotFound(_))
    }
}

/// 命令分发过程中的错误
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("failed to read {}: {source}", path.display())]
    ConfigUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{0}")]
    Execution(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("{0} is not supported on this platform")]
    Unsupported(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_maps_to_not_found() {
        let err = io::Error::new(io::ErrorKind::NotFound, "gone");
        let mapped = ProcError::from_pid_io("42", err);
        assert!(mapped.is_not_found());
        assert_eq!(mapped.to_string(), "process 42 no longer exists");
    }

    #[test]
    fn test_esrch_maps_to_not_found() {
        let err = io::Error::from_raw_os_error(libc::ESRCH);
        assert!(ProcError::from_pid_io("7", err).is_not_found());
    }

    #[test]
    fn test_other_io_errors_are_kept() {
        let err = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        let mapped = ProcError::from_pid_io("1", err);
        assert!(matches!(mapped, ProcError::Io(_)));
    }
}
