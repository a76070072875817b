use std::{io, path::Path};

use spark_session::SessionError;
use tracing::warn;

/// 描述一次底层操作对应的稳定错误码与默认文案。
#[derive(Clone, Copy, Debug)]
pub(crate) struct OperationKind {
    pub code: &'static str,
    pub message: &'static str,
}

pub(crate) const OPEN: OperationKind = OperationKind {
    code: "spark.transport.file.open_failed",
    message: "file open",
};
pub(crate) const READ: OperationKind = OperationKind {
    code: "spark.transport.file.read_failed",
    message: "file read",
};
pub(crate) const ENUMERATE: OperationKind = OperationKind {
    code: "spark.transport.file.enumerate_failed",
    message: "directory enumerate",
};

/// 将 IO 错误映射为会话错误，并以操作码记录一条告警。
pub(crate) fn map_io_error(kind: OperationKind, path: &Path, error: io::Error) -> SessionError {
    warn!(
        error.code = kind.code,
        path = %path.display(),
        error = %error,
        "{} failed",
        kind.message
    );
    SessionError::io(kind.message, error)
}

/// 端点分类为“不存在”时上报的错误。
pub(crate) fn not_found(path: &Path) -> SessionError {
    warn!(path = %path.display(), "can not find file or directory");
    SessionError::not_found(path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn io_errors_keep_operation_context() {
        let err = map_io_error(
            READ,
            Path::new("/tmp/x"),
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(err.code(), spark_session::error::codes::IO);
        assert_eq!(err.to_string(), "file read failed: denied");
    }

    #[traced_test]
    #[test]
    fn missing_path_is_not_found() {
        let err = not_found(Path::new("/nowhere"));
        assert!(err.is_not_found());
        assert!(err.to_string().contains("/nowhere"));
        assert!(logs_contain("can not find file or directory"));
    }
}
