//! # error 模块说明
//!
//! ## 角色定位
//! - 汇总会话框架对外暴露的全部错误语义：配置错误同步返回给调用方，
//!   泵送过程中的资源错误则经由过滤链的 `exception_caught` 异步上报；
//! - 每个变体都携带稳定错误码（`spark.session.*`），日志与告警按错误码聚合，不解析文案。
//!
//! ## 分类约定
//! - `InvalidArgument` / `InvalidState`：调用方可立即修正的配置类错误；
//! - `NotFound`：端点分类阶段即可确定的“目标不存在”，泵送循环只上报一次；
//! - `Io`：打开、枚举、读取资源时的底层 IO 故障；
//! - `Handler`：过滤器或业务 Handler 在处理事件时主动返回的失败；
//! - `ConnectAborted`：建连 Future 的完成端在给出结果前被丢弃。

use std::io;

use thiserror::Error;

/// 框架内统一的返回别名。
pub type Result<T, E = SessionError> = core::result::Result<T, E>;

/// 会话框架错误域。
///
/// # 契约 (What)
/// - 所有变体满足 `Send + Sync + 'static`，可以跨线程交给过滤链；
/// - [`SessionError::code`] 返回的码值稳定，新增变体时只能追加新码值；
/// - `context` 字段使用 `'static` 文案标识触发位置，例如 `"acceptor.bind"`。
#[derive(Debug, Error)]
pub enum SessionError {
    /// 参数不合法，例如绑定时既没有显式端点也没有默认端点。
    #[error("invalid argument for `{context}`: {detail}")]
    InvalidArgument {
        context: &'static str,
        detail: String,
    },

    /// 当前状态不允许该操作，例如在已绑定时修改默认端点。
    #[error("invalid state for `{context}`: {detail}")]
    InvalidState {
        context: &'static str,
        detail: String,
    },

    /// 目标资源不存在。
    #[error("can not find file or directory `{target}`")]
    NotFound { target: String },

    /// 底层 IO 失败。
    #[error("{context} failed: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: io::Error,
    },

    /// Handler 或过滤器处理事件时返回的失败。
    #[error("handler failure: {detail}")]
    Handler { detail: String },

    /// 建连结果在完成前被丢弃。
    #[error("connect attempt was aborted before completion")]
    ConnectAborted,
}

impl SessionError {
    /// 构造参数错误。
    pub fn invalid_argument(context: &'static str, detail: impl Into<String>) -> Self {
        Self::InvalidArgument {
            context,
            detail: detail.into(),
        }
    }

    /// 构造状态错误。
    pub fn invalid_state(context: &'static str, detail: impl Into<String>) -> Self {
        Self::InvalidState {
            context,
            detail: detail.into(),
        }
    }

    /// 构造资源不存在错误。
    pub fn not_found(target: impl Into<String>) -> Self {
        Self::NotFound {
            target: target.into(),
        }
    }

    /// 包装底层 IO 错误。
    pub fn io(context: &'static str, source: io::Error) -> Self {
        Self::Io { context, source }
    }

    /// Handler 侧便捷构造，业务代码在 `message_received` 中以 `?` 传播即可。
    pub fn handler(detail: impl Into<String>) -> Self {
        Self::Handler {
            detail: detail.into(),
        }
    }

    /// 返回稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::InvalidArgument { .. } => codes::INVALID_ARGUMENT,
            SessionError::InvalidState { .. } => codes::INVALID_STATE,
            SessionError::NotFound { .. } => codes::NOT_FOUND,
            SessionError::Io { .. } => codes::IO,
            SessionError::Handler { .. } => codes::HANDLER,
            SessionError::ConnectAborted => codes::CONNECT_ABORTED,
        }
    }

    /// 是否为“目标不存在”。
    ///
    /// 除 [`SessionError::NotFound`] 外，底层 `io::ErrorKind::NotFound` 也视为同一语义，
    /// 例如分类之后、打开之前文件被删除。
    pub fn is_not_found(&self) -> bool {
        match self {
            SessionError::NotFound { .. } => true,
            SessionError::Io { source, .. } => source.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

/// 稳定错误码清单。
pub mod codes {
    pub const INVALID_ARGUMENT: &str = "spark.session.invalid_argument";
    pub const INVALID_STATE: &str = "spark.session.invalid_state";
    pub const NOT_FOUND: &str = "spark.session.not_found";
    pub const IO: &str = "spark.session.io";
    pub const HANDLER: &str = "spark.session.handler";
    pub const CONNECT_ABORTED: &str = "spark.session.connect_aborted";
}
