use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, error, info};

use super::{IoFilter, NextFilter};
use crate::{
    config::IdleStatus,
    error::{Result, SessionError},
    session::IoSession,
};

/// 把会话事件写入 `tracing` 后原样向后传递。
///
/// 生命周期事件记为 `INFO`，消息与空闲事件记为 `DEBUG`，异常记为 `ERROR`。
/// 消息事件只记录长度，不输出内容。
#[derive(Clone, Debug)]
pub struct LoggingFilter {
    target: &'static str,
}

impl LoggingFilter {
    pub fn new() -> Self {
        Self {
            target: "spark_session::logging",
        }
    }

    /// 标签写入每条日志的 `filter` 字段，用于区分同一进程内的多条链。
    pub fn with_target(target: &'static str) -> Self {
        Self { target }
    }

    pub fn target(&self) -> &'static str {
        self.target
    }
}

impl Default for LoggingFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl IoFilter for LoggingFilter {
    fn session_created(&self, next: NextFilter<'_>, session: &Arc<dyn IoSession>) -> Result<()> {
        info!(filter = self.target, session.id = %session.id(), "session created");
        next.session_created(session)
    }

    fn session_opened(&self, next: NextFilter<'_>, session: &Arc<dyn IoSession>) -> Result<()> {
        info!(
            filter = self.target,
            session.id = %session.id(),
            remote = ?session.remote_end_point().map(|ep| ep.to_string()),
            "session opened"
        );
        next.session_opened(session)
    }

    fn session_closed(&self, next: NextFilter<'_>, session: &Arc<dyn IoSession>) -> Result<()> {
        info!(
            filter = self.target,
            session.id = %session.id(),
            read_bytes = session.core().read_bytes(),
            "session closed"
        );
        next.session_closed(session)
    }

    fn session_idle(
        &self,
        next: NextFilter<'_>,
        session: &Arc<dyn IoSession>,
        status: IdleStatus,
    ) -> Result<()> {
        debug!(
            filter = self.target,
            session.id = %session.id(),
            idle = %status,
            count = session.core().idle_count(status),
            "session idle"
        );
        next.session_idle(session, status)
    }

    fn message_received(
        &self,
        next: NextFilter<'_>,
        session: &Arc<dyn IoSession>,
        message: Bytes,
    ) -> Result<()> {
        debug!(
            filter = self.target,
            session.id = %session.id(),
            len = message.len(),
            "message received"
        );
        next.message_received(session, message)
    }

    fn exception_caught(
        &self,
        next: NextFilter<'_>,
        session: &Arc<dyn IoSession>,
        error: &SessionError,
    ) {
        error!(
            filter = self.target,
            session.id = %session.id(),
            error.code = error.code(),
            error.message = %error,
            "exception caught"
        );
        next.exception_caught(session, error)
    }
}
