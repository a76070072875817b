//! 过滤链契约。
//!
//! # 教案式注释
//!
//! ## 契约 (What)
//! - [`IoHandler`]：链尾的业务处理器，接收全部会话事件；
//! - [`IoFilter`]：有序拦截器，默认实现把事件原样交给 [`NextFilter`]，
//!   实现者只覆盖关心的事件，也可以不调用 `next` 以截断事件；
//! - [`FilterChain`]：每个会话一条，构造时绑定链尾 Handler，由 [`FilterChainBuilder`]
//!   在处理器首次添加会话时安装拦截器，且只安装一次；
//! - [`LoggingFilter`]：把事件写入 `tracing` 后继续传递。
//!
//! ## 事件顺序
//! `session_created → session_opened → (message_received | exception_caught | session_idle)* → session_closed`

mod chain;
mod logging;

pub use chain::{
    DefaultFilterChainBuilder, FilterChain, FilterChainBuilder, FilterEntry, NextFilter,
};
pub use logging::LoggingFilter;

use std::sync::Arc;

use bytes::Bytes;

use crate::{
    config::IdleStatus,
    error::{Result, SessionError},
    session::IoSession,
};

/// 链尾业务处理器。
///
/// 全部方法都有空实现；生命周期回调返回的错误会被过滤链转交给 `exception_caught`。
pub trait IoHandler: Send + Sync + 'static {
    fn session_created(&self, _session: &Arc<dyn IoSession>) -> Result<()> {
        Ok(())
    }

    fn session_opened(&self, _session: &Arc<dyn IoSession>) -> Result<()> {
        Ok(())
    }

    fn session_closed(&self, _session: &Arc<dyn IoSession>) -> Result<()> {
        Ok(())
    }

    fn session_idle(&self, _session: &Arc<dyn IoSession>, _status: IdleStatus) -> Result<()> {
        Ok(())
    }

    fn message_received(&self, _session: &Arc<dyn IoSession>, _message: Bytes) -> Result<()> {
        Ok(())
    }

    fn exception_caught(&self, _session: &Arc<dyn IoSession>, _error: &SessionError) {}
}

/// 不处理任何事件的 Handler。
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopHandler;

impl IoHandler for NoopHandler {}

/// 有序拦截器。
pub trait IoFilter: Send + Sync + 'static {
    fn session_created(&self, next: NextFilter<'_>, session: &Arc<dyn IoSession>) -> Result<()> {
        next.session_created(session)
    }

    fn session_opened(&self, next: NextFilter<'_>, session: &Arc<dyn IoSession>) -> Result<()> {
        next.session_opened(session)
    }

    fn session_closed(&self, next: NextFilter<'_>, session: &Arc<dyn IoSession>) -> Result<()> {
        next.session_closed(session)
    }

    fn session_idle(
        &self,
        next: NextFilter<'_>,
        session: &Arc<dyn IoSession>,
        status: IdleStatus,
    ) -> Result<()> {
        next.session_idle(session, status)
    }

    fn message_received(
        &self,
        next: NextFilter<'_>,
        session: &Arc<dyn IoSession>,
        message: Bytes,
    ) -> Result<()> {
        next.message_received(session, message)
    }

    fn exception_caught(
        &self,
        next: NextFilter<'_>,
        session: &Arc<dyn IoSession>,
        error: &SessionError,
    ) {
        next.exception_caught(session, error)
    }
}
