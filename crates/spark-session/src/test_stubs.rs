//! 会话框架的测试桩集合。
//!
//! # 设计定位（Why）
//! - 过滤链、空闲检测与各传输的集成测试都需要“一个最小会话”与“一个记录全部事件的 Handler”；
//! - 集中维护可以避免每个测试文件重复定义桩类型，契约调整时也只需修改一处。
//!
//! # 使用方式（How）
//! - [`StubSession`]：不绑定任何传输的会话，配置可在构造时指定；
//! - [`RecordingHandler`]：按到达顺序记录事件，可挂载消息钩子模拟业务失败或读暂停；
//! - 异步测试使用 [`RecordingHandler::wait_for`] 等待事件出现，避免固定睡眠。
//!
//! # 契约说明（What）
//! - 桩对象只用于测试与示例，生产代码不应依赖。

use core::time::Duration;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::{
    config::{IdleStatus, SessionConfig},
    error::{Result, SessionError},
    filter::{FilterChain, IoHandler},
    service::TransportMetadata,
    session::{EndPoint, IoSession, SessionCore, SessionId},
};

/// 桩会话使用的传输元数据。
pub const STUB_METADATA: TransportMetadata = TransportMetadata::new("spark", "stub", false, false);

/// 不绑定任何传输的最小会话。
pub struct StubSession {
    core: SessionCore,
    chain: FilterChain,
    config: SessionConfig,
}

impl StubSession {
    pub fn new(handler: Arc<dyn IoHandler>) -> Arc<Self> {
        Self::with_config(handler, SessionConfig::default())
    }

    pub fn with_config(handler: Arc<dyn IoHandler>, config: SessionConfig) -> Arc<Self> {
        Arc::new(Self {
            core: SessionCore::new(),
            chain: FilterChain::new(handler),
            config,
        })
    }
}

impl IoSession for StubSession {
    fn core(&self) -> &SessionCore {
        &self.core
    }

    fn filter_chain(&self) -> &FilterChain {
        &self.chain
    }

    fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn transport_metadata(&self) -> &TransportMetadata {
        &STUB_METADATA
    }

    fn local_end_point(&self) -> Option<&dyn EndPoint> {
        None
    }

    fn remote_end_point(&self) -> Option<&dyn EndPoint> {
        None
    }

    fn close(&self) {
        self.core.mark_closing();
    }
}

/// [`RecordingHandler`] 记录的事件。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecordedEvent {
    Created(SessionId),
    Opened(SessionId),
    Closed(SessionId),
    Idle(SessionId, IdleStatus),
    Message(SessionId, Bytes),
    Exception {
        session: SessionId,
        code: &'static str,
        message: String,
    },
}

type MessageHook = Box<dyn Fn(&Arc<dyn IoSession>, &Bytes) -> Result<()> + Send + Sync>;

/// 记录全部事件的 Handler。
#[derive(Default)]
pub struct RecordingHandler {
    events: Mutex<Vec<RecordedEvent>>,
    on_message: Option<MessageHook>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// 挂载消息钩子：消息先被记录，再交给钩子，钩子的返回值作为 `message_received` 的结果。
    pub fn with_message_hook<F>(hook: F) -> Self
    where
        F: Fn(&Arc<dyn IoSession>, &Bytes) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            events: Mutex::new(Vec::new()),
            on_message: Some(Box::new(hook)),
        }
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().clone()
    }

    pub fn messages(&self) -> Vec<Bytes> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                RecordedEvent::Message(_, bytes) => Some(bytes.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn message_lengths(&self) -> Vec<usize> {
        self.messages().iter().map(Bytes::len).collect()
    }

    /// 按到达顺序拼接全部消息。
    pub fn received_bytes(&self) -> Vec<u8> {
        self.messages().iter().flat_map(|bytes| bytes.iter().copied()).collect()
    }

    pub fn exception_codes(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                RecordedEvent::Exception { code, .. } => Some(*code),
                _ => None,
            })
            .collect()
    }

    pub fn idle_events(&self) -> Vec<IdleStatus> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                RecordedEvent::Idle(_, status) => Some(*status),
                _ => None,
            })
            .collect()
    }

    pub fn count<P>(&self, predicate: P) -> usize
    where
        P: Fn(&RecordedEvent) -> bool,
    {
        self.events.lock().iter().filter(|event| predicate(event)).count()
    }

    /// 以 10ms 为间隔轮询，直到 `predicate` 成立或超时；返回最终是否成立。
    pub async fn wait_for<P>(&self, timeout: Duration, predicate: P) -> bool
    where
        P: Fn(&[RecordedEvent]) -> bool,
    {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if predicate(&self.events.lock()) {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    fn push(&self, event: RecordedEvent) {
        self.events.lock().push(event);
    }
}

impl IoHandler for RecordingHandler {
    fn session_created(&self, session: &Arc<dyn IoSession>) -> Result<()> {
        self.push(RecordedEvent::Created(session.id()));
        Ok(())
    }

    fn session_opened(&self, session: &Arc<dyn IoSession>) -> Result<()> {
        self.push(RecordedEvent::Opened(session.id()));
        Ok(())
    }

    fn session_closed(&self, session: &Arc<dyn IoSession>) -> Result<()> {
        self.push(RecordedEvent::Closed(session.id()));
        Ok(())
    }

    fn session_idle(&self, session: &Arc<dyn IoSession>, status: IdleStatus) -> Result<()> {
        self.push(RecordedEvent::Idle(session.id(), status));
        Ok(())
    }

    fn message_received(&self, session: &Arc<dyn IoSession>, message: Bytes) -> Result<()> {
        self.push(RecordedEvent::Message(session.id(), message.clone()));
        match &self.on_message {
            Some(hook) => hook(session, &message),
            None => Ok(()),
        }
    }

    fn exception_caught(&self, session: &Arc<dyn IoSession>, error: &SessionError) {
        self.push(RecordedEvent::Exception {
            session: session.id(),
            code: error.code(),
            message: error.to_string(),
        });
    }
}
