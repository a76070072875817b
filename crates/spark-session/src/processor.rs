//! 处理器契约。
//!
//! # 教案式注释
//!
//! ## 契约 (What)
//! - `add`：构建会话过滤链（只构建一次）、触发 `session_created`/`session_opened`，随后开始驱动会话；
//! - `remove`：协作式停止驱动并触发 `session_destroyed`，不等待驱动任务退出；
//! - `write` / `flush` / `update_traffic_control`：拉取型传输实现为显式空操作并返回 `Ok(())`，
//!   不得以“不支持”报错。
//!
//! ## 注意事项
//! - 同一会话重复 `add` 不会重复启动驱动；
//! - `remove` 之后会话不可再次添加。

use std::sync::Arc;

use bytes::Bytes;

use crate::error::Result;

/// 一次写请求。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriteRequest {
    message: Bytes,
}

impl WriteRequest {
    pub fn new(message: impl Into<Bytes>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &Bytes {
        &self.message
    }

    pub fn into_message(self) -> Bytes {
        self.message
    }
}

/// 会话处理器。
///
/// 类型参数 `S` 为处理器负责的具体会话类型。
pub trait IoProcessor<S: ?Sized>: Send + Sync + 'static {
    /// 接管会话并开始驱动。
    fn add(&self, session: &Arc<S>) -> Result<()>;

    /// 停止驱动并销毁会话。
    fn remove(&self, session: &Arc<S>);

    fn write(&self, session: &Arc<S>, request: WriteRequest) -> Result<()>;

    fn flush(&self, session: &Arc<S>) -> Result<()>;

    /// 根据会话的读暂停状态调整流量控制。
    fn update_traffic_control(&self, session: &Arc<S>) -> Result<()>;
}
