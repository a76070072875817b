//! 连接端契约。
//!
//! # 教案式注释
//!
//! ## 契约 (What)
//! - 传输只实现 [`IoConnector::connect0`]，其余重载由默认方法提供；
//! - 未设置 Handler 时任何建连都解析为状态错误；`connect_default` 在没有默认远端时同样解析为状态错误；
//! - 会话初始化器在 Future 完成之前、会话交给处理器之前执行。

use std::sync::Arc;

use crate::{
    error::SessionError,
    filter::IoHandler,
    future::ConnectFuture,
    session::IoSession,
};

/// 会话初始化器。
pub type SessionInitializer<S> = Box<dyn FnOnce(&Arc<S>) + Send + 'static>;

pub trait IoConnector: Send + Sync + 'static {
    type EndPoint: Clone + Send + Sync + 'static;
    type Session: IoSession;

    /// 当前 Handler。
    fn handler(&self) -> Option<Arc<dyn IoHandler>>;

    fn default_remote_end_point(&self) -> Option<Self::EndPoint>;

    /// 传输专属的建连实现，调用前已确认 Handler 存在。
    fn connect0(
        &self,
        remote: Self::EndPoint,
        local: Option<Self::EndPoint>,
        initializer: Option<SessionInitializer<Self::Session>>,
    ) -> ConnectFuture<Self::Session>;

    /// 连接默认远端。
    fn connect_default(&self) -> ConnectFuture<Self::Session> {
        match self.default_remote_end_point() {
            Some(remote) => self.connect_with(remote, None, None),
            None => ConnectFuture::failed(SessionError::invalid_state(
                "connector.connect",
                "default remote end point is not set",
            )),
        }
    }

    fn connect(&self, remote: Self::EndPoint) -> ConnectFuture<Self::Session> {
        self.connect_with(remote, None, None)
    }

    fn connect_with_local(
        &self,
        remote: Self::EndPoint,
        local: Self::EndPoint,
    ) -> ConnectFuture<Self::Session> {
        self.connect_with(remote, Some(local), None)
    }

    fn connect_with(
        &self,
        remote: Self::EndPoint,
        local: Option<Self::EndPoint>,
        initializer: Option<SessionInitializer<Self::Session>>,
    ) -> ConnectFuture<Self::Session> {
        if self.handler().is_none() {
            return ConnectFuture::failed(SessionError::invalid_state(
                "connector.connect",
                "handler is not set",
            ));
        }
        self.connect0(remote, local, initializer)
    }
}
