//! 建连 Future。
//!
//! # 教案式注释
//!
//! ## 契约 (What)
//! - [`ConnectFuture`] 解析为会话或失败；完成端 [`ConnectPromise`] 在给出结果前被丢弃时，
//!   Future 解析为 [`SessionError::ConnectAborted`]；
//! - 同步即可确定结果的路径（例如参数错误）使用 [`ConnectFuture::ready`] / [`ConnectFuture::failed`]，
//!   不分配通道。
//!
//! ## 逻辑 (How)
//! - 异步路径基于 `futures::channel::oneshot`，发送端与接收端分别包装为 Promise 与 Future。

use core::{
    fmt,
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};
use std::sync::Arc;

use futures::channel::oneshot;

use crate::error::{Result, SessionError};

/// 创建一对完成端与 Future。
pub fn connect_channel<S: ?Sized>() -> (ConnectPromise<S>, ConnectFuture<S>) {
    let (sender, receiver) = oneshot::channel();
    (
        ConnectPromise { sender },
        ConnectFuture {
            state: State::Pending(receiver),
        },
    )
}

enum State<S: ?Sized> {
    Ready(Option<Result<Arc<S>>>),
    Pending(oneshot::Receiver<Result<Arc<S>>>),
}

/// 建连结果。
#[must_use = "futures do nothing unless polled"]
pub struct ConnectFuture<S: ?Sized> {
    state: State<S>,
}

impl<S: ?Sized> ConnectFuture<S> {
    pub fn ready(session: Arc<S>) -> Self {
        Self {
            state: State::Ready(Some(Ok(session))),
        }
    }

    pub fn failed(error: SessionError) -> Self {
        Self {
            state: State::Ready(Some(Err(error))),
        }
    }
}

impl<S: ?Sized> Future for ConnectFuture<S> {
    type Output = Result<Arc<S>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match &mut this.state {
            State::Ready(slot) => {
                Poll::Ready(slot.take().unwrap_or(Err(SessionError::ConnectAborted)))
            }
            State::Pending(receiver) => match Pin::new(receiver).poll(cx) {
                Poll::Ready(Ok(result)) => Poll::Ready(result),
                Poll::Ready(Err(oneshot::Canceled)) => {
                    Poll::Ready(Err(SessionError::ConnectAborted))
                }
                Poll::Pending => Poll::Pending,
            },
        }
    }
}

impl<S: ?Sized> fmt::Debug for ConnectFuture<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.state {
            State::Ready(Some(Ok(_))) => "ready",
            State::Ready(Some(Err(_))) => "failed",
            State::Ready(None) => "consumed",
            State::Pending(_) => "pending",
        };
        f.debug_struct("ConnectFuture").field("state", &state).finish()
    }
}

/// 建连结果的完成端。
pub struct ConnectPromise<S: ?Sized> {
    sender: oneshot::Sender<Result<Arc<S>>>,
}

impl<S: ?Sized> ConnectPromise<S> {
    /// 写入结果；Future 已被丢弃时返回 `false`。
    pub fn complete(self, result: Result<Arc<S>>) -> bool {
        self.sender.send(result).is_ok()
    }

    pub fn succeed(self, session: Arc<S>) -> bool {
        self.complete(Ok(session))
    }

    pub fn fail(self, error: SessionError) -> bool {
        self.complete(Err(error))
    }

    /// Future 一侧是否已被丢弃。
    pub fn is_canceled(&self) -> bool {
        self.sender.is_canceled()
    }
}

impl<S: ?Sized> fmt::Debug for ConnectPromise<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectPromise")
            .field("canceled", &self.is_canceled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;

    #[test]
    fn promise_completes_future() {
        let (promise, future) = connect_channel::<u32>();
        assert!(promise.succeed(Arc::new(7)));
        assert_eq!(*block_on(future).unwrap(), 7);
    }

    #[test]
    fn dropped_promise_aborts_future() {
        let (promise, future) = connect_channel::<u32>();
        drop(promise);
        let err = block_on(future).unwrap_err();
        assert_eq!(err.code(), crate::error::codes::CONNECT_ABORTED);
    }

    #[test]
    fn failed_future_carries_error() {
        let future =
            ConnectFuture::<u32>::failed(SessionError::invalid_state("connect", "no handler"));
        assert_eq!(
            block_on(future).unwrap_err().code(),
            crate::error::codes::INVALID_STATE
        );
    }

    #[test]
    fn promise_observes_dropped_future() {
        let (promise, future) = connect_channel::<u32>();
        drop(future);
        assert!(promise.is_canceled());
        assert!(!promise.fail(SessionError::ConnectAborted));
    }
}
