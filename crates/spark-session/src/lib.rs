#![doc = r#"
# spark-session

## 设计动机（Why）
- **定位**：传输无关的异步 I/O 会话框架。会话代表与一个远端的通信，无论底层是套接字、
  文件还是任意字节源，事件都经由同一条过滤链交给业务 Handler。
- **架构角色**：本 crate 只定义契约与通用状态；具体传输（例如 `spark-transport-file`）
  组合这里的服务、会话与空闲检测器，实现自己的处理器与泵送循环。

## 核心契约（What）
- **服务生命周期**：[`Acceptor`] 维护绑定集合，在空/非空翻转时恰好触发一次激活/停用事件；
  连接端以托管会话集合的翻转表达同样的语义；
- **会话事件**：`created → opened → (message_received | exception_caught | idle)* → closed`；
- **空闲检测**：[`IdleStatusChecker`] 每个服务一个，独立于会话泵送运行；
- **错误**：配置类错误同步返回 [`SessionError`]，资源类错误经 `exception_caught` 异步上报，
  不以 panic 跨线程传播。

## 实现策略（How）
- 共享状态使用 `parking_lot` 锁与 `dashmap`，回调一律在锁外触发；
- 后台任务运行在 Tokio 上，建连结果通过 `futures::channel::oneshot` 交付；
- 日志统一使用 `tracing`，[`LoggingFilter`] 可直接挂到过滤链上。
"#]

pub mod acceptor;
pub mod config;
pub mod connector;
pub mod error;
pub mod filter;
pub mod future;
pub mod idle;
pub mod processor;
pub mod service;
pub mod session;
/// 测试桩命名空间，集中暴露最小会话与记录型 Handler，供单元测试、集成测试与各传输复用。
pub mod test_stubs;

pub use acceptor::{Acceptor, AcceptorBinding};
pub use config::{IdleStatus, SessionConfig, TransportConfig};
pub use connector::{IoConnector, SessionInitializer};
pub use error::{Result, SessionError};
pub use filter::{
    DefaultFilterChainBuilder, FilterChain, FilterChainBuilder, IoFilter, IoHandler,
    LoggingFilter, NextFilter, NoopHandler,
};
pub use future::{ConnectFuture, ConnectPromise, connect_channel};
pub use idle::{DEFAULT_CHECK_INTERVAL, IdleStatusChecker, SessionSupplier};
pub use processor::{IoProcessor, WriteRequest};
pub use service::{ServiceCore, ServiceListener, ServiceRole, ServiceSupport, TransportMetadata};
pub use session::{AttributeMap, EndPoint, IoSession, SessionCore, SessionId};
