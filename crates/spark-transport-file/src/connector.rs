//! 文件连接器。
//!
//! # 教案式注释
//!
//! ## 契约 (What)
//! - “连接”一个 [`FileEndPoint`] 即创建一个 [`FileSession`]：执行初始化器、交给处理器、
//!   启动空闲检测器，然后完成建连 Future；
//! - 连接器同时充当会话的处理器，并持有唯一的 [`IdleStatusChecker`]，首次建连时惰性启动；
//! - `dispose` 停止空闲检测并移除全部托管会话，重复调用为空操作；析构时自动执行同样的清理。
//!
//! ## 逻辑 (How)
//! - 连接器以 `Arc::new_cyclic` 构造，会话与空闲检测器只持有弱引用，避免引用环；
//! - 新会话拿到的是服务配置在建连时刻的快照。

use core::fmt;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use spark_session::{
    ConnectFuture, DefaultFilterChainBuilder, IdleStatusChecker, IoConnector, IoHandler,
    IoProcessor, IoSession, Result, ServiceCore, ServiceListener, ServiceRole, SessionError,
    SessionInitializer, SessionSupplier, connect_channel,
};
use tokio::runtime::Handle;
use tracing::{debug, info};

use crate::{
    config::FileSessionConfig,
    end_point::FileEndPoint,
    processor::FileProcessor,
    session::{FileSession, METADATA},
};

pub struct FileConnector {
    core: ServiceCore<FileSessionConfig>,
    processor: FileProcessor,
    idle_checker: IdleStatusChecker,
    default_remote: RwLock<Option<FileEndPoint>>,
    runtime: Handle,
    this: Weak<FileConnector>,
}

impl FileConnector {
    /// 在当前 Tokio 运行时上创建连接器；不在运行时上下文中时返回状态错误。
    pub fn new(config: FileSessionConfig) -> Result<Arc<Self>> {
        let runtime = Handle::try_current().map_err(|err| {
            SessionError::invalid_state("file_connector.new", err.to_string())
        })?;
        Ok(Self::with_runtime(config, runtime))
    }

    /// 在指定运行时上创建连接器，泵送任务与空闲检测器都运行在该运行时上。
    pub fn with_runtime(config: FileSessionConfig, runtime: Handle) -> Arc<Self> {
        Arc::new_cyclic(|this: &Weak<FileConnector>| {
            let weak = this.clone();
            let sessions: SessionSupplier = Arc::new(move || {
                weak.upgrade()
                    .map(|connector| connector.core.support().managed_sessions())
                    .unwrap_or_default()
            });
            Self {
                core: ServiceCore::new(METADATA, ServiceRole::Connector, config),
                processor: FileProcessor,
                idle_checker: IdleStatusChecker::with_default_interval(sessions),
                default_remote: RwLock::new(None),
                runtime,
                this: this.clone(),
            }
        })
    }

    pub fn core(&self) -> &ServiceCore<FileSessionConfig> {
        &self.core
    }

    pub fn processor(&self) -> &FileProcessor {
        &self.processor
    }

    pub fn idle_checker(&self) -> &IdleStatusChecker {
        &self.idle_checker
    }

    pub fn set_handler(&self, handler: Arc<dyn IoHandler>) -> Result<()> {
        self.core.set_handler(handler)
    }

    /// 新会话使用的默认过滤链模板。
    pub fn filter_chain(&self) -> &Arc<DefaultFilterChainBuilder> {
        self.core.default_filter_chain()
    }

    pub fn add_listener(&self, listener: Arc<dyn ServiceListener>) {
        self.core.support().add_listener(listener);
    }

    /// 当前服务配置的快照。
    pub fn session_config(&self) -> Arc<FileSessionConfig> {
        self.core.session_config()
    }

    /// 修改服务配置，只影响之后建立的会话。
    pub fn update_session_config<R>(&self, update: impl FnOnce(&mut FileSessionConfig) -> R) -> R {
        self.core.update_session_config(update)
    }

    pub fn set_default_remote_end_point(&self, end_point: FileEndPoint) {
        *self.default_remote.write() = Some(end_point);
    }

    pub fn managed_sessions(&self) -> Vec<Arc<dyn IoSession>> {
        self.core.support().managed_sessions()
    }

    pub fn is_active(&self) -> bool {
        self.core.support().is_active()
    }

    /// 停止空闲检测并移除全部托管会话。
    pub fn dispose(&self) {
        if !self.core.mark_disposing() {
            return;
        }
        self.idle_checker.stop();
        let sessions = self.core.support().managed_sessions();
        let count = sessions.len();
        for session in sessions {
            session.close();
            self.core.support().fire_session_destroyed(&session);
        }
        info!(sessions = count, "file connector disposed");
    }
}

impl IoConnector for FileConnector {
    type EndPoint = FileEndPoint;
    type Session = FileSession;

    fn handler(&self) -> Option<Arc<dyn IoHandler>> {
        self.core.handler()
    }

    fn default_remote_end_point(&self) -> Option<FileEndPoint> {
        self.default_remote.read().clone()
    }

    fn connect0(
        &self,
        remote: FileEndPoint,
        local: Option<FileEndPoint>,
        initializer: Option<SessionInitializer<FileSession>>,
    ) -> ConnectFuture<FileSession> {
        if self.core.is_disposing() {
            return ConnectFuture::failed(SessionError::invalid_state(
                "file_connector.connect",
                "connector is disposed",
            ));
        }
        let Some(handler) = self.core.handler() else {
            return ConnectFuture::failed(SessionError::invalid_state(
                "file_connector.connect",
                "handler is not set",
            ));
        };
        if let Some(local) = local {
            debug!(local = %local, "file transport has no local end point, ignoring");
        }

        let session = FileSession::new(
            self.this.clone(),
            handler,
            self.core.session_config(),
            remote,
            self.runtime.clone(),
        );
        let (promise, future) = connect_channel();
        if let Some(initializer) = initializer {
            initializer(&session);
        }
        if let Err(err) = self.processor.add(&session) {
            return ConnectFuture::failed(err);
        }
        self.idle_checker.start(&self.runtime);

        debug!(
            session.id = %session.id(),
            end_point = %session.end_point(),
            "file session connected"
        );
        promise.succeed(session);
        future
    }
}

impl Drop for FileConnector {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for FileConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileConnector")
            .field("core", &self.core)
            .field("idle_checker", &self.idle_checker)
            .field("default_remote", &*self.default_remote.read())
            .finish()
    }
}
