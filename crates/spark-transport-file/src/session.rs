//! 文件会话。
//!
//! # 教案式注释
//!
//! ## 契约 (What)
//! - 每个会话最多一个泵送任务：`start` 在已读取时返回 `false`，不会重复启动；
//! - `stop` 只翻转读取标记并唤醒正在等待的节拍，泵送任务在下一次检查时退出并关闭文件；
//! - [`FileSession::await_stopped`] 是可选的有界等待，超时后直接终止任务；
//! - 会话被处理器移除后不可再次启动。
//!
//! ## 逻辑 (How)
//! - 泵送任务运行在连接器提供的 Tokio 运行时上，会话保存其 `JoinHandle`；
//! - 每次成功的 `start` 递增启动代次。泵送任务退出前在同一把锁内比对代次：
//!   若在它决定退出之后又有新的 `start`，则继续读取而不是清除读取标记；
//! - 轮次计数同时写入会话属性 [`ROUND_ATTRIBUTE`]，供 Handler 读取。

use core::{fmt, time::Duration};
use std::sync::{
    Arc, Weak,
    atomic::{AtomicBool, Ordering},
};

use parking_lot::Mutex;
use spark_session::{
    EndPoint, FilterChain, IoHandler, IoProcessor, IoSession, SessionConfig, SessionCore,
    TransportMetadata,
};
use tokio::{runtime::Handle, sync::Notify, task::JoinHandle};
use tracing::debug;

use crate::{
    config::FileSessionConfig, connector::FileConnector, end_point::FileEndPoint, pump,
};

/// 文件传输的元数据。
pub const METADATA: TransportMetadata = TransportMetadata::new("spark", "file", false, true);

/// 记录已执行轮次的会话属性键。
pub const ROUND_ATTRIBUTE: &str = "file_session.round";

pub struct FileSession {
    core: SessionCore,
    chain: FilterChain,
    config: Arc<FileSessionConfig>,
    remote: FileEndPoint,
    connector: Weak<FileConnector>,
    this: Weak<FileSession>,
    runtime: Handle,
    reading: AtomicBool,
    stop_signal: Notify,
    pump: Mutex<PumpSlot>,
}

#[derive(Default)]
struct PumpSlot {
    handle: Option<JoinHandle<()>>,
    live: bool,
    epoch: u64,
}

impl FileSession {
    pub(crate) fn new(
        connector: Weak<FileConnector>,
        handler: Arc<dyn IoHandler>,
        config: Arc<FileSessionConfig>,
        remote: FileEndPoint,
        runtime: Handle,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            core: SessionCore::new(),
            chain: FilterChain::new(handler),
            config,
            remote,
            connector,
            this: this.clone(),
            runtime,
            reading: AtomicBool::new(false),
            stop_signal: Notify::new(),
            pump: Mutex::new(PumpSlot::default()),
        })
    }

    /// 会话创建时拿到的完整配置快照。
    pub fn file_config(&self) -> &FileSessionConfig {
        &self.config
    }

    pub fn end_point(&self) -> &FileEndPoint {
        &self.remote
    }

    pub fn connector(&self) -> Option<Arc<FileConnector>> {
        self.connector.upgrade()
    }

    /// 泵送任务是否处于读取状态。
    pub fn is_reading(&self) -> bool {
        self.reading.load(Ordering::Acquire)
    }

    /// 已开始执行的轮次数。
    pub fn rounds(&self) -> u64 {
        self.core.attributes().get_or(ROUND_ATTRIBUTE, 0u64)
    }

    pub(crate) fn next_round(&self) -> u64 {
        let round = self.rounds() + 1;
        self.core.attributes().set(ROUND_ATTRIBUTE, round);
        round
    }

    /// 启动泵送任务；已在读取或会话已被移除时返回 `false`。
    pub fn start(&self) -> bool {
        if self.core.is_closing() {
            return false;
        }
        let Some(this) = self.this.upgrade() else {
            return false;
        };
        let mut slot = self.pump.lock();
        if self.reading.swap(true, Ordering::AcqRel) {
            return false;
        }
        slot.epoch += 1;
        if slot.live {
            // 上一个任务已被要求停止但尚未退出，由它继续读取。
            return true;
        }
        debug!(session.id = %self.id(), end_point = %self.remote, "file pump starting");
        slot.live = true;
        slot.handle = Some(self.runtime.spawn(pump::run(this)));
        true
    }

    /// 请求停止读取；重复调用为空操作。
    pub fn stop(&self) {
        if self.reading.swap(false, Ordering::AcqRel) {
            debug!(session.id = %self.id(), "file pump stop requested");
            self.stop_signal.notify_waiters();
        }
    }

    /// 等待泵送任务退出；超时后终止任务并返回 `false`。
    pub async fn await_stopped(&self, timeout: Duration) -> bool {
        let handle = self.pump.lock().handle.take();
        let Some(mut handle) = handle else {
            return true;
        };
        if tokio::time::timeout(timeout, &mut handle).await.is_ok() {
            return true;
        }
        handle.abort();
        let _ = handle.await;
        let mut slot = self.pump.lock();
        slot.live = false;
        self.reading.store(false, Ordering::Release);
        debug!(session.id = %self.id(), "file pump aborted after stop timeout");
        false
    }

    /// 在节拍间隔内等待，停止请求会提前唤醒。
    pub(crate) async fn pause(&self, duration: Duration) {
        if duration.is_zero() {
            tokio::task::yield_now().await;
            return;
        }
        let notified = self.stop_signal.notified();
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = notified => {}
        }
    }

    /// 当前启动代次。
    pub(crate) fn pump_epoch(&self) -> u64 {
        self.pump.lock().epoch
    }

    /// 泵送任务准备退出时调用。
    ///
    /// 自 `epoch` 之后没有新的启动时清除读取标记并返回 `None`；
    /// 否则返回新的代次，调用方应继续读取。
    pub(crate) fn finish_pump(&self, epoch: u64) -> Option<u64> {
        let mut slot = self.pump.lock();
        if slot.epoch != epoch && self.is_reading() {
            return Some(slot.epoch);
        }
        slot.live = false;
        self.reading.store(false, Ordering::Release);
        None
    }
}

impl IoSession for FileSession {
    fn core(&self) -> &SessionCore {
        &self.core
    }

    fn filter_chain(&self) -> &FilterChain {
        &self.chain
    }

    fn config(&self) -> &SessionConfig {
        &self.config.session
    }

    fn transport_metadata(&self) -> &TransportMetadata {
        &METADATA
    }

    fn local_end_point(&self) -> Option<&dyn EndPoint> {
        None
    }

    fn remote_end_point(&self) -> Option<&dyn EndPoint> {
        Some(&self.remote)
    }

    fn close(&self) {
        if let (Some(this), Some(connector)) = (self.this.upgrade(), self.connector.upgrade()) {
            connector.processor().remove(&this);
            return;
        }
        self.core.mark_closing();
        self.stop();
    }
}

impl fmt::Debug for FileSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileSession")
            .field("id", &self.id())
            .field("end_point", &self.remote)
            .field("reading", &self.is_reading())
            .field("rounds", &self.rounds())
            .finish()
    }
}
