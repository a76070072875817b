//! 会话契约与通用会话状态。
//!
//! # 教案式注释
//!
//! ## 契约 (What)
//! - [`IoSession`]：所有传输会话的对象安全接口，过滤器与 Handler 只通过它访问会话；
//! - [`SessionCore`]：传输无关的可变状态（标识、创建时间、属性、读暂停标记、空闲与 IO 统计），
//!   由具体会话内嵌并通过 [`IoSession::core`] 暴露；
//! - [`AttributeMap`]：以字符串为键的开放属性存储，供应用与传输保存私有状态。
//!
//! ## 逻辑 (How)
//! - 时间戳统一记为“相对 `created_at` 的毫秒偏移”，以 `AtomicU64` 保存，读写无需加锁；
//! - 空闲事件的“自上次活动以来只触发一次”由每类空闲的 `fired` 标记实现：
//!   活动发生时清除，检测器触发时置位。
//!
//! ## 注意事项
//! - 会话被处理器移除后不会被复用，[`SessionCore::mark_closing`] 只会成功一次。

use core::{any::Any, fmt};
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::{Duration, Instant, SystemTime},
};

use dashmap::DashMap;

use crate::{
    config::{IdleStatus, SessionConfig},
    filter::FilterChain,
    service::TransportMetadata,
};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// 会话标识，进程内单调递增且不复用。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    /// 分配下一个标识。
    pub fn next() -> Self {
        Self(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

/// 端点的对象安全视图。
///
/// 核心层不解释端点内容，只要求可打印、可跨线程共享；需要具体类型时通过
/// [`EndPoint::as_any`] 向下转型。
pub trait EndPoint: fmt::Debug + fmt::Display + Send + Sync + 'static {
    fn as_any(&self) -> &dyn Any;
}

impl<T> EndPoint for T
where
    T: fmt::Debug + fmt::Display + Send + Sync + 'static,
{
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// 所有传输会话的公共接口。
///
/// # 契约 (What)
/// - `filter_chain` 在会话构造时确定，生命周期内不会替换；
/// - `config` 返回会话创建时拿到的配置快照中的通用部分；
/// - `local_end_point` 对没有本地地址的传输返回 `None`；
/// - `close` 请求拥有者处理器移除本会话，重复调用为空操作。
pub trait IoSession: Send + Sync + 'static {
    /// 通用会话状态。
    fn core(&self) -> &SessionCore;

    /// 会话的过滤链。
    fn filter_chain(&self) -> &FilterChain;

    /// 会话配置中的通用部分。
    fn config(&self) -> &SessionConfig;

    /// 所属传输的元数据。
    fn transport_metadata(&self) -> &TransportMetadata;

    fn local_end_point(&self) -> Option<&dyn EndPoint>;

    fn remote_end_point(&self) -> Option<&dyn EndPoint>;

    /// 请求关闭会话。
    fn close(&self);

    fn id(&self) -> SessionId {
        self.core().id()
    }

    fn attributes(&self) -> &AttributeMap {
        self.core().attributes()
    }

    fn is_read_suspended(&self) -> bool {
        self.core().is_read_suspended()
    }

    /// 暂停读取；泵送循环保持资源打开并以短间隔轮询，直到恢复或停止。
    fn suspend_read(&self) {
        self.core().set_read_suspended(true);
    }

    fn resume_read(&self) {
        self.core().set_read_suspended(false);
    }

    fn is_closing(&self) -> bool {
        self.core().is_closing()
    }
}

impl fmt::Debug for dyn IoSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IoSession")
            .field("id", &self.id())
            .field("transport", &self.transport_metadata().name)
            .field(
                "remote_end_point",
                &self.remote_end_point().map(|ep| ep.to_string()),
            )
            .finish()
    }
}

#[derive(Debug, Default)]
struct IdleSlot {
    fired: AtomicBool,
    count: AtomicU64,
    last_fired_millis: AtomicU64,
}

/// 传输无关的会话状态。
pub struct SessionCore {
    id: SessionId,
    created_at: Instant,
    creation_time: SystemTime,
    attributes: AttributeMap,
    read_suspended: AtomicBool,
    closing: AtomicBool,
    last_read_millis: AtomicU64,
    last_write_millis: AtomicU64,
    read_bytes: AtomicU64,
    read_messages: AtomicU64,
    written_bytes: AtomicU64,
    written_messages: AtomicU64,
    idle: [IdleSlot; 3],
}

impl SessionCore {
    pub fn new() -> Self {
        Self {
            id: SessionId::next(),
            created_at: Instant::now(),
            creation_time: SystemTime::now(),
            attributes: AttributeMap::default(),
            read_suspended: AtomicBool::new(false),
            closing: AtomicBool::new(false),
            last_read_millis: AtomicU64::new(0),
            last_write_millis: AtomicU64::new(0),
            read_bytes: AtomicU64::new(0),
            read_messages: AtomicU64::new(0),
            written_bytes: AtomicU64::new(0),
            written_messages: AtomicU64::new(0),
            idle: Default::default(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// 单调时钟下的创建时刻。
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// 墙钟下的创建时刻，仅用于展示。
    pub fn creation_time(&self) -> SystemTime {
        self.creation_time
    }

    pub fn attributes(&self) -> &AttributeMap {
        &self.attributes
    }

    pub fn is_read_suspended(&self) -> bool {
        self.read_suspended.load(Ordering::Acquire)
    }

    pub fn set_read_suspended(&self, suspended: bool) {
        self.read_suspended.store(suspended, Ordering::Release);
    }

    /// 标记会话进入关闭流程，只有第一次调用返回 `true`。
    pub fn mark_closing(&self) -> bool {
        !self.closing.swap(true, Ordering::AcqRel)
    }

    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    /// 记录一次读取。
    pub fn record_read(&self, bytes: usize) {
        self.record_read_at(bytes, Instant::now());
    }

    pub fn record_read_at(&self, bytes: usize, at: Instant) {
        self.read_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
        self.read_messages.fetch_add(1, Ordering::Relaxed);
        self.last_read_millis
            .fetch_max(self.offset_millis(at), Ordering::AcqRel);
        self.slot(IdleStatus::ReaderIdle)
            .fired
            .store(false, Ordering::Release);
        self.slot(IdleStatus::BothIdle)
            .fired
            .store(false, Ordering::Release);
    }

    /// 记录一次写出。
    pub fn record_write(&self, bytes: usize) {
        self.record_write_at(bytes, Instant::now());
    }

    pub fn record_write_at(&self, bytes: usize, at: Instant) {
        self.written_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
        self.written_messages.fetch_add(1, Ordering::Relaxed);
        self.last_write_millis
            .fetch_max(self.offset_millis(at), Ordering::AcqRel);
        self.slot(IdleStatus::WriterIdle)
            .fired
            .store(false, Ordering::Release);
        self.slot(IdleStatus::BothIdle)
            .fired
            .store(false, Ordering::Release);
    }

    pub fn read_bytes(&self) -> u64 {
        self.read_bytes.load(Ordering::Relaxed)
    }

    pub fn read_messages(&self) -> u64 {
        self.read_messages.load(Ordering::Relaxed)
    }

    pub fn written_bytes(&self) -> u64 {
        self.written_bytes.load(Ordering::Relaxed)
    }

    pub fn written_messages(&self) -> u64 {
        self.written_messages.load(Ordering::Relaxed)
    }

    /// 最近一次读取的时刻；从未读取时为创建时刻。
    pub fn last_read_time(&self) -> Instant {
        self.at_offset(self.last_read_millis.load(Ordering::Acquire))
    }

    /// 最近一次写出的时刻；从未写出时为创建时刻。
    pub fn last_write_time(&self) -> Instant {
        self.at_offset(self.last_write_millis.load(Ordering::Acquire))
    }

    /// 指定空闲类型对应的最近活动时刻，`BothIdle` 取读写两者中较晚者。
    pub fn last_io_time(&self, status: IdleStatus) -> Instant {
        self.at_offset(self.last_io_millis(status))
    }

    /// 最近一次触发该类空闲事件的时刻。
    pub fn last_idle_time(&self, status: IdleStatus) -> Option<Instant> {
        let slot = self.slot(status);
        if slot.count.load(Ordering::Acquire) == 0 {
            return None;
        }
        Some(self.at_offset(slot.last_fired_millis.load(Ordering::Acquire)))
    }

    /// 该类空闲事件累计触发次数。
    pub fn idle_count(&self, status: IdleStatus) -> u64 {
        self.slot(status).count.load(Ordering::Acquire)
    }

    /// 自上次活动以来是否已经触发过该类空闲事件。
    pub fn is_idle(&self, status: IdleStatus) -> bool {
        self.slot(status).fired.load(Ordering::Acquire)
    }

    /// 判定在 `now` 时刻是否应当触发空闲事件，若应当触发则同时完成记账。
    ///
    /// - `threshold` 为零时直接返回 `false`；
    /// - 同一段空闲期内只会返回一次 `true`；
    /// - 判定与记账之间若发生了新的活动，撤销本次置位并返回 `false`。
    pub fn try_mark_idle(&self, status: IdleStatus, threshold: Duration, now: Instant) -> bool {
        if threshold.is_zero() {
            return false;
        }
        let now_millis = self.offset_millis(now);
        let last_io = self.last_io_millis(status);
        if now_millis.saturating_sub(last_io) < threshold.as_millis() as u64 {
            return false;
        }
        let slot = self.slot(status);
        if slot.fired.swap(true, Ordering::AcqRel) {
            return false;
        }
        if self.last_io_millis(status) != last_io {
            slot.fired.store(false, Ordering::Release);
            return false;
        }
        slot.count.fetch_add(1, Ordering::AcqRel);
        slot.last_fired_millis.store(now_millis, Ordering::Release);
        true
    }

    fn last_io_millis(&self, status: IdleStatus) -> u64 {
        let read = self.last_read_millis.load(Ordering::Acquire);
        let write = self.last_write_millis.load(Ordering::Acquire);
        match status {
            IdleStatus::ReaderIdle => read,
            IdleStatus::WriterIdle => write,
            IdleStatus::BothIdle => read.max(write),
        }
    }

    fn slot(&self, status: IdleStatus) -> &IdleSlot {
        &self.idle[status.index()]
    }

    fn offset_millis(&self, at: Instant) -> u64 {
        at.saturating_duration_since(self.created_at).as_millis() as u64
    }

    fn at_offset(&self, millis: u64) -> Instant {
        self.created_at + Duration::from_millis(millis)
    }
}

impl Default for SessionCore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SessionCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCore")
            .field("id", &self.id)
            .field("read_suspended", &self.is_read_suspended())
            .field("closing", &self.is_closing())
            .field("read_bytes", &self.read_bytes())
            .field("attributes", &self.attributes.len())
            .finish()
    }
}

type AttributeValue = Arc<dyn Any + Send + Sync>;

/// 会话属性存储。
///
/// 值以 `Arc<dyn Any>` 保存，读取时按调用方给出的类型向下转型，类型不匹配视为不存在。
#[derive(Default)]
pub struct AttributeMap {
    entries: DashMap<String, AttributeValue>,
}

impl AttributeMap {
    /// 读取属性。
    pub fn get<T>(&self, key: &str) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        let value = self.entries.get(key)?.value().clone();
        value.downcast::<T>().ok()
    }

    /// 读取属性的副本，不存在或类型不符时返回 `default`。
    pub fn get_or<T>(&self, key: &str, default: T) -> T
    where
        T: Any + Send + Sync + Clone,
    {
        self.get::<T>(key)
            .map(|value| value.as_ref().clone())
            .unwrap_or(default)
    }

    /// 写入属性，返回是否覆盖了旧值。
    pub fn set<T>(&self, key: impl Into<String>, value: T) -> bool
    where
        T: Any + Send + Sync,
    {
        self.entries.insert(key.into(), Arc::new(value)).is_some()
    }

    /// 仅在键不存在时写入，返回是否写入成功。
    pub fn set_if_absent<T>(&self, key: impl Into<String>, value: T) -> bool
    where
        T: Any + Send + Sync,
    {
        match self.entries.entry(key.into()) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(Arc::new(value));
                true
            }
        }
    }

    pub fn remove(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for AttributeMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.keys()).finish()
    }
}
