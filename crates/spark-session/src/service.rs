//! # service 模块说明
//!
//! ## 核心意图（Why）
//! - 汇总接入端（Acceptor）与连接端（Connector）共享的服务状态：Handler、过滤链构建器、
//!   配置、托管会话登记簿、监听器与统计；
//! - 具体服务只需组合 [`ServiceCore`]，生命周期事件的顺序与“恰好一次”语义在此集中实现。
//!
//! ## 行为契约（What）
//! - `fire_service_activated` / `fire_service_deactivated` 只在“非激活 ↔ 激活”翻转时通知监听器；
//! - `fire_session_created` 把会话登记为托管，并依序触发链上的 `session_created`、`session_opened`
//!   与监听器的 `session_created`；重复登记为空操作；
//! - `fire_session_destroyed` 注销会话，并依序触发链上的 `session_closed` 与监听器的 `session_destroyed`；
//! - 连接端没有显式的绑定动作：第一个会话登记时视为激活，最后一个会话注销时视为停用。
//!
//! ## 风险提示（Trade-offs）
//! - 连接端的登记簿变更与激活翻转在同一把锁内决定，通知在锁外发出；
//! - 监听器在调用线程上同步执行，且不持有任何服务内部锁，可以在回调中重入服务 API；
//! - 统计值基于原子计数，与登记簿之间不保证同一时刻的快照一致性。

use core::fmt;
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    },
    time::SystemTime,
};

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use crate::{
    config::TransportConfig,
    error::{Result, SessionError},
    filter::{DefaultFilterChainBuilder, FilterChain, FilterChainBuilder, IoHandler},
    session::{IoSession, SessionId},
};

/// 传输元数据。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TransportMetadata {
    /// 提供方名称。
    pub provider_name: &'static str,
    /// 传输名称。
    pub name: &'static str,
    /// 是否为无连接传输。
    pub connectionless: bool,
    /// 一条消息是否可能被拆分成多次送达。
    pub has_fragmentation: bool,
}

impl TransportMetadata {
    pub const fn new(
        provider_name: &'static str,
        name: &'static str,
        connectionless: bool,
        has_fragmentation: bool,
    ) -> Self {
        Self {
            provider_name,
            name,
            connectionless,
            has_fragmentation,
        }
    }
}

impl fmt::Display for TransportMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.provider_name, self.name)
    }
}

/// 服务生命周期监听器，全部方法默认为空实现。
pub trait ServiceListener: Send + Sync + 'static {
    fn service_activated(&self) {}

    fn service_deactivated(&self) {}

    fn session_created(&self, _session: &Arc<dyn IoSession>) {}

    fn session_destroyed(&self, _session: &Arc<dyn IoSession>) {}
}

/// 服务侧角色，决定激活语义的来源。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServiceRole {
    /// 由绑定集合的空/非空翻转驱动激活。
    Acceptor,
    /// 由托管会话集合的空/非空翻转驱动激活。
    Connector,
}

/// 托管会话登记簿、监听器与统计。
pub struct ServiceSupport {
    metadata: TransportMetadata,
    role: ServiceRole,
    listeners: RwLock<Vec<Arc<dyn ServiceListener>>>,
    managed: DashMap<SessionId, Arc<dyn IoSession>>,
    registry: Mutex<()>,
    active: AtomicBool,
    activation_time: Mutex<Option<SystemTime>>,
    largest_managed: AtomicUsize,
    cumulative_managed: AtomicU64,
}

impl ServiceSupport {
    pub fn new(metadata: TransportMetadata, role: ServiceRole) -> Self {
        Self {
            metadata,
            role,
            listeners: RwLock::new(Vec::new()),
            managed: DashMap::new(),
            registry: Mutex::new(()),
            active: AtomicBool::new(false),
            activation_time: Mutex::new(None),
            largest_managed: AtomicUsize::new(0),
            cumulative_managed: AtomicU64::new(0),
        }
    }

    pub fn transport_metadata(&self) -> &TransportMetadata {
        &self.metadata
    }

    pub fn role(&self) -> ServiceRole {
        self.role
    }

    pub fn add_listener(&self, listener: Arc<dyn ServiceListener>) {
        self.listeners.write().push(listener);
    }

    /// 按指针身份移除监听器，返回是否找到。
    pub fn remove_listener(&self, listener: &Arc<dyn ServiceListener>) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|existing| !Arc::ptr_eq(existing, listener));
        listeners.len() != before
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// 最近一次激活的时刻；从未激活或已停用时为 `None`。
    pub fn activation_time(&self) -> Option<SystemTime> {
        *self.activation_time.lock()
    }

    pub fn managed_sessions(&self) -> Vec<Arc<dyn IoSession>> {
        self.managed
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    pub fn managed_session(&self, id: SessionId) -> Option<Arc<dyn IoSession>> {
        self.managed.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn is_managed(&self, id: SessionId) -> bool {
        self.managed.contains_key(&id)
    }

    pub fn managed_session_count(&self) -> usize {
        self.managed.len()
    }

    /// 历史上同时托管的最大会话数。
    pub fn largest_managed_session_count(&self) -> usize {
        self.largest_managed.load(Ordering::Acquire)
    }

    /// 累计托管过的会话总数。
    pub fn cumulative_managed_session_count(&self) -> u64 {
        self.cumulative_managed.load(Ordering::Acquire)
    }

    /// 通知激活；只有从非激活翻转时才会通知监听器，返回是否发生了翻转。
    pub fn fire_service_activated(&self) -> bool {
        if !self.transition(true) {
            return false;
        }
        self.notify_activated();
        true
    }

    /// 通知停用；只有从激活翻转时才会通知监听器，返回是否发生了翻转。
    pub fn fire_service_deactivated(&self) -> bool {
        if !self.transition(false) {
            return false;
        }
        self.notify_deactivated();
        true
    }

    /// 登记会话并触发创建事件；会话已登记时返回 `false`。
    pub fn fire_session_created(&self, session: &Arc<dyn IoSession>) -> bool {
        let id = session.id();
        let activated = {
            let _registry = self.registry.lock();
            match self.managed.entry(id) {
                dashmap::mapref::entry::Entry::Occupied(_) => return false,
                dashmap::mapref::entry::Entry::Vacant(vacant) => {
                    vacant.insert(Arc::clone(session));
                }
            }
            self.cumulative_managed.fetch_add(1, Ordering::AcqRel);
            self.largest_managed
                .fetch_max(self.managed.len(), Ordering::AcqRel);
            self.role == ServiceRole::Connector && self.transition(true)
        };

        if activated {
            self.notify_activated();
        }

        debug!(session.id = %id, transport = %self.metadata, "session created");
        let chain = session.filter_chain();
        chain.fire_session_created(session);
        chain.fire_session_opened(session);
        for listener in self.listeners_snapshot() {
            listener.session_created(session);
        }
        true
    }

    /// 注销会话并触发销毁事件；会话未登记时返回 `false`。
    pub fn fire_session_destroyed(&self, session: &Arc<dyn IoSession>) -> bool {
        let id = session.id();
        let deactivated = {
            let _registry = self.registry.lock();
            if self.managed.remove(&id).is_none() {
                return false;
            }
            self.role == ServiceRole::Connector
                && self.managed.is_empty()
                && self.transition(false)
        };
        debug!(session.id = %id, transport = %self.metadata, "session destroyed");
        session.filter_chain().fire_session_closed(session);
        for listener in self.listeners_snapshot() {
            listener.session_destroyed(session);
        }

        if deactivated {
            self.notify_deactivated();
        }
        true
    }

    /// 翻转激活标记，返回是否真的发生了翻转。
    fn transition(&self, active: bool) -> bool {
        if self.active.swap(active, Ordering::AcqRel) == active {
            return false;
        }
        *self.activation_time.lock() = active.then(SystemTime::now);
        true
    }

    fn notify_activated(&self) {
        info!(transport = %self.metadata, "service activated");
        for listener in self.listeners_snapshot() {
            listener.service_activated();
        }
    }

    fn notify_deactivated(&self) {
        info!(transport = %self.metadata, "service deactivated");
        for listener in self.listeners_snapshot() {
            listener.service_deactivated();
        }
    }

    fn listeners_snapshot(&self) -> Vec<Arc<dyn ServiceListener>> {
        self.listeners.read().clone()
    }
}

impl fmt::Debug for ServiceSupport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceSupport")
            .field("transport", &self.metadata)
            .field("role", &self.role)
            .field("active", &self.is_active())
            .field("managed", &self.managed_session_count())
            .finish()
    }
}

/// 具体服务共享的状态。
///
/// # 教案式注释
///
/// ## 契约 (What)
/// - Handler 只能在服务未激活时替换；
/// - 过滤链构建器默认是 [`ServiceCore::default_filter_chain`] 返回的实例；
/// - [`ServiceCore::session_config`] 返回配置快照，之后的 [`ServiceCore::update_session_config`]
///   只影响新建会话；
/// - [`ServiceCore::mark_disposing`] 只有第一次调用返回 `true`。
pub struct ServiceCore<C: TransportConfig> {
    support: ServiceSupport,
    handler: RwLock<Option<Arc<dyn IoHandler>>>,
    default_chain: Arc<DefaultFilterChainBuilder>,
    chain_builder: RwLock<Arc<dyn FilterChainBuilder>>,
    config: RwLock<C>,
    disposing: AtomicBool,
}

impl<C: TransportConfig> ServiceCore<C> {
    pub fn new(metadata: TransportMetadata, role: ServiceRole, config: C) -> Self {
        let default_chain = Arc::new(DefaultFilterChainBuilder::new());
        let chain_builder: Arc<dyn FilterChainBuilder> = default_chain.clone();
        Self {
            support: ServiceSupport::new(metadata, role),
            handler: RwLock::new(None),
            default_chain,
            chain_builder: RwLock::new(chain_builder),
            config: RwLock::new(config),
            disposing: AtomicBool::new(false),
        }
    }

    pub fn support(&self) -> &ServiceSupport {
        &self.support
    }

    pub fn handler(&self) -> Option<Arc<dyn IoHandler>> {
        self.handler.read().clone()
    }

    /// 设置 Handler；服务已激活时返回状态错误。
    pub fn set_handler(&self, handler: Arc<dyn IoHandler>) -> Result<()> {
        if self.support.is_active() {
            return Err(SessionError::invalid_state(
                "service.set_handler",
                "handler cannot be replaced while the service is active",
            ));
        }
        *self.handler.write() = Some(handler);
        Ok(())
    }

    /// 默认过滤链模板。
    pub fn default_filter_chain(&self) -> &Arc<DefaultFilterChainBuilder> {
        &self.default_chain
    }

    pub fn filter_chain_builder(&self) -> Arc<dyn FilterChainBuilder> {
        self.chain_builder.read().clone()
    }

    pub fn set_filter_chain_builder(&self, builder: Arc<dyn FilterChainBuilder>) {
        *self.chain_builder.write() = builder;
    }

    /// 用当前构建器构建会话过滤链，已构建过时返回 `Ok(false)`。
    pub fn build_filter_chain(&self, chain: &FilterChain) -> Result<bool> {
        let builder = self.filter_chain_builder();
        chain.build_with(builder.as_ref())
    }

    /// 当前配置的快照。
    pub fn session_config(&self) -> Arc<C> {
        Arc::new(self.config.read().clone())
    }

    /// 就地修改服务配置，只影响之后创建的会话。
    pub fn update_session_config<R>(&self, update: impl FnOnce(&mut C) -> R) -> R {
        update(&mut self.config.write())
    }

    pub fn is_disposing(&self) -> bool {
        self.disposing.load(Ordering::Acquire)
    }

    pub fn mark_disposing(&self) -> bool {
        !self.disposing.swap(true, Ordering::AcqRel)
    }
}

impl<C: TransportConfig> fmt::Debug for ServiceCore<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceCore")
            .field("support", &self.support)
            .field("has_handler", &self.handler.read().is_some())
            .field("config", &*self.config.read())
            .field("disposing", &self.is_disposing())
            .finish()
    }
}
