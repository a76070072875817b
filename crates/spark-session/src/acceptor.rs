//! # acceptor 模块说明
//!
//! ## 核心意图（Why）
//! - 管理接入端的端点集合：默认端点、已绑定端点，以及由绑定集合空/非空翻转驱动的激活事件；
//! - 具体传输只实现 [`AcceptorBinding`] 的两个钩子，集合维护与事件语义由 [`Acceptor`] 统一提供。
//!
//! ## 行为契约（What）
//! - `bind_to(&[])` 等价于绑定默认端点；默认端点也为空时返回参数错误；
//! - `bind_internal` 返回实际绑定的端点（例如解析后的临时端口），结果并入绑定集合；
//! - 绑定前集合为空、绑定后非空时触发一次 `service_activated`；解绑使集合变空时触发一次
//!   `service_deactivated`，并在 `close_on_deactivation` 开启时关闭全部托管会话；
//! - 绑定集合非空时修改默认端点返回状态错误。
//!
//! ## 并发约定（How）
//! - 端点集合的全部修改在同一把互斥锁内串行化，钩子调用也位于锁内；
//! - 是否触发事件在锁内决定，事件本身在锁释放后触发，监听器可以安全地重入本接入端。

use core::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::{
    config::TransportConfig,
    error::{Result, SessionError},
    service::{ServiceCore, ServiceRole, TransportMetadata},
};

/// 接入端的传输钩子。
pub trait AcceptorBinding: Send + Sync + 'static {
    type EndPoint: Clone + PartialEq + fmt::Debug + fmt::Display + Send + Sync + 'static;

    /// 绑定给定端点，返回实际绑定的端点。
    fn bind_internal(&self, end_points: &[Self::EndPoint]) -> Result<Vec<Self::EndPoint>>;

    /// 解绑给定端点，入参均来自当前绑定集合。
    fn unbind_internal(&self, end_points: &[Self::EndPoint]) -> Result<()>;
}

#[derive(Debug)]
struct EndPointState<E> {
    defaults: Vec<E>,
    bound: Vec<E>,
}

/// 通用接入端。
pub struct Acceptor<B: AcceptorBinding, C: TransportConfig> {
    core: ServiceCore<C>,
    binding: B,
    state: Mutex<EndPointState<B::EndPoint>>,
    close_on_deactivation: AtomicBool,
}

impl<B: AcceptorBinding, C: TransportConfig> Acceptor<B, C> {
    pub fn new(metadata: TransportMetadata, binding: B, config: C) -> Self {
        Self {
            core: ServiceCore::new(metadata, ServiceRole::Acceptor, config),
            binding,
            state: Mutex::new(EndPointState {
                defaults: Vec::new(),
                bound: Vec::new(),
            }),
            close_on_deactivation: AtomicBool::new(true),
        }
    }

    pub fn core(&self) -> &ServiceCore<C> {
        &self.core
    }

    pub fn binding(&self) -> &B {
        &self.binding
    }

    /// 绑定全部默认端点。
    pub fn bind(&self) -> Result<Vec<B::EndPoint>> {
        self.bind_to(&[])
    }

    pub fn bind_one(&self, end_point: B::EndPoint) -> Result<Vec<B::EndPoint>> {
        self.bind_to(&[end_point])
    }

    /// 绑定给定端点，空切片表示使用默认端点；返回本次实际绑定的端点。
    pub fn bind_to(&self, end_points: &[B::EndPoint]) -> Result<Vec<B::EndPoint>> {
        if self.core.is_disposing() {
            return Err(SessionError::invalid_state(
                "acceptor.bind",
                "acceptor is disposed",
            ));
        }
        let (bound, activate) = {
            let mut state = self.state.lock();
            let requested = if end_points.is_empty() {
                state.defaults.clone()
            } else {
                end_points.to_vec()
            };
            if requested.is_empty() {
                return Err(SessionError::invalid_argument(
                    "acceptor.bind",
                    "no end point given and no default local end point set",
                ));
            }
            let was_empty = state.bound.is_empty();
            let bound = self.binding.bind_internal(&requested)?;
            for end_point in &bound {
                if !state.bound.contains(end_point) {
                    state.bound.push(end_point.clone());
                }
            }
            (bound, was_empty && !state.bound.is_empty())
        };

        debug!(end_points = ?bound, "acceptor bound");
        if activate {
            self.core.support().fire_service_activated();
        }
        Ok(bound)
    }

    /// 解绑全部已绑定端点。
    pub fn unbind(&self) -> Result<()> {
        let bound = self.local_end_points();
        self.unbind_from(&bound)
    }

    pub fn unbind_one(&self, end_point: &B::EndPoint) -> Result<()> {
        self.unbind_from(core::slice::from_ref(end_point))
    }

    /// 解绑给定端点；未绑定的端点被忽略，绑定集合为空时为空操作。
    pub fn unbind_from(&self, end_points: &[B::EndPoint]) -> Result<()> {
        let deactivate = {
            let mut state = self.state.lock();
            if state.bound.is_empty() {
                return Ok(());
            }
            let targets: Vec<B::EndPoint> = end_points
                .iter()
                .filter(|end_point| state.bound.contains(*end_point))
                .cloned()
                .collect();
            if targets.is_empty() {
                return Ok(());
            }
            self.binding.unbind_internal(&targets)?;
            state.bound.retain(|end_point| !targets.contains(end_point));
            debug!(end_points = ?targets, "acceptor unbound");
            state.bound.is_empty()
        };

        if deactivate && self.core.support().fire_service_deactivated() {
            self.close_managed_sessions();
        }
        Ok(())
    }

    fn close_managed_sessions(&self) {
        if !self.close_on_deactivation() {
            return;
        }
        let sessions = self.core.support().managed_sessions();
        if !sessions.is_empty() {
            info!(count = sessions.len(), "closing managed sessions after deactivation");
        }
        for session in sessions {
            session.close();
        }
    }

    pub fn is_bound(&self) -> bool {
        !self.state.lock().bound.is_empty()
    }

    pub fn local_end_points(&self) -> Vec<B::EndPoint> {
        self.state.lock().bound.clone()
    }

    pub fn local_end_point(&self) -> Option<B::EndPoint> {
        self.state.lock().bound.first().cloned()
    }

    pub fn default_local_end_points(&self) -> Vec<B::EndPoint> {
        self.state.lock().defaults.clone()
    }

    pub fn default_local_end_point(&self) -> Option<B::EndPoint> {
        self.state.lock().defaults.first().cloned()
    }

    /// 替换默认端点；已绑定时返回状态错误。
    pub fn set_default_local_end_points(&self, end_points: Vec<B::EndPoint>) -> Result<()> {
        let mut state = self.state.lock();
        if !state.bound.is_empty() {
            return Err(SessionError::invalid_state(
                "acceptor.default_local_end_points",
                "default end points cannot be changed while the acceptor is bound",
            ));
        }
        state.defaults = end_points;
        Ok(())
    }

    pub fn set_default_local_end_point(&self, end_point: B::EndPoint) -> Result<()> {
        self.set_default_local_end_points(vec![end_point])
    }

    pub fn close_on_deactivation(&self) -> bool {
        self.close_on_deactivation.load(Ordering::Acquire)
    }

    pub fn set_close_on_deactivation(&self, enabled: bool) {
        self.close_on_deactivation.store(enabled, Ordering::Release);
    }

    /// 解绑全部端点并拒绝之后的绑定；重复调用为空操作。
    pub fn dispose(&self) {
        if !self.core.mark_disposing() {
            return;
        }
        if let Err(err) = self.unbind() {
            warn!(error.code = err.code(), error = %err, "unbind during dispose failed");
        }
    }
}

impl<B: AcceptorBinding, C: TransportConfig> Drop for Acceptor<B, C> {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl<B: AcceptorBinding, C: TransportConfig> fmt::Debug for Acceptor<B, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Acceptor")
            .field("core", &self.core)
            .field("state", &*self.state.lock())
            .finish()
    }
}
