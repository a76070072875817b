use core::fmt;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use bytes::Bytes;
use parking_lot::RwLock;
use tracing::warn;

use super::{IoFilter, IoHandler};
use crate::{
    config::IdleStatus,
    error::{Result, SessionError},
    session::IoSession,
};

/// 链上的一个具名拦截器。
#[derive(Clone)]
pub struct FilterEntry {
    name: Arc<str>,
    filter: Arc<dyn IoFilter>,
}

impl FilterEntry {
    pub fn new(name: impl Into<Arc<str>>, filter: Arc<dyn IoFilter>) -> Self {
        Self {
            name: name.into(),
            filter,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn filter(&self) -> &Arc<dyn IoFilter> {
        &self.filter
    }
}

impl fmt::Debug for FilterEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterEntry")
            .field("name", &self.name)
            .finish()
    }
}

/// 指向“下一个”拦截器的游标。
///
/// 游标持有事件触发时刻的链快照，拦截器在回调中增删链条不会影响本次传递。
#[derive(Clone, Copy)]
pub struct NextFilter<'a> {
    rest: &'a [FilterEntry],
    handler: &'a dyn IoHandler,
}

impl<'a> NextFilter<'a> {
    fn new(rest: &'a [FilterEntry], handler: &'a dyn IoHandler) -> Self {
        Self { rest, handler }
    }

    fn split(&self) -> Option<(&'a FilterEntry, NextFilter<'a>)> {
        self.rest
            .split_first()
            .map(|(head, tail)| (head, NextFilter::new(tail, self.handler)))
    }

    pub fn session_created(&self, session: &Arc<dyn IoSession>) -> Result<()> {
        match self.split() {
            Some((head, next)) => head.filter.session_created(next, session),
            None => self.handler.session_created(session),
        }
    }

    pub fn session_opened(&self, session: &Arc<dyn IoSession>) -> Result<()> {
        match self.split() {
            Some((head, next)) => head.filter.session_opened(next, session),
            None => self.handler.session_opened(session),
        }
    }

    pub fn session_closed(&self, session: &Arc<dyn IoSession>) -> Result<()> {
        match self.split() {
            Some((head, next)) => head.filter.session_closed(next, session),
            None => self.handler.session_closed(session),
        }
    }

    pub fn session_idle(&self, session: &Arc<dyn IoSession>, status: IdleStatus) -> Result<()> {
        match self.split() {
            Some((head, next)) => head.filter.session_idle(next, session, status),
            None => self.handler.session_idle(session, status),
        }
    }

    pub fn message_received(&self, session: &Arc<dyn IoSession>, message: Bytes) -> Result<()> {
        match self.split() {
            Some((head, next)) => head.filter.message_received(next, session, message),
            None => self.handler.message_received(session, message),
        }
    }

    pub fn exception_caught(&self, session: &Arc<dyn IoSession>, error: &SessionError) {
        match self.split() {
            Some((head, next)) => head.filter.exception_caught(next, session, error),
            None => self.handler.exception_caught(session, error),
        }
    }
}

/// 会话的过滤链。
///
/// # 教案式注释
///
/// ## 契约 (What)
/// - 链尾 Handler 在构造时确定；
/// - [`FilterChain::build_with`] 只会真正执行一次，之后的调用返回 `Ok(false)`；
/// - `fire_message_received` 把处理结果交还给调用方（泵送循环据此上报
///   `exception_caught` 并继续读取），其余生命周期事件的失败由链自身转交给
///   `exception_caught`；
/// - 触发事件前先复制链快照并释放读锁，回调中可以安全地修改本链。
pub struct FilterChain {
    entries: RwLock<Vec<FilterEntry>>,
    handler: Arc<dyn IoHandler>,
    built: AtomicBool,
}

impl FilterChain {
    pub fn new(handler: Arc<dyn IoHandler>) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            handler,
            built: AtomicBool::new(false),
        }
    }

    pub fn handler(&self) -> &Arc<dyn IoHandler> {
        &self.handler
    }

    /// 在链尾追加拦截器，名称重复时返回参数错误。
    pub fn add_last(&self, name: impl Into<Arc<str>>, filter: Arc<dyn IoFilter>) -> Result<()> {
        let entry = FilterEntry::new(name, filter);
        let mut entries = self.entries.write();
        ensure_unique(&entries, entry.name())?;
        entries.push(entry);
        Ok(())
    }

    /// 在链首插入拦截器，名称重复时返回参数错误。
    pub fn add_first(&self, name: impl Into<Arc<str>>, filter: Arc<dyn IoFilter>) -> Result<()> {
        let entry = FilterEntry::new(name, filter);
        let mut entries = self.entries.write();
        ensure_unique(&entries, entry.name())?;
        entries.insert(0, entry);
        Ok(())
    }

    pub fn remove(&self, name: &str) -> Option<Arc<dyn IoFilter>> {
        let mut entries = self.entries.write();
        let index = entries.iter().position(|entry| entry.name() == name)?;
        Some(entries.remove(index).filter)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().iter().any(|entry| entry.name() == name)
    }

    pub fn names(&self) -> Vec<String> {
        self.entries
            .read()
            .iter()
            .map(|entry| entry.name().to_owned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn is_built(&self) -> bool {
        self.built.load(Ordering::Acquire)
    }

    /// 通过构建器安装拦截器，仅首次调用生效；返回本次是否执行了构建。
    ///
    /// 构建失败时标记与已安装的拦截器都会被回滚，调用方可以修正构建器后重试。
    pub fn build_with(&self, builder: &dyn FilterChainBuilder) -> Result<bool> {
        if self
            .built
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(false);
        }
        let before = self.snapshot();
        if let Err(err) = builder.build_filter_chain(self) {
            *self.entries.write() = before;
            self.built.store(false, Ordering::Release);
            return Err(err);
        }
        Ok(true)
    }

    fn snapshot(&self) -> Vec<FilterEntry> {
        self.entries.read().clone()
    }

    pub fn fire_session_created(&self, session: &Arc<dyn IoSession>) {
        let entries = self.snapshot();
        let result = NextFilter::new(&entries, self.handler.as_ref()).session_created(session);
        self.report(session, "session_created", result);
    }

    pub fn fire_session_opened(&self, session: &Arc<dyn IoSession>) {
        let entries = self.snapshot();
        let result = NextFilter::new(&entries, self.handler.as_ref()).session_opened(session);
        self.report(session, "session_opened", result);
    }

    pub fn fire_session_closed(&self, session: &Arc<dyn IoSession>) {
        let entries = self.snapshot();
        let result = NextFilter::new(&entries, self.handler.as_ref()).session_closed(session);
        self.report(session, "session_closed", result);
    }

    pub fn fire_session_idle(&self, session: &Arc<dyn IoSession>, status: IdleStatus) {
        let entries = self.snapshot();
        let result =
            NextFilter::new(&entries, self.handler.as_ref()).session_idle(session, status);
        self.report(session, "session_idle", result);
    }

    pub fn fire_message_received(
        &self,
        session: &Arc<dyn IoSession>,
        message: Bytes,
    ) -> Result<()> {
        let entries = self.snapshot();
        NextFilter::new(&entries, self.handler.as_ref()).message_received(session, message)
    }

    pub fn fire_exception_caught(&self, session: &Arc<dyn IoSession>, error: &SessionError) {
        let entries = self.snapshot();
        NextFilter::new(&entries, self.handler.as_ref()).exception_caught(session, error);
    }

    fn report(&self, session: &Arc<dyn IoSession>, event: &'static str, result: Result<()>) {
        if let Err(err) = result {
            warn!(
                session.id = %session.id(),
                event,
                error.code = err.code(),
                "filter chain callback failed"
            );
            self.fire_exception_caught(session, &err);
        }
    }
}

impl fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterChain")
            .field("filters", &self.names())
            .field("built", &self.is_built())
            .finish()
    }
}

fn ensure_unique(entries: &[FilterEntry], name: &str) -> Result<()> {
    if entries.iter().any(|entry| entry.name() == name) {
        return Err(SessionError::invalid_argument(
            "filter_chain.add",
            format!("filter `{name}` already exists"),
        ));
    }
    Ok(())
}

/// 过滤链构建器：服务持有一个实例，处理器首次添加会话时调用。
pub trait FilterChainBuilder: Send + Sync + 'static {
    fn build_filter_chain(&self, chain: &FilterChain) -> Result<()>;
}

impl<F> FilterChainBuilder for F
where
    F: Fn(&FilterChain) -> Result<()> + Send + Sync + 'static,
{
    fn build_filter_chain(&self, chain: &FilterChain) -> Result<()> {
        self(chain)
    }
}

/// 默认构建器：维护一份有序的拦截器模板，构建时依序追加到会话链上。
///
/// 模板中的拦截器实例在所有会话之间共享。
#[derive(Default)]
pub struct DefaultFilterChainBuilder {
    entries: RwLock<Vec<FilterEntry>>,
}

impl DefaultFilterChainBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_last(&self, name: impl Into<Arc<str>>, filter: Arc<dyn IoFilter>) -> Result<()> {
        let entry = FilterEntry::new(name, filter);
        let mut entries = self.entries.write();
        ensure_unique(&entries, entry.name())?;
        entries.push(entry);
        Ok(())
    }

    pub fn add_first(&self, name: impl Into<Arc<str>>, filter: Arc<dyn IoFilter>) -> Result<()> {
        let entry = FilterEntry::new(name, filter);
        let mut entries = self.entries.write();
        ensure_unique(&entries, entry.name())?;
        entries.insert(0, entry);
        Ok(())
    }

    pub fn remove(&self, name: &str) -> Option<Arc<dyn IoFilter>> {
        let mut entries = self.entries.write();
        let index = entries.iter().position(|entry| entry.name() == name)?;
        Some(entries.remove(index).filter)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().iter().any(|entry| entry.name() == name)
    }

    pub fn names(&self) -> Vec<String> {
        self.entries
            .read()
            .iter()
            .map(|entry| entry.name().to_owned())
            .collect()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

impl FilterChainBuilder for DefaultFilterChainBuilder {
    fn build_filter_chain(&self, chain: &FilterChain) -> Result<()> {
        let entries = self.entries.read().clone();
        for entry in entries {
            chain.add_last(entry.name.clone(), Arc::clone(&entry.filter))?;
        }
        Ok(())
    }
}

impl fmt::Debug for DefaultFilterChainBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultFilterChainBuilder")
            .field("filters", &self.names())
            .finish()
    }
}
