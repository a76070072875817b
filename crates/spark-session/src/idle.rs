//! 空闲检测器。
//!
//! # 教案式注释
//!
//! ## 契约 (What)
//! - 每个服务一个检测器，按固定周期扫描供应函数给出的全部会话；
//! - 对每个会话的每类空闲：阈值非零、距上次活动已达阈值、且本段空闲期内尚未触发过，
//!   才触发 `session_idle`；
//! - `start` 幂等，`stop`/析构会终止后台任务；检测与会话的泵送任务相互独立。
//!
//! ## 逻辑 (How)
//! - 后台任务基于 `tokio::time::interval`，错过的节拍直接跳过，不做补偿；
//! - 判定与记账委托给 [`SessionCore::try_mark_idle`](crate::session::SessionCore::try_mark_idle)，
//!   检测器自身不保存会话状态；
//! - [`IdleStatusChecker::check_at`] 以显式时刻完成一轮扫描，测试无需真实等待。

use core::{fmt, time::Duration};
use std::{sync::Arc, time::Instant};

use parking_lot::Mutex;
use tokio::{runtime::Handle, task::JoinHandle, time::MissedTickBehavior};
use tracing::{debug, trace};

use crate::{config::IdleStatus, session::IoSession};

/// 默认扫描周期。
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_millis(500);

/// 返回当前全部待检测会话的供应函数。
pub type SessionSupplier = Arc<dyn Fn() -> Vec<Arc<dyn IoSession>> + Send + Sync>;

pub struct IdleStatusChecker {
    interval: Duration,
    sessions: SessionSupplier,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl IdleStatusChecker {
    pub fn new(interval: Duration, sessions: SessionSupplier) -> Self {
        Self {
            interval: interval.max(Duration::from_millis(1)),
            sessions,
            task: Mutex::new(None),
        }
    }

    pub fn with_default_interval(sessions: SessionSupplier) -> Self {
        Self::new(DEFAULT_CHECK_INTERVAL, sessions)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// 在给定运行时上启动后台扫描；已在运行时返回 `false`。
    pub fn start(&self, runtime: &Handle) -> bool {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return false;
        }
        let sessions = Arc::clone(&self.sessions);
        let period = self.interval;
        *task = Some(runtime.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let snapshot = sessions();
                Self::check_at(&snapshot, Instant::now());
            }
        }));
        debug!(interval_ms = period.as_millis() as u64, "idle status checker started");
        true
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// 终止后台扫描；未运行时为空操作。
    pub fn stop(&self) {
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
            debug!("idle status checker stopped");
        }
    }

    /// 立即对供应函数给出的会话完成一轮扫描，返回触发的事件数。
    pub fn check_now(&self) -> usize {
        Self::check_at(&(self.sessions)(), Instant::now())
    }

    /// 以 `now` 为当前时刻扫描一轮，返回触发的事件数。
    pub fn check_at(sessions: &[Arc<dyn IoSession>], now: Instant) -> usize {
        let mut fired = 0;
        for session in sessions {
            if session.is_closing() {
                continue;
            }
            for status in IdleStatus::ALL {
                let Some(threshold) = session.config().idle_duration(status) else {
                    continue;
                };
                if session.core().try_mark_idle(status, threshold, now) {
                    trace!(session.id = %session.id(), idle = %status, "session idle");
                    session.filter_chain().fire_session_idle(session, status);
                    fired += 1;
                }
            }
        }
        fired
    }
}

impl Drop for IdleStatusChecker {
    fn drop(&mut self) {
        if let Some(handle) = self.task.get_mut().take() {
            handle.abort();
        }
    }
}

impl fmt::Debug for IdleStatusChecker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdleStatusChecker")
            .field("interval", &self.interval)
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::SessionConfig,
        test_stubs::{RecordingHandler, StubSession},
    };

    fn idle_config(reader: u32, writer: u32, both: u32) -> SessionConfig {
        SessionConfig {
            reader_idle_time: reader,
            writer_idle_time: writer,
            both_idle_time: both,
            ..SessionConfig::default()
        }
    }

    #[test]
    fn fires_each_enabled_kind_once_per_idle_period() {
        let handler = Arc::new(RecordingHandler::new());
        let session: Arc<dyn IoSession> =
            StubSession::with_config(handler.clone(), idle_config(1, 0, 2));
        let start = session.core().created_at();
        let sessions = vec![session.clone()];

        assert_eq!(IdleStatusChecker::check_at(&sessions, start + Duration::from_millis(500)), 0);
        assert_eq!(IdleStatusChecker::check_at(&sessions, start + Duration::from_millis(1_100)), 1);
        assert_eq!(IdleStatusChecker::check_at(&sessions, start + Duration::from_millis(2_100)), 1);
        assert_eq!(
            IdleStatusChecker::check_at(&sessions, start + Duration::from_secs(10)),
            0,
            "同一段空闲期内不应重复触发"
        );
        assert_eq!(
            handler.idle_events(),
            vec![IdleStatus::ReaderIdle, IdleStatus::BothIdle],
            "阈值为零的写空闲不应触发"
        );

        session.core().record_read_at(8, start + Duration::from_secs(11));
        assert_eq!(IdleStatusChecker::check_at(&sessions, start + Duration::from_secs(12)), 1);
        assert_eq!(session.core().idle_count(IdleStatus::ReaderIdle), 2);
    }

    #[test]
    fn closing_sessions_are_skipped() {
        let handler = Arc::new(RecordingHandler::new());
        let session: Arc<dyn IoSession> =
            StubSession::with_config(handler.clone(), idle_config(1, 1, 1));
        session.close();
        let later = session.core().created_at() + Duration::from_secs(5);
        assert_eq!(IdleStatusChecker::check_at(&[session], later), 0);
        assert!(handler.idle_events().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn start_is_idempotent_and_stop_terminates() {
        let handler = Arc::new(RecordingHandler::new());
        let session: Arc<dyn IoSession> =
            StubSession::with_config(handler.clone(), idle_config(1, 0, 0));
        let supplier: SessionSupplier = Arc::new(move || vec![session.clone()]);
        let checker = IdleStatusChecker::new(Duration::from_millis(50), supplier);

        let runtime = Handle::current();
        assert!(checker.start(&runtime));
        assert!(!checker.start(&runtime), "重复启动应为空操作");
        assert!(checker.is_running());

        let fired = handler
            .wait_for(Duration::from_secs(3), |events| !events.is_empty())
            .await;
        assert!(fired, "超过阈值后应收到读空闲事件");

        checker.stop();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!checker.is_running());
        assert_eq!(handler.idle_events(), vec![IdleStatus::ReaderIdle]);
    }
}
