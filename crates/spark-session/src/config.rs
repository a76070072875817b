//! 会话配置契约。
//!
//! # 教案式注释
//!
//! ## 契约 (What)
//! - [`SessionConfig`] 是所有传输共享的可调参数集合：三类空闲阈值、写超时、读缓冲大小与
//!   吞吐采样间隔，单位均为秒（读缓冲为字节）；
//! - 阈值为 `0` 表示关闭对应的空闲检测；
//! - 传输实现通过 [`TransportConfig`] 扩展自己的字段，并暴露内嵌的 [`SessionConfig`]，
//!   使空闲检测器等通用组件无需知道具体传输类型。
//!
//! ## 逻辑 (How)
//! - 所有字段以 `u32` 表达，天然满足“非负”约束；
//! - 服务在创建会话时复制一份配置快照交给会话，之后对服务配置的修改只影响新会话。

use core::{fmt, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// 空闲类型。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdleStatus {
    /// 读方向空闲。
    ReaderIdle,
    /// 写方向空闲。
    WriterIdle,
    /// 读写两个方向均空闲。
    BothIdle,
}

impl IdleStatus {
    /// 全部空闲类型，按检测顺序排列。
    pub const ALL: [IdleStatus; 3] = [
        IdleStatus::ReaderIdle,
        IdleStatus::WriterIdle,
        IdleStatus::BothIdle,
    ];

    pub(crate) fn index(self) -> usize {
        match self {
            IdleStatus::ReaderIdle => 0,
            IdleStatus::WriterIdle => 1,
            IdleStatus::BothIdle => 2,
        }
    }

    /// 返回稳定的文本表示。
    pub fn as_str(self) -> &'static str {
        match self {
            IdleStatus::ReaderIdle => "reader_idle",
            IdleStatus::WriterIdle => "writer_idle",
            IdleStatus::BothIdle => "both_idle",
        }
    }
}

impl fmt::Display for IdleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IdleStatus {
    type Err = SessionError;

    /// 解析空闲类型，未知文本返回参数错误。
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "reader_idle" | "reader" | "read" => Ok(IdleStatus::ReaderIdle),
            "writer_idle" | "writer" | "write" => Ok(IdleStatus::WriterIdle),
            "both_idle" | "both" => Ok(IdleStatus::BothIdle),
            other => Err(SessionError::invalid_argument(
                "idle_status.parse",
                format!("unknown idle status `{other}`"),
            )),
        }
    }
}

/// 传输无关的会话配置。
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// 读缓冲大小（字节），`0` 表示由传输自行决定。
    pub read_buffer_size: u32,
    /// 吞吐统计采样间隔（秒）。
    pub throughput_calculation_interval: u32,
    /// 读空闲阈值（秒）。
    pub reader_idle_time: u32,
    /// 写空闲阈值（秒）。
    pub writer_idle_time: u32,
    /// 读写空闲阈值（秒）。
    pub both_idle_time: u32,
    /// 写超时（秒）。
    pub write_timeout: u32,
}

impl SessionConfig {
    /// 创建全部为零的配置。
    pub fn new() -> Self {
        Self::default()
    }

    /// 读取指定类型的空闲阈值（秒）。
    pub fn idle_time(&self, status: IdleStatus) -> u32 {
        match status {
            IdleStatus::ReaderIdle => self.reader_idle_time,
            IdleStatus::WriterIdle => self.writer_idle_time,
            IdleStatus::BothIdle => self.both_idle_time,
        }
    }

    /// 设置指定类型的空闲阈值（秒）。
    pub fn set_idle_time(&mut self, status: IdleStatus, seconds: u32) {
        match status {
            IdleStatus::ReaderIdle => self.reader_idle_time = seconds,
            IdleStatus::WriterIdle => self.writer_idle_time = seconds,
            IdleStatus::BothIdle => self.both_idle_time = seconds,
        }
    }

    /// 以毫秒表示的空闲阈值。
    pub fn idle_time_in_millis(&self, status: IdleStatus) -> u64 {
        u64::from(self.idle_time(status)) * 1000
    }

    /// 空闲阈值对应的时长；阈值为 `0` 时返回 `None`，表示该类检测关闭。
    pub fn idle_duration(&self, status: IdleStatus) -> Option<Duration> {
        match self.idle_time(status) {
            0 => None,
            seconds => Some(Duration::from_secs(u64::from(seconds))),
        }
    }

    pub fn throughput_calculation_interval_in_millis(&self) -> u64 {
        u64::from(self.throughput_calculation_interval) * 1000
    }

    pub fn write_timeout_in_millis(&self) -> u64 {
        u64::from(self.write_timeout) * 1000
    }

    /// 从另一份配置复制全部通用字段。
    pub fn set_all(&mut self, other: &SessionConfig) {
        self.read_buffer_size = other.read_buffer_size;
        self.throughput_calculation_interval = other.throughput_calculation_interval;
        self.reader_idle_time = other.reader_idle_time;
        self.writer_idle_time = other.writer_idle_time;
        self.both_idle_time = other.both_idle_time;
        self.write_timeout = other.write_timeout;
    }
}

/// 传输专属配置需要实现的契约。
///
/// - `session`/`session_mut` 暴露内嵌的通用配置；
/// - 实现类型必须可克隆，服务按快照方式把配置交给每个会话。
pub trait TransportConfig: Clone + fmt::Debug + Send + Sync + 'static {
    /// 通用配置视图。
    fn session(&self) -> &SessionConfig;

    /// 通用配置的可变视图。
    fn session_mut(&mut self) -> &mut SessionConfig;
}

impl TransportConfig for SessionConfig {
    fn session(&self) -> &SessionConfig {
        self
    }

    fn session_mut(&mut self) -> &mut SessionConfig {
        self
    }
}
