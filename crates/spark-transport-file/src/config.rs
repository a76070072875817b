//! 文件会话配置。
//!
//! # 教案式注释
//!
//! ## 契约 (What)
//! - 内嵌通用 [`SessionConfig`]，序列化时展开到同一层级；
//! - 传输专属字段：读取间隔 `read_interval_millis`（默认 1000）、每次读取字节数
//!   `bytes_per_read`（默认 1024）、读完后是否从头循环 `cycle_read`（默认关闭）；
//! - 读空闲阈值默认 600 秒，其余通用字段默认为 0；
//! - [`FileSessionConfig::from_toml_str`] 拒绝 `bytes_per_read = 0`。

use core::time::Duration;

use serde::{Deserialize, Serialize};
use spark_session::{Result, SessionConfig, SessionError, TransportConfig};

/// 默认读取间隔（毫秒）。
pub const DEFAULT_READ_INTERVAL_MILLIS: u32 = 1_000;
/// 默认每次读取字节数。
pub const DEFAULT_BYTES_PER_READ: u32 = 1_024;
/// 默认读空闲阈值（秒）。
pub const DEFAULT_READER_IDLE_TIME: u32 = 10 * 60;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileSessionConfig {
    #[serde(flatten)]
    pub session: SessionConfig,
    pub read_interval_millis: u32,
    pub bytes_per_read: u32,
    pub cycle_read: bool,
}

impl Default for FileSessionConfig {
    fn default() -> Self {
        let session = SessionConfig {
            reader_idle_time: DEFAULT_READER_IDLE_TIME,
            ..SessionConfig::default()
        };
        Self {
            session,
            read_interval_millis: DEFAULT_READ_INTERVAL_MILLIS,
            bytes_per_read: DEFAULT_BYTES_PER_READ,
            cycle_read: false,
        }
    }
}

impl FileSessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// 两次读取之间的目标间隔。
    pub fn read_interval(&self) -> Duration {
        Duration::from_millis(u64::from(self.read_interval_millis))
    }

    /// 单次读取的缓冲长度，至少为 1。
    pub fn chunk_len(&self) -> usize {
        self.bytes_per_read.max(1) as usize
    }

    /// 从通用配置复制全部通用字段，传输专属字段保持不变。
    pub fn set_all(&mut self, other: &SessionConfig) {
        self.session.set_all(other);
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|err| {
            SessionError::invalid_argument("file_session_config.parse", err.to_string())
        })?;
        if config.bytes_per_read == 0 {
            return Err(SessionError::invalid_argument(
                "file_session_config.bytes_per_read",
                "bytes_per_read must be greater than zero",
            ));
        }
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|err| {
            SessionError::invalid_argument("file_session_config.serialize", err.to_string())
        })
    }
}

impl TransportConfig for FileSessionConfig {
    fn session(&self) -> &SessionConfig {
        &self.session
    }

    fn session_mut(&mut self) -> &mut SessionConfig {
        &mut self.session
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spark_session::IdleStatus;

    #[test]
    fn defaults_favor_slow_single_pass_reads() {
        let config = FileSessionConfig::new();
        assert_eq!(config.read_interval(), Duration::from_secs(1));
        assert_eq!(config.chunk_len(), 1024);
        assert!(!config.cycle_read);
        assert_eq!(config.session.idle_time(IdleStatus::ReaderIdle), 600);
        assert_eq!(config.session.idle_time(IdleStatus::WriterIdle), 0);
    }

    #[test]
    fn parses_flattened_toml() {
        let config = FileSessionConfig::from_toml_str(
            r#"
            both_idle_time = 10
            read_interval_millis = 20
            bytes_per_read = 512
            cycle_read = true
            "#,
        )
        .unwrap();
        assert_eq!(config.session.both_idle_time, 10);
        assert_eq!(
            config.session.reader_idle_time, DEFAULT_READER_IDLE_TIME,
            "缺省字段沿用默认值"
        );
        assert_eq!(config.chunk_len(), 512);
        assert!(config.cycle_read);

        let text = config.to_toml_string().unwrap();
        assert!(text.contains("both_idle_time = 10"));
        assert_eq!(FileSessionConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn rejects_zero_chunk_and_malformed_text() {
        let err = FileSessionConfig::from_toml_str("bytes_per_read = 0").unwrap_err();
        assert_eq!(err.code(), spark_session::error::codes::INVALID_ARGUMENT);
        assert!(FileSessionConfig::from_toml_str("cycle_read = \"yes\"").is_err());
    }

    #[test]
    fn set_all_keeps_transport_fields() {
        let mut config = FileSessionConfig {
            read_interval_millis: 5,
            ..FileSessionConfig::default()
        };
        let common = SessionConfig {
            writer_idle_time: 3,
            ..SessionConfig::default()
        };
        config.set_all(&common);
        assert_eq!(config.session, common);
        assert_eq!(config.read_interval_millis, 5);
    }
}
