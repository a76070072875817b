#![doc = r#"
# spark-transport-file

## 设计动机（Why）
- **定位**：以本地文件或目录作为“远端”的拉取型传输，是会话框架中泵送循环的参照实现；
- **架构角色**：组合 `spark-session` 的服务核心、过滤链与空闲检测器，只补充端点分类、
  按节拍读取与会话启停。

## 核心契约（What）
- 连接一个 [`FileEndPoint`] 得到一个 [`FileSession`]，其内容按 `bytes_per_read` 切分后
  依序作为消息送入过滤链；目录按文件名顺序逐个读取；
- 两次读取之间至少间隔 `read_interval_millis`，读暂停期间不丢失也不重复数据；
- 停止是协作式的：移除会话只翻转标记，泵送任务在下一个检查点退出并关闭文件；
- 文件传输不支持写出，处理器的写相关操作为空操作。

## 实现策略（How）
- 每个会话一个 Tokio 任务，读取使用 `tokio::fs`，节拍使用 `tokio::time::sleep`；
- IO 失败按操作类型映射为带稳定错误码的告警日志，并经 `exception_caught` 上报。
"#]

mod config;
mod connector;
mod end_point;
mod error;
mod processor;
mod pump;
mod session;

pub use config::{
    DEFAULT_BYTES_PER_READ, DEFAULT_READ_INTERVAL_MILLIS, DEFAULT_READER_IDLE_TIME,
    FileSessionConfig,
};
pub use connector::FileConnector;
pub use end_point::{FileEndPoint, PathType};
pub use processor::FileProcessor;
pub use session::{FileSession, METADATA, ROUND_ATTRIBUTE};
