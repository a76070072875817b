//! 文件读取示例入口。
//!
//! # 说明
//! - 连接一个文件或目录端点，按配置的节拍读取，并把每条消息以十六进制转储打印到标准输出；
//! - 会话生命周期与空闲事件经 `tracing` 输出，日志级别由 `RUST_LOG` 控制（默认 `info`）；
//! - 读取自然结束（未开启循环读取）或收到 Ctrl-C 时退出。

mod dump;

use std::{
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use anyhow::Context as _;
use bytes::Bytes;
use clap::Parser;
use spark_session::{IdleStatus, IoConnector, IoHandler, IoSession, LoggingFilter, SessionError};
use spark_transport_file::{FileConnector, FileEndPoint, FileSessionConfig};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "spark-file-reader")]
#[command(about = "按节拍读取文件或目录，并打印每条消息的十六进制转储")]
struct Args {
    /// 要读取的文件或目录。
    path: PathBuf,

    /// 端点名称。
    #[arg(long, default_value = "file")]
    name: String,

    /// TOML 格式的会话配置文件，命令行参数会覆盖其中的同名字段。
    #[arg(long)]
    config: Option<PathBuf>,

    /// 每次读取的字节数。
    #[arg(long)]
    bytes_per_read: Option<u32>,

    /// 两次读取之间的间隔（毫秒）。
    #[arg(long)]
    read_interval_millis: Option<u32>,

    /// 读写空闲阈值（秒），0 表示关闭。
    #[arg(long)]
    both_idle_time: Option<u32>,

    /// 读完后从头循环读取，直到收到 Ctrl-C。
    #[arg(long, action = clap::ArgAction::SetTrue)]
    cycle: bool,
}

impl Args {
    fn session_config(&self) -> anyhow::Result<FileSessionConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read config file {}", path.display()))?;
                FileSessionConfig::from_toml_str(&text)
                    .with_context(|| format!("invalid config file {}", path.display()))?
            }
            None => FileSessionConfig::default(),
        };
        if let Some(bytes_per_read) = self.bytes_per_read {
            anyhow::ensure!(bytes_per_read > 0, "--bytes-per-read must be greater than zero");
            config.bytes_per_read = bytes_per_read;
        }
        if let Some(interval) = self.read_interval_millis {
            config.read_interval_millis = interval;
        }
        if let Some(both_idle_time) = self.both_idle_time {
            config.session.set_idle_time(IdleStatus::BothIdle, both_idle_time);
        }
        config.cycle_read |= self.cycle;
        Ok(config)
    }
}

/// 把消息打印为十六进制转储的 Handler。
#[derive(Default)]
struct DumpHandler {
    offset: AtomicU64,
}

impl IoHandler for DumpHandler {
    fn session_opened(&self, session: &Arc<dyn IoSession>) -> spark_session::Result<()> {
        info!(session.id = %session.id(), "reading started");
        Ok(())
    }

    fn session_idle(
        &self,
        session: &Arc<dyn IoSession>,
        status: IdleStatus,
    ) -> spark_session::Result<()> {
        info!(session.id = %session.id(), idle = %status, "session idle");
        Ok(())
    }

    fn message_received(
        &self,
        _session: &Arc<dyn IoSession>,
        message: Bytes,
    ) -> spark_session::Result<()> {
        let offset = self
            .offset
            .fetch_add(message.len() as u64, Ordering::Relaxed);
        print!("{}", dump::hex_dump(offset, &message));
        Ok(())
    }

    fn exception_caught(&self, session: &Arc<dyn IoSession>, error: &SessionError) {
        warn!(session.id = %session.id(), error.code = error.code(), error = %error, "read failed");
    }
}

fn install_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    install_tracing();
    let args = Args::parse();
    let config = args.session_config()?;
    info!(
        bytes_per_read = config.bytes_per_read,
        read_interval_millis = config.read_interval_millis,
        cycle_read = config.cycle_read,
        "configuration loaded"
    );

    let connector = FileConnector::new(config).context("failed to create file connector")?;
    connector.set_handler(Arc::new(DumpHandler::default()))?;
    connector
        .filter_chain()
        .add_last("logger", Arc::new(LoggingFilter::new()))?;

    let end_point = FileEndPoint::new(args.name.clone(), &args.path);
    info!(end_point = %end_point, path_type = end_point.path_type().as_str(), "connecting");
    let session = connector.connect(end_point).await?;

    let finished = {
        let session = session.clone();
        async move {
            while session.is_reading() {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    };

    tokio::select! {
        _ = finished => info!("reading finished"),
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for ctrl-c")?;
            info!("interrupted, stopping");
        }
    }

    session.close();
    if !session.await_stopped(Duration::from_secs(2)).await {
        warn!("file pump did not stop in time and was aborted");
    }
    connector.dispose();
    info!(
        read_bytes = session.core().read_bytes(),
        rounds = session.rounds(),
        "done"
    );
    Ok(())
}
