//! 文件会话的泵送循环。
//!
//! # 教案式注释
//!
//! ## 契约 (What)
//! - 每轮依据端点分类读取：单个文件直接读取；目录按文件名排序后逐个读取其中的普通文件，
//!   前一个文件读完才打开下一个；端点不存在时上报一次 `NotFound` 并结束；
//! - 每次最多读取 `bytes_per_read` 字节并作为一条消息送入过滤链；
//!   送达失败经 `exception_caught` 上报后继续读取；
//! - 打开、枚举或读取失败经 `exception_caught` 上报后结束循环；
//! - 两次读取的起点间隔不小于 `read_interval`；读暂停期间以 `min(100ms, read_interval)` 轮询；
//! - 每次读取前与每轮开始前检查读取标记，停止请求在下一个检查点生效；
//!   文件句柄随作用域释放，无论以何种路径退出。
//!
//! ## 注意事项
//! - 开启循环读取时，若一整轮没有读到任何数据，下一轮开始前先等待一个读取间隔。

use core::time::Duration;
use std::{path::Path, sync::Arc};

use bytes::BytesMut;
use spark_session::{IoSession, Result};
use tokio::{fs::File, io::AsyncReadExt, time::Instant};
use tracing::{debug, trace, warn};

use crate::{
    end_point::PathType,
    error::{self, ENUMERATE, OPEN, READ},
    session::FileSession,
};

const SUSPEND_POLL_CEILING: Duration = Duration::from_millis(100);
const SUSPEND_POLL_FLOOR: Duration = Duration::from_millis(1);

pub(crate) async fn run(session: Arc<FileSession>) {
    let handle: Arc<dyn IoSession> = session.clone();
    let mut epoch = session.pump_epoch();
    loop {
        pump_rounds(&session, &handle).await;
        match session.finish_pump(epoch) {
            Some(restarted) => epoch = restarted,
            None => break,
        }
    }
    debug!(
        session.id = %session.id(),
        rounds = session.rounds(),
        read_bytes = session.core().read_bytes(),
        "file pump exited"
    );
}

async fn pump_rounds(session: &FileSession, handle: &Arc<dyn IoSession>) {
    let end_point = session.end_point();
    let cycle = session.file_config().cycle_read;

    while session.is_reading() {
        let round = session.next_round();
        trace!(session.id = %session.id(), round, "file pump round");

        let result = match end_point.path_type() {
            PathType::File => read_file(session, handle, end_point.path()).await,
            PathType::Directory => read_directory(session, handle, end_point.path()).await,
            PathType::NotExist => {
                let err = error::not_found(end_point.path());
                session.filter_chain().fire_exception_caught(handle, &err);
                break;
            }
        };

        match result {
            Ok(delivered) => {
                if !cycle {
                    break;
                }
                if delivered == 0 {
                    session.pause(session.file_config().read_interval()).await;
                }
            }
            Err(err) => {
                session.filter_chain().fire_exception_caught(handle, &err);
                break;
            }
        }
    }
}

async fn read_file(
    session: &FileSession,
    handle: &Arc<dyn IoSession>,
    path: &Path,
) -> Result<u64> {
    let mut file = File::open(path)
        .await
        .map_err(|err| error::map_io_error(OPEN, path, err))?;
    read_stream(session, handle, &mut file, path).await
}

async fn read_directory(
    session: &FileSession,
    handle: &Arc<dyn IoSession>,
    path: &Path,
) -> Result<u64> {
    let files = list_files(path).await?;
    let mut delivered = 0;
    for file in files {
        if !session.is_reading() {
            break;
        }
        delivered += read_file(session, handle, &file).await?;
    }
    Ok(delivered)
}

/// 列出目录下的普通文件，按文件名排序。
async fn list_files(path: &Path) -> Result<Vec<std::path::PathBuf>> {
    let mut entries = tokio::fs::read_dir(path)
        .await
        .map_err(|err| error::map_io_error(ENUMERATE, path, err))?;
    let mut files = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|err| error::map_io_error(ENUMERATE, path, err))?
    {
        let file_type = entry
            .file_type()
            .await
            .map_err(|err| error::map_io_error(ENUMERATE, &entry.path(), err))?;
        if file_type.is_file() {
            files.push(entry.path());
        }
    }
    files.sort_by(|left, right| left.file_name().cmp(&right.file_name()));
    Ok(files)
}

/// 按节拍读取单个已打开的文件，返回送达的消息数。
async fn read_stream(
    session: &FileSession,
    handle: &Arc<dyn IoSession>,
    file: &mut File,
    path: &Path,
) -> Result<u64> {
    let config = session.file_config();
    let interval = config.read_interval();
    let chunk = config.chunk_len();
    let mut buffer = BytesMut::with_capacity(chunk);
    let mut delivered = 0;

    while session.is_reading() {
        if session.is_read_suspended() {
            session
                .pause(interval.clamp(SUSPEND_POLL_FLOOR, SUSPEND_POLL_CEILING))
                .await;
            continue;
        }

        let started = Instant::now();
        buffer.clear();
        buffer.resize(chunk, 0);
        let read = file
            .read(&mut buffer[..])
            .await
            .map_err(|err| error::map_io_error(READ, path, err))?;
        if read == 0 {
            break;
        }

        let message = buffer.split_to(read).freeze();
        session.core().record_read(read);
        if let Err(err) = session.filter_chain().fire_message_received(handle, message) {
            warn!(
                session.id = %session.id(),
                error.code = err.code(),
                "message delivery failed"
            );
            session.filter_chain().fire_exception_caught(handle, &err);
        }
        delivered += 1;

        if let Some(rest) = interval.checked_sub(started.elapsed()) {
            session.pause(rest).await;
        }
    }
    Ok(delivered)
}
