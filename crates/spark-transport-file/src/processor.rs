use std::sync::Arc;

use spark_session::{IoProcessor, IoSession, Result, SessionError, WriteRequest};
use tracing::trace;

use crate::session::FileSession;

/// 文件会话处理器。
///
/// 文件传输只读不写：`write`、`flush` 与 `update_traffic_control` 为空操作，
/// 读暂停由泵送循环自行轮询会话标记实现。
#[derive(Clone, Copy, Debug, Default)]
pub struct FileProcessor;

impl IoProcessor<FileSession> for FileProcessor {
    fn add(&self, session: &Arc<FileSession>) -> Result<()> {
        if session.is_closing() {
            return Err(SessionError::invalid_state(
                "file_processor.add",
                "session has already been removed",
            ));
        }
        let connector = session.connector().ok_or_else(|| {
            SessionError::invalid_state("file_processor.add", "connector has been dropped")
        })?;
        connector.core().build_filter_chain(session.filter_chain())?;

        let handle: Arc<dyn IoSession> = session.clone();
        connector.core().support().fire_session_created(&handle);
        session.start();
        Ok(())
    }

    fn remove(&self, session: &Arc<FileSession>) {
        if !session.core().mark_closing() {
            return;
        }
        session.stop();
        if let Some(connector) = session.connector() {
            let handle: Arc<dyn IoSession> = session.clone();
            connector.core().support().fire_session_destroyed(&handle);
        }
    }

    fn write(&self, session: &Arc<FileSession>, request: WriteRequest) -> Result<()> {
        trace!(
            session.id = %session.id(),
            len = request.message().len(),
            "write ignored by read-only file transport"
        );
        Ok(())
    }

    fn flush(&self, _session: &Arc<FileSession>) -> Result<()> {
        Ok(())
    }

    fn update_traffic_control(&self, _session: &Arc<FileSession>) -> Result<()> {
        Ok(())
    }
}
