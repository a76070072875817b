//! 文件连接器集成测试。
//!
//! # 教案式注释
//! - **意图 (Why)**：在真实 Tokio 运行时与临时目录上验证泵送循环的切分、顺序、节拍、
//!   暂停恢复与协作式停止；
//! - **契约 (What)**：所有等待都带超时，事件通过 [`RecordingHandler`] 断言；
//! - **注意 (Trade-offs)**：节拍相关断言只检查下界，避免受调度抖动影响。

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use bytes::Bytes;
use parking_lot::Mutex;
use spark_session::{
    IdleStatus, IoConnector, IoProcessor, IoSession, SessionError, WriteRequest,
    error::codes,
    test_stubs::{RecordedEvent, RecordingHandler},
};
use spark_transport_file::{FileConnector, FileEndPoint, FileSession, FileSessionConfig, PathType};

const WAIT: Duration = Duration::from_secs(5);

fn fast_config(bytes_per_read: u32, read_interval_millis: u32) -> FileSessionConfig {
    FileSessionConfig {
        bytes_per_read,
        read_interval_millis,
        ..FileSessionConfig::default()
    }
}

fn connector_with(
    config: FileSessionConfig,
    handler: Arc<RecordingHandler>,
) -> Arc<FileConnector> {
    let connector = FileConnector::new(config).unwrap();
    connector.set_handler(handler).unwrap();
    connector
}

fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|index| (index % 251) as u8).collect()
}

async fn wait_until_stopped(session: &FileSession) {
    let deadline = Instant::now() + WAIT;
    while session.is_reading() {
        assert!(Instant::now() < deadline, "泵送任务未在限定时间内结束");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// 2500 字节的文件按 1024 字节切分为 1024、1024、452 三条消息，随后停止。
#[tokio::test(flavor = "multi_thread")]
async fn file_is_split_into_chunks_then_pump_stops() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.bin");
    let content = payload(2500);
    std::fs::write(&path, &content).unwrap();

    let handler = Arc::new(RecordingHandler::new());
    let connector = connector_with(fast_config(1024, 5), handler.clone());
    let session = connector
        .connect(FileEndPoint::new("data", &path))
        .await
        .unwrap();

    wait_until_stopped(&session).await;
    assert_eq!(handler.message_lengths(), vec![1024, 1024, 452]);
    assert_eq!(handler.received_bytes(), content);
    assert_eq!(session.rounds(), 1, "未开启循环读取时只执行一轮");
    assert_eq!(session.core().read_bytes(), 2500);

    let id = session.id();
    let events = handler.events();
    assert_eq!(events[0], RecordedEvent::Created(id));
    assert_eq!(events[1], RecordedEvent::Opened(id));
    assert!(handler.exception_codes().is_empty());
    assert_eq!(
        connector.managed_sessions().len(),
        1,
        "自然读完后会话仍处于托管状态，直到被移除"
    );
}

/// 目录内的文件按名称顺序逐个读取，前一个读完才开始下一个；子目录被忽略。
#[tokio::test(flavor = "multi_thread")]
async fn directory_files_are_read_in_name_order() {
    let dir = tempfile::tempdir().unwrap();
    let first = payload(500);
    let second: Vec<u8> = vec![0xAB; 300];
    std::fs::write(dir.path().join("b.bin"), &second).unwrap();
    std::fs::write(dir.path().join("a.bin"), &first).unwrap();
    std::fs::create_dir(dir.path().join("nested")).unwrap();
    std::fs::write(dir.path().join("nested").join("c.bin"), b"ignored").unwrap();

    let end_point = FileEndPoint::new("dir", dir.path());
    assert_eq!(end_point.path_type(), PathType::Directory);

    let handler = Arc::new(RecordingHandler::new());
    let connector = connector_with(fast_config(1024, 5), handler.clone());
    let session = connector.connect(end_point).await.unwrap();
    wait_until_stopped(&session).await;

    assert_eq!(handler.message_lengths(), vec![500, 300]);
    let mut expected = first;
    expected.extend_from_slice(&second);
    assert_eq!(handler.received_bytes(), expected);
}

/// 端点不存在时只上报一次 NotFound，不产生任何消息。
#[tokio::test(flavor = "multi_thread")]
async fn missing_end_point_reports_not_found_once() {
    let dir = tempfile::tempdir().unwrap();
    let end_point = FileEndPoint::new("missing", dir.path().join("absent.bin"));
    assert_eq!(end_point.path_type(), PathType::NotExist);

    let handler = Arc::new(RecordingHandler::new());
    let mut config = fast_config(16, 5);
    config.cycle_read = true;
    let connector = connector_with(config, handler.clone());
    let session = connector.connect(end_point).await.unwrap();
    wait_until_stopped(&session).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(handler.exception_codes(), vec![codes::NOT_FOUND]);
    assert!(handler.messages().is_empty());
    assert_eq!(session.rounds(), 1);
}

/// 相邻两条消息的送达间隔不小于读取间隔（扣除读取本身的抖动）。
#[tokio::test(flavor = "multi_thread")]
async fn reads_are_paced_by_interval() {
    const INTERVAL: Duration = Duration::from_millis(50);
    const JITTER: Duration = Duration::from_millis(10);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("paced.bin");
    std::fs::write(&path, payload(64)).unwrap();

    let arrivals = Arc::new(Mutex::new(Vec::new()));
    let arrivals_in_hook = arrivals.clone();
    let handler = Arc::new(RecordingHandler::with_message_hook(move |_, _| {
        arrivals_in_hook.lock().push(Instant::now());
        Ok(())
    }));
    let connector = connector_with(fast_config(16, 50), handler.clone());
    let session = connector
        .connect(FileEndPoint::new("paced", &path))
        .await
        .unwrap();
    wait_until_stopped(&session).await;

    assert_eq!(handler.message_lengths(), vec![16; 4]);
    let arrivals = arrivals.lock().clone();
    assert_eq!(arrivals.len(), 4);
    for pair in arrivals.windows(2) {
        let gap = pair[1] - pair[0];
        assert!(
            gap >= INTERVAL - JITTER,
            "相邻读取间隔 {gap:?} 小于读取间隔 {INTERVAL:?}"
        );
    }
}

/// 重复交给处理器不会产生第二次创建事件，也不会启动第二个泵送任务。
#[tokio::test(flavor = "multi_thread")]
async fn adding_twice_starts_a_single_pump() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("twice.bin");
    let content = payload(32);
    std::fs::write(&path, &content).unwrap();

    let handler = Arc::new(RecordingHandler::new());
    let mut config = fast_config(8, 5);
    config.cycle_read = true;
    let connector = connector_with(config, handler.clone());
    let session = connector
        .connect(FileEndPoint::new("twice", &path))
        .await
        .unwrap();

    connector.processor().add(&session).unwrap();
    assert!(!session.start(), "读取中的会话不应被重复启动");
    assert!(
        handler
            .wait_for(WAIT, |events| events
                .iter()
                .filter(|event| matches!(event, RecordedEvent::Message(..)))
                .count()
                >= 12)
            .await
    );
    session.close();
    assert!(session.await_stopped(WAIT).await);

    assert_eq!(
        handler.count(|event| matches!(event, RecordedEvent::Created(_))),
        1
    );
    assert_eq!(
        handler.count(|event| matches!(event, RecordedEvent::Opened(_))),
        1
    );
    assert!(handler.message_lengths().iter().all(|len| *len == 8));
    let received = handler.received_bytes();
    assert!(
        received
            .iter()
            .enumerate()
            .all(|(index, byte)| *byte == content[index % content.len()]),
        "单个泵送任务按轮次依序重复文件内容"
    );
}

/// 有界等待超时终止任务后读取标记被清除，会话可以再次启动。
#[tokio::test(flavor = "multi_thread")]
async fn aborted_pump_can_be_restarted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("abort.bin");
    std::fs::write(&path, payload(32)).unwrap();

    let handler = Arc::new(RecordingHandler::new());
    let mut config = fast_config(8, 10);
    config.cycle_read = true;
    let connector = connector_with(config, handler.clone());
    let session = connector
        .connect(FileEndPoint::new("abort", &path))
        .await
        .unwrap();

    assert!(!session.await_stopped(Duration::from_millis(100)).await);
    assert!(!session.is_reading(), "终止后不应仍处于读取状态");

    let delivered = handler.messages().len();
    assert!(session.start(), "终止后的会话应能重新启动");
    assert!(
        handler
            .wait_for(WAIT, |events| events
                .iter()
                .filter(|event| matches!(event, RecordedEvent::Message(..)))
                .count()
                > delivered)
            .await,
        "重新启动后应继续送达消息"
    );
    session.close();
    assert!(session.await_stopped(WAIT).await);
}

/// 停止后立即重新启动不会丢失启动请求。
#[tokio::test(flavor = "multi_thread")]
async fn restart_right_after_stop_keeps_reading() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("restart.bin");
    std::fs::write(&path, payload(32)).unwrap();

    let handler = Arc::new(RecordingHandler::new());
    let mut config = fast_config(8, 1);
    config.cycle_read = true;
    let connector = connector_with(config, handler.clone());
    let session = connector
        .connect(FileEndPoint::new("restart", &path))
        .await
        .unwrap();

    for _ in 0..50 {
        session.stop();
        assert!(session.start());
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(session.is_reading(), "最后一次启动之后会话应仍在读取");

    let delivered = handler.messages().len();
    assert!(
        handler
            .wait_for(WAIT, |events| events
                .iter()
                .filter(|event| matches!(event, RecordedEvent::Message(..)))
                .count()
                > delivered)
            .await
    );
    session.close();
    assert!(session.await_stopped(WAIT).await);
}

/// 暂停期间不再送达消息；恢复后剩余数据完整、有序且不重复。
#[tokio::test(flavor = "multi_thread")]
async fn suspend_and_resume_lose_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("suspend.bin");
    let content = payload(100);
    std::fs::write(&path, &content).unwrap();

    let handler = Arc::new(RecordingHandler::with_message_hook(|session, _| {
        if session.core().read_messages() == 1 {
            session.suspend_read();
        }
        Ok(())
    }));
    let connector = connector_with(fast_config(10, 5), handler.clone());
    let session = connector
        .connect(FileEndPoint::new("suspend", &path))
        .await
        .unwrap();

    assert!(
        handler
            .wait_for(WAIT, |events| events
                .iter()
                .any(|event| matches!(event, RecordedEvent::Message(..))))
            .await
    );
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(handler.messages().len(), 1, "暂停期间不应继续送达");
    assert!(session.is_reading(), "暂停不等于停止");

    session.resume_read();
    wait_until_stopped(&session).await;
    assert_eq!(handler.message_lengths(), vec![10; 10]);
    assert_eq!(handler.received_bytes(), content);
}

/// 移除会话后泵送任务在下一个检查点退出，之后不再有消息。
#[tokio::test(flavor = "multi_thread")]
async fn removal_stops_the_pump_cooperatively() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cycle.bin");
    std::fs::write(&path, payload(32)).unwrap();

    let handler = Arc::new(RecordingHandler::new());
    let mut config = fast_config(8, 10);
    config.cycle_read = true;
    let connector = connector_with(config, handler.clone());
    let session = connector
        .connect(FileEndPoint::new("cycle", &path))
        .await
        .unwrap();
    assert!(connector.is_active(), "首个会话登记后连接器进入激活状态");

    assert!(
        handler
            .wait_for(WAIT, |events| events
                .iter()
                .filter(|event| matches!(event, RecordedEvent::Message(..)))
                .count()
                >= 3)
            .await
    );
    connector.processor().remove(&session);
    assert!(session.await_stopped(WAIT).await, "停止请求应在超时前生效");
    assert!(!session.is_reading());

    let delivered = handler.messages().len();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(handler.messages().len(), delivered, "停止后不应再有消息");
    assert!(handler.events().contains(&RecordedEvent::Closed(session.id())));
    assert!(connector.managed_sessions().is_empty());
    assert!(!connector.is_active(), "最后一个会话移除后连接器停用");
    assert!(!session.start(), "被移除的会话不可再次启动");

    connector.processor().remove(&session);
    assert_eq!(
        handler.count(|event| matches!(event, RecordedEvent::Closed(_))),
        1,
        "重复移除为空操作"
    );
}

/// 循环读取时轮次计数随每轮递增。
#[tokio::test(flavor = "multi_thread")]
async fn cycle_read_counts_rounds() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("round.bin");
    std::fs::write(&path, payload(10)).unwrap();

    let handler = Arc::new(RecordingHandler::new());
    let mut config = fast_config(1024, 5);
    config.cycle_read = true;
    let connector = connector_with(config, handler.clone());
    let session = connector
        .connect(FileEndPoint::new("round", &path))
        .await
        .unwrap();

    assert!(
        handler
            .wait_for(WAIT, |events| events
                .iter()
                .filter(|event| matches!(event, RecordedEvent::Message(..)))
                .count()
                >= 3)
            .await
    );
    session.close();
    assert!(session.await_stopped(WAIT).await);
    assert!(session.rounds() >= 3);
    assert!(handler.message_lengths().iter().all(|len| *len == 10));
}

/// 消息送达失败经 exception_caught 上报，读取继续。
#[tokio::test(flavor = "multi_thread")]
async fn delivery_failure_is_reported_and_reading_continues() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("faulty.bin");
    std::fs::write(&path, payload(30)).unwrap();

    let handler = Arc::new(RecordingHandler::with_message_hook(|session, _| {
        if session.core().read_messages() == 1 {
            return Err(SessionError::handler("rejected first chunk"));
        }
        Ok(())
    }));
    let connector = connector_with(fast_config(10, 5), handler.clone());
    let session = connector
        .connect(FileEndPoint::new("faulty", &path))
        .await
        .unwrap();
    wait_until_stopped(&session).await;

    assert_eq!(handler.message_lengths(), vec![10, 10, 10]);
    assert_eq!(handler.exception_codes(), vec![codes::HANDLER]);
}

/// 写相关操作是显式空操作。
#[tokio::test(flavor = "multi_thread")]
async fn write_operations_are_no_ops() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ro.bin");
    std::fs::write(&path, payload(4)).unwrap();

    let handler = Arc::new(RecordingHandler::new());
    let connector = connector_with(fast_config(1024, 5), handler.clone());
    let session = connector
        .connect(FileEndPoint::new("ro", &path))
        .await
        .unwrap();

    let processor = connector.processor();
    assert!(processor.write(&session, WriteRequest::new(Bytes::from_static(b"x"))).is_ok());
    assert!(processor.flush(&session).is_ok());
    assert!(processor.update_traffic_control(&session).is_ok());
    assert_eq!(session.core().written_bytes(), 0);
}

/// 未设置 Handler 或缺少默认远端时建连失败。
#[tokio::test(flavor = "multi_thread")]
async fn connect_requires_handler_and_end_point() {
    let connector = FileConnector::new(FileSessionConfig::default()).unwrap();
    let err = connector
        .connect(FileEndPoint::new("x", "/nowhere"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), codes::INVALID_STATE);

    connector.set_handler(Arc::new(RecordingHandler::new())).unwrap();
    let err = connector.connect_default().await.unwrap_err();
    assert_eq!(err.code(), codes::INVALID_STATE);
    assert!(connector.managed_sessions().is_empty());
}

/// 初始化器在会话交给处理器之前执行；默认远端可用于建连。
#[tokio::test(flavor = "multi_thread")]
async fn initializer_runs_before_session_is_added() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("init.bin");
    std::fs::write(&path, payload(8)).unwrap();

    let handler = Arc::new(RecordingHandler::new());
    let connector = connector_with(fast_config(1024, 5), handler.clone());
    connector.set_default_remote_end_point(FileEndPoint::new("init", &path));
    let default_session = connector.connect_default().await.unwrap();
    wait_until_stopped(&default_session).await;

    let observed = Arc::new(Mutex::new(None));
    let observed_in_init = observed.clone();
    let session = connector
        .connect_with(
            FileEndPoint::new("init", &path),
            None,
            Some(Box::new(move |session: &Arc<FileSession>| {
                session.attributes().set("tag", "initialized".to_owned());
                *observed_in_init.lock() = Some(session.is_reading());
            })),
        )
        .await
        .unwrap();

    assert_eq!(*observed.lock(), Some(false), "初始化器执行时泵送任务尚未启动");
    assert_eq!(
        session.attributes().get_or("tag", String::new()),
        "initialized"
    );
    assert_eq!(connector.core().support().cumulative_managed_session_count(), 2);
}

/// 配置快照在建连时确定，之后的修改只影响新会话。
#[tokio::test(flavor = "multi_thread")]
async fn sessions_keep_their_config_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("snapshot.bin");
    std::fs::write(&path, payload(8)).unwrap();

    let handler = Arc::new(RecordingHandler::new());
    let connector = connector_with(fast_config(1024, 5), handler.clone());
    let first = connector
        .connect(FileEndPoint::new("one", &path))
        .await
        .unwrap();
    connector.update_session_config(|config| config.bytes_per_read = 4);
    let second = connector
        .connect(FileEndPoint::new("two", &path))
        .await
        .unwrap();

    assert_eq!(first.file_config().bytes_per_read, 1024);
    assert_eq!(second.file_config().bytes_per_read, 4);
    wait_until_stopped(&first).await;
    wait_until_stopped(&second).await;
    assert_eq!(handler.message_lengths().len(), 3);
}

/// 读空闲阈值到达后空闲检测器触发一次读空闲事件。
#[tokio::test(flavor = "multi_thread")]
async fn idle_checker_reports_reader_idle() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("idle.bin");
    std::fs::write(&path, payload(4)).unwrap();

    let handler = Arc::new(RecordingHandler::new());
    let mut config = fast_config(1024, 5);
    config.session.reader_idle_time = 1;
    let connector = connector_with(config, handler.clone());
    let _session = connector
        .connect(FileEndPoint::new("idle", &path))
        .await
        .unwrap();
    assert!(connector.idle_checker().is_running(), "首次建连后空闲检测器启动");

    assert!(
        handler
            .wait_for(WAIT, |events| events
                .iter()
                .any(|event| matches!(event, RecordedEvent::Idle(_, IdleStatus::ReaderIdle))))
            .await,
        "超过读空闲阈值后应收到读空闲事件"
    );
}

/// 释放连接器会停止空闲检测并移除全部会话；重复释放为空操作。
#[tokio::test(flavor = "multi_thread")]
async fn dispose_removes_every_session() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dispose.bin");
    std::fs::write(&path, payload(64)).unwrap();

    let handler = Arc::new(RecordingHandler::new());
    let mut config = fast_config(8, 20);
    config.cycle_read = true;
    let connector = connector_with(config, handler.clone());
    let session = connector
        .connect(FileEndPoint::new("dispose", &path))
        .await
        .unwrap();

    let deactivated = Arc::new(AtomicBool::new(false));
    struct Flag(Arc<AtomicBool>);
    impl spark_session::ServiceListener for Flag {
        fn service_deactivated(&self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }
    connector.add_listener(Arc::new(Flag(deactivated.clone())));

    connector.dispose();
    connector.dispose();
    assert!(session.await_stopped(WAIT).await);
    assert!(!connector.idle_checker().is_running());
    assert!(connector.managed_sessions().is_empty());
    assert!(deactivated.load(Ordering::SeqCst));
    assert_eq!(
        handler.count(|event| matches!(event, RecordedEvent::Closed(_))),
        1
    );

    let err = connector
        .connect(FileEndPoint::new("late", &path))
        .await
        .unwrap_err();
    assert_eq!(err.code(), codes::INVALID_STATE);
}
