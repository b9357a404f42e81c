//! 跟踪器句柄
//!
//! `Tracker` 拥有后台工作线程，对外提供共享上下文与命令队列。
//! Drop 时通知工作线程退出并在超时内等待它结束。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Sender, TrySendError, bounded};
use tracing::{error, info};

use captury_transport::RemoteTransport;

use crate::command::TrackerCommand;
use crate::config::TrackingConfig;
use crate::error::DriverError;
use crate::metrics::{MetricsSnapshot, TrackingMetrics};
use crate::session::ConnectionState;
use crate::state::TrackingContext;
use crate::worker::TrackingWorker;

/// 带超时的线程 join
trait JoinTimeout {
    fn join_timeout(self, timeout: Duration) -> thread::Result<()>;
}

impl<T: Send + 'static> JoinTimeout for JoinHandle<T> {
    fn join_timeout(self, timeout: Duration) -> thread::Result<()> {
        use std::sync::mpsc;

        let (tx, rx) = mpsc::channel();

        // 看门狗线程负责 join，超时后它继续运行，进程退出时回收
        thread::spawn(move || {
            let result = self.join();
            let _ = tx.send(result);
        });

        match rx.recv_timeout(timeout) {
            Ok(join_result) => join_result.map(|_| ()),
            Err(mpsc::RecvTimeoutError::Timeout) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "Thread join timeout",
            ))),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "Thread panicked during join",
            ))),
        }
    }
}

/// 可克隆的命令发送端
#[derive(Clone)]
pub struct CommandHandle {
    tx: Sender<TrackerCommand>,
    ctx: Arc<TrackingContext>,
}

impl CommandHandle {
    pub fn new(tx: Sender<TrackerCommand>, ctx: Arc<TrackingContext>) -> Self {
        Self { tx, ctx }
    }

    /// 非阻塞发送；队列满时丢弃命令并返回 `ChannelFull`
    pub fn send(&self, command: TrackerCommand) -> Result<(), DriverError> {
        self.tx.try_send(command).map_err(|e| match e {
            TrySendError::Full(_) => {
                TrackingMetrics::incr(&self.ctx.metrics.commands_dropped);
                DriverError::ChannelFull
            },
            TrySendError::Disconnected(_) => DriverError::ChannelClosed,
        })
    }
}

impl std::fmt::Debug for CommandHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandHandle")
            .field("queued", &self.tx.len())
            .finish()
    }
}

/// 跟踪器
///
/// # Example
///
/// ```no_run
/// # #[cfg(feature = "mock")]
/// # {
/// use captury_driver::{Tracker, TrackingConfig};
/// use captury_transport::MockServer;
///
/// let server = MockServer::new();
/// let tracker = Tracker::spawn(server.transport(), TrackingConfig::default()).unwrap();
/// println!("{:?}", tracker.connection_state());
/// # }
/// ```
pub struct Tracker {
    ctx: Arc<TrackingContext>,
    cmd_tx: Sender<TrackerCommand>,
    /// Drop 时先释放，使工作线程的睡眠立即结束
    shutdown_tx: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
    is_running: Arc<AtomicBool>,
    config: TrackingConfig,
}

impl Tracker {
    /// 校验配置并启动后台工作线程
    pub fn spawn<T>(transport: T, config: TrackingConfig) -> Result<Self, DriverError>
    where
        T: RemoteTransport + 'static,
    {
        config.validate()?;

        let ctx = Arc::new(TrackingContext::new(config.liveness_budget));
        let (cmd_tx, cmd_rx) = bounded(config.command_queue_capacity);
        let (shutdown_tx, shutdown_rx) = bounded(1);
        let is_running = Arc::new(AtomicBool::new(true));

        let worker = TrackingWorker::new(transport, ctx.clone(), config.clone());
        let running = is_running.clone();
        let handle = thread::Builder::new()
            .name("captury-tracker".into())
            .spawn(move || worker.run(cmd_rx, shutdown_rx, running))
            .map_err(|e| DriverError::IoThread(e.to_string()))?;

        info!(
            "Tracker started for {}:{} (poll interval {} ms)",
            config.host, config.port, config.poll_interval_ms
        );

        Ok(Self {
            ctx,
            cmd_tx,
            shutdown_tx: Some(shutdown_tx),
            worker: Some(handle),
            is_running,
            config,
        })
    }

    pub fn context(&self) -> &Arc<TrackingContext> {
        &self.ctx
    }

    pub fn command_handle(&self) -> CommandHandle {
        CommandHandle::new(self.cmd_tx.clone(), self.ctx.clone())
    }

    pub fn send_command(&self, command: TrackerCommand) -> Result<(), DriverError> {
        self.command_handle().send(command)
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.ctx.connection_state()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.ctx.metrics.snapshot()
    }

    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }

    /// 工作线程是否仍在运行
    pub fn is_alive(&self) -> bool {
        self.worker.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// 显式关闭（等价于 drop）
    pub fn shutdown(self) {
        drop(self);
    }
}

impl Drop for Tracker {
    fn drop(&mut self) {
        self.is_running.store(false, Ordering::Release);

        // 必须在 join 之前释放，接收端才会 Disconnected
        drop(self.shutdown_tx.take());

        let join_timeout = self.config.join_timeout();
        if let Some(handle) = self.worker.take()
            && let Err(_e) = handle.join_timeout(join_timeout)
        {
            error!(
                "Tracking worker panicked or failed to shut down within {:?}",
                join_timeout
            );
        }
    }
}

impl std::fmt::Debug for Tracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracker")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("state", &self.connection_state())
            .field("alive", &self.is_alive())
            .finish()
    }
}
