//! Builder 模式实现
//!
//! 提供链式构造 `Tracker` 实例的便捷方式。

use captury_protocol::TagFormat;
use captury_transport::RemoteTransport;

use crate::config::TrackingConfig;
use crate::error::DriverError;
use crate::tracker::Tracker;

/// Tracker Builder（链式构造）
///
/// 未设置的字段使用 [`TrackingConfig::default`] 的值。
///
/// # Example
///
/// ```no_run
/// # #[cfg(feature = "mock")]
/// # {
/// use captury_driver::TrackerBuilder;
/// use captury_transport::MockServer;
///
/// let server = MockServer::new();
/// let tracker = TrackerBuilder::new()
///     .host("192.168.1.20")
///     .poll_interval_ms(100)
///     .stream_ar_tags(true)
///     .build(server.transport())
///     .unwrap();
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct TrackerBuilder {
    config: TrackingConfig,
}

impl TrackerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从已有配置开始（例如从文件加载的配置）
    pub fn from_config(config: TrackingConfig) -> Self {
        Self { config }
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn poll_interval_ms(mut self, interval_ms: u64) -> Self {
        self.config.poll_interval_ms = interval_ms;
        self
    }

    /// 位置比例因子（默认 0.001，毫米转米）
    pub fn scale_factor(mut self, scale_factor: f64) -> Self {
        self.config.scale_factor = scale_factor;
        self
    }

    pub fn stream_ar_tags(mut self, enabled: bool) -> Self {
        self.config.stream_ar_tags = enabled;
        self
    }

    pub fn liveness_budget(mut self, cycles: u32) -> Self {
        self.config.liveness_budget = cycles;
        self
    }

    pub fn tag_format(mut self, format: TagFormat) -> Self {
        self.config.tag_format = format;
        self
    }

    /// 标记关节名后缀；`None` 关闭标记轮询
    pub fn marker_joint_suffix(mut self, suffix: Option<impl Into<String>>) -> Self {
        self.config.marker_joint_suffix = suffix.map(Into::into);
        self
    }

    pub fn marker_poll_divisor(mut self, divisor: u32) -> Self {
        self.config.marker_poll_divisor = divisor;
        self
    }

    pub fn command_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.command_queue_capacity = capacity;
        self
    }

    pub fn join_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.config.join_timeout_ms = timeout_ms;
        self
    }

    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }

    /// 校验配置并启动跟踪器
    ///
    /// # Errors
    /// - `DriverError::InvalidConfig`: 配置无效
    /// - `DriverError::IoThread`: 工作线程创建失败
    pub fn build<T>(self, transport: T) -> Result<Tracker, DriverError>
    where
        T: RemoteTransport + 'static,
    {
        Tracker::spawn(transport, self.config)
    }
}
