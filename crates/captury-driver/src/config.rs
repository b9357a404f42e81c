//! 跟踪配置
//!
//! 配置在构造时传入会话和工作线程，会话期间不可变；修改配置需要重新连接。

use std::time::Duration;

use captury_protocol::{DEFAULT_PORT, StreamMode, TagFormat};

use crate::error::DriverError;

/// 跟踪配置
///
/// # Example
///
/// ```
/// use captury_driver::TrackingConfig;
///
/// let config = TrackingConfig {
///     host: "192.168.1.20".to_string(),
///     stream_ar_tags: true,
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TrackingConfig {
    /// 服务端地址
    pub host: String,
    /// 服务端端口
    pub port: u16,
    /// 轮询间隔（毫秒）
    pub poll_interval_ms: u64,
    /// 位置比例因子（默认毫米转米）
    pub scale_factor: f64,
    /// 是否同时请求 AR 标记流
    pub stream_ar_tags: bool,
    /// 演员连续多少个周期未出现后被移除
    pub liveness_budget: u32,
    /// AR 标记方向三元组的协议版本
    pub tag_format: TagFormat,
    /// 标记关节名后缀（例如 `"Head"`），`None` 或空字符串表示不轮询标记
    pub marker_joint_suffix: Option<String>,
    /// 每隔多少个轮询周期查询一次标记变换
    pub marker_poll_divisor: u32,
    /// 命令队列容量
    pub command_queue_capacity: usize,
    /// Drop 时等待工作线程退出的超时（毫秒）
    pub join_timeout_ms: u64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            poll_interval_ms: 500,
            scale_factor: 0.001,
            stream_ar_tags: false,
            liveness_budget: 5,
            tag_format: TagFormat::Normal,
            marker_joint_suffix: Some("Head".to_string()),
            marker_poll_divisor: 1,
            command_queue_capacity: 64,
            join_timeout_ms: 2000,
        }
    }
}

impl TrackingConfig {
    pub fn validate(&self) -> Result<(), DriverError> {
        if self.host.trim().is_empty() {
            return Err(DriverError::InvalidConfig("host must not be empty".into()));
        }
        if self.port == 0 {
            return Err(DriverError::InvalidConfig("port must not be 0".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(DriverError::InvalidConfig(
                "poll_interval_ms must be positive".into(),
            ));
        }
        if !self.scale_factor.is_finite() || self.scale_factor <= 0.0 {
            return Err(DriverError::InvalidConfig(format!(
                "scale_factor must be a positive finite number, got {}",
                self.scale_factor
            )));
        }
        if self.liveness_budget == 0 {
            return Err(DriverError::InvalidConfig(
                "liveness_budget must be at least 1".into(),
            ));
        }
        if self.marker_poll_divisor == 0 {
            return Err(DriverError::InvalidConfig(
                "marker_poll_divisor must be at least 1".into(),
            ));
        }
        if self.command_queue_capacity == 0 {
            return Err(DriverError::InvalidConfig(
                "command_queue_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    pub fn stream_mode(&self) -> StreamMode {
        StreamMode::from_ar_tags(self.stream_ar_tags)
    }

    /// 生效的标记关节后缀（空字符串视为禁用）
    pub fn marker_suffix(&self) -> Option<&str> {
        self.marker_joint_suffix
            .as_deref()
            .filter(|suffix| !suffix.is_empty())
    }
}
