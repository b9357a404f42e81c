//! 驱动层错误类型定义

use captury_protocol::DecodeError;
use captury_transport::TransportError;
use thiserror::Error;

use crate::session::ConnectionState;

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// 握手失败（可恢复，下个轮询周期重试）
    #[error("Connection to {host}:{port} failed: {source}")]
    Connection {
        host: String,
        port: u16,
        #[source]
        source: TransportError,
    },

    /// 时钟同步失败（连接已回滚）
    #[error("Clock synchronization failed: {0}")]
    ClockSync(String),

    /// 传输层错误
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// 记录解码错误
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// 在无效的连接状态下调用操作（编程错误，不会发送给服务端）
    #[error("Operation `{operation}` is invalid in connection state {state:?}")]
    ProtocolState {
        operation: &'static str,
        state: ConnectionState,
    },

    /// 配置无效
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// 命令通道已关闭（工作线程退出）
    #[error("Command channel closed")]
    ChannelClosed,

    /// 命令通道已满
    #[error("Command channel full")]
    ChannelFull,

    /// 工作线程错误
    #[error("Worker thread error: {0}")]
    IoThread(String),
}

impl DriverError {
    /// 是否由会话失效引起（工作线程会在下个周期重连）
    pub fn is_connection_lost(&self) -> bool {
        match self {
            DriverError::Transport(e) => e.is_connection_lost(),
            DriverError::Connection { .. } | DriverError::ClockSync(_) => true,
            _ => false,
        }
    }
}
