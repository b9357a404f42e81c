//! # Captury Transport Layer
//!
//! 与 Captury Live 服务端之间的会话抽象。
//!
//! 会话的字节级分帧由服务端拥有，这里把它当作不透明的 RPC 边界：
//! 每个调用返回服务端给出的原始记录字节，解码交给 `captury-protocol`。
//! 记录中的嵌入指针在返回的缓冲区中表示为相对缓冲区起始位置的字节偏移。

use bytes::Bytes;
use thiserror::Error;

pub use captury_protocol::{ROTATION_CONSTRAINT_SIZE, StreamMode};

#[cfg(any(test, feature = "mock"))]
pub mod mock;

#[cfg(any(test, feature = "mock"))]
pub use mock::{MockServer, MockTransport, RecordedConstraint};

/// 传输层统一错误类型
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Remote Error: {0}")]
    Remote(#[from] RemoteError),
    #[error("Request timeout")]
    Timeout,
    #[error("Not connected")]
    NotConnected,
    #[error("Connection lost")]
    ConnectionLost,
}

impl TransportError {
    /// 会话是否已经失效（需要重新连接）
    pub fn is_connection_lost(&self) -> bool {
        match self {
            TransportError::NotConnected | TransportError::ConnectionLost => true,
            TransportError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::UnexpectedEof
            ),
            TransportError::Remote(e) => e.is_fatal(),
            TransportError::Timeout => false,
        }
    }
}

/// 服务端错误的结构化分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteErrorKind {
    Unknown,
    Refused,
    HandshakeFailed,
    Rejected,
    InvalidResponse,
    SessionClosed,
}

/// 结构化服务端错误
#[derive(Error, Debug, Clone)]
#[error("{kind:?}: {message}")]
pub struct RemoteError {
    pub kind: RemoteErrorKind,
    pub message: String,
}

impl RemoteError {
    pub fn new(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self.kind, RemoteErrorKind::SessionClosed)
    }
}

impl From<String> for RemoteError {
    fn from(message: String) -> Self {
        Self::new(RemoteErrorKind::Unknown, message)
    }
}

impl From<&str> for RemoteError {
    fn from(message: &str) -> Self {
        Self::new(RemoteErrorKind::Unknown, message)
    }
}

/// 带记录数量的原始记录数组（`get_actors` / `get_cameras`）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawBlock {
    pub count: i32,
    pub data: Bytes,
}

impl RawBlock {
    pub fn empty() -> Self {
        Self::default()
    }

    /// 记录数为 0；负数不算空，交给解码层报错
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// 标记关节的变换记录（附服务端时间戳，微秒）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampedRecord {
    pub timestamp: u64,
    pub data: Bytes,
}

/// 远程会话
///
/// 句柄由后台工作线程独占，不会在线程间共享，因此方法都是 `&mut self`。
/// 返回 `Ok(None)` 表示服务端当前没有数据（不是错误），
/// 具体原因可以通过 [`RemoteTransport::last_error_message`] 查询。
pub trait RemoteTransport: Send {
    fn connect(&mut self, host: &str, port: u16) -> Result<(), TransportError>;

    /// 释放会话；任何状态下调用都是安全的
    fn disconnect(&mut self);

    /// 同步时钟，返回同步后的服务端时间（微秒）；0 表示同步失败
    fn synchronize_time(&mut self) -> Result<u64, TransportError>;

    /// 服务端时钟相对本地时钟的偏移（微秒）
    fn time_offset(&self) -> i64;

    /// 当前服务端时间（微秒）
    fn server_time(&self) -> u64;

    fn start_streaming(&mut self, mode: StreamMode) -> Result<(), TransportError>;

    fn stop_streaming(&mut self) -> Result<(), TransportError>;

    fn get_actors(&mut self) -> Result<RawBlock, TransportError>;

    fn get_current_pose(&mut self, actor_id: i32) -> Result<Option<Bytes>, TransportError>;

    fn get_current_ar_tags(&mut self) -> Result<Option<Bytes>, TransportError>;

    fn get_cameras(&mut self) -> Result<RawBlock, TransportError>;

    fn get_marker_transform(
        &mut self,
        actor_id: i32,
        joint_index: usize,
    ) -> Result<Option<TimestampedRecord>, TransportError>;

    fn set_rotation_constraint(
        &mut self,
        actor_id: i32,
        joint_index: usize,
        rotation: &[u8; ROTATION_CONSTRAINT_SIZE],
        timestamp: u64,
        weight: f32,
    ) -> Result<(), TransportError>;

    /// 最近一次失败调用的服务端错误信息
    fn last_error_message(&mut self) -> Option<String> {
        None
    }
}

impl<T: RemoteTransport + ?Sized> RemoteTransport for Box<T> {
    fn connect(&mut self, host: &str, port: u16) -> Result<(), TransportError> {
        (**self).connect(host, port)
    }

    fn disconnect(&mut self) {
        (**self).disconnect()
    }

    fn synchronize_time(&mut self) -> Result<u64, TransportError> {
        (**self).synchronize_time()
    }

    fn time_offset(&self) -> i64 {
        (**self).time_offset()
    }

    fn server_time(&self) -> u64 {
        (**self).server_time()
    }

    fn start_streaming(&mut self, mode: StreamMode) -> Result<(), TransportError> {
        (**self).start_streaming(mode)
    }

    fn stop_streaming(&mut self) -> Result<(), TransportError> {
        (**self).stop_streaming()
    }

    fn get_actors(&mut self) -> Result<RawBlock, TransportError> {
        (**self).get_actors()
    }

    fn get_current_pose(&mut self, actor_id: i32) -> Result<Option<Bytes>, TransportError> {
        (**self).get_current_pose(actor_id)
    }

    fn get_current_ar_tags(&mut self) -> Result<Option<Bytes>, TransportError> {
        (**self).get_current_ar_tags()
    }

    fn get_cameras(&mut self) -> Result<RawBlock, TransportError> {
        (**self).get_cameras()
    }

    fn get_marker_transform(
        &mut self,
        actor_id: i32,
        joint_index: usize,
    ) -> Result<Option<TimestampedRecord>, TransportError> {
        (**self).get_marker_transform(actor_id, joint_index)
    }

    fn set_rotation_constraint(
        &mut self,
        actor_id: i32,
        joint_index: usize,
        rotation: &[u8; ROTATION_CONSTRAINT_SIZE],
        timestamp: u64,
        weight: f32,
    ) -> Result<(), TransportError> {
        (**self).set_rotation_constraint(actor_id, joint_index, rotation, timestamp, weight)
    }

    fn last_error_message(&mut self) -> Option<String> {
        (**self).last_error_message()
    }
}
