//! 连接会话
//!
//! `ConnectionSession` 独占传输句柄，只在工作线程中使用。
//! 状态机：`Disconnected → Connecting → Connected → Streaming`，
//! 任何状态下都可以 `disconnect()` 回到 `Disconnected`。
//!
//! 状态同时镜像到共享的 [`AtomicConnectionState`]，消费端无需加锁即可读取。
//!
//! 请求类操作（`get_actors` 等）只在 `Connected`/`Streaming` 下有效。
//! 在其他状态下调用属于编程错误：无论构建配置如何都返回
//! [`DriverError::ProtocolState`] 并以 `error` 级别记录，请求不会发送给服务端。

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use bytes::Bytes;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use tracing::{debug, error, info, warn};

use captury_protocol::{StreamMode, encode_rotation_constraint};
use captury_transport::{RawBlock, RemoteTransport, TimestampedRecord, TransportError};

use crate::error::DriverError;

/// 连接状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum ConnectionState {
    Disconnected = 0,
    Connecting = 1,
    /// 已连接，尚未开始流传输
    Connected = 2,
    Streaming = 3,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::Disconnected
    }
}

impl ConnectionState {
    /// 请求类操作是否有效
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected | Self::Streaming)
    }

    pub fn is_streaming(self) -> bool {
        self == Self::Streaming
    }
}

/// 连接状态（原子版本，用于线程间共享）
#[derive(Debug, Default)]
pub struct AtomicConnectionState {
    inner: AtomicU8,
}

impl AtomicConnectionState {
    pub fn new(state: ConnectionState) -> Self {
        Self {
            inner: AtomicU8::new(state.into()),
        }
    }

    /// 获取当前状态（无效值按 `Disconnected` 处理）
    pub fn get(&self, ordering: Ordering) -> ConnectionState {
        ConnectionState::try_from(self.inner.load(ordering)).unwrap_or_default()
    }

    pub fn set(&self, state: ConnectionState, ordering: Ordering) {
        self.inner.store(state.into(), ordering);
    }
}

/// 与服务端之间的会话
pub struct ConnectionSession<T: RemoteTransport> {
    transport: T,
    state: ConnectionState,
    mirror: Arc<AtomicConnectionState>,
    /// 本地流传输标志（不向服务端重新查询）
    streaming_mode: Option<StreamMode>,
}

impl<T: RemoteTransport> ConnectionSession<T> {
    pub fn new(transport: T, mirror: Arc<AtomicConnectionState>) -> Self {
        mirror.set(ConnectionState::Disconnected, Ordering::Release);
        Self {
            transport,
            state: ConnectionState::Disconnected,
            mirror,
            streaming_mode: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    pub fn is_streaming(&self) -> bool {
        self.state.is_streaming()
    }

    pub fn streaming_mode(&self) -> Option<StreamMode> {
        self.streaming_mode
    }

    fn set_state(&mut self, state: ConnectionState) {
        self.state = state;
        self.mirror.set(state, Ordering::Release);
    }

    /// 建立连接并立即同步时钟
    ///
    /// 握手失败返回 `Connection`，时钟同步失败（返回 0 或出错）返回 `ClockSync`；
    /// 两种情况都会释放传输句柄并回到 `Disconnected`。
    pub fn connect(&mut self, host: &str, port: u16) -> Result<(), DriverError> {
        if self.state != ConnectionState::Disconnected {
            error!(
                "connect() called in state {:?}, expected Disconnected",
                self.state
            );
            return Err(DriverError::ProtocolState {
                operation: "connect",
                state: self.state,
            });
        }

        self.set_state(ConnectionState::Connecting);

        if let Err(source) = self.transport.connect(host, port) {
            self.rollback();
            return Err(DriverError::Connection {
                host: host.to_string(),
                port,
                source,
            });
        }

        match self.transport.synchronize_time() {
            Ok(0) => {
                let reason = self
                    .transport
                    .last_error_message()
                    .unwrap_or_else(|| "server returned time 0".to_string());
                self.rollback();
                return Err(DriverError::ClockSync(reason));
            },
            Ok(server_time) => {
                info!(
                    "Connected to Captury Live at {}:{} (server time {} us, offset {} us)",
                    host,
                    port,
                    server_time,
                    self.transport.time_offset()
                );
            },
            Err(e) => {
                self.rollback();
                return Err(DriverError::ClockSync(e.to_string()));
            },
        }

        self.set_state(ConnectionState::Connected);
        Ok(())
    }

    fn rollback(&mut self) {
        self.transport.disconnect();
        self.streaming_mode = None;
        self.set_state(ConnectionState::Disconnected);
    }

    /// 开始流传输；本地标志已置位时直接返回
    pub fn start_streaming(&mut self, mode: StreamMode) -> Result<(), DriverError> {
        self.require("start_streaming")?;
        if self.streaming_mode.is_some() {
            debug!("start_streaming: already streaming ({:?})", self.streaming_mode);
            return Ok(());
        }

        self.transport
            .start_streaming(mode)
            .map_err(|e| self.on_transport_error("start_streaming", e))?;
        self.streaming_mode = Some(mode);
        self.set_state(ConnectionState::Streaming);
        info!("Streaming started (mode {:?})", mode);
        Ok(())
    }

    /// 断开连接（任何状态下都有效）；正在流传输时先停止流
    pub fn disconnect(&mut self) {
        if self.state == ConnectionState::Disconnected {
            return;
        }
        if self.streaming_mode.is_some()
            && let Err(e) = self.transport.stop_streaming()
        {
            warn!("Failed to stop streaming before disconnect: {}", e);
        }
        self.rollback();
        info!("Disconnected from Captury Live");
    }

    fn require(&self, operation: &'static str) -> Result<(), DriverError> {
        if self.state.is_connected() {
            return Ok(());
        }
        error!(
            "Operation `{}` invoked in connection state {:?}",
            operation, self.state
        );
        Err(DriverError::ProtocolState {
            operation,
            state: self.state,
        })
    }

    /// 会话失效时回到 `Disconnected`，下个周期由工作线程重连
    fn on_transport_error(&mut self, operation: &'static str, e: TransportError) -> DriverError {
        if e.is_connection_lost() {
            warn!("Connection lost during `{}`: {}", operation, e);
            self.rollback();
        }
        DriverError::Transport(e)
    }

    fn call<R>(
        &mut self,
        operation: &'static str,
        f: impl FnOnce(&mut T) -> Result<R, TransportError>,
    ) -> Result<R, DriverError> {
        self.require(operation)?;
        f(&mut self.transport).map_err(|e| self.on_transport_error(operation, e))
    }

    pub fn get_actors(&mut self) -> Result<RawBlock, DriverError> {
        self.call("get_actors", |t| t.get_actors())
    }

    pub fn get_current_pose(&mut self, actor_id: i32) -> Result<Option<Bytes>, DriverError> {
        self.call("get_current_pose", |t| t.get_current_pose(actor_id))
    }

    pub fn get_current_tags(&mut self) -> Result<Option<Bytes>, DriverError> {
        self.call("get_current_tags", |t| t.get_current_ar_tags())
    }

    pub fn get_cameras(&mut self) -> Result<RawBlock, DriverError> {
        self.call("get_cameras", |t| t.get_cameras())
    }

    pub fn get_marker_transform(
        &mut self,
        actor_id: i32,
        joint_index: usize,
    ) -> Result<Option<TimestampedRecord>, DriverError> {
        self.call("get_marker_transform", |t| {
            t.get_marker_transform(actor_id, joint_index)
        })
    }

    /// 发送旋转约束（服务端欧拉角，度）
    pub fn set_rotation_constraint(
        &mut self,
        actor_id: i32,
        joint_index: usize,
        euler_deg: [f32; 3],
        timestamp: u64,
        weight: f32,
    ) -> Result<(), DriverError> {
        let rotation = encode_rotation_constraint(euler_deg);
        self.call("set_rotation_constraint", |t| {
            t.set_rotation_constraint(actor_id, joint_index, &rotation, timestamp, weight)
        })
    }

    /// 同步后的服务端时间（微秒）
    pub fn server_time(&self) -> u64 {
        self.transport.server_time()
    }

    pub fn last_error_message(&mut self) -> Option<String> {
        self.transport.last_error_message()
    }
}
