//! Captury SDK - Captury Live 无标记动作捕捉 Rust SDK
//!
//! 从 Captury Live 服务端持续获取骨架、姿态、AR 标记和相机标定，
//! 转换到本地坐标系后交给逐帧运行的消费端。
//!
//! # 架构设计
//!
//! 本 SDK 采用分层架构，从底层到高层：
//!
//! - **协议层** (`protocol`): 定长二进制记录解码、坐标系转换
//! - **传输层** (`transport`): 远程会话抽象（`RemoteTransport`），`mock` feature 提供模拟服务端
//! - **驱动层** (`driver`): 会话状态机、演员注册表、后台轮询线程
//! - **客户端层** (`client`): 逐帧回调、关节绑定、约束反馈
//!
//! # 快速开始
//!
//! ```rust
//! use captury_sdk::prelude::*;
//! ```
//!
//! ```no_run
//! # #[cfg(feature = "mock")]
//! # {
//! use captury_sdk::prelude::*;
//! use captury_sdk::transport::MockServer;
//!
//! captury_sdk::init_logger();
//!
//! let server = MockServer::new();
//! let tracker = TrackerBuilder::new()
//!     .poll_interval_ms(100)
//!     .build(server.transport())
//!     .unwrap();
//! let mut sink = PoseSink::from_tracker(&tracker);
//!
//! loop {
//!     let report = sink.update();
//!     if report.events > 0 {
//!         println!("{:?}", report);
//!     }
//!     std::thread::sleep(std::time::Duration::from_millis(16));
//! }
//! # }
//! ```

mod logger;
pub mod prelude;

pub mod protocol {
    //! 协议层（记录解码、坐标转换）
    pub use captury_protocol::*;
}

pub mod transport {
    //! 传输层（远程会话抽象）
    pub use captury_transport::*;
}

pub mod driver {
    //! 驱动层（会话、注册表、后台线程）
    pub use captury_driver::*;
}

pub mod client {
    //! 客户端层（逐帧消费）
    pub use captury_client::*;
}

pub use logger::{init_logger, init_logger_with};

// --- 常用类型 ---
pub use captury_client::{ActorBinding, ClientError, FrameReport, PoseSink, TrackingListener};
pub use captury_driver::{DriverError, Tracker, TrackerBuilder, TrackingConfig};
pub use captury_protocol::{Actor, CoordinateAdapter, DecodeError, LocalTransform};
pub use captury_transport::{RemoteTransport, TransportError};
