//! Prelude - 常用类型的便捷导入
//!
//! ```rust
//! use captury_sdk::prelude::*;
//! ```

// 客户端层（推荐使用）
pub use captury_client::{
    ActorBinding, FrameReport, JointTarget, PoseSink, SharedTransform, TrackingListener,
};

// 驱动层
pub use captury_driver::{
    ConnectionState, PoseSnapshot, TagSnapshot, Tracker, TrackerBuilder, TrackerCommand,
    TrackingConfig, TrackingContext, TrackingEvent,
};

// 协议层
pub use captury_protocol::{
    Actor, CoordinateAdapter, Joint, LocalCamera, LocalTag, LocalTagOrientation, LocalTransform,
    StreamMode, TagFormat,
};

// 传输层
pub use captury_transport::RemoteTransport;

// 错误类型
pub use captury_client::ClientError;
pub use captury_driver::DriverError;
pub use captury_protocol::DecodeError;
pub use captury_transport::TransportError;
