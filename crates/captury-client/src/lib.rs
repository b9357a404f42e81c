//! 客户端接口模块
//!
//! 本模块提供逐帧消费跟踪数据的接口，包括：
//! - `PoseSink`：每帧调用一次，分发事件、写入关节绑定、检查标记快照
//! - `TrackingListener`：发现/丢失/标记/相机回调
//! - `ActorBinding`：把演员关节映射到消费端的场景对象
//!
//! # 使用场景
//!
//! 渲染/仿真循环中使用。所有回调都在调用 `update()` 的线程上执行，
//! 不会与后台工作线程并发。

pub mod binding;
mod error;
pub mod listener;
pub mod sink;

pub use binding::{ActorBinding, JointTarget, SharedTransform};
pub use error::ClientError;
pub use listener::TrackingListener;
pub use sink::{BindingFactory, FrameReport, PoseSink};
