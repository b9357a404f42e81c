//! 驱动层模块
//!
//! 本模块管理与 Captury Live 服务端之间的会话与后台跟踪，包括：
//! - 连接会话状态机（连接、时钟同步、流传输、断开）
//! - 演员注册表（发现、存活计数、丢失事件）
//! - 后台工作线程（固定间隔轮询、可中断睡眠、命令队列）
//! - 共享状态（注册表加锁，标记/相机快照 ArcSwap 无锁读取）
//!
//! # 使用场景
//!
//! 需要直接读取最新姿态快照或自行处理事件时使用本模块。
//! 逐帧回调和关节绑定请使用 `captury-client` 提供的 `PoseSink`。

mod builder;
pub mod command;
pub mod config;
mod error;
pub mod metrics;
pub mod registry;
pub mod session;
pub mod state;
mod tracker;
pub mod worker;

pub use builder::TrackerBuilder;
pub use command::TrackerCommand;
pub use config::TrackingConfig;
pub use error::DriverError;
pub use metrics::{MetricsSnapshot, TrackingMetrics};
pub use registry::{ActorRegistry, MARKER_FRESHNESS_US, TrackedActor};
pub use session::{AtomicConnectionState, ConnectionSession, ConnectionState};
pub use state::*;
pub use tracker::{CommandHandle, Tracker};
pub use worker::{CycleReport, TrackingWorker};
