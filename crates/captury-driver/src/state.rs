//! 共享状态
//!
//! 工作线程与消费端之间的交接区：
//! - 演员注册表、逐演员姿态槽、事件队列：同一把 `parking_lot::Mutex`（[`ActorRegistry`]）
//! - AR 标记快照、相机集合：`ArcSwap`，整体替换，读取无锁
//! - 连接状态、指标：原子变量
//!
//! 锁只用于拷入/拷出数据，持锁期间不做任何网络 I/O。

use std::sync::Arc;
use std::sync::atomic::Ordering;

use arc_swap::ArcSwap;
use nalgebra::{UnitQuaternion, Vector3};
use parking_lot::Mutex;

use captury_protocol::{Actor, CameraDescriptor, LocalCamera, LocalTag, LocalTransform};

use crate::metrics::TrackingMetrics;
use crate::registry::ActorRegistry;
use crate::session::{AtomicConnectionState, ConnectionState};

/// 单个演员最近一次的姿态（本地坐标系）
#[derive(Debug, Clone, PartialEq)]
pub struct PoseSnapshot {
    pub actor_id: i32,
    /// 服务端时间戳（微秒）
    pub timestamp: i64,
    /// 发布序号（每个演员单调递增）
    pub sequence: u64,
    /// 按关节顺序排列
    pub joints: Vec<LocalTransform>,
}

/// AR 标记快照
///
/// 每次发布整体替换，不与上一次合并。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagSnapshot {
    /// 发布序号，0 表示从未发布
    pub sequence: u64,
    pub tags: Vec<LocalTag>,
}

impl TagSnapshot {
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

/// 相机标定集合
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CameraSet {
    /// 原始服务端描述
    pub cameras: Vec<CameraDescriptor>,
    /// 转换到本地坐标系后的位置与朝向
    pub local: Vec<LocalCamera>,
}

impl CameraSet {
    pub fn len(&self) -> usize {
        self.cameras.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cameras.is_empty()
    }

    pub fn positions(&self) -> Vec<Vector3<f64>> {
        self.local.iter().map(|c| c.position).collect()
    }

    pub fn orientations(&self) -> Vec<UnitQuaternion<f64>> {
        self.local.iter().map(|c| c.orientation).collect()
    }
}

/// 标记关节的变换状态
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerState {
    /// 服务端时间戳（微秒）
    pub timestamp: u64,
    pub transform: LocalTransform,
    /// 消费端是否已经取走
    pub consumed: bool,
}

/// 工作线程发出、消费端按 FIFO 顺序处理的事件
#[derive(Debug, Clone)]
pub enum TrackingEvent {
    ActorFound(Arc<Actor>),
    ActorLost(Arc<Actor>),
    CamerasChanged(Arc<CameraSet>),
}

impl TrackingEvent {
    pub fn actor_id(&self) -> Option<i32> {
        match self {
            TrackingEvent::ActorFound(actor) | TrackingEvent::ActorLost(actor) => Some(actor.id()),
            TrackingEvent::CamerasChanged(_) => None,
        }
    }
}

/// 工作线程与消费端共享的上下文
pub struct TrackingContext {
    /// 注册表 + 姿态槽 + 事件队列
    pub registry: Mutex<ActorRegistry>,
    pub tags: ArcSwap<TagSnapshot>,
    pub cameras: ArcSwap<CameraSet>,
    pub connection: Arc<AtomicConnectionState>,
    pub metrics: TrackingMetrics,
}

impl TrackingContext {
    pub fn new(liveness_budget: u32) -> Self {
        Self {
            registry: Mutex::new(ActorRegistry::new(liveness_budget)),
            tags: ArcSwap::from_pointee(TagSnapshot::default()),
            cameras: ArcSwap::from_pointee(CameraSet::default()),
            connection: Arc::new(AtomicConnectionState::default()),
            metrics: TrackingMetrics::new(),
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.get(Ordering::Acquire)
    }

    /// 当前已注册的演员（拷贝出来，不暴露内部容器）
    pub fn actors(&self) -> Vec<Arc<Actor>> {
        self.registry.lock().actors()
    }

    pub fn actor(&self, actor_id: i32) -> Option<Arc<Actor>> {
        self.registry.lock().get(actor_id)
    }

    pub fn latest_pose(&self, actor_id: i32) -> Option<Arc<PoseSnapshot>> {
        self.registry.lock().latest_pose(actor_id)
    }

    pub fn latest_tags(&self) -> Arc<TagSnapshot> {
        self.tags.load_full()
    }

    pub fn latest_cameras(&self) -> Arc<CameraSet> {
        self.cameras.load_full()
    }

    /// 取出所有待处理事件（FIFO）
    pub fn drain_events(&self) -> Vec<TrackingEvent> {
        self.registry.lock().drain_events()
    }

    /// 取走未消费的标记变换，之后同一时间戳的变换不会再次返回
    pub fn take_marker_transform(&self, actor_id: i32) -> Option<LocalTransform> {
        self.registry.lock().take_marker(actor_id)
    }
}

impl std::fmt::Debug for TrackingContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackingContext")
            .field("connection", &self.connection_state())
            .field("actors", &self.registry.lock().len())
            .field("tag_sequence", &self.tags.load().sequence)
            .field("cameras", &self.cameras.load().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use captury_protocol::LocalTagOrientation;

    #[test]
    fn test_new_context_is_empty() {
        let ctx = TrackingContext::new(5);
        assert_eq!(ctx.connection_state(), ConnectionState::Disconnected);
        assert!(ctx.actors().is_empty());
        assert_eq!(ctx.latest_tags().sequence, 0);
        assert!(ctx.latest_cameras().is_empty());
        assert!(ctx.drain_events().is_empty());
    }

    #[test]
    fn test_tag_snapshot_is_replaced() {
        let ctx = TrackingContext::new(5);
        let tag = |id| LocalTag {
            id,
            position: Vector3::zeros(),
            orientation: LocalTagOrientation::Normal(Vector3::y()),
        };
        ctx.tags.store(Arc::new(TagSnapshot {
            sequence: 1,
            tags: vec![tag(1), tag(2)],
        }));
        ctx.tags.store(Arc::new(TagSnapshot {
            sequence: 2,
            tags: vec![tag(7)],
        }));

        let latest = ctx.latest_tags();
        assert_eq!(latest.sequence, 2);
        let ids: Vec<i32> = latest.tags.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![7]);
    }

    #[test]
    fn test_camera_set_accessors() {
        let set = CameraSet {
            cameras: vec![CameraDescriptor::default()],
            local: vec![LocalCamera {
                id: 0,
                name: "cam0".into(),
                position: Vector3::new(-1.0, 2.0, 3.0),
                orientation: UnitQuaternion::identity(),
            }],
        };
        assert_eq!(set.len(), 1);
        assert_eq!(set.positions(), vec![Vector3::new(-1.0, 2.0, 3.0)]);
        assert_eq!(set.orientations().len(), 1);
    }
}
