//! 逐帧回调
//!
//! 所有回调都在调用 [`PoseSink::update`](crate::PoseSink::update) 的线程上同步执行，
//! 按事件发出顺序调用，每个事件每帧最多一次。

use nalgebra::{UnitQuaternion, Vector3};

use captury_protocol::{Actor, LocalTag};

/// 跟踪事件监听器（所有方法默认为空操作）
pub trait TrackingListener {
    fn on_actor_found(&mut self, _actor: &Actor) {}

    fn on_actor_lost(&mut self, _actor: &Actor) {}

    /// 新的非空 AR 标记快照
    fn on_tags_detected(&mut self, _tags: &[LocalTag]) {}

    /// 相机标定更新（本地坐标系）
    fn on_cameras_changed(
        &mut self,
        _positions: &[Vector3<f64>],
        _orientations: &[UnitQuaternion<f64>],
    ) {
    }

    /// 连续若干帧没有新的标记快照，可以清除调试可视化
    fn on_tags_stale(&mut self) {}
}
