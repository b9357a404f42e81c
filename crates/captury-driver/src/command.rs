//! 工作线程命令
//!
//! 消费端不直接持有会话，需要与服务端交互的请求通过有界命令队列交给工作线程执行。
//! 工作线程在睡眠期间也会立即处理到达的命令。

/// 发给工作线程的命令
#[derive(Debug, Clone, PartialEq)]
pub enum TrackerCommand {
    /// 发送旋转约束
    ///
    /// `rotation` 已经转换为服务端欧拉角（度）。
    /// 工作线程发送时使用同步后的服务端时间作为时间戳，权重为 1.0。
    SetRotationConstraint {
        actor_id: i32,
        joint_index: usize,
        rotation: [f32; 3],
    },
    /// 重新读取相机标定并发出 `CamerasChanged` 事件
    RefreshCameras,
}

impl TrackerCommand {
    /// 命令名（用于日志）
    pub fn name(&self) -> &'static str {
        match self {
            TrackerCommand::SetRotationConstraint { .. } => "set_rotation_constraint",
            TrackerCommand::RefreshCameras => "refresh_cameras",
        }
    }
}
