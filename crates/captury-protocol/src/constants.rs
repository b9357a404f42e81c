//! 协议常量定义
//!
//! 记录尺寸与字段偏移量来自服务端 C 结构体的固定布局，属于外部契约，不可随意调整。

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// 关节记录：`name[24]`, `parent: i32`, `offset: 3×f32`, `orientation: 3×f32`
pub const JOINT_RECORD_SIZE: usize = 52;
pub const JOINT_NAME_LEN: usize = 24;

/// 演员记录：`name[32]`, `id: i32`, `num_joints: i32`, `joints: u64`
pub const ACTOR_RECORD_SIZE: usize = 48;
/// 演员记录在数组中的步长（包含 16 字节隐式填充）
pub const ACTOR_RECORD_STRIDE: usize = ACTOR_RECORD_SIZE + 16;
pub const ACTOR_NAME_LEN: usize = 32;

/// 姿态记录头：`actor: i32`, `timestamp: i64`, `num_values: i32`, `values: u64`
pub const POSE_HEADER_SIZE: usize = 24;
/// 每个关节的姿态值数量（3 位置 + 3 旋转）
pub const VALUES_PER_JOINT: usize = 6;

/// AR 标记记录：`id: i32`, `position: 3×f32`, `normal/orientation: 3×f32`
pub const AR_TAG_RECORD_SIZE: usize = 28;
/// AR 标记序列结束哨兵
pub const AR_TAG_SENTINEL: i32 = -1;
/// 单次读取的 AR 标记上限（防止畸形流无限读取）
pub const MAX_AR_TAGS: usize = 100;

/// 相机记录（含 192 字节的隐式填充）
pub const CAMERA_RECORD_SIZE: usize = 300;
pub const CAMERA_NAME_LEN: usize = 32;
pub const CAMERA_DISTORTION_MODEL_LEN: usize = 16;
pub const CAMERA_DISTORTION_LEN: usize = 30;
pub const CAMERA_EXTRINSIC_LEN: usize = 12;
pub const CAMERA_INTRINSIC_LEN: usize = 9;

/// 标记变换记录：`rx ry rz`（弧度）, `tx ty tz`（毫米）
pub const TRANSFORM_RECORD_SIZE: usize = 24;

/// 旋转约束记录：3×f32 欧拉角（度）
pub const ROTATION_CONSTRAINT_SIZE: usize = 12;

/// 服务端默认端口
pub const DEFAULT_PORT: u16 = 2101;

/// 服务端流模式
///
/// 位 0 表示姿态，位 2 表示 AR 标记。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u32)]
pub enum StreamMode {
    /// 仅姿态
    Poses = 1,
    /// 姿态 + AR 标记
    PosesWithArTags = 5,
}

impl StreamMode {
    /// 根据是否需要 AR 标记选择流模式
    pub fn from_ar_tags(stream_ar_tags: bool) -> Self {
        if stream_ar_tags {
            Self::PosesWithArTags
        } else {
            Self::Poses
        }
    }

    pub fn includes_ar_tags(self) -> bool {
        u32::from(self) & 0x4 != 0
    }
}
