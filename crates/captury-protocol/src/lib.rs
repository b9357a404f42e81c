//! # Captury Protocol
//!
//! Captury Live 远程协议的记录解码与坐标转换（无 IO、无状态）
//!
//! ## 模块
//!
//! - `constants`: 记录尺寸、偏移量、流模式等协议常量
//! - `actor`: 演员（骨架）与关节描述记录
//! - `pose`: 逐帧姿态记录
//! - `tag`: AR 标记（fiducial tag）记录
//! - `camera`: 相机描述记录
//! - `transform`: 标记变换记录与旋转约束编码
//! - `coords`: 服务端右手系 ↔ 本地左手系坐标转换
//!
//! ## 字节序
//!
//! 服务端记录是 C 结构体的原样内存布局（`Pack = 1`，小端字节序）。
//! 原生布局中的指针字段在这里统一解释为相对于缓冲区起始位置的 `u64` 字节偏移，
//! 每次读取都做边界检查，绝不越过字段声明的固定宽度。

pub mod actor;
pub mod camera;
pub mod constants;
pub mod coords;
pub mod pose;
mod reader;
pub mod tag;
pub mod transform;

// 重新导出常用类型
pub use actor::*;
pub use camera::*;
pub use constants::*;
pub use coords::*;
pub use pose::*;
pub use tag::*;
pub use transform::*;

use thiserror::Error;

/// 记录解码错误
///
/// 所有解码函数在输入畸形时都会返回此错误，而不是静默截断或补零。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error(
        "{record} record truncated: need {needed} bytes at offset {offset}, buffer has {available}"
    )]
    Truncated {
        record: &'static str,
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("Invalid {field} count: {value}")]
    InvalidCount { field: &'static str, value: i64 },

    #[error("Pose value count mismatch: expected {expected}, got {actual}")]
    ValueCountMismatch { expected: usize, actual: usize },

    #[error("Pose belongs to actor {actual}, expected actor {expected}")]
    ActorMismatch { expected: i32, actual: i32 },

    #[error("Joint {joint} references invalid parent {parent}")]
    InvalidParent { joint: usize, parent: i32 },

    #[error("Duplicate joint name {0:?}")]
    DuplicateJointName(String),

    #[error("No AR tag sentinel within {limit} records")]
    MissingSentinel { limit: usize },
}

/// 小端字节序转 f32
pub fn bytes_to_f32_le(bytes: [u8; 4]) -> f32 {
    f32::from_le_bytes(bytes)
}

/// f32 转小端字节序
pub fn f32_to_bytes_le(value: f32) -> [u8; 4] {
    value.to_le_bytes()
}
