//! 姿态记录
//!
//! 24 字节记录头 + `num_values` 个 f32（每个关节 6 个值：`px py pz rx ry rz`）。

use crate::actor::Actor;
use crate::constants::*;
use crate::reader::WireReader;
use crate::DecodeError;

/// 单个关节的服务端姿态（位置：毫米，旋转：欧拉角度）
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct JointPose {
    pub position: [f32; 3],
    pub rotation: [f32; 3],
}

/// 单个演员的一帧姿态
///
/// `joints` 与演员的关节序列按索引一一对应。
#[derive(Debug, Clone, PartialEq)]
pub struct PoseFrame {
    pub actor_id: i32,
    /// 服务端时钟（微秒），需要结合时钟同步偏移才能与本地时间比较
    pub timestamp: i64,
    pub joints: Vec<JointPose>,
}

/// 解码姿态记录
///
/// `num_values` 必须恰好等于 `6 * expected_joint_count`，否则返回 `ValueCountMismatch`。
pub fn decode_pose_frame(buf: &[u8], expected_joint_count: usize) -> Result<PoseFrame, DecodeError> {
    let reader = WireReader::new(buf, "pose");
    reader.require(0, POSE_HEADER_SIZE)?;

    let actor_id = reader.i32(0)?;
    let timestamp = reader.i64(4)?;
    let num_values = reader.i32(12)?;
    let values_offset = reader.offset_field(16)?;

    let actual = usize::try_from(num_values).map_err(|_| DecodeError::InvalidCount {
        field: "pose value",
        value: num_values.into(),
    })?;
    let expected = expected_joint_count
        .checked_mul(VALUES_PER_JOINT)
        .ok_or(DecodeError::InvalidCount {
            field: "joint",
            value: i64::try_from(expected_joint_count).unwrap_or(i64::MAX),
        })?;
    if actual != expected {
        return Err(DecodeError::ValueCountMismatch { expected, actual });
    }

    let values = reader.bytes(values_offset, actual * 4)?;
    let joints = values
        .chunks_exact(VALUES_PER_JOINT * 4)
        .map(|chunk| {
            let mut v = [0f32; VALUES_PER_JOINT];
            for (value, raw) in v.iter_mut().zip(chunk.chunks_exact(4)) {
                *value = f32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
            }
            JointPose {
                position: [v[0], v[1], v[2]],
                rotation: [v[3], v[4], v[5]],
            }
        })
        .collect();

    Ok(PoseFrame {
        actor_id,
        timestamp,
        joints,
    })
}

/// 解码属于 `actor` 的姿态记录，同时校验记录中的演员 id
pub fn decode_actor_pose(buf: &[u8], actor: &Actor) -> Result<PoseFrame, DecodeError> {
    let frame = decode_pose_frame(buf, actor.joint_count())?;
    if frame.actor_id != actor.id() {
        return Err(DecodeError::ActorMismatch {
            expected: actor.id(),
            actual: frame.actor_id,
        });
    }
    Ok(frame)
}
