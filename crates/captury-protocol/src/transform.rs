//! 标记变换记录与旋转约束编码

use crate::constants::*;
use crate::reader::WireReader;
use crate::DecodeError;

/// 标记关节（例如头部标记）的刚体变换
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MarkerTransform {
    /// 欧拉角（弧度，服务端约定）
    pub rotation_rad: [f32; 3],
    /// 平移（毫米）
    pub translation: [f32; 3],
}

impl MarkerTransform {
    /// 旋转转换为角度，供 [`crate::to_local_rotation`] 使用
    pub fn rotation_deg(&self) -> [f32; 3] {
        self.rotation_rad.map(f32::to_degrees)
    }
}

/// 解码 24 字节标记变换记录
pub fn decode_marker_transform(buf: &[u8]) -> Result<MarkerTransform, DecodeError> {
    let reader = WireReader::new(buf, "transform");
    reader.require(0, TRANSFORM_RECORD_SIZE)?;
    Ok(MarkerTransform {
        rotation_rad: reader.vec3(0)?,
        translation: reader.vec3(12)?,
    })
}

/// 编码旋转约束（服务端欧拉角，度）为 12 字节小端 f32 三元组
pub fn encode_rotation_constraint(euler_deg: [f32; 3]) -> [u8; ROTATION_CONSTRAINT_SIZE] {
    let mut out = [0u8; ROTATION_CONSTRAINT_SIZE];
    for (chunk, value) in out.chunks_exact_mut(4).zip(euler_deg) {
        chunk.copy_from_slice(&value.to_le_bytes());
    }
    out
}

pub fn decode_rotation_constraint(buf: &[u8]) -> Result<[f32; 3], DecodeError> {
    let reader = WireReader::new(buf, "rotation constraint");
    reader.require(0, ROTATION_CONSTRAINT_SIZE)?;
    reader.vec3(0)
}
