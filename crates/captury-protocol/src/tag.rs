//! AR 标记（fiducial tag）记录
//!
//! 28 字节定长记录序列，以 `id == -1` 结束，最多读取 100 条。

use crate::constants::*;
use crate::reader::WireReader;
use crate::DecodeError;

/// AR 标记方向三元组的协议版本
///
/// 旧版本服务端发送表面法向量，新版本发送欧拉角。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum TagFormat {
    #[default]
    Normal,
    Euler,
}

/// 标记方向（按协议版本解释）
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TagOrientation {
    /// 表面法向量（服务端坐标系）
    Normal([f32; 3]),
    /// 欧拉角（服务端约定，度）
    Euler([f32; 3]),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FiducialTag {
    pub id: i32,
    pub position: [f32; 3],
    pub orientation: TagOrientation,
}

/// 解码 AR 标记序列
///
/// 遇到哨兵即停止；读满 [`MAX_AR_TAGS`] 条仍未遇到哨兵时返回 `MissingSentinel`，
/// 缓冲区提前结束时返回 `Truncated`。
pub fn decode_fiducial_tags(buf: &[u8], format: TagFormat) -> Result<Vec<FiducialTag>, DecodeError> {
    let reader = WireReader::new(buf, "ar tag");
    let mut tags = Vec::new();

    for index in 0..MAX_AR_TAGS {
        let offset = index * AR_TAG_RECORD_SIZE;
        let id = reader.i32(offset)?;
        if id == AR_TAG_SENTINEL {
            return Ok(tags);
        }

        reader.require(offset, AR_TAG_RECORD_SIZE)?;
        let triple = reader.vec3(offset + 16)?;
        tags.push(FiducialTag {
            id,
            position: reader.vec3(offset + 4)?,
            orientation: match format {
                TagFormat::Normal => TagOrientation::Normal(triple),
                TagFormat::Euler => TagOrientation::Euler(triple),
            },
        });
    }

    Err(DecodeError::MissingSentinel { limit: MAX_AR_TAGS })
}

#[cfg(test)]
pub(crate) mod test_util {
    use super::*;

    pub fn encode_tags(tags: &[(i32, [f32; 3], [f32; 3])]) -> Vec<u8> {
        let mut out = Vec::with_capacity((tags.len() + 1) * AR_TAG_RECORD_SIZE);
        for (id, position, triple) in tags {
            out.extend_from_slice(&id.to_le_bytes());
            for v in position.iter().chain(triple.iter()) {
                out.extend_from_slice(&v.to_le_bytes());
            }
        }
        out.extend_from_slice(&AR_TAG_SENTINEL.to_le_bytes());
        out.resize(out.len() + AR_TAG_RECORD_SIZE - 4, 0);
        out
    }
}
