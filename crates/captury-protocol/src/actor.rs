//! 演员（骨架）与关节描述记录
//!
//! 演员记录 48 字节，数组步长 64 字节；`joints` 字段是指向连续关节记录数组的偏移量。

use std::collections::HashMap;

use crate::constants::*;
use crate::reader::WireReader;
use crate::DecodeError;

/// 关节描述（创建后不可变）
#[derive(Debug, Clone, PartialEq)]
pub struct Joint {
    pub name: String,
    /// 父关节索引，`None` 表示根关节。总是小于自身索引。
    pub parent: Option<usize>,
    /// 静止姿态下相对父关节的偏移（服务端坐标系，毫米）
    pub rest_offset: [f32; 3],
    /// 静止姿态朝向（服务端欧拉角，度）
    pub rest_orientation: [f32; 3],
}

/// 被跟踪的演员
///
/// 关节序列在构造时固定，之后只能通过只读访问器读取；
/// 构造时同时建立 `name → index` 索引，之后按名字查找都是精确查找。
#[derive(Debug, Clone, PartialEq)]
pub struct Actor {
    id: i32,
    name: String,
    joints: Vec<Joint>,
    name_index: HashMap<String, usize>,
}

impl Actor {
    /// 构造演员并校验关节拓扑
    ///
    /// 父关节必须指向更小的索引（不允许前向或自引用），关节名在演员内必须唯一。
    pub fn new(id: i32, name: impl Into<String>, joints: Vec<Joint>) -> Result<Self, DecodeError> {
        let mut name_index = HashMap::with_capacity(joints.len());
        for (index, joint) in joints.iter().enumerate() {
            match joint.parent {
                Some(parent) if parent >= index => {
                    return Err(DecodeError::InvalidParent {
                        joint: index,
                        parent: i32::try_from(parent).unwrap_or(i32::MAX),
                    });
                },
                _ => {},
            }
            if name_index.insert(joint.name.clone(), index).is_some() {
                return Err(DecodeError::DuplicateJointName(joint.name.clone()));
            }
        }

        Ok(Self {
            id,
            name: name.into(),
            joints,
            name_index,
        })
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn joints(&self) -> &[Joint] {
        &self.joints
    }

    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    /// 按关节名精确查找索引
    pub fn joint_index(&self, name: &str) -> Option<usize> {
        self.name_index.get(name).copied()
    }

    /// 查找第一个名字以 `suffix` 结尾的关节（例如头部标记关节 `"Head"`）
    ///
    /// 只在发现演员时调用一次，结果由调用方缓存。
    pub fn find_joint_by_suffix(&self, suffix: &str) -> Option<usize> {
        self.joints.iter().position(|j| j.name.ends_with(suffix))
    }
}

fn decode_joint(reader: &WireReader<'_>, offset: usize, index: usize) -> Result<Joint, DecodeError> {
    reader.require(offset, JOINT_RECORD_SIZE)?;
    let name = reader.fixed_str(offset, JOINT_NAME_LEN)?;
    let parent_raw = reader.i32(offset + 24)?;
    let parent = if parent_raw < 0 {
        None
    } else {
        let parent = parent_raw as usize;
        if parent >= index {
            return Err(DecodeError::InvalidParent {
                joint: index,
                parent: parent_raw,
            });
        }
        Some(parent)
    };

    Ok(Joint {
        name,
        parent,
        rest_offset: reader.vec3(offset + 28)?,
        rest_orientation: reader.vec3(offset + 40)?,
    })
}

/// 解码位于 `record_offset` 处的演员记录（含其关节数组）
pub fn decode_actor_at(buf: &[u8], record_offset: usize) -> Result<Actor, DecodeError> {
    let reader = WireReader::new(buf, "actor");
    reader.require(record_offset, ACTOR_RECORD_SIZE)?;

    let name = reader.fixed_str(record_offset, ACTOR_NAME_LEN)?;
    let id = reader.i32(record_offset + 32)?;
    let num_joints = reader.i32(record_offset + 36)?;
    let joints_offset = reader.offset_field(record_offset + 40)?;

    let count = usize::try_from(num_joints).map_err(|_| DecodeError::InvalidCount {
        field: "joint",
        value: num_joints.into(),
    })?;

    // 先确认整个关节数组都在缓冲区内，再分配
    let joint_reader = WireReader::new(buf, "joint");
    let span = count
        .checked_mul(JOINT_RECORD_SIZE)
        .ok_or(DecodeError::InvalidCount {
            field: "joint",
            value: num_joints.into(),
        })?;
    joint_reader.require(joints_offset, span)?;

    let joints = (0..count)
        .map(|i| decode_joint(&joint_reader, joints_offset + i * JOINT_RECORD_SIZE, i))
        .collect::<Result<Vec<_>, _>>()?;

    Actor::new(id, name, joints)
}

/// 解码缓冲区起始处的演员描述记录
pub fn decode_actor_descriptor(buf: &[u8]) -> Result<Actor, DecodeError> {
    decode_actor_at(buf, 0)
}

/// 演员记录数组中的一条记录（尚未解码关节）
#[derive(Debug, Clone, Copy)]
pub struct ActorRecord<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> ActorRecord<'a> {
    /// 只读取 id 字段，用于跳过已知演员的完整解码
    pub fn id(&self) -> Result<i32, DecodeError> {
        WireReader::new(self.buf, "actor").i32(self.offset + 32)
    }

    pub fn decode(&self) -> Result<Actor, DecodeError> {
        decode_actor_at(self.buf, self.offset)
    }
}

/// 按 64 字节步长遍历 `get_actors` 返回的演员记录数组
#[derive(Debug, Clone)]
pub struct ActorRecords<'a> {
    buf: &'a [u8],
    count: usize,
    next: usize,
}

impl<'a> ActorRecords<'a> {
    /// 校验数组尺寸后构造迭代器
    ///
    /// 最后一条记录只需要 48 字节（尾部填充可以缺失）。
    pub fn new(buf: &'a [u8], count: i32) -> Result<Self, DecodeError> {
        let count = usize::try_from(count).map_err(|_| DecodeError::InvalidCount {
            field: "actor",
            value: count.into(),
        })?;
        if count > 0 {
            let last = (count - 1)
                .checked_mul(ACTOR_RECORD_STRIDE)
                .ok_or(DecodeError::InvalidCount {
                    field: "actor",
                    value: count as i64,
                })?;
            WireReader::new(buf, "actor").require(last, ACTOR_RECORD_SIZE)?;
        }
        Ok(Self {
            buf,
            count,
            next: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.count - self.next
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<'a> Iterator for ActorRecords<'a> {
    type Item = ActorRecord<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.count {
            return None;
        }
        let record = ActorRecord {
            buf: self.buf,
            offset: self.next * ACTOR_RECORD_STRIDE,
        };
        self.next += 1;
        Some(record)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.len(), Some(self.len()))
    }
}

impl ExactSizeIterator for ActorRecords<'_> {}


#[cfg(test)]
mod tests {
    use super::test_util::*;
    use super::*;

    #[test]
    fn test_decode_actor_descriptor() {
        let buf = encode_actor(7, "Alice", &[("Hips", -1), ("Spine", 0), ("Head", 1)]);
        let actor = decode_actor_descriptor(&buf).unwrap();

        assert_eq!(actor.id(), 7);
        assert_eq!(actor.name(), "Alice");
        assert_eq!(actor.joint_count(), 3);
        assert_eq!(actor.joints()[0].parent, None);
        assert_eq!(actor.joints()[2].parent, Some(1));
        assert_eq!(actor.joints()[1].rest_offset, [1.0, 10.0, 0.0]);
        assert_eq!(actor.joints()[2].rest_orientation, [0.0, 0.0, 90.0]);
        assert_eq!(actor.joint_index("Spine"), Some(1));
        assert_eq!(actor.joint_index("spine"), None);
        assert_eq!(actor.find_joint_by_suffix("Head"), Some(2));
    }

    #[test]
    fn test_forward_parent_rejected() {
        let buf = encode_actor(1, "Bob", &[("Hips", -1), ("Spine", 2), ("Head", 1)]);
        assert_eq!(
            decode_actor_descriptor(&buf),
            Err(DecodeError::InvalidParent {
                joint: 1,
                parent: 2
            })
        );
    }

    #[test]
    fn test_self_parent_rejected() {
        let buf = encode_actor(1, "Bob", &[("Hips", 0)]);
        assert!(matches!(
            decode_actor_descriptor(&buf),
            Err(DecodeError::InvalidParent { joint: 0, parent: 0 })
        ));
    }

    #[test]
    fn test_duplicate_joint_name_rejected() {
        let buf = encode_actor(1, "Bob", &[("Hips", -1), ("Hips", 0)]);
        assert_eq!(
            decode_actor_descriptor(&buf),
            Err(DecodeError::DuplicateJointName("Hips".to_string()))
        );
    }

    #[test]
    fn test_truncated_joint_array() {
        let mut buf = encode_actor(3, "Carol", &[("Hips", -1), ("Spine", 0)]);
        buf.truncate(buf.len() - 10);
        assert!(matches!(
            decode_actor_descriptor(&buf),
            Err(DecodeError::Truncated { record: "joint", .. })
        ));
    }

    #[test]
    fn test_negative_joint_count() {
        let mut buf = encode_actor(3, "Carol", &[]);
        buf[36..40].copy_from_slice(&(-2i32).to_le_bytes());
        assert!(matches!(
            decode_actor_descriptor(&buf),
            Err(DecodeError::InvalidCount { field: "joint", value: -2 })
        ));
    }

    #[test]
    fn test_actor_records_stride() {
        // 两条演员记录，关节数组放在记录数组之后
        let mut buf = vec![0u8; 2 * ACTOR_RECORD_STRIDE];
        let joints_at = buf.len() as u64;
        for (slot, id) in [(0usize, 1i32), (1, 2)] {
            let base = slot * ACTOR_RECORD_STRIDE;
            buf[base..base + 3].copy_from_slice(b"Act");
            buf[base + 32..base + 36].copy_from_slice(&id.to_le_bytes());
            buf[base + 36..base + 40].copy_from_slice(&1i32.to_le_bytes());
            buf[base + 40..base + 48].copy_from_slice(&joints_at.to_le_bytes());
        }
        put_fixed_str(&mut buf, "Root", JOINT_NAME_LEN);
        buf.extend_from_slice(&(-1i32).to_le_bytes());
        put_f32s(&mut buf, &[0.0; 6]);

        let records = ActorRecords::new(&buf, 2).unwrap();
        assert_eq!(records.len(), 2);
        let ids: Vec<i32> = records.clone().map(|r| r.id().unwrap()).collect();
        assert_eq!(ids, vec![1, 2]);

        let actors: Vec<Actor> = records.map(|r| r.decode().unwrap()).collect();
        assert_eq!(actors[1].joints()[0].name, "Root");
    }

    #[test]
    fn test_actor_records_too_short() {
        let buf = vec![0u8; ACTOR_RECORD_STRIDE + 10];
        assert!(ActorRecords::new(&buf, 2).is_err());
        assert!(ActorRecords::new(&buf, -1).is_err());
        assert!(ActorRecords::new(&[], 0).unwrap().is_empty());
    }

    #[test]
    fn test_actor_new_validates() {
        let joint = |name: &str, parent| Joint {
            name: name.to_string(),
            parent,
            rest_offset: [0.0; 3],
            rest_orientation: [0.0; 3],
        };
        assert!(Actor::new(1, "ok", vec![joint("a", None), joint("b", Some(0))]).is_ok());
        assert!(Actor::new(1, "bad", vec![joint("a", Some(0))]).is_err());
    }
}
