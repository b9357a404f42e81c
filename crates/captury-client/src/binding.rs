//! 关节绑定
//!
//! 消费端把自己的场景对象（骨骼、调试图元等）绑定到演员的关节上，
//! `PoseSink` 每帧把最新姿态写入这些目标。部分绑定是正常情况：
//! 没有目标的关节直接跳过。

use std::sync::Arc;

use nalgebra::Vector3;
use parking_lot::Mutex;

use captury_driver::PoseSnapshot;
use captury_protocol::{Actor, Joint, LocalTransform};

/// 接收关节变换的目标
pub trait JointTarget {
    fn apply(&mut self, transform: &LocalTransform);
}

impl<F> JointTarget for F
where
    F: FnMut(&LocalTransform),
{
    fn apply(&mut self, transform: &LocalTransform) {
        self(transform)
    }
}

/// 共享的变换槽，便于在别处读取最新值
#[derive(Debug, Clone, Default)]
pub struct SharedTransform(Arc<Mutex<LocalTransform>>);

impl SharedTransform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> LocalTransform {
        *self.0.lock()
    }
}

impl JointTarget for SharedTransform {
    fn apply(&mut self, transform: &LocalTransform) {
        *self.0.lock() = *transform;
    }
}

/// 一个演员的全部关节绑定
pub struct ActorBinding {
    actor_id: i32,
    targets: Vec<Option<Box<dyn JointTarget>>>,
}

impl ActorBinding {
    /// 为每个关节调用一次 `resolve`，返回 `None` 的关节不绑定
    pub fn resolve<F>(actor: &Actor, mut resolve: F) -> Self
    where
        F: FnMut(&Joint) -> Option<Box<dyn JointTarget>>,
    {
        Self {
            actor_id: actor.id(),
            targets: actor.joints().iter().map(&mut resolve).collect(),
        }
    }

    /// 空绑定（所有关节都不绑定）
    pub fn empty(actor: &Actor) -> Self {
        Self::resolve(actor, |_| None)
    }

    pub fn actor_id(&self) -> i32 {
        self.actor_id
    }

    /// 替换单个关节的目标
    pub fn bind(&mut self, joint_index: usize, target: Box<dyn JointTarget>) -> bool {
        match self.targets.get_mut(joint_index) {
            Some(slot) => {
                *slot = Some(target);
                true
            },
            None => false,
        }
    }

    pub fn joint_count(&self) -> usize {
        self.targets.len()
    }

    pub fn bound_count(&self) -> usize {
        self.targets.iter().filter(|t| t.is_some()).count()
    }

    /// 把快照写入已绑定的关节，返回写入的关节数
    pub fn apply(&mut self, snapshot: &PoseSnapshot, origin: &Vector3<f64>) -> usize {
        let mut applied = 0;
        for (target, joint) in self.targets.iter_mut().zip(&snapshot.joints) {
            let Some(target) = target else {
                continue;
            };
            let transform = LocalTransform {
                position: joint.position + origin,
                rotation: joint.rotation,
            };
            target.apply(&transform);
            applied += 1;
        }
        applied
    }
}

impl std::fmt::Debug for ActorBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorBinding")
            .field("actor_id", &self.actor_id)
            .field("joints", &self.targets.len())
            .field("bound", &self.bound_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::UnitQuaternion;

    fn actor() -> Actor {
        let joints = ["Hips", "Spine", "Head"]
            .iter()
            .enumerate()
            .map(|(i, name)| Joint {
                name: name.to_string(),
                parent: i.checked_sub(1),
                rest_offset: [0.0; 3],
                rest_orientation: [0.0; 3],
            })
            .collect();
        Actor::new(1, "alice", joints).unwrap()
    }

    fn snapshot() -> PoseSnapshot {
        PoseSnapshot {
            actor_id: 1,
            timestamp: 0,
            sequence: 1,
            joints: (0..3)
                .map(|i| LocalTransform {
                    position: Vector3::new(i as f64, 0.0, 0.0),
                    rotation: UnitQuaternion::identity(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_partial_binding_skips_unbound() {
        let head = SharedTransform::new();
        let slot = head.clone();
        let mut binding = ActorBinding::resolve(&actor(), |joint| {
            (joint.name == "Head").then(|| Box::new(slot.clone()) as Box<dyn JointTarget>)
        });
        assert_eq!(binding.joint_count(), 3);
        assert_eq!(binding.bound_count(), 1);

        let applied = binding.apply(&snapshot(), &Vector3::new(0.0, 1.0, 0.0));
        assert_eq!(applied, 1);
        assert_eq!(head.get().position, Vector3::new(2.0, 1.0, 0.0));
    }

    #[test]
    fn test_closure_target_and_bind() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut binding = ActorBinding::empty(&actor());
        assert_eq!(binding.apply(&snapshot(), &Vector3::zeros()), 0);

        let sink = seen.clone();
        assert!(binding.bind(
            0,
            Box::new(move |t: &LocalTransform| sink.lock().push(t.position.x))
        ));
        assert!(!binding.bind(7, Box::new(|_: &LocalTransform| {})));

        binding.apply(&snapshot(), &Vector3::zeros());
        assert_eq!(*seen.lock(), vec![0.0]);
    }
}
