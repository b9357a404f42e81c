//! PoseSink：逐帧消费端
//!
//! 每帧在消费端线程上调用一次 [`PoseSink::update`]：
//! 1. 取出发现/丢失/相机事件（FIFO），在锁外同步调用监听器
//! 2. 把每个已绑定演员的最新姿态快照写入绑定目标
//! 3. 检查标记快照序号，有新快照时通知监听器
//!
//! 消费端从不等待工作线程：没有新姿态时继续使用上一个快照。

use std::collections::HashMap;
use std::sync::Arc;

use nalgebra::{UnitQuaternion, Vector3};
use tracing::{debug, trace};

use captury_driver::{CommandHandle, PoseSnapshot, Tracker, TrackerCommand, TrackingContext, TrackingEvent};
use captury_protocol::{Actor, LocalTransform, to_server_rotation};

use crate::binding::ActorBinding;
use crate::error::ClientError;
use crate::listener::TrackingListener;

/// 发现演员时自动创建绑定
pub type BindingFactory = Box<dyn FnMut(&Actor) -> Option<ActorBinding>>;

/// 单帧处理结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameReport {
    /// 本帧分发的事件数
    pub events: usize,
    /// 写入了姿态的演员数
    pub actors_posed: usize,
    /// 是否收到新的标记快照
    pub tags_updated: bool,
}

pub struct PoseSink {
    ctx: Arc<TrackingContext>,
    commands: CommandHandle,
    listeners: Vec<Box<dyn TrackingListener>>,
    bindings: HashMap<i32, ActorBinding>,
    binding_factory: Option<BindingFactory>,
    /// actor id → (关节名 → 索引)
    joint_cache: HashMap<i32, HashMap<String, usize>>,
    origin: Vector3<f64>,
    last_tag_sequence: u64,
    frames_without_tags: u32,
    tag_stale_after_frames: Option<u32>,
    tags_stale: bool,
}

impl PoseSink {
    pub fn new(ctx: Arc<TrackingContext>, commands: CommandHandle) -> Self {
        Self {
            ctx,
            commands,
            listeners: Vec::new(),
            bindings: HashMap::new(),
            binding_factory: None,
            joint_cache: HashMap::new(),
            origin: Vector3::zeros(),
            last_tag_sequence: 0,
            frames_without_tags: 0,
            tag_stale_after_frames: None,
            tags_stale: false,
        }
    }

    pub fn from_tracker(tracker: &Tracker) -> Self {
        Self::new(tracker.context().clone(), tracker.command_handle())
    }

    /// 场景原点偏移，加到每个写入的关节位置上
    pub fn with_origin(mut self, origin: Vector3<f64>) -> Self {
        self.origin = origin;
        self
    }

    /// 连续 `frames` 帧没有新标记快照时触发 `on_tags_stale`
    pub fn with_tag_stale_after_frames(mut self, frames: Option<u32>) -> Self {
        self.tag_stale_after_frames = frames;
        self
    }

    pub fn with_binding_factory<F>(mut self, factory: F) -> Self
    where
        F: FnMut(&Actor) -> Option<ActorBinding> + 'static,
    {
        self.binding_factory = Some(Box::new(factory));
        self
    }

    pub fn add_listener(&mut self, listener: impl TrackingListener + 'static) {
        self.listeners.push(Box::new(listener));
    }

    pub fn set_origin(&mut self, origin: Vector3<f64>) {
        self.origin = origin;
    }

    pub fn origin(&self) -> Vector3<f64> {
        self.origin
    }

    pub fn context(&self) -> &Arc<TrackingContext> {
        &self.ctx
    }

    pub fn actors(&self) -> Vec<Arc<Actor>> {
        self.ctx.actors()
    }

    pub fn latest_pose(&self, actor_id: i32) -> Option<Arc<PoseSnapshot>> {
        self.ctx.latest_pose(actor_id)
    }

    /// 绑定演员；演员必须已在注册表中
    pub fn attach_binding(&mut self, binding: ActorBinding) -> Result<(), ClientError> {
        let actor_id = binding.actor_id();
        if self.ctx.actor(actor_id).is_none() {
            return Err(ClientError::UnknownActor(actor_id));
        }
        self.bindings.insert(actor_id, binding);
        Ok(())
    }

    pub fn detach_binding(&mut self, actor_id: i32) -> Option<ActorBinding> {
        self.bindings.remove(&actor_id)
    }

    pub fn is_bound(&self, actor_id: i32) -> bool {
        self.bindings.contains_key(&actor_id)
    }

    /// 处理一帧
    pub fn update(&mut self) -> FrameReport {
        let mut report = FrameReport::default();

        // 锁只用于取出事件，回调在锁外执行
        let events = self.ctx.drain_events();
        report.events = events.len();
        for event in &events {
            self.dispatch(event);
        }

        let snapshots: Vec<Arc<PoseSnapshot>> = {
            let registry = self.ctx.registry.lock();
            self.bindings
                .keys()
                .filter_map(|id| registry.latest_pose(*id))
                .collect()
        };
        for snapshot in snapshots {
            if let Some(binding) = self.bindings.get_mut(&snapshot.actor_id) {
                binding.apply(&snapshot, &self.origin);
                report.actors_posed += 1;
            }
        }

        report.tags_updated = self.update_tags();
        trace!("Frame update: {:?}", report);
        report
    }

    fn dispatch(&mut self, event: &TrackingEvent) {
        match event {
            TrackingEvent::ActorFound(actor) => {
                if let Some(factory) = self.binding_factory.as_mut()
                    && let Some(binding) = factory(actor.as_ref())
                {
                    self.bindings.insert(actor.id(), binding);
                }
                for listener in self.listeners.iter_mut() {
                    listener.on_actor_found(actor);
                }
            },
            TrackingEvent::ActorLost(actor) => {
                if self.bindings.remove(&actor.id()).is_some() {
                    debug!("Dropped binding for lost actor {}", actor.id());
                }
                self.joint_cache.remove(&actor.id());
                for listener in self.listeners.iter_mut() {
                    listener.on_actor_lost(actor);
                }
            },
            TrackingEvent::CamerasChanged(cameras) => {
                let positions = cameras.positions();
                let orientations = cameras.orientations();
                for listener in self.listeners.iter_mut() {
                    listener.on_cameras_changed(&positions, &orientations);
                }
            },
        }
    }

    fn update_tags(&mut self) -> bool {
        let snapshot = self.ctx.latest_tags();
        if snapshot.sequence != self.last_tag_sequence {
            self.last_tag_sequence = snapshot.sequence;
            self.frames_without_tags = 0;
            self.tags_stale = false;
            if !snapshot.is_empty() {
                for listener in self.listeners.iter_mut() {
                    listener.on_tags_detected(&snapshot.tags);
                }
            }
            return true;
        }

        self.frames_without_tags = self.frames_without_tags.saturating_add(1);
        if let Some(limit) = self.tag_stale_after_frames
            && self.last_tag_sequence != 0
            && !self.tags_stale
            && self.frames_without_tags >= limit
        {
            self.tags_stale = true;
            for listener in self.listeners.iter_mut() {
                listener.on_tags_stale();
            }
        }
        false
    }

    fn resolve_joint(&mut self, actor: &Actor, joint_name: &str) -> Result<usize, ClientError> {
        let cache = self.joint_cache.entry(actor.id()).or_default();
        // 同一 id 可能在 update() 之前换成另一副骨架，缓存下标要对照当前演员
        if let Some(&index) = cache.get(joint_name)
            && actor.joints().get(index).is_some_and(|j| j.name == joint_name)
        {
            return Ok(index);
        }

        match actor.joint_index(joint_name) {
            Some(index) => {
                cache.insert(joint_name.to_string(), index);
                Ok(index)
            },
            None => {
                cache.remove(joint_name);
                Err(ClientError::UnknownJoint {
                    actor_id: actor.id(),
                    joint: joint_name.to_string(),
                })
            },
        }
    }

    /// 把本地旋转作为约束发回服务端
    ///
    /// 由工作线程发送，时间戳为同步后的服务端时间，权重 1.0。
    pub fn set_rotation_constraint(
        &mut self,
        actor_id: i32,
        joint_name: &str,
        rotation: &UnitQuaternion<f64>,
    ) -> Result<(), ClientError> {
        let actor = self
            .ctx
            .actor(actor_id)
            .ok_or(ClientError::UnknownActor(actor_id))?;
        let joint_index = self.resolve_joint(&actor, joint_name)?;
        let euler = to_server_rotation(rotation).map(|angle| angle as f32);

        self.commands.send(TrackerCommand::SetRotationConstraint {
            actor_id,
            joint_index,
            rotation: euler,
        })?;
        Ok(())
    }

    /// 取走未消费的标记变换（只返回一次）
    pub fn take_marker_transform(&self, actor_id: i32) -> Option<LocalTransform> {
        self.ctx.take_marker_transform(actor_id)
    }

    pub fn request_camera_refresh(&self) -> Result<(), ClientError> {
        self.commands.send(TrackerCommand::RefreshCameras)?;
        Ok(())
    }
}

impl std::fmt::Debug for PoseSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoseSink")
            .field("listeners", &self.listeners.len())
            .field("bindings", &self.bindings.len())
            .field("origin", &self.origin)
            .field("last_tag_sequence", &self.last_tag_sequence)
            .finish()
    }
}
