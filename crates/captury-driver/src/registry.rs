//! 演员注册表
//!
//! id → 演员 + 存活计数 + 最新姿态槽 + 标记状态，以及发现/丢失事件队列。
//! 注册表本身是普通数据结构，由 [`TrackingContext`](crate::TrackingContext) 中的
//! 同一把锁保护，因此"移除演员"与"入队丢失事件"发生在同一个临界区内，
//! 消费端不可能看到一个已被移除、却仍在注册表中的演员。
//!
//! 插入注册表的 `Arc<Actor>` 在插入前已经完整构造（关节序列已填充）。

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use tracing::{debug, info, trace};

use captury_protocol::{Actor, LocalTransform};

use crate::state::{MarkerState, PoseSnapshot, TrackingEvent};

/// 首次出现的标记变换只有在这段服务端时间（微秒）内才算新鲜
pub const MARKER_FRESHNESS_US: u64 = 500_000;

/// 单个被跟踪的演员
#[derive(Debug, Clone)]
pub struct TrackedActor {
    pub actor: Arc<Actor>,
    /// 剩余存活周期数
    pub liveness: u32,
    /// 最新姿态（覆盖语义，不排队）
    pub pose: Option<Arc<PoseSnapshot>>,
    /// 发现时解析出的标记关节
    pub marker_joint: Option<usize>,
    pub marker: Option<MarkerState>,
}

#[derive(Debug)]
pub struct ActorRegistry {
    actors: BTreeMap<i32, TrackedActor>,
    events: VecDeque<TrackingEvent>,
    budget: u32,
}

impl ActorRegistry {
    pub fn new(budget: u32) -> Self {
        Self {
            actors: BTreeMap::new(),
            events: VecDeque::new(),
            budget: budget.max(1),
        }
    }

    pub fn budget(&self) -> u32 {
        self.budget
    }

    pub fn contains(&self, actor_id: i32) -> bool {
        self.actors.contains_key(&actor_id)
    }

    /// 已知演员的存活计数恢复为满额；未知返回 `false`
    pub fn refresh(&mut self, actor_id: i32) -> bool {
        match self.actors.get_mut(&actor_id) {
            Some(tracked) => {
                tracked.liveness = self.budget;
                true
            },
            None => false,
        }
    }

    /// 发现演员
    ///
    /// 未知 id：以满额存活计数插入并入队 `ActorFound`，返回 `true`。
    /// 已知 id：不修改演员记录（关节拓扑不可变），只刷新存活计数，返回 `false`。
    pub fn upsert_found(&mut self, actor: Arc<Actor>, marker_joint: Option<usize>) -> bool {
        let actor_id = actor.id();
        if self.refresh(actor_id) {
            return false;
        }

        info!(
            "Actor {} '{}' found ({} joints)",
            actor_id,
            actor.name(),
            actor.joint_count()
        );
        self.events.push_back(TrackingEvent::ActorFound(actor.clone()));
        self.actors.insert(
            actor_id,
            TrackedActor {
                actor,
                liveness: self.budget,
                pose: None,
                marker_joint,
                marker: None,
            },
        );
        true
    }

    /// 所有演员存活计数减一，降到 0 的演员被移除并入队 `ActorLost`
    pub fn tick_liveness(&mut self) -> Vec<Arc<Actor>> {
        let mut expired = Vec::new();
        for (id, tracked) in self.actors.iter_mut() {
            tracked.liveness = tracked.liveness.saturating_sub(1);
            trace!("Actor {} liveness {}", id, tracked.liveness);
            if tracked.liveness == 0 {
                expired.push(*id);
            }
        }

        let mut lost = Vec::with_capacity(expired.len());
        for id in expired {
            if let Some(tracked) = self.actors.remove(&id) {
                info!("Actor {} '{}' lost", id, tracked.actor.name());
                self.events.push_back(TrackingEvent::ActorLost(tracked.actor.clone()));
                lost.push(tracked.actor);
            }
        }
        lost
    }

    /// 新会话建立：服务端可能已重新分配 id，移除全部演员并入队 `ActorLost`
    pub fn reset_for_new_session(&mut self) -> Vec<Arc<Actor>> {
        let actors = std::mem::take(&mut self.actors);
        if !actors.is_empty() {
            info!("New session, dropping {} known actors", actors.len());
        }
        actors
            .into_values()
            .map(|tracked| {
                self.events.push_back(TrackingEvent::ActorLost(tracked.actor.clone()));
                tracked.actor
            })
            .collect()
    }

    pub fn get(&self, actor_id: i32) -> Option<Arc<Actor>> {
        self.actors.get(&actor_id).map(|t| t.actor.clone())
    }

    pub fn tracked(&self, actor_id: i32) -> Option<&TrackedActor> {
        self.actors.get(&actor_id)
    }

    pub fn liveness(&self, actor_id: i32) -> Option<u32> {
        self.actors.get(&actor_id).map(|t| t.liveness)
    }

    /// 按 id 升序
    pub fn actor_ids(&self) -> Vec<i32> {
        self.actors.keys().copied().collect()
    }

    pub fn actors(&self) -> Vec<Arc<Actor>> {
        self.actors.values().map(|t| t.actor.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.actors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }

    /// 覆盖演员的姿态槽；演员已被移除时丢弃并返回 `None`
    pub fn publish_pose(
        &mut self,
        actor_id: i32,
        timestamp: i64,
        joints: Vec<LocalTransform>,
    ) -> Option<Arc<PoseSnapshot>> {
        let tracked = self.actors.get_mut(&actor_id)?;
        let sequence = tracked.pose.as_ref().map_or(1, |p| p.sequence + 1);
        let snapshot = Arc::new(PoseSnapshot {
            actor_id,
            timestamp,
            sequence,
            joints,
        });
        tracked.pose = Some(snapshot.clone());
        Some(snapshot)
    }

    pub fn latest_pose(&self, actor_id: i32) -> Option<Arc<PoseSnapshot>> {
        self.actors.get(&actor_id).and_then(|t| t.pose.clone())
    }

    /// 需要查询标记变换的 (演员 id, 关节索引)
    pub fn marker_targets(&self) -> Vec<(i32, usize)> {
        self.actors
            .iter()
            .filter_map(|(id, t)| t.marker_joint.map(|joint| (*id, joint)))
            .collect()
    }

    /// 记录标记变换，返回它是否成为未消费状态
    ///
    /// - 已有状态且时间戳更新：替换并标记为未消费
    /// - 时间戳未变化：不做任何事
    /// - 首次出现：只有比 `server_time` 早不到 [`MARKER_FRESHNESS_US`] 时才算未消费
    pub fn update_marker(
        &mut self,
        actor_id: i32,
        timestamp: u64,
        transform: LocalTransform,
        server_time: u64,
    ) -> bool {
        let Some(tracked) = self.actors.get_mut(&actor_id) else {
            return false;
        };

        match tracked.marker.as_mut() {
            Some(state) if timestamp > state.timestamp => {
                state.timestamp = timestamp;
                state.transform = transform;
                state.consumed = false;
                true
            },
            Some(_) => false,
            None => {
                let fresh = timestamp > server_time.saturating_sub(MARKER_FRESHNESS_US);
                debug!(
                    "Actor {} first marker transform at {} us (fresh: {})",
                    actor_id, timestamp, fresh
                );
                tracked.marker = Some(MarkerState {
                    timestamp,
                    transform,
                    consumed: !fresh,
                });
                fresh
            },
        }
    }

    pub fn clear_marker(&mut self, actor_id: i32) {
        if let Some(tracked) = self.actors.get_mut(&actor_id) {
            tracked.marker = None;
        }
    }

    /// 取走未消费的标记变换
    pub fn take_marker(&mut self, actor_id: i32) -> Option<LocalTransform> {
        let state = self.actors.get_mut(&actor_id)?.marker.as_mut()?;
        if state.consumed {
            return None;
        }
        state.consumed = true;
        Some(state.transform)
    }

    pub fn push_event(&mut self, event: TrackingEvent) {
        self.events.push_back(event);
    }

    pub fn pending_events(&self) -> usize {
        self.events.len()
    }

    pub fn drain_events(&mut self) -> Vec<TrackingEvent> {
        self.events.drain(..).collect()
    }
}
