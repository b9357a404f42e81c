//! 后台跟踪工作线程
//!
//! 每个轮询周期：
//! 1. 未连接时尝试连接（失败则等待下个周期，固定间隔，无退避），连接成功后读取一次相机标定
//! 2. 已连接但未开始流传输时请求流传输（失败不终止本周期）
//! 3. 读取演员列表：已知演员只刷新存活计数，未知演员在锁外解码后插入
//! 4. 存活计数减一（每个已连接周期恰好一次）
//! 5. 逐演员读取姿态、转换到本地坐标系并覆盖姿态槽
//! 6. 流模式包含 AR 标记时读取标记并整体替换快照
//! 7. 每隔 `marker_poll_divisor` 个周期查询标记关节的变换
//!
//! 单条畸形记录只丢弃受影响的数据，工作线程不会因此退出。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel::{Receiver, after, never, select};
use tracing::{debug, info, trace, warn};

use captury_protocol::{
    ActorRecords, CoordinateAdapter, StreamMode, decode_actor_pose, decode_cameras,
    decode_fiducial_tags, decode_marker_transform,
};
use captury_transport::RemoteTransport;

use crate::command::TrackerCommand;
use crate::config::TrackingConfig;
use crate::error::DriverError;
use crate::metrics::TrackingMetrics;
use crate::session::{ConnectionSession, ConnectionState};
use crate::state::{CameraSet, TagSnapshot, TrackingContext, TrackingEvent};

/// 单个轮询周期的结果（用于测试和诊断）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// 本周期是否处于已连接状态
    pub connected: bool,
    pub actors_found: usize,
    pub actors_lost: usize,
    pub poses_published: usize,
    pub tags_published: bool,
    pub markers_updated: usize,
    pub decode_errors: usize,
}

/// 跟踪工作线程
///
/// 独占 [`ConnectionSession`]，所有网络 I/O 与解码都在这里完成。
pub struct TrackingWorker<T: RemoteTransport> {
    session: ConnectionSession<T>,
    ctx: Arc<TrackingContext>,
    config: TrackingConfig,
    adapter: CoordinateAdapter,
    cycle: u64,
}

impl<T: RemoteTransport> TrackingWorker<T> {
    pub fn new(transport: T, ctx: Arc<TrackingContext>, config: TrackingConfig) -> Self {
        let session = ConnectionSession::new(transport, ctx.connection.clone());
        let adapter = CoordinateAdapter::new(config.scale_factor);
        Self {
            session,
            ctx,
            config,
            adapter,
            cycle: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.session.state()
    }

    pub fn context(&self) -> &Arc<TrackingContext> {
        &self.ctx
    }

    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }

    fn metrics(&self) -> &TrackingMetrics {
        &self.ctx.metrics
    }

    /// 按错误类别计数
    fn record_error(&self, err: &DriverError) {
        match err {
            DriverError::Decode(_) => TrackingMetrics::incr(&self.metrics().decode_errors),
            DriverError::Transport(_) => TrackingMetrics::incr(&self.metrics().transport_errors),
            _ => {},
        }
    }

    /// 执行一个轮询周期（不包括睡眠）
    pub fn poll_once(&mut self) -> CycleReport {
        self.cycle += 1;
        TrackingMetrics::incr(&self.metrics().poll_cycles);
        let mut report = CycleReport::default();

        if !self.session.is_connected() && !self.try_connect() {
            return report;
        }

        if !self.session.is_streaming()
            && let Err(e) = self.session.start_streaming(self.config.stream_mode())
        {
            warn!("Failed to start streaming, retrying next cycle: {}", e);
            self.record_error(&e);
            if !self.session.is_connected() {
                return report;
            }
        }
        report.connected = true;

        if let Err(e) = self.discover_actors(&mut report) {
            warn!("Actor discovery failed, discarding this cycle's actor list: {}", e);
            self.record_error(&e);
        }

        // 每个已连接周期恰好一次，与发现结果无关
        let lost = self.ctx.registry.lock().tick_liveness();
        report.actors_lost = lost.len();
        self.metrics()
            .actors_lost
            .fetch_add(lost.len() as u64, Ordering::Relaxed);

        if !self.session.is_connected() {
            return report;
        }

        self.update_poses(&mut report);

        if self.session.is_connected()
            && self
                .session
                .streaming_mode()
                .is_some_and(StreamMode::includes_ar_tags)
        {
            self.update_tags(&mut report);
        }

        if self.session.is_connected()
            && self.cycle % u64::from(self.config.marker_poll_divisor.max(1)) == 0
        {
            self.update_markers(&mut report);
        }

        trace!("Poll cycle {} finished: {:?}", self.cycle, report);
        report
    }

    fn try_connect(&mut self) -> bool {
        TrackingMetrics::incr(&self.metrics().connect_attempts);
        if let Err(e) = self.session.connect(&self.config.host, self.config.port) {
            TrackingMetrics::incr(&self.metrics().connect_failures);
            warn!("{}", e);
            return false;
        }

        // 新会话中的演员 id 与关节拓扑都可能改变
        let dropped = self.ctx.registry.lock().reset_for_new_session();
        self.metrics()
            .actors_lost
            .fetch_add(dropped.len() as u64, Ordering::Relaxed);

        if let Err(e) = self.refresh_cameras() {
            warn!("Failed to fetch camera calibration: {}", e);
            self.record_error(&e);
        }
        self.session.is_connected()
    }

    /// 重新读取相机标定；有相机时替换集合并入队 `CamerasChanged`
    pub fn refresh_cameras(&mut self) -> Result<usize, DriverError> {
        let block = self.session.get_cameras()?;
        if block.is_empty() {
            debug!("Server reported no cameras");
            return Ok(0);
        }

        let cameras = decode_cameras(&block.data, block.count)?;
        let local = cameras
            .iter()
            .map(|camera| self.adapter.camera_to_local(camera))
            .collect();
        let set = Arc::new(CameraSet { cameras, local });
        let count = set.len();

        info!("Received calibration for {} camera(s)", count);
        self.ctx.cameras.store(set.clone());
        self.ctx
            .registry
            .lock()
            .push_event(TrackingEvent::CamerasChanged(set));
        Ok(count)
    }

    fn discover_actors(&mut self, report: &mut CycleReport) -> Result<(), DriverError> {
        let block = self.session.get_actors()?;
        let records = ActorRecords::new(&block.data, block.count)?;

        // 已知演员在锁内刷新，未知演员留到锁外解码
        let mut unknown = Vec::new();
        {
            let mut registry = self.ctx.registry.lock();
            for record in records {
                match record.id() {
                    Ok(id) if registry.refresh(id) => {},
                    Ok(_) => unknown.push(record),
                    Err(e) => {
                        warn!("Skipping unreadable actor record: {}", e);
                        report.decode_errors += 1;
                        TrackingMetrics::incr(&self.metrics().decode_errors);
                    },
                }
            }
        }

        let suffix = self.config.marker_suffix();
        for record in unknown {
            let actor = match record.decode() {
                Ok(actor) => actor,
                Err(e) => {
                    warn!("Discarding malformed actor record: {}", e);
                    report.decode_errors += 1;
                    TrackingMetrics::incr(&self.metrics().decode_errors);
                    continue;
                },
            };

            let marker_joint = suffix.and_then(|s| actor.find_joint_by_suffix(s));
            if let Some(joint) = marker_joint {
                debug!(
                    "Actor {} marker joint '{}' (#{})",
                    actor.id(),
                    actor.joints()[joint].name,
                    joint
                );
            }

            if self
                .ctx
                .registry
                .lock()
                .upsert_found(Arc::new(actor), marker_joint)
            {
                report.actors_found += 1;
                TrackingMetrics::incr(&self.metrics().actors_found);
            }
        }
        Ok(())
    }

    fn update_poses(&mut self, report: &mut CycleReport) {
        let actors = self.ctx.actors();
        for actor in actors {
            let raw = match self.session.get_current_pose(actor.id()) {
                Ok(Some(raw)) => raw,
                Ok(None) => {
                    let reason = self.session.last_error_message();
                    debug!(
                        "No pose for actor {}: {}",
                        actor.id(),
                        reason.as_deref().unwrap_or("no data")
                    );
                    continue;
                },
                Err(e) => {
                    warn!("Pose request for actor {} failed: {}", actor.id(), e);
                    self.record_error(&e);
                    if !self.session.is_connected() {
                        return;
                    }
                    continue;
                },
            };

            // 解码失败时保留上一个快照
            let frame = match decode_actor_pose(&raw, &actor) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!("Discarding pose frame for actor {}: {}", actor.id(), e);
                    report.decode_errors += 1;
                    TrackingMetrics::incr(&self.metrics().decode_errors);
                    continue;
                },
            };

            let joints = frame
                .joints
                .iter()
                .map(|joint| self.adapter.joint_to_local(joint))
                .collect();
            let published =
                self.ctx
                    .registry
                    .lock()
                    .publish_pose(frame.actor_id, frame.timestamp, joints);
            if published.is_some() {
                report.poses_published += 1;
                TrackingMetrics::incr(&self.metrics().poses_published);
            }
        }
    }

    fn update_tags(&mut self, report: &mut CycleReport) {
        let raw = match self.session.get_current_tags() {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                trace!(
                    "No AR tags: {}",
                    self.session
                        .last_error_message()
                        .as_deref()
                        .unwrap_or("no data")
                );
                return;
            },
            Err(e) => {
                warn!("AR tag request failed: {}", e);
                self.record_error(&e);
                return;
            },
        };

        let tags = match decode_fiducial_tags(&raw, self.config.tag_format) {
            Ok(tags) => tags,
            Err(e) => {
                warn!("Discarding AR tag block: {}", e);
                report.decode_errors += 1;
                TrackingMetrics::incr(&self.metrics().decode_errors);
                return;
            },
        };

        let tags = tags.iter().map(|tag| self.adapter.tag_to_local(tag)).collect();
        let sequence = self.ctx.tags.load().sequence + 1;
        self.ctx.tags.store(Arc::new(TagSnapshot { sequence, tags }));
        report.tags_published = true;
        TrackingMetrics::incr(&self.metrics().tag_snapshots);
    }

    fn update_markers(&mut self, report: &mut CycleReport) {
        let targets = self.ctx.registry.lock().marker_targets();
        for (actor_id, joint_index) in targets {
            let record = match self.session.get_marker_transform(actor_id, joint_index) {
                Ok(record) => record,
                Err(e) => {
                    warn!("Marker request for actor {} failed: {}", actor_id, e);
                    self.record_error(&e);
                    if !self.session.is_connected() {
                        return;
                    }
                    continue;
                },
            };

            let Some(record) = record.filter(|r| r.timestamp != 0) else {
                self.ctx.registry.lock().clear_marker(actor_id);
                continue;
            };

            let transform = match decode_marker_transform(&record.data) {
                Ok(transform) => self.adapter.marker_to_local(&transform),
                Err(e) => {
                    warn!("Discarding marker transform for actor {}: {}", actor_id, e);
                    report.decode_errors += 1;
                    TrackingMetrics::incr(&self.metrics().decode_errors);
                    continue;
                },
            };

            let server_time = self.session.server_time();
            if self.ctx.registry.lock().update_marker(
                actor_id,
                record.timestamp,
                transform,
                server_time,
            ) {
                report.markers_updated += 1;
                TrackingMetrics::incr(&self.metrics().markers_updated);
            }
        }
    }

    /// 执行一条命令
    ///
    /// 未连接或目标演员已不在注册表中时丢弃命令。
    pub fn handle_command(&mut self, command: TrackerCommand) {
        trace!("Handling command `{}`", command.name());
        if !self.session.is_connected() {
            debug!("Dropping `{}`: not connected", command.name());
            TrackingMetrics::incr(&self.metrics().commands_dropped);
            return;
        }

        match command {
            TrackerCommand::SetRotationConstraint {
                actor_id,
                joint_index,
                rotation,
            } => {
                let joint_count = self.ctx.registry.lock().get(actor_id).map(|a| a.joint_count());
                match joint_count {
                    None => {
                        debug!("Dropping rotation constraint for unknown actor {}", actor_id);
                        TrackingMetrics::incr(&self.metrics().commands_dropped);
                        return;
                    },
                    Some(count) if joint_index >= count => {
                        debug!(
                            "Dropping rotation constraint for actor {}: joint {} out of range ({} joints)",
                            actor_id, joint_index, count
                        );
                        TrackingMetrics::incr(&self.metrics().commands_dropped);
                        return;
                    },
                    Some(_) => {},
                }
                let timestamp = self.session.server_time();
                match self.session.set_rotation_constraint(
                    actor_id,
                    joint_index,
                    rotation,
                    timestamp,
                    1.0,
                ) {
                    Ok(()) => TrackingMetrics::incr(&self.metrics().constraints_sent),
                    Err(e) => {
                        warn!(
                            "Failed to send rotation constraint for actor {} joint {}: {}",
                            actor_id, joint_index, e
                        );
                        self.record_error(&e);
                    },
                }
            },
            TrackerCommand::RefreshCameras => {
                if let Err(e) = self.refresh_cameras() {
                    warn!("Camera refresh failed: {}", e);
                    self.record_error(&e);
                }
            },
        }
    }

    /// 主循环：可中断的睡眠 + 轮询，直到收到关闭信号
    ///
    /// 睡眠期间到达的命令立即执行；`shutdown_rx` 收到消息或断开时退出，
    /// 退出前断开会话。
    pub fn run(
        mut self,
        cmd_rx: Receiver<TrackerCommand>,
        shutdown_rx: Receiver<()>,
        is_running: Arc<AtomicBool>,
    ) {
        info!(
            "Tracking worker started ({}:{}, poll interval {:?})",
            self.config.host,
            self.config.port,
            self.config.poll_interval()
        );

        let idle = never();
        let mut commands_open = true;

        'outer: while is_running.load(Ordering::Acquire) {
            let timer = after(self.config.poll_interval());
            loop {
                let commands = if commands_open { &cmd_rx } else { &idle };
                select! {
                    recv(shutdown_rx) -> _ => break 'outer,
                    recv(commands) -> msg => match msg {
                        Ok(command) => self.handle_command(command),
                        Err(_) => {
                            debug!("Command channel closed");
                            commands_open = false;
                        },
                    },
                    recv(timer) -> _ => break,
                }
            }

            if !is_running.load(Ordering::Acquire) {
                break;
            }
            self.poll_once();
        }

        self.shutdown();
    }

    /// 断开会话（流传输中会先停止流）
    pub fn shutdown(&mut self) {
        self.session.disconnect();
        info!("Tracking worker stopped after {} cycles", self.cycle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use captury_protocol::{
        ACTOR_RECORD_STRIDE, AR_TAG_RECORD_SIZE, FiducialTag, JOINT_NAME_LEN, JOINT_RECORD_SIZE,
        JointPose, LocalTagOrientation, MarkerTransform, TagOrientation,
    };
    use captury_transport::mock::{encode_actors, encode_pose, encode_tags};
    use captury_transport::{MockServer, MockTransport, RawBlock};

    fn worker_with(server: &MockServer, config: TrackingConfig) -> TrackingWorker<MockTransport> {
        let ctx = Arc::new(TrackingContext::new(config.liveness_budget));
        TrackingWorker::new(server.transport(), ctx, config)
    }

    fn worker(server: &MockServer) -> TrackingWorker<MockTransport> {
        worker_with(server, TrackingConfig::default())
    }

    fn add_actor(server: &MockServer, id: i32) {
        let actor = MockServer::chain_actor(id, &format!("actor{id}"), &["Hips", "Spine", "Head"])
            .unwrap();
        server.add_actor(actor);
    }

    fn found_ids(events: &[TrackingEvent]) -> Vec<i32> {
        events
            .iter()
            .filter_map(|e| match e {
                TrackingEvent::ActorFound(a) => Some(a.id()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_first_cycle_connects_and_discovers() {
        let server = MockServer::new();
        add_actor(&server, 1);
        add_actor(&server, 2);
        let mut worker = worker(&server);

        let report = worker.poll_once();
        assert!(report.connected);
        assert_eq!(report.actors_found, 2);
        assert_eq!(report.poses_published, 2);
        assert_eq!(worker.state(), ConnectionState::Streaming);
        assert_eq!(server.stream_mode(), Some(StreamMode::Poses));

        let ctx = worker.context();
        assert_eq!(ctx.connection_state(), ConnectionState::Streaming);
        assert_eq!(found_ids(&ctx.drain_events()), vec![1, 2]);
        assert_eq!(ctx.latest_pose(1).unwrap().joints.len(), 3);
    }

    #[test]
    fn test_cameras_fetched_once_on_connect() {
        let server = MockServer::new();
        server.set_cameras(vec![captury_protocol::CameraDescriptor {
            id: 3,
            name: "cam3".into(),
            position: [1000.0, 2000.0, 0.0],
            ..Default::default()
        }]);
        let mut worker = worker(&server);
        worker.poll_once();
        worker.poll_once();

        let events = worker.context().drain_events();
        assert_eq!(events.len(), 1);
        match &events[0] {
            TrackingEvent::CamerasChanged(set) => {
                assert_eq!(set.len(), 1);
                assert!((set.local[0].position.x + 1.0).abs() < 1e-9);
                assert!((set.local[0].position.y - 2.0).abs() < 1e-9);
            },
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_absent_actor_is_evicted() {
        let server = MockServer::new();
        add_actor(&server, 1);
        add_actor(&server, 2);
        let mut worker = worker(&server);
        worker.poll_once();
        worker.context().drain_events();

        server.remove_actor(2);
        let mut lost = 0;
        for _ in 0..5 {
            lost += worker.poll_once().actors_lost;
        }
        assert_eq!(lost, 1);

        let ctx = worker.context();
        assert!(ctx.actor(2).is_none());
        assert!(ctx.actor(1).is_some());
        let events = ctx.drain_events();
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], TrackingEvent::ActorLost(a) if a.id() == 2));
    }

    #[test]
    fn test_pose_converted_to_local() {
        let server = MockServer::new();
        add_actor(&server, 1);
        let mut joints = [JointPose::default(); 3];
        joints[0].position = [1000.0, 0.0, 0.0];
        server.set_pose(1, &joints);

        let mut worker = worker(&server);
        worker.poll_once();

        let pose = worker.context().latest_pose(1).unwrap();
        let root = pose.joints[0];
        assert!((root.position.x + 1.0).abs() < 1e-9);
        assert_eq!(root.position.y, 0.0);
        assert_eq!(root.position.z, 0.0);
        assert!(root.rotation.angle() < 1e-9);
    }

    #[test]
    fn test_malformed_pose_keeps_previous_snapshot() {
        let server = MockServer::new();
        add_actor(&server, 1);
        let mut worker = worker(&server);
        worker.poll_once();
        let before = worker.context().latest_pose(1).unwrap();

        server.set_pose_values(1, vec![0.0; 7]);
        let report = worker.poll_once();
        assert_eq!(report.decode_errors, 1);
        assert_eq!(report.poses_published, 0);

        let after = worker.context().latest_pose(1).unwrap();
        assert_eq!(after, before);
        assert_eq!(worker.context().metrics.snapshot().decode_errors, 1);

        // 缺失姿态同样保留旧快照
        server.clear_pose(1);
        worker.poll_once();
        assert_eq!(worker.context().latest_pose(1).unwrap(), before);
    }

    #[test]
    fn test_pose_for_other_actor_is_rejected() {
        let server = MockServer::new();
        add_actor(&server, 1);
        let mut worker = worker(&server);
        worker.poll_once();
        let before = worker.context().latest_pose(1).unwrap();

        // 记录头中的演员 id 与请求不符
        server.set_raw_pose(1, encode_pose(2, server.clock() as i64, &[0.0; 18]));
        let report = worker.poll_once();
        assert_eq!(report.decode_errors, 1);
        assert_eq!(report.poses_published, 0);
        assert_eq!(worker.context().latest_pose(1).unwrap(), before);
        assert!(worker.context().actor(1).is_some());
    }

    #[test]
    fn test_malformed_actor_record_skips_only_that_actor() {
        let server = MockServer::new();
        add_actor(&server, 1);
        let first = MockServer::chain_actor(1, "actor1", &["Hips", "Spine", "Head"]).unwrap();
        let second = MockServer::chain_actor(2, "actor2", &["Hips", "Head"]).unwrap();

        // 第二个演员的根关节指向它后面的关节
        let mut data = encode_actors(&[&first, &second]).to_vec();
        let parent_at =
            2 * ACTOR_RECORD_STRIDE + first.joint_count() * JOINT_RECORD_SIZE + JOINT_NAME_LEN;
        data[parent_at..parent_at + 4].copy_from_slice(&1i32.to_le_bytes());
        server.set_raw_actors(Some(RawBlock {
            count: 2,
            data: data.into(),
        }));

        let mut worker = worker(&server);
        let report = worker.poll_once();
        assert!(report.connected);
        assert_eq!(report.actors_found, 1);
        assert_eq!(report.decode_errors, 1);
        assert_eq!(report.poses_published, 1);

        let ctx = worker.context().clone();
        assert!(ctx.actor(1).is_some());
        assert!(ctx.actor(2).is_none());
        assert_eq!(found_ids(&ctx.drain_events()), vec![1]);
        assert_eq!(ctx.metrics.snapshot().decode_errors, 1);

        for _ in 0..10 {
            assert!(worker.poll_once().connected);
        }
        assert!(ctx.actor(1).is_some());
        assert!(ctx.actor(2).is_none());
    }

    #[test]
    fn test_negative_record_counts_are_decode_errors() {
        let server = MockServer::new();
        add_actor(&server, 1);
        let negative = RawBlock {
            count: -1,
            ..Default::default()
        };
        server.set_raw_actors(Some(negative.clone()));
        server.set_raw_cameras(Some(negative));

        let mut worker = worker(&server);
        let report = worker.poll_once();
        assert!(report.connected);
        assert_eq!(report.actors_found, 0);
        assert!(worker.context().actors().is_empty());
        assert!(worker.context().drain_events().is_empty());
        assert_eq!(worker.context().metrics.snapshot().decode_errors, 2);

        server.set_raw_actors(None);
        assert_eq!(worker.poll_once().actors_found, 1);
    }

    #[test]
    fn test_connect_failure_retries_next_cycle() {
        let server = MockServer::new();
        server.fail_next_connects(2);
        add_actor(&server, 1);
        let mut worker = worker(&server);

        assert!(!worker.poll_once().connected);
        assert!(!worker.poll_once().connected);
        assert!(worker.context().actors().is_empty());

        assert!(worker.poll_once().connected);
        assert_eq!(worker.context().actors().len(), 1);

        let metrics = worker.context().metrics.snapshot();
        assert_eq!(metrics.connect_attempts, 3);
        assert_eq!(metrics.connect_failures, 2);
    }

    #[test]
    fn test_stream_failure_does_not_abort_cycle() {
        let server = MockServer::new();
        server.fail_next_stream_starts(1);
        add_actor(&server, 1);
        let mut worker = worker(&server);

        let report = worker.poll_once();
        assert!(report.connected);
        assert_eq!(report.actors_found, 1);
        assert_eq!(worker.state(), ConnectionState::Connected);

        worker.poll_once();
        assert_eq!(worker.state(), ConnectionState::Streaming);
    }

    #[test]
    fn test_tags_replace_previous_snapshot() {
        let server = MockServer::new();
        let tag = |id| FiducialTag {
            id,
            position: [0.0, 500.0, 0.0],
            orientation: TagOrientation::Normal([1.0, 0.0, 0.0]),
        };
        server.set_tags(Some(vec![tag(1), tag(2)]));
        let mut worker = worker_with(
            &server,
            TrackingConfig {
                stream_ar_tags: true,
                ..Default::default()
            },
        );

        assert!(worker.poll_once().tags_published);
        server.set_tags(Some(vec![tag(3)]));
        worker.poll_once();

        let snapshot = worker.context().latest_tags();
        assert_eq!(snapshot.sequence, 2);
        assert_eq!(snapshot.tags.len(), 1);
        assert_eq!(snapshot.tags[0].id, 3);
        assert!((snapshot.tags[0].position.y - 0.5).abs() < 1e-9);
        assert_eq!(
            snapshot.tags[0].orientation,
            LocalTagOrientation::Normal(nalgebra::Vector3::new(-1.0, 0.0, 0.0))
        );
    }

    #[test]
    fn test_tag_block_without_sentinel_keeps_snapshot() {
        let server = MockServer::new();
        let tag = |id| FiducialTag {
            id,
            position: [0.0; 3],
            orientation: TagOrientation::Normal([0.0, 1.0, 0.0]),
        };
        server.set_tags(Some(vec![tag(5)]));
        let mut worker = worker_with(
            &server,
            TrackingConfig {
                stream_ar_tags: true,
                ..Default::default()
            },
        );
        assert!(worker.poll_once().tags_published);

        // 截掉结束标记
        let mut raw = encode_tags(&[tag(6), tag(7)]).to_vec();
        raw.truncate(2 * AR_TAG_RECORD_SIZE);
        server.set_raw_tags(Some(raw.into()));

        let report = worker.poll_once();
        assert!(report.connected);
        assert!(!report.tags_published);
        assert_eq!(report.decode_errors, 1);

        let snapshot = worker.context().latest_tags();
        assert_eq!(snapshot.sequence, 1);
        assert_eq!(snapshot.tags.len(), 1);
        assert_eq!(snapshot.tags[0].id, 5);

        server.set_raw_tags(None);
        assert!(worker.poll_once().tags_published);
        assert_eq!(worker.context().latest_tags().sequence, 2);
    }

    #[test]
    fn test_tags_not_requested_without_flag() {
        let server = MockServer::new();
        server.set_tags(Some(Vec::new()));
        let mut worker = worker(&server);
        assert!(!worker.poll_once().tags_published);
        assert_eq!(worker.context().latest_tags().sequence, 0);
    }

    #[test]
    fn test_marker_updates_by_wire_timestamp() {
        let server = MockServer::new();
        add_actor(&server, 1);
        let transform = MarkerTransform {
            rotation_rad: [0.0; 3],
            translation: [0.0, 1700.0, 0.0],
        };
        server.set_marker(1, 2, server.clock(), transform);

        let mut worker = worker(&server);
        let report = worker.poll_once();
        assert_eq!(report.markers_updated, 1);

        let ctx = worker.context().clone();
        let local = ctx.take_marker_transform(1).unwrap();
        assert!((local.position.y - 1.7).abs() < 1e-6);
        assert!(ctx.take_marker_transform(1).is_none());

        // 时间戳未变：不会重新出现
        assert_eq!(worker.poll_once().markers_updated, 0);

        server.advance_clock(1000);
        server.set_marker(1, 2, server.clock(), transform);
        assert_eq!(worker.poll_once().markers_updated, 1);
        assert!(ctx.take_marker_transform(1).is_some());

        server.clear_marker(1, 2);
        worker.poll_once();
        assert!(ctx.registry.lock().tracked(1).unwrap().marker.is_none());
    }

    #[test]
    fn test_stale_first_marker_is_consumed() {
        let server = MockServer::new();
        add_actor(&server, 1);
        server.set_clock(10_000_000);
        server.set_marker(1, 2, 9_000_000, MarkerTransform::default());

        let mut worker = worker(&server);
        assert_eq!(worker.poll_once().markers_updated, 0);
        assert!(worker.context().take_marker_transform(1).is_none());
    }

    #[test]
    fn test_markers_disabled_without_suffix() {
        let server = MockServer::new();
        add_actor(&server, 1);
        server.set_marker(1, 2, server.clock(), MarkerTransform::default());
        let mut worker = worker_with(
            &server,
            TrackingConfig {
                marker_joint_suffix: None,
                ..Default::default()
            },
        );
        assert_eq!(worker.poll_once().markers_updated, 0);
        assert!(worker.context().registry.lock().marker_targets().is_empty());
    }

    #[test]
    fn test_constraint_command() {
        let server = MockServer::new();
        add_actor(&server, 1);
        let mut worker = worker(&server);

        // 未连接时丢弃
        worker.handle_command(TrackerCommand::SetRotationConstraint {
            actor_id: 1,
            joint_index: 0,
            rotation: [0.0; 3],
        });
        assert!(server.constraints().is_empty());

        worker.poll_once();
        server.advance_clock(250);
        worker.handle_command(TrackerCommand::SetRotationConstraint {
            actor_id: 1,
            joint_index: 2,
            rotation: [10.0, 20.0, 30.0],
        });
        // 未知演员
        worker.handle_command(TrackerCommand::SetRotationConstraint {
            actor_id: 9,
            joint_index: 0,
            rotation: [0.0; 3],
        });

        let sent = server.constraints();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].rotation, [10.0, 20.0, 30.0]);
        assert_eq!(sent[0].timestamp, server.clock());
        assert_eq!(sent[0].weight, 1.0);

        let metrics = worker.context().metrics.snapshot();
        assert_eq!(metrics.constraints_sent, 1);
        assert_eq!(metrics.commands_dropped, 2);
    }

    #[test]
    fn test_constraint_with_out_of_range_joint_dropped() {
        let server = MockServer::new();
        add_actor(&server, 1);
        let mut worker = worker(&server);
        worker.poll_once();

        worker.handle_command(TrackerCommand::SetRotationConstraint {
            actor_id: 1,
            joint_index: 3,
            rotation: [0.0; 3],
        });
        assert!(server.constraints().is_empty());
        assert_eq!(worker.context().metrics.snapshot().commands_dropped, 1);

        worker.handle_command(TrackerCommand::SetRotationConstraint {
            actor_id: 1,
            joint_index: 2,
            rotation: [0.0; 3],
        });
        assert_eq!(server.constraints().len(), 1);
    }

    #[test]
    fn test_reconnects_after_connection_loss() {
        let server = MockServer::new();
        add_actor(&server, 1);
        let mut worker = worker(&server);
        worker.poll_once();

        server.drop_connection();
        let report = worker.poll_once();
        assert!(report.connected);
        assert_eq!(worker.state(), ConnectionState::Disconnected);
        assert_eq!(worker.context().metrics.snapshot().transport_errors, 1);

        worker.poll_once();
        assert_eq!(worker.state(), ConnectionState::Streaming);
        assert_eq!(server.connect_attempts(), 2);
        assert!(worker.context().actor(1).is_some());
    }

    #[test]
    fn test_reconnect_replaces_reused_actor_id() {
        let server = MockServer::new();
        add_actor(&server, 1);
        let mut worker = worker(&server);
        worker.poll_once();
        worker.context().drain_events();

        // 服务端重启后把 id 1 分配给另一副骨架
        server.drop_connection();
        let skeleton =
            MockServer::chain_actor(1, "other", &["Hips", "Spine", "Chest", "Neck", "Head"])
                .unwrap();
        server.add_actor(skeleton);
        worker.poll_once();
        worker.poll_once();
        assert_eq!(worker.state(), ConnectionState::Streaming);

        let ctx = worker.context().clone();
        let events = ctx.drain_events();
        assert_eq!(events.len(), 2);
        assert!(
            matches!(&events[0], TrackingEvent::ActorLost(a) if a.id() == 1 && a.joint_count() == 3)
        );
        assert!(
            matches!(&events[1], TrackingEvent::ActorFound(a) if a.id() == 1 && a.joint_count() == 5)
        );
        assert_eq!(ctx.actor(1).unwrap().name(), "other");

        for _ in 0..20 {
            worker.poll_once();
        }
        assert_eq!(ctx.latest_pose(1).unwrap().joints.len(), 5);
        let metrics = ctx.metrics.snapshot();
        assert_eq!(metrics.decode_errors, 0);
        assert_eq!(metrics.actors_lost, 1);
    }

    #[test]
    fn test_shutdown_stops_streaming() {
        let server = MockServer::new();
        let mut worker = worker(&server);
        worker.poll_once();
        worker.shutdown();
        assert_eq!(server.stop_stream_calls(), 1);
        assert!(!server.is_connected());
        assert_eq!(worker.context().connection_state(), ConnectionState::Disconnected);
    }
}
