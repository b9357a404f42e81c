//! 进程内模拟服务端
//!
//! `MockServer` 是可克隆的控制句柄，`MockTransport` 是交给会话的传输实现，
//! 两者共享同一份服务端状态。测试通过控制句柄布置场景（演员、姿态、标记、相机）、
//! 注入故障，并检查客户端发回的旋转约束。
//!
//! 返回的记录按服务端的原生布局编码（小端、定长、嵌入偏移量）。

use std::collections::HashMap;
use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};
use parking_lot::Mutex;
use tracing::trace;

use captury_protocol::{
    ACTOR_NAME_LEN, ACTOR_RECORD_SIZE, ACTOR_RECORD_STRIDE, AR_TAG_RECORD_SIZE, AR_TAG_SENTINEL,
    Actor, CAMERA_DISTORTION_MODEL_LEN, CAMERA_NAME_LEN, CAMERA_RECORD_SIZE, CameraDescriptor,
    DecodeError, FiducialTag, JOINT_NAME_LEN, JOINT_RECORD_SIZE, Joint, JointPose, MarkerTransform,
    POSE_HEADER_SIZE, TRANSFORM_RECORD_SIZE, TagOrientation, VALUES_PER_JOINT,
    decode_rotation_constraint,
};

use crate::{
    ROTATION_CONSTRAINT_SIZE, RawBlock, RemoteError, RemoteErrorKind, RemoteTransport, StreamMode,
    TimestampedRecord, TransportError,
};

/// 模拟服务端的初始时钟（微秒），非零以便时钟同步成功
pub const MOCK_INITIAL_CLOCK_US: u64 = 1_000_000;

/// 客户端发回的一条旋转约束
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedConstraint {
    pub actor_id: i32,
    pub joint_index: usize,
    /// 服务端欧拉角（度）
    pub rotation: [f32; 3],
    pub timestamp: u64,
    pub weight: f32,
}

#[derive(Debug, Clone)]
enum PoseSource {
    Values(Vec<f32>),
    Raw(Bytes),
    Missing,
}

#[derive(Debug, Clone)]
struct MockActor {
    actor: Actor,
    pose: PoseSource,
}

#[derive(Debug)]
struct ServerState {
    actors: Vec<MockActor>,
    tags: Option<Vec<FiducialTag>>,
    cameras: Vec<CameraDescriptor>,
    markers: HashMap<(i32, usize), (u64, MarkerTransform)>,
    clock_us: u64,
    time_offset_us: i64,

    // 故障注入
    failing_connects: u32,
    clock_sync_broken: bool,
    failing_stream_starts: u32,
    connection_dropped: bool,
    last_error: Option<String>,
    raw_actors: Option<RawBlock>,
    raw_tags: Option<Bytes>,
    raw_cameras: Option<RawBlock>,

    // 观测
    connected: bool,
    stream_mode: Option<StreamMode>,
    connect_attempts: u32,
    stop_stream_calls: u32,
    constraints: Vec<RecordedConstraint>,
}

impl Default for ServerState {
    fn default() -> Self {
        Self {
            actors: Vec::new(),
            tags: None,
            cameras: Vec::new(),
            markers: HashMap::new(),
            clock_us: MOCK_INITIAL_CLOCK_US,
            time_offset_us: 0,
            failing_connects: 0,
            clock_sync_broken: false,
            failing_stream_starts: 0,
            connection_dropped: false,
            last_error: None,
            raw_actors: None,
            raw_tags: None,
            raw_cameras: None,
            connected: false,
            stream_mode: None,
            connect_attempts: 0,
            stop_stream_calls: 0,
            constraints: Vec::new(),
        }
    }
}

impl ServerState {
    /// 每个请求前检查会话；被注入断线时本次请求失败并关闭会话
    fn check_session(&mut self) -> Result<(), TransportError> {
        if self.connection_dropped {
            self.connection_dropped = false;
            self.connected = false;
            self.stream_mode = None;
            self.last_error = Some("connection reset by peer".to_string());
            return Err(TransportError::ConnectionLost);
        }
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        Ok(())
    }

    fn actor_mut(&mut self, actor_id: i32) -> Option<&mut MockActor> {
        self.actors.iter_mut().find(|a| a.actor.id() == actor_id)
    }
}

/// 模拟服务端控制句柄
#[derive(Debug, Clone, Default)]
pub struct MockServer {
    state: Arc<Mutex<ServerState>>,
}

impl MockServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建连接到该服务端的传输实现
    pub fn transport(&self) -> MockTransport {
        MockTransport {
            state: self.state.clone(),
        }
    }

    /// 构造一条链式骨架：每个关节的父关节是前一个关节
    pub fn chain_actor(id: i32, name: &str, joint_names: &[&str]) -> Result<Actor, DecodeError> {
        let joints = joint_names
            .iter()
            .enumerate()
            .map(|(i, joint)| Joint {
                name: (*joint).to_string(),
                parent: i.checked_sub(1),
                rest_offset: [0.0, if i == 0 { 0.0 } else { 100.0 }, 0.0],
                rest_orientation: [0.0; 3],
            })
            .collect();
        Actor::new(id, name, joints)
    }

    /// 添加演员，初始姿态全为零
    pub fn add_actor(&self, actor: Actor) {
        let mut st = self.state.lock();
        let values = vec![0.0; actor.joint_count() * VALUES_PER_JOINT];
        st.actors.retain(|a| a.actor.id() != actor.id());
        st.actors.push(MockActor {
            actor,
            pose: PoseSource::Values(values),
        });
    }

    pub fn remove_actor(&self, actor_id: i32) {
        self.state.lock().actors.retain(|a| a.actor.id() != actor_id);
    }

    pub fn actor_ids(&self) -> Vec<i32> {
        self.state.lock().actors.iter().map(|a| a.actor.id()).collect()
    }

    pub fn set_pose(&self, actor_id: i32, joints: &[JointPose]) {
        let values = joints
            .iter()
            .flat_map(|j| j.position.into_iter().chain(j.rotation))
            .collect();
        self.set_pose_values(actor_id, values);
    }

    /// 设置原始姿态值（允许与关节数不一致，用于构造畸形帧）
    pub fn set_pose_values(&self, actor_id: i32, values: Vec<f32>) {
        if let Some(entry) = self.state.lock().actor_mut(actor_id) {
            entry.pose = PoseSource::Values(values);
        }
    }

    /// 直接设置姿态记录字节
    pub fn set_raw_pose(&self, actor_id: i32, raw: Bytes) {
        if let Some(entry) = self.state.lock().actor_mut(actor_id) {
            entry.pose = PoseSource::Raw(raw);
        }
    }

    /// 之后的姿态请求返回“无数据”
    pub fn clear_pose(&self, actor_id: i32) {
        if let Some(entry) = self.state.lock().actor_mut(actor_id) {
            entry.pose = PoseSource::Missing;
        }
    }

    /// `None` 表示服务端没有标记数据
    pub fn set_tags(&self, tags: Option<Vec<FiducialTag>>) {
        self.state.lock().tags = tags;
    }

    pub fn set_cameras(&self, cameras: Vec<CameraDescriptor>) {
        self.state.lock().cameras = cameras;
    }

    /// 演员列表请求直接返回该记录块（`None` 恢复按演员编码）
    pub fn set_raw_actors(&self, block: Option<RawBlock>) {
        self.state.lock().raw_actors = block;
    }

    /// 标记请求直接返回该字节串（仍要求流模式包含标记）
    pub fn set_raw_tags(&self, raw: Option<Bytes>) {
        self.state.lock().raw_tags = raw;
    }

    pub fn set_raw_cameras(&self, block: Option<RawBlock>) {
        self.state.lock().raw_cameras = block;
    }

    pub fn set_marker(
        &self,
        actor_id: i32,
        joint_index: usize,
        timestamp: u64,
        transform: MarkerTransform,
    ) {
        self.state
            .lock()
            .markers
            .insert((actor_id, joint_index), (timestamp, transform));
    }

    pub fn clear_marker(&self, actor_id: i32, joint_index: usize) {
        self.state.lock().markers.remove(&(actor_id, joint_index));
    }

    pub fn clock(&self) -> u64 {
        self.state.lock().clock_us
    }

    pub fn set_clock(&self, clock_us: u64) {
        self.state.lock().clock_us = clock_us;
    }

    pub fn advance_clock(&self, delta_us: u64) {
        let mut st = self.state.lock();
        st.clock_us = st.clock_us.saturating_add(delta_us);
    }

    pub fn set_time_offset(&self, offset_us: i64) {
        self.state.lock().time_offset_us = offset_us;
    }

    /// 之后的 `n` 次连接请求失败
    pub fn fail_next_connects(&self, n: u32) {
        self.state.lock().failing_connects = n;
    }

    /// 时钟同步返回 0
    pub fn set_clock_sync_broken(&self, broken: bool) {
        self.state.lock().clock_sync_broken = broken;
    }

    pub fn fail_next_stream_starts(&self, n: u32) {
        self.state.lock().failing_stream_starts = n;
    }

    /// 下一次请求返回 `ConnectionLost` 并关闭会话
    pub fn drop_connection(&self) {
        self.state.lock().connection_dropped = true;
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    pub fn stream_mode(&self) -> Option<StreamMode> {
        self.state.lock().stream_mode
    }

    pub fn connect_attempts(&self) -> u32 {
        self.state.lock().connect_attempts
    }

    pub fn stop_stream_calls(&self) -> u32 {
        self.state.lock().stop_stream_calls
    }

    pub fn constraints(&self) -> Vec<RecordedConstraint> {
        self.state.lock().constraints.clone()
    }
}

/// 模拟传输实现
#[derive(Debug)]
pub struct MockTransport {
    state: Arc<Mutex<ServerState>>,
}

impl RemoteTransport for MockTransport {
    fn connect(&mut self, host: &str, port: u16) -> Result<(), TransportError> {
        let mut st = self.state.lock();
        st.connect_attempts += 1;
        if st.failing_connects > 0 {
            st.failing_connects -= 1;
            let message = format!("connection to {host}:{port} refused");
            st.last_error = Some(message.clone());
            return Err(RemoteError::new(RemoteErrorKind::Refused, message).into());
        }
        trace!("mock server accepted connection from client for {host}:{port}");
        st.connected = true;
        st.connection_dropped = false;
        st.stream_mode = None;
        Ok(())
    }

    fn disconnect(&mut self) {
        let mut st = self.state.lock();
        st.connected = false;
        st.stream_mode = None;
    }

    fn synchronize_time(&mut self) -> Result<u64, TransportError> {
        let mut st = self.state.lock();
        st.check_session()?;
        if st.clock_sync_broken {
            st.last_error = Some("clock synchronization timed out".to_string());
            return Ok(0);
        }
        Ok(st.clock_us)
    }

    fn time_offset(&self) -> i64 {
        self.state.lock().time_offset_us
    }

    fn server_time(&self) -> u64 {
        self.state.lock().clock_us
    }

    fn start_streaming(&mut self, mode: StreamMode) -> Result<(), TransportError> {
        let mut st = self.state.lock();
        st.check_session()?;
        if st.failing_stream_starts > 0 {
            st.failing_stream_starts -= 1;
            st.last_error = Some("stream request rejected".to_string());
            return Err(RemoteError::new(RemoteErrorKind::Rejected, "stream request rejected").into());
        }
        st.stream_mode = Some(mode);
        Ok(())
    }

    fn stop_streaming(&mut self) -> Result<(), TransportError> {
        let mut st = self.state.lock();
        st.check_session()?;
        st.stop_stream_calls += 1;
        st.stream_mode = None;
        Ok(())
    }

    fn get_actors(&mut self) -> Result<RawBlock, TransportError> {
        let mut st = self.state.lock();
        st.check_session()?;
        if let Some(block) = &st.raw_actors {
            return Ok(block.clone());
        }
        let actors: Vec<&Actor> = st.actors.iter().map(|a| &a.actor).collect();
        Ok(RawBlock {
            count: actors.len() as i32,
            data: encode_actors(&actors),
        })
    }

    fn get_current_pose(&mut self, actor_id: i32) -> Result<Option<Bytes>, TransportError> {
        let mut st = self.state.lock();
        st.check_session()?;
        if st.stream_mode.is_none() {
            st.last_error = Some("not streaming".to_string());
            return Ok(None);
        }
        let clock = st.clock_us;
        let pose = st
            .actors
            .iter()
            .find(|a| a.actor.id() == actor_id)
            .map(|a| a.pose.clone());
        match pose {
            Some(PoseSource::Values(values)) => {
                Ok(Some(encode_pose(actor_id, clock as i64, &values)))
            },
            Some(PoseSource::Raw(raw)) => Ok(Some(raw)),
            Some(PoseSource::Missing) | None => {
                st.last_error = Some(format!("no pose for actor {actor_id}"));
                Ok(None)
            },
        }
    }

    fn get_current_ar_tags(&mut self) -> Result<Option<Bytes>, TransportError> {
        let mut st = self.state.lock();
        st.check_session()?;
        if !st.stream_mode.is_some_and(StreamMode::includes_ar_tags) {
            st.last_error = Some("AR tag streaming not enabled".to_string());
            return Ok(None);
        }
        if let Some(raw) = &st.raw_tags {
            return Ok(Some(raw.clone()));
        }
        match &st.tags {
            Some(tags) => Ok(Some(encode_tags(tags))),
            None => {
                st.last_error = Some("no AR tags".to_string());
                Ok(None)
            },
        }
    }

    fn get_cameras(&mut self) -> Result<RawBlock, TransportError> {
        let mut st = self.state.lock();
        st.check_session()?;
        if let Some(block) = &st.raw_cameras {
            return Ok(block.clone());
        }
        Ok(RawBlock {
            count: st.cameras.len() as i32,
            data: encode_cameras(&st.cameras),
        })
    }

    fn get_marker_transform(
        &mut self,
        actor_id: i32,
        joint_index: usize,
    ) -> Result<Option<TimestampedRecord>, TransportError> {
        let mut st = self.state.lock();
        st.check_session()?;
        Ok(st
            .markers
            .get(&(actor_id, joint_index))
            .map(|(timestamp, transform)| TimestampedRecord {
                timestamp: *timestamp,
                data: encode_transform(transform),
            }))
    }

    fn set_rotation_constraint(
        &mut self,
        actor_id: i32,
        joint_index: usize,
        rotation: &[u8; ROTATION_CONSTRAINT_SIZE],
        timestamp: u64,
        weight: f32,
    ) -> Result<(), TransportError> {
        let mut st = self.state.lock();
        st.check_session()?;
        let rotation = decode_rotation_constraint(rotation)
            .map_err(|e| RemoteError::new(RemoteErrorKind::InvalidResponse, e.to_string()))?;
        st.constraints.push(RecordedConstraint {
            actor_id,
            joint_index,
            rotation,
            timestamp,
            weight,
        });
        Ok(())
    }

    fn last_error_message(&mut self) -> Option<String> {
        self.state.lock().last_error.take()
    }
}

fn put_fixed_str(buf: &mut BytesMut, s: &str, width: usize) {
    let bytes = s.as_bytes();
    let n = bytes.len().min(width);
    buf.put_slice(&bytes[..n]);
    buf.put_bytes(0, width - n);
}

fn put_vec3(buf: &mut BytesMut, v: [f32; 3]) {
    for value in v {
        buf.put_f32_le(value);
    }
}

/// 演员数组（步长 64）后接所有关节数组，`joints` 字段指向各自的关节数组
pub fn encode_actors(actors: &[&Actor]) -> Bytes {
    let joint_total: usize = actors.iter().map(|a| a.joint_count()).sum();
    let mut buf =
        BytesMut::with_capacity(actors.len() * ACTOR_RECORD_STRIDE + joint_total * JOINT_RECORD_SIZE);

    let mut joints_at = actors.len() * ACTOR_RECORD_STRIDE;
    for actor in actors {
        put_fixed_str(&mut buf, actor.name(), ACTOR_NAME_LEN);
        buf.put_i32_le(actor.id());
        buf.put_i32_le(actor.joint_count() as i32);
        buf.put_u64_le(joints_at as u64);
        buf.put_bytes(0, ACTOR_RECORD_STRIDE - ACTOR_RECORD_SIZE);
        joints_at += actor.joint_count() * JOINT_RECORD_SIZE;
    }

    for joint in actors.iter().flat_map(|a| a.joints()) {
        put_fixed_str(&mut buf, &joint.name, JOINT_NAME_LEN);
        buf.put_i32_le(joint.parent.map_or(-1, |p| p as i32));
        put_vec3(&mut buf, joint.rest_offset);
        put_vec3(&mut buf, joint.rest_orientation);
    }

    buf.freeze()
}

pub fn encode_pose(actor_id: i32, timestamp: i64, values: &[f32]) -> Bytes {
    let mut buf = BytesMut::with_capacity(POSE_HEADER_SIZE + values.len() * 4);
    buf.put_i32_le(actor_id);
    buf.put_i64_le(timestamp);
    buf.put_i32_le(values.len() as i32);
    buf.put_u64_le(POSE_HEADER_SIZE as u64);
    for value in values {
        buf.put_f32_le(*value);
    }
    buf.freeze()
}

pub fn encode_tags(tags: &[FiducialTag]) -> Bytes {
    let mut buf = BytesMut::with_capacity((tags.len() + 1) * AR_TAG_RECORD_SIZE);
    for tag in tags {
        buf.put_i32_le(tag.id);
        put_vec3(&mut buf, tag.position);
        let triple = match tag.orientation {
            TagOrientation::Normal(v) | TagOrientation::Euler(v) => v,
        };
        put_vec3(&mut buf, triple);
    }
    buf.put_i32_le(AR_TAG_SENTINEL);
    buf.put_bytes(0, AR_TAG_RECORD_SIZE - 4);
    buf.freeze()
}

pub fn encode_cameras(cameras: &[CameraDescriptor]) -> Bytes {
    let mut buf = BytesMut::with_capacity(cameras.len() * CAMERA_RECORD_SIZE);
    for camera in cameras {
        put_fixed_str(&mut buf, &camera.name, CAMERA_NAME_LEN);
        buf.put_i32_le(camera.id);
        put_vec3(&mut buf, camera.position);
        put_vec3(&mut buf, camera.orientation);
        for value in [
            camera.sensor_width,
            camera.sensor_height,
            camera.focal_length,
            camera.lens_center_x,
            camera.lens_center_y,
        ] {
            buf.put_f32_le(value);
        }
        put_fixed_str(&mut buf, &camera.distortion_model, CAMERA_DISTORTION_MODEL_LEN);
        for value in camera
            .distortion
            .iter()
            .chain(&camera.extrinsic)
            .chain(&camera.intrinsic)
        {
            buf.put_f32_le(*value);
        }
    }
    buf.freeze()
}

pub fn encode_transform(transform: &MarkerTransform) -> Bytes {
    let mut buf = BytesMut::with_capacity(TRANSFORM_RECORD_SIZE);
    put_vec3(&mut buf, transform.rotation_rad);
    put_vec3(&mut buf, transform.translation);
    buf.freeze()
}
