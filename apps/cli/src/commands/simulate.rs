//! 模拟跟踪命令
//!
//! 在进程内启动模拟服务端（演员沿圆周行走、相机、AR 标记、头部标记），
//! 用后台跟踪线程连接它，并在前台按帧率运行 `PoseSink`，打印事件和根关节位置。

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::f32::consts::TAU;
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use captury_sdk::prelude::*;
use captury_sdk::protocol::{
    CameraDescriptor, FiducialTag, JointPose, MarkerTransform, TagOrientation,
};
use captury_sdk::transport::MockServer;
use clap::Args;
use nalgebra::{UnitQuaternion, Vector3};
use tracing::{info, warn};

use crate::config::{CliConfig, SimulationConfig};

#[derive(Args, Debug)]
pub struct SimulateCommand {
    /// 服务端地址（覆盖配置文件）
    #[arg(long)]
    pub host: Option<String>,

    /// 服务端端口（覆盖配置文件）
    #[arg(short, long)]
    pub port: Option<u16>,

    /// 轮询间隔（毫秒）
    #[arg(long)]
    pub poll_interval_ms: Option<u64>,

    /// 同时请求 AR 标记流
    #[arg(long)]
    pub ar_tags: bool,

    /// 演员数量
    #[arg(short, long)]
    pub actors: Option<u32>,

    /// 消费端帧率（Hz）
    #[arg(short, long, default_value_t = 30)]
    pub frequency: u32,

    /// 运行时长（秒），不指定时运行到 Ctrl-C
    #[arg(short, long)]
    pub duration: Option<f64>,

    /// 每秒把头部旋转作为约束发回服务端
    #[arg(long)]
    pub feedback: bool,
}

impl SimulateCommand {
    /// 配置文件 + 命令行参数
    pub fn resolve(&self, mut config: CliConfig) -> Result<CliConfig> {
        if let Some(host) = &self.host {
            config.tracking.host = host.clone();
        }
        if let Some(port) = self.port {
            config.tracking.port = port;
        }
        if let Some(interval) = self.poll_interval_ms {
            config.tracking.poll_interval_ms = interval;
        }
        if self.ar_tags {
            config.tracking.stream_ar_tags = true;
        }
        if let Some(actors) = self.actors {
            config.simulation.actors = actors;
        }
        config.tracking.validate().context("配置无效")?;
        Ok(config)
    }

    pub fn execute(self, config_path: &Path) -> Result<()> {
        let config = self.resolve(CliConfig::load(config_path)?)?;
        let frequency = self.frequency.max(1);

        let running = Arc::new(AtomicBool::new(true));
        {
            let running = running.clone();
            ctrlc::set_handler(move || {
                running.store(false, Ordering::SeqCst);
            })
            .context("无法安装 Ctrl-C 处理器")?;
        }

        let server = MockServer::new();
        let animator = Animator::new(&config.simulation)?;
        animator.install(&server, config.tracking.stream_ar_tags);
        let animation = animator.spawn(server.clone(), running.clone())?;

        let tracker = TrackerBuilder::from_config(config.tracking.clone())
            .build(server.transport())
            .context("启动跟踪线程失败")?;
        println!(
            "▶ 模拟 {} 个演员，轮询 {}:{}（间隔 {} ms），Ctrl-C 停止",
            config.simulation.actors,
            config.tracking.host,
            config.tracking.port,
            config.tracking.poll_interval_ms
        );

        let roots: Rc<RefCell<BTreeMap<i32, SharedTransform>>> = Rc::default();
        let factory_roots = roots.clone();
        let mut sink = PoseSink::from_tracker(&tracker)
            .with_tag_stale_after_frames(Some(frequency * 2))
            .with_binding_factory(move |actor| {
                let root = SharedTransform::new();
                let mut binding = ActorBinding::empty(actor);
                binding.bind(0, Box::new(root.clone()));
                factory_roots.borrow_mut().insert(actor.id(), root);
                Some(binding)
            });
        sink.add_listener(ConsoleListener {
            roots: roots.clone(),
        });

        let frame = Duration::from_secs_f64(1.0 / f64::from(frequency));
        let deadline = self
            .duration
            .map(Duration::try_from_secs_f64)
            .transpose()
            .context("无效的运行时长")?
            .map(|d| Instant::now() + d);
        let mut last_report = Instant::now();

        while running.load(Ordering::SeqCst) && deadline.is_none_or(|d| Instant::now() < d) {
            let started = Instant::now();
            sink.update();

            if last_report.elapsed() >= Duration::from_secs(1) {
                last_report = Instant::now();
                for (id, root) in roots.borrow().iter() {
                    let p = root.get().position;
                    println!("  actor {id}: root = ({:+.3}, {:+.3}, {:+.3}) m", p.x, p.y, p.z);
                    if let Some(marker) = sink.take_marker_transform(*id) {
                        let m = marker.position;
                        println!("  actor {id}: marker = ({:+.3}, {:+.3}, {:+.3}) m", m.x, m.y, m.z);
                    }
                    if self.feedback {
                        let rotation = UnitQuaternion::from_euler_angles(0.0, 0.3, 0.0);
                        if let Err(e) = sink.set_rotation_constraint(*id, "Head", &rotation) {
                            warn!("Failed to queue rotation constraint: {}", e);
                        }
                    }
                }
            }

            if let Some(rest) = frame.checked_sub(started.elapsed()) {
                thread::sleep(rest);
            }
        }

        running.store(false, Ordering::SeqCst);
        let metrics = tracker.metrics();
        tracker.shutdown();
        if animation.join().is_err() {
            warn!("Animation thread panicked");
        }

        println!("■ 统计: {:#?}", metrics);
        println!("  约束: {} 条已发送到服务端", server.constraints().len());
        Ok(())
    }
}

/// 打印事件的监听器
struct ConsoleListener {
    roots: Rc<RefCell<BTreeMap<i32, SharedTransform>>>,
}

impl TrackingListener for ConsoleListener {
    fn on_actor_found(&mut self, actor: &Actor) {
        println!(
            "+ actor {} '{}' ({} joints)",
            actor.id(),
            actor.name(),
            actor.joint_count()
        );
    }

    fn on_actor_lost(&mut self, actor: &Actor) {
        self.roots.borrow_mut().remove(&actor.id());
        println!("- actor {} '{}'", actor.id(), actor.name());
    }

    fn on_tags_detected(&mut self, tags: &[LocalTag]) {
        let ids: Vec<i32> = tags.iter().map(|t| t.id).collect();
        println!("  tags: {:?}", ids);
    }

    fn on_cameras_changed(
        &mut self,
        positions: &[Vector3<f64>],
        _orientations: &[UnitQuaternion<f64>],
    ) {
        println!("  cameras: {}", positions.len());
    }

    fn on_tags_stale(&mut self) {
        println!("  tags: stale");
    }
}

/// 模拟服务端的场景
#[derive(Debug, Clone)]
struct Animator {
    actors: Vec<Actor>,
    server_fps: u32,
    tags: u32,
    cameras: u32,
}

impl Animator {
    fn new(config: &SimulationConfig) -> Result<Self> {
        let joints: Vec<&str> = config.joints.iter().map(String::as_str).collect();
        let actors = (1..=config.actors)
            .map(|i| {
                let id = i as i32;
                MockServer::chain_actor(id, &format!("performer{id}"), &joints)
                    .with_context(|| format!("无效的骨架定义: {:?}", config.joints))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            actors,
            server_fps: config.server_fps.max(1),
            tags: config.tags,
            cameras: config.cameras,
        })
    }

    /// 注册演员、相机和标记
    fn install(&self, server: &MockServer, with_tags: bool) {
        server.set_clock(1_000_000);
        for actor in &self.actors {
            server.add_actor(actor.clone());
        }
        server.set_cameras(self.camera_ring());
        if with_tags {
            server.set_tags(Some(self.tags_at(0.0)));
        }
    }

    fn camera_ring(&self) -> Vec<CameraDescriptor> {
        (0..self.cameras)
            .map(|i| {
                let angle = TAU * i as f32 / self.cameras as f32;
                CameraDescriptor {
                    id: i as i32,
                    name: format!("cam{i}"),
                    position: [4000.0 * angle.cos(), 2500.0, 4000.0 * angle.sin()],
                    orientation: [-20.0, angle.to_degrees() + 180.0, 0.0],
                    sensor_width: 11.3,
                    sensor_height: 7.1,
                    focal_length: 8.0,
                    distortion_model: "none".into(),
                    ..Default::default()
                }
            })
            .collect()
    }

    fn tags_at(&self, t: f32) -> Vec<FiducialTag> {
        (0..self.tags)
            .map(|i| FiducialTag {
                id: i as i32,
                position: [500.0 * i as f32, 0.0, 1000.0 + 100.0 * t.sin()],
                orientation: TagOrientation::Normal([0.0, 1.0, 0.0]),
            })
            .collect()
    }

    /// 第 `index` 个演员在时刻 `t`（秒）的姿态：根关节沿圆周行走
    fn pose_at(&self, index: usize, joint_count: usize, t: f32) -> Vec<JointPose> {
        let phase = t * 0.5 + index as f32 * TAU / self.actors.len().max(1) as f32;
        let mut joints = vec![JointPose::default(); joint_count];
        if let Some(root) = joints.first_mut() {
            root.position = [1500.0 * phase.cos(), 950.0, 1500.0 * phase.sin()];
            root.rotation = [0.0, -phase.to_degrees(), 0.0];
        }
        for joint in joints.iter_mut().skip(1) {
            joint.rotation = [5.0 * (t * 2.0).sin(), 0.0, 0.0];
        }
        joints
    }

    fn spawn(self, server: MockServer, running: Arc<AtomicBool>) -> Result<thread::JoinHandle<()>> {
        thread::Builder::new()
            .name("captury-sim".into())
            .spawn(move || self.run(&server, &running))
            .context("无法启动模拟线程")
    }

    fn run(&self, server: &MockServer, running: &AtomicBool) {
        let tick = Duration::from_secs_f64(1.0 / f64::from(self.server_fps));
        let tick_us = tick.as_micros() as u64;
        let start = Instant::now();
        info!("Simulated server running at {} fps", self.server_fps);

        while running.load(Ordering::SeqCst) {
            let t = start.elapsed().as_secs_f32();
            server.advance_clock(tick_us);
            for (index, actor) in self.actors.iter().enumerate() {
                let joints = self.pose_at(index, actor.joint_count(), t);
                server.set_pose(actor.id(), &joints);

                // 最后一个关节作为头部标记
                if let Some(head) = joints.last() {
                    server.set_marker(
                        actor.id(),
                        actor.joint_count() - 1,
                        server.clock(),
                        MarkerTransform {
                            rotation_rad: head.rotation.map(f32::to_radians),
                            translation: [head.position[0], 1700.0, head.position[2]],
                        },
                    );
                }
            }
            if self.tags > 0 && server.stream_mode().is_some_and(StreamMode::includes_ar_tags) {
                server.set_tags(Some(self.tags_at(t)));
            }
            thread::sleep(tick);
        }
    }
}
