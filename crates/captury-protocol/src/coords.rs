//! 坐标系转换
//!
//! 服务端使用右手系，本地（消费端）使用左手系，两者都是 Y 轴向上。
//! 位置转换翻转 X 轴并乘以比例因子；旋转按 Z∘Y∘X 顺序组合三个基本旋转，
//! 其中 Y、Z 轴方向取反。
//!
//! 所有计算使用 `f64`：`f32` 在接近万向节锁时无法保证往返误差小于 1e-3 度。

use nalgebra::{UnitQuaternion, Vector3};

use crate::camera::CameraDescriptor;
use crate::pose::JointPose;
use crate::tag::{FiducialTag, TagOrientation};
use crate::transform::MarkerTransform;

/// 俯仰角余弦低于该阈值时进入万向节锁分支
pub const GIMBAL_LOCK_THRESHOLD: f64 = 0.005;

fn widen(v: [f32; 3]) -> [f64; 3] {
    v.map(f64::from)
}

/// 服务端欧拉角（度）转本地旋转：`Rz(-z) · Ry(-y) · Rx(x)`
pub fn to_local_rotation(euler_deg: [f64; 3]) -> UnitQuaternion<f64> {
    let [x, y, z] = euler_deg;
    let qx = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), x.to_radians());
    let qy = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), -y.to_radians());
    let qz = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), -z.to_radians());
    qz * qy * qx
}

/// 本地旋转转服务端欧拉角（度），[`to_local_rotation`] 的逆
///
/// 俯仰角接近 ±90° 时（`|cos b| <= 0.005`）绕 Z 的分量固定为 0，
/// 剩余角度由 `R[0][1]`、`R[1][1]` 求出，分支由交叉项 `R[2][0]` 的符号决定。
pub fn to_server_rotation(rotation: &UnitQuaternion<f64>) -> [f64; 3] {
    let r = rotation.to_rotation_matrix();
    let m = r.matrix();

    let b = (-m[(2, 0)]).clamp(-1.0, 1.0).asin();
    let (a, c) = if b.cos().abs() > GIMBAL_LOCK_THRESHOLD {
        (m[(2, 1)].atan2(m[(2, 2)]), m[(1, 0)].atan2(m[(0, 0)]))
    } else if m[(2, 0)] < 0.0 {
        (m[(0, 1)].atan2(m[(1, 1)]), 0.0)
    } else {
        ((-m[(0, 1)]).atan2(m[(1, 1)]), 0.0)
    };

    [a.to_degrees(), -b.to_degrees(), -c.to_degrees()]
}

/// 本地坐标系下的刚体变换（米 + 四元数）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalTransform {
    pub position: Vector3<f64>,
    pub rotation: UnitQuaternion<f64>,
}

impl Default for LocalTransform {
    fn default() -> Self {
        Self {
            position: Vector3::zeros(),
            rotation: UnitQuaternion::identity(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LocalTagOrientation {
    Normal(Vector3<f64>),
    Rotation(UnitQuaternion<f64>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalTag {
    pub id: i32,
    pub position: Vector3<f64>,
    pub orientation: LocalTagOrientation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocalCamera {
    pub id: i32,
    pub name: String,
    pub position: Vector3<f64>,
    pub orientation: UnitQuaternion<f64>,
}

/// 服务端 ↔ 本地坐标转换器
///
/// 比例因子来自配置（默认 0.001，毫米转米），会话期间不可变。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateAdapter {
    scale_factor: f64,
}

impl Default for CoordinateAdapter {
    fn default() -> Self {
        Self::new(0.001)
    }
}

impl CoordinateAdapter {
    pub fn new(scale_factor: f64) -> Self {
        Self { scale_factor }
    }

    pub fn scale_factor(&self) -> f64 {
        self.scale_factor
    }

    /// `(-x·s, y·s, z·s)`
    pub fn to_local_position(&self, position: [f32; 3]) -> Vector3<f64> {
        let [x, y, z] = widen(position);
        Vector3::new(-x, y, z) * self.scale_factor
    }

    pub fn to_server_position(&self, position: &Vector3<f64>) -> [f64; 3] {
        let p = position / self.scale_factor;
        [-p.x, p.y, p.z]
    }

    /// 方向向量只翻转 X，不缩放
    pub fn to_local_direction(&self, direction: [f32; 3]) -> Vector3<f64> {
        let [x, y, z] = widen(direction);
        Vector3::new(-x, y, z)
    }

    pub fn joint_to_local(&self, pose: &JointPose) -> LocalTransform {
        LocalTransform {
            position: self.to_local_position(pose.position),
            rotation: to_local_rotation(widen(pose.rotation)),
        }
    }

    /// 标记变换的旋转以弧度传输，先转角度
    pub fn marker_to_local(&self, transform: &MarkerTransform) -> LocalTransform {
        LocalTransform {
            position: self.to_local_position(transform.translation),
            rotation: to_local_rotation(transform.rotation_rad.map(|r| f64::from(r).to_degrees())),
        }
    }

    pub fn tag_to_local(&self, tag: &FiducialTag) -> LocalTag {
        let orientation = match tag.orientation {
            TagOrientation::Normal(n) => LocalTagOrientation::Normal(self.to_local_direction(n)),
            TagOrientation::Euler(e) => LocalTagOrientation::Rotation(to_local_rotation(widen(e))),
        };
        LocalTag {
            id: tag.id,
            position: self.to_local_position(tag.position),
            orientation,
        }
    }

    pub fn camera_to_local(&self, camera: &CameraDescriptor) -> LocalCamera {
        LocalCamera {
            id: camera.id,
            name: camera.name.clone(),
            position: self.to_local_position(camera.position),
            orientation: to_local_rotation(widen(camera.orientation)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const TOLERANCE_DEG: f64 = 1e-3;

    /// 角度差（考虑 ±180° 环绕）
    fn angle_diff(a: f64, b: f64) -> f64 {
        let d = (a - b).rem_euclid(360.0);
        d.min(360.0 - d)
    }

    fn assert_angles_close(actual: [f64; 3], expected: [f64; 3]) {
        for axis in 0..3 {
            assert!(
                angle_diff(actual[axis], expected[axis]) < TOLERANCE_DEG,
                "axis {axis}: {actual:?} vs {expected:?}"
            );
        }
    }

    fn round_trip(euler: [f64; 3]) {
        let server = to_server_rotation(&to_local_rotation(euler));
        let again = to_server_rotation(&to_local_rotation(server));
        assert_angles_close(again, server);
    }

    #[test]
    fn test_position_flip_and_scale() {
        let adapter = CoordinateAdapter::new(0.001);
        let local = adapter.to_local_position([1000.0, 0.0, 0.0]);
        assert_eq!(local, Vector3::new(-1.0, 0.0, 0.0));

        let local = adapter.to_local_position([250.0, 1500.0, -500.0]);
        assert!((local - Vector3::new(-0.25, 1.5, -0.5)).norm() < 1e-12);

        let back = adapter.to_server_position(&local);
        assert!((back[0] - 250.0).abs() < 1e-9);
        assert!((back[2] + 500.0).abs() < 1e-9);
    }

    #[test]
    fn test_scale_is_configuration() {
        let adapter = CoordinateAdapter::new(0.01);
        assert_eq!(adapter.to_local_position([100.0, 0.0, 0.0]).x, -1.0);
        assert_eq!(adapter.to_local_direction([1.0, 2.0, 3.0]), Vector3::new(-1.0, 2.0, 3.0));
    }

    #[test]
    fn test_zero_rotation_is_identity() {
        let q = to_local_rotation([0.0, 0.0, 0.0]);
        assert!(q.angle() < 1e-12);
        assert_angles_close(to_server_rotation(&q), [0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_elemental_axes_sign() {
        // X 轴保持不变，Y、Z 轴取反
        let q = to_local_rotation([0.0, 90.0, 0.0]);
        let expected = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), -90f64.to_radians());
        assert!(q.angle_to(&expected) < 1e-12);

        let q = to_local_rotation([0.0, 0.0, 30.0]);
        let expected = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), -30f64.to_radians());
        assert!(q.angle_to(&expected) < 1e-12);
    }

    #[test]
    fn test_inverse_regular_case() {
        let euler = [20.0, 35.0, -60.0];
        assert_angles_close(to_server_rotation(&to_local_rotation(euler)), euler);
    }

    #[test]
    fn test_gimbal_lock_positive_pitch() {
        // 俯仰 +90°：R[2][0] > 0 分支，Z 分量归零
        let server = to_server_rotation(&to_local_rotation([30.0, 90.0, 0.0]));
        assert!(angle_diff(server[1], 90.0) < TOLERANCE_DEG);
        assert_eq!(server[2], 0.0);
        assert!(angle_diff(server[0], 30.0) < TOLERANCE_DEG);
        round_trip([30.0, 90.0, 0.0]);
    }

    #[test]
    fn test_gimbal_lock_negative_pitch() {
        let server = to_server_rotation(&to_local_rotation([-45.0, -90.0, 0.0]));
        assert!(angle_diff(server[1], -90.0) < TOLERANCE_DEG);
        assert_eq!(server[2], 0.0);
        assert!(angle_diff(server[0], -45.0) < TOLERANCE_DEG);
        round_trip([-45.0, -90.0, 0.0]);
    }

    #[test]
    fn test_gimbal_lock_folds_yaw_into_roll() {
        // 锁死时 X 与 Z 耦合，提取结果把 Z 分量折算到 X
        let server = to_server_rotation(&to_local_rotation([10.0, -90.0, 25.0]));
        assert_eq!(server[2], 0.0);
        let rebuilt = to_local_rotation(server);
        let original = to_local_rotation([10.0, -90.0, 25.0]);
        assert!(rebuilt.angle_to(&original) < 1e-6);
    }

    #[test]
    fn test_round_trip_near_lock() {
        round_trip([12.0, 89.99, 40.0]);
        round_trip([-70.0, -89.99, 15.0]);
        round_trip([12.0, 85.0, 40.0]);
        round_trip([-70.0, -85.0, -110.0]);
    }

    #[test]
    fn test_tag_normal_and_euler() {
        let adapter = CoordinateAdapter::new(0.001);
        let tag = FiducialTag {
            id: 5,
            position: [1000.0, 2000.0, 0.0],
            orientation: TagOrientation::Normal([1.0, 0.0, 0.0]),
        };
        let local = adapter.tag_to_local(&tag);
        assert_eq!(local.position, Vector3::new(-1.0, 2.0, 0.0));
        assert_eq!(local.orientation, LocalTagOrientation::Normal(Vector3::new(-1.0, 0.0, 0.0)));

        let tag = FiducialTag {
            orientation: TagOrientation::Euler([0.0, 0.0, 0.0]),
            ..tag
        };
        assert!(matches!(
            adapter.tag_to_local(&tag).orientation,
            LocalTagOrientation::Rotation(q) if q.angle() < 1e-12
        ));
    }

    #[test]
    fn test_marker_radians() {
        let adapter = CoordinateAdapter::default();
        let transform = MarkerTransform {
            rotation_rad: [0.0, 0.0, std::f32::consts::FRAC_PI_2],
            translation: [0.0, 1700.0, 0.0],
        };
        let local = adapter.marker_to_local(&transform);
        assert!((local.position.y - 1.7).abs() < 1e-6);
        let expected = to_local_rotation([0.0, 0.0, 90.0]);
        assert!(local.rotation.angle_to(&expected) < 1e-6);
    }

    proptest! {
        #[test]
        fn prop_rotation_round_trip(
            x in -179.0f64..179.0,
            y in -90.0f64..90.0,
            z in -179.0f64..179.0,
        ) {
            let server = to_server_rotation(&to_local_rotation([x, y, z]));
            let again = to_server_rotation(&to_local_rotation(server));
            for axis in 0..3 {
                prop_assert!(
                    angle_diff(again[axis], server[axis]) < TOLERANCE_DEG,
                    "axis {} diverged: {:?} vs {:?}", axis, again, server
                );
            }
        }

        #[test]
        fn prop_regular_inverse(
            x in -170.0f64..170.0,
            y in -80.0f64..80.0,
            z in -170.0f64..170.0,
        ) {
            let server = to_server_rotation(&to_local_rotation([x, y, z]));
            prop_assert!(angle_diff(server[0], x) < TOLERANCE_DEG);
            prop_assert!(angle_diff(server[1], y) < TOLERANCE_DEG);
            prop_assert!(angle_diff(server[2], z) < TOLERANCE_DEG);
        }
    }
}
