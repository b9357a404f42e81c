//! 相机描述记录
//!
//! 字段声明只有 108 字节（朴素封送尺寸），但服务端的记录步长是 300 字节：
//! 畸变、外参、内参数组占据了其后 192 字节的隐式填充区。

use crate::constants::*;
use crate::reader::WireReader;
use crate::DecodeError;

/// 相机标定描述（服务端坐标系，毫米）
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CameraDescriptor {
    pub id: i32,
    pub name: String,
    pub position: [f32; 3],
    /// 欧拉角（度）
    pub orientation: [f32; 3],
    pub sensor_width: f32,
    pub sensor_height: f32,
    pub focal_length: f32,
    pub lens_center_x: f32,
    pub lens_center_y: f32,
    pub distortion_model: String,
    pub distortion: [f32; CAMERA_DISTORTION_LEN],
    /// 列主序 3×4
    pub extrinsic: [f32; CAMERA_EXTRINSIC_LEN],
    pub intrinsic: [f32; CAMERA_INTRINSIC_LEN],
}

fn decode_camera_at(reader: &WireReader<'_>, base: usize) -> Result<CameraDescriptor, DecodeError> {
    reader.require(base, CAMERA_RECORD_SIZE)?;

    Ok(CameraDescriptor {
        name: reader.fixed_str(base, CAMERA_NAME_LEN)?,
        id: reader.i32(base + 32)?,
        position: reader.vec3(base + 36)?,
        orientation: reader.vec3(base + 48)?,
        sensor_width: reader.f32(base + 60)?,
        sensor_height: reader.f32(base + 64)?,
        focal_length: reader.f32(base + 68)?,
        lens_center_x: reader.f32(base + 72)?,
        lens_center_y: reader.f32(base + 76)?,
        distortion_model: reader.fixed_str(base + 80, CAMERA_DISTORTION_MODEL_LEN)?,
        distortion: reader.f32s::<CAMERA_DISTORTION_LEN>(base + 96)?,
        extrinsic: reader.f32s::<CAMERA_EXTRINSIC_LEN>(base + 216)?,
        intrinsic: reader.f32s::<CAMERA_INTRINSIC_LEN>(base + 264)?,
    })
}

/// 解码缓冲区起始处的单条相机记录
pub fn decode_camera_descriptor(buf: &[u8]) -> Result<CameraDescriptor, DecodeError> {
    decode_camera_at(&WireReader::new(buf, "camera"), 0)
}

/// 解码 `get_cameras` 返回的相机数组（步长 300 字节）
pub fn decode_cameras(buf: &[u8], count: i32) -> Result<Vec<CameraDescriptor>, DecodeError> {
    let count = usize::try_from(count).map_err(|_| DecodeError::InvalidCount {
        field: "camera",
        value: count.into(),
    })?;
    let reader = WireReader::new(buf, "camera");
    let span = count
        .checked_mul(CAMERA_RECORD_SIZE)
        .ok_or(DecodeError::InvalidCount {
            field: "camera",
            value: count as i64,
        })?;
    reader.require(0, span)?;

    (0..count)
        .map(|i| decode_camera_at(&reader, i * CAMERA_RECORD_SIZE))
        .collect()
}

#[cfg(test)]
pub(crate) mod test_util {
    use super::*;
    use crate::actor::test_util::{put_f32s, put_fixed_str};

    pub fn encode_camera(id: i32, name: &str, position: [f32; 3]) -> Vec<u8> {
        let mut out = Vec::with_capacity(CAMERA_RECORD_SIZE);
        put_fixed_str(&mut out, name, CAMERA_NAME_LEN);
        out.extend_from_slice(&id.to_le_bytes());
        put_f32s(&mut out, &position);
        put_f32s(&mut out, &[0.0, 45.0, 0.0]);
        put_f32s(&mut out, &[36.0, 24.0, 8.5, 0.5, 0.5]);
        put_fixed_str(&mut out, "radial", CAMERA_DISTORTION_MODEL_LEN);
        let distortion: Vec<f32> = (0..CAMERA_DISTORTION_LEN).map(|i| i as f32 * 0.01).collect();
        put_f32s(&mut out, &distortion);
        let extrinsic: Vec<f32> = (0..CAMERA_EXTRINSIC_LEN).map(|i| i as f32).collect();
        put_f32s(&mut out, &extrinsic);
        let intrinsic: Vec<f32> = (0..CAMERA_INTRINSIC_LEN).map(|i| 100.0 + i as f32).collect();
        put_f32s(&mut out, &intrinsic);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::test_util::encode_camera;
    use super::*;

    #[test]
    fn test_decode_camera_offsets() {
        let buf = encode_camera(12, "cam-north", [1000.0, 2500.0, -300.0]);
        assert_eq!(buf.len(), CAMERA_RECORD_SIZE);

        let camera = decode_camera_descriptor(&buf).unwrap();
        assert_eq!(camera.id, 12);
        assert_eq!(camera.name, "cam-north");
        assert_eq!(camera.position, [1000.0, 2500.0, -300.0]);
        assert_eq!(camera.orientation, [0.0, 45.0, 0.0]);
        assert_eq!(camera.sensor_width, 36.0);
        assert_eq!(camera.focal_length, 8.5);
        assert_eq!(camera.lens_center_y, 0.5);
        assert_eq!(camera.distortion_model, "radial");
        assert_eq!(camera.distortion[29], 29.0 * 0.01);
        assert_eq!(camera.extrinsic[11], 11.0);
        assert_eq!(camera.intrinsic[0], 100.0);
        assert_eq!(camera.intrinsic[8], 108.0);
    }

    #[test]
    fn test_decode_camera_array_uses_padded_stride() {
        let mut buf = encode_camera(1, "a", [0.0; 3]);
        buf.extend(encode_camera(2, "b", [1.0; 3]));
        let cameras = decode_cameras(&buf, 2).unwrap();
        assert_eq!(cameras.len(), 2);
        assert_eq!(cameras[1].id, 2);
        assert_eq!(cameras[1].name, "b");
    }

    #[test]
    fn test_naive_size_is_truncated() {
        let buf = encode_camera(1, "a", [0.0; 3]);
        assert!(matches!(
            decode_camera_descriptor(&buf[..108]),
            Err(DecodeError::Truncated { record: "camera", .. })
        ));
        assert!(decode_cameras(&buf, 2).is_err());
        assert!(decode_cameras(&buf, -1).is_err());
    }
}
