//! 客户端错误类型

use captury_driver::DriverError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    /// 演员不在注册表中（从未发现或已丢失）
    #[error("Unknown actor {0}")]
    UnknownActor(i32),

    #[error("Actor {actor_id} has no joint named '{joint}'")]
    UnknownJoint { actor_id: i32, joint: String },

    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),
}
