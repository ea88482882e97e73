//! 控制器错误类型定义

use mearm_protocol::ReplyError;
use mearm_serial::SerialError;
use thiserror::Error;

/// 控制器错误类型
///
/// 所有错误都不会让控制器停留在 `Busy`，调用方可以直接重试；
/// 控制器本身不做自动重试。
#[derive(Error, Debug)]
pub enum ControllerError {
    /// 没有可用设备，或设备选择被取消
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(#[source] SerialError),

    /// 设备存在但通道无法配置
    #[error("Failed to open serial port: {0}")]
    OpenError(#[source] SerialError),

    /// 未连接时发出命令
    #[error("MeArm not connected")]
    NotConnected,

    /// 连接/断开时控制器正在连接或执行命令
    #[error("MeArm busy: connecting or executing a command")]
    Busy,

    /// 写入失败
    #[error("Write failed: {0}")]
    WriteFailure(#[source] SerialError),

    /// 位置查询没有得到有效应答
    #[error("Position query failed: {0}")]
    Reply(#[from] ReplyError),
}

impl ControllerError {
    /// 按"设备不可用 / 打开失败"对连接错误分类
    pub fn from_open(error: SerialError) -> Self {
        if error.is_unavailable() {
            Self::DeviceUnavailable(error)
        } else {
            Self::OpenError(error)
        }
    }

    /// 是否属于连接生命周期错误（需要提示用户）
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::DeviceUnavailable(_) | Self::OpenError(_))
    }
}
