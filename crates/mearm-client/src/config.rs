//! 控制器配置
//!
//! 所有字段都有默认值，TOML 中可只写需要覆盖的部分：
//!
//! ```toml
//! port = "/dev/ttyUSB0"
//! baud_rate = 115200
//! read_window_ms = 1000
//!
//! [settle]
//! motion_ms = 500
//! gripper_ms = 300
//! mode_ms = 50
//! query_ms = 200
//!
//! [gripper]
//! open = 120.0
//! close = 30.0
//! ```

use mearm_protocol::{ArmCommand, GRIPPER_CLOSE_ANGLE, GRIPPER_OPEN_ANGLE};
use mearm_serial::{DEFAULT_BAUD_RATE, LinkConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// 默认读取窗口（毫秒）
pub const DEFAULT_READ_WINDOW_MS: u64 = 1000;

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// 命令发送后的固定等待时间（物理动作安全余量，不是协议确认）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettlePolicy {
    /// Move / Jump
    pub motion_ms: u64,
    /// SetGripper（含张开/闭合预设）
    pub gripper_ms: u64,
    /// 坐标模式切换
    pub mode_ms: u64,
    /// 位置查询发送后、读取前
    pub query_ms: u64,
}

impl Default for SettlePolicy {
    fn default() -> Self {
        Self {
            motion_ms: 500,
            gripper_ms: 300,
            mode_ms: 50,
            query_ms: 200,
        }
    }
}

impl SettlePolicy {
    /// 命令对应的等待时间
    ///
    /// `Wait` 使用调用方给定的秒数：负数或 NaN 按 0 处理，
    /// 超出 `Duration` 表示范围的正数（包括正无穷）取 `Duration::MAX`。
    pub fn delay_for(&self, command: &ArmCommand) -> Duration {
        match command {
            ArmCommand::Move { .. } | ArmCommand::Jump { .. } => {
                Duration::from_millis(self.motion_ms)
            },
            ArmCommand::SetGripper { .. } => Duration::from_millis(self.gripper_ms),
            ArmCommand::SetMode(_) => Duration::from_millis(self.mode_ms),
            ArmCommand::QueryPosition => Duration::from_millis(self.query_ms),
            ArmCommand::Wait { seconds } => {
                Duration::try_from_secs_f64(*seconds).unwrap_or(if *seconds > 0.0 {
                    Duration::MAX
                } else {
                    Duration::ZERO
                })
            },
        }
    }
}

/// 夹爪预设角度
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GripperPresets {
    pub open: f64,
    pub close: f64,
}

impl Default for GripperPresets {
    fn default() -> Self {
        Self {
            open: GRIPPER_OPEN_ANGLE,
            close: GRIPPER_CLOSE_ANGLE,
        }
    }
}

/// 控制器配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// 串口路径；不指定时自动选择第一个 USB 串口
    pub port: Option<String>,
    /// 波特率（需与设备固件一致）
    pub baud_rate: u32,
    /// 位置查询的读取窗口（毫秒）
    pub read_window_ms: u64,
    pub settle: SettlePolicy,
    pub gripper: GripperPresets,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: DEFAULT_BAUD_RATE,
            read_window_ms: DEFAULT_READ_WINDOW_MS,
            settle: SettlePolicy::default(),
            gripper: GripperPresets::default(),
        }
    }
}

impl ControllerConfig {
    /// 从 TOML 文本解析
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// 从 TOML 文件加载
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// 序列化为 TOML 文本
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn read_window(&self) -> Duration {
        Duration::from_millis(self.read_window_ms)
    }

    pub fn link(&self) -> LinkConfig {
        LinkConfig {
            baud_rate: self.baud_rate,
        }
    }
}
