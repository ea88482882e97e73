//! Prelude - 常用类型的便捷导入
//!
//! ```rust
//! use mearm_sdk::prelude::*;
//! ```

// 客户端层（推荐使用）
pub use crate::client::{
    ArmController, ArmControllerBuilder, CommandOutcome, ControllerConfig, ControllerState,
    GripperPresets, SettlePolicy,
};
pub use crate::client::blocks::{Block, BlockHost, BlockProgram, ProgramOptions};

// 协议层
pub use crate::protocol::{ArmCommand, PositionReply, PositioningMode};

// 串口层（常用 Trait）
pub use crate::serial::{DeviceProvider, SystemPorts};

// 错误类型
pub use crate::client::ControllerError;
pub use crate::protocol::{ProtocolError, ReplyError};
pub use crate::serial::SerialError;
