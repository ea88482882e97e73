//! MeArm SDK - MeArm 桌面机械臂 Rust SDK
//!
//! 通过串口向 MeArm 固件发送 G-code 风格的文本命令。
//!
//! # 架构设计
//!
//! 本 SDK 采用分层架构，从底层到高层：
//!
//! - **协议层** (`protocol`): 命令编码、应答解析
//! - **串口层** (`serial`): 设备选择、会话生命周期、独占写入与一次性读取
//! - **客户端层** (`client`): 命令周期编排、单命令执行约束、积木宿主
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use mearm_sdk::prelude::*;
//!
//! # async fn demo() -> Result<(), ControllerError> {
//! mearm_sdk::init_logger().ok();
//!
//! let arm = ArmController::builder().build();
//! arm.connect().await?;
//! arm.absolute_mode().await?;
//! arm.move_linear(100.0, 0.0, 100.0, 900.0).await?;
//! arm.open_gripper().await?;
//! println!("{}", arm.query_position().await?);
//! # Ok(())
//! # }
//! ```

pub mod prelude;

/// 协议层
pub mod protocol {
    pub use mearm_protocol::*;
}

/// 串口层
pub mod serial {
    pub use mearm_serial::*;
}

/// 客户端层
pub mod client {
    pub use mearm_client::*;
}

// --- 用户以此为界 ---

pub use client::{
    ArmController, ArmControllerBuilder, CommandOutcome, ControllerConfig, ControllerError,
    ControllerState,
};
pub use protocol::{ArmCommand, PositionReply, PositioningMode, ProtocolError};
pub use serial::SerialError;

use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// 未设置 `RUST_LOG` 时的默认日志级别
pub const DEFAULT_LOG_DIRECTIVE: &str = "info";

/// 日志初始化错误
#[derive(Error, Debug)]
pub enum LoggerError {
    #[error("Invalid log directive: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),
    #[error("Failed to install global subscriber: {0}")]
    Init(Box<dyn std::error::Error + Send + Sync + 'static>),
}

/// 初始化日志（`RUST_LOG` 优先，默认 `info`）
///
/// `log` crate 的记录会一并转发到 tracing。
pub fn init_logger() -> Result<(), LoggerError> {
    init_logger_with(DEFAULT_LOG_DIRECTIVE)
}

/// 初始化日志，`RUST_LOG` 未设置时使用 `directive`
///
/// 全局只能初始化一次，重复调用返回 [`LoggerError::Init`]。
pub fn init_logger_with(directive: &str) -> Result<(), LoggerError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(directive)?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(LoggerError::Init)
}
