//! 客户端接口模块
//!
//! 本模块提供 MeArm 机械臂的异步控制接口，包括：
//! - [`ArmController`]: 命令周期编排（发送 → 固定等待 → 读取）
//! - 单命令执行约束（执行中的新命令被拒绝）
//! - TOML 配置与 Builder
//!
//! # 积木宿主
//!
//! 可视化编程环境的积木映射与 JSON 程序执行，参见 [`blocks`](self::blocks) 模块。

pub mod blocks;
pub mod builder;
pub mod config;
pub mod controller;
pub mod error;
pub mod state;

// 重新导出常用类型
pub use blocks::{Block, BlockHost, BlockProgram, BlockType, Notifier, ProgramReport};
pub use builder::ArmControllerBuilder;
pub use config::{ConfigError, ControllerConfig, GripperPresets, SettlePolicy};
pub use controller::{ArmController, CommandOutcome};
pub use error::ControllerError;
pub use state::ControllerState;
