//! 积木宿主边界
//!
//! 把可视化编程环境中的积木（opcode + 参数）映射到 [`ArmController`] 的命令，
//! 并支持从 JSON 加载积木序列顺序执行。
//!
//! ```json
//! {
//!   "name": "pick",
//!   "description": "pick and place",
//!   "blocks": [
//!     { "opcode": "connect" },
//!     { "opcode": "RelMode" },
//!     { "opcode": "moveLinearly", "X": 10, "Y": 0, "Z": 5, "F": 300 },
//!     { "opcode": "closeGripper" },
//!     { "opcode": "reportPosition" }
//!   ]
//! }
//! ```

use crate::config::GripperPresets;
use crate::controller::ArmController;
use crate::error::ControllerError;
use mearm_protocol::{ArmCommand, PositioningMode};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{error, info, warn};

/// 未连接时位置积木返回的文本
pub const NOT_CONNECTED_TEXT: &str = "ERROR: Not connected";

/// 积木类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    /// 执行动作，无返回值
    Command,
    /// 返回一个文本值
    Reporter,
}

/// 运动积木参数
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "UPPERCASE")]
pub struct MotionArgs {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub f: f64,
}

impl Default for MotionArgs {
    fn default() -> Self {
        Self {
            x: 100.0,
            y: 0.0,
            z: 100.0,
            f: 900.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "UPPERCASE")]
pub struct GripperArgs {
    pub angle: f64,
}

impl Default for GripperArgs {
    fn default() -> Self {
        Self { angle: 90.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "UPPERCASE")]
pub struct WaitArgs {
    pub seconds: f64,
}

impl Default for WaitArgs {
    fn default() -> Self {
        Self { seconds: 1.0 }
    }
}

/// 积木
///
/// 序列化格式以 `opcode` 字段区分，参数名使用大写（`X`、`ANGLE`、`SECONDS` 等），
/// 缺省参数取积木的默认值。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "opcode")]
pub enum Block {
    #[serde(rename = "connect")]
    Connect,
    AbsMode,
    RelMode,
    #[serde(rename = "moveLinearly")]
    MoveLinearly(MotionArgs),
    Jumpto(MotionArgs),
    #[serde(rename = "setGripper")]
    SetGripper(GripperArgs),
    #[serde(rename = "openGripper")]
    OpenGripper,
    #[serde(rename = "closeGripper")]
    CloseGripper,
    #[serde(rename = "wait")]
    Wait(WaitArgs),
    #[serde(rename = "reportPosition")]
    ReportPosition,
}

impl Block {
    /// 积木面板（每种积木一个，参数为默认值）
    pub fn palette() -> [Block; 10] {
        [
            Block::Connect,
            Block::AbsMode,
            Block::RelMode,
            Block::MoveLinearly(MotionArgs::default()),
            Block::Jumpto(MotionArgs::default()),
            Block::SetGripper(GripperArgs::default()),
            Block::OpenGripper,
            Block::CloseGripper,
            Block::Wait(WaitArgs::default()),
            Block::ReportPosition,
        ]
    }

    pub fn opcode(&self) -> &'static str {
        match self {
            Block::Connect => "connect",
            Block::AbsMode => "AbsMode",
            Block::RelMode => "RelMode",
            Block::MoveLinearly(_) => "moveLinearly",
            Block::Jumpto(_) => "Jumpto",
            Block::SetGripper(_) => "setGripper",
            Block::OpenGripper => "openGripper",
            Block::CloseGripper => "closeGripper",
            Block::Wait(_) => "wait",
            Block::ReportPosition => "reportPosition",
        }
    }

    pub fn block_type(&self) -> BlockType {
        match self {
            Block::ReportPosition => BlockType::Reporter,
            _ => BlockType::Command,
        }
    }

    /// 积木上显示的文本（`[X]` 等为参数占位）
    pub fn text(&self) -> &'static str {
        match self {
            Block::Connect => "Connect to MeArm",
            Block::AbsMode => "Switch to absolute mode (Send G90)",
            Block::RelMode => "Switch to Relative mode (Send G91)",
            Block::MoveLinearly(_) => "Move Linearly to X:[X] Y:[Y] Z:[Z] at speed:[F]",
            Block::Jumpto(_) => "Jump to X:[X] Y:[Y] Z:[Z] at speed:[F]",
            Block::SetGripper(_) => "Set Gripper to angle [ANGLE]",
            Block::OpenGripper => "Open Gripper",
            Block::CloseGripper => "Close Gripper",
            Block::Wait(_) => "Wait for [SECONDS] seconds",
            Block::ReportPosition => "get current position",
        }
    }

    /// 对应的控制器命令；`connect` 不是设备命令，返回 `None`
    pub fn to_command(&self, presets: &GripperPresets) -> Option<ArmCommand> {
        let command = match *self {
            Block::Connect => return None,
            Block::AbsMode => ArmCommand::SetMode(PositioningMode::Absolute),
            Block::RelMode => ArmCommand::SetMode(PositioningMode::Relative),
            Block::MoveLinearly(MotionArgs { x, y, z, f }) => ArmCommand::Move { x, y, z, feed: f },
            Block::Jumpto(MotionArgs { x, y, z, f }) => ArmCommand::Jump { x, y, z, feed: f },
            Block::SetGripper(GripperArgs { angle }) => ArmCommand::SetGripper { angle },
            Block::OpenGripper => ArmCommand::SetGripper {
                angle: presets.open,
            },
            Block::CloseGripper => ArmCommand::SetGripper {
                angle: presets.close,
            },
            Block::Wait(WaitArgs { seconds }) => ArmCommand::Wait { seconds },
            Block::ReportPosition => ArmCommand::QueryPosition,
        };
        Some(command)
    }
}

/// 阻塞式提示（宿主环境中通常是弹窗）
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str);
}

/// 默认提示：写入日志
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: &str) {
        error!("{}", message);
    }
}

/// 积木宿主
///
/// 命令积木的错误只记录日志；连接失败额外通过 [`Notifier`] 提示用户。
pub struct BlockHost {
    controller: Arc<ArmController>,
    notifier: Box<dyn Notifier>,
}

impl BlockHost {
    pub fn new(controller: Arc<ArmController>) -> Self {
        Self {
            controller,
            notifier: Box::new(LogNotifier),
        }
    }

    pub fn with_notifier(mut self, notifier: impl Notifier + 'static) -> Self {
        self.notifier = Box::new(notifier);
        self
    }

    pub fn controller(&self) -> &Arc<ArmController> {
        &self.controller
    }

    /// 执行积木并返回结构化结果
    ///
    /// 命令积木成功时返回 `Ok(None)`，位置积木返回应答文本。
    pub async fn try_run(&self, block: &Block) -> Result<Option<String>, ControllerError> {
        let Some(command) = block.to_command(&self.controller.config().gripper) else {
            return match self.controller.connect().await {
                Ok(()) => Ok(None),
                Err(e) => {
                    if e.is_connection_error() {
                        self.notifier
                            .notify(&format!("Could not connect to MeArm: {}", e));
                    }
                    Err(e)
                },
            };
        };

        let outcome = self.controller.execute(command).await?;
        Ok(outcome.into_reply().map(|reply| reply.to_string()))
    }

    /// 执行积木（宿主调用入口）
    ///
    /// 错误不向上传播：命令积木返回 `None`，位置积木返回错误文本
    /// （未连接时为 [`NOT_CONNECTED_TEXT`]）。
    pub async fn run(&self, block: &Block) -> Option<String> {
        match self.try_run(block).await {
            Ok(value) => value,
            Err(e) => {
                warn!(opcode = block.opcode(), "Block failed: {}", e);
                match (block.block_type(), e) {
                    (BlockType::Command, _) => None,
                    (BlockType::Reporter, ControllerError::NotConnected) => {
                        Some(NOT_CONNECTED_TEXT.to_string())
                    },
                    (BlockType::Reporter, e) => Some(format!("ERROR: {}", e)),
                }
            },
        }
    }

    /// 顺序执行积木程序
    pub async fn run_program(&self, program: &BlockProgram, options: &ProgramOptions) -> ProgramReport {
        info!(
            "Running program {} ({} blocks)",
            program.name,
            program.blocks.len()
        );
        let start = Instant::now();
        let mut report = ProgramReport {
            program_name: program.name.clone(),
            total_blocks: program.blocks.len(),
            succeeded: Vec::new(),
            failed: Vec::new(),
            outputs: Vec::new(),
            duration: Duration::ZERO,
        };

        for (i, block) in program.blocks.iter().enumerate() {
            match self.try_run(block).await {
                Ok(output) => {
                    report.succeeded.push(i);
                    if let Some(text) = output {
                        info!("Block {} ({}) reported: {}", i, block.opcode(), text);
                        report.outputs.push((i, text));
                    }
                },
                Err(e) => {
                    warn!("Block {} ({}) failed: {}", i, block.opcode(), e);
                    report.failed.push((i, e.to_string()));
                    if !options.continue_on_error {
                        break;
                    }
                },
            }
        }

        report.duration = start.elapsed();
        info!(
            "Program {} finished: {} succeeded, {} failed",
            report.program_name,
            report.succeeded.len(),
            report.failed.len()
        );
        report
    }
}

impl std::fmt::Debug for BlockHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockHost")
            .field("controller", &self.controller)
            .finish_non_exhaustive()
    }
}

/// 积木程序加载错误
#[derive(Error, Debug)]
pub enum ProgramError {
    #[error("Failed to read program file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid program JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// 积木程序
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockProgram {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub blocks: Vec<Block>,
}

impl BlockProgram {
    pub fn from_json(content: &str) -> Result<Self, ProgramError> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ProgramError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn to_json(&self) -> Result<String, ProgramError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// 程序执行选项
#[derive(Debug, Clone, Copy, Default)]
pub struct ProgramOptions {
    /// 失败时是否继续
    pub continue_on_error: bool,
}

/// 程序执行结果
#[derive(Debug, Clone)]
pub struct ProgramReport {
    pub program_name: String,
    pub total_blocks: usize,
    /// 成功的积木索引
    pub succeeded: Vec<usize>,
    /// 失败的积木索引和错误
    pub failed: Vec<(usize, String)>,
    /// 位置积木的输出
    pub outputs: Vec<(usize, String)>,
    pub duration: Duration,
}

impl ProgramReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.succeeded.len() == self.total_blocks
    }
}
