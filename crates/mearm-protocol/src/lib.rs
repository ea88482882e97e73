//! # MeArm Protocol
//!
//! 机械臂串口文本协议定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `command`: 逻辑命令与 G-code 帧编码
//! - `response`: 设备应答解析
//!
//! ## 帧格式
//!
//! 协议按行组织：一条命令对应一行 ASCII 文本，以单个 `\n` 结尾。
//! 设备应答以哨兵标记 `"ok"` 结束。

pub mod command;
pub mod response;

// 重新导出常用类型
pub use command::*;
pub use response::*;

use std::fmt;
use thiserror::Error;

/// 行终止符
pub const LINE_TERMINATOR: char = '\n';

/// 一条已编码、可直接发送的命令行
///
/// # 设计目的
///
/// `WireFrame` 是协议层和串口层之间的中间抽象：
/// - 协议层负责从 [`ArmCommand`] 构建
/// - 串口层只负责原样写出字节
///
/// ```text
/// Protocol Layer (mearm-protocol)
///     ↓ ArmCommand::encode()
/// WireFrame (此类型)
///     ↓ TransportSession::send()
/// Serial Layer (mearm-serial)
/// ```
///
/// 构建后不可变，保证恰好以一个换行符结尾。
///
/// ```rust
/// use mearm_protocol::{ArmCommand, WireFrame};
///
/// let frame = ArmCommand::QueryPosition.encode().unwrap();
/// assert_eq!(frame.as_str(), "M114\n");
/// assert_eq!(frame.opcode(), "M114");
/// ```
///
/// 启用 `serde` feature 时按字符串序列化，反序列化同样经过 [`WireFrame::parse_line`] 校验。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "String", into = "String")
)]
pub struct WireFrame {
    line: String,
}

impl WireFrame {
    /// 由不含换行符的命令文本构建（内部使用，已保证格式正确）
    pub(crate) fn from_body(mut body: String) -> Self {
        body.push(LINE_TERMINATOR);
        Self { line: body }
    }

    /// 从一行文本解析帧
    ///
    /// 允许末尾带一个 `\n`（或 `\r\n`），其余位置不得出现换行符，
    /// 且必须为非空 ASCII 文本。
    pub fn parse_line(line: &str) -> Result<Self, ProtocolError> {
        let body = line
            .strip_suffix('\n')
            .map(|l| l.strip_suffix('\r').unwrap_or(l))
            .unwrap_or(line);

        if body.trim().is_empty() {
            return Err(ProtocolError::EmptyFrame);
        }
        if body.contains(['\n', '\r']) {
            return Err(ProtocolError::EmbeddedNewline);
        }
        if let Some(position) = body.find(|c: char| !c.is_ascii()) {
            return Err(ProtocolError::NonAscii { position });
        }

        Ok(Self::from_body(body.to_string()))
    }

    /// 完整帧文本（包含末尾换行符）
    pub fn as_str(&self) -> &str {
        &self.line
    }

    /// 待发送字节
    pub fn as_bytes(&self) -> &[u8] {
        self.line.as_bytes()
    }

    /// 帧长度（字节，包含换行符）
    pub fn len(&self) -> usize {
        self.line.len()
    }

    /// 帧永远不为空（至少包含换行符），保留此方法以配合 `len()`
    pub fn is_empty(&self) -> bool {
        self.line.is_empty()
    }

    /// 去掉换行符后的命令文本
    pub fn body(&self) -> &str {
        self.line.trim_end_matches(LINE_TERMINATOR)
    }

    /// 首个字段（操作码，如 `G1`、`M106`）
    pub fn opcode(&self) -> &str {
        self.body().split(' ').next().unwrap_or_default()
    }

    /// 消费并获取字节
    pub fn into_bytes(self) -> Vec<u8> {
        self.line.into_bytes()
    }
}

impl fmt::Display for WireFrame {
    /// 显示时不包含换行符，便于日志输出
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.body())
    }
}

impl TryFrom<String> for WireFrame {
    type Error = ProtocolError;

    fn try_from(line: String) -> Result<Self, Self::Error> {
        Self::parse_line(&line)
    }
}

impl From<WireFrame> for String {
    fn from(frame: WireFrame) -> Self {
        frame.line
    }
}

impl AsRef<[u8]> for WireFrame {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

/// 协议错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Empty frame")]
    EmptyFrame,

    #[error("Frame contains an embedded line break")]
    EmbeddedNewline,

    #[error("Non-ASCII character at byte {position}")]
    NonAscii { position: usize },
}
