//! # MeArm Serial Adapter Layer
//!
//! 串口硬件抽象层：设备选择、通道打开、会话生命周期管理。
//!
//! - [`DeviceProvider`]: 向宿主环境申请设备并打开通道
//! - [`TransportSession`]: 唯一直接接触物理通道的组件
//! - [`system::SystemPorts`]: 基于 tokio-serial 的真实设备
//! - `mock`（feature = "mock"）: 基于内存管道的模拟设备

use async_trait::async_trait;
use std::fmt;
use std::io;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

// 重新导出 mearm-protocol 中的帧类型
pub use mearm_protocol::{DeviceResponse, WireFrame};

pub mod session;
pub mod system;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use session::{SessionState, TransportSession};
pub use system::SystemPorts;

/// 默认波特率（与设备固件一致）
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// 串口适配层统一错误类型
#[derive(Error, Debug)]
pub enum SerialError {
    #[error("IO Error: {0}")]
    Io(#[from] io::Error),
    #[error("Device Error: {0}")]
    Device(#[from] SerialDeviceError),
    #[error("Session not connected")]
    NotConnected,
    #[error("Session already connected")]
    AlreadyConnected,
}

impl SerialError {
    /// 是否属于"设备不可用"（未授权、未选择、选择被取消）
    pub fn is_unavailable(&self) -> bool {
        match self {
            Self::Device(e) => e.is_unavailable(),
            _ => false,
        }
    }

    /// 是否为不可恢复的链路错误（会话需要关闭）
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::BrokenPipe
                    | io::ErrorKind::NotConnected
                    | io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
            ),
            Self::Device(e) => e.is_unavailable(),
            Self::NotConnected => true,
            Self::AlreadyConnected => false,
        }
    }
}

impl From<tokio_serial::Error> for SerialError {
    fn from(e: tokio_serial::Error) -> Self {
        let kind = match e.kind() {
            tokio_serial::ErrorKind::NoDevice => SerialDeviceErrorKind::NoDevice,
            tokio_serial::ErrorKind::InvalidInput => SerialDeviceErrorKind::UnsupportedConfig,
            tokio_serial::ErrorKind::Io(io::ErrorKind::NotFound) => SerialDeviceErrorKind::NotFound,
            tokio_serial::ErrorKind::Io(io::ErrorKind::PermissionDenied) => {
                SerialDeviceErrorKind::AccessDenied
            },
            _ => SerialDeviceErrorKind::Unknown,
        };
        Self::Device(SerialDeviceError::new(kind, e.description))
    }
}

/// 设备/后端错误的结构化分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerialDeviceErrorKind {
    Unknown,
    NotFound,
    NoDevice,
    Cancelled,
    AccessDenied,
    Busy,
    UnsupportedConfig,
}

/// 结构化设备错误
#[derive(Error, Debug, Clone)]
#[error("{kind:?}: {message}")]
pub struct SerialDeviceError {
    pub kind: SerialDeviceErrorKind,
    pub message: String,
}

impl SerialDeviceError {
    pub fn new(kind: SerialDeviceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(
            self.kind,
            SerialDeviceErrorKind::NoDevice
                | SerialDeviceErrorKind::NotFound
                | SerialDeviceErrorKind::Cancelled
                | SerialDeviceErrorKind::AccessDenied
        )
    }
}

impl From<String> for SerialDeviceError {
    fn from(message: String) -> Self {
        Self::new(SerialDeviceErrorKind::Unknown, message)
    }
}

impl From<&str> for SerialDeviceError {
    fn from(message: &str) -> Self {
        Self::new(SerialDeviceErrorKind::Unknown, message)
    }
}

/// 链路参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkConfig {
    /// 波特率
    pub baud_rate: u32,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }
}

/// 宿主环境授予的设备
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevicePort {
    /// 端口路径（如 "/dev/ttyUSB0"、"COM3"）
    pub path: String,
}

impl DevicePort {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

impl fmt::Display for DevicePort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// 已打开的字节流通道（读写两半）
pub struct SerialChannel {
    pub reader: BoxedReader,
    pub writer: BoxedWriter,
}

impl SerialChannel {
    pub fn new(reader: BoxedReader, writer: BoxedWriter) -> Self {
        Self { reader, writer }
    }

    /// 拆分一个双向流
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self::new(Box::new(reader), Box::new(writer))
    }
}

impl fmt::Debug for SerialChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialChannel").finish_non_exhaustive()
    }
}

/// 设备提供者：宿主环境的设备申请与通道打开接口
#[async_trait]
pub trait DeviceProvider: Send + Sync {
    /// 申请设备访问权限
    ///
    /// 没有可用设备或选择被取消时返回 `SerialDeviceErrorKind::{NoDevice, NotFound, Cancelled}`。
    async fn request_port(&self) -> Result<DevicePort, SerialError>;

    /// 以指定链路参数打开通道
    async fn open(&self, port: &DevicePort, link: &LinkConfig) -> Result<SerialChannel, SerialError>;
}
