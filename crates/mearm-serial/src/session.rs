//! 传输会话
//!
//! 管理字节流通道的生命周期，提供独占写入与一次性读取。
//!
//! # 锁
//!
//! - 写锁：与会话同生命周期，`send()` 在整个 write + flush 期间持有，
//!   两帧不会交错
//! - 读锁：`receive()` 内临时获取，guard 离开作用域即释放（包括出错路径）

use crate::{
    BoxedReader, BoxedWriter, DevicePort, DeviceProvider, DeviceResponse, LinkConfig, SerialError,
    WireFrame,
};
use bytes::Bytes;
use parking_lot::Mutex as SyncMutex;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// 单次读取缓冲区大小
const READ_BUFFER_SIZE: usize = 1024;

/// 会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum SessionState {
    /// 未连接（默认）
    #[default]
    Disconnected = 0,
    /// 正在申请设备/打开通道
    Connecting = 1,
    /// 已连接，持有写句柄
    Connected = 2,
    /// 链路出现不可恢复错误，正在释放句柄
    Failed = 3,
}

impl SessionState {
    /// 从 u8 转换
    ///
    /// 如果值无效，返回 Disconnected。
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::Connected,
            3 => Self::Failed,
            _ => Self::Disconnected,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// 传输会话
///
/// 唯一直接接触物理通道的组件。写句柄存在当且仅当状态为 `Connected`。
///
/// # 示例
///
/// ```rust,no_run
/// use mearm_serial::{LinkConfig, SystemPorts, TransportSession};
/// use mearm_protocol::ArmCommand;
/// use std::time::Duration;
///
/// # async fn demo() -> Result<(), mearm_serial::SerialError> {
/// let session = TransportSession::new();
/// session.open(&SystemPorts::default(), &LinkConfig::default()).await?;
///
/// let frame = ArmCommand::QueryPosition.encode().unwrap();
/// session.send(&frame).await?;
/// let response = session.receive(Duration::from_millis(500)).await;
///
/// session.close().await;
/// # Ok(())
/// # }
/// ```
pub struct TransportSession {
    state: AtomicU8,
    writer: Mutex<Option<BoxedWriter>>,
    reader: Mutex<Option<BoxedReader>>,
    port: SyncMutex<Option<DevicePort>>,
}

impl TransportSession {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(SessionState::Disconnected.as_u8()),
            writer: Mutex::new(None),
            reader: Mutex::new(None),
            port: SyncMutex::new(None),
        }
    }

    /// 当前会话状态
    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    /// 当前打开的端口
    pub fn port(&self) -> Option<DevicePort> {
        self.port.lock().clone()
    }

    /// 读锁当前是否被持有（诊断用）
    pub fn is_read_locked(&self) -> bool {
        self.reader.try_lock().is_err()
    }

    fn set_state(&self, state: SessionState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    /// 打开会话
    ///
    /// 先向宿主环境申请设备，再以 `link` 参数打开通道。
    /// 成功后状态 Disconnected → Connected，并持有独占写句柄。
    ///
    /// # Errors
    /// - `SerialError::AlreadyConnected`: 会话不处于 Disconnected
    /// - `SerialError::Device`（`is_unavailable()`）: 无设备或选择被取消
    /// - 其他：通道无法配置
    pub async fn open(
        &self,
        provider: &dyn DeviceProvider,
        link: &LinkConfig,
    ) -> Result<DevicePort, SerialError> {
        if self
            .state
            .compare_exchange(
                SessionState::Disconnected.as_u8(),
                SessionState::Connecting.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return Err(SerialError::AlreadyConnected);
        }

        // future 在申请/打开途中被丢弃时恢复为 Disconnected
        let mut pending = PendingOpen {
            state: &self.state,
            armed: true,
        };

        info!("Requesting serial port...");
        let opened = async {
            let port = provider.request_port().await?;
            let channel = provider.open(&port, link).await?;
            Ok::<_, SerialError>((port, channel))
        }
        .await;

        match opened {
            Ok((port, channel)) => {
                *self.writer.lock().await = Some(channel.writer);
                *self.reader.lock().await = Some(channel.reader);
                *self.port.lock() = Some(port.clone());
                self.set_state(SessionState::Connected);
                pending.armed = false;
                info!("Serial port {} opened at {} baud", port, link.baud_rate);
                Ok(port)
            },
            Err(e) => {
                self.set_state(SessionState::Disconnected);
                error!("Failed to open serial port: {}", e);
                Err(e)
            },
        }
    }

    /// 发送一帧
    ///
    /// 在写锁内完成 write + flush，返回时表示传输层已接受（不代表设备已执行）。
    /// 不可恢复的链路错误会关闭会话。
    pub async fn send(&self, frame: &WireFrame) -> Result<(), SerialError> {
        let mut guard = self.writer.lock().await;
        let writer = match guard.as_mut() {
            Some(writer) if self.is_connected() => writer,
            _ => return Err(SerialError::NotConnected),
        };

        let written = async {
            writer.write_all(frame.as_bytes()).await?;
            writer.flush().await
        }
        .await;

        match written {
            Ok(()) => {
                debug!("Sent command: {}", frame);
                Ok(())
            },
            Err(e) => {
                let e = SerialError::from(e);
                warn!("Failed to write {:?}: {}", frame.body(), e);
                if e.is_fatal() {
                    guard.take();
                    self.set_state(SessionState::Failed);
                    drop(guard);
                    self.release_after_failure().await;
                }
                Err(e)
            },
        }
    }

    /// 读取一次
    ///
    /// 获取临时读锁，最多等待 `window` 内的一次读事件。永不返回错误：
    /// 超时/EOF 返回 `Empty`，IO 错误或未连接返回 `ReadFailed`。
    pub async fn receive(&self, window: Duration) -> DeviceResponse {
        // guard 在所有返回路径上随作用域释放
        let mut guard = self.reader.lock().await;
        let Some(reader) = guard.as_mut() else {
            warn!("Read attempted without an open session");
            return DeviceResponse::ReadFailed;
        };

        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        match tokio::time::timeout(window, reader.read(&mut buf)).await {
            Ok(Ok(0)) => {
                debug!("Serial stream reached EOF");
                DeviceResponse::Empty
            },
            Ok(Ok(n)) => {
                buf.truncate(n);
                debug!("Received {} bytes", n);
                DeviceResponse::Received(Bytes::from(buf))
            },
            Ok(Err(e)) => {
                error!("Read error: {}", e);
                DeviceResponse::ReadFailed
            },
            Err(_) => {
                debug!("No data within {:?} read window", window);
                DeviceResponse::Empty
            },
        }
    }

    /// 关闭会话，释放写句柄与通道（幂等）
    pub async fn close(&self) {
        let writer = self.writer.lock().await.take();
        if let Some(mut writer) = writer {
            if let Err(e) = writer.shutdown().await {
                debug!("Serial writer shutdown failed: {}", e);
            }
        }
        self.reader.lock().await.take();

        if let Some(port) = self.port.lock().take() {
            info!("Serial port {} closed", port);
        }
        self.set_state(SessionState::Disconnected);
    }

    async fn release_after_failure(&self) {
        self.reader.lock().await.take();
        if let Some(port) = self.port.lock().take() {
            error!("Serial link to {} lost, session closed", port);
        }
        self.set_state(SessionState::Disconnected);
    }
}

/// 打开过程中持有，未完成就被丢弃时把状态恢复为 Disconnected
struct PendingOpen<'a> {
    state: &'a AtomicU8,
    armed: bool,
}

impl Drop for PendingOpen<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.state
                .store(SessionState::Disconnected.as_u8(), Ordering::Release);
        }
    }
}

impl Default for TransportSession {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TransportSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportSession")
            .field("state", &self.state())
            .field("port", &self.port())
            .finish_non_exhaustive()
    }
}
