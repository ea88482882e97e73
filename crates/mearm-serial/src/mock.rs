//! Mock 串口设备
//!
//! 基于 `tokio::io::duplex` 的内存管道，用于无硬件测试：
//! - [`MockProvider`]: 实现 [`DeviceProvider`]，可配置失败场景
//! - [`MockDevice`]: 设备端句柄，读取主机发出的命令行、写回应答

use crate::{
    BoxedReader, BoxedWriter, DevicePort, DeviceProvider, LinkConfig, SerialChannel,
    SerialDeviceError, SerialDeviceErrorKind, SerialError,
};
use async_trait::async_trait;
use parking_lot::Mutex as SyncMutex;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll, ready};
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, DuplexStream, ReadBuf,
    WriteHalf,
};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// 模拟端口路径
pub const MOCK_PORT_PATH: &str = "/dev/ttyMOCK0";

/// 内存管道缓冲区大小
const MOCK_BUFFER_SIZE: usize = 4096;

/// 模拟场景
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MockBehavior {
    /// 正常设备
    #[default]
    Normal,
    /// 没有可用设备
    NoDevice,
    /// 用户取消了设备选择
    Cancelled,
    /// 设备存在但通道无法配置
    OpenFails,
    /// 写入时链路断开
    BrokenWriter,
    /// 读取总是失败
    FailingReader,
    /// 设备选择永不返回（如无人响应的选择对话框）
    Unresponsive,
}

/// 模拟设备提供者
///
/// 内部状态共享（`Clone` 后指向同一设备），便于测试在把 provider
/// 交给控制器之后继续观察写入内容。
#[derive(Clone, Default)]
pub struct MockProvider {
    behavior: Arc<SyncMutex<MockBehavior>>,
    device: MockDevice,
    written: Arc<SyncMutex<Vec<u8>>>,
    opened_with: Arc<SyncMutex<Option<LinkConfig>>>,
    open_count: Arc<AtomicUsize>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_behavior(behavior: MockBehavior) -> Self {
        let provider = Self::new();
        provider.set_behavior(behavior);
        provider
    }

    /// 切换场景（影响之后的申请/打开）
    pub fn set_behavior(&self, behavior: MockBehavior) {
        *self.behavior.lock() = behavior;
    }

    pub fn behavior(&self) -> MockBehavior {
        *self.behavior.lock()
    }

    /// 设备端句柄
    pub fn device(&self) -> MockDevice {
        self.device.clone()
    }

    /// 主机写出的全部字节（按文本）
    pub fn written(&self) -> String {
        String::from_utf8_lossy(&self.written.lock()).into_owned()
    }

    /// 主机写出的命令行（不含换行符）
    pub fn written_lines(&self) -> Vec<String> {
        self.written().lines().map(str::to_string).collect()
    }

    /// 最近一次打开使用的链路参数
    pub fn opened_with(&self) -> Option<LinkConfig> {
        *self.opened_with.lock()
    }

    /// 成功打开的次数
    pub fn open_count(&self) -> usize {
        self.open_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl DeviceProvider for MockProvider {
    async fn request_port(&self) -> Result<DevicePort, SerialError> {
        match self.behavior() {
            MockBehavior::NoDevice => Err(SerialDeviceError::new(
                SerialDeviceErrorKind::NoDevice,
                "no serial device available",
            )
            .into()),
            MockBehavior::Cancelled => Err(SerialDeviceError::new(
                SerialDeviceErrorKind::Cancelled,
                "device selection cancelled",
            )
            .into()),
            MockBehavior::Unresponsive => std::future::pending().await,
            _ => Ok(DevicePort::new(MOCK_PORT_PATH)),
        }
    }

    async fn open(&self, port: &DevicePort, link: &LinkConfig) -> Result<SerialChannel, SerialError> {
        *self.opened_with.lock() = Some(*link);
        let behavior = self.behavior();
        if behavior == MockBehavior::OpenFails {
            return Err(SerialDeviceError::new(
                SerialDeviceErrorKind::UnsupportedConfig,
                format!("cannot configure {} at {} baud", port, link.baud_rate),
            )
            .into());
        }

        let (host, device) = tokio::io::duplex(MOCK_BUFFER_SIZE);
        self.device.attach(device).await;
        let (reader, writer) = tokio::io::split(host);

        let reader: BoxedReader = match behavior {
            MockBehavior::FailingReader => Box::new(FailingReader),
            _ => Box::new(reader),
        };
        let writer: BoxedWriter = match behavior {
            MockBehavior::BrokenWriter => Box::new(BrokenWriter),
            _ => Box::new(RecordingWriter {
                inner: writer,
                written: Arc::clone(&self.written),
            }),
        };

        self.open_count.fetch_add(1, Ordering::Relaxed);
        Ok(SerialChannel::new(reader, writer))
    }
}

/// 设备端句柄
#[derive(Clone, Default)]
pub struct MockDevice {
    stream: Arc<Mutex<Option<BufReader<DuplexStream>>>>,
}

impl MockDevice {
    async fn attach(&self, stream: DuplexStream) {
        *self.stream.lock().await = Some(BufReader::new(stream));
    }

    /// 读取主机发出的下一行（不含换行符），通道关闭时返回 `None`
    pub async fn next_line(&self) -> Option<String> {
        let mut guard = self.stream.lock().await;
        let stream = guard.as_mut()?;
        let mut line = String::new();
        match stream.read_line(&mut line).await {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_string()),
        }
    }

    /// 向主机写回应答
    pub async fn reply(&self, text: &str) -> io::Result<()> {
        self.reply_bytes(text.as_bytes()).await
    }

    /// 向主机写回原始字节（可用于模拟乱码）
    pub async fn reply_bytes(&self, bytes: &[u8]) -> io::Result<()> {
        let mut guard = self.stream.lock().await;
        let stream = guard
            .as_mut()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))?;
        stream.get_mut().write_all(bytes).await
    }

    /// 启动后台应答任务
    ///
    /// 对每一行调用 `respond`，返回 `Some` 时写回应答。通道关闭后任务结束，
    /// 返回收到的全部命令行。
    ///
    /// 必须在通道打开之后调用，否则任务立即结束。
    pub fn spawn_responder<F>(&self, mut respond: F) -> JoinHandle<Vec<String>>
    where
        F: FnMut(&str) -> Option<String> + Send + 'static,
    {
        let device = self.clone();
        tokio::spawn(async move {
            let mut lines = Vec::new();
            while let Some(line) = device.next_line().await {
                if let Some(reply) = respond(&line) {
                    if device.reply(&reply).await.is_err() {
                        break;
                    }
                }
                lines.push(line);
            }
            lines
        })
    }
}

/// 记录写出字节后转发到内存管道
struct RecordingWriter {
    inner: WriteHalf<DuplexStream>,
    written: Arc<SyncMutex<Vec<u8>>>,
}

impl AsyncWrite for RecordingWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let n = ready!(Pin::new(&mut this.inner).poll_write(cx, buf))?;
        this.written.lock().extend_from_slice(&buf[..n]);
        Poll::Ready(Ok(n))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

/// 写入总是返回 BrokenPipe
struct BrokenWriter;

impl AsyncWrite for BrokenWriter {
    fn poll_write(self: Pin<&mut Self>, _: &mut Context<'_>, _: &[u8]) -> Poll<io::Result<usize>> {
        Poll::Ready(Err(io::Error::new(
            io::ErrorKind::BrokenPipe,
            "device unplugged",
        )))
    }

    fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// 读取总是失败
struct FailingReader;

impl AsyncRead for FailingReader {
    fn poll_read(
        self: Pin<&mut Self>,
        _: &mut Context<'_>,
        _: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Poll::Ready(Err(io::Error::other("framing error")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_request_port_behaviors() {
        let provider = MockProvider::new();
        assert_eq!(
            provider.request_port().await.unwrap(),
            DevicePort::new(MOCK_PORT_PATH)
        );

        provider.set_behavior(MockBehavior::Cancelled);
        let err = provider.request_port().await.unwrap_err();
        assert!(err.is_unavailable());

        provider.set_behavior(MockBehavior::NoDevice);
        let err = provider.request_port().await.unwrap_err();
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn test_channel_records_writes_and_relays_replies() {
        let provider = MockProvider::new();
        let device = provider.device();
        let port = provider.request_port().await.unwrap();
        let mut channel = provider.open(&port, &LinkConfig::default()).await.unwrap();
        assert_eq!(provider.open_count(), 1);

        channel.writer.write_all(b"G90\nM114\n").await.unwrap();
        assert_eq!(device.next_line().await.as_deref(), Some("G90"));
        assert_eq!(device.next_line().await.as_deref(), Some("M114"));
        assert_eq!(provider.written_lines(), vec!["G90", "M114"]);

        device.reply("ok\n").await.unwrap();
        let mut buf = [0u8; 8];
        let n = tokio::io::AsyncReadExt::read(&mut channel.reader, &mut buf)
            .await
            .unwrap();
        assert_eq!(&buf[..n], b"ok\n");
    }

    #[tokio::test]
    async fn test_responder_collects_lines_until_close() {
        let provider = MockProvider::new();
        let port = provider.request_port().await.unwrap();
        let channel = provider.open(&port, &LinkConfig::default()).await.unwrap();
        let responder = provider
            .device()
            .spawn_responder(|line| (line == "M114").then(|| "X:0ok\n".to_string()));
        let SerialChannel { reader, mut writer } = channel;

        writer.write_all(b"G91\n").await.unwrap();
        writer.shutdown().await.unwrap();
        drop(writer);
        drop(reader);

        let lines = responder.await.unwrap();
        assert_eq!(lines, vec!["G91"]);
    }
}
