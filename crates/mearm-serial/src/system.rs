//! 系统串口后端（tokio-serial）

use crate::{
    DevicePort, DeviceProvider, LinkConfig, SerialChannel, SerialDeviceError,
    SerialDeviceErrorKind, SerialError,
};
use async_trait::async_trait;
use tokio_serial::{
    DataBits, FlowControl, Parity, SerialPortBuilderExt, SerialPortInfo, SerialPortType, StopBits,
};
use tracing::{debug, info};

/// 系统串口设备提供者
///
/// 设备选择规则：
/// - 指定了 `preferred` 路径：该端口必须出现在系统枚举结果中
/// - 未指定：选择第一个 USB 串口
///
/// ```rust,no_run
/// use mearm_serial::SystemPorts;
///
/// // 自动选择第一个 USB 串口
/// let ports = SystemPorts::default();
///
/// // 指定端口
/// let ports = SystemPorts::with_port("/dev/ttyUSB0");
/// ```
#[derive(Debug, Clone, Default)]
pub struct SystemPorts {
    preferred: Option<String>,
}

impl SystemPorts {
    pub fn with_port(path: impl Into<String>) -> Self {
        Self {
            preferred: Some(path.into()),
        }
    }

    pub fn preferred(&self) -> Option<&str> {
        self.preferred.as_deref()
    }

    /// 从枚举结果中选择端口
    fn select(&self, ports: &[PortCandidate]) -> Result<DevicePort, SerialError> {
        if let Some(preferred) = &self.preferred {
            return ports
                .iter()
                .find(|p| &p.name == preferred)
                .map(|p| DevicePort::new(p.name.clone()))
                .ok_or_else(|| {
                    SerialDeviceError::new(
                        SerialDeviceErrorKind::NotFound,
                        format!("serial port {} not present", preferred),
                    )
                    .into()
                });
        }

        ports
            .iter()
            .find(|p| p.usb)
            .map(|p| DevicePort::new(p.name.clone()))
            .ok_or_else(|| {
                SerialDeviceError::new(
                    SerialDeviceErrorKind::NoDevice,
                    "no USB serial device found",
                )
                .into()
            })
    }
}

/// 枚举到的端口（只保留选择所需信息）
#[derive(Debug, Clone, PartialEq, Eq)]
struct PortCandidate {
    name: String,
    usb: bool,
}

impl From<SerialPortInfo> for PortCandidate {
    fn from(info: SerialPortInfo) -> Self {
        Self {
            usb: matches!(info.port_type, SerialPortType::UsbPort(_)),
            name: info.port_name,
        }
    }
}

#[async_trait]
impl DeviceProvider for SystemPorts {
    async fn request_port(&self) -> Result<DevicePort, SerialError> {
        let ports: Vec<PortCandidate> = tokio_serial::available_ports()?
            .into_iter()
            .map(PortCandidate::from)
            .collect();
        debug!("Found {} serial ports", ports.len());
        let port = self.select(&ports)?;
        info!("Selected serial port {}", port);
        Ok(port)
    }

    async fn open(&self, port: &DevicePort, link: &LinkConfig) -> Result<SerialChannel, SerialError> {
        let stream = tokio_serial::new(&port.path, link.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .open_native_async()?;
        Ok(SerialChannel::from_stream(stream))
    }
}
