//! Builder 模式实现
//!
//! 提供链式构造 `ArmController` 实例的便捷方式。

use crate::config::{ControllerConfig, GripperPresets, SettlePolicy};
use crate::controller::ArmController;
use mearm_serial::{DeviceProvider, SystemPorts};
use std::sync::Arc;
use std::time::Duration;

/// ArmController Builder（链式构造）
///
/// # Example
///
/// ```no_run
/// use mearm_client::ArmControllerBuilder;
/// use std::time::Duration;
///
/// // 使用默认配置（自动选择第一个 USB 串口，115200 波特率）
/// let arm = ArmControllerBuilder::new().build();
///
/// // 指定端口和读取窗口
/// let arm = ArmControllerBuilder::new()
///     .port("/dev/ttyUSB0")
///     .read_window(Duration::from_millis(500))
///     .build();
/// ```
pub struct ArmControllerBuilder {
    config: ControllerConfig,
    /// 设备提供者（不设置时按 `config.port` 使用系统串口）
    provider: Option<Arc<dyn DeviceProvider>>,
}

impl ArmControllerBuilder {
    pub fn new() -> Self {
        Self {
            config: ControllerConfig::default(),
            provider: None,
        }
    }

    /// 整体替换配置（之后的链式调用仍可覆盖单个字段）
    pub fn config(mut self, config: ControllerConfig) -> Self {
        self.config = config;
        self
    }

    /// 设置串口路径（可选，默认自动选择第一个 USB 串口）
    pub fn port(mut self, path: impl Into<String>) -> Self {
        self.config.port = Some(path.into());
        self
    }

    /// 设置波特率（可选，默认 115200）
    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.config.baud_rate = baud_rate;
        self
    }

    /// 设置位置查询的读取窗口
    pub fn read_window(mut self, window: Duration) -> Self {
        self.config.read_window_ms = u64::try_from(window.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn settle_policy(mut self, settle: SettlePolicy) -> Self {
        self.config.settle = settle;
        self
    }

    pub fn gripper_presets(mut self, gripper: GripperPresets) -> Self {
        self.config.gripper = gripper;
        self
    }

    /// 使用自定义设备提供者（如测试用的 Mock 设备）
    pub fn device_provider(self, provider: impl DeviceProvider + 'static) -> Self {
        self.shared_provider(Arc::new(provider))
    }

    pub fn shared_provider(mut self, provider: Arc<dyn DeviceProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// 构建控制器（不会连接设备，需要显式调用 `connect()`）
    pub fn build(self) -> ArmController {
        let provider = match self.provider {
            Some(provider) => provider,
            None => Arc::new(match &self.config.port {
                Some(path) => SystemPorts::with_port(path.clone()),
                None => SystemPorts::default(),
            }),
        };
        ArmController::new(self.config, provider)
    }
}

impl Default for ArmControllerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
