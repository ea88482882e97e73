//! 机械臂控制器
//!
//! 编排 编码 → 发送 → 固定等待 → （可选）读取 + 解析 的完整命令周期，
//! 每个逻辑命令对应一个异步方法。

use crate::builder::ArmControllerBuilder;
use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::state::{AtomicControllerState, ControllerState};
use mearm_protocol::{ArmCommand, PositionReply, PositioningMode, ResponseParser};
use mearm_serial::{DevicePort, DeviceProvider, SessionState, TransportSession};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// 单条命令的执行结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// 已发送并等待完毕
    Settled,
    /// 位置查询的应答
    Position(PositionReply),
}

impl CommandOutcome {
    pub fn into_reply(self) -> Option<PositionReply> {
        match self {
            Self::Position(reply) => Some(reply),
            Self::Settled => None,
        }
    }
}

/// 机械臂控制器
///
/// 每个实例独占一个 [`TransportSession`]。同一时刻只允许一条命令在执行：
/// 状态不是 ConnectedIdle 时（包括有命令在执行）发出的命令立即返回
/// [`ControllerError::NotConnected`]，不会排队；调用方需要
/// 等上一条命令完成后再发下一条，才能保证设备按发出顺序收到命令。
///
/// 一旦开始等待或读取就会执行到底，没有取消和超时升级。
///
/// # Example
///
/// ```rust,no_run
/// use mearm_client::ArmController;
///
/// # async fn demo() -> Result<(), mearm_client::ControllerError> {
/// let arm = ArmController::builder().port("/dev/ttyUSB0").build();
///
/// arm.connect().await?;
/// arm.relative_mode().await?;
/// arm.move_linear(10.0, 0.0, 5.0, 300.0).await?;
/// let position = arm.query_position().await?;
/// println!("{}", position);
/// # Ok(())
/// # }
/// ```
pub struct ArmController {
    config: ControllerConfig,
    provider: Arc<dyn DeviceProvider>,
    session: TransportSession,
    state: AtomicControllerState,
}

impl ArmController {
    pub fn new(config: ControllerConfig, provider: Arc<dyn DeviceProvider>) -> Self {
        Self {
            config,
            provider,
            session: TransportSession::new(),
            state: AtomicControllerState::default(),
        }
    }

    pub fn builder() -> ArmControllerBuilder {
        ArmControllerBuilder::new()
    }

    pub fn state(&self) -> ControllerState {
        self.state.get()
    }

    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    /// 当前会话（只读，诊断用）
    pub fn session(&self) -> &TransportSession {
        &self.session
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn port(&self) -> Option<DevicePort> {
        self.session.port()
    }

    /// 连接设备
    ///
    /// Idle → Connecting → ConnectedIdle；失败时回到 Idle 并返回错误，
    /// 调用方可以重试。已连接时直接返回 `Ok`，正在连接或执行命令时返回 `Busy`。
    ///
    /// 连接过程中 future 被丢弃（例如外层超时）同样回到 Idle。
    pub async fn connect(&self) -> Result<(), ControllerError> {
        match self
            .state
            .compare_exchange(ControllerState::Idle, ControllerState::Connecting)
        {
            Ok(_) => {},
            Err(ControllerState::ConnectedIdle) => {
                debug!("MeArm already connected");
                return Ok(());
            },
            Err(_) => return Err(ControllerError::Busy),
        }
        let mut connecting = ConnectingGuard {
            controller: self,
            opened: false,
        };

        match self
            .session
            .open(self.provider.as_ref(), &self.config.link())
            .await
        {
            Ok(port) => {
                connecting.opened = true;
                info!("MeArm connected via {}", port);
                Ok(())
            },
            Err(e) => {
                error!("MeArm connection failed: {}", e);
                Err(ControllerError::from_open(e))
            },
        }
    }

    /// 断开连接（幂等）
    ///
    /// 有命令在执行或正在连接时返回 `Busy`。
    pub async fn disconnect(&self) -> Result<(), ControllerError> {
        match self
            .state
            .compare_exchange(ControllerState::ConnectedIdle, ControllerState::Busy)
        {
            Ok(_) => {
                self.session.close().await;
                self.state.set(ControllerState::Idle);
                info!("MeArm disconnected");
                Ok(())
            },
            Err(ControllerState::Idle) => {
                self.session.close().await;
                Ok(())
            },
            Err(_) => Err(ControllerError::Busy),
        }
    }

    /// 执行一条命令的完整周期
    pub async fn execute(&self, command: ArmCommand) -> Result<CommandOutcome, ControllerError> {
        let _busy = self.begin(&command)?;

        if let Some(frame) = command.encode() {
            if let Err(e) = self.session.send(&frame).await {
                warn!(command = command.name(), "Failed to send command: {}", e);
                return Err(ControllerError::WriteFailure(e));
            }
        }

        tokio::time::sleep(self.config.settle.delay_for(&command)).await;

        if !command.expects_reply() {
            return Ok(CommandOutcome::Settled);
        }

        let response = self.session.receive(self.config.read_window()).await;
        let reply = ResponseParser::parse(&response);
        match &reply {
            PositionReply::Position(text) => debug!("Reported position: {}", text),
            PositionReply::NoResponse => warn!("No response to position query"),
            PositionReply::ReadFailed => warn!("Position query read failed"),
        }
        Ok(CommandOutcome::Position(reply))
    }

    /// 直线插补运动（G1）
    pub async fn move_linear(&self, x: f64, y: f64, z: f64, feed: f64) -> Result<(), ControllerError> {
        self.execute(ArmCommand::Move { x, y, z, feed })
            .await
            .map(|_| ())
    }

    /// 快速运动（G0）
    pub async fn jump_to(&self, x: f64, y: f64, z: f64, feed: f64) -> Result<(), ControllerError> {
        self.execute(ArmCommand::Jump { x, y, z, feed })
            .await
            .map(|_| ())
    }

    /// 设置夹爪角度（M106）
    pub async fn set_gripper(&self, angle: f64) -> Result<(), ControllerError> {
        self.execute(ArmCommand::SetGripper { angle })
            .await
            .map(|_| ())
    }

    /// 张开夹爪（使用配置中的预设角度）
    pub async fn open_gripper(&self) -> Result<(), ControllerError> {
        self.set_gripper(self.config.gripper.open).await
    }

    /// 闭合夹爪（使用配置中的预设角度）
    pub async fn close_gripper(&self) -> Result<(), ControllerError> {
        self.set_gripper(self.config.gripper.close).await
    }

    pub async fn set_positioning_mode(&self, mode: PositioningMode) -> Result<(), ControllerError> {
        self.execute(ArmCommand::SetMode(mode)).await.map(|_| ())
    }

    /// 切换到绝对坐标（G90）
    pub async fn absolute_mode(&self) -> Result<(), ControllerError> {
        self.set_positioning_mode(PositioningMode::Absolute).await
    }

    /// 切换到相对坐标（G91）
    pub async fn relative_mode(&self) -> Result<(), ControllerError> {
        self.set_positioning_mode(PositioningMode::Relative).await
    }

    /// 等待指定秒数
    pub async fn wait(&self, seconds: f64) -> Result<(), ControllerError> {
        self.execute(ArmCommand::Wait { seconds }).await.map(|_| ())
    }

    /// 查询当前位置（M114）
    ///
    /// 读取失败不作为错误返回，而是体现在 [`PositionReply`] 中；
    /// 需要结构化错误时使用 [`PositionReply::into_result`]。
    pub async fn query_position(&self) -> Result<PositionReply, ControllerError> {
        let outcome = self.execute(ArmCommand::QueryPosition).await?;
        Ok(outcome.into_reply().unwrap_or(PositionReply::NoResponse))
    }

    /// ConnectedIdle → Busy
    fn begin(&self, command: &ArmCommand) -> Result<BusyGuard<'_>, ControllerError> {
        match self
            .state
            .compare_exchange(ControllerState::ConnectedIdle, ControllerState::Busy)
        {
            Ok(_) => Ok(BusyGuard { controller: self }),
            Err(ControllerState::Busy) => {
                warn!(command = command.name(), "MeArm busy, command rejected");
                Err(ControllerError::NotConnected)
            },
            Err(_) => {
                warn!(command = command.name(), "MeArm not connected.");
                Err(ControllerError::NotConnected)
            },
        }
    }
}

impl std::fmt::Debug for ArmController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArmController")
            .field("state", &self.state())
            .field("session", &self.session)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// 连接期间持有：打开成功 → ConnectedIdle，失败或 future 被丢弃 → Idle
struct ConnectingGuard<'a> {
    controller: &'a ArmController,
    opened: bool,
}

impl Drop for ConnectingGuard<'_> {
    fn drop(&mut self) {
        let next = if self.opened {
            ControllerState::ConnectedIdle
        } else {
            ControllerState::Idle
        };
        self.controller.state.set(next);
    }
}

/// 命令执行期间持有，离开作用域时恢复状态（包括出错和 future 被丢弃）
///
/// 会话在执行中断开时恢复为 Idle。
struct BusyGuard<'a> {
    controller: &'a ArmController,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        let next = if self.controller.session.is_connected() {
            ControllerState::ConnectedIdle
        } else {
            ControllerState::Idle
        };
        self.controller.state.set(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mearm_serial::mock::{MockBehavior, MockProvider};
    use std::time::Duration;
    use tokio::time::Instant;

    fn controller(provider: &MockProvider) -> ArmController {
        ArmController::new(ControllerConfig::default(), Arc::new(provider.clone()))
    }

    fn assert_elapsed(start: Instant, expected_ms: u64) {
        let elapsed = start.elapsed();
        assert!(
            elapsed >= Duration::from_millis(expected_ms)
                && elapsed < Duration::from_millis(expected_ms + 10),
            "expected ~{}ms, got {:?}",
            expected_ms,
            elapsed
        );
    }

    #[tokio::test]
    async fn test_connect_and_disconnect() {
        let provider = MockProvider::new();
        let arm = controller(&provider);
        assert_eq!(arm.state(), ControllerState::Idle);

        arm.connect().await.unwrap();
        assert_eq!(arm.state(), ControllerState::ConnectedIdle);
        assert_eq!(arm.session_state(), SessionState::Connected);
        assert_eq!(provider.opened_with().unwrap().baud_rate, 115_200);

        // 已连接时再次连接不会重新打开
        arm.connect().await.unwrap();
        assert_eq!(provider.open_count(), 1);

        arm.disconnect().await.unwrap();
        assert_eq!(arm.state(), ControllerState::Idle);
        assert_eq!(arm.session_state(), SessionState::Disconnected);
        arm.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_without_device_stays_idle() {
        let provider = MockProvider::with_behavior(MockBehavior::NoDevice);
        let arm = controller(&provider);

        let err = arm.connect().await.unwrap_err();
        assert!(matches!(err, ControllerError::DeviceUnavailable(_)));
        assert_eq!(arm.state(), ControllerState::Idle);
        assert_eq!(arm.session_state(), SessionState::Disconnected);

        let err = arm.move_linear(100.0, 0.0, 100.0, 900.0).await.unwrap_err();
        assert!(matches!(err, ControllerError::NotConnected));
        assert!(provider.written().is_empty());
    }

    #[tokio::test]
    async fn test_connect_open_error_then_retry() {
        let provider = MockProvider::with_behavior(MockBehavior::OpenFails);
        let arm = controller(&provider);

        let err = arm.connect().await.unwrap_err();
        assert!(matches!(err, ControllerError::OpenError(_)));
        assert_eq!(arm.state(), ControllerState::Idle);

        provider.set_behavior(MockBehavior::Normal);
        arm.connect().await.unwrap();
        assert_eq!(arm.state(), ControllerState::ConnectedIdle);
    }

    #[tokio::test]
    async fn test_commands_require_connection() {
        let provider = MockProvider::new();
        let arm = controller(&provider);

        for command in [
            ArmCommand::Move {
                x: 1.0,
                y: 2.0,
                z: 3.0,
                feed: 4.0,
            },
            ArmCommand::open_gripper(),
            ArmCommand::SetMode(PositioningMode::Absolute),
            ArmCommand::Wait { seconds: 1.0 },
            ArmCommand::QueryPosition,
        ] {
            let start = Instant::now();
            let err = arm.execute(command).await.unwrap_err();
            assert!(matches!(err, ControllerError::NotConnected));
            assert!(start.elapsed() < Duration::from_millis(10));
            assert_eq!(arm.state(), ControllerState::Idle);
        }
        assert!(provider.written().is_empty());
        assert_eq!(provider.open_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_settle_delays() {
        let provider = MockProvider::new();
        let arm = controller(&provider);
        arm.connect().await.unwrap();

        let start = Instant::now();
        arm.jump_to(100.0, 0.0, 100.0, 900.0).await.unwrap();
        assert_elapsed(start, 500);

        let start = Instant::now();
        arm.close_gripper().await.unwrap();
        assert_elapsed(start, 300);

        let start = Instant::now();
        arm.absolute_mode().await.unwrap();
        assert_elapsed(start, 50);

        let start = Instant::now();
        arm.wait(2.0).await.unwrap();
        assert_elapsed(start, 2000);

        assert_eq!(
            provider.written_lines(),
            vec!["G0 X100 Y0 Z100 F900", "M106 S30", "G90"]
        );
        assert_eq!(arm.state(), ControllerState::ConnectedIdle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_position_reply() {
        let provider = MockProvider::new();
        let arm = controller(&provider);
        arm.connect().await.unwrap();

        let responder = provider
            .device()
            .spawn_responder(|line| (line == "M114").then(|| "X:10 Y:20 Z:30\nok\n".to_string()));

        let start = Instant::now();
        let reply = arm.query_position().await.unwrap();
        assert_eq!(reply, PositionReply::Position("X:10 Y:20 Z:30".into()));
        assert_elapsed(start, 200);
        assert_eq!(arm.state(), ControllerState::ConnectedIdle);

        arm.disconnect().await.unwrap();
        assert_eq!(responder.await.unwrap(), vec!["M114"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_position_without_reply() {
        let provider = MockProvider::new();
        let arm = controller(&provider);
        arm.connect().await.unwrap();

        let start = Instant::now();
        let reply = arm.query_position().await.unwrap();
        assert_eq!(reply, PositionReply::NoResponse);
        // 200ms 等待 + 1000ms 读取窗口
        assert_elapsed(start, 1200);
        assert_eq!(arm.state(), ControllerState::ConnectedIdle);
        assert!(!arm.session().is_read_locked());
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_position_read_failure() {
        let provider = MockProvider::with_behavior(MockBehavior::FailingReader);
        let arm = controller(&provider);
        arm.connect().await.unwrap();

        let reply = arm.query_position().await.unwrap();
        assert_eq!(reply, PositionReply::ReadFailed);
        assert_eq!(reply.to_string(), "ERROR: Read failed");
        assert_eq!(arm.state(), ControllerState::ConnectedIdle);
        assert!(!arm.session().is_read_locked());
    }

    #[tokio::test]
    async fn test_write_failure_returns_to_idle() {
        let provider = MockProvider::with_behavior(MockBehavior::BrokenWriter);
        let arm = controller(&provider);
        arm.connect().await.unwrap();

        let err = arm.absolute_mode().await.unwrap_err();
        assert!(matches!(err, ControllerError::WriteFailure(_)));
        // 链路已断开，会话被关闭
        assert_eq!(arm.state(), ControllerState::Idle);
        assert_eq!(arm.session_state(), SessionState::Disconnected);

        let err = arm.absolute_mode().await.unwrap_err();
        assert!(matches!(err, ControllerError::NotConnected));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_command_is_rejected() {
        let provider = MockProvider::new();
        let arm = controller(&provider);
        arm.connect().await.unwrap();

        let (first, second) = tokio::join!(arm.move_linear(1.0, 2.0, 3.0, 4.0), async {
            tokio::task::yield_now().await;
            assert_eq!(arm.state(), ControllerState::Busy);
            arm.set_gripper(90.0).await
        });

        first.unwrap();
        assert!(matches!(second, Err(ControllerError::NotConnected)));
        assert_eq!(provider.written_lines(), vec!["G1 X1 Y2 Z3 F4"]);
        assert_eq!(arm.state(), ControllerState::ConnectedIdle);

        // 执行中不允许断开
        let (moved, disconnected) =
            tokio::join!(arm.move_linear(0.0, 0.0, 0.0, 100.0), arm.disconnect());
        moved.unwrap();
        assert!(matches!(disconnected, Err(ControllerError::Busy)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_connect_returns_to_idle() {
        let provider = MockProvider::with_behavior(MockBehavior::Unresponsive);
        let arm = controller(&provider);

        let result = tokio::time::timeout(Duration::from_millis(100), arm.connect()).await;
        assert!(result.is_err());
        assert_eq!(arm.state(), ControllerState::Idle);
        assert_eq!(arm.session_state(), SessionState::Disconnected);
        assert!(matches!(
            arm.absolute_mode().await,
            Err(ControllerError::NotConnected)
        ));

        // 设备恢复后同一个控制器可以重连
        provider.set_behavior(MockBehavior::Normal);
        arm.connect().await.unwrap();
        assert_eq!(arm.state(), ControllerState::ConnectedIdle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_while_connecting_is_busy() {
        let provider = MockProvider::with_behavior(MockBehavior::Unresponsive);
        let arm = controller(&provider);

        let (first, second) = tokio::join!(
            tokio::time::timeout(Duration::from_millis(100), arm.connect()),
            async {
                tokio::task::yield_now().await;
                assert_eq!(arm.state(), ControllerState::Connecting);
                arm.connect().await
            }
        );
        assert!(first.is_err());
        assert!(matches!(second, Err(ControllerError::Busy)));
        assert_eq!(arm.state(), ControllerState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_position_garbled_reply() {
        let provider = MockProvider::new();
        let arm = controller(&provider);
        arm.connect().await.unwrap();

        // 非 UTF-8 字节在查询前已到达缓冲区
        provider.device().reply_bytes(&[0xFF, 0xFE]).await.unwrap();

        let reply = arm.query_position().await.unwrap();
        assert_eq!(reply, PositionReply::ReadFailed);
        assert!(!arm.session().is_read_locked());
        assert_eq!(arm.state(), ControllerState::ConnectedIdle);
        assert_eq!(provider.written_lines(), vec!["M114"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_command_releases_busy() {
        let provider = MockProvider::new();
        let arm = controller(&provider);
        arm.connect().await.unwrap();

        let result = tokio::time::timeout(Duration::from_millis(100), arm.wait(5.0)).await;
        assert!(result.is_err());
        assert_eq!(arm.state(), ControllerState::ConnectedIdle);
    }

    #[tokio::test]
    async fn test_gripper_presets_from_config() {
        let provider = MockProvider::new();
        let mut config = ControllerConfig::default();
        config.gripper.open = 150.0;
        config.settle.gripper_ms = 0;
        let arm = ArmController::new(config, Arc::new(provider.clone()));
        arm.connect().await.unwrap();

        arm.open_gripper().await.unwrap();
        arm.close_gripper().await.unwrap();
        assert_eq!(provider.written_lines(), vec!["M106 S150", "M106 S30"]);
    }
}
