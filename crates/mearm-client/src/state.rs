//! 控制器状态定义
//!
//! 同一时刻最多只有一条命令在执行，状态切换使用原子 CAS 完成。

use std::sync::atomic::{AtomicU8, Ordering};

/// 控制器状态
///
/// ```text
/// Idle ──connect──▶ Connecting ──ok──▶ ConnectedIdle ◀──settled── Busy
///   ▲                   │                    │                     ▲
///   └──────failed───────┘                    └──────command────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ControllerState {
    /// 未连接（默认）
    #[default]
    Idle = 0,
    /// 正在连接
    Connecting = 1,
    /// 已连接，空闲
    ConnectedIdle = 2,
    /// 有命令正在执行（发送 → 等待 → 读取）
    Busy = 3,
}

impl ControllerState {
    /// 从 u8 转换
    ///
    /// 如果值无效，返回 Idle。
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::ConnectedIdle,
            3 => Self::Busy,
            _ => Self::Idle,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// 是否可以接受新命令
    pub fn is_ready(self) -> bool {
        self == Self::ConnectedIdle
    }

    /// 会话是否处于连接状态（空闲或忙）
    pub fn is_connected(self) -> bool {
        matches!(self, Self::ConnectedIdle | Self::Busy)
    }
}

/// 控制器状态（原子版本）
#[derive(Debug)]
pub struct AtomicControllerState {
    inner: AtomicU8,
}

impl AtomicControllerState {
    pub fn new(state: ControllerState) -> Self {
        Self {
            inner: AtomicU8::new(state.as_u8()),
        }
    }

    pub fn get(&self) -> ControllerState {
        ControllerState::from_u8(self.inner.load(Ordering::Acquire))
    }

    pub fn set(&self, state: ControllerState) {
        self.inner.store(state.as_u8(), Ordering::Release);
    }

    /// 比较并交换
    ///
    /// 当前值等于 `current` 时切换为 `new` 并返回 `Ok(current)`，
    /// 否则返回 `Err(实际值)`。
    pub fn compare_exchange(
        &self,
        current: ControllerState,
        new: ControllerState,
    ) -> Result<ControllerState, ControllerState> {
        self.inner
            .compare_exchange(
                current.as_u8(),
                new.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map(ControllerState::from_u8)
            .map_err(ControllerState::from_u8)
    }
}

impl Default for AtomicControllerState {
    fn default() -> Self {
        Self::new(ControllerState::Idle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_conversions() {
        for state in [
            ControllerState::Idle,
            ControllerState::Connecting,
            ControllerState::ConnectedIdle,
            ControllerState::Busy,
        ] {
            assert_eq!(ControllerState::from_u8(state.as_u8()), state);
        }
        assert_eq!(ControllerState::from_u8(42), ControllerState::Idle); // 无效值
    }

    #[test]
    fn test_state_predicates() {
        assert!(ControllerState::ConnectedIdle.is_ready());
        assert!(!ControllerState::Busy.is_ready());
        assert!(ControllerState::Busy.is_connected());
        assert!(!ControllerState::Connecting.is_connected());
    }

    #[test]
    fn test_compare_exchange() {
        let state = AtomicControllerState::default();
        assert_eq!(state.get(), ControllerState::Idle);

        assert_eq!(
            state.compare_exchange(ControllerState::Idle, ControllerState::Connecting),
            Ok(ControllerState::Idle)
        );
        assert_eq!(state.get(), ControllerState::Connecting);

        // 失败情况：返回实际值，不修改
        assert_eq!(
            state.compare_exchange(ControllerState::ConnectedIdle, ControllerState::Busy),
            Err(ControllerState::Connecting)
        );
        assert_eq!(state.get(), ControllerState::Connecting);
    }
}
