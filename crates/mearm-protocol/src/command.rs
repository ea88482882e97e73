//! 命令编码模块
//!
//! 将逻辑命令映射为 G-code 风格的单行文本帧。纯函数，无 IO，
//! 不做数值范围校验（越界值原样编码，由设备自行拒绝或钳位）。

use crate::WireFrame;

/// 直线插补运动操作码
pub const OPCODE_LINEAR_MOVE: &str = "G1";
/// 快速（非插补）运动操作码
pub const OPCODE_RAPID_MOVE: &str = "G0";
/// 执行器（夹爪舵机）设置操作码
pub const OPCODE_SET_ACTUATOR: &str = "M106";
/// 绝对坐标模式操作码
pub const OPCODE_ABSOLUTE_MODE: &str = "G90";
/// 相对坐标模式操作码
pub const OPCODE_RELATIVE_MODE: &str = "G91";
/// 位置上报请求操作码
pub const OPCODE_REPORT_POSITION: &str = "M114";

/// 夹爪张开预设角度
pub const GRIPPER_OPEN_ANGLE: f64 = 120.0;
/// 夹爪闭合预设角度
pub const GRIPPER_CLOSE_ANGLE: f64 = 30.0;

/// 坐标模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PositioningMode {
    /// 绝对坐标（G90，默认）
    #[default]
    Absolute,
    /// 相对坐标（G91）
    Relative,
}

impl PositioningMode {
    /// 对应的操作码
    pub fn opcode(self) -> &'static str {
        match self {
            Self::Absolute => OPCODE_ABSOLUTE_MODE,
            Self::Relative => OPCODE_RELATIVE_MODE,
        }
    }
}

/// 逻辑机械臂命令
///
/// 每次调用构造一个实例，构造后不可变。
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ArmCommand {
    /// 直线插补运动到 (x, y, z)，进给速度 feed
    Move { x: f64, y: f64, z: f64, feed: f64 },

    /// 快速运动到 (x, y, z)，进给速度 feed
    Jump { x: f64, y: f64, z: f64, feed: f64 },

    /// 设置夹爪角度
    SetGripper { angle: f64 },

    /// 切换坐标模式
    SetMode(PositioningMode),

    /// 等待指定秒数（不产生线上帧）
    Wait { seconds: f64 },

    /// 查询当前位置
    QueryPosition,
}

impl ArmCommand {
    /// 夹爪张开预设（等价于 `SetGripper { angle: 120 }`）
    pub fn open_gripper() -> Self {
        Self::SetGripper {
            angle: GRIPPER_OPEN_ANGLE,
        }
    }

    /// 夹爪闭合预设（等价于 `SetGripper { angle: 30 }`）
    pub fn close_gripper() -> Self {
        Self::SetGripper {
            angle: GRIPPER_CLOSE_ANGLE,
        }
    }

    /// 编码为线上帧
    ///
    /// `Wait` 只作用于主机端节奏控制，没有对应的线上帧，返回 `None`。
    ///
    /// ```rust
    /// use mearm_protocol::ArmCommand;
    ///
    /// let frame = ArmCommand::Move { x: 100.0, y: 0.0, z: 100.0, feed: 900.0 }
    ///     .encode()
    ///     .unwrap();
    /// assert_eq!(frame.as_str(), "G1 X100 Y0 Z100 F900\n");
    /// ```
    pub fn encode(&self) -> Option<WireFrame> {
        let body = match *self {
            Self::Move { x, y, z, feed } => motion_body(OPCODE_LINEAR_MOVE, x, y, z, feed),
            Self::Jump { x, y, z, feed } => motion_body(OPCODE_RAPID_MOVE, x, y, z, feed),
            Self::SetGripper { angle } => format!("{} S{}", OPCODE_SET_ACTUATOR, angle),
            Self::SetMode(mode) => mode.opcode().to_string(),
            Self::QueryPosition => OPCODE_REPORT_POSITION.to_string(),
            Self::Wait { .. } => return None,
        };
        Some(WireFrame::from_body(body))
    }

    /// 是否需要在发送后读取一次应答
    pub fn expects_reply(&self) -> bool {
        matches!(self, Self::QueryPosition)
    }

    /// 命令名称（用于日志）
    pub fn name(&self) -> &'static str {
        match self {
            Self::Move { .. } => "move",
            Self::Jump { .. } => "jump",
            Self::SetGripper { .. } => "set_gripper",
            Self::SetMode(PositioningMode::Absolute) => "absolute_mode",
            Self::SetMode(PositioningMode::Relative) => "relative_mode",
            Self::Wait { .. } => "wait",
            Self::QueryPosition => "query_position",
        }
    }
}

fn motion_body(opcode: &str, x: f64, y: f64, z: f64, feed: f64) -> String {
    format!("{} X{} Y{} Z{} F{}", opcode, x, y, z, feed)
}

/// 命令编码器
///
/// 无状态，等价于直接调用 [`ArmCommand::encode`]，便于在调用方以组件形式注入。
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandEncoder;

impl CommandEncoder {
    pub fn encode(&self, command: &ArmCommand) -> Option<WireFrame> {
        command.encode()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn encode(command: ArmCommand) -> String {
        command.encode().unwrap().as_str().to_string()
    }

    #[test]
    fn test_encode_motion() {
        assert_eq!(
            encode(ArmCommand::Move {
                x: 100.0,
                y: 0.0,
                z: 100.0,
                feed: 900.0
            }),
            "G1 X100 Y0 Z100 F900\n"
        );
        assert_eq!(
            encode(ArmCommand::Jump {
                x: 10.5,
                y: -20.0,
                z: 5.25,
                feed: 300.0
            }),
            "G0 X10.5 Y-20 Z5.25 F300\n"
        );
    }

    #[test]
    fn test_encode_modes_and_query() {
        assert_eq!(
            encode(ArmCommand::SetMode(PositioningMode::Absolute)),
            "G90\n"
        );
        assert_eq!(
            encode(ArmCommand::SetMode(PositioningMode::Relative)),
            "G91\n"
        );
        assert_eq!(encode(ArmCommand::QueryPosition), "M114\n");
    }

    #[test]
    fn test_encode_gripper() {
        assert_eq!(encode(ArmCommand::SetGripper { angle: 90.0 }), "M106 S90\n");
        assert_eq!(encode(ArmCommand::open_gripper()), "M106 S120\n");
        assert_eq!(encode(ArmCommand::close_gripper()), "M106 S30\n");
    }

    #[test]
    fn test_out_of_range_values_are_not_validated() {
        assert_eq!(
            encode(ArmCommand::SetGripper { angle: 720.0 }),
            "M106 S720\n"
        );
        assert_eq!(
            encode(ArmCommand::Move {
                x: -1e6,
                y: 0.0,
                z: 0.0,
                feed: 0.0
            }),
            "G1 X-1000000 Y0 Z0 F0\n"
        );
    }

    #[test]
    fn test_wait_has_no_frame() {
        assert!(ArmCommand::Wait { seconds: 1.0 }.encode().is_none());
        assert!(!ArmCommand::Wait { seconds: 1.0 }.expects_reply());
        assert!(ArmCommand::QueryPosition.expects_reply());
    }

    #[test]
    fn test_encoder_component_matches_command() {
        let command = ArmCommand::SetMode(PositioningMode::Relative);
        assert_eq!(CommandEncoder.encode(&command), command.encode());
    }

    proptest! {
        #[test]
        fn prop_move_and_jump_differ_only_in_opcode(
            x in -1000.0f64..1000.0,
            y in -1000.0f64..1000.0,
            z in -1000.0f64..1000.0,
            feed in 0.0f64..5000.0,
        ) {
            let linear = encode(ArmCommand::Move { x, y, z, feed });
            let rapid = encode(ArmCommand::Jump { x, y, z, feed });

            prop_assert!(linear.starts_with("G1 "));
            prop_assert!(rapid.starts_with("G0 "));
            prop_assert_eq!(&linear[2..], &rapid[2..]);

            for frame in [&linear, &rapid] {
                prop_assert!(frame.ends_with('\n'));
                prop_assert_eq!(frame.matches('\n').count(), 1);
            }
        }

        #[test]
        fn prop_gripper_carries_single_parameter(angle in -360.0f64..360.0) {
            let frame = ArmCommand::SetGripper { angle }.encode().unwrap();
            let fields: Vec<&str> = frame.body().split(' ').collect();

            prop_assert_eq!(fields.len(), 2);
            prop_assert_eq!(fields[0], OPCODE_SET_ACTUATOR);
            let value: f64 = fields[1].trim_start_matches('S').parse().unwrap();
            prop_assert_eq!(value, angle);
        }
    }
}
