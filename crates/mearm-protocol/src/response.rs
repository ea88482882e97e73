//! 应答解析模块
//!
//! 从设备返回的原始字节中提取位置上报文本。仅做文本提取，
//! 不解析坐标字段。

use bytes::Bytes;
use std::fmt;
use thiserror::Error;

/// 设备应答结束哨兵
pub const REPLY_SENTINEL: &str = "ok";

/// 读取窗口内未收到数据时的指示文本
pub const NO_RESPONSE_TEXT: &str = "No response";

/// 读取或解码失败时的指示文本
pub const READ_FAILED_TEXT: &str = "ERROR: Read failed";

/// 一次读取窗口的结果
///
/// 短生命周期：读取后立即交给 [`ResponseParser`] 并丢弃。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceResponse {
    /// 收到字节（可能是不完整的帧）
    Received(Bytes),
    /// 读取窗口内无数据
    Empty,
    /// 底层读取失败
    ReadFailed,
}

impl DeviceResponse {
    /// 收到字节时返回原始数据
    pub fn bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Received(bytes) => Some(bytes),
            _ => None,
        }
    }
}

/// 位置查询的结果
///
/// 保留文本指示语义（`Display` 输出与设备应答或固定指示文本一致），
/// 同时区分三种情况，调用方可以通过 [`PositionReply::into_result`] 得到结构化错误。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PositionReply {
    /// 哨兵之前的文本（已去除首尾空白）
    Position(String),
    /// 读取窗口内未收到数据
    NoResponse,
    /// 读取失败或应答无法解码
    ReadFailed,
}

impl PositionReply {
    /// 转换为文本指示
    pub fn as_text(&self) -> &str {
        match self {
            Self::Position(text) => text,
            Self::NoResponse => NO_RESPONSE_TEXT,
            Self::ReadFailed => READ_FAILED_TEXT,
        }
    }

    /// 是否拿到了位置文本
    pub fn is_position(&self) -> bool {
        matches!(self, Self::Position(_))
    }

    /// 转换为结构化结果
    pub fn into_result(self) -> Result<String, ReplyError> {
        match self {
            Self::Position(text) => Ok(text),
            Self::NoResponse => Err(ReplyError::NoResponse),
            Self::ReadFailed => Err(ReplyError::ReadFailed),
        }
    }
}

impl fmt::Display for PositionReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_text())
    }
}

/// 位置查询失败原因
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyError {
    #[error("No response within read window")]
    NoResponse,
    #[error("Read failed or response undecodable")]
    ReadFailed,
}

/// 应答解析器
///
/// 容忍不完整帧：只取第一个 `"ok"` 之前的部分，没有哨兵时取全部文本。
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseParser;

impl ResponseParser {
    /// 解析一次读取窗口的结果
    ///
    /// ```rust
    /// use bytes::Bytes;
    /// use mearm_protocol::{DeviceResponse, PositionReply, ResponseParser};
    ///
    /// let response = DeviceResponse::Received(Bytes::from_static(b"POS:10,20,30ok\n"));
    /// assert_eq!(
    ///     ResponseParser::parse(&response),
    ///     PositionReply::Position("POS:10,20,30".to_string())
    /// );
    /// ```
    pub fn parse(response: &DeviceResponse) -> PositionReply {
        match response {
            DeviceResponse::Received(bytes) if bytes.is_empty() => PositionReply::NoResponse,
            DeviceResponse::Received(bytes) => Self::parse_bytes(bytes),
            DeviceResponse::Empty => PositionReply::NoResponse,
            DeviceResponse::ReadFailed => PositionReply::ReadFailed,
        }
    }

    /// 解码并提取哨兵之前的文本
    pub fn parse_bytes(bytes: &[u8]) -> PositionReply {
        match std::str::from_utf8(bytes) {
            Ok(text) => PositionReply::Position(Self::extract(text).to_string()),
            Err(_) => PositionReply::ReadFailed,
        }
    }

    /// 取第一个哨兵之前的文本并去除首尾空白
    pub fn extract(text: &str) -> &str {
        text.split(REPLY_SENTINEL).next().unwrap_or_default().trim()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn received(data: &'static [u8]) -> DeviceResponse {
        DeviceResponse::Received(Bytes::from_static(data))
    }

    #[test]
    fn test_parse_sentinel_terminated_reply() {
        assert_eq!(
            ResponseParser::parse(&received(b"POS:10,20,30ok\n")),
            PositionReply::Position("POS:10,20,30".to_string())
        );
    }

    #[test]
    fn test_parse_takes_prefix_before_first_sentinel() {
        assert_eq!(
            ResponseParser::parse(&received(b"  X:1 Y:2 Z:3\nok\nok\n")),
            PositionReply::Position("X:1 Y:2 Z:3".to_string())
        );
    }

    #[test]
    fn test_parse_partial_frame_without_sentinel() {
        assert_eq!(
            ResponseParser::parse(&received(b"X:1 Y:2 Z")),
            PositionReply::Position("X:1 Y:2 Z".to_string())
        );
    }

    #[test]
    fn test_parse_bare_sentinel_yields_empty_position() {
        assert_eq!(
            ResponseParser::parse(&received(b"ok\n")),
            PositionReply::Position(String::new())
        );
    }

    #[test]
    fn test_parse_empty() {
        assert_eq!(
            ResponseParser::parse(&DeviceResponse::Empty),
            PositionReply::NoResponse
        );
        assert_eq!(ResponseParser::parse(&received(b"")), PositionReply::NoResponse);
        assert_eq!(PositionReply::NoResponse.to_string(), "No response");
    }

    #[test]
    fn test_parse_failures() {
        assert_eq!(
            ResponseParser::parse(&DeviceResponse::ReadFailed),
            PositionReply::ReadFailed
        );
        // 无效 UTF-8
        assert_eq!(
            ResponseParser::parse(&received(&[0xFF, 0xFE, b'o', b'k'])),
            PositionReply::ReadFailed
        );
        assert_eq!(PositionReply::ReadFailed.to_string(), "ERROR: Read failed");
    }

    #[test]
    fn test_into_result() {
        assert_eq!(
            PositionReply::Position("X:0".into()).into_result(),
            Ok("X:0".to_string())
        );
        assert_eq!(
            PositionReply::NoResponse.into_result(),
            Err(ReplyError::NoResponse)
        );
        assert_eq!(
            PositionReply::ReadFailed.into_result(),
            Err(ReplyError::ReadFailed)
        );
    }
}
