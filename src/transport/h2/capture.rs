//! Captured-frame model for connection fingerprinting.
//!
//! Every frame the client sends is mirrored into a [`CapturedFrame`] in
//! wire arrival order; the ordered vector is both the Akamai fingerprint
//! input and part of the echo surface.

use serde::Serialize;

use super::frame::{flags, FrameHeader, FrameType};

/// Priority data as captured (weight is the wire value plus one, the
/// effective RFC 9113 weight).
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FramePriority {
    pub weight: u16,
    pub depends_on: u32,
    pub exclusive: u8,
}

/// GOAWAY payload as captured.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct GoAwayInfo {
    pub last_stream_id: u32,
    pub error_code: u32,
    pub debug: String,
}

/// One observed frame. Only the fields meaningful for the frame type are
/// populated; empty collections are omitted from the serialized form.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CapturedFrame {
    pub frame_type: String,
    pub stream_id: u32,
    pub length: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<String>,
    /// SETTINGS entries as `"NAME = value"`, wire order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub settings: Vec<String>,
    /// Decoded header list as `"name: value"`, wire order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<FramePriority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub increment: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_len: Option<usize>,
    /// DATA payload, kept for body echo but not serialized.
    #[serde(skip)]
    pub payload: Vec<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goaway: Option<GoAwayInfo>,
}

impl CapturedFrame {
    /// Start a capture from a frame header: type name, stream, length and
    /// named flags.
    pub fn from_header(header: &FrameHeader) -> Self {
        Self {
            frame_type: frame_type_name(header.frame_type).to_string(),
            stream_id: header.stream_id,
            length: header.length,
            flags: flag_names(header.frame_type, header.flags),
            ..Self::default()
        }
    }
}

/// Display name for a frame type, matching the RFC frame names.
pub fn frame_type_name(frame_type: FrameType) -> &'static str {
    match frame_type {
        FrameType::Data => "DATA",
        FrameType::Headers => "HEADERS",
        FrameType::Priority => "PRIORITY",
        FrameType::RstStream => "RST_STREAM",
        FrameType::Settings => "SETTINGS",
        FrameType::PushPromise => "PUSH_PROMISE",
        FrameType::Ping => "PING",
        FrameType::GoAway => "GOAWAY",
        FrameType::WindowUpdate => "WINDOW_UPDATE",
        FrameType::Continuation => "CONTINUATION",
        FrameType::Unknown(_) => "UNKNOWN",
    }
}

/// Named flags for a frame, in bit order.
pub fn flag_names(frame_type: FrameType, bits: u8) -> Vec<String> {
    let mut names = Vec::new();
    match frame_type {
        FrameType::Settings | FrameType::Ping => {
            if bits & flags::ACK != 0 {
                names.push("Ack".to_string());
            }
        }
        FrameType::Data => {
            if bits & flags::END_STREAM != 0 {
                names.push("EndStream".to_string());
            }
            if bits & flags::PADDED != 0 {
                names.push("Padded".to_string());
            }
        }
        FrameType::Headers => {
            if bits & flags::END_STREAM != 0 {
                names.push("EndStream".to_string());
            }
            if bits & flags::END_HEADERS != 0 {
                names.push("EndHeaders".to_string());
            }
            if bits & flags::PADDED != 0 {
                names.push("Padded".to_string());
            }
            if bits & flags::PRIORITY != 0 {
                names.push("Priority".to_string());
            }
        }
        FrameType::Continuation => {
            if bits & flags::END_HEADERS != 0 {
                names.push("EndHeaders".to_string());
            }
        }
        _ => {}
    }
    names
}

/// Display name for a SETTINGS parameter id.
pub fn setting_name(id: u16) -> String {
    match id {
        0x1 => "HEADER_TABLE_SIZE".to_string(),
        0x2 => "ENABLE_PUSH".to_string(),
        0x3 => "MAX_CONCURRENT_STREAMS".to_string(),
        0x4 => "INITIAL_WINDOW_SIZE".to_string(),
        0x5 => "MAX_FRAME_SIZE".to_string(),
        0x6 => "MAX_HEADER_LIST_SIZE".to_string(),
        0x9 => "NO_RFC7540_PRIORITIES".to_string(),
        other => format!("UNKNOWN_SETTING_{}", other),
    }
}

/// Inverse of [`setting_name`], used by the Akamai fingerprint.
pub fn setting_id(name: &str) -> Option<u16> {
    match name {
        "HEADER_TABLE_SIZE" => Some(0x1),
        "ENABLE_PUSH" => Some(0x2),
        "MAX_CONCURRENT_STREAMS" => Some(0x3),
        "INITIAL_WINDOW_SIZE" => Some(0x4),
        "MAX_FRAME_SIZE" => Some(0x5),
        "MAX_HEADER_LIST_SIZE" => Some(0x6),
        "NO_RFC7540_PRIORITIES" => Some(0x9),
        other => other
            .strip_prefix("UNKNOWN_SETTING_")
            .and_then(|rest| rest.parse().ok()),
    }
}
