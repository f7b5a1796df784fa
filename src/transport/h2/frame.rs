//! HTTP/2 frame types and binary serialization (RFC 9113).
//!
//! The parse direction covers everything a client may send; the
//! serialize direction covers the server's response vocabulary
//! (SETTINGS, HEADERS, DATA, PING ack, RST_STREAM, GOAWAY).

use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Frame header size (9 bytes per RFC 9113).
pub const FRAME_HEADER_SIZE: usize = 9;

/// Default maximum frame size; response DATA is chunked to this.
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 16384;

/// HTTP/2 connection preface the client sends first.
pub const CONNECTION_PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

/// Frame type identifiers per RFC 9113.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Data,
    Headers,
    Priority,
    RstStream,
    Settings,
    PushPromise,
    Ping,
    GoAway,
    WindowUpdate,
    Continuation,
    Unknown(u8),
}

impl From<u8> for FrameType {
    fn from(v: u8) -> Self {
        match v {
            0x0 => Self::Data,
            0x1 => Self::Headers,
            0x2 => Self::Priority,
            0x3 => Self::RstStream,
            0x4 => Self::Settings,
            0x5 => Self::PushPromise,
            0x6 => Self::Ping,
            0x7 => Self::GoAway,
            0x8 => Self::WindowUpdate,
            0x9 => Self::Continuation,
            other => Self::Unknown(other),
        }
    }
}

impl From<FrameType> for u8 {
    fn from(ft: FrameType) -> u8 {
        match ft {
            FrameType::Data => 0x0,
            FrameType::Headers => 0x1,
            FrameType::Priority => 0x2,
            FrameType::RstStream => 0x3,
            FrameType::Settings => 0x4,
            FrameType::PushPromise => 0x5,
            FrameType::Ping => 0x6,
            FrameType::GoAway => 0x7,
            FrameType::WindowUpdate => 0x8,
            FrameType::Continuation => 0x9,
            FrameType::Unknown(v) => v,
        }
    }
}

/// Frame flags.
pub mod flags {
    pub const END_STREAM: u8 = 0x1;
    pub const ACK: u8 = 0x1; // Same bit, SETTINGS/PING context
    pub const END_HEADERS: u8 = 0x4;
    pub const PADDED: u8 = 0x8;
    pub const PRIORITY: u8 = 0x20;
}

/// HTTP/2 error codes per RFC 9113 Section 7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    NoError = 0x0,
    ProtocolError = 0x1,
    InternalError = 0x2,
    FlowControlError = 0x3,
    SettingsTimeout = 0x4,
    StreamClosed = 0x5,
    FrameSizeError = 0x6,
    RefusedStream = 0x7,
    Cancel = 0x8,
    CompressionError = 0x9,
    ConnectError = 0xa,
    EnhanceYourCalm = 0xb,
    InadequateSecurity = 0xc,
    Http11Required = 0xd,
}

impl From<u32> for ErrorCode {
    fn from(v: u32) -> Self {
        match v {
            0x0 => Self::NoError,
            0x2 => Self::InternalError,
            0x3 => Self::FlowControlError,
            0x4 => Self::SettingsTimeout,
            0x5 => Self::StreamClosed,
            0x6 => Self::FrameSizeError,
            0x7 => Self::RefusedStream,
            0x8 => Self::Cancel,
            0x9 => Self::CompressionError,
            0xa => Self::ConnectError,
            0xb => Self::EnhanceYourCalm,
            0xc => Self::InadequateSecurity,
            0xd => Self::Http11Required,
            _ => Self::ProtocolError,
        }
    }
}

/// Parsed frame header.
#[derive(Debug, Clone)]
pub struct FrameHeader {
    pub length: u32,
    pub frame_type: FrameType,
    pub flags: u8,
    pub stream_id: u32,
}

impl FrameHeader {
    /// Parse a frame header. Returns None if the reserved stream-id bit
    /// is set.
    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() < FRAME_HEADER_SIZE {
            return None;
        }
        let length = ((buf[0] as u32) << 16) | ((buf[1] as u32) << 8) | (buf[2] as u32);
        let frame_type = FrameType::from(buf[3]);
        let frame_flags = buf[4];
        if (buf[5] & 0x80) != 0 {
            return None;
        }
        let stream_id = ((buf[5] as u32 & 0x7f) << 24)
            | ((buf[6] as u32) << 16)
            | ((buf[7] as u32) << 8)
            | (buf[8] as u32);

        Some(Self {
            length,
            frame_type,
            flags: frame_flags,
            stream_id,
        })
    }

    /// Serialize the 9-byte header.
    pub fn serialize(&self, buf: &mut BytesMut) {
        buf.put_u8((self.length >> 16) as u8);
        buf.put_u8((self.length >> 8) as u8);
        buf.put_u8(self.length as u8);
        buf.put_u8(self.frame_type.into());
        buf.put_u8(self.flags);
        buf.put_u32(self.stream_id & 0x7fff_ffff);
    }
}

/// SETTINGS frame payload. Entry order is the wire order, which the
/// Akamai fingerprint observes.
#[derive(Debug, Clone, Default)]
pub struct SettingsFrame {
    pub settings: Vec<(u16, u32)>,
    pub ack: bool,
}

impl SettingsFrame {
    pub fn new(settings: Vec<(u16, u32)>) -> Self {
        Self {
            settings,
            ack: false,
        }
    }

    pub fn ack() -> Self {
        Self {
            settings: Vec::new(),
            ack: true,
        }
    }

    pub fn serialize(&self) -> BytesMut {
        let payload_len = if self.ack { 0 } else { self.settings.len() * 6 };
        let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + payload_len);
        FrameHeader {
            length: payload_len as u32,
            frame_type: FrameType::Settings,
            flags: if self.ack { flags::ACK } else { 0 },
            stream_id: 0,
        }
        .serialize(&mut buf);
        if !self.ack {
            for (id, value) in &self.settings {
                buf.put_u16(*id);
                buf.put_u32(*value);
            }
        }
        buf
    }

    pub fn parse(frame_flags: u8, mut payload: Bytes) -> Self {
        let ack = (frame_flags & flags::ACK) != 0;
        let mut settings = Vec::new();
        while payload.remaining() >= 6 {
            let id = payload.get_u16();
            let value = payload.get_u32();
            settings.push((id, value));
        }
        Self { settings, ack }
    }
}

/// WINDOW_UPDATE frame.
#[derive(Debug, Clone)]
pub struct WindowUpdateFrame {
    pub stream_id: u32,
    pub increment: u32,
}

impl WindowUpdateFrame {
    /// Parse from payload. Returns None on a short payload or a zero
    /// increment (invalid per RFC 9113 Section 6.9.1).
    pub fn parse(stream_id: u32, mut payload: Bytes) -> Option<Self> {
        if payload.remaining() < 4 {
            return None;
        }
        let increment = payload.get_u32() & 0x7fff_ffff;
        if increment == 0 {
            return None;
        }
        Some(Self {
            stream_id,
            increment,
        })
    }
}

/// Priority data carried by HEADERS or PRIORITY frames.
#[derive(Debug, Clone, Copy)]
pub struct PriorityData {
    pub exclusive: bool,
    pub stream_dependency: u32,
    pub weight: u8,
}

impl PriorityData {
    fn parse(payload: &mut Bytes) -> Option<Self> {
        if payload.remaining() < 5 {
            return None;
        }
        let dep_raw = payload.get_u32();
        Some(Self {
            exclusive: (dep_raw & 0x8000_0000) != 0,
            stream_dependency: dep_raw & 0x7fff_ffff,
            weight: payload.get_u8(),
        })
    }
}

/// HEADERS frame, both directions.
#[derive(Debug, Clone)]
pub struct HeadersFrame {
    pub stream_id: u32,
    pub header_block: Bytes,
    pub end_stream: bool,
    pub end_headers: bool,
    pub priority: Option<PriorityData>,
}

impl HeadersFrame {
    pub fn new(stream_id: u32, header_block: Bytes, end_stream: bool) -> Self {
        Self {
            stream_id,
            header_block,
            end_stream,
            end_headers: true,
            priority: None,
        }
    }

    pub fn serialize(&self) -> BytesMut {
        let payload_len = self.header_block.len();
        let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + payload_len);

        let mut frame_flags = 0u8;
        if self.end_stream {
            frame_flags |= flags::END_STREAM;
        }
        if self.end_headers {
            frame_flags |= flags::END_HEADERS;
        }

        FrameHeader {
            length: payload_len as u32,
            frame_type: FrameType::Headers,
            flags: frame_flags,
            stream_id: self.stream_id,
        }
        .serialize(&mut buf);
        buf.extend_from_slice(&self.header_block);
        buf
    }

    /// Parse an incoming HEADERS frame, handling padding and the optional
    /// priority block.
    pub fn parse(stream_id: u32, frame_flags: u8, mut payload: Bytes) -> Result<Self, String> {
        if stream_id == 0 {
            return Err("HEADERS frame must have non-zero stream ID".to_string());
        }

        let end_stream = (frame_flags & flags::END_STREAM) != 0;
        let end_headers = (frame_flags & flags::END_HEADERS) != 0;
        let padded = (frame_flags & flags::PADDED) != 0;
        let has_priority = (frame_flags & flags::PRIORITY) != 0;

        let pad_len = if padded {
            if payload.remaining() < 1 {
                return Err("padded HEADERS frame missing padding length".to_string());
            }
            let pad_len = payload.get_u8() as usize;
            if pad_len >= payload.remaining() {
                return Err("padding length exceeds payload size".to_string());
            }
            pad_len
        } else {
            0
        };

        let priority = if has_priority {
            Some(
                PriorityData::parse(&mut payload)
                    .ok_or_else(|| "HEADERS frame missing priority data".to_string())?,
            )
        } else {
            None
        };

        if payload.remaining() < pad_len {
            return Err("padding length exceeds payload size".to_string());
        }
        let header_block = payload.copy_to_bytes(payload.remaining() - pad_len);

        Ok(Self {
            stream_id,
            header_block,
            end_stream,
            end_headers,
            priority,
        })
    }
}

/// CONTINUATION frame (header block fragments exceeding one frame).
#[derive(Debug, Clone)]
pub struct ContinuationFrame {
    pub stream_id: u32,
    pub end_headers: bool,
    pub header_fragment: Bytes,
}

impl ContinuationFrame {
    pub fn parse(stream_id: u32, frame_flags: u8, payload: Bytes) -> Result<Self, String> {
        if stream_id == 0 {
            return Err("CONTINUATION frame must have non-zero stream ID".to_string());
        }
        Ok(Self {
            stream_id,
            end_headers: (frame_flags & flags::END_HEADERS) != 0,
            header_fragment: payload,
        })
    }
}

/// DATA frame, both directions.
#[derive(Debug, Clone)]
pub struct DataFrame {
    pub stream_id: u32,
    pub data: Bytes,
    pub end_stream: bool,
}

impl DataFrame {
    pub fn new(stream_id: u32, data: Bytes, end_stream: bool) -> Self {
        Self {
            stream_id,
            data,
            end_stream,
        }
    }

    pub fn serialize(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + self.data.len());
        FrameHeader {
            length: self.data.len() as u32,
            frame_type: FrameType::Data,
            flags: if self.end_stream { flags::END_STREAM } else { 0 },
            stream_id: self.stream_id,
        }
        .serialize(&mut buf);
        buf.extend_from_slice(&self.data);
        buf
    }

    /// Parse an incoming DATA frame, stripping padding.
    pub fn parse(stream_id: u32, frame_flags: u8, mut payload: Bytes) -> Result<Self, String> {
        if stream_id == 0 {
            return Err("DATA frame must have non-zero stream ID".to_string());
        }
        let end_stream = (frame_flags & flags::END_STREAM) != 0;
        let data = if (frame_flags & flags::PADDED) != 0 {
            if payload.remaining() < 1 {
                return Err("padded DATA frame missing padding length".to_string());
            }
            let pad_len = payload.get_u8() as usize;
            if pad_len >= payload.remaining() {
                return Err("padding length exceeds payload size".to_string());
            }
            payload.copy_to_bytes(payload.remaining() - pad_len)
        } else {
            payload
        };
        Ok(Self {
            stream_id,
            data,
            end_stream,
        })
    }
}

/// PING frame.
#[derive(Debug, Clone)]
pub struct PingFrame {
    pub ack: bool,
    pub data: [u8; 8],
}

impl PingFrame {
    pub fn ack(data: [u8; 8]) -> Self {
        Self { ack: true, data }
    }

    pub fn serialize(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + 8);
        FrameHeader {
            length: 8,
            frame_type: FrameType::Ping,
            flags: if self.ack { flags::ACK } else { 0 },
            stream_id: 0,
        }
        .serialize(&mut buf);
        buf.extend_from_slice(&self.data);
        buf
    }

    pub fn parse(frame_flags: u8, payload: &[u8]) -> Option<Self> {
        if payload.len() != 8 {
            return None;
        }
        let mut data = [0u8; 8];
        data.copy_from_slice(payload);
        Some(Self {
            ack: (frame_flags & flags::ACK) != 0,
            data,
        })
    }
}

/// GOAWAY frame.
#[derive(Debug, Clone)]
pub struct GoAwayFrame {
    pub last_stream_id: u32,
    pub error_code: ErrorCode,
    pub debug_data: Bytes,
}

impl GoAwayFrame {
    pub fn new(last_stream_id: u32, error_code: ErrorCode, debug_data: Bytes) -> Self {
        Self {
            last_stream_id,
            error_code,
            debug_data,
        }
    }

    pub fn serialize(&self) -> BytesMut {
        let payload_len = 8 + self.debug_data.len();
        let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + payload_len);
        FrameHeader {
            length: payload_len as u32,
            frame_type: FrameType::GoAway,
            flags: 0,
            stream_id: 0,
        }
        .serialize(&mut buf);
        buf.put_u32(self.last_stream_id & 0x7fff_ffff);
        buf.put_u32(self.error_code as u32);
        buf.extend_from_slice(&self.debug_data);
        buf
    }

    pub fn parse(mut payload: Bytes) -> Option<Self> {
        if payload.remaining() < 8 {
            return None;
        }
        let last_stream_id = payload.get_u32() & 0x7fff_ffff;
        let error_code = ErrorCode::from(payload.get_u32());
        let debug_data = payload.copy_to_bytes(payload.remaining());
        Some(Self {
            last_stream_id,
            error_code,
            debug_data,
        })
    }
}

/// PRIORITY frame (RFC 9113 Section 6.3).
#[derive(Debug, Clone)]
pub struct PriorityFrame {
    pub stream_id: u32,
    pub priority: PriorityData,
}

impl PriorityFrame {
    pub fn parse(stream_id: u32, mut payload: Bytes) -> Result<Self, String> {
        if stream_id == 0 {
            return Err("PRIORITY frame must have non-zero stream ID".to_string());
        }
        let priority = PriorityData::parse(&mut payload)
            .ok_or_else(|| "PRIORITY frame payload too short".to_string())?;
        if priority.stream_dependency == stream_id {
            return Err("PRIORITY frame stream cannot depend on itself".to_string());
        }
        Ok(Self {
            stream_id,
            priority,
        })
    }
}

/// RST_STREAM frame.
#[derive(Debug, Clone)]
pub struct RstStreamFrame {
    pub stream_id: u32,
    pub error_code: ErrorCode,
}

impl RstStreamFrame {
    pub fn new(stream_id: u32, error_code: ErrorCode) -> Self {
        Self {
            stream_id,
            error_code,
        }
    }

    pub fn serialize(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + 4);
        FrameHeader {
            length: 4,
            frame_type: FrameType::RstStream,
            flags: 0,
            stream_id: self.stream_id,
        }
        .serialize(&mut buf);
        buf.put_u32(self.error_code as u32);
        buf
    }

    pub fn parse(stream_id: u32, mut payload: Bytes) -> Result<Self, String> {
        if stream_id == 0 {
            return Err("RST_STREAM frame must have non-zero stream ID".to_string());
        }
        if payload.remaining() < 4 {
            return Err("RST_STREAM frame payload too short".to_string());
        }
        Ok(Self {
            stream_id,
            error_code: ErrorCode::from(payload.get_u32()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_serialization_preserves_entry_order() {
        let frame = SettingsFrame::new(vec![(0x4, 1048576), (0x3, 100), (0x6, 65536)]);
        let buf = frame.serialize();

        assert_eq!(buf.len(), FRAME_HEADER_SIZE + 18);
        assert_eq!(buf[3], 0x4); // SETTINGS
        assert_eq!(buf[5..9], [0, 0, 0, 0]); // stream 0
        // First entry on the wire is INITIAL_WINDOW_SIZE.
        assert_eq!(&buf[9..11], &[0x00, 0x04]);
        let parsed = SettingsFrame::parse(0, Bytes::from(buf[9..].to_vec()));
        assert_eq!(parsed.settings, vec![(0x4, 1048576), (0x3, 100), (0x6, 65536)]);
    }

    #[test]
    fn settings_ack_has_empty_payload() {
        let buf = SettingsFrame::ack().serialize();
        assert_eq!(buf.len(), FRAME_HEADER_SIZE);
        assert_eq!(buf[4], flags::ACK);
    }

    #[test]
    fn frame_header_round_trip() {
        let header = FrameHeader {
            length: 18,
            frame_type: FrameType::Settings,
            flags: 0,
            stream_id: 0,
        };
        let mut buf = BytesMut::new();
        header.serialize(&mut buf);
        let parsed = FrameHeader::parse(&buf).unwrap();
        assert_eq!(parsed.length, 18);
        assert_eq!(parsed.frame_type, FrameType::Settings);
        assert_eq!(parsed.stream_id, 0);
    }

    #[test]
    fn frame_header_rejects_reserved_bit() {
        let bytes = [0, 0, 0, 0x0, 0, 0x80, 0, 0, 1];
        assert!(FrameHeader::parse(&bytes).is_none());
    }

    #[test]
    fn headers_parse_strips_padding_and_priority() {
        let mut payload = BytesMut::new();
        payload.put_u8(2); // pad length
        payload.put_u32(0x8000_0003); // exclusive dep on stream 3
        payload.put_u8(219); // weight
        payload.extend_from_slice(b"blk");
        payload.extend_from_slice(&[0, 0]); // padding
        let frame = HeadersFrame::parse(
            5,
            flags::PADDED | flags::PRIORITY | flags::END_HEADERS,
            payload.freeze(),
        )
        .unwrap();
        assert_eq!(&frame.header_block[..], b"blk");
        let priority = frame.priority.unwrap();
        assert!(priority.exclusive);
        assert_eq!(priority.stream_dependency, 3);
        assert_eq!(priority.weight, 219);
    }

    #[test]
    fn data_parse_rejects_stream_zero() {
        assert!(DataFrame::parse(0, 0, Bytes::from_static(b"x")).is_err());
    }

    #[test]
    fn window_update_rejects_zero_increment() {
        assert!(WindowUpdateFrame::parse(0, Bytes::from_static(&[0, 0, 0, 0])).is_none());
        let wu = WindowUpdateFrame::parse(0, Bytes::from_static(&[0x00, 0xef, 0x00, 0x01])).unwrap();
        assert_eq!(wu.increment, 15663105);
    }

    #[test]
    fn goaway_round_trip() {
        let frame = GoAwayFrame::new(7, ErrorCode::NoError, Bytes::from_static(b"idle timeout"));
        let buf = frame.serialize();
        let parsed = GoAwayFrame::parse(Bytes::from(buf[FRAME_HEADER_SIZE..].to_vec())).unwrap();
        assert_eq!(parsed.last_stream_id, 7);
        assert_eq!(parsed.error_code, ErrorCode::NoError);
        assert_eq!(&parsed.debug_data[..], b"idle timeout");
    }
}
