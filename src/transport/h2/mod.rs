//! HTTP/2 multiplexing engine (server side).
//!
//! One frame-reader task per connection, one response task per active
//! stream, one write mutex serialising every frame that leaves the
//! socket. The reader also owns the connection's HPACK decoder — header
//! blocks must be decoded in wire order or the dynamic table corrupts —
//! and mirrors every incoming frame into the capture vectors that feed
//! the Akamai fingerprint.

pub mod capture;
pub mod frame;
pub mod hpack;

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock};
use std::time::{Duration, Instant};

use bytes::{Buf, Bytes, BytesMut};
use futures_util::FutureExt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::fingerprint::akamai::{akamai_fingerprint, akamai_fingerprint_hash};
use crate::fingerprint::{ja4h, ja4h_r};
use crate::server::request::{FingerprintBlock, H2Details, RequestDescriptor};
use crate::server::{
    admin_headers, content_encoding_for_path, generate_request_id, is_admin_request, AppState,
    ALT_SVC,
};

use capture::{setting_name, CapturedFrame, FramePriority, GoAwayInfo};
use frame::{
    ContinuationFrame, DataFrame, ErrorCode, FrameHeader, FrameType, GoAwayFrame, HeadersFrame,
    PingFrame, PriorityFrame, RstStreamFrame, SettingsFrame, WindowUpdateFrame,
    DEFAULT_MAX_FRAME_SIZE, FRAME_HEADER_SIZE,
};
use hpack::{Decoder as HpackDecoder, Encoder as HpackEncoder};

pub use frame::CONNECTION_PREFACE;

/// Advertised stream limit; also the value in the initial SETTINGS.
const MAX_CONCURRENT_STREAMS: u32 = 100;
/// Initial stream window advertised to the client.
const INITIAL_WINDOW_SIZE: u32 = 1_048_576;
/// Advertised header list bound.
const MAX_HEADER_LIST_SIZE: u32 = 65_536;

/// Connection is torn down after this much inactivity with no streams.
const IDLE_TIMEOUT: Duration = Duration::from_secs(30);
/// Idle-check cadence.
const IDLE_TICK: Duration = Duration::from_secs(5);
/// How long in-flight streams get to finish after GOAWAY.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);
/// Deadline for collecting a request body.
const BODY_TIMEOUT: Duration = Duration::from_secs(5);
/// Body channel bound; overflowing chunks are dropped, a documented
/// limit of this workload.
const BODY_CHANNEL_CAPACITY: usize = 10;
/// Response DATA chunk size.
const DATA_CHUNK_SIZE: usize = 16_384;

/// Per-stream states per RFC 9113 Section 5.1, reduced to what a
/// fingerprinting server traverses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Open,
    HalfClosedRemote,
    HalfClosedLocal,
    Closed,
}

/// Per-stream bookkeeping. Captured frames sit behind the stream's own
/// lock: the frame loop is the only producer, request tasks clone the
/// vector under the lock when they snapshot.
struct StreamEntry {
    id: u32,
    state: StdMutex<StreamState>,
    frames: StdMutex<Vec<CapturedFrame>>,
    body_tx: StdMutex<Option<mpsc::Sender<Bytes>>>,
    body_rx: Mutex<Option<mpsc::Receiver<Bytes>>>,
}

impl StreamEntry {
    fn new(id: u32) -> Self {
        let (tx, rx) = mpsc::channel(BODY_CHANNEL_CAPACITY);
        Self {
            id,
            state: StdMutex::new(StreamState::Open),
            frames: StdMutex::new(Vec::new()),
            body_tx: StdMutex::new(Some(tx)),
            body_rx: Mutex::new(Some(rx)),
        }
    }

    fn push_frame(&self, frame: CapturedFrame) {
        if *self.state.lock().unwrap() == StreamState::Closed {
            return;
        }
        self.frames.lock().unwrap().push(frame);
    }

    fn snapshot_frames(&self) -> Vec<CapturedFrame> {
        self.frames.lock().unwrap().clone()
    }

    fn set_state(&self, state: StreamState) {
        *self.state.lock().unwrap() = state;
    }

    /// Deliver a body chunk; a full channel drops the chunk silently.
    fn deliver_body(&self, data: Bytes) {
        if let Some(tx) = self.body_tx.lock().unwrap().as_ref() {
            let _ = tx.try_send(data);
        }
    }

    /// Close the body channel. Dropping the sender is the close; taking
    /// it out of the Option makes the close idempotent.
    fn close_body(&self) {
        self.body_tx.lock().unwrap().take();
    }
}

/// Frame writer plus the connection-wide response HPACK encoder. The
/// encoder lives here so header blocks are encoded and written under
/// the same lock — encoding is as order-sensitive as the wire itself.
struct FrameWriter {
    wire: Box<dyn AsyncWrite + Send + Unpin>,
    encoder: HpackEncoder,
}

impl FrameWriter {
    async fn write_raw(&mut self, buf: &[u8]) -> Result<()> {
        self.wire.write_all(buf).await?;
        self.wire.flush().await?;
        Ok(())
    }

    async fn write_settings(&mut self, settings: Vec<(u16, u32)>) -> Result<()> {
        let buf = SettingsFrame::new(settings).serialize();
        self.write_raw(&buf).await
    }

    async fn write_settings_ack(&mut self) -> Result<()> {
        self.write_raw(&SettingsFrame::ack().serialize()).await
    }

    async fn write_ping_ack(&mut self, data: [u8; 8]) -> Result<()> {
        self.write_raw(&PingFrame::ack(data).serialize()).await
    }

    async fn write_headers(
        &mut self,
        stream_id: u32,
        headers: &[(String, String)],
        end_stream: bool,
    ) -> Result<()> {
        let refs: Vec<(&str, &str)> = headers
            .iter()
            .map(|(n, v)| (n.as_str(), v.as_str()))
            .collect();
        let block = self.encoder.encode(&refs);
        let buf = HeadersFrame::new(stream_id, Bytes::from(block), end_stream).serialize();
        self.write_raw(&buf).await
    }

    async fn write_data(&mut self, stream_id: u32, data: Bytes, end_stream: bool) -> Result<()> {
        let buf = DataFrame::new(stream_id, data, end_stream).serialize();
        self.write_raw(&buf).await
    }

    async fn write_rst_stream(&mut self, stream_id: u32, code: ErrorCode) -> Result<()> {
        self.write_raw(&RstStreamFrame::new(stream_id, code).serialize())
            .await
    }

    async fn write_goaway(&mut self, last_stream_id: u32, code: ErrorCode, debug: &[u8]) -> Result<()> {
        let buf = GoAwayFrame::new(last_stream_id, code, Bytes::copy_from_slice(debug)).serialize();
        self.write_raw(&buf).await
    }

    async fn shutdown(&mut self) {
        let _ = self.wire.shutdown().await;
    }
}

/// Shared connection state.
pub struct H2Connection {
    writer: Mutex<FrameWriter>,
    streams: RwLock<HashMap<u32, Arc<StreamEntry>>>,
    /// Frames on stream 0, appended only by the frame loop.
    connection_frames: StdMutex<Vec<CapturedFrame>>,
    last_stream_id: AtomicU32,
    last_activity: StdMutex<Instant>,
    closing: AtomicBool,
    ip: String,
    tls: FingerprintBlock,
    state: Arc<AppState>,
}

impl H2Connection {
    fn get_or_create_stream(&self, stream_id: u32) -> Arc<StreamEntry> {
        let mut streams = self.streams.write().unwrap();
        if let Some(stream) = streams.get(&stream_id) {
            return stream.clone();
        }
        let stream = Arc::new(StreamEntry::new(stream_id));
        streams.insert(stream_id, stream.clone());
        self.last_stream_id.fetch_max(stream_id, Ordering::SeqCst);
        stream
    }

    fn close_stream(&self, stream_id: u32) {
        let removed = self.streams.write().unwrap().remove(&stream_id);
        if let Some(stream) = removed {
            stream.set_state(StreamState::Closed);
            stream.close_body();
        }
    }

    fn active_stream_count(&self) -> usize {
        self.streams.read().unwrap().len()
    }

    fn touch(&self) {
        *self.last_activity.lock().unwrap() = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        self.last_activity.lock().unwrap().elapsed()
    }

    fn snapshot_connection_frames(&self) -> Vec<CapturedFrame> {
        self.connection_frames.lock().unwrap().clone()
    }

    async fn send_rst_stream(&self, stream_id: u32, code: ErrorCode) {
        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.write_rst_stream(stream_id, code).await {
            debug!(stream_id, "failed to write RST_STREAM: {}", e);
        }
    }
}

/// Serve one HTTP/2 connection. The preamble has already been consumed
/// by protocol detection.
pub async fn serve<S>(
    stream: S,
    ip: String,
    tls: FingerprintBlock,
    state: Arc<AppState>,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let (read_half, write_half) = tokio::io::split(stream);

    let conn = Arc::new(H2Connection {
        writer: Mutex::new(FrameWriter {
            wire: Box::new(write_half),
            encoder: HpackEncoder::new(),
        }),
        streams: RwLock::new(HashMap::new()),
        connection_frames: StdMutex::new(Vec::new()),
        last_stream_id: AtomicU32::new(0),
        last_activity: StdMutex::new(Instant::now()),
        closing: AtomicBool::new(false),
        ip,
        tls,
        state,
    });

    // Server SETTINGS go out before anything is read.
    {
        let mut writer = conn.writer.lock().await;
        writer
            .write_settings(vec![
                (0x4, INITIAL_WINDOW_SIZE),
                (0x3, MAX_CONCURRENT_STREAMS),
                (0x6, MAX_HEADER_LIST_SIZE),
            ])
            .await?;
    }

    let idle = tokio::spawn(idle_timeout_loop(conn.clone()));
    frame_loop(conn.clone(), read_half).await;
    graceful_shutdown(&conn).await;
    idle.abort();
    Ok(())
}

/// The single reader task.
async fn frame_loop<R>(conn: Arc<H2Connection>, mut read_half: R)
where
    R: AsyncRead + Send + Unpin,
{
    let mut decoder = HpackDecoder::new();
    let mut read_buf = BytesMut::with_capacity(16384);
    // HEADERS awaiting CONTINUATION: (stream id, fragments, end_stream,
    // capture under construction).
    let mut pending: Option<(u32, BytesMut, bool, CapturedFrame)> = None;

    loop {
        let (header, payload) = match read_frame(&mut read_half, &mut read_buf).await {
            Ok(frame) => frame,
            Err(e) => {
                if !e.is_benign_disconnect() {
                    debug!("frame loop ended: {}", e);
                }
                return;
            }
        };
        conn.touch();

        let mut captured = CapturedFrame::from_header(&header);

        match header.frame_type {
            FrameType::Settings => {
                let settings = SettingsFrame::parse(header.flags, payload);
                captured.settings = settings
                    .settings
                    .iter()
                    .map(|(id, value)| format!("{} = {}", setting_name(*id), value))
                    .collect();
                conn.connection_frames.lock().unwrap().push(captured);
                if !settings.ack {
                    let mut writer = conn.writer.lock().await;
                    if writer.write_settings_ack().await.is_err() {
                        return;
                    }
                }
            }
            FrameType::Headers => {
                let parsed = match HeadersFrame::parse(header.stream_id, header.flags, payload) {
                    Ok(parsed) => parsed,
                    Err(reason) => {
                        debug!(stream_id = header.stream_id, "bad HEADERS: {}", reason);
                        conn.send_rst_stream(header.stream_id, ErrorCode::ProtocolError)
                            .await;
                        continue;
                    }
                };
                captured.priority = parsed.priority.map(|p| FramePriority {
                    weight: p.weight as u16 + 1,
                    depends_on: p.stream_dependency,
                    exclusive: p.exclusive as u8,
                });

                if parsed.end_headers {
                    dispatch_headers(
                        &conn,
                        &mut decoder,
                        parsed.stream_id,
                        &parsed.header_block,
                        parsed.end_stream,
                        captured,
                    )
                    .await;
                } else {
                    let mut fragments = BytesMut::new();
                    fragments.extend_from_slice(&parsed.header_block);
                    pending = Some((parsed.stream_id, fragments, parsed.end_stream, captured));
                }
            }
            FrameType::Continuation => {
                let Ok(cont) = ContinuationFrame::parse(header.stream_id, header.flags, payload)
                else {
                    conn.send_rst_stream(header.stream_id, ErrorCode::ProtocolError)
                        .await;
                    continue;
                };
                match pending.take() {
                    Some((stream_id, mut fragments, end_stream, captured))
                        if stream_id == cont.stream_id =>
                    {
                        fragments.extend_from_slice(&cont.header_fragment);
                        if cont.end_headers {
                            dispatch_headers(
                                &conn,
                                &mut decoder,
                                stream_id,
                                &fragments,
                                end_stream,
                                captured,
                            )
                            .await;
                        } else {
                            pending = Some((stream_id, fragments, end_stream, captured));
                        }
                    }
                    _ => {
                        conn.send_rst_stream(cont.stream_id, ErrorCode::ProtocolError)
                            .await;
                    }
                }
            }
            FrameType::Data => {
                let parsed = match DataFrame::parse(header.stream_id, header.flags, payload) {
                    Ok(parsed) => parsed,
                    Err(reason) => {
                        debug!(stream_id = header.stream_id, "bad DATA: {}", reason);
                        conn.send_rst_stream(header.stream_id, ErrorCode::ProtocolError)
                            .await;
                        continue;
                    }
                };
                captured.data_len = Some(parsed.data.len());
                captured.payload = parsed.data.to_vec();

                let stream = conn.get_or_create_stream(parsed.stream_id);
                stream.push_frame(captured);
                stream.deliver_body(parsed.data);
                if parsed.end_stream {
                    stream.close_body();
                    stream.set_state(StreamState::HalfClosedRemote);
                }
            }
            FrameType::WindowUpdate => {
                captured.increment =
                    WindowUpdateFrame::parse(header.stream_id, payload).map(|wu| wu.increment);
                if header.stream_id == 0 {
                    conn.connection_frames.lock().unwrap().push(captured);
                } else {
                    conn.get_or_create_stream(header.stream_id).push_frame(captured);
                }
                // No flow-control enforcement for this workload.
            }
            FrameType::Priority => {
                if let Ok(parsed) = PriorityFrame::parse(header.stream_id, payload) {
                    captured.priority = Some(FramePriority {
                        weight: parsed.priority.weight as u16 + 1,
                        depends_on: parsed.priority.stream_dependency,
                        exclusive: parsed.priority.exclusive as u8,
                    });
                }
                if header.stream_id == 0 {
                    conn.connection_frames.lock().unwrap().push(captured);
                } else {
                    conn.get_or_create_stream(header.stream_id).push_frame(captured);
                }
            }
            FrameType::Ping => {
                conn.connection_frames.lock().unwrap().push(captured);
                if let Some(ping) = PingFrame::parse(header.flags, &payload) {
                    if !ping.ack {
                        let mut writer = conn.writer.lock().await;
                        if writer.write_ping_ack(ping.data).await.is_err() {
                            return;
                        }
                    }
                }
            }
            FrameType::GoAway => {
                if let Some(goaway) = GoAwayFrame::parse(payload) {
                    captured.goaway = Some(GoAwayInfo {
                        last_stream_id: goaway.last_stream_id,
                        error_code: goaway.error_code as u32,
                        debug: String::from_utf8_lossy(&goaway.debug_data).into_owned(),
                    });
                }
                conn.connection_frames.lock().unwrap().push(captured);
                // Client is going away; stop accepting new work.
                return;
            }
            FrameType::RstStream => {
                conn.close_stream(header.stream_id);
            }
            FrameType::PushPromise | FrameType::Unknown(_) => {}
        }
    }
}

/// Decode a complete header block on the reader task and hand the
/// request off to its own task.
async fn dispatch_headers(
    conn: &Arc<H2Connection>,
    decoder: &mut HpackDecoder,
    stream_id: u32,
    block: &[u8],
    end_stream: bool,
    mut captured: CapturedFrame,
) {
    let headers = match decoder.decode(block) {
        Ok(headers) => headers,
        Err(e) => {
            warn!(stream_id, "HPACK decode failed: {}", e);
            conn.send_rst_stream(stream_id, ErrorCode::ProtocolError)
                .await;
            return;
        }
    };
    captured.headers = headers
        .iter()
        .map(|(name, value)| format!("{}: {}", name, value))
        .collect();

    let stream = conn.get_or_create_stream(stream_id);
    stream.push_frame(captured);
    if end_stream {
        stream.close_body();
        stream.set_state(StreamState::HalfClosedRemote);
    }

    let conn = conn.clone();
    tokio::spawn(async move {
        handle_request(conn, stream, headers, end_stream).await;
    });
}

/// Build the descriptor, run the router and write the response frames.
async fn handle_request(
    conn: Arc<H2Connection>,
    stream: Arc<StreamEntry>,
    headers: Vec<(String, String)>,
    end_stream: bool,
) {
    let started = Instant::now();
    let request_id = generate_request_id();

    let mut method = String::new();
    let mut path = String::new();
    let mut user_agent = String::new();
    for (name, value) in &headers {
        match name.as_str() {
            ":method" => method = value.clone(),
            ":path" => path = value.clone(),
            "user-agent" => user_agent = value.clone(),
            _ => {}
        }
    }

    let body = if end_stream {
        Vec::new()
    } else {
        collect_body(&stream).await
    };

    // Stable snapshot: connection frames as they stand now, then this
    // stream's frames. Copies, not references — the reader keeps going.
    let mut frames = conn.snapshot_connection_frames();
    frames.extend(stream.snapshot_frames());

    let h2_header_strings: Vec<String> = frames
        .iter()
        .filter(|f| f.frame_type == "HEADERS")
        .flat_map(|f| f.headers.iter().cloned())
        .collect();

    let mut tls = conn.tls.clone();
    tls.ja4h = ja4h(&method, "h2", &h2_header_strings);
    tls.ja4h_r = ja4h_r(&method, "h2", &h2_header_strings);

    let header_strings: Vec<String> = headers
        .iter()
        .map(|(name, value)| format!("{}: {}", name, value))
        .collect();

    let descriptor = RequestDescriptor {
        ip: conn.ip.clone(),
        http_version: "h2".to_string(),
        method: method.clone(),
        path: path.clone(),
        user_agent,
        headers: header_strings,
        body,
        tls,
        http1: None,
        http2: Some(H2Details {
            akamai_fingerprint: akamai_fingerprint(&frames),
            akamai_fingerprint_hash: akamai_fingerprint_hash(&frames),
            sent_frames: frames,
        }),
    };

    conn.state.log_request(&descriptor);

    // A panicking handler costs this request a 500, never the engine.
    let routed = AssertUnwindSafe(crate::server::router::route(&descriptor, &conn.state))
        .catch_unwind()
        .await;
    let mut resolved = match routed {
        Ok(directive) => crate::server::request::resolve_directive(directive, descriptor.path_only()),
        Err(_) => {
            warn!(path = %path, "handler panicked");
            crate::server::request::ResolvedResponse {
                status: 500,
                content_type: "text/plain".to_string(),
                body: Vec::new(),
                extra_headers: Vec::new(),
            }
        }
    };

    let admin = is_admin_request(&conn.state.config, &method, &descriptor.headers);
    let elapsed_ms = started.elapsed().as_millis();

    let mut response_headers: Vec<(String, String)> = vec![
        (":status".to_string(), resolved.status.to_string()),
        ("server".to_string(), "TrackMe.peet.ws".to_string()),
        ("content-length".to_string(), resolved.body.len().to_string()),
        ("content-type".to_string(), resolved.content_type.clone()),
        ("x-request-id".to_string(), request_id),
        ("x-response-time".to_string(), elapsed_ms.to_string()),
    ];
    response_headers.append(&mut resolved.extra_headers);
    if let Some(encoding) = content_encoding_for_path(descriptor.path_only()) {
        response_headers.push(("content-encoding".to_string(), encoding.to_string()));
    }
    response_headers.push(("alt-svc".to_string(), ALT_SVC.to_string()));
    if admin {
        for (name, value) in admin_headers() {
            response_headers.push((name.to_lowercase(), value.to_string()));
        }
    }

    let end_stream = resolved.body.is_empty();
    {
        let mut writer = conn.writer.lock().await;
        if let Err(e) = writer
            .write_headers(stream.id, &response_headers, end_stream)
            .await
        {
            warn!(stream_id = stream.id, "writing HEADERS failed: {}", e);
            conn.close_stream(stream.id);
            return;
        }
    }

    if !resolved.body.is_empty() {
        let body = Bytes::from(resolved.body);
        let mut offset = 0;
        while offset < body.len() {
            let end = (offset + DATA_CHUNK_SIZE).min(body.len());
            let last = end == body.len();
            let chunk = body.slice(offset..end);
            // Lock per frame: writes on other streams may interleave at
            // frame boundaries, never within one.
            let mut writer = conn.writer.lock().await;
            if let Err(e) = writer.write_data(stream.id, chunk, last).await {
                warn!(stream_id = stream.id, "writing DATA failed: {}", e);
                break;
            }
            drop(writer);
            offset = end;
        }
    }

    stream.set_state(StreamState::Closed);
    conn.close_stream(stream.id);
}

/// Drain the body channel until END_STREAM or the deadline; a partial
/// body on timeout is used as-is.
async fn collect_body(stream: &StreamEntry) -> Vec<u8> {
    let Some(mut rx) = stream.body_rx.lock().await.take() else {
        return Vec::new();
    };
    let deadline = tokio::time::Instant::now() + BODY_TIMEOUT;
    let mut body = Vec::new();
    loop {
        match tokio::time::timeout_at(deadline, rx.recv()).await {
            Ok(Some(chunk)) => body.extend_from_slice(&chunk),
            Ok(None) => break,
            Err(_) => break,
        }
    }
    body
}

/// Read one frame (header + payload) from the wire.
async fn read_frame<R>(read_half: &mut R, buf: &mut BytesMut) -> Result<(FrameHeader, Bytes)>
where
    R: AsyncRead + Send + Unpin,
{
    while buf.len() < FRAME_HEADER_SIZE {
        fill(read_half, buf).await?;
    }
    let header = FrameHeader::parse(&buf[..FRAME_HEADER_SIZE])
        .ok_or_else(|| Error::protocol("invalid frame header (reserved bit set)"))?;

    if header.length > DEFAULT_MAX_FRAME_SIZE {
        return Err(Error::protocol(format!(
            "frame of {} bytes exceeds the advertised maximum",
            header.length
        )));
    }

    let frame_len = FRAME_HEADER_SIZE + header.length as usize;
    while buf.len() < frame_len {
        fill(read_half, buf).await?;
    }
    let payload = Bytes::copy_from_slice(&buf[FRAME_HEADER_SIZE..frame_len]);
    buf.advance(frame_len);
    Ok((header, payload))
}

async fn fill<R>(read_half: &mut R, buf: &mut BytesMut) -> Result<()>
where
    R: AsyncRead + Send + Unpin,
{
    let mut chunk = [0u8; 16384];
    let n = read_half.read(&mut chunk).await?;
    if n == 0 {
        return Err(Error::protocol("connection closed"));
    }
    buf.extend_from_slice(&chunk[..n]);
    Ok(())
}

/// Watch for 30 seconds of inactivity with no live streams, then start
/// the graceful teardown.
async fn idle_timeout_loop(conn: Arc<H2Connection>) {
    let mut ticker = tokio::time::interval(IDLE_TICK);
    ticker.tick().await; // first tick fires immediately
    loop {
        ticker.tick().await;
        if conn.closing.load(Ordering::SeqCst) {
            return;
        }
        if conn.idle_for() > IDLE_TIMEOUT && conn.active_stream_count() == 0 {
            graceful_shutdown(&conn).await;
            return;
        }
    }
}

/// GOAWAY, a bounded drain, then socket close. Safe to call from both
/// the idle watcher and the frame loop's exit path; only the first
/// caller emits the GOAWAY.
async fn graceful_shutdown(conn: &Arc<H2Connection>) {
    if conn.closing.swap(true, Ordering::SeqCst) {
        return;
    }

    let last_stream_id = conn.last_stream_id.load(Ordering::SeqCst);
    {
        let mut writer = conn.writer.lock().await;
        if let Err(e) = writer
            .write_goaway(last_stream_id, ErrorCode::NoError, b"idle timeout")
            .await
        {
            debug!("GOAWAY write failed: {}", e);
        }
    }

    let deadline = Instant::now() + DRAIN_TIMEOUT;
    while conn.active_stream_count() > 0 && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    conn.writer.lock().await.shutdown().await;
}
