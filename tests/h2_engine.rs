//! HTTP/2 engine tests over in-memory connections.
//!
//! A minimal frame-level client drives the engine through a duplex
//! pipe: real SETTINGS/HEADERS/DATA bytes in, real frames out. The
//! engine's `serve` expects the connection preface to have been
//! consumed by protocol detection, so the client never sends it.

use std::sync::Arc;
use std::time::Duration;

use echoprint::config::Config;
use echoprint::server::request::FingerprintBlock;
use echoprint::server::AppState;
use echoprint::transport::h2::frame::{
    flags, DataFrame, FrameHeader, FrameType, HeadersFrame, PingFrame, SettingsFrame,
    FRAME_HEADER_SIZE,
};
use echoprint::transport::h2::hpack::{Decoder, Encoder};
use echoprint::transport::h2;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

const READ_TIMEOUT: Duration = Duration::from_secs(5);

struct TestClient {
    wire: DuplexStream,
    encoder: Encoder,
    decoder: Decoder,
}

struct ReadFrame {
    header: FrameHeader,
    payload: Vec<u8>,
}

impl TestClient {
    fn connect() -> Self {
        let (client, server) = tokio::io::duplex(1 << 20);
        let state = Arc::new(AppState::new(Config::default(), None));
        let fingerprint = FingerprintBlock {
            ja3: "771,4865-4866,0-10-11,29,0".to_string(),
            ja3_hash: "22".repeat(16),
            ..FingerprintBlock::default()
        };
        tokio::spawn(h2::serve(
            server,
            "198.51.100.7:40112".to_string(),
            fingerprint,
            state,
        ));
        Self {
            wire: client,
            encoder: Encoder::new(),
            decoder: Decoder::new(),
        }
    }

    async fn send_settings(&mut self, settings: Vec<(u16, u32)>) {
        let buf = SettingsFrame::new(settings).serialize();
        self.wire.write_all(&buf).await.unwrap();
    }

    async fn send_request(&mut self, stream_id: u32, method: &str, path: &str, end_stream: bool) {
        let block = self.encoder.encode(&[
            (":method", method),
            (":authority", "localhost"),
            (":scheme", "https"),
            (":path", path),
            ("user-agent", "h2-test-client"),
        ]);
        let buf = HeadersFrame::new(stream_id, block.into(), end_stream).serialize();
        self.wire.write_all(&buf).await.unwrap();
    }

    async fn send_data(&mut self, stream_id: u32, data: &[u8], end_stream: bool) {
        let buf = DataFrame::new(stream_id, data.to_vec().into(), end_stream).serialize();
        self.wire.write_all(&buf).await.unwrap();
    }

    async fn read_frame(&mut self) -> ReadFrame {
        tokio::time::timeout(READ_TIMEOUT, async {
            let mut head = [0u8; FRAME_HEADER_SIZE];
            self.wire.read_exact(&mut head).await.unwrap();
            let header = FrameHeader::parse(&head).expect("valid frame header");
            let mut payload = vec![0u8; header.length as usize];
            self.wire.read_exact(&mut payload).await.unwrap();
            ReadFrame { header, payload }
        })
        .await
        .expect("frame within the read timeout")
    }

    /// Read frames until the next response for `stream_id`, returning
    /// decoded headers and the concatenated body. Response HEADERS are
    /// decoded in arrival order through the one client-side decoder.
    async fn read_response(&mut self, stream_id: u32) -> (Vec<(String, String)>, Vec<u8>) {
        let mut headers = None;
        let mut body = Vec::new();
        loop {
            let frame = self.read_frame().await;
            match frame.header.frame_type {
                FrameType::Headers => {
                    let parsed =
                        HeadersFrame::parse(frame.header.stream_id, frame.header.flags, frame.payload.into())
                            .unwrap();
                    let decoded = self.decoder.decode(&parsed.header_block).unwrap();
                    if frame.header.stream_id == stream_id {
                        headers = Some(decoded);
                        if parsed.end_stream {
                            return (headers.unwrap(), body);
                        }
                    }
                }
                FrameType::Data => {
                    if frame.header.stream_id == stream_id {
                        let end = frame.header.flags & flags::END_STREAM != 0;
                        let parsed = DataFrame::parse(
                            frame.header.stream_id,
                            frame.header.flags,
                            frame.payload.into(),
                        )
                        .unwrap();
                        body.extend_from_slice(&parsed.data);
                        if end {
                            return (headers.expect("HEADERS before DATA"), body);
                        }
                    }
                }
                _ => {}
            }
        }
    }
}

fn header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, v)| v.as_str())
}

#[tokio::test]
async fn server_settings_come_first_then_ack() {
    let mut client = TestClient::connect();
    client.send_settings(vec![(1, 65536), (4, 6291456)]).await;

    let first = client.read_frame().await;
    assert_eq!(first.header.frame_type, FrameType::Settings);
    assert_eq!(first.header.flags & flags::ACK, 0);
    let settings = SettingsFrame::parse(first.header.flags, first.payload.into());
    assert_eq!(settings.settings, vec![(4, 1_048_576), (3, 100), (6, 65_536)]);

    let second = client.read_frame().await;
    assert_eq!(second.header.frame_type, FrameType::Settings);
    assert_ne!(second.header.flags & flags::ACK, 0);
}

#[tokio::test]
async fn ping_is_acked_with_the_same_payload() {
    let mut client = TestClient::connect();
    client.send_settings(vec![(1, 4096)]).await;
    let data = *b"pingpong";
    let ping = PingFrame { ack: false, data };
    client.wire.write_all(&ping.serialize()).await.unwrap();

    loop {
        let frame = client.read_frame().await;
        if frame.header.frame_type == FrameType::Ping {
            assert_ne!(frame.header.flags & flags::ACK, 0);
            assert_eq!(frame.payload, data);
            break;
        }
    }
}

#[tokio::test]
async fn get_request_round_trip_with_fingerprints() {
    let mut client = TestClient::connect();
    client
        .send_settings(vec![(1, 65536), (3, 1000), (4, 6291456), (6, 262144)])
        .await;
    client.send_request(1, "GET", "/api/clean", true).await;

    let (headers, body) = client.read_response(1).await;
    assert_eq!(header(&headers, ":status"), Some("200"));
    assert_eq!(header(&headers, "server"), Some("TrackMe.peet.ws"));
    assert_eq!(header(&headers, "content-type"), Some("application/json"));
    assert_eq!(header(&headers, "alt-svc"), Some("h3=\":443\"; ma=86400"));
    assert_eq!(header(&headers, "x-request-id").map(str::len), Some(16));

    let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["ja3"], "771,4865-4866,0-10-11,29,0");
    // The Akamai fingerprint reflects this client's SETTINGS order and
    // pseudo-header order.
    assert_eq!(
        value["akamai"],
        "1:65536;3:1000;4:6291456;6:262144|00|0|m,a,s,p"
    );
    assert!(value["ja4h"].as_str().unwrap().starts_with("ge2"));
}

#[tokio::test]
async fn redirect_chain_persists_on_one_connection() {
    let mut client = TestClient::connect();
    client.send_settings(vec![(4, 65535)]).await;

    client.send_request(1, "GET", "/redirect/2", true).await;
    let (headers, _) = client.read_response(1).await;
    assert_eq!(header(&headers, ":status"), Some("302"));
    assert_eq!(header(&headers, "location"), Some("/redirect/1"));

    client.send_request(3, "GET", "/redirect/1", true).await;
    let (headers, _) = client.read_response(3).await;
    assert_eq!(header(&headers, ":status"), Some("302"));
    assert_eq!(header(&headers, "location"), Some("/get"));

    client.send_request(5, "GET", "/get", true).await;
    let (headers, body) = client.read_response(5).await;
    assert_eq!(header(&headers, ":status"), Some("200"));
    assert_eq!(header(&headers, "content-type"), Some("application/json"));
    assert!(!body.is_empty());
}

#[tokio::test]
async fn hpack_dynamic_table_survives_across_streams() {
    let mut client = TestClient::connect();
    client.send_settings(vec![(1, 4096)]).await;

    // First request inserts x-probe into the shared dynamic table.
    let block = client.encoder.encode(&[
        (":method", "GET"),
        (":authority", "localhost"),
        (":scheme", "https"),
        (":path", "/headers"),
        ("x-probe", "dynamic-table-value"),
    ]);
    let frame = HeadersFrame::new(1, block.into(), true).serialize();
    client.wire.write_all(&frame).await.unwrap();
    let (_, body) = client.read_response(1).await;
    let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["headers"]["X-Probe"], "dynamic-table-value");

    // The second block references the entry instead of re-sending the
    // literal; decoding only works if the server kept one decoder for
    // the whole connection.
    let block = client.encoder.encode(&[
        (":method", "GET"),
        (":authority", "localhost"),
        (":scheme", "https"),
        (":path", "/headers"),
        ("x-probe", "dynamic-table-value"),
    ]);
    let frame = HeadersFrame::new(3, block.into(), true).serialize();
    client.wire.write_all(&frame).await.unwrap();
    let (_, body) = client.read_response(3).await;
    let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["headers"]["X-Probe"], "dynamic-table-value");
}

#[tokio::test]
async fn post_body_is_collected_and_echoed() {
    let mut client = TestClient::connect();
    client.send_settings(vec![(1, 4096)]).await;

    client.send_request(1, "POST", "/post", false).await;
    client.send_data(1, br#"{"hello": "h2"}"#, true).await;

    let (headers, body) = client.read_response(1).await;
    assert_eq!(header(&headers, ":status"), Some("200"));
    let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["data"], r#"{"hello": "h2"}"#);
    assert_eq!(value["json"]["hello"], "h2");
}

#[tokio::test]
async fn hpack_failure_resets_only_that_stream() {
    let mut client = TestClient::connect();
    client.send_settings(vec![(1, 4096)]).await;

    // Index 0 is never valid; the decode fails without touching the
    // dynamic table.
    let bogus = HeadersFrame::new(1, vec![0x80].into(), true).serialize();
    client.wire.write_all(&bogus).await.unwrap();

    loop {
        let frame = client.read_frame().await;
        if frame.header.frame_type == FrameType::RstStream {
            assert_eq!(frame.header.stream_id, 1);
            // PROTOCOL_ERROR
            assert_eq!(frame.payload, vec![0, 0, 0, 1]);
            break;
        }
    }

    // The connection survives; a well-formed stream still completes.
    client.send_request(3, "GET", "/ip", true).await;
    let (headers, _) = client.read_response(3).await;
    assert_eq!(header(&headers, ":status"), Some("200"));
}

#[tokio::test]
async fn large_bodies_are_chunked_to_sixteen_kib() {
    let mut client = TestClient::connect();
    client.send_settings(vec![(1, 4096)]).await;
    client.send_request(1, "GET", "/bytes/102400", true).await;

    let mut got_headers = false;
    let mut body = Vec::new();
    loop {
        let frame = client.read_frame().await;
        match frame.header.frame_type {
            FrameType::Headers if frame.header.stream_id == 1 => {
                let parsed =
                    HeadersFrame::parse(1, frame.header.flags, frame.payload.into()).unwrap();
                client.decoder.decode(&parsed.header_block).unwrap();
                got_headers = true;
            }
            FrameType::Data if frame.header.stream_id == 1 => {
                assert!(frame.header.length <= 16_384);
                let end = frame.header.flags & flags::END_STREAM != 0;
                body.extend_from_slice(&frame.payload);
                if end {
                    break;
                }
            }
            _ => {}
        }
    }
    assert!(got_headers);
    assert_eq!(body.len(), 102_400);
    assert!(body.iter().enumerate().all(|(i, &b)| b == (i % 256) as u8));
}

#[tokio::test(start_paused = true)]
async fn idle_connection_gets_goaway_then_close() {
    let mut client = TestClient::connect();
    client.send_settings(vec![(1, 4096)]).await;
    // Server SETTINGS + ACK.
    client.read_frame().await;
    client.read_frame().await;

    // Send nothing further. The paused clock races through the 30s
    // idle window; the engine must emit GOAWAY(NO_ERROR) and close.
    // Plain reads here: a wall-clock timeout would fire first under
    // the paused clock.
    let mut head = [0u8; FRAME_HEADER_SIZE];
    client.wire.read_exact(&mut head).await.unwrap();
    let header = FrameHeader::parse(&head).unwrap();
    assert_eq!(header.frame_type, FrameType::GoAway);
    assert_eq!(header.stream_id, 0);
    let mut payload = vec![0u8; header.length as usize];
    client.wire.read_exact(&mut payload).await.unwrap();
    // last_stream_id 0, NO_ERROR.
    assert_eq!(&payload[..8], &[0, 0, 0, 0, 0, 0, 0, 0]);

    let mut rest = Vec::new();
    client.wire.read_to_end(&mut rest).await.unwrap();
    assert!(rest.is_empty());
}

#[tokio::test]
async fn client_goaway_stops_the_connection() {
    let mut client = TestClient::connect();
    client.send_settings(vec![(1, 4096)]).await;
    // Swallow the server SETTINGS + ACK first.
    client.read_frame().await;
    client.read_frame().await;

    let goaway = echoprint::transport::h2::frame::GoAwayFrame::new(
        0,
        echoprint::transport::h2::frame::ErrorCode::NoError,
        bytes::Bytes::new(),
    );
    client.wire.write_all(&goaway.serialize()).await.unwrap();

    // The engine answers with its own GOAWAY and closes the socket.
    let mut saw_goaway = false;
    loop {
        let mut head = [0u8; FRAME_HEADER_SIZE];
        match tokio::time::timeout(READ_TIMEOUT, client.wire.read_exact(&mut head)).await {
            Ok(Ok(_)) => {
                let header = FrameHeader::parse(&head).unwrap();
                let mut payload = vec![0u8; header.length as usize];
                client.wire.read_exact(&mut payload).await.unwrap();
                if header.frame_type == FrameType::GoAway {
                    saw_goaway = true;
                }
            }
            Ok(Err(_)) => break, // closed
            Err(_) => panic!("connection did not close after GOAWAY"),
        }
    }
    assert!(saw_goaway);
}
