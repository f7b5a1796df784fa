//! TLS termination with pre-handshake ClientHello capture.
//!
//! The dissector needs the exact ClientHello bytes, so the first TLS
//! record is read off the TCP stream before BoringSSL ever sees it and
//! replayed into the handshake through a rewinding stream wrapper.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use boring::ssl::{AlpnError, SslAcceptor, SslFiletype, SslMethod};
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_boring::SslStream;

use crate::config::Config;
use crate::error::{Error, Result};

/// Upper bound on a ClientHello record payload (RFC 8446 record limit).
const MAX_RECORD_LEN: usize = 16384 + 256;

/// A stream that replays a prefix before reading from the inner stream.
/// Writes pass straight through.
#[derive(Debug)]
pub struct Rewind<S> {
    prefix: Bytes,
    inner: S,
}

impl<S> Rewind<S> {
    pub fn new(prefix: Bytes, inner: S) -> Self {
        Self { prefix, inner }
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for Rewind<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if !self.prefix.is_empty() {
            let n = self.prefix.len().min(buf.remaining());
            let chunk = self.prefix.split_to(n);
            buf.put_slice(&chunk);
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for Rewind<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

/// Read the complete first TLS record (header plus payload) from the
/// socket. The caller replays these bytes into the handshake.
pub async fn read_client_hello_record(tcp: &mut TcpStream) -> Result<Vec<u8>> {
    let mut header = [0u8; 5];
    tcp.read_exact(&mut header).await?;

    let record_len = u16::from_be_bytes([header[3], header[4]]) as usize;
    if record_len == 0 || record_len > MAX_RECORD_LEN {
        return Err(Error::dissect(format!(
            "implausible record length {}",
            record_len
        )));
    }

    let mut record = vec![0u8; 5 + record_len];
    record[..5].copy_from_slice(&header);
    tcp.read_exact(&mut record[5..]).await?;
    Ok(record)
}

/// TLS acceptor advertising h2 and http/1.1.
pub struct TlsAcceptor {
    inner: SslAcceptor,
}

impl TlsAcceptor {
    /// Build the acceptor from the configured PEM files.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut builder = SslAcceptor::mozilla_intermediate(SslMethod::tls())
            .map_err(|e| Error::tls(format!("acceptor init: {}", e)))?;
        builder
            .set_certificate_chain_file(&config.cert_file)
            .map_err(|e| Error::tls(format!("loading {}: {}", config.cert_file, e)))?;
        builder
            .set_private_key_file(&config.key_file, SslFiletype::PEM)
            .map_err(|e| Error::tls(format!("loading {}: {}", config.key_file, e)))?;
        builder.set_alpn_select_callback(|_ssl, client_protos| {
            select_alpn(client_protos).ok_or(AlpnError::NOACK)
        });

        Ok(Self {
            inner: builder.build(),
        })
    }

    /// Run the handshake over the socket with the already-read record
    /// replayed in front of it.
    pub async fn accept(
        &self,
        record: Vec<u8>,
        tcp: TcpStream,
    ) -> Result<SslStream<Rewind<TcpStream>>> {
        let stream = Rewind::new(Bytes::from(record), tcp);
        tokio_boring::accept(&self.inner, stream)
            .await
            .map_err(|e| Error::tls(format!("handshake failed: {:?}", e)))
    }
}

/// Pick h2 when offered, http/1.1 otherwise. The returned slice borrows
/// from the client's protocol list as the callback contract requires.
fn select_alpn(client_protos: &[u8]) -> Option<&[u8]> {
    let mut http11: Option<&[u8]> = None;
    let mut rest = client_protos;
    while let Some((&len, tail)) = rest.split_first() {
        let len = len as usize;
        if tail.len() < len {
            return None;
        }
        let (proto, remaining) = tail.split_at(len);
        match proto {
            b"h2" => return Some(proto),
            b"http/1.1" => http11 = http11.or(Some(proto)),
            _ => {}
        }
        rest = remaining;
    }
    http11
}

/// Map BoringSSL's version string to the decimal code the fingerprints
/// use ("771" for TLS 1.2, "772" for TLS 1.3).
pub fn negotiated_version_code(version_str: &str) -> String {
    match version_str {
        "TLSv1" | "TLSv1.0" => "769".to_string(),
        "TLSv1.1" => "770".to_string(),
        "TLSv1.2" => "771".to_string(),
        "TLSv1.3" => "772".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[test]
    fn alpn_prefers_h2() {
        let protos = b"\x08http/1.1\x02h2";
        assert_eq!(select_alpn(protos), Some(b"h2".as_slice()));
        assert_eq!(select_alpn(b"\x08http/1.1"), Some(b"http/1.1".as_slice()));
        assert_eq!(select_alpn(b"\x03foo"), None);
        assert_eq!(select_alpn(b"\x09short"), None);
    }

    #[test]
    fn version_codes() {
        assert_eq!(negotiated_version_code("TLSv1.2"), "771");
        assert_eq!(negotiated_version_code("TLSv1.3"), "772");
    }

    #[tokio::test]
    async fn rewind_replays_prefix_then_inner() {
        let (mut client, server) = tokio::io::duplex(64);
        client.write_all(b" world").await.unwrap();
        let mut rewound = Rewind::new(Bytes::from_static(b"hello"), server);
        let mut buf = vec![0u8; 11];
        rewound.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello world");
    }
}
