//! TLS ClientHello dissector.
//!
//! Parses the first handshake record exactly as received, preserving wire
//! order everywhere: cipher suites, extensions, ALPN protocols, supported
//! groups, signature algorithms and key-share groups are ordered
//! sequences, never sets. GREASE values are flagged but kept in the
//! parsed structure; they are dropped only at fingerprint time.

use bytes::{Buf, Bytes};

use crate::error::{Error, Result};

/// TLS handshake record content type.
const CONTENT_TYPE_HANDSHAKE: u8 = 0x16;
/// ClientHello handshake message type.
const HANDSHAKE_CLIENT_HELLO: u8 = 0x01;

/// Extension type ids the dissector understands beyond the id list.
const EXT_SERVER_NAME: u16 = 0x0000;
const EXT_SUPPORTED_GROUPS: u16 = 0x000a;
const EXT_EC_POINT_FORMATS: u16 = 0x000b;
const EXT_SIGNATURE_ALGORITHMS: u16 = 0x000d;
const EXT_ALPN: u16 = 0x0010;
const EXT_SUPPORTED_VERSIONS: u16 = 0x002b;
const EXT_PSK_KEY_EXCHANGE_MODES: u16 = 0x002d;
const EXT_KEY_SHARE: u16 = 0x0033;
const EXT_APPLICATION_SETTINGS: u16 = 0x4469;

/// A value is GREASE iff both bytes are equal and of the form 0xNA
/// (0x0a0a, 0x1a1a, ... 0xfafa).
pub fn is_grease(value: u16) -> bool {
    (value & 0x0f0f) == 0x0a0a && (value >> 8) == (value & 0xff)
}

/// One extension as it appeared on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extension {
    pub id: u16,
    pub grease: bool,
}

/// A key share entry; only the group id participates in fingerprints, the
/// payload length is retained for completeness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyShare {
    pub group: u16,
    pub key_len: u16,
}

/// The parsed ClientHello.
#[derive(Debug, Clone, Default)]
pub struct ClientHello {
    /// Record-layer version (e.g. 0x0301).
    pub record_version: u16,
    /// Handshake (legacy) version (e.g. 0x0303).
    pub handshake_version: u16,
    /// 32-byte client random.
    pub client_random: Vec<u8>,
    /// Opaque legacy session id.
    pub session_id: Vec<u8>,
    /// Cipher suite ids in wire order, GREASE included.
    pub cipher_suites: Vec<u16>,
    /// Legacy compression methods.
    pub compression_methods: Vec<u8>,
    /// Extensions in wire order, GREASE included.
    pub extensions: Vec<Extension>,
    /// SNI host name, when the server_name extension is present.
    pub sni: Option<String>,
    /// supported_versions extension values in wire order.
    pub supported_versions: Vec<u16>,
    /// supported_groups extension values in wire order.
    pub supported_groups: Vec<u16>,
    /// ec_point_formats extension values.
    pub ec_point_formats: Vec<u8>,
    /// signature_algorithms extension values in wire order.
    pub signature_algorithms: Vec<u16>,
    /// ALPN protocol names in wire order.
    pub alpn_protocols: Vec<String>,
    /// key_share entries in wire order.
    pub key_shares: Vec<KeyShare>,
    /// psk_key_exchange_modes values.
    pub psk_modes: Vec<u8>,
    /// ALPS (application_settings) protocol names.
    pub alps_protocols: Vec<String>,
}

impl ClientHello {
    /// Extension ids in wire order, GREASE included.
    pub fn extension_ids(&self) -> Vec<u16> {
        self.extensions.iter().map(|e| e.id).collect()
    }
}

/// Bounds-checked reader over the raw record. Every accessor fails with a
/// dissection error instead of slicing past the end.
struct Reader {
    buf: Bytes,
}

impl Reader {
    fn new(buf: Bytes) -> Self {
        Self { buf }
    }

    fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    fn read_u8(&mut self, what: &str) -> Result<u8> {
        if self.buf.remaining() < 1 {
            return Err(Error::dissect(format!("truncated at {}", what)));
        }
        Ok(self.buf.get_u8())
    }

    fn read_u16(&mut self, what: &str) -> Result<u16> {
        if self.buf.remaining() < 2 {
            return Err(Error::dissect(format!("truncated at {}", what)));
        }
        Ok(self.buf.get_u16())
    }

    fn read_u24(&mut self, what: &str) -> Result<u32> {
        if self.buf.remaining() < 3 {
            return Err(Error::dissect(format!("truncated at {}", what)));
        }
        let hi = self.buf.get_u8() as u32;
        let lo = self.buf.get_u16() as u32;
        Ok((hi << 16) | lo)
    }

    fn read_bytes(&mut self, len: usize, what: &str) -> Result<Bytes> {
        if self.buf.remaining() < len {
            return Err(Error::dissect(format!("truncated in {}", what)));
        }
        Ok(self.buf.copy_to_bytes(len))
    }
}

/// Dissect the raw bytes of the first TLS record into a [`ClientHello`].
///
/// The input is the record exactly as received, starting at the record
/// header. Truncation or malformed length prefixes fail the handshake;
/// the dissector itself never panics.
pub fn dissect(raw: &[u8]) -> Result<ClientHello> {
    let mut r = Reader::new(Bytes::copy_from_slice(raw));

    let content_type = r.read_u8("record header")?;
    if content_type != CONTENT_TYPE_HANDSHAKE {
        return Err(Error::dissect(format!(
            "not a handshake record (content type 0x{:02x})",
            content_type
        )));
    }
    let record_version = r.read_u16("record version")?;
    let record_len = r.read_u16("record length")? as usize;
    if r.remaining() < record_len {
        return Err(Error::dissect("record shorter than declared length"));
    }

    let handshake_type = r.read_u8("handshake type")?;
    if handshake_type != HANDSHAKE_CLIENT_HELLO {
        return Err(Error::dissect(format!(
            "not a ClientHello (handshake type 0x{:02x})",
            handshake_type
        )));
    }
    let body_len = r.read_u24("handshake length")? as usize;
    let mut body = Reader::new(r.read_bytes(body_len, "handshake body")?);

    let handshake_version = body.read_u16("client version")?;
    let client_random = body.read_bytes(32, "client random")?.to_vec();

    let session_id_len = body.read_u8("session id length")? as usize;
    let session_id = body.read_bytes(session_id_len, "session id")?.to_vec();

    let cipher_len = body.read_u16("cipher suites length")? as usize;
    if cipher_len % 2 != 0 {
        return Err(Error::dissect("odd cipher suites length"));
    }
    let mut cipher_bytes = Reader::new(body.read_bytes(cipher_len, "cipher suites")?);
    let mut cipher_suites = Vec::with_capacity(cipher_len / 2);
    while cipher_bytes.remaining() >= 2 {
        cipher_suites.push(cipher_bytes.read_u16("cipher suite")?);
    }

    let comp_len = body.read_u8("compression methods length")? as usize;
    let compression_methods = body.read_bytes(comp_len, "compression methods")?.to_vec();

    let mut hello = ClientHello {
        record_version,
        handshake_version,
        client_random,
        session_id,
        cipher_suites,
        compression_methods,
        ..ClientHello::default()
    };

    // Extensions block is optional (absent in minimal SSLv3-style hellos).
    if body.remaining() == 0 {
        return Ok(hello);
    }

    let ext_total = body.read_u16("extensions length")? as usize;
    let mut exts = Reader::new(body.read_bytes(ext_total, "extensions")?);
    while exts.remaining() > 0 {
        let id = exts.read_u16("extension type")?;
        let len = exts.read_u16("extension length")? as usize;
        let data = exts.read_bytes(len, "extension payload")?;

        hello.extensions.push(Extension {
            id,
            grease: is_grease(id),
        });
        parse_extension_payload(&mut hello, id, data)?;
    }

    Ok(hello)
}

fn parse_extension_payload(hello: &mut ClientHello, id: u16, data: Bytes) -> Result<()> {
    let mut r = Reader::new(data);
    match id {
        EXT_SERVER_NAME => {
            // server_name_list: u16 length, then (type u8, u16 length, name)
            if r.remaining() == 0 {
                return Ok(());
            }
            let _list_len = r.read_u16("server name list")?;
            let name_type = r.read_u8("server name type")?;
            let name_len = r.read_u16("server name length")? as usize;
            let name = r.read_bytes(name_len, "server name")?;
            if name_type == 0 {
                hello.sni = Some(String::from_utf8_lossy(&name).into_owned());
            }
        }
        EXT_SUPPORTED_GROUPS => {
            let list_len = r.read_u16("supported groups list")? as usize;
            let mut list = Reader::new(r.read_bytes(list_len, "supported groups")?);
            while list.remaining() >= 2 {
                hello.supported_groups.push(list.read_u16("group")?);
            }
        }
        EXT_EC_POINT_FORMATS => {
            let list_len = r.read_u8("ec point formats list")? as usize;
            hello.ec_point_formats = r.read_bytes(list_len, "ec point formats")?.to_vec();
        }
        EXT_SIGNATURE_ALGORITHMS => {
            let list_len = r.read_u16("signature algorithms list")? as usize;
            let mut list = Reader::new(r.read_bytes(list_len, "signature algorithms")?);
            while list.remaining() >= 2 {
                hello
                    .signature_algorithms
                    .push(list.read_u16("signature algorithm")?);
            }
        }
        EXT_ALPN => {
            let list_len = r.read_u16("alpn list")? as usize;
            let mut list = Reader::new(r.read_bytes(list_len, "alpn list")?);
            while list.remaining() > 0 {
                let proto_len = list.read_u8("alpn protocol length")? as usize;
                let proto = list.read_bytes(proto_len, "alpn protocol")?;
                hello
                    .alpn_protocols
                    .push(String::from_utf8_lossy(&proto).into_owned());
            }
        }
        EXT_SUPPORTED_VERSIONS => {
            let list_len = r.read_u8("supported versions list")? as usize;
            let mut list = Reader::new(r.read_bytes(list_len, "supported versions")?);
            while list.remaining() >= 2 {
                hello.supported_versions.push(list.read_u16("version")?);
            }
        }
        EXT_PSK_KEY_EXCHANGE_MODES => {
            let list_len = r.read_u8("psk modes list")? as usize;
            hello.psk_modes = r.read_bytes(list_len, "psk modes")?.to_vec();
        }
        EXT_KEY_SHARE => {
            let list_len = r.read_u16("key share list")? as usize;
            let mut list = Reader::new(r.read_bytes(list_len, "key share list")?);
            while list.remaining() >= 4 {
                let group = list.read_u16("key share group")?;
                let key_len = list.read_u16("key share length")?;
                let _ = list.read_bytes(key_len as usize, "key share payload")?;
                hello.key_shares.push(KeyShare { group, key_len });
            }
        }
        EXT_APPLICATION_SETTINGS => {
            let list_len = r.read_u16("alps list")? as usize;
            let mut list = Reader::new(r.read_bytes(list_len, "alps list")?);
            while list.remaining() > 0 {
                let proto_len = list.read_u8("alps protocol length")? as usize;
                let proto = list.read_bytes(proto_len, "alps protocol")?;
                hello
                    .alps_protocols
                    .push(String::from_utf8_lossy(&proto).into_owned());
            }
        }
        // Unknown extension payloads are retained only as their type id.
        _ => {}
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::tests_support::*;
    use super::*;

    #[test]
    fn grease_rule_matches_reserved_codepoints() {
        for v in [0x0a0au16, 0x1a1a, 0x8a8a, 0xfafa] {
            assert!(is_grease(v), "0x{:04x} should be GREASE", v);
        }
        for v in [0x0a1au16, 0x1303, 0x0000, 0xc02f] {
            assert!(!is_grease(v), "0x{:04x} should not be GREASE", v);
        }
    }

    #[test]
    fn dissects_order_and_payloads() {
        let raw = build_hello(
            0x0303,
            &[0xc02f, 0xc030],
            &[
                (0x0000, sni_ext("example.com")),
                (0x000a, groups_ext(&[0x001d, 0x0017])),
                (0x000b, point_formats_ext(&[0x00])),
                (0x0010, alpn_ext(&["h2", "http/1.1"])),
            ],
        );
        let hello = dissect(&raw).unwrap();
        assert_eq!(hello.handshake_version, 0x0303);
        assert_eq!(hello.cipher_suites, vec![0xc02f, 0xc030]);
        assert_eq!(hello.extension_ids(), vec![0x0000, 0x000a, 0x000b, 0x0010]);
        assert_eq!(hello.sni.as_deref(), Some("example.com"));
        assert_eq!(hello.supported_groups, vec![0x001d, 0x0017]);
        assert_eq!(hello.ec_point_formats, vec![0x00]);
        assert_eq!(hello.alpn_protocols, vec!["h2", "http/1.1"]);
    }

    #[test]
    fn grease_values_are_flagged_but_kept() {
        let raw = build_hello(
            0x0303,
            &[0x2a2a, 0xc02f],
            &[(0x3a3a, vec![]), (0x000a, groups_ext(&[0x4a4a, 0x001d]))],
        );
        let hello = dissect(&raw).unwrap();
        assert_eq!(hello.cipher_suites, vec![0x2a2a, 0xc02f]);
        assert!(hello.extensions[0].grease);
        assert!(!hello.extensions[1].grease);
        // GREASE group stays in the parsed structure.
        assert_eq!(hello.supported_groups, vec![0x4a4a, 0x001d]);
    }

    #[test]
    fn truncated_record_is_an_error_not_a_panic() {
        let raw = build_hello(0x0303, &[0xc02f], &[]);
        for cut in [0, 3, 6, 12, 40, raw.len() - 1] {
            assert!(dissect(&raw[..cut]).is_err(), "cut at {} should fail", cut);
        }
    }

    #[test]
    fn rejects_non_handshake_records() {
        assert!(dissect(&[0x17, 0x03, 0x03, 0x00, 0x00]).is_err());
    }
}
