//! TLS fingerprint kernel tests: dissection, JA3, JA4, PeetPrint.
//!
//! Built around synthetic ClientHello records so every byte of the
//! input is known.

use echoprint::fingerprint::clienthello::KeyShare;
use echoprint::{dissect, ja3, ja4, ja4_r, peetprint};

// ---- record builders ----------------------------------------------------

fn build_hello(version: u16, ciphers: &[u16], extensions: &[(u16, Vec<u8>)]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&version.to_be_bytes());
    body.extend_from_slice(&[0xab; 32]);
    body.push(0);
    body.extend_from_slice(&((ciphers.len() * 2) as u16).to_be_bytes());
    for c in ciphers {
        body.extend_from_slice(&c.to_be_bytes());
    }
    body.extend_from_slice(&[1, 0]);

    let mut ext_block = Vec::new();
    for (id, data) in extensions {
        ext_block.extend_from_slice(&id.to_be_bytes());
        ext_block.extend_from_slice(&(data.len() as u16).to_be_bytes());
        ext_block.extend_from_slice(data);
    }
    body.extend_from_slice(&(ext_block.len() as u16).to_be_bytes());
    body.extend_from_slice(&ext_block);

    let mut handshake = vec![0x01];
    handshake.extend_from_slice(&(body.len() as u32).to_be_bytes()[1..]);
    handshake.extend_from_slice(&body);

    let mut record = vec![0x16, 0x03, 0x01];
    record.extend_from_slice(&(handshake.len() as u16).to_be_bytes());
    record.extend_from_slice(&handshake);
    record
}

fn groups_ext(groups: &[u16]) -> Vec<u8> {
    let mut data = ((groups.len() * 2) as u16).to_be_bytes().to_vec();
    for g in groups {
        data.extend_from_slice(&g.to_be_bytes());
    }
    data
}

fn sigalgs_ext(algs: &[u16]) -> Vec<u8> {
    let mut data = ((algs.len() * 2) as u16).to_be_bytes().to_vec();
    for a in algs {
        data.extend_from_slice(&a.to_be_bytes());
    }
    data
}

fn point_formats_ext(formats: &[u8]) -> Vec<u8> {
    let mut data = vec![formats.len() as u8];
    data.extend_from_slice(formats);
    data
}

fn sni_ext(host: &str) -> Vec<u8> {
    let mut data = (((host.len() + 3) as u16).to_be_bytes()).to_vec();
    data.push(0);
    data.extend_from_slice(&(host.len() as u16).to_be_bytes());
    data.extend_from_slice(host.as_bytes());
    data
}

fn alpn_ext(protos: &[&str]) -> Vec<u8> {
    let mut list = Vec::new();
    for p in protos {
        list.push(p.len() as u8);
        list.extend_from_slice(p.as_bytes());
    }
    let mut data = (list.len() as u16).to_be_bytes().to_vec();
    data.extend_from_slice(&list);
    data
}

fn key_share_ext(groups: &[u16]) -> Vec<u8> {
    let mut list = Vec::new();
    for g in groups {
        list.extend_from_slice(&g.to_be_bytes());
        list.extend_from_slice(&2u16.to_be_bytes());
        list.extend_from_slice(&[0xaa, 0xbb]);
    }
    let mut data = (list.len() as u16).to_be_bytes().to_vec();
    data.extend_from_slice(&list);
    data
}

// ---- JA3 ----------------------------------------------------------------

#[test]
fn ja3_of_canonical_tls12_hello() {
    let raw = build_hello(
        0x0303,
        &[0xc02f, 0xc030],
        &[
            (0x0000, sni_ext("example.com")),
            (0x000a, groups_ext(&[0x001d, 0x0017])),
            (0x000b, point_formats_ext(&[0x00])),
        ],
    );
    let hello = dissect(&raw).unwrap();
    let (fp, hash) = ja3(&hello);
    assert_eq!(fp, "771,49199-49200,0-10-11,29-23,0");
    assert_eq!(
        hash,
        format!("{:x}", md5::compute("771,49199-49200,0-10-11,29-23,0"))
    );
}

#[test]
fn ja3_hash_is_32_lowercase_hex() {
    let raw = build_hello(0x0303, &[0x1301], &[(0x002b, vec![2, 0x03, 0x04])]);
    let hello = dissect(&raw).unwrap();
    let (_, hash) = ja3(&hello);
    assert_eq!(hash.len(), 32);
    assert!(hash
        .chars()
        .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
}

#[test]
fn fingerprints_are_idempotent_across_invocations() {
    let raw = build_hello(
        0x0303,
        &[0x1301, 0x1302, 0xc02f],
        &[
            (0x0000, sni_ext("example.com")),
            (0x000a, groups_ext(&[0x001d])),
            (0x000d, sigalgs_ext(&[0x0403, 0x0804])),
            (0x0010, alpn_ext(&["h2"])),
        ],
    );
    let a = dissect(&raw).unwrap();
    let b = dissect(&raw).unwrap();
    assert_eq!(ja3(&a), ja3(&b));
    assert_eq!(ja4(&a, "772"), ja4(&b, "772"));
    assert_eq!(ja4_r(&a, "772"), ja4_r(&b, "772"));
    assert_eq!(peetprint(&a), peetprint(&b));
}

// ---- GREASE -------------------------------------------------------------

#[test]
fn grease_never_reaches_ja3_or_ja4_counts() {
    let raw = build_hello(
        0x0303,
        &[0x7a7a, 0xc02f, 0xc030],
        &[
            (0x9a9a, vec![]),
            (0x0000, sni_ext("example.com")),
            (0x000a, groups_ext(&[0xbaba, 0x001d])),
            (0x000b, point_formats_ext(&[0x00])),
        ],
    );
    let hello = dissect(&raw).unwrap();

    let (fp, _) = ja3(&hello);
    let fields: Vec<&str> = fp.split(',').collect();
    for grease in ["31354", "39578", "47802"] {
        assert!(!fields[1].contains(grease));
        assert!(!fields[2].contains(grease));
        assert!(!fields[3].contains(grease));
    }

    // Two non-GREASE ciphers; extensions minus GREASE and SNI = 2.
    let ja4_fp = ja4(&hello, "771");
    assert!(ja4_fp.starts_with("t12d0202"), "got {}", ja4_fp);
}

// ---- JA4 ----------------------------------------------------------------

fn tls13_hello() -> Vec<u8> {
    build_hello(
        0x0303,
        &[0x1302, 0x2a2a, 0x1301],
        &[
            (0x0a0a, vec![]),
            (0x0000, sni_ext("example.com")),
            (0x000a, groups_ext(&[0x001d, 0x0017])),
            (0x000d, sigalgs_ext(&[0x0804, 0x0403])),
            (0x0010, alpn_ext(&["h2", "http/1.1"])),
            (0x002b, vec![2, 0x03, 0x04]),
            (0x0033, key_share_ext(&[0x001d])),
            (0x0015, vec![0; 4]),
        ],
    )
}

#[test]
fn ja4_matches_the_published_shape() {
    let hello = dissect(&tls13_hello()).unwrap();
    let fp = ja4(&hello, "772");

    let parts: Vec<&str> = fp.split('_').collect();
    assert_eq!(parts.len(), 3);

    let a = parts[0];
    assert!(a.starts_with('t'));
    assert!(["10", "11", "12", "13"].contains(&&a[1..3]));
    assert!(a.chars().nth(3) == Some('d') || a.chars().nth(3) == Some('i'));
    assert!(a[4..8].chars().all(|c| c.is_ascii_digit()));
    assert!(["h1", "h2", "h3"].contains(&&a[8..]) || a[8..].len() == 2);

    for hashed in [parts[1], parts[2]] {
        assert_eq!(hashed.len(), 12);
        assert!(hashed
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}

#[test]
fn ja4_part_a_details() {
    let hello = dissect(&tls13_hello()).unwrap();
    let fp = ja4(&hello, "772");
    // 2 real ciphers; extensions minus GREASE/SNI/ALPN: sigalgs,
    // groups, supported_versions, key_share, padding = 5; first ALPN h2.
    assert!(fp.starts_with("t13d0205h2_"), "got {}", fp);
}

#[test]
fn ja4_r_sorts_ciphers_and_extensions_but_not_sigalgs() {
    let hello = dissect(&tls13_hello()).unwrap();
    let fp = ja4_r(&hello, "772");
    let parts: Vec<&str> = fp.split('_').collect();
    // Part B sorted ascending.
    assert_eq!(parts[1], "1301,1302");
    // Part C extensions sorted (000a,000d,002b,0033 — padding 0015
    // excluded), then sigalgs in wire order 0804 before 0403.
    assert_eq!(parts[2], "000a,000d,002b,0033");
    assert_eq!(parts[3], "0804,0403");
}

#[test]
fn ja4_ip_sni_and_missing_alpn() {
    let raw = build_hello(
        0x0303,
        &[0x1301],
        &[
            (0x0000, sni_ext("203.0.113.80")),
            (0x002b, vec![2, 0x03, 0x04]),
        ],
    );
    let hello = dissect(&raw).unwrap();
    let fp = ja4(&hello, "772");
    assert!(fp.starts_with("t13i010100_"), "got {}", fp);
}

// ---- PeetPrint ----------------------------------------------------------

#[test]
fn peetprint_preserves_wire_order_everywhere() {
    let hello = dissect(&tls13_hello()).unwrap();
    let (fp, hash) = peetprint(&hello);
    let fields: Vec<&str> = fp.split('|').collect();
    assert_eq!(fields.len(), 4);
    assert_eq!(fields[0], "29-23");
    assert_eq!(fields[1], "h2-http/1.1");
    assert_eq!(fields[2], "2052-1027");
    // Extension ids exactly as sent, GREASE position kept.
    assert_eq!(fields[3], "GREASE-0-10-13-16-43-51-21");
    assert_eq!(hash.len(), 32);
}

// ---- dissection edge cases ----------------------------------------------

#[test]
fn dissector_rejects_truncation_everywhere() {
    let raw = tls13_hello();
    for cut in 0..raw.len() {
        // Whatever the cut point, the dissector must error, not panic.
        let _ = dissect(&raw[..cut]).map(|_| ()).ok();
    }
    assert!(dissect(&raw[..raw.len() - 1]).is_err());
    assert!(dissect(&raw).is_ok());
}

#[test]
fn key_shares_keep_group_and_length() {
    let hello = dissect(&tls13_hello()).unwrap();
    assert_eq!(
        hello.key_shares,
        vec![KeyShare {
            group: 0x001d,
            key_len: 2
        }]
    );
}

#[test]
fn session_id_and_random_are_captured() {
    let hello = dissect(&tls13_hello()).unwrap();
    assert_eq!(hello.client_random, vec![0xab; 32]);
    assert!(hello.session_id.is_empty());
    assert_eq!(hello.record_version, 0x0301);
    assert_eq!(hello.handshake_version, 0x0303);
}
