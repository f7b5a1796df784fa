//! Akamai HTTP/2 connection fingerprint.
//!
//! Derived from the exact sequence of frames a client sends at connection
//! start: SETTINGS parameters in wire order, the first connection-level
//! WINDOW_UPDATE increment, any priority declarations, and the
//! pseudo-header order of the first HEADERS frame.
//!
//! Shape: `<id:value;…>|<window_update>|<priorities>|<pseudo_order>`
//! e.g. `1:65536;3:1000;4:6291456;6:262144|15663105|0|m,a,s,p`.

use crate::transport::h2::capture::{setting_id, CapturedFrame};

use super::md5_hex;

/// Build the Akamai fingerprint from the ordered captured-frame sequence
/// of a connection (connection-level frames followed by the requesting
/// stream's frames).
pub fn akamai_fingerprint(frames: &[CapturedFrame]) -> String {
    let mut settings: Vec<String> = Vec::new();
    let mut window_update = String::from("00");
    let mut priorities: Vec<String> = Vec::new();
    let mut header_order = String::new();

    for frame in frames {
        match frame.frame_type.as_str() {
            "SETTINGS" => {
                for entry in &frame.settings {
                    let Some((name, value)) = entry.split_once(" = ") else {
                        continue;
                    };
                    if let Some(id) = setting_id(name) {
                        settings.push(format!("{}:{}", id, value));
                    }
                }
            }
            "WINDOW_UPDATE" => {
                if window_update == "00" {
                    if let Some(increment) = frame.increment {
                        window_update = increment.to_string();
                    }
                }
            }
            "PRIORITY" | "HEADERS" => {
                if let Some(priority) = &frame.priority {
                    priorities.push(format!(
                        "{}:{}:{}:{}",
                        frame.stream_id, priority.exclusive, priority.depends_on, priority.weight
                    ));
                }
                if frame.frame_type == "HEADERS" && header_order.is_empty() {
                    header_order = frame
                        .headers
                        .iter()
                        .filter(|h| h.starts_with(':'))
                        .filter_map(|h| h.chars().nth(1))
                        .map(String::from)
                        .collect::<Vec<_>>()
                        .join(",");
                }
            }
            _ => {}
        }
    }

    let priorities = if priorities.is_empty() {
        "0".to_string()
    } else {
        priorities.join(",")
    };

    format!(
        "{}|{}|{}|{}",
        settings.join(";"),
        window_update,
        priorities,
        header_order
    )
}

/// MD5 of the fingerprint string, for compact indexing.
pub fn akamai_fingerprint_hash(frames: &[CapturedFrame]) -> String {
    md5_hex(&akamai_fingerprint(frames))
}
