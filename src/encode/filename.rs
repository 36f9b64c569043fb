//! `filename=` parameter encoding for form-data parts.
//!
//! Pure ASCII names without a double quote are sent as a quoted string
//! (RFC 1867). Anything else becomes an RFC 2047 "Q" encoded word over the
//! UTF-8 bytes of the name.

use std::fmt::Write;

fn q_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for &b in bytes {
        match b {
            b' ' => out.push('_'),
            b'=' | b'?' | b'_' | b'"' => {
                let _ = write!(out, "={:02X}", b);
            }
            0x21..=0x7e => out.push(b as char),
            _ => {
                let _ = write!(out, "={:02X}", b);
            }
        }
    }
    out
}

pub fn encode_filename(name: &str) -> String {
    if name.is_ascii() && !name.contains('"') {
        format!("\"{}\"", name)
    } else {
        format!("=?UTF-8?Q?{}?=", q_encode(name.as_bytes()))
    }
}
