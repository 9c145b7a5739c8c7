//! Output encodings for `EncodeFor` and `@EncodeDataFor`.

use std::fmt::Write;

use quick_xml::escape::escape;

use crate::interpreter::annotations::Encoding;

/// Encode `text` for embedding in HTML, XML or a URI component.
pub fn encode(encoding: Encoding, text: &str) -> String {
    match encoding {
        Encoding::Html => html_escape::encode_safe(text).into_owned(),
        Encoding::Xml => escape(text).into_owned(),
        Encoding::Uri => encode_uri_component(text),
    }
}

/// Percent-encode every byte outside the unreserved set `A-Z a-z 0-9 - _ . ~`.
fn encode_uri_component(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for byte in text.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b'~') {
            out.push(char::from(byte));
        } else {
            let _ = write!(out, "%{byte:02X}");
        }
    }
    out
}
