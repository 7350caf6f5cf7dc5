//! # txdbg-common
//!
//! Small primitives shared by every `txdbg-*` crate: nothing here is specific
//! to the trace annotator itself, only the conventions it is built on top of.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

#[macro_use]
extern crate tracing;

pub mod constants;

use alloy_primitives::Bytes;

/// Renders a byte buffer as a short, human-friendly hex preview for log lines
/// and error messages, eliding the middle of long buffers.
///
/// ```
/// use txdbg_common::preview_hex;
/// assert_eq!(preview_hex(&[0xde, 0xad, 0xbe, 0xef]), "0xdeadbeef");
/// ```
pub fn preview_hex(data: &[u8]) -> String {
    const HEAD: usize = 16;
    if data.len() <= HEAD {
        return format!("0x{}", alloy_primitives::hex::encode(data));
    }
    trace!(target: "txdbg::common", len = data.len(), "eliding long hex buffer in preview");
    format!(
        "0x{}…({} bytes)",
        alloy_primitives::hex::encode(&data[..HEAD]),
        data.len()
    )
}

/// Convenience conversion used at the boundary between borrowed VM callback
/// buffers and the owned, cheaply-clonable [`Bytes`] the core stores.
pub fn to_bytes(data: impl Into<Bytes>) -> Bytes {
    data.into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_hex_short_is_full() {
        assert_eq!(preview_hex(&[1, 2, 3]), "0x010203");
    }

    #[test]
    fn preview_hex_long_is_elided() {
        let data = vec![0xab; 40];
        let preview = preview_hex(&data);
        assert!(preview.ends_with("(40 bytes)"));
    }
}
