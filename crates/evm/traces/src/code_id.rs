//! C4: code identifiers. Deployed (runtime) bytecode carries a
//! compiler-appended CBOR trailer (spec.md §4.4) that must be stripped
//! before hashing, or two builds of identical source with different
//! metadata (e.g. differing IPFS hashes) would hash to different
//! [`CodeId`]s and break contract recognition across frames.

use alloy_primitives::{keccak256, Bytes};
use txdbg_evm_core::types::CodeId;

/// Strips the trailing CBOR metadata blob from `code`, if present, and
/// returns `(code_without_trailer, had_metadata)`.
///
/// The trailer format is a CBOR map followed by a 2-byte big-endian length
/// of that map. A trailer is only trusted if: the length fits within the
/// code, the indicated bytes parse as a CBOR map, and that map contains at
/// least one of the keys solc emits (`ipfs`, `bzzr1`, `bzzr0`). Anything
/// else is treated as ordinary code with no metadata — a malformed or
/// absent trailer is not an error (spec.md §7 `MissingDebugInfo` applies to
/// the artifact manager's resolution, not to this step).
pub fn strip_metadata(code: &[u8]) -> (&[u8], bool) {
    if code.len() < 2 {
        return (code, false);
    }
    let len_bytes = &code[code.len() - 2..];
    let trailer_len = u16::from_be_bytes([len_bytes[0], len_bytes[1]]) as usize;

    if trailer_len == 0 || trailer_len + 2 > code.len() {
        return (code, false);
    }

    let trailer_start = code.len() - 2 - trailer_len;
    let cbor_bytes = &code[trailer_start..code.len() - 2];

    match ciborium::de::from_reader::<ciborium::value::Value, _>(cbor_bytes) {
        Ok(ciborium::value::Value::Map(entries)) => {
            let has_known_key = entries.iter().any(|(k, _)| {
                matches!(
                    k.as_text(),
                    Some("ipfs") | Some("bzzr1") | Some("bzzr0")
                )
            });
            if has_known_key {
                (&code[..trailer_start], true)
            } else {
                (code, false)
            }
        }
        _ => (code, false),
    }
}

/// Computes the [`CodeId`] for a blob of deployed or creation bytecode,
/// stripping any CBOR metadata trailer first so that builds differing only
/// in metadata still share an identifier.
pub fn code_id_of(code: &[u8]) -> CodeId {
    let (stripped, has_metadata) = strip_metadata(code);
    CodeId {
        code_hash: keccak256(stripped),
        has_metadata,
    }
}

/// Convenience for the common case of hashing an [`alloy_primitives::Bytes`]
/// buffer directly from a VM callback.
pub fn code_id_of_bytes(code: &Bytes) -> CodeId {
    code_id_of(code.as_ref())
}
