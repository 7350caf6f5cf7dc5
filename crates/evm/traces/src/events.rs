//! C7: event extraction. Reads a `LOG0..LOG4`'s `offset`/`size` and topics
//! straight off the stack and memory — there is no `on_log` callback to hand
//! these in pre-sliced (spec.md §4.7) — then pairs the result with the event
//! definition `topics[0]` hashes to and decodes its fields via the host's
//! [`AbiDecoder`].

use alloy_primitives::{Address, Bytes, B256};
use txdbg_evm_core::interfaces::AbiDecoder;
use txdbg_evm_core::types::{ContractInfo, DecodedEvent, EventDesc, Word};

use crate::reconciler::{slice_memory, word_at};

fn word_to_topic(word: Word) -> B256 {
    B256::from(word.to_be_bytes::<32>())
}

/// Builds an [`EventDesc`] for one `LOG{log_n}` emission. `stack`/`memory`
/// are the step's operand stack and linear memory *as of* the LOG
/// instruction (spec.md §4.7): the top two stack entries are `offset` and
/// `size`, and the `log_n` entries below those are the topics, topic0
/// nearest the top.
///
/// `contract` is the emitting contract's resolved metadata, if any
/// (spec.md §7 `MissingDebugInfo` applies here too: an unresolved contract
/// just yields `decoded: None`).
pub fn extract_event(
    decoder: &dyn AbiDecoder,
    contract: Option<&ContractInfo>,
    address: Address,
    stack: &[Word],
    memory: &Bytes,
    log_n: u8,
) -> EventDesc {
    let offset = word_at(stack, 0).unwrap_or_default();
    let size = word_at(stack, 1).unwrap_or_default();
    let data = slice_memory(memory, offset, size);
    let topics: Vec<B256> = (0..log_n)
        .map(|i| word_at(stack, 2 + i as usize).map(word_to_topic).unwrap_or_default())
        .collect();

    let decoded = topics.first().and_then(|topic0| {
        let contract = contract?;
        let event = contract.events.iter().find(|e| &e.signature_hash == topic0)?;
        match decoder.decode_event(event, &topics, &data) {
            Ok(fields) => Some(DecodedEvent {
                name: event.name.clone(),
                fields,
            }),
            Err(err) => {
                warn!(target: "txdbg::events", %err, event = %event.name, "failed to decode event fields");
                None
            }
        }
    });

    EventDesc {
        address,
        topics,
        data,
        decoded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::keccak256;
    use txdbg_evm_core::types::{AbiEncoderVersion, DataView, EventDef};

    struct NullDecoder;
    impl AbiDecoder for NullDecoder {
        fn decode_params(
            &self,
            _params: &[txdbg_evm_core::types::Param],
            _raw: &[txdbg_evm_core::types::Word],
            _location: txdbg_evm_core::interfaces::CalldataLocation,
        ) -> eyre::Result<Vec<DataView>> {
            Ok(vec![])
        }
        fn decode_event(
            &self,
            _event: &EventDef,
            _topics: &[B256],
            _data: &Bytes,
        ) -> eyre::Result<Vec<DataView>> {
            Ok(vec![])
        }
    }

    #[test]
    fn unresolved_contract_yields_undecoded_event() {
        let decoder = NullDecoder;
        let stack = vec![Word::ZERO, Word::ZERO, Word::ZERO];
        let event = extract_event(&decoder, None, Address::ZERO, &stack, &Bytes::new(), 1);
        assert!(event.decoded.is_none());
        assert_eq!(event.topics, vec![B256::ZERO]);
    }

    #[test]
    fn matching_topic0_decodes_event_name() {
        let sig_hash = keccak256(b"Transfer(address,address,uint256)");
        let contract = ContractInfo {
            name: "Token".into(),
            functions: vec![],
            state_variables: vec![],
            constructor: None,
            events: vec![EventDef {
                name: "Transfer".into(),
                signature_hash: sig_hash,
                params: vec![],
            }],
            abi_encoder_version: AbiEncoderVersion::V2,
        };
        let decoder = NullDecoder;
        // Stack, top to bottom: offset=0, size=0, topic0=sig_hash.
        let topic0 = Word::from_be_bytes(sig_hash.0);
        let stack = vec![topic0, Word::ZERO, Word::ZERO];
        let event = extract_event(&decoder, Some(&contract), Address::ZERO, &stack, &Bytes::new(), 1);
        assert_eq!(event.decoded.unwrap().name, "Transfer");
    }

    #[test]
    fn log2_reads_offset_size_and_two_topics_from_stack_and_memory() {
        let decoder = NullDecoder;
        let memory = Bytes::from_static(&[0xaa, 0xbb, 0xcc, 0xdd]);
        // Stack, bottom to top: topic1, topic0, size, offset.
        let stack = vec![
            Word::from(2u64),
            Word::from(1u64),
            Word::from(4u64), // size
            Word::from(0u64), // offset
        ];
        let event = extract_event(&decoder, None, Address::ZERO, &stack, &memory, 2);
        assert_eq!(event.data.as_ref(), &[0xaa, 0xbb, 0xcc, 0xdd]);
        assert_eq!(event.topics, vec![Word::from(1u64), Word::from(2u64)].iter().map(|w| word_to_topic(*w)).collect::<Vec<_>>());
    }
}
