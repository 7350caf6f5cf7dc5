//! Remaining universal invariants from spec.md §8 not already covered by
//! `reconciler_properties.rs`: memory/storage aliasing across steps that
//! don't touch them, LOG-N topic counts, and `decodeFunArgs` argument
//! counts matching the formal parameter list.

use alloy_primitives::{Address, Bytes, B256};
use proptest::prelude::*;
use txdbg_evm_core::interfaces::{AbiDecoder, CalldataLocation, RawStep, StateManager};
use txdbg_evm_core::types::{AbiEncoderVersion, DataView, Param, TypeInfo, Word};
use txdbg_evm_traces::events::extract_event;
use txdbg_evm_traces::normalizer::Normalizer;
use txdbg_evm_traces::reconciler::decode_fun_args;

struct ZeroState;
impl StateManager for ZeroState {
    fn storage_at(&self, _address: Address, _slot: Word) -> eyre::Result<Word> {
        Ok(Word::ZERO)
    }
    fn code_at(&self, _address: Address) -> eyre::Result<Bytes> {
        Ok(Bytes::new())
    }
}

fn step(opcode: u8, stack: Vec<Word>, memory: Vec<u8>) -> RawStep {
    RawStep {
        pc: 0,
        opcode,
        depth: 0,
        stack,
        memory: Bytes::from(memory),
        gas_remaining: 1_000_000,
        gas_cost: 3,
        contract: Address::ZERO,
        code_address: Address::ZERO,
    }
}

struct EchoDecoder;
impl AbiDecoder for EchoDecoder {
    fn decode_params(
        &self,
        params: &[Param],
        raw: &[Word],
        _location: CalldataLocation,
    ) -> eyre::Result<Vec<DataView>> {
        Ok(params
            .iter()
            .map(|p| DataView {
                name: p.name.clone(),
                type_info: p.type_info.clone(),
                location: txdbg_evm_core::types::DataLocation::Stack {
                    offset_from_top: 0,
                },
                raw: raw.to_vec(),
            })
            .collect())
    }
    fn decode_event(
        &self,
        _event: &txdbg_evm_core::types::EventDef,
        _topics: &[B256],
        _data: &Bytes,
    ) -> eyre::Result<Vec<DataView>> {
        Ok(vec![])
    }
}

fn static_param(name: &str) -> Param {
    Param {
        name: name.to_string(),
        type_info: TypeInfo {
            display: "uint256".into(),
            is_dynamic: false,
        },
        indexed: false,
    }
}

proptest! {
    /// I3: a step whose opcode does not write memory leaves the next step's
    /// memory byte-equal to the one before it (spec.md §8 invariant 3), even
    /// when the VM's own raw buffer for that step differs — the normalizer
    /// must alias to the prior step's memory, not just happen to match it.
    #[test]
    fn non_memory_op_leaves_memory_unchanged(
        first in prop::collection::vec(any::<u8>(), 0..64),
        second in prop::collection::vec(any::<u8>(), 0..64),
    ) {
        let state = ZeroState;
        let mut normalizer = Normalizer::new(&state);
        // ADD (0x01) never writes memory.
        let s1 = normalizer.normalize(Address::ZERO, &step(0x01, vec![], first.clone())).unwrap();
        let s2 = normalizer.normalize(Address::ZERO, &step(0x01, vec![], second)).unwrap();
        prop_assert_eq!(s1.memory.clone(), s2.memory);
        prop_assert_eq!(s1.memory.to_vec(), first);
    }

    /// I4: consecutive steps where the first is not SSTORE leave storage
    /// unchanged for any slot already materialized (spec.md §8 invariant 4).
    #[test]
    fn non_sstore_op_leaves_storage_unchanged(slot in 0u64..100) {
        let state = ZeroState;
        let mut normalizer = Normalizer::new(&state);
        // Materialize the slot via SLOAD first.
        let _ = normalizer.normalize(Address::ZERO, &step(0x54, vec![Word::from(slot)], vec![])).unwrap();
        let before = normalizer.normalize(Address::ZERO, &step(0x01, vec![], vec![])).unwrap();
        let after = normalizer.normalize(Address::ZERO, &step(0x01, vec![], vec![])).unwrap();
        prop_assert_eq!(before.storage, after.storage);
    }

    /// I7: `decodeFunArgs` always returns exactly one `DataView` per formal
    /// parameter, regardless of how many are dynamic (spec.md §8 invariant 7).
    #[test]
    fn decode_fun_args_count_matches_param_count(n in 1usize..8, dynamic_mask in prop::collection::vec(any::<bool>(), 1..8)) {
        let decoder = EchoDecoder;
        let params: Vec<Param> = (0..n)
            .map(|i| {
                let mut p = static_param(&format!("p{i}"));
                p.type_info.is_dynamic = dynamic_mask.get(i).copied().unwrap_or(false);
                p
            })
            .collect();
        // Enough stack slots for the worst case (every param dynamic, V1 encoder).
        let stack: Vec<Word> = (0..(n * 2)).map(|i| Word::from(i as u64)).collect();
        let views = decode_fun_args(&decoder, &params, &stack, AbiEncoderVersion::V1).unwrap();
        prop_assert_eq!(views.len(), params.len());
    }
}

/// I6: emitting a LOG-N always carries exactly N topics end to end, since
/// the extractor reads exactly `log_n` stack entries past offset/size and
/// never adds or drops any (spec.md §8 invariant 6).
#[test]
fn log_n_topic_count_is_preserved_verbatim() {
    let decoder = EchoDecoder;
    for n in 0u8..=4 {
        // Stack, bottom to top: topics (furthest from top last), size, offset.
        let mut stack = vec![Word::ZERO; n as usize];
        for (i, slot) in stack.iter_mut().enumerate() {
            *slot = Word::from(i as u64 + 1);
        }
        stack.push(Word::ZERO); // size
        stack.push(Word::ZERO); // offset
        let event = extract_event(&decoder, None, Address::ZERO, &stack, &Bytes::new(), n);
        assert_eq!(event.topics.len(), n as usize);
    }
}
