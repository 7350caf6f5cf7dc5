//! C5: frame construction. Builds [`ExternalCallFrame`]/[`CreationFrame`]
//! values once the reconciler (C6) has decided, from diffing two raw steps,
//! that a call or creation frame needs to be pushed — resolving the
//! contract's metadata, entry callee and decoded arguments up front so the
//! reconciler never has to consult the artifact manager mid-stack-walk
//! (spec.md §4.5).

use alloy_primitives::{Address, Bytes};
use txdbg_evm_core::interfaces::{AbiDecoder, ArtifactManager, CalldataLocation};
use txdbg_evm_core::types::{
    Callee, CallType, CodeIds, CreateType, CreationFrame, DataView, ExternalCallFrame, Param, Word,
};

/// Splits ABI calldata (already past the 4-byte selector) into 32-byte,
/// right-zero-padded big-endian words — the unit [`AbiDecoder::decode_params`]
/// expects (spec.md §4.5 "chunk the msg-data buffer into words").
fn words_from_calldata(data: &[u8]) -> Vec<Word> {
    data.chunks(32)
        .map(|chunk| {
            let mut buf = [0u8; 32];
            buf[..chunk.len()].copy_from_slice(chunk);
            Word::from_be_bytes(buf)
        })
        .collect()
}

/// Decodes an external call's (or a public getter's) arguments in one shot
/// over the whole calldata buffer (spec.md §4.5) — distinct from
/// [`crate::reconciler::decode_fun_args`], which reconstructs internal-call
/// arguments from the operand stack instead.
fn decode_external_args(
    decoder: &dyn AbiDecoder,
    params: &[Param],
    calldata_after_selector: &[u8],
) -> Vec<(String, Option<DataView>)> {
    if params.is_empty() {
        return vec![];
    }
    let words = words_from_calldata(calldata_after_selector);
    match decoder.decode_params(params, &words, CalldataLocation::Memory) {
        Ok(views) => params
            .iter()
            .zip(views)
            .map(|(p, v)| (p.name.clone(), Some(v)))
            .collect(),
        Err(err) => {
            warn!(target: "txdbg::frame", %err, "failed to decode external call arguments");
            params.iter().map(|p| (p.name.clone(), None)).collect()
        }
    }
}

/// Builds an [`ExternalCallFrame`] for a message call, resolving the callee
/// contract's `ContractInfo` and matching `input`'s 4-byte selector against
/// its functions, then its public state-variable getters (spec.md §4.5).
///
/// `code_ids` is resolved by the caller (the driver's C4 per-step code
/// identity rule) rather than recomputed here, so a hash is never taken
/// twice for the same step.
pub fn make_call_frame(
    artifacts: &dyn ArtifactManager,
    abi: &dyn AbiDecoder,
    call_type: CallType,
    caller: Address,
    callee: Address,
    code_address: Address,
    value: Word,
    input: Bytes,
    depth: u64,
    code_ids: CodeIds,
) -> ExternalCallFrame {
    let contract = artifacts.resolve_contract(&code_ids);
    let selector: Option<[u8; 4]> = input.get(..4).and_then(|s| s.try_into().ok());

    let (entry_callee, arguments) = match (&contract, selector) {
        (Some(c), Some(selector)) => {
            if let Some(f) = c.functions.iter().find(|f| f.selector == selector) {
                let args = decode_external_args(abi, &f.params, &input[4..]);
                (Some(Callee::Function(f.clone())), args)
            } else if let Some(sv) = c.state_variables.iter().find(|sv| sv.selector == selector) {
                let params = sv.getter_params();
                let args = decode_external_args(abi, &params, &input[4..]);
                (Some(Callee::StateVariable(sv.clone())), args)
            } else {
                (None, vec![])
            }
        }
        _ => (None, vec![]),
    };

    if contract.is_none() {
        debug!(target: "txdbg::frame", code_hash = %code_ids.runtime.code_hash, "no contract metadata for call target");
    }

    ExternalCallFrame {
        call_type,
        caller,
        callee,
        code_address,
        value,
        input,
        depth,
        contract,
        entry_callee,
        arguments,
    }
}

/// Builds a [`CreationFrame`] for a CREATE/CREATE2. The deployed address is
/// never reported back by the single-callback step stream, so this frame
/// keeps [`txdbg_common::constants::ZERO_ADDRESS`] for its entire lifetime
/// (spec.md §4.6, DESIGN.md Open Question). Constructor-argument decoding is
/// left as a caller extension point (DESIGN.md Open Question 2).
pub fn make_creation_frame(
    artifacts: &dyn ArtifactManager,
    create_type: CreateType,
    creator: Address,
    value: Word,
    init_code: Bytes,
    depth: u64,
    code_ids: CodeIds,
) -> CreationFrame {
    let contract = artifacts.resolve_contract(&code_ids);

    CreationFrame {
        create_type,
        creator,
        pending_address: txdbg_common::constants::ZERO_ADDRESS,
        init_code,
        value,
        depth,
        contract,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use txdbg_evm_core::types::{AbiEncoderVersion, ContractInfo, EventDef, FunctionDef, StateVariableDef, TypeInfo};

    struct StubArtifacts(Option<ContractInfo>);
    impl ArtifactManager for StubArtifacts {
        fn resolve_contract(&self, _code_ids: &CodeIds) -> Option<ContractInfo> {
            self.0.clone()
        }
        fn source_map(&self, _code_ids: &CodeIds, _is_creation: bool) -> Option<String> {
            None
        }
        fn resolve_callee(
            &self,
            _code_ids: &CodeIds,
            _source_index: i32,
            _start: u32,
            _length: u32,
        ) -> Option<txdbg_evm_core::types::Callee> {
            None
        }
        fn abi_encoder_version(&self, _code_ids: &CodeIds) -> AbiEncoderVersion {
            AbiEncoderVersion::V2
        }
    }

    struct EchoAbi;
    impl AbiDecoder for EchoAbi {
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
                    location: txdbg_evm_core::types::DataLocation::Calldata { offset: Word::ZERO },
                    raw: raw.to_vec(),
                })
                .collect())
        }
        fn decode_event(
            &self,
            _event: &EventDef,
            _topics: &[alloy_primitives::B256],
            _data: &Bytes,
        ) -> eyre::Result<Vec<DataView>> {
            Ok(vec![])
        }
    }

    fn code_ids_stub() -> CodeIds {
        CodeIds {
            runtime: txdbg_evm_core::types::CodeId {
                code_hash: alloy_primitives::B256::ZERO,
                has_metadata: false,
            },
            creation: txdbg_evm_core::types::CodeId {
                code_hash: alloy_primitives::B256::ZERO,
                has_metadata: false,
            },
        }
    }

    #[test]
    fn call_frame_resolves_entry_function_by_selector() {
        let contract = ContractInfo {
            name: "Foo".into(),
            functions: vec![FunctionDef {
                name: "bar".into(),
                selector: [0xde, 0xad, 0xbe, 0xef],
                params: vec![],
                ast_node_id: None,
            }],
            state_variables: vec![],
            constructor: None,
            events: vec![],
            abi_encoder_version: AbiEncoderVersion::V2,
        };
        let artifacts = StubArtifacts(Some(contract));
        let abi = EchoAbi;
        let input = Bytes::from_static(&[0xde, 0xad, 0xbe, 0xef, 0x01]);
        let frame = make_call_frame(
            &artifacts,
            &abi,
            CallType::Call,
            Address::ZERO,
            Address::repeat_byte(1),
            Address::repeat_byte(1),
            Word::ZERO,
            input,
            1,
            code_ids_stub(),
        );
        match frame.entry_callee {
            Some(Callee::Function(f)) => assert_eq!(f.name, "bar"),
            other => panic!("expected Callee::Function, got {other:?}"),
        }
    }

    #[test]
    fn call_frame_resolves_state_variable_getter_by_selector() {
        let contract = ContractInfo {
            name: "Foo".into(),
            functions: vec![],
            state_variables: vec![StateVariableDef {
                name: "balances".into(),
                type_info: TypeInfo {
                    display: "mapping(address => uint256)".into(),
                    is_dynamic: false,
                },
                slot: Word::ZERO,
                byte_offset: 0,
                selector: [0x27, 0xe2, 0x35, 0xe3],
                getter_arity: 1,
            }],
            constructor: None,
            events: vec![],
            abi_encoder_version: AbiEncoderVersion::V2,
        };
        let artifacts = StubArtifacts(Some(contract));
        let abi = EchoAbi;
        let mut input = vec![0x27, 0xe2, 0x35, 0xe3];
        input.extend_from_slice(&[0u8; 32]);
        let frame = make_call_frame(
            &artifacts,
            &abi,
            CallType::Call,
            Address::ZERO,
            Address::repeat_byte(1),
            Address::repeat_byte(1),
            Word::ZERO,
            Bytes::from(input),
            1,
            code_ids_stub(),
        );
        match frame.entry_callee {
            Some(Callee::StateVariable(sv)) => assert_eq!(sv.name, "balances"),
            other => panic!("expected Callee::StateVariable, got {other:?}"),
        }
        assert_eq!(frame.arguments.len(), 1);
        assert_eq!(frame.arguments[0].0, "ARG_0");
    }

    #[test]
    fn creation_frame_starts_with_zero_address() {
        let artifacts = StubArtifacts(None);
        let frame = make_creation_frame(
            &artifacts,
            CreateType::Create,
            Address::ZERO,
            Word::ZERO,
            Bytes::from_static(&[0x60, 0x01]),
            0,
            code_ids_stub(),
        );
        assert_eq!(frame.pending_address, txdbg_common::constants::ZERO_ADDRESS);
    }
}
