//! Property tests for the stack reconciler (spec.md §8): generate random
//! but well-formed call/return sequences and check the invariants the state
//! machine design promises regardless of how deep or long the sequence is.

use alloy_primitives::Address;
use proptest::prelude::*;
use txdbg_evm_core::interfaces::{AbiDecoder, ArtifactManager, CalldataLocation};
use txdbg_evm_core::types::{
    AbiEncoderVersion, CallType, Callee, CodeId, CodeIds, ContractInfo, DataView, ExternalCallFrame,
    JumpKind, Param, Word,
};
use txdbg_evm_traces::reconciler::Reconciler;

struct NullArtifacts;
impl ArtifactManager for NullArtifacts {
    fn resolve_contract(&self, _: &CodeIds) -> Option<ContractInfo> {
        None
    }
    fn source_map(&self, _: &CodeIds, _: bool) -> Option<String> {
        None
    }
    fn resolve_callee(&self, _: &CodeIds, _: i32, _: u32, _: u32) -> Option<Callee> {
        None
    }
    fn abi_encoder_version(&self, _: &CodeIds) -> AbiEncoderVersion {
        AbiEncoderVersion::V2
    }
}

struct NullAbi;
impl AbiDecoder for NullAbi {
    fn decode_params(
        &self,
        _params: &[Param],
        _raw: &[Word],
        _location: CalldataLocation,
    ) -> eyre::Result<Vec<DataView>> {
        Ok(vec![])
    }
    fn decode_event(
        &self,
        _event: &txdbg_evm_core::types::EventDef,
        _topics: &[alloy_primitives::B256],
        _data: &alloy_primitives::Bytes,
    ) -> eyre::Result<Vec<DataView>> {
        Ok(vec![])
    }
}

fn dummy_code_ids() -> CodeIds {
    let id = CodeId {
        code_hash: Default::default(),
        has_metadata: false,
    };
    CodeIds {
        runtime: id.clone(),
        creation: id,
    }
}

fn ext_frame() -> ExternalCallFrame {
    ExternalCallFrame {
        call_type: CallType::Call,
        caller: Address::ZERO,
        callee: Address::repeat_byte(1),
        code_address: Address::repeat_byte(1),
        value: Word::ZERO,
        input: Default::default(),
        depth: 1,
        contract: None,
        entry_callee: None,
        arguments: vec![],
    }
}

/// A balanced sequence of nested internal calls: `depth` "In"s each
/// immediately or eventually matched by an "Out" before the sequence ends,
/// generated as a bracket sequence so it is well-formed by construction.
fn balanced_bracket_sequence(max_depth: u32) -> impl Strategy<Value = Vec<JumpKind>> {
    fn build(depth: u32) -> BoxedStrategy<Vec<JumpKind>> {
        if depth == 0 {
            return Just(vec![]).boxed();
        }
        (0u32..3)
            .prop_flat_map(move |n_children| {
                prop::collection::vec(build(depth - 1), n_children as usize)
            })
            .prop_map(|children| {
                let mut seq = vec![JumpKind::In];
                for child in children {
                    seq.extend(child);
                }
                seq.push(JumpKind::Out);
                seq
            })
            .boxed()
    }
    build(max_depth)
}

proptest! {
    /// I1: every `In` eventually matched by exactly one `Out` leaves the
    /// frame stack exactly as deep as it started.
    #[test]
    fn balanced_sequence_returns_stack_to_baseline(seq in balanced_bracket_sequence(4)) {
        let mut r = Reconciler::new();
        r.push_external(ext_frame());
        let baseline = r.frames().len();
        let artifacts = NullArtifacts;
        let abi = NullAbi;
        let code_ids = dummy_code_ids();

        for (i, kind) in seq.iter().enumerate() {
            r.on_jump(&artifacts, &abi, &code_ids, i as u64, i as u64 + 1, *kind, 0, 0, 0, &[]).unwrap();
        }

        prop_assert_eq!(r.frames().len(), baseline);
    }

    /// I2: the frame stack never contains more internal frames than there
    /// were unmatched `In`s seen so far — i.e. it never grows on an `Out`.
    #[test]
    fn stack_never_grows_on_return(seq in balanced_bracket_sequence(4)) {
        let mut r = Reconciler::new();
        r.push_external(ext_frame());
        let artifacts = NullArtifacts;
        let abi = NullAbi;
        let code_ids = dummy_code_ids();
        let mut prev_len = r.frames().len();

        for (i, kind) in seq.iter().enumerate() {
            r.on_jump(&artifacts, &abi, &code_ids, i as u64, i as u64 + 1, *kind, 0, 0, 0, &[]).unwrap();
            let len = r.frames().len();
            if *kind == JumpKind::Out {
                prop_assert!(len <= prev_len);
            }
            prev_len = len;
        }
    }

    /// I3: regular jumps never change the frame stack's length.
    #[test]
    fn regular_jumps_are_no_ops_for_the_stack(n in 0usize..20) {
        let mut r = Reconciler::new();
        r.push_external(ext_frame());
        let artifacts = NullArtifacts;
        let abi = NullAbi;
        let code_ids = dummy_code_ids();
        let baseline = r.frames().len();

        for i in 0..n {
            r.on_jump(&artifacts, &abi, &code_ids, i as u64, i as u64 + 1, JumpKind::Regular, 0, 0, 0, &[]).unwrap();
        }
        prop_assert_eq!(r.frames().len(), baseline);
    }

    /// I4: an `Out` with no matching `In` on an otherwise-empty internal
    /// stack is always rejected, never silently accepted.
    #[test]
    fn unmatched_return_is_always_rejected(depth in 1u64..5) {
        let mut r = Reconciler::new();
        r.push_external(ext_frame());
        let artifacts = NullArtifacts;
        let abi = NullAbi;
        let code_ids = dummy_code_ids();
        let result = r.on_jump(&artifacts, &abi, &code_ids, depth, depth + 1, JumpKind::Out, 0, 0, 0, &[]);
        prop_assert!(result.is_err());
    }

    /// I5: pushing `n` internal calls without any matching returns leaves
    /// the stack exactly `n` deeper than its baseline.
    #[test]
    fn unmatched_calls_accumulate_one_frame_each(n in 0usize..12) {
        let mut r = Reconciler::new();
        r.push_external(ext_frame());
        let artifacts = NullArtifacts;
        let abi = NullAbi;
        let code_ids = dummy_code_ids();
        let baseline = r.frames().len();

        for i in 0..n {
            r.on_jump(&artifacts, &abi, &code_ids, i as u64, i as u64 + 1, JumpKind::In, 0, 0, 0, &[]).unwrap();
        }
        prop_assert_eq!(r.frames().len(), baseline + n);
    }
}

#[test]
fn internal_call_without_any_external_frame_is_rejected() {
    let mut r = Reconciler::new();
    let artifacts = NullArtifacts;
    let abi = NullAbi;
    let code_ids = dummy_code_ids();
    let result = r.on_jump(&artifacts, &abi, &code_ids, 0, 1, JumpKind::In, 0, 0, 0, &[]);
    assert!(result.is_err());
}

#[test]
fn external_frame_always_recognised_as_external() {
    use txdbg_evm_core::types::Frame;
    let frame = Frame::External(ext_frame());
    assert!(frame.is_external());
}
