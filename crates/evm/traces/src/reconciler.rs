//! C6: the stack reconciler. The heart of the annotator — the state
//! machine that turns a flat sequence of single-callback VM steps into a
//! properly nested logical call stack of external, creation and internal
//! frames (spec.md §4.6).
//!
//! Two rules drive every frame transition; neither relies on any lifecycle
//! callback beyond the one the VM actually fires (spec.md §6.1):
//!
//! * **Rule A** (external/creation, cross-depth): comparing the current
//!   step's `depth` against the previous step's. A depth *increase* of
//!   exactly one, when the previous opcode is depth-increasing, means a
//!   CALL-family or CREATE-family opcode just transferred control — its
//!   arguments are read from the *previous* step's stack/memory at
//!   opcode-specific offsets (spec.md §4.6). A depth *decrease* means one or
//!   more external/creation frames returned or reverted; frames are popped
//!   until a quota of external/creation pops (equal to the depth delta) is
//!   met, with any internal frames riding along uncounted (spec.md §8
//!   scenario 4, "revert unwinds internals").
//! * **Rule B** (internal call, same depth): a `JUMP` whose own source
//!   triple is tagged `i` pushes a new [`InternalCallFrame`]; the jump
//!   destination (the top of the stack just before the jump executes)
//!   becomes `entry_pc`, the instruction after the JUMP becomes `return_pc`.
//!   A `JUMP` tagged `o` pops the top frame, which must be an
//!   [`InternalCallFrame`] — same-contract control flow cannot return out of
//!   an external or creation frame via a plain JUMP, so anything else is an
//!   [`AnnotatorError::DanglingInternalFrame`].

use alloy_primitives::{Address, Bytes};
use rpds::Vector;
use txdbg_evm_core::error::AnnotatorError;
use txdbg_evm_core::interfaces::{AbiDecoder, ArtifactManager, RawStep};
use txdbg_evm_core::opcode::{self, JUMP};
use txdbg_evm_core::types::{
    AbiEncoderVersion, CallType, Callee, CodeIds, CreateType, DataLocation, DataView, Frame,
    FrameStack, InternalCallFrame, InternalCallKind, JumpKind, Param, Word,
};

/// Reads the stack slot `offset_from_top` entries below the top (0 = top
/// itself), the convention Rule A's argument-offset tables are written
/// against (spec.md §4.6).
pub fn word_at(stack: &[Word], offset_from_top: usize) -> Option<Word> {
    stack.len().checked_sub(1 + offset_from_top).and_then(|i| stack.get(i)).copied()
}

/// Narrows a stack word to the low 20 bytes an `Address` occupies.
pub fn address_from_word(word: Word) -> Address {
    let bytes = word.to_be_bytes::<32>();
    Address::from_slice(&bytes[12..32])
}

/// Reads `memory[offset..offset+size]`, zero-padding past the end of the
/// buffer the same way real linear memory reads unwritten bytes as zero
/// (spec.md §4.6/§4.7).
pub fn slice_memory(memory: &Bytes, offset: Word, size: Word) -> Bytes {
    let offset: usize = offset.try_into().unwrap_or(usize::MAX);
    let size: usize = size.try_into().unwrap_or(0);
    if size == 0 {
        return Bytes::new();
    }
    let mut buf = vec![0u8; size];
    if offset < memory.len() {
        let available = &memory[offset..];
        let take = available.len().min(size);
        buf[..take].copy_from_slice(&available[..take]);
    }
    Bytes::from(buf)
}

/// Maps a depth-increasing opcode byte to the [`CallType`] it represents, or
/// `None` if it is a CREATE-family opcode (handled separately) or not a call
/// at all.
pub fn call_type_of(opcode_byte: u8) -> Option<CallType> {
    match opcode_byte {
        opcode::CALL => Some(CallType::Call),
        opcode::CALLCODE => Some(CallType::CallCode),
        opcode::DELEGATECALL => Some(CallType::DelegateCall),
        opcode::STATICCALL => Some(CallType::StaticCall),
        _ => None,
    }
}

/// Drives the frame stack across a sequence of steps for a single
/// transaction. One [`Reconciler`] is created per `debug_tx` call
/// (spec.md §4.8).
pub struct Reconciler {
    frames: FrameStack,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new()
    }
}

impl Reconciler {
    pub fn new() -> Self {
        Self {
            frames: Vector::new(),
        }
    }

    pub fn frames(&self) -> &FrameStack {
        &self.frames
    }

    /// Pushes an already-built external frame. Used by the driver to seed
    /// the transaction's outermost frame (spec.md §4.8), since Rule A can
    /// only infer a push from a depth *change* and the first frame has no
    /// preceding step to diff against.
    pub fn push_external(&mut self, frame: txdbg_evm_core::types::ExternalCallFrame) {
        self.frames = self.frames.push_back(Frame::External(frame));
    }

    /// Pushes an already-built creation frame, for the same outermost-frame
    /// seeding purpose as [`Self::push_external`].
    pub fn push_creation(&mut self, frame: txdbg_evm_core::types::CreationFrame) {
        self.frames = self.frames.push_back(Frame::Creation(frame));
    }

    fn pop_matching<T>(
        &mut self,
        is_match: impl Fn(&Frame) -> bool,
        extract: impl Fn(Frame) -> T,
    ) -> Result<T, AnnotatorError> {
        let top = self
            .frames
            .last()
            .cloned()
            .ok_or_else(|| AnnotatorError::InvariantViolation("frame stack empty on pop".into()))?;
        if !is_match(&top) {
            return Err(AnnotatorError::InvariantViolation(format!(
                "expected matching frame kind on top of stack, found {top:?}"
            )));
        }
        self.frames = self.frames.drop_last().unwrap_or_else(Vector::new);
        Ok(extract(top))
    }

    /// Pops frames until `quota` external/creation frames have been popped,
    /// letting any riding internal frames go uncounted (spec.md §4.6,
    /// "Revert unwinds internals").
    fn pop_external_quota(&mut self, quota: u64) -> Result<(), AnnotatorError> {
        let mut remaining = quota;
        while remaining > 0 {
            let top = self.frames.last().cloned().ok_or_else(|| {
                AnnotatorError::InvariantViolation(
                    "frame stack empty while unwinding external depth".into(),
                )
            })?;
            self.frames = self.frames.drop_last().unwrap_or_else(Vector::new);
            if top.is_external() {
                remaining -= 1;
            }
        }
        Ok(())
    }

    /// Rule A: reconciles the frame stack against the depth delta between
    /// two consecutive raw steps. Returns the newly-pushed frame's callee,
    /// if this call pushed one, so the driver can attach it to the step's
    /// [`txdbg_evm_core::types::StepState::callee`].
    ///
    /// `code`/`code_ids` are the *current* step's resolved code identity
    /// (C4), already computed once by the driver — this never re-derives
    /// them, so a contract's bytes are never hashed twice for one step.
    pub fn on_step(
        &mut self,
        artifacts: &dyn ArtifactManager,
        abi: &dyn AbiDecoder,
        prev: &RawStep,
        current: &RawStep,
        code_ids: &CodeIds,
    ) -> Result<Option<Callee>, AnnotatorError> {
        if current.depth == prev.depth {
            return Ok(None);
        }
        if current.depth > prev.depth {
            self.push_for_depth_increase(artifacts, abi, prev, current, code_ids)
        } else {
            let quota = prev.depth - current.depth;
            self.pop_external_quota(quota)?;
            Ok(None)
        }
    }

    fn push_for_depth_increase(
        &mut self,
        artifacts: &dyn ArtifactManager,
        abi: &dyn AbiDecoder,
        prev: &RawStep,
        current: &RawStep,
        code_ids: &CodeIds,
    ) -> Result<Option<Callee>, AnnotatorError> {
        if current.depth != prev.depth + 1 || !opcode::classify(prev.opcode).increases_depth {
            return Err(AnnotatorError::InvariantViolation(format!(
                "depth increased from {} to {} but previous opcode {:#x} does not increase depth by one",
                prev.depth, current.depth, prev.opcode
            )));
        }

        let next_depth = current.depth + txdbg_common::constants::DEPTH_OFFSET;

        if opcode::classify(prev.opcode).creates_contract {
            let create_type = if prev.opcode == opcode::CREATE2 {
                CreateType::Create2
            } else {
                CreateType::Create
            };
            let value = word_at(&prev.stack, 0).unwrap_or_default();
            let init_offset = word_at(&prev.stack, 1).unwrap_or_default();
            let init_size = word_at(&prev.stack, 2).unwrap_or_default();
            let init_code = slice_memory(&prev.memory, init_offset, init_size);
            let frame = crate::frame::make_creation_frame(
                artifacts,
                create_type,
                prev.contract,
                value,
                init_code,
                next_depth,
                code_ids.clone(),
            );
            self.frames = self.frames.push_back(Frame::Creation(frame));
            return Ok(None);
        }

        let call_type = call_type_of(prev.opcode).ok_or_else(|| {
            AnnotatorError::InvariantViolation(format!(
                "depth-increasing opcode {:#x} is not a recognised call",
                prev.opcode
            ))
        })?;

        let (arg_offset_idx, arg_size_idx) = match call_type {
            CallType::Call | CallType::CallCode => (3, 4),
            CallType::DelegateCall | CallType::StaticCall => (2, 3),
        };
        let stack_target = word_at(&prev.stack, 1).map(address_from_word).unwrap_or_default();
        let (callee_addr, code_address) = match call_type {
            CallType::Call | CallType::StaticCall => (stack_target, stack_target),
            CallType::CallCode | CallType::DelegateCall => (prev.contract, stack_target),
        };
        let value = match call_type {
            CallType::Call | CallType::CallCode => word_at(&prev.stack, 2).unwrap_or_default(),
            CallType::DelegateCall | CallType::StaticCall => Word::ZERO,
        };
        let arg_offset = word_at(&prev.stack, arg_offset_idx).unwrap_or_default();
        let arg_size = word_at(&prev.stack, arg_size_idx).unwrap_or_default();
        let msg_data = slice_memory(&prev.memory, arg_offset, arg_size);

        let frame = crate::frame::make_call_frame(
            artifacts,
            abi,
            call_type,
            prev.contract,
            callee_addr,
            code_address,
            value,
            msg_data,
            next_depth,
            code_ids.clone(),
        );
        let callee = frame.entry_callee.clone();
        self.frames = self.frames.push_back(Frame::External(frame));
        Ok(callee)
    }

    /// Rule B: processes one same-depth JUMP whose source-map jump-kind is
    /// not `-`. `jump_kind`/`jump_dest`/`source_index`/`start`/`length` are
    /// resolved by the caller from the current contract's `SourceMap` and
    /// stack; `current_stack` is the operand stack as of this JUMP, used to
    /// reconstruct internal-call arguments via [`decode_fun_args`].
    #[allow(clippy::too_many_arguments)]
    pub fn on_jump(
        &mut self,
        artifacts: &dyn ArtifactManager,
        abi: &dyn AbiDecoder,
        code_ids: &CodeIds,
        pc: u64,
        next_pc: u64,
        jump_kind: JumpKind,
        jump_dest: u64,
        source_index: i32,
        start: u32,
        length: u32,
        current_stack: &[Word],
    ) -> Result<Option<Callee>, AnnotatorError> {
        match jump_kind {
            JumpKind::In => {
                let parent_external = self.nearest_external_index()?;
                let callee = artifacts
                    .resolve_callee(code_ids, source_index, start, length)
                    .unwrap_or(Callee::Unknown);
                let (kind, params) = match &callee {
                    Callee::Function(f) => (InternalCallKind::Function(f.clone()), f.params.clone()),
                    Callee::Modifier { name } => {
                        (InternalCallKind::Modifier { name: name.clone() }, vec![])
                    }
                    Callee::StateVariable(sv) => {
                        (InternalCallKind::StateVariable(sv.clone()), sv.getter_params())
                    }
                    Callee::Unknown => (InternalCallKind::Unresolved, vec![]),
                };
                let arguments = if params.is_empty() {
                    vec![]
                } else {
                    let encoder_version = artifacts.abi_encoder_version(code_ids);
                    match decode_fun_args(abi, &params, current_stack, encoder_version) {
                        Ok(views) => params
                            .iter()
                            .zip(views)
                            .map(|(p, v)| (p.name.clone(), Some(v)))
                            .collect(),
                        Err(err) => {
                            warn!(target: "txdbg::reconciler", %err, "failed to reconstruct internal call arguments");
                            params.iter().map(|p| (p.name.clone(), None)).collect()
                        }
                    }
                };
                self.frames = self.frames.push_back(Frame::Internal(InternalCallFrame {
                    kind,
                    entry_pc: jump_dest,
                    return_pc: next_pc,
                    parent_external,
                    arguments,
                }));
                Ok(Some(callee))
            }
            JumpKind::Out => self
                .pop_matching(
                    |f| matches!(f, Frame::Internal(_)),
                    |f| match f {
                        Frame::Internal(i) => i,
                        _ => unreachable!(),
                    },
                )
                .map(|_| None)
                .map_err(|_| AnnotatorError::DanglingInternalFrame {
                    pc,
                    stack_len: self.frames.len(),
                }),
            JumpKind::Regular => Ok(None),
        }
    }

    fn nearest_external_index(&self) -> Result<usize, AnnotatorError> {
        for i in (0..self.frames.len()).rev() {
            if self.frames.get(i).is_some_and(Frame::is_external) {
                return Ok(i);
            }
        }
        Err(AnnotatorError::InvariantViolation(
            "no enclosing external or creation frame for internal call".into(),
        ))
    }

    pub fn is_jump(opcode_byte: u8) -> bool {
        opcode_byte == JUMP
    }
}

/// `decodeFunArgs` (spec.md §4.6): reconstructs a call's arguments from the
/// operand stack at its entry point. Solidity's internal calling convention
/// pushes arguments left-to-right, then the return address, then jumps — so
/// at entry (return address already popped by the JUMP) the top of the
/// stack holds argument N, then N-1, ... down to argument 1. The same
/// reconstruction serves a public getter's synthesized `ARG_i` parameters
/// when reached via an internal JUMP (spec.md §4.6).
///
/// Dynamic types occupy two stack slots (offset, length) under the legacy
/// ABI encoder and one (a memory pointer) under the current one; static
/// types always occupy one.
pub fn decode_fun_args(
    decoder: &dyn AbiDecoder,
    params: &[Param],
    stack_at_entry: &[Word],
    encoder_version: AbiEncoderVersion,
) -> eyre::Result<Vec<DataView>> {
    let mut raw_per_param = Vec::with_capacity(params.len());
    let mut cursor = stack_at_entry.len();

    for param in params.iter().rev() {
        let slots = if param.type_info.is_dynamic {
            match encoder_version {
                AbiEncoderVersion::V1 => 2,
                AbiEncoderVersion::V2 => 1,
            }
        } else {
            1
        };
        if cursor < slots {
            return Err(eyre::eyre!(
                "stack underflow reconstructing argument '{}': need {slots} slot(s), {cursor} remain",
                param.name
            ));
        }
        cursor -= slots;
        raw_per_param.push(stack_at_entry[cursor..cursor + slots].to_vec());
    }
    raw_per_param.reverse();

    let mut views = Vec::with_capacity(params.len());
    for (param, raw) in params.iter().zip(raw_per_param.into_iter()) {
        let mut decoded = decoder.decode_params(
            std::slice::from_ref(param),
            &raw,
            txdbg_evm_core::interfaces::CalldataLocation::Stack,
        )?;
        views.push(decoded.pop().unwrap_or(DataView {
            name: param.name.clone(),
            type_info: param.type_info.clone(),
            location: DataLocation::Stack {
                offset_from_top: 0,
            },
            raw,
        }));
    }
    Ok(views)
}
