//! Collaborator interfaces (spec.md §6): the traits a host embeds to supply
//! a VM, an artifact manager and an ABI decoder. The annotator only ever
//! calls through these traits — it never spawns or owns a VM itself.

use alloy_primitives::{Address, Bytes, B256};
use auto_impl::auto_impl;

use crate::types::{AbiEncoderVersion, CodeIds, ContractInfo, DataView, Word};

/// One raw, unnormalized VM callback (spec.md §6.1). The normalizer (C3)
/// turns a sequence of these into [`crate::types::StepVMState`]s, and the
/// reconciler (C6) diffs consecutive pairs of these to infer every frame
/// transition — there is no separate call/create/log lifecycle callback
/// (spec.md §6.1: "the VM exposes exactly one callback").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawStep {
    pub pc: u64,
    pub opcode: u8,
    pub depth: u64,
    pub stack: Vec<Word>,
    pub memory: Bytes,
    pub gas_remaining: u64,
    pub gas_cost: u64,
    /// The account whose storage/balance is in effect for this step —
    /// unchanged across a DELEGATECALL/CALLCODE boundary.
    pub contract: Address,
    /// The account whose code is actually executing — differs from
    /// `contract` under DELEGATECALL/CALLCODE, and is what C4's
    /// per-step code-identity rule keys its "did the code change" check on
    /// (spec.md §4.4).
    pub code_address: Address,
}

/// The transaction environment the host hands the annotator before
/// replaying (spec.md §6.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxEnv {
    pub caller: Address,
    pub to: Option<Address>,
    pub value: Word,
    pub data: Bytes,
    pub gas_limit: u64,
}

/// The single callback the annotator registers with the embedding VM
/// (spec.md §6.1). There is deliberately no `on_call`/`on_create`/`on_log` —
/// the VM reports raw per-step state only, and every frame transition
/// (external call, creation, internal call, revert-unwind) and every LOG
/// extraction is inferred downstream by diffing consecutive steps (spec.md
/// §4.6, §4.7).
#[auto_impl(&mut, Box)]
pub trait StepObserver {
    /// Called once per executed instruction, before its effects land.
    fn on_step(&mut self, step: &RawStep);
}

/// The embedding VM collaborator (spec.md §6.1): drives a transaction to
/// completion, invoking a [`StepObserver`] as it goes.
pub trait Vm {
    /// Executes `tx` to completion, feeding every lifecycle event to
    /// `observer`, and returns whether execution succeeded plus its return
    /// data. Step-by-step state (stack/memory/storage) is *not* returned
    /// here; the observer receives it incrementally via `on_step`.
    fn run_tx(&mut self, tx: &TxEnv, observer: &mut dyn StepObserver) -> eyre::Result<VmOutcome>;
}

/// The terminal result of [`Vm::run_tx`], independent of the step trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmOutcome {
    pub success: bool,
    pub gas_used: u64,
    pub return_data: Bytes,
}

/// Reads persistent contract storage (spec.md §6.2). Distinct from the VM
/// trait because a host may serve storage reads from a different layer
/// (e.g. a forked remote state) than the one executing opcodes.
#[auto_impl(&, &mut, Box, Arc)]
pub trait StateManager {
    fn storage_at(&self, address: Address, slot: Word) -> eyre::Result<Word>;
    fn code_at(&self, address: Address) -> eyre::Result<Bytes>;
}

/// Resolves compiled-artifact information: source maps, ASTs, ABI layout
/// (spec.md §6.3). The annotator treats every method as potentially
/// expensive and does not call it more than once per contract per trace.
#[auto_impl(&, &mut, Box, Arc)]
pub trait ArtifactManager {
    /// Resolves everything known about the contract whose runtime or
    /// creation code hashes to `code_ids`. Returns `None` if the artifact
    /// manager has no matching source (spec.md §7 `MissingDebugInfo`).
    fn resolve_contract(&self, code_ids: &CodeIds) -> Option<ContractInfo>;

    /// Returns the `start:length:sourceIndex:jump` source map text for the
    /// given contract's runtime (or creation, via `is_creation`) code.
    fn source_map(&self, code_ids: &CodeIds, is_creation: bool) -> Option<String>;

    /// Looks up which AST node — and therefore which [`crate::types::Callee`]
    /// — a JUMP(In) destination's source triple corresponds to.
    fn resolve_callee(
        &self,
        code_ids: &CodeIds,
        source_index: i32,
        start: u32,
        length: u32,
    ) -> Option<crate::types::Callee>;

    fn abi_encoder_version(&self, code_ids: &CodeIds) -> AbiEncoderVersion;
}

/// Where a decoded function argument's raw words were read from, handed to
/// the [`AbiDecoder`] alongside the raw words themselves (spec.md §4.3
/// `decodeFunArgs`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalldataLocation {
    Stack,
    Memory,
}

/// Decodes raw words into typed [`DataView`]s (spec.md §6.4). Kept separate
/// from the artifact manager because a host may swap ABI-decoding strategy
/// (e.g. `alloy-dyn-abi` vs. a custom decoder) independent of where it
/// sources contract metadata.
#[auto_impl(&, &mut, Box, Arc)]
pub trait AbiDecoder {
    fn decode_params(
        &self,
        params: &[crate::types::Param],
        raw: &[Word],
        location: CalldataLocation,
    ) -> eyre::Result<Vec<DataView>>;

    fn decode_event(
        &self,
        event: &crate::types::EventDef,
        topics: &[B256],
        data: &Bytes,
    ) -> eyre::Result<Vec<DataView>>;
}
