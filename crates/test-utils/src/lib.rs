//! # txdbg-test-utils
//!
//! Mock collaborators for exercising the trace annotator without a real VM,
//! compiler or ABI decoder: a scripted [`MockVm`] plus trivial in-memory
//! implementations of the other `txdbg-evm-core` interfaces.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

#[macro_use]
extern crate tracing;

use std::collections::HashMap;

use alloy_primitives::{Address, Bytes, B256};
use parking_lot::Mutex;
use txdbg_evm_core::interfaces::{
    AbiDecoder, ArtifactManager, CalldataLocation, RawStep, StateManager, StepObserver, TxEnv, Vm,
    VmOutcome,
};
use txdbg_evm_core::types::{
    AbiEncoderVersion, Callee, CodeIds, ContractInfo, DataView, EventDef, Param, Word,
};

/// Initializes `tracing` for a test binary; safe to call more than once.
pub fn init_tracing() {
    let _ = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// One scripted raw VM step a [`MockVm`] replays in order. There is
/// deliberately nothing else to script — the embedding VM exposes exactly
/// one callback (spec.md §6.1), and every frame transition is inferred
/// downstream by diffing consecutive steps.
#[derive(Debug, Clone)]
pub enum ScriptEvent {
    Step(RawStep),
}

/// A [`Vm`] that replays a fixed, hand-built sequence of lifecycle events
/// instead of actually executing bytecode. Used by every end-to-end test
/// in `txdbg-evm-traces` and `txdbg-debugger` (spec.md §8 scenario tests).
#[derive(Debug, Clone, Default)]
pub struct MockVm {
    script: Vec<ScriptEvent>,
    outcome: Option<VmOutcome>,
}

impl MockVm {
    pub fn new(script: Vec<ScriptEvent>, outcome: VmOutcome) -> Self {
        Self {
            script,
            outcome: Some(outcome),
        }
    }
}

impl Vm for MockVm {
    fn run_tx(&mut self, _tx: &TxEnv, observer: &mut dyn StepObserver) -> eyre::Result<VmOutcome> {
        trace!(target: "txdbg::test_utils", events = self.script.len(), "replaying scripted VM events");
        for event in &self.script {
            let ScriptEvent::Step(step) = event;
            observer.on_step(step);
        }
        self.outcome
            .clone()
            .ok_or_else(|| eyre::eyre!("MockVm script carries no terminal outcome"))
    }
}

/// A trivial key-value [`StateManager`]: storage defaults to zero, code
/// defaults to empty, both overridable per address.
#[derive(Debug, Default)]
pub struct MockStateManager {
    storage: Mutex<HashMap<(Address, Word), Word>>,
    code: Mutex<HashMap<Address, Bytes>>,
}

impl MockStateManager {
    pub fn set_storage(&self, address: Address, slot: Word, value: Word) {
        self.storage.lock().insert((address, slot), value);
    }

    pub fn set_code(&self, address: Address, code: Bytes) {
        self.code.lock().insert(address, code);
    }
}

impl StateManager for MockStateManager {
    fn storage_at(&self, address: Address, slot: Word) -> eyre::Result<Word> {
        Ok(self
            .storage
            .lock()
            .get(&(address, slot))
            .copied()
            .unwrap_or_default())
    }

    fn code_at(&self, address: Address) -> eyre::Result<Bytes> {
        Ok(self.code.lock().get(&address).cloned().unwrap_or_default())
    }
}

/// An in-memory [`ArtifactManager`] keyed by [`CodeIds`]; tests register
/// whatever contracts/source maps/callees a scenario needs.
#[derive(Debug, Default)]
pub struct MockArtifactManager {
    contracts: Mutex<HashMap<CodeIds, ContractInfo>>,
    source_maps: Mutex<HashMap<(CodeIds, bool), String>>,
    callees: Mutex<HashMap<(CodeIds, i32, u32, u32), Callee>>,
}

impl MockArtifactManager {
    pub fn register_contract(&self, code_ids: CodeIds, info: ContractInfo) {
        self.contracts.lock().insert(code_ids, info);
    }

    pub fn register_source_map(&self, code_ids: CodeIds, is_creation: bool, text: impl Into<String>) {
        self.source_maps
            .lock()
            .insert((code_ids, is_creation), text.into());
    }

    pub fn register_callee(
        &self,
        code_ids: CodeIds,
        source_index: i32,
        start: u32,
        length: u32,
        callee: Callee,
    ) {
        self.callees
            .lock()
            .insert((code_ids, source_index, start, length), callee);
    }
}

impl ArtifactManager for MockArtifactManager {
    fn resolve_contract(&self, code_ids: &CodeIds) -> Option<ContractInfo> {
        self.contracts.lock().get(code_ids).cloned()
    }

    fn source_map(&self, code_ids: &CodeIds, is_creation: bool) -> Option<String> {
        self.source_maps
            .lock()
            .get(&(code_ids.clone(), is_creation))
            .cloned()
    }

    fn resolve_callee(
        &self,
        code_ids: &CodeIds,
        source_index: i32,
        start: u32,
        length: u32,
    ) -> Option<Callee> {
        self.callees
            .lock()
            .get(&(code_ids.clone(), source_index, start, length))
            .cloned()
    }

    fn abi_encoder_version(&self, code_ids: &CodeIds) -> AbiEncoderVersion {
        self.contracts
            .lock()
            .get(code_ids)
            .map(|c| c.abi_encoder_version)
            .unwrap_or(AbiEncoderVersion::V2)
    }
}

/// An [`AbiDecoder`] that doesn't actually decode: it echoes each raw word
/// back as its own `DataView`, which is enough for reconciler/frame tests
/// that only assert on argument *count* and *location*, not decoded values.
#[derive(Debug, Default)]
pub struct EchoAbiDecoder;

impl AbiDecoder for EchoAbiDecoder {
    fn decode_params(
        &self,
        params: &[Param],
        raw: &[Word],
        location: CalldataLocation,
    ) -> eyre::Result<Vec<DataView>> {
        Ok(params
            .iter()
            .zip(raw.iter())
            .map(|(param, word)| DataView {
                name: param.name.clone(),
                type_info: param.type_info.clone(),
                location: match location {
                    CalldataLocation::Stack => txdbg_evm_core::types::DataLocation::Stack {
                        offset_from_top: 0,
                    },
                    CalldataLocation::Memory => {
                        txdbg_evm_core::types::DataLocation::Memory { offset: *word }
                    }
                },
                raw: vec![*word],
            })
            .collect())
    }

    fn decode_event(
        &self,
        event: &EventDef,
        topics: &[B256],
        _data: &Bytes,
    ) -> eyre::Result<Vec<DataView>> {
        Ok(event
            .params
            .iter()
            .zip(topics.iter().skip(1))
            .map(|(param, topic)| DataView {
                name: param.name.clone(),
                type_info: param.type_info.clone(),
                location: txdbg_evm_core::types::DataLocation::Calldata {
                    offset: Word::from_be_bytes(topic.0),
                },
                raw: vec![Word::from_be_bytes(topic.0)],
            })
            .collect())
    }
}
