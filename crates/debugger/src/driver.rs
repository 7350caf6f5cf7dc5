//! The [`StepObserver`] implementation that drives the annotator's pipeline
//! (sourcemap -> code_id -> normalizer -> frame/reconciler -> events) for one
//! transaction (spec.md §4.8). There is exactly one callback, `on_step`;
//! every frame transition (external call, creation, internal call,
//! revert-unwind) and every LOG extraction is inferred here by diffing the
//! current step against the one before it (spec.md §4.6, §4.7).

use std::collections::HashMap;

use alloy_primitives::Address;
use txdbg_evm_core::interfaces::{AbiDecoder, ArtifactManager, RawStep, StateManager, StepObserver, TxEnv};
use txdbg_evm_core::opcode;
use txdbg_evm_core::types::{CallType, CodeIds, CreateType, EventDesc, Frame, JumpKind, SourceMap, SourceTriple, StepState, Trace};

use txdbg_evm_traces::code_id::code_id_of_bytes;
use txdbg_evm_traces::frame::{make_call_frame, make_creation_frame};
use txdbg_evm_traces::normalizer::Normalizer;
use txdbg_evm_traces::reconciler::Reconciler;
use txdbg_evm_traces::{events, sourcemap};

use crate::DebuggerConfig;

struct ContractMaps {
    code_ids: CodeIds,
    source_map: Option<SourceMap>,
}

pub(crate) struct TraceDriver<'a> {
    artifacts: &'a dyn ArtifactManager,
    abi: &'a dyn AbiDecoder,
    state: &'a dyn StateManager,
    config: &'a DebuggerConfig,

    normalizer: Normalizer<'a>,
    reconciler: Reconciler,
    // Keyed by `code_address`, not the executing account, so a
    // DELEGATECALL/CALLCODE (which changes the code in effect without
    // changing the account context) still resolves its own source map and
    // code identity independently (spec.md §4.4).
    contract_maps: HashMap<Address, ContractMaps>,

    pub(crate) trace: Trace,
    pub(crate) events: Vec<EventDesc>,
    pub(crate) truncated: bool,

    // The previous raw step, diffed against the current one to drive Rule A
    // (spec.md §4.6). `None` until the second step of the trace; the very
    // first frame is seeded directly from `TxEnv` in `new`, since there is
    // no preceding step to diff the outermost call against.
    prev_step: Option<RawStep>,
}

impl<'a> TraceDriver<'a> {
    pub(crate) fn new(
        artifacts: &'a dyn ArtifactManager,
        abi: &'a dyn AbiDecoder,
        state: &'a dyn StateManager,
        config: &'a DebuggerConfig,
        tx: &TxEnv,
    ) -> Self {
        let mut driver = Self {
            artifacts,
            abi,
            state,
            config,
            normalizer: Normalizer::new(state),
            reconciler: Reconciler::new(),
            contract_maps: HashMap::new(),
            trace: Vec::new(),
            events: Vec::new(),
            truncated: false,
            prev_step: None,
        };
        driver.seed_outermost_frame(tx);
        driver
    }

    /// Pushes the transaction's outermost external or creation frame before
    /// the VM takes a single step (spec.md §4.8). Rule A can only infer a
    /// push from a depth *change* across two consecutive steps, and there is
    /// no step preceding the very first one.
    fn seed_outermost_frame(&mut self, tx: &TxEnv) {
        match tx.to {
            Some(to) => {
                let code_ids = self.code_ids_for(to);
                let frame = make_call_frame(
                    self.artifacts,
                    self.abi,
                    CallType::Call,
                    tx.caller,
                    to,
                    to,
                    tx.value,
                    tx.data.clone(),
                    txdbg_common::constants::DEPTH_OFFSET,
                    code_ids,
                );
                self.reconciler.push_external(frame);
            }
            None => {
                let code_ids = CodeIds {
                    runtime: code_id_of_bytes(&tx.data),
                    creation: code_id_of_bytes(&tx.data),
                };
                let frame = make_creation_frame(
                    self.artifacts,
                    CreateType::Create,
                    tx.caller,
                    tx.value,
                    tx.data.clone(),
                    txdbg_common::constants::DEPTH_OFFSET,
                    code_ids,
                );
                self.reconciler.push_creation(frame);
            }
        }
    }

    fn maps_for(&mut self, code_address: Address) -> &ContractMaps {
        if !self.contract_maps.contains_key(&code_address) {
            let bytecode = self.state.code_at(code_address).unwrap_or_default();
            let runtime_id = code_id_of_bytes(&bytecode);
            let code_ids = CodeIds {
                runtime: runtime_id.clone(),
                creation: runtime_id,
            };
            let source_map = self
                .artifacts
                .source_map(&code_ids, false)
                .map(|text| sourcemap::build_source_map(&text, &bytecode));
            if source_map.is_none() {
                debug!(target: "txdbg::debugger", address = %code_address, "no source map for contract");
            }
            self.contract_maps
                .insert(code_address, ContractMaps { code_ids, source_map });
        }
        &self.contract_maps[&code_address]
    }

    fn code_ids_for(&mut self, code_address: Address) -> CodeIds {
        self.maps_for(code_address).code_ids.clone()
    }

    fn triple_at(&mut self, code_address: Address, pc: u64) -> Option<SourceTriple> {
        self.maps_for(code_address).source_map.as_ref()?.triple_at_pc(pc).copied()
    }

    /// Walks the frame stack for the contract metadata of the nearest
    /// enclosing external or creation frame, for attributing a LOG emitted
    /// from inside an internal frame back to its contract (spec.md §4.7).
    fn active_contract_info(&self) -> Option<txdbg_evm_core::types::ContractInfo> {
        self.reconciler.frames().iter().rev().find_map(|f| match f {
            Frame::External(e) => e.contract.clone(),
            Frame::Creation(c) => c.contract.clone(),
            Frame::Internal(_) => None,
        })
    }
}

impl StepObserver for TraceDriver<'_> {
    fn on_step(&mut self, step: &RawStep) {
        if self.truncated {
            return;
        }
        if self.trace.len() as u64 >= self.config.max_steps {
            self.truncated = true;
            return;
        }

        let vm_state = match self.normalizer.normalize(step.contract, step) {
            Ok(s) => s,
            Err(err) => {
                warn!(target: "txdbg::debugger", %err, "failed to normalize step, skipping");
                return;
            }
        };

        let code_ids = self.code_ids_for(step.code_address);
        let source_location = self.triple_at(step.code_address, step.pc);

        let mut callee = None;

        // Rule A (spec.md §4.6): a change in depth since the previous step
        // means an external call or creation just started, or one or more
        // unwound.
        if let Some(prev) = self.prev_step.clone() {
            if prev.depth != step.depth {
                match self
                    .reconciler
                    .on_step(self.artifacts, self.abi, &prev, step, &code_ids)
                {
                    Ok(c) => callee = c,
                    Err(err) => warn!(target: "txdbg::debugger", %err, "frame stack reconciliation failed"),
                }
            }
        }

        // Rule B (spec.md §4.6): a same-depth JUMP tagged `i`/`o` pushes or
        // pops an internal frame.
        if step.opcode == opcode::JUMP {
            if let Some(triple) = source_location {
                if triple.jump != JumpKind::Regular {
                    let dest = step.stack.last().copied().unwrap_or_default();
                    let next_pc = step.pc + 1;
                    let dest_u64: u64 = dest.try_into().unwrap_or(u64::MAX);
                    match self.reconciler.on_jump(
                        self.artifacts,
                        self.abi,
                        &code_ids,
                        step.pc,
                        next_pc,
                        triple.jump,
                        dest_u64,
                        triple.source_index,
                        triple.start,
                        triple.length,
                        &step.stack,
                    ) {
                        Ok(c) => {
                            if c.is_some() {
                                callee = c;
                            }
                        }
                        Err(err) => warn!(target: "txdbg::debugger", %err, "frame stack reconciliation failed"),
                    }
                }
            }
        }

        // C7 (spec.md §4.7): LOG{N} reads its topics/offset/size straight off
        // this step's stack and memory, before the instruction retires.
        let event = opcode::classify(step.opcode).log_n.map(|log_n| {
            let contract = self.active_contract_info();
            let desc = events::extract_event(
                self.abi,
                contract.as_ref(),
                step.contract,
                &step.stack,
                &step.memory,
                log_n,
            );
            self.events.push(desc.clone());
            desc
        });

        self.trace.push(StepState {
            vm_state,
            frames: self.reconciler.frames().clone(),
            source_location,
            callee,
            event,
        });

        self.prev_step = Some(step.clone());
    }
}
