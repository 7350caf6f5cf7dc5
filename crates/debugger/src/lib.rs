//! # txdbg-debugger
//!
//! C8: the trace driver and the public `Debugger` facade. This is the only
//! crate a host is expected to depend on directly — everything else is
//! plumbing it composes (spec.md §4.8).

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

#[macro_use]
extern crate tracing;

mod config;
mod driver;

pub use config::DebuggerConfig;

use alloy_primitives::Bytes;
use txdbg_evm_core::error::AnnotatorError;
use txdbg_evm_core::interfaces::{AbiDecoder, ArtifactManager, StateManager, TxEnv, Vm};
use txdbg_evm_core::types::{CodeIds, RunTxResult, SourceTriple};

use driver::TraceDriver;

/// Ties the three external collaborators (spec.md §6) together and exposes
/// the two operations a host needs: replaying a transaction into an
/// annotated trace, and resolving one program counter's source location on
/// demand.
pub struct Debugger<'a> {
    artifacts: &'a dyn ArtifactManager,
    abi: &'a dyn AbiDecoder,
    state: &'a dyn StateManager,
    config: DebuggerConfig,
}

impl<'a> Debugger<'a> {
    pub fn new(
        artifacts: &'a dyn ArtifactManager,
        abi: &'a dyn AbiDecoder,
        state: &'a dyn StateManager,
        config: DebuggerConfig,
    ) -> Self {
        Self {
            artifacts,
            abi,
            state,
            config,
        }
    }

    /// Replays `tx` through `vm`, returning the fully annotated trace
    /// (spec.md §4.8). `vm` drives execution; the driver installed here
    /// only observes.
    #[instrument(name = "debug_tx", level = "debug", skip_all)]
    pub fn debug_tx(&self, vm: &mut dyn Vm, tx: &TxEnv) -> Result<RunTxResult, AnnotatorError> {
        let mut driver = TraceDriver::new(self.artifacts, self.abi, self.state, &self.config, tx);
        let outcome = vm.run_tx(tx, &mut driver)?;

        if driver.truncated {
            warn!(
                target: "txdbg::debugger",
                max_steps = self.config.max_steps,
                "trace truncated: max_steps circuit breaker tripped"
            );
        }

        Ok(RunTxResult {
            trace: driver.trace,
            success: outcome.success,
            gas_used: outcome.gas_used,
            return_data: outcome.return_data,
            events: driver.events,
        })
    }

    /// Resolves the source location active at `pc` for a given contract's
    /// code, independent of any trace (spec.md §4.2). Returns `None` if the
    /// artifact manager has no source map for this code or `pc` does not
    /// begin an instruction.
    pub fn decode_source_loc(
        &self,
        code_ids: &CodeIds,
        pc: u64,
        is_creation: bool,
        bytecode: &Bytes,
    ) -> Option<SourceTriple> {
        let text = self.artifacts.source_map(code_ids, is_creation)?;
        let map = txdbg_evm_traces::sourcemap::build_source_map(&text, bytecode);
        map.triple_at_pc(pc).copied()
    }
}
